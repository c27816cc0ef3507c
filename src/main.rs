mod config;
mod models;
mod services;
mod sessions;
mod utils;

use axum::{
    Form, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use models::{PublishReport, Session};
use serde::Deserialize;
use services::llm::CompletionModel;
use services::outline::OutlineBounds;
use services::publisher::ChapterPublisher;
use services::workflow;
use sessions::{SessionHandle, SessionStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    model: Arc<dyn CompletionModel>,
    publisher: Arc<ChapterPublisher>,
    bounds: OutlineBounds,
    sessions: Arc<SessionStore>,
}

impl AppState {
    fn new(
        model: Arc<dyn CompletionModel>,
        publisher: Arc<ChapterPublisher>,
        bounds: OutlineBounds,
        sessions: SessionStore,
    ) -> Self {
        AppState {
            model,
            publisher,
            bounds,
            sessions: Arc::new(sessions),
        }
    }

    async fn session(&self, id: Uuid) -> Result<SessionHandle, AppError> {
        self.sessions
            .get(id)
            .await
            .ok_or(AppError::SessionNotFound)
    }
}

enum AppError {
    SessionNotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::SessionNotFound => {
                (StatusCode::NOT_FOUND, Html(utils::html::render_not_found())).into_response()
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::from_env()?;

    let llm_client = Arc::new(services::llm::LLMClient::new(&config.llm)?);
    let github = Arc::new(services::github::GitHubClient::new(&config.github)?);
    tracing::info!(
        repo = github.repo(),
        branch = %config.github.branch,
        model = %config.llm.model,
        max_attempts = config.retry.max_attempts,
        "Configured book generator"
    );
    let publisher = Arc::new(ChapterPublisher::new(github, config.retry));

    let sessions = SessionStore::new(config.session_ttl, config.session_capacity);
    let app_state = AppState::new(llm_client, publisher, config.outline, sessions);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app(app_state)).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/session/:id", get(show_session))
        .route("/outline", post(generate_outline))
        .route("/publish", post(publish_chapter))
        .route("/reset", post(reset_session))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        )
}

async fn index(State(state): State<AppState>) -> Redirect {
    let id = state.sessions.create().await;
    let live = state.sessions.len().await;
    tracing::info!(session = %id, live = live, "New session");
    Redirect::to(&format!("/session/{}", id))
}

async fn show_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Html<String>, AppError> {
    let handle = state.session(id).await?;
    let session = handle.lock().await;
    Ok(Html(utils::html::render_page(id, &session, None)))
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Deserialize)]
struct OutlineForm {
    session: Uuid,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

async fn generate_outline(
    State(state): State<AppState>,
    Form(form): Form<OutlineForm>,
) -> Result<Html<String>, AppError> {
    let handle = state.session(form.session).await?;
    // Held until the step is stored so overlapping requests queue up.
    let mut session = handle.lock().await;

    let next = match workflow::generate(
        session.clone(),
        &form.title,
        &form.description,
        state.model.as_ref(),
        state.bounds,
    )
    .await
    {
        Ok(next) => next,
        Err(e) => with_error(session.clone(), e),
    };
    *session = next;

    Ok(Html(utils::html::render_page(form.session, &session, None)))
}

#[derive(Deserialize)]
struct PublishForm {
    session: Uuid,
    index: usize,
}

async fn publish_chapter(
    State(state): State<AppState>,
    Form(form): Form<PublishForm>,
) -> Result<Html<String>, AppError> {
    let handle = state.session(form.session).await?;
    let mut session = handle.lock().await;

    let (next, report): (Session, Option<PublishReport>) =
        match workflow::publish(session.clone(), form.index, &state.publisher).await {
            Ok((next, report)) => (next, Some(report)),
            Err(e) => (with_error(session.clone(), e), None),
        };
    *session = next;

    Ok(Html(utils::html::render_page(
        form.session,
        &session,
        report.as_ref(),
    )))
}

#[derive(Deserialize)]
struct SessionForm {
    session: Uuid,
}

async fn reset_session(
    State(state): State<AppState>,
    Form(form): Form<SessionForm>,
) -> Result<Redirect, AppError> {
    let handle = state.session(form.session).await?;
    let mut session = handle.lock().await;
    *session = workflow::reset(session.clone());
    Ok(Redirect::to(&format!("/session/{}", form.session)))
}

fn with_error(mut session: Session, error: workflow::WorkflowError) -> Session {
    tracing::warn!(error = %error, "Workflow step refused");
    session.error = Some(error.to_string());
    session
}
