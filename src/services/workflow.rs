//! Workflow steps over an explicit `Session` value.
//!
//! Each step takes the current session and hands back the next one; callers
//! decide where sessions live between user actions.

use crate::models::{ChapterRecord, ChapterResult, PublishReport, Session, WorkflowStage};
use crate::services::llm::CompletionModel;
use crate::services::outline::{self, OutlineBounds, OutlineError};
use crate::services::publisher::ChapterPublisher;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Please provide both title and description.")]
    MissingInput,
    #[error("Cannot move from '{from}' to '{to}'.")]
    InvalidTransition {
        from: WorkflowStage,
        to: WorkflowStage,
    },
    #[error("No chapter at position {0}.")]
    UnknownChapter(usize),
    #[error(transparent)]
    Outline(#[from] OutlineError),
    #[error("Failed to generate table of contents: {0:#}")]
    Generation(anyhow::Error),
}

fn transition(session: &mut Session, to: WorkflowStage) -> Result<(), WorkflowError> {
    if !session.stage.can_transition_to(to) {
        return Err(WorkflowError::InvalidTransition {
            from: session.stage,
            to,
        });
    }
    tracing::debug!(from = %session.stage, to = %to, "Stage transition");
    session.stage = to;
    Ok(())
}

/// Ask the model for an outline and, if it validates, offer it for publishing.
///
/// On a model or validation failure the returned session stays in
/// `AwaitingInput` with the problem recorded in `error`.
pub async fn generate(
    mut session: Session,
    title: &str,
    description: &str,
    model: &dyn CompletionModel,
    bounds: OutlineBounds,
) -> Result<Session, WorkflowError> {
    if session.stage != WorkflowStage::AwaitingInput {
        return Err(WorkflowError::InvalidTransition {
            from: session.stage,
            to: WorkflowStage::OutlineReady,
        });
    }

    let title = title.trim();
    let description = description.trim();
    session.title = title.to_string();
    session.description = description.to_string();
    if title.is_empty() || description.is_empty() {
        session.error = Some(WorkflowError::MissingInput.to_string());
        return Ok(session);
    }

    let result = match outline::generate_outline(model, title, description).await {
        Ok(chapters) => outline::validate_outline(&chapters, bounds)
            .map(|()| chapters)
            .map_err(WorkflowError::from),
        Err(e) => Err(WorkflowError::Generation(e)),
    };

    match result {
        Ok(chapters) => {
            transition(&mut session, WorkflowStage::OutlineReady)?;
            session.chapters = chapters;
            session.results.clear();
            session.error = None;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Outline rejected");
            session.chapters.clear();
            session.error = Some(e.to_string());
        }
    }
    Ok(session)
}

/// Publish the chapter at `index` of the session's outline.
pub async fn publish(
    mut session: Session,
    index: usize,
    publisher: &ChapterPublisher,
) -> Result<(Session, PublishReport), WorkflowError> {
    let title = session
        .chapters
        .get(index)
        .cloned()
        .ok_or(WorkflowError::UnknownChapter(index))?;
    transition(&mut session, WorkflowStage::Publishing)?;

    let record = ChapterRecord::from_title(&title);
    let report = publisher
        .publish_chapter(&record, &record.placeholder_body())
        .await;
    if report.outcome.is_success() {
        tracing::info!(chapter = %title, "Chapter published");
    } else {
        tracing::warn!(chapter = %title, outcome = %report.outcome.message(), "Chapter not published");
    }

    session.results.push(ChapterResult {
        index,
        title,
        report: report.clone(),
    });
    session.error = None;
    Ok((session, report))
}

/// Drop the outline and start over.
pub fn reset(mut session: Session) -> Session {
    tracing::debug!(from = %session.stage, "Resetting session");
    session.stage = WorkflowStage::AwaitingInput;
    session.chapters.clear();
    session.results.clear();
    session.error = None;
    session
}
