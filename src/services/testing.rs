//! In-memory stand-ins for the model and the repository.

use crate::models::RateLimitSnapshot;
use crate::services::github::{ContentsApi, GitHubError};
use crate::services::llm::CompletionModel;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

pub struct FakeModel {
    reply: std::result::Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn replying(text: &str) -> Self {
        FakeModel {
            reply: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        FakeModel {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionModel for FakeModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(anyhow!("{}", message)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RateLimit,
    Get(String),
    Create(String),
}

#[derive(Default)]
struct RepoState {
    files: HashMap<String, String>,
    messages: Vec<String>,
    calls: Vec<Call>,
    rate_limits: VecDeque<u64>,
    fail_next_rate_limit: bool,
    path_failures: HashMap<String, (u16, String)>,
    create_failures: VecDeque<(u16, String)>,
    hidden: HashSet<String>,
}

/// A repository whose contents live in a map.
///
/// Directories exist when some file lives under them.
#[derive(Default)]
pub struct FakeRepo {
    state: Mutex<RepoState>,
}

fn status(status: u16, message: &str) -> GitHubError {
    GitHubError::Status {
        status,
        message: message.to_string(),
    }
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining-quota values returned by successive lookups; 5000 once drained.
    pub fn script_rate_limits(&self, remaining: &[u64]) {
        self.state.lock().unwrap().rate_limits = remaining.iter().copied().collect();
    }

    pub fn fail_next_rate_limit(&self) {
        self.state.lock().unwrap().fail_next_rate_limit = true;
    }

    pub fn fail_path(&self, path: &str, code: u16, message: &str) {
        self.state
            .lock()
            .unwrap()
            .path_failures
            .insert(path.to_string(), (code, message.to_string()));
    }

    pub fn fail_next_create(&self, code: u16, message: &str) {
        self.state
            .lock()
            .unwrap()
            .create_failures
            .push_back((code, message.to_string()));
    }

    pub fn seed_directory(&self) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert("chapters/.gitkeep".to_string(), String::new());
    }

    /// Report `path` as missing, then let another writer claim it just before
    /// our create lands.
    pub fn hide_then_create(&self, path: &str) {
        self.state.lock().unwrap().hidden.insert(path.to_string());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl ContentsApi for FakeRepo {
    async fn rate_limit(&self) -> Result<RateLimitSnapshot, GitHubError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::RateLimit);
        if std::mem::take(&mut state.fail_next_rate_limit) {
            return Err(status(503, "Service Unavailable"));
        }
        let remaining = state.rate_limits.pop_front().unwrap_or(5000);
        Ok(RateLimitSnapshot {
            remaining,
            limit: 5000,
        })
    }

    async fn get_contents(&self, path: &str) -> Result<(), GitHubError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Get(path.to_string()));
        if let Some((code, message)) = state.path_failures.get(path) {
            return Err(status(*code, message));
        }
        if state.hidden.contains(path) {
            return Err(status(404, "Not Found"));
        }
        let prefix = format!("{}/", path);
        if state.files.contains_key(path) || state.files.keys().any(|k| k.starts_with(&prefix)) {
            Ok(())
        } else {
            Err(status(404, "Not Found"))
        }
    }

    async fn create_file(
        &self,
        path: &str,
        message: &str,
        content: &str,
    ) -> Result<(), GitHubError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(path.to_string()));
        if let Some((code, message)) = state.create_failures.pop_front() {
            return Err(status(code, &message));
        }
        if state.hidden.remove(path) {
            state.files.insert(path.to_string(), "theirs".to_string());
        }
        if state.files.contains_key(path) {
            return Err(status(422, "Invalid request.\n\n\"sha\" wasn't supplied."));
        }
        state.files.insert(path.to_string(), content.to_string());
        state.messages.push(message.to_string());
        Ok(())
    }
}
