use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote directory that holds one markdown file per chapter.
pub const CHAPTERS_DIR: &str = "chapters";

/// A chapter title paired with the file slug derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub title: String,
    pub slug: String,
}

impl ChapterRecord {
    pub fn from_title(title: &str) -> Self {
        ChapterRecord {
            title: title.to_string(),
            slug: slugify(title),
        }
    }

    /// Path of the chapter file inside the target repository.
    pub fn path(&self) -> String {
        format!("{}/{}.md", CHAPTERS_DIR, self.slug)
    }

    pub fn file_name(&self) -> String {
        format!("{}.md", self.slug)
    }

    /// Placeholder body committed for a freshly published chapter.
    pub fn placeholder_body(&self) -> String {
        format!("# {}\n\nGenerated content for {}.", self.title, self.title)
    }
}

/// Spaces become underscores. Nothing else is touched.
pub fn slugify(title: &str) -> String {
    title.replace(' ', "_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub remaining: u64,
    pub limit: u64,
}

impl RateLimitSnapshot {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

impl fmt::Display for RateLimitSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rate limit: {}/{} remaining.", self.remaining, self.limit)
    }
}

/// Terminal result of one publish call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PublishOutcome {
    Published { slug: String },
    AlreadyExists { slug: String },
    RateLimited,
    Failed { message: String, status: u16 },
    RetriesExhausted,
}

impl PublishOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PublishOutcome::Published { .. })
    }

    /// Human-readable message shown inline in the page.
    pub fn message(&self) -> String {
        match self {
            PublishOutcome::Published { slug } => {
                format!("Successfully pushed '{}' to GitHub.", slug)
            }
            PublishOutcome::AlreadyExists { slug } => {
                format!("File '{}.md' already exists.", slug)
            }
            PublishOutcome::RateLimited => {
                "Rate limit exceeded. Please try again later.".to_string()
            }
            PublishOutcome::Failed { message, status } => {
                format!(
                    "Error checking file existence: {} (Status: {})",
                    message, status
                )
            }
            PublishOutcome::RetriesExhausted => "Failed to push after several retries.".to_string(),
        }
    }
}

/// What a publish call did, in the order it happened.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub outcome: PublishOutcome,
    pub notices: Vec<String>,
    pub rate_limit: Option<RateLimitSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStage {
    AwaitingInput,
    OutlineReady,
    Publishing,
}

impl WorkflowStage {
    /// Forward edges are awaiting-input -> outline-ready -> publishing.
    /// Publishing loops on itself and any stage may go back to the start.
    pub fn can_transition_to(self, next: WorkflowStage) -> bool {
        use WorkflowStage::*;
        matches!(
            (self, next),
            (AwaitingInput, OutlineReady)
                | (OutlineReady, Publishing)
                | (Publishing, Publishing)
                | (_, AwaitingInput)
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            WorkflowStage::AwaitingInput => "Waiting for user input",
            WorkflowStage::OutlineReady => "Table of Contents generated",
            WorkflowStage::Publishing => "Publishing chapters",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of pushing one chapter, kept for display.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterResult {
    pub index: usize,
    pub title: String,
    pub report: PublishReport,
}

/// Everything the interface needs to carry between user actions.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub stage: WorkflowStage,
    pub title: String,
    pub description: String,
    pub chapters: Vec<String>,
    pub results: Vec<ChapterResult>,
    /// Last problem reported to the user, cleared by the next successful step.
    pub error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            stage: WorkflowStage::AwaitingInput,
            title: String::new(),
            description: String::new(),
            chapters: Vec::new(),
            results: Vec::new(),
            error: None,
        }
    }
}
