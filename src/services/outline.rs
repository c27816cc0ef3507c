use crate::models::slugify;
use crate::services::llm::CompletionModel;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineBounds {
    pub min: usize,
    pub max: usize,
}

impl Default for OutlineBounds {
    fn default() -> Self {
        OutlineBounds { min: 1, max: 50 }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutlineError {
    #[error("The model returned an empty table of contents.")]
    Empty,
    #[error("The table of contents has {count} chapters; at least {min} are required.")]
    TooFew { count: usize, min: usize },
    #[error("The table of contents has {count} chapters; at most {max} are allowed.")]
    TooMany { count: usize, max: usize },
    #[error("'{first}' and '{second}' would both be saved as '{slug}.md'.")]
    Duplicate {
        first: String,
        second: String,
        slug: String,
    },
}

pub fn build_prompt(title: &str, description: &str) -> String {
    format!(
        "Generate a table of contents for a book titled '{}' with description '{}'.",
        title, description
    )
}

/// Ask the model for a table of contents and split it into chapter titles.
///
/// Transport and API failures are returned to the caller as-is; nothing here
/// retries.
pub async fn generate_outline(
    model: &dyn CompletionModel,
    title: &str,
    description: &str,
) -> Result<Vec<String>> {
    let prompt = build_prompt(title, description);
    let response = model.complete(&prompt).await?;
    let chapters = split_outline(&response);
    tracing::info!(chapters = chapters.len(), "Outline generated");
    Ok(chapters)
}

pub fn split_outline(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reject outlines that should never be offered for publishing.
pub fn validate_outline(chapters: &[String], bounds: OutlineBounds) -> Result<(), OutlineError> {
    let count = chapters.len();
    if count == 0 {
        return Err(OutlineError::Empty);
    }
    if count < bounds.min {
        return Err(OutlineError::TooFew {
            count,
            min: bounds.min,
        });
    }
    if count > bounds.max {
        return Err(OutlineError::TooMany {
            count,
            max: bounds.max,
        });
    }

    // Titles collide when their slugs do, since the slug is the remote path.
    let mut seen: HashMap<String, &str> = HashMap::new();
    for chapter in chapters {
        let slug = slugify(chapter);
        if let Some(first) = seen.get(&slug) {
            return Err(OutlineError::Duplicate {
                first: first.to_string(),
                second: chapter.clone(),
                slug,
            });
        }
        seen.insert(slug, chapter.as_str());
    }

    Ok(())
}
