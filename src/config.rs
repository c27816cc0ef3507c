//! Environment-driven configuration.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file in the working directory.

use anyhow::{Context, Result, bail};
use std::str::FromStr;
use std::time::Duration;

use crate::services::outline::OutlineBounds;
use crate::services::publisher::RetryPolicy;

pub const DEFAULT_REPO: &str = "aatika-hakim/book-generator";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_LLM_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_LLM_MODEL: &str = "llama-3.1-70b-versatile";
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.5;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
pub const DEFAULT_SESSION_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub token: String,
    pub repo: String,
    pub branch: String,
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub github: GitHubConfig,
    pub llm: LlmConfig,
    pub retry: RetryPolicy,
    pub outline: OutlineBounds,
    pub session_ttl: Duration,
    pub session_capacity: usize,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e).context("failed to read .env file"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => bail!("{key} must be set"),
            }
        };
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let github = GitHubConfig {
            token: required("GITHUB_TOKEN")?,
            repo: or_default("GITHUB_REPO", DEFAULT_REPO),
            branch: or_default("GITHUB_BRANCH", DEFAULT_BRANCH),
            api_url: or_default("GITHUB_API_URL", DEFAULT_GITHUB_API_URL),
        };

        let llm = LlmConfig {
            api_key: required("GROQ_API_KEY")?,
            api_url: or_default("LLM_API_URL", DEFAULT_LLM_API_URL),
            model: or_default("LLM_MODEL", DEFAULT_LLM_MODEL),
            temperature: parse_or(&lookup, "LLM_TEMPERATURE", DEFAULT_LLM_TEMPERATURE)?,
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or(&lookup, "PUBLISH_MAX_ATTEMPTS", defaults.max_attempts)?,
            backoff_base: parse_or(&lookup, "PUBLISH_BACKOFF_BASE", defaults.backoff_base)?,
        };
        if retry.max_attempts == 0 {
            bail!("PUBLISH_MAX_ATTEMPTS must be at least 1");
        }

        let bounds = OutlineBounds::default();
        let outline = OutlineBounds {
            min: parse_or(&lookup, "OUTLINE_MIN_CHAPTERS", bounds.min)?,
            max: parse_or(&lookup, "OUTLINE_MAX_CHAPTERS", bounds.max)?,
        };
        if outline.min > outline.max {
            bail!(
                "OUTLINE_MIN_CHAPTERS ({}) exceeds OUTLINE_MAX_CHAPTERS ({})",
                outline.min,
                outline.max
            );
        }

        let session_ttl = Duration::from_secs(parse_or(
            &lookup,
            "SESSION_TTL_SECS",
            DEFAULT_SESSION_TTL_SECS,
        )?);
        let session_capacity = parse_or(&lookup, "SESSION_CAPACITY", DEFAULT_SESSION_CAPACITY)?;
        if session_capacity == 0 {
            bail!("SESSION_CAPACITY must be at least 1");
        }

        Ok(Config {
            github,
            llm,
            retry,
            outline,
            session_ttl,
            session_capacity,
            bind_addr: or_default("BIND_ADDR", DEFAULT_BIND_ADDR),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
