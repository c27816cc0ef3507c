use crate::models::{CHAPTERS_DIR, ChapterRecord, PublishOutcome, PublishReport};
use crate::services::github::{ContentsApi, GitHubError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DIRECTORY_MARKER: &str = ".gitkeep";
const DIRECTORY_MESSAGE: &str = "Create chapters directory";

/// How many times a publish is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Seconds; the wait after attempt `n` (0-based) is `backoff_base^n`.
    pub backoff_base: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 2,
            backoff_base: 2,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_base.saturating_pow(attempt))
    }
}

pub struct ChapterPublisher {
    api: Arc<dyn ContentsApi>,
    policy: RetryPolicy,
}

/// Why an attempt ended without a final outcome.
enum Retry {
    RateLimited,
    Error(GitHubError),
}

impl ChapterPublisher {
    pub fn new(api: Arc<dyn ContentsApi>, policy: RetryPolicy) -> Self {
        ChapterPublisher { api, policy }
    }

    /// Commit `content` as `chapters/<slug>.md` unless that file already exists.
    ///
    /// Never returns an error: every failure ends up as a `PublishOutcome`.
    pub async fn publish_chapter(&self, chapter: &ChapterRecord, content: &str) -> PublishReport {
        let mut report = PublishReport {
            outcome: PublishOutcome::RetriesExhausted,
            notices: Vec::new(),
            rate_limit: None,
        };
        let mut last_retry = None;

        for attempt in 0..self.policy.max_attempts {
            tracing::info!(slug = %chapter.slug, attempt, "Publishing chapter");

            let retry = match self.api.rate_limit().await {
                Ok(snapshot) => {
                    report.notices.push(snapshot.to_string());
                    report.rate_limit = Some(snapshot);
                    if snapshot.is_exhausted() {
                        tracing::warn!(limit = snapshot.limit, "Rate limit exhausted");
                        report
                            .notices
                            .push("Rate limit exceeded. Waiting before retrying.".to_string());
                        Retry::RateLimited
                    } else {
                        match self.attempt(chapter, content, &mut report.notices).await {
                            Ok(outcome) => {
                                report.outcome = outcome;
                                return report;
                            }
                            Err(e) => Retry::Error(e),
                        }
                    }
                }
                Err(e) => Retry::Error(e),
            };

            if let Retry::Error(e) = &retry {
                tracing::warn!(error = %e, attempt, "Publish attempt failed");
                report
                    .notices
                    .push(format!("Error pushing to GitHub: {}", e));
            }
            last_retry = Some(retry);

            if attempt + 1 < self.policy.max_attempts {
                self.backoff(attempt, &mut report.notices).await;
            }
        }

        report.outcome = match last_retry {
            Some(Retry::RateLimited) => PublishOutcome::RateLimited,
            _ => PublishOutcome::RetriesExhausted,
        };
        tracing::warn!(slug = %chapter.slug, outcome = ?report.outcome, "Giving up on chapter");
        report
    }

    /// One pass of directory bootstrap, existence check and create.
    ///
    /// `Ok` carries a final outcome; `Err` means the attempt should be retried.
    async fn attempt(
        &self,
        chapter: &ChapterRecord,
        content: &str,
        notices: &mut Vec<String>,
    ) -> Result<PublishOutcome, GitHubError> {
        self.ensure_directory(notices).await?;

        let path = chapter.path();
        match self.api.get_contents(&path).await {
            Ok(()) => {
                tracing::info!(path = %path, "Chapter already exists");
                notices.push(format!(
                    "File '{}' already exists. Please use a different name.",
                    chapter.file_name()
                ));
                Ok(PublishOutcome::AlreadyExists {
                    slug: chapter.slug.clone(),
                })
            }
            Err(e) if e.is_not_found() => {
                notices.push(format!("Creating file: {}", path));
                let message = format!("Add {}", chapter.slug);
                match self.api.create_file(&path, &message, content).await {
                    Ok(()) => {
                        tracing::info!(path = %path, "Chapter published");
                        Ok(PublishOutcome::Published {
                            slug: chapter.slug.clone(),
                        })
                    }
                    // Someone created it between our check and the write.
                    Err(e) if e.is_existing_file() => {
                        tracing::info!(path = %path, "Chapter appeared before create");
                        Ok(PublishOutcome::AlreadyExists {
                            slug: chapter.slug.clone(),
                        })
                    }
                    Err(e) => Err(e),
                }
            }
            Err(GitHubError::Status { status, message }) => {
                tracing::warn!(path = %path, status, "Existence check failed");
                Ok(PublishOutcome::Failed { message, status })
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_directory(&self, notices: &mut Vec<String>) -> Result<(), GitHubError> {
        match self.api.get_contents(CHAPTERS_DIR).await {
            Ok(()) => {
                notices.push("Chapters directory exists.".to_string());
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::info!("Chapters directory not found, creating it");
                notices.push("Chapters directory not found. Creating it.".to_string());
                let marker = format!("{}/{}", CHAPTERS_DIR, DIRECTORY_MARKER);
                match self.api.create_file(&marker, DIRECTORY_MESSAGE, "").await {
                    Ok(()) => {}
                    Err(e) if e.is_existing_file() => {}
                    Err(e) => return Err(e),
                }
                notices.push("Chapters directory created.".to_string());
                Ok(())
            }
            // Only a missing directory needs work; the file check decides the rest.
            Err(GitHubError::Status { status, message }) => {
                tracing::warn!(status, message = %message, "Could not read chapters directory");
                notices.push(format!(
                    "Could not read chapters directory: {} (Status: {})",
                    message, status
                ));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn backoff(&self, attempt: u32, notices: &mut Vec<String>) {
        let delay = self.policy.delay(attempt);
        tracing::info!(seconds = delay.as_secs(), "Backing off");
        notices.push(format!(
            "Waiting {} seconds before retrying...",
            delay.as_secs()
        ));
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{Call, FakeRepo};
    use tokio::time::Instant;

    fn publisher(repo: &Arc<FakeRepo>, max_attempts: u32) -> ChapterPublisher {
        ChapterPublisher::new(
            repo.clone(),
            RetryPolicy {
                max_attempts,
                backoff_base: 2,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_once_then_conflicts() {
        let repo = Arc::new(FakeRepo::new());
        let publisher = publisher(&repo, 2);
        let chapter = ChapterRecord::from_title("Chapter One: Beginnings");

        let first = publisher.publish_chapter(&chapter, "# body").await;
        assert_eq!(
            first.outcome,
            PublishOutcome::Published {
                slug: "Chapter_One:_Beginnings".to_string()
            }
        );
        assert_eq!(
            repo.file("chapters/Chapter_One:_Beginnings.md").as_deref(),
            Some("# body")
        );
        assert_eq!(
            repo.commit_messages(),
            vec!["Create chapters directory", "Add Chapter_One:_Beginnings"]
        );

        let writes_before = repo.writes();
        let second = publisher.publish_chapter(&chapter, "# other").await;
        assert_eq!(
            second.outcome,
            PublishOutcome::AlreadyExists {
                slug: "Chapter_One:_Beginnings".to_string()
            }
        );
        assert_eq!(repo.writes(), writes_before);
        assert_eq!(
            repo.file("chapters/Chapter_One:_Beginnings.md").as_deref(),
            Some("# body")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_quota_skips_repository_and_backs_off() {
        let repo = Arc::new(FakeRepo::new());
        repo.script_rate_limits(&[0, 10]);
        let publisher = publisher(&repo, 2);
        let chapter = ChapterRecord::from_title("Intro");

        let started = Instant::now();
        let report = publisher.publish_chapter(&chapter, "body").await;

        assert!(report.outcome.is_success());
        assert!(started.elapsed() >= Duration::from_secs(1));
        // Nothing but the quota lookup happened before the first wait.
        let calls = repo.calls();
        assert_eq!(calls[0], Call::RateLimit);
        assert_eq!(calls[1], Call::RateLimit);
        assert!(report
            .notices
            .contains(&"Waiting 1 seconds before retrying...".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_grow_exponentially() {
        let repo = Arc::new(FakeRepo::new());
        repo.script_rate_limits(&[0, 0, 0, 5]);
        let publisher = publisher(&repo, 4);

        let started = Instant::now();
        let report = publisher
            .publish_chapter(&ChapterRecord::from_title("Intro"), "body")
            .await;

        assert!(report.outcome.is_success());
        // 2^0 + 2^1 + 2^2
        assert!(started.elapsed() >= Duration::from_secs(7));
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn quota_never_recovers() {
        let repo = Arc::new(FakeRepo::new());
        repo.script_rate_limits(&[0, 0]);
        let publisher = publisher(&repo, 2);

        let report = publisher
            .publish_chapter(&ChapterRecord::from_title("Intro"), "body")
            .await;

        assert_eq!(report.outcome, PublishOutcome::RateLimited);
        assert_eq!(repo.calls(), vec![Call::RateLimit, Call::RateLimit]);
        assert_eq!(report.rate_limit.map(|s| s.remaining), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_errors_exhaust_retries() {
        let repo = Arc::new(FakeRepo::new());
        repo.seed_directory();
        repo.fail_next_create(500, "Server Error");
        repo.fail_next_create(500, "Server Error");
        let publisher = publisher(&repo, 2);

        let report = publisher
            .publish_chapter(&ChapterRecord::from_title("Intro"), "body")
            .await;

        assert_eq!(report.outcome, PublishOutcome::RetriesExhausted);
        assert_eq!(
            report.outcome.message(),
            "Failed to push after several retries."
        );
        assert_eq!(repo.writes(), 0);
        assert!(repo.file("chapters/Intro.md").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn directory_read_error_still_publishes() {
        let repo = Arc::new(FakeRepo::new());
        repo.fail_path("chapters", 500, "Server Error");
        let publisher = publisher(&repo, 2);

        let started = Instant::now();
        let report = publisher
            .publish_chapter(&ChapterRecord::from_title("Intro"), "body")
            .await;

        assert_eq!(
            report.outcome,
            PublishOutcome::Published {
                slug: "Intro".to_string()
            }
        );
        assert_eq!(
            repo.calls(),
            vec![
                Call::RateLimit,
                Call::Get("chapters".to_string()),
                Call::Get("chapters/Intro.md".to_string()),
                Call::Create("chapters/Intro.md".to_string()),
            ]
        );
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(report
            .notices
            .contains(&"Could not read chapters directory: Server Error (Status: 500)".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn create_failures_are_retried() {
        let repo = Arc::new(FakeRepo::new());
        repo.seed_directory();
        repo.fail_next_create(502, "Bad Gateway");
        let publisher = publisher(&repo, 2);

        let report = publisher
            .publish_chapter(&ChapterRecord::from_title("Intro"), "body")
            .await;

        assert!(report.outcome.is_success());
        assert_eq!(repo.file("chapters/Intro.md").as_deref(), Some("body"));
    }

    #[tokio::test(start_paused = true)]
    async fn existence_check_error_is_not_retried() {
        let repo = Arc::new(FakeRepo::new());
        repo.seed_directory();
        repo.fail_path("chapters/Intro.md", 403, "Resource not accessible");
        let publisher = publisher(&repo, 3);

        let started = Instant::now();
        let report = publisher
            .publish_chapter(&ChapterRecord::from_title("Intro"), "body")
            .await;

        assert_eq!(
            report.outcome.message(),
            "Error checking file existence: Resource not accessible (Status: 403)"
        );
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(
            repo.calls()
                .iter()
                .filter(|c| **c == Call::RateLimit)
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn directory_marker_created_only_once() {
        let repo = Arc::new(FakeRepo::new());
        let publisher = publisher(&repo, 2);

        publisher
            .publish_chapter(&ChapterRecord::from_title("One"), "1")
            .await;
        publisher
            .publish_chapter(&ChapterRecord::from_title("Two"), "2")
            .await;

        let marker_writes = repo
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Create(p) if p == "chapters/.gitkeep"))
            .count();
        assert_eq!(marker_writes, 1);
        assert!(repo.file("chapters/Two.md").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_writer_reported_as_conflict() {
        let repo = Arc::new(FakeRepo::new());
        repo.seed_directory();
        repo.hide_then_create("chapters/Intro.md");
        let publisher = publisher(&repo, 2);

        let report = publisher
            .publish_chapter(&ChapterRecord::from_title("Intro"), "mine")
            .await;

        assert_eq!(
            report.outcome,
            PublishOutcome::AlreadyExists {
                slug: "Intro".to_string()
            }
        );
        assert_eq!(repo.file("chapters/Intro.md").as_deref(), Some("theirs"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_lookup_failure_is_transient() {
        let repo = Arc::new(FakeRepo::new());
        repo.fail_next_rate_limit();
        let publisher = publisher(&repo, 2);

        let report = publisher
            .publish_chapter(&ChapterRecord::from_title("Intro"), "body")
            .await;

        assert!(report.outcome.is_success());
    }

    #[test]
    fn delay_uses_configured_base() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_base: 3,
        };
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(9));
    }
}
