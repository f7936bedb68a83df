use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Repository \"{repo}\" not found. Check the name and ensure it's public.")]
    RepositoryNotFound { repo: RepoId },
    #[error("Rate limited while fetching \"{repo}\". Resets at {reset}. Supply an API token or try again later.")]
    RateLimited { repo: RepoId, reset: RateLimitReset },
    #[error("GitHub is still computing stats for \"{repo}\" after {attempts} attempts. Try again in a moment.")]
    StatsNotReady { repo: RepoId, attempts: u32 },
    #[error("Unexpected response format for \"{repo}\": {reason}")]
    MalformedResponse { repo: RepoId, reason: String },
    #[error("GitHub API error for \"{repo}\": {status} {reason}")]
    UnexpectedStatus { repo: RepoId, status: u16, reason: String },
    #[error("Fetching \"{0}\" was cancelled")]
    Cancelled(RepoId),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Moment the rate limit window resets, `None` when the server did not say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Constructor)]
pub struct RateLimitReset(pub Option<DateTime<Utc>>);

impl Display for RateLimitReset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(reset) => write!(f, "{}", reset.format("%H:%M:%S UTC")),
            None => f.write_str("unknown"),
        }
    }
}

/// Repository identifier in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId {
    owner: String,
    name: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("\"{0}\" is not a repository in owner/name form")]
pub struct InvalidRepoId(pub String);

impl RepoId {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for RepoId {
    type Err = InvalidRepoId;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = value.trim();
        let invalid = || InvalidRepoId(value.to_string());
        let (owner, name) = trimmed.split_once('/').ok_or_else(invalid)?;
        if !is_repo_segment(owner) || !is_repo_segment(name) {
            return Err(invalid());
        }
        Ok(RepoId {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

fn is_repo_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Commit activity of one contributor during the week starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Constructor)]
pub struct Week {
    pub start: DateTime<Utc>,
    pub commits: u32,
}

/// Per-week activity of one contributor, oldest week first.
///
/// All records of a single weekly statistics response share the same week starts.
#[derive(Debug, Clone, PartialEq, Eq, Constructor)]
pub struct WeeklyCommitRecord {
    pub contributor: String,
    pub weeks: Vec<Week>,
}

impl WeeklyCommitRecord {
    /// Start of the first week with at least one commit.
    pub fn first_commit_week(&self) -> Option<DateTime<Utc>> {
        self.weeks.iter().find(|week| week.commits > 0).map(|week| week.start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Constructor)]
pub struct ContributorSummary {
    pub contributor: String,
    pub contributions: u32,
}

/// Why a best-effort enumeration ended before it was complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    #[error("rate limited, resets at {0}")]
    RateLimited(RateLimitReset),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("page limit of {0} reached")]
    PageLimit(u32),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Outcome of a best-effort request which never fails its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Complete(T),
    Partial { value: T, stop: StopReason },
    Failed(StopReason),
}

impl<T> Fetched<T> {
    /// Whatever value was obtained, complete or not.
    pub fn value(self) -> Option<T> {
        match self {
            Fetched::Complete(value) | Fetched::Partial { value, .. } => Some(value),
            Fetched::Failed(_) => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Fetched::Complete(_))
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        match self {
            Fetched::Complete(_) => None,
            Fetched::Partial { stop, .. } | Fetched::Failed(stop) => Some(stop),
        }
    }
}

/// Called with the attempt number before every backoff sleep.
pub type Progress<'a> = &'a (dyn Fn(u32) + Send + Sync);

#[async_trait]
pub trait StatsClient: Send + Sync {
    /// Weekly commit activity of the top contributors, as returned by the server.
    ///
    /// Retries while the server is still computing the statistics.
    async fn weekly_stats(&self, repo: &RepoId, progress: Option<Progress<'_>>) -> Result<Vec<WeeklyCommitRecord>>;

    /// Every contributor with their commit count, page by page.
    async fn all_contributors(&self, repo: &RepoId) -> Fetched<Vec<ContributorSummary>>;

    /// Number of all contributors read from pagination metadata.
    async fn true_total(&self, repo: &RepoId) -> Fetched<u64>;
}

/// Tests

#[test]
fn repo_id_parse_test() {
    let repo: RepoId = " rust-lang/rust.vim ".parse().unwrap();
    assert_eq!(repo.owner(), "rust-lang");
    assert_eq!(repo.name(), "rust.vim");
    assert_eq!(repo.to_string(), "rust-lang/rust.vim");
}

#[test]
fn repo_id_invalid_test() {
    for value in ["", "rust", "/rust", "rust-lang/", "a/b/c", "a b/c", "a/b?c"] {
        assert_eq!(
            value.parse::<RepoId>(),
            Err(InvalidRepoId(value.to_string())),
            "{} should be rejected",
            value
        );
    }
}

#[test]
fn rate_limit_reset_display_test() {
    use chrono::TimeZone;
    let reset = Utc.timestamp_opt(1_700_000_000, 0).single();
    assert_eq!(RateLimitReset(reset).to_string(), "22:13:20 UTC");
    assert_eq!(RateLimitReset(None).to_string(), "unknown");
}

#[test]
fn fetched_value_test() {
    let partial = Fetched::Partial {
        value: 3,
        stop: StopReason::PageLimit(10),
    };
    assert_eq!(partial.stop_reason(), Some(&StopReason::PageLimit(10)));
    assert_eq!(partial.value(), Some(3));
    assert_eq!(Fetched::<u64>::Failed(StopReason::Status(500)).value(), None);
    assert!(Fetched::Complete(1).is_complete());
}
