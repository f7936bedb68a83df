pub mod args;

pub use args::Args;

use contributor_history::api::Result;
use contributor_history::series::{format_elapsed_label, normalize_to_relative_start};
use contributor_history::{HistoryBuilder, HistoryStream, RepoHistory, ShareState};
use github_client::{GithubClientBuilder, RetryPolicy};
use std::fmt::Display;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Repositories being compared and their histories as they complete.
pub struct Comparison {
    pub share: ShareState,
    pub histories: HistoryStream,
}

/// Repositories and flags of the share token, extended by those given directly.
pub fn share_state(args: &Args) -> ShareState {
    let mut share = args.share.as_deref().map(ShareState::decode).unwrap_or_default();
    for repo in &args.repos {
        if !share.repos.contains(repo) {
            share.repos.push(repo.clone());
        }
    }
    share.timeline |= args.timeline;
    share.xkcd |= args.xkcd;
    share
}

pub fn compare(args: Args, cancel: CancellationToken) -> Result<Comparison> {
    let share = share_state(&args);

    let mut client = GithubClientBuilder::default()
        .with_github_url(&args.api_url)
        .with_retry_policy(RetryPolicy::new(
            args.max_attempts,
            Duration::from_millis(args.retry_delay_ms),
        ))
        .with_max_pages(args.max_pages);
    if let Some(token) = args.api_token {
        client = client.try_with_token(token)?;
    }
    let client = client.build()?;

    let builder = HistoryBuilder::new(client, args.reconcile);
    let histories = builder.histories(share.repos.clone(), args.max_parallel, cancel);

    Ok(Comparison { share, histories })
}

/// History printed as a header line and one `date<TAB>contributors` line per week.
pub struct Report<'a> {
    history: &'a RepoHistory,
    timeline: bool,
}

impl<'a> Report<'a> {
    pub fn new(history: &'a RepoHistory, timeline: bool) -> Self {
        Report { history, timeline }
    }
}

impl Display for Report<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.history)?;
        if self.timeline {
            for point in normalize_to_relative_start(&self.history.series) {
                write!(f, "\n{}\t{}", format_elapsed_label(point.date), point.cumulative_contributors)?;
            }
        } else {
            for point in &self.history.series {
                write!(f, "\n{}\t{}", point.date.format("%Y-%m-%d"), point.cumulative_contributors)?;
            }
        }
        Ok(())
    }
}
