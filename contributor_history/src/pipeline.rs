use crate::api::{Error, Fetched, Progress, RepoId, Result, StatsClient};
use crate::series::{self, Reconciliation, Series};
use derive_more::Constructor;
use futures::future::try_join3;
use futures::{stream, Stream, StreamExt};
use log::{debug, error, info, warn};
use std::fmt::Display;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Contributor growth of one repository.
#[derive(Debug, Clone, PartialEq, Constructor)]
pub struct RepoHistory {
    pub repo: RepoId,
    pub series: Series,
    /// True total when known, otherwise the capped count.
    pub total_contributors: u64,
}

impl Display for RepoHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "repo: {}\tcontributors: {}\tweeks: {}",
            self.repo,
            self.total_contributors,
            self.series.len()
        ))
    }
}

pub type HistoryStream = Pin<Box<dyn Stream<Item = (RepoId, Result<RepoHistory>)> + Send>>;

pub struct HistoryBuilder<CLIENT>
where
    CLIENT: StatsClient,
{
    client: Arc<CLIENT>,
    reconciliation: Reconciliation,
}

impl<CLIENT> Clone for HistoryBuilder<CLIENT>
where
    CLIENT: StatsClient,
{
    fn clone(&self) -> Self {
        HistoryBuilder {
            client: self.client.clone(),
            reconciliation: self.reconciliation,
        }
    }
}

impl<CLIENT> HistoryBuilder<CLIENT>
where
    CLIENT: 'static + StatsClient,
{
    pub fn new(client: CLIENT, reconciliation: Reconciliation) -> Self {
        HistoryBuilder {
            client: Arc::new(client),
            reconciliation,
        }
    }

    /// Builds histories of all `repos`, at most `max_parallel` at a time, in the order of `repos`.
    ///
    /// A failing repository is reported with its error and never stops the others.
    pub fn histories(&self, repos: Vec<RepoId>, max_parallel: usize, cancel: CancellationToken) -> HistoryStream {
        let builder = self.clone();
        stream::iter(repos)
            .map(move |repo| builder.spawn(repo, cancel.child_token()))
            .map(|task| async move {
                let repo = task.repo.clone();
                (repo, task.join().await)
            })
            .buffered(max_parallel.max(1))
            .boxed()
    }

    /// Starts building a history in the background. Cancelling `cancel` or dropping the task abandons it.
    pub fn spawn(&self, repo: RepoId, cancel: CancellationToken) -> RepoTask {
        let builder = self.clone();
        let task_repo = repo.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let progress_repo = task_repo.clone();
            let log_progress = move |attempt: u32| {
                info!("Stats of {} not ready yet, attempt {}", progress_repo, attempt);
            };
            let progress: Progress<'_> = &log_progress;
            tokio::select! {
                biased;
                _ = task_cancel.cancelled() => Err(Error::Cancelled(task_repo.clone())),
                history = builder.repo_history(&task_repo, Some(progress)) => history,
            }
        });
        RepoTask {
            repo,
            abandon: cancel.clone().drop_guard(),
            cancel,
            handle,
        }
    }

    /// Fetches the three statistics of `repo` concurrently and reconciles them into one series.
    ///
    /// A failure of the weekly statistics drops the other two fetches.
    pub async fn repo_history(&self, repo: &RepoId, progress: Option<Progress<'_>>) -> Result<RepoHistory> {
        let (stats, contributors, true_total) = try_join3(
            self.client.weekly_stats(repo, progress),
            async { Ok::<_, Error>(self.client.all_contributors(repo).await) },
            async { Ok::<_, Error>(self.client.true_total(repo).await) },
        )
        .await?;
        log_degraded(repo, "contributor listing", &contributors);
        log_degraded(repo, "contributor count", &true_total);
        let contributors = contributors.value().unwrap_or_default();
        let true_total = true_total.value();

        let capped = series::to_cumulative_series(&stats);
        let series = self.reconciliation.apply(&capped, &contributors, true_total);
        let total_contributors = true_total.unwrap_or(stats.len() as u64);
        debug!(
            "{}: {} weekly records, {} listed contributors, total {}",
            repo,
            stats.len(),
            contributors.len(),
            total_contributors
        );
        Ok(RepoHistory::new(repo.clone(), series, total_contributors))
    }
}

/// History being built in the background.
pub struct RepoTask {
    pub repo: RepoId,
    cancel: CancellationToken,
    abandon: DropGuard,
    handle: JoinHandle<Result<RepoHistory>>,
}

impl RepoTask {
    pub fn cancel(&self) {
        debug!("Cancelling {}", self.repo);
        self.cancel.cancel();
    }

    pub async fn join(self) -> Result<RepoHistory> {
        let RepoTask {
            repo,
            cancel: _,
            abandon,
            handle,
        } = self;
        let joined = handle.await;
        abandon.disarm();
        match joined {
            Ok(history) => history,
            Err(err) => {
                error!("Failed to build history of {}: {}", repo, err);
                Err(Error::Other(err.into()))
            }
        }
    }
}

fn log_degraded<T>(repo: &RepoId, what: &str, fetched: &Fetched<T>) {
    if let Some(stop) = fetched.stop_reason() {
        warn!("Incomplete {} of {}: {}", what, repo, stop);
    }
}

/// Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ContributorSummary, StopReason, Week, WeeklyCommitRecord};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    struct FakeClient {
        stats: Vec<WeeklyCommitRecord>,
        listed: usize,
        true_total: Option<u64>,
    }

    #[async_trait]
    impl StatsClient for FakeClient {
        async fn weekly_stats(&self, repo: &RepoId, progress: Option<Progress<'_>>) -> Result<Vec<WeeklyCommitRecord>> {
            match repo.owner() {
                "missing" => Err(Error::RepositoryNotFound { repo: repo.clone() }),
                "slow" => {
                    if let Some(progress) = progress {
                        progress(1);
                    }
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
                _ => Ok(self.stats.clone()),
            }
        }

        async fn all_contributors(&self, repo: &RepoId) -> Fetched<Vec<ContributorSummary>> {
            if repo.owner() == "missing" {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            let listed = (0..self.listed).map(|i| ContributorSummary::new(format!("c{}", i), 1)).collect();
            Fetched::Partial {
                value: listed,
                stop: StopReason::PageLimit(1),
            }
        }

        async fn true_total(&self, repo: &RepoId) -> Fetched<u64> {
            if repo.owner() == "missing" {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            match self.true_total {
                Some(total) => Fetched::Complete(total),
                None => Fetched::Failed(StopReason::Status(500)),
            }
        }
    }

    fn record(name: &str, commits: &[u32]) -> WeeklyCommitRecord {
        let weeks = commits
            .iter()
            .enumerate()
            .map(|(index, commits)| Week::new(Utc.timestamp_opt(index as i64 * 604_800, 0).unwrap(), *commits))
            .collect();
        WeeklyCommitRecord::new(name.to_string(), weeks)
    }

    fn builder(listed: usize, true_total: Option<u64>) -> HistoryBuilder<FakeClient> {
        let stats = vec![record("a", &[1, 0, 0]), record("b", &[0, 1, 0]), record("c", &[0, 0, 1])];
        HistoryBuilder::new(
            FakeClient {
                stats,
                listed,
                true_total,
            },
            Reconciliation::Proportional,
        )
    }

    fn counts(history: &RepoHistory) -> Vec<u64> {
        history.series.iter().map(|point| point.cumulative_contributors).collect()
    }

    #[tokio::test]
    async fn history_reconciled_with_true_total_test() {
        let history = builder(0, Some(7)).repo_history(&"o/r".parse().unwrap(), None).await.unwrap();
        assert_eq!(counts(&history), vec![1, 4, 7]);
        assert_eq!(history.total_contributors, 7);
    }

    #[tokio::test]
    async fn history_without_true_total_keeps_capped_counts_test() {
        let repo: RepoId = "o/r".parse().unwrap();
        let history = builder(5, None).repo_history(&repo, None).await.unwrap();
        assert_eq!(counts(&history), vec![1, 2, 3]);
        assert_eq!(history.total_contributors, 3);

        let history = builder(0, None).repo_history(&repo, None).await.unwrap();
        assert_eq!(counts(&history), vec![1, 2, 3]);
        assert_eq!(history.total_contributors, 3);
    }

    #[tokio::test]
    async fn weekly_stats_failure_drops_other_fetches_test() {
        let history = tokio::time::timeout(
            Duration::from_secs(5),
            builder(0, Some(3)).repo_history(&"missing/r".parse().unwrap(), None),
        )
        .await
        .unwrap();
        assert!(matches!(history, Err(Error::RepositoryNotFound { .. })));
    }

    #[tokio::test]
    async fn failing_repo_does_not_stop_others_test() {
        let repos: Vec<RepoId> = vec!["missing/r".parse().unwrap(), "o/r".parse().unwrap()];
        let results: Vec<_> = builder(0, Some(3))
            .histories(repos.clone(), 2, CancellationToken::new())
            .collect()
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, repos[0]);
        assert!(matches!(results[0].1, Err(Error::RepositoryNotFound { .. })));
        assert_eq!(results[1].1.as_ref().unwrap().total_contributors, 3);
    }

    #[tokio::test]
    async fn cancelled_task_test() {
        let task = builder(0, Some(3)).spawn("slow/r".parse().unwrap(), CancellationToken::new());
        task.cancel();
        assert!(matches!(task.join().await, Err(Error::Cancelled(_))));
    }

    #[tokio::test]
    async fn dropped_task_is_cancelled_test() {
        let cancel = CancellationToken::new();
        let task = builder(0, Some(3)).spawn("slow/r".parse().unwrap(), cancel.clone());
        drop(task);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn joined_task_is_not_cancelled_test() {
        let cancel = CancellationToken::new();
        let task = builder(0, Some(3)).spawn("o/r".parse().unwrap(), cancel.clone());
        assert!(task.join().await.is_ok());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_stream_test() {
        let cancel = CancellationToken::new();
        let stream = builder(0, Some(3)).histories(vec!["slow/r".parse().unwrap()], 1, cancel.clone());
        cancel.cancel();
        let results: Vec<_> = stream.collect().await;
        assert!(matches!(results[0].1, Err(Error::Cancelled(_))));
    }
}
