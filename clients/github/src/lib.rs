//! GitHub REST client for contributor statistics.

mod builder;
mod pagination;
mod payload;
mod rate_limit;
pub mod retry;

pub use builder::{GithubClientBuilder, DEFAULT_GITHUB_URL, DEFAULT_MAX_PAGES, MAX_CONTRIBUTORS_PAGE};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};

use crate::pagination::{last_page, Page, Paginator};
use crate::payload::ContributorStatsBody;
use crate::retry::{RetryEvent, RetryState};
use anyhow::Context;
use async_trait::async_trait;
use contributor_history::api::{
    ContributorSummary, Error, Fetched, Progress, RepoId, Result, StatsClient, StopReason, WeeklyCommitRecord,
};
use log::{debug, info, warn};
use reqwest::header::LINK;
use reqwest::{Client, Response, StatusCode};
use serde::de::IgnoredAny;
use std::sync::Arc;

pub struct GithubClient {
    client: Client,
    github_url: String,
    retry: RetryPolicy,
    page_size: u32,
    max_pages: u32,
    sleeper: Arc<dyn Sleeper>,
}

enum StatsPoll {
    Ready(Vec<WeeklyCommitRecord>),
    Computing,
}

impl GithubClient {
    fn repo_url(&self, repo: &RepoId, resource: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.github_url, repo.owner(), repo.name(), resource)
    }

    /// One request for weekly statistics.
    async fn poll_weekly_stats(&self, repo: &RepoId) -> Result<StatsPoll> {
        let request_url = self.repo_url(repo, "stats/contributors");
        debug!("GET {}", request_url);
        let response = self
            .client
            .get(request_url)
            .send()
            .await
            .with_context(|| format!("Failed to request stats of {}", repo))?;
        rate_limit::log_quota(response.headers());
        match response.status() {
            StatusCode::OK => {}
            StatusCode::ACCEPTED => return Ok(StatsPoll::Computing),
            // repository without commits
            StatusCode::NO_CONTENT => return Ok(StatsPoll::Ready(Vec::new())),
            StatusCode::NOT_FOUND => return Err(Error::RepositoryNotFound { repo: repo.clone() }),
            status if rate_limit::is_rate_limited(status, response.headers()) => {
                return Err(Error::RateLimited {
                    repo: repo.clone(),
                    reset: rate_limit::reset_time(response.headers()),
                })
            }
            status => {
                return Err(Error::UnexpectedStatus {
                    repo: repo.clone(),
                    status: status.as_u16(),
                    reason: status.canonical_reason().unwrap_or_default().to_string(),
                })
            }
        }
        let malformed = |reason: String| Error::MalformedResponse {
            repo: repo.clone(),
            reason,
        };
        match response.json::<ContributorStatsBody>().await {
            Ok(ContributorStatsBody::Ready(stats)) => stats
                .into_iter()
                .map(WeeklyCommitRecord::try_from)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(StatsPoll::Ready)
                .map_err(malformed),
            Ok(ContributorStatsBody::Object(object)) if object.is_empty() => Ok(StatsPoll::Computing),
            Ok(ContributorStatsBody::Object(_)) => Err(malformed("object instead of an array".to_string())),
            Err(err) if err.is_decode() => Err(malformed(err.to_string())),
            Err(err) => Err(anyhow::Error::from(err)
                .context(format!("Failed to read stats of {}", repo))
                .into()),
        }
    }

    async fn contributors_page(&self, request_url: &str, page: &Page) -> std::result::Result<Vec<ContributorSummary>, StopReason> {
        debug!("GET {} page {}", request_url, page.page_no);
        let response = self
            .client
            .get(request_url)
            .query(&[
                ("anon", "true".to_string()),
                ("per_page", page.page_size.to_string()),
                ("page", page.page_no.to_string()),
            ])
            .send()
            .await
            .map_err(|err| StopReason::Transport(err.to_string()))?;
        rate_limit::log_quota(response.headers());
        match response.status() {
            StatusCode::OK => response
                .json::<Vec<payload::Contributor>>()
                .await
                .map(|contributors| contributors.into_iter().map(ContributorSummary::from).collect())
                .map_err(|err| StopReason::Malformed(err.to_string())),
            StatusCode::NO_CONTENT => Ok(Vec::new()),
            _ => Err(stop_reason(&response)),
        }
    }

    async fn count_contributors(&self, repo: &RepoId) -> std::result::Result<u64, StopReason> {
        let request_url = self.repo_url(repo, "contributors");
        debug!("GET {} for total count", request_url);
        let response = self
            .client
            .get(request_url)
            .query(&[("anon", "true"), ("per_page", "1")])
            .send()
            .await
            .map_err(|err| StopReason::Transport(err.to_string()))?;
        rate_limit::log_quota(response.headers());
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NO_CONTENT => return Ok(0),
            _ => return Err(stop_reason(&response)),
        }
        let link = response
            .headers()
            .get(LINK)
            .map(|link| link.to_str().map(str::to_owned))
            .transpose()
            .map_err(|err| StopReason::Malformed(err.to_string()))?;
        match link {
            Some(link) => last_page(&link).ok_or_else(|| StopReason::Malformed(format!("no last page in link {}", link))),
            // single page
            None => response
                .json::<Vec<IgnoredAny>>()
                .await
                .map(|contributors| contributors.len() as u64)
                .map_err(|err| StopReason::Malformed(err.to_string())),
        }
    }
}

fn stop_reason(response: &Response) -> StopReason {
    let status = response.status();
    if rate_limit::is_rate_limited(status, response.headers()) {
        StopReason::RateLimited(rate_limit::reset_time(response.headers()))
    } else {
        StopReason::Status(status.as_u16())
    }
}

#[async_trait]
impl StatsClient for GithubClient {
    async fn weekly_stats(&self, repo: &RepoId, progress: Option<Progress<'_>>) -> Result<Vec<WeeklyCommitRecord>> {
        let mut state = RetryState::start();
        loop {
            state = match state {
                RetryState::Requesting { attempt } => {
                    debug!("Requesting stats of {}, attempt {}", repo, attempt);
                    let event = match self.poll_weekly_stats(repo).await? {
                        StatsPoll::Ready(records) => RetryEvent::Ready(records),
                        StatsPoll::Computing => RetryEvent::NotReady,
                    };
                    RetryState::Requesting { attempt }.next(event, &self.retry)
                }
                RetryState::Backoff { attempt, delay } => {
                    if let Some(progress) = progress {
                        progress(attempt);
                    }
                    info!("Stats of {} are being computed, retrying in {} ms", repo, delay.as_millis());
                    self.sleeper.sleep(delay).await;
                    RetryState::Backoff { attempt, delay }.next(RetryEvent::Slept, &self.retry)
                }
                RetryState::Succeeded(records) => {
                    debug!("Got stats of {} contributors of {}", records.len(), repo);
                    return Ok(records);
                }
                RetryState::Exhausted { attempts } => {
                    return Err(Error::StatsNotReady {
                        repo: repo.clone(),
                        attempts,
                    })
                }
            };
        }
    }

    async fn all_contributors(&self, repo: &RepoId) -> Fetched<Vec<ContributorSummary>> {
        let request_url = self.repo_url(repo, "contributors");
        let mut paginator = Paginator::new(self.page_size, self.max_pages);
        let mut contributors = Vec::new();
        let stop = loop {
            let Some(page) = paginator.next_page() else {
                break StopReason::PageLimit(self.max_pages);
            };
            match self.contributors_page(&request_url, &page).await {
                Ok(page_contributors) if page_contributors.is_empty() => {
                    debug!("Listed {} contributors of {}", contributors.len(), repo);
                    return Fetched::Complete(contributors);
                }
                Ok(page_contributors) => contributors.extend(page_contributors),
                Err(stop) => break stop,
            }
        };
        warn!("Listing contributors of {} stopped after {}: {}", repo, contributors.len(), stop);
        if contributors.is_empty() {
            Fetched::Failed(stop)
        } else {
            Fetched::Partial {
                value: contributors,
                stop,
            }
        }
    }

    async fn true_total(&self, repo: &RepoId) -> Fetched<u64> {
        match self.count_contributors(repo).await {
            Ok(total) => {
                debug!("{} has {} contributors", repo, total);
                Fetched::Complete(total)
            }
            Err(stop) => {
                warn!("Failed to count contributors of {}: {}", repo, stop);
                Fetched::Failed(stop)
            }
        }
    }
}
