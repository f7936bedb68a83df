//! Contributor history
//!
//! # Overview
//!
//! Counts the unique contributors of a GitHub repository over time.
//!
//! GitHub computes weekly commit statistics of a repository asynchronously and reports them for the top 100
//! contributors only. The contributor listing is not capped, but carries no dates. Library merges both into one
//! cumulative series: a contributor joins in the week of their first commit, and contributors missing from the
//! weekly statistics are spread over the weeks in proportion to the growth among the reported ones.
//! The result is an estimate of the real growth curve, exact only where the weekly statistics are complete.
//!
//! Series of several repositories can be compared on a common axis of days since the first contribution.

pub mod api;
#[cfg(feature = "pipeline")]
pub mod pipeline;
pub mod series;
pub mod share;

pub use api::{Error, Result};
#[cfg(feature = "pipeline")]
pub use pipeline::{HistoryBuilder, HistoryStream, RepoHistory, RepoTask};
pub use series::{ContributorDataPoint, DataPoint, ElapsedDataPoint, Reconciliation, Series};
pub use share::ShareState;
