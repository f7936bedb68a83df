//! Cumulative contributor series.
//!
//! The weekly statistics resource only reports the top contributors, so a series built from it undercounts
//! large repositories. [`reconcile_with_total`] estimates where the missing contributors joined. The estimate
//! assumes uncounted contributors joined in proportion to the growth visible among the counted ones; it is an
//! approximation, not a reconstruction of real join dates.

use crate::api::{ContributorSummary, WeeklyCommitRecord};
use chrono::{DateTime, Duration, Utc};
use derive_more::Constructor;
use log::{debug, warn};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};

/// Point of a series on time axis `T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Constructor)]
pub struct DataPoint<T> {
    pub date: T,
    pub cumulative_contributors: u64,
}

pub type ContributorDataPoint = DataPoint<DateTime<Utc>>;
pub type ElapsedDataPoint = DataPoint<Duration>;

/// Calendar series, strictly increasing in date and non-decreasing in count.
pub type Series = Vec<ContributorDataPoint>;

/// Time axis a series can be re-based on.
pub trait TimeAxis: Copy {
    fn since(&self, origin: &Self) -> Duration;
}

impl TimeAxis for DateTime<Utc> {
    fn since(&self, origin: &Self) -> Duration {
        *self - *origin
    }
}

impl TimeAxis for Duration {
    fn since(&self, origin: &Self) -> Duration {
        *self - *origin
    }
}

/// How a capped series is corrected towards the true total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Reconciliation {
    /// Shortfall distributed over weeks by their share of known growth.
    #[default]
    Proportional,
    /// Every point scaled by the same factor.
    Uniform,
    None,
}

impl Reconciliation {
    pub fn apply(self, series: &[ContributorDataPoint], contributors: &[ContributorSummary], true_total: Option<u64>) -> Series {
        match self {
            Reconciliation::Proportional => reconcile_with_total(series, contributors, true_total),
            Reconciliation::Uniform => match true_total {
                Some(total) => rescale_to_total(series, total),
                None => series.to_vec(),
            },
            Reconciliation::None => series.to_vec(),
        }
    }
}

/// Counts contributors by the week of their first commit.
///
/// Weeks before anybody's first commit are left out. Contributors are grouped by the start of their first
/// active week rather than its position, so records with misaligned weeks cannot be attributed to a wrong week.
pub fn to_cumulative_series(records: &[WeeklyCommitRecord]) -> Series {
    if !is_aligned(records) {
        warn!("Weekly records of {} contributors do not share week starts", records.len());
    }
    let mut newcomers: BTreeMap<DateTime<Utc>, u64> = records
        .iter()
        .flat_map(|record| record.weeks.iter().map(|week| (week.start, 0)))
        .collect();
    for first_week in records.iter().filter_map(WeeklyCommitRecord::first_commit_week) {
        *newcomers.entry(first_week).or_default() += 1;
    }

    let mut cumulative = 0;
    newcomers
        .into_iter()
        .filter_map(|(date, count)| {
            cumulative += count;
            (cumulative > 0).then(|| DataPoint::new(date, cumulative))
        })
        .collect()
}

/// True when every record has the same week starts as the first one.
pub fn is_aligned(records: &[WeeklyCommitRecord]) -> bool {
    let Some(first) = records.first() else {
        return true;
    };
    records.iter().skip(1).all(|record| {
        record.weeks.len() == first.weeks.len()
            && record.weeks.iter().zip(&first.weeks).all(|(a, b)| a.start == b.start)
    })
}

/// Lifts the series so it ends at the true total.
///
/// The shortfall is distributed over the weeks after the first in proportion to each week's known growth. Every
/// week but the last receives its rounded share, the last receives what remains, so the series ends exactly at
/// the total. Without known growth to distribute over, the series is rescaled uniformly instead.
///
/// An unknown `true_total` leaves the series uncorrected. The listed `contributors` are not a substitute, their
/// listing stops at the page limit.
pub fn reconcile_with_total(series: &[ContributorDataPoint], contributors: &[ContributorSummary], true_total: Option<u64>) -> Series {
    let Some(total) = true_total else {
        debug!("True total unknown, {} listed contributors, series left uncorrected", contributors.len());
        return series.to_vec();
    };
    let Some(last) = series.last() else {
        return series.to_vec();
    };
    let Some(shortfall) = total.checked_sub(last.cumulative_contributors).filter(|s| *s > 0) else {
        return series.to_vec();
    };

    let increments: Vec<u64> = series
        .windows(2)
        .map(|pair| pair[1].cumulative_contributors - pair[0].cumulative_contributors)
        .collect();
    let known_increments: u64 = increments.iter().sum();
    if known_increments == 0 {
        debug!("No weekly growth to distribute {} contributors over, rescaling", shortfall);
        return rescale_to_total(series, total);
    }

    let mut assigned = 0;
    let mut reconciled = Vec::with_capacity(series.len());
    reconciled.push(series[0]);
    for (index, (point, increment)) in series[1..].iter().zip(&increments).enumerate() {
        let extra = if index == increments.len() - 1 {
            shortfall - assigned
        } else {
            let share = *increment as f64 / known_increments as f64 * shortfall as f64;
            // capped so the last week is never left with a negative remainder
            (share.round() as u64).min(shortfall - assigned)
        };
        assigned += extra;
        reconciled.push(DataPoint::new(point.date, point.cumulative_contributors + assigned));
    }
    reconciled
}

/// Scales every point by `total / final value`, keeping the curve shape.
///
/// Returns the series unchanged when it is empty, ends at zero or already reaches `total`.
pub fn rescale_to_total(series: &[ContributorDataPoint], total: u64) -> Series {
    let last = match series.last() {
        Some(last) if last.cumulative_contributors > 0 && last.cumulative_contributors < total => last,
        _ => return series.to_vec(),
    };
    let scale = total as f64 / last.cumulative_contributors as f64;
    series
        .iter()
        .map(|point| DataPoint::new(point.date, (point.cumulative_contributors as f64 * scale).round() as u64))
        .collect()
}

/// Re-bases dates on the first point, which becomes zero elapsed time.
pub fn normalize_to_relative_start<T: TimeAxis>(series: &[DataPoint<T>]) -> Vec<ElapsedDataPoint> {
    let Some(first) = series.first() else {
        return Vec::new();
    };
    series
        .iter()
        .map(|point| DataPoint::new(point.date.since(&first.date), point.cumulative_contributors))
        .collect()
}

/// `Day n` below a year, `Year n.n` from then on.
pub fn format_elapsed_label(elapsed: Duration) -> String {
    let days = elapsed.num_seconds().div_euclid(Duration::days(1).num_seconds());
    if days < 365 {
        format!("Day {}", days)
    } else {
        format!("Year {:.1}", days as f64 / 365.0)
    }
}
