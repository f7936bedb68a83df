use chrono::{TimeZone, Utc};
use contributor_history::api::{ContributorSummary, Week, WeeklyCommitRecord};
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::collections::HashMap;

/// Body of `/repos/{owner}/{repo}/stats/contributors`.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum ContributorStatsBody {
    Ready(Vec<ContributorStats>),
    /// `{}` while statistics are computed, anything else is unexpected.
    Object(HashMap<String, IgnoredAny>),
}

#[derive(Deserialize, Debug)]
pub struct ContributorStats {
    pub author: Option<Author>,
    pub weeks: Vec<WeekBody>,
}

#[derive(Deserialize, Debug)]
pub struct Author {
    pub login: String,
}

#[derive(Deserialize, Debug)]
pub struct WeekBody {
    /// Start of the week, Unix seconds.
    pub w: i64,
    /// Commits during the week.
    pub c: u32,
}

impl TryFrom<ContributorStats> for WeeklyCommitRecord {
    type Error = String;

    fn try_from(stats: ContributorStats) -> Result<Self, Self::Error> {
        let weeks = stats
            .weeks
            .into_iter()
            .map(|week| {
                Utc.timestamp_opt(week.w, 0)
                    .single()
                    .map(|start| Week::new(start, week.c))
                    .ok_or_else(|| format!("week start {} out of range", week.w))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let contributor = stats.author.map_or_else(|| "ghost".to_string(), |author| author.login);
        Ok(WeeklyCommitRecord::new(contributor, weeks))
    }
}

/// Entry of `/repos/{owner}/{repo}/contributors`, anonymous contributors carry a name or email instead of a login.
#[derive(Deserialize, Debug)]
pub struct Contributor {
    pub login: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub contributions: u32,
}

impl From<Contributor> for ContributorSummary {
    fn from(contributor: Contributor) -> Self {
        let name = contributor
            .login
            .or(contributor.name)
            .or(contributor.email)
            .unwrap_or_else(|| "anonymous".to_string());
        ContributorSummary::new(name, contributor.contributions)
    }
}

/// Tests

#[test]
fn contributor_stats_body_test() {
    let body: ContributorStatsBody = serde_json::from_str(
        r#"[{"author":{"login":"a","id":1},"total":2,"weeks":[{"w":1700006400,"a":1,"d":0,"c":2}]}]"#,
    )
    .unwrap();
    let ContributorStatsBody::Ready(stats) = body else {
        panic!("stats expected");
    };
    let record = WeeklyCommitRecord::try_from(stats.into_iter().next().unwrap()).unwrap();
    assert_eq!(record.contributor, "a");
    assert_eq!(record.weeks[0].commits, 2);
    assert_eq!(record.weeks[0].start.timestamp(), 1_700_006_400);

    let body: ContributorStatsBody = serde_json::from_str("{}").unwrap();
    assert!(matches!(body, ContributorStatsBody::Object(object) if object.is_empty()));
    assert!(serde_json::from_str::<ContributorStatsBody>(r#""computing""#).is_err());
}

#[test]
fn anonymous_contributor_test() {
    let contributor: Contributor = serde_json::from_str(r#"{"name":"Jane","email":"j@x.org","type":"Anonymous","contributions":3}"#).unwrap();
    assert_eq!(ContributorSummary::from(contributor), ContributorSummary::new("Jane".to_string(), 3));
}
