use chrono::{TimeZone, Utc};
use contributor_history::api::RateLimitReset;
use derive_more::Constructor;
use log::debug;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::StatusCode;
use std::str::FromStr;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Quota reported with every API response.
#[derive(Constructor, Debug, PartialEq, Eq)]
pub struct RateLimit {
    limit: u32,
    remaining: u32,
    reset: i64,
}

impl RateLimit {
    pub(crate) fn from_headers(headers: &HeaderMap<HeaderValue>) -> anyhow::Result<RateLimit> {
        Ok(RateLimit::new(
            read_header::<u32>(headers, LIMIT_HEADER)?,
            read_header::<u32>(headers, REMAINING_HEADER)?,
            read_header::<i64>(headers, RESET_HEADER)?,
        ))
    }
}

/// GitHub answers an exhausted quota with 403, secondary limits with 429. A 403 with quota left is a refusal.
pub(crate) fn is_rate_limited(status: StatusCode, headers: &HeaderMap<HeaderValue>) -> bool {
    match status {
        StatusCode::TOO_MANY_REQUESTS => true,
        StatusCode::FORBIDDEN => read_header::<u32>(headers, REMAINING_HEADER).map_or(false, |remaining| remaining == 0),
        _ => false,
    }
}

pub(crate) fn reset_time(headers: &HeaderMap<HeaderValue>) -> RateLimitReset {
    let reset = read_header::<i64>(headers, RESET_HEADER)
        .ok()
        .and_then(|reset| Utc.timestamp_opt(reset, 0).single());
    RateLimitReset(reset)
}

pub(crate) fn log_quota(headers: &HeaderMap<HeaderValue>) {
    if let Ok(rate_limit) = RateLimit::from_headers(headers) {
        debug!(
            "Remaining quota {}/{}, resets at {}",
            rate_limit.remaining, rate_limit.limit, rate_limit.reset
        );
    }
}

fn read_header<T>(headers: &HeaderMap<HeaderValue>, header: &str) -> anyhow::Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
{
    let header = headers
        .get(header)
        .ok_or_else(|| anyhow::anyhow!("Header {} not found", header))?
        .to_str()?;
    Ok(header.parse::<T>()?)
}

/// Tests

#[test]
fn reset_time_test() -> anyhow::Result<()> {
    let mut headers = HeaderMap::new();
    assert_eq!(reset_time(&headers), RateLimitReset(None));

    headers.insert(RESET_HEADER, HeaderValue::from_str("1700000000")?);
    assert_eq!(reset_time(&headers), RateLimitReset(Utc.timestamp_opt(1_700_000_000, 0).single()));

    headers.insert(RESET_HEADER, HeaderValue::from_str("soon")?);
    assert_eq!(reset_time(&headers), RateLimitReset(None));
    Ok(())
}

#[test]
fn rate_limit_headers_test() -> anyhow::Result<()> {
    let mut headers = HeaderMap::new();
    headers.insert(LIMIT_HEADER, HeaderValue::from_str("60")?);
    headers.insert(REMAINING_HEADER, HeaderValue::from_str("0")?);
    assert!(RateLimit::from_headers(&headers).is_err(), "Reset header is missing");

    headers.insert(RESET_HEADER, HeaderValue::from_str("1700000000")?);
    assert_eq!(RateLimit::from_headers(&headers)?, RateLimit::new(60, 0, 1_700_000_000));
    assert!(is_rate_limited(StatusCode::FORBIDDEN, &headers));
    assert!(!is_rate_limited(StatusCode::NOT_FOUND, &headers));
    Ok(())
}

#[test]
fn forbidden_with_quota_left_test() -> anyhow::Result<()> {
    let mut headers = HeaderMap::new();
    assert!(!is_rate_limited(StatusCode::FORBIDDEN, &headers));
    assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, &headers));

    headers.insert(REMAINING_HEADER, HeaderValue::from_str("4999")?);
    assert!(!is_rate_limited(StatusCode::FORBIDDEN, &headers));
    Ok(())
}
