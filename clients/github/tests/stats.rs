use async_trait::async_trait;
use contributor_history::api::{Error, Fetched, Progress, RateLimitReset, RepoId, StatsClient, StopReason};
use contributor_history_github_client::{GithubClient, GithubClientBuilder, RetryPolicy, Sleeper};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STATS_PATH: &str = "/repos/owner/repo/stats/contributors";
const CONTRIBUTORS_PATH: &str = "/repos/owner/repo/contributors";

#[derive(Default)]
struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.delays.lock().unwrap().push(delay);
    }
}

fn repo() -> RepoId {
    "owner/repo".parse().unwrap()
}

fn client(server: &MockServer, sleeper: Arc<RecordingSleeper>, retry: RetryPolicy) -> GithubClient {
    GithubClientBuilder::default()
        .with_github_url(server.uri())
        .with_retry_policy(retry)
        .with_sleeper(sleeper)
        .with_page_size(2)
        .with_max_pages(3)
        .build()
        .unwrap()
}

fn default_client(server: &MockServer) -> GithubClient {
    client(server, Arc::new(RecordingSleeper::default()), RetryPolicy::default())
}

fn stats_body() -> serde_json::Value {
    json!([
        {
            "author": { "login": "alice", "id": 1 },
            "total": 3,
            "weeks": [
                { "w": 1_700_006_400, "a": 10, "d": 1, "c": 3 },
                { "w": 1_700_611_200, "a": 0, "d": 0, "c": 0 }
            ]
        },
        {
            "author": { "login": "bob", "id": 2 },
            "total": 1,
            "weeks": [
                { "w": 1_700_006_400, "a": 0, "d": 0, "c": 0 },
                { "w": 1_700_611_200, "a": 5, "d": 0, "c": 1 }
            ]
        }
    ])
}

fn contributors_body(logins: &[&str]) -> serde_json::Value {
    let contributors: Vec<_> = logins
        .iter()
        .map(|login| json!({ "login": login, "contributions": 7 }))
        .collect();
    json!(contributors)
}

#[tokio::test]
async fn weekly_stats_retries_until_computed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(STATS_PATH))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(STATS_PATH))
        .and(header("Accept", "application/vnd.github.v3+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stats_body()))
        .expect(1)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&server, sleeper.clone(), RetryPolicy::new(8, Duration::from_secs(3)));
    let attempts = Mutex::new(Vec::new());
    let progress: Progress<'_> = &|attempt: u32| attempts.lock().unwrap().push(attempt);

    let records = client.weekly_stats(&repo(), Some(progress)).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].contributor, "alice");
    assert_eq!(records[1].weeks[1].commits, 1);
    assert_eq!(records[1].weeks[1].start.timestamp(), 1_700_611_200);
    assert_eq!(*attempts.lock().unwrap(), vec![1, 2]);
    assert_eq!(
        *sleeper.delays.lock().unwrap(),
        vec![Duration::from_secs(3), Duration::from_secs(6)]
    );
}

#[tokio::test]
async fn weekly_stats_empty_object_means_not_ready() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(STATS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(STATS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(stats_body()))
        .mount(&server)
        .await;

    let records = default_client(&server).weekly_stats(&repo(), None).await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn weekly_stats_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(STATS_PATH))
        .respond_with(ResponseTemplate::new(202))
        .expect(3)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let client = client(&server, sleeper.clone(), RetryPolicy::new(3, Duration::from_millis(10)));
    let attempts = Mutex::new(Vec::new());
    let progress: Progress<'_> = &|attempt: u32| attempts.lock().unwrap().push(attempt);

    let result = client.weekly_stats(&repo(), Some(progress)).await;

    assert!(matches!(result, Err(Error::StatsNotReady { attempts: 3, .. })), "{:?}", result);
    assert_eq!(*attempts.lock().unwrap(), vec![1, 2]);
    assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn weekly_stats_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(STATS_PATH))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", "1700000000"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = default_client(&server).weekly_stats(&repo(), None).await;

    match result {
        Err(Error::RateLimited { reset, .. }) => {
            assert_eq!(reset.0.map(|reset| reset.timestamp()), Some(1_700_000_000));
        }
        other => panic!("Rate limit expected, got {:?}", other),
    }
}

#[tokio::test]
async fn weekly_stats_forbidden_with_quota_left() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(STATS_PATH))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "4999")
                .insert_header("x-ratelimit-reset", "1700000000"),
        )
        .expect(1)
        .mount(&server)
        .await;

    match default_client(&server).weekly_stats(&repo(), None).await {
        Err(Error::UnexpectedStatus { status, reason, .. }) => {
            assert_eq!(status, 403);
            assert_eq!(reason, "Forbidden");
        }
        other => panic!("Unexpected status expected, got {:?}", other),
    }
}

#[tokio::test]
async fn weekly_stats_failures_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/missing/stats/contributors"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/broken/stats/contributors"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/odd/stats/contributors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "hm" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/text/stats/contributors"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("computing", "text/plain"))
        .mount(&server)
        .await;
    let client = default_client(&server);

    let missing = client.weekly_stats(&"owner/missing".parse().unwrap(), None).await;
    assert!(matches!(missing, Err(Error::RepositoryNotFound { .. })), "{:?}", missing);

    match client.weekly_stats(&"owner/broken".parse().unwrap(), None).await {
        Err(Error::UnexpectedStatus { status, reason, .. }) => {
            assert_eq!(status, 500);
            assert_eq!(reason, "Internal Server Error");
        }
        other => panic!("Unexpected status expected, got {:?}", other),
    }

    for repo in ["owner/odd", "owner/text"] {
        let result = client.weekly_stats(&repo.parse().unwrap(), None).await;
        assert!(matches!(result, Err(Error::MalformedResponse { .. })), "{:?}", result);
    }
}

#[tokio::test]
async fn weekly_stats_sends_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(STATS_PATH))
        .and(header("Authorization", "Bearer t0ken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stats_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = GithubClientBuilder::default()
        .with_github_url(server.uri())
        .try_with_token(secrecy::SecretString::new("t0ken".to_string()))
        .and_then(GithubClientBuilder::build)
        .unwrap();
    assert_eq!(client.weekly_stats(&repo(), None).await.unwrap().len(), 2);
}

async fn mount_contributors_page(server: &MockServer, page: u32, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(CONTRIBUTORS_PATH))
        .and(query_param("per_page", "2"))
        .and(query_param("page", page.to_string()))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn all_contributors_until_empty_page() {
    let server = MockServer::start().await;
    mount_contributors_page(&server, 1, ResponseTemplate::new(200).set_body_json(contributors_body(&["a", "b"]))).await;
    mount_contributors_page(&server, 2, ResponseTemplate::new(200).set_body_json(contributors_body(&["c"]))).await;
    mount_contributors_page(&server, 3, ResponseTemplate::new(200).set_body_json(contributors_body(&[]))).await;

    let contributors = default_client(&server).all_contributors(&repo()).await;

    assert!(contributors.is_complete());
    let names: Vec<_> = contributors.value().unwrap().into_iter().map(|c| c.contributor).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn all_contributors_partial_when_rate_limited() {
    let server = MockServer::start().await;
    mount_contributors_page(&server, 1, ResponseTemplate::new(200).set_body_json(contributors_body(&["a", "b"]))).await;
    mount_contributors_page(&server, 2, ResponseTemplate::new(429)).await;

    let contributors = default_client(&server).all_contributors(&repo()).await;

    assert_eq!(
        contributors.stop_reason(),
        Some(&StopReason::RateLimited(RateLimitReset(None)))
    );
    assert_eq!(contributors.value().map(|c| c.len()), Some(2));
}

#[tokio::test]
async fn all_contributors_stops_at_page_limit() {
    let server = MockServer::start().await;
    for page in 1..=3 {
        mount_contributors_page(&server, page, ResponseTemplate::new(200).set_body_json(contributors_body(&["a", "b"]))).await;
    }

    let contributors = default_client(&server).all_contributors(&repo()).await;

    assert_eq!(contributors.stop_reason(), Some(&StopReason::PageLimit(3)));
    assert_eq!(contributors.value().map(|c| c.len()), Some(6));
}

#[tokio::test]
async fn all_contributors_failed_on_first_page() {
    let server = MockServer::start().await;
    mount_contributors_page(&server, 1, ResponseTemplate::new(502)).await;

    let contributors = default_client(&server).all_contributors(&repo()).await;

    assert_eq!(contributors, Fetched::Failed(StopReason::Status(502)));
}

#[tokio::test]
async fn true_total_from_link_header() {
    let server = MockServer::start().await;
    let link = format!(
        r#"<{0}/repositories/1/contributors?per_page=1&anon=true&page=2>; rel="next", <{0}/repositories/1/contributors?per_page=1&anon=true&page=5412>; rel="last""#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path(CONTRIBUTORS_PATH))
        .and(query_param("per_page", "1"))
        .and(query_param("anon", "true"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("link", link.as_str())
                .set_body_json(contributors_body(&["a"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(default_client(&server).true_total(&repo()).await, Fetched::Complete(5412));
}

#[tokio::test]
async fn true_total_counts_single_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTRIBUTORS_PATH))
        .and(query_param("per_page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(contributors_body(&["a"])))
        .mount(&server)
        .await;

    assert_eq!(default_client(&server).true_total(&repo()).await, Fetched::Complete(1));
}

#[tokio::test]
async fn true_total_never_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTRIBUTORS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/garbled/contributors"))
        .respond_with(ResponseTemplate::new(200).insert_header("link", "<nowhere>; rel=\"next\""))
        .mount(&server)
        .await;
    let client = default_client(&server);

    assert_eq!(client.true_total(&repo()).await, Fetched::Failed(StopReason::Status(500)));
    let garbled = client.true_total(&"owner/garbled".parse().unwrap()).await;
    assert!(matches!(garbled, Fetched::Failed(StopReason::Malformed(_))), "{:?}", garbled);
}
