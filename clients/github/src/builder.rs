use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::GithubClient;
use contributor_history::api::Result;
use reqwest::header;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::ClientBuilder;
use secrecy::ExposeSecret;
use std::sync::Arc;

pub const DEFAULT_GITHUB_URL: &str = "https://api.github.com";
/// Largest page GitHub serves.
pub const MAX_CONTRIBUTORS_PAGE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 10;

pub struct GithubClientBuilder {
    client_builder: ClientBuilder,
    github_url: String,
    headers: HeaderMap,
    retry: RetryPolicy,
    page_size: u32,
    max_pages: u32,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for GithubClientBuilder {
    fn default() -> Self {
        let mut headers = HeaderMap::default();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("contributor-history"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        Self {
            client_builder: ClientBuilder::default(),
            github_url: DEFAULT_GITHUB_URL.to_string(),
            headers,
            retry: RetryPolicy::default(),
            page_size: MAX_CONTRIBUTORS_PAGE,
            max_pages: DEFAULT_MAX_PAGES,
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

impl GithubClientBuilder {
    /// Sends `token` as bearer credential with every request.
    pub fn try_with_token(self, token: secrecy::SecretString) -> Result<GithubClientBuilder> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret())).map_err(anyhow::Error::from)?;
        value.set_sensitive(true);
        Ok(self.with_header(header::AUTHORIZATION, value))
    }

    pub fn try_with_user_agent<STR: AsRef<str>>(self, user_agent: STR) -> Result<GithubClientBuilder> {
        let value = HeaderValue::from_str(user_agent.as_ref()).map_err(anyhow::Error::from)?;
        Ok(self.with_header(header::USER_AGENT, value))
    }

    pub fn with_github_url<STR: AsRef<str>>(mut self, url: STR) -> GithubClientBuilder {
        self.github_url = url.as_ref().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> GithubClientBuilder {
        self.retry = retry;
        self
    }

    /// Contributor listing page size, capped at [`MAX_CONTRIBUTORS_PAGE`].
    pub fn with_page_size(mut self, page_size: u32) -> GithubClientBuilder {
        self.page_size = page_size.clamp(1, MAX_CONTRIBUTORS_PAGE);
        self
    }

    /// Most contributor listing pages requested for one repository.
    pub fn with_max_pages(mut self, max_pages: u32) -> GithubClientBuilder {
        self.max_pages = max_pages;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> GithubClientBuilder {
        self.sleeper = sleeper;
        self
    }

    fn with_header(mut self, key: HeaderName, val: HeaderValue) -> GithubClientBuilder {
        self.headers.insert(key, val);
        self
    }

    pub fn build(self) -> Result<GithubClient> {
        let client = self
            .client_builder
            .default_headers(self.headers)
            .build()
            .map_err(anyhow::Error::from)?;
        Ok(GithubClient {
            client,
            github_url: self.github_url,
            retry: self.retry,
            page_size: self.page_size,
            max_pages: self.max_pages,
            sleeper: self.sleeper,
        })
    }
}

/// Tests

#[test]
fn invalid_token_test() {
    let token = secrecy::SecretString::new("line\nbreak".to_string());
    assert!(GithubClientBuilder::default().try_with_token(token).is_err());
}

#[test]
fn builder_settings_test() {
    let client = GithubClientBuilder::default()
        .with_github_url("http://localhost:8080/")
        .with_page_size(500)
        .with_max_pages(2)
        .try_with_token(secrecy::SecretString::new("t0ken".to_string()))
        .and_then(GithubClientBuilder::build)
        .unwrap();
    assert_eq!(client.github_url, "http://localhost:8080");
    assert_eq!(client.page_size, MAX_CONTRIBUTORS_PAGE);
    assert_eq!(client.max_pages, 2);
    assert_eq!(client.retry, RetryPolicy::default());
}
