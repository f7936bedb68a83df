use crate::api::RepoId;
use std::str::FromStr;
use strum_macros::{Display, EnumString};
use url::form_urlencoded;

const SEPARATOR: char = '&';

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
enum DisplayFlag {
    Timeline,
    Xkcd,
}

/// Repositories and display settings of a comparison, encodable as `owner%2Fname&timeline&xkcd`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareState {
    pub repos: Vec<RepoId>,
    /// Series aligned on elapsed time instead of calendar dates.
    pub timeline: bool,
    /// Hand-drawn chart style.
    pub xkcd: bool,
}

impl ShareState {
    pub fn encode(&self) -> String {
        let repos = self
            .repos
            .iter()
            .map(|repo| form_urlencoded::byte_serialize(repo.to_string().as_bytes()).collect::<String>());
        let flags = [(self.timeline, DisplayFlag::Timeline), (self.xkcd, DisplayFlag::Xkcd)]
            .into_iter()
            .filter(|(active, _)| *active)
            .map(|(_, flag)| flag.to_string());
        repos.chain(flags).collect::<Vec<_>>().join(&SEPARATOR.to_string())
    }

    /// Reads tokens in any order. Unknown tokens and repeated repositories are skipped.
    pub fn decode(encoded: &str) -> ShareState {
        let mut state = ShareState::default();
        for token in encoded.trim_start_matches('#').split(SEPARATOR).filter(|t| !t.is_empty()) {
            match DisplayFlag::from_str(token) {
                Ok(DisplayFlag::Timeline) => state.timeline = true,
                Ok(DisplayFlag::Xkcd) => state.xkcd = true,
                Err(_) => {
                    if let Ok(repo) = decode_token(token).parse::<RepoId>() {
                        if !state.repos.contains(&repo) {
                            state.repos.push(repo);
                        }
                    }
                }
            }
        }
        state
    }
}

fn decode_token(token: &str) -> String {
    form_urlencoded::parse(token.as_bytes())
        .map(|(key, _)| key.into_owned())
        .next()
        .unwrap_or_default()
}

/// Tests

#[cfg(test)]
fn repo(value: &str) -> RepoId {
    value.parse().unwrap()
}

#[test]
fn encode_test() {
    let state = ShareState {
        repos: vec![repo("rust-lang/rust"), repo("tokio-rs/tokio")],
        timeline: true,
        xkcd: false,
    };
    assert_eq!(state.encode(), "rust-lang%2Frust&tokio-rs%2Ftokio&timeline");
    assert_eq!(ShareState::default().encode(), "");
}

#[test]
fn decode_any_order_test() {
    let state = ShareState::decode("#xkcd&rust-lang%2Frust&&timeline&tokio-rs/tokio");
    assert_eq!(
        state,
        ShareState {
            repos: vec![repo("rust-lang/rust"), repo("tokio-rs/tokio")],
            timeline: true,
            xkcd: true,
        }
    );
}

#[test]
fn decode_ignores_unknown_test() {
    let state = ShareState::decode("dark&rust-lang%2Frust&not%20a%2Frepo&rust-lang/rust&nope");
    assert_eq!(state.repos, vec![repo("rust-lang/rust")]);
    assert!(!state.timeline);
    assert!(!state.xkcd);
    assert_eq!(ShareState::decode("#"), ShareState::default());
}

#[test]
fn decode_encoded_test() {
    let state = ShareState {
        repos: vec![repo("a.b/c_d-e")],
        timeline: false,
        xkcd: true,
    };
    assert_eq!(ShareState::decode(&state.encode()), state);
}
