use clap::Parser;
use contributor_history::api::RepoId;
use contributor_history::Reconciliation;
use secrecy::SecretString;
use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Repositories to compare, in owner/name form
    #[clap(value_name = "OWNER/NAME")]
    pub repos: Vec<RepoId>,

    /// Shared comparison, e.g. `rust-lang%2Frust&tokio-rs%2Ftokio&timeline`
    #[clap(short, long, env)]
    pub share: Option<String>,

    /// API OAuth access token
    #[clap(short, long, env)]
    pub api_token: Option<SecretString>,

    /// Repository API URL
    #[clap(long, env, default_value = "https://api.github.com")]
    pub api_url: String,

    /// Align repositories on days since their first contribution
    #[clap(short, long)]
    pub timeline: bool,

    /// Hand-drawn chart style, only carried in the share token
    #[clap(long)]
    pub xkcd: bool,

    /// Correction of the capped weekly statistics: proportional, uniform or none
    #[clap(short, long, env, default_value = "proportional")]
    pub reconcile: Reconciliation,

    /// Requests for weekly statistics while GitHub computes them
    #[clap(long, env, default_value_t = 8, parse(try_from_str=max_attempts_in_range))]
    pub max_attempts: u32,

    /// Delay after the first not ready response, multiplied by the attempt number
    #[clap(long, env, default_value_t = 3000)]
    pub retry_delay_ms: u64,

    /// Maximal contributor listing pages per repository
    #[clap(long, env, default_value_t = 10, parse(try_from_str=max_pages_in_range))]
    pub max_pages: u32,

    /// Maximal repositories fetched in parallel
    #[clap(long, env, default_value_t = 4, parse(try_from_str=max_parallel_in_range))]
    pub max_parallel: usize,
}

fn max_attempts_in_range(value: &str) -> clap::Result<u32, String> {
    number_in_range(value, 1, 100, "max_attempts".to_string())
}

fn max_pages_in_range(value: &str) -> clap::Result<u32, String> {
    number_in_range(value, 1, 1000, "max_pages".to_string())
}

fn max_parallel_in_range(value: &str) -> clap::Result<usize, String> {
    number_in_range(value, 1, 64, "max_parallel".to_string())
}

fn number_in_range<T>(value: &str, min: T, max: T, name: String) -> clap::Result<T, String>
where
    T: FromStr + PartialOrd + Display,
    <T as FromStr>::Err: Display,
{
    value.parse::<T>().map_err(|err| format!("{}", err)).and_then(|value| {
        if value < min || value > max {
            return Err(format!("{} is not in range {} .. {}.", name, min, max));
        }
        Ok(value)
    })
}

/// Tests

#[test]
fn number_in_range_test() {
    assert_eq!(max_attempts_in_range("8"), Ok(8));
    assert!(max_attempts_in_range("0").is_err());
    assert!(max_parallel_in_range("many").is_err());
}

#[test]
fn parse_args_test() {
    let args = Args::try_parse_from([
        "contributor_history",
        "rust-lang/rust",
        "tokio-rs/tokio",
        "--timeline",
        "--reconcile",
        "uniform",
        "--max-pages",
        "3",
    ])
    .unwrap();
    assert_eq!(args.repos.len(), 2);
    assert!(args.timeline);
    assert_eq!(args.reconcile, Reconciliation::Uniform);
    assert_eq!(args.max_pages, 3);
    assert!(Args::try_parse_from(["contributor_history", "not-a-repo"]).is_err());
}
