use clap::Parser;
use contributor_history::api::Error;
use contributor_history_app::{Args, Report};
use futures::StreamExt;
use log::error;
use tokio_util::sync::CancellationToken;

/// Prints contributor growth of GitHub repositories

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenv::dotenv().ok();
    env_logger::init();
    let args = Args::parse();

    let cancel = CancellationToken::new();
    let interrupted = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted.cancel();
        }
    });

    let comparison = contributor_history_app::compare(args, cancel)?;
    if comparison.share.repos.is_empty() {
        error!("No repositories to compare");
        return Ok(());
    }

    let timeline = comparison.share.timeline;
    comparison
        .histories
        .for_each(|(repo, history)| async move {
            match history {
                Ok(history) => println!("{}\n", Report::new(&history, timeline)),
                Err(err) => eprintln!("{}: {}\n", repo, err),
            }
        })
        .await;

    println!("share: #{}", comparison.share.encode());
    Ok(())
}
