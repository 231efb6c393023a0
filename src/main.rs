//! rendlog - terminal view of the live RendLog indicator window.

mod dashboard;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rendlog_config::Config;
use rendlog_core::Timeframe;
use rendlog_remote::RestTable;
use rendlog_sync::{SessionContext, SyncRuntime};
use tokio::io::{AsyncBufReadExt, BufReader};

use dashboard::{Input, View};

#[derive(Parser, Debug)]
#[command(name = "rendlog")]
#[command(about = "Live window of RendLog indicator rows", version)]
struct Args {
    /// Config file (default: ./rendlog.toml, then the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Subject (user id) whose rows are shown
    #[arg(long)]
    subject: String,

    /// Timeframe to start on (1M, 5M, 15M, 30M, 1H, 4H)
    #[arg(long)]
    timeframe: Option<Timeframe>,

    /// User access token, overrides the config and RENDLOG_ACCESS_TOKEN
    #[arg(long)]
    access_token: Option<String>,

    /// Hour offset applied to displayed times
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<i8>,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::load_default(),
    };
    config.apply_env_overrides();
    if let Some(token) = &args.access_token {
        config.remote.access_token = Some(token.clone());
    }
    if let Some(hours) = args.utc_offset {
        config.display.utc_offset_hours = hours;
    }
    config.validate()?;
    Ok(config)
}

async fn run() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let table = RestTable::new(dashboard::client_config(&config.remote))
        .context("failed to create table client")?;
    let category = args.timeframe.unwrap_or(config.general.default_timeframe);
    let view = View::from_config(&config.display);

    log::info!(
        "Watching {} on {} ({} rows, refresh every {}s)",
        args.subject,
        category,
        config.sync.max_rows,
        config.sync.refresh_interval_secs
    );
    let handle = SyncRuntime::spawn(
        Arc::new(table),
        dashboard::sync_options(&config.sync),
        Some(SessionContext::new(args.subject.as_str())),
        Some(category),
    );

    let mut snapshots = handle.snapshots();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    println!("{}", dashboard::HELP);

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    log::warn!("Sync loop stopped unexpectedly");
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print!("{}", view.render(&snapshot));
            }

            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) => match Input::parse(&line) {
                        Input::Quit => break,
                        Input::Switch(timeframe) => handle.on_category_change(timeframe).await?,
                        Input::Help => println!("{}", dashboard::HELP),
                        Input::Empty => {}
                        Input::Unknown(text) => println!("unknown command '{text}', type 'help'"),
                    },
                    None => stdin_open = false,
                }
            }

            _ = &mut ctrl_c => {
                log::info!("Interrupted");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
