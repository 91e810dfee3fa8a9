mod discovery;
mod report;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use bounty_core::{
    AppConfig, CachingResolver, HttpClanApi, LevelReport, RuleSet, SessionError, SessionParser,
};
use chrono::NaiveDateTime;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

use discovery::SessionDir;

const AFTER_FORMAT: &str = "%Y.%m.%d %H.%M.%S";

#[derive(Parser)]
#[command(version, about = "Scores tracked kills from Star Conflict session logs")]
struct Cli {
    /// Path to the logs directory
    #[arg(short, long)]
    dir: Option<PathBuf>,
    /// Path to the output CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Path to the rules file
    #[arg(short, long)]
    rules: Option<PathBuf>,
    /// Your nickname
    #[arg(short, long)]
    nick: Option<String>,
    /// Skip sessions started before this time (%Y.%m.%d %H.%M.%S)
    #[arg(short, long)]
    after: Option<String>,
    /// Show debug messages
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = AppConfig::load().context("load config")?;
    if let Some(dir) = cli.dir {
        config.log_directory = dir;
    }
    if let Some(output) = cli.output {
        config.output_file = output;
    }
    if let Some(rules) = cli.rules {
        config.rules_file = rules;
    }
    if let Some(nick) = cli.nick {
        config.nickname = nick;
    }
    anyhow::ensure!(
        !config.nickname.is_empty(),
        "nickname is not set; pass --nick or set it in the config file"
    );

    let after = cli
        .after
        .as_deref()
        .map(|s| {
            NaiveDateTime::parse_from_str(s, AFTER_FORMAT)
                .with_context(|| format!("parse --after {s:?} (expected {AFTER_FORMAT})"))
        })
        .transpose()?;

    let rules_file = File::open(&config.rules_file)
        .with_context(|| format!("open rules file {}", config.rules_file.display()))?;
    let resolver = CachingResolver::new(HttpClanApi::new(config.api_rate_limit));
    let mut rules = RuleSet::from_reader(BufReader::new(rules_file), resolver)
        .await
        .context("parse rules")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let sessions = discovery::session_list(&config.log_directory, after)
        .with_context(|| format!("scan sessions in {}", config.log_directory.display()))?;
    tracing::info!(sessions = sessions.len(), "start parse");

    let mut writer = csv::Writer::from_path(&config.output_file)
        .with_context(|| format!("create output file {}", config.output_file.display()))?;
    writer.write_record(report::HEADER)?;
    writer.flush()?;

    for session in &sessions {
        let outcome = run_session(
            &config.nickname,
            &mut rules,
            &mut writer,
            session,
            shutdown_rx.clone(),
        )
        .await;

        // Flush per session so earlier output survives a later failure.
        writer.flush()?;

        match outcome {
            Ok(Outcome::Completed) => {}
            Ok(Outcome::Cancelled) => {
                tracing::info!("shutdown requested, stopping");
                break;
            }
            Err(err) => {
                tracing::warn!(
                    session = %session.started_at.format(AFTER_FORMAT),
                    error = %format!("{err:#}"),
                    "session skipped"
                );
            }
        }
    }

    writer.flush()?;
    Ok(())
}

enum Outcome {
    Completed,
    Cancelled,
}

/// Parse one session, streaming its level reports into the CSV writer.
/// Levels without a score are logged and dropped.
async fn run_session(
    nickname: &str,
    rules: &mut RuleSet<CachingResolver<HttpClanApi>>,
    writer: &mut csv::Writer<File>,
    session: &SessionDir,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Outcome> {
    tracing::info!(session = %session.started_at.format(AFTER_FORMAT), "process session");

    let combat = File::open(session.path.join("combat.log")).context("open combat log")?;
    let game = File::open(session.path.join("game.log")).context("open game log")?;
    let parser = SessionParser::new(
        nickname,
        BufReader::new(game),
        BufReader::new(combat),
        rules,
    );

    let (tx, mut rx) = mpsc::channel::<LevelReport>(1);
    let consume = async {
        let mut rows = 0usize;
        while let Some(report) = rx.recv().await {
            if !report.has_score() {
                tracing::debug!(map = report.map_name.as_deref().unwrap_or("?"), "level without score");
                continue;
            }
            report::write_level(writer, session.started_at, &report)?;
            rows += report.score.len();
        }
        Ok::<usize, csv::Error>(rows)
    };

    let (parse_res, write_res) = tokio::join!(parser.parse(tx, shutdown), consume);
    let rows = write_res.context("write report rows")?;

    match parse_res {
        Ok(()) => {
            tracing::info!(rows, "session done");
            Ok(Outcome::Completed)
        }
        Err(SessionError::Cancelled) => Ok(Outcome::Cancelled),
        Err(err) => Err(err.into()),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
