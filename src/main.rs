use anyhow::Result;
use clap::Parser;
use itbigen::{
    config::{Config, Mode},
    fetch, run, source,
};
use reqwest::Client;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Generate ITBI submission files from Banca d'Italia auction results.
#[derive(Parser, Debug)]
#[command(name = "itbigen")]
struct Cli {
    /// YAML configuration file (defaults apply when the file is absent)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Use an already-downloaded auction workbook instead of scraping
    #[arg(long)]
    input: Option<PathBuf>,

    /// Process a single month (YYYY-MM) regardless of the configured mode
    #[arg(long, conflicts_with = "all_months")]
    month: Option<String>,

    /// Process every month present in the source data
    #[arg(long)]
    all_months: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) load config, apply CLI overrides ─────────────────────────
    let cli = Cli::parse();
    let mut cfg = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        info!(config = %cli.config.display(), "config not found; using defaults");
        Config::default()
    };
    if let Some(input) = cli.input {
        cfg.input_file = Some(input);
    }
    if let Some(month) = cli.month {
        cfg.mode = Mode::Explicit;
        cfg.month = Some(month);
    }
    if cli.all_months {
        cfg.mode = Mode::All;
    }
    cfg.validate()?;

    // ─── 3) obtain the source workbook ───────────────────────────────
    let workbook = match &cfg.input_file {
        Some(path) => {
            info!(path = %path.display(), "using local workbook");
            path.clone()
        }
        None => {
            let client = Client::new();
            let url =
                fetch::urls::find_auction_zip_url(&client, &cfg.source_url, &cfg.link_pattern)
                    .await?;
            info!(%url, "found auctions ZIP");
            let zip_path =
                fetch::zips::download_auction_zip(&client, &url, &cfg.download_dir).await?;
            fetch::zips::extract_workbook(&zip_path, &cfg.extracted_dir)?
        }
    };

    // ─── 4) parse source rows ────────────────────────────────────────
    let rows = source::read_auction_rows(&workbook)?;
    info!(rows = rows.len(), "parsed auction rows");

    // ─── 5) generate + package per ISIN-month ────────────────────────
    let summary = run::process_all(&cfg, &rows)?;
    summary.log();

    if summary.is_failure() {
        anyhow::bail!("no unit succeeded ({} failed)", summary.failed.len());
    }
    Ok(())
}
