use chrono::Utc;
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use trendscreener::api::{
    annotate_compliance, AatinaaClient, AlpacaClient, CandidateSource, InMemoryProvider,
    JsonFileSource, MarketDataProvider, StaticSource, TelegramNotifier,
};
use trendscreener::config::{CredentialMode, Credentials, Settings, DEFAULT_CONFIG_FILE};
use trendscreener::report::{buy_signals, summary_message, JsonReportSink, ReportSink, ResultTable};
use trendscreener::screening::{
    CancelHandle, PipelineOptions, PriceSeriesFetcher, RetryPolicy, ScreeningPipeline, ScreeningRun,
};
use trendscreener::synthetic::{MarketScenario, SyntheticDataGenerator};
use trendscreener::Result;

#[derive(Parser, Debug)]
#[command(name = "trendscreener", about = "Trend template stock screener")]
struct Cli {
    /// Settings file (TOML); missing file means defaults
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, value_hint = clap::ValueHint::FilePath)]
    config: PathBuf,

    /// Where credentials are read from
    #[arg(long, value_enum, default_value_t = CredentialMode::Local)]
    mode: CredentialMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Screen every candidate and write the report
    Run(RunArgs),

    /// Screen a single ticker and print its metrics
    Check {
        ticker: String,
    },

    /// Screen synthetic tickers offline
    Demo {
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON export of screener rows
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    candidates: PathBuf,

    /// Only screen the first N candidates
    #[arg(long)]
    max_tickers: Option<usize>,

    /// Skip the compliance lookups
    #[arg(long)]
    no_compliance: bool,

    /// Send a chat summary when the run finishes
    #[arg(long)]
    notify: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    let mut settings = Settings::load(&cli.config)?;

    match cli.command {
        Commands::Run(args) => {
            if args.max_tickers.is_some() {
                settings.pipeline.max_tickers = args.max_tickers;
            }
            if args.no_compliance {
                settings.compliance.enabled = false;
            }
            if args.notify {
                settings.notify.enabled = true;
            }
            run(settings, cli.mode, args.candidates).await
        }
        Commands::Check { ticker } => check(settings, cli.mode, ticker).await,
        Commands::Demo { seed } => demo(settings, seed).await,
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trendscreener=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn timezone(settings: &Settings) -> Result<Tz> {
    settings
        .report
        .timezone
        .parse::<Tz>()
        .map_err(|e| format!("invalid report timezone: {}", e).into())
}

fn build_pipeline<P: MarketDataProvider>(provider: P, settings: &Settings) -> ScreeningPipeline<P> {
    let fetcher = PriceSeriesFetcher::new(
        provider,
        RetryPolicy::from(&settings.fetch),
        settings.fetch.min_bars,
    );
    ScreeningPipeline::new(
        fetcher,
        PipelineOptions::from_settings(&settings.fetch, &settings.pipeline),
    )
}

fn alpaca_client(settings: &Settings, credentials: &Credentials) -> Result<AlpacaClient> {
    let (key, secret) = credentials.alpaca()?;
    Ok(AlpacaClient::new(&settings.fetch, key, secret)?)
}

fn notifier(settings: &Settings, credentials: &mut Credentials) -> TelegramNotifier {
    if !settings.notify.enabled {
        return TelegramNotifier::disabled();
    }
    match (
        credentials.telegram_bot_token.take(),
        credentials.telegram_chat_id.take(),
    ) {
        (Some(token), Some(chat_id)) => {
            TelegramNotifier::new(settings.notify.base_url.as_str(), token, chat_id)
        }
        _ => {
            tracing::warn!("TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID missing, notifications disabled");
            TelegramNotifier::disabled()
        }
    }
}

/// First Ctrl-C stops admitting tickers and lets in-flight ones finish;
/// a second one exits at once
fn cancel_on_interrupt() -> CancelHandle {
    let cancel = CancelHandle::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if handle.interrupt() {
                tracing::error!("Interrupted again, exiting");
                std::process::exit(130);
            }
            tracing::warn!("Interrupt received, finishing tickers in flight (Ctrl-C again to quit)");
        }
    });
    cancel
}

async fn run(settings: Settings, mode: CredentialMode, candidates_path: PathBuf) -> Result<()> {
    let cancel = cancel_on_interrupt();
    let tz = timezone(&settings)?;
    let mut credentials = Credentials::load(mode, settings.secrets_dir.as_deref())?;
    let client = alpaca_client(&settings, &credentials)?;

    tracing::info!("Starting stock screening process");

    let candidates = JsonFileSource::new(candidates_path).candidates().await?;
    tracing::info!("Found {} stocks in screener", candidates.len());

    let pipeline = build_pipeline(client, &settings).with_cancel_handle(cancel);

    let mut run = pipeline.run(candidates).await?;

    if settings.compliance.enabled {
        let checker = AatinaaClient::new(settings.compliance.url.as_str())?;
        annotate_compliance(&mut run.results, &checker).await;
    }

    let table = ResultTable::build(&run.results, Utc::now(), tz);
    let sink = JsonReportSink::new(&settings.report.output_dir);
    let location = sink.publish(&table).await?;

    log_run(&run);
    tracing::info!("Report available at {}", location);

    let notifier = notifier(&settings, &mut credentials);
    if notifier.is_enabled() {
        notifier.notify(&summary_message(&run)).await;
        for signal in buy_signals(&run) {
            notifier.notify_signal(&signal).await;
        }
    }

    Ok(())
}

async fn check(settings: Settings, mode: CredentialMode, ticker: String) -> Result<()> {
    let credentials = Credentials::load(mode, settings.secrets_dir.as_deref())?;
    let client = alpaca_client(&settings, &credentials)?;

    let candidates = StaticSource::from_tickers(&[ticker.as_str()]).candidates().await?;
    let run = build_pipeline(client, &settings).run(candidates).await?;

    for result in &run.results {
        let m = &result.metrics;
        println!("{}", result.ticker());
        println!("  close        {:.2}", m.current_close);
        println!("  SMA 50/150/200  {:.2} / {:.2} / {:.2}", m.sma50, m.sma150, m.sma200);
        println!("  SMA 200 (1 month ago)  {:.2}", m.sma200_lagged);
        println!("  52w low/high {:.2} / {:.2}", m.low_52w, m.high_52w);
        println!(
            "  conditions   {:?} ({}/6)",
            result.conditions.flags(),
            result.pass_count()
        );
    }
    Ok(())
}

async fn demo(mut settings: Settings, seed: u64) -> Result<()> {
    let tz = timezone(&settings)?;
    let end = Utc::now().date_naive();
    let mut generator = SyntheticDataGenerator::new(seed);

    let provider = InMemoryProvider::new()
        .with_bars("UPTR", generator.generate(MarketScenario::Uptrend, 300, end))
        .with_bars("DOWN", generator.generate(MarketScenario::Downtrend, 300, end))
        .with_bars("SIDE", generator.generate(MarketScenario::Sideways, 300, end))
        .with_bars("SHRT", generator.generate(MarketScenario::Uptrend, 30, end));

    settings.pipeline.request_pause_ms = 0;
    let pipeline = build_pipeline(provider, &settings);
    let candidates = StaticSource::from_tickers(&["UPTR", "DOWN", "SIDE", "SHRT", "NONE"])
        .candidates()
        .await?;

    let run = pipeline.run_until(candidates, end).await?;
    log_run(&run);

    let table = ResultTable::build(&run.results, Utc::now(), tz);
    let location = JsonReportSink::new(&settings.report.output_dir)
        .publish(&table)
        .await?;
    tracing::info!("Report available at {}", location);
    Ok(())
}

fn log_run(run: &ScreeningRun) {
    for result in &run.results {
        tracing::info!(
            ticker = %result.ticker(),
            "{}/6 conditions met{}",
            result.pass_count(),
            result
                .compliance
                .and_then(|c| c.label())
                .map(|l| format!(", {}", l))
                .unwrap_or_default()
        );
    }
    for skip in &run.skipped {
        tracing::info!(ticker = %skip.ticker, "Skipped: {}", skip.reason);
    }
    tracing::info!(
        run_id = %run.run_id,
        "{} screened, {} met all conditions, {} skipped",
        run.results.len(),
        run.passed_all().count(),
        run.skipped.len()
    );
}
