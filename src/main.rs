use anyhow::{anyhow, bail, Context};
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tickflow::aggregation::bucket_start;
use tickflow::config::AppConfig;
use tickflow::db::PostgresStrategyStore;
use tickflow::execution::LoggingExecutor;
use tickflow::persistence::{
    HistorySource, MemoryStore, PersistenceConsumer, RedisCandleStore, StrategySource,
};
use tickflow::pipeline::{spawn_flush_loop, Pipeline};
use tickflow::session::MarketSession;
use tickflow::simulation::{replay, MarketScenario, SyntheticTickGenerator};
use tickflow::{EventConsumer, InstrumentId, PipelineEvent, StrategyConfig, Tick};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for in-flight candle writes
const PERSISTENCE_DRAIN: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "tickflow", about = "Tick to candle aggregation and indicator signals")]
struct Cli {
    /// Configuration file (TOML, optional)
    #[arg(long, global = true, default_value = "tickflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregate JSON-lines ticks from stdin for the watchlist
    Run {
        /// Start even when the market session is closed
        #[arg(long)]
        force: bool,

        /// Instruments to subscribe (defaults to the Postgres watchlist)
        #[arg(long = "instrument")]
        instruments: Vec<String>,
    },
    /// Replay synthetic ticks through the pipeline on a simulated clock
    Simulate {
        #[arg(long, default_value = "SIM")]
        instrument: String,

        #[arg(long, default_value_t = 375)]
        minutes: usize,

        #[arg(long, default_value = "uptrend")]
        scenario: MarketScenario,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, default_value_t = 100.0)]
        base_price: f64,

        /// Simulated seconds between flushes
        #[arg(long, default_value_t = 15)]
        flush_secs: i64,

        #[command(flatten)]
        strategy: StrategyArgs,
    },
}

#[derive(Args)]
struct StrategyArgs {
    #[arg(long, default_value_t = 1)]
    timeframe: u32,
    #[arg(long, default_value_t = 20)]
    sma_period: usize,
    #[arg(long, default_value_t = 14)]
    rsi_period: usize,
    #[arg(long, default_value_t = 7)]
    fast_period: usize,
    #[arg(long, default_value_t = 2.0)]
    fast_multiplier: f64,
    #[arg(long, default_value_t = 14)]
    slow_period: usize,
    #[arg(long, default_value_t = 3.0)]
    slow_multiplier: f64,
}

impl From<StrategyArgs> for StrategyConfig {
    fn from(args: StrategyArgs) -> Self {
        StrategyConfig {
            timeframe: args.timeframe,
            sma_period: args.sma_period,
            rsi_period: args.rsi_period,
            fast_period: args.fast_period,
            fast_multiplier: args.fast_multiplier,
            slow_period: args.slow_period,
            slow_multiplier: args.slow_multiplier,
        }
    }
}

/// Prints every signal change to stdout
struct SignalPrinter;

impl EventConsumer for SignalPrinter {
    fn on_event(&self, event: &PipelineEvent) {
        if let PipelineEvent::SignalChanged(signal) = event {
            println!("{}", signal);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    setup_logging(&config.log_filter);

    match cli.command {
        Command::Run { force, instruments } => run(config, force, instruments).await,
        Command::Simulate {
            instrument,
            minutes,
            scenario,
            seed,
            base_price,
            flush_secs,
            strategy,
        } => {
            let instrument = InstrumentId::from(instrument);
            let strategy = StrategyConfig::from(strategy);
            strategy
                .validate()
                .map_err(|reason| anyhow!("Invalid strategy: {}", reason))?;

            simulate(config, instrument, strategy, minutes, scenario, seed, base_price, flush_secs).await
        }
    }
}

fn setup_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: AppConfig, force: bool, instruments: Vec<String>) -> anyhow::Result<()> {
    tracing::info!("tickflow starting");

    let session = MarketSession::from_config(&config.session).context("Invalid session configuration")?;
    if let Err(closed) = session.check(Utc::now()) {
        if !force {
            bail!("Not subscribing: {}", closed);
        }
        tracing::warn!("Market session closed ({}), continuing because of --force", closed);
    }

    let redis = RedisCandleStore::new(&config.redis_url)
        .await
        .map_err(|e| anyhow!("Failed to connect to Redis: {}", e))?;
    let redis = Arc::new(redis);

    let postgres = match &config.database_url {
        Some(url) => match PostgresStrategyStore::new(url).await {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::warn!("Failed to connect to Postgres ({}), strategies unavailable", e);
                None
            }
        },
        None => None,
    };

    let mut watchlist: Vec<InstrumentId> = instruments.into_iter().map(InstrumentId::from).collect();
    if watchlist.is_empty() {
        if let Some(store) = &postgres {
            watchlist = store
                .load_watchlist()
                .await
                .map_err(|e| anyhow!("Failed to load watchlist: {}", e))?;
        }
    }
    if watchlist.is_empty() {
        bail!("Watchlist is empty, nothing to subscribe");
    }

    let pipeline = Arc::new(Pipeline::new(config.pipeline_config()));
    let persistence = Arc::new(PersistenceConsumer::new(redis.clone(), tokio::runtime::Handle::current()));
    pipeline.candle_registry().attach("persistence", persistence.clone());
    let executor = Arc::new(LoggingExecutor::new());
    pipeline.signal_registry().attach("execution", executor.clone());

    match &postgres {
        Some(store) => subscribe_all(&pipeline, &watchlist, store, redis.as_ref()).await,
        None => subscribe_all(&pipeline, &watchlist, &MemoryStore::new(), redis.as_ref()).await,
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flusher = spawn_flush_loop(pipeline.clone(), config.flush_interval(), shutdown_rx);

    tracing::info!(instruments = watchlist.len(), "Reading ticks from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<Tick>(&line) {
                    Ok(tick) => {
                        // Rejections are logged by the pipeline
                        let _ = pipeline.ingest(tick);
                    }
                    Err(e) => tracing::warn!("Dropping malformed tick line: {}", e),
                },
                Ok(None) => {
                    tracing::info!("Tick stream ended");
                    break;
                }
                Err(e) => {
                    tracing::error!("Tick stream failed: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    // Feed disconnected: flush what has aged out before tearing down
    pipeline.flush_all(Utc::now()).await;

    shutdown_tx.send(true).ok();
    flusher.await.context("Flush loop panicked")?;

    let reports = pipeline.stop(Utc::now());
    if !persistence.wait_idle(PERSISTENCE_DRAIN).await {
        tracing::warn!(
            pending = persistence.dispatched().saturating_sub(persistence.settled()),
            "Gave up waiting for final candle writes"
        );
    }
    tracing::info!(
        instruments = reports.len(),
        final_candles = reports.iter().map(|r| r.completed).sum::<usize>(),
        signals = executor.received(),
        "tickflow stopped"
    );

    Ok(())
}

async fn subscribe_all<S, H>(pipeline: &Pipeline, watchlist: &[InstrumentId], strategies: &S, history: &H)
where
    S: StrategySource,
    H: HistorySource,
{
    let now = Utc::now();
    for instrument in watchlist {
        match pipeline.subscribe(instrument.clone(), strategies, history, now).await {
            Ok(state) => tracing::info!(instrument = %instrument, state = ?state, "Instrument ready"),
            Err(e) => tracing::error!(instrument = %instrument, "Subscribe failed: {}", e),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn simulate(
    config: AppConfig,
    instrument: InstrumentId,
    strategy: StrategyConfig,
    minutes: usize,
    scenario: MarketScenario,
    seed: u64,
    base_price: f64,
    flush_secs: i64,
) -> anyhow::Result<()> {
    let pipeline_config = config.pipeline_config();
    let start = bucket_start(
        Utc::now() - ChronoDuration::minutes(minutes as i64),
        ChronoDuration::minutes(1),
    );

    let store = Arc::new(MemoryStore::new().with_strategy(instrument.clone(), strategy));
    let pipeline = Pipeline::new(pipeline_config);
    let persistence = Arc::new(PersistenceConsumer::new(store.clone(), tokio::runtime::Handle::current()));
    pipeline.candle_registry().attach("persistence", persistence.clone());
    let executor = Arc::new(LoggingExecutor::new());
    pipeline.signal_registry().attach("execution", executor.clone());
    pipeline.signal_registry().attach("printer", Arc::new(SignalPrinter));

    let state = pipeline.subscribe(instrument.clone(), store.as_ref(), store.as_ref(), start).await?;
    tracing::info!(instrument = %instrument, state = ?state, scenario = ?scenario, "Simulating");

    let ticks = SyntheticTickGenerator::new(seed)
        .with_base_price(base_price)
        .generate(&instrument, scenario, start, minutes);
    let summary = replay(&pipeline, ticks, ChronoDuration::seconds(flush_secs.max(1))).await;
    // Simulated clock at stop: the last generated minute plus one width of lag
    pipeline.stop(start + ChronoDuration::minutes(minutes as i64 + 2));
    if !persistence.wait_idle(PERSISTENCE_DRAIN).await {
        tracing::warn!("Gave up waiting for final candle writes");
    }

    println!(
        "{} ticks, {} candles, {} signal changes, final position {:?}",
        summary.ticks,
        summary.candles,
        executor.received(),
        executor.position(&instrument)
    );

    Ok(())
}
