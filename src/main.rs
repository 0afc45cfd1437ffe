//! Gridstake command line driver

use clap::{Parser, Subcommand, ValueEnum};
use gridstake::{
    games::StdRandom, generate_sample_config, stats::DEFAULT_COMMISSION_RATE, CellPosition,
    ConfigLoader, GameConfig, GameEngine, GridstakeResult, HttpSink, Money, RemoteSink,
    RevealOutcome, RocksStore, SessionId, SessionSnapshot, SyncWorker,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Grid betting game engine
#[derive(Parser)]
#[command(name = "gridstake")]
#[command(about = "Reveal cells, raise the multiplier, cash out before the bomb")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Deployment profile used when no configuration file is given
    #[arg(short, long, value_enum, default_value = "default")]
    profile: Profile,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Data directory for wallet and event storage
    #[arg(short, long)]
    data_dir: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Profile {
    Default,
    Web,
    Mobile,
}

impl Profile {
    fn config(self) -> GameConfig {
        match self {
            Profile::Default => GameConfig::default(),
            Profile::Web => GameConfig::web(),
            Profile::Mobile => GameConfig::mobile(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Play interactively in the terminal
    Play {
        /// Grid size for new sessions
        #[arg(short, long)]
        grid: Option<usize>,

        /// Bomb probability in percent for new sessions
        #[arg(short, long)]
        bombs: Option<f64>,

        /// Seed for replayable boards
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Deliver queued events to the configured endpoint and exit
    Sync,

    /// Show the wallet and the house report for finished sessions
    Stats,

    /// Write a sample configuration file
    SampleConfig {
        #[arg(short, long, default_value = "gridstake.toml")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> GridstakeResult<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    if let Commands::SampleConfig { output } = &cli.command {
        generate_sample_config(output)?;
        println!("Sample configuration written to {}", output);
        return Ok(());
    }

    let mut loader = ConfigLoader::new().with_profile(cli.profile.config());
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    let store = Arc::new(RocksStore::open(&config.storage.data_dir)?);

    match cli.command {
        Commands::Play { grid, bombs, seed } => {
            let mut engine = GameEngine::with_store(config, store)?;
            if let Some(seed) = seed {
                engine = engine.with_random(StdRandom::seeded(seed));
            }
            run_play(engine, grid, bombs).await
        }
        Commands::Sync => run_sync(GameEngine::with_store(config, store)?).await,
        Commands::Stats => {
            print_stats(&GameEngine::with_store(config, store)?);
            Ok(())
        }
        Commands::SampleConfig { .. } => Ok(()),
    }
}

fn build_sink(engine: &GameEngine) -> GridstakeResult<Option<Arc<dyn RemoteSink>>> {
    let sync = &engine.config().sync;
    match (&sync.endpoint, sync.enabled) {
        (Some(endpoint), true) => {
            let sink: Arc<dyn RemoteSink> = Arc::new(HttpSink::new(endpoint.clone(), sync.sink_timeout())?);
            Ok(Some(sink))
        }
        _ => Ok(None),
    }
}

async fn run_sync(engine: GameEngine) -> GridstakeResult<()> {
    let Some(sink) = build_sink(&engine)? else {
        println!("Sync is disabled or no endpoint is configured");
        return Ok(());
    };

    let pending = engine.events().pending_count();
    let worker = SyncWorker::new(
        engine.events(),
        sink,
        engine.player_store(),
        engine.config().sync.clone(),
    );
    let report = worker.flush_once().await;

    println!(
        "Delivered {} of {} queued events ({} rejected, {} remaining)",
        report.delivered, pending, report.dropped, report.remaining
    );
    Ok(())
}

fn print_stats(engine: &GameEngine) {
    let wallet = engine.wallet();
    let report = engine.house_report(DEFAULT_COMMISSION_RATE);

    println!("Balance:          {}", wallet.balance());
    println!("Total staked:     {}", wallet.total_debited());
    println!("Total won:        {}", wallet.total_credited());
    println!("Sessions:         {}", report.sessions);
    println!("  cashed out:     {}", report.cashed_out);
    println!("  bomb hits:      {}", report.bomb_hits);
    println!("  perfect games:  {}", report.perfect_games);
    println!("House profit:     {}%", report.profit_percentage);
    println!("Queued events:    {}", engine.events().pending_count());
}

const HELP: &str = "commands: new <stake> | r <row-col> | cash | board | balance | help | quit";

async fn run_play(engine: GameEngine, grid: Option<usize>, bombs: Option<f64>) -> GridstakeResult<()> {
    let grid = grid.unwrap_or(engine.config().grid.default_size);
    let bombs = bombs.unwrap_or(engine.config().bombs.default_probability);

    let worker = match build_sink(&engine)? {
        Some(sink) => Some(
            SyncWorker::new(
                engine.events(),
                sink,
                engine.player_store(),
                engine.config().sync.clone(),
            )
            .spawn(),
        ),
        None => None,
    };

    println!("Balance {} | grid {}x{} | bomb rate {}%", engine.balance(), grid, grid, bombs);
    println!("{}", HELP);

    let mut current: Option<SessionId> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let argument: Vec<&str> = words.collect();

        match command {
            "new" | "n" => {
                let Some(stake) = argument.first().and_then(|s| s.parse::<Money>().ok()) else {
                    println!("usage: new <stake>");
                    continue;
                };
                match engine.start_session(stake, grid, bombs) {
                    Ok(snapshot) => {
                        current = Some(snapshot.session_id);
                        println!("Session {} started, balance {}", snapshot.session_id, engine.balance());
                        render(&snapshot, None);
                    }
                    Err(e) => println!("{}", e),
                }
            }
            "r" | "reveal" => {
                let Some(session_id) = current else {
                    println!("no session; start one with: new <stake>");
                    continue;
                };
                let Some(position) = argument.join(" ").parse::<CellPosition>().ok() else {
                    println!("usage: r <row-col>");
                    continue;
                };
                match engine.reveal(session_id, position.row, position.col) {
                    Ok(outcome) => {
                        report_outcome(&outcome);
                        if let Ok(snapshot) = engine.snapshot(session_id) {
                            let bomb = matches!(outcome, RevealOutcome::Bomb { .. }).then_some(position);
                            render(&snapshot, bomb);
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
            "c" | "cash" => {
                let Some(session_id) = current else {
                    println!("no session; start one with: new <stake>");
                    continue;
                };
                match engine.cash_out(session_id) {
                    Ok(receipt) => println!(
                        "Cashed out {} at {}x, balance {}",
                        receipt.payout, receipt.multiplier, receipt.balance
                    ),
                    Err(e) => println!("{}", e),
                }
            }
            "b" | "board" => match current.map(|id| engine.snapshot(id)) {
                Some(Ok(snapshot)) => render(&snapshot, None),
                _ => println!("no session"),
            },
            "balance" => println!("Balance {}", engine.balance()),
            "q" | "quit" | "exit" => break,
            _ => println!("{}", HELP),
        }
    }

    if let Some(worker) = worker {
        let stats = worker.shutdown().await;
        tracing::info!(delivered = stats.delivered, "Event sync stopped");
    }
    let pending = engine.events().pending_count();
    if pending > 0 {
        println!("{} events queued for delivery; run `gridstake sync` later", pending);
    }
    Ok(())
}

fn report_outcome(outcome: &RevealOutcome) {
    match outcome {
        RevealOutcome::Safe { position, multiplier, safe_reveals } => {
            println!("{} is safe: {} reveals, multiplier {}x", position, safe_reveals, multiplier)
        }
        RevealOutcome::Bomb { position, balance } => {
            println!("BOOM at {}: stake lost, balance {}", position, balance)
        }
        RevealOutcome::Perfect { multiplier, payout, balance, .. } => {
            println!("Perfect game! {} paid at {}x, balance {}", payout, multiplier, balance)
        }
    }
}

fn render(snapshot: &SessionSnapshot, bomb: Option<CellPosition>) {
    let mut out = String::from("   ");
    for col in 0..snapshot.grid_size {
        out.push_str(&format!("{:>2}", col));
    }
    out.push('\n');

    for row in 0..snapshot.grid_size {
        out.push_str(&format!("{:>2} ", row));
        for col in 0..snapshot.grid_size {
            let position = CellPosition::new(row, col);
            let symbol = if bomb == Some(position) {
                '*'
            } else if snapshot.revealed.contains(&position) {
                '.'
            } else {
                '#'
            };
            out.push(' ');
            out.push(symbol);
        }
        out.push('\n');
    }

    out.push_str(&format!(
        "{} | multiplier {}x | potential payout {}{}",
        snapshot.status,
        snapshot.multiplier,
        snapshot.potential_payout,
        if snapshot.can_cash_out { " | cash out available" } else { "" }
    ));
    println!("{}", out);
}
