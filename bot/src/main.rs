use std::error::Error;
use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mint_core::target::parse_address;
use mint_core::{
    BalanceRefresher, BalanceSnapshot, ChainClient, Connector, Credentials, LogEntry,
    LogSubscription, MintTarget, RunController,
};

mod client;
mod config;
mod shutdown;
mod tui;

use client::EvmConnector;
use config::{FileConfig, Overrides, Settings};
use tui::{App, InputResult, TuiUpdate};

/// Dashboard mode logs here instead of the terminal
const LOG_FILE: &str = "mint-bot.log";

#[derive(Parser, Debug)]
#[command(name = "mint-bot")]
#[command(about = "Submits one payable mint call per new block")]
struct Args {
    /// RPC URL (HTTP)
    #[arg(long, env = "RPC_URL")]
    rpc_url: Option<String>,

    /// Hex private key of the signing account
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Token address passed to mint(address)
    #[arg(long, env = "TOKEN_ADDRESS")]
    token: Option<String>,

    /// Mint contract address
    #[arg(long, env = "MINT_CONTRACT")]
    contract: Option<String>,

    /// Native value attached to each mint, in BNB ("0.01")
    #[arg(long, env = "MINT_VALUE")]
    value: Option<String>,

    /// Path to TOML config file (default ~/.config/mint-bot/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mint headless until Ctrl+C or a failed attempt
    Run {
        /// Print the attempt history as JSON on exit
        #[arg(long)]
        json: bool,
    },

    /// Live TUI dashboard with start/stop controls
    Dashboard,

    /// Print native and token balances once
    Balance,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            rpc_url: self.rpc_url.clone(),
            private_key: self.private_key.clone(),
            token: self.token.clone(),
            contract: self.contract.clone(),
            value: self.value.clone(),
        }
    }
}

fn init_logging(to_file: bool) -> Result<(), Box<dyn Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if to_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(LOG_FILE)?;
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(matches!(args.command, Commands::Dashboard))?;

    let file = FileConfig::load_or_default(args.config.as_deref())?;
    let settings = Settings::resolve(file, args.overrides());
    info!("RPC:      {}", settings.rpc_url);
    info!("Contract: {}", settings.contract);
    info!("Value:    {} BNB", settings.value);

    match args.command {
        Commands::Run { json } => run_headless(settings, json).await,
        Commands::Dashboard => run_dashboard(settings).await,
        Commands::Balance => run_balance(settings).await,
    }
}

// =============================================================================
// Headless
// =============================================================================

async fn run_headless(settings: Settings, json: bool) -> Result<(), Box<dyn Error>> {
    let target = settings.target()?;
    let connector = EvmConnector::new(&settings.rpc_url)?;
    let mut controller = RunController::new(connector, settings.loop_config);
    let shutdown = shutdown::spawn_shutdown_handler();

    let mut log = controller.log().subscribe();
    controller.start(settings.private_key.as_deref(), target)?;

    tokio::select! {
        _ = shutdown.wait() => {}
        _ = controller.follow_log(&mut log, print_entry) => {}
    }

    controller.stop();
    info!("Waiting for the mint loop to settle...");
    controller.join().await;
    log.drain().iter().for_each(print_entry);

    if json {
        println!("{}", serde_json::to_string_pretty(&controller.attempts())?);
    }
    Ok(())
}

fn print_entry(entry: &LogEntry) {
    println!("{}: {}", entry.index + 1, entry.message);
}

// =============================================================================
// Balance
// =============================================================================

async fn run_balance(settings: Settings) -> Result<(), Box<dyn Error>> {
    let token = settings
        .token_address()
        .ok_or("no token address configured (--token / TOKEN_ADDRESS)")??;
    let connector = EvmConnector::new(&settings.rpc_url)?;
    let controller = RunController::new(connector, settings.loop_config);

    let snapshot = controller
        .balance_refresher()
        .refresh(settings.private_key.as_deref(), token)
        .await?;
    println!("BNB Balance: {}", snapshot.native);
    println!("Mint Amount: {}", snapshot.token);
    Ok(())
}

// =============================================================================
// Dashboard
// =============================================================================

async fn run_dashboard(settings: Settings) -> Result<(), Box<dyn Error>> {
    let connector = EvmConnector::new(&settings.rpc_url)?;
    let account = settings
        .private_key
        .as_deref()
        .and_then(|key| Credentials::parse(Some(key)).ok())
        .and_then(|credentials| connector.connect(&credentials).ok())
        .map(|client| client.account());

    let mut controller = RunController::new(connector, settings.loop_config);
    let mut app = App::new(&settings.rpc_url, account, settings.token.as_deref());
    let (update_tx, mut update_rx) = mpsc::unbounded_channel::<TuiUpdate>();

    if !app.token().is_empty() {
        spawn_balance_refresh(
            controller.balance_refresher(),
            settings.private_key.clone(),
            app.token().to_string(),
            update_tx.clone(),
        );
    }

    // Set panic hook to restore terminal on panic
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = tui::restore();
        original_hook(panic_info);
    }));

    let mut terminal = tui::init()?;
    let mut ctx = DashboardContext {
        settings: &settings,
        log: controller.log().subscribe(),
        balances: controller.balances(),
        update_tx,
    };
    let result = run_tui_loop(&mut terminal, &mut app, &mut controller, &mut ctx, &mut update_rx).await;

    // Always restore terminal
    tui::restore()?;

    if controller.can_stop() {
        controller.stop();
        eprintln!("Waiting for the in-flight mint to settle...");
    }
    controller.join().await;

    result
}

struct DashboardContext<'a> {
    settings: &'a Settings,
    log: LogSubscription,
    balances: watch::Receiver<BalanceSnapshot>,
    update_tx: mpsc::UnboundedSender<TuiUpdate>,
}

/// Render, pull controller state, dispatch key presses
async fn run_tui_loop(
    terminal: &mut tui::Tui,
    app: &mut App,
    controller: &mut RunController<EvmConnector>,
    ctx: &mut DashboardContext<'_>,
    update_rx: &mut mpsc::UnboundedReceiver<TuiUpdate>,
) -> Result<(), Box<dyn Error>> {
    while app.running {
        while let Ok(update) = update_rx.try_recv() {
            app.apply_update(update);
        }

        app.push_log(ctx.log.drain());
        if ctx.balances.has_changed().unwrap_or(false) {
            let snapshot = *ctx.balances.borrow_and_update();
            app.accept_balances(snapshot);
        }
        app.run_state = controller.state();
        app.phase = controller.phase();
        app.last_confirmed = controller.last_confirmed_block();

        terminal.draw(|frame| tui::draw(frame, app))?;

        match tui::handle_input(app)? {
            InputResult::Quit => break,
            InputResult::Start => {
                let started = MintTarget::parse(&ctx.settings.contract, app.token(), &ctx.settings.value)
                    .and_then(|target| controller.start(ctx.settings.private_key.as_deref(), target));
                if let Err(e) = started {
                    warn!("Start rejected: {}", e);
                    app.set_status(e.to_string(), true);
                }
            }
            InputResult::Stop => controller.stop(),
            InputResult::ApplyToken(token) => {
                spawn_balance_refresh(
                    controller.balance_refresher(),
                    ctx.settings.private_key.clone(),
                    token,
                    ctx.update_tx.clone(),
                );
            }
            InputResult::Continue => {}
        }
    }

    Ok(())
}

/// Display-only refresh; never touches the run
fn spawn_balance_refresh<K: Connector>(
    refresher: BalanceRefresher<K>,
    private_key: Option<String>,
    token: String,
    updates: mpsc::UnboundedSender<TuiUpdate>,
) {
    tokio::spawn(async move {
        let update = match parse_address(&token) {
            Ok(token) => match refresher.refresh(private_key.as_deref(), token).await {
                Ok(snapshot) => TuiUpdate::BalancesRefreshed(snapshot),
                Err(e) => TuiUpdate::Status {
                    message: format!("Balance refresh failed: {}", e),
                    is_error: true,
                },
            },
            Err(e) => TuiUpdate::Status {
                message: e.to_string(),
                is_error: true,
            },
        };
        let _ = updates.send(update);
    });
}
