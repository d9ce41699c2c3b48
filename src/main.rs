// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Use library instead of local modules
use coco_onboard::config::{Args, Command};
use coco_onboard::{CredentialStore, FlowKind, PaymentLedger, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    if let Err(e) = args.validate() {
        eprintln!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }

    init_logging(&args)?;
    info!(version = coco_onboard::VERSION, db = %args.db_path.display(), "coco-onboard starting");

    let store = Arc::new(
        SqliteStore::open(&args.db_path)
            .with_context(|| format!("opening {}", args.db_path.display()))?,
    );

    match args.command() {
        Command::Register { flow } => run_register(&args, flow, store).await?,
        Command::History { user_id } => show_history(&store, user_id)?,
        Command::Whoami => show_session(&store)?,
        Command::Logout => {
            store.clear_session()?;
            println!("✓ Saved session cleared");
        }
    }

    Ok(())
}

/// Logs go to a file so they never tear the terminal UI
fn init_logging(args: &Args) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.log_file)
        .with_context(|| format!("opening log file {}", args.log_file.display()))?;

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("coco_onboard={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();

    Ok(())
}

#[cfg(feature = "tui")]
async fn run_register(args: &Args, flow: FlowKind, store: Arc<SqliteStore>) -> Result<()> {
    use coco_onboard::{
        BackendApi, BackendLocation, CompletionGateway, DependentSelectorChain, DeviceLocation, HttpBackend,
    };

    println!("🌴 Loading {}...\n", flow.title());

    let backend = Arc::new(HttpBackend::new(args.client_config())?);
    if let Some(session) = store.load_session()? {
        backend.authorize(&session.token);
        println!("ℹ️  Found a saved session for user {}", session.user_id);
    }

    let (events, receiver) = tokio::sync::mpsc::unbounded_channel();
    let chain = Arc::new(DependentSelectorChain::new(backend.clone(), args.language));
    let gateway = Arc::new(
        CompletionGateway::new(
            backend.clone(),
            Arc::new(ui::PromptPaymentGateway::new(events.clone())),
            store.clone(),
            store.clone(),
            Arc::new(ui::ChannelUi::new(events.clone())),
        )
        .with_currency(&args.currency),
    );

    let definition = flow.build();
    let location: Option<Arc<dyn DeviceLocation>> = match args.position {
        Some(fix) if !definition.location_steps().is_empty() => {
            Some(Arc::new(BackendLocation::new(backend.clone(), Some(fix))))
        }
        _ => None,
    };
    let wizard = definition.into_controller()?;

    let mut app = ui::App::new(flow, wizard, chain, gateway, args.language, location, events);
    ui::run_ui(&mut app, receiver).await?;

    if app.gateway.is_completed() {
        println!("\n✅ Registration complete");
    } else {
        println!("\n👋 Wizard closed before submitting");
    }

    Ok(())
}

#[cfg(not(feature = "tui"))]
async fn run_register(_args: &Args, _flow: FlowKind, _store: Arc<SqliteStore>) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    std::process::exit(1);
}

fn show_history(store: &SqliteStore, user_id: Option<String>) -> Result<()> {
    let user_id = match user_id {
        Some(id) => id,
        None => store
            .load_session()?
            .map(|s| s.user_id)
            .context("no saved session; pass --user-id")?,
    };

    let attempts = store.payment_history(&user_id)?;
    println!("💳 Payment history for user {}", user_id);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if attempts.is_empty() {
        println!("No payments recorded");
        return Ok(());
    }

    for attempt in &attempts {
        println!(
            "{}  {:<10} {} {:>8.2}  {}  {}",
            attempt.created_at.format("%Y-%m-%d %H:%M"),
            attempt.outcome.as_str(),
            attempt.currency,
            attempt.amount,
            attempt.transaction_id.as_deref().unwrap_or("-"),
            attempt.failure_reason.as_deref().unwrap_or(""),
        );
    }
    println!("\n✓ {} attempt(s)", attempts.len());

    Ok(())
}

fn show_session(store: &SqliteStore) -> Result<()> {
    match store.load_session()? {
        Some(session) => {
            println!("👤 User {} (role {})", session.user_id, session.role_id);
            println!("   Saved at {}", session.saved_at);
            let events = store.events_for("user", &session.user_id)?;
            println!("   {} event(s) on record", events.len());
        }
        None => println!("No saved session"),
    }
    Ok(())
}
