mod run;

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dropcart_checkout::PurchaseGuard;
use dropcart_core::{AppConfig, Storefront};
use dropcart_notify::{Notification, Notifier, DEFAULT_CHANNEL};
use tracing_subscriber::EnvFilter;

/// Per-request timeout for notification transports.
pub(crate) const NOTIFY_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Parser)]
#[command(name = "dropcart")]
#[command(about = "Watches storefronts and buys the first configured product that comes in stock")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run purchase rounds until a purchase, a dry run or a terminal failure.
    Run {
        /// Run a single round and exit.
        #[arg(long)]
        once: bool,
        /// Actually place the order (overrides DROPCART_TEST_MODE).
        #[arg(long)]
        live: bool,
    },
    /// Load and validate every configuration file.
    CheckConfig,
    /// Report whether a purchase has already been recorded.
    Guard,
    /// Send a test message through every notification transport.
    NotifyTest,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let mut config = dropcart_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { once, live } => {
            if once {
                config.max_rounds = Some(1);
            }
            if live {
                config.test_mode = false;
            }
            run::run(config).await
        }
        Commands::CheckConfig => check_config(&config),
        Commands::Guard => Ok(guard_status(&config)),
        Commands::NotifyTest => notify_test(&config).await,
    }
}

fn check_config(config: &AppConfig) -> anyhow::Result<ExitCode> {
    let tasks = dropcart_core::load_tasks(&config.tasks_path)
        .with_context(|| format!("loading {}", config.tasks_path.display()))?;
    let profile = dropcart_core::load_profile(&config.profile_path)
        .with_context(|| format!("loading {}", config.profile_path.display()))?;

    println!("configuration: {config:?}");
    for storefront in Storefront::ALL {
        let products = tasks.for_storefront(storefront);
        if products.is_empty() {
            continue;
        }
        println!("{storefront}: {} product(s)", products.len());
        if !config.guest_checkout && profile.login_for(storefront).is_none() {
            anyhow::bail!("{storefront} has products but no login and guest checkout is disabled");
        }
    }
    if profile.notifications.is_empty() {
        println!("notifications: none configured, status goes to logs only");
    }
    println!(
        "mode: {}{}",
        config.run_mode,
        if config.test_mode { ", test mode (no order will be placed)" } else { "" }
    );
    Ok(ExitCode::SUCCESS)
}

fn guard_status(config: &AppConfig) -> ExitCode {
    let guard = PurchaseGuard::new(&config.guard_path);
    if guard.exists() {
        println!("purchase recorded at {}", guard.path().display());
        ExitCode::from(run::EXIT_GUARD_SET)
    } else {
        println!("no purchase recorded ({})", guard.path().display());
        ExitCode::SUCCESS
    }
}

async fn notify_test(config: &AppConfig) -> anyhow::Result<ExitCode> {
    let profile = dropcart_core::load_profile(&config.profile_path)
        .with_context(|| format!("loading {}", config.profile_path.display()))?;
    let notifier = dropcart_notify::build_notifier(&profile.notifications, NOTIFY_TIMEOUT_SECS)?;

    let channels = std::iter::once(DEFAULT_CHANNEL).chain(Storefront::ALL.map(Storefront::key));
    for channel in channels {
        notifier
            .send(&Notification::text(channel, format!("dropcart test message ({channel})")))
            .await
            .with_context(|| format!("sending to {channel}"))?;
    }
    println!("sent a test message to {} channel(s)", Storefront::ALL.len() + 1);
    Ok(ExitCode::SUCCESS)
}
