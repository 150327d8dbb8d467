use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use dropcart_browser::{PageDriver, PageSession, WebDriverDriver};
use dropcart_checkout::{
    build_adapter, AdapterContext, AntiBotPolicy, CheckoutSettings, Orchestrator,
    OrchestratorSettings, PurchaseGuard, Reporter, RetailerAdapter, RunOutcome,
};
use dropcart_core::{AppConfig, Storefront};

use crate::NOTIFY_TIMEOUT_SECS;

pub(crate) const EXIT_GUARD_SET: u8 = 2;
const EXIT_ROUND_LIMIT: u8 = 3;
const EXIT_CANCELLED: u8 = 130;

pub(crate) async fn run(config: AppConfig) -> anyhow::Result<ExitCode> {
    let guard = Arc::new(PurchaseGuard::new(&config.guard_path));
    if guard.exists() {
        tracing::info!(path = %guard.path().display(), "purchase already recorded; not starting");
        return Ok(ExitCode::from(EXIT_GUARD_SET));
    }

    let tasks = dropcart_core::load_tasks(&config.tasks_path)
        .with_context(|| format!("loading {}", config.tasks_path.display()))?;
    let profile = dropcart_core::load_profile(&config.profile_path)
        .with_context(|| format!("loading {}", config.profile_path.display()))?;

    let notifier = dropcart_notify::build_notifier(&profile.notifications, NOTIFY_TIMEOUT_SECS)?;
    let reporter = Reporter::new(Arc::new(notifier)).with_screenshot_dir(&config.screenshot_dir);

    let storefronts = tasks.storefronts();
    let sessions = open_sessions(&config, &storefronts).await?;

    let customer = Arc::new(profile.customer.clone());
    let payment = Arc::new(profile.payment.clone());
    let settings = CheckoutSettings::from_app_config(&config);
    let adapters: Vec<Box<dyn RetailerAdapter>> = storefronts
        .iter()
        .zip(sessions)
        .map(|(&storefront, session)| {
            let ctx = AdapterContext {
                storefront,
                session,
                reporter: reporter.clone(),
                guard: Arc::clone(&guard),
                customer: Arc::clone(&customer),
                payment: Arc::clone(&payment),
                login: profile.login_for(storefront).cloned(),
                settings: settings.clone(),
                antibot: AntiBotPolicy::default(),
                queue_state: tokio::sync::watch::channel(false).0,
            };
            build_adapter(ctx, tasks.for_storefront(storefront))
        })
        .collect();

    tracing::info!(
        adapters = adapters.len(),
        run_mode = %config.run_mode,
        test_mode = config.test_mode,
        "starting orchestrator"
    );
    let orchestrator = Orchestrator::new(
        adapters,
        guard,
        reporter,
        OrchestratorSettings::from_app_config(&config),
    );
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    });

    let report = orchestrator.run().await?;
    let code = match report.outcome {
        RunOutcome::Purchased { .. } | RunOutcome::DryRunComplete { .. } => ExitCode::SUCCESS,
        RunOutcome::AlreadyPurchased => ExitCode::from(EXIT_GUARD_SET),
        RunOutcome::RoundLimitReached { .. } => ExitCode::from(EXIT_ROUND_LIMIT),
        RunOutcome::Cancelled => ExitCode::from(EXIT_CANCELLED),
    };
    Ok(code)
}

/// One browser session per storefront, closing any already opened if a later
/// one fails.
async fn open_sessions(
    config: &AppConfig,
    storefronts: &[Storefront],
) -> anyhow::Result<Vec<Box<dyn PageSession>>> {
    let driver = WebDriverDriver::new(config.webdriver_url.clone(), config.headless);
    let mut sessions: Vec<Box<dyn PageSession>> = Vec::with_capacity(storefronts.len());
    for storefront in storefronts {
        match driver.new_session().await {
            Ok(session) => sessions.push(session),
            Err(e) => {
                for session in &sessions {
                    if let Err(close_err) = session.close().await {
                        tracing::warn!(error = %close_err, "closing session failed");
                    }
                }
                return Err(e).with_context(|| format!("opening browser session for {storefront}"));
            }
        }
    }
    Ok(sessions)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, stopping after the current step");
}
