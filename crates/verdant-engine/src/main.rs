//! Verdant engine binary.
//!
//! Wires the configured state store, the GitHub activity source and the
//! optional feedback generator into one reconciler per account, then runs
//! the cycle driver next to the Observer API until `Ctrl-C` or
//! `POST /api/stop`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `$VERDANT_CONFIG` or `verdant-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect the state store (migrations run for `PostgreSQL`)
//! 4. Build the activity source and feedback generator
//! 5. Seed the observer state from persisted records
//! 6. Start the Observer API server
//! 7. Run the cycle driver until a stop is requested

mod error;
mod observer_callback;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use verdant_core::config::{LogFormat, LoggingConfig, VerdantConfig};
use verdant_core::decay::DecayPolicy;
use verdant_core::driver::{CycleDriver, DriverControl};
use verdant_core::lock::AccountLocks;
use verdant_core::reconcile::Reconciler;
use verdant_core::store::StateStore;
use verdant_observer::{AccountView, AppState};
use verdant_remote::{AnyFeedbackGenerator, GitHubActivitySource};
use verdant_types::AccountId;

use crate::error::EngineError;
use crate::observer_callback::ObserverCallback;
use crate::store::AnyStateStore;

/// Config file used when `VERDANT_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "verdant-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration (before logging, which it configures).
    let (config, config_path, found) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        path = %config_path.display(),
        found,
        accounts = config.accounts.len(),
        interval_secs = config.schedule.interval_secs,
        threshold_hours = config.decay.threshold_hours,
        "verdant-engine starting"
    );
    if config.accounts.is_empty() {
        warn!("No accounts configured, cycles will do nothing");
    }

    // 3. Connect the state store.
    let store = Arc::new(AnyStateStore::connect(&config.storage).await?);
    info!(backend = store.name(), "State store connected");

    // 4. Build collaborators.
    let source = Arc::new(GitHubActivitySource::from_config(
        &config.github,
        &config.accounts,
    )?);
    let feedback = AnyFeedbackGenerator::from_config(&config.feedback)?.map(Arc::new);
    info!(
        accounts = source.account_count(),
        feedback = feedback.as_deref().map_or("disabled", AnyFeedbackGenerator::name),
        "Collaborators ready"
    );

    let policy = DecayPolicy::new(config.decay.threshold());
    let locks = Arc::new(AccountLocks::new());
    let reconcilers: Vec<_> = config
        .accounts
        .iter()
        .map(|account| {
            Reconciler::new(
                AccountId::new(account.id.as_str()),
                Arc::clone(&store),
                Arc::clone(&source),
                policy,
                Arc::clone(&locks),
            )
        })
        .collect();

    let control = Arc::new(DriverControl::new());
    let mut driver = CycleDriver::new(reconcilers, Arc::clone(&control), &config.schedule);
    if let Some(generator) = feedback {
        driver = driver.with_feedback(generator);
    }

    // 5. Seed the observer state.
    let app_state =
        Arc::new(AppState::with_control(Arc::clone(&control)).with_policy(policy));
    for account in &config.accounts {
        let id = AccountId::new(account.id.as_str());
        let view = match store.load(&id).await {
            Ok(Some(record)) => AccountView::from_state(id, record.value),
            Ok(None) => AccountView::unknown(id),
            Err(e) => {
                warn!(account = %id, error = %e, "Could not read persisted state");
                AccountView::unknown(id)
            }
        };
        app_state.register(view).await;
    }

    // 6. Start the Observer API server.
    let server_shutdown = Arc::new(Notify::new());
    let server = if config.observer.enabled {
        let observer_config = config.observer.clone();
        let state = Arc::clone(&app_state);
        let shutdown = Arc::clone(&server_shutdown);
        Some(tokio::spawn(async move {
            verdant_observer::start_server(&observer_config, state, async move {
                shutdown.notified().await;
            })
            .await
        }))
    } else {
        info!("Observer API disabled");
        None
    };

    {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received, stopping after the current pass"),
                Err(e) => warn!(error = %e, "Could not listen for Ctrl-C, stopping"),
            }
            control.request_stop();
        });
    }

    // 7. Run the driver.
    let (mut callback, updates) = ObserverCallback::spawn(Arc::clone(&app_state));
    let passes = driver.run(&mut callback).await;
    drop(callback);
    if let Err(e) = updates.await {
        warn!(error = %e, "Observer update task failed");
    }

    server_shutdown.notify_one();
    if let Some(handle) = server {
        handle
            .await
            .map_err(|e| EngineError::Observer {
                message: format!("observer task failed: {e}"),
            })?
            .map_err(|e| EngineError::Observer {
                message: e.to_string(),
            })?;
    }

    info!(passes, "verdant-engine shutdown complete");
    Ok(())
}

/// Read and validate the configuration.
///
/// A missing file yields defaults; an unreadable or invalid one is an
/// error.
fn load_config() -> Result<(VerdantConfig, PathBuf, bool), EngineError> {
    let path = std::env::var_os("VERDANT_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let found = path.exists();
    let config = if found {
        VerdantConfig::from_file(&path)?
    } else {
        VerdantConfig::parse("")?
    };
    config.validate()?;
    Ok((config, path, found))
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
