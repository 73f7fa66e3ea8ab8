//! Main entry point for Baton server.
//!
//! Every instance runs the same fixed-delay trigger; the shared lock decides
//! which one does the work in each window.

use baton_election::{PeriodicTrigger, SimulatedWork};
use baton_server::{metrics, model::Configuration, startup};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize configuration and logging
    let configuration = Configuration::new()?;
    let logging_config = configuration.logging_config()?;
    let _logging_guard = startup::init_logging(&logging_config)?;

    metrics::init_metrics(&configuration.metrics_config()?)?;

    let instance = configuration.instance_id();
    let election_config = configuration.election_config()?;
    info!(
        instance = %instance,
        lock_key = %election_config.lock_key,
        ttl_ms = election_config.lock_ttl.as_millis() as u64,
        window_ms = election_config.leadership_window().as_millis() as u64,
        release_mode = %election_config.release_mode,
        "Starting Baton"
    );

    let store = startup::build_lock_store(&configuration)?;
    startup::check_lock_store(store.as_ref()).await;

    let shutdown = startup::wait_for_shutdown_signal().await;

    let trigger = PeriodicTrigger::new(store, election_config.clone(), instance.clone());
    let mut work = SimulatedWork::new(instance.clone(), election_config.max_work_duration);
    let summary = trigger.run(&mut work, &shutdown).await;

    info!(
        instance = %instance,
        firings = summary.firings,
        terms_led = summary.terms_led,
        denied = summary.denied,
        unavailable = summary.unavailable,
        iterations = summary.iterations,
        release_failures = summary.release_failures,
        "Baton stopped"
    );

    Ok(())
}
