//! Demo Command - Run a full session against simulated collaborators

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cipherpulse_storage::Storage;
use cipherpulse_sync::sim::{CiphertextStore, LiveConnection, LocalSigner, SimulatedFhe, SimulatedLedger};
use cipherpulse_sync::{
    AuthorizationStorage, Clock, HealthReading, HealthSession, MetricField, OperationOutcome,
    Signer, SystemClock,
};
use clap::Args;
use tracing::info;

use crate::config::CliConfig;

/// Ledger latency while the account switch happens
const SWITCH_LATENCY: Duration = Duration::from_millis(200);

/// Run a simulated session
#[derive(Args)]
pub struct DemoCommand {
    /// Number of health records to submit
    #[arg(short, long, default_value_t = 3)]
    records: u32,

    /// Chain to connect to
    #[arg(long, default_value_t = cipherpulse_sync::LOCAL_CHAIN_ID)]
    chain_id: u64,

    /// Switch accounts while a submission is in flight
    #[arg(long)]
    switch_account: bool,

    /// Persist authorizations in the configured store instead of memory
    #[arg(long)]
    persist: bool,
}

impl DemoCommand {
    pub async fn execute(self, config: &CliConfig, data_dir: &Path) -> anyhow::Result<()> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ciphertexts = Arc::new(CiphertextStore::new());
        let fhe = Arc::new(SimulatedFhe::with_store(ciphertexts.clone(), clock.clone()));
        let ledger = Arc::new(SimulatedLedger::with_store(ciphertexts));
        let connection = Arc::new(LiveConnection::new(Some(self.chain_id)));
        let signer = Arc::new(LocalSigner::random());
        connection.set_signer(Some(signer.clone()));

        let mut builder = HealthSession::builder()
            .config(config.session.clone())
            .deployments(config.registry())
            .connection(connection.clone())
            .ledger(ledger.clone())
            .decryption(fhe)
            .clock(clock);
        if self.persist {
            let path = config.authorization_db(data_dir);
            info!("Authorizations persisted in {}", path.display());
            let storage: Arc<dyn AuthorizationStorage> = Arc::new(Storage::open(&path)?);
            builder = builder.authorization_storage(storage);
        }
        let session = builder.build()?;

        let Some(deployment) = session.check_deployment() else {
            anyhow::bail!("{}", session.status());
        };

        println!("Chain:    {} ({})", deployment.chain_name, deployment.chain_id);
        println!("Contract: {}", deployment.address);
        println!("Account:  {}", signer.address());
        println!();

        for i in 0..self.records {
            let reading = HealthReading::from_hours(68 + i * 4, 7_500 + i * 900, 6.5 + f64::from(i) * 0.5);
            let outcome = session.submit_health_data(reading).await;
            report(&format!("submit #{}", i + 1), &outcome, &session);
        }

        report("refresh", &session.refresh_scores().await, &session);
        report("decrypt scores", &session.decrypt_scores().await, &session);

        let view = session.view();
        for (field, value) in &view.scores {
            println!("    {:<12} {}", field.name(), value);
        }

        report(
            "fetch time series",
            &session.fetch_all_time_series_stats().await,
            &session,
        );
        report(
            "decrypt time series",
            &session.decrypt_time_series_stats().await,
            &session,
        );

        let view = session.view();
        for (field, value) in &view.time_series {
            println!("    {:<16} {}", field.name(), value);
        }

        if let Some(count) = session.record_count().await {
            println!("    records      {}", count);
        }
        println!(
            "    signing prompts: {}",
            session.authorizations().signing_requests()
        );

        if self.switch_account {
            switch_account(&session, &connection, &ledger).await;
        }

        Ok(())
    }
}

/// Submit, then change the selected account before the receipt arrives
async fn switch_account(
    session: &HealthSession,
    connection: &Arc<LiveConnection>,
    ledger: &Arc<SimulatedLedger>,
) {
    println!();
    ledger.set_latency(SWITCH_LATENCY);
    let other = Arc::new(LocalSigner::random());

    let (outcome, _) = tokio::join!(
        session.submit_health_data(HealthReading::new(90, 3_000, 50)),
        async {
            tokio::time::sleep(SWITCH_LATENCY / 4).await;
            println!("Account switched to {}", other.address());
            connection.set_signer(Some(other.clone()));
        }
    );
    report("submit (switched)", &outcome, session);

    ledger.set_latency(Duration::ZERO);
    report("refresh", &session.refresh_scores().await, session);
    println!(
        "    overall handle: {}",
        session
            .state()
            .score_handles
            .map(|h| h.overall.short())
            .unwrap_or_else(|| "-".into())
    );
}

fn report(step: &str, outcome: &OperationOutcome, session: &HealthSession) {
    let marker = match outcome {
        OperationOutcome::Completed => "✅",
        OperationOutcome::Failed(_) => "❌",
        _ => "⚠️ ",
    };
    let status = session.status();
    if status.is_empty() {
        println!("{} {:<20} {}", marker, step, outcome);
    } else {
        println!("{} {:<20} {} | {}", marker, step, outcome, status);
    }
}
