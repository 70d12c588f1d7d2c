use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use kafka_dup_auditor::audit::cancel_after;
use kafka_dup_auditor::kafka::KafkaTransport;
use kafka_dup_auditor::{Auditor, Config};

fn setup_tracing() {
    // stdout carries the report, so logs go to stderr
    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );
    tracing_subscriber::registry().with(log_layer).init();
}

/// Cancel `cancel` on ctrl-c. Independent of the deadline watcher, so a
/// failed signal handler never disables the deadline.
fn spawn_ctrl_c_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    info!("Received ctrl-c, cancelling audit");
                    cancel.cancel();
                }
                Err(e) => warn!(error = ?e, "Failed to listen for ctrl-c"),
            },
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();

    let config = Config::init_with_defaults()
        .context("Failed to load configuration from environment variables")?;
    let settings = config
        .audit_settings()
        .context("Configuration does not describe a valid audit")?;
    let credentials = config
        .credential_provider()
        .context("Invalid SASL configuration")?;
    let transport = KafkaTransport::from_config(&config, credentials.as_ref())
        .context("Failed to build Kafka client configuration")?;

    info!(
        topic = %settings.topic,
        brokers = %config.kafka_hosts,
        policy = settings.policy.kind(),
        "Starting duplicate audit"
    );

    let cancel = CancellationToken::new();
    spawn_ctrl_c_watcher(cancel.clone());
    let deadline_watcher = config
        .audit_deadline()
        .map(|deadline| cancel_after(cancel.clone(), deadline));

    let topic = settings.topic.clone();
    let result = Auditor::new(Arc::new(transport), settings)
        .run(cancel.clone())
        .await
        .with_context(|| format!("Duplicate audit of topic {topic} failed"))?;
    // stop the watchers
    cancel.cancel();
    if let Some(watcher) = deadline_watcher {
        watcher.await.context("Deadline watcher failed")?;
    }

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &result).context("Failed to write report")?;
    writeln!(stdout).context("Failed to write report")?;

    Ok(())
}
