use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use inbox_triage::audit::JsonFileAuditLog;
use inbox_triage::config::{ModelConfig, TriageConfig};
use inbox_triage::error::{ConfigError, Result};
use inbox_triage::llm::create_provider;
use inbox_triage::mailbox::{GmailConfig, GmailMailbox, Mailbox};
use inbox_triage::pipeline::{Scheduler, TriagePipeline};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = TriageConfig::from_env().unwrap_or_else(|e| exit_with(&e));
    let models = ModelConfig::from_env().unwrap_or_else(|e| exit_with(&e));
    let gmail = GmailConfig::from_env().unwrap_or_else(|e| exit_with(&e));

    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📬 Inbox Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Classifier: {}", models.classifier.model);
    eprintln!("   Verifier: {}", models.verifier.model);
    eprintln!("   Audit store: {}", config.audit_path.display());
    eprintln!(
        "   Polling every {}s, up to {} message(s) per cycle\n",
        config.poll_interval.as_secs(),
        config.batch_size
    );

    let pipeline = build_pipeline(&config, &models, gmail).await?;
    let scheduler = Scheduler::new(Arc::new(pipeline), config.poll_interval, config.batch_size);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown signal received");
        signal_token.cancel();
    });

    scheduler.run(cancel).await;
    Ok(())
}

/// Construct collaborators and hand them to the pipeline.
async fn build_pipeline(
    config: &TriageConfig,
    models: &ModelConfig,
    gmail: GmailConfig,
) -> Result<TriagePipeline> {
    let classifier_llm = create_provider(&models.classifier)?;
    let verifier_llm = if models.verifier.model == models.classifier.model {
        Arc::clone(&classifier_llm)
    } else {
        create_provider(&models.verifier)?
    };

    let mailbox = Arc::new(GmailMailbox::connect(gmail).await?);
    let audit = Arc::new(JsonFileAuditLog::new(config.audit_path.clone()));
    tracing::info!(
        mailbox = mailbox.name(),
        audit = %audit.path().display(),
        "Collaborators ready"
    );

    Ok(TriagePipeline::new(
        mailbox,
        classifier_llm,
        verifier_llm,
        audit,
    ))
}

fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inbox-triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter())
                .with(tracing_subscriber::fmt::layer().with_target(false))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .init();
            None
        }
    }
}

fn exit_with(err: &ConfigError) -> ! {
    eprintln!("Error: {err}");
    std::process::exit(1);
}
