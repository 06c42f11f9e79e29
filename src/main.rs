use std::sync::Arc;

use pass_mailer::artifact::{ArtifactStrategy, ChromiumRenderer, InlineStrategy, PdfStrategy};
use pass_mailer::barcode::BarcodeOptions;
use pass_mailer::batch::{BatchContext, BatchRunner};
use pass_mailer::config::{PassConfig, StrategyKind};
use pass_mailer::mailer::{Dispatcher, SmtpMailer};
use pass_mailer::participant::RowSchema;
use pass_mailer::source::SheetsSource;
use pass_mailer::template::PassTemplate;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PassConfig::from_env()?;

    eprintln!("🎟  Pass Mailer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Sheet: {} ({})", config.sheets.spreadsheet_id, config.sheets.range);
    eprintln!("   Relay: {}:{}", config.smtp.host, config.smtp.port);
    eprintln!("   Strategy: {:?}", config.pass.strategy);
    eprintln!("   Template: {}", config.pass.template_path.display());

    tracing::info!("Starting to process registrations...");

    let mailer = SmtpMailer::new(&config.smtp)?;
    let source = SheetsSource::from_config(&config.sheets)?;

    // Compiled once, shared by every participant
    let template = Arc::new(PassTemplate::load(&config.pass.template_path)?);

    let strategy: Arc<dyn ArtifactStrategy> = match config.pass.strategy {
        StrategyKind::Inline => Arc::new(InlineStrategy::new(
            Arc::clone(&template),
            config.pass.subject.clone(),
        )),
        // Chromium starts on the first print, after the relay check
        StrategyKind::Pdf => Arc::new(PdfStrategy::new(
            Arc::clone(&template),
            Arc::new(ChromiumRenderer::new(
                config.pass.chrome_executable.as_deref(),
            )),
            config.pass.subject.clone(),
        )?),
    };

    let runner = BatchRunner::new(BatchContext {
        source: Arc::new(source),
        strategy,
        dispatcher: Dispatcher::new(Arc::new(mailer)),
        schema: RowSchema::V1,
        barcode: BarcodeOptions::default(),
        header_image_path: config.pass.header_image_path.clone(),
        event_id: config.pass.event_id.clone(),
        pass_type: config.pass.pass_type.clone(),
        send_delay: config.pass.send_delay,
    });

    if let Err(e) = runner.run().await {
        tracing::error!(error = %e, "Batch aborted");
        return Err(e.into());
    }

    tracing::info!("Finished processing registrations.");
    Ok(())
}
