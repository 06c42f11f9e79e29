//! Batch runner: verify the relay, fetch registrations, and send one pass
//! per row, strictly in sheet order.
//!
//! Fatal errors (relay verification, source fetch, schema mismatch) stop the
//! run before any row is sent. Everything that goes wrong for a single
//! participant is logged and the loop moves on.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::artifact::{self, ArtifactStrategy, PassAssets};
use crate::barcode::{self, BarcodeOptions};
use crate::error::{Error, PassError, Result};
use crate::mailer::{Dispatcher, OutgoingMail};
use crate::participant::{Participant, RowSchema};
use crate::source::RegistrationSource;

/// Everything a run needs, built once at startup.
pub struct BatchContext {
    pub source: Arc<dyn RegistrationSource>,
    pub strategy: Arc<dyn ArtifactStrategy>,
    pub dispatcher: Dispatcher,
    pub schema: RowSchema,
    pub barcode: BarcodeOptions,
    pub header_image_path: PathBuf,
    pub event_id: String,
    pub pass_type: String,
    /// Pause after every send attempt.
    pub send_delay: Duration,
}

pub struct BatchRunner {
    ctx: BatchContext,
}

impl BatchRunner {
    pub fn new(ctx: BatchContext) -> Self {
        Self { ctx }
    }

    /// Run the batch to completion.
    ///
    /// The artifact strategy is finished exactly once, on success or failure.
    pub async fn run(&self) -> Result<()> {
        let result = self.run_inner().await;
        self.ctx.strategy.finish().await;
        result
    }

    async fn run_inner(&self) -> Result<()> {
        self.ctx
            .dispatcher
            .verify()
            .await
            .map_err(Error::ConfigInvalid)?;

        let rows = self.ctx.source.fetch_rows().await?;
        if rows.is_empty() {
            info!("No data found.");
            return Ok(());
        }

        for (index, row) in rows.iter().enumerate() {
            self.ctx.schema.check(index, row)?;
        }

        info!(
            rows = rows.len(),
            strategy = self.ctx.strategy.name(),
            schema = self.ctx.schema.version,
            "Processing registrations"
        );

        for row in &rows {
            let participant = self.ctx.schema.participant(row, &self.ctx.pass_type);
            if !participant.is_deliverable() {
                continue;
            }

            info!(
                name = %participant.name,
                email = %participant.email,
                "Processing registration"
            );
            self.send_pass(&participant).await;

            tokio::time::sleep(self.ctx.send_delay).await;
        }

        Ok(())
    }

    /// Build and deliver one pass. Never fails the batch.
    pub async fn send_pass(&self, participant: &Participant) -> bool {
        let mail = match self.prepare(participant).await {
            Ok(mail) => mail,
            Err(e) => {
                error!(
                    name = %participant.name,
                    email = %participant.email,
                    error = %e,
                    "Error preparing pass"
                );
                return false;
            }
        };
        self.ctx.dispatcher.deliver(&mail).await
    }

    async fn prepare(
        &self,
        participant: &Participant,
    ) -> std::result::Result<OutgoingMail, PassError> {
        let barcode_text = barcode::barcode_text(&self.ctx.event_id, &participant.email);
        let barcode_png = barcode::generate(&barcode_text, &self.ctx.barcode)?;
        let header_png = artifact::load_header(&self.ctx.header_image_path).await;

        let assets = PassAssets {
            barcode_text,
            barcode_png,
            header_png,
        };
        Ok(self.ctx.strategy.package(participant, assets).await?)
    }
}
