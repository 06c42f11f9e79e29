//! Artifact strategies: turn a participant and their pass assets into a
//! ready-to-send mail.
//!
//! - [`InlineStrategy`]: HTML body with `cid:` image parts
//! - [`PdfStrategy`]: pass printed to PDF by a [`PdfRenderer`]

pub mod inline;
pub mod pdf;

use std::path::Path;

use async_trait::async_trait;
use tracing::warn;

use crate::error::RenderError;
use crate::mailer::OutgoingMail;
use crate::participant::Participant;

pub use inline::InlineStrategy;
pub use pdf::{ChromiumRenderer, PdfRenderer, PdfStrategy};

/// Content id of the barcode part in inline mails.
pub const BARCODE_CID: &str = "barcodeImage";

/// Content id of the header part in inline mails.
pub const HEADER_CID: &str = "headerImage";

/// Per-participant binary inputs to packaging.
#[derive(Debug, Clone)]
pub struct PassAssets {
    /// Text encoded in the barcode (`<event>_<email>`).
    pub barcode_text: String,
    pub barcode_png: Vec<u8>,
    /// `None` when the header image asset is missing.
    pub header_png: Option<Vec<u8>>,
}

/// Packaging method for the rendered pass.
#[async_trait]
pub trait ArtifactStrategy: Send + Sync {
    /// Short label for logging.
    fn name(&self) -> &'static str;

    /// Render the pass and wrap it into a mail addressed to `participant`.
    async fn package(
        &self,
        participant: &Participant,
        assets: PassAssets,
    ) -> Result<OutgoingMail, RenderError>;

    /// Release engine resources at the end of the run.
    async fn finish(&self) {}
}

/// Read the header image, or `None` with a warning if it cannot be read.
///
/// Called once per send; the file is not cached.
pub async fn load_header(path: &Path) -> Option<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Header image not found");
            None
        }
    }
}
