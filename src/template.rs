//! Pass template rendering via Handlebars.
//!
//! The template is compiled once at startup and shared across every
//! participant in the batch.

use std::path::Path;

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::RenderError;
use crate::participant::Participant;

const TEMPLATE_NAME: &str = "pass";

/// Values bound into the pass template.
///
/// Field names follow the placeholders used in `assets/pass.html`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassBindings {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Pass")]
    pub pass_type: String,
    /// Barcode text, used as the image alt text.
    #[serde(rename = "ALT")]
    pub alt: String,
    /// `cid:` or `data:` reference to the barcode image.
    pub barcode: String,
    #[serde(rename = "College")]
    pub college: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "headerImage")]
    pub header_image: Option<String>,
    #[serde(rename = "useHeaderFallback")]
    pub use_header_fallback: bool,
}

impl PassBindings {
    /// Bind a participant with the given image references.
    pub fn new(
        participant: &Participant,
        barcode_text: &str,
        barcode_ref: String,
        header_ref: Option<String>,
    ) -> Self {
        Self {
            name: participant.name.clone(),
            pass_type: participant.pass_type.clone(),
            alt: barcode_text.to_string(),
            barcode: barcode_ref,
            college: participant.college.clone(),
            city: participant.city.clone(),
            use_header_fallback: header_ref.is_none(),
            header_image: header_ref,
        }
    }
}

/// A compiled pass template.
#[derive(Debug)]
pub struct PassTemplate {
    registry: Handlebars<'static>,
}

impl PassTemplate {
    /// Compile a template from source text.
    pub fn parse(source: &str) -> Result<Self, RenderError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry
            .register_template_string(TEMPLATE_NAME, source)
            .map_err(|e| RenderError::Template(e.to_string()))?;
        Ok(Self { registry })
    }

    /// Read and compile a template file.
    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let source = std::fs::read_to_string(path)?;
        let template = Self::parse(&source)?;
        tracing::debug!(path = %path.display(), "Pass template compiled");
        Ok(template)
    }

    /// Render the template with the given bindings.
    pub fn render(&self, bindings: &PassBindings) -> Result<String, RenderError> {
        self.registry
            .render(TEMPLATE_NAME, bindings)
            .map_err(|e| RenderError::Template(e.to_string()))
    }
}
