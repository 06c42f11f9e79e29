//! Error types for the pass mailer.

/// Top-level error type for a batch run.
///
/// Every variant here is fatal: the batch stops before (or instead of)
/// processing further rows. Per-participant failures use [`PassError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Mail relay verification failed: {0}")]
    ConfigInvalid(ConfigError),

    #[error("Registration source unavailable: {0}")]
    Source(#[from] SourceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Mail relay rejected the handshake: {0}")]
    Relay(String),
}

/// Registration source errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Spreadsheet request failed: {0}")]
    Request(String),

    #[error("Spreadsheet API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid service account key: {0}")]
    Credentials(String),

    #[error("Row {row} has {cells} cells but schema {schema} maps only {width} columns")]
    SchemaMismatch {
        row: usize,
        cells: usize,
        schema: &'static str,
        width: usize,
    },
}

/// Barcode encoding errors.
#[derive(Debug, thiserror::Error)]
pub enum BarcodeError {
    #[error("Barcode text is empty")]
    Empty,

    #[error("Character {ch:?} at position {position} is not encodable in Code 128 set B")]
    UnsupportedCharacter { ch: char, position: usize },

    #[error("Symbology rejected input: {0}")]
    Symbology(String),

    #[error("Image encoding failed: {0}")]
    Image(String),
}

/// Template binding and document rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Template(String),

    #[error("Template IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("PDF print failed: {0}")]
    Pdf(String),
}

/// Mail delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Relay rejected message: {0}")]
    Relay(String),
}

/// Errors that fail a single participant's send without stopping the batch.
#[derive(Debug, thiserror::Error)]
pub enum PassError {
    #[error("Barcode error: {0}")]
    Encoding(#[from] BarcodeError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

/// Result type alias for batch-level operations.
pub type Result<T> = std::result::Result<T, Error>;
