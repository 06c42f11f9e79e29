//! Registration sources.
//!
//! A source returns the raw rows of the registration range; mapping rows to
//! participants happens in the batch runner through [`RowSchema`].
//!
//! [`RowSchema`]: crate::participant::RowSchema

pub mod auth;
pub mod sheets;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::participant::Row;

pub use sheets::SheetsSource;

/// Read-only tabular registration data.
#[async_trait]
pub trait RegistrationSource: Send + Sync {
    /// Fetch every row of the configured range, in sheet order.
    ///
    /// An empty range is `Ok(vec![])`, not an error.
    async fn fetch_rows(&self) -> Result<Vec<Row>, SourceError>;
}
