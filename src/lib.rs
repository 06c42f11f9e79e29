//! Pass mailer: sends barcode event passes to spreadsheet registrants.

pub mod artifact;
pub mod barcode;
pub mod batch;
pub mod config;
pub mod error;
pub mod mailer;
pub mod participant;
pub mod source;
pub mod template;
