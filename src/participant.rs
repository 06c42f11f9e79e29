//! Participant records and the column schema that maps sheet rows onto them.

use crate::error::SourceError;

/// One raw spreadsheet row, cells in column order.
pub type Row = Vec<String>;

/// A registrant derived from one spreadsheet row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Participant {
    pub timestamp: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub college: String,
    pub age: String,
    pub city: String,
    pub source: String,
    /// Not read from the sheet; filled from configuration.
    pub pass_type: String,
}

impl Participant {
    /// Whether this participant has an address to send to.
    pub fn is_deliverable(&self) -> bool {
        !self.email.is_empty()
    }
}

/// A participant field that a sheet column can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Timestamp,
    Name,
    Phone,
    Email,
    College,
    Age,
    City,
    Source,
}

/// Named, versioned mapping from column position to participant field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSchema {
    pub version: &'static str,
    pub columns: &'static [Field],
}

impl RowSchema {
    /// Registration form export: columns A–H, header row excluded.
    pub const V1: RowSchema = RowSchema {
        version: "registration-v1",
        columns: &[
            Field::Timestamp,
            Field::Name,
            Field::Phone,
            Field::Email,
            Field::College,
            Field::Age,
            Field::City,
            Field::Source,
        ],
    };

    /// Number of columns this schema binds.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Reject a row wider than the schema.
    ///
    /// `index` is the zero-based position of the row in the fetched range
    /// and only appears in the error.
    pub fn check(&self, index: usize, row: &[String]) -> Result<(), SourceError> {
        if row.len() > self.width() {
            return Err(SourceError::SchemaMismatch {
                row: index,
                cells: row.len(),
                schema: self.version,
                width: self.width(),
            });
        }
        Ok(())
    }

    /// Map a row onto a participant. Missing trailing cells become empty.
    pub fn participant(&self, row: &[String], pass_type: &str) -> Participant {
        let mut participant = Participant {
            pass_type: pass_type.to_string(),
            ..Default::default()
        };

        for (field, cell) in self.columns.iter().zip(row.iter()) {
            let cell = cell.trim().to_string();
            match field {
                Field::Timestamp => participant.timestamp = cell,
                Field::Name => participant.name = cell,
                Field::Phone => participant.phone = cell,
                Field::Email => participant.email = cell,
                Field::College => participant.college = cell,
                Field::Age => participant.age = cell,
                Field::City => participant.city = cell,
                Field::Source => participant.source = cell,
            }
        }

        participant
    }
}
