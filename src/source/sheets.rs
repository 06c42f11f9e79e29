//! Google Sheets values API source.

use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use super::RegistrationSource;
use super::auth::{SHEETS_READONLY_SCOPE, ServiceAccountKey};
use crate::config::{SheetsAuthConfig, SheetsConfig};
use crate::error::SourceError;
use crate::participant::Row;

/// Resolved credentials for the values API.
#[derive(Debug, Clone)]
pub enum SheetsAuth {
    ServiceAccount(ServiceAccountKey),
    ApiKey(SecretString),
}

/// Reads one fixed range of one spreadsheet.
pub struct SheetsSource {
    client: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    range: String,
    auth: SheetsAuth,
}

impl SheetsSource {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
        auth: SheetsAuth,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            auth,
        }
    }

    /// Build a source from configuration, loading the key file if needed.
    pub fn from_config(config: &SheetsConfig) -> Result<Self, SourceError> {
        let auth = match &config.auth {
            SheetsAuthConfig::ServiceAccount(path) => {
                SheetsAuth::ServiceAccount(ServiceAccountKey::from_file(path)?)
            }
            SheetsAuthConfig::ApiKey(key) => SheetsAuth::ApiKey(key.clone()),
        };
        Ok(Self::new(
            reqwest::Client::new(),
            config.api_base.clone(),
            config.spreadsheet_id.clone(),
            config.range.clone(),
            auth,
        ))
    }

    fn values_url(&self) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| {
            SourceError::Request(format!("invalid API base {}: {e}", self.api_base))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                SourceError::Request(format!("API base {} cannot hold a path", self.api_base))
            })?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                self.range.as_str(),
            ]);
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Flatten a JSON cell to display text.
fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl RegistrationSource for SheetsSource {
    async fn fetch_rows(&self) -> Result<Vec<Row>, SourceError> {
        let url = self.values_url()?;
        debug!(spreadsheet = %self.spreadsheet_id, range = %self.range, "Fetching registrations");

        let request = match &self.auth {
            SheetsAuth::ApiKey(key) => self
                .client
                .get(url)
                .query(&[("key", key.expose_secret())]),
            SheetsAuth::ServiceAccount(account) => {
                let token = account
                    .access_token(&self.client, SHEETS_READONLY_SCOPE)
                    .await?;
                self.client.get(url).bearer_auth(token.expose_secret())
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let range: ValueRange = response
            .json()
            .await
            .map_err(|e| SourceError::Request(format!("invalid values response: {e}")))?;

        let rows: Vec<Row> = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();

        info!(rows = rows.len(), range = %self.range, "Fetched registration rows");
        Ok(rows)
    }
}
