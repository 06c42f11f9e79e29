//! Google service account authentication.
//!
//! Signs an RS256 JWT assertion with the account's private key and trades it
//! at the token endpoint for a short-lived bearer token.

use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Read-only spreadsheet scope.
pub const SHEETS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service account JSON key that the token flow needs.
#[derive(Debug, Clone)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: SecretString,
    pub private_key_id: Option<String>,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct KeyFile {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, SourceError> {
        let raw: KeyFile =
            serde_json::from_str(json).map_err(|e| SourceError::Credentials(e.to_string()))?;
        Ok(Self {
            client_email: raw.client_email,
            private_key: SecretString::from(raw.private_key),
            private_key_id: raw.private_key_id,
            token_uri: raw.token_uri,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Credentials(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Build the signed assertion for `scope`, valid from `issued_at`.
    pub fn assertion(&self, scope: &str, issued_at: i64) -> Result<String, SourceError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope,
            aud: &self.token_uri,
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.private_key.expose_secret().as_bytes())
            .map_err(|e| SourceError::Credentials(format!("private_key: {e}")))?;

        encode(&header, &claims, &key).map_err(|e| SourceError::Auth(e.to_string()))
    }

    /// Exchange a fresh assertion for an access token.
    pub async fn access_token(
        &self,
        client: &reqwest::Client,
        scope: &str,
    ) -> Result<SecretString, SourceError> {
        let assertion = self.assertion(scope, Utc::now().timestamp())?;

        let response = client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| SourceError::Auth(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Auth(format!("invalid token response: {e}")))?;

        tracing::debug!(
            account = %self.client_email,
            expires_in = token.expires_in,
            "Obtained service account access token"
        );
        Ok(SecretString::from(token.access_token))
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}
