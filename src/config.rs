//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SHEETS_RANGE: &str = "Sheet1!A2:H";
const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const DEFAULT_EVENT_ID: &str = "ELAN_24";
const DEFAULT_PASS_TYPE: &str = "General";
const DEFAULT_SUBJECT: &str = "Booking confirmed | Elan & nVision Fest Pass";
const DEFAULT_SEND_DELAY_MS: u64 = 1000;

/// How the rendered pass is packaged into the outgoing mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// HTML body with `cid:` referenced image parts.
    Inline,
    /// Generic body with the pass printed to a PDF attachment.
    Pdf,
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" | "html" => Ok(Self::Inline),
            "pdf" => Ok(Self::Pdf),
            other => Err(format!("expected `inline` or `pdf`, got `{other}`")),
        }
    }
}

/// Outbound mail relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// Skip certificate validation on the STARTTLS upgrade.
    pub accept_invalid_certs: bool,
}

/// How requests to the Sheets API are authorised.
#[derive(Debug, Clone)]
pub enum SheetsAuthConfig {
    /// Path to a service account JSON key.
    ServiceAccount(PathBuf),
    /// API key for link-shared sheets.
    ApiKey(SecretString),
}

/// Registration spreadsheet settings.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub range: String,
    pub api_base: String,
    pub auth: SheetsAuthConfig,
}

/// Pass rendering and pacing settings.
#[derive(Debug, Clone)]
pub struct PassSettings {
    pub template_path: PathBuf,
    pub header_image_path: PathBuf,
    pub event_id: String,
    pub pass_type: String,
    pub subject: String,
    pub strategy: StrategyKind,
    pub send_delay: Duration,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for PassSettings {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("assets/pass.html"),
            header_image_path: PathBuf::from("assets/header.png"),
            event_id: DEFAULT_EVENT_ID.to_string(),
            pass_type: DEFAULT_PASS_TYPE.to_string(),
            subject: DEFAULT_SUBJECT.to_string(),
            strategy: StrategyKind::Inline,
            send_delay: Duration::from_millis(DEFAULT_SEND_DELAY_MS),
            chrome_executable: None,
        }
    }
}

/// Complete configuration for one batch run.
#[derive(Debug, Clone)]
pub struct PassConfig {
    pub smtp: SmtpConfig,
    pub sheets: SheetsConfig,
    pub pass: PassSettings,
}

impl PassConfig {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required =
            |key: &str| var(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let username = required("EMAIL_USER")?;
        let password = SecretString::from(required("EMAIL_APP_PASSWORD")?);
        let from_address = var("EMAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone());

        let smtp = SmtpConfig {
            host: var("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            port: parse_or("SMTP_PORT", var("SMTP_PORT"), DEFAULT_SMTP_PORT)?,
            username,
            password,
            from_address,
            accept_invalid_certs: parse_bool(
                "SMTP_ACCEPT_INVALID_CERTS",
                var("SMTP_ACCEPT_INVALID_CERTS"),
                true,
            )?,
        };

        let auth = match (var("GOOGLE_SERVICE_ACCOUNT_KEY"), var("GOOGLE_API_KEY")) {
            (Some(path), _) => SheetsAuthConfig::ServiceAccount(PathBuf::from(path)),
            (None, Some(key)) => SheetsAuthConfig::ApiKey(SecretString::from(key)),
            (None, None) => {
                return Err(ConfigError::MissingRequired {
                    key: "GOOGLE_SERVICE_ACCOUNT_KEY".to_string(),
                    hint: "Set a service account key path or GOOGLE_API_KEY".to_string(),
                });
            }
        };

        let sheets = SheetsConfig {
            spreadsheet_id: required("SHEETS_SPREADSHEET_ID")?,
            range: var("SHEETS_RANGE").unwrap_or_else(|| DEFAULT_SHEETS_RANGE.to_string()),
            api_base: var("SHEETS_API_BASE")
                .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string()),
            auth,
        };

        let defaults = PassSettings::default();
        let strategy = match var("PASS_STRATEGY") {
            Some(raw) => raw.parse::<StrategyKind>().map_err(|message| ConfigError::InvalidValue {
                key: "PASS_STRATEGY".to_string(),
                message,
            })?,
            None => defaults.strategy,
        };
        let delay_ms = parse_or(
            "PASS_SEND_DELAY_MS",
            var("PASS_SEND_DELAY_MS"),
            DEFAULT_SEND_DELAY_MS,
        )?;

        let pass = PassSettings {
            template_path: var("PASS_TEMPLATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_path),
            header_image_path: var("PASS_HEADER_IMAGE")
                .map(PathBuf::from)
                .unwrap_or(defaults.header_image_path),
            event_id: var("PASS_EVENT_ID").unwrap_or(defaults.event_id),
            pass_type: var("PASS_TYPE").unwrap_or(defaults.pass_type),
            subject: var("PASS_SUBJECT").unwrap_or(defaults.subject),
            strategy,
            send_delay: Duration::from_millis(delay_ms),
            chrome_executable: var("CHROME_EXECUTABLE").map(PathBuf::from),
        };

        Ok(Self { smtp, sheets, pass })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got `{other}`"),
        }),
    }
}
