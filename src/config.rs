//! Backend configuration.
//!
//! Resolution order: explicit values, environment, then the OS credential
//! store. The environment accepts either the separate `SUPABASE_URL` /
//! `SUPABASE_ANON_KEY` pair or a single `BACKOFFICE_CONNECTION` string.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::{FixedOffset, Offset, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage;

pub const ENV_URL: &str = "SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_CONNECTION: &str = "BACKOFFICE_CONNECTION";
pub const ENV_TIMEOUT_SECS: &str = "BACKOFFICE_TIMEOUT_SECS";
pub const ENV_UTC_OFFSET_MINUTES: &str = "BACKOFFICE_UTC_OFFSET_MINUTES";
pub const ENV_BUSINESS_NAME: &str = "BACKOFFICE_BUSINESS_NAME";

/// Default timeout for backend requests (20 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

pub const DEFAULT_BUSINESS_NAME: &str = "PINTAMAX";

#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// Project URL without the `/rest/v1` suffix.
    pub url: String,
    pub anon_key: String,
    pub request_timeout: Duration,
    /// Offset used to turn a business day into a UTC window.
    pub utc_offset: FixedOffset,
    /// Printed at the top of cash-cut reports.
    pub business_name: String,
}

impl BackendConfig {
    pub fn new(url: &str, anon_key: &str) -> Result<Self> {
        let url = normalize_backend_url(url);
        let anon_key = anon_key.trim().to_string();
        if url.is_empty() {
            return Err(Error::Config("backend URL is not configured".into()));
        }
        if anon_key.is_empty() {
            return Err(Error::Config("backend anon key is not configured".into()));
        }
        Ok(Self {
            url,
            anon_key,
            request_timeout: DEFAULT_TIMEOUT,
            utc_offset: utc(),
            business_name: DEFAULT_BUSINESS_NAME.to_string(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn with_business_name(mut self, name: &str) -> Self {
        let name = name.trim();
        if !name.is_empty() {
            self.business_name = name.to_string();
        }
        self
    }

    /// Resolve from the environment, falling back to the credential store for
    /// the URL and key.
    pub fn from_env() -> Result<Self> {
        let (mut url, mut key) = (env_value(ENV_URL), env_value(ENV_ANON_KEY));

        if let Some(raw) = env_value(ENV_CONNECTION) {
            match decode_connection_string(&raw) {
                Some((decoded_url, decoded_key)) => {
                    url = url.or(Some(decoded_url));
                    key = key.or(Some(decoded_key));
                }
                None => warn!("{ENV_CONNECTION} is set but could not be decoded"),
            }
        }

        let url = url
            .or_else(|| storage::get_credential(storage::KEY_SUPABASE_URL))
            .ok_or_else(|| Error::Config("backend URL is not configured".into()))?;
        let key = key
            .or_else(|| storage::get_credential(storage::KEY_SUPABASE_ANON_KEY))
            .ok_or_else(|| Error::Config("backend anon key is not configured".into()))?;

        let mut config = Self::new(&url, &key)?;

        if let Some(raw) = env_value(ENV_TIMEOUT_SECS) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => warn!(value = %raw, "ignoring invalid {ENV_TIMEOUT_SECS}"),
            }
        }
        if let Some(raw) = env_value(ENV_UTC_OFFSET_MINUTES) {
            match parse_utc_offset_minutes(&raw) {
                Some(offset) => config.utc_offset = offset,
                None => warn!(value = %raw, "ignoring invalid {ENV_UTC_OFFSET_MINUTES}"),
            }
        }
        if let Some(name) = env_value(ENV_BUSINESS_NAME) {
            config = config.with_business_name(&name);
        }

        debug!(url = %config.url, offset = %config.utc_offset, "backend config resolved");
        Ok(config)
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Minutes east of UTC, e.g. `-360` for Mexico City.
pub fn parse_utc_offset_minutes(raw: &str) -> Option<FixedOffset> {
    let minutes: i32 = raw.trim().parse().ok()?;
    FixedOffset::east_opt(minutes.checked_mul(60)?)
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise a backend URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/rest/v1` segment
///
/// Blank input stays blank.
pub fn normalize_backend_url(url: &str) -> String {
    let mut url = url.trim().to_string();
    if url.is_empty() {
        return url;
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/rest/v1") {
        url.truncate(url.len() - "/rest/v1".len());
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Connection strings
// ---------------------------------------------------------------------------

fn decode_connection_payload(raw: &str) -> Option<Value> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.starts_with('{') {
        return serde_json::from_str::<Value>(&compact).ok();
    }
    if compact.len() < 20 {
        return None;
    }

    // base64url is accepted as well as standard base64, padded or not.
    let base64 = compact.replace('-', "+").replace('_', "/");
    let padded = format!(
        "{}{}",
        base64,
        "=".repeat((4usize.wrapping_sub(base64.len() % 4)) % 4)
    );
    let decoded = BASE64_STANDARD.decode(padded).ok()?;
    serde_json::from_slice::<Value>(&decoded).ok()
}

/// Decode a connection string into `(url, anon_key)`.
///
/// The string is JSON `{"url": "...", "key": "..."}` or the base64 encoding
/// of it.
pub fn decode_connection_string(raw: &str) -> Option<(String, String)> {
    let payload = decode_connection_payload(raw)?;
    let field = |names: &[&str]| {
        names
            .iter()
            .find_map(|n| payload.get(*n).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let url = field(&["url", "supabaseUrl"]).map(|u| normalize_backend_url(&u))?;
    let key = field(&["key", "anonKey", "supabaseAnonKey"])?;
    Some((url, key))
}
