//! Subscription service client: JSON over HTTPS with a bearer token.
//!
//! Transport-class failures (timeout, refused connection) are retried
//! with doubling backoff; everything else, malformed responses
//! included, folds into a uniform [`ApiOutcome`] for the caller to
//! present. Nothing here can take the overlay down.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{config as cfg, remote};

/// Uniform result of any service call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiOutcome {
    pub success: bool,
    pub message: String,
    pub payload: Option<Value>,
}

impl ApiOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: None,
        }
    }
}

/// Fold a JSON response body into an outcome.
///
/// The activation endpoint reports success by presence of a `status`
/// field rather than the generic `success` flag; honor both shapes.
pub fn fold_response(body: &Value) -> ApiOutcome {
    let obj = match body.as_object() {
        Some(obj) => obj,
        None => return ApiOutcome::failure("Unexpected response shape from service"),
    };
    let success = obj.contains_key("status")
        || obj.get("success").and_then(Value::as_bool).unwrap_or(false);
    let message = obj
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    ApiOutcome {
        success,
        message,
        payload: Some(body.clone()),
    }
}

/// Delays between attempts: doubling from the initial backoff.
/// `MAX_ATTEMPTS` tries means `MAX_ATTEMPTS - 1` sleeps.
fn backoff_delays() -> impl Iterator<Item = Duration> {
    (0..remote::MAX_ATTEMPTS.saturating_sub(1))
        .map(|i| remote::INITIAL_BACKOFF * 2u32.pow(i))
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

pub struct ApiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: String, token: Option<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(remote::REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// POST a JSON body, retrying transport-class failures only
    pub fn post(&self, path: &str, body: &Value) -> ApiOutcome {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut delays = backoff_delays();
        for attempt in 1..=remote::MAX_ATTEMPTS {
            let mut request = self.http.post(&url).json(body);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    debug!(url = %url, status = %status, attempt, "service call completed");
                    if !status.is_success() {
                        return ApiOutcome::failure(format!(
                            "Service returned HTTP {}",
                            status
                        ));
                    }
                    return match response.json::<Value>() {
                        Ok(json) => fold_response(&json),
                        Err(e) => {
                            ApiOutcome::failure(format!("Malformed service response: {e}"))
                        }
                    };
                }
                Err(e) if is_retryable(&e) && attempt < remote::MAX_ATTEMPTS => {
                    // delays yields exactly MAX_ATTEMPTS - 1 entries
                    if let Some(delay) = delays.next() {
                        warn!(url = %url, attempt, error = %e, delay_ms = delay.as_millis() as u64,
                              "transport failure, retrying");
                        thread::sleep(delay);
                    }
                }
                Err(e) => {
                    return ApiOutcome::failure(format!("Service unreachable: {e}"));
                }
            }
        }
        ApiOutcome::failure("Service unreachable after retries")
    }
}

/// Bearer-token persistence. Current format is a JSON document written
/// with owner-only permissions; a bare plaintext token from older
/// installs is still read and migrated forward on first load.
pub struct TokenStore {
    path: PathBuf,
    legacy_path: PathBuf,
}

impl TokenStore {
    pub fn new() -> Self {
        let mut dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        dir.push(cfg::APP_DIR);
        Self {
            path: dir.join("auth.json"),
            legacy_path: dir.join("token.txt"),
        }
    }

    #[cfg(test)]
    fn at(dir: &std::path::Path) -> Self {
        Self {
            path: dir.join("auth.json"),
            legacy_path: dir.join("token.txt"),
        }
    }

    /// Read failures degrade to no token; the service just treats the
    /// user as signed out.
    pub fn load(&self) -> Option<String> {
        if let Ok(contents) = fs::read_to_string(&self.path) {
            match serde_json::from_str::<Value>(&contents) {
                Ok(json) => {
                    return json
                        .get("token")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Unreadable token file, ignoring");
                    return None;
                }
            }
        }
        if let Ok(contents) = fs::read_to_string(&self.legacy_path) {
            let token = contents.trim().to_string();
            if token.is_empty() {
                return None;
            }
            info!("Migrating legacy token file");
            if let Err(e) = self.save(&token) {
                warn!(error = ?e, "Failed to migrate legacy token, keeping old file");
            } else if let Err(e) = fs::remove_file(&self.legacy_path) {
                warn!(path = %self.legacy_path.display(), error = %e,
                      "Failed to remove legacy token file");
            }
            return Some(token);
        }
        None
    }

    pub fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context(format!(
                "Failed to create data directory: {}",
                parent.display()
            ))?;
        }
        let contents = serde_json::to_string(&serde_json::json!({ "token": token }))
            .context("Failed to serialize token")?;
        fs::write(&self.path, contents)
            .context(format!("Failed to write token file to {}", self.path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .context("Failed to restrict token file permissions")?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove token file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generic_success_flag_folds_through() {
        let ok = fold_response(&json!({"success": true, "message": "welcome"}));
        assert!(ok.success);
        assert_eq!(ok.message, "welcome");

        let err = fold_response(&json!({"success": false, "message": "expired"}));
        assert!(!err.success);
        assert_eq!(err.message, "expired");
    }

    #[test]
    fn status_field_implies_success_without_flag() {
        let out = fold_response(&json!({"status": "active", "success": false}));
        assert!(out.success);
    }

    #[test]
    fn non_object_body_is_a_failure() {
        assert!(!fold_response(&json!("oops")).success);
        assert!(!fold_response(&json!([1, 2, 3])).success);
    }

    #[test]
    fn missing_flags_mean_failure() {
        let out = fold_response(&json!({"message": "hm"}));
        assert!(!out.success);
        assert_eq!(out.message, "hm");
    }

    #[test]
    fn backoff_doubles_from_initial() {
        let delays: Vec<Duration> = backoff_delays().collect();
        assert_eq!(delays.len(), (remote::MAX_ATTEMPTS - 1) as usize);
        assert_eq!(delays[0], remote::INITIAL_BACKOFF);
        assert_eq!(delays[1], remote::INITIAL_BACKOFF * 2);
    }

    #[test]
    fn refused_connection_retries_before_reporting() {
        // Nothing listens on port 1; connects are refused immediately,
        // so any elapsed time comes from the backoff sleeps between the
        // three attempts
        let client = ApiClient::new("http://127.0.0.1:1".to_string(), None).unwrap();
        let started = std::time::Instant::now();
        let outcome = client.post("v1/subscription", &json!({}));
        assert!(!outcome.success);
        assert!(outcome.message.contains("unreachable"), "{}", outcome.message);
        let total_backoff: Duration = backoff_delays().sum();
        assert!(
            started.elapsed() >= total_backoff,
            "returned after {:?}, before the backoff sleeps could have run",
            started.elapsed()
        );
    }

    #[test]
    fn token_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::at(dir.path());
        assert_eq!(store.load(), None);
        store.save("abc123").unwrap();
        assert_eq!(store.load(), Some("abc123".to_string()));
        store.clear().unwrap();
        assert_eq!(store.load(), None);
        store.clear().unwrap();
    }

    #[test]
    fn legacy_plaintext_token_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::at(dir.path());
        fs::write(dir.path().join("token.txt"), "old-token\n").unwrap();

        assert_eq!(store.load(), Some("old-token".to_string()));
        // Migrated into the current format; legacy file gone
        assert!(dir.path().join("auth.json").exists());
        assert!(!dir.path().join("token.txt").exists());
        assert_eq!(store.load(), Some("old-token".to_string()));
    }

    #[test]
    fn corrupt_token_file_degrades_to_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::at(dir.path());
        fs::write(dir.path().join("auth.json"), "{not json").unwrap();
        assert_eq!(store.load(), None);
    }
}
