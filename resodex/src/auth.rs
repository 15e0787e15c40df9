//! Session authentication and token persistence
//!
//! A login exchanges credentials for a session token at the platform's
//! `/userSessions` endpoint. The full response body is persisted verbatim
//! to the token file so later runs can restore the session without
//! re-prompting; an age check against the file's mtime forces a fresh
//! login once the token is too old to trust.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::RngCore;
use serde_json::json;
use uuid::Uuid;

use resodex_common::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("resodex/", env!("CARGO_PKG_VERSION"));

/// Explicit session credential, passed into every authenticated call.
///
/// Created by login (or restored from the token file), invalidated by
/// logout or expiry. Never held in module-level state.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub token: String,
}

impl AuthContext {
    /// `Authorization` header value for the records API.
    pub fn header_value(&self) -> String {
        format!("res {}:{}", self.user_id, self.token)
    }
}

/// Random hex nonce sent as the `UID` login header.
fn login_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Manages the login/logout exchange and the on-disk token file.
pub struct SessionManager {
    http: reqwest::Client,
    api_url: String,
    token_path: PathBuf,
    max_age_days: i64,
}

impl SessionManager {
    pub fn new(api_url: &str, token_path: &Path, max_age_days: i64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token_path: token_path.to_path_buf(),
            max_age_days,
        })
    }

    /// Exchange credentials for a session token and persist it.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        totp: Option<&str>,
    ) -> Result<AuthContext> {
        let body = json!({
            "username": username,
            "authentication": { "$type": "password", "password": password },
            "secretMachineId": Uuid::new_v4().to_string(),
            "rememberMe": true,
        });

        let response = self
            .http
            .post(format!("{}/userSessions", self.api_url))
            .header("UID", login_nonce())
            .header("TOTP", totp.unwrap_or(""))
            .json(&body)
            .send()
            .await
            .map_err(Error::from_request)?;

        let status = response.status();
        if status == 400 {
            return Err(Error::Auth("incorrect username or password".into()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Api(status.as_u16(), text));
        }

        let session: serde_json::Value = response.json().await.map_err(Error::from_request)?;
        std::fs::write(&self.token_path, serde_json::to_string_pretty(&session)?)?;

        let context = context_from_session(&session)?;
        tracing::info!(user = %context.user_id, "logged in, token stored");
        Ok(context)
    }

    /// Invalidate the remote session and remove the token file.
    pub async fn logout(&self) -> Result<()> {
        let context = self.load_context()?;

        let response = self
            .http
            .delete(format!(
                "{}/userSessions/{}/{}",
                self.api_url, context.user_id, context.token
            ))
            .header("Authorization", context.header_value())
            .send()
            .await
            .map_err(Error::from_request)?;

        match response.status().as_u16() {
            200 => {
                std::fs::remove_file(&self.token_path)?;
                tracing::info!("logged out, token removed");
                Ok(())
            }
            409 => {
                // Session already gone remotely; drop the stale file anyway
                let _ = std::fs::remove_file(&self.token_path);
                tracing::warn!("session was already logged out");
                Ok(())
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(Error::Api(status, text))
            }
        }
    }

    /// Restore the session credential from the token file.
    pub fn load_context(&self) -> Result<AuthContext> {
        if !self.token_path.exists() {
            return Err(Error::Auth(format!(
                "no session token at {}, run `resodex login` first",
                self.token_path.display()
            )));
        }
        let contents = std::fs::read_to_string(&self.token_path)?;
        let session: serde_json::Value = serde_json::from_str(&contents)?;
        context_from_session(&session)
    }

    /// Restore the credential, rejecting a token file older than the
    /// configured maximum.
    pub fn load_valid_context(&self) -> Result<AuthContext> {
        if self.is_expired()? {
            return Err(Error::Auth(format!(
                "session token is older than {} days, log in again",
                self.max_age_days
            )));
        }
        self.load_context()
    }

    /// True when the token file exists but is past its maximum age.
    pub fn is_expired(&self) -> Result<bool> {
        if !self.token_path.exists() {
            return Ok(false);
        }
        let modified: chrono::DateTime<chrono::Utc> =
            std::fs::metadata(&self.token_path)?.modified()?.into();
        let age_days = (chrono::Utc::now() - modified).num_days();
        Ok(age_days > self.max_age_days)
    }
}

fn context_from_session(session: &serde_json::Value) -> Result<AuthContext> {
    let entity = session
        .get("entity")
        .ok_or_else(|| Error::Auth("token file has no entity block".into()))?;
    let user_id = entity
        .get("userId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Auth("token file has no userId".into()))?;
    let token = entity
        .get("token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Auth("token file has no token".into()))?;

    Ok(AuthContext {
        user_id: user_id.to_string(),
        token: token.to_string(),
    })
}
