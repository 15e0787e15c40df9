//! Resonite records API client
//!
//! Thin authenticated wrapper over the two endpoints the traversal needs:
//! listing a directory's children and resolving a single record (used for
//! link targets in other owners' trees). Response status is classified
//! into the shared error taxonomy; retry policy belongs to the caller.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use resodex_common::records::ResolvedLink;
use resodex_common::{Error, Result};

use crate::auth::AuthContext;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("resodex/", env!("CARGO_PKG_VERSION"));

/// Source of inventory records.
///
/// The traversal engine runs against this seam; production uses
/// [`ResoniteClient`], tests substitute an in-memory fake.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// List the children of one inventory directory, raw and verbatim.
    async fn list_children(
        &self,
        owner: &str,
        path: &str,
        auth: &AuthContext,
    ) -> Result<Vec<Value>>;

    /// Resolve a link record to its true owner and directory path.
    async fn resolve_link(
        &self,
        owner: &str,
        record_id: &str,
        auth: &AuthContext,
    ) -> Result<ResolvedLink>;
}

/// HTTP client for the records API.
pub struct ResoniteClient {
    http: reqwest::Client,
    api_url: String,
}

impl ResoniteClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, url: String, auth: &AuthContext, what: &str) -> Result<Value> {
        tracing::debug!(url = %url, "records API request");

        let response = self
            .http
            .get(&url)
            .header("Authorization", auth.header_value())
            .send()
            .await
            .map_err(Error::from_request)?;

        let status = response.status();
        match status.as_u16() {
            200 => response.json().await.map_err(Error::from_request),
            401 | 403 => Err(Error::Auth(format!("session rejected while fetching {what}"))),
            404 => Err(Error::NotFound(what.to_string())),
            code if status.is_server_error() || code == 408 || code == 429 => {
                Err(Error::Network(format!("status {code} fetching {what}")))
            }
            code => {
                let text = response.text().await.unwrap_or_default();
                Err(Error::Api(code, format!("{what}: {text}")))
            }
        }
    }
}

#[async_trait]
impl RecordSource for ResoniteClient {
    async fn list_children(
        &self,
        owner: &str,
        path: &str,
        auth: &AuthContext,
    ) -> Result<Vec<Value>> {
        let url = format!(
            "{}/users/{}/records?path={}",
            self.api_url,
            owner,
            urlencode(path)
        );
        let body = self.get_json(url, auth, &format!("{owner}:{path}")).await?;

        match body {
            Value::Array(records) => Ok(records),
            other => Err(Error::Api(
                200,
                format!("expected listing array for {owner}:{path}, got {other}"),
            )),
        }
    }

    async fn resolve_link(
        &self,
        owner: &str,
        record_id: &str,
        auth: &AuthContext,
    ) -> Result<ResolvedLink> {
        let url = format!("{}/users/{}/records/{}", self.api_url, owner, record_id);
        let body = self
            .get_json(url, auth, &format!("{owner}/{record_id}"))
            .await?;

        let owner_id = body
            .get("ownerId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::MalformedRecord(format!("{record_id}: resolved record has no ownerId"))
            })?;
        let path = body.get("path").and_then(|v| v.as_str()).ok_or_else(|| {
            Error::MalformedRecord(format!("{record_id}: resolved record has no path"))
        })?;

        // The resolved record is the target directory itself; its own name
        // is the final path segment.
        let full_path = match body.get("name").and_then(|v| v.as_str()) {
            Some(name) if !name.is_empty() => format!("{path}\\{name}"),
            _ => path.to_string(),
        };

        Ok(ResolvedLink {
            owner_id: owner_id.to_string(),
            path: full_path,
        })
    }
}

/// Minimal percent-encoding for the path query parameter. Inventory paths
/// contain backslashes and spaces; everything unreserved passes through.
fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
