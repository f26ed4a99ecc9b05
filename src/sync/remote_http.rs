//! HTTP replica backend.
//!
//! Talks to a session-sync service over JSON: `PUT /sessions/{id}` with the
//! sender's base version, `GET /sessions?since={ts}` for downloads. A 409
//! response carries the replica's copy for conflict resolution. Used for both
//! the `remote` and `saas` sync modes — the latter just adds credentials.

use std::time::Duration;

use serde::Deserialize;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::store::RemoteSessionRecord;
use crate::sync::{SyncBackend, UploadOutcome};

#[derive(Debug)]
pub struct RemoteHttpBackend {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct AcceptedResponse {
    new_version: u64,
}

impl RemoteHttpBackend {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| SyncError::Fatal("remote sync requires an endpoint".into()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Fatal(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn authorize(&self, req: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

impl SyncBackend for RemoteHttpBackend {
    fn name(&self) -> &'static str {
        "remote-http"
    }

    fn upload(
        &self,
        record: &RemoteSessionRecord,
        base_version: u64,
    ) -> Result<UploadOutcome, SyncError> {
        let url = format!(
            "{}/sessions/{}?base_version={}",
            self.endpoint, record.session.id, base_version
        );
        let response = self
            .authorize(self.client.put(&url).json(record))
            .send()
            .map_err(|e| SyncError::Transient(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            let remote: RemoteSessionRecord = response
                .json()
                .map_err(|e| SyncError::Fatal(format!("malformed conflict body: {e}")))?;
            return Ok(UploadOutcome::Conflict { remote });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SyncError::Fatal(format!("authentication failed: {status}")));
        }
        if !status.is_success() {
            return Err(SyncError::Transient(format!("upload returned {status}")));
        }

        let accepted: AcceptedResponse = response
            .json()
            .map_err(|e| SyncError::Fatal(format!("malformed upload response: {e}")))?;
        Ok(UploadOutcome::Accepted {
            new_version: accepted.new_version,
        })
    }

    fn download_since(&self, since: i64) -> Result<Vec<RemoteSessionRecord>, SyncError> {
        let url = format!("{}/sessions?since={}", self.endpoint, since);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .map_err(|e| SyncError::Transient(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SyncError::Fatal(format!("authentication failed: {status}")));
        }
        if !status.is_success() {
            return Err(SyncError::Transient(format!("download returned {status}")));
        }

        response
            .json()
            .map_err(|e| SyncError::Fatal(format!("malformed download body: {e}")))
    }
}
