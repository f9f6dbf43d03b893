// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Results sink HTTP client: posts extraction results, status updates,
//! and typed failures to the upstream record store.
//!
//! Grounded on `original_source/agent/src/backend_client.py`'s
//! `BackendClient` — same three writes (`post_extraction`,
//! `update_call_status`, `post_failure`) and the two convenience reads,
//! `null`s elided from the JSON body the same way (`exclude_none` in
//! the original, `#[serde(skip_serializing_if = "Option::is_none")]`
//! here).

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::SinkError;
use crate::types::{ExtractedAuthorization, FailureReason, TranscriptEntry};

#[derive(Debug, Default, Serialize)]
pub struct ExtractionPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_through: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<TranscriptEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl From<&ExtractedAuthorization> for ExtractionPayload {
    fn from(auth: &ExtractedAuthorization) -> Self {
        Self {
            auth_number: auth.auth_number.clone(),
            status: auth.status.map(|s| s.to_string()),
            valid_through: auth.valid_through.clone(),
            denial_reason: auth.denial_reason.clone(),
            transcript: None,
            failure_reason: None,
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct StatusUpdatePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<Vec<TranscriptEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_seconds: Option<i64>,
}

#[derive(Debug, Default, Serialize)]
struct FailurePayload {
    reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript: Option<Vec<TranscriptEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct SinkResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// HTTP client to the results sink, shared across sessions and
/// cancellable, with a per-request timeout (spec §5).
pub struct ResultsSink {
    client: reqwest::Client,
    base_url: String,
}

impl ResultsSink {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder should not fail on static config");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub async fn post_extraction(&self, call_id: &str, payload: &ExtractionPayload) -> Result<SinkResponse, SinkError> {
        let url = format!("{}/api/calls/{call_id}/extraction", self.base_url);
        info!(call_id, url, "posting extraction");
        self.send_json(self.client.post(&url).json(payload)).await
    }

    pub async fn update_call_status(
        &self,
        call_id: &str,
        status: &str,
        outcome: Option<&str>,
        transcript: Option<Vec<TranscriptEntry>>,
        duration_seconds: Option<i64>,
    ) -> Result<SinkResponse, SinkError> {
        let url = format!("{}/api/calls/{call_id}", self.base_url);
        info!(call_id, status, "updating call status");
        let payload = StatusUpdatePayload {
            status: Some(status.to_string()),
            outcome: outcome.map(str::to_string),
            transcript,
            duration_seconds,
        };
        self.send_json(self.client.put(&url).json(&payload)).await
    }

    pub async fn post_failure(
        &self,
        call_id: &str,
        reason: FailureReason,
        transcript: Option<Vec<TranscriptEntry>>,
    ) -> Result<SinkResponse, SinkError> {
        let url = format!("{}/api/calls/{call_id}/failure", self.base_url);
        warn!(call_id, %reason, "posting failure");
        let payload = FailurePayload {
            reason: reason.to_string(),
            transcript,
        };
        self.send_json(self.client.post(&url).json(&payload)).await
    }

    pub async fn get_member(&self, member_id: &str) -> Option<serde_json::Value> {
        let url = format!("{}/api/members/{member_id}", self.base_url);
        self.get_optional(&url).await
    }

    pub async fn get_call(&self, call_id: &str) -> Option<serde_json::Value> {
        let url = format!("{}/api/calls/{call_id}", self.base_url);
        self.get_optional(&url).await
    }

    async fn get_optional(&self, url: &str) -> Option<serde_json::Value> {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => None,
            Ok(resp) if resp.status().is_success() => resp.json().await.ok(),
            Ok(resp) => {
                error!(status = %resp.status(), url, "sink returned error on read");
                None
            }
            Err(err) => {
                error!(%err, url, "failed to reach sink");
                None
            }
        }
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<SinkResponse, SinkError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(%status, body = %text, "sink returned error");
            return Err(SinkError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(response.json().await.unwrap_or(SinkResponse { message: None }))
    }
}
