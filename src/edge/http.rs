// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP handlers for the edge surface (spec §6.1), following the
//! pack's `selene_adapter::http_adapter` shape: `State<AppState>`
//! extraction, `(StatusCode, Json<T>)` returns, small helper functions
//! for error-shaped bodies.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::registry::{PendingCall, PendingCallStatus};
use crate::types::CallInputs;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceDescriptor {
    service: &'static str,
    version: &'static str,
    status: &'static str,
}

pub async fn root() -> Json<ServiceDescriptor> {
    Json(ServiceDescriptor {
        service: "voicebridge",
        version: env!("CARGO_PKG_VERSION"),
        status: "ok",
    })
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    status: &'static str,
    active_sessions: usize,
    telephony_configured: bool,
    oracle_configured: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        active_sessions: state.sessions.len().await,
        telephony_configured: state.settings.telephony_configured(),
        oracle_configured: state.settings.oracle_configured(),
    })
}

#[derive(Debug, Deserialize)]
pub struct OutboundCallRequest {
    member_id: String,
    cpt_code: String,
    date_of_birth: String,
    #[serde(default)]
    ivr_phone_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OutboundCallResponse {
    call_id: String,
    call_sid: Option<String>,
    status: String,
    twiml_url: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { message: message.into() })).into_response()
}

/// `POST /outbound-call` (spec §6.1): dials out and registers the
/// pending call so `setup` at `/ws` can find its inputs.
pub async fn outbound_call(State(state): State<AppState>, Json(req): Json<OutboundCallRequest>) -> Response {
    if !state.settings.telephony_configured() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "telephony provider is not configured");
    }

    let target = req
        .ivr_phone_number
        .clone()
        .or_else(|| state.settings.ivr_phone_number.clone());
    let Some(target) = target else {
        return error_response(StatusCode::BAD_REQUEST, "no ivr_phone_number configured or provided");
    };

    let call_id = uuid::Uuid::new_v4().to_string();
    let twiml_url = format!("{}/twiml/{call_id}", state.settings.agent_public_url);
    let status_callback_url = format!("{}/call-status/{call_id}", state.settings.agent_public_url);

    let placed = match state
        .telephony
        .place_call(&target, &state.settings.telephony_from_number, &twiml_url, &status_callback_url)
        .await
    {
        Ok(placed) => placed,
        Err(err) => {
            error!(%err, call_id, "failed to place outbound call");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        }
    };

    info!(call_id, call_sid = placed.sid, "outbound call placed");

    state
        .pending_calls
        .insert(
            call_id.clone(),
            PendingCall {
                call_sid: Some(placed.sid.clone()),
                inputs: CallInputs {
                    member_id: req.member_id,
                    cpt_code: req.cpt_code,
                    date_of_birth: req.date_of_birth,
                    provider_name: None,
                },
                status: PendingCallStatus::Initiated,
                created_at: chrono::Utc::now(),
            },
        )
        .await;

    Json(OutboundCallResponse {
        call_id,
        call_sid: Some(placed.sid),
        status: placed.status,
        twiml_url,
        message: "call placed".to_string(),
    })
    .into_response()
}

/// `GET|POST /twiml/{call_id}` (spec §6.1): instructs the provider to
/// open the ConversationRelay WebSocket, carrying `call_id` so `setup`
/// can look the pending call back up.
pub async fn twiml(State(state): State<AppState>, Path(call_id): Path<String>) -> Response {
    let body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <ConversationRelay url="{ws_url}" dtmfDetection="true">
      <Parameter name="call_id" value="{call_id}"/>
    </ConversationRelay>
  </Connect>
</Response>"#,
        ws_url = state.settings.agent_websocket_url
    );

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CallStatusCallback {
    #[serde(rename = "CallSid")]
    #[allow(dead_code)]
    call_sid: Option<String>,
    #[serde(rename = "CallStatus")]
    call_status: String,
}

/// `POST /call-status/{call_id}` (spec §6.1): provider status events,
/// form-encoded the way Twilio posts them.
pub async fn call_status(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    axum::Form(callback): axum::Form<CallStatusCallback>,
) -> StatusCode {
    let Some(status) = PendingCallStatus::from_provider_event(&callback.call_status) else {
        warn!(call_id, status = callback.call_status, "unrecognized call status event");
        return StatusCode::OK;
    };

    if state.pending_calls.update_status(&call_id, status).await {
        info!(call_id, call_status = callback.call_status, "pending call status updated");
    } else {
        warn!(call_id, "status callback for unknown pending call");
    }

    StatusCode::OK
}
