// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The ConversationRelay WebSocket handler (spec §6.2): one Tokio task
//! per connection, owning its `SessionContext` and `RetryGovernor`
//! exclusively (spec §5), driving them through the Turn Controller
//! (C5) and posting results to the sink on disconnect.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::governor::RetryGovernor;
use crate::session::SessionContext;
use crate::sink::ExtractionPayload;
use crate::turn::{InboundFrame, OutboundFrame};
use crate::types::{AdvisoryAction, CallState, FailureReason};

use super::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize and send one outbound frame. A serialization failure is
/// logged and skipped without dropping the connection; a transport
/// failure is fatal to the loop.
async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &OutboundFrame) -> bool {
    let payload = match serde_json::to_string(frame) {
        Ok(payload) => payload,
        Err(err) => {
            error!(%err, "failed to serialize outbound frame");
            return true;
        }
    };
    sender.send(Message::Text(payload)).await.is_ok()
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut ctx: Option<SessionContext> = None;
    let mut governor = RetryGovernor::new();

    loop {
        let silence_budget = governor.silence_timeout();
        tokio::select! {
            maybe_message = receiver.next() => {
                let Some(Ok(message)) = maybe_message else { break };
                let Message::Text(text) = message else { continue };

                let frame: InboundFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!(%err, "malformed inbound frame, ignoring");
                        continue;
                    }
                };

                if ctx.is_none() {
                    match establish_session(&state, &frame).await {
                        Some(new_ctx) => ctx = Some(new_ctx),
                        None => {
                            warn!("first frame on a new connection was not a usable setup, ignoring");
                            continue;
                        }
                    }
                }

                let Some(session) = ctx.as_mut() else { continue };
                let outbound = state.turn_controller.handle_frame(session, &mut governor, frame).await;
                state.sessions.insert(session.call_id.clone(), session.clone()).await;

                if let Some(outbound) = outbound {
                    if !send_frame(&mut sender, &outbound).await {
                        break;
                    }
                }

                if session.state().is_terminal() {
                    break;
                }
            }
            _ = sleep(silence_budget), if ctx.is_some() => {
                let session = ctx.as_mut().expect("guarded by ctx.is_some()");
                let result = governor.check_silence_timeout(session);
                state.sessions.insert(session.call_id.clone(), session.clone()).await;

                if result.advisory_action == AdvisoryAction::Dtmf9
                    && !send_frame(&mut sender, &OutboundFrame::send_digits("9")).await
                {
                    break;
                }

                if !result.should_continue || session.state().is_terminal() {
                    break;
                }
            }
        }
    }

    if let Some(session) = ctx {
        finalize_session(&state, &mut governor, session).await;
    }
}

/// Build the session for the first `setup` frame, pulling its inputs
/// from the pending-call registry populated at dial-out (spec §5).
async fn establish_session(state: &AppState, frame: &InboundFrame) -> Option<SessionContext> {
    let InboundFrame::Setup { call_sid, custom_parameters } = frame else {
        return None;
    };

    let call_id = match custom_parameters.get("call_id") {
        Some(id) => id.clone(),
        None => {
            warn!("setup frame missing call_id custom parameter");
            uuid::Uuid::new_v4().to_string()
        }
    };

    let inputs = match state.pending_calls.get(&call_id).await {
        Some(pending) => pending.inputs,
        None => {
            warn!(call_id, "setup for unknown pending call, proceeding with empty inputs");
            Default::default()
        }
    };

    let new_ctx = SessionContext::new(call_id.clone(), call_sid.clone(), inputs);
    state.sessions.insert(call_id, new_ctx.clone()).await;
    Some(new_ctx)
}

/// Resolve a call that never reached a terminal state into `FAILED`,
/// post its results to the sink, and reclaim registry/governor state
/// (spec §5 cancellation semantics).
async fn finalize_session(state: &AppState, governor: &mut RetryGovernor, mut ctx: SessionContext) {
    let call_id = ctx.call_id.clone();
    governor.reset_all_tracking(&call_id);

    if !ctx.state().is_terminal() {
        ctx.mark_failed(Some("WebSocket closed before the call reached a terminal state"));
    }

    let duration = ctx.duration_seconds();
    let transcript = ctx.transcript.clone();

    match ctx.state() {
        CallState::Complete => {
            if let Some(auth) = ctx.extracted_auth.as_ref() {
                let mut payload = ExtractionPayload::from(auth);
                payload.transcript = Some(transcript.clone());
                if let Err(err) = state.sink.post_extraction(&call_id, &payload).await {
                    error!(%err, call_id, "failed to post extraction result");
                }
            }
            if let Err(err) = state
                .sink
                .update_call_status(&call_id, "completed", Some("success"), Some(transcript), Some(duration))
                .await
            {
                error!(%err, call_id, "failed to post completion status");
            }
        }
        CallState::Failed => {
            let reason = infer_failure_reason(&ctx);
            if let Err(err) = state.sink.post_failure(&call_id, reason, Some(transcript.clone())).await {
                error!(%err, call_id, "failed to post failure result");
            }
            if let Err(err) = state
                .sink
                .update_call_status(&call_id, "failed", Some("failure"), Some(transcript), Some(duration))
                .await
            {
                error!(%err, call_id, "failed to post failure status");
            }
        }
        _ => unreachable!("ctx was forced terminal above"),
    }

    state.sessions.remove(&call_id).await;
    info!(call_id, state = %ctx.state(), duration, "session finalized");
}

/// Why a call ended in `FAILED`. The governor stamps `failure_reason`
/// directly on the context at the point a bound trips (spec §4.3/§6.3);
/// this falls back to `agent_error` for provider `error` frames and
/// disconnects that never trip a specific counter.
fn infer_failure_reason(ctx: &SessionContext) -> FailureReason {
    ctx.failure_reason.unwrap_or(FailureReason::AgentError)
}
