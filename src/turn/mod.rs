// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Turn Controller (C5): the per-session WebSocket message dispatcher.
//!
//! Grounded on `original_source/agent/src/message_handlers.py`'s
//! `MessageHandler` — same dispatch-by-type table, the same
//! state-based turn-arbitration filter, and the same
//! decision-to-response mapping (`_decision_to_response`), rebuilt
//! here as a typed, total pipeline over `NavigatorDecision`.

pub mod arbitration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::governor::RetryGovernor;
use crate::oracle::NavigatorOracle;
use crate::session::SessionContext;
use crate::types::{ActionKind, CallState, DecisionType, ExtractedAuthorization};

/// Frames received from the telephony provider (spec §6.2).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundFrame {
    Setup {
        #[serde(rename = "callSid")]
        call_sid: Option<String>,
        #[serde(rename = "customParameters", default)]
        custom_parameters: std::collections::HashMap<String, String>,
    },
    Prompt {
        #[serde(rename = "voicePrompt")]
        voice_prompt: String,
    },
    Dtmf {
        digit: String,
    },
    Interrupted {},
    Error {
        description: String,
    },
    #[serde(other)]
    Unknown,
}

/// Frames sent to the telephony provider (spec §6.2).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    #[serde(rename = "text")]
    Text { token: String },
    #[serde(rename = "sendDigits")]
    SendDigits { digits: String },
    #[serde(rename = "end")]
    End {},
}

impl OutboundFrame {
    pub fn text(message: impl Into<String>) -> Self {
        Self::Text { token: message.into() }
    }

    pub fn send_digits(digits: impl Into<String>) -> Self {
        Self::SendDigits { digits: digits.into() }
    }

    pub fn end() -> Self {
        Self::End {}
    }
}

/// Owns the per-session decision loop: arbitration, the oracle call,
/// the governor cross-check, and the state/transcript updates that
/// follow (spec §4.5). Holds no per-call state itself — all of that
/// lives in the `SessionContext` and `RetryGovernor` passed in.
pub struct TurnController<O: NavigatorOracle> {
    oracle: O,
}

impl<O: NavigatorOracle> TurnController<O> {
    pub fn new(oracle: O) -> Self {
        Self { oracle }
    }

    /// Dispatch one inbound frame, producing at most one outbound
    /// frame (spec §4.5).
    pub async fn handle_frame(
        &self,
        ctx: &mut SessionContext,
        governor: &mut RetryGovernor,
        frame: InboundFrame,
    ) -> Option<OutboundFrame> {
        governor.record_activity(&ctx.call_id);

        match frame {
            InboundFrame::Setup { call_sid, .. } => {
                ctx.call_sid = call_sid.or_else(|| ctx.call_sid.clone());
                if ctx.transition_to(CallState::Connected).is_err() {
                    warn!(call_id = %ctx.call_id, "setup arrived for a call already past IDLE");
                }
                None
            }
            InboundFrame::Prompt { voice_prompt } => self.handle_prompt(ctx, governor, voice_prompt).await,
            InboundFrame::Dtmf { digit } => {
                ctx.add_ivr(format!("[DTMF: {digit}]"));
                None
            }
            InboundFrame::Interrupted {} => {
                ctx.add_system("Agent speech interrupted");
                None
            }
            InboundFrame::Error { description } => {
                ctx.add_system(format!("Error: {description}"));
                ctx.mark_failed(Some(&description));
                None
            }
            InboundFrame::Unknown => {
                warn!(call_id = %ctx.call_id, "unknown inbound frame type");
                None
            }
        }
    }

    async fn handle_prompt(
        &self,
        ctx: &mut SessionContext,
        governor: &mut RetryGovernor,
        voice_prompt: String,
    ) -> Option<OutboundFrame> {
        ctx.add_ivr(voice_prompt.clone());

        if ctx.state() == CallState::AwaitingIvrResult {
            if arbitration::should_process_while_awaiting(&voice_prompt, &ctx.last_action) {
                info!(call_id = %ctx.call_id, "new context detected, resuming processing");
                if ctx.transition_to(CallState::Connected).is_err() {
                    warn!(call_id = %ctx.call_id, "could not resume from awaiting IVR result");
                }
                ctx.clear_last_action();
            } else {
                info!(call_id = %ctx.call_id, "buffering prompt while awaiting IVR result");
                return None;
            }
        }

        let history = ctx.transcript_for_oracle();
        let decision = self.oracle.decide(&voice_prompt, &ctx.inputs, &history).await;
        drop(history);

        ctx.add_agent(
            decision.value.clone().unwrap_or_else(|| format!("[{:?}]", decision.kind)),
            Some(format!("{:?}", decision.kind).to_lowercase()),
            Some(decision.confidence),
        );

        if decision.confidence < ctx.bounds.confidence_threshold {
            let result = governor.check_uncertainty(ctx, decision.confidence);
            if !result.should_continue {
                return Some(OutboundFrame::end());
            }
            ctx.add_agent(
                "[Requesting repeat - low confidence]",
                Some("dtmf".to_string()),
                Some(decision.confidence),
            );
            return Some(OutboundFrame::send_digits("9"));
        }

        match decision.kind {
            DecisionType::Dtmf => {
                let value = decision.value.unwrap_or_default();
                ctx.set_last_action(ActionKind::Dtmf, Some(value.clone()));
                if ctx.transition_to(CallState::AwaitingIvrResult).is_err() {
                    warn!(call_id = %ctx.call_id, "could not transition to awaiting IVR result");
                }
                Some(OutboundFrame::send_digits(value))
            }
            DecisionType::Speak => {
                let value = decision.value.unwrap_or_default();
                ctx.set_last_action(ActionKind::Speak, Some(value.clone()));
                if ctx.transition_to(CallState::AwaitingIvrResult).is_err() {
                    warn!(call_id = %ctx.call_id, "could not transition to awaiting IVR result");
                }
                Some(OutboundFrame::text(value))
            }
            DecisionType::Extract => {
                if let Err(err) = ctx.transition_to(CallState::ExtractingData) {
                    warn!(call_id = %ctx.call_id, %err, "could not transition to extracting data");
                }
                if let Some(data) = decision.extracted_data {
                    ctx.set_extracted_auth(ExtractedAuthorization {
                        auth_number: data.auth_number,
                        status: data.status.as_deref().and_then(|s| s.parse().ok()),
                        valid_through: data.valid_through,
                        denial_reason: data.denial_reason,
                        raw_text: ctx.last_ivr_prompt.clone(),
                    });
                }
                if let Err(err) = ctx.mark_complete() {
                    warn!(call_id = %ctx.call_id, %err, "could not mark call complete");
                }
                Some(OutboundFrame::end())
            }
            DecisionType::Wait => {
                if ctx.transition_to(CallState::WaitingResponse).is_err() {
                    warn!(call_id = %ctx.call_id, "could not transition to waiting for response");
                }
                None
            }
            DecisionType::Uncertain => {
                ctx.increment_uncertain();
                info!(call_id = %ctx.call_id, "uncertain decision, requesting repeat");
                Some(OutboundFrame::send_digits("9"))
            }
        }
    }
}
