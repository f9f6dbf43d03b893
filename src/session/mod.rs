// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-call session state: the Session Context (C1) and the
//! State Machine (C2).
//!
//! A `SessionContext` is owned exclusively by the Tokio task running
//! its call and is destroyed on disconnect; it is never shared across
//! tasks. It is grounded on `original_source/agent/src/context.py`'s
//! `ConversationContext`, carrying the same counters, transcript, and
//! mutator shape into a typed Rust value.

pub mod state_machine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{
    ActionKind, CallInputs, CallState, ExtractedAuthorization, FailureReason, LastAction, Speaker,
    TranscriptEntry,
};

use state_machine::CallStateMachine;

/// Bounds on retry counters, grounded on `context.py`'s class defaults.
#[derive(Debug, Clone, Copy)]
pub struct RetryBounds {
    pub max_menu_retries: u32,
    pub max_info_retries: u32,
    pub max_uncertain_total: u32,
    pub confidence_threshold: f64,
}

impl Default for RetryBounds {
    fn default() -> Self {
        Self {
            max_menu_retries: 3,
            max_info_retries: 2,
            max_uncertain_total: 5,
            confidence_threshold: 0.6,
        }
    }
}

/// The per-call record: identifiers, transcript, counters, last
/// action, state, and extraction.
///
/// Implements `Serialize`/`Deserialize` by hand via
/// `SessionContextWire` below: `state_machine` carries a
/// non-serializable callback map, so its current/previous state is
/// carried as plain fields on the wire and used to reconstruct a
/// fresh `CallStateMachine` (history and callbacks are not restored,
/// neither is observable to callers that only read `state()`).
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub call_id: String,
    pub call_sid: Option<String>,
    pub inputs: CallInputs,

    state_machine: CallStateMachine,

    pub transcript: Vec<TranscriptEntry>,

    pub menu_retries: u32,
    pub info_retries: u32,
    pub uncertain_count: u32,

    pub bounds: RetryBounds,

    pub last_ivr_prompt: Option<String>,
    pub last_action: LastAction,

    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,

    pub extracted_auth: Option<ExtractedAuthorization>,

    /// Set at the point a governor check fails the call, so the edge
    /// layer can report *why* without re-deriving it from counters
    /// that may already have been reset (spec §6.3).
    pub failure_reason: Option<FailureReason>,
}

#[derive(Serialize, Deserialize)]
struct SessionContextWire {
    call_id: String,
    call_sid: Option<String>,
    inputs: CallInputs,
    state: CallState,
    previous_state: Option<CallState>,
    transcript: Vec<TranscriptEntry>,
    menu_retries: u32,
    info_retries: u32,
    uncertain_count: u32,
    last_ivr_prompt: Option<String>,
    last_action: LastAction,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    extracted_auth: Option<ExtractedAuthorization>,
    failure_reason: Option<FailureReason>,
}

impl Serialize for SessionContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SessionContextWire {
            call_id: self.call_id.clone(),
            call_sid: self.call_sid.clone(),
            inputs: self.inputs.clone(),
            state: self.state(),
            previous_state: self.previous_state(),
            transcript: self.transcript.clone(),
            menu_retries: self.menu_retries,
            info_retries: self.info_retries,
            uncertain_count: self.uncertain_count,
            last_ivr_prompt: self.last_ivr_prompt.clone(),
            last_action: self.last_action.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            extracted_auth: self.extracted_auth.clone(),
            failure_reason: self.failure_reason,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SessionContext {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = SessionContextWire::deserialize(deserializer)?;
        Ok(Self {
            call_id: wire.call_id,
            call_sid: wire.call_sid,
            inputs: wire.inputs,
            state_machine: CallStateMachine::restore(wire.state, wire.previous_state),
            transcript: wire.transcript,
            menu_retries: wire.menu_retries,
            info_retries: wire.info_retries,
            uncertain_count: wire.uncertain_count,
            bounds: RetryBounds::default(),
            last_ivr_prompt: wire.last_ivr_prompt,
            last_action: wire.last_action,
            started_at: wire.started_at,
            ended_at: wire.ended_at,
            extracted_auth: wire.extracted_auth,
            failure_reason: wire.failure_reason,
        })
    }
}

impl SessionContext {
    pub fn new(call_id: impl Into<String>, call_sid: Option<String>, inputs: CallInputs) -> Self {
        Self {
            call_id: call_id.into(),
            call_sid,
            inputs,
            state_machine: CallStateMachine::new(),
            transcript: Vec::new(),
            menu_retries: 0,
            info_retries: 0,
            uncertain_count: 0,
            bounds: RetryBounds::default(),
            last_ivr_prompt: None,
            last_action: LastAction::none(),
            started_at: Utc::now(),
            ended_at: None,
            extracted_auth: None,
            failure_reason: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.state_machine.current()
    }

    pub fn previous_state(&self) -> Option<CallState> {
        self.state_machine.previous()
    }

    /// Attempt a transition, appending a diagnostic system entry on
    /// success (spec §4.2).
    pub fn transition_to(
        &mut self,
        target: CallState,
    ) -> Result<(), crate::error::StateMachineError> {
        let from = self.state_machine.current();
        self.state_machine.transition(target)?;
        self.add_system(format!("State: {from} -> {target}"));
        Ok(())
    }

    /// Force the call into `FAILED`, always legal (spec §3/§4.2).
    pub fn force_failed(&mut self) {
        let from = self.state_machine.current();
        self.state_machine.force_failed();
        self.add_system(format!("State: {from} -> FAILED"));
    }

    pub fn add_ivr(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.last_ivr_prompt = Some(text.clone());
        self.transcript.push(TranscriptEntry::ivr(text));
    }

    pub fn add_agent(
        &mut self,
        text: impl Into<String>,
        action_type: Option<String>,
        confidence: Option<f64>,
    ) {
        self.transcript
            .push(TranscriptEntry::agent(text, action_type, confidence));
    }

    pub fn add_system(&mut self, text: impl Into<String>) {
        self.transcript.push(TranscriptEntry::system(text));
    }

    pub fn set_last_action(&mut self, kind: ActionKind, value: Option<String>) {
        self.last_action = LastAction {
            kind: Some(kind),
            value,
        };
    }

    pub fn clear_last_action(&mut self) {
        self.last_action = LastAction::none();
    }

    pub fn set_extracted_auth(&mut self, auth: ExtractedAuthorization) {
        self.extracted_auth = Some(auth);
    }

    /// Marks the call complete, transitioning to `COMPLETE` and
    /// stamping `ended_at`. No-op (besides the timestamp) if already
    /// terminal, matching the state machine's idempotent `FAILED` rule
    /// extended to `COMPLETE` for this one caller.
    pub fn mark_complete(&mut self) -> Result<(), crate::error::StateMachineError> {
        self.transition_to(CallState::Complete)?;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: Option<&str>) {
        self.force_failed();
        self.ended_at = Some(Utc::now());
        if let Some(reason) = reason {
            self.add_system(format!("Failed: {reason}"));
        }
    }

    /// Fail the call with a typed reason, used by the callers that
    /// know specifically why (the retry governor's bound checks).
    pub fn mark_failed_as(&mut self, reason: FailureReason, detail: impl Into<String>) {
        self.failure_reason = Some(reason);
        self.mark_failed(Some(&detail.into()));
    }

    pub fn duration_seconds(&self) -> i64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds()
    }

    /// Only `IVR`/`Agent` entries, in order — system entries are
    /// diagnostic only and must not reach the oracle (spec §4.1).
    pub fn transcript_for_oracle(&self) -> Vec<&TranscriptEntry> {
        self.transcript
            .iter()
            .filter(|e| matches!(e.speaker, Speaker::Ivr | Speaker::Agent))
            .collect()
    }

    /// Increments and reports whether the call is still under bound.
    /// The step that reaches the bound itself is the failing step
    /// (spec §8: "at 5, it produces `end`" for a bound of 5) — so this
    /// compares with `<`, not `<=`.
    pub fn increment_menu_retry(&mut self) -> bool {
        self.menu_retries += 1;
        self.menu_retries < self.bounds.max_menu_retries
    }

    pub fn increment_info_retry(&mut self) -> bool {
        self.info_retries += 1;
        self.info_retries < self.bounds.max_info_retries
    }

    pub fn increment_uncertain(&mut self) -> bool {
        self.uncertain_count += 1;
        self.uncertain_count < self.bounds.max_uncertain_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> CallInputs {
        CallInputs {
            member_id: "ABC123456".into(),
            cpt_code: "27447".into(),
            date_of_birth: "03151965".into(),
            provider_name: None,
        }
    }

    #[test]
    fn transcript_is_append_only_and_ordered() {
        let mut ctx = SessionContext::new("c1", None, inputs());
        ctx.add_ivr("Press 2 for prior authorization.");
        ctx.add_agent("2", Some("dtmf".into()), Some(0.9));
        assert_eq!(ctx.transcript.len(), 2);
        assert_eq!(ctx.transcript[0].text, "Press 2 for prior authorization.");
        assert_eq!(ctx.transcript[1].text, "2");
    }

    #[test]
    fn oracle_transcript_excludes_system_entries() {
        let mut ctx = SessionContext::new("c1", None, inputs());
        ctx.add_ivr("hello");
        ctx.add_system("State: IDLE -> CONNECTED");
        ctx.add_agent("ack", None, None);
        let for_oracle = ctx.transcript_for_oracle();
        assert_eq!(for_oracle.len(), 2);
        assert!(for_oracle.iter().all(|e| e.speaker != Speaker::System));
    }

    #[test]
    fn counters_respect_bounds() {
        let mut ctx = SessionContext::new("c1", None, inputs());
        for _ in 0..2 {
            assert!(ctx.increment_menu_retry());
        }
        assert!(!ctx.increment_menu_retry());
        assert_eq!(ctx.menu_retries, 3);
    }

    #[test]
    fn extracted_auth_set_at_most_once() {
        let mut ctx = SessionContext::new("c1", None, inputs());
        assert!(ctx.extracted_auth.is_none());
        ctx.set_extracted_auth(ExtractedAuthorization {
            auth_number: Some("PA1".into()),
            ..Default::default()
        });
        assert!(ctx.extracted_auth.is_some());
    }

    #[test]
    fn serialization_round_trips_state() {
        let mut ctx = SessionContext::new("c1", None, inputs());
        ctx.transition_to(CallState::Connected).unwrap();
        ctx.transition_to(CallState::AwaitingIvrResult).unwrap();

        let json = serde_json::to_string(&ctx).unwrap();
        let restored: SessionContext = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.state(), CallState::AwaitingIvrResult);
        assert_eq!(restored.previous_state(), Some(CallState::Connected));
        assert_eq!(restored.call_id, "c1");
    }

    #[test]
    fn mark_failed_is_idempotent_and_stamps_end() {
        let mut ctx = SessionContext::new("c1", None, inputs());
        ctx.mark_failed(Some("agent_error"));
        assert_eq!(ctx.state(), CallState::Failed);
        assert!(ctx.ended_at.is_some());
        ctx.mark_failed(Some("agent_error"));
        assert_eq!(ctx.state(), CallState::Failed);
    }
}
