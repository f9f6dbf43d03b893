// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The call State Machine (C2): a fixed adjacency table of legal
//! transitions, an in-memory history, and per-state callbacks.
//!
//! Grounded on `original_source/agent/src/state_machine.py`'s
//! callback-registration shape (`on_state`/`_trigger_callbacks`, a
//! callback failure logged but never fatal); the state set and
//! adjacency graph itself come from the data model, which carries a
//! state (`AWAITING_IVR_RESULT`) that file's older graph never had.

use tracing::warn;

use crate::error::StateMachineError;
use crate::types::CallState;

/// `NAVIGATING_MENU`/`PROVIDING_INFO` are entered as the agent commits
/// to a DTMF or spoken action, then immediately give way to
/// `AWAITING_IVR_RESULT` once the outbound frame is queued — they
/// exist so a transition history shows *which kind* of action put the
/// call into its waiting state, not just that it is waiting.
fn legal_targets(from: CallState) -> &'static [CallState] {
    use CallState::*;
    match from {
        Idle => &[Dialing, Connected],
        Dialing => &[Connected],
        Connected => &[
            NavigatingMenu,
            ProvidingInfo,
            AwaitingIvrResult,
            WaitingResponse,
            ExtractingData,
        ],
        NavigatingMenu => &[AwaitingIvrResult],
        ProvidingInfo => &[AwaitingIvrResult],
        AwaitingIvrResult => &[Connected, WaitingResponse, ExtractingData],
        WaitingResponse => &[Connected, AwaitingIvrResult, ExtractingData],
        ExtractingData => &[Complete],
        Complete => &[],
        Failed => &[],
    }
}

type Callback = Box<dyn Fn(CallState) + Send + Sync>;

/// Typed states and legal transitions for one call.
pub struct CallStateMachine {
    current: CallState,
    previous: Option<CallState>,
    history: Vec<CallState>,
    callbacks: std::collections::HashMap<CallState, Vec<Callback>>,
}

impl std::fmt::Debug for CallStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallStateMachine")
            .field("current", &self.current)
            .field("previous", &self.previous)
            .field("history", &self.history)
            .finish()
    }
}

impl Clone for CallStateMachine {
    /// Callbacks are not `Clone`; a cloned machine starts without them.
    /// Callers that register callbacks do so once, on the owning
    /// session task's original instance.
    fn clone(&self) -> Self {
        Self {
            current: self.current,
            previous: self.previous,
            history: self.history.clone(),
            callbacks: std::collections::HashMap::new(),
        }
    }
}

impl Default for CallStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStateMachine {
    pub fn new() -> Self {
        Self {
            current: CallState::Idle,
            previous: None,
            history: vec![CallState::Idle],
            callbacks: std::collections::HashMap::new(),
        }
    }

    /// Rebuild a machine at a known current/previous state, with no
    /// history beyond that and no callbacks — used to restore a
    /// `SessionContext` deserialized from its wire form, where
    /// callbacks can never round-trip.
    pub fn restore(current: CallState, previous: Option<CallState>) -> Self {
        Self {
            current,
            previous,
            history: vec![current],
            callbacks: std::collections::HashMap::new(),
        }
    }

    pub fn current(&self) -> CallState {
        self.current
    }

    pub fn previous(&self) -> Option<CallState> {
        self.previous
    }

    pub fn history(&self) -> &[CallState] {
        &self.history
    }

    /// Register a callback invoked after every transition into `state`.
    pub fn on_state<F>(&mut self, state: CallState, callback: F)
    where
        F: Fn(CallState) + Send + Sync + 'static,
    {
        self.callbacks.entry(state).or_default().push(Box::new(callback));
    }

    /// Attempt a transition. Always legal if `target == FAILED`;
    /// otherwise validated against the adjacency table and rejected if
    /// the current state is terminal.
    pub fn transition(&mut self, target: CallState) -> Result<(), StateMachineError> {
        if target == CallState::Failed {
            self.force_failed();
            return Ok(());
        }

        if self.current.is_terminal() {
            return Err(StateMachineError::AlreadyTerminal(self.current.to_string()));
        }

        if !legal_targets(self.current).contains(&target) {
            return Err(StateMachineError::IllegalTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            });
        }

        self.apply(target);
        Ok(())
    }

    /// Force `FAILED` unconditionally, idempotent once already `FAILED`.
    pub fn force_failed(&mut self) {
        if self.current == CallState::Failed {
            return;
        }
        self.apply(CallState::Failed);
    }

    fn apply(&mut self, target: CallState) {
        self.previous = Some(self.current);
        self.current = target;
        self.history.push(target);
        self.trigger_callbacks(target);
    }

    fn trigger_callbacks(&self, state: CallState) {
        if let Some(callbacks) = self.callbacks.get(&state) {
            for callback in callbacks {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(state)));
                if result.is_err() {
                    warn!(?state, "state callback panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn idle_to_connected_is_legal() {
        let mut sm = CallStateMachine::new();
        sm.transition(CallState::Connected).unwrap();
        assert_eq!(sm.current(), CallState::Connected);
        assert_eq!(sm.previous(), Some(CallState::Idle));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut sm = CallStateMachine::new();
        let err = sm.transition(CallState::ExtractingData).unwrap_err();
        assert!(matches!(err, StateMachineError::IllegalTransition { .. }));
        assert_eq!(sm.current(), CallState::Idle);
    }

    #[test]
    fn any_state_can_be_forced_to_failed() {
        let mut sm = CallStateMachine::new();
        sm.transition(CallState::Connected).unwrap();
        sm.transition(CallState::Failed).unwrap();
        assert_eq!(sm.current(), CallState::Failed);
    }

    #[test]
    fn failed_is_idempotent() {
        let mut sm = CallStateMachine::new();
        sm.force_failed();
        sm.force_failed();
        assert_eq!(sm.history(), &[CallState::Idle, CallState::Failed]);
    }

    #[test]
    fn terminal_state_rejects_non_failed_transitions() {
        let mut sm = CallStateMachine::new();
        sm.transition(CallState::Connected).unwrap();
        sm.transition(CallState::AwaitingIvrResult).unwrap();
        sm.transition(CallState::ExtractingData).unwrap();
        sm.transition(CallState::Complete).unwrap();
        let err = sm.transition(CallState::Connected).unwrap_err();
        assert!(matches!(err, StateMachineError::AlreadyTerminal(_)));
    }

    #[test]
    fn callback_runs_after_transition() {
        let mut sm = CallStateMachine::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        sm.on_state(CallState::Connected, move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        sm.transition(CallState::Connected).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
