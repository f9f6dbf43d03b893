// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Retry Governor (C3): bounded counters for menu/info/uncertainty/
//! silence/repeated-prompt, emitting advisory actions.
//!
//! Grounded on `original_source/agent/src/retry_handler.py`'s
//! `RetryHandler`. Advisory actions never take effect on their own —
//! the Turn Controller (C5) remains authoritative over what is sent.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::session::SessionContext;
use crate::types::{AdvisoryAction, FailureReason};

/// Outcome of a governor check.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryResult {
    pub should_continue: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    pub advisory_action: AdvisoryAction,
    pub reason: String,
}

/// Outcome of the repeated-prompt check, which additionally reports
/// whether the current prompt is a repeat at all.
#[derive(Debug, Clone, PartialEq)]
pub struct RepeatedPromptResult {
    pub is_repeated: bool,
    pub retry: RetryResult,
}

#[derive(Default)]
struct CallTracking {
    last_activity: Option<Instant>,
    silence_timeout_count: u32,
    last_prompt_hash: Option<String>,
    repeated_prompt_count: u32,
}

/// Per-call auxiliary maps that outlive a single decision, keyed by
/// `call_id`, with a disconnect hook (`reset_all_tracking`) to reclaim
/// them.
pub struct RetryGovernor {
    silence_timeout: Duration,
    max_silence_timeouts: u32,
    max_repeated_prompts: u32,
    tracking: HashMap<String, CallTracking>,
}

impl Default for RetryGovernor {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryGovernor {
    pub fn new() -> Self {
        Self::with_thresholds(Duration::from_secs(10), 2, 2)
    }

    /// Construct with explicit thresholds, matching the original's
    /// `RetryHandler.__init__` keyword defaults; used by callers (and
    /// tests) that need a shorter silence window than the production
    /// default.
    pub fn with_thresholds(silence_timeout: Duration, max_silence_timeouts: u32, max_repeated_prompts: u32) -> Self {
        Self {
            silence_timeout,
            max_silence_timeouts,
            max_repeated_prompts,
            tracking: HashMap::new(),
        }
    }

    /// The configured silence window, used by the edge layer to arm
    /// its per-connection timeout (spec §5).
    pub fn silence_timeout(&self) -> Duration {
        self.silence_timeout
    }

    pub fn check_menu_retry(&mut self, ctx: &mut SessionContext) -> RetryResult {
        let under_limit = ctx.increment_menu_retry();
        let current = ctx.menu_retries;
        let max_retries = ctx.bounds.max_menu_retries;

        info!(current, max_retries, "menu retry");

        if !under_limit {
            warn!(max_retries, "max menu retries reached, ending call");
            ctx.mark_failed_as(FailureReason::MaxMenuRetries, format!("Max menu retries ({max_retries}) exceeded"));
            return RetryResult {
                should_continue: false,
                retry_count: current,
                max_retries,
                advisory_action: AdvisoryAction::EndCall,
                reason: format!("Menu navigation failed after {max_retries} attempts"),
            };
        }

        RetryResult {
            should_continue: true,
            retry_count: current,
            max_retries,
            advisory_action: AdvisoryAction::Dtmf9,
            reason: format!("Retrying menu navigation ({current}/{max_retries})"),
        }
    }

    pub fn check_info_retry(&mut self, ctx: &mut SessionContext) -> RetryResult {
        let under_limit = ctx.increment_info_retry();
        let current = ctx.info_retries;
        let max_retries = ctx.bounds.max_info_retries;

        info!(current, max_retries, "info retry");

        if !under_limit {
            warn!(max_retries, "max info retries reached, ending call");
            ctx.mark_failed_as(
                FailureReason::MaxInfoRetries,
                format!("Max info retries ({max_retries}) exceeded - unable to provide member information"),
            );
            return RetryResult {
                should_continue: false,
                retry_count: current,
                max_retries,
                advisory_action: AdvisoryAction::EndCall,
                reason: format!("Info provision failed after {max_retries} attempts"),
            };
        }

        RetryResult {
            should_continue: true,
            retry_count: current,
            max_retries,
            advisory_action: AdvisoryAction::SpeakRepeat,
            reason: format!("Retrying info provision ({current}/{max_retries})"),
        }
    }

    pub fn check_uncertainty(&mut self, ctx: &mut SessionContext, confidence: f64) -> RetryResult {
        let threshold = ctx.bounds.confidence_threshold;
        if confidence >= threshold {
            return RetryResult {
                should_continue: true,
                retry_count: ctx.uncertain_count,
                max_retries: ctx.bounds.max_uncertain_total,
                advisory_action: AdvisoryAction::None,
                reason: "Confidence above threshold".to_string(),
            };
        }

        let under_limit = ctx.increment_uncertain();
        let current = ctx.uncertain_count;
        let max_uncertain = ctx.bounds.max_uncertain_total;

        info!(confidence, current, max_uncertain, "low confidence");

        if !under_limit {
            warn!(max_uncertain, "max uncertain responses reached, ending call");
            ctx.mark_failed_as(
                FailureReason::MaxUncertainExceeded,
                format!("Too many uncertain responses ({max_uncertain})"),
            );
            return RetryResult {
                should_continue: false,
                retry_count: current,
                max_retries: max_uncertain,
                advisory_action: AdvisoryAction::EndCall,
                reason: "Exceeded maximum uncertainty threshold".to_string(),
            };
        }

        RetryResult {
            should_continue: true,
            retry_count: current,
            max_retries: max_uncertain,
            advisory_action: AdvisoryAction::Dtmf9,
            reason: format!("Low confidence ({confidence:.2}), requesting repeat"),
        }
    }

    pub fn reset_menu_retries(&self, ctx: &mut SessionContext) {
        if ctx.menu_retries > 0 {
            ctx.menu_retries = 0;
        }
    }

    pub fn reset_info_retries(&self, ctx: &mut SessionContext) {
        if ctx.info_retries > 0 {
            ctx.info_retries = 0;
        }
    }

    /// First call for a `call_id` only records activity. Subsequent
    /// calls compare elapsed time against the silence threshold.
    pub fn check_silence_timeout(&mut self, ctx: &mut SessionContext) -> RetryResult {
        let call_id = ctx.call_id.clone();
        let entry = self.tracking.entry(call_id).or_default();

        let Some(last_activity) = entry.last_activity else {
            entry.last_activity = Some(Instant::now());
            return RetryResult {
                should_continue: true,
                retry_count: 0,
                max_retries: self.max_silence_timeouts,
                advisory_action: AdvisoryAction::None,
                reason: "Activity tracking started".to_string(),
            };
        };

        let elapsed = last_activity.elapsed();
        if elapsed < self.silence_timeout {
            return RetryResult {
                should_continue: true,
                retry_count: entry.silence_timeout_count,
                max_retries: self.max_silence_timeouts,
                advisory_action: AdvisoryAction::None,
                reason: format!(
                    "No timeout ({:.1}s < {:.1}s)",
                    elapsed.as_secs_f64(),
                    self.silence_timeout.as_secs_f64()
                ),
            };
        }

        entry.silence_timeout_count += 1;
        let current = entry.silence_timeout_count;
        let max_timeouts = self.max_silence_timeouts;

        warn!(current, max_timeouts, "silence timeout");

        if current >= max_timeouts {
            ctx.mark_failed_as(FailureReason::IvrTimeout, "IVR silence timeout - no response");
            return RetryResult {
                should_continue: false,
                retry_count: current,
                max_retries: max_timeouts,
                advisory_action: AdvisoryAction::EndCall,
                reason: "ivr_timeout".to_string(),
            };
        }

        entry.last_activity = Some(Instant::now());
        ctx.add_system(format!("Silence timeout ({current}/{max_timeouts}) - requesting repeat"));

        RetryResult {
            should_continue: true,
            retry_count: current,
            max_retries: max_timeouts,
            advisory_action: AdvisoryAction::Dtmf9,
            reason: format!("Silence timeout, requesting repeat ({current}/{max_timeouts})"),
        }
    }

    pub fn record_activity(&mut self, call_id: &str) {
        self.tracking.entry(call_id.to_string()).or_default().last_activity = Some(Instant::now());
    }

    pub fn reset_silence_tracking(&mut self, call_id: &str) {
        if let Some(t) = self.tracking.get_mut(call_id) {
            t.last_activity = None;
            t.silence_timeout_count = 0;
        }
    }

    /// Normalize, hash, and compare against the previous prompt for
    /// this call. A new prompt resets the repeat counter; the same
    /// prompt increments it, crossing into `alternative` at the bound.
    pub fn check_repeated_prompt(&mut self, ctx: &mut SessionContext, prompt: &str) -> RepeatedPromptResult {
        let current_hash = normalize_and_hash(prompt);
        let call_id = ctx.call_id.clone();
        let entry = self.tracking.entry(call_id).or_default();

        let is_new = entry.last_prompt_hash.as_deref() != Some(current_hash.as_str());
        entry.last_prompt_hash = Some(current_hash);

        if is_new {
            entry.repeated_prompt_count = 0;
            return RepeatedPromptResult {
                is_repeated: false,
                retry: RetryResult {
                    should_continue: true,
                    retry_count: 0,
                    max_retries: self.max_repeated_prompts,
                    advisory_action: AdvisoryAction::None,
                    reason: "New prompt detected".to_string(),
                },
            };
        }

        entry.repeated_prompt_count += 1;
        let repeat_count = entry.repeated_prompt_count;
        let max_repeats = self.max_repeated_prompts;

        warn!(repeat_count, max_repeats, "repeated prompt detected");
        ctx.add_system(format!("Repeated prompt detected ({repeat_count}/{max_repeats})"));

        if repeat_count >= max_repeats {
            return RepeatedPromptResult {
                is_repeated: true,
                retry: RetryResult {
                    should_continue: true,
                    retry_count: repeat_count,
                    max_retries: max_repeats,
                    advisory_action: AdvisoryAction::Alternative,
                    reason: "Repeated prompt - try alternative input method".to_string(),
                },
            };
        }

        RepeatedPromptResult {
            is_repeated: true,
            retry: RetryResult {
                should_continue: true,
                retry_count: repeat_count,
                max_retries: max_repeats,
                advisory_action: AdvisoryAction::None,
                reason: format!("Repeated prompt ({repeat_count}/{max_repeats})"),
            },
        }
    }

    pub fn reset_prompt_tracking(&mut self, call_id: &str) {
        if let Some(t) = self.tracking.get_mut(call_id) {
            t.last_prompt_hash = None;
            t.repeated_prompt_count = 0;
        }
    }

    /// Reclaim all auxiliary state for a call on disconnect.
    pub fn reset_all_tracking(&mut self, call_id: &str) {
        self.tracking.remove(call_id);
        info!(call_id, "all retry tracking reset");
    }
}

/// Lowercase, strip `.,!?;:`, collapse whitespace, then digest —
/// idempotent: `normalize_and_hash(normalize(x)) == normalize_and_hash(x)`.
fn normalize_and_hash(prompt: &str) -> String {
    let mut normalized = prompt.to_lowercase();
    normalized.retain(|c| !".,!?;:".contains(c));
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallInputs;

    fn ctx() -> SessionContext {
        SessionContext::new(
            "c1",
            None,
            CallInputs {
                member_id: "ABC123456".into(),
                cpt_code: "27447".into(),
                date_of_birth: "03151965".into(),
                provider_name: None,
            },
        )
    }

    #[test]
    fn menu_retry_ends_call_at_bound() {
        let mut gov = RetryGovernor::new();
        let mut ctx = ctx();
        for _ in 0..2 {
            let r = gov.check_menu_retry(&mut ctx);
            assert!(r.should_continue);
            assert_eq!(r.advisory_action, AdvisoryAction::Dtmf9);
        }
        let r = gov.check_menu_retry(&mut ctx);
        assert!(!r.should_continue);
        assert_eq!(r.advisory_action, AdvisoryAction::EndCall);
        assert_eq!(ctx.state(), crate::types::CallState::Failed);
    }

    #[test]
    fn uncertainty_boundary_at_four_and_five() {
        let mut gov = RetryGovernor::new();
        let mut ctx = ctx();
        for _ in 0..4 {
            let r = gov.check_uncertainty(&mut ctx, 0.59);
            assert!(r.should_continue);
            assert_eq!(r.advisory_action, AdvisoryAction::Dtmf9);
        }
        assert_eq!(ctx.uncertain_count, 4);
        let r = gov.check_uncertainty(&mut ctx, 0.59);
        assert!(!r.should_continue);
        assert_eq!(r.advisory_action, AdvisoryAction::EndCall);
        assert_eq!(ctx.uncertain_count, 5);
    }

    #[test]
    fn uncertainty_above_threshold_does_not_increment() {
        let mut gov = RetryGovernor::new();
        let mut ctx = ctx();
        let r = gov.check_uncertainty(&mut ctx, 0.9);
        assert_eq!(r.advisory_action, AdvisoryAction::None);
        assert_eq!(ctx.uncertain_count, 0);
    }

    #[test]
    fn repeated_prompt_trips_alternative_at_bound() {
        let mut gov = RetryGovernor::new();
        let mut ctx = ctx();
        let r1 = gov.check_repeated_prompt(&mut ctx, "I didn't catch that.");
        assert!(!r1.is_repeated);
        let r2 = gov.check_repeated_prompt(&mut ctx, "I didn't catch that.");
        assert!(r2.is_repeated);
        assert_eq!(r2.retry.advisory_action, AdvisoryAction::None);
        let r3 = gov.check_repeated_prompt(&mut ctx, "I didn't catch that.");
        assert!(r3.is_repeated);
        assert_eq!(r3.retry.advisory_action, AdvisoryAction::Alternative);
    }

    #[test]
    fn silence_timeout_escalates_to_end_call() {
        let mut gov = RetryGovernor::with_thresholds(Duration::from_millis(20), 2, 2);
        let mut ctx = ctx();

        let r = gov.check_silence_timeout(&mut ctx);
        assert!(r.should_continue);

        std::thread::sleep(Duration::from_millis(30));
        let r = gov.check_silence_timeout(&mut ctx);
        assert!(r.should_continue);
        assert_eq!(r.advisory_action, AdvisoryAction::Dtmf9);

        std::thread::sleep(Duration::from_millis(30));
        let r = gov.check_silence_timeout(&mut ctx);
        assert!(!r.should_continue);
        assert_eq!(r.advisory_action, AdvisoryAction::EndCall);
        assert_eq!(ctx.state(), crate::types::CallState::Failed);
    }

    #[test]
    fn normalize_and_hash_is_idempotent() {
        let a = normalize_and_hash("Press 2, for Prior Authorization!!");
        let b = normalize_and_hash(&"press 2 for prior authorization".to_string());
        assert_eq!(a, b);
    }

    #[test]
    fn reset_all_tracking_clears_silence_and_prompt_state() {
        let mut gov = RetryGovernor::new();
        let mut ctx = ctx();
        gov.check_repeated_prompt(&mut ctx, "hello");
        gov.record_activity("c1");
        gov.reset_all_tracking("c1");
        assert!(!gov.tracking.contains_key("c1"));
    }
}
