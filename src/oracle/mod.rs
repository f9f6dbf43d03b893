// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Navigator Oracle Adapter (C4): packages the prompt and context for
//! the language model, and parses/validates the structured verdict.
//!
//! Grounded on `original_source/agent/src/claude_navigator.py`'s
//! `ClaudeNavigator`. The adapter never raises to its caller — any
//! transport, parse, or schema failure collapses into a low-confidence
//! `uncertain` decision so the Retry Governor (C3) still sees a
//! decision to bound.

pub mod anthropic;

use async_trait::async_trait;

use crate::types::{CallInputs, NavigatorDecision, TranscriptEntry};

/// The system prompt handed to the oracle on every call, grounded
/// verbatim (in meaning) on `claude_navigator.py`'s `SYSTEM_PROMPT`.
pub const SYSTEM_PROMPT: &str = r#"You are an AI agent navigating an insurance company's IVR (Interactive Voice Response) system to check prior authorization status.

Your role is to analyze IVR prompts and decide the appropriate action. You will receive:
1. The current IVR prompt (what the system just said)
2. Call context (member ID, CPT code, date of birth)
3. Conversation history

You must respond with a JSON object containing:
- type: One of "dtmf" (press digit), "speak" (say something), "wait" (listen more), "extract" (found authorization data), "uncertain" (need help)
- value: The DTMF digit to press OR the text to speak (null for wait/extract/uncertain)
- confidence: A score from 0.0 to 1.0 indicating your confidence in this decision
- reasoning: Brief explanation of why you chose this action
- extracted_data: (Only for type="extract") Object with auth_number, status, valid_through, denial_reason fields

Guidelines:
1. For menu navigation, identify which option leads to "prior authorization" or "authorization status"
2. When asked for member ID, spell it out clearly (e.g., "A B C 1 2 3 4 5 6")
3. When asked for date of birth, provide as 8 digits MMDDYYYY
4. When asked for CPT code, provide the 5-digit code
5. When you hear authorization results, extract: auth_number, status (approved/denied/pending/not_found), valid_through date
6. If uncertain, set type="uncertain" with confidence < 0.6

Common IVR patterns:
- "Press 1 for X, press 2 for Y" -> Identify the right option and send DTMF
- "Enter your member ID" -> Speak the member ID
- "Enter date of birth" -> Speak DOB as MMDDYYYY
- "Authorization PA-XXXX is approved through DATE" -> Extract data
- "No authorization found" -> Extract with status="not_found"

Always respond with valid JSON only, no additional text."#;

pub const MAX_TOKENS: u32 = 500;
pub const MODEL: &str = "claude-3-5-haiku-20241022";
const HISTORY_WINDOW: usize = 10;

/// The decision adapter's external contract. Implementors must never
/// return `Err` as a way to signal a low-confidence verdict — all such
/// cases collapse to `Ok(NavigatorDecision { kind: Uncertain, .. })`.
#[async_trait]
pub trait NavigatorOracle: Send + Sync {
    async fn decide(
        &self,
        ivr_prompt: &str,
        inputs: &CallInputs,
        history: &[&TranscriptEntry],
    ) -> NavigatorDecision;
}

/// Build the user message sent alongside [`SYSTEM_PROMPT`]: call
/// context, the last `HISTORY_WINDOW` IVR/Agent turns, and the current
/// prompt.
pub fn build_user_message(ivr_prompt: &str, inputs: &CallInputs, history: &[&TranscriptEntry]) -> String {
    let mut message = format!(
        "CALL CONTEXT:\n- Member ID: {}\n- CPT Code: {}\n- Date of Birth: {}",
        inputs.member_id, inputs.cpt_code, inputs.date_of_birth
    );

    if !history.is_empty() {
        message.push_str("\n\nCONVERSATION HISTORY:\n");
        let start = history.len().saturating_sub(HISTORY_WINDOW);
        for entry in &history[start..] {
            message.push_str(&format!("{:?}: {}\n", entry.speaker, entry.text));
        }
    }

    message.push_str(&format!("\nCURRENT IVR PROMPT:\n{ivr_prompt}\n\nAnalyze this prompt and provide your decision as JSON."));
    message
}

/// Parse a raw model reply into a validated [`NavigatorDecision`].
///
/// Strict JSON first; on failure, best-effort extraction of the first
/// `{...}` substring. Any failure collapses to `uncertain`/`0.0`
/// rather than propagating — this function is infallible by design.
pub fn parse_decision(raw: &str) -> NavigatorDecision {
    let trimmed = raw.trim();

    let parsed: Option<NavigatorDecision> = serde_json::from_str(trimmed)
        .ok()
        .or_else(|| extract_json_object(trimmed).and_then(|s| serde_json::from_str(&s).ok()));

    match parsed {
        Some(decision) => validate(decision),
        None => uncertain(format!("Could not parse JSON from response: {trimmed}")),
    }
}

fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(text[start..=end].to_string())
}

/// Apply the adapter's validation rules: `value` required iff
/// `type ∈ {dtmf, speak}`, `extracted_data` required iff `type =
/// extract`, confidence clamped to `[0, 1]`.
fn validate(decision: NavigatorDecision) -> NavigatorDecision {
    use crate::types::DecisionType::*;

    let decision = decision.clamp_confidence();

    let value_ok = match decision.kind {
        Dtmf | Speak => decision.value.is_some(),
        _ => true,
    };
    let extracted_ok = match decision.kind {
        Extract => decision.extracted_data.is_some(),
        _ => true,
    };

    if !value_ok || !extracted_ok {
        return uncertain("oracle verdict failed schema validation".to_string());
    }

    decision
}

fn uncertain(reasoning: String) -> NavigatorDecision {
    NavigatorDecision {
        kind: crate::types::DecisionType::Uncertain,
        value: None,
        confidence: 0.0,
        reasoning,
        extracted_data: None,
    }
}
