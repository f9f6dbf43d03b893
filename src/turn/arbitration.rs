// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Turn-arbitration heuristics used while a call is
//! `AWAITING_IVR_RESULT`, ported in meaning from
//! `original_source/agent/src/message_handlers.py`'s
//! `_should_process_while_awaiting`/`_is_menu_option`/`_extract_keywords`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{ActionKind, LastAction};

static MENU_OPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"press \d|say .+ or press").expect("static regex is valid"));

static MENU_DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"press (\d)").expect("static regex is valid"));

/// True if the prompt reads as the IVR still enumerating menu options.
pub fn is_menu_option(prompt: &str) -> bool {
    MENU_OPTION_RE.is_match(&prompt.to_lowercase())
}

/// The digit a "press N for ..." prompt offers, if any.
fn menu_digit(prompt: &str) -> Option<u32> {
    MENU_DIGIT_RE
        .captures(&prompt.to_lowercase())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// True if `prompt` still reads as the same menu enumeration the agent
/// just sent a digit into, rather than a new sub-menu reached by it.
///
/// A menu is read out in ascending digit order, so a prompt offering a
/// digit higher than the one just sent is the IVR continuing to list
/// options it hadn't finished reading when the DTMF went out; a digit
/// at or below the one sent means the IVR already moved past that
/// point and is now presenting a new sub-menu.
fn is_continued_menu_enumeration(prompt: &str, last_digit: Option<&str>) -> bool {
    let Some(option_digit) = menu_digit(prompt) else {
        return is_menu_option(prompt);
    };
    match last_digit.and_then(|d| d.parse::<u32>().ok()) {
        Some(last) => option_digit > last,
        None => true,
    }
}

/// First three characters of the spoken value, lowercased — the
/// original's deliberately simple keyword extraction for matching a
/// follow-up prompt against what the agent just spoke.
pub fn extract_keywords(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    let lower = value.to_lowercase();
    let prefix: String = lower.chars().take(3).collect();
    vec![prefix]
}

/// Decide whether an inbound prompt should be processed while
/// `AWAITING_IVR_RESULT`, or buffered (the IVR hasn't moved on yet).
///
/// Returns `true` when the prompt represents a new context and normal
/// decision processing should resume.
pub fn should_process_while_awaiting(prompt: &str, last_action: &LastAction) -> bool {
    let prompt_lower = prompt.to_lowercase();

    match last_action.kind {
        Some(ActionKind::Dtmf) => !is_continued_menu_enumeration(prompt, last_action.value.as_deref()),
        Some(ActionKind::Speak) => {
            let keywords = last_action.value.as_deref().map(extract_keywords).unwrap_or_default();
            let mentions_same = keywords.iter().any(|kw| prompt_lower.contains(kw.as_str()));
            !mentions_same
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_menu_enumeration() {
        assert!(is_menu_option("Press 1 for status check."));
        assert!(is_menu_option("Say claims or press 3 for billing."));
        assert!(!is_menu_option("Enter your member ID."));
    }

    #[test]
    fn buffers_further_menu_options_after_dtmf() {
        let last = LastAction {
            kind: Some(ActionKind::Dtmf),
            value: Some("2".into()),
        };
        assert!(!should_process_while_awaiting("Press 3 for claims.", &last));
        assert!(should_process_while_awaiting("Enter your member ID.", &last));
    }

    #[test]
    fn processes_a_sub_menu_reached_by_the_last_digit() {
        let last = LastAction {
            kind: Some(ActionKind::Dtmf),
            value: Some("2".into()),
        };
        assert!(should_process_while_awaiting("Press 1 for status check.", &last));
    }

    #[test]
    fn buffers_same_topic_after_speak() {
        let last = LastAction {
            kind: Some(ActionKind::Speak),
            value: Some("03151965".into()),
        };
        assert!(!should_process_while_awaiting("Please confirm 031 again.", &last));
        assert!(should_process_while_awaiting("Enter the procedure code.", &last));
    }

    #[test]
    fn default_last_action_always_processes() {
        assert!(should_process_while_awaiting("anything", &LastAction::none()));
    }
}
