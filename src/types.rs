// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire-shared domain types for the voice-agent bridge.
//!
//! These are the value types that flow between the Session Context
//! (C1), the Navigator Oracle Adapter (C4), and the Turn Controller
//! (C5). Nothing here owns behavior beyond small, total constructors
//! and validators — the orchestration lives in `session`, `governor`,
//! `oracle`, and `turn`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// States for a live call. `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallState {
    Idle,
    Dialing,
    Connected,
    NavigatingMenu,
    ProvidingInfo,
    AwaitingIvrResult,
    WaitingResponse,
    ExtractingData,
    Complete,
    Failed,
}

impl CallState {
    /// Terminal states reject further transitions except the
    /// idempotent self-loop on `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Complete | CallState::Failed)
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallState::Idle => "IDLE",
            CallState::Dialing => "DIALING",
            CallState::Connected => "CONNECTED",
            CallState::NavigatingMenu => "NAVIGATING_MENU",
            CallState::ProvidingInfo => "PROVIDING_INFO",
            CallState::AwaitingIvrResult => "AWAITING_IVR_RESULT",
            CallState::WaitingResponse => "WAITING_RESPONSE",
            CallState::ExtractingData => "EXTRACTING_DATA",
            CallState::Complete => "COMPLETE",
            CallState::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    Ivr,
    Agent,
    System,
}

/// A single, append-only transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub action_type: Option<String>,
    pub confidence: Option<f64>,
}

impl TranscriptEntry {
    pub fn ivr(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Ivr,
            text: text.into(),
            timestamp: Utc::now(),
            action_type: None,
            confidence: None,
        }
    }

    pub fn agent(text: impl Into<String>, action_type: Option<String>, confidence: Option<f64>) -> Self {
        Self {
            speaker: Speaker::Agent,
            text: text.into(),
            timestamp: Utc::now(),
            action_type,
            confidence,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::System,
            text: text.into(),
            timestamp: Utc::now(),
            action_type: None,
            confidence: None,
        }
    }
}

/// Authorization status as reported by the IVR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Approved,
    Denied,
    Pending,
    NotFound,
    Expired,
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthStatus::Approved => "approved",
            AuthStatus::Denied => "denied",
            AuthStatus::Pending => "pending",
            AuthStatus::NotFound => "not_found",
            AuthStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AuthStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            "pending" => Ok(Self::Pending),
            "not_found" => Ok(Self::NotFound),
            "expired" => Ok(Self::Expired),
            _ => Err(()),
        }
    }
}

/// Authorization data extracted from the IVR's final response.
///
/// At most one exists per call, and only once the call has passed
/// through `EXTRACTING_DATA`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedAuthorization {
    pub auth_number: Option<String>,
    pub status: Option<AuthStatus>,
    pub valid_through: Option<String>,
    pub denial_reason: Option<String>,
    pub raw_text: Option<String>,
}

/// The kind of thing the agent last did, used by turn arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Dtmf,
    Speak,
    None,
}

/// The most recent action the agent emitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastAction {
    pub kind: Option<ActionKind>,
    pub value: Option<String>,
}

impl LastAction {
    pub fn none() -> Self {
        Self { kind: None, value: None }
    }

    pub fn is_none(&self) -> bool {
        self.kind.is_none() || self.kind == Some(ActionKind::None)
    }
}

/// Inputs that identify the member and procedure under check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallInputs {
    pub member_id: String,
    pub cpt_code: String,
    pub date_of_birth: String,
    pub provider_name: Option<String>,
}

/// The tagged variant a navigator decision can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionType {
    Dtmf,
    Speak,
    Wait,
    Extract,
    Uncertain,
}

/// A verdict from the Navigator Oracle Adapter (C4).
///
/// Validated at the adapter boundary (`oracle::adapter`) so that
/// downstream code (the Turn Controller) is total over the variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigatorDecision {
    #[serde(rename = "type")]
    pub kind: DecisionType,
    pub value: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub extracted_data: Option<ExtractedDataPayload>,
}

/// Raw extraction payload as returned by the oracle, prior to being
/// folded into an `ExtractedAuthorization`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedDataPayload {
    pub auth_number: Option<String>,
    pub status: Option<String>,
    pub valid_through: Option<String>,
    pub denial_reason: Option<String>,
}

impl NavigatorDecision {
    /// Clamp confidence into `[0, 1]` per the adapter's validation rules.
    pub fn clamp_confidence(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

/// Typed terminal failure reasons posted to the results sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MaxUncertainExceeded,
    MaxMenuRetries,
    MaxInfoRetries,
    IvrTimeout,
    AgentError,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureReason::MaxUncertainExceeded => "max_uncertain_exceeded",
            FailureReason::MaxMenuRetries => "max_menu_retries",
            FailureReason::MaxInfoRetries => "max_info_retries",
            FailureReason::IvrTimeout => "ivr_timeout",
            FailureReason::AgentError => "agent_error",
        };
        write!(f, "{s}")
    }
}

/// Advisory action a governor check suggests to the Turn Controller.
///
/// Advisory only — the controller remains authoritative over what is
/// actually sent (`spec.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisoryAction {
    None,
    Dtmf9,
    SpeakRepeat,
    Alternative,
    EndCall,
}
