// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Crate-wide error taxonomy.
//!
//! Each concern gets its own `thiserror` enum, matching the split the
//! teacher crate uses for its own subsystems. `BridgeError` is the
//! top-level error returned from the edge layer and `main`; the
//! per-concern errors convert into it with `#[from]`.

use thiserror::Error;

/// Errors from loading and validating process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for environment variable {name}: {value}")]
    InvalidVar { name: String, value: String },
}

/// Errors from the Navigator Oracle Adapter (C4).
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("oracle returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the state machine (C2). Every variant is recoverable by
/// the caller inspecting the current state, never a process-fatal error.
#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("call is already in a terminal state: {0}")]
    AlreadyTerminal(String),
}

/// Errors from posting to or reading from the results sink (C6 edge).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("results sink returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
}

/// Errors from placing outbound calls with the telephony provider.
#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("telephony provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
}

/// Errors surfaced from WebSocket/HTTP session handling at the edge.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown call id: {0}")]
    UnknownCall(String),

    #[error("duplicate call id: {0}")]
    DuplicateCall(String),

    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

/// Top-level error returned across crate boundaries.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("telephony error: {0}")]
    Telephony(#[from] TelephonyError),

    #[error("state machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
