// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP + WebSocket edge (C6): the axum surface described in `spec.md`
//! §6, assembled the way the pack's `selene_adapter` binary assembles
//! its router — `Router::new().route(...).with_state(state)` served
//! over a plain `TcpListener`.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::config::Settings;
use crate::oracle::anthropic::AnthropicNavigator;
use crate::registry::{PendingCallRegistry, SessionRegistry};
use crate::sink::ResultsSink;
use crate::telephony::TelephonyClient;
use crate::turn::TurnController;

/// Shared, cloneable application state handed to every handler via
/// axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sessions: SessionRegistry,
    pub pending_calls: PendingCallRegistry,
    pub turn_controller: Arc<TurnController<AnthropicNavigator>>,
    pub sink: Arc<ResultsSink>,
    pub telephony: Arc<TelephonyClient>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let oracle = AnthropicNavigator::new(settings.oracle_api_key.clone(), settings.http_timeout);
        let sink = ResultsSink::new(settings.backend_url.clone(), settings.http_timeout);
        let telephony = TelephonyClient::new(
            settings.telephony_sid.clone(),
            settings.telephony_token.clone(),
            settings.dial_out_timeout,
        );

        Self {
            sessions: SessionRegistry::new(),
            pending_calls: PendingCallRegistry::new(),
            turn_controller: Arc::new(TurnController::new(oracle)),
            sink: Arc::new(sink),
            telephony: Arc::new(telephony),
            settings,
        }
    }
}

/// Build the full router: liveness/health, dial-out, TwiML, status
/// callbacks, and the ConversationRelay WebSocket (spec §6.1/§6.2).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::root))
        .route("/health", get(http::health))
        .route("/outbound-call", post(http::outbound_call))
        .route("/twiml/:call_id", get(http::twiml).post(http::twiml))
        .route("/call-status/:call_id", post(http::call_status))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}
