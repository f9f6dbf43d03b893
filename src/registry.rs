// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-wide registries: the session registry and the pending-call
//! registry (spec §5/§9).
//!
//! Both are small concurrent maps mutated only by their owning task,
//! grounded on the teacher's `IpcServer::workers` map
//! (`orchestrate/ipc/server.rs`) — same `Arc<RwLock<HashMap<..>>>`
//! ownership discipline, applied to WebSocket sessions and dial-out
//! bookkeeping instead of Unix-socket workers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::session::SessionContext;
use crate::types::CallInputs;

/// Status of a call placed but not yet bridged over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingCallStatus {
    Initiated,
    Ringing,
    Answered,
    Completed,
    Failed,
}

impl PendingCallStatus {
    pub fn from_provider_event(event: &str) -> Option<Self> {
        match event {
            "initiated" => Some(Self::Initiated),
            "ringing" => Some(Self::Ringing),
            "answered" => Some(Self::Answered),
            "completed" => Some(Self::Completed),
            "failed" | "busy" | "no-answer" | "canceled" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A call placed at dial-out time, consumed at WebSocket `setup` so
/// member-sensitive data need not travel over the wire a second time.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub call_sid: Option<String>,
    pub inputs: CallInputs,
    pub status: PendingCallStatus,
    pub created_at: DateTime<Utc>,
}

/// `session_id -> SessionContext`, mutated only by the owning session
/// task on setup/disconnect; read by the shutdown and health-check
/// paths.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionContext>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session_id: String, ctx: SessionContext) {
        self.sessions.write().await.insert(session_id, ctx);
    }

    pub async fn remove(&self, session_id: &str) -> Option<SessionContext> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Mutate a session in place, returning `None` if the session is
    /// unknown.
    pub async fn with_mut<F, T>(&self, session_id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut SessionContext) -> T,
    {
        let mut guard = self.sessions.write().await;
        guard.get_mut(session_id).map(f)
    }
}

/// `call_id -> {call_sid, inputs, status, created_at}`, populated at
/// dial-out and consumed at setup.
#[derive(Clone, Default)]
pub struct PendingCallRegistry {
    calls: Arc<RwLock<HashMap<String, PendingCall>>>,
}

impl PendingCallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, call_id: String, call: PendingCall) {
        self.calls.write().await.insert(call_id, call);
    }

    pub async fn get(&self, call_id: &str) -> Option<PendingCall> {
        self.calls.read().await.get(call_id).cloned()
    }

    pub async fn update_status(&self, call_id: &str, status: PendingCallStatus) -> bool {
        let mut guard = self.calls.write().await;
        if let Some(call) = guard.get_mut(call_id) {
            call.status = status;
            true
        } else {
            false
        }
    }

    pub async fn remove(&self, call_id: &str) -> Option<PendingCall> {
        self.calls.write().await.remove(call_id)
    }
}
