// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `voicebridge`: an automated voice agent that calls insurance IVR
//! systems to check prior-authorization status, driven turn-by-turn by
//! a language-model navigator.

pub mod config;
pub mod edge;
pub mod error;
pub mod governor;
pub mod oracle;
pub mod registry;
pub mod session;
pub mod sink;
pub mod telephony;
pub mod turn;
pub mod types;
