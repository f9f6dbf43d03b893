// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process configuration, loaded once at startup from the environment.
//!
//! Missing required variables are a fatal startup error (`spec` §7),
//! matching the original's `main.py` required-var check and the
//! teacher's `env::var` based adapter bring-up.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Settings loaded from the process environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub telephony_sid: String,
    pub telephony_token: String,
    pub telephony_from_number: String,
    pub ivr_phone_number: Option<String>,
    pub oracle_api_key: String,
    pub backend_url: String,
    pub agent_public_url: String,
    pub agent_websocket_url: String,
    pub environment: String,
    pub bind_addr: String,
    pub dial_out_timeout: Duration,
    pub http_timeout: Duration,
}

const REQUIRED_VARS: &[&str] = &[
    "TELEPHONY_SID",
    "TELEPHONY_TOKEN",
    "TELEPHONY_FROM_NUMBER",
    "ORACLE_API_KEY",
    "BACKEND_URL",
    "AGENT_PUBLIC_URL",
    "AGENT_WEBSOCKET_URL",
];

impl Settings {
    /// Load and validate settings from the process environment.
    ///
    /// Fails fast, naming every missing variable at once (not just the
    /// first), so a misconfigured deployment gets one useful error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|name| env::var(name).map(|v| v.is_empty()).unwrap_or(true))
            .collect();

        if !missing.is_empty() {
            return Err(ConfigError::MissingVar(missing.join(", ")));
        }

        Ok(Self {
            telephony_sid: env::var("TELEPHONY_SID").unwrap(),
            telephony_token: env::var("TELEPHONY_TOKEN").unwrap(),
            telephony_from_number: env::var("TELEPHONY_FROM_NUMBER").unwrap(),
            ivr_phone_number: env::var("IVR_PHONE_NUMBER").ok().filter(|s| !s.is_empty()),
            oracle_api_key: env::var("ORACLE_API_KEY").unwrap(),
            backend_url: env::var("BACKEND_URL").unwrap(),
            agent_public_url: env::var("AGENT_PUBLIC_URL").unwrap(),
            agent_websocket_url: env::var("AGENT_WEBSOCKET_URL").unwrap(),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            dial_out_timeout: Duration::from_secs(120),
            http_timeout: Duration::from_secs(30),
        })
    }

    /// Whether telephony credentials are present (used by `GET /health`).
    pub fn telephony_configured(&self) -> bool {
        !self.telephony_sid.is_empty() && !self.telephony_token.is_empty()
    }

    /// Whether the oracle key is present (used by `GET /health`).
    pub fn oracle_configured(&self) -> bool {
        !self.oracle_api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for var in REQUIRED_VARS {
            env::remove_var(var);
        }
        env::remove_var("IVR_PHONE_NUMBER");
        env::remove_var("ENVIRONMENT");
        env::remove_var("BIND_ADDR");
    }

    fn set_all_required() {
        env::set_var("TELEPHONY_SID", "AC_test");
        env::set_var("TELEPHONY_TOKEN", "tok_test");
        env::set_var("TELEPHONY_FROM_NUMBER", "+15550000000");
        env::set_var("ORACLE_API_KEY", "sk-test");
        env::set_var("BACKEND_URL", "http://localhost:9000");
        env::set_var("AGENT_PUBLIC_URL", "http://localhost:8080");
        env::set_var("AGENT_WEBSOCKET_URL", "ws://localhost:8080/ws");
    }

    #[test]
    fn missing_required_var_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let result = Settings::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn complete_env_loads_settings() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        set_all_required();
        let settings = Settings::from_env().expect("settings should load");
        assert_eq!(settings.telephony_sid, "AC_test");
        assert_eq!(settings.environment, "development");
        assert!(settings.telephony_configured());
        assert!(settings.oracle_configured());
        clear_all();
    }
}
