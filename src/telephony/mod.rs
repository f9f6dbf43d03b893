// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telephony provider client: places the outbound call that `POST
//! /outbound-call` triggers.
//!
//! The original's `agent.py` leaves `_initiate_twilio_call`
//! unimplemented (`TODO: Implement Twilio call initiation`). This
//! fills that gap the way the results sink client (`sink::ResultsSink`)
//! talks to its HTTP boundary: one `reqwest::Client`, one error enum,
//! form-encoded against the provider's REST Calls resource with
//! Basic auth on the account SID/token.

use serde::Deserialize;
use tracing::{error, info};

use crate::error::TelephonyError;

const API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, Deserialize)]
pub struct PlacedCall {
    pub sid: String,
    pub status: String,
}

/// HTTP client to the telephony provider's REST API.
pub struct TelephonyClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    api_base: String,
}

impl TelephonyClient {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::with_api_base(account_sid, auth_token, API_BASE.to_string(), timeout)
    }

    /// Construct against an arbitrary API base; used in tests to point
    /// at a `wiremock` server instead of the real Twilio endpoint.
    pub fn with_api_base(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        api_base: String,
        timeout: std::time::Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder should not fail on static config");
        Self {
            client,
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            api_base,
        }
    }

    /// Place an outbound call whose instructions live at `twiml_url`
    /// and whose status events POST to `status_callback_url`.
    pub async fn place_call(
        &self,
        to: &str,
        from: &str,
        twiml_url: &str,
        status_callback_url: &str,
    ) -> Result<PlacedCall, TelephonyError> {
        let url = format!("{}/Accounts/{}/Calls.json", self.api_base, self.account_sid);
        info!(to, twiml_url, "placing outbound call");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to),
                ("From", from),
                ("Url", twiml_url),
                ("StatusCallback", status_callback_url),
                ("StatusCallbackEvent", "initiated ringing answered completed"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(%status, body = %text, "telephony provider rejected call request");
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn place_call_parses_sid_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC_test/Calls.json"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "sid": "CA123", "status": "queued"
            })))
            .mount(&server)
            .await;

        let client = TelephonyClient::with_api_base(
            "AC_test",
            "tok",
            format!("{}/2010-04-01", server.uri()),
            std::time::Duration::from_secs(5),
        );
        let placed = client
            .place_call("+15551234567", "+15550000000", "http://x/twiml/1", "http://x/call-status/1")
            .await
            .unwrap();
        assert_eq!(placed.sid, "CA123");
        assert_eq!(placed.status, "queued");
    }
}
