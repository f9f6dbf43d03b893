// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP adapter that invokes the Anthropic Messages API as the
//! navigator oracle, mirroring the bearer/`x-api-key` + JSON body
//! shape the teacher's (unretrieved) `AnthropicProvider` uses from
//! `providers/anthropic.rs`, adapted to the single-turn, bounded-token
//! decision call this adapter makes instead of a streaming chat.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::OracleError;
use crate::types::{CallInputs, NavigatorDecision, TranscriptEntry};

use super::{build_user_message, parse_decision, NavigatorOracle, MAX_TOKENS, MODEL, SYSTEM_PROMPT};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// Calls the real Anthropic Messages API to produce navigator
/// decisions.
pub struct AnthropicNavigator {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl AnthropicNavigator {
    pub fn new(api_key: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::with_api_url(api_key, ANTHROPIC_API_URL.to_string(), timeout)
    }

    /// Construct against an arbitrary base URL; used in tests to point
    /// at a `wiremock` server instead of the real Anthropic endpoint.
    pub fn with_api_url(api_key: impl Into<String>, api_url: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder should not fail on static config");
        Self {
            client,
            api_key: api_key.into(),
            api_url,
        }
    }

    async fn call(&self, user_message: &str) -> Result<String, OracleError> {
        let body = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT,
            messages: vec![RequestMessage {
                role: "user",
                content: user_message,
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        Ok(parsed
            .content
            .first()
            .map(|b| b.text.trim().to_string())
            .unwrap_or_default())
    }
}

#[async_trait]
impl NavigatorOracle for AnthropicNavigator {
    async fn decide(
        &self,
        ivr_prompt: &str,
        inputs: &CallInputs,
        history: &[&TranscriptEntry],
    ) -> NavigatorDecision {
        let prompt_preview: String = ivr_prompt.chars().take(100).collect();
        info!(prompt = %prompt_preview, "analyzing IVR prompt");
        let user_message = build_user_message(ivr_prompt, inputs, history);

        match self.call(&user_message).await {
            Ok(raw) => {
                debug!(response = %raw, "oracle response");
                let decision = parse_decision(&raw);
                info!(?decision.kind, confidence = decision.confidence, "navigator decision");
                decision
            }
            Err(err) => {
                error!(%err, "navigator oracle error");
                NavigatorDecision {
                    kind: crate::types::DecisionType::Uncertain,
                    value: None,
                    confidence: 0.0,
                    reasoning: format!("Error analyzing prompt: {err}"),
                    extracted_data: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallInputs;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn inputs() -> CallInputs {
        CallInputs {
            member_id: "ABC123456".into(),
            cpt_code: "27447".into(),
            date_of_birth: "03151965".into(),
            provider_name: None,
        }
    }

    fn navigator_against(base_url: &str) -> AnthropicNavigator {
        AnthropicNavigator::with_api_url(
            "sk-test",
            format!("{base_url}/v1/messages"),
            std::time::Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn api_error_response_collapses_to_uncertain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let navigator = navigator_against(&server.uri());
        let decision = navigator.decide("hello", &inputs(), &[]).await;
        assert_eq!(decision.kind, crate::types::DecisionType::Uncertain);
        assert_eq!(decision.confidence, 0.0);
    }

    #[tokio::test]
    async fn successful_call_parses_response_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "{\"type\":\"dtmf\",\"value\":\"2\",\"confidence\":0.9,\"reasoning\":\"go\"}"}]
            })))
            .mount(&server)
            .await;

        let navigator = navigator_against(&server.uri());
        let decision = navigator.decide("press 1 or 2", &inputs(), &[]).await;
        assert_eq!(decision.kind, crate::types::DecisionType::Dtmf);
        assert_eq!(decision.value.as_deref(), Some("2"));
    }
}
