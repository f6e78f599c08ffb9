use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::providers::error::ProviderError;
use crate::providers::http::RateLimitedHttpClient;

/// A joinable AI interview session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterviewSession {
    pub session_id: String,
    pub session_url: String,
}

/// Interview operations the sagas depend on.
#[async_trait]
pub trait InterviewProvider: Send + Sync {
    /// Open an interview session against the given replica, returning the
    /// join URL and session identifier.
    async fn create_session(
        &self,
        replica_id: &str,
        name: &str,
        context: &str,
    ) -> Result<InterviewSession, ProviderError>;
}

/// Tavus-shaped REST client for AI-conducted interviews.
pub struct TavusClient {
    http: RateLimitedHttpClient,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ConversationResponse {
    conversation_url: Option<String>,
    conversation_id: Option<String>,
}

impl TavusClient {
    pub fn new(
        http: RateLimitedHttpClient,
        base_url: String,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.ok_or(ProviderError::CredentialMissing("TAVUS_API_KEY"))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl InterviewProvider for TavusClient {
    #[instrument(skip(self, context), fields(provider = "tavus"))]
    async fn create_session(
        &self,
        replica_id: &str,
        name: &str,
        context: &str,
    ) -> Result<InterviewSession, ProviderError> {
        let endpoint = format!("{}/conversations", self.base_url);
        let body = serde_json::json!({
            "replica_id": replica_id,
            "conversation_name": name,
            "conversational_context": context,
        });

        let response = self
            .http
            .ready()
            .await
            .post(&endpoint)
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                endpoint,
                status: response.status().as_u16(),
            });
        }

        let parsed: ConversationResponse = response.json().await?;
        let session_url = parsed.conversation_url.ok_or(ProviderError::MalformedResponse {
            field: "conversation_url",
        })?;
        let session_id = parsed.conversation_id.ok_or(ProviderError::MalformedResponse {
            field: "conversation_id",
        })?;

        debug!(session_id = %session_id, "Created interview session");
        Ok(InterviewSession {
            session_id,
            session_url,
        })
    }
}
