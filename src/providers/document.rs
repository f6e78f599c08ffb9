use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::providers::error::ProviderError;
use crate::providers::http::RateLimitedHttpClient;

/// Status of a document verification inquiry as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InquiryStatus {
    Created,
    Pending,
    NeedsReview,
    Completed,
    Failed,
    /// Any status the provider introduces that we do not model explicitly.
    Other(String),
}

impl InquiryStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "created" => InquiryStatus::Created,
            "pending" => InquiryStatus::Pending,
            "needs_review" => InquiryStatus::NeedsReview,
            "completed" => InquiryStatus::Completed,
            "failed" => InquiryStatus::Failed,
            other => InquiryStatus::Other(other.to_string()),
        }
    }

    /// The inquiry is still in flight; the caller should poll again later.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            InquiryStatus::Created | InquiryStatus::Pending | InquiryStatus::NeedsReview
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            InquiryStatus::Created => "created",
            InquiryStatus::Pending => "pending",
            InquiryStatus::NeedsReview => "needs_review",
            InquiryStatus::Completed => "completed",
            InquiryStatus::Failed => "failed",
            InquiryStatus::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for InquiryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document verification operations the KYC saga depends on.
#[async_trait]
pub trait DocumentVerification: Send + Sync {
    /// Open a new inquiry for the given subject reference, returning its id.
    async fn create_inquiry(&self, subject_ref: &str) -> Result<String, ProviderError>;

    /// Generate a one-time verification link for an existing inquiry.
    async fn generate_link(&self, inquiry_id: &str) -> Result<String, ProviderError>;

    /// Poll the current status of an inquiry. Read-only, no side effects.
    async fn get_status(&self, inquiry_id: &str) -> Result<InquiryStatus, ProviderError>;
}

/// Persona-shaped REST client for document/selfie verification.
#[derive(Debug)]
pub struct PersonaClient {
    http: RateLimitedHttpClient,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct InquiryEnvelope {
    data: Option<InquiryData>,
    meta: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct InquiryData {
    id: Option<String>,
    attributes: Option<InquiryAttributes>,
}

#[derive(Deserialize)]
struct InquiryAttributes {
    status: Option<String>,
}

impl PersonaClient {
    pub fn new(
        http: RateLimitedHttpClient,
        base_url: String,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.ok_or(ProviderError::CredentialMissing("PERSONA_API_KEY"))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn check_status(
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ProviderError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            })
        }
    }
}

#[async_trait]
impl DocumentVerification for PersonaClient {
    #[instrument(skip(self), fields(provider = "persona"))]
    async fn create_inquiry(&self, subject_ref: &str) -> Result<String, ProviderError> {
        let endpoint = format!("{}/inquiries", self.base_url);
        let body = serde_json::json!({
            "data": { "attributes": { "reference-id": subject_ref } }
        });

        let response = self
            .http
            .ready()
            .await
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let envelope: InquiryEnvelope = Self::check_status(&endpoint, response)
            .await?
            .json()
            .await?;

        let inquiry_id = envelope
            .data
            .and_then(|d| d.id)
            .ok_or(ProviderError::MalformedResponse { field: "data.id" })?;
        debug!(inquiry_id = %inquiry_id, "Created document verification inquiry");
        Ok(inquiry_id)
    }

    #[instrument(skip(self), fields(provider = "persona"))]
    async fn generate_link(&self, inquiry_id: &str) -> Result<String, ProviderError> {
        let endpoint = format!("{}/inquiries/{}/generate-one-time-link", self.base_url, inquiry_id);

        let response = self
            .http
            .ready()
            .await
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let envelope: InquiryEnvelope = Self::check_status(&endpoint, response)
            .await?
            .json()
            .await?;

        // Prefer the short link when the provider returns both forms.
        let link = envelope
            .meta
            .as_ref()
            .and_then(|meta| {
                meta.get("one-time-link-short")
                    .or_else(|| meta.get("one-time-link"))
            })
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(ProviderError::MalformedResponse {
                field: "meta.one-time-link",
            })?;
        Ok(link)
    }

    #[instrument(skip(self), fields(provider = "persona"))]
    async fn get_status(&self, inquiry_id: &str) -> Result<InquiryStatus, ProviderError> {
        let endpoint = format!("{}/inquiries/{}", self.base_url, inquiry_id);

        let response = self
            .http
            .ready()
            .await
            .get(&endpoint)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let envelope: InquiryEnvelope = Self::check_status(&endpoint, response)
            .await?
            .json()
            .await?;

        let raw = envelope
            .data
            .and_then(|d| d.attributes)
            .and_then(|a| a.status)
            .ok_or(ProviderError::MalformedResponse {
                field: "data.attributes.status",
            })?;
        Ok(InquiryStatus::parse(&raw))
    }
}
