// External provider integrations: document verification and AI interviews.

pub mod document;
pub mod error;
pub mod http;
pub mod interview;

pub use document::{DocumentVerification, InquiryStatus, PersonaClient};
pub use error::ProviderError;
pub use http::RateLimitedHttpClient;
pub use interview::{InterviewProvider, InterviewSession, TavusClient};
