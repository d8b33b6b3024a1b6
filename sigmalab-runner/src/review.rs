//! HTTP-backed AI reviewer.
//!
//! Posts the [`ReviewRequest`] as JSON and expects an [`AiReview`] object
//! back. Model front-ends often wrap JSON in a markdown code fence, so a
//! fenced body is accepted too.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::collaborators::{AiReview, AiReviewer, ReviewError, ReviewRequest};
use crate::config::AiReviewConfig;

#[derive(Debug, Clone)]
pub struct HttpAiReviewer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAiReviewer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ReviewError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sigmalab/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Reviewer for an enabled config with an endpoint, else `None`.
    pub fn from_config(config: &AiReviewConfig) -> Result<Option<Self>, ReviewError> {
        match (&config.endpoint, config.enabled) {
            (Some(endpoint), true) => Self::new(endpoint.clone(), config.timeout()).map(Some),
            _ => Ok(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AiReviewer for HttpAiReviewer {
    async fn review(&self, request: ReviewRequest) -> Result<AiReview, ReviewError> {
        debug!(endpoint = %self.endpoint, test_type = %request.test_type, "requesting AI review");
        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReviewError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_review(&body)
    }
}

/// Parse a review body, unwrapping a ```json fence if present.
pub fn parse_review(body: &str) -> Result<AiReview, ReviewError> {
    let trimmed = body.trim();
    let content = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let inner = rest.split("```").next().unwrap_or_default();
            inner.strip_prefix("json").unwrap_or(inner).trim()
        }
        None => trimmed,
    };
    serde_json::from_str(content).map_err(|e| ReviewError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_fenced_bodies_parse() {
        let plain = r#"{"verdict": "validated", "confidence_score": 88}"#;
        assert_eq!(parse_review(plain).unwrap().confidence_score, 88);

        let fenced = "```json\n{\"verdict\": \"concern\", \"findings\": [{\"type\": \"concern\", \"message\": \"n=3\"}]}\n```";
        let review = parse_review(fenced).unwrap();
        assert_eq!(review.verdict, "concern");
        assert_eq!(review.findings[0].kind, "concern");
    }

    #[test]
    fn prose_is_malformed() {
        assert!(matches!(
            parse_review("Looks fine to me."),
            Err(ReviewError::Malformed(_))
        ));
    }

    #[test]
    fn disabled_config_builds_nothing() {
        let config = AiReviewConfig {
            enabled: false,
            endpoint: Some("http://localhost:9/review".into()),
            ..AiReviewConfig::default()
        };
        assert!(HttpAiReviewer::from_config(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let reviewer = HttpAiReviewer::new("http://127.0.0.1:9/review", Duration::from_millis(200)).unwrap();
        let request = ReviewRequest {
            test_type: "c_chart".into(),
            configuration: Default::default(),
            dataset_profile: None,
            summary: Default::default(),
            details: Default::default(),
            programmatic_validation: sigmalab_core::ValidationReport::from_findings(Vec::new(), Vec::new()),
        };
        assert!(reviewer.review(request).await.is_err());
    }
}
