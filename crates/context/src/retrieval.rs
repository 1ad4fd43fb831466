//! RAG service call-through.
//!
//! The adapter normalizes whatever the service returns into scored
//! chunks. The service's own `prompt_context` string is deliberately
//! ignored for formatting: the packer always rebuilds the `retrieved`
//! section from (text, score) pairs so builder output does not depend on
//! the RAG implementation's internal formatting.

use async_trait::async_trait;
use gridmind_core::SheetId;
use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// Query handed to the RAG service.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalQuery {
    pub workbook_id: String,
    pub focus_question: String,
    pub sheets: Vec<SheetId>,
}

/// One scored chunk from the RAG service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    #[serde(alias = "chunkId")]
    pub chunk_id: String,
    pub text: String,
    pub score: f64,
    #[serde(default, alias = "sourceRef", skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
}

/// Raw service response. `prompt_context` is never required and may be
/// empty even when chunks were retrieved.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RagResponse {
    #[serde(default, alias = "promptContext")]
    pub prompt_context: Option<String>,
    #[serde(default)]
    pub retrieved: Option<Vec<RetrievedChunk>>,
}

/// The external RAG service boundary.
#[async_trait]
pub trait RagService: Send + Sync {
    async fn build_workbook_context(
        &self,
        query: &RetrievalQuery,
    ) -> Result<RagResponse, ContextError>;
}

/// Thin call-through that normalizes service results.
pub struct RetrievalAdapter {
    service: Option<std::sync::Arc<dyn RagService>>,
}

impl RetrievalAdapter {
    pub fn new(service: Option<std::sync::Arc<dyn RagService>>) -> Self {
        Self { service }
    }

    pub fn disabled() -> Self {
        Self { service: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.service.is_some()
    }

    /// Run retrieval. No service means no chunks; a service error is
    /// downgraded to no chunks. Retrieval never fails a build.
    pub async fn retrieve(&self, query: &RetrievalQuery) -> Vec<RetrievedChunk> {
        let service = match &self.service {
            Some(service) => service,
            None => return Vec::new(),
        };
        match service.build_workbook_context(query).await {
            Ok(response) => response.retrieved.unwrap_or_default(),
            Err(e) => {
                log::warn!("retrieval failed, continuing without: {e}");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct EchoService(RagResponse);

    #[async_trait]
    impl RagService for EchoService {
        async fn build_workbook_context(
            &self,
            _query: &RetrievalQuery,
        ) -> Result<RagResponse, ContextError> {
            Ok(self.0.clone())
        }
    }

    struct FailingService;

    #[async_trait]
    impl RagService for FailingService {
        async fn build_workbook_context(
            &self,
            _query: &RetrievalQuery,
        ) -> Result<RagResponse, ContextError> {
            Err(ContextError::SessionOpen("rag down".to_string()))
        }
    }

    fn query() -> RetrievalQuery {
        RetrievalQuery {
            workbook_id: "wb".to_string(),
            focus_question: "what changed?".to_string(),
            sheets: vec![SheetId::from_raw(1)],
        }
    }

    #[test]
    fn test_no_service_yields_empty() {
        let adapter = RetrievalAdapter::disabled();
        assert!(!adapter.is_enabled());
        let chunks = smol::block_on(adapter.retrieve(&query()));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chunks_pass_through_without_prompt_context() {
        let chunk = RetrievedChunk {
            chunk_id: "c1".to_string(),
            text: "Revenue grew 12%".to_string(),
            score: 0.91,
            source_ref: None,
        };
        let adapter = RetrievalAdapter::new(Some(Arc::new(EchoService(RagResponse {
            prompt_context: Some(String::new()),
            retrieved: Some(vec![chunk.clone()]),
        }))));

        let chunks = smol::block_on(adapter.retrieve(&query()));
        assert_eq!(chunks, vec![chunk]);
    }

    #[test]
    fn test_service_error_is_downgraded() {
        let adapter = RetrievalAdapter::new(Some(Arc::new(FailingService)));
        let chunks = smol::block_on(adapter.retrieve(&query()));
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_camel_case_response_shape() {
        let response: RagResponse = serde_json::from_str(
            r#"{"promptContext": "", "retrieved": [{"chunkId": "c1", "text": "t", "score": 0.5, "sourceRef": "Sheet1!A1"}]}"#,
        )
        .unwrap();
        let chunks = response.retrieved.unwrap();
        assert_eq!(chunks[0].chunk_id, "c1");
        assert_eq!(chunks[0].source_ref.as_deref(), Some("Sheet1!A1"));
    }
}
