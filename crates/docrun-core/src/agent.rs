//! Capability identifiers for document-processing agents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies which backend capability a run invokes.
///
/// The set of capabilities is defined by the backend; identifiers not known
/// to this client pass through as [`AgentType::Other`] so new capabilities
/// work without a client upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentType {
    /// Extract structured fields from a document.
    FieldExtractor,
    /// Extract caller-specified fields from a document.
    CustomFieldExtractor,
    /// Summarize a document.
    DocumentSummarizer,
    /// Generate an RFP document from structured input.
    RfpCreator,
    /// Summarize an RFP document.
    RfpSummarizer,
    /// Any other capability, addressed by its raw identifier.
    Other(String),
}

impl AgentType {
    /// The wire identifier for this capability.
    pub fn as_str(&self) -> &str {
        match self {
            Self::FieldExtractor => "field-extractor",
            Self::CustomFieldExtractor => "custom-field-extractor",
            Self::DocumentSummarizer => "document-summarizer",
            Self::RfpCreator => "rfp-creator",
            Self::RfpSummarizer => "rfp-summarizer",
            Self::Other(name) => name,
        }
    }

    /// Whether this capability consumes an uploaded document.
    ///
    /// Document-bearing capabilities reject inputs without a file before
    /// any request is issued.
    pub fn requires_document(&self) -> bool {
        match self {
            Self::FieldExtractor
            | Self::CustomFieldExtractor
            | Self::DocumentSummarizer
            | Self::RfpSummarizer => true,
            Self::RfpCreator | Self::Other(_) => false,
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for AgentType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "field-extractor" => Self::FieldExtractor,
            "custom-field-extractor" => Self::CustomFieldExtractor,
            "document-summarizer" => Self::DocumentSummarizer,
            "rfp-creator" => Self::RfpCreator,
            "rfp-summarizer" => Self::RfpSummarizer,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for AgentType {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<AgentType> for String {
    fn from(agent: AgentType) -> Self {
        agent.as_str().to_owned()
    }
}
