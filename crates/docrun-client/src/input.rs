//! Capability input payloads.

use std::path::Path;

use serde_json::{Map, Value};

use docrun_core::AgentType;

use crate::error::ClientError;

/// An in-memory document to upload with a run.
#[derive(Debug, Clone)]
pub struct DocumentFile {
    /// File name presented to the backend.
    pub name: String,

    /// Raw file contents.
    pub bytes: Vec<u8>,

    /// MIME type, defaulting to `application/octet-stream` when unset.
    pub mime: Option<String>,
}

impl DocumentFile {
    /// Create a document from a name and raw bytes.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            mime: None,
        }
    }

    /// Builder method to set the MIME type.
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Read a document from disk, taking the file name from the path.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        Ok(Self::new(name, bytes))
    }

    /// Size of the document in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Input payload for one run.
///
/// Document-bearing payloads are sent as multipart form data; the rest go
/// out as JSON built from the non-file fields.
#[derive(Debug, Clone, Default)]
pub struct AgentInput {
    pub document: Option<DocumentFile>,
    pub prompt: Option<String>,
    pub format: Option<String>,
    pub required_fields: Option<Vec<String>>,
    /// Extra capability-specific JSON fields, merged into the body.
    pub extra: Map<String, Value>,
}

impl AgentInput {
    /// Empty input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to attach a document.
    pub fn with_document(mut self, document: DocumentFile) -> Self {
        self.document = Some(document);
        self
    }

    /// Builder method to set a prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Builder method to set an output format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Builder method to set the required field names.
    pub fn with_required_fields(mut self, fields: Vec<String>) -> Self {
        self.required_fields = Some(fields);
        self
    }

    /// Builder method to add an extra JSON field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Check this input against a capability's preconditions.
    pub fn validate(&self, agent: &AgentType) -> Result<(), ClientError> {
        if agent.requires_document() && self.document.is_none() {
            return Err(ClientError::InvalidInput(format!(
                "capability '{}' requires a document",
                agent
            )));
        }
        Ok(())
    }

    /// The non-file fields as a JSON object body.
    pub fn to_json(&self) -> Value {
        let mut body = self.extra.clone();
        if let Some(prompt) = &self.prompt {
            body.insert("prompt".to_string(), Value::String(prompt.clone()));
        }
        if let Some(format) = &self.format {
            body.insert("format".to_string(), Value::String(format.clone()));
        }
        if let Some(fields) = &self.required_fields {
            body.insert(
                "requiredFields".to_string(),
                Value::Array(fields.iter().cloned().map(Value::String).collect()),
            );
        }
        Value::Object(body)
    }
}

/// Structured input for RFP creation.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RfpSpec {
    pub title: String,
    pub organization: String,
    pub deadline: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<RfpSection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// One section of an RFP.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RfpSection {
    pub title: String,
    pub content: String,
}

impl RfpSpec {
    /// Create a spec with the required fields.
    pub fn new(
        title: impl Into<String>,
        organization: impl Into<String>,
        deadline: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            organization: organization.into(),
            deadline: deadline.into(),
            sections: None,
            format: None,
        }
    }

    /// Builder method to add a section.
    pub fn with_section(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        self.sections.get_or_insert_with(Vec::new).push(RfpSection {
            title: title.into(),
            content: content.into(),
        });
        self
    }

    /// Convert into a capability input.
    pub fn into_input(self) -> Result<AgentInput, ClientError> {
        let value = serde_json::to_value(&self)?;
        let mut input = AgentInput::new();
        if let Value::Object(map) = value {
            input.extra = map;
        }
        Ok(input)
    }
}
