//! Core data models shared by the client and its views.
//!
//! The serde shapes match the backend's JSON so the same structs are used
//! on the wire and in memory. Identifiers are the backend's integer ids.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document fragment cited as support for an answer.
///
/// `source_no` is a label assigned by the backend and is only unique within
/// the [`AnswerVersion`] that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub source_no: u32,
    pub doc_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub chunk_id: i64,
    pub snippet: String,
}

impl EvidenceSource {
    /// Title for display, falling back to `Document {doc_id}`.
    pub fn display_title(&self) -> Cow<'_, str> {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => Cow::Borrowed(title),
            _ => Cow::Owned(format!("Document {}", self.doc_id)),
        }
    }

    /// Viewer path for the cited fragment.
    pub fn deep_link(&self) -> String {
        format!("/doc/{}?chunk={}", self.doc_id, self.chunk_id)
    }
}

/// One generation attempt for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerVersion {
    pub version_id: i64,
    pub version_no: u32,
    /// Generated answer with inline `[S<n>]` markers.
    #[serde(rename = "answer")]
    pub text: String,
    #[serde(default)]
    pub sources: Vec<EvidenceSource>,
    #[serde(default, deserialize_with = "crate::timestamp::deserialize_option")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Response of `POST /rag/ask` and `POST /rag/rerun`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub query_id: i64,
    #[serde(flatten)]
    pub version: AnswerVersion,
}

/// A question together with every answer version generated for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub query_id: i64,
    pub question: String,
    #[serde(default)]
    pub versions: Vec<AnswerVersion>,
}

impl Query {
    pub fn latest(&self) -> Option<&AnswerVersion> {
        self.versions.last()
    }
}

/// Row of the history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub query_id: i64,
    pub question: String,
    #[serde(deserialize_with = "crate::timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    pub latest_version_no: u32,
}
