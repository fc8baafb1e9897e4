//! Wire schemas for the knowledge-base REST API.
//!
//! Answer, history, and evidence shapes live in [`kbdesk_core::models`];
//! this module adds the account, search, and document shapes plus the
//! checks applied to every decoded payload before it reaches a view.

use chrono::{DateTime, Utc};
use kbdesk_core::models::{Answer, AnswerVersion, Query};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    pub display_name: &'a str,
    pub password: &'a str,
    pub confirm_password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangePasswordRequest<'a> {
    pub old_password: &'a str,
    pub new_password: &'a str,
    pub confirm_password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileUpdate<'a> {
    pub display_name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskRequest<'a> {
    pub question: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub must_change_password: bool,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// The signed-in user (`GET /auth/me`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Me {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default)]
    pub must_change_password: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub doc_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub chunk_id: i64,
    pub snippet: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishedDocument {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(deserialize_with = "kbdesk_core::timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChunkPreview {
    pub chunk_id: i64,
    pub chunk_index: i64,
    pub snippet: String,
}

/// Document viewer payload (`GET /docs/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentView {
    pub doc_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    pub original_name: String,
    pub mime_type: String,
    pub status: String,
    #[serde(deserialize_with = "kbdesk_core::timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub chunks_preview: Vec<ChunkPreview>,
}

/// One chunk with its neighbours (`GET /docs/{id}/chunk/{chunk_id}`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentChunk {
    pub doc_id: i64,
    pub chunk_id: i64,
    pub chunk_index: i64,
    pub text: String,
    pub snippet: String,
    #[serde(default)]
    pub neighbors: Vec<ChunkPreview>,
}

/// Error body. `detail` is a string for handled errors and a list of
/// validation problems for rejected request bodies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub error_code: Option<String>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => items
                .iter()
                .find_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .map(str::to_string),
            other => Some(other.to_string()),
        }
    }
}

/// Payload-level checks serde cannot express.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

fn validate_version(version: &AnswerVersion) -> Result<(), String> {
    if version.version_no == 0 {
        return Err(format!(
            "version {} has version_no 0",
            version.version_id
        ));
    }
    let mut seen = std::collections::HashSet::new();
    for source in &version.sources {
        if !seen.insert(source.source_no) {
            return Err(format!(
                "version {} repeats source_no {}",
                version.version_id, source.source_no
            ));
        }
    }
    Ok(())
}

impl Validate for Answer {
    fn validate(&self) -> Result<(), String> {
        validate_version(&self.version)
    }
}

impl Validate for Query {
    fn validate(&self) -> Result<(), String> {
        for version in &self.versions {
            validate_version(version)?;
        }
        let ascending = self
            .versions
            .windows(2)
            .all(|w| w[0].version_no < w[1].version_no);
        if !ascending {
            return Err("versions are not in ascending version_no order".to_string());
        }
        Ok(())
    }
}
