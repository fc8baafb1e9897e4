//! API gateway for the knowledge-base backend.
//!
//! Every outbound request goes through [`ApiClient::send`], which attaches
//! the bearer token from the [`SessionHandle`], turns error responses into
//! [`ApiError`], and applies the session [`POLICY`](crate::session::POLICY)
//! for authorization failures. Successful bodies are decoded into explicit
//! schemas and validated before they are returned.
//!
//! # Endpoints
//!
//! | Method | Path | Client method |
//! |--------|------|---------------|
//! | `POST` | `/auth/login` | [`login`](ApiClient::login) |
//! | `POST` | `/auth/register` | [`register`](ApiClient::register) |
//! | `GET`  | `/auth/me` | [`me`](ApiClient::me) |
//! | `POST` | `/auth/logout` | [`logout`](ApiClient::logout) |
//! | `POST` | `/auth/change-password` | [`change_password`](ApiClient::change_password) |
//! | `PATCH`| `/users/me` | [`update_profile`](ApiClient::update_profile) |
//! | `POST` | `/rag/ask` | [`Backend::ask`] |
//! | `POST` | `/rag/rerun?query_id=` | [`Backend::rerun`] |
//! | `GET`  | `/history?limit=` | [`Backend::history`] |
//! | `GET`  | `/history/{query_id}` | [`Backend::history_detail`] |
//! | `GET`  | `/export/{version_id}.pdf` | [`Backend::export_pdf`] |
//! | `GET`  | `/search?q=&limit=` | [`search`](ApiClient::search) |
//! | `GET`  | `/docs` | [`documents`](ApiClient::documents) |
//! | `GET`  | `/docs/{id}` | [`document`](ApiClient::document) |
//! | `GET`  | `/docs/{id}/chunk/{chunk_id}` | [`document_chunk`](ApiClient::document_chunk) |

use std::time::Duration;

use async_trait::async_trait;
use kbdesk_core::models::{Answer, HistoryItem, Query};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::config::ApiConfig;
use crate::schema::{
    AskRequest, ChangePasswordRequest, DocumentChunk, DocumentView, ErrorBody, LoginRequest, Me,
    ProfileUpdate, PublishedDocument, RegisterRequest, SearchHit, TokenResponse, Validate,
};
use crate::session::{policy_for, SessionHandle, Transition};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("could not reach the server: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{detail} (HTTP {status})")]
    Status { status: u16, detail: String },
    #[error("not signed in or the session has expired: {detail}")]
    Unauthorized { detail: String },
    #[error("account is blocked")]
    AccountBlocked,
    #[error("password must be changed before continuing")]
    MustChangePassword,
    #[error("unexpected response from {endpoint}: {reason}")]
    UnexpectedShape { endpoint: String, reason: String },
}

impl ApiError {
    /// Worth offering a retry: the server was unreachable or failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    fn shape(endpoint: &str, reason: impl ToString) -> Self {
        ApiError::UnexpectedShape {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Answer and history operations the views depend on.
///
/// [`ApiClient`] is the production implementation; tests drive views with
/// scripted backends.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn ask(&self, question: &str) -> Result<Answer, ApiError>;
    async fn rerun(&self, query_id: i64) -> Result<Answer, ApiError>;
    async fn history(&self, limit: u32) -> Result<Vec<HistoryItem>, ApiError>;
    async fn history_detail(&self, query_id: i64) -> Result<Query, ApiError>;
    async fn export_pdf(&self, version_id: i64) -> Result<Vec<u8>, ApiError>;
}

/// Whether a request carries the session token and is subject to the
/// session policy. Sign-in requests are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Session,
    Anonymous,
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    ask_timeout: Duration,
    session: SessionHandle,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, session: SessionHandle) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("kbd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            ask_timeout: Duration::from_secs(config.ask_timeout_secs),
            session,
        })
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// The single outbound gateway. `query` is URL-encoded by reqwest.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        auth: Auth,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.clone(), &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if auth == Auth::Session {
            if let Some(token) = self.session.token() {
                request = request.bearer_auth(token);
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!(%method, path, "request");
        let response = request.send().await.map_err(|e| {
            tracing::warn!(%method, path, error = %e, "request failed");
            ApiError::Transport(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let raw = response.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&raw).unwrap_or_default();
        let detail = body.message().unwrap_or_else(|| fallback_detail(status, &raw));
        tracing::debug!(%method, path, status = status.as_u16(), %detail, "error response");

        let transition = policy_for(status.as_u16(), body.error_code.as_deref());
        if let Some(transition) = transition {
            if auth == Auth::Session || transition == Transition::Blocked {
                self.session.apply(transition);
            }
        }

        Err(match (status, transition) {
            (StatusCode::UNAUTHORIZED, _) if auth == Auth::Session => {
                ApiError::Unauthorized { detail }
            }
            (_, Some(Transition::Blocked)) => ApiError::AccountBlocked,
            (_, Some(Transition::RequirePasswordChange)) => ApiError::MustChangePassword,
            _ => ApiError::Status {
                status: status.as_u16(),
                detail,
            },
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self
            .send::<()>(Method::GET, path, query, None, Auth::Session, None)
            .await?;
        decode(path, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
        auth: Auth,
        timeout: Option<Duration>,
    ) -> Result<T, ApiError> {
        let response = self
            .send(Method::POST, path, query, body, auth, timeout)
            .await?;
        decode(path, response).await
    }

    /// Sign in and store the token in the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let token: TokenResponse = self
            .post_json(
                "/auth/login",
                &[],
                Some(&LoginRequest { email, password }),
                Auth::Anonymous,
                None,
            )
            .await?;
        self.session.login(&token);
        Ok(token)
    }

    pub async fn register(
        &self,
        email: &str,
        display_name: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<Me, ApiError> {
        let request = RegisterRequest {
            email,
            display_name,
            password,
            confirm_password,
        };
        self.post_json("/auth/register", &[], Some(&request), Auth::Anonymous, None)
            .await
    }

    /// Fetch the current user and refresh the session flags from it.
    pub async fn me(&self) -> Result<Me, ApiError> {
        let me: Me = self.get_json("/auth/me", &[]).await?;
        self.session.set_me(me.clone());
        Ok(me)
    }

    /// Tell the server, then forget the token regardless of the outcome.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self
            .send::<()>(Method::POST, "/auth/logout", &[], None, Auth::Session, None)
            .await
            .map(|_| ());
        self.session.logout();
        result
    }

    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<Me, ApiError> {
        let request = ChangePasswordRequest {
            old_password,
            new_password,
            confirm_password,
        };
        let me: Me = self
            .post_json("/auth/change-password", &[], Some(&request), Auth::Session, None)
            .await?;
        self.session.set_me(me.clone());
        Ok(me)
    }

    pub async fn update_profile(&self, display_name: &str) -> Result<Me, ApiError> {
        let path = "/users/me";
        let response = self
            .send(
                Method::PATCH,
                path,
                &[],
                Some(&ProfileUpdate { display_name }),
                Auth::Session,
                None,
            )
            .await?;
        let me: Me = decode(path, response).await?;
        self.session.set_me(me.clone());
        Ok(me)
    }

    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>, ApiError> {
        let params = [("q", query.to_string()), ("limit", limit.to_string())];
        self.get_json("/search", &params).await
    }

    pub async fn documents(&self) -> Result<Vec<PublishedDocument>, ApiError> {
        self.get_json("/docs", &[]).await
    }

    pub async fn document(&self, doc_id: i64) -> Result<DocumentView, ApiError> {
        self.get_json(&format!("/docs/{doc_id}"), &[]).await
    }

    pub async fn document_chunk(
        &self,
        doc_id: i64,
        chunk_id: i64,
    ) -> Result<DocumentChunk, ApiError> {
        self.get_json(&format!("/docs/{doc_id}/chunk/{chunk_id}"), &[])
            .await
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn ask(&self, question: &str) -> Result<Answer, ApiError> {
        let path = "/rag/ask";
        let answer: Answer = self
            .post_json(
                path,
                &[],
                Some(&AskRequest { question }),
                Auth::Session,
                Some(self.ask_timeout),
            )
            .await?;
        validated(path, answer)
    }

    async fn rerun(&self, query_id: i64) -> Result<Answer, ApiError> {
        let path = "/rag/rerun";
        let params = [("query_id", query_id.to_string())];
        let answer: Answer = self
            .post_json::<(), _>(path, &params, None, Auth::Session, Some(self.ask_timeout))
            .await?;
        validated(path, answer)
    }

    async fn history(&self, limit: u32) -> Result<Vec<HistoryItem>, ApiError> {
        self.get_json("/history", &[("limit", limit.to_string())])
            .await
    }

    async fn history_detail(&self, query_id: i64) -> Result<Query, ApiError> {
        let path = format!("/history/{query_id}");
        let query: Query = self.get_json(&path, &[]).await?;
        validated(&path, query)
    }

    async fn export_pdf(&self, version_id: i64) -> Result<Vec<u8>, ApiError> {
        let path = format!("/export/{version_id}.pdf");
        let response = self
            .send::<()>(Method::GET, &path, &[], None, Auth::Session, None)
            .await?;
        let bytes = response.bytes().await?;
        if !bytes.starts_with(b"%PDF") {
            return Err(ApiError::shape(&path, "body is not a PDF document"));
        }
        Ok(bytes.to_vec())
    }
}

async fn decode<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::shape(endpoint, e))
}

fn validated<T: Validate>(endpoint: &str, value: T) -> Result<T, ApiError> {
    value
        .validate()
        .map_err(|reason| ApiError::shape(endpoint, reason))?;
    Ok(value)
}

fn fallback_detail(status: StatusCode, raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > 200 {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(ApiError::Status {
            status: 502,
            detail: "bad gateway".into()
        }
        .is_retryable());
        assert!(!ApiError::Status {
            status: 404,
            detail: "Query not found".into()
        }
        .is_retryable());
        assert!(!ApiError::AccountBlocked.is_retryable());
    }

    #[test]
    fn test_fallback_detail() {
        assert_eq!(fallback_detail(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
        assert_eq!(fallback_detail(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
    }
}
