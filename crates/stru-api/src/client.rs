//! HTTP clients for the completion and identity services

use crate::{
    error::{Error, Result},
    stream::{StreamEventStream, decode_byte_stream},
    types::{CompletionRequest, SessionContext, UserInfo},
};
use reqwest::{RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default service origin
pub const DEFAULT_BASE_URL: &str = "https://api.stru.ai";

/// Name of the session cookie the identity service issues
pub const SESSION_COOKIE: &str = "session";

/// Build the shared HTTP client
pub fn build_http_client(connect_timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    Ok(builder.build()?)
}

fn normalize_base_url(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}

/// Attach the session token, if any, as bearer auth and session cookie
fn with_session(builder: RequestBuilder, session: &SessionContext) -> RequestBuilder {
    match session.token.as_deref() {
        Some(token) => builder
            .bearer_auth(token)
            .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token)),
        None => builder,
    }
}

/// The identity service answers 401 or 403 when the session is missing or stale
fn is_unauthenticated(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(Error::status(status, body))
}

/// Client for `POST /v1/completion`
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    base_url: String,
}

impl CompletionClient {
    /// Create a client for the given origin
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing HTTP client
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base_url(base_url),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a message and stream the decoded answer.
    ///
    /// Fails before returning a stream on network errors and non-2xx statuses.
    /// Cancelling `cancel` while waiting for the response yields
    /// [`Error::Cancelled`].
    pub async fn stream(
        &self,
        request: &CompletionRequest,
        session: &SessionContext,
        cancel: CancellationToken,
    ) -> Result<StreamEventStream> {
        let url = format!("{}/v1/completion", self.base_url);
        tracing::debug!(url = %url, session_id = %request.session_id, "starting completion");

        let builder = self
            .client
            .post(&url)
            .header(header::ACCEPT, "text/event-stream")
            .json(request);

        let open = async {
            let response = with_session(builder, session).send().await?;
            ensure_success(response).await
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("completion cancelled before the stream opened");
                return Err(Error::Cancelled);
            }
            response = open => response?,
        };

        Ok(decode_byte_stream(response.bytes_stream(), cancel))
    }
}

#[derive(Debug, Deserialize)]
struct HaikuResponse {
    haiku: String,
}

/// Client for the identity endpoints (`/user_info`, `/login`, `/logout`)
#[derive(Debug, Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    base_url: String,
}

impl IdentityClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: normalize_base_url(base_url),
        }
    }

    /// Browser entry point of the redirect-based login flow
    pub fn login_url(&self) -> String {
        format!("{}/login", self.base_url)
    }

    /// Fetch the logged-in user's profile; `None` when not authenticated
    pub async fn user_info(&self, session: &SessionContext) -> Result<Option<UserInfo>> {
        let url = format!("{}/user_info", self.base_url);
        let response = with_session(self.client.get(&url), session).send().await?;

        if is_unauthenticated(response.status()) {
            tracing::debug!(status = %response.status(), "user_info: not authenticated");
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        let info: UserInfo = response.json().await?;
        Ok(Some(info))
    }

    /// Clear the server-side session
    pub async fn logout(&self, session: &SessionContext) -> Result<()> {
        let url = format!("{}/logout", self.base_url);
        let response = with_session(self.client.get(&url), session).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    /// Ask the service for a haiku (`GET /gen_haiku`)
    pub async fn generate_haiku(&self, session: &SessionContext) -> Result<String> {
        let url = format!("{}/gen_haiku", self.base_url);
        let response = with_session(self.client.get(&url), session).send().await?;

        if is_unauthenticated(response.status()) {
            return Err(Error::Unauthenticated);
        }

        let response = ensure_success(response).await?;
        let body: HaikuResponse = response.json().await?;
        Ok(body.haiku)
    }
}
