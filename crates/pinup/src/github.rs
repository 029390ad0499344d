//! GitHub REST API client and related types.
//!
//! The resolvers only ever see the [`RestClient`] trait, so tests can
//! substitute canned responses for the real [`Client`].

use std::{fmt::Display, str::FromStr};

use reqwest::{
    Method, Request, Response,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, InvalidHeaderValue},
    retry,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use thiserror::Error;

use crate::utils::PINUP_AGENT;

/// Represents different types of GitHub hosts.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum GitHubHost {
    Enterprise(String),
    Standard(String),
}

impl GitHubHost {
    pub(crate) fn new(hostname: &str) -> Result<Self, String> {
        let normalized = hostname.to_lowercase();

        // NOTE: this only catches the most likely kind of confusion
        // (a URL instead of a bare domain name).
        if normalized.starts_with("https://") || normalized.starts_with("http://") {
            return Err("must be a domain name, not a URL".into());
        }

        if normalized.is_empty() {
            return Err("must not be empty".into());
        }

        if normalized == "github.com" || normalized.ends_with(".ghe.com") {
            Ok(Self::Standard(hostname.into()))
        } else {
            Ok(Self::Enterprise(hostname.into()))
        }
    }

    fn to_api_host(&self) -> String {
        match self {
            Self::Enterprise(host) => host.clone(),
            Self::Standard(host) => format!("api.{host}"),
        }
    }

    fn to_api_url(&self) -> String {
        match self {
            Self::Enterprise(_) => format!("https://{host}/api/v3", host = self.to_api_host()),
            Self::Standard(_) => format!("https://{host}", host = self.to_api_host()),
        }
    }
}

impl Default for GitHubHost {
    fn default() -> Self {
        Self::Standard("github.com".into())
    }
}

impl Display for GitHubHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enterprise(host) | Self::Standard(host) => write!(f, "{host}"),
        }
    }
}

impl FromStr for GitHubHost {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A sanitized GitHub access token.
#[derive(Clone)]
pub(crate) struct GitHubToken(String);

impl GitHubToken {
    pub(crate) fn new(token: &str) -> Result<Self, String> {
        let token = token.trim();
        if token.is_empty() {
            return Err("GitHub token cannot be empty".into());
        }
        Ok(Self(token.to_owned()))
    }

    fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl FromStr for GitHubToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Errors that can occur while using the GitHub API client.
#[derive(Debug, Error)]
pub(crate) enum ClientError {
    /// An error originating from the underlying HTTP client.
    #[error("request error while accessing GitHub API")]
    Request(#[from] reqwest::Error),
    /// An error originating from the HTTP client (and its middleware).
    #[error("request error while accessing GitHub API")]
    Middleware(#[from] reqwest_middleware::Error),
    /// We couldn't turn the user's token into a valid header value.
    #[error("invalid token header")]
    InvalidTokenHeader(#[from] InvalidHeaderValue),
}

/// The minimal REST surface the resolvers need.
///
/// Implementations must return non-success statuses (notably 404)
/// as ordinary responses; only transport failures are errors.
#[async_trait::async_trait]
pub(crate) trait RestClient: Send + Sync {
    /// Builds a request for `path`, relative to the API root.
    fn new_request(&self, method: Method, path: &str) -> Result<Request, ClientError>;

    /// Sends a previously built request.
    async fn execute(&self, request: Request) -> Result<Response, ClientError>;
}

struct RequestLoggingMiddleware;

#[async_trait::async_trait]
impl reqwest_middleware::Middleware for RequestLoggingMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut http::Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        tracing::debug!("Request URL: {}", req.url());

        let res = next.run(req, extensions).await?;

        tracing::debug!("Response status: {}", res.status());

        Ok(res)
    }
}

#[derive(Clone)]
pub(crate) struct Client {
    api_base: String,
    api_client: ClientWithMiddleware,
}

impl Client {
    pub(crate) fn new(host: &GitHubHost, token: Option<&GitHubToken>) -> Result<Self, ClientError> {
        let mut api_client_headers = HeaderMap::new();
        if let Some(token) = token {
            api_client_headers.insert(AUTHORIZATION, token.to_header_value()?);
        }
        api_client_headers.insert("X-GitHub-Api-Version", "2022-11-28".parse()?);
        api_client_headers.insert(ACCEPT, "application/vnd.github+json".parse()?);

        let client = reqwest::Client::builder()
            .user_agent(PINUP_AGENT)
            .default_headers(api_client_headers)
            .retry(
                retry::for_host(host.to_api_host())
                    .max_retries_per_request(3)
                    // NOTE: No budget, since we cap at 3 retries anyway.
                    .no_budget()
                    .classify_fn(|req_rep| match req_rep.status() {
                        // NOTE: 404 is an answer ("try the next strategy"),
                        // so only rate limiting and server errors retry.
                        // In the context of the classifier, "success"
                        // means "don't retry".
                        Some(status) => {
                            if status.is_server_error() || status.as_u16() == 429 {
                                req_rep.retryable()
                            } else {
                                req_rep.success()
                            }
                        }
                        None => req_rep.success(),
                    }),
            )
            .build()?;

        Ok(Self {
            api_base: host.to_api_url(),
            api_client: ClientBuilder::new(client)
                .with(RequestLoggingMiddleware)
                .build(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{base}/{path}",
            base = self.api_base,
            path = path.trim_start_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl RestClient for Client {
    fn new_request(&self, method: Method, path: &str) -> Result<Request, ClientError> {
        Ok(self.api_client.request(method, self.url_for(path)).build()?)
    }

    async fn execute(&self, request: Request) -> Result<Response, ClientError> {
        Ok(self.api_client.execute(request).await?)
    }
}
