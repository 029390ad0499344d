//! Canned [`RestClient`] and [`ImageRegistry`] implementations for tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use oci_client::Reference;
use reqwest::{Method, Request, Response, StatusCode, Url};

use crate::{
    github::{ClientError, RestClient},
    oci_registry::{ImageRegistry, Platform, RegistryError},
};

pub(crate) const CHECKOUT_V4_SHA: &str = "b4ffde65f46336ab88eb53be808477a3936bae11";
pub(crate) const CHECKOUT_MAIN_SHA: &str = "1d96c772d19495a3b5c517cd2bc0cb401ea0529f";
pub(crate) const GOLANG_DIGEST: &str =
    "sha256:d5302d40dc5fbbf38ec472d1848a9d2391a13f93293a6a5b0b87c99dc0eaa6ae";
pub(crate) const GOLANG_S390X_DIGEST: &str =
    "sha256:7f04b5ff3d2ba9c4f6a1f3b9d3c0b9e8a1a4b2c7d6e5f40312a9b8c7d6e5f403";

fn ref_body(sha: &str, kind: &str) -> String {
    format!(r#"{{"ref":"refs/x","object":{{"sha":"{sha}","type":"{kind}"}}}}"#)
}

/// A REST client that answers from a fixed path -> (status, body) table.
///
/// Unknown paths answer 404, like GitHub does for missing refs.
#[derive(Clone, Default)]
pub(crate) struct FakeRest {
    responses: HashMap<String, (StatusCode, String)>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeRest {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, path: &str, status: StatusCode, body: &str) -> Self {
        self.responses
            .insert(path.into(), (status, body.into()));
        self
    }

    pub(crate) fn with_tag(self, repo: &str, tag: &str, sha: &str) -> Self {
        self.with(
            &format!("repos/{repo}/git/refs/tags/{tag}"),
            StatusCode::OK,
            &ref_body(sha, "commit"),
        )
    }

    pub(crate) fn with_annotated_tag(self, repo: &str, tag: &str, tag_sha: &str, sha: &str) -> Self {
        self.with(
            &format!("repos/{repo}/git/refs/tags/{tag}"),
            StatusCode::OK,
            &ref_body(tag_sha, "tag"),
        )
        .with(
            &format!("repos/{repo}/git/tags/{tag_sha}"),
            StatusCode::OK,
            &ref_body(sha, "commit"),
        )
    }

    pub(crate) fn with_branch(self, repo: &str, branch: &str, sha: &str) -> Self {
        self.with(
            &format!("repos/{repo}/git/refs/heads/{branch}"),
            StatusCode::OK,
            &ref_body(sha, "commit"),
        )
    }

    /// The standard fixture: `actions/checkout` with a `v4.1.1` tag and a
    /// `main` branch.
    pub(crate) fn checkout() -> Self {
        Self::new()
            .with_tag("actions/checkout", "v4.1.1", CHECKOUT_V4_SHA)
            .with_branch("actions/checkout", "main", CHECKOUT_MAIN_SHA)
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RestClient for FakeRest {
    fn new_request(&self, method: Method, path: &str) -> Result<Request, ClientError> {
        let url = Url::parse(&format!("https://api.example.invalid/{path}")).unwrap();
        Ok(Request::new(method, url))
    }

    async fn execute(&self, request: Request) -> Result<Response, ClientError> {
        let path = request.url().path().trim_start_matches('/').to_string();
        self.calls.lock().unwrap().push(path.clone());

        let (status, body) = self
            .responses
            .get(&path)
            .cloned()
            .unwrap_or((StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#.into()));

        Ok(Response::from(
            http::Response::builder().status(status).body(body).unwrap(),
        ))
    }
}

/// A REST client that fails the test if it is ever used.
pub(crate) struct UnreachableRest;

#[async_trait::async_trait]
impl RestClient for UnreachableRest {
    fn new_request(&self, _: Method, path: &str) -> Result<Request, ClientError> {
        panic!("unexpected REST request for {path}");
    }

    async fn execute(&self, request: Request) -> Result<Response, ClientError> {
        panic!("unexpected REST request for {}", request.url());
    }
}

/// A registry that answers from a fixed `whole()` -> digest table.
///
/// Platform-specific digests are keyed as `whole()|os/arch`. Unknown
/// references fail the test.
#[derive(Clone, Default)]
pub(crate) struct FakeRegistry {
    digests: HashMap<String, String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, key: &str, digest: &str) -> Self {
        self.digests.insert(key.into(), digest.into());
        self
    }

    /// The standard fixture: `golang:1.22.2`, plain and for `linux/s390x`.
    pub(crate) fn golang() -> Self {
        Self::new()
            .with("docker.io/library/golang:1.22.2", GOLANG_DIGEST)
            .with(
                "docker.io/library/golang:1.22.2|linux/s390x",
                GOLANG_S390X_DIGEST,
            )
            .with(
                &format!("docker.io/library/golang@{GOLANG_DIGEST}"),
                GOLANG_DIGEST,
            )
            .with(
                &format!("docker.io/library/golang:1.22.2@{GOLANG_DIGEST}"),
                GOLANG_DIGEST,
            )
    }

    /// [`FakeRegistry::golang`], plus the `linux/s390x` answers for
    /// references that are already pinned to the index digest.
    pub(crate) fn golang_s390x() -> Self {
        Self::golang()
            .with(
                &format!("docker.io/library/golang:1.22.2@{GOLANG_DIGEST}|linux/s390x"),
                GOLANG_S390X_DIGEST,
            )
            .with(
                &format!("docker.io/library/golang@{GOLANG_DIGEST}|linux/s390x"),
                GOLANG_S390X_DIGEST,
            )
            .with(
                &format!("docker.io/library/golang@{GOLANG_S390X_DIGEST}|linux/s390x"),
                GOLANG_S390X_DIGEST,
            )
            .with(
                &format!("docker.io/library/golang:1.22.2@{GOLANG_S390X_DIGEST}|linux/s390x"),
                GOLANG_S390X_DIGEST,
            )
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ImageRegistry for FakeRegistry {
    async fn manifest_digest(
        &self,
        reference: &Reference,
        platform: Option<&Platform>,
    ) -> Result<String, RegistryError> {
        let key = match platform {
            Some(platform) => format!("{}|{platform}", reference.whole()),
            None => reference.whole(),
        };
        self.calls.lock().unwrap().push(key.clone());

        match self.digests.get(&key) {
            Some(digest) => Ok(digest.clone()),
            None => panic!("unexpected registry lookup for {key}"),
        }
    }
}
