//! Docker Registry HTTP API v2 client

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, LINK, WWW_AUTHENTICATE};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::registry::client::{Authenticator, ImageInfo, RegistryClient, RegistryConnector};
use crate::registry::endpoint::RegistryEndpoint;
use crate::registry::error::RegistryError;

const USER_AGENT: &str = concat!("imagewatch/", env!("CARGO_PKG_VERSION"));

/// Manifest media types accepted when resolving a tag, multi-arch first
const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.oci.image.manifest.v1+json";

const CONTENT_DIGEST_HEADER: &str = "docker-content-digest";

/// Docker Hub is addressed as `docker.io` but serves its API elsewhere
const DOCKER_HUB_DOMAIN: &str = "docker.io";
const DOCKER_HUB_API_HOST: &str = "registry-1.docker.io";

/// Response of `GET /v2/<name>/tags/list`
#[derive(Debug, Deserialize)]
struct TagList {
    tags: Option<Vec<String>>,
}

/// Response of a token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

/// Parse a bearer challenge such as
/// `Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/redis:pull"`.
///
/// Quoted values may contain commas.
pub fn parse_bearer_challenge(header: &str) -> Option<BearerChallenge> {
    let (scheme, params) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let mut values: HashMap<String, String> = HashMap::new();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let (key, after_key) = rest.split_once('=')?;
        let key = key.trim().to_ascii_lowercase();
        let after_key = after_key.trim_start();

        let (value, remainder) = match after_key.strip_prefix('"') {
            Some(quoted) => {
                let end = quoted.find('"')?;
                (&quoted[..end], &quoted[end + 1..])
            }
            None => match after_key.find(',') {
                Some(end) => (&after_key[..end], &after_key[end..]),
                None => (after_key, ""),
            },
        };

        values.insert(key, value.to_string());
        rest = remainder.trim_start().trim_start_matches(',').trim_start();
    }

    Some(BearerChallenge {
        realm: values.remove("realm")?,
        service: values.remove("service"),
        scope: values.remove("scope"),
    })
}

/// Extract the `rel="next"` target of a `Link` header
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| matches!(p.trim(), "rel=\"next\"" | "rel=next"));
        if !is_next {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Some(target.to_string())
    })
}

fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Map unsuccessful responses to errors
fn check_status(response: Response, what: &str) -> Result<Response, RegistryError> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(RegistryError::NotFound(what.to_string()));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(RegistryError::RateLimited {
            retry_after_secs: retry_after(response.headers()),
        });
    }

    if !status.is_success() {
        warn!("Registry returned status {}: {}", status, response.url());
        return Err(RegistryError::InvalidResponse(format!(
            "Unexpected status: {}",
            status
        )));
    }

    Ok(response)
}

/// Client for one registry endpoint
pub struct DistributionClient {
    http: reqwest::Client,
    endpoint: RegistryEndpoint,
    authenticator: Authenticator,
    /// Bearer tokens by repository path
    tokens: Mutex<HashMap<String, String>>,
}

impl DistributionClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: RegistryEndpoint,
        authenticator: Authenticator,
    ) -> Self {
        Self {
            http,
            endpoint,
            authenticator,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn api_base_url(&self) -> String {
        if self.endpoint.address == DOCKER_HUB_DOMAIN {
            format!("{}://{}", self.endpoint.protocol.as_str(), DOCKER_HUB_API_HOST)
        } else {
            self.endpoint.base_url()
        }
    }

    /// Strip the registry address from a registry-qualified repository.
    ///
    /// Official Docker Hub images live under `library/`.
    fn repository_path(&self, repository: &str) -> Result<String, RegistryError> {
        let path = repository
            .strip_prefix(&self.endpoint.address)
            .map(|rest| rest.trim_start_matches('/'))
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| RegistryError::ForeignRepository {
                repository: repository.to_string(),
                domain: self.endpoint.address.clone(),
            })?;

        if self.endpoint.address == DOCKER_HUB_DOMAIN && !path.contains('/') {
            return Ok(format!("library/{}", path));
        }

        Ok(path.to_string())
    }

    fn absolute_url(&self, link: &str) -> String {
        if link.starts_with("http://") || link.starts_with("https://") {
            link.to_string()
        } else if link.starts_with('/') {
            format!("{}{}", self.api_base_url(), link)
        } else {
            format!("{}/{}", self.api_base_url(), link)
        }
    }

    fn cached_token(&self, path: &str) -> Option<String> {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        accept: Option<&str>,
        token: Option<String>,
    ) -> RequestBuilder {
        let mut request = self.http.request(method, url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        match (&self.authenticator, token) {
            (Authenticator::Basic { username, password }, _) => {
                request.basic_auth(username, Some(password))
            }
            (Authenticator::Token, Some(token)) => request.bearer_auth(token),
            _ => request,
        }
    }

    /// Send a request, answering one bearer challenge if token auth is configured
    async fn send(
        &self,
        method: Method,
        url: &str,
        path: &str,
        accept: Option<&str>,
    ) -> Result<Response, RegistryError> {
        let response = self
            .request(method.clone(), url, accept, self.cached_token(path))
            .send()
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if self.authenticator != Authenticator::Token {
            return Err(RegistryError::Unauthorized(url.to_string()));
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_bearer_challenge)
            .ok_or_else(|| {
                RegistryError::Unauthorized(format!("{} sent no bearer challenge", url))
            })?;

        let token = self.fetch_token(&challenge, path).await?;
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), token.clone());

        let response = self.request(method, url, accept, Some(token)).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(RegistryError::Unauthorized(url.to_string()));
        }

        Ok(response)
    }

    async fn fetch_token(
        &self,
        challenge: &BearerChallenge,
        path: &str,
    ) -> Result<String, RegistryError> {
        let mut url = Url::parse(&challenge.realm).map_err(|e| {
            RegistryError::InvalidResponse(format!("invalid realm '{}': {}", challenge.realm, e))
        })?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
            let scope = challenge
                .scope
                .clone()
                .unwrap_or_else(|| format!("repository:{}:pull", path));
            query.append_pair("scope", &scope);
        }

        debug!("Requesting registry token from {}", url);
        let response = self.http.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::Unauthorized(format!(
                "token endpoint {} returned {}",
                challenge.realm,
                response.status()
            )));
        }

        let body: TokenResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse token response: {}", e);
            RegistryError::InvalidResponse(e.to_string())
        })?;

        body.token
            .or(body.access_token)
            .ok_or_else(|| RegistryError::InvalidResponse("token response without token".into()))
    }
}

#[async_trait::async_trait]
impl RegistryClient for DistributionClient {
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>, RegistryError> {
        let path = self.repository_path(repository)?;
        let mut url = format!("{}/v2/{}/tags/list", self.api_base_url(), path);
        let mut tags = Vec::new();

        loop {
            let response = self.send(Method::GET, &url, &path, None).await?;
            let response = check_status(response, repository)?;
            let next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_next_link);

            let page: TagList = response.json().await.map_err(|e| {
                warn!("Failed to parse tag list of {}: {}", repository, e);
                RegistryError::InvalidResponse(e.to_string())
            })?;
            tags.extend(page.tags.unwrap_or_default());

            match next {
                Some(link) => url = self.absolute_url(&link),
                None => break,
            }
        }

        debug!("Listed {} tags for {}", tags.len(), repository);
        Ok(tags)
    }

    async fn image_by_tag(
        &self,
        repository: &str,
        tag: &str,
    ) -> Result<ImageInfo, RegistryError> {
        let path = self.repository_path(repository)?;
        let url = format!("{}/v2/{}/manifests/{}", self.api_base_url(), path, tag);
        let what = format!("{}:{}", repository, tag);

        let response = self
            .send(Method::HEAD, &url, &path, Some(MANIFEST_ACCEPT))
            .await?;
        let response = check_status(response, &what)?;

        let header_digest = response
            .headers()
            .get(CONTENT_DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let digest = match header_digest {
            Some(digest) => digest,
            None => {
                debug!("No digest header for {}, hashing manifest", what);
                let response = self
                    .send(Method::GET, &url, &path, Some(MANIFEST_ACCEPT))
                    .await?;
                let body = check_status(response, &what)?.bytes().await?;
                format!("sha256:{}", hex::encode(Sha256::digest(&body)))
            }
        };

        Ok(ImageInfo {
            digest,
            domain: self.endpoint.address.clone(),
            repository: path,
            tag: tag.to_string(),
        })
    }
}

/// Creates and reuses one [`DistributionClient`] per endpoint
pub struct DistributionConnector {
    http: reqwest::Client,
    clients: Mutex<HashMap<String, Arc<DistributionClient>>>,
}

impl DistributionConnector {
    /// Creates a connector whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            clients: Mutex::new(HashMap::new()),
        })
    }
}

impl RegistryConnector for DistributionConnector {
    fn connect(
        &self,
        endpoint: &RegistryEndpoint,
        authenticator: Authenticator,
    ) -> Arc<dyn RegistryClient> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients
            .entry(endpoint.base_url())
            .or_insert_with(|| {
                Arc::new(DistributionClient::new(
                    self.http.clone(),
                    endpoint.clone(),
                    authenticator,
                ))
            })
            .clone()
    }
}
