use crate::{Credentials, PublishError, RegistryBackend};
use base64::Engine as _;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use ureq::http::Response;
use ureq::Body;

/// Registry backend speaking the OCI distribution API.
///
/// - `HEAD /v2/<repo>/blobs/<digest>`      existence check
/// - `POST /v2/<repo>/blobs/uploads/`      start upload, `Location` in reply
/// - `PUT  <location>?digest=<digest>`     monolithic upload
/// - `HEAD /v2/<repo>/manifests/<ref>`     existence check
/// - `PUT  /v2/<repo>/manifests/<ref>`     manifest or index upload
///
/// Requests carry HTTP Basic credentials until the registry answers with a
/// `401` and a `Bearer` challenge. The credentials are then exchanged at the
/// challenge's realm for a token scoped to the repository, and the token is
/// used for that repository from then on.
pub struct HttpRegistry {
    base_url: String,
    agent: ureq::Agent,
    tokens: Mutex<HashMap<String, String>>,
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Head,
    Post,
    Put,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, PartialEq, Eq)]
struct BearerChallenge {
    realm: String,
    service: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

fn parse_bearer_challenge(header: &str) -> Option<BearerChallenge> {
    let (scheme, params) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let mut realm = None;
    let mut service = None;
    for (key, value) in auth_params(params) {
        match key.to_ascii_lowercase().as_str() {
            "realm" => realm = Some(value),
            "service" => service = Some(value),
            _ => {}
        }
    }
    Some(BearerChallenge {
        realm: realm?,
        service,
    })
}

/// `key=value` pairs separated by commas. Quoted values may contain commas.
fn auth_params(input: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = input.trim();
    while let Some((key, after)) = rest.split_once('=') {
        let after = after.trim_start();
        let (value, remainder) = match after.strip_prefix('"') {
            Some(quoted) => quoted.split_once('"').unwrap_or((quoted, "")),
            None => after.split_once(',').unwrap_or((after, "")),
        };
        out.push((key.trim().to_owned(), value.trim().to_owned()));
        rest = remainder.trim_start().trim_start_matches(',').trim_start();
    }
    out
}

fn basic_authorization(credentials: &Credentials) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!(
        "{}:{}",
        credentials.username(),
        credentials.password()
    ));
    format!("Basic {token}")
}

fn status_error(code: u16, what: &str) -> PublishError {
    match code {
        401 | 403 => PublishError::Authentication(format!("HTTP {code} for {what}")),
        _ => PublishError::Registry(format!("HTTP {code} for {what}")),
    }
}

impl HttpRegistry {
    /// `registry` is a host (`ghcr.io`) or a full base URL. Bare hosts use
    /// https unless `insecure` is set.
    pub fn new(registry: &str, insecure: bool) -> Self {
        let registry = registry.trim_end_matches('/');
        let base_url = if registry.starts_with("http://") || registry.starts_with("https://") {
            registry.to_owned()
        } else if insecure {
            format!("http://{registry}")
        } else {
            format!("https://{registry}")
        };
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Self {
            base_url,
            agent: ureq::Agent::new_with_config(config),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn cached_token(&self, repository: &str) -> Option<String> {
        self.tokens
            .lock()
            .ok()
            .and_then(|tokens| tokens.get(repository).cloned())
    }

    fn call(
        &self,
        method: Method,
        url: &str,
        authorization: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<Response<Body>, PublishError> {
        tracing::debug!("{} {url}", method.as_str());
        let result = match method {
            Method::Head => self
                .agent
                .head(url)
                .header("Authorization", authorization)
                .call(),
            Method::Post => self
                .agent
                .post(url)
                .header("Authorization", authorization)
                .send_empty(),
            Method::Put => {
                let mut req = self.agent.put(url).header("Authorization", authorization);
                if let Some(content_type) = content_type {
                    req = req.header("Content-Type", content_type);
                }
                req.send(data)
            }
        };
        result.map_err(|e| PublishError::Registry(format!("{} {url}: {e}", method.as_str())))
    }

    /// Send with the best credentials known for `repository`, answering a
    /// bearer challenge once.
    fn request(
        &self,
        method: Method,
        url: &str,
        repository: &str,
        content_type: Option<&str>,
        data: &[u8],
        credentials: &Credentials,
    ) -> Result<Response<Body>, PublishError> {
        let authorization = self
            .cached_token(repository)
            .map_or_else(|| basic_authorization(credentials), |t| format!("Bearer {t}"));
        let resp = self.call(method, url, &authorization, content_type, data)?;
        if resp.status().as_u16() != 401 {
            return Ok(resp);
        }
        let Some(challenge) = resp
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_bearer_challenge)
        else {
            return Ok(resp);
        };
        let token = self.fetch_token(&challenge, repository, credentials)?;
        self.call(method, url, &format!("Bearer {token}"), content_type, data)
    }

    fn fetch_token(
        &self,
        challenge: &BearerChallenge,
        repository: &str,
        credentials: &Credentials,
    ) -> Result<String, PublishError> {
        let scope = format!("repository:{repository}:pull,push");
        tracing::debug!("requesting token from {} for {scope}", challenge.realm);
        let mut req = self
            .agent
            .get(&challenge.realm)
            .query("scope", &scope)
            .header("Authorization", basic_authorization(credentials));
        if let Some(ref service) = challenge.service {
            req = req.query("service", service);
        }
        let what = format!("token request to {}", challenge.realm);
        let mut resp = req
            .call()
            .map_err(|e| PublishError::Registry(format!("{what}: {e}")))?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(status_error(status, &what));
        }
        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| PublishError::Registry(format!("{what}: {e}")))?;
        let parsed: TokenResponse = serde_json::from_str(&body)?;
        let token = parsed
            .token
            .or(parsed.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PublishError::Authentication(format!("{what} returned no token")))?;

        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(repository.to_owned(), token.clone());
        }
        Ok(token)
    }

    fn head(
        &self,
        url: &str,
        repository: &str,
        credentials: &Credentials,
    ) -> Result<bool, PublishError> {
        let resp = self.request(Method::Head, url, repository, None, &[], credentials)?;
        match resp.status().as_u16() {
            404 => Ok(false),
            _ if resp.status().is_success() => Ok(true),
            code => Err(status_error(code, &format!("HEAD {url}"))),
        }
    }

    fn put(
        &self,
        url: &str,
        repository: &str,
        content_type: &str,
        data: &[u8],
        credentials: &Credentials,
    ) -> Result<(), PublishError> {
        tracing::debug!("uploading {} bytes to {url}", data.len());
        let resp = self.request(
            Method::Put,
            url,
            repository,
            Some(content_type),
            data,
            credentials,
        )?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(status_error(resp.status().as_u16(), &format!("PUT {url}")))
        }
    }

    fn start_upload(
        &self,
        repository: &str,
        credentials: &Credentials,
    ) -> Result<String, PublishError> {
        let url = format!("{}/v2/{repository}/blobs/uploads/", self.base_url);
        let resp = self.request(Method::Post, &url, repository, None, &[], credentials)?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status().as_u16(), &format!("POST {url}")));
        }
        let location = resp
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| PublishError::Registry(format!("no Location in reply to POST {url}")))?;
        if location.starts_with('/') {
            Ok(format!("{}{location}", self.base_url))
        } else {
            Ok(location.to_owned())
        }
    }
}

impl RegistryBackend for HttpRegistry {
    fn has_blob(
        &self,
        repository: &str,
        digest: &str,
        credentials: &Credentials,
    ) -> Result<bool, PublishError> {
        let url = format!("{}/v2/{repository}/blobs/{digest}", self.base_url);
        self.head(&url, repository, credentials)
    }

    fn put_blob(
        &self,
        repository: &str,
        digest: &str,
        data: &[u8],
        credentials: &Credentials,
    ) -> Result<(), PublishError> {
        let location = self.start_upload(repository, credentials)?;
        let sep = if location.contains('?') { '&' } else { '?' };
        let url = format!("{location}{sep}digest={digest}");
        self.put(&url, repository, "application/octet-stream", data, credentials)
    }

    fn has_manifest(
        &self,
        repository: &str,
        reference: &str,
        credentials: &Credentials,
    ) -> Result<bool, PublishError> {
        let url = format!("{}/v2/{repository}/manifests/{reference}", self.base_url);
        self.head(&url, repository, credentials)
    }

    fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        data: &[u8],
        credentials: &Credentials,
    ) -> Result<(), PublishError> {
        let url = format!("{}/v2/{repository}/manifests/{reference}", self.base_url);
        self.put(&url, repository, media_type, data, credentials)
    }
}
