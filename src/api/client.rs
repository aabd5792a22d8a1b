use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::mtls::ClientCertificate;
use super::resilience::{Poll, ResilienceConfig, RetryPolicy};
use crate::error::{E2eError, Result};

/// A fully read HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    /// Fails with [`E2eError::UnexpectedStatus`] unless the status is `expected`
    pub fn expect_status(self, expected: u16) -> Result<Self> {
        if self.status == expected {
            Ok(self)
        } else {
            Err(self.into_unexpected(expected))
        }
    }

    /// Contract violation for a response that was inspected and rejected
    pub fn into_unexpected(self, expected: u16) -> E2eError {
        E2eError::UnexpectedStatus {
            method: self.method,
            url: self.url,
            expected,
            actual: Some(self.status),
            body: self.body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| E2eError::parse(format!("response of {} {}", self.method, self.url), e))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.header(LOCATION.as_str())
    }
}

/// Authorization to attach to a request
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    None,
    /// `Authorization: Bearer <token>`
    Bearer(&'a str),
    /// Authorization header value used verbatim (e.g. `cf oauth-token` output)
    Raw(&'a str),
    Basic { user: &'a str, password: &'a str },
}

impl<'a> Auth<'a> {
    pub fn bearer(token: Option<&'a str>) -> Self {
        match token {
            Some(token) => Auth::Bearer(token),
            None => Auth::None,
        }
    }

    fn apply(self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::None => builder,
            Auth::Bearer(token) => builder.bearer_auth(token),
            Auth::Raw(value) => builder.header(AUTHORIZATION, value),
            Auth::Basic { user, password } => builder.basic_auth(user, Some(password)),
        }
    }
}

/// Request body variants used by the contracts this tool talks to
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    /// JSON with an explicit content type such as `application/scim+json`
    JsonAs(&'static str, serde_json::Value),
    Form(Vec<(String, String)>),
}

impl Body {
    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::JsonAs(content_type, value) => builder
                .header(CONTENT_TYPE, HeaderValue::from_static(content_type))
                .body(value.to_string()),
            Body::Form(fields) => builder.form(fields),
        }
    }
}

/// HTTP client for sample app probes and service APIs
#[derive(Debug, Clone)]
pub struct HttpClient {
    http_client: reqwest::Client,
    no_redirect_client: reqwest::Client,
    resilience: ResilienceConfig,
    cert_dir: PathBuf,
}

impl HttpClient {
    pub fn new(resilience: ResilienceConfig) -> Result<Self> {
        Ok(Self {
            http_client: Self::builder(true)
                .build()
                .map_err(|e| E2eError::Precondition(format!("failed to build HTTP client: {}", e)))?,
            no_redirect_client: Self::builder(false)
                .build()
                .map_err(|e| E2eError::Precondition(format!("failed to build HTTP client: {}", e)))?,
            resilience,
            cert_dir: std::env::temp_dir(),
        })
    }

    /// Directory for temporary certificate files of mTLS calls
    pub fn with_cert_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cert_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn resilience(&self) -> &ResilienceConfig {
        &self.resilience
    }

    fn builder(follow_redirects: bool) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("ams-e2e/", env!("CARGO_PKG_VERSION")))
            .redirect(if follow_redirects {
                Policy::default()
            } else {
                Policy::none()
            })
    }

    async fn send_with(
        &self,
        client: &reqwest::Client,
        method: Method,
        url: &str,
        auth: Auth<'_>,
        body: &Body,
    ) -> std::result::Result<HttpResponse, reqwest::Error> {
        let builder = body.apply(auth.apply(client.request(method.clone(), url)));
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = response.text().await?;
        Ok(HttpResponse {
            method: method.to_string(),
            url: url.to_string(),
            status,
            headers,
            body: text,
        })
    }

    /// Sends one request and returns whatever status came back
    pub async fn send(&self, method: Method, url: &str, auth: Auth<'_>, body: Body) -> Result<HttpResponse> {
        self.send_with(&self.http_client, method.clone(), url, auth, &body)
            .await
            .map_err(|e| transport_error(&method, url, e))
    }

    /// GET that retries connection failures; any status is returned for inspection
    pub async fn get(&self, url: &str, token: Option<&str>) -> Result<HttpResponse> {
        info!(
            "Performing GET request to {}{}",
            url,
            if token.is_some() { " using oidc token" } else { "" }
        );
        let policy = RetryPolicy::new(self.resilience.connection);
        let empty = Body::Empty;
        let response = policy
            .retry_transport(url, || {
                self.send_with(&self.http_client, Method::GET, url, Auth::bearer(token), &empty)
            })
            .await
            .map_err(|e| transport_error(&Method::GET, url, e))?;
        log_probe(&response);
        Ok(response)
    }

    /// GET polled until it answers `expected`
    pub async fn get_expecting(&self, url: &str, expected: u16, token: Option<&str>) -> Result<HttpResponse> {
        self.get_expecting_with(self.resilience.expected_response, url, expected, token)
            .await
    }

    pub async fn get_expecting_with(
        &self,
        retry: super::resilience::RetryConfig,
        url: &str,
        expected: u16,
        token: Option<&str>,
    ) -> Result<HttpResponse> {
        RetryPolicy::new(retry)
            .poll(&format!("GET {} to return {}", url, expected), || async move {
                let response = self
                    .send(Method::GET, url, Auth::bearer(token), Body::Empty)
                    .await
                    .and_then(|r| r.expect_status(expected));
                Poll::pending_on_status(response)
            })
            .await
    }

    /// GET polled until `accept` approves the body. A `307` is followed once with the
    /// authorization header kept.
    pub async fn get_verified<F>(&self, url: &str, token: Option<&str>, accept: F) -> Result<HttpResponse>
    where
        F: Fn(&HttpResponse) -> bool,
    {
        let accept = &accept;
        RetryPolicy::new(self.resilience.expected_response)
            .poll(&format!("verified response of {}", url), || async move {
                let response = self.send_auth_redirect(Method::GET, url, Auth::bearer(token), Body::Empty).await;
                let response = match response.and_then(|r| r.expect_status(200)) {
                    Ok(response) => response,
                    Err(e) if e.is_unexpected_status() => return Ok(Poll::Pending(e.to_string())),
                    Err(e) => return Err(e),
                };
                if accept(&response) {
                    Ok(Poll::Ready(response))
                } else {
                    Ok(Poll::Pending(format!(
                        "response of get request to \"{}\" could not be verified: {}",
                        url, response.body
                    )))
                }
            })
            .await
    }

    /// Sends without following redirects; on `307` re-sends to `Location` with the same
    /// authorization, which redirect-following clients would drop.
    pub async fn send_auth_redirect(&self, method: Method, url: &str, auth: Auth<'_>, body: Body) -> Result<HttpResponse> {
        let response = self
            .send_with(&self.no_redirect_client, method.clone(), url, auth, &body)
            .await
            .map_err(|e| transport_error(&method, url, e))?;
        if response.status != 307 {
            return Ok(response);
        }
        let location = response
            .location()
            .ok_or_else(|| E2eError::Precondition(format!("307 from {} without Location header", url)))?
            .to_string();
        debug!("following 307 from {} to {}", url, location);
        self.send_with(&self.http_client, method.clone(), &location, auth, &body)
            .await
            .map_err(|e| transport_error(&method, &location, e))
    }

    /// Sends a request authenticated by a client certificate.
    ///
    /// The certificate is written to disk for the duration of this call only. A certificate
    /// that cannot be loaded or a failed handshake is reported as
    /// [`E2eError::UnexpectedStatus`] with no status, expecting `expected`.
    pub async fn send_mtls(
        &self,
        method: Method,
        url: &str,
        certificate: &ClientCertificate,
        auth: Auth<'_>,
        body: Body,
        follow_redirects: bool,
        expected: u16,
    ) -> Result<HttpResponse> {
        let contract_error = |message: String| E2eError::UnexpectedStatus {
            method: method.to_string(),
            url: url.to_string(),
            expected,
            actual: None,
            body: message,
        };

        let files = certificate.write_to(&self.cert_dir)?;
        let identity = files.identity();
        let result = match identity {
            Ok(identity) => match Self::builder(follow_redirects).identity(identity).build() {
                Ok(client) => self
                    .send_with(&client, method.clone(), url, auth, &body)
                    .await
                    .map_err(|e| contract_error(e.to_string())),
                Err(e) => Err(contract_error(e.to_string())),
            },
            Err(message) => Err(contract_error(message)),
        };
        drop(files);

        let response = result?;
        log_probe(&response);
        Ok(response)
    }
}

fn transport_error(method: &Method, url: &str, error: reqwest::Error) -> E2eError {
    E2eError::Transport {
        method: method.to_string(),
        url: url.to_string(),
        message: error.to_string(),
    }
}

fn log_probe(response: &HttpResponse) {
    // A non-200 is not always an error
    if response.status != 200 {
        info!(
            "{} request to '{}' failed - {}: {}",
            response.method, response.url, response.status, response.body
        );
    } else {
        info!("{} request to '{}' succeeded - {}", response.method, response.url, response.body);
    }
}
