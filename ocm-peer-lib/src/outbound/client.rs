use super::error::{find_outbound_error, OutboundError};
use super::intent::RequestIntent;
use super::redirect::{carry_headers, next_hop};
use super::resolver::{vet_host, DialGuard, Resolver, SystemResolver};
use crate::config::{ClientConfig, SsrfMode};
use crate::telemetry::Metrics;
use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, LOCATION};
use http::{HeaderMap, Method, Request, StatusCode};
use reqwest::redirect::Policy;
use reqwest::{Certificate, Url};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fully-read response from [`SafeClient::get_json`]
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Final URL after any followed redirect
    pub url: Url,
    pub body: Bytes,
}

/// Outbound HTTP client for talking to federation peers
///
/// Every request is checked against SSRF rules twice: once before it is
/// sent, and once more by the transport's DNS hook right before dialing.
/// Redirects are never followed by the transport. This client follows them
/// itself, only for unsigned requests and only within the same origin.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct SafeClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    resolver: Arc<dyn Resolver>,
    metrics: Option<Arc<Metrics>>,
}

impl SafeClient {
    pub fn new(config: &ClientConfig) -> Result<Self, OutboundError> {
        Self::build(config, Arc::new(SystemResolver), None)
    }

    pub fn with_resolver(
        config: &ClientConfig,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, OutboundError> {
        Self::build(config, resolver, None)
    }

    /// Build the client. The resolver serves both the pre-flight check and
    /// the dial-time check.
    pub fn build(
        config: &ClientConfig,
        resolver: Arc<dyn Resolver>,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, OutboundError> {
        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            // Proxy environment variables must never reroute peer traffic.
            .no_proxy()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(config.user_agent.as_str());

        if config.ssrf_mode == SsrfMode::Strict {
            builder = builder
                .dns_resolver(Arc::new(DialGuard::new(Arc::clone(&resolver), metrics.clone())));
        } else {
            warn!("outbound ssrf protection is disabled");
        }

        for cert in load_root_certificates(config)? {
            builder = builder.add_root_certificate(cert);
        }

        if config.insecure_skip_verify {
            warn!("outbound TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(|e| OutboundError::Build(e.to_string()))?;
        Ok(Self { http, config: Arc::new(config.clone()), resolver, metrics })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Vet `host` as a request target would be, whatever the SSRF mode.
    /// Returns the addresses it resolved to.
    pub async fn check_host(
        &self,
        cancel: &CancellationToken,
        host: &str,
    ) -> Result<Vec<IpAddr>, OutboundError> {
        vet_host(self.resolver.as_ref(), cancel, host).await
    }

    /// Unsigned GET.
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<reqwest::Response, OutboundError> {
        let request = get_request(url)?;
        self.send_with_intent(cancel, request, RequestIntent::unsigned()).await
    }

    /// Send a request that may follow one bounded same-origin redirect,
    /// unless its headers show it is signed.
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        request: Request<Bytes>,
    ) -> Result<reqwest::Response, OutboundError> {
        self.send_with_intent(cancel, request, RequestIntent::unsigned()).await
    }

    /// Send a signed request. Any 3xx answer is refused.
    pub async fn send_signed(
        &self,
        cancel: &CancellationToken,
        request: Request<Bytes>,
    ) -> Result<reqwest::Response, OutboundError> {
        self.send_with_intent(cancel, request, RequestIntent::signed()).await
    }

    pub async fn send_with_intent(
        &self,
        cancel: &CancellationToken,
        request: Request<Bytes>,
        intent: RequestIntent,
    ) -> Result<reqwest::Response, OutboundError> {
        let (parts, body) = request.into_parts();
        let signed = intent.resolve(&parts.headers);
        let mut url = parse_url(&parts.uri.to_string())?;
        let method = parts.method;
        let mut headers = parts.headers;
        let mut body = Some(body);
        let mut hops = 0;

        loop {
            self.preflight(cancel, &url).await?;

            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(bytes) = body.take().filter(|b| !b.is_empty()) {
                request = request.body(bytes);
            }
            let request = request.build().map_err(|e| OutboundError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

            if let Some(ref m) = self.metrics {
                m.record_outbound_request(signed);
            }
            let response = self.dispatch(cancel, request).await?;
            if !response.status().is_redirection() {
                return Ok(response);
            }

            if signed {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let err = OutboundError::SignedNoRedirect { location };
                self.refuse_redirect(&url, response.status(), &err);
                return Err(err);
            }

            let target = match next_hop(&url, response.headers(), hops, self.config.max_redirects)
            {
                Ok(target) => target,
                Err(err) => {
                    self.refuse_redirect(&url, response.status(), &err);
                    return Err(err);
                }
            };

            debug!(
                from = %url,
                to = %target,
                status = %response.status(),
                hop = hops + 1,
                "following redirect"
            );
            if let Some(ref m) = self.metrics {
                m.record_redirect_followed();
            }
            hops += 1;
            headers = carry_headers(&headers);
            url = target;
        }
    }

    /// GET `url` and read the whole body, refusing anything larger than
    /// `max_response_bytes`.
    pub async fn get_json(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<JsonResponse, OutboundError> {
        let mut request = get_request(url)?;
        request
            .headers_mut()
            .insert(http::header::ACCEPT, http::HeaderValue::from_static("application/json"));
        let mut response = self
            .send_with_intent(cancel, request, RequestIntent::unsigned())
            .await?;

        let limit = self.config.max_response_bytes;
        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();

        let declared = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(self.too_large(&final_url, limit));
        }

        let mut body = BytesMut::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(OutboundError::Cancelled),
                chunk = response.chunk() => chunk.map_err(|source| OutboundError::Transport {
                    url: final_url.to_string(),
                    source,
                })?,
            };
            let Some(chunk) = chunk else { break };
            // Reading stops at limit + 1, enough to tell "too large" apart.
            let room = usize::try_from(limit.saturating_add(1).saturating_sub(body.len() as u64))
                .unwrap_or(usize::MAX);
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() as u64 > limit {
                return Err(self.too_large(&final_url, limit));
            }
        }

        Ok(JsonResponse { status, headers, url: final_url, body: body.freeze() })
    }

    async fn preflight(&self, cancel: &CancellationToken, url: &Url) -> Result<(), OutboundError> {
        if self.config.ssrf_mode == SsrfMode::Off {
            return Ok(());
        }
        let host = url.host_str().unwrap_or_default();
        if let Err(err) = vet_host(self.resolver.as_ref(), cancel, host).await {
            warn!(%url, error = %err, "outbound request blocked");
            if let Some(ref m) = self.metrics {
                m.record_outbound_blocked(err.kind().as_str());
            }
            return Err(err);
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        request: reqwest::Request,
    ) -> Result<reqwest::Response, OutboundError> {
        let url = request.url().to_string();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OutboundError::Cancelled),
            result = self.http.execute(request) => {
                result.map_err(|source| transport_error(url, source))
            }
        }
    }

    fn refuse_redirect(&self, url: &Url, status: StatusCode, err: &OutboundError) {
        warn!(%url, %status, error = %err, "redirect refused");
        if let Some(ref m) = self.metrics {
            m.record_redirect_refused(err.kind().as_str());
        }
    }

    fn too_large(&self, url: &Url, limit: u64) -> OutboundError {
        warn!(%url, limit, "peer response exceeds size limit");
        if let Some(ref m) = self.metrics {
            m.record_response_too_large();
        }
        OutboundError::ResponseTooLarge { limit }
    }
}

/// Surface a dial-time SSRF refusal as itself rather than as an opaque
/// transport failure.
fn transport_error(url: String, source: reqwest::Error) -> OutboundError {
    match find_outbound_error(&source).and_then(OutboundError::clone_policy) {
        Some(policy) => policy,
        None => OutboundError::Transport { url, source },
    }
}

fn parse_url(raw: &str) -> Result<Url, OutboundError> {
    let url = Url::parse(raw).map_err(|e| OutboundError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(OutboundError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {:?}", url.scheme()),
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(OutboundError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

fn get_request(url: &str) -> Result<Request<Bytes>, OutboundError> {
    Request::builder()
        .method(Method::GET)
        .uri(url)
        .body(Bytes::new())
        .map_err(|e| OutboundError::InvalidUrl { url: url.to_string(), reason: e.to_string() })
}

/// Extra trust anchors from `ca_file` and every `*.pem`/`*.crt` in `ca_dir`.
fn load_root_certificates(config: &ClientConfig) -> Result<Vec<Certificate>, OutboundError> {
    let mut certs = Vec::new();
    if let Some(ref file) = config.ca_file {
        certs.extend(read_pem_bundle(file)?);
    }
    if let Some(ref dir) = config.ca_dir {
        let entries = fs::read_dir(dir).map_err(|e| {
            OutboundError::Build(format!("reading CA directory {}: {e}", dir.display()))
        })?;
        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| matches!(ext, "pem" | "crt"))
            })
            .collect();
        paths.sort();
        for path in paths {
            certs.extend(read_pem_bundle(&path)?);
        }
    }
    if !certs.is_empty() {
        info!(count = certs.len(), "loaded extra root certificates");
    }
    Ok(certs)
}

fn read_pem_bundle(path: &Path) -> Result<Vec<Certificate>, OutboundError> {
    let pem = fs::read(path)
        .map_err(|e| OutboundError::Build(format!("reading {}: {e}", path.display())))?;
    Certificate::from_pem_bundle(&pem)
        .map_err(|e| OutboundError::Build(format!("parsing {}: {e}", path.display())))
}
