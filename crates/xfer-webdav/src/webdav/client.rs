// ── DavClient – one authenticated reqwest client per endpoint and principal ─
//
// WebDAV verbs (PROPFIND, GET, PUT, DELETE, MKCOL, MOVE, COPY) with
// bounded retry of 429 / 5xx answers for requests whose body can be replayed.

use crate::webdav::error::{classify_reqwest, status_error};
use crate::webdav::types::*;
use crate::webdav::xml::{parse_multistatus, PROPFIND_BODY};
use log::{debug, info, warn};
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use xfer_core::{Credentials, ErrorKind, OperationResult, TransferConfig, TransferError};

const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

pub struct DavClient {
    pub(crate) http: Client,
    pub(crate) endpoint: DavEndpoint,
    username: String,
    password: String,
    retry: RetryPolicy,
    /// Bound on metadata requests; streamed bodies are bounded per chunk.
    request_timeout: Duration,
    poisoned: bool,
}

impl DavClient {
    pub fn new(endpoint: DavEndpoint, credentials: &Credentials, config: &TransferConfig) -> OperationResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(config.webdav.user_agent.clone())
            .danger_accept_invalid_certs(config.webdav.accept_invalid_certs)
            .pool_idle_timeout(config.idle_timeout())
            .build()
            .map_err(|e| classify_reqwest("build HTTP client", e))?;
        Ok(Self {
            http,
            endpoint,
            username: credentials.username.clone(),
            password: credentials.secret.clone(),
            retry: RetryPolicy {
                max_retries: MAX_RETRIES,
                base_delay: config.retry_delay(),
            },
            request_timeout: config.connect_timeout() + config.read_timeout(),
            poisoned: false,
        })
    }

    pub fn endpoint(&self) -> &DavEndpoint {
        &self.endpoint
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Rejected credentials mean every later request fails the same way.
    pub(crate) fn guard<T>(&mut self, result: OperationResult<T>) -> OperationResult<T> {
        if let Err(e) = &result {
            if e.kind == ErrorKind::Authentication && !self.poisoned {
                warn!("WebDAV client {}@{} dropped: {}", self.username, self.endpoint.host, e);
                self.poisoned = true;
            }
        }
        result
    }

    pub(crate) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let req = self.http.request(method, url);
        if self.username.is_empty() {
            req
        } else {
            req.basic_auth(&self.username, Some(&self.password))
        }
    }

    // ── Retry engine ─────────────────────────────────────────────────────

    /// Send, replaying on 429 and 5xx while the request can be cloned.
    pub(crate) async fn send_with_retry(&self, req: RequestBuilder, what: &str) -> OperationResult<Response> {
        let request = req.build().map_err(|e| classify_reqwest(what, e))?;
        let mut attempt = 0u32;
        loop {
            let Some(cloned) = request.try_clone() else {
                return self.http.execute(request).await.map_err(|e| classify_reqwest(what, e));
            };
            let resp = self.http.execute(cloned).await.map_err(|e| classify_reqwest(what, e))?;
            let status = resp.status();
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if !retryable || attempt >= self.retry.max_retries {
                return Ok(resp);
            }
            let wait = retry_after(&resp).unwrap_or_else(|| self.retry.backoff(attempt));
            warn!("{} → {}, retrying in {:?} (attempt {})", what, status, wait, attempt + 1);
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    /// Turn a non-success response into a classified error.
    pub(crate) async fn expect_success(resp: Response, method: &str) -> OperationResult<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let url = resp.url().to_string();
        let body = resp.text().await.unwrap_or_default();
        Err(status_error(method, &url, status, &body))
    }

    // ── Metadata ─────────────────────────────────────────────────────────

    pub async fn propfind(&mut self, path: &str, depth: PropfindDepth) -> OperationResult<Vec<DavResource>> {
        let url = self.endpoint.url(path, depth == PropfindDepth::One);
        let req = self
            .request(Method::from_bytes(b"PROPFIND").map_err(|e| TransferError::unknown(e.to_string()))?, &url)
            .header("Depth", depth.as_str())
            .header(header::CONTENT_TYPE, "application/xml; charset=utf-8")
            .timeout(self.request_timeout)
            .body(PROPFIND_BODY);
        let result = async {
            let resp = self.send_with_retry(req, "PROPFIND").await?;
            let resp = Self::expect_success(resp, "PROPFIND").await?;
            let text = resp.text().await.map_err(|e| classify_reqwest("PROPFIND body", e))?;
            parse_multistatus(&text).map_err(|e| TransferError::protocol("EXML", e))
        }
        .await;
        self.guard(result)
    }

    /// Cheap authenticated probe of the endpoint root.
    pub async fn probe(&mut self) -> OperationResult<()> {
        let found = self.propfind("/", PropfindDepth::Zero).await?;
        info!(
            "WebDAV {} reachable as {} ({} resource)",
            self.endpoint.origin(),
            if self.username.is_empty() { "anonymous" } else { &self.username },
            found.len()
        );
        Ok(())
    }

    // ── Mutations ────────────────────────────────────────────────────────

    async fn simple(&mut self, method: &str, url: String, extra: &[(&str, String)]) -> OperationResult<()> {
        let verb = Method::from_bytes(method.as_bytes()).map_err(|e| TransferError::unknown(e.to_string()))?;
        let mut req = self.request(verb, &url).timeout(self.request_timeout);
        for (name, value) in extra {
            req = req.header(*name, value.as_str());
        }
        let result = async {
            let resp = self.send_with_retry(req, method).await?;
            Self::expect_success(resp, method).await.map(drop)
        }
        .await;
        debug!("{} {} → {:?}", method, url, result.as_ref().map_err(|e| e.kind));
        self.guard(result)
    }

    pub async fn delete(&mut self, path: &str, collection: bool) -> OperationResult<()> {
        let url = self.endpoint.url(path, collection);
        self.simple("DELETE", url, &[]).await
    }

    pub async fn mkcol(&mut self, path: &str) -> OperationResult<()> {
        let url = self.endpoint.url(path, true);
        self.simple("MKCOL", url, &[]).await
    }

    pub async fn move_to(&mut self, from: &str, to: &str) -> OperationResult<()> {
        let src = self.endpoint.url(from, false);
        let dst = self.endpoint.url(to, false);
        self.simple("MOVE", src, &[("Destination", dst), ("Overwrite", "T".into())]).await
    }

    pub async fn copy_to(&mut self, from: &str, to: &str) -> OperationResult<()> {
        let src = self.endpoint.url(from, false);
        let dst = self.endpoint.url(to, false);
        self.simple("COPY", src, &[("Destination", dst), ("Overwrite", "T".into())]).await
    }
}

/// `Retry-After` in seconds, when the server sent one.
fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn anonymous_requests_carry_no_authorization() {
        let endpoint = DavEndpoint::new(false, "nas", 8080, None);
        let client = DavClient::new(endpoint, &Credentials::password("", ""), &TransferConfig::default()).unwrap();
        let req = client.request(Method::GET, "http://nas:8080/a").build().unwrap();
        assert!(req.headers().get(header::AUTHORIZATION).is_none());

        let endpoint = DavEndpoint::new(false, "nas", 8080, None);
        let client =
            DavClient::new(endpoint, &Credentials::password("alice", "pw"), &TransferConfig::default()).unwrap();
        let req = client.request(Method::GET, "http://nas:8080/a").build().unwrap();
        assert!(req.headers().get(header::AUTHORIZATION).is_some());
    }
}
