//! Outbound GENA requests: SUBSCRIBE, renewal and UNSUBSCRIBE.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::debug;
use url::Url;

use crate::error::{Result, SubscriptionError};

/// A lease granted by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Identifier the device will put in the `SID` header of every NOTIFY.
    pub sid: String,
    /// Granted lifetime, which may differ from what was asked for.
    pub timeout: Duration,
}

/// The three GENA calls the registry needs.
///
/// [`HttpGenaClient`] talks to real devices; tests substitute their own.
#[async_trait]
pub trait GenaClient: Send + Sync {
    /// Open a new subscription delivering to `callback`.
    async fn subscribe(&self, endpoint: &Url, callback: &str, timeout: Duration) -> Result<Lease>;

    /// Extend an existing subscription. The device may answer with a new SID.
    async fn renew(&self, endpoint: &Url, sid: &str, timeout: Duration) -> Result<Lease>;

    /// Cancel a subscription.
    async fn unsubscribe(&self, endpoint: &Url, sid: &str) -> Result<()>;
}

/// [`GenaClient`] over HTTP with the custom GENA verbs.
#[derive(Clone)]
pub struct HttpGenaClient {
    http: reqwest::Client,
    subscribe_method: Method,
    unsubscribe_method: Method,
}

impl HttpGenaClient {
    /// `request_timeout` bounds each individual request.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SubscriptionError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            subscribe_method: gena_method(b"SUBSCRIBE")?,
            unsubscribe_method: gena_method(b"UNSUBSCRIBE")?,
        })
    }
}

fn gena_method(name: &[u8]) -> Result<Method> {
    Method::from_bytes(name).map_err(|e| SubscriptionError::Network(e.to_string()))
}

#[async_trait]
impl GenaClient for HttpGenaClient {
    async fn subscribe(&self, endpoint: &Url, callback: &str, timeout: Duration) -> Result<Lease> {
        let response = self
            .http
            .request(self.subscribe_method.clone(), endpoint.clone())
            .header("HOST", host_header(endpoint))
            .header("CALLBACK", format!("<{callback}>"))
            .header("NT", "upnp:event")
            .header("TIMEOUT", timeout_header(timeout))
            .send()
            .await
            .map_err(|e| SubscriptionError::Network(format!("SUBSCRIBE {endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubscriptionError::Protocol {
                method: "SUBSCRIBE",
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        let sid = sid_header(headers).ok_or(SubscriptionError::MissingSid("SUBSCRIBE"))?;
        let granted = granted_timeout(headers).unwrap_or(timeout);
        debug!(%endpoint, %sid, granted_secs = granted.as_secs(), "subscribed");
        Ok(Lease {
            sid,
            timeout: granted,
        })
    }

    async fn renew(&self, endpoint: &Url, sid: &str, timeout: Duration) -> Result<Lease> {
        let response = self
            .http
            .request(self.subscribe_method.clone(), endpoint.clone())
            .header("HOST", host_header(endpoint))
            .header("SID", sid)
            .header("TIMEOUT", timeout_header(timeout))
            .send()
            .await
            .map_err(|e| SubscriptionError::Network(format!("renew {endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubscriptionError::Protocol {
                method: "SUBSCRIBE",
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        Ok(Lease {
            sid: sid_header(headers).unwrap_or_else(|| sid.to_string()),
            timeout: granted_timeout(headers).unwrap_or(timeout),
        })
    }

    async fn unsubscribe(&self, endpoint: &Url, sid: &str) -> Result<()> {
        let response = self
            .http
            .request(self.unsubscribe_method.clone(), endpoint.clone())
            .header("HOST", host_header(endpoint))
            .header("SID", sid)
            .send()
            .await
            .map_err(|e| SubscriptionError::Network(format!("UNSUBSCRIBE {endpoint}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubscriptionError::Protocol {
                method: "UNSUBSCRIBE",
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

fn host_header(endpoint: &Url) -> String {
    match (endpoint.host_str(), endpoint.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

fn timeout_header(timeout: Duration) -> String {
    format!("Second-{}", timeout.as_secs())
}

fn sid_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get("SID")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn granted_timeout(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("TIMEOUT")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_timeout)
}

/// `Second-1800` to 30 minutes. `infinite` and anything unrecognised yield
/// `None`, leaving the caller on the lease it asked for.
pub fn parse_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    let secs = value
        .strip_prefix("Second-")
        .or_else(|| value.strip_prefix("second-"))?;
    secs.trim().parse::<u64>().ok().map(Duration::from_secs)
}
