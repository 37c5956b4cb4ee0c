//! HTTP listener for GENA NOTIFY requests.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warp::http::{Method, StatusCode};
use warp::path::FullPath;
use warp::Filter;

use crate::error::{CallbackError, Result};
use crate::router::{EventRouter, NotificationPayload};

/// The single inbound listener every renderer posts its events to.
///
/// Each NOTIFY is acknowledged with `200 OK` as soon as its envelope has been
/// decoded, whether or not the lease identifier is still known. Decoded
/// payloads go out on the channel passed to [`CallbackServer::new`].
///
/// ```no_run
/// use callback_server::{CallbackServer, NotificationPayload};
/// use tokio::sync::mpsc;
///
/// # async fn run() -> Result<(), callback_server::CallbackError> {
/// let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
/// let server = CallbackServer::new((3001, 3001), tx).await?;
/// println!("advertise {}", server.callback_url());
///
/// while let Some(notification) = rx.recv().await {
///     println!("{} -> {}", notification.subscription_id, notification.payload);
/// }
/// server.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct CallbackServer {
    port: u16,
    base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    server_handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind the first free port in `port_range` (inclusive) and advertise the
    /// detected LAN address.
    pub async fn new(
        port_range: (u16, u16),
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self> {
        Self::with_advertised_ip(port_range, None, event_sender).await
    }

    /// Like [`CallbackServer::new`] but with an explicit address to put in
    /// callback URLs. Useful on multi-homed hosts and in tests.
    pub async fn with_advertised_ip(
        port_range: (u16, u16),
        advertised_ip: Option<IpAddr>,
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self> {
        let (start, end) = port_range;
        let port = Self::find_available_port(start, end)
            .ok_or(CallbackError::NoAvailablePort { start, end })?;
        let ip = match advertised_ip {
            Some(ip) => ip,
            None => Self::detect_local_ip().ok_or(CallbackError::NoLocalIp)?,
        };
        let base_url = format!("http://{}", SocketAddr::new(ip, port));

        let router = Arc::new(EventRouter::new(event_sender));
        let routes = notify_route(router).recover(handle_rejection);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
                async move {
                    shutdown_rx.recv().await;
                },
            )
            .map_err(|e| CallbackError::Bind {
                port,
                reason: e.to_string(),
            })?;

        info!(%addr, %base_url, "callback server listening");
        let server_handle = tokio::spawn(server);

        Ok(Self {
            port,
            base_url,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// `http://<ip>:<port>`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The URL to put in a SUBSCRIBE `CALLBACK` header.
    pub fn callback_url(&self) -> String {
        format!("{}/notify", self.base_url)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.server_handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "callback server task ended abnormally");
            }
        }
        debug!(port = self.port, "callback server stopped");
    }

    fn find_available_port(start: u16, end: u16) -> Option<u16> {
        (start..=end).find(|&port| Self::is_port_available(port))
    }

    fn is_port_available(port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).is_ok()
    }

    /// The address outbound traffic would leave from. Connecting a UDP socket
    /// sends nothing; it only consults the routing table.
    fn detect_local_ip() -> Option<IpAddr> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        Some(socket.local_addr().ok()?.ip())
    }
}

/// Any path, NOTIFY only.
fn notify_route(
    router: Arc<EventRouter>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::method()
        .and(warp::path::full())
        .and(warp::header::optional::<String>("sid"))
        .and(warp::header::optional::<String>("nt"))
        .and(warp::header::optional::<String>("nts"))
        .and(warp::body::bytes())
        .and_then(
            move |method: Method,
                  path: FullPath,
                  sid: Option<String>,
                  nt: Option<String>,
                  nts: Option<String>,
                  body: Bytes| {
                let router = router.clone();
                async move {
                    if method.as_str() != "NOTIFY" {
                        return Err(warp::reject::custom(NotNotify));
                    }
                    if !validate_upnp_headers(&sid, &nt, &nts) {
                        warn!(path = path.as_str(), ?sid, ?nt, ?nts, "rejecting NOTIFY with bad headers");
                        return Err(warp::reject::custom(InvalidUpnpHeaders));
                    }
                    let sid = sid.ok_or_else(|| warp::reject::custom(InvalidUpnpHeaders))?;
                    let sid = sid.trim();

                    let outcome = router.route(sid, &body);
                    debug!(sid, path = path.as_str(), bytes = body.len(), ?outcome, "NOTIFY");

                    Ok::<_, warp::Rejection>(warp::reply::with_status("", StatusCode::OK))
                }
            },
        )
}

/// `SID` is mandatory; `NT`/`NTS` are checked only when both are present.
fn validate_upnp_headers(sid: &Option<String>, nt: &Option<String>, nts: &Option<String>) -> bool {
    match sid {
        Some(sid) if !sid.trim().is_empty() => {}
        _ => return false,
    }
    match (nt, nts) {
        (Some(nt), Some(nts)) => nt == "upnp:event" && nts == "upnp:propchange",
        _ => true,
    }
}

#[derive(Debug)]
struct InvalidUpnpHeaders;

impl warp::reject::Reject for InvalidUpnpHeaders {}

#[derive(Debug)]
struct NotNotify;

impl warp::reject::Reject for NotNotify {}

async fn handle_rejection(
    err: warp::Rejection,
) -> std::result::Result<impl warp::Reply, std::convert::Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<InvalidUpnpHeaders>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid UPnP headers")
    } else if err.find::<NotNotify>().is_some() || err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };
    Ok(warp::reply::with_status(message, code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[test]
    fn port_in_use_is_not_available() {
        assert!(CallbackServer::is_port_available(0));

        let listener = TcpListener::bind("0.0.0.0:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!CallbackServer::is_port_available(port));
        drop(listener);
    }

    #[test]
    fn finds_port_in_range() {
        let port = CallbackServer::find_available_port(50000, 50100).unwrap();
        assert!((50000..=50100).contains(&port));
    }

    #[test]
    fn header_validation() {
        assert!(validate_upnp_headers(&s("uuid:1"), &s("upnp:event"), &s("upnp:propchange")));
        assert!(validate_upnp_headers(&s("uuid:1"), &None, &None));
        assert!(validate_upnp_headers(&s("uuid:1"), &s("upnp:event"), &None));
        assert!(!validate_upnp_headers(&None, &s("upnp:event"), &s("upnp:propchange")));
        assert!(!validate_upnp_headers(&s("  "), &None, &None));
        assert!(!validate_upnp_headers(&s("uuid:1"), &s("wrong"), &s("upnp:propchange")));
        assert!(!validate_upnp_headers(&s("uuid:1"), &s("upnp:event"), &s("wrong")));
    }

    proptest! {
        #[test]
        fn any_non_blank_sid_without_nt_is_valid(sid in "[a-zA-Z0-9:_-]{1,40}") {
            prop_assert!(validate_upnp_headers(&Some(sid), &None, &None));
        }
    }

    #[tokio::test]
    async fn other_methods_are_not_allowed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let routes = notify_route(Arc::new(EventRouter::new(tx))).recover(handle_rejection);

        for method in ["POST", "GET", "PUT"] {
            let response = warp::test::request()
                .method(method)
                .path("/notify")
                .header("SID", "uuid:a")
                .body("<e:propertyset/>")
                .reply(&routes)
                .await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn server_binds_within_range() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let server = CallbackServer::with_advertised_ip(
            (50000, 50100),
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            tx,
        )
        .await
        .unwrap();

        assert!((50000..=50100).contains(&server.port()));
        assert_eq!(server.base_url(), format!("http://127.0.0.1:{}", server.port()));
        assert!(server.callback_url().ends_with("/notify"));

        server.shutdown().await;
    }
}
