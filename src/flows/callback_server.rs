//! Local Callback Server
//!
//! Single-use loopback listener: the start path redirects the browser to the
//! consent page, the callback path receives the authorization code.

use axum::{
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    Router,
};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::AuthorizationState;
use crate::error::{ConfigurationError, FlowError, LocalAuthResult};
use crate::types::CallbackParams;

/// Redirect URL prefix from which the listening port is inferred.
const LOCALHOST_PREFIX: &str = "http://localhost:";

/// How long shutdown waits for in-flight requests before aborting.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Port and callback path derived from the redirect URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackEndpoint {
    /// Port to listen on. Zero binds an ephemeral port and is only accepted
    /// as an explicit override.
    pub port: u16,
    /// Path the provider redirects to.
    pub callback_path: String,
}

impl CallbackEndpoint {
    /// Resolve the endpoint for `redirect_url`.
    ///
    /// Without an explicit port the redirect URL must start with
    /// `http://localhost:<port>` and name a non-zero port. The callback path
    /// is matched literally.
    pub fn from_redirect_url(redirect_url: &str, port: Option<u16>) -> LocalAuthResult<Self> {
        let port = match port {
            Some(port) => port,
            None => infer_port(redirect_url)?,
        };

        let parsed = Url::parse(redirect_url).map_err(|e| ConfigurationError::InvalidUrl {
            url: redirect_url.to_string(),
            message: format!("parsing redirect URL: {}", e),
        })?;

        let callback_path = match parsed.path() {
            "" => "/".to_string(),
            path if path.starts_with('/') => path.to_string(),
            _ => {
                return Err(ConfigurationError::InvalidUrl {
                    url: redirect_url.to_string(),
                    message: "redirect URL has no callback path".to_string(),
                }
                .into())
            }
        };

        Ok(Self {
            port,
            callback_path,
        })
    }
}

fn infer_port(redirect_url: &str) -> LocalAuthResult<u16> {
    let not_inferable = || ConfigurationError::PortNotInferable {
        redirect_url: redirect_url.to_string(),
    };

    let rest = redirect_url
        .strip_prefix(LOCALHOST_PREFIX)
        .ok_or_else(not_inferable)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();

    match digits.parse::<u16>() {
        Ok(0) | Err(_) => Err(not_inferable().into()),
        Ok(port) => Ok(port),
    }
}

/// What the callback handler hands to the waiting flow.
#[derive(Debug)]
enum CallbackOutcome {
    Code(String),
    Denied {
        error: String,
        error_description: Option<String>,
    },
}

/// One callback hand-off. The handler responds once `ack` fires.
struct PendingCode {
    outcome: CallbackOutcome,
    ack: oneshot::Sender<()>,
}

#[derive(Clone)]
struct ServerState {
    start_path: Arc<str>,
    callback_path: Arc<str>,
    consent_url: Arc<str>,
    state: AuthorizationState,
    success_page: Arc<str>,
    codes: mpsc::Sender<PendingCode>,
}

/// Listener configuration, validated before anything is bound.
#[derive(Clone, Debug)]
pub struct LocalCallbackServer {
    endpoint: CallbackEndpoint,
    start_path: String,
    success_page: Arc<str>,
}

impl LocalCallbackServer {
    /// Create a listener configuration.
    pub fn new(
        endpoint: CallbackEndpoint,
        start_path: impl Into<String>,
        success_page: Arc<str>,
    ) -> LocalAuthResult<Self> {
        let start_path = start_path.into();

        if !start_path.starts_with('/') {
            return Err(ConfigurationError::InvalidConfig {
                message: format!("start path {:?} must begin with '/'", start_path),
            }
            .into());
        }

        if start_path == endpoint.callback_path {
            return Err(ConfigurationError::InvalidConfig {
                message: format!(
                    "start path and callback path are both {:?}",
                    endpoint.callback_path
                ),
            }
            .into());
        }

        Ok(Self {
            endpoint,
            start_path,
            success_page,
        })
    }

    /// Endpoint the listener binds.
    pub fn endpoint(&self) -> &CallbackEndpoint {
        &self.endpoint
    }

    /// Bind the port on the IPv4 loopback, and on the IPv6 loopback when
    /// available, and start serving.
    ///
    /// The listener stops when the returned handle is shut down or dropped,
    /// or when `cancel` fires.
    pub async fn start(
        &self,
        state: AuthorizationState,
        consent_url: String,
        cancel: &CancellationToken,
    ) -> LocalAuthResult<RunningCallbackServer> {
        let port = self.endpoint.port;
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|e| FlowError::Bind { port, source: e })?;
        let local_addr = listener.local_addr().map_err(|e| FlowError::Server {
            message: format!("reading listener address: {}", e),
        })?;

        let mut listeners = vec![listener];
        match TcpListener::bind((Ipv6Addr::LOCALHOST, local_addr.port())).await {
            Ok(v6) => listeners.push(v6),
            Err(e) => debug!(error = %e, "IPv6 loopback not bound"),
        }

        // Paths are compared literally, never as route patterns.
        let (codes_tx, codes_rx) = mpsc::channel(1);
        let app = Router::new().fallback(dispatch).with_state(ServerState {
            start_path: Arc::from(self.start_path.as_str()),
            callback_path: Arc::from(self.endpoint.callback_path.as_str()),
            consent_url: Arc::from(consent_url),
            state,
            success_page: self.success_page.clone(),
            codes: codes_tx,
        });

        let shutdown = cancel.child_token();
        let tasks = listeners
            .into_iter()
            .map(|listener| {
                let app = app.clone();
                let signal = shutdown.clone();
                tokio::spawn(async move {
                    let addr = listener.local_addr();
                    let result = axum::serve(listener, app)
                        .with_graceful_shutdown(async move { signal.cancelled().await })
                        .await;
                    debug!(addr = ?addr, "server shut down");
                    result
                })
            })
            .collect();

        info!(
            %local_addr,
            callback_path = %self.endpoint.callback_path,
            "callback listener started"
        );

        Ok(RunningCallbackServer {
            local_addr,
            start_url: format!(
                "http://localhost:{}{}",
                local_addr.port(),
                self.start_path
            ),
            codes: Some(codes_rx),
            shutdown,
            tasks,
        })
    }
}

async fn dispatch(
    State(server): State<ServerState>,
    uri: Uri,
    Query(params): Query<CallbackParams>,
) -> Response {
    let path = uri.path();
    if path == &*server.callback_path {
        handle_callback(server, params).await
    } else if path == &*server.start_path {
        Redirect::temporary(&server.consent_url).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn handle_callback(server: ServerState, params: CallbackParams) -> Response {
    let received = params.state_or_empty();
    if !server.state.matches(received) {
        warn!("callback rejected: state mismatch");
        return (
            StatusCode::BAD_REQUEST,
            format!("invalid state: {}", received),
        )
            .into_response();
    }

    let outcome = match params.error {
        Some(error) => CallbackOutcome::Denied {
            error,
            error_description: params.error_description,
        },
        None => CallbackOutcome::Code(params.code.unwrap_or_default()),
    };
    let denied = matches!(outcome, CallbackOutcome::Denied { .. });

    let (ack_tx, ack_rx) = oneshot::channel();
    let delivered = server
        .codes
        .send(PendingCode {
            outcome,
            ack: ack_tx,
        })
        .await
        .is_ok();

    if !delivered || ack_rx.await.is_err() {
        debug!("callback after completion");
        return (StatusCode::GONE, "authorization already completed").into_response();
    }

    if denied {
        return (StatusCode::FORBIDDEN, "authorization denied").into_response();
    }

    Html(server.success_page.to_string()).into_response()
}

/// Handle to a listening callback server.
///
/// Dropping the handle signals shutdown without waiting for it.
pub struct RunningCallbackServer {
    local_addr: SocketAddr,
    start_url: String,
    codes: Option<mpsc::Receiver<PendingCode>>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<std::io::Result<()>>>,
}

impl RunningCallbackServer {
    /// Bound IPv4 loopback address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Local URL that redirects to the consent page.
    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    /// Wait for the first callback carrying the expected state.
    ///
    /// Resolves at most once; later callbacks are answered with `410 Gone`.
    pub async fn wait_for_code(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> LocalAuthResult<String> {
        let codes = self.codes.as_mut().ok_or_else(|| FlowError::Server {
            message: "callback already consumed".to_string(),
        })?;

        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(FlowError::Cancelled.into());
            }
            pending = codes.recv() => pending,
            _ = tokio::time::sleep(timeout) => {
                return Err(FlowError::Timeout { timeout }.into());
            }
        };

        // Close the hand-off so later callbacks are turned away.
        self.codes = None;

        let pending = received.ok_or_else(|| FlowError::Server {
            message: "callback listener stopped".to_string(),
        })?;
        // Handler may already be gone (client disconnected); the code is still ours.
        let _ = pending.ack.send(());

        match pending.outcome {
            CallbackOutcome::Code(code) => {
                debug!("authorization code received");
                Ok(code)
            }
            CallbackOutcome::Denied {
                error,
                error_description,
            } => Err(FlowError::Denied {
                error,
                error_description,
            }
            .into()),
        }
    }

    /// Stop accepting, let in-flight requests finish and release the port.
    pub async fn shutdown(mut self) {
        self.codes = None;
        self.shutdown.cancel();

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for mut task in std::mem::take(&mut self.tasks) {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!(error = %e, "callback listener failed"),
                Ok(Err(e)) => warn!(error = %e, "callback listener task failed"),
                Err(_) => {
                    warn!(grace = ?SHUTDOWN_GRACE, "callback listener did not stop in time");
                    task.abort();
                }
            }
        }
    }
}

impl Drop for RunningCallbackServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LocalAuthError;

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    async fn start_server(
        state: &AuthorizationState,
        cancel: &CancellationToken,
    ) -> RunningCallbackServer {
        start_server_at("http://localhost:8080/callback", state, cancel).await
    }

    async fn start_server_at(
        redirect_url: &str,
        state: &AuthorizationState,
        cancel: &CancellationToken,
    ) -> RunningCallbackServer {
        let endpoint = CallbackEndpoint::from_redirect_url(redirect_url, Some(0)).unwrap();
        LocalCallbackServer::new(endpoint, "/auth", Arc::from("<html>done</html>"))
            .unwrap()
            .start(
                state.clone(),
                "https://provider.example.com/consent?state=s".to_string(),
                cancel,
            )
            .await
            .unwrap()
    }

    fn callback_url(server: &RunningCallbackServer, query: &str) -> String {
        format!(
            "http://127.0.0.1:{}/callback?{}",
            server.local_addr().port(),
            query
        )
    }

    #[test]
    fn test_endpoint_from_redirect_url() {
        let endpoint =
            CallbackEndpoint::from_redirect_url("http://localhost:8080/callback", None).unwrap();
        assert_eq!(endpoint.port, 8080);
        assert_eq!(endpoint.callback_path, "/callback");

        let root = CallbackEndpoint::from_redirect_url("http://localhost:9000", None).unwrap();
        assert_eq!(root.port, 9000);
        assert_eq!(root.callback_path, "/");

        let overridden =
            CallbackEndpoint::from_redirect_url("http://127.0.0.1/oauth2", Some(7000)).unwrap();
        assert_eq!(overridden.port, 7000);
        assert_eq!(overridden.callback_path, "/oauth2");
    }

    #[test]
    fn test_port_not_inferable() {
        for url in [
            "https://localhost:8080/callback",
            "http://127.0.0.1:8080/callback",
            "http://localhost/callback",
            "http://localhost:99999/callback",
            "http://localhost:0/callback",
            "",
        ] {
            let err = CallbackEndpoint::from_redirect_url(url, None).unwrap_err();
            assert!(
                matches!(
                    err,
                    LocalAuthError::Configuration(ConfigurationError::PortNotInferable { .. })
                ),
                "{url}: {err:?}"
            );
        }
    }

    #[test]
    fn test_redirect_url_without_path_is_rejected() {
        let err = CallbackEndpoint::from_redirect_url("urn:ietf:wg:oauth:2.0:oob", Some(0))
            .unwrap_err();
        assert!(matches!(
            err,
            LocalAuthError::Configuration(ConfigurationError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_callback_path_is_matched_literally() {
        let state = AuthorizationState::generate();
        let cancel = CancellationToken::new();

        for path in ["/cb*x", "/cb/:id", "/cb/{id}"] {
            let mut server =
                start_server_at(&format!("http://localhost:8080{}", path), &state, &cancel).await;
            let port = server.local_addr().port();
            let query = format!("state={}&code=XYZ", state.as_str());

            let other = client()
                .get(format!("http://127.0.0.1:{}/cb/other?{}", port, query))
                .send()
                .await
                .unwrap();
            assert_eq!(other.status(), reqwest::StatusCode::NOT_FOUND, "{path}");

            let request = tokio::spawn(
                client()
                    .get(format!("http://127.0.0.1:{}{}?{}", port, path, query))
                    .send(),
            );
            let code = server
                .wait_for_code(Duration::from_secs(5), &cancel)
                .await
                .unwrap();
            assert_eq!(code, "XYZ");
            assert_eq!(request.await.unwrap().unwrap().status(), reqwest::StatusCode::OK);

            server.shutdown().await;
        }
    }

    #[test]
    fn test_start_path_must_differ_from_callback_path() {
        let endpoint = CallbackEndpoint::from_redirect_url("http://localhost:8080/auth", None)
            .unwrap();
        let err = LocalCallbackServer::new(endpoint, "/auth", Arc::from("")).unwrap_err();
        assert!(matches!(
            err,
            LocalAuthError::Configuration(ConfigurationError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_start_path_redirects_to_consent_page() {
        let state = AuthorizationState::generate();
        let cancel = CancellationToken::new();
        let server = start_server(&state, &cancel).await;

        let response = client().get(server.start_url()).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()["location"],
            "https://provider.example.com/consent?state=s"
        );

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_state_mismatch_is_rejected_and_wait_continues() {
        let state = AuthorizationState::generate();
        let cancel = CancellationToken::new();
        let mut server = start_server(&state, &cancel).await;
        let client = client();

        let response = client
            .get(callback_url(&server, "state=forged&code=EVIL"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(response.text().await.unwrap(), "invalid state: forged");

        let pending = server
            .wait_for_code(Duration::from_millis(100), &cancel)
            .await;
        assert!(matches!(
            pending,
            Err(LocalAuthError::Flow(FlowError::Timeout { .. }))
        ));

        let valid = client
            .get(callback_url(
                &server,
                &format!("state={}&code=XYZ", state.as_str()),
            ))
            .send();
        let request = tokio::spawn(valid);

        let code = server
            .wait_for_code(Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert_eq!(code, "XYZ");

        let response = request.await.unwrap().unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "<html>done</html>");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_callback_response_waits_for_code_hand_off() {
        let state = AuthorizationState::generate();
        let cancel = CancellationToken::new();
        let mut server = start_server(&state, &cancel).await;

        let request = tokio::spawn(
            client()
                .get(callback_url(
                    &server,
                    &format!("state={}&code=XYZ", state.as_str()),
                ))
                .send(),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!request.is_finished());

        let code = server
            .wait_for_code(Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert_eq!(code, "XYZ");

        let response = tokio::time::timeout(Duration::from_secs(5), request)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_ipv6_loopback_is_served() {
        // Hosts without IPv6 only get the IPv4 listener.
        if std::net::TcpListener::bind((Ipv6Addr::LOCALHOST, 0)).is_err() {
            return;
        }

        let state = AuthorizationState::generate();
        let cancel = CancellationToken::new();
        let server = start_server(&state, &cancel).await;

        let response = client()
            .get(format!("http://[::1]:{}/auth", server.local_addr().port()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::TEMPORARY_REDIRECT);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_callback_after_completion_is_gone() {
        let state = AuthorizationState::generate();
        let cancel = CancellationToken::new();
        let mut server = start_server(&state, &cancel).await;
        let url = callback_url(&server, &format!("state={}&code=XYZ", state.as_str()));

        let first = tokio::spawn(client().get(&url).send());
        server
            .wait_for_code(Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert_eq!(first.await.unwrap().unwrap().status(), reqwest::StatusCode::OK);

        let second = client().get(&url).send().await.unwrap();
        assert_eq!(second.status(), reqwest::StatusCode::GONE);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_provider_error_is_denied() {
        let state = AuthorizationState::generate();
        let cancel = CancellationToken::new();
        let mut server = start_server(&state, &cancel).await;
        let url = callback_url(
            &server,
            &format!("state={}&error=access_denied", state.as_str()),
        );

        let request = tokio::spawn(client().get(url).send());
        let result = server.wait_for_code(Duration::from_secs(5), &cancel).await;
        match result {
            Err(LocalAuthError::Flow(FlowError::Denied { error, .. })) => {
                assert_eq!(error, "access_denied");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(
            request.await.unwrap().unwrap().status(),
            reqwest::StatusCode::FORBIDDEN
        );

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_timeout_releases_port() {
        let state = AuthorizationState::generate();
        let cancel = CancellationToken::new();
        let mut server = start_server(&state, &cancel).await;
        let addr = server.local_addr();

        let result = server
            .wait_for_code(Duration::from_millis(50), &cancel)
            .await;
        assert!(matches!(
            result,
            Err(LocalAuthError::Flow(FlowError::Timeout { .. }))
        ));

        server.shutdown().await;
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_cancellation() {
        let state = AuthorizationState::generate();
        let cancel = CancellationToken::new();
        let mut server = start_server(&state, &cancel).await;

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = server.wait_for_code(Duration::from_secs(5), &cancel).await;
        assert!(matches!(result, Err(LocalAuthError::Flow(FlowError::Cancelled))));

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let taken = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let endpoint = CallbackEndpoint::from_redirect_url(
            &format!("http://localhost:{}/callback", port),
            None,
        )
        .unwrap();
        let result = LocalCallbackServer::new(endpoint, "/auth", Arc::from(""))
            .unwrap()
            .start(
                AuthorizationState::generate(),
                "https://provider.example.com".to_string(),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(LocalAuthError::Flow(FlowError::Bind { .. }))
        ));
    }
}
