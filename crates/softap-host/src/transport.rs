//! HTTP transport on tokio + axum.
//!
//! Handlers are synchronous and write through a [`ResponseSink`], so each
//! request runs its handler on the blocking pool and bridges the chunks into
//! a streaming body. The response head goes out with the first chunk; a body
//! without a known length is sent with chunked transfer encoding.
//!
//! Status mapping:
//! - no route for the path: 404
//! - route exists but not for the method: 405
//! - handler fails before the first chunk: 404 for a missing file, 500
//!   otherwise, both with an empty body
//! - handler fails mid-stream: the connection is aborted

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, PoisonError, RwLock};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{self, header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use softap_core::mime::DEFAULT_CONTENT_TYPE;
use softap_core::uri::matches_wildcard;
use softap_core::{
    HttpConfig, HttpTransport, Method, RequestHandler, ResponseSink, SinkError, TransportError,
};

/// Chunks buffered between the handler and the connection.
const BODY_CHANNEL_CAPACITY: usize = 4;

struct Route {
    pattern: String,
    method: Method,
    handler: Arc<dyn RequestHandler>,
}

enum Lookup {
    Found(Arc<dyn RequestHandler>),
    MethodNotAllowed,
    NotFound,
}

/// Registered handlers, shared between the transport and the router.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: Arc<RwLock<Vec<Route>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. Routes are matched in registration order.
    pub fn insert(&self, pattern: &str, method: Method, handler: Arc<dyn RequestHandler>) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Route {
                pattern: pattern.to_string(),
                method,
                handler,
            });
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, method: &str, path: &str) -> Lookup {
        let method = Method::parse(method);
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);

        let mut path_matched = false;
        for route in routes.iter().filter(|r| matches_wildcard(&r.pattern, path)) {
            if Some(route.method) == method {
                return Lookup::Found(Arc::clone(&route.handler));
            }
            path_matched = true;
        }

        if path_matched {
            Lookup::MethodNotAllowed
        } else {
            Lookup::NotFound
        }
    }
}

/// Build the router that dispatches every request through `routes`.
pub fn router(routes: RouteTable) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(routes)
        .layer(TraceLayer::new_for_http())
}

async fn dispatch(State(routes): State<RouteTable>, method: http::Method, uri: Uri) -> Response {
    let path = uri.path().to_string();

    let handler = match routes.lookup(method.as_str(), &path) {
        Lookup::Found(handler) => handler,
        Lookup::MethodNotAllowed => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
        Lookup::NotFound => return StatusCode::NOT_FOUND.into_response(),
    };

    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);

    let task = tokio::task::spawn_blocking(move || {
        let mut sink = ChannelSink::new(head_tx, body_tx);
        let result = handler.handle(&path, &mut sink);
        if let Err(e) = &result {
            if sink.head_sent() {
                warn!(%path, error = %e, "aborting response");
                sink.abort(e.to_string());
            } else {
                debug!(%path, error = %e, "request failed");
            }
        }
        result
    });

    match head_rx.await {
        Ok(content_type) => {
            let body = futures::stream::unfold(body_rx, |mut rx| async move {
                rx.recv().await.map(|chunk| (chunk, rx))
            });
            (
                [(header::CONTENT_TYPE, content_type)],
                Body::from_stream(body),
            )
                .into_response()
        }
        // The handler finished without writing anything.
        Err(_) => match task.await {
            Ok(Ok(())) => StatusCode::OK.into_response(),
            Ok(Err(e)) if e.is_not_found() => StatusCode::NOT_FOUND.into_response(),
            Ok(Err(_)) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            Err(e) => {
                error!("Request handler panicked: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
    }
}

/// [`ResponseSink`] feeding a streaming body from a blocking thread.
struct ChannelSink {
    content_type: &'static str,
    head: Option<oneshot::Sender<&'static str>>,
    body: mpsc::Sender<Result<Bytes, io::Error>>,
}

impl ChannelSink {
    fn new(
        head: oneshot::Sender<&'static str>,
        body: mpsc::Sender<Result<Bytes, io::Error>>,
    ) -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE,
            head: Some(head),
            body,
        }
    }

    fn head_sent(&self) -> bool {
        self.head.is_none()
    }

    fn send_head(&mut self) -> Result<(), SinkError> {
        match self.head.take() {
            Some(head) => head
                .send(self.content_type)
                .map_err(|_| SinkError::new("request cancelled")),
            None => Ok(()),
        }
    }

    fn abort(&self, reason: String) {
        let _ = self.body.blocking_send(Err(io::Error::other(reason)));
    }
}

impl ResponseSink for ChannelSink {
    fn set_content_type(&mut self, content_type: &'static str) -> Result<(), SinkError> {
        if self.head_sent() {
            return Err(SinkError::new("headers already sent"));
        }
        self.content_type = content_type;
        Ok(())
    }

    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        self.send_head()?;
        if chunk.is_empty() {
            // The body ends when the sink is dropped.
            return Ok(());
        }
        self.body
            .blocking_send(Ok(Bytes::copy_from_slice(chunk)))
            .map_err(|_| SinkError::new("client disconnected"))
    }
}

/// [`HttpTransport`] serving a [`RouteTable`] with axum on a tokio runtime.
///
/// The transport itself is synchronous; the server task runs on the runtime
/// behind `runtime`.
pub struct AxumTransport {
    runtime: Handle,
    bind_addr: Option<SocketAddr>,
    routes: RouteTable,
    local_addr: Option<SocketAddr>,
    server: Option<JoinHandle<()>>,
}

impl AxumTransport {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            bind_addr: None,
            routes: RouteTable::new(),
            local_addr: None,
            server: None,
        }
    }

    /// Listen on `addr` instead of all interfaces on the configured port.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Address the server is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.server.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.server.take() {
            task.abort();
            info!("HTTP server stopped");
        }
        self.local_addr = None;
    }
}

impl HttpTransport for AxumTransport {
    fn start(&mut self, config: &HttpConfig) -> Result<(), TransportError> {
        if self.server.is_some() {
            return Err(TransportError::Start("already running".to_string()));
        }

        let addr = self
            .bind_addr
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], config.port)));
        let listener = TcpListener::bind(addr)
            .map_err(|e| TransportError::Start(format!("bind {addr}: {e}")))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::Start(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::Start(e.to_string()))?;

        let listener = {
            let _guard = self.runtime.enter();
            tokio::net::TcpListener::from_std(listener)
                .map_err(|e| TransportError::Start(e.to_string()))?
        };

        let app = router(self.routes.clone());
        let task = self.runtime.spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("HTTP server error: {}", e);
            }
        });

        info!("HTTP server listening on {}", local_addr);
        self.local_addr = Some(local_addr);
        self.server = Some(task);
        Ok(())
    }

    fn register(
        &mut self,
        pattern: &str,
        method: Method,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), TransportError> {
        if self.server.is_none() {
            return Err(TransportError::NotStarted);
        }
        self.routes.insert(pattern, method, handler);
        debug!("Registered {} {}", method.as_str(), pattern);
        Ok(())
    }
}

impl Drop for AxumTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use softap_core::{FilesystemMount, MountConfig, ServeError, StaticFileServer};
    use std::fs;
    use tower::ServiceExt;

    struct FailingHandler {
        chunks_before_failure: usize,
    }

    impl RequestHandler for FailingHandler {
        fn handle(&self, _uri: &str, sink: &mut dyn ResponseSink) -> Result<(), ServeError> {
            for _ in 0..self.chunks_before_failure {
                sink.send_chunk(b"partial")?;
            }
            Err(ServeError::Read(io::Error::other("bad block")))
        }
    }

    fn static_routes(dir: &tempfile::TempDir) -> RouteTable {
        let volume = crate::DirMount::new(dir.path())
            .mount(&MountConfig::default())
            .unwrap();
        let server = StaticFileServer::new(Arc::new(volume), "/spiffs");
        let routes = RouteTable::new();
        routes.insert("/*", Method::Get, Arc::new(server));
        routes
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_of(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_serves_file_with_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let page = "<p>x</p>".repeat(400);
        fs::write(dir.path().join("index.html"), &page).unwrap();

        let response = router(static_routes(&dir)).oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(body_of(response).await, page.as_bytes());
    }

    #[tokio::test]
    async fn test_query_string_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.js"), "run()").unwrap();

        let response = router(static_routes(&dir))
            .oneshot(get("/app.js?v=3"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/javascript");
        assert_eq!(body_of(response).await, b"run()");
    }

    #[tokio::test]
    async fn test_empty_file_has_empty_body() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("empty.css"), "").unwrap();

        let response = router(static_routes(&dir))
            .oneshot(get("/empty.css"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let dir = tempfile::tempdir().unwrap();

        let response = router(static_routes(&dir))
            .oneshot(get("/missing.png"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_method_and_path() {
        let routes = RouteTable::new();
        let handler = Arc::new(FailingHandler {
            chunks_before_failure: 0,
        });
        routes.insert("/static/*", Method::Get, handler);

        let post = Request::builder()
            .method("POST")
            .uri("/static/a.css")
            .body(Body::empty())
            .unwrap();
        let response = router(routes.clone()).oneshot(post).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let response = router(routes).oneshot(get("/other")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failure_before_first_chunk_is_500() {
        let routes = RouteTable::new();
        let handler = Arc::new(FailingHandler {
            chunks_before_failure: 0,
        });
        routes.insert("/*", Method::Get, handler);

        let response = router(routes).oneshot(get("/x")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_failure_mid_stream_aborts_body() {
        let routes = RouteTable::new();
        let handler = Arc::new(FailingHandler {
            chunks_before_failure: 2,
        });
        routes.insert("/*", Method::Get, handler);

        let response = router(routes).oneshot(get("/x")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await;
        assert!(body.is_err());
    }

    #[tokio::test]
    async fn test_register_requires_running_server() {
        let mut transport = AxumTransport::new(Handle::current())
            .with_bind_addr("127.0.0.1:0".parse().unwrap());
        let handler = Arc::new(FailingHandler {
            chunks_before_failure: 0,
        });

        let err = transport
            .register("/*", Method::Get, handler.clone())
            .unwrap_err();
        assert!(matches!(err, TransportError::NotStarted));

        transport.start(&HttpConfig::default()).unwrap();
        assert!(transport.local_addr().is_some());
        transport.register("/*", Method::Get, handler).unwrap();
        assert_eq!(transport.routes().len(), 1);

        assert!(transport.start(&HttpConfig::default()).is_err());

        transport.stop();
        assert!(transport.local_addr().is_none());
    }
}
