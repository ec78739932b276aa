//! HTTP transport on `EspHttpServer`.
//!
//! Handlers are registered with wildcard URI matching enabled so a single
//! `/*` registration covers every path. The response head is sent with the
//! first chunk; esp-idf-svc sends the terminating chunk when the handler
//! returns.

use std::sync::Arc;

use embedded_svc::http::server::{Connection, Request, Response};
use esp_idf_svc::http::server::{Configuration, EspHttpServer};
use esp_idf_svc::http::Method as EspMethod;
use esp_idf_svc::io::Write;
use log::{debug, info, warn};

use softap_core::mime::DEFAULT_CONTENT_TYPE;
use softap_core::uri::path_of;
use softap_core::{
    HttpConfig, HttpTransport, Method, RequestHandler, ResponseSink, ServeError, SinkError,
    TransportError,
};

fn esp_method(method: Method) -> EspMethod {
    match method {
        Method::Get => EspMethod::Get,
        Method::Head => EspMethod::Head,
        Method::Post => EspMethod::Post,
        Method::Put => EspMethod::Put,
        Method::Delete => EspMethod::Delete,
    }
}

/// [`ResponseSink`] over one `EspHttpConnection` request.
struct EspSink<C: Connection> {
    content_type: &'static str,
    request: Option<Request<C>>,
    response: Option<Response<C>>,
}

impl<C: Connection> EspSink<C> {
    fn new(request: Request<C>) -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE,
            request: Some(request),
            response: None,
        }
    }

    fn response(&mut self) -> Result<&mut Response<C>, SinkError> {
        if let Some(request) = self.request.take() {
            let headers = [("Content-Type", self.content_type)];
            let response = request
                .into_response(200, None, &headers)
                .map_err(|e| SinkError::new(format!("{e:?}")))?;
            self.response = Some(response);
        }
        self.response
            .as_mut()
            .ok_or_else(|| SinkError::new("request already consumed"))
    }

    /// Answer with an empty 404 if nothing was sent yet.
    fn not_found(self) -> Result<(), ServeError> {
        if let Some(request) = self.request {
            request
                .into_status_response(404)
                .map_err(|e| SinkError::new(format!("{e:?}")))?;
        }
        Ok(())
    }
}

impl<C: Connection> ResponseSink for EspSink<C> {
    fn set_content_type(&mut self, content_type: &'static str) -> Result<(), SinkError> {
        if self.request.is_none() {
            return Err(SinkError::new("headers already sent"));
        }
        self.content_type = content_type;
        Ok(())
    }

    fn send_chunk(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        let response = self.response()?;
        if chunk.is_empty() {
            return response
                .flush()
                .map_err(|e| SinkError::new(format!("{e:?}")));
        }
        response
            .write_all(chunk)
            .map_err(|e| SinkError::new(format!("{e:?}")))
    }
}

/// [`HttpTransport`] backed by the ESP-IDF HTTP server.
#[derive(Default)]
pub struct EspTransport {
    server: Option<EspHttpServer<'static>>,
}

impl EspTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HttpTransport for EspTransport {
    fn start(&mut self, config: &HttpConfig) -> Result<(), TransportError> {
        if self.server.is_some() {
            return Err(TransportError::Start("already running".to_string()));
        }
        let server = EspHttpServer::new(&Configuration {
            http_port: config.port,
            max_open_sockets: usize::from(config.max_open_sockets),
            stack_size: config.stack_size,
            uri_match_wildcard: true,
            ..Default::default()
        })
        .map_err(|e| TransportError::Start(e.to_string()))?;

        info!("HTTP server started on port {}", config.port);
        self.server = Some(server);
        Ok(())
    }

    fn register(
        &mut self,
        pattern: &str,
        method: Method,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<(), TransportError> {
        let server = self.server.as_mut().ok_or(TransportError::NotStarted)?;
        server
            .fn_handler(pattern, esp_method(method), move |request| {
                let path = path_of(request.uri()).to_string();
                let mut sink = EspSink::new(request);
                match handler.handle(&path, &mut sink) {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_not_found() => {
                        debug!("{}: {}", path, e);
                        sink.not_found()
                    }
                    Err(e) => {
                        warn!("{}: {}", path, e);
                        Err(e)
                    }
                }
            })
            .map_err(|e| TransportError::Register {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
