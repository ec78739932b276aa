//! Access-point lifecycle events and their dispatch.
//!
//! The access point publishes [`ApEvent`]s on a channel instead of calling a
//! registered global callback. [`EventDispatcher`] drains that channel and
//! starts the HTTP transport on the first `ApStarted`.

use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::HttpConfig;
use crate::error::TransportError;
use crate::platform::{HttpTransport, Method, RequestHandler};

/// Hardware address of a wireless station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Lifecycle events raised by the access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApEvent {
    ApStarted,
    ApStopped,
    StationJoined { mac: MacAddr, aid: u16 },
    StationLeft { mac: MacAddr, aid: u16 },
}

/// Reacts to access-point events; owns the HTTP transport.
pub struct EventDispatcher<T> {
    transport: T,
    http: HttpConfig,
    handler: Arc<dyn RequestHandler>,
    started: bool,
    registered: bool,
}

impl<T: HttpTransport> EventDispatcher<T> {
    pub fn new(transport: T, http: HttpConfig, handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            transport,
            http,
            handler,
            started: false,
            registered: false,
        }
    }

    /// Whether the transport is running with the handler registered.
    pub fn is_serving(&self) -> bool {
        self.started && self.registered
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Handle a single event.
    ///
    /// Only the first `ApStarted` starts the transport and registers the
    /// handler. Whichever step failed is retried on the next `ApStarted`; the
    /// transport is never started twice.
    pub fn dispatch(&mut self, event: &ApEvent) -> Result<(), TransportError> {
        match event {
            ApEvent::ApStarted => {
                if self.is_serving() {
                    debug!("Access point restarted, http server already running");
                    return Ok(());
                }
                self.start_http()
            }
            ApEvent::ApStopped => {
                info!("Access point stopped");
                Ok(())
            }
            ApEvent::StationJoined { mac, aid } => {
                info!("Station {} joined, AID = {}", mac, aid);
                Ok(())
            }
            ApEvent::StationLeft { mac, aid } => {
                info!("Station {} left, AID = {}", mac, aid);
                Ok(())
            }
        }
    }

    /// Dispatch events until the channel closes, then hand the transport back.
    ///
    /// Transport failures are logged; the loop keeps running so station
    /// events are still reported.
    pub fn run(mut self, events: Receiver<ApEvent>) -> T {
        for event in events {
            if let Err(e) = self.dispatch(&event) {
                error!("Failed to handle {:?}: {}", event, e);
            }
        }
        debug!("Access point event channel closed");
        self.transport
    }

    fn start_http(&mut self) -> Result<(), TransportError> {
        if !self.started {
            info!("Access point started, starting http server on port {}", self.http.port);
            self.transport.start(&self.http)?;
            self.started = true;
        }

        self.transport.register(
            &self.http.handler_pattern,
            Method::Get,
            Arc::clone(&self.handler),
        )?;
        self.registered = true;
        info!("Static file handler registered on {}", self.http.handler_pattern);
        Ok(())
    }
}
