//! Request dispatch loop binding the session queue to the service wire
//!
//! All queue mutations and session state updates happen here, one request
//! at a time, so the core needs no locking. The loop also implements the
//! idle shutdown: with nothing queued and no request arriving for the
//! configured timeout, the helper exits and lets the caller restart it on
//! demand.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::config::Config;
use crate::models::{AuthRequest, PortalResult};
use crate::queue::SessionQueue;
use crate::surface::{SurfaceCommand, SurfaceEvent, SurfaceFactory};

/// Calls the helper accepts, one JSON object per line on stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum ServiceRequest {
    /// Open (or queue) a login session for a connection.
    Authenticate {
        connection: String,
        #[serde(default)]
        url: String,
        #[serde(default)]
        timestamp: u32,
    },
    /// Cancel the login session for a connection.
    Close { connection: String },
    /// Reload the active session for a connection.
    Refresh { connection: String },
    /// An event the embedding shell observed on a browser surface.
    SurfaceEvent {
        connection: String,
        event: SurfaceEvent,
    },
}

/// Notifications the helper emits, one JSON object per line on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "kebab-case")]
pub enum ServiceSignal {
    /// A session finished, or connectivity should be probed again.
    Done {
        connection: String,
        result: PortalResult,
    },
    /// Answer to a navigation or new-window request; the engine blocks on it.
    NavigationPolicy { connection: String, allow: bool },
    /// Command for the browser surface owned by `connection`.
    Surface {
        connection: String,
        command: SurfaceCommand,
    },
}

pub struct PortalService {
    queue: SessionQueue,
    signals: UnboundedSender<ServiceSignal>,
    inactivity_timeout: std::time::Duration,
}

impl PortalService {
    pub fn new(
        cfg: &Config,
        factory: Box<dyn SurfaceFactory>,
        signals: UnboundedSender<ServiceSignal>,
    ) -> Self {
        Self {
            queue: SessionQueue::new(cfg, factory, signals.clone()),
            signals,
            inactivity_timeout: cfg.service.inactivity_timeout(),
        }
    }

    /// Serve requests until the transport closes, or until the helper sat
    /// idle with no pending session for the configured timeout.
    pub async fn run(mut self, mut requests: UnboundedReceiver<ServiceRequest>) {
        loop {
            let request = if self.queue.is_empty() {
                match tokio::time::timeout(self.inactivity_timeout, requests.recv()).await {
                    Ok(Some(request)) => request,
                    Ok(None) => break,
                    Err(_) => {
                        tracing::info!(
                            timeout = ?self.inactivity_timeout,
                            "no pending session, shutting down"
                        );
                        break;
                    }
                }
            } else {
                match requests.recv().await {
                    Some(request) => request,
                    None => break,
                }
            };
            self.dispatch(request);
        }
    }

    fn dispatch(&mut self, request: ServiceRequest) {
        match request {
            ServiceRequest::Authenticate {
                connection,
                url,
                timestamp,
            } => {
                self.queue.authenticate(AuthRequest {
                    connection,
                    url,
                    timestamp,
                });
            }
            ServiceRequest::Close { connection } => self.queue.close(&connection),
            ServiceRequest::Refresh { connection } => self.queue.refresh(&connection),
            ServiceRequest::SurfaceEvent { connection, event } => {
                let wants_reply = matches!(
                    event,
                    SurfaceEvent::NavigationRequest { .. } | SurfaceEvent::NewWindowRequest { .. }
                );
                let allow = self
                    .queue
                    .handle_surface_event(&connection, event, Instant::now());
                if wants_reply {
                    let _ = self
                        .signals
                        .send(ServiceSignal::NavigationPolicy { connection, allow });
                }
            }
        }
    }
}
