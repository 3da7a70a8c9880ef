//! FIFO queue of pending authentication requests
//!
//! At most one request owns a browser surface at a time; the rest wait in
//! arrival order. The queue drives every session lifecycle transition and
//! reports outcomes on the outbound signal channel.

use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;

use crate::config::Config;
use crate::models::{AuthRequest, PortalResult};
use crate::service::ServiceSignal;
use crate::session::{CloseReason, EventReaction, PortalSession};
use crate::surface::{SurfaceEvent, SurfaceFactory};

struct QueueEntry {
    request: AuthRequest,
    session: Option<PortalSession>,
}

pub struct SessionQueue {
    entries: Vec<QueueEntry>,
    factory: Box<dyn SurfaceFactory>,
    signals: UnboundedSender<ServiceSignal>,
    check_url: String,
    check_host: String,
    ratelimit_window: Duration,
}

impl SessionQueue {
    pub fn new(
        cfg: &Config,
        factory: Box<dyn SurfaceFactory>,
        signals: UnboundedSender<ServiceSignal>,
    ) -> Self {
        Self {
            entries: Vec::new(),
            factory,
            signals,
            check_url: cfg.connectivity.check_url(),
            check_host: cfg.connectivity.check_host.clone(),
            ratelimit_window: cfg.connectivity.recheck_ratelimit(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue a login request and activate it if it is first in line.
    ///
    /// Requests are not deduplicated: a repeated connection identifier gets
    /// its own queue entry, matching the service protocol.
    pub fn authenticate(&mut self, request: AuthRequest) {
        tracing::debug!(
            connection = %request.connection,
            queued = self.entries.len(),
            "authentication requested"
        );
        self.entries.push(QueueEntry {
            request,
            session: None,
        });
        self.advance();
    }

    /// Cancel the first entry for `connection`, active or still queued.
    /// Unknown identifiers are ignored: the caller may race with a session
    /// that already finished.
    pub fn close(&mut self, connection: &str) {
        let Some(index) = self
            .entries
            .iter()
            .position(|e| e.request.connection == connection)
        else {
            tracing::debug!(connection = %connection, "close for unknown connection");
            return;
        };
        let mut entry = self.entries.remove(index);
        if let Some(session) = entry.session.take() {
            let result = session.close(CloseReason::UserCancelled);
            self.report(connection, result);
        }
        self.advance();
    }

    /// Reload the original URL for `connection`, if it has an open surface.
    /// A request that is still queued, or unknown, is left alone.
    pub fn refresh(&mut self, connection: &str) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.request.connection == connection)
        {
            Some(entry) => {
                if let Some(session) = entry.session.as_mut() {
                    session.refresh();
                }
            }
            None => tracing::debug!(connection = %connection, "refresh for unknown connection"),
        }
    }

    /// Feed one rendering engine event to the session owning the surface.
    /// Returns whether a navigation carried by the event may proceed.
    ///
    /// Events for anything but the active connection belong to a surface
    /// being torn down and are dropped.
    pub fn handle_surface_event(
        &mut self,
        connection: &str,
        event: SurfaceEvent,
        now: Instant,
    ) -> bool {
        let Some(front) = self.entries.first_mut() else {
            tracing::debug!(connection = %connection, "surface event with no pending session");
            return false;
        };
        let is_active = front.request.connection == connection;
        let Some(session) = front.session.as_mut().filter(|_| is_active) else {
            tracing::debug!(connection = %connection, "surface event for inactive connection");
            return false;
        };

        let reaction = session.handle_event(event, now);
        match reaction {
            EventReaction::Allow => true,
            EventReaction::Deny => false,
            EventReaction::AllowAndRecheck => {
                self.report(connection, PortalResult::Recheck);
                true
            }
            EventReaction::Finished(reason) => {
                self.finish_front(reason);
                false
            }
        }
    }

    /// Close the active session, report its result and move on.
    fn finish_front(&mut self, reason: CloseReason) {
        if self.entries.is_empty() {
            return;
        }
        let mut entry = self.entries.remove(0);
        if let Some(session) = entry.session.take() {
            let result = session.close(reason);
            self.report(&entry.request.connection, result);
        }
        self.advance();
    }

    /// Ensure the front entry has an open surface. Surfaces are only ever
    /// created for the front of the queue; a failed activation cancels the
    /// entry and moves on to the next one.
    fn advance(&mut self) {
        loop {
            let Some(front) = self.entries.first_mut() else {
                return;
            };
            if front.session.is_some() {
                return;
            }
            match PortalSession::open(
                &front.request,
                &self.check_url,
                &self.check_host,
                self.ratelimit_window,
                self.factory.as_mut(),
            ) {
                Ok(session) => {
                    front.session = Some(session);
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        connection = %front.request.connection,
                        "failed to open login surface: {}",
                        e
                    );
                    let entry = self.entries.remove(0);
                    self.report(&entry.request.connection, PortalResult::Cancelled);
                }
            }
        }
    }

    fn report(&self, connection: &str, result: PortalResult) {
        let _ = self.signals.send(ServiceSignal::Done {
            connection: connection.to_string(),
            result,
        });
    }
}
