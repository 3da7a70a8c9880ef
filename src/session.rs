//! One captive portal login attempt bound to a live browser surface
//!
//! A session owns the navigation state machine, the security level shown in
//! the window chrome, the surface handle, and the temporary directory the
//! surface keeps its web cache in. It consumes the surface's event stream
//! and tells its owner when the flow is over.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::decision::{DecisionEngine, NavOutcome};
use crate::models::{AuthRequest, PortalResult, SecurityLevel};
use crate::security;
use crate::surface::{PortalSurface, SurfaceError, SurfaceEvent, SurfaceFactory};
use crate::utils;

/// Why a session is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The user or the caller gave up on the login.
    UserCancelled,
    /// The flow escaped the portal.
    Completed,
}

/// What the owner must do after feeding an event to the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventReaction {
    /// Nothing to report; a navigation carried by the event may proceed.
    Allow,
    /// Block the navigation carried by the event.
    Deny,
    /// Let the navigation through, and have the caller probe connectivity.
    AllowAndRecheck,
    /// The session is over: block rendering and close it with this reason.
    Finished(CloseReason),
}

pub struct PortalSession {
    connection: String,
    original_url: String,
    engine: DecisionEngine,
    security: SecurityLevel,
    surface: Box<dyn PortalSurface>,
    cache_dir: TempDir,
    /// Hosts already granted a TLS trust exception, so a failing host is
    /// retried at most once.
    trusted_hosts: HashSet<String>,
    /// Set once the surface reported itself gone; no more commands go out.
    surface_gone: bool,
}

impl PortalSession {
    /// Provision per-session cache storage, open a surface for `request`
    /// and start the login flow on its portal URL.
    pub fn open(
        request: &AuthRequest,
        check_url: &str,
        check_host: &str,
        ratelimit_window: Duration,
        factory: &mut dyn SurfaceFactory,
    ) -> Result<Self, SurfaceError> {
        let uses_default_target = request.uses_default_target();
        let original_url = if uses_default_target {
            check_url.to_string()
        } else {
            request.url.clone()
        };

        let cache_dir = tempfile::Builder::new()
            .prefix("portal-helper-")
            .tempdir()?;

        let mut surface = factory.open(
            &request.connection,
            &original_url,
            request.timestamp,
            cache_dir.path(),
        )?;
        surface.set_security_level(SecurityLevel::NotYetDetermined);
        surface.set_subtitle(&utils::unescape_for_display(&original_url));

        tracing::info!(
            connection = %request.connection,
            url = %original_url,
            "login session started"
        );

        Ok(Self {
            engine: DecisionEngine::new(
                &original_url,
                uses_default_target,
                check_host.to_string(),
                ratelimit_window,
            ),
            connection: request.connection.clone(),
            original_url,
            security: SecurityLevel::NotYetDetermined,
            surface,
            cache_dir,
            trusted_hosts: HashSet::new(),
            surface_gone: false,
        })
    }

    /// Dispatch one event reported by the rendering engine.
    pub fn handle_event(&mut self, event: SurfaceEvent, now: Instant) -> EventReaction {
        match event {
            SurfaceEvent::LoadStarted => {
                self.set_security(SecurityLevel::NotYetDetermined);
                EventReaction::Allow
            }
            SurfaceEvent::LoadCommitted {
                tls_ok,
                tls_error_flags,
            } => {
                self.set_security(security::classify(tls_ok, tls_error_flags));
                EventReaction::Allow
            }
            SurfaceEvent::InsecureContentDetected => {
                self.set_security(SecurityLevel::Insecure);
                EventReaction::Allow
            }
            SurfaceEvent::TlsFailure { url, certificate } => {
                self.set_security(SecurityLevel::Insecure);
                self.handle_tls_failure(&url, &certificate);
                EventReaction::Allow
            }
            SurfaceEvent::NavigationRequest { url } => self.handle_navigation(&url, now),
            SurfaceEvent::NewWindowRequest { url } => {
                // The login flow stays in its single window.
                tracing::debug!(connection = %self.connection, url = %url, "blocking new window");
                EventReaction::Deny
            }
            SurfaceEvent::Closed => {
                self.surface_gone = true;
                EventReaction::Finished(CloseReason::UserCancelled)
            }
        }
    }

    fn handle_navigation(&mut self, url: &str, now: Instant) -> EventReaction {
        match self.engine.decide(url, now) {
            NavOutcome::Completed => {
                tracing::info!(connection = %self.connection, "portal released the connection");
                EventReaction::Finished(CloseReason::Completed)
            }
            outcome => {
                self.surface
                    .set_subtitle(&utils::unescape_for_display(url));
                if outcome == NavOutcome::RecheckNow {
                    EventReaction::AllowAndRecheck
                } else {
                    EventReaction::Allow
                }
            }
        }
    }

    fn handle_tls_failure(&mut self, url: &str, certificate: &str) {
        let Some(host) = utils::host_of(url) else {
            tracing::warn!(
                connection = %self.connection,
                url = %url,
                "TLS failure on a URL without a host, not retrying"
            );
            return;
        };
        if !self.trusted_hosts.insert(host.clone()) {
            tracing::warn!(
                connection = %self.connection,
                host = %host,
                "TLS failure persists after a trust exception, giving up"
            );
            return;
        }
        tracing::warn!(
            connection = %self.connection,
            host = %host,
            "TLS validation failed, retrying with a trust exception"
        );
        self.surface.allow_certificate_for_host(certificate, &host);
        self.surface.navigate(url);
    }

    fn set_security(&mut self, level: SecurityLevel) {
        self.security = level;
        self.surface.set_security_level(level);
    }

    /// Reload the original portal URL, restarting redirect detection.
    pub fn refresh(&mut self) {
        tracing::info!(connection = %self.connection, "refreshing login session");
        self.engine.reset_redirect_tracking();
        self.surface.navigate(&self.original_url);
    }

    /// Close the session and report how it ended. A recheck the rate
    /// limiter suppressed fires here instead of being lost.
    pub fn close(mut self, reason: CloseReason) -> PortalResult {
        let result = match reason {
            CloseReason::Completed => PortalResult::Completed,
            CloseReason::UserCancelled if self.engine.recheck_pending_at_close() => {
                PortalResult::Recheck
            }
            CloseReason::UserCancelled => PortalResult::Cancelled,
        };
        if !self.surface_gone {
            self.surface.close();
        }
        tracing::debug!(
            connection = %self.connection,
            cache_dir = %self.cache_dir.path().display(),
            "releasing session cache"
        );
        tracing::info!(
            connection = %self.connection,
            result = ?result,
            security = ?self.security,
            "login session closed"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::testing::{RecordingFactory, SharedLog};
    use crate::surface::SurfaceCommand;

    const CHECK_URL: &str = "http://nmcheck.gnome.org";
    const CHECK_HOST: &str = "nmcheck.gnome.org";
    const WINDOW: Duration = Duration::from_secs(30);

    fn default_session() -> (PortalSession, SharedLog) {
        let (mut factory, log) = RecordingFactory::new();
        let request = AuthRequest {
            connection: "/connection/1".to_string(),
            url: String::new(),
            timestamp: 0,
        };
        let session =
            PortalSession::open(&request, CHECK_URL, CHECK_HOST, WINDOW, &mut factory)
                .expect("recording factory never fails");
        (session, log)
    }

    #[test]
    fn test_security_resets_on_new_load() {
        let (mut session, _log) = default_session();
        let now = Instant::now();

        session.handle_event(
            SurfaceEvent::LoadCommitted {
                tls_ok: true,
                tls_error_flags: 0,
            },
            now,
        );
        assert_eq!(session.security, SecurityLevel::Secure);

        session.handle_event(SurfaceEvent::LoadStarted, now);
        assert_eq!(session.security, SecurityLevel::NotYetDetermined);
    }

    #[test]
    fn test_insecure_content_overrides_secure() {
        let (mut session, log) = default_session();
        let now = Instant::now();

        session.handle_event(
            SurfaceEvent::LoadCommitted {
                tls_ok: true,
                tls_error_flags: 0,
            },
            now,
        );
        session.handle_event(SurfaceEvent::InsecureContentDetected, now);
        assert_eq!(session.security, SecurityLevel::Insecure);

        // The chrome saw every transition.
        let levels: Vec<_> = log
            .lock().unwrap()
            .commands
            .iter()
            .filter_map(|c| match c {
                SurfaceCommand::SecurityLevel { level } => Some(*level),
                _ => None,
            })
            .collect();
        assert_eq!(
            levels,
            vec![
                SecurityLevel::NotYetDetermined,
                SecurityLevel::Secure,
                SecurityLevel::Insecure
            ]
        );
    }

    #[test]
    fn test_tls_failure_retries_once_per_host() {
        let (mut session, log) = default_session();
        let now = Instant::now();
        let failing = "https://portal.example.com/login";

        session.handle_event(
            SurfaceEvent::TlsFailure {
                url: failing.to_string(),
                certificate: "CERT".to_string(),
            },
            now,
        );
        assert_eq!(session.security, SecurityLevel::Insecure);
        {
            let log = log.lock().unwrap();
            assert!(log.commands.contains(&SurfaceCommand::AllowCertificateForHost {
                host: "portal.example.com".to_string(),
                certificate: "CERT".to_string(),
            }));
            assert!(log.commands.contains(&SurfaceCommand::Navigate {
                url: failing.to_string(),
            }));
            assert_eq!(log.count_navigations(), 1);
        }

        // A second failure for the same host is not retried again.
        session.handle_event(
            SurfaceEvent::TlsFailure {
                url: failing.to_string(),
                certificate: "CERT".to_string(),
            },
            now,
        );
        assert_eq!(log.lock().unwrap().count_navigations(), 1);
    }

    #[test]
    fn test_completed_navigation_is_denied() {
        let (mut session, _log) = default_session();
        let base = Instant::now();

        assert_eq!(
            session.handle_event(
                SurfaceEvent::NavigationRequest {
                    url: "http://portal.example.com/".to_string(),
                },
                base,
            ),
            EventReaction::AllowAndRecheck
        );
        assert_eq!(
            session.handle_event(
                SurfaceEvent::NavigationRequest {
                    url: "http://nmcheck.gnome.org/".to_string(),
                },
                base + Duration::from_secs(1),
            ),
            EventReaction::Finished(CloseReason::Completed)
        );
    }

    #[test]
    fn test_new_window_requests_are_denied() {
        let (mut session, _log) = default_session();
        assert_eq!(
            session.handle_event(
                SurfaceEvent::NewWindowRequest {
                    url: "http://ads.example.com/".to_string(),
                },
                Instant::now(),
            ),
            EventReaction::Deny
        );
    }

    #[test]
    fn test_pending_recheck_fires_at_close() {
        let (mut session, _log) = default_session();
        let base = Instant::now();

        session.handle_event(
            SurfaceEvent::NavigationRequest {
                url: "http://a.example.com/".to_string(),
            },
            base,
        );
        // Within the rate-limit window: suppressed, remembered for close.
        assert_eq!(
            session.handle_event(
                SurfaceEvent::NavigationRequest {
                    url: "http://b.example.com/".to_string(),
                },
                base + Duration::from_secs(1),
            ),
            EventReaction::Allow
        );

        assert_eq!(
            session.close(CloseReason::UserCancelled),
            PortalResult::Recheck
        );
    }

    #[test]
    fn test_plain_cancel_reports_cancelled() {
        let (session, log) = default_session();
        assert_eq!(
            session.close(CloseReason::UserCancelled),
            PortalResult::Cancelled
        );
        assert_eq!(log.lock().unwrap().open, 0);
    }

    #[test]
    fn test_refresh_reloads_original_url() {
        let (mut session, log) = default_session();
        let base = Instant::now();

        session.handle_event(
            SurfaceEvent::NavigationRequest {
                url: "http://portal.example.com/".to_string(),
            },
            base,
        );
        session.refresh();
        assert!(log.lock().unwrap().commands.contains(&SurfaceCommand::Navigate {
            url: CHECK_URL.to_string(),
        }));

        // The refreshed flow needs a fresh redirect before it can complete.
        assert_eq!(
            session.handle_event(
                SurfaceEvent::NavigationRequest {
                    url: "http://nmcheck.gnome.org/".to_string(),
                },
                base + Duration::from_secs(1),
            ),
            EventReaction::Allow
        );
    }

    #[test]
    fn test_cache_dir_released_on_close() {
        let (session, _log) = default_session();
        let path = session.cache_dir.path().to_path_buf();
        assert!(path.exists());
        session.close(CloseReason::UserCancelled);
        assert!(!path.exists());
    }
}
