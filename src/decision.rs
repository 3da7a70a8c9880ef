//! Redirect tracking and portal completion detection
//!
//! Captive portals bounce the client through arbitrary chains of redirects
//! before releasing it to the real network. This module watches the hosts a
//! session navigates through and decides, for every navigation the surface
//! asks about, whether the flow is still inside the portal, has escaped it,
//! or is ambiguous enough that the caller should probe connectivity again.

use std::time::{Duration, Instant};

use crate::utils;

/// What to do with one intercepted navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    /// Navigation is internal to the flow being tracked; let it through.
    Proceed,
    /// The flow went away from the check host and came back: the portal
    /// has released us. The navigation must not be rendered.
    Completed,
    /// Let the navigation through and have the caller probe connectivity.
    RecheckNow,
    /// Same, but a probe fired recently; remember to probe at close instead.
    RecheckSuppressed,
}

/// Per-session navigation state machine.
#[derive(Debug)]
pub struct DecisionEngine {
    check_host: String,
    ratelimit_window: Duration,
    uses_default_target: bool,
    /// Host of the last navigation that was allowed, so chained redirects
    /// within one portal page read as internal moves. `None` when the URL
    /// had no parseable host.
    current_host: Option<String>,
    ever_seen_redirect: bool,
    last_recheck: Option<Instant>,
    recheck_pending_at_close: bool,
}

impl DecisionEngine {
    pub fn new(
        original_url: &str,
        uses_default_target: bool,
        check_host: String,
        ratelimit_window: Duration,
    ) -> Self {
        Self {
            check_host,
            ratelimit_window,
            uses_default_target,
            current_host: utils::host_of(original_url),
            ever_seen_redirect: false,
            last_recheck: None,
            recheck_pending_at_close: false,
        }
    }

    /// Classify one navigation attempt before the surface acts on it.
    pub fn decide(&mut self, navigation_url: &str, now: Instant) -> NavOutcome {
        let nav_host = utils::host_of(navigation_url);

        // Navigations within the host we are already tracking are part of
        // the current page flow and carry no new information.
        if nav_host == self.current_host {
            return NavOutcome::Proceed;
        }

        if self.uses_default_target {
            match nav_host.as_deref() {
                // Back at the check host after having left it. The check
                // endpoint only redirects away while the portal still holds
                // us, so returning means the network is open.
                Some(host) if host == self.check_host && self.ever_seen_redirect => {
                    return NavOutcome::Completed;
                }
                Some(host) if host == self.check_host => {}
                // Anywhere else counts as the portal taking over.
                _ => self.ever_seen_redirect = true,
            }
        }

        // We *may* be done at this point, but cannot tell for sure, so the
        // caller gets asked to probe connectivity. Portals with ten or more
        // internal redirects exist, so the probes are rate limited; a
        // suppressed probe is re-queued for session close so the final
        // state is never missed.
        let outcome = if self.recheck_is_due(now) {
            self.last_recheck = Some(now);
            self.recheck_pending_at_close = false;
            NavOutcome::RecheckNow
        } else {
            self.recheck_pending_at_close = true;
            NavOutcome::RecheckSuppressed
        };

        // Keep following the chain so the next hop within this host is
        // recognized as internal.
        self.current_host = nav_host;

        outcome
    }

    fn recheck_is_due(&self, now: Instant) -> bool {
        match self.last_recheck {
            Some(at) => now.duration_since(at) > self.ratelimit_window,
            None => true,
        }
    }

    /// Forget any redirect seen so far. Used when the session reloads its
    /// original URL and the flow starts over.
    pub fn reset_redirect_tracking(&mut self) {
        self.ever_seen_redirect = false;
    }

    /// True when a rate-limited recheck never got to fire.
    pub fn recheck_pending_at_close(&self) -> bool {
        self.recheck_pending_at_close
    }
}
