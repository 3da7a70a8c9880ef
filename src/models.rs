//! Data models shared across the portal helper

use serde::{Deserialize, Serialize};

/// Result code reported to the caller when a login session ends, or when
/// connectivity should be probed again. The numeric codes are part of the
/// service contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum PortalResult {
    /// The user gave up on the login without finishing it.
    Cancelled,
    /// The flow left the portal and came back to the connectivity check host.
    Completed,
    /// The caller should re-run its connectivity check.
    Recheck,
}

impl From<PortalResult> for u32 {
    fn from(result: PortalResult) -> u32 {
        match result {
            PortalResult::Cancelled => 0,
            PortalResult::Completed => 1,
            PortalResult::Recheck => 2,
        }
    }
}

impl TryFrom<u32> for PortalResult {
    type Error = String;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(PortalResult::Cancelled),
            1 => Ok(PortalResult::Completed),
            2 => Ok(PortalResult::Recheck),
            other => Err(format!("unknown portal result code: {}", other)),
        }
    }
}

/// How securely the surface reached the page it is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// No TLS information observed yet for the current load.
    NotYetDetermined,
    /// The TLS handshake validated cleanly.
    Secure,
    /// Anything else, including plain HTTP and unknown state.
    Insecure,
}

/// One login request, as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Opaque identifier of the network connection being authenticated.
    pub connection: String,
    /// Portal URL to open; empty means the connectivity check URL.
    pub url: String,
    /// Activation hint forwarded to the window that gets opened.
    pub timestamp: u32,
}

impl AuthRequest {
    /// True when no explicit portal URL was supplied, so the session
    /// navigates the connectivity check endpoint itself and can detect
    /// login completion.
    pub fn uses_default_target(&self) -> bool {
        self.url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes_roundtrip() {
        for result in [
            PortalResult::Cancelled,
            PortalResult::Completed,
            PortalResult::Recheck,
        ] {
            assert_eq!(PortalResult::try_from(u32::from(result)), Ok(result));
        }
        assert!(PortalResult::try_from(3).is_err());
    }
}
