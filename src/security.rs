//! TLS security classification for portal pages

use crate::models::SecurityLevel;

/// Map the TLS outcome the rendering engine reported for a committed load
/// to the level shown in the window chrome.
///
/// Only a validation that succeeded with no error flags counts as secure.
/// Missing TLS information (a plain HTTP portal page) is insecure, never
/// unknown.
pub fn classify(tls_ok: bool, tls_error_flags: u32) -> SecurityLevel {
    if tls_ok && tls_error_flags == 0 {
        SecurityLevel::Secure
    } else {
        SecurityLevel::Insecure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_validation_is_secure() {
        assert_eq!(classify(true, 0), SecurityLevel::Secure);
    }

    #[test]
    fn test_error_flags_are_insecure() {
        assert_eq!(classify(true, 0x4), SecurityLevel::Insecure);
        assert_eq!(classify(false, 0x200), SecurityLevel::Insecure);
    }

    #[test]
    fn test_missing_tls_info_is_insecure() {
        assert_eq!(classify(false, 0), SecurityLevel::Insecure);
    }
}
