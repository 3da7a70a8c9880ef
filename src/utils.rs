//! URL helpers

use std::borrow::Cow;
use url::Url;

/// Host authority of `url`, if it parses and carries one.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_owned)
}

/// Percent-decoded form of `url` for display in the window subtitle.
/// Falls back to the raw string when the escapes are not valid UTF-8.
pub fn unescape_for_display(url: &str) -> String {
    urlencoding::decode(url)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| url.to_owned())
}
