//! Browser surface collaborator interface
//!
//! The helper never renders anything itself. The embedding shell owns the
//! actual webview; a session drives it through `PortalSurface` commands and
//! consumes the `SurfaceEvent` stream the shell reports back.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::models::SecurityLevel;
use crate::service::ServiceSignal;

/// Events the rendering engine reports for the active surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SurfaceEvent {
    /// A new top-level load began.
    LoadStarted,
    /// A load committed, with the TLS validation outcome if there was one.
    LoadCommitted { tls_ok: bool, tls_error_flags: u32 },
    /// The page pulled in active content over an insecure channel.
    InsecureContentDetected,
    /// A load failed because certificate validation failed.
    TlsFailure { url: String, certificate: String },
    /// The engine asks whether `url` may be navigated to. It blocks on the
    /// policy answer.
    NavigationRequest { url: String },
    /// The page tried to open a new window for `url`.
    NewWindowRequest { url: String },
    /// The surface went away without the caller asking for it.
    Closed,
}

/// Commands the helper issues to the embedding shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SurfaceCommand {
    /// Open a browser window on `url`, keeping its web cache in `cache_dir`.
    Open {
        url: String,
        cache_dir: PathBuf,
        timestamp: u32,
    },
    /// Load `url` in the existing window.
    Navigate { url: String },
    /// Trust `certificate` for `host` from now on.
    AllowCertificateForHost { host: String, certificate: String },
    /// Update the security indicator in the window chrome.
    SecurityLevel { level: SecurityLevel },
    /// Update the URL shown below the window title.
    Subtitle { text: String },
    /// Tear the window down.
    Close,
}

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("failed to provision session cache directory: {0}")]
    CacheDir(#[from] std::io::Error),

    #[error("surface channel closed")]
    ChannelClosed,
}

/// Handle to one open browser window. Commands are fire-and-forget; their
/// effects come back as surface events.
pub trait PortalSurface: Send {
    fn navigate(&mut self, url: &str);
    fn allow_certificate_for_host(&mut self, certificate: &str, host: &str);
    fn set_security_level(&mut self, level: SecurityLevel);
    fn set_subtitle(&mut self, text: &str);
    fn close(&mut self);
}

/// Opens surfaces for requests reaching the front of the queue.
pub trait SurfaceFactory: Send {
    fn open(
        &mut self,
        connection: &str,
        url: &str,
        timestamp: u32,
        cache_dir: &Path,
    ) -> Result<Box<dyn PortalSurface>, SurfaceError>;
}

/// Surface that forwards every command to the embedding shell as an
/// outbound service signal tagged with the owning connection.
pub struct ChannelSurface {
    connection: String,
    signals: UnboundedSender<ServiceSignal>,
}

impl ChannelSurface {
    fn send(&mut self, command: SurfaceCommand) {
        let _ = self.signals.send(ServiceSignal::Surface {
            connection: self.connection.clone(),
            command,
        });
    }
}

impl PortalSurface for ChannelSurface {
    fn navigate(&mut self, url: &str) {
        self.send(SurfaceCommand::Navigate {
            url: url.to_string(),
        });
    }

    fn allow_certificate_for_host(&mut self, certificate: &str, host: &str) {
        self.send(SurfaceCommand::AllowCertificateForHost {
            host: host.to_string(),
            certificate: certificate.to_string(),
        });
    }

    fn set_security_level(&mut self, level: SecurityLevel) {
        self.send(SurfaceCommand::SecurityLevel { level });
    }

    fn set_subtitle(&mut self, text: &str) {
        self.send(SurfaceCommand::Subtitle {
            text: text.to_string(),
        });
    }

    fn close(&mut self) {
        self.send(SurfaceCommand::Close);
    }
}

pub struct ChannelSurfaceFactory {
    signals: UnboundedSender<ServiceSignal>,
}

impl ChannelSurfaceFactory {
    pub fn new(signals: UnboundedSender<ServiceSignal>) -> Self {
        Self { signals }
    }
}

impl SurfaceFactory for ChannelSurfaceFactory {
    fn open(
        &mut self,
        connection: &str,
        url: &str,
        timestamp: u32,
        cache_dir: &Path,
    ) -> Result<Box<dyn PortalSurface>, SurfaceError> {
        if self.signals.is_closed() {
            return Err(SurfaceError::ChannelClosed);
        }
        let mut surface = ChannelSurface {
            connection: connection.to_string(),
            signals: self.signals.clone(),
        };
        surface.send(SurfaceCommand::Open {
            url: url.to_string(),
            cache_dir: cache_dir.to_path_buf(),
            timestamp,
        });
        Ok(Box::new(surface))
    }
}
