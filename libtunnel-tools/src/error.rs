use std::io;

use thiserror::Error;

use crate::nat::ConnId;

/// Failures reported by the capture/injection boundary
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The read timeout configured on the handle expired before a frame arrived
    #[error("read timeout expired")]
    Timeout,
    /// The connection or reader was closed
    #[error("capture handle is closed")]
    Closed,
    /// Any other error reported by the capture library
    #[error("{0}")]
    Handle(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing link layer")]
    MissingLinkLayer,
    #[error("link layer type not supported")]
    UnsupportedLinkLayer,
    #[error("missing network layer")]
    MissingNetworkLayer,
    /// Carries the link layer discriminator (EtherType, or loopback address family)
    #[error("network layer type 0x{0:04x} not supported")]
    UnsupportedNetworkLayer(u16),
    #[error("missing transport layer")]
    MissingTransportLayer,
    /// Carries the IP protocol number
    #[error("transport layer type {0} not supported")]
    UnsupportedTransportLayer(u8),
    #[error("ip version {0} not supported")]
    UnsupportedIpVersion(u8),

    #[error("capture: {0}")]
    Capture(#[from] CaptureError),
    #[error("capture file: {0}")]
    File(String),
    #[error("{op}: {source}")]
    Connection {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("connection {0} is no longer registered")]
    StaleConnection(ConnId),

    #[error("configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Test if this error is a capture read timeout
    ///
    /// Orchestrators polling a connection with a finite timeout use this to tell an
    /// idle interface from a real failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Capture(CaptureError::Timeout))
    }

    /// Test if this error comes from decoding packet layers
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::MissingLinkLayer
                | Error::UnsupportedLinkLayer
                | Error::MissingNetworkLayer
                | Error::UnsupportedNetworkLayer(_)
                | Error::MissingTransportLayer
                | Error::UnsupportedTransportLayer(_)
                | Error::UnsupportedIpVersion(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_names_operation() {
        let e = Error::Connection {
            op: "send tcp packet",
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(e.to_string(), "send tcp packet: refused");
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn error_kinds() {
        assert!(Error::from(CaptureError::Timeout).is_timeout());
        assert!(!Error::from(CaptureError::Closed).is_timeout());
        assert!(Error::UnsupportedIpVersion(5).is_decode_error());
        assert_eq!(
            Error::UnsupportedNetworkLayer(0x0806).to_string(),
            "network layer type 0x0806 not supported"
        );
    }
}
