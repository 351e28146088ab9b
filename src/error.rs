//! # Error Types
//!
//! Error vocabulary for the packet channel.
//!
//! Every failure the channel observes at the transport or codec boundary is
//! classified exactly once into a [`ChannelError`]. Above that boundary the
//! value is opaque and is never re-interpreted.
//!
//! ## Error Categories
//! - **Cancellation**: a cancelled token, or an OS "operation aborted" code
//! - **Communication**: reset/aborted connections, timeouts, other I/O failures
//! - **Protocol**: malformed frames reported by the codec
//! - **Lifecycle**: use of a channel after it was closed
//! - **Configuration**: loading or validating [`crate::config::ChannelConfig`]
//!
//! ## Example Usage
//! ```rust
//! use packet_channel::error::{classify, ChannelError};
//! use std::io;
//!
//! let reset = io::Error::from(io::ErrorKind::ConnectionReset);
//! assert!(matches!(classify(reset), ChannelError::CommunicationAborted { .. }));
//!
//! let other = io::Error::other("disk on fire");
//! assert!(matches!(classify(other), ChannelError::CommunicationFailure(_)));
//! ```

use std::borrow::Cow;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Receive path
    pub const ERR_PARTIAL_FRAME: &str = "connection aborted with a partial frame";
    pub const ERR_CONSUMED_OUT_OF_RANGE: &str = "codec reported a consumed length outside the buffer";
    pub const ERR_PACKET_TOO_LARGE: &str = "buffered packet exceeds the maximum packet size";

    /// Transport
    pub const ERR_CONNECTION_RESET: &str = "connection reset by peer";
    pub const ERR_CHANNEL_CLOSED: &str = "Channel closed";
}

/// Errors reported by a [`crate::channel::PacketChannel`].
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The operation was cancelled, either through its token or by the OS.
    #[error("Operation cancelled")]
    Cancelled,

    /// The peer or the network tore the connection down.
    #[error("Communication aborted: {reason}")]
    CommunicationAborted {
        reason: Cow<'static, str>,
        #[source]
        source: Option<io::Error>,
    },

    #[error("Communication timed out")]
    CommunicationTimedOut,

    /// The codec rejected the bytes on the wire.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Any transport failure without a more specific classification.
    #[error("Communication failure: {0}")]
    CommunicationFailure(#[source] io::Error),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChannelError {
    /// Shorthand for a [`ChannelError::CommunicationAborted`] without an I/O cause.
    pub fn aborted(reason: impl Into<Cow<'static, str>>) -> Self {
        ChannelError::CommunicationAborted {
            reason: reason.into(),
            source: None,
        }
    }

    /// Shorthand for a [`ChannelError::ProtocolViolation`].
    pub fn violation(message: impl Into<String>) -> Self {
        ChannelError::ProtocolViolation(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChannelError::Cancelled)
    }

    /// Whether this failure leaves the channel unusable.
    ///
    /// Cancellation and timeouts leave the buffered state consistent, so the
    /// caller may retry. Everything else forces a close of both directions.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            ChannelError::Cancelled
                | ChannelError::CommunicationTimedOut
                | ChannelError::ChannelClosed
                | ChannelError::Config(_)
        )
    }
}

impl From<io::Error> for ChannelError {
    fn from(error: io::Error) -> Self {
        classify(error)
    }
}

/// Type alias for Results using ChannelError
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Map a transport failure onto the channel's error vocabulary.
///
/// | observed | result |
/// |---|---|
/// | wraps a `ChannelError` | passed through unchanged |
/// | wraps another `io::Error` | the inner error is classified |
/// | OS "operation aborted" | [`ChannelError::Cancelled`] |
/// | reset, aborted, broken pipe | [`ChannelError::CommunicationAborted`] |
/// | anything else | [`ChannelError::CommunicationFailure`] |
pub fn classify(error: io::Error) -> ChannelError {
    let error = match unwrap_nested(error) {
        Ok(domain) => return domain,
        Err(error) => error,
    };

    if is_operation_aborted(&error) {
        return ChannelError::Cancelled;
    }

    match error.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => ChannelError::CommunicationAborted {
            reason: Cow::Borrowed(constants::ERR_CONNECTION_RESET),
            source: Some(error),
        },
        _ => ChannelError::CommunicationFailure(error),
    }
}

/// Peel custom `io::Error` payloads until a domain error or a plain I/O error remains.
fn unwrap_nested(error: io::Error) -> std::result::Result<ChannelError, io::Error> {
    let nested = error
        .get_ref()
        .is_some_and(|inner| inner.is::<ChannelError>() || inner.is::<io::Error>());
    if !nested {
        return Err(error);
    }

    let kind = error.kind();
    let Some(inner) = error.into_inner() else {
        return Err(io::Error::from(kind));
    };

    match inner.downcast::<ChannelError>() {
        Ok(domain) => Ok(*domain),
        Err(inner) => match inner.downcast::<io::Error>() {
            Ok(io_error) => unwrap_nested(*io_error),
            Err(other) => Err(io::Error::new(kind, other)),
        },
    }
}

#[cfg(unix)]
const OS_OPERATION_ABORTED: i32 = libc::ECANCELED;

#[cfg(windows)]
const OS_OPERATION_ABORTED: i32 = 995; // ERROR_OPERATION_ABORTED

#[cfg(any(unix, windows))]
fn is_operation_aborted(error: &io::Error) -> bool {
    error.raw_os_error() == Some(OS_OPERATION_ABORTED)
}

#[cfg(not(any(unix, windows)))]
fn is_operation_aborted(_error: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_is_aborted() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::BrokenPipe,
        ] {
            let classified = classify(io::Error::from(kind));
            assert!(
                matches!(classified, ChannelError::CommunicationAborted { source: Some(_), .. }),
                "{kind:?} classified as {classified:?}"
            );
        }
    }

    #[test]
    fn unknown_failure_keeps_its_cause() {
        let classified = classify(io::Error::new(io::ErrorKind::Other, "boom"));
        match classified {
            ChannelError::CommunicationFailure(cause) => assert_eq!(cause.to_string(), "boom"),
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn domain_error_passes_through() {
        let wrapped = io::Error::other(ChannelError::CommunicationTimedOut);
        assert!(matches!(classify(wrapped), ChannelError::CommunicationTimedOut));

        let wrapped = io::Error::other(ChannelError::violation("bad header"));
        match classify(wrapped) {
            ChannelError::ProtocolViolation(msg) => assert_eq!(msg, "bad header"),
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn nested_io_error_is_unwrapped() {
        let inner = io::Error::from(io::ErrorKind::ConnectionReset);
        let outer = io::Error::new(io::ErrorKind::Other, inner);
        assert!(matches!(
            classify(outer),
            ChannelError::CommunicationAborted { .. }
        ));
    }

    #[cfg(any(unix, windows))]
    #[test]
    fn os_abort_is_cancellation() {
        let aborted = io::Error::from_raw_os_error(OS_OPERATION_ABORTED);
        assert!(classify(aborted).is_cancelled());

        let nested = io::Error::new(
            io::ErrorKind::Other,
            io::Error::from_raw_os_error(OS_OPERATION_ABORTED),
        );
        assert!(classify(nested).is_cancelled());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_ecanceled_value() {
        assert_eq!(OS_OPERATION_ABORTED, 125);
    }

    #[cfg(target_os = "freebsd")]
    #[test]
    fn freebsd_errno_89_is_not_cancellation() {
        // EBADMSG on FreeBSD; ECANCELED is 85 there
        assert_eq!(OS_OPERATION_ABORTED, 85);
        assert!(!classify(io::Error::from_raw_os_error(89)).is_cancelled());
    }

    #[test]
    fn terminal_errors() {
        assert!(!ChannelError::Cancelled.is_terminal());
        assert!(!ChannelError::CommunicationTimedOut.is_terminal());
        assert!(ChannelError::violation("x").is_terminal());
        assert!(ChannelError::aborted("x").is_terminal());
        assert!(ChannelError::CommunicationFailure(io::Error::other("x")).is_terminal());
    }
}
