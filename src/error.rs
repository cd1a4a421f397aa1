// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// IPC error codes, their message table, and the error type returned by
// every transport and by the dispatcher.

use std::fmt;
use std::io;

/// Error codes shared by every IPC layer.
///
/// The dispatcher records the code of the last operation in the transport
/// context (`TransportContext::last_error`), so callers can inspect it the
/// same way regardless of the transport in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ErrorCode {
    #[default]
    Ok = 0,
    /// Malformed or missing request.
    InvalidRequest,
    /// Malformed or missing response.
    InvalidResponse,
    /// Transport not implemented.
    Unimplemented,
    /// Copy into or out of a buffer failed (short buffer, overrun).
    MemoryError,
    /// A server tried to send a request.
    ErrSrvRequest,
    /// A server tried to receive a response.
    ErrSrvResponse,
    /// A client tried to send a response.
    ErrCliResponse,
    /// A client tried to receive a request.
    ErrCliRequest,
    /// Invalid or uninitialised transport context.
    InvalidIpcPacket,
    /// Unknown transport selector.
    UnsupportedIpc,
    /// An underlying system call failed.
    SystemError,
    /// A blocking operation was interrupted by a caught signal.
    Interrupted,
    /// The semaphore set was removed by the other side.
    Removed,
    /// A receive timed out.
    TimedOut,
    /// The peer closed the connection.
    Disconnected,
}

impl ErrorCode {
    /// Human-readable message for this code.
    pub fn message(self) -> &'static str {
        match self {
            Self::Ok => "No error",
            Self::InvalidRequest => "Malformed or missing request",
            Self::InvalidResponse => "Malformed or missing response",
            Self::Unimplemented => "Not implemented yet",
            Self::MemoryError => "Memory copy error",
            Self::ErrSrvRequest => {
                "Detected request coming from the server. Only clients are allowed to send requests"
            }
            Self::ErrSrvResponse => "The server is not allowed to receive responses",
            Self::ErrCliResponse => {
                "Attempt to send a response from a client. Only the server is allowed to send responses"
            }
            Self::ErrCliRequest => "A client is not allowed to receive requests",
            Self::InvalidIpcPacket => "Invalid or uninitialised IPC context",
            Self::UnsupportedIpc => {
                "Unsupported IPC method. Supported methods are SHMEM, SOCKETS, NPIPES, and MSGQ"
            }
            Self::SystemError => "System call failed",
            Self::Interrupted => "Interrupted by a signal",
            Self::Removed => "Semaphore set was destroyed at the other end",
            Self::TimedOut => "Timed out",
            Self::Disconnected => "Peer closed the connection",
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Error returned by transports and the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("{0}")]
    Protocol(ErrorCode),
    #[error("{op}: {source}")]
    Os {
        op: &'static str,
        code: ErrorCode,
        #[source]
        source: io::Error,
    },
}

impl IpcError {
    /// Wrap an OS error, classifying interruptions and timeouts.
    pub fn os(op: &'static str, source: io::Error) -> Self {
        let code = match source.kind() {
            io::ErrorKind::Interrupted => ErrorCode::Interrupted,
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ErrorCode::TimedOut,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe => ErrorCode::Disconnected,
            _ => ErrorCode::SystemError,
        };
        Self::Os { op, code, source }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Protocol(code) => *code,
            Self::Os { code, .. } => *code,
        }
    }
}

impl From<ErrorCode> for IpcError {
    fn from(code: ErrorCode) -> Self {
        Self::Protocol(code)
    }
}

/// Log a failed IPC operation as `[code] op: message`.
pub fn report(op: &str, err: &IpcError) {
    tracing::error!(code = err.code().as_i32(), "[{}] {op}: {err}", err.code().as_i32());
}

/// Report an unrecoverable setup failure and terminate the process with status 1.
pub fn fatal(op: &str, err: &dyn fmt::Display) -> ! {
    tracing::error!("{op}: {err}");
    eprintln!("{op}: {err}");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Ok.as_i32(), 0);
        assert_eq!(ErrorCode::ErrCliRequest.as_i32(), 8);
        assert_eq!(ErrorCode::UnsupportedIpc.as_i32(), 10);
    }

    #[test]
    fn os_errors_are_classified() {
        let e = IpcError::os("recv", io::Error::from(io::ErrorKind::Interrupted));
        assert_eq!(e.code(), ErrorCode::Interrupted);
        let e = IpcError::os("recv", io::Error::from(io::ErrorKind::UnexpectedEof));
        assert_eq!(e.code(), ErrorCode::Disconnected);
        let e = IpcError::os("recv", io::Error::from(io::ErrorKind::WouldBlock));
        assert_eq!(e.code(), ErrorCode::TimedOut);
        let e = IpcError::os("shmat", io::Error::from_raw_os_error(libc::ENOMEM));
        assert_eq!(e.code(), ErrorCode::SystemError);
    }

    #[test]
    fn protocol_error_displays_table_message() {
        let e = IpcError::from(ErrorCode::Unimplemented);
        assert_eq!(e.to_string(), "Not implemented yet");
    }
}
