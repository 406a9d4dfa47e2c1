//! Portable span status, derived from the gRPC status model.
//!
//! The numeric values are part of the wire contract and must not change:
//! backends compare them across SDK implementations.

use serde::{Serialize, Serializer};

/// A portable status code suitable for different transports.
///
/// The discriminants match the [gRPC status codes].
///
/// [gRPC status codes]: https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Not an error; returned on success.
    ///
    /// HTTP mapping: 200 OK
    Ok = 0,

    /// The operation was cancelled, typically by the caller.
    ///
    /// HTTP mapping: 499 Client Closed Request
    Cancelled = 1,

    /// Unknown error, e.g. a status received from another address space
    /// that belongs to an error space not known here.
    ///
    /// HTTP mapping: 500 Internal Server Error
    Unknown = 2,

    /// The client specified an invalid argument, regardless of the state
    /// of the system.
    ///
    /// HTTP mapping: 400 Bad Request
    InvalidArgument = 3,

    /// The deadline expired before the operation could complete.
    ///
    /// HTTP mapping: 504 Gateway Timeout
    DeadlineExceeded = 4,

    /// Some requested entity was not found.
    ///
    /// HTTP mapping: 404 Not Found
    NotFound = 5,

    /// The entity that a client attempted to create already exists.
    ///
    /// HTTP mapping: 409 Conflict
    AlreadyExists = 6,

    /// The caller does not have permission to execute the specified
    /// operation. Not for rejections caused by resource exhaustion, and
    /// not for unidentified callers.
    ///
    /// HTTP mapping: 403 Forbidden
    PermissionDenied = 7,

    /// Some resource has been exhausted, perhaps a per-user quota.
    ///
    /// HTTP mapping: 429 Too Many Requests
    ResourceExhausted = 8,

    /// The system is not in a state required for the operation's
    /// execution; the client should not retry until it has been fixed.
    ///
    /// HTTP mapping: 400 Bad Request
    FailedPrecondition = 9,

    /// The operation was aborted, typically due to a concurrency issue.
    ///
    /// HTTP mapping: 409 Conflict
    Aborted = 10,

    /// The operation was attempted past the valid range.
    ///
    /// HTTP mapping: 400 Bad Request
    OutOfRange = 11,

    /// The operation is not implemented or not supported in this service.
    ///
    /// HTTP mapping: 501 Not Implemented
    Unimplemented = 12,

    /// Internal errors; some invariant expected by the underlying system
    /// has been broken.
    ///
    /// HTTP mapping: 500 Internal Server Error
    Internal = 13,

    /// The service is currently unavailable, most likely transiently.
    ///
    /// HTTP mapping: 503 Service Unavailable
    Unavailable = 14,

    /// Unrecoverable data loss or corruption.
    ///
    /// HTTP mapping: 500 Internal Server Error
    DataLoss = 15,

    /// The request does not have valid authentication credentials.
    ///
    /// HTTP mapping: 401 Unauthorized
    Unauthenticated = 16,
}

impl StatusCode {
    /// Convert an HTTP status code to its portable equivalent.
    ///
    /// Total over all `i32` inputs: anything outside the mapped codes,
    /// including values outside the usual HTTP range, converts to
    /// [`StatusCode::Unknown`].
    pub fn from_http(http_status_code: i32) -> StatusCode {
        match http_status_code {
            200..=399 => StatusCode::Ok,
            400 => StatusCode::InvalidArgument,
            401 => StatusCode::Unauthenticated,
            403 => StatusCode::PermissionDenied,
            404 => StatusCode::NotFound,
            429 => StatusCode::ResourceExhausted,
            501 => StatusCode::Unimplemented,
            503 => StatusCode::Unavailable,
            504 => StatusCode::DeadlineExceeded,
            _ => StatusCode::Unknown,
        }
    }

    /// The wire value of this code.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(*self as i32)
    }
}

/// A logical error model suitable for different programming environments,
/// including REST APIs and RPC APIs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Status {
    /// The status code.
    pub code: StatusCode,
    /// A developer-facing error message, which should be in English.
    pub message: String,
}

impl Status {
    /// Create a status with an empty message.
    pub fn new(code: StatusCode) -> Self {
        Status {
            code,
            message: String::new(),
        }
    }

    /// Create a status with a developer-facing message.
    pub fn with_message(code: StatusCode, message: impl Into<String>) -> Self {
        Status {
            code,
            message: message.into(),
        }
    }
}

impl From<StatusCode> for Status {
    fn from(code: StatusCode) -> Self {
        Status::new(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range_maps_to_ok() {
        for code in 200..=399 {
            assert_eq!(StatusCode::from_http(code), StatusCode::Ok, "{code}");
        }
    }

    #[test]
    fn mapped_client_and_server_codes() {
        let cases = [
            (400, StatusCode::InvalidArgument),
            (401, StatusCode::Unauthenticated),
            (403, StatusCode::PermissionDenied),
            (404, StatusCode::NotFound),
            (429, StatusCode::ResourceExhausted),
            (501, StatusCode::Unimplemented),
            (503, StatusCode::Unavailable),
            (504, StatusCode::DeadlineExceeded),
        ];
        for (http, expected) in cases {
            assert_eq!(StatusCode::from_http(http), expected, "{http}");
        }
    }

    #[test]
    fn everything_else_is_unknown() {
        for code in [-1, 0, 100, 199, 405, 418, 499, 500, 502, 505, 600, i32::MAX, i32::MIN] {
            assert_eq!(StatusCode::from_http(code), StatusCode::Unknown, "{code}");
        }
    }

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(StatusCode::Ok.as_i32(), 0);
        assert_eq!(StatusCode::Cancelled.as_i32(), 1);
        assert_eq!(StatusCode::Unknown.as_i32(), 2);
        assert_eq!(StatusCode::InvalidArgument.as_i32(), 3);
        assert_eq!(StatusCode::DeadlineExceeded.as_i32(), 4);
        assert_eq!(StatusCode::NotFound.as_i32(), 5);
        assert_eq!(StatusCode::AlreadyExists.as_i32(), 6);
        assert_eq!(StatusCode::PermissionDenied.as_i32(), 7);
        assert_eq!(StatusCode::ResourceExhausted.as_i32(), 8);
        assert_eq!(StatusCode::FailedPrecondition.as_i32(), 9);
        assert_eq!(StatusCode::Aborted.as_i32(), 10);
        assert_eq!(StatusCode::OutOfRange.as_i32(), 11);
        assert_eq!(StatusCode::Unimplemented.as_i32(), 12);
        assert_eq!(StatusCode::Internal.as_i32(), 13);
        assert_eq!(StatusCode::Unavailable.as_i32(), 14);
        assert_eq!(StatusCode::DataLoss.as_i32(), 15);
        assert_eq!(StatusCode::Unauthenticated.as_i32(), 16);
    }
}
