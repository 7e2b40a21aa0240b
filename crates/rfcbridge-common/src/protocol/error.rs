//! Error types shared by every rfcbridge crate.
//!
//! Errors fall into two families:
//!
//! - **Remote** ([`RemoteError`]): anything the remote session reported, always
//!   carrying the [`ErrorInfo`] diagnostic bundle.
//! - **Marshal** ([`MarshalError`]): a dynamic value did not fit the remote
//!   schema. These are raised before anything is sent to the remote side.
//!
//! [`RfcError`] wraps both, plus the lifecycle errors raised by a connection.

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

use super::schema::RfcType;

/// Return codes reported by the remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnCode {
    Ok,
    CommunicationFailure,
    LogonFailure,
    AbapRuntimeFailure,
    AbapMessage,
    AbapException,
    Closed,
    Canceled,
    Timeout,
    MemoryInsufficient,
    InvalidHandle,
    NotFound,
    IllegalState,
    InvalidParameter,
    ConversionFailure,
    BufferTooSmall,
    TableMoveEof,
    UnknownError,
}

impl ReturnCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnCode::Ok => "RFC_OK",
            ReturnCode::CommunicationFailure => "RFC_COMMUNICATION_FAILURE",
            ReturnCode::LogonFailure => "RFC_LOGON_FAILURE",
            ReturnCode::AbapRuntimeFailure => "RFC_ABAP_RUNTIME_FAILURE",
            ReturnCode::AbapMessage => "RFC_ABAP_MESSAGE",
            ReturnCode::AbapException => "RFC_ABAP_EXCEPTION",
            ReturnCode::Closed => "RFC_CLOSED",
            ReturnCode::Canceled => "RFC_CANCELED",
            ReturnCode::Timeout => "RFC_TIMEOUT",
            ReturnCode::MemoryInsufficient => "RFC_MEMORY_INSUFFICIENT",
            ReturnCode::InvalidHandle => "RFC_INVALID_HANDLE",
            ReturnCode::NotFound => "RFC_NOT_FOUND",
            ReturnCode::IllegalState => "RFC_ILLEGAL_STATE",
            ReturnCode::InvalidParameter => "RFC_INVALID_PARAMETER",
            ReturnCode::ConversionFailure => "RFC_CONVERSION_FAILURE",
            ReturnCode::BufferTooSmall => "RFC_BUFFER_TOO_SMALL",
            ReturnCode::TableMoveEof => "RFC_TABLE_MOVE_EOF",
            ReturnCode::UnknownError => "RFC_UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ReturnCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Diagnostic bundle attached to every remote failure.
///
/// Application-level exceptions raised by the remote procedure also fill in
/// the message class/type/number and the four positional message variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub code: ReturnCode,
    pub key: String,
    pub message: String,
    pub abap_msg_class: String,
    pub abap_msg_type: String,
    pub abap_msg_number: String,
    pub abap_msg_v1: String,
    pub abap_msg_v2: String,
    pub abap_msg_v3: String,
    pub abap_msg_v4: String,
}

impl ErrorInfo {
    /// Creates a diagnostic with the key defaulting to the code's name.
    pub fn new(code: ReturnCode, message: impl Into<String>) -> Self {
        Self {
            code,
            key: code.as_str().to_string(),
            message: message.into(),
            abap_msg_class: String::new(),
            abap_msg_type: String::new(),
            abap_msg_number: String::new(),
            abap_msg_v1: String::new(),
            abap_msg_v2: String::new(),
            abap_msg_v3: String::new(),
            abap_msg_v4: String::new(),
        }
    }

    /// Creates an application-level exception raised by the remote procedure.
    pub fn abap_exception(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::new(ReturnCode::AbapException, message)
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Attaches the message class, type and number of an application message.
    pub fn with_abap_message(
        mut self,
        class: impl Into<String>,
        msg_type: impl Into<String>,
        number: impl Into<String>,
    ) -> Self {
        self.abap_msg_class = class.into();
        self.abap_msg_type = msg_type.into();
        self.abap_msg_number = number.into();
        self
    }

    /// Fills the positional message variables `&1` to `&4`.
    pub fn with_message_variables(mut self, vars: [&str; 4]) -> Self {
        self.abap_msg_v1 = vars[0].to_string();
        self.abap_msg_v2 = vars[1].to_string();
        self.abap_msg_v3 = vars[2].to_string();
        self.abap_msg_v4 = vars[3].to_string();
        self
    }

    pub fn message_variables(&self) -> [&str; 4] {
        [
            &self.abap_msg_v1,
            &self.abap_msg_v2,
            &self.abap_msg_v3,
            &self.abap_msg_v4,
        ]
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}, {}, {}, {}, {}, {}, {}]",
            self.message,
            self.code,
            self.key,
            self.abap_msg_class,
            self.abap_msg_type,
            self.abap_msg_number,
            self.abap_msg_v1,
            self.abap_msg_v2,
            self.abap_msg_v3,
            self.abap_msg_v4
        )
    }
}

impl std::error::Error for ErrorInfo {}

/// Result type of every [`RemoteSession`](crate::transport::RemoteSession) call.
pub type RemoteResult<T> = std::result::Result<T, ErrorInfo>;

/// A failure reported by the remote session, with a local description of
/// the step that failed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{description} | {info}")]
pub struct RemoteError {
    pub description: String,
    pub info: ErrorInfo,
}

impl RemoteError {
    pub fn new(description: impl Into<String>, info: ErrorInfo) -> Self {
        Self {
            description: description.into(),
            info,
        }
    }
}

/// Shape mismatches between a dynamic value and the remote schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarshalError {
    #[error("{found} passed to {kind} field '{name}', expected {expected}")]
    TypeMismatch {
        name: String,
        kind: RfcType,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field '{0}' not found")]
    FieldNotFound(String),

    #[error("unknown remote type {code} for field '{name}'")]
    UnknownKind { name: String, code: u32 },

    #[error("value {value} out of range for {kind} field '{name}'")]
    ValueOutOfRange {
        name: String,
        kind: RfcType,
        value: String,
    },

    #[error("invalid {kind} value '{value}' in field '{name}': {reason}")]
    InvalidValue {
        name: String,
        kind: RfcType,
        value: String,
        reason: String,
    },

    #[error("parameters must be passed as a structure or field set, got {0}")]
    InvalidParameters(&'static str),

    #[error("text conversion failed: {0}")]
    Codec(String),
}

/// Top-level error type.
#[derive(Error, Debug)]
pub enum RfcError {
    #[error("{0}")]
    Remote(#[from] RemoteError),

    #[error("{0}")]
    Marshal(#[from] MarshalError),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error(
        "Call to '{function}' exceeded its deadline of {timeout_ms}ms{}",
        deadline_detail(.cancel, .reopen)
    )]
    DeadlineExceeded {
        function: String,
        timeout_ms: u64,
        cancel: Option<Box<RfcError>>,
        reopen: Option<Box<RfcError>>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RfcError {
    pub fn remote(description: impl Into<String>, info: ErrorInfo) -> Self {
        RfcError::Remote(RemoteError::new(description, info))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, RfcError::Remote(_))
    }

    pub fn is_marshal(&self) -> bool {
        matches!(self, RfcError::Marshal(_))
    }

    /// The remote diagnostic bundle, if this error came from the remote side.
    pub fn remote_info(&self) -> Option<&ErrorInfo> {
        match self {
            RfcError::Remote(err) => Some(&err.info),
            _ => None,
        }
    }

    /// True for a deadline error after which the connection was reopened.
    pub fn is_recovered_timeout(&self) -> bool {
        matches!(self, RfcError::DeadlineExceeded { reopen: None, .. })
    }
}

fn deadline_detail(cancel: &Option<Box<RfcError>>, reopen: &Option<Box<RfcError>>) -> String {
    let mut detail = String::new();
    if let Some(err) = cancel {
        detail.push_str(&format!("; cancel failed: {}", err));
    }
    if let Some(err) = reopen {
        detail.push_str(&format!("; reopen failed: {}", err));
    }
    detail
}

pub type Result<T> = std::result::Result<T, RfcError>;
