use rfcbridge_common::protocol::{ErrorInfo, ReturnCode, RfcError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("No handler registered for '{0}'")]
    HandlerNotFound(String),

    #[error("Could not marshal parameters of '{function}': {source}")]
    Marshal {
        function: String,
        #[source]
        source: RfcError,
    },

    #[error("Handler for '{function}' failed: {info}")]
    Handler { function: String, info: ErrorInfo },
}

impl ServerError {
    /// The diagnostic handed back to the remote caller.
    ///
    /// Handler failures are passed through unchanged, so an application
    /// exception raised by a handler reaches the caller with its key and
    /// message variables.
    pub fn to_error_info(&self) -> ErrorInfo {
        match self {
            ServerError::HandlerNotFound(_) => {
                ErrorInfo::new(ReturnCode::NotFound, self.to_string()).with_key("FU_NOT_FOUND")
            }
            ServerError::Marshal { .. } => {
                ErrorInfo::new(ReturnCode::ConversionFailure, self.to_string())
            }
            ServerError::Handler { info, .. } => info.clone(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
