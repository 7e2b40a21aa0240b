//! rfcbridge client: connection lifecycle and remote calls
//!
//! A [`Connection`] wraps one remote session handle obtained through a
//! [`RemoteSession`](rfcbridge_common::RemoteSession). It resolves function
//! schemas on demand, marshals dynamic [`Value`]s into invocation containers
//! and back, and can bound a call with a deadline.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rfcbridge_client::{Connection, ConnectionParameters, Value};
//! use rfcbridge_common::protocol::{Direction, FunctionDescription, ParameterDescription, RfcType};
//! use rfcbridge_common::transport::MemorySession;
//!
//! let desc = FunctionDescription::new("Z_ADD")
//!     .parameter(ParameterDescription::new("IV_A", RfcType::Int, Direction::Import, 4))
//!     .parameter(ParameterDescription::new("IV_B", RfcType::Int, Direction::Import, 4))
//!     .parameter(ParameterDescription::new("EV_SUM", RfcType::Int, Direction::Export, 4));
//! let session = Arc::new(MemorySession::new().with_function(desc, |_, c| {
//!     let sum = c.get_int("IV_A")? + c.get_int("IV_B")?;
//!     c.set_int("EV_SUM", sum)
//! }));
//!
//! let conn = Connection::open_with(session, ConnectionParameters::new().with("ashost", "10.0.0.1")).unwrap();
//! let result = conn
//!     .call("Z_ADD", Value::structure([("IV_A", Value::I32(2)), ("IV_B", Value::I32(40))]))
//!     .unwrap();
//! assert_eq!(result.get("EV_SUM"), Some(&Value::I32(42)));
//! ```

mod call;
pub mod connection;
pub mod schema;

pub use connection::{Connection, ConnectionConfig, ConnectionOptions};
pub use schema::SchemaCache;

pub use rfcbridge_common::protocol::{
    ConnectionAttributes, ConnectionParameters, ErrorInfo, Record, Result, ReturnCode, RfcError,
    Value,
};
