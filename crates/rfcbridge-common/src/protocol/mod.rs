pub mod attributes;
pub mod error;
pub mod params;
pub mod schema;
pub mod value;

#[cfg(test)]
mod tests;

pub use attributes::{Attribute, ConnectionAttributes, RawAttributes};
pub use error::{ErrorInfo, MarshalError, RemoteError, RemoteResult, Result, ReturnCode, RfcError};
pub use params::ConnectionParameters;
pub use schema::{Direction, FieldDescription, FunctionDescription, ParameterDescription, RfcType, TypeDescription};
pub use value::{Date, Record, Time, Value};
