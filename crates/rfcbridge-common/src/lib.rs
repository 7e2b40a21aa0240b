//! rfcbridge common types, remote session seam and marshaling engine
//!
//! This crate holds everything the client and server crates share:
//!
//! - **Protocol layer** ([`protocol`]): the dynamic [`Value`] model, remote
//!   type descriptors, connection parameters and attributes, and errors
//! - **Transport seam** ([`transport`]): the [`RemoteSession`] /
//!   [`DataContainer`] traits the remote runtime is consumed through, the
//!   [`TextCodec`], and the in-process [`MemorySession`]
//! - **Marshaling engine** ([`marshal`]): [`fill`] and [`unwrap`], converting
//!   dynamic values to typed container fields and back
//!
//! # Example
//!
//! ```
//! use rfcbridge_common::{Value, Date};
//!
//! let params = Value::structure([
//!     ("IMPORTSTRUCT", Value::structure([
//!         ("RFCINT4", Value::I32(42)),
//!         ("RFCDATE", Value::Date(Date::new(2024, 2, 29).unwrap())),
//!     ])),
//! ]);
//! assert_eq!(params.get("IMPORTSTRUCT").and_then(|s| s.get("RFCINT4")), Some(&Value::I32(42)));
//! ```

pub mod marshal;
pub mod protocol;
pub mod transport;

pub use marshal::{fill, unwrap, FieldRef};
pub use protocol::*;
pub use transport::{DataContainer, MemorySession, ReadOutcome, RemoteSession, SessionHandle, Table, TextCodec};
