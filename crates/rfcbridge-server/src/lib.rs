//! rfcbridge server: serving remote procedures from Rust handlers
//!
//! This crate provides the server direction of rfcbridge. Procedures are
//! registered in an explicit [`HandlerRegistry`] together with their
//! function description; the registry unwraps each request into a
//! [`Record`](rfcbridge_common::Record), runs the handler, and fills the
//! response back through the same marshaling engine the client uses.

pub mod error;
pub mod registry;

pub use error::{Result, ServerError};
pub use registry::{handler_for, DispatchStats, HandlerRegistry, ServerFunction};
