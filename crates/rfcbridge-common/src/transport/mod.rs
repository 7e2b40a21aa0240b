//! Remote session seam.
//!
//! The transport that actually talks to the remote endpoint is an external
//! collaborator. This module defines what rfcbridge needs from it:
//!
//! - **[`RemoteSession`]**: handle-based session operations (open, close, ping,
//!   attributes, schema lookup, invocation lifecycle, invoke, cancel)
//! - **[`DataContainer`]** / **[`Table`]**: typed accessors on the staging
//!   container of one invocation, its nested structures and its tables
//! - **[`TextCodec`]**: host text to remote text and back
//! - **[`MemorySession`]**: a complete in-process implementation used by the
//!   test suites and for wiring server handlers to clients without a network
//!
//! Remote schema descriptions arrive as raw descriptors whose names are remote
//! text and whose nested types are referenced through [`TypeHandle`]s. The
//! client resolves them into [`FunctionDescription`](crate::protocol::FunctionDescription).

pub mod codec;
pub mod memory;

mod container;


pub use codec::TextCodec;
pub use container::{MemoryContainer, MemoryTable};
pub use memory::{CallContext, FunctionHandler, MemorySession};

use crate::protocol::attributes::RawAttributes;
use crate::protocol::error::RemoteResult;
use crate::protocol::params::ConnectionParameters;
use crate::protocol::schema::FunctionDescription;

/// Opaque identifier of an open remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);

/// Opaque identifier of a remote structured type description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(pub u64);

/// Result of reading a variable-length value into a caller-sized buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The value fit; this many units were written.
    Complete(usize),
    /// The buffer was too small; the value needs this many units.
    BufferTooSmall(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawParameterDesc {
    pub name: Vec<u16>,
    pub kind: u32,
    pub direction: u32,
    pub nuc_length: usize,
    pub uc_length: usize,
    pub decimals: usize,
    pub default_value: Vec<u16>,
    pub parameter_text: Vec<u16>,
    pub optional: bool,
    pub type_handle: Option<TypeHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawFieldDesc {
    pub name: Vec<u16>,
    pub kind: u32,
    pub nuc_length: usize,
    pub nuc_offset: usize,
    pub uc_length: usize,
    pub uc_offset: usize,
    pub decimals: usize,
    pub type_handle: Option<TypeHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawTypeDesc {
    pub name: Vec<u16>,
    pub nuc_length: usize,
    pub uc_length: usize,
    pub fields: Vec<RawFieldDesc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawFunctionDesc {
    pub name: Vec<u16>,
    pub parameters: Vec<RawParameterDesc>,
}

/// Handle-based access to a remote endpoint.
///
/// Implementations must allow [`cancel`](Self::cancel) to be called from
/// another thread while [`invoke`](Self::invoke) is blocked on the same handle.
pub trait RemoteSession: Send + Sync + 'static {
    fn open(&self, params: &ConnectionParameters) -> RemoteResult<SessionHandle>;

    fn close(&self, handle: SessionHandle) -> RemoteResult<()>;

    fn ping(&self, handle: SessionHandle) -> RemoteResult<()>;

    fn attributes(&self, handle: SessionHandle) -> RemoteResult<RawAttributes>;

    /// Fails with `RFC_NOT_FOUND` when the procedure does not exist.
    fn describe_function(&self, handle: SessionHandle, name: &str) -> RemoteResult<RawFunctionDesc>;

    fn describe_type(&self, handle: SessionHandle, type_handle: TypeHandle) -> RemoteResult<RawTypeDesc>;

    /// Creates the staging container of one invocation.
    fn create_invocation(&self, description: &FunctionDescription) -> RemoteResult<Box<dyn DataContainer>>;

    /// Releases a container created by [`create_invocation`](Self::create_invocation).
    fn destroy_invocation(&self, container: Box<dyn DataContainer>);

    /// Executes the procedure the container was created for. Blocks until the
    /// remote side answers or the call is cancelled.
    fn invoke(&self, handle: SessionHandle, container: &mut dyn DataContainer) -> RemoteResult<()>;

    /// Asks the remote side to abort the call in flight on `handle`. The
    /// handle is unusable afterwards.
    fn cancel(&self, handle: SessionHandle) -> RemoteResult<()>;
}

/// Typed accessors on a parameter container, structure or table row.
///
/// Text is exchanged as remote code units (see [`TextCodec`]).
pub trait DataContainer: Send {
    /// Procedure name for invocation containers, type name otherwise.
    fn type_name(&self) -> &str;

    fn set_chars(&mut self, name: &str, value: &[u16]) -> RemoteResult<()>;
    fn set_num(&mut self, name: &str, value: &[u16]) -> RemoteResult<()>;
    fn set_string(&mut self, name: &str, value: &[u16]) -> RemoteResult<()>;
    fn set_bytes(&mut self, name: &str, value: &[u8]) -> RemoteResult<()>;
    fn set_xstring(&mut self, name: &str, value: &[u8]) -> RemoteResult<()>;
    fn set_int1(&mut self, name: &str, value: u8) -> RemoteResult<()>;
    fn set_int2(&mut self, name: &str, value: i16) -> RemoteResult<()>;
    fn set_int(&mut self, name: &str, value: i32) -> RemoteResult<()>;
    fn set_int8(&mut self, name: &str, value: i64) -> RemoteResult<()>;
    fn set_float(&mut self, name: &str, value: f64) -> RemoteResult<()>;
    fn set_date(&mut self, name: &str, value: &[u16; 8]) -> RemoteResult<()>;
    fn set_time(&mut self, name: &str, value: &[u16; 6]) -> RemoteResult<()>;

    /// Fills `buf` with the field's first `buf.len()` units.
    fn get_chars(&self, name: &str, buf: &mut [u16]) -> RemoteResult<()>;
    fn get_num(&self, name: &str, buf: &mut [u16]) -> RemoteResult<()>;
    fn get_bytes(&self, name: &str, buf: &mut [u8]) -> RemoteResult<()>;
    /// Length in units (or bytes, for binary strings) of a variable-length field.
    fn get_string_length(&self, name: &str) -> RemoteResult<usize>;
    /// Reads any text-representable field: strings, decimals, timestamps.
    fn get_string(&self, name: &str, buf: &mut [u16]) -> RemoteResult<ReadOutcome>;
    fn get_xstring(&self, name: &str, buf: &mut [u8]) -> RemoteResult<ReadOutcome>;
    fn get_int1(&self, name: &str) -> RemoteResult<u8>;
    fn get_int2(&self, name: &str) -> RemoteResult<i16>;
    fn get_int(&self, name: &str) -> RemoteResult<i32>;
    fn get_int8(&self, name: &str) -> RemoteResult<i64>;
    fn get_float(&self, name: &str) -> RemoteResult<f64>;
    fn get_date(&self, name: &str) -> RemoteResult<[u16; 8]>;
    fn get_time(&self, name: &str) -> RemoteResult<[u16; 6]>;

    fn structure(&self, name: &str) -> RemoteResult<&dyn DataContainer>;
    fn structure_mut(&mut self, name: &str) -> RemoteResult<&mut dyn DataContainer>;
    fn table(&self, name: &str) -> RemoteResult<&dyn Table>;
    fn table_mut(&mut self, name: &str) -> RemoteResult<&mut dyn Table>;
}

/// Rows of a table parameter or field.
pub trait Table: Send {
    fn row_count(&self) -> usize;

    /// Fails with `RFC_TABLE_MOVE_EOF` past the last row.
    fn row(&self, index: usize) -> RemoteResult<&dyn DataContainer>;

    /// Appends an initial row and returns it for filling.
    fn append_row(&mut self) -> RemoteResult<&mut dyn DataContainer>;
}
