//! Value marshaling engine.
//!
//! [`fill`] writes a dynamic [`Value`] into a typed container field and
//! [`unwrap`] reads one back. Both dispatch on the remote kind of the field
//! first and on the value's variant second, so every supported kind has one
//! explicit conversion in each direction.
//!
//! # Kind mapping
//!
//! | Remote kind | Accepted on fill | Produced on unwrap |
//! |-------------|------------------|--------------------|
//! | CHAR, STRING | `Text` | `Text` |
//! | NUM | `Text`, any integer | `Text` |
//! | BYTE, XSTRING | `Bytes` | `Bytes` |
//! | FLOAT | `Float`, `Text`, any integer | `Float` |
//! | BCD, DECF16, DECF34 | `Float`, `Text`, any integer | `Text` |
//! | INT1 / INT2 / INT / INT8 | any integer, range checked | `U8` / `I16` / `I32` / `I64` |
//! | DATE | `Date` | `Date`, or `Null` when unset |
//! | TIME | `Time` | `Time`, or `Null` when blank |
//! | UTCLONG | `Text` | `Text`, or `Null` when blank |
//! | STRUCTURE | `Structure`, `Fields`, bare value | `Structure` |
//! | TABLE | `Table` | `Table` |
//!
//! `Null` is accepted for every kind and leaves the field initial.

mod fill;
mod unwrap;


pub use fill::{fill, fill_parameters, format_float};
pub use unwrap::{unwrap, unwrap_parameters};

use crate::protocol::error::{Result, RfcError};
use crate::protocol::schema::{FieldDescription, ParameterDescription, RfcType, TypeDescription};

/// The parts of a parameter or structure field the engine needs.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    pub name: &'a str,
    pub kind: RfcType,
    pub nuc_length: usize,
    pub decimals: usize,
    pub type_desc: Option<&'a TypeDescription>,
}

impl<'a> FieldRef<'a> {
    /// Nested type of a structure or table field.
    fn nested(&self) -> Result<&'a TypeDescription> {
        self.type_desc.ok_or_else(|| {
            RfcError::Internal(format!(
                "{} field '{}' has no type description",
                self.kind, self.name
            ))
        })
    }
}

impl<'a> From<&'a ParameterDescription> for FieldRef<'a> {
    fn from(p: &'a ParameterDescription) -> Self {
        Self {
            name: &p.name,
            kind: p.parameter_type,
            nuc_length: p.nuc_length,
            decimals: p.decimals,
            type_desc: p.type_desc.as_deref(),
        }
    }
}

impl<'a> From<&'a FieldDescription> for FieldRef<'a> {
    fn from(f: &'a FieldDescription) -> Self {
        Self {
            name: &f.name,
            kind: f.field_type,
            nuc_length: f.nuc_length,
            decimals: f.decimals,
            type_desc: f.type_desc.as_deref(),
        }
    }
}
