//! Remote type descriptors.
//!
//! These are the resolved, immutable descriptions of a remote procedure's
//! parameters and of every structured type they reference. Nested types are
//! shared through `Arc`, so a description can be cached and handed to several
//! calls without copying.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Remote kind tag of a parameter or field.
///
/// The numeric tags are the ones the remote schema reports. Any tag outside
/// the supported set is kept as [`RfcType::Unsupported`] so the marshaling
/// engine can name it in its error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RfcType {
    Char,
    Date,
    Bcd,
    Time,
    Byte,
    Table,
    Num,
    Float,
    Int,
    Int2,
    Int1,
    Structure,
    Decf16,
    Decf34,
    String,
    XString,
    Int8,
    UtcLong,
    Unsupported(u32),
}

impl RfcType {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => RfcType::Char,
            1 => RfcType::Date,
            2 => RfcType::Bcd,
            3 => RfcType::Time,
            4 => RfcType::Byte,
            5 => RfcType::Table,
            6 => RfcType::Num,
            7 => RfcType::Float,
            8 => RfcType::Int,
            9 => RfcType::Int2,
            10 => RfcType::Int1,
            17 => RfcType::Structure,
            23 => RfcType::Decf16,
            24 => RfcType::Decf34,
            29 => RfcType::String,
            30 => RfcType::XString,
            31 => RfcType::Int8,
            32 => RfcType::UtcLong,
            other => RfcType::Unsupported(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            RfcType::Char => 0,
            RfcType::Date => 1,
            RfcType::Bcd => 2,
            RfcType::Time => 3,
            RfcType::Byte => 4,
            RfcType::Table => 5,
            RfcType::Num => 6,
            RfcType::Float => 7,
            RfcType::Int => 8,
            RfcType::Int2 => 9,
            RfcType::Int1 => 10,
            RfcType::Structure => 17,
            RfcType::Decf16 => 23,
            RfcType::Decf34 => 24,
            RfcType::String => 29,
            RfcType::XString => 30,
            RfcType::Int8 => 31,
            RfcType::UtcLong => 32,
            RfcType::Unsupported(code) => *code,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RfcType::Char => "RFCTYPE_CHAR",
            RfcType::Date => "RFCTYPE_DATE",
            RfcType::Bcd => "RFCTYPE_BCD",
            RfcType::Time => "RFCTYPE_TIME",
            RfcType::Byte => "RFCTYPE_BYTE",
            RfcType::Table => "RFCTYPE_TABLE",
            RfcType::Num => "RFCTYPE_NUM",
            RfcType::Float => "RFCTYPE_FLOAT",
            RfcType::Int => "RFCTYPE_INT",
            RfcType::Int2 => "RFCTYPE_INT2",
            RfcType::Int1 => "RFCTYPE_INT1",
            RfcType::Structure => "RFCTYPE_STRUCTURE",
            RfcType::Decf16 => "RFCTYPE_DECF16",
            RfcType::Decf34 => "RFCTYPE_DECF34",
            RfcType::String => "RFCTYPE_STRING",
            RfcType::XString => "RFCTYPE_XSTRING",
            RfcType::Int8 => "RFCTYPE_INT8",
            RfcType::UtcLong => "RFCTYPE_UTCLONG",
            RfcType::Unsupported(_) => "RFCTYPE_UNSUPPORTED",
        }
    }

    /// Structure and table kinds carry a nested type description.
    pub fn is_complex(&self) -> bool {
        matches!(self, RfcType::Structure | RfcType::Table)
    }
}

impl fmt::Display for RfcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RfcType::Unsupported(code) => write!(f, "RFCTYPE_{}", code),
            other => f.write_str(other.as_str()),
        }
    }
}

impl Serialize for RfcType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parameter direction as seen from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Import,
    Export,
    Changing,
    Tables,
}

impl Direction {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Direction::Import),
            2 => Some(Direction::Export),
            3 => Some(Direction::Changing),
            7 => Some(Direction::Tables),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Direction::Import => 1,
            Direction::Export => 2,
            Direction::Changing => 3,
            Direction::Tables => 7,
        }
    }
}

/// A field of a structured type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescription {
    pub name: String,
    pub field_type: RfcType,
    pub nuc_length: usize,
    pub nuc_offset: usize,
    pub uc_length: usize,
    pub uc_offset: usize,
    pub decimals: usize,
    pub type_desc: Option<Arc<TypeDescription>>,
}

impl FieldDescription {
    /// Creates a field with the given byte length; offsets are assigned when the
    /// field is added to a [`TypeDescription`].
    pub fn new(name: impl Into<String>, field_type: RfcType, nuc_length: usize) -> Self {
        Self {
            name: name.into(),
            field_type,
            nuc_length,
            nuc_offset: 0,
            uc_length: uc_length_for(field_type, nuc_length),
            uc_offset: 0,
            decimals: 0,
            type_desc: None,
        }
    }

    pub fn with_decimals(mut self, decimals: usize) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn with_type(mut self, type_desc: Arc<TypeDescription>) -> Self {
        self.type_desc = Some(type_desc);
        self
    }
}

/// A structured type: an ordered list of fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDescription {
    pub name: String,
    pub nuc_length: usize,
    pub uc_length: usize,
    pub fields: Vec<FieldDescription>,
}

impl TypeDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nuc_length: 0,
            uc_length: 0,
            fields: Vec::new(),
        }
    }

    /// Appends a field, laying it out after the previous one.
    pub fn field(mut self, mut field: FieldDescription) -> Self {
        field.nuc_offset = self.nuc_length;
        field.uc_offset = self.uc_length;
        self.nuc_length += field.nuc_length;
        self.uc_length += field.uc_length;
        self.fields.push(field);
        self
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescription> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Line types of elementary tables have exactly one unnamed field.
    pub fn is_elementary_line(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].name.is_empty()
    }
}

/// A parameter of a remote procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDescription {
    pub name: String,
    pub parameter_type: RfcType,
    pub direction: Direction,
    pub nuc_length: usize,
    pub uc_length: usize,
    pub decimals: usize,
    pub default_value: String,
    pub parameter_text: String,
    pub optional: bool,
    pub type_desc: Option<Arc<TypeDescription>>,
}

impl ParameterDescription {
    pub fn new(
        name: impl Into<String>,
        parameter_type: RfcType,
        direction: Direction,
        nuc_length: usize,
    ) -> Self {
        Self {
            name: name.into(),
            parameter_type,
            direction,
            nuc_length,
            uc_length: uc_length_for(parameter_type, nuc_length),
            decimals: 0,
            default_value: String::new(),
            parameter_text: String::new(),
            optional: false,
            type_desc: None,
        }
    }

    /// A structure or table parameter; lengths are taken from the type.
    pub fn complex(
        name: impl Into<String>,
        parameter_type: RfcType,
        direction: Direction,
        type_desc: Arc<TypeDescription>,
    ) -> Self {
        Self {
            nuc_length: type_desc.nuc_length,
            uc_length: type_desc.uc_length,
            type_desc: Some(type_desc),
            ..Self::new(name, parameter_type, direction, 0)
        }
    }

    pub fn with_decimals(mut self, decimals: usize) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = default_value.into();
        self
    }

    pub fn with_text(mut self, parameter_text: impl Into<String>) -> Self {
        self.parameter_text = parameter_text.into();
        self
    }
}

/// The full parameter schema of a remote procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDescription {
    pub name: String,
    pub parameters: Vec<ParameterDescription>,
}

impl FunctionDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    pub fn parameter(mut self, parameter: ParameterDescription) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn parameter_by_name(&self, name: &str) -> Option<&ParameterDescription> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

impl fmt::Display for FunctionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FunctionDescription {}", self.name)?;
        for p in &self.parameters {
            writeln!(
                f,
                "    {} {} {:?} nuc={} uc={} dec={} optional={}",
                p.name, p.parameter_type, p.direction, p.nuc_length, p.uc_length, p.decimals, p.optional
            )?;
        }
        Ok(())
    }
}

/// Unicode length of a field: character-like kinds take two bytes per
/// character, everything else has the same size in both layouts.
fn uc_length_for(kind: RfcType, nuc_length: usize) -> usize {
    match kind {
        RfcType::Char | RfcType::Num | RfcType::Date | RfcType::Time => nuc_length * 2,
        _ => nuc_length,
    }
}
