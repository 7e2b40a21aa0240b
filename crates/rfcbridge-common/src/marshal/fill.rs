use crate::protocol::error::{ErrorInfo, MarshalError, Result, RfcError};
use crate::protocol::schema::{FunctionDescription, RfcType, TypeDescription};
use crate::protocol::value::Value;
use crate::transport::codec::TextCodec;
use crate::transport::{DataContainer, Table};

use super::FieldRef;

/// Writes `value` into the field `field` of `container`.
///
/// `Null` leaves the field initial. Structures accept a keyed mapping, an
/// ordered field set or a bare value (which goes to the unnamed field of an
/// elementary line type); tables accept a sequence of rows, each appended and
/// filled as a structure.
///
/// # Errors
///
/// - `MarshalError::TypeMismatch` if the value's variant is not accepted by
///   the field's kind
/// - `MarshalError::ValueOutOfRange` for integers outside the kind's range
/// - `MarshalError::FieldNotFound` for a structure field missing from the type
/// - `MarshalError::UnknownKind` for a kind tag the engine does not support
/// - `RfcError::Remote` if the container rejects the value
pub fn fill(field: FieldRef<'_>, container: &mut dyn DataContainer, value: &Value) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }

    let name = field.name;
    let kind = field.kind;
    let remote = |info: ErrorInfo| {
        RfcError::remote(format!("Could not set {} field '{}'", kind, name), info)
    };

    match kind {
        RfcType::Structure => {
            let type_desc = field.nested()?;
            let structure = container.structure_mut(name).map_err(remote)?;
            fill_structure(field, type_desc, structure, value)
        }
        RfcType::Table => {
            let rows = match value {
                Value::Table(rows) => rows,
                other => return Err(mismatch(field, "a table", other)),
            };
            let type_desc = field.nested()?;
            let table = container.table_mut(name).map_err(remote)?;
            fill_table(field, type_desc, table, rows)
        }
        RfcType::Char => {
            let text = text(field, value)?;
            container.set_chars(name, &TextCodec::encode(text)).map_err(remote)
        }
        RfcType::String => {
            let text = text(field, value)?;
            container.set_string(name, &TextCodec::encode(text)).map_err(remote)
        }
        RfcType::UtcLong => {
            let text = text(field, value)?;
            container.set_string(name, &TextCodec::encode(text)).map_err(remote)
        }
        RfcType::Num => {
            let digits = match value {
                Value::Text(s) => s.clone(),
                other => match other.as_integer() {
                    Some(i) => i.to_string(),
                    None => return Err(mismatch(field, "text or an integer", other)),
                },
            };
            container.set_num(name, &TextCodec::encode(&digits)).map_err(remote)
        }
        RfcType::Byte => {
            let bytes = bytes(field, value)?;
            container.set_bytes(name, bytes).map_err(remote)
        }
        RfcType::XString => {
            let bytes = bytes(field, value)?;
            container.set_xstring(name, bytes).map_err(remote)
        }
        RfcType::Float => match value {
            Value::Float(f) => container.set_float(name, *f).map_err(remote),
            other => {
                let literal = decimal_literal(field, other)?;
                container.set_string(name, &TextCodec::encode(&literal)).map_err(remote)
            }
        },
        RfcType::Bcd | RfcType::Decf16 | RfcType::Decf34 => {
            let literal = decimal_literal(field, value)?;
            container.set_string(name, &TextCodec::encode(&literal)).map_err(remote)
        }
        RfcType::Int1 => {
            let v = u8::try_from(integer(field, value)?).map_err(|_| out_of_range(field, value))?;
            container.set_int1(name, v).map_err(remote)
        }
        RfcType::Int2 => {
            let v = i16::try_from(integer(field, value)?).map_err(|_| out_of_range(field, value))?;
            container.set_int2(name, v).map_err(remote)
        }
        RfcType::Int => {
            let v = i32::try_from(integer(field, value)?).map_err(|_| out_of_range(field, value))?;
            container.set_int(name, v).map_err(remote)
        }
        RfcType::Int8 => {
            let v = i64::try_from(integer(field, value)?).map_err(|_| out_of_range(field, value))?;
            container.set_int8(name, v).map_err(remote)
        }
        RfcType::Date => match value {
            Value::Date(date) => {
                let mut units = [0u16; 8];
                copy_units(&mut units, &date.to_digits());
                container.set_date(name, &units).map_err(remote)
            }
            other => Err(mismatch(field, "a date", other)),
        },
        RfcType::Time => match value {
            Value::Time(time) => {
                let mut units = [0u16; 6];
                copy_units(&mut units, &time.to_digits());
                container.set_time(name, &units).map_err(remote)
            }
            other => Err(mismatch(field, "a time", other)),
        },
        RfcType::Unsupported(code) => Err(MarshalError::UnknownKind {
            name: name.to_string(),
            code,
        }
        .into()),
    }
}

/// Fills every parameter named in `params` into an invocation container.
///
/// `params` must be a `Structure` or a `Fields` set keyed by parameter name;
/// `Null` stands for "no parameters". Names are checked against the
/// description before anything is written, so an unknown name leaves the
/// container untouched.
pub fn fill_parameters(
    description: &FunctionDescription,
    container: &mut dyn DataContainer,
    params: &Value,
) -> Result<()> {
    let entries: Vec<(&str, &Value)> = match params {
        Value::Null => return Ok(()),
        Value::Structure(record) => record.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        Value::Fields(fields) => fields.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        other => return Err(MarshalError::InvalidParameters(other.kind_name()).into()),
    };

    let mut resolved = Vec::with_capacity(entries.len());
    for (name, value) in entries {
        let parameter = description
            .parameter_by_name(name)
            .ok_or_else(|| MarshalError::FieldNotFound(name.to_string()))?;
        resolved.push((parameter, value));
    }

    for (parameter, value) in resolved {
        fill(FieldRef::from(parameter), container, value)?;
    }
    Ok(())
}

fn fill_structure(
    owner: FieldRef<'_>,
    type_desc: &TypeDescription,
    container: &mut dyn DataContainer,
    value: &Value,
) -> Result<()> {
    match value {
        Value::Structure(record) => {
            for (name, v) in record {
                fill_structure_field(type_desc, container, name, v)?;
            }
            Ok(())
        }
        Value::Fields(fields) => {
            for (name, v) in fields {
                fill_structure_field(type_desc, container, name, v)?;
            }
            Ok(())
        }
        bare if type_desc.is_elementary_line() => {
            fill_structure_field(type_desc, container, "", bare)
        }
        other => Err(mismatch(owner, "a structure or field set", other)),
    }
}

fn fill_structure_field(
    type_desc: &TypeDescription,
    container: &mut dyn DataContainer,
    name: &str,
    value: &Value,
) -> Result<()> {
    let field = type_desc
        .field_by_name(name)
        .ok_or_else(|| MarshalError::FieldNotFound(name.to_string()))?;
    fill(FieldRef::from(field), container, value)
}

fn fill_table(
    owner: FieldRef<'_>,
    type_desc: &TypeDescription,
    table: &mut dyn Table,
    rows: &[Value],
) -> Result<()> {
    for (index, row) in rows.iter().enumerate() {
        let line = table.append_row().map_err(|info| {
            RfcError::remote(
                format!("Could not append row {} to table of type '{}'", index, type_desc.name),
                info,
            )
        })?;
        fill_structure(owner, type_desc, line, row)?;
    }
    Ok(())
}

/// Formats a float for decimal kinds without losing precision.
///
/// Plain notation is used from 1e-5 up to 1e16; outside that range the
/// shortest round-trip mantissa is written with an uppercase exponent.
///
/// ```
/// use rfcbridge_common::marshal::format_float;
///
/// assert_eq!(format_float(-2.28), "-2.28");
/// assert_eq!(format_float(1.7976931348623157e308), "1.7976931348623157E308");
/// ```
pub fn format_float(value: f64) -> String {
    let abs = value.abs();
    if value == 0.0 || !value.is_finite() || (1e-5..1e16).contains(&abs) {
        format!("{}", value)
    } else {
        format!("{:E}", value)
    }
}

fn copy_units(dst: &mut [u16], digits: &str) {
    for (slot, unit) in dst.iter_mut().zip(digits.encode_utf16()) {
        *slot = unit;
    }
}

fn text<'v>(field: FieldRef<'_>, value: &'v Value) -> Result<&'v str> {
    value.as_str().ok_or_else(|| mismatch(field, "text", value))
}

fn bytes<'v>(field: FieldRef<'_>, value: &'v Value) -> Result<&'v [u8]> {
    value.as_bytes().ok_or_else(|| mismatch(field, "bytes", value))
}

fn integer(field: FieldRef<'_>, value: &Value) -> Result<i128> {
    value.as_integer().ok_or_else(|| mismatch(field, "an integer", value))
}

fn decimal_literal(field: FieldRef<'_>, value: &Value) -> Result<String> {
    match value {
        Value::Float(f) => Ok(format_float(*f)),
        Value::Text(s) => Ok(s.clone()),
        other => match other.as_integer() {
            Some(i) => Ok(i.to_string()),
            None => Err(mismatch(field, "a float, an integer or decimal text", other)),
        },
    }
}

fn mismatch(field: FieldRef<'_>, expected: &'static str, found: &Value) -> RfcError {
    MarshalError::TypeMismatch {
        name: field.name.to_string(),
        kind: field.kind,
        expected,
        found: found.kind_name(),
    }
    .into()
}

fn out_of_range(field: FieldRef<'_>, value: &Value) -> RfcError {
    let shown = value
        .as_integer()
        .map(|i| i.to_string())
        .unwrap_or_else(|| value.kind_name().to_string());
    MarshalError::ValueOutOfRange {
        name: field.name.to_string(),
        kind: field.kind,
        value: shown,
    }
    .into()
}
