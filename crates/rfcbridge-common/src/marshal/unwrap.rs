use tracing::debug;

use crate::protocol::error::{ErrorInfo, MarshalError, Result, ReturnCode, RfcError};
use crate::protocol::schema::{FunctionDescription, ParameterDescription, RfcType, TypeDescription};
use crate::protocol::value::{Date, Record, Time, Value};
use crate::transport::codec::TextCodec;
use crate::transport::{DataContainer, ReadOutcome, Table};

use super::FieldRef;

/// Position of the fractional-second separator in a UTCLONG literal.
const UTCLONG_SEPARATOR: usize = 19;

/// Initial read buffer for UTCLONG literals (`YYYY-MM-DDTHH:MM:SS,fffffff`).
const UTCLONG_CAPACITY: usize = 28;

/// Reads the field `field` of `container` into a [`Value`].
///
/// With `strip` set, trailing spaces and NULs are removed from CHAR, NUM,
/// STRING, decimal and timestamp text. Unset dates, blank times and blank
/// timestamps come back as `Value::Null`.
pub fn unwrap(field: FieldRef<'_>, container: &dyn DataContainer, strip: bool) -> Result<Value> {
    let name = field.name;
    let kind = field.kind;
    let remote = |info: ErrorInfo| {
        RfcError::remote(format!("Could not read {} field '{}'", kind, name), info)
    };

    match kind {
        RfcType::Structure => {
            let type_desc = field.nested()?;
            let structure = container.structure(name).map_err(remote)?;
            unwrap_structure(type_desc, structure, strip)
        }
        RfcType::Table => {
            let type_desc = field.nested()?;
            let table = container.table(name).map_err(remote)?;
            unwrap_table(type_desc, table, strip)
        }
        RfcType::Char => {
            let mut buf = vec![0u16; field.nuc_length];
            container.get_chars(name, &mut buf).map_err(remote)?;
            Ok(Value::Text(TextCodec::decode(&buf, field.nuc_length, strip)?))
        }
        RfcType::Num => {
            let mut buf = vec![0u16; field.nuc_length];
            container.get_num(name, &mut buf).map_err(remote)?;
            Ok(Value::Text(TextCodec::decode(&buf, field.nuc_length, strip)?))
        }
        RfcType::String => {
            let length = container.get_string_length(name).map_err(remote)?;
            let units = read_text(field, container, length + 1)?;
            Ok(Value::Text(TextCodec::decode_all(&units, strip)?))
        }
        RfcType::Byte => {
            let mut buf = vec![0u8; field.nuc_length];
            container.get_bytes(name, &mut buf).map_err(remote)?;
            Ok(Value::Bytes(buf))
        }
        RfcType::XString => {
            let length = container.get_string_length(name).map_err(remote)?;
            let mut buf = vec![0u8; length];
            match container.get_xstring(name, &mut buf).map_err(remote)? {
                ReadOutcome::Complete(written) => {
                    buf.truncate(written);
                    Ok(Value::Bytes(buf))
                }
                ReadOutcome::BufferTooSmall(required) => Err(remote(ErrorInfo::new(
                    ReturnCode::BufferTooSmall,
                    format!("{} bytes reported, {} required", length, required),
                ))),
            }
        }
        RfcType::Bcd => {
            let units = read_text(field, container, 2 * field.nuc_length + 1)?;
            Ok(Value::Text(TextCodec::decode_all(&units, strip)?))
        }
        RfcType::Decf16 | RfcType::Decf34 => {
            let units = read_text(field, container, 2 * field.nuc_length + 10)?;
            Ok(Value::Text(TextCodec::decode_all(&units, strip)?))
        }
        RfcType::Float => Ok(Value::Float(container.get_float(name).map_err(remote)?)),
        RfcType::Int1 => Ok(Value::U8(container.get_int1(name).map_err(remote)?)),
        RfcType::Int2 => Ok(Value::I16(container.get_int2(name).map_err(remote)?)),
        RfcType::Int => Ok(Value::I32(container.get_int(name).map_err(remote)?)),
        RfcType::Int8 => Ok(Value::I64(container.get_int8(name).map_err(remote)?)),
        RfcType::Date => {
            let units = container.get_date(name).map_err(remote)?;
            let digits = TextCodec::decode_all(&units, false)?;
            if digits == "00000000" || digits.trim_matches(|c| c == ' ' || c == '\0').is_empty() {
                return Ok(Value::Null);
            }
            Date::from_digits(&digits)
                .map(Value::Date)
                .ok_or_else(|| invalid(field, &digits, "not a calendar date in YYYYMMDD form"))
        }
        RfcType::Time => {
            let units = container.get_time(name).map_err(remote)?;
            let digits = TextCodec::decode_all(&units, false)?;
            if digits.trim_matches(|c| c == ' ' || c == '\0').is_empty() {
                return Ok(Value::Null);
            }
            Time::from_digits(&digits)
                .map(Value::Time)
                .ok_or_else(|| invalid(field, &digits, "not a time of day in HHMMSS form"))
        }
        RfcType::UtcLong => {
            let units = read_text(field, container, UTCLONG_CAPACITY)?;
            let literal = TextCodec::decode_all(&units, strip)?;
            timestamp(field, literal)
        }
        RfcType::Unsupported(code) => Err(MarshalError::UnknownKind {
            name: name.to_string(),
            code,
        }
        .into()),
    }
}

/// Reads the parameters selected by `include` out of an invocation container.
pub fn unwrap_parameters<F>(
    description: &FunctionDescription,
    container: &dyn DataContainer,
    strip: bool,
    include: F,
) -> Result<Record>
where
    F: Fn(&ParameterDescription) -> bool,
{
    let mut record = Record::new();
    for parameter in description.parameters.iter().filter(|p| include(p)) {
        let value = unwrap(FieldRef::from(parameter), container, strip)?;
        record.insert(parameter.name.clone(), value);
    }
    Ok(record)
}

fn unwrap_structure(type_desc: &TypeDescription, container: &dyn DataContainer, strip: bool) -> Result<Value> {
    if type_desc.is_elementary_line() {
        return unwrap(FieldRef::from(&type_desc.fields[0]), container, strip);
    }

    let mut record = Record::new();
    for field in &type_desc.fields {
        record.insert(field.name.clone(), unwrap(FieldRef::from(field), container, strip)?);
    }
    Ok(Value::Structure(record))
}

fn unwrap_table(type_desc: &TypeDescription, table: &dyn Table, strip: bool) -> Result<Value> {
    let mut rows = Vec::with_capacity(table.row_count());
    for index in 0..table.row_count() {
        let line = table.row(index).map_err(|info| {
            RfcError::remote(
                format!("Could not read row {} of table of type '{}'", index, type_desc.name),
                info,
            )
        })?;
        rows.push(unwrap_structure(type_desc, line, strip)?);
    }
    Ok(Value::Table(rows))
}

/// Reads a text-representable field, growing the buffer once if the
/// container reports that it needs more room.
fn read_text(field: FieldRef<'_>, container: &dyn DataContainer, capacity: usize) -> Result<Vec<u16>> {
    let remote = |info: ErrorInfo| {
        RfcError::remote(format!("Could not read {} field '{}'", field.kind, field.name), info)
    };

    let mut buf = vec![0u16; capacity];
    match container.get_string(field.name, &mut buf).map_err(remote)? {
        ReadOutcome::Complete(written) => {
            buf.truncate(written);
            Ok(buf)
        }
        ReadOutcome::BufferTooSmall(required) => {
            debug!(
                "Buffer of {} units too small for {} field '{}', retrying with {}",
                capacity, field.kind, field.name, required + 1
            );
            let mut buf = vec![0u16; required + 1];
            match container.get_string(field.name, &mut buf).map_err(remote)? {
                ReadOutcome::Complete(written) => {
                    buf.truncate(written);
                    Ok(buf)
                }
                ReadOutcome::BufferTooSmall(again) => Err(remote(ErrorInfo::new(
                    ReturnCode::BufferTooSmall,
                    format!("{} units still required after growing the buffer", again),
                ))),
            }
        }
    }
}

/// Normalizes a UTCLONG literal: the fractional-second separator at position
/// 19 is reported as ',' and handed to callers as '.'.
fn timestamp(field: FieldRef<'_>, literal: String) -> Result<Value> {
    if literal.trim_matches(|c| c == ' ' || c == '\0').is_empty() {
        return Ok(Value::Null);
    }

    let separator = literal.as_bytes().get(UTCLONG_SEPARATOR).copied();
    match separator {
        Some(b',') | Some(b'.') => Ok(Value::Text(format!(
            "{}.{}",
            &literal[..UTCLONG_SEPARATOR],
            &literal[UTCLONG_SEPARATOR + 1..]
        ))),
        _ => Err(invalid(
            field,
            &literal,
            "expected ',' or '.' before the fractional seconds at position 19",
        )),
    }
}

fn invalid(field: FieldRef<'_>, value: &str, reason: &str) -> RfcError {
    MarshalError::InvalidValue {
        name: field.name.to_string(),
        kind: field.kind,
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
