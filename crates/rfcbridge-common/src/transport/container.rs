//! Typed storage behind [`MemorySession`](super::MemorySession) invocations.

use std::sync::Arc;

use crate::protocol::error::{ErrorInfo, RemoteResult, ReturnCode};
use crate::protocol::schema::{FunctionDescription, RfcType, TypeDescription};

use super::{DataContainer, ReadOutcome, Table};

const SPACE: u16 = b' ' as u16;
const ZERO: u16 = b'0' as u16;

/// Initial value of an unset UTCLONG field.
const UTCLONG_INITIAL: &str = "0000-00-00T00:00:00,0000000";

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Chars(Vec<u16>),
    Num(Vec<u16>),
    Bytes(Vec<u8>),
    Text(Vec<u16>),
    XString(Vec<u8>),
    Int1(u8),
    Int2(i16),
    Int(i32),
    Int8(i64),
    Float(f64),
    Date([u16; 8]),
    Time([u16; 6]),
    Structure(MemoryContainer),
    Table(MemoryTable),
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    kind: RfcType,
    length: usize,
    decimals: usize,
    cell: Cell,
}

impl Slot {
    fn new(kind: RfcType, length: usize, decimals: usize, type_desc: Option<&Arc<TypeDescription>>) -> Self {
        let line_type = || {
            type_desc
                .cloned()
                .unwrap_or_else(|| Arc::new(TypeDescription::new("")))
        };
        let cell = match kind {
            RfcType::Char => Cell::Chars(vec![SPACE; length]),
            RfcType::Num => Cell::Num(vec![ZERO; length]),
            RfcType::Byte => Cell::Bytes(vec![0; length]),
            RfcType::String => Cell::Text(Vec::new()),
            RfcType::Bcd | RfcType::Decf16 | RfcType::Decf34 => Cell::Text(vec![ZERO]),
            RfcType::UtcLong => Cell::Text(UTCLONG_INITIAL.encode_utf16().collect()),
            RfcType::XString => Cell::XString(Vec::new()),
            RfcType::Int1 => Cell::Int1(0),
            RfcType::Int2 => Cell::Int2(0),
            RfcType::Int => Cell::Int(0),
            RfcType::Int8 => Cell::Int8(0),
            RfcType::Float => Cell::Float(0.0),
            RfcType::Date => Cell::Date([ZERO; 8]),
            RfcType::Time => Cell::Time([ZERO; 6]),
            RfcType::Structure => Cell::Structure(MemoryContainer::for_type(&line_type())),
            RfcType::Table => Cell::Table(MemoryTable::new(line_type())),
            RfcType::Unsupported(_) => Cell::Unsupported,
        };
        Self {
            kind,
            length,
            decimals,
            cell,
        }
    }

    /// Text form of the cell, if it has one.
    fn text(&self) -> Option<Vec<u16>> {
        match &self.cell {
            Cell::Chars(units) | Cell::Num(units) | Cell::Text(units) => Some(units.clone()),
            Cell::Date(units) => Some(units.to_vec()),
            Cell::Time(units) => Some(units.to_vec()),
            Cell::Int1(v) => Some(v.to_string().encode_utf16().collect()),
            Cell::Int2(v) => Some(v.to_string().encode_utf16().collect()),
            Cell::Int(v) => Some(v.to_string().encode_utf16().collect()),
            Cell::Int8(v) => Some(v.to_string().encode_utf16().collect()),
            Cell::Float(v) => Some(format!("{:E}", v).encode_utf16().collect()),
            _ => None,
        }
    }
}

/// Parameter container, structure or table row of the in-memory backend.
///
/// Cells are created from the descriptors with their initial values: CHAR
/// padded with spaces, NUM with zeros, BYTE zero-filled, DATE `00000000` and
/// TIME `000000`. Setters enforce the declared lengths the way the remote side
/// does and fail with `RFC_CONVERSION_FAILURE` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryContainer {
    type_name: String,
    slots: Vec<(String, Slot)>,
}

impl MemoryContainer {
    /// Container with one cell per parameter of `description`.
    pub fn for_function(description: &FunctionDescription) -> Self {
        let slots = description
            .parameters
            .iter()
            .map(|p| {
                let slot = Slot::new(p.parameter_type, p.nuc_length, p.decimals, p.type_desc.as_ref());
                (p.name.clone(), slot)
            })
            .collect();
        Self {
            type_name: description.name.clone(),
            slots,
        }
    }

    /// Container with one cell per field of `type_desc`.
    pub fn for_type(type_desc: &TypeDescription) -> Self {
        let slots = type_desc
            .fields
            .iter()
            .map(|f| {
                let slot = Slot::new(f.field_type, f.nuc_length, f.decimals, f.type_desc.as_ref());
                (f.name.clone(), slot)
            })
            .collect();
        Self {
            type_name: type_desc.name.clone(),
            slots,
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(name, _)| name.as_str())
    }

    fn slot(&self, name: &str) -> RemoteResult<&Slot> {
        self.slots
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, slot)| slot)
            .ok_or_else(|| self.not_found(name))
    }

    fn slot_mut(&mut self, name: &str) -> RemoteResult<&mut Slot> {
        let position = self.slots.iter().position(|(n, _)| n == name);
        match position {
            Some(index) => Ok(&mut self.slots[index].1),
            None => Err(self.not_found(name)),
        }
    }

    fn not_found(&self, name: &str) -> ErrorInfo {
        ErrorInfo::new(
            ReturnCode::InvalidParameter,
            format!("field '{}' not found in '{}'", name, self.type_name),
        )
    }

    fn write_text(&mut self, name: &str, value: &[u16]) -> RemoteResult<()> {
        let slot = self.slot_mut(name)?;
        let length = slot.length;
        match (&mut slot.cell, slot.kind) {
            (Cell::Chars(units), _) => {
                if value.len() > length {
                    return Err(too_long(name, value.len(), length));
                }
                units.clear();
                units.extend_from_slice(value);
                units.resize(length, SPACE);
                Ok(())
            }
            (Cell::Num(units), _) => {
                if !value.iter().all(|u| (ZERO..=ZERO + 9).contains(u)) {
                    return Err(conversion(name, "NUM fields take digits only"));
                }
                if value.len() > length {
                    return Err(too_long(name, value.len(), length));
                }
                units.clear();
                units.resize(length - value.len(), ZERO);
                units.extend_from_slice(value);
                Ok(())
            }
            (Cell::Text(units), RfcType::String) => {
                *units = value.to_vec();
                Ok(())
            }
            (Cell::Text(units), RfcType::Bcd) => {
                let literal = decode(name, value)?;
                let normalized = normalize_packed(name, &literal, slot.length, slot.decimals)?;
                *units = normalized.encode_utf16().collect();
                Ok(())
            }
            (Cell::Text(units), RfcType::Decf16 | RfcType::Decf34) => {
                let literal = decode(name, value)?;
                if !is_decimal_literal(&literal, true) {
                    return Err(conversion(name, &format!("'{}' is not a decimal number", literal)));
                }
                *units = literal.encode_utf16().collect();
                Ok(())
            }
            (Cell::Text(units), RfcType::UtcLong) => {
                let literal = decode(name, value)?;
                *units = normalize_timestamp(name, &literal)?.encode_utf16().collect();
                Ok(())
            }
            (Cell::Float(f), _) => {
                let literal = decode(name, value)?;
                *f = literal
                    .trim()
                    .parse()
                    .map_err(|_| conversion(name, &format!("'{}' is not a float", literal)))?;
                Ok(())
            }
            _ => Err(wrong_kind(name, slot.kind, "text")),
        }
    }
}

impl DataContainer for MemoryContainer {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn set_chars(&mut self, name: &str, value: &[u16]) -> RemoteResult<()> {
        self.write_text(name, value)
    }

    fn set_num(&mut self, name: &str, value: &[u16]) -> RemoteResult<()> {
        self.write_text(name, value)
    }

    fn set_string(&mut self, name: &str, value: &[u16]) -> RemoteResult<()> {
        self.write_text(name, value)
    }

    fn set_bytes(&mut self, name: &str, value: &[u8]) -> RemoteResult<()> {
        let slot = self.slot_mut(name)?;
        let length = slot.length;
        match &mut slot.cell {
            Cell::Bytes(bytes) => {
                if value.len() > length {
                    return Err(too_long(name, value.len(), length));
                }
                bytes.clear();
                bytes.extend_from_slice(value);
                bytes.resize(length, 0);
                Ok(())
            }
            Cell::XString(bytes) => {
                *bytes = value.to_vec();
                Ok(())
            }
            _ => Err(wrong_kind(name, slot.kind, "bytes")),
        }
    }

    fn set_xstring(&mut self, name: &str, value: &[u8]) -> RemoteResult<()> {
        self.set_bytes(name, value)
    }

    fn set_int1(&mut self, name: &str, value: u8) -> RemoteResult<()> {
        let slot = self.slot_mut(name)?;
        match &mut slot.cell {
            Cell::Int1(v) => *v = value,
            _ => return Err(wrong_kind(name, slot.kind, "INT1")),
        }
        Ok(())
    }

    fn set_int2(&mut self, name: &str, value: i16) -> RemoteResult<()> {
        let slot = self.slot_mut(name)?;
        match &mut slot.cell {
            Cell::Int2(v) => *v = value,
            _ => return Err(wrong_kind(name, slot.kind, "INT2")),
        }
        Ok(())
    }

    fn set_int(&mut self, name: &str, value: i32) -> RemoteResult<()> {
        let slot = self.slot_mut(name)?;
        match &mut slot.cell {
            Cell::Int(v) => *v = value,
            _ => return Err(wrong_kind(name, slot.kind, "INT")),
        }
        Ok(())
    }

    fn set_int8(&mut self, name: &str, value: i64) -> RemoteResult<()> {
        let slot = self.slot_mut(name)?;
        match &mut slot.cell {
            Cell::Int8(v) => *v = value,
            _ => return Err(wrong_kind(name, slot.kind, "INT8")),
        }
        Ok(())
    }

    fn set_float(&mut self, name: &str, value: f64) -> RemoteResult<()> {
        let slot = self.slot_mut(name)?;
        match &mut slot.cell {
            Cell::Float(v) => *v = value,
            _ => return Err(wrong_kind(name, slot.kind, "FLOAT")),
        }
        Ok(())
    }

    fn set_date(&mut self, name: &str, value: &[u16; 8]) -> RemoteResult<()> {
        let slot = self.slot_mut(name)?;
        match &mut slot.cell {
            Cell::Date(units) => *units = *value,
            _ => return Err(wrong_kind(name, slot.kind, "DATE")),
        }
        Ok(())
    }

    fn set_time(&mut self, name: &str, value: &[u16; 6]) -> RemoteResult<()> {
        let slot = self.slot_mut(name)?;
        match &mut slot.cell {
            Cell::Time(units) => *units = *value,
            _ => return Err(wrong_kind(name, slot.kind, "TIME")),
        }
        Ok(())
    }

    fn get_chars(&self, name: &str, buf: &mut [u16]) -> RemoteResult<()> {
        let slot = self.slot(name)?;
        match &slot.cell {
            Cell::Chars(units) => {
                copy_padded(buf, units, SPACE);
                Ok(())
            }
            _ => Err(wrong_kind(name, slot.kind, "CHAR")),
        }
    }

    fn get_num(&self, name: &str, buf: &mut [u16]) -> RemoteResult<()> {
        let slot = self.slot(name)?;
        match &slot.cell {
            Cell::Num(units) => {
                copy_padded(buf, units, ZERO);
                Ok(())
            }
            _ => Err(wrong_kind(name, slot.kind, "NUM")),
        }
    }

    fn get_bytes(&self, name: &str, buf: &mut [u8]) -> RemoteResult<()> {
        let slot = self.slot(name)?;
        match &slot.cell {
            Cell::Bytes(bytes) | Cell::XString(bytes) => {
                let n = buf.len().min(bytes.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                buf[n..].iter_mut().for_each(|b| *b = 0);
                Ok(())
            }
            _ => Err(wrong_kind(name, slot.kind, "BYTE")),
        }
    }

    fn get_string_length(&self, name: &str) -> RemoteResult<usize> {
        let slot = self.slot(name)?;
        match &slot.cell {
            Cell::XString(bytes) | Cell::Bytes(bytes) => Ok(bytes.len()),
            _ => slot
                .text()
                .map(|units| units.len())
                .ok_or_else(|| wrong_kind(name, slot.kind, "text")),
        }
    }

    fn get_string(&self, name: &str, buf: &mut [u16]) -> RemoteResult<ReadOutcome> {
        let slot = self.slot(name)?;
        let units = slot.text().ok_or_else(|| wrong_kind(name, slot.kind, "text"))?;
        if buf.len() < units.len() {
            return Ok(ReadOutcome::BufferTooSmall(units.len()));
        }
        buf[..units.len()].copy_from_slice(&units);
        Ok(ReadOutcome::Complete(units.len()))
    }

    fn get_xstring(&self, name: &str, buf: &mut [u8]) -> RemoteResult<ReadOutcome> {
        let slot = self.slot(name)?;
        match &slot.cell {
            Cell::XString(bytes) => {
                if buf.len() < bytes.len() {
                    return Ok(ReadOutcome::BufferTooSmall(bytes.len()));
                }
                buf[..bytes.len()].copy_from_slice(bytes);
                Ok(ReadOutcome::Complete(bytes.len()))
            }
            _ => Err(wrong_kind(name, slot.kind, "XSTRING")),
        }
    }

    fn get_int1(&self, name: &str) -> RemoteResult<u8> {
        let slot = self.slot(name)?;
        match slot.cell {
            Cell::Int1(v) => Ok(v),
            _ => Err(wrong_kind(name, slot.kind, "INT1")),
        }
    }

    fn get_int2(&self, name: &str) -> RemoteResult<i16> {
        let slot = self.slot(name)?;
        match slot.cell {
            Cell::Int2(v) => Ok(v),
            _ => Err(wrong_kind(name, slot.kind, "INT2")),
        }
    }

    fn get_int(&self, name: &str) -> RemoteResult<i32> {
        let slot = self.slot(name)?;
        match slot.cell {
            Cell::Int(v) => Ok(v),
            _ => Err(wrong_kind(name, slot.kind, "INT")),
        }
    }

    fn get_int8(&self, name: &str) -> RemoteResult<i64> {
        let slot = self.slot(name)?;
        match slot.cell {
            Cell::Int8(v) => Ok(v),
            _ => Err(wrong_kind(name, slot.kind, "INT8")),
        }
    }

    fn get_float(&self, name: &str) -> RemoteResult<f64> {
        let slot = self.slot(name)?;
        match slot.cell {
            Cell::Float(v) => Ok(v),
            _ => Err(wrong_kind(name, slot.kind, "FLOAT")),
        }
    }

    fn get_date(&self, name: &str) -> RemoteResult<[u16; 8]> {
        let slot = self.slot(name)?;
        match slot.cell {
            Cell::Date(units) => Ok(units),
            _ => Err(wrong_kind(name, slot.kind, "DATE")),
        }
    }

    fn get_time(&self, name: &str) -> RemoteResult<[u16; 6]> {
        let slot = self.slot(name)?;
        match slot.cell {
            Cell::Time(units) => Ok(units),
            _ => Err(wrong_kind(name, slot.kind, "TIME")),
        }
    }

    fn structure(&self, name: &str) -> RemoteResult<&dyn DataContainer> {
        let slot = self.slot(name)?;
        match &slot.cell {
            Cell::Structure(inner) => Ok(inner),
            _ => Err(wrong_kind(name, slot.kind, "STRUCTURE")),
        }
    }

    fn structure_mut(&mut self, name: &str) -> RemoteResult<&mut dyn DataContainer> {
        let slot = self.slot_mut(name)?;
        match &mut slot.cell {
            Cell::Structure(inner) => Ok(inner),
            _ => Err(wrong_kind(name, slot.kind, "STRUCTURE")),
        }
    }

    fn table(&self, name: &str) -> RemoteResult<&dyn Table> {
        let slot = self.slot(name)?;
        match &slot.cell {
            Cell::Table(table) => Ok(table),
            _ => Err(wrong_kind(name, slot.kind, "TABLE")),
        }
    }

    fn table_mut(&mut self, name: &str) -> RemoteResult<&mut dyn Table> {
        let slot = self.slot_mut(name)?;
        match &mut slot.cell {
            Cell::Table(table) => Ok(table),
            _ => Err(wrong_kind(name, slot.kind, "TABLE")),
        }
    }
}

/// Rows of a table cell; every row is a [`MemoryContainer`] of the line type.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    line_type: Arc<TypeDescription>,
    rows: Vec<MemoryContainer>,
}

impl MemoryTable {
    pub fn new(line_type: Arc<TypeDescription>) -> Self {
        Self {
            line_type,
            rows: Vec::new(),
        }
    }

    pub fn line_type(&self) -> &TypeDescription {
        &self.line_type
    }
}

impl Table for MemoryTable {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row(&self, index: usize) -> RemoteResult<&dyn DataContainer> {
        match self.rows.get(index) {
            Some(row) => Ok(row),
            None => Err(ErrorInfo::new(
                ReturnCode::TableMoveEof,
                format!("row {} of {} requested", index, self.rows.len()),
            )),
        }
    }

    fn append_row(&mut self) -> RemoteResult<&mut dyn DataContainer> {
        self.rows.push(MemoryContainer::for_type(&self.line_type));
        match self.rows.last_mut() {
            Some(row) => Ok(row),
            None => Err(ErrorInfo::new(ReturnCode::IllegalState, "row vanished after append")),
        }
    }
}

fn copy_padded(buf: &mut [u16], units: &[u16], pad: u16) {
    let n = buf.len().min(units.len());
    buf[..n].copy_from_slice(&units[..n]);
    buf[n..].iter_mut().for_each(|u| *u = pad);
}

fn decode(name: &str, value: &[u16]) -> RemoteResult<String> {
    String::from_utf16(value).map_err(|_| conversion(name, "invalid UTF-16 text"))
}

/// Packed decimals keep exactly `decimals` fractional digits and at most
/// `2 * length - 1` digits in total.
fn normalize_packed(name: &str, literal: &str, length: usize, decimals: usize) -> RemoteResult<String> {
    let literal = literal.trim();
    if !is_decimal_literal(literal, false) {
        return Err(conversion(name, &format!("'{}' is not a packed decimal", literal)));
    }

    let (sign, digits) = match literal.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", literal.strip_prefix('+').unwrap_or(literal)),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if fraction.len() > decimals {
        return Err(conversion(
            name,
            &format!("'{}' has more than {} decimal places", literal, decimals),
        ));
    }

    let whole = whole.trim_start_matches('0');
    let whole = if whole.is_empty() { "0" } else { whole };
    if length > 0 && whole.len() + decimals > 2 * length - 1 {
        return Err(conversion(name, &format!("'{}' does not fit {} bytes", literal, length)));
    }

    let mut normalized = format!("{}{}", sign, whole);
    if decimals > 0 {
        normalized.push('.');
        normalized.push_str(fraction);
        normalized.extend(std::iter::repeat('0').take(decimals - fraction.len()));
    }
    Ok(normalized)
}

/// Optional sign, digits, optional fraction and, when `exponent` is set, an
/// optional `E` exponent.
fn is_decimal_literal(literal: &str, exponent: bool) -> bool {
    let body = literal.strip_prefix(['-', '+']).unwrap_or(literal);
    let (mantissa, exp) = match body.find(['E', 'e']) {
        Some(at) if exponent => (&body[..at], Some(&body[at + 1..])),
        Some(_) => return false,
        None => (body, None),
    };

    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits_ok = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() && fraction.is_empty() {
        return false;
    }
    if !digits_ok(whole) || !digits_ok(fraction) {
        return false;
    }

    match exp {
        Some(exp) => {
            let exp = exp.strip_prefix(['-', '+']).unwrap_or(exp);
            !exp.is_empty() && digits_ok(exp)
        }
        None => true,
    }
}

/// Timestamps are kept in the remote layout, with ',' before the fraction.
fn normalize_timestamp(name: &str, literal: &str) -> RemoteResult<String> {
    let bytes = literal.as_bytes();
    let shaped = bytes.len() == UTCLONG_INITIAL.len()
        && matches!(bytes[19], b',' | b'.')
        && bytes[10] == b'T'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| matches!(i, 4 | 7 | 10 | 13 | 16 | 19) || b.is_ascii_digit());
    if !shaped {
        return Err(conversion(
            name,
            &format!("'{}' is not a timestamp of the form YYYY-MM-DDTHH:MM:SS.fffffff", literal),
        ));
    }
    Ok(format!("{},{}", &literal[..19], &literal[20..]))
}

fn too_long(name: &str, given: usize, length: usize) -> ErrorInfo {
    conversion(
        name,
        &format!("{} units passed to a field of length {}", given, length),
    )
}

fn wrong_kind(name: &str, kind: RfcType, access: &str) -> ErrorInfo {
    conversion(name, &format!("{} field cannot be accessed as {}", kind, access))
}

fn conversion(name: &str, detail: &str) -> ErrorInfo {
    ErrorInfo::new(
        ReturnCode::ConversionFailure,
        format!("field '{}': {}", name, detail),
    )
}
