//! Shared fixtures for the client integration tests.
//!
//! Every test talks to a `MemorySession` with a small catalogue of remote
//! procedures whose handlers echo their inputs back through the marshaling
//! engine.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rfcbridge_common::marshal::{fill_parameters, unwrap_parameters};
use rfcbridge_common::protocol::{
    Direction, ErrorInfo, FieldDescription, FunctionDescription, ParameterDescription,
    RemoteResult, ReturnCode, RfcType, TypeDescription, Value,
};
use rfcbridge_common::transport::{CallContext, DataContainer, MemorySession};

pub const USER: &str = "demo";
pub const PASSWD: &str = "welcome";

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn params() -> rfcbridge_common::ConnectionParameters {
    rfcbridge_common::ConnectionParameters::new()
        .with("ashost", "10.0.0.1")
        .with("sysnr", "00")
        .with("client", "620")
        .with("user", USER)
        .with("passwd", PASSWD)
        .with("lang", "en")
}

pub fn rfctest_type() -> Arc<TypeDescription> {
    Arc::new(
        TypeDescription::new("RFCTEST")
            .field(FieldDescription::new("RFCFLOAT", RfcType::Float, 8))
            .field(FieldDescription::new("RFCCHAR1", RfcType::Char, 1))
            .field(FieldDescription::new("RFCINT2", RfcType::Int2, 2))
            .field(FieldDescription::new("RFCINT1", RfcType::Int1, 1))
            .field(FieldDescription::new("RFCCHAR4", RfcType::Char, 4))
            .field(FieldDescription::new("RFCINT4", RfcType::Int, 4))
            .field(FieldDescription::new("RFCHEX3", RfcType::Byte, 3))
            .field(FieldDescription::new("RFCCHAR2", RfcType::Char, 2))
            .field(FieldDescription::new("RFCTIME", RfcType::Time, 6))
            .field(FieldDescription::new("RFCDATE", RfcType::Date, 8))
            .field(FieldDescription::new("RFCDATA1", RfcType::Char, 50))
            .field(FieldDescription::new("RFCDATA2", RfcType::Char, 50)),
    )
}

fn import(name: &str, kind: RfcType, length: usize) -> ParameterDescription {
    ParameterDescription::new(name, kind, Direction::Import, length)
}

fn export(name: &str, kind: RfcType, length: usize) -> ParameterDescription {
    ParameterDescription::new(name, kind, Direction::Export, length)
}

fn stfc_structure() -> FunctionDescription {
    FunctionDescription::new("STFC_STRUCTURE")
        .parameter(ParameterDescription::complex("IMPORTSTRUCT", RfcType::Structure, Direction::Import, rfctest_type()))
        .parameter(ParameterDescription::complex("ECHOSTRUCT", RfcType::Structure, Direction::Export, rfctest_type()))
        .parameter(ParameterDescription::complex("RFCTABLE", RfcType::Table, Direction::Tables, rfctest_type()))
        .parameter(export("RESPTEXT", RfcType::Char, 255))
}

/// One Import/Export pair per scalar kind, `IV_*` echoed into `EV_*`.
fn z_all_types() -> FunctionDescription {
    let kinds = [
        ("CHAR", RfcType::Char, 255, 0),
        ("NUM", RfcType::Num, 10, 0),
        ("STRING", RfcType::String, 0, 0),
        ("RAW", RfcType::Byte, 4, 0),
        ("XSTRING", RfcType::XString, 0, 0),
        ("INT1", RfcType::Int1, 1, 0),
        ("INT2", RfcType::Int2, 2, 0),
        ("INT4", RfcType::Int, 4, 0),
        ("INT8", RfcType::Int8, 8, 0),
        ("FLOAT", RfcType::Float, 8, 0),
        ("BCD", RfcType::Bcd, 8, 2),
        ("DECF16", RfcType::Decf16, 8, 0),
        ("DECF34", RfcType::Decf34, 16, 0),
        ("DATE", RfcType::Date, 8, 0),
        ("TIME", RfcType::Time, 6, 0),
        ("UTCLONG", RfcType::UtcLong, 8, 0),
    ];
    kinds.iter().fold(FunctionDescription::new("Z_ALL_TYPES"), |desc, (name, kind, len, dec)| {
        desc.parameter(import(&format!("IV_{}", name), *kind, *len).with_decimals(*dec))
            .parameter(export(&format!("EV_{}", name), *kind, *len).with_decimals(*dec))
    })
}

fn z_table_echo() -> FunctionDescription {
    FunctionDescription::new("Z_TABLE_ECHO")
        .parameter(ParameterDescription::complex("IT_LINES", RfcType::Table, Direction::Tables, rfctest_type()))
        .parameter(export("EV_COUNT", RfcType::Int, 4))
}

fn z_sleep() -> FunctionDescription {
    FunctionDescription::new("Z_SLEEP")
        .parameter(import("IV_MILLIS", RfcType::Int, 4))
        .parameter(export("EV_DONE", RfcType::Char, 1))
}

fn z_raise() -> FunctionDescription {
    FunctionDescription::new("Z_RAISE").parameter(import("IV_KEY", RfcType::Char, 30))
}

fn marshal_failure(e: impl ToString) -> ErrorInfo {
    ErrorInfo::new(ReturnCode::ConversionFailure, e.to_string())
}

/// Copies every `IV_*` input into the matching `EV_*` output.
fn echo_inputs(ctx: &CallContext, container: &mut dyn DataContainer) -> RemoteResult<()> {
    let inputs = unwrap_parameters(ctx.function(), &*container, false, |p| {
        p.direction == Direction::Import
    })
    .map_err(marshal_failure)?;
    let outputs = Value::structure(
        inputs
            .into_iter()
            .filter_map(|(name, value)| name.strip_prefix("IV_").map(|n| (format!("EV_{}", n), value))),
    );
    fill_parameters(ctx.function(), container, &outputs).map_err(marshal_failure)
}

fn structure_echo(ctx: &CallContext, container: &mut dyn DataContainer) -> RemoteResult<()> {
    let inputs = unwrap_parameters(ctx.function(), &*container, false, |p| p.name == "IMPORTSTRUCT")
        .map_err(marshal_failure)?;
    let echo = inputs.get("IMPORTSTRUCT").cloned().unwrap_or(Value::Null);
    let outputs = Value::structure([
        ("ECHOSTRUCT", echo.clone()),
        ("RFCTABLE", Value::table([echo])),
        ("RESPTEXT", Value::from(format!("SAP R/3 Rel. 750 Sysid: MME Handle: {}", ctx.handle().0))),
    ]);
    fill_parameters(ctx.function(), container, &outputs).map_err(marshal_failure)
}

fn table_count(_ctx: &CallContext, container: &mut dyn DataContainer) -> RemoteResult<()> {
    let count = container.table("IT_LINES")?.row_count();
    container.set_int("EV_COUNT", count as i32)
}

fn sleeper(ctx: &CallContext, container: &mut dyn DataContainer) -> RemoteResult<()> {
    let millis = container.get_int("IV_MILLIS")?;
    ctx.sleep(Duration::from_millis(millis.max(0) as u64))?;
    container.set_chars("EV_DONE", &[b'X' as u16])
}

fn raiser(_ctx: &CallContext, container: &mut dyn DataContainer) -> RemoteResult<()> {
    let mut key = [0u16; 30];
    container.get_chars("IV_KEY", &mut key)?;
    let key = String::from_utf16_lossy(&key).trim_end().to_string();
    Err(ErrorInfo::abap_exception(key, "")
        .with_abap_message("SR", "E", "006")
        .with_message_variables(["STRING", "", "", ""]))
}

/// A remote session with the full test catalogue and a logon check.
pub fn session() -> Arc<MemorySession> {
    Arc::new(
        MemorySession::new()
            .with_user(USER, PASSWD)
            .with_function(stfc_structure(), structure_echo)
            .with_function(z_all_types(), echo_inputs)
            .with_function(z_table_echo(), table_count)
            .with_function(z_sleep(), sleeper)
            .with_function(z_raise(), raiser),
    )
}
