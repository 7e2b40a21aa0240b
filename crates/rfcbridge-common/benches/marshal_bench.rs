// Criterion benchmarks for the rfcbridge marshaling engine
//
// Run benchmarks with:
//   cargo bench -p rfcbridge-common
//
// For detailed output with plots:
//   cargo bench -p rfcbridge-common -- --save-baseline main

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rfcbridge_common::marshal::{fill_parameters, unwrap_parameters};
use rfcbridge_common::transport::MemoryContainer;
use rfcbridge_common::{
    Direction, FieldDescription, FunctionDescription, ParameterDescription, RfcType, TextCodec,
    TypeDescription, Value,
};

fn line_type() -> Arc<TypeDescription> {
    Arc::new(
        TypeDescription::new("ZLINE")
            .field(FieldDescription::new("RFCCHAR10", RfcType::Char, 10))
            .field(FieldDescription::new("RFCINT4", RfcType::Int, 4))
            .field(FieldDescription::new("RFCFLOAT", RfcType::Float, 8))
            .field(FieldDescription::new("RFCNUMC", RfcType::Num, 10))
            .field(FieldDescription::new("RFCSTRING", RfcType::String, 0)),
    )
}

fn echo_description() -> FunctionDescription {
    FunctionDescription::new("Z_ECHO")
        .parameter(ParameterDescription::complex("IS_LINE", RfcType::Structure, Direction::Import, line_type()))
        .parameter(ParameterDescription::complex("IT_LINES", RfcType::Table, Direction::Tables, line_type()))
}

fn row(i: usize) -> Value {
    Value::structure([
        ("RFCCHAR10", Value::from(format!("ROW{}", i))),
        ("RFCINT4", Value::I32(i as i32)),
        ("RFCFLOAT", Value::Float(i as f64 * 0.25)),
        ("RFCNUMC", Value::I64(i as i64)),
        ("RFCSTRING", Value::from("some variable length text")),
    ])
}

fn bench_text_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_codec");

    let text = "ABCDEFGHIJ".repeat(25);
    group.bench_function("encode_250", |b| {
        b.iter(|| TextCodec::encode(black_box(&text)));
    });

    let mut padded = TextCodec::encode("ABC");
    padded.resize(255, b' ' as u16);
    group.bench_function("decode_255_strip", |b| {
        b.iter(|| TextCodec::decode(black_box(&padded), 255, true));
    });

    group.finish();
}

fn bench_fill_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_table");
    let desc = echo_description();

    for rows in [1, 10, 100, 1000].iter() {
        let params = Value::structure([("IT_LINES", Value::table((0..*rows).map(row)))]);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &params, |b, params| {
            b.iter(|| {
                let mut container = MemoryContainer::for_function(&desc);
                fill_parameters(&desc, &mut container, black_box(params))
            });
        });
    }

    group.finish();
}

fn bench_unwrap_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("unwrap_table");
    let desc = echo_description();

    for rows in [1, 10, 100, 1000].iter() {
        let params = Value::structure([("IT_LINES", Value::table((0..*rows).map(row)))]);
        let mut container = MemoryContainer::for_function(&desc);
        if fill_parameters(&desc, &mut container, &params).is_err() {
            continue;
        }
        group.bench_with_input(BenchmarkId::from_parameter(rows), &container, |b, container| {
            b.iter(|| unwrap_parameters(&desc, black_box(container), true, |p| p.direction == Direction::Tables));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_text_codec, bench_fill_table, bench_unwrap_table);
criterion_main!(benches);
