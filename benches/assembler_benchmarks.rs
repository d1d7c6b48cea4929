//! Benchmarks for the assembler, disassembler and container codec.
//!
//! ## Profiling with Puffin
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sctools::compiler::{
    AsmStatement, CodegenOptions, FunctionDefinition, NativeDb, Operand, assemble, disassemble,
};
use sctools::container::{Container, Magic, Target, decode, encode};
use std::hint::black_box;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

const KEY: [u8; 32] = [0x42; 32];

/// `count` functions of a counting loop each, `main` last.
fn functions(count: usize) -> Vec<FunctionDefinition> {
    let body = || {
        vec![
            AsmStatement::new("PUSH_CONST", vec![Operand::Int(0)]),
            AsmStatement::new("DROP", vec![]).with_label("loop"),
            AsmStatement::new("PUSH_CONST", vec![Operand::Int(70_000)]),
            AsmStatement::new("PUSH_CONST", vec![Operand::Float(1.5)]),
            AsmStatement::new("F2I", vec![]),
            AsmStatement::new("ILT", vec![]),
            AsmStatement::new("JZ", vec![Operand::ident("done")]),
            AsmStatement::new("STRING", vec![Operand::String("tick".into())]),
            AsmStatement::new(
                "NATIVE",
                vec![Operand::Int(1), Operand::Int(0), Operand::ident("PRINT_STRING")],
            ),
            AsmStatement::new("J", vec![Operand::ident("loop")]),
            AsmStatement::new("LEAVE", vec![Operand::Int(0), Operand::Int(0)]).with_label("done"),
        ]
    };

    let mut out: Vec<_> = (0..count)
        .map(|i| {
            FunctionDefinition::new(format!("func_{i}"), false, vec![], vec![], None, body())
                .unwrap()
        })
        .collect();
    out.push(FunctionDefinition::new("main", false, vec![], vec![], None, body()).unwrap());
    out
}

fn assembler_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let mut group = c.benchmark_group("assembler");

    for count in [10, 100, 1000] {
        let input = functions(count);
        group.throughput(Throughput::Elements(input.len() as u64));
        group.bench_with_input(BenchmarkId::new("assemble", count), &input, |b, input| {
            b.iter(|| {
                let script = assemble(black_box(input.clone()), &[], CodegenOptions::default())
                    .unwrap();
                end_profiling_frame();
                black_box(script.code.len())
            });
        });

        let code = assemble(input, &[], CodegenOptions::default()).unwrap().code;
        let natives = NativeDb::from_names(["PRINT_STRING"]);
        group.throughput(Throughput::Bytes(code.len() as u64));
        group.bench_with_input(BenchmarkId::new("disassemble", count), &code, |b, code| {
            b.iter(|| {
                let listing = disassemble(black_box(code), &natives).unwrap();
                end_profiling_frame();
                black_box(listing.instructions.len())
            });
        });
    }

    group.finish();
}

fn container_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let mut group = c.benchmark_group("container");

    let script = assemble(functions(500), &[], CodegenOptions::default()).unwrap();
    for magic in [Magic::Gta4Plain, Magic::Gta4Encrypted, Magic::Gta4Compressed] {
        let mut container = Container::new(magic);
        container.code = script.code.clone();
        let bytes = encode(&container, Some(&KEY)).unwrap();

        group.throughput(Throughput::Bytes(container.code.len() as u64));
        group.bench_function(BenchmarkId::new("encode", format!("{magic:?}")), |b| {
            b.iter(|| black_box(encode(black_box(&container), Some(&KEY)).unwrap()));
        });
        group.bench_function(BenchmarkId::new("decode", format!("{magic:?}")), |b| {
            b.iter(|| black_box(decode(black_box(&bytes), Target::Gta4, Some(&KEY)).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, assembler_benchmarks, container_benchmarks);
criterion_main!(benches);
