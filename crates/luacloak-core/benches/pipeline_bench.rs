use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use luacloak_core::{emit_block, parse, Obfuscator, ObfuscatorConfig, OutputFormat, PassConfig};

/// A module with `functions` small functions, each with a loop, a branch,
/// strings, numbers and a global call.
fn generate_module(functions: usize) -> String {
    let mut code = String::from("local results = {}\n");
    for i in 0..functions {
        code.push_str(&format!(
            r#"local function step{i}(n)
    local total = {i}
    for k = 1, n do
        if k % 2 == 0 then
            total = total + k
        else
            total = total - 1
        end
    end
    return tostring(total) .. "-step{i}", total > 10
end
results[#results + 1] = step{i}(8)
"#
        ));
    }
    code.push_str("return #results\n");
    code
}

fn bench_parse_and_emit(c: &mut Criterion) {
    let source = generate_module(20);
    c.bench_function("parse_emit_20_functions", |b| {
        b.iter(|| {
            let tree = parse(black_box(&source)).unwrap();
            black_box(emit_block(&tree, OutputFormat::Minified));
        })
    });
}

fn bench_single_passes(c: &mut Criterion) {
    let source = generate_module(10);
    let mut group = c.benchmark_group("single_pass");
    for name in PassConfig::NAMES {
        let mut passes = PassConfig::none();
        passes.set(name, true).unwrap();
        let obfuscator = Obfuscator::new(ObfuscatorConfig::default().with_passes(passes).with_seed(1));
        group.bench_with_input(BenchmarkId::from_parameter(name), &source, |b, source| {
            b.iter(|| black_box(obfuscator.obfuscate(source).unwrap()))
        });
    }
    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");
    for functions in [1, 10, 50] {
        let source = generate_module(functions);
        let obfuscator = Obfuscator::new(ObfuscatorConfig::default().with_seed(7));
        group.bench_with_input(BenchmarkId::from_parameter(functions), &source, |b, source| {
            b.iter(|| black_box(obfuscator.obfuscate(source).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse_and_emit, bench_single_passes, bench_full_pipeline);
criterion_main!(benches);
