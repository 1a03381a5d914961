use criterion::{Criterion, black_box, criterion_group, criterion_main};

use shadercall::{Device, MemorySource, ShaderModule, Value};

const MODULE: &str = r#"
fn add(a: f32, b: f32) -> f32 {
    return a + b;
}

fn sum_to(n: u32) -> u32 {
    var total = 0u;
    for (var i = 1u; i <= n; i++) {
        total += i;
    }
    return total;
}
"#;

fn load() -> ShaderModule {
    let source = MemorySource::new();
    source.insert("/bench.wgsl", MODULE);
    let device = Device::cpu(source).unwrap();
    ShaderModule::load(&device, "/bench.wgsl").unwrap()
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

fn bench_load(c: &mut Criterion) {
    let source = MemorySource::new();
    source.insert("/bench.wgsl", MODULE);
    let device = Device::cpu(source).unwrap();

    c.bench_function("module_load_compile", |b| {
        b.iter(|| {
            black_box(ShaderModule::load(&device, "/bench.wgsl").unwrap());
        });
    });
}

// ---------------------------------------------------------------------------
// Bind
// ---------------------------------------------------------------------------

fn bench_bind(c: &mut Criterion) {
    let module = load();
    let signature = module.resolve("add").unwrap();

    c.bench_function("bind_positional", |b| {
        b.iter(|| black_box(signature.bind_positional([1.0f32, 2.0]).unwrap()));
    });

    c.bench_function("bind_named", |b| {
        b.iter(|| black_box(signature.bind_named([("b", 2.0f32), ("a", 1.0)]).unwrap()));
    });
}

// ---------------------------------------------------------------------------
// Invoke (CPU executor)
// ---------------------------------------------------------------------------

fn bench_invoke_cpu(c: &mut Criterion) {
    let module = load();
    let binding = module
        .resolve("add")
        .unwrap()
        .bind_positional([1.0f32, 2.0])
        .unwrap();

    c.bench_function("cpu_invoke_add", |b| {
        b.iter(|| black_box(module.invoke("add", &binding).unwrap()));
    });

    c.bench_function("cpu_invoke_loop_100", |b| {
        b.iter(|| black_box(module.call("sum_to", [Value::from(100u32)]).unwrap()));
    });
}

criterion_group!(benches, bench_load, bench_bind, bench_invoke_cpu);
criterion_main!(benches);
