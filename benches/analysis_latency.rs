//! Analyzer and orchestrator latency benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use sentinel_core::analysis::{
    AnalysisMode, CrisisSafetyAnalyzer, EmotionClassifier, PatternCatalog, PhiDetector,
    SafetyOrchestrator,
};

const INPUTS: &[(&str, &str)] = &[
    ("benign", "Lovely lunch with my granddaughter today, the soup was warm"),
    (
        "phi",
        "Patient Margaret Thompson, MRN: 00482913, SSN 123-45-6789, call 555-123-4567",
    ),
    (
        "crisis",
        "I feel hopeless and alone, nobody visits me and I want to end my life",
    ),
];

fn long_input() -> String {
    "I went to the garden and talked with Dr. Alan Smith about my medication. "
        .repeat(200)
}

fn bench_analyzers(c: &mut Criterion) {
    let catalog = PatternCatalog::shared().unwrap();
    let crisis = CrisisSafetyAnalyzer::new(catalog.clone());
    let emotion = EmotionClassifier::new(catalog.clone());
    let phi = PhiDetector::new(catalog);

    let mut group = c.benchmark_group("analyzers");
    for (name, text) in INPUTS {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("crisis", name), text, |b, t| {
            b.iter(|| crisis.evaluate(black_box(t)))
        });
        group.bench_with_input(BenchmarkId::new("emotion", name), text, |b, t| {
            b.iter(|| emotion.classify(black_box(t)))
        });
        group.bench_with_input(BenchmarkId::new("phi_redact", name), text, |b, t| {
            b.iter(|| phi.detect(black_box(t), AnalysisMode::Redact))
        });
    }

    let long = long_input();
    group.throughput(Throughput::Bytes(long.len() as u64));
    group.bench_function("phi_redact/long", |b| {
        b.iter(|| phi.detect(black_box(&long), AnalysisMode::Redact))
    });
    group.finish();
}

fn bench_combined(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = SafetyOrchestrator::new(PatternCatalog::shared().unwrap(), None);

    let mut group = c.benchmark_group("analyze_combined");
    for (name, text) in INPUTS {
        group.bench_with_input(BenchmarkId::from_parameter(name), text, |b, t| {
            b.iter(|| {
                rt.block_on(orchestrator.analyze_combined(black_box(t), AnalysisMode::Detect))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_analyzers, bench_combined);
criterion_main!(benches);
