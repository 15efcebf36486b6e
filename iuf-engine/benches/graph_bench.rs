//! Benchmarks for stage graph compilation and parameter building.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use iuf_engine::config::EngineConfig;
use iuf_engine::graph::GraphGenerator;
use iuf_engine::model::{OperationOutputs, Product, Session};
use iuf_engine::params::{BootprepContents, GlobalParamsBuilder};
use iuf_engine::testing::fixtures::{activity, all_templates, product, stages_catalog};
use iuf_engine::testing::{InMemoryExecutionEngine, StaticTokenIssuer};

fn products(count: usize) -> Vec<Product> {
    (0..count)
        .map(|i| product(&format!("product{i}"), "1.0.0"))
        .collect()
}

fn session(stage: &str, count: usize) -> Session {
    let activity = activity("bench", &["deliver-product", "pre-install-check"], products(count));
    let mut session = Session::from_activity("bench-s1", &activity);
    session.current_stage = stage.to_string();
    session
}

fn outputs(count: usize) -> OperationOutputs {
    let mut outputs = OperationOutputs::new();
    for product in products(count) {
        let values = serde_json::json!({"s3-upload": {"bucket_url": "s3://fw-update"}});
        if let serde_json::Value::Object(values) = values {
            outputs
                .product_stage_mut("deliver-product")
                .merge_product(&product.key(), values);
        }
    }
    outputs
}

fn generate_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let engine = InMemoryExecutionEngine::with_templates(all_templates());
    let tokens = StaticTokenIssuer::default();
    let catalog = stages_catalog();
    let config = EngineConfig::default();

    let mut group = c.benchmark_group("generate_stage_graph");
    for count in [1, 10, 50] {
        for stage in ["deliver-product", "pre-install-check"] {
            let session = session(stage, count);
            let outputs = outputs(count);
            group.bench_with_input(BenchmarkId::new(stage, count), &count, |b, _| {
                let generator = GraphGenerator::new(&engine, &tokens, &catalog, &config);
                b.iter(|| {
                    runtime
                        .block_on(generator.generate_stage_graph(black_box(&session), &outputs))
                        .unwrap()
                });
            });
        }
    }
    group.finish();
}

fn params_benchmark(c: &mut Criterion) {
    let catalog = stages_catalog();
    let bootprep = BootprepContents::default();

    let mut group = c.benchmark_group("build_per_product");
    for count in [1, 10, 50] {
        let session = session("deploy-product", count);
        let outputs = outputs(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                GlobalParamsBuilder::new(black_box(&session), &outputs, &catalog, &bootprep)
                    .build_per_product()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, generate_benchmark, params_benchmark);
criterion_main!(benches);
