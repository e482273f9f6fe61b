//! Benchmarks for the patch pass.
//!
//! - Full pass over a freshly built game module
//! - Anchor location in a body with long filler
//! - Stack analysis of a patched body

#![allow(unused)]
extern crate cilpatch;

#[path = "../tests/common/mod.rs"]
mod common;

use cilpatch::prelude::*;
use common::Shape;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::hint::black_box;

fn long_shape() -> Shape {
    Shape {
        before: 200,
        between: 200,
        after: 200,
        push: true,
    }
}

/// Benchmark a complete pass: eligibility, resolution, anchors, allocation, splicing, analysis.
fn bench_patch_pass(c: &mut Criterion) {
    let engine = common::engine(true);
    let patch = TextureResolutionPatch::new(PatchConfig::default()).unwrap();

    c.bench_function("patch_pass", |b| {
        b.iter_batched(
            || common::game(long_shape()).unwrap(),
            |mut game| {
                let report = patch.patch(&mut game, black_box(&engine)).unwrap();
                black_box(report)
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark locating both anchors in a body with 600 filler sequences.
fn bench_locate_anchors(c: &mut Criterion) {
    let game = common::game(long_shape()).unwrap();
    let patch = TextureResolutionPatch::new(PatchConfig::default()).unwrap();
    let body = common::target_body(&game);

    c.bench_function("locate_anchors", |b| {
        b.iter(|| {
            let activation = patch.activation_anchor().locate(black_box(body), &game).unwrap();
            let push = patch.push_anchor().locate(black_box(body), &game).unwrap();
            black_box((activation, push))
        });
    });
}

/// Benchmark stack analysis of a patched body.
fn bench_stack_analysis(c: &mut Criterion) {
    let engine = common::engine(true);
    let mut game = common::game(long_shape()).unwrap();
    let patch = TextureResolutionPatch::new(PatchConfig::default()).unwrap();
    let report = patch.patch(&mut game, &engine).unwrap();
    let method = game.method(report.method).unwrap();
    let body = method.body.as_ref().unwrap();

    c.bench_function("stack_analysis", |b| {
        b.iter(|| {
            let stack = StackAnalyzer::new(&game, &method.signature)
                .analyze(black_box(body))
                .unwrap();
            black_box(stack.max_depth())
        });
    });
}

criterion_group!(
    benches,
    bench_patch_pass,
    bench_locate_anchors,
    bench_stack_analysis
);
criterion_main!(benches);
