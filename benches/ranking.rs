//! Benchmarks for the hot paths of a refresh: catalog decoding, ranking
//! and snapshot encoding

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use regions_updater::{
    catalog::decode_envelope,
    cli::parse_duration,
    models::{Region, Server, ServerGroup},
    persist::encode_regions,
    ranking::Ranking,
};
use std::hint::black_box;
use std::time::Duration;

/// Create sample regions, every fifth one unmeasured
fn create_sample_regions(count: usize) -> Vec<Region> {
    (0..count)
        .map(|i| Region {
            id: format!("region_{i}"),
            name: format!("Region {}", (i * 7919) % count.max(1)),
            country: "XX".to_string(),
            servers: ServerGroup {
                wg: vec![Server {
                    ip: format!("10.0.{}.{}", i / 256, i % 256),
                    cn: format!("server{i}"),
                    van: false,
                    latency: (i % 5 != 0).then(|| Duration::from_micros(((i * 104_729) % 50_000) as u64)),
                }],
                ..Default::default()
            },
            ..Default::default()
        })
        .collect()
}

fn create_catalog_body(count: usize) -> Vec<u8> {
    let regions: Vec<Region> = create_sample_regions(count)
        .into_iter()
        .map(|mut r| {
            r.servers.wg[0].latency = None;
            r
        })
        .collect();
    let mut body = serde_json::to_vec(&serde_json::json!({ "regions": regions })).unwrap();
    body.extend_from_slice(b"\n\nsignature");
    body
}

fn benchmark_ranking(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranking");

    for size in [25usize, 250, 2500].iter() {
        let regions = create_sample_regions(*size);

        for ranking in [Ranking::LatencyAscending, Ranking::NameAscending] {
            group.bench_with_input(BenchmarkId::new(ranking.to_string(), size), &regions, |b, regions| {
                b.iter(|| ranking.rank(black_box(regions.clone()), 25))
            });
        }
    }

    group.finish();
}

fn benchmark_codecs(c: &mut Criterion) {
    let mut group = c.benchmark_group("codecs");

    let body = create_catalog_body(500);
    group.bench_function("decode_catalog", |b| b.iter(|| decode_envelope(black_box(&body)).unwrap()));

    let snapshot = Ranking::NameAscending.rank(create_sample_regions(500), 25);
    group.bench_function("encode_snapshot", |b| b.iter(|| encode_regions(black_box(&snapshot)).unwrap()));

    group.bench_function("parse_duration", |b| b.iter(|| parse_duration(black_box("1h30m15.5s")).unwrap()));

    group.finish();
}

criterion_group!(benches, benchmark_ranking, benchmark_codecs);
criterion_main!(benches);
