//! Benchmarks for the RenderWare codec
//!
//! Run with: cargo bench

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glam::Vec3;

use rwscene_parsers::{
    Atomic, ChunkVersion, Clump, Frame, Geometry, MaterialSplitList, ParseContext, RwStream,
    SplitEncoding, Triangle,
};
use rwscene_parsers::rw::material::Material;

const V: ChunkVersion = ChunkVersion::SAN_ANDREAS;

/// Regular grid of `n * n` quads split across four materials
fn grid_triangles(n: u16) -> Vec<Triangle> {
    let mut triangles = Vec::with_capacity(usize::from(n) * usize::from(n) * 2);
    let stride = n + 1;
    for y in 0..n {
        for x in 0..n {
            let a = y * stride + x;
            let b = a + 1;
            let c = a + stride;
            let d = c + 1;
            let material = ((x + y) % 4) as i16;
            triangles.push(Triangle::new(a, b, c, material));
            triangles.push(Triangle::new(c, b, d, material));
        }
    }
    triangles
}

fn grid_clump(n: u16) -> Clump {
    let stride = n + 1;
    let positions = (0..stride * stride)
        .map(|i| Vec3::new(f32::from(i % stride), f32::from(i / stride), 0.0))
        .collect();
    let mut geometry = Geometry::from_mesh(V, positions, grid_triangles(n));
    for _ in 0..4 {
        geometry.material_list.push(Material::new(V));
    }
    let _ = geometry.rebuild_material_split(SplitEncoding::List);

    let mut clump = Clump::new(V);
    let _ = clump.frame_list.push_frame(Frame::new(-1), rwscene_parsers::Extension::new(V));
    clump.geometry_list.geometries.push(geometry);
    clump.atomics.push(Atomic::new(0, 0, V));
    clump
}

/// Benchmark parsing and writing whole models
fn bench_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("roundtrip");

    for n in [8u16, 32, 128] {
        let bytes = grid_clump(n).to_bytes().unwrap_or_default();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("parse", n), &bytes, |b, bytes| {
            b.iter(|| RwStream::from_bytes(black_box(bytes), ParseContext::default()))
        });

        let clump = grid_clump(n);
        group.bench_with_input(BenchmarkId::new("write", n), &clump, |b, clump| {
            b.iter(|| black_box(clump).to_bytes())
        });
    }

    group.finish();
}

/// Benchmark material split construction
fn bench_material_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("material_split");

    for n in [16u16, 64, 128] {
        let triangles = grid_triangles(n);
        group.throughput(Throughput::Elements(triangles.len() as u64));

        group.bench_with_input(BenchmarkId::new("list", n), &triangles, |b, tris| {
            b.iter(|| MaterialSplitList::build(black_box(tris), 4, SplitEncoding::List, V))
        });
        group.bench_with_input(BenchmarkId::new("strip", n), &triangles, |b, tris| {
            b.iter(|| MaterialSplitList::build(black_box(tris), 4, SplitEncoding::Strip, V))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_roundtrip, bench_material_split);
criterion_main!(benches);
