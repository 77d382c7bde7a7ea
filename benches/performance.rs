//! Performance benchmarks for road-snap
//!
//! Run with: cargo bench
//!
//! Covers index construction, the two index query forms and end-to-end edge
//! matching over a synthetic street grid.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use geo::Point;
use road_snap::{DualPoleIndex, EdgeMatcher, GpsFix, GraphEdge, GraphNode, RoadGraph, geodesic};

/// Jittered point grid around Ann Arbor
fn generate_points(side: usize) -> (Vec<f64>, Vec<f64>) {
    let mut lats = Vec::with_capacity(side * side);
    let mut lons = Vec::with_capacity(side * side);
    for i in 0..side {
        for j in 0..side {
            let jitter = ((i * side + j) as f64 * 12.9898).sin() * 0.0002;
            lats.push(42.0 + i as f64 * 0.001 + jitter);
            lons.push(-83.0 + j as f64 * 0.001 - jitter);
        }
    }
    (lats, lons)
}

/// Synthetic Manhattan-style street grid with edges in both directions
fn generate_grid_graph(side: usize) -> RoadGraph {
    let (lats, lons) = generate_points(side);

    let nodes: Vec<GraphNode> = (0..lats.len())
        .map(|i| GraphNode::new(i as i64, lats[i], lons[i]))
        .collect();

    let mut edges = Vec::new();
    let mut push_both = |u: usize, v: usize| {
        let a = nodes[u].position;
        let b = nodes[v].position;
        let length = geodesic::haversine(a, b);
        let bearing = geodesic::path_bearings(&[a.y(), b.y()], &[a.x(), b.x()])[0];
        edges.push(GraphEdge {
            from: u as i64,
            to: v as i64,
            length,
            bearing,
        });
        edges.push(GraphEdge {
            from: v as i64,
            to: u as i64,
            length,
            bearing: (bearing + 180.0) % 360.0,
        });
    };

    for i in 0..side {
        for j in 0..side {
            let here = i * side + j;
            if j + 1 < side {
                push_both(here, here + 1);
            }
            if i + 1 < side {
                push_both(here, here + side);
            }
        }
    }

    RoadGraph::new(nodes, edges).unwrap()
}

fn bench_index_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction");
    group.sample_size(20);

    for side in [32, 100] {
        let (lats, lons) = generate_points(side);
        let n = lats.len();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("index_{n}_points"), |b| {
            b.iter(|| DualPoleIndex::new(lats.clone(), lons.clone()).unwrap());
        });
    }

    group.finish();
}

fn bench_index_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    let (lats, lons) = generate_points(100);
    let index = DualPoleIndex::new(lats, lons).unwrap();
    let location = Point::new(-82.95, 42.05);

    group.bench_function("radius_500m_10k_points", |b| {
        b.iter(|| index.query_radius(location, 500.0).unwrap());
    });

    group.bench_function("knn_1_10k_points", |b| {
        b.iter(|| index.query_knn(location, 1).unwrap());
    });

    group.bench_function("knn_16_10k_points", |b| {
        b.iter(|| index.query_knn(location, 16).unwrap());
    });

    group.finish();
}

fn bench_edge_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching");

    let graph = generate_grid_graph(50);
    let matcher = EdgeMatcher::new(&graph);
    let location = Point::new(-82.9755, 42.0245);

    group.bench_function("matching_edge_grid_2500", |b| {
        b.iter(|| matcher.matching_edge(location, Some(45.0), 1.0).unwrap());
    });

    group.bench_function("nearest_edge_grid_2500", |b| {
        b.iter(|| matcher.nearest_edge(location, Some(45.0), 1.0).unwrap());
    });

    // One worker per fix over a shared immutable graph
    let fixes: Vec<GpsFix> = (0..256)
        .map(|i| {
            let t = i as f64 / 256.0;
            GpsFix::new(42.005 + t * 0.04, -82.995 - t * 0.04, Some(45.0))
        })
        .collect();

    group.throughput(Throughput::Elements(fixes.len() as u64));
    group.bench_function("bulk_matching_256_fixes", |b| {
        b.iter(|| matcher.matching_edges(&fixes, 1.0).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_index_construction,
    bench_index_queries,
    bench_edge_matching,
);

criterion_main!(benches);
