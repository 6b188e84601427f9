//! Benchmarks for the planner's three-way diff, scaling file count and the
//! proportion of modifications/renames between the two sides.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use duosync::hash::hash_bytes;
use duosync::pair::Pair;
use duosync::planner::plan;
use duosync::scanner::{FileDescriptor, SideMap};
use duosync::snapshot::SnapshotDocument;
use std::path::PathBuf;

fn mock_descriptor(rel: String, seed: u64) -> FileDescriptor {
    FileDescriptor {
        rel_path: rel.clone(),
        absolute: PathBuf::from(rel),
        mtime: 1_700_000_000.0,
        size: 1024 * (seed + 1),
        digest: hash_bytes(&seed.to_le_bytes()),
    }
}

fn side_map(descriptors: Vec<FileDescriptor>) -> SideMap {
    let mut map = SideMap::default();
    for d in descriptors {
        map.insert(d.rel_path.clone(), d);
    }
    map
}

fn create_identical_maps(file_count: usize) -> (SideMap, SideMap) {
    let descriptors: Vec<FileDescriptor> =
        (0..file_count).map(|i| mock_descriptor(format!("file_{i:05}.txt"), i as u64)).collect();
    let a = side_map(descriptors.clone());
    let b = side_map(descriptors);
    (a, b)
}

fn create_all_new_maps(file_count: usize) -> (SideMap, SideMap) {
    let descriptors: Vec<FileDescriptor> =
        (0..file_count).map(|i| mock_descriptor(format!("file_{i:05}.txt"), i as u64)).collect();
    (side_map(descriptors), SideMap::default())
}

fn create_modified_maps(file_count: usize, modify_percent: usize) -> (SideMap, SideMap) {
    let modify_count = (file_count * modify_percent) / 100;
    let a: Vec<FileDescriptor> =
        (0..file_count).map(|i| mock_descriptor(format!("file_{i:05}.txt"), i as u64)).collect();
    let b: Vec<FileDescriptor> = a
        .iter()
        .enumerate()
        .map(|(i, d)| {
            if i < modify_count {
                let mut modified = d.clone();
                modified.digest = hash_bytes(&(i as u64 + 100_000).to_le_bytes());
                modified.size += 100;
                modified
            } else {
                d.clone()
            }
        })
        .collect();
    (side_map(a), side_map(b))
}

fn create_renamed_maps(file_count: usize, rename_percent: usize) -> (SideMap, SideMap) {
    let rename_count = (file_count * rename_percent) / 100;
    let a: Vec<FileDescriptor> =
        (0..file_count).map(|i| mock_descriptor(format!("file_{i:05}.txt"), i as u64)).collect();
    let b: Vec<FileDescriptor> = a
        .iter()
        .enumerate()
        .map(|(i, d)| {
            if i < rename_count {
                let mut renamed = d.clone();
                renamed.rel_path = format!("renamed_{i:05}.txt");
                renamed
            } else {
                d.clone()
            }
        })
        .collect();
    (side_map(a), side_map(b))
}

fn bench_plan_scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_scale");
    let pair = Pair::new("/a", "/b");

    for (name, count) in [("100_files", 100), ("1000_files", 1000), ("10000_files", 10000)] {
        let (a, b) = create_identical_maps(count);
        let snapshot = SnapshotDocument::default();
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(name), &count, |bencher, _| {
            bencher.iter(|| black_box(plan(black_box(&pair), black_box(&a), black_box(&b), black_box(&snapshot))));
        });
    }

    group.finish();
}

fn bench_plan_all_new(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_all_new");
    let pair = Pair::new("/a", "/b");

    for (name, count) in [("100_files", 100), ("1000_files", 1000)] {
        let (a, b) = create_all_new_maps(count);
        let snapshot = SnapshotDocument::default();
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(name), &count, |bencher, _| {
            bencher.iter(|| black_box(plan(black_box(&pair), black_box(&a), black_box(&b), black_box(&snapshot))));
        });
    }

    group.finish();
}

fn bench_plan_modified(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_modified");
    let pair = Pair::new("/a", "/b");

    for (name, count, percent) in [("1000_files_10pct", 1000, 10), ("1000_files_50pct", 1000, 50), ("1000_files_90pct", 1000, 90)] {
        let (a, b) = create_modified_maps(count, percent);
        let snapshot = SnapshotDocument::default();
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(name), &count, |bencher, _| {
            bencher.iter(|| black_box(plan(black_box(&pair), black_box(&a), black_box(&b), black_box(&snapshot))));
        });
    }

    group.finish();
}

fn bench_plan_renames(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_renames");
    let pair = Pair::new("/a", "/b");

    for (name, count, percent) in [("1000_files_10pct", 1000, 10), ("1000_files_50pct", 1000, 50), ("1000_files_90pct", 1000, 90)] {
        let (a, b) = create_renamed_maps(count, percent);
        let snapshot = SnapshotDocument::default();
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(name), &count, |bencher, _| {
            bencher.iter(|| black_box(plan(black_box(&pair), black_box(&a), black_box(&b), black_box(&snapshot))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_plan_scale, bench_plan_all_new, bench_plan_modified, bench_plan_renames);
criterion_main!(benches);
