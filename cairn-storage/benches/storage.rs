//! Benchmarks for block stores
//!
//! Run with: cargo bench --package cairn-storage --bench storage

use bytes::Bytes;
use cairn_core::checksum::Checksum;
use cairn_storage::backend::BlockStore;
use cairn_storage::memory::MemoryBackend;
use cairn_storage::sled_backend::SledStore;
use cairn_storage::StorageConfig;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

/// Generate test data of specified size
fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Generate a unique block key
fn generate_checksum(seed: u64) -> Checksum {
    Checksum::compute(&seed.to_le_bytes())
}

fn bench_put(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let sled = SledStore::open(&StorageConfig::new(temp_dir.path())).unwrap();
    let memory = MemoryBackend::new();
    let backends: [(&str, &dyn BlockStore); 2] = [("sled", &sled), ("memory", &memory)];

    let mut group = c.benchmark_group("block_put");

    for size in [
        1024,        // 1 KB
        64 * 1024,   // 64 KB
        1024 * 1024, // 1 MB
    ] {
        let data = Bytes::from(generate_data(size));
        group.throughput(Throughput::Bytes(size as u64));

        for (name, backend) in backends {
            let mut counter = 0u64;
            group.bench_with_input(BenchmarkId::new(name, format_size(size)), &data, |b, data| {
                b.iter(|| {
                    counter += 1;
                    backend
                        .put(generate_checksum(counter), black_box(data.clone()))
                        .unwrap()
                })
            });
        }
    }

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let sled = SledStore::open(&StorageConfig::new(temp_dir.path())).unwrap();
    let memory = MemoryBackend::new();
    let backends: [(&str, &dyn BlockStore); 2] = [("sled", &sled), ("memory", &memory)];

    let size = 64 * 1024;
    let data = Bytes::from(generate_data(size));
    let ids: Vec<Checksum> = (0..100).map(generate_checksum).collect();

    let mut group = c.benchmark_group("block_get");
    group.throughput(Throughput::Bytes(size as u64));

    for (name, backend) in backends {
        for id in &ids {
            backend.put(*id, data.clone()).unwrap();
        }
        backend.flush().unwrap();

        let mut idx = 0usize;
        group.bench_function(name, |b| {
            b.iter(|| {
                idx = (idx + 1) % ids.len();
                black_box(backend.get(&ids[idx]).unwrap())
            })
        });
    }

    group.finish();
}

/// Format size for display
fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{}MB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}B", bytes)
    }
}

criterion_group!(benches, bench_put, bench_get);
criterion_main!(benches);
