use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;
use stowage_envelope::{Algorithm, SecretKey};
use stowage_storage::{LocalStorage, ListOptions};
use tempfile::TempDir;

async fn connect(temp: &TempDir, bucket: &str, algorithm: Option<Algorithm>) -> LocalStorage {
    let mut builder = LocalStorage::builder()
        .root(temp.path())
        .bucket(bucket)
        .temp_dir(temp.path().join("staging"));
    if let Some(algorithm) = algorithm {
        builder = builder.encryption(algorithm.codec(SecretKey::from_bytes([5; 32])));
    }
    builder.connect().await.unwrap()
}

// ============================================================================
// Benchmark: Path Resolution & Security Validation
// ============================================================================

fn bench_path_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_resolution");

    let temp = TempDir::new().unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let storage = rt.block_on(connect(&temp, "resolve", None));

    group.bench_function("simple_key", |b| {
        b.iter(|| {
            black_box(storage.resolve("test.dat").unwrap());
        });
    });

    group.bench_function("nested_key", |b| {
        b.iter(|| {
            black_box(storage.resolve("a/3/f/0/9/c/1/e/test.dat").unwrap());
        });
    });

    group.bench_function("rejected_key", |b| {
        b.iter(|| {
            black_box(storage.resolve("a/../../etc/passwd").unwrap_err());
        });
    });

    group.finish();
}

// ============================================================================
// Benchmark: Write & Read Paths
// ============================================================================

fn bench_file_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_operations");
    group.measurement_time(Duration::from_secs(10));

    let temp = TempDir::new().unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();

    let sizes = [("1KB", 1024usize), ("64KB", 64 * 1024), ("1MB", 1024 * 1024)];
    let variants = [
        ("plain", None),
        ("chacha", Some(Algorithm::ChaCha20Poly1305)),
        ("aes", Some(Algorithm::Aes256Gcm)),
    ];

    for (variant, algorithm) in variants {
        let storage = rt.block_on(connect(&temp, variant, algorithm));

        for (name, size) in sizes {
            let data: Vec<u8> = (0..size).map(|i| u8::try_from(i % 256).unwrap()).collect();
            group.throughput(Throughput::Bytes(size as u64));

            group.bench_with_input(BenchmarkId::new(format!("write_{variant}"), name), &data, |b, data| {
                b.to_async(&rt).iter(|| async {
                    storage.write(format!("bench_{name}.dat"), data.clone()).await.unwrap();
                });
            });

            rt.block_on(storage.write(format!("read_{name}.dat"), data.clone())).unwrap();

            group.bench_function(BenchmarkId::new(format!("read_{variant}"), name), |b| {
                b.to_async(&rt).iter(|| async {
                    black_box(storage.read(format!("read_{name}.dat")).await.unwrap());
                });
            });
        }

        rt.block_on(storage.shutdown());
    }

    group.finish();
}

// ============================================================================
// Benchmark: Listing
// ============================================================================

fn bench_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("listing");

    let temp = TempDir::new().unwrap();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let storage = rt.block_on(async {
        let storage = connect(&temp, "listing", None).await;
        for i in 0..500 {
            storage.write(format!("{}/{i}.txt", i % 16), "x").await.unwrap();
        }
        storage
    });

    group.bench_function("walk_500_files", |b| {
        b.to_async(&rt).iter(|| async {
            let cursor = storage.files_cursor(ListOptions::per_page(50)).unwrap();
            black_box(cursor.collect_all().await.unwrap());
        });
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_path_resolution, bench_file_operations, bench_listing);

criterion_main!(benches);
