//! Per-invocation client benchmarks.
//!
//! Requires a reachable PostgreSQL server in `DATABASE_URL`; without it
//! the benchmarks are skipped.
//!
//! Example: DATABASE_URL=postgres://localhost/bench cargo bench --bench clients

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use pg_client_bench::client::{DbHandle, DeadpoolHandle, SqlxHandle};
use pg_client_bench::fixture::Fixture;
use pg_client_bench::workload::{LatencyRead, MixedWrite, PointRead, Workload};

const POOL_SIZE: u32 = 10;

fn connect(rt: &Runtime) -> Option<Vec<Arc<dyn DbHandle>>> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("DATABASE_URL not set, skipping client benchmarks");
            return None;
        }
    };

    rt.block_on(async {
        let sqlx = SqlxHandle::connect(&url, POOL_SIZE).await;
        let deadpool = DeadpoolHandle::connect(&url, POOL_SIZE).await;
        match (sqlx, deadpool) {
            (Ok(sqlx), Ok(deadpool)) => Some(vec![
                Arc::new(sqlx) as Arc<dyn DbHandle>,
                Arc::new(deadpool) as Arc<dyn DbHandle>,
            ]),
            (sqlx, deadpool) => {
                if let Ok(handle) = sqlx {
                    handle.close().await;
                }
                if let Ok(handle) = deadpool {
                    handle.close().await;
                }
                eprintln!("could not connect to DATABASE_URL, skipping client benchmarks");
                None
            }
        }
    })
}

fn bench_workload(
    c: &mut Criterion,
    rt: &Runtime,
    handles: &[Arc<dyn DbHandle>],
    workload: &dyn Workload,
) {
    let mut group = c.benchmark_group(format!("clients/{}", workload.name()));

    for handle in handles {
        group.bench_with_input(
            BenchmarkId::from_parameter(handle.library()),
            handle,
            |b, handle| {
                b.to_async(rt).iter(|| async {
                    black_box(workload.run(handle.as_ref()).await).unwrap_or_else(|e| {
                        panic!("{} failed on {}: {}", workload.name(), handle.library(), e)
                    });
                });
            },
        );
    }

    group.finish();
}

fn bench_clients(c: &mut Criterion) {
    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            return;
        }
    };
    let Some(handles) = connect(&rt) else {
        return;
    };

    bench_workload(c, &rt, &handles, &PointRead::new());
    bench_workload(c, &rt, &handles, &LatencyRead::new(Duration::from_millis(1)));

    for handle in &handles {
        let fixture = match Fixture::new(format!("bench_clients_{}", handle.library())) {
            Ok(fixture) => fixture,
            Err(e) => {
                eprintln!("invalid fixture table: {}", e);
                continue;
            }
        };
        if let Err(e) = rt.block_on(fixture.setup(handle.as_ref())) {
            eprintln!("fixture setup failed: {}", e);
            continue;
        }

        let workload = MixedWrite::new(fixture.clone());
        bench_workload(c, &rt, std::slice::from_ref(handle), &workload);

        if let Err(e) = rt.block_on(fixture.teardown(handle.as_ref())) {
            eprintln!("fixture teardown failed: {}", e);
        }
    }

    rt.block_on(async {
        for handle in &handles {
            handle.close().await;
        }
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(50).measurement_time(Duration::from_secs(5));
    targets = bench_clients
}
criterion_main!(benches);
