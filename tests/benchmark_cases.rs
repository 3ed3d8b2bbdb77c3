//! End-to-end engine tests against the stub handle

mod common;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use indicatif::ProgressBar;

use common::{stub_config, StubHandle};
use pg_client_bench::bench::sequential::INITIAL_CAPACITY;
use pg_client_bench::bench::{BenchmarkDriver, Case, SequentialRunner, WorkerPool, WorkloadEntry};
use pg_client_bench::client::{ConnectionSet, DbHandle, Library};
use pg_client_bench::fixture::Fixture;
use pg_client_bench::models::{CaseMode, CaseReport, CaseStatus};
use pg_client_bench::workload::{LatencyRead, MixedWrite, PointRead, Workload};
use pg_client_bench::BenchError;

fn point_read_case(mode: CaseMode) -> Case {
    Case {
        library: Library::Sqlx,
        workload: Arc::new(PointRead::new()),
        mode,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_budget_is_exact() {
    for concurrency in [1, 4, 10] {
        let stub = Arc::new(StubHandle::new(Library::Sqlx));
        let measurement = WorkerPool::new(concurrency, 100, None)
            .run(
                stub.clone(),
                Arc::new(PointRead::new()),
                ProgressBar::hidden(),
            )
            .await;

        assert!(measurement.error.is_none());
        assert_eq!(measurement.runs.len(), 100, "concurrency {}", concurrency);
        assert_eq!(measurement.successes(), 100);
        assert_eq!(stub.calls(), 100);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn sequential_mean_tracks_handle_latency() {
    let stub = StubHandle::new(Library::Deadpool).with_latency(Duration::from_millis(1));
    let measurement = SequentialRunner::new(100, None)
        .run(&stub, &PointRead::new(), &ProgressBar::hidden())
        .await;

    let report = CaseReport::from_runs(
        Library::Deadpool,
        "point_read",
        CaseMode::Sequential,
        &measurement.runs,
        measurement.wall_time,
        CaseStatus::Completed,
    );
    assert_eq!(report.iterations, 100);
    assert!(report.latency.avg >= Duration::from_millis(1));
    assert!(report.latency.avg < Duration::from_millis(5));
    assert!(report.latency.min <= report.latency.p50());
    assert!(report.latency.p50() <= report.latency.p95());
    assert!(report.latency.p95() <= report.latency.p99());
    assert!(report.latency.p99() <= report.latency.max);
}

#[tokio::test(flavor = "multi_thread")]
async fn deadline_stops_before_budget() {
    let stub = StubHandle::new(Library::Sqlx).with_latency(Duration::from_millis(5));
    let measurement = SequentialRunner::new(1_000_000, Some(Duration::from_millis(50)))
        .run(&stub, &PointRead::new(), &ProgressBar::hidden())
        .await;

    assert!(measurement.error.is_none());
    assert!(measurement.runs.len() < 100);
    assert!(measurement.runs.capacity() <= INITIAL_CAPACITY as usize);
    assert!(measurement.wall_time < Duration::from_millis(500));
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_deadline_stops_before_budget() {
    let stub = Arc::new(StubHandle::new(Library::Sqlx).with_latency(Duration::from_millis(5)));
    let measurement = WorkerPool::new(4, 1_000_000, Some(Duration::from_millis(50)))
        .run(
            stub.clone(),
            Arc::new(PointRead::new()),
            ProgressBar::hidden(),
        )
        .await;

    assert!(measurement.error.is_none());
    assert!(!measurement.runs.is_empty());
    assert!(measurement.runs.len() < 400);
    assert_eq!(stub.calls(), measurement.runs.len() as u64);
    assert!(measurement.wall_time >= Duration::from_millis(50));
    assert!(measurement.wall_time < Duration::from_millis(500));
}

#[tokio::test(flavor = "multi_thread")]
async fn latency_read_overlaps_across_workers() {
    let stub = Arc::new(StubHandle::new(Library::Sqlx));
    let measurement = WorkerPool::new(10, 100, None)
        .run(
            stub.clone(),
            Arc::new(LatencyRead::new(Duration::from_millis(10))),
            ProgressBar::hidden(),
        )
        .await;

    assert!(measurement.error.is_none());
    assert_eq!(measurement.runs.len(), 100);
    assert!(measurement.wall_time >= Duration::from_millis(100));
    assert!(measurement.wall_time < Duration::from_millis(400));
}

#[tokio::test(flavor = "multi_thread")]
async fn sequential_failure_aborts_case() {
    let driver = BenchmarkDriver::new(stub_config()).unwrap();
    let stub: Arc<dyn DbHandle> = Arc::new(StubHandle::new(Library::Sqlx).failing_on(5));

    let report = driver
        .run_case(stub, &point_read_case(CaseMode::Sequential))
        .await;

    assert_eq!(report.iterations, 4);
    assert_eq!(report.errors, 1);
    assert!(report.is_failed());
    match &report.status {
        CaseStatus::Failed { error } => assert!(error.contains("stub failure on call 5")),
        CaseStatus::Completed => panic!("case should have failed"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_failure_stops_other_workers() {
    let driver = BenchmarkDriver::new(stub_config()).unwrap();
    let stub: Arc<dyn DbHandle> = Arc::new(
        StubHandle::new(Library::Sqlx)
            .with_latency(Duration::from_millis(1))
            .failing_on(5),
    );

    let report = driver
        .run_case(stub, &point_read_case(CaseMode::Concurrent(4)))
        .await;

    assert!(report.is_failed());
    assert_eq!(report.errors, 1);
    assert!(report.iterations >= 4);
    assert!(report.iterations < 100);
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_panic_fails_only_the_case() {
    let driver = BenchmarkDriver::new(stub_config()).unwrap();
    let stub: Arc<dyn DbHandle> = Arc::new(StubHandle::new(Library::Sqlx).panicking_on(3));

    let report = driver
        .run_case(stub, &point_read_case(CaseMode::Concurrent(2)))
        .await;

    assert!(report.is_failed());
    assert_eq!(report.errors, 1);
    match &report.status {
        CaseStatus::Failed { error } => assert!(error.contains("panicked")),
        CaseStatus::Completed => panic!("case should have failed"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn teardown_runs_when_workload_always_fails() {
    let driver = BenchmarkDriver::new(stub_config()).unwrap();
    let stub = Arc::new(StubHandle::new(Library::Deadpool).failing_on(1));
    let workload = Arc::new(MixedWrite::new(Fixture::new("benchmark_users").unwrap()));

    let case = Case {
        library: Library::Deadpool,
        workload,
        mode: CaseMode::Concurrent(4),
    };
    let report = driver.run_case(stub.clone(), &case).await;

    assert!(report.is_failed());
    let statements = stub.statements();
    assert!(statements
        .first()
        .is_some_and(|s| s.starts_with("CREATE TABLE IF NOT EXISTS benchmark_users")));
    assert_eq!(
        statements.last().map(String::as_str),
        Some("DROP TABLE IF EXISTS benchmark_users")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_setup_skips_measurement() {
    let driver = BenchmarkDriver::new(stub_config()).unwrap();
    let stub = Arc::new(StubHandle::new(Library::Sqlx).failing_ddl());
    let case = Case {
        library: Library::Sqlx,
        workload: Arc::new(MixedWrite::new(Fixture::new("benchmark_users").unwrap())),
        mode: CaseMode::Concurrent(2),
    };

    let report = driver.run_case(stub.clone(), &case).await;

    assert!(report.is_failed());
    assert_eq!(report.iterations, 0);
    assert_eq!(report.errors, 1);
    assert_eq!(stub.calls(), 0);
    match &report.status {
        CaseStatus::Failed { error } => assert!(error.starts_with("Schema error")),
        CaseStatus::Completed => panic!("case should have failed"),
    }
}

#[tokio::test]
async fn fixture_setup_and_teardown_are_idempotent() {
    let stub = StubHandle::new(Library::Sqlx);
    let fixture = Fixture::new("benchmark_users").unwrap();

    fixture.setup(&stub).await.unwrap();
    fixture.setup(&stub).await.unwrap();
    fixture.teardown(&stub).await.unwrap();
    fixture.teardown(&stub).await.unwrap();

    assert_eq!(stub.statements().len(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn mixed_write_counts_grow() {
    let stub = StubHandle::new(Library::Sqlx);
    let workload = MixedWrite::new(Fixture::new("benchmark_users").unwrap());

    for _ in 0..3 {
        workload.run(&stub).await.unwrap();
    }
    assert_eq!(stub.calls(), 6);
}

#[tokio::test(flavor = "multi_thread")]
async fn driver_continues_after_failed_case() {
    let config = stub_config()
        .with_iterations(20)
        .with_concurrency_levels(vec![1, 2]);
    let driver = BenchmarkDriver::new(config).unwrap();
    let stub: Arc<dyn DbHandle> = Arc::new(StubHandle::new(Library::Sqlx).failing_on(5));

    let report = driver.run(&[stub]).await;

    assert_eq!(report.cases.len(), 5);
    assert_eq!(report.failed_cases().count(), 1);
    assert!(report.get(Library::Sqlx, "point_read", 1).unwrap().is_failed());
    assert!(!report.get(Library::Sqlx, "latency_read", 2).unwrap().is_failed());
    assert_eq!(
        report.get(Library::Sqlx, "mixed_write", 2).unwrap().iterations,
        20
    );
    assert!(!report.database.contains("secret"));
}

#[tokio::test(flavor = "multi_thread")]
async fn custom_workloads_run_through_driver() {
    let config = stub_config().with_iterations(10);
    let entries = vec![WorkloadEntry::new(
        Arc::new(PointRead::new()),
        vec![CaseMode::Sequential, CaseMode::Concurrent(3)],
    )];
    let driver = BenchmarkDriver::with_workloads(config, entries).unwrap();
    let stub = Arc::new(StubHandle::new(Library::Deadpool));

    let report = driver.run(&[stub.clone() as Arc<dyn DbHandle>]).await;

    assert_eq!(report.cases.len(), 2);
    assert!(!report.has_failures());
    assert_eq!(stub.calls(), 20);
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_set_closes_once_on_success() {
    let stub = StubHandle::new(Library::Sqlx);
    let closes = stub.close_counter();
    let set = ConnectionSet::from_handles(vec![Arc::new(stub) as Arc<dyn DbHandle>]);
    let driver = BenchmarkDriver::new(stub_config().with_iterations(5)).unwrap();

    let report = set
        .scoped(|handles| async move { Ok(driver.run(&handles).await) })
        .await
        .unwrap();

    assert!(!report.has_failures());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_set_closes_once_on_error() {
    let stub = StubHandle::new(Library::Sqlx);
    let closes = stub.close_counter();
    let set = ConnectionSet::from_handles(vec![Arc::new(stub) as Arc<dyn DbHandle>]);

    let result: pg_client_bench::Result<()> = set
        .scoped(|_| async { Err(BenchError::WorkerError("aborted".to_string())) })
        .await;

    assert!(result.is_err());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

fn should_panic_now() -> bool {
    true
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_set_closes_once_on_panic() {
    let stub = StubHandle::new(Library::Deadpool);
    let closes = stub.close_counter();
    let set = ConnectionSet::from_handles(vec![Arc::new(stub) as Arc<dyn DbHandle>]);

    let outcome = AssertUnwindSafe(set.scoped(|_| async {
        if should_panic_now() {
            panic!("body panicked");
        }
        Ok(())
    }))
    .catch_unwind()
    .await;

    assert!(outcome.is_err());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn warmup_failure_aborts_case() {
    let driver = BenchmarkDriver::new(stub_config().with_warmup_iterations(3)).unwrap();
    let stub = Arc::new(StubHandle::new(Library::Sqlx).failing_on(2));

    let report = driver
        .run_case(stub.clone(), &point_read_case(CaseMode::Sequential))
        .await;

    assert!(report.is_failed());
    assert_eq!(report.iterations, 0);
    assert_eq!(report.errors, 1);
    assert_eq!(stub.calls(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn warmup_calls_are_not_measured() {
    let driver = BenchmarkDriver::new(
        stub_config()
            .with_iterations(10)
            .with_warmup_iterations(5),
    )
    .unwrap();
    let stub = Arc::new(StubHandle::new(Library::Deadpool));

    let report = driver
        .run_case(stub.clone(), &point_read_case(CaseMode::Concurrent(2)))
        .await;

    assert!(!report.is_failed());
    assert_eq!(report.iterations, 10);
    assert_eq!(stub.calls(), 15);
}

#[tokio::test(flavor = "multi_thread")]
async fn teardown_failure_marks_clean_case_failed() {
    let driver = BenchmarkDriver::new(stub_config().with_iterations(10)).unwrap();
    let stub = Arc::new(StubHandle::new(Library::Sqlx).failing_drop());
    let case = Case {
        library: Library::Sqlx,
        workload: Arc::new(MixedWrite::new(Fixture::new("benchmark_users").unwrap())),
        mode: CaseMode::Concurrent(2),
    };

    let report = driver.run_case(stub, &case).await;

    assert!(report.is_failed());
    assert_eq!(report.iterations, 10);
    assert_eq!(report.errors, 1);
    let record = report.record();
    assert_eq!(record.status, report.status);
    match &record.status {
        CaseStatus::Failed { error } => assert!(error.contains("drop benchmark_users")),
        CaseStatus::Completed => panic!("case should have failed"),
    }
}

#[tokio::test]
async fn open_closes_earlier_handles_when_one_fails() {
    let closes = Arc::new(AtomicUsize::new(0));
    let config = stub_config().with_libraries(vec![Library::Sqlx, Library::Deadpool]);

    let counter = closes.clone();
    let result = ConnectionSet::open_with(&config, move |library| {
        let counter = counter.clone();
        async move {
            match library {
                Library::Sqlx => Ok(Arc::new(
                    StubHandle::new(library).with_close_counter(counter),
                ) as Arc<dyn DbHandle>),
                Library::Deadpool => Err(BenchError::ConnectionError("refused".to_string())),
            }
        }
    })
    .await;

    assert!(matches!(result, Err(BenchError::ConnectionError(_))));
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn open_keeps_library_order() {
    let closes = Arc::new(AtomicUsize::new(0));
    let config = stub_config().with_libraries(vec![Library::Deadpool, Library::Sqlx]);

    let counter = closes.clone();
    let set = ConnectionSet::open_with(&config, move |library| {
        let counter = counter.clone();
        async move {
            Ok(Arc::new(StubHandle::new(library).with_close_counter(counter)) as Arc<dyn DbHandle>)
        }
    })
    .await
    .unwrap();

    assert_eq!(set.libraries(), vec![Library::Deadpool, Library::Sqlx]);
    set.close().await;
    assert_eq!(closes.load(Ordering::SeqCst), 2);
}
