//! Transaction manager behavior against the in-memory store.
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use lottery_core::transaction::{SavepointOperation, TransactionError};
use lottery_runtime::TransactionManager;
use lottery_testing::{MemoryStore, MemoryTransaction};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

type Rows = Vec<String>;
type Manager = TransactionManager<MemoryStore<Rows>>;

#[derive(Error, Debug, PartialEq)]
enum TestError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("unit failed: {0}")]
    Unit(&'static str),
}

fn setup() -> (MemoryStore<Rows>, Manager) {
    let store = MemoryStore::new(Vec::new());
    let manager = TransactionManager::new(Arc::new(store.clone()));
    (store, manager)
}

fn write(tx: &mut MemoryTransaction<Rows>, row: &str) {
    tx.state_mut().push(row.to_string());
}

#[tokio::test]
async fn successful_unit_commits() {
    let (store, tm) = setup();

    let value = tm
        .run(|tx| {
            Box::pin(async move {
                write(tx, "A");
                Ok::<_, TestError>(42)
            })
        })
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(store.snapshot(), vec!["A"]);
    assert_eq!(store.stats().committed, 1);
}

#[tokio::test]
async fn failing_unit_rolls_back_everything() {
    let (store, tm) = setup();

    let result = tm
        .run(|tx| {
            Box::pin(async move {
                write(tx, "A");
                Err::<(), _>(TestError::Unit("boom"))
            })
        })
        .await;

    assert_eq!(result, Err(TestError::Unit("boom")));
    assert!(store.snapshot().is_empty());
    assert_eq!(store.stats().rolled_back, 1);
}

#[tokio::test]
async fn nested_failure_is_isolated_to_its_savepoint() {
    let (store, tm) = setup();
    let inner = tm.clone();

    tm.run(move |tx| {
        Box::pin(async move {
            write(tx, "A");
            let nested = inner
                .nested(tx, |tx| {
                    Box::pin(async move {
                        write(tx, "B");
                        Err::<(), _>(TestError::Unit("inner"))
                    })
                })
                .await;
            assert_eq!(nested, Err(TestError::Unit("inner")));
            Ok::<_, TestError>(())
        })
    })
    .await
    .unwrap();

    assert_eq!(store.snapshot(), vec!["A"]);
    assert_eq!(store.stats().savepoint_rollbacks, 1);
}

#[tokio::test]
async fn three_levels_with_failing_innermost_keep_two_writes() {
    let (store, tm) = setup();
    let level2 = tm.clone();

    tm.run(move |tx| {
        Box::pin(async move {
            write(tx, "level1");
            let level3 = level2.clone();
            level2
                .nested(tx, move |tx| {
                    Box::pin(async move {
                        write(tx, "level2");
                        let inner = level3
                            .nested(tx, |tx| {
                                Box::pin(async move {
                                    write(tx, "level3");
                                    Err::<(), _>(TestError::Unit("level3"))
                                })
                            })
                            .await;
                        assert!(inner.is_err());
                        Ok::<_, TestError>(())
                    })
                })
                .await
        })
    })
    .await
    .unwrap();

    assert_eq!(store.snapshot(), vec!["level1", "level2"]);
}

#[tokio::test]
async fn propagated_inner_failure_aborts_outer_transaction() {
    let (store, tm) = setup();
    let inner = tm.clone();

    let result = tm
        .run(move |tx| {
            Box::pin(async move {
                write(tx, "A");
                inner
                    .nested(tx, |tx| {
                        Box::pin(async move {
                            write(tx, "B");
                            Err::<(), _>(TestError::Unit("inner"))
                        })
                    })
                    .await
            })
        })
        .await;

    assert_eq!(result, Err(TestError::Unit("inner")));
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn sibling_nested_calls_use_distinct_savepoints() {
    let (store, tm) = setup();
    let inner = tm.clone();

    tm.run(move |tx| {
        Box::pin(async move {
            for row in ["first", "second", "third"] {
                let outcome = inner
                    .nested(tx, move |tx| {
                        Box::pin(async move {
                            write(tx, row);
                            if row == "second" {
                                Err(TestError::Unit("second"))
                            } else {
                                Ok(())
                            }
                        })
                    })
                    .await;
                assert_eq!(outcome.is_ok(), row != "second");
            }
            Ok::<_, TestError>(())
        })
    })
    .await
    .unwrap();

    assert_eq!(store.snapshot(), vec!["first", "third"]);
    let stats = store.stats();
    assert_eq!(stats.savepoints_created, 3);
    assert_eq!(stats.savepoints_released, 2);
    assert_eq!(stats.savepoint_rollbacks, 1);
}

#[tokio::test]
async fn run_within_nests_when_a_transaction_is_supplied() {
    let (store, tm) = setup();
    let inner = tm.clone();

    tm.run(move |tx| {
        Box::pin(async move {
            write(tx, "outer");
            let _ = inner
                .run_within(Some(tx), |tx| {
                    Box::pin(async move {
                        write(tx, "discarded");
                        Err::<(), _>(TestError::Unit("nested"))
                    })
                })
                .await;
            Ok::<_, TestError>(())
        })
    })
    .await
    .unwrap();

    tm.run_within(None, |tx| {
        Box::pin(async move {
            write(tx, "standalone");
            Ok::<_, TestError>(())
        })
    })
    .await
    .unwrap();

    assert_eq!(store.snapshot(), vec!["outer", "standalone"]);
    assert_eq!(store.stats().committed, 2);
}

#[tokio::test]
async fn begin_failure_leaves_no_state() {
    let (store, tm) = setup();
    store.fail_next_begin();

    let result = tm
        .run(|tx| {
            Box::pin(async move {
                write(tx, "A");
                Ok::<_, TestError>(())
            })
        })
        .await;

    assert!(matches!(result, Err(TestError::Transaction(TransactionError::Begin(_)))));
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn commit_failure_is_reported() {
    let (store, tm) = setup();
    store.fail_next_commit();

    let result = tm
        .run(|tx| {
            Box::pin(async move {
                write(tx, "A");
                Ok::<_, TestError>(())
            })
        })
        .await;

    assert!(matches!(result, Err(TestError::Transaction(TransactionError::Commit(_)))));
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn savepoint_failure_propagates_as_transaction_error() {
    let (store, tm) = setup();
    store.fail_next_savepoint(SavepointOperation::Create);
    let inner = tm.clone();

    let result = tm
        .run(move |tx| {
            Box::pin(async move {
                write(tx, "A");
                inner
                    .nested(tx, |tx| {
                        Box::pin(async move {
                            write(tx, "B");
                            Ok::<_, TestError>(())
                        })
                    })
                    .await
            })
        })
        .await;

    assert!(matches!(
        result,
        Err(TestError::Transaction(TransactionError::Savepoint {
            operation: SavepointOperation::Create,
            ..
        }))
    ));
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn panic_rolls_back_and_resumes() {
    let (store, tm) = setup();

    let handle = tokio::spawn(async move {
        tm.run(|tx| {
            Box::pin(async move {
                write(tx, "A");
                if tx.state().len() == 1 {
                    panic!("unit exploded");
                }
                Ok::<_, TestError>(())
            })
        })
        .await
    });

    let joined = handle.await;
    assert!(joined.expect_err("task should panic").is_panic());
    assert!(store.snapshot().is_empty());
    assert_eq!(store.stats().rolled_back, 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_rolls_back_with_timeout_error() {
    let (store, tm) = setup();
    let tm = tm.with_timeout(Duration::from_secs(5));

    let result = tm
        .run(|tx| {
            Box::pin(async move {
                write(tx, "A");
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, TestError>(())
            })
        })
        .await;

    assert_eq!(
        result,
        Err(TestError::Transaction(TransactionError::Timeout(Duration::from_secs(5))))
    );
    assert!(store.snapshot().is_empty());
}
