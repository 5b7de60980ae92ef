//! Cross-shard independence: a blocked shard never delays the others.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feedflow_sequential::{FutureSubscriber, SequentialInput, SequentialProcessor};
use tokio::sync::Notify;

fn to_shard(shard: usize) -> impl Fn(&&'static str, usize) -> usize + Send + Sync {
    move |_, _| shard
}

#[tokio::test(flavor = "multi_thread")]
async fn blocked_shard_does_not_delay_other_shards() {
    let processor = SequentialProcessor::builder().shard_count(4).build();

    let release_a = Arc::new(Notify::new());
    let a_started = Arc::new(Notify::new());
    let b_ran = Arc::new(AtomicBool::new(false));
    let c_ran = Arc::new(AtomicBool::new(false));
    let d_ran = Arc::new(AtomicBool::new(false));

    // A parks shard 0 until released.
    {
        let release_a = Arc::clone(&release_a);
        let a_started = Arc::clone(&a_started);
        processor
            .process_sequentially(SequentialInput::new(
                "A",
                to_shard(0),
                FutureSubscriber::new(move |_| async move {
                    a_started.notify_one();
                    release_a.notified().await;
                    Ok::<_, std::convert::Infallible>(())
                }),
            ))
            .unwrap();
    }
    tokio::time::timeout(Duration::from_secs(1), a_started.notified())
        .await
        .unwrap();

    // B queues behind A on shard 0; C and D land on free shards.
    for (label, shard, flag) in [
        ("B", 0, Arc::clone(&b_ran)),
        ("C", 1, Arc::clone(&c_ran)),
        ("D", 2, Arc::clone(&d_ran)),
    ] {
        processor
            .process_sequentially(SequentialInput::new(
                label,
                to_shard(shard),
                FutureSubscriber::new(move |_| async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(())
                }),
            ))
            .unwrap();
    }

    tokio::time::timeout(Duration::from_secs(1), async {
        while !(c_ran.load(Ordering::SeqCst) && d_ran.load(Ordering::SeqCst)) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("independent shards must complete while shard 0 is blocked");
    assert!(!b_ran.load(Ordering::SeqCst), "B must wait behind A");

    release_a.notify_one();
    tokio::time::timeout(Duration::from_secs(1), async {
        while !b_ran.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("B must start once A completes");
}

#[tokio::test(flavor = "multi_thread")]
async fn distinct_shards_run_concurrently() {
    let processor = SequentialProcessor::builder().shard_count(8).build();
    let barrier = Arc::new(tokio::sync::Barrier::new(8));

    let mut waiters = Vec::new();
    for shard in 0..8usize {
        let barrier = Arc::clone(&barrier);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        waiters.push(rx);
        processor
            .process_sequentially(SequentialInput::new(
                (),
                move |_: &(), _| shard,
                FutureSubscriber::new(move |_| async move {
                    // Only passes if all eight subscribers are alive at once.
                    barrier.wait().await;
                    let _ = tx.send(());
                    Ok::<_, std::convert::Infallible>(())
                }),
            ))
            .unwrap();
    }

    for rx in waiters {
        tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("shards did not run in parallel")
            .unwrap();
    }
}
