//! Failure semantics: failures, panics and abandoned completions all
//! advance the shard; nothing stalls it permanently.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feedflow_core::LogContext;
use feedflow_sequential::{
    Completion, CompletionOutcome, FutureSubscriber, SequentialInput, SequentialProcessor,
    Subscriber,
};

async fn drain(processor: &SequentialProcessor) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while processor.unprocessed() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("shard stalled");
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_subscribers_advance_the_queue_like_successes() {
    let outcomes = Arc::new(AtomicUsize::new(0));
    let outcomes_probe = Arc::clone(&outcomes);
    let processor = SequentialProcessor::builder()
        .shard_count(2)
        .on_input_completed(move |_, outcome| {
            if outcome == CompletionOutcome::Failed {
                outcomes_probe.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build();
    let after_ran = Arc::new(AtomicBool::new(false));

    processor
        .process_sequentially(SequentialInput::new(
            (),
            |_: &(), _| 0,
            FutureSubscriber::new(|_| async { Err::<(), _>("decode failed") }),
        ))
        .unwrap();
    {
        let after_ran = Arc::clone(&after_ran);
        processor
            .process_sequentially(SequentialInput::new(
                (),
                |_: &(), _| 0,
                FutureSubscriber::new(move |_| async move {
                    after_ran.store(true, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(())
                }),
            ))
            .unwrap();
    }

    drain(&processor).await;
    assert!(after_ran.load(Ordering::SeqCst));
    assert_eq!(outcomes.load(Ordering::SeqCst), 1);
}

struct PanickingSubscriber;

impl Subscriber<()> for PanickingSubscriber {
    fn subscribe(self, _payload: (), _completion: Completion) {
        panic!("subscriber blew up in subscribe");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_subscribe_does_not_stall_the_shard() {
    let processor = SequentialProcessor::builder().shard_count(2).build();
    let after_ran = Arc::new(AtomicBool::new(false));

    processor
        .process_sequentially(SequentialInput::new((), |_: &(), _| 0, PanickingSubscriber))
        .unwrap();
    {
        let after_ran = Arc::clone(&after_ran);
        processor
            .process_sequentially(SequentialInput::new(
                (),
                |_: &(), _| 0,
                FutureSubscriber::new(move |_| async move {
                    after_ran.store(true, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(())
                }),
            ))
            .unwrap();
    }

    drain(&processor).await;
    assert!(after_ran.load(Ordering::SeqCst));
}

struct ForgetfulSubscriber;

impl Subscriber<()> for ForgetfulSubscriber {
    fn subscribe(self, _payload: (), completion: Completion) {
        // Never fires the handle; dropping it is the contract violation.
        drop(completion);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn abandoned_completion_is_reported_and_advances() {
    let abandoned = Arc::new(AtomicUsize::new(0));
    let abandoned_probe = Arc::clone(&abandoned);
    let processor = SequentialProcessor::builder()
        .shard_count(2)
        .on_input_completed(move |_, outcome| {
            if outcome == CompletionOutcome::Abandoned {
                abandoned_probe.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build();
    let after_ran = Arc::new(AtomicBool::new(false));

    processor
        .process_sequentially(
            SequentialInput::new((), |_: &(), _| 0, ForgetfulSubscriber)
                .context(LogContext::new().with("match_id", "40291")),
        )
        .unwrap();
    {
        let after_ran = Arc::clone(&after_ran);
        processor
            .process_sequentially(SequentialInput::new(
                (),
                |_: &(), _| 0,
                FutureSubscriber::new(move |_| async move {
                    after_ran.store(true, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(())
                }),
            ))
            .unwrap();
    }

    drain(&processor).await;
    assert!(after_ran.load(Ordering::SeqCst));
    assert_eq!(abandoned.load(Ordering::SeqCst), 1);
}
