//! Integration tests for the state sequencer.
//!
//! These tests validate:
//! 1. Operations run strictly one at a time, in enqueue order
//! 2. Each operation observes exactly the state its predecessor left
//! 3. A failing operation kills the sequencer and aborts the backlog
//! 4. continue_on_error keeps the sequencer (and its state) alive
//!
//! They run on the default current-thread test runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use job_throttle::core::{Sequencer, ThrottleError};

#[tokio::test]
async fn operations_fold_over_the_state_in_order() {
    let seq = Sequencer::create(0_u64);

    // Each operation reads, yields mid-flight, then writes. Interleaving
    // would make both read the same value.
    let first = seq
        .enqueue(|st| {
            Box::pin(async move {
                let old = *st;
                tokio::task::yield_now().await;
                *st = old + 1;
                Ok(old)
            })
        })
        .unwrap();
    let second = seq
        .enqueue(|st| {
            Box::pin(async move {
                let old = *st;
                tokio::task::yield_now().await;
                *st = old + 1;
                Ok(old)
            })
        })
        .unwrap();

    assert_eq!(first.await.unwrap(), 0);
    assert_eq!(second.await.unwrap(), 1);

    let final_state = seq
        .enqueue(|st| Box::pin(async move { Ok(*st) }))
        .unwrap();
    assert_eq!(final_state.await.unwrap(), 2);
}

#[tokio::test]
async fn at_most_one_operation_touches_the_state() {
    let seq = Sequencer::create(());
    let active = Arc::new(AtomicUsize::new(0));
    let observed_max = Arc::new(AtomicUsize::new(0));

    let futures: Vec<_> = (0..5)
        .map(|_| {
            let active = Arc::clone(&active);
            let observed_max = Arc::clone(&observed_max);
            seq.enqueue(move |_st| {
                Box::pin(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    observed_max.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .unwrap()
        })
        .collect();

    for fut in futures {
        fut.await.unwrap();
    }
    assert_eq!(observed_max.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_operation_kills_the_sequencer() {
    let seq = Sequencer::create(vec![String::from("keep")]);

    let failing = seq
        .enqueue(|_st| {
            Box::pin(async move { Err::<u32, _>(anyhow::anyhow!("deliberate failure")) })
        })
        .unwrap();
    let aborted = seq
        .enqueue(|st| Box::pin(async move { Ok(st.len()) }))
        .unwrap();

    assert!(matches!(failing.await, Err(ThrottleError::JobFailed(_))));
    assert!(matches!(aborted.await, Err(ThrottleError::Aborted)));
    assert!(seq.is_dead());

    assert!(matches!(
        seq.enqueue(|st| Box::pin(async move { Ok(st.len()) })),
        Err(ThrottleError::Dead)
    ));
}

#[tokio::test]
async fn continue_on_error_preserves_the_state() {
    let seq = Sequencer::create_with_policy(10_u64, true);

    let failing = seq
        .enqueue(|st| {
            Box::pin(async move {
                *st += 1;
                Err::<u32, _>(anyhow::anyhow!("deliberate failure"))
            })
        })
        .unwrap();
    let after = seq
        .enqueue(|st| Box::pin(async move { Ok(*st) }))
        .unwrap();

    assert!(matches!(failing.await, Err(ThrottleError::JobFailed(_))));
    // The failing operation's write sticks; the sequencer stays alive.
    assert_eq!(after.await.unwrap(), 11);
    assert!(!seq.is_dead());
}

#[tokio::test]
async fn waiting_count_tracks_the_backlog() {
    let seq = Sequencer::create(0_u32);
    let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();

    let blocked = seq
        .enqueue(move |st| {
            Box::pin(async move {
                gate_rx.await.ok();
                *st += 1;
                Ok(*st)
            })
        })
        .unwrap();
    let queued = seq
        .enqueue(|st| Box::pin(async move { Ok(*st) }))
        .unwrap();

    assert_eq!(seq.num_jobs_waiting_to_start(), 1);

    let done = seq.prior_jobs_done();
    gate_tx.send(()).ok();
    assert_eq!(blocked.await.unwrap(), 1);
    assert_eq!(queued.await.unwrap(), 1);
    done.await;
    assert_eq!(seq.num_jobs_waiting_to_start(), 0);
}
