//! Integration tests for the reconnect state machine.
//!
//! The controller performs no I/O, so these tests drive it directly with
//! generations the way the socket actor does.

use std::time::Duration;

use tether_reconnect::{ControllerState, Decision, Delay, ReconnectController, ReconnectPolicy};
use tether_transport::Generation;

// =========================================================================
// Helpers
// =========================================================================

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn fixed(delay_ms: u64) -> ReconnectController {
    ReconnectController::new(ReconnectPolicy::fixed(ms(delay_ms)))
}

/// Connects and opens, returning the open generation.
fn opened(controller: &mut ReconnectController) -> Generation {
    let generation = controller.connect_now().expect("not closed");
    assert!(controller.on_open(generation));
    generation
}

fn expect_retry(decision: Decision) -> (Generation, u32, Duration) {
    match decision {
        Decision::Retry {
            generation,
            attempt,
            delay,
        } => (generation, attempt, delay),
        other => panic!("expected a retry, got {other:?}"),
    }
}

// =========================================================================
// Initial connect
// =========================================================================

#[test]
fn test_initial_state() {
    let controller = fixed(100);
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(controller.generation(), Generation::new(0));
    assert_eq!(controller.attempt(), 0);
}

#[test]
fn test_connect_now_starts_generation_one() {
    let mut controller = fixed(100);
    let generation = controller.connect_now().unwrap();
    assert_eq!(generation, Generation::new(1));
    assert_eq!(controller.state(), ControllerState::Connecting { generation });

    assert!(controller.on_open(generation));
    assert_eq!(controller.state(), ControllerState::Idle);
}

// =========================================================================
// Duplicate suppression
// =========================================================================

#[test]
fn test_duplicate_signals_schedule_one_retry() {
    let mut controller = fixed(100);
    let lost = opened(&mut controller);

    let (next, attempt, delay) = expect_retry(controller.on_loss(lost));
    assert_eq!(next, lost.next());
    assert_eq!(attempt, 1);
    assert_eq!(delay, ms(100));

    for _ in 0..10 {
        assert_eq!(controller.on_loss(lost), Decision::Stale);
    }
    assert_eq!(
        controller.state(),
        ControllerState::Scheduled {
            generation: next,
            attempt: 1
        }
    );
}

#[test]
fn test_stale_timer_is_ignored() {
    let mut controller = fixed(100);
    let lost = opened(&mut controller);
    let (next, _, _) = expect_retry(controller.on_loss(lost));

    assert!(!controller.begin_attempt(lost));
    assert!(controller.begin_attempt(next));
    assert!(!controller.begin_attempt(next), "one attempt per generation");
}

#[test]
fn test_open_for_old_generation_is_ignored() {
    let mut controller = fixed(100);
    let first = controller.connect_now().unwrap();
    let second = controller.connect_now().unwrap();

    assert!(!controller.on_open(first));
    assert_eq!(controller.on_loss(first), Decision::Stale);
    assert!(controller.on_open(second));
}

// =========================================================================
// Backoff and retry budget
// =========================================================================

#[test]
fn test_failed_attempts_advance_backoff() {
    let mut controller = ReconnectController::new(ReconnectPolicy::exponential(ms(100), 2.0, ms(1_000)));
    let mut generation = opened(&mut controller);

    let mut delays = Vec::new();
    for expected_attempt in 1..=5 {
        let (next, attempt, delay) = expect_retry(controller.on_loss(generation));
        assert_eq!(attempt, expected_attempt);
        delays.push(delay);
        assert!(controller.begin_attempt(next));
        generation = next;
    }
    assert_eq!(delays, [ms(100), ms(200), ms(400), ms(800), ms(1_000)]);
}

#[test]
fn test_open_resets_attempts() {
    let mut controller = ReconnectController::new(ReconnectPolicy {
        delay: Delay::Linear {
            base: ms(10),
            step: ms(10),
        },
        ..Default::default()
    });
    let generation = opened(&mut controller);

    let (next, _, _) = expect_retry(controller.on_loss(generation));
    controller.begin_attempt(next);
    let (next, attempt, delay) = expect_retry(controller.on_loss(next));
    assert_eq!((attempt, delay), (2, ms(20)));

    controller.begin_attempt(next);
    assert!(controller.on_open(next));
    assert_eq!(controller.attempt(), 0);

    let (_, attempt, delay) = expect_retry(controller.on_loss(next));
    assert_eq!((attempt, delay), (1, ms(10)));
}

#[test]
fn test_retries_exhaust() {
    let mut controller = ReconnectController::new(ReconnectPolicy::fixed(ms(5)).with_retries(2));
    let generation = opened(&mut controller);

    let (next, _, _) = expect_retry(controller.on_loss(generation));
    controller.begin_attempt(next);
    let (next, _, _) = expect_retry(controller.on_loss(next));
    controller.begin_attempt(next);

    assert_eq!(controller.on_loss(next), Decision::Exhausted);
    assert_eq!(controller.state(), ControllerState::Exhausted);
    assert_eq!(controller.on_loss(next), Decision::Stale);
    assert_eq!(controller.on_loss(next.next()), Decision::Stale);
}

#[test]
fn test_zero_retries_gives_up_immediately() {
    let mut controller = ReconnectController::new(ReconnectPolicy::fixed(ms(5)).with_retries(0));
    let generation = opened(&mut controller);
    assert_eq!(controller.on_loss(generation), Decision::Exhausted);
}

#[test]
fn test_unbounded_retries_never_exhaust() {
    let mut controller = fixed(1);
    let mut generation = opened(&mut controller);
    for _ in 0..1_000 {
        let (next, _, _) = expect_retry(controller.on_loss(generation));
        assert!(controller.begin_attempt(next));
        generation = next;
    }
    assert_eq!(controller.attempt(), 1_000);
}

#[test]
fn test_connect_now_leaves_exhaustion() {
    let mut controller = ReconnectController::new(ReconnectPolicy::fixed(ms(5)).with_retries(0));
    let generation = opened(&mut controller);
    assert_eq!(controller.on_loss(generation), Decision::Exhausted);

    let generation = controller.connect_now().unwrap();
    assert!(controller.on_open(generation));
    assert_eq!(controller.state(), ControllerState::Idle);
}

// =========================================================================
// Close
// =========================================================================

#[test]
fn test_close_is_absorbing() {
    let mut controller = fixed(100);
    let generation = opened(&mut controller);
    let (next, _, _) = expect_retry(controller.on_loss(generation));

    controller.close();
    controller.close();

    assert!(controller.is_closed());
    assert!(!controller.begin_attempt(next));
    assert!(!controller.on_open(next));
    assert_eq!(controller.on_loss(next), Decision::Closed);
    assert_eq!(controller.connect_now(), None);
    assert!(!controller.is_current(next));
}
