use crossbeam_channel::TryRecvError;
use funnel::CancelToken;
use std::thread;
use std::time::{Duration, Instant};

// --- CancelToken ---

#[test]
fn test_token_starts_live() {
    let token = CancelToken::new();
    assert!(!token.is_cancelled());
    assert_eq!(token.done().try_recv(), Err(TryRecvError::Empty));
}

#[test]
fn test_cancel_is_idempotent_and_shared() {
    let token = CancelToken::new();
    let clone = token.clone();
    token.cancel();
    token.cancel();
    assert!(clone.is_cancelled());
    assert_eq!(clone.done().try_recv(), Err(TryRecvError::Disconnected));
}

#[test]
fn test_wait_timeout_expires() {
    let token = CancelToken::new();
    let start = Instant::now();
    assert!(!token.wait_timeout(Duration::from_millis(30)));
    assert!(start.elapsed() >= Duration::from_millis(25));
}

#[test]
fn test_wait_timeout_wakes_on_cancel() {
    let token = CancelToken::new();
    let canceller = token.clone();
    let h = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        canceller.cancel();
    });
    let start = Instant::now();
    assert!(token.wait_timeout(Duration::from_secs(5)));
    assert!(start.elapsed() < Duration::from_secs(2));
    h.join().unwrap();
}

// --- Scope ---

#[test]
fn test_scope_ends_at_deadline() {
    let token = CancelToken::new();
    let scope = token.scope(Duration::from_millis(20));
    assert!(!scope.is_cancelled());
    assert!(scope.remaining().unwrap() <= Duration::from_millis(20));
    thread::sleep(Duration::from_millis(30));
    assert!(scope.is_cancelled());
    assert!(scope.deadline_passed());
    assert_eq!(scope.remaining(), Some(Duration::ZERO));
    // The parent is unaffected by a child deadline.
    assert!(!token.is_cancelled());
}

#[test]
fn test_scope_follows_parent_cancel() {
    let token = CancelToken::new();
    let scope = token.scope(Duration::from_secs(60));
    token.cancel();
    assert!(scope.is_cancelled());
    assert!(!scope.deadline_passed());
}

#[test]
fn test_scope_sleep_completes() {
    let scope = CancelToken::new().scope(Duration::from_secs(5));
    assert!(scope.sleep(Duration::from_millis(5)));
}

#[test]
fn test_scope_sleep_cut_short_by_deadline() {
    let scope = CancelToken::new().scope(Duration::from_millis(20));
    let start = Instant::now();
    assert!(!scope.sleep(Duration::from_secs(5)));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_scope_sleep_cut_short_by_cancel() {
    let token = CancelToken::new();
    let scope = token.scope(Duration::from_secs(60));
    let canceller = token.clone();
    let h = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        canceller.cancel();
    });
    let start = Instant::now();
    assert!(!scope.sleep(Duration::from_secs(5)));
    assert!(start.elapsed() < Duration::from_secs(2));
    h.join().unwrap();
    // Already cancelled: returns at once.
    assert!(!scope.sleep(Duration::from_secs(5)));
}

#[test]
fn test_scope_wait_returns_at_deadline() {
    let scope = CancelToken::new().scope(Duration::from_millis(20));
    let start = Instant::now();
    scope.wait();
    assert!(start.elapsed() >= Duration::from_millis(15));
    assert!(scope.is_cancelled());
}

#[test]
fn test_huge_timeout_has_no_deadline() {
    let scope = CancelToken::new().scope(Duration::MAX);
    assert_eq!(scope.deadline(), None);
    assert_eq!(scope.remaining(), None);
    assert!(!scope.is_cancelled());
}
