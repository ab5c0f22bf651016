use callgate::{
    ApiFailure, GovernedDispatcher, GovernorBuilder, HttpFailure, Outcome, OverwritePolicy,
    RateLimitLedger, WorkOutcome,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

/// Error type of a hypothetical HTTP client, to check the adapter works with
/// types other than `ApiFailure`.
#[derive(Debug, Clone, PartialEq)]
struct ClientError {
    status: u16,
    headers: HashMap<String, String>,
}

impl HttpFailure for ClientError {
    fn status_code(&self) -> Option<u16> {
        Some(self.status)
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[test]
fn test_cooldown_timeline() {
    let dispatcher = GovernedDispatcher::new();
    let calls = AtomicU32::new(0);
    let work = || {
        calls.fetch_add(1, Ordering::SeqCst);
        WorkOutcome::<_, ApiFailure>::Success("posted")
    };

    // t=0: the remote service says wait 2 seconds
    dispatcher.ledger().set_limit("chat.send", Duration::from_secs(2));

    // t=0.1: still cooling down, reported as 2 (rounded up from ~1.9)
    thread::sleep(Duration::from_millis(100));
    let outcome = dispatcher.dispatch("chat.send", work).unwrap();
    let throttled = outcome.throttled().expect("should be throttled");
    assert_eq!(throttled.retry_after(), 2);
    assert!(throttled.wait() < Duration::from_secs(2));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // t=2.2: cooldown over, work runs and its value comes back unchanged
    thread::sleep(Duration::from_millis(2100));
    let outcome = dispatcher.dispatch("chat.send", work).unwrap();
    assert_eq!(outcome, Outcome::Completed("posted"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_payload_signal_blocks_until_eta() {
    let dispatcher = GovernedDispatcher::new();
    let method = "chat_postMessage";
    let calls = AtomicU32::new(0);
    let ok_call = || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, ApiFailure>(json!({"ok": true}))
    };

    let result = dispatcher.dispatch_json(method, ok_call).unwrap();
    assert_eq!(result["ok"], true);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let result = dispatcher
        .dispatch_json(method, || {
            Ok::<_, ApiFailure>(json!({"error": "ratelimited", "retry_after": 1}))
        })
        .unwrap();
    assert_eq!(result["error"], "ratelimited");
    assert_eq!(result["retry_after"], 1);
    let eta = chrono::DateTime::parse_from_rfc3339(result["eta"].as_str().unwrap()).unwrap();
    let until_eta = eta.with_timezone(&chrono::Utc) - chrono::Utc::now();
    assert!(until_eta > chrono::Duration::milliseconds(800));
    assert!(until_eta <= chrono::Duration::seconds(1));

    // While limited, the call is not made
    let result = dispatcher.dispatch_json(method, ok_call).unwrap();
    assert_eq!(result["error"], "ratelimited");
    assert!(result["retry_after"].as_u64().unwrap() <= 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    thread::sleep(Duration::from_millis(1100));

    let result = dispatcher.dispatch_json(method, ok_call).unwrap();
    assert_eq!(result["ok"], true);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_429_failure_throttles_same_and_next_call() {
    let dispatcher = GovernedDispatcher::new();
    let err = ClientError {
        status: 429,
        headers: HashMap::from([("Retry-After".to_string(), "1".to_string())]),
    };

    let result = dispatcher
        .dispatch_json("conversations_history", || Err(err.clone()))
        .unwrap();
    assert_eq!(result["error"], "ratelimited");
    assert_eq!(result["retry_after"], 1);
    assert!(result["message"]
        .as_str()
        .unwrap()
        .contains("conversations_history"));

    let result = dispatcher
        .dispatch_json("conversations_history", || Ok::<Value, ClientError>(json!({"ok": true})))
        .unwrap();
    assert_eq!(result["error"], "ratelimited");
}

#[test]
fn test_unrelated_failure_leaves_no_trace() {
    let dispatcher = GovernedDispatcher::new();
    let err = ClientError {
        status: 503,
        headers: HashMap::from([("Retry-After".to_string(), "60".to_string())]),
    };

    let result = dispatcher.dispatch_json("users_list", || Err::<Value, _>(err.clone()));
    assert_eq!(result, Err(err));
    assert_eq!(dispatcher.ledger().tracked_operations(), 0);

    let result = dispatcher
        .dispatch_json("users_list", || Ok::<Value, ClientError>(json!({"ok": true})))
        .unwrap();
    assert_eq!(result["ok"], true);
}

#[test]
fn test_concurrent_calls_are_not_serialized() {
    let dispatcher = GovernedDispatcher::new();
    let barrier = Arc::new(Barrier::new(2));
    let mut handles = vec![];

    // Both calls must be inside their unit of work at the same time to get
    // past the barrier.
    for _ in 0..2 {
        let dispatcher = dispatcher.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            dispatcher
                .dispatch("search_messages", || {
                    barrier.wait();
                    WorkOutcome::<_, ApiFailure>::Success(())
                })
                .unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Outcome::Completed(()));
    }
}

#[test]
fn test_throttle_discovered_under_load() {
    let dispatcher = GovernedDispatcher::new();
    let executed = Arc::new(AtomicU32::new(0));
    let mut handles = vec![];

    for _ in 0..16 {
        let dispatcher = dispatcher.clone();
        let executed = executed.clone();
        handles.push(thread::spawn(move || {
            let mut throttled = 0;
            for _ in 0..50 {
                let outcome = dispatcher
                    .dispatch("users_list", || {
                        executed.fetch_add(1, Ordering::SeqCst);
                        WorkOutcome::<(), ApiFailure>::ThrottleSignal(Some(Duration::from_secs(10)))
                    })
                    .unwrap();
                if outcome.is_throttled() {
                    throttled += 1;
                }
            }
            throttled
        }));
    }

    let throttled: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    // Every call is reported as throttled, whichever path produced it
    assert_eq!(throttled, 16 * 50);

    // Only calls racing the very first signal got through to the remote side
    let executed = executed.load(Ordering::SeqCst);
    assert!(executed >= 1);
    assert!(executed <= 16);

    let metrics = dispatcher.metrics();
    assert_eq!(metrics.total_throttle_signals, executed as u64);
    assert_eq!(metrics.total_short_circuited, 16 * 50 - executed as u64);
}

#[test]
fn test_operations_do_not_share_cooldowns() {
    let dispatcher = GovernedDispatcher::new();

    let _ = dispatcher.dispatch("files_upload", || {
        WorkOutcome::<(), ApiFailure>::ThrottleSignal(None)
    });

    let outcome = dispatcher
        .dispatch("chat_postMessage", || WorkOutcome::<_, ApiFailure>::Success(1))
        .unwrap();
    assert_eq!(outcome, Outcome::Completed(1));

    let limited = dispatcher.ledger().limited_operations();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].0, "files_upload");
    assert_eq!(limited[0].1.retry_after_secs(), 30);
}

#[test]
fn test_overwrite_policies() {
    for (policy, expect_long) in [
        (OverwritePolicy::LastSignalWins, false),
        (OverwritePolicy::LongestWaitWins, true),
    ] {
        let ledger = Arc::new(RateLimitLedger::with_policy(policy));
        ledger.set_limit("conversations_create", Duration::from_secs(30));
        ledger.set_limit("conversations_create", Duration::from_secs(2));

        let dispatcher = GovernorBuilder::new().shared_ledger(ledger).build();
        let outcome = dispatcher
            .dispatch("conversations_create", || WorkOutcome::<_, ApiFailure>::Success(()))
            .unwrap();

        let retry_after = outcome.throttled().unwrap().retry_after();
        if expect_long {
            assert_eq!(retry_after, 30, "{:?}", policy);
        } else {
            assert_eq!(retry_after, 2, "{:?}", policy);
        }
    }
}
