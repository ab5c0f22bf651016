//! Basic usage example for the callgate crate.
//!
//! Run with: `RUST_LOG=callgate=debug cargo run --example basic`

use callgate::{
    ApiFailure, GovernedDispatcher, GovernorBuilder, Outcome, OverwritePolicy, WorkOutcome,
};
use serde_json::json;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Basic Call Governor Example ===\n");

    // Example 1: Pass-through and payload throttle signal
    payload_signal_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 2: HTTP 429 with Retry-After
    http_429_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 3: Custom configuration
    custom_config_example();

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 4: Cooldown expiry
    expiry_example();
}

fn payload_signal_example() {
    println!("1. Payload Throttle Signal:");

    let dispatcher = GovernedDispatcher::new();

    let value = dispatcher
        .dispatch_json("chat_postMessage", || {
            Ok::<_, ApiFailure>(json!({"ok": true, "ts": "1697360000.000100"}))
        })
        .unwrap_or_else(|err| json!({"error": err.to_string()}));
    println!("   First call:  {}", value);

    let value = dispatcher
        .dispatch_json("chat_postMessage", || {
            Ok::<_, ApiFailure>(json!({"error": "ratelimited", "retry_after": 3}))
        })
        .unwrap_or_else(|err| json!({"error": err.to_string()}));
    println!("   Second call: {}", value);

    let value = dispatcher
        .dispatch_json("chat_postMessage", || {
            println!("   (never printed: the call is short-circuited)");
            Ok::<_, ApiFailure>(json!({"ok": true}))
        })
        .unwrap_or_else(|err| json!({"error": err.to_string()}));
    println!("   Third call:  {}", value);
}

fn http_429_example() {
    println!("2. HTTP 429 Failure:");

    let dispatcher = GovernedDispatcher::new();

    let value = dispatcher
        .dispatch_json("conversations_history", || {
            Err(ApiFailure::new("ratelimited")
                .with_status(429)
                .with_header("Retry-After", "2"))
        })
        .unwrap_or_else(|err| json!({"error": err.to_string()}));
    println!("   429 response: {}", value["message"]);

    match dispatcher.dispatch_json("conversations_history", || {
        Err::<serde_json::Value, _>(ApiFailure::new("channel_not_found").with_status(404))
    }) {
        Ok(value) => println!("   Unexpected value: {}", value),
        Err(err) => println!("   Other failures pass through unchanged: {}", err),
    }
}

fn custom_config_example() {
    println!("3. Custom Configuration:");

    let dispatcher = GovernorBuilder::new()
        .default_retry_after_secs(10)
        .overwrite_policy(OverwritePolicy::LongestWaitWins)
        .build();

    println!("   Configuration:");
    println!("   - Default retry-after: {:?}", dispatcher.config().default_retry_after);
    println!("   - Overwrite policy: {:?}", dispatcher.config().overwrite_policy);

    let outcome = dispatcher.dispatch("users_list", || {
        WorkOutcome::<(), ApiFailure>::ThrottleSignal(None)
    });
    if let Ok(Outcome::Throttled(throttled)) = outcome {
        println!("   Signal without duration: wait {}s", throttled.retry_after());
    }

    println!("\n{}", dispatcher.metrics().summary());
}

fn expiry_example() {
    println!("4. Cooldown Expiry:");

    let dispatcher = GovernedDispatcher::new();
    dispatcher.ledger().set_limit("search_messages", Duration::from_millis(1500));

    for attempt in 1..=3 {
        let outcome = dispatcher.dispatch("search_messages", || {
            WorkOutcome::<_, ApiFailure>::Success("3 matches")
        });

        match outcome {
            Ok(Outcome::Completed(result)) => println!("   Attempt {} - ✅ {}", attempt, result),
            Ok(Outcome::Throttled(throttled)) => {
                println!(
                    "   Attempt {} - ⏳ throttled, retry in {}s (ETA {})",
                    attempt,
                    throttled.retry_after(),
                    throttled.eta_string()
                );
            }
            Err(err) => println!("   Attempt {} - ❌ {}", attempt, err),
        }

        thread::sleep(Duration::from_secs(1));
    }

    println!("\n   {}", dispatcher.ledger().stats());
}
