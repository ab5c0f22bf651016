//! Paginated lookup that stops and reports as soon as one page is throttled.
//!
//! Simulates a workspace with several pages of users where the remote
//! service starts answering 429 partway through. The search gives up on the
//! first throttled page and hands the wait/ETA back to its own caller instead
//! of sleeping.
//!
//! Run with: `cargo run --example paginated_search`

use callgate::{ApiFailure, GovernedDispatcher};
use serde_json::{json, Value};
use std::cell::Cell;
use tracing_subscriber::EnvFilter;

/// Stand-in for a remote `users.list` endpoint.
struct FakeDirectory {
    pages: Vec<Vec<Value>>,
    throttle_from_page: usize,
    served: Cell<usize>,
}

impl FakeDirectory {
    fn users_list(&self, cursor: Option<&str>) -> Result<Value, ApiFailure> {
        let page: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        if page >= self.throttle_from_page {
            return Err(ApiFailure::too_many_requests(Some(20)));
        }
        self.served.set(self.served.get() + 1);

        let next_cursor = if page + 1 < self.pages.len() {
            (page + 1).to_string()
        } else {
            String::new()
        };
        Ok(json!({
            "ok": true,
            "members": self.pages[page],
            "response_metadata": {"next_cursor": next_cursor},
        }))
    }
}

/// Collects every user whose name fields contain `needle`, case-insensitive.
///
/// Returns the throttled record unchanged if any page is throttled.
fn find_users_by_name(
    dispatcher: &GovernedDispatcher,
    directory: &FakeDirectory,
    needle: &str,
) -> Result<Value, ApiFailure> {
    let needle = needle.to_lowercase();
    let mut members = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = dispatcher.dispatch_json("users_list", || directory.users_list(cursor.as_deref()))?;
        if callgate::is_throttle_payload(&page) {
            return Ok(page);
        }

        if let Some(batch) = page["members"].as_array() {
            members.extend(batch.iter().cloned());
        }
        match page["response_metadata"]["next_cursor"].as_str() {
            Some(next) if !next.is_empty() => cursor = Some(next.to_string()),
            _ => break,
        }
    }

    let matches: Vec<Value> = members
        .into_iter()
        .filter(|user| {
            ["real_name", "display_name", "name"].iter().any(|field| {
                user[*field]
                    .as_str()
                    .is_some_and(|value| value.to_lowercase().contains(&needle))
            })
        })
        .collect();

    Ok(json!({"ok": true, "matches": matches}))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let pages = vec![
        vec![
            json!({"id": "U1", "name": "ada", "real_name": "Ada Lovelace"}),
            json!({"id": "U2", "name": "grace", "real_name": "Grace Hopper"}),
        ],
        vec![json!({"id": "U3", "name": "alan", "real_name": "Alan Turing"})],
        vec![json!({"id": "U4", "name": "adele", "real_name": "Adele Goldberg"})],
    ];

    let dispatcher = GovernedDispatcher::new();

    println!("=== Full directory available ===");
    let directory = FakeDirectory {
        pages: pages.clone(),
        throttle_from_page: usize::MAX,
        served: Cell::new(0),
    };
    match find_users_by_name(&dispatcher, &directory, "ad") {
        Ok(result) => println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default()),
        Err(err) => println!("Lookup failed: {}", err),
    }

    println!("\n=== Throttled on page 2 ===");
    let directory = FakeDirectory {
        pages,
        throttle_from_page: 1,
        served: Cell::new(0),
    };
    match find_users_by_name(&dispatcher, &directory, "ad") {
        Ok(result) => println!("{}", result["message"]),
        Err(err) => println!("Lookup failed: {}", err),
    }
    println!("Pages served before the throttle: {}", directory.served.get());

    println!("\n=== Immediate retry ===");
    match find_users_by_name(&dispatcher, &directory, "ad") {
        Ok(result) => println!("{} (no request sent)", result["message"]),
        Err(err) => println!("Lookup failed: {}", err),
    }

    println!("\n{}", dispatcher.metrics());
}
