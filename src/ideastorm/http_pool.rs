//! Shared HTTP client pool.
//!
//! One `reqwest::Client` per base URL, created lazily and reused across
//! requests so TCP connections, DNS results, and TLS sessions are shared
//! rather than re-established per call.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

lazy_static::lazy_static! {
    static ref CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Get or create the shared HTTP client for the given base URL.
pub fn get_http_client(base_url: &str, request_timeout: Duration) -> reqwest::Client {
    let mut pool = CLIENT_POOL.lock().unwrap();

    if let Some(client) = pool.get(base_url) {
        return client.clone();
    }

    let client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(request_timeout)
        .build()
        .expect("Failed to build HTTP client");

    pool.insert(base_url.to_string(), client.clone());
    client
}
