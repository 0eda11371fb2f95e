//! Request signing and call throttling
//!
//! Every OpenAPI request carries a `Signature` header: the lowercase hex MD5
//! of `path + "\r\n" + token + "\r\n" + timestamp`, where the separators are
//! the literal four characters backslash-r-backslash-n rather than CR/LF.

use md5::{Digest, Md5};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Compute the request signature for `path`
pub fn sign(path: &str, api_key: &str, timestamp: &str) -> String {
    let payload = format!(r"{}\r\n{}\r\n{}", path, api_key, timestamp);
    let mut hasher = Md5::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Current epoch time in milliseconds as a decimal string
pub fn timestamp_ms() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

/// Minimum spacing between outgoing calls of one client
///
/// Each caller reserves the next free slot under the lock and then sleeps
/// outside of it, so concurrent callers are spread out rather than released
/// together.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the caller may issue a request
    pub async fn wait(&self) {
        let slot = {
            let mut next = self
                .next_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::config::DEFAULT_MIN_INTERVAL_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_uses_literal_escape_separators() {
        let mut hasher = Md5::new();
        hasher.update(b"/op/v0/device/list\\r\\nKEY\\r\\n1700000000000");
        let expected = format!("{:x}", hasher.finalize());
        assert_eq!(sign("/op/v0/device/list", "KEY", "1700000000000"), expected);
    }

    #[test]
    fn signature_known_vectors() {
        assert_eq!(
            sign("/op/v0/device/generation", "test-key", "1700000000000"),
            "ed216eda7c74b6d2f41a1a1ff61198fb"
        );
        assert_eq!(
            sign("/op/v0/device/list", "abc", "1"),
            "1393ab10f272c6576ecbd56ae9fe8c51"
        );
    }

    #[test]
    fn signature_is_lowercase_hex() {
        let sig = sign("/op/v1/device/detail", "abc", "1");
        assert_eq!(sig.len(), 32);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(sig, sign("/op/v1/device/detail", "abc", "2"));
        assert_ne!(sig, sign("/op/v1/device/scheduler/get", "abc", "1"));
        assert_ne!(sig, sign("/op/v1/device/detail", "abd", "1"));
    }

    #[test]
    fn timestamp_is_milliseconds() {
        let ts: i64 = timestamp_ms().parse().unwrap();
        assert!(ts > 1_600_000_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_is_not_delayed() {
        let throttle = Throttle::new(Duration::from_secs(2));
        let start = Instant::now();
        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_calls_are_spaced() {
        let throttle = Throttle::new(Duration::from_secs(2));
        let start = Instant::now();
        throttle.wait().await;
        throttle.wait().await;
        throttle.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_gap_resets_the_gate() {
        let throttle = Throttle::new(Duration::from_secs(2));
        throttle.wait().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        let before = Instant::now();
        throttle.wait().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
