/// Idempotency-key issuance for mutating requests
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Length of the random alphanumeric suffix
const SUFFIX_LEN: usize = 8;

/// Issues collision-resistant keys of the form `prefix_<epoch-ms>_<random>`.
///
/// Every key issued during the process lifetime is tracked in an
/// in-memory set and re-checked, so two calls can never return an equal
/// key even if the random suffix collides. Keys are only locally
/// non-repeating; the server is expected to scope idempotency by
/// key plus caller.
pub struct IdempotencyIssuer {
    prefix: String,
    issued: Mutex<HashSet<String>>,
}

impl IdempotencyIssuer {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            issued: Mutex::new(HashSet::new()),
        }
    }

    /// Issue the next key, regenerating on collision with any
    /// previously issued key.
    pub fn next(&self) -> String {
        let mut issued = self.issued.lock();
        loop {
            let key = self.generate();
            // HashSet::insert returns false when the key was already present
            if issued.insert(key.clone()) {
                return key;
            }
        }
    }

    fn generate(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(char::from)
            .collect();

        format!("{}_{}_{}", self.prefix, millis, suffix)
    }
}

impl Default for IdempotencyIssuer {
    fn default() -> Self {
        Self::new("req")
    }
}
