//! SHA-256 hex ID generation.
//!
//! Issue ids have the shape `<prefix>-<hex>` where `<hex>` is the leading
//! slice of a SHA-256 digest over the creation inputs. Child ids append a
//! `.N` suffix to the parent id.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Minimum hash length in hex digits.
pub const MIN_LENGTH: usize = 4;
/// Maximum hash length in hex digits.
pub const MAX_LENGTH: usize = 8;
/// Default collision probability threshold for adaptive sizing.
pub const MAX_COLLISION_PROB: f64 = 0.25;
/// How many nonces to try before giving up on a unique id.
pub const MAX_ATTEMPTS: u32 = 100;

/// Creates a hash-based id for an issue.
///
/// The hash covers `title|creator|timestamp|nonce`, so retrying with a fresh
/// nonce yields an unrelated candidate. `length` is clamped to 4..=8.
pub fn generate_hash_id(
    prefix: &str,
    title: &str,
    creator: &str,
    timestamp: DateTime<Utc>,
    length: usize,
    nonce: u32,
) -> String {
    let length = length.clamp(MIN_LENGTH, MAX_LENGTH);
    let content = format!(
        "{}|{}|{}|{}",
        title,
        creator,
        timestamp.timestamp_nanos_opt().unwrap_or(0),
        nonce
    );
    let digest = Sha256::digest(content.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{}-{}", prefix, &hex[..length])
}

/// Forms a child id under `parent`, picking the lowest free `.N` suffix.
///
/// `existing` is the set of ids already present in the store.
pub fn next_child_id(parent: &str, existing: &[String]) -> String {
    let mut n = 1u32;
    loop {
        let candidate = format!("{parent}.{n}");
        if !existing.iter().any(|id| *id == candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Splits an id into `(prefix, rest)` at the first dash.
pub fn split_prefix(id: &str) -> Option<(&str, &str)> {
    id.split_once('-')
}

/// Birthday-bound collision probability for `num_issues` ids of `id_length`
/// hex digits: `P ~ 1 - e^(-n^2 / 2N)`.
fn collision_probability(num_issues: usize, id_length: usize) -> f64 {
    let total: f64 = 16.0_f64.powi(id_length as i32);
    let exponent = -(num_issues as f64).powi(2) / (2.0 * total);
    1.0 - exponent.exp()
}

/// Picks the shortest hash length in `MIN_LENGTH..=MAX_LENGTH` that keeps the
/// collision probability at or below `max_collision_prob`.
pub fn compute_adaptive_length(num_issues: usize, max_collision_prob: f64) -> usize {
    for length in MIN_LENGTH..=MAX_LENGTH {
        if collision_probability(num_issues, length) <= max_collision_prob {
            return length;
        }
    }
    MAX_LENGTH
}
