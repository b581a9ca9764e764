use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::time_utils::current_unix_timestamp_ms;

static RECORD_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Builds an opaque record id such as `run_3f9a0c...` from a prefix.
///
/// Ids are unique within a process and collision-resistant across processes.
pub fn new_record_id(prefix: &str) -> String {
    let counter = RECORD_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_else(|_| u128::from(current_unix_timestamp_ms()));

    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(counter.to_le_bytes());
    let digest = hasher.finalize();

    let mut id = String::with_capacity(prefix.len() + 17);
    id.push_str(prefix);
    id.push('_');
    for byte in digest.iter().take(8) {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::new_record_id;

    #[test]
    fn unit_record_ids_carry_prefix_and_hex_suffix() {
        let id = new_record_id("run");
        let suffix = id.strip_prefix("run_").expect("prefix");
        assert_eq!(suffix.len(), 16);
        assert!(suffix.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn functional_record_ids_do_not_repeat_within_process() {
        let ids = (0..1_000)
            .map(|_| new_record_id("aud"))
            .collect::<HashSet<_>>();
        assert_eq!(ids.len(), 1_000);
    }
}
