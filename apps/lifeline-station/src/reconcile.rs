use std::collections::HashMap;

use lifeline_proto::{ChatEvent, DedupKey};

/// Merge a relay history snapshot into the locally cached sequence.
///
/// Local entries are inserted first; a snapshot entry only lands when its
/// dedup key is absent, so on an identical key the local copy wins (same
/// event by definition, only the `id` can differ). The result is sorted
/// ascending by timestamp; equal-timestamp entries with distinct keys are
/// both kept, their relative order unspecified. Applying the same snapshot
/// again changes nothing.
pub fn merge(local: &[ChatEvent], snapshot: &[ChatEvent]) -> Vec<ChatEvent> {
    let mut by_key: HashMap<DedupKey, ChatEvent> =
        HashMap::with_capacity(local.len() + snapshot.len());
    for event in local {
        by_key.insert(event.dedup_key(), event.clone());
    }
    for event in snapshot {
        by_key
            .entry(event.dedup_key())
            .or_insert_with(|| event.clone());
    }

    let mut merged: Vec<ChatEvent> = by_key.into_values().collect();
    merged.sort_by_key(|event| event.timestamp);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(sender: &str, timestamp: u64, text: &str) -> ChatEvent {
        ChatEvent::new(sender, text, Some(timestamp))
    }

    fn keys(events: &[ChatEvent]) -> Vec<DedupKey> {
        events.iter().map(|e| e.dedup_key()).collect()
    }

    #[test]
    fn snapshot_fills_in_missing_events() {
        // Scenario D from the relay's point of view.
        let local = vec![event("a", 100, "hi")];
        let snapshot = vec![event("a", 100, "hi"), event("b", 200, "yo")];

        let merged = merge(&local, &snapshot);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].sender, "a");
        assert_eq!(merged[1].sender, "b");
    }

    #[test]
    fn merge_is_idempotent() {
        let local = vec![event("a", 100, "hi"), event("b", 300, "late")];
        let snapshot = vec![event("a", 100, "hi"), event("b", 200, "yo")];

        let once = merge(&local, &snapshot);
        let twice = merge(&once, &snapshot);
        assert_eq!(once, twice);
    }

    #[test]
    fn identical_dedup_keys_collapse_to_the_local_copy() {
        let local_copy = event("a", 100, "hi");
        let server_copy = event("a", 100, "hi");
        assert_ne!(local_copy.id, server_copy.id);

        let merged = merge(
            std::slice::from_ref(&local_copy),
            std::slice::from_ref(&server_copy),
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, local_copy.id, "local entry wins the tie");
    }

    #[test]
    fn merged_set_is_the_same_regardless_of_origin() {
        let a = vec![event("a", 100, "hi"), event("b", 200, "yo")];
        let b = vec![event("c", 150, "mid")];

        let mut left = keys(&merge(&a, &b));
        let mut right = keys(&merge(&b, &a));
        left.sort_by(|x, y| (&x.sender, x.timestamp).cmp(&(&y.sender, y.timestamp)));
        right.sort_by(|x, y| (&x.sender, x.timestamp).cmp(&(&y.sender, y.timestamp)));
        assert_eq!(left, right);
    }

    #[test]
    fn result_is_sorted_by_timestamp() {
        let local = vec![event("a", 300, "three"), event("a", 100, "one")];
        let snapshot = vec![event("b", 200, "two")];

        let merged = merge(&local, &snapshot);
        let timestamps: Vec<u64> = merged.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, [100, 200, 300]);
    }

    #[test]
    fn distinct_texts_at_equal_timestamps_are_both_kept() {
        let local = vec![event("a", 100, "first")];
        let snapshot = vec![event("a", 100, "second")];

        let merged = merge(&local, &snapshot);
        assert_eq!(merged.len(), 2);
    }
}
