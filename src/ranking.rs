// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result ranking and formatting.
//!
//! Turns raw (item_key, distance) pairs from the store into presentable
//! `SearchResult` values: distances become bounded similarity scores,
//! duplicate keys keep their best occurrence, ordering is deterministic,
//! and the set is truncated to top_k after dedup.

use std::collections::HashMap;

use crate::catalog::{FoodItem, Modality, SearchResult};
use crate::store::NearestNeighbor;

/// Maps a cosine distance to a similarity score clamped to [0, 1].
///
/// Out-of-range raw metric values are clamped rather than propagated.
pub fn similarity_from_distance(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Formats raw store hits into ranked results.
///
/// `items` carries the metadata fetched for the hit keys; hits whose key has
/// no metadata row are dropped (store inconsistency, logged, not an error).
pub fn format_results(
    hits: Vec<NearestNeighbor>,
    items: &[FoodItem],
    source_modality: Modality,
    top_k: usize,
) -> Vec<SearchResult> {
    let by_key: HashMap<&str, &FoodItem> =
        items.iter().map(|item| (item.key.as_str(), item)).collect();

    // Dedup: keep the highest similarity seen for each key.
    let mut best: HashMap<String, f32> = HashMap::new();
    for hit in hits {
        let similarity = similarity_from_distance(hit.distance);
        match best.get(&hit.item_key) {
            Some(&existing) if existing >= similarity => {}
            _ => {
                best.insert(hit.item_key, similarity);
            }
        }
    }

    let mut rows: Vec<(String, f32)> = best
        .into_iter()
        .filter(|(key, _)| {
            let known = by_key.contains_key(key.as_str());
            if !known {
                tracing::warn!("dropping hit for unknown item key: {}", key);
            }
            known
        })
        .collect();

    rows.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    rows.truncate(top_k);

    rows.into_iter()
        .enumerate()
        .map(|(i, (key, similarity))| SearchResult {
            item: (*by_key[key.as_str()]).clone(),
            item_key: key,
            similarity_score: similarity,
            rank: i + 1,
            source_modality,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str) -> FoodItem {
        FoodItem {
            key: key.to_string(),
            name: format!("item {}", key),
            description: String::new(),
            category: "test".to_string(),
            price: None,
            has_text_vector: true,
            has_image_vector: false,
            created_at: 0,
        }
    }

    fn hit(key: &str, distance: f32) -> NearestNeighbor {
        NearestNeighbor {
            item_key: key.to_string(),
            distance,
        }
    }

    #[test]
    fn similarity_is_clamped() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert_eq!(similarity_from_distance(1.0), 0.0);
        assert_eq!(similarity_from_distance(-0.5), 1.0);
        assert_eq!(similarity_from_distance(2.0), 0.0);
        assert!((similarity_from_distance(0.25) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn duplicate_keys_keep_best_occurrence() {
        let items = vec![item("a")];
        let results = format_results(
            vec![hit("a", 0.4), hit("a", 0.1)],
            &items,
            Modality::Text,
            10,
        );
        assert_eq!(results.len(), 1);
        assert!((results[0].similarity_score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn results_sorted_with_key_tiebreak() {
        let items = vec![item("b"), item("a"), item("c")];
        let results = format_results(
            vec![hit("b", 0.2), hit("a", 0.2), hit("c", 0.1)],
            &items,
            Modality::Text,
            10,
        );
        let keys: Vec<&str> = results.iter().map(|r| r.item_key.as_str()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[1].rank, 2);
        assert_eq!(results[2].rank, 3);
    }

    #[test]
    fn truncates_after_dedup_without_backfill() {
        let items = vec![item("a"), item("b"), item("c")];
        let results = format_results(
            vec![hit("a", 0.3), hit("a", 0.1), hit("b", 0.2), hit("c", 0.4)],
            &items,
            Modality::Text,
            2,
        );
        assert_eq!(results.len(), 2);
        let keys: Vec<&str> = results.iter().map(|r| r.item_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let items = vec![item("a")];
        let results = format_results(
            vec![hit("a", 0.2), hit("ghost", 0.0)],
            &items,
            Modality::Image,
            10,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item_key, "a");
        assert_eq!(results[0].source_modality, Modality::Image);
    }

    #[test]
    fn empty_hits_yield_empty_results() {
        let results = format_results(Vec::new(), &[], Modality::Text, 5);
        assert!(results.is_empty());
    }
}
