//! Small helpers shared by node kinds.

use std::collections::HashMap;

/// Merge string maps left to right; later maps win on duplicate keys.
pub fn merge_string_maps(maps: &[&HashMap<String, String>]) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for map in maps {
        merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}
