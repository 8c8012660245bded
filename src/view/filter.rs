//! Query constraints for relation scoping: JSON-shaped filters
//! (`{"is_public": true}`, `{"$or": [...]}`) merged and handed to the
//! repository, which renders them as parameterized WHERE clauses.

use serde_json::{json, Value};
use std::collections::HashMap;

/// Caller-supplied extra constraints keyed by absolute relation path,
/// AND-merged with the relation's own context filter.
pub type RelationFilters = HashMap<String, Value>;

/// Merge two optional constraints: both present → logical AND, one present →
/// that one, neither → none.
pub fn and(a: Option<Value>, b: Option<Value>) -> Option<Value> {
    match (a, b) {
        (Some(a), Some(b)) => Some(json!({ "$and": [a, b] })),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_merge_under_and() {
        let merged = and(
            Some(json!({"is_public": true})),
            Some(json!({"author_id": 7})),
        );
        assert_eq!(
            merged,
            Some(json!({"$and": [{"is_public": true}, {"author_id": 7}]}))
        );
    }

    #[test]
    fn single_side_passes_through_exactly() {
        let f = json!({"is_public": true});
        assert_eq!(and(Some(f.clone()), None), Some(f.clone()));
        assert_eq!(and(None, Some(f.clone())), Some(f));
        assert_eq!(and(None, None), None);
    }
}
