//! Path resolution: walk a dotted relation path over already-populated
//! records to collect the flat set an annotator must mutate.

use crate::error::ViewError;
use crate::record::{Populated, Record};
use crate::view::spec::{EntityFetchSpec, FetchSpecRegistry, FieldFetchSpec};

/// Records reachable at `path` from `roots`. The empty path returns the roots
/// unchanged (root-level annotations attach there). The result is an
/// unordered bag: grouped by source record, in whatever order each populated
/// collection holds.
///
/// Every segment must name a relation that the plan already populated;
/// anything else is a defect in the view/spec pairing and fails.
pub fn resolve_at_path(
    root: &EntityFetchSpec,
    registry: &FetchSpecRegistry,
    path: &str,
    roots: &[Record],
) -> Result<Vec<Record>, ViewError> {
    if path.is_empty() {
        return Ok(roots.to_vec());
    }

    let mut entity = root;
    let mut current: Vec<Record> = roots.to_vec();
    let mut walked = String::new();

    for segment in path.split('.') {
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);

        let rel = match entity.segment_spec(segment) {
            None => {
                return Err(ViewError::InvalidPath {
                    path: path.to_string(),
                    reason: "field fetch spec not found",
                    at: walked,
                })
            }
            Some(FieldFetchSpec::Relation(rel)) => rel,
            Some(_) => {
                return Err(ViewError::InvalidPath {
                    path: path.to_string(),
                    reason: "non-relation field encountered",
                    at: walked,
                })
            }
        };

        let mut next = Vec::new();
        for record in &current {
            match record.relation(segment) {
                None => {
                    return Err(ViewError::InvalidPath {
                        path: path.to_string(),
                        reason: "relation not populated",
                        at: walked,
                    })
                }
                Some(Populated::One(r)) => next.push(r),
                Some(Populated::Many(rs)) => next.extend(rs),
            }
        }
        current = next;

        entity = match registry.get(&rel.target) {
            Some(e) => e,
            None => {
                return Err(ViewError::InvalidPath {
                    path: path.to_string(),
                    reason: "field fetch spec not found",
                    at: walked,
                })
            }
        };
    }

    Ok(current)
}
