//! Address-matched insertion and lookup on a plan subtree

use crate::services::plan_tracer::models::{PlanNode, Relationship};

/// Stateless helpers operating on a rooted `PlanNode` subtree
pub struct TreeBuilder;

impl TreeBuilder {
    /// Attach `candidate` under the first node that declared its address.
    ///
    /// Slots are tried at the current node first (outer, then inner), then the
    /// search recurses into the existing outer child and the existing inner
    /// child. The candidate is handed back when no declaring parent has a free
    /// matching slot.
    pub fn insert(tree: &mut PlanNode, mut candidate: PlanNode) -> Result<Relationship, PlanNode> {
        let address = candidate.plan_address;
        if address == 0 {
            return Err(candidate);
        }

        for relationship in [Relationship::Outer, Relationship::Inner] {
            let declared = match relationship {
                Relationship::Outer => tree.left_child_address,
                Relationship::Inner => tree.right_child_address,
            };
            let slot = tree.slot_mut(relationship);
            if slot.is_none() && declared == address {
                candidate.relationship = Some(relationship);
                *slot = Some(Box::new(candidate));
                return Ok(relationship);
            }
        }

        for child in [tree.outer.as_deref_mut(), tree.inner.as_deref_mut()].into_iter().flatten() {
            match Self::insert(child, candidate) {
                Ok(relationship) => return Ok(relationship),
                Err(rejected) => candidate = rejected,
            }
        }

        Err(candidate)
    }

    /// Depth-first search (self, outer subtree, inner subtree). Address 0 never matches.
    pub fn find_by_address(tree: &PlanNode, address: u64) -> Option<&PlanNode> {
        if address == 0 {
            return None;
        }
        if tree.plan_address == address {
            return Some(tree);
        }
        tree.children().find_map(|child| Self::find_by_address(child, address))
    }

    pub fn find_by_address_mut(tree: &mut PlanNode, address: u64) -> Option<&mut PlanNode> {
        if address == 0 {
            return None;
        }
        if tree.plan_address == address {
            return Some(tree);
        }
        if let Some(outer) = tree.outer.as_deref_mut()
            && let Some(found) = Self::find_by_address_mut(outer, address)
        {
            return Some(found);
        }
        tree.inner
            .as_deref_mut()
            .and_then(|inner| Self::find_by_address_mut(inner, address))
    }
}
