//! Per-query plan tree
//!
//! Probe events for one pid are not ordered, so a node may be declared before
//! its parent. `PlanTree` wraps the rooted tree with a bounded buffer of such
//! orphan nodes and re-roots when a late parent claims the current root.

use crate::services::plan_tracer::models::{PlanNode, PlanNodeSnapshot, Relationship};
use crate::services::plan_tracer::parser::ValueParser;
use crate::services::plan_tracer::tree::TreeBuilder;
use std::collections::VecDeque;
use tracing::{debug, warn};

pub const DEFAULT_MAX_PENDING_NODES: usize = 256;

/// Result of offering one declared node to a `PlanTree`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Address 0, never inserted
    Rejected,
    /// A node with the same address already exists; the existing node is kept
    Duplicate,
    /// The tree was empty and the node became the root
    Root,
    /// Attached under an existing parent
    Attached(Relationship),
    /// The node claimed the old root as a child and became the new root
    Rerooted(Relationship),
    /// No parent known yet, parked in the pending buffer
    Deferred,
}

impl InsertOutcome {
    /// True when the node is now part of the rooted tree
    pub fn is_placed(&self) -> bool {
        matches!(self, Self::Root | Self::Attached(_) | Self::Rerooted(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanTree {
    root: Option<PlanNode>,
    pending: VecDeque<PlanNode>,
    max_pending: usize,
}

impl Default for PlanTree {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_NODES)
    }
}

impl PlanTree {
    pub fn new(max_pending: usize) -> Self {
        Self { root: None, pending: VecDeque::new(), max_pending }
    }

    pub fn root(&self) -> Option<&PlanNode> {
        self.root.as_ref()
    }

    /// No rooted node yet; parked nodes do not count
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of nodes in the rooted tree
    pub fn node_count(&self) -> usize {
        self.root.as_ref().map_or(0, PlanNode::node_count)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, address: u64) -> bool {
        self.find(address).is_some()
    }

    pub fn insert(&mut self, node: PlanNode) -> InsertOutcome {
        let address = node.plan_address;
        if address == 0 {
            return InsertOutcome::Rejected;
        }
        if self.contains(address) {
            return InsertOutcome::Duplicate;
        }

        match self.place(node) {
            Ok(outcome) => {
                let drained = self.drain_pending();
                if drained > 0 {
                    debug!(address = %ValueParser::format_address(address), drained, "Placed parked plan nodes");
                }
                outcome
            },
            Err(node) => {
                self.park(node);
                InsertOutcome::Deferred
            },
        }
    }

    /// Rooted tree first, then the pending buffer
    pub fn find(&self, address: u64) -> Option<&PlanNode> {
        if address == 0 {
            return None;
        }
        self.root
            .as_ref()
            .and_then(|root| TreeBuilder::find_by_address(root, address))
            .or_else(|| self.pending.iter().find(|n| n.plan_address == address))
    }

    pub fn find_mut(&mut self, address: u64) -> Option<&mut PlanNode> {
        if address == 0 {
            return None;
        }
        if let Some(root) = self.root.as_mut()
            && let Some(found) = TreeBuilder::find_by_address_mut(root, address)
        {
            return Some(found);
        }
        self.pending.iter_mut().find(|n| n.plan_address == address)
    }

    /// All known nodes: rooted tree depth-first, then parked nodes oldest first
    pub fn nodes(&self) -> Vec<&PlanNode> {
        let mut nodes = Vec::with_capacity(self.node_count() + self.pending.len());
        if let Some(root) = &self.root {
            root.walk(&mut |node| nodes.push(node));
        }
        nodes.extend(self.pending.iter());
        nodes
    }

    pub fn to_snapshot(&self) -> Option<PlanNodeSnapshot> {
        self.root.as_ref().map(PlanNode::to_snapshot)
    }

    /// Try to make `node` part of the rooted tree without touching the buffer
    fn place(&mut self, mut node: PlanNode) -> Result<InsertOutcome, PlanNode> {
        if self.root.is_none() {
            node.relationship = None;
            self.root = Some(node);
            return Ok(InsertOutcome::Root);
        }
        let Some(root) = self.root.as_mut() else {
            return Err(node);
        };

        let node = match TreeBuilder::insert(root, node) {
            Ok(relationship) => return Ok(InsertOutcome::Attached(relationship)),
            Err(node) => node,
        };

        match node.declared_slot_for(root.plan_address) {
            Some(relationship) => {
                let mut new_root = node;
                let mut old_root = std::mem::replace(root, PlanNode::default());
                old_root.relationship = Some(relationship);
                *new_root.slot_mut(relationship) = Some(Box::new(old_root));
                new_root.relationship = None;
                *root = new_root;
                Ok(InsertOutcome::Rerooted(relationship))
            },
            None => Err(node),
        }
    }

    /// Retry parked nodes until a full pass places none
    fn drain_pending(&mut self) -> usize {
        let mut placed = 0;
        loop {
            let before = placed;
            for node in std::mem::take(&mut self.pending) {
                match self.place(node) {
                    Ok(_) => placed += 1,
                    Err(node) => self.pending.push_back(node),
                }
            }
            if placed == before {
                return placed;
            }
        }
    }

    fn park(&mut self, node: PlanNode) {
        while self.pending.len() >= self.max_pending {
            match self.pending.pop_front() {
                Some(evicted) => warn!(
                    address = %ValueParser::format_address(evicted.plan_address),
                    max_pending = self.max_pending,
                    "Pending plan node buffer full, evicting oldest node"
                ),
                None => break,
            }
        }
        if self.max_pending == 0 {
            warn!(
                address = %ValueParser::format_address(node.plan_address),
                "Pending plan node buffer disabled, dropping orphan node"
            );
            return;
        }
        debug!(address = %ValueParser::format_address(node.plan_address), "Parent not declared yet, parking node");
        self.pending.push_back(node);
    }
}
