//! Plan tracing data models
//!
//! These models hold the live execution-plan tree of a traced query and the
//! serializable snapshots pushed to observers.

use crate::services::plan_tracer::node_types::node_type_label;
use crate::services::plan_tracer::parser::core::ValueParser;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

// ============================================================================
// Plan Tree Structure
// ============================================================================

/// Edge label between a plan node and its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Relationship {
    Outer,
    Inner,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Outer => "Outer",
            Relationship::Inner => "Inner",
        }
    }
}

/// Runtime instrumentation read out of the traced process
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct NodeMetrics {
    /// Address of the node's instrumentation struct, 0 until resolved
    pub instrument_address: u64,
    pub tuple_count: f64,
    pub running: bool,
    pub startup_time: f64,
    pub total_time: f64,
    pub actual_rows: f64,
    pub actual_loops: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffers: Option<BufferUsage>,
}

/// Buffer usage counters, only reported when the buffer category is enabled
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct BufferUsage {
    pub shared_blks_hit: u64,
    pub shared_blks_read: u64,
    pub shared_blks_dirtied: u64,
    pub shared_blks_written: u64,
    pub local_blks_hit: u64,
    pub local_blks_read: u64,
    pub temp_blks_read: u64,
    pub temp_blks_written: u64,
}

/// One execution-plan operator instance.
///
/// `plan_address` is an opaque correlation token from the traced process. It is
/// never dereferenced and never changes after the node is created. Children
/// live in two slots: the outer slot only ever holds the node whose address is
/// `left_child_address`, the inner slot the one matching `right_child_address`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlanNode {
    pub node_type_code: i32,
    pub node_type_label: String,
    pub plan_address: u64,
    pub left_child_address: u64,
    pub right_child_address: u64,
    pub estimated_rows: f64,
    pub startup_cost: f64,
    pub total_cost: f64,
    pub plan_width: i32,
    /// Edge label towards the parent; `None` for the root
    pub relationship: Option<Relationship>,
    pub metrics: NodeMetrics,
    pub(crate) outer: Option<Box<PlanNode>>,
    pub(crate) inner: Option<Box<PlanNode>>,
}

impl PlanNode {
    pub fn new(node_type_code: i32, plan_address: u64) -> Self {
        Self {
            node_type_code,
            node_type_label: node_type_label(node_type_code).to_string(),
            plan_address,
            ..Default::default()
        }
    }

    /// Declare the addresses of the two possible children
    pub fn with_children(mut self, left_child_address: u64, right_child_address: u64) -> Self {
        self.left_child_address = left_child_address;
        self.right_child_address = right_child_address;
        self
    }

    pub fn outer(&self) -> Option<&PlanNode> {
        self.outer.as_deref()
    }

    pub fn inner(&self) -> Option<&PlanNode> {
        self.inner.as_deref()
    }

    /// Attached children in slot order (outer, then inner)
    pub fn children(&self) -> impl Iterator<Item = &PlanNode> {
        self.outer.iter().chain(self.inner.iter()).map(Box::as_ref)
    }

    pub fn child_count(&self) -> usize {
        self.children().count()
    }

    /// Number of nodes in this subtree, including self
    pub fn node_count(&self) -> usize {
        1 + self.children().map(PlanNode::node_count).sum::<usize>()
    }

    /// Which slot `address` was declared for, if any
    pub fn declared_slot_for(&self, address: u64) -> Option<Relationship> {
        if address == 0 {
            return None;
        }
        if self.left_child_address == address {
            Some(Relationship::Outer)
        } else if self.right_child_address == address {
            Some(Relationship::Inner)
        } else {
            None
        }
    }

    pub(crate) fn slot_mut(&mut self, relationship: Relationship) -> &mut Option<Box<PlanNode>> {
        match relationship {
            Relationship::Outer => &mut self.outer,
            Relationship::Inner => &mut self.inner,
        }
    }

    /// Depth-first visit: self, outer subtree, inner subtree
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a PlanNode)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    pub fn to_snapshot(&self) -> PlanNodeSnapshot {
        PlanNodeSnapshot {
            type_id: self.node_type_code,
            type_label: self.node_type_label.clone(),
            parent_relationship: self.relationship,
            address: ValueParser::format_address(self.plan_address),
            plan_rows: self.estimated_rows,
            startup_cost: self.startup_cost,
            total_cost: self.total_cost,
            plan_width: self.plan_width,
            metrics: self.metrics.clone(),
            children: self.children().map(PlanNode::to_snapshot).collect(),
        }
    }
}

/// A late-arriving instrumentation sample for one plan node.
///
/// Absent fields leave the node's current value untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricUpdate {
    pub plan_address: u64,
    pub instrument_address: Option<u64>,
    pub running: Option<bool>,
    pub tuple_count: Option<f64>,
    pub startup_time: Option<f64>,
    pub total_time: Option<f64>,
    pub actual_rows: Option<f64>,
    pub actual_loops: Option<f64>,
    pub buffers: Option<BufferUsage>,
}

// ============================================================================
// Query Lifecycle
// ============================================================================

/// Lifecycle status of a traced query, ordered by code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Submit,
    Start,
    Cancel,
    Finish,
}

impl QueryStatus {
    pub fn code(&self) -> u8 {
        match self {
            QueryStatus::Submit => 0,
            QueryStatus::Start => 1,
            QueryStatus::Cancel => 2,
            QueryStatus::Finish => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QueryStatus::Submit => "submit",
            QueryStatus::Start => "start",
            QueryStatus::Cancel => "cancel",
            QueryStatus::Finish => "finish",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryStatus::Cancel | QueryStatus::Finish)
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Instrumentation Categories
// ============================================================================

/// Named group of instrumentation struct members a probe can read
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentCategory {
    Base,
    Accumulated,
    Buffer,
}

impl InstrumentCategory {
    pub const ALL: [InstrumentCategory; 3] =
        [InstrumentCategory::Base, InstrumentCategory::Accumulated, InstrumentCategory::Buffer];

    pub fn name(&self) -> &'static str {
        match self {
            InstrumentCategory::Base => "base",
            InstrumentCategory::Accumulated => "accumulated",
            InstrumentCategory::Buffer => "buffer",
        }
    }

    /// Member names and byte offsets inside the traced instrumentation struct
    pub fn members(&self) -> &'static [(&'static str, u32)] {
        match self {
            InstrumentCategory::Base => &[("running", 2), ("tuplecount", 48)],
            InstrumentCategory::Accumulated => {
                &[("startup", 168), ("total", 176), ("ntuples", 184), ("nloops", 192)]
            },
            InstrumentCategory::Buffer => &[
                ("shared_blks_hit", 216),
                ("shared_blks_read", 224),
                ("shared_blks_dirtied", 232),
                ("shared_blks_written", 240),
                ("local_blks_hit", 248),
                ("local_blks_read", 256),
                ("temp_blks_read", 280),
                ("temp_blks_written", 288),
            ],
        }
    }
}

impl FromStr for InstrumentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(InstrumentCategory::Base),
            "accumulated" => Ok(InstrumentCategory::Accumulated),
            "buffer" => Ok(InstrumentCategory::Buffer),
            other => Err(format!("unknown instrumentation category: {}", other)),
        }
    }
}

/// Set of enabled instrumentation categories for one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InstrumentationConfig {
    #[schema(value_type = Vec<InstrumentCategory>)]
    pub categories: BTreeSet<InstrumentCategory>,
}

impl InstrumentationConfig {
    pub fn new(categories: impl IntoIterator<Item = InstrumentCategory>) -> Self {
        Self { categories: categories.into_iter().collect() }
    }

    pub fn is_enabled(&self, category: InstrumentCategory) -> bool {
        self.categories.contains(&category)
    }

    /// Enabled categories in their fixed order
    pub fn enabled(&self) -> impl Iterator<Item = InstrumentCategory> + '_ {
        self.categories.iter().copied()
    }
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self::new([InstrumentCategory::Base, InstrumentCategory::Accumulated])
    }
}

// ============================================================================
// Snapshots (for observers)
// ============================================================================

/// Serializable view of one plan node and its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlanNodeSnapshot {
    pub type_id: i32,
    pub type_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_relationship: Option<Relationship>,
    pub address: String,
    pub plan_rows: f64,
    pub startup_cost: f64,
    pub total_cost: f64,
    pub plan_width: i32,
    pub metrics: NodeMetrics,
    pub children: Vec<PlanNodeSnapshot>,
}

/// Serializable view of one traced query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QuerySnapshot {
    pub pid: i32,
    pub generation: u64,
    pub query_text: String,
    pub db_name: String,
    pub user_name: String,
    pub status: String,
    pub status_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_state: Option<String>,
    pub instrumentation: InstrumentationConfig,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    pub node_count: usize,
    pub pending_nodes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanNodeSnapshot>,
}

/// Message pushed to live observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PlanMessage {
    pub message_type: String,
    pub query: QuerySnapshot,
}

impl PlanMessage {
    pub fn query(query: QuerySnapshot) -> Self {
        Self { message_type: "query".to_string(), query }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering_follows_codes() {
        assert!(QueryStatus::Submit < QueryStatus::Start);
        assert!(QueryStatus::Start < QueryStatus::Cancel);
        assert!(QueryStatus::Cancel < QueryStatus::Finish);
        assert_eq!(QueryStatus::Finish.code(), 3);
        assert!(QueryStatus::Cancel.is_terminal());
        assert!(!QueryStatus::Start.is_terminal());
    }

    #[test]
    fn test_declared_slot() {
        let node = PlanNode::new(124, 0x10).with_children(0x20, 0x30);
        assert_eq!(node.declared_slot_for(0x20), Some(Relationship::Outer));
        assert_eq!(node.declared_slot_for(0x30), Some(Relationship::Inner));
        assert_eq!(node.declared_slot_for(0x40), None);
        assert_eq!(node.declared_slot_for(0), None);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("Buffer".parse::<InstrumentCategory>().unwrap(), InstrumentCategory::Buffer);
        assert!("timing".parse::<InstrumentCategory>().is_err());
        let config = InstrumentationConfig::default();
        assert!(config.is_enabled(InstrumentCategory::Base));
        assert!(!config.is_enabled(InstrumentCategory::Buffer));
    }

    #[test]
    fn test_snapshot_serializes_relationship_label() {
        let mut child = PlanNode::new(109, 0x20);
        child.relationship = Some(Relationship::Outer);
        let json = serde_json::to_value(child.to_snapshot()).unwrap();
        assert_eq!(json["parent_relationship"], "Outer");
        assert_eq!(json["type_label"], "Seq Scan");
        assert_eq!(json["address"], "0x20");
    }
}
