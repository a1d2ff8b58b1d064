//! Applies runtime instrumentation samples to declared plan nodes

use crate::services::plan_tracer::models::{MetricUpdate, NodeMetrics};
use crate::services::plan_tracer::tree::PlanTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// No node with the target address (yet); the sample is dropped
    TargetMissing,
}

pub struct InstrumentUpdater;

impl InstrumentUpdater {
    /// Merge `update` into the node it targets. Present fields overwrite, absent
    /// fields are left alone, so applying the same update twice is a no-op.
    pub fn apply(tree: &mut PlanTree, update: &MetricUpdate) -> UpdateOutcome {
        match tree.find_mut(update.plan_address) {
            Some(node) => {
                Self::merge(&mut node.metrics, update);
                UpdateOutcome::Applied
            },
            None => UpdateOutcome::TargetMissing,
        }
    }

    pub fn merge(metrics: &mut NodeMetrics, update: &MetricUpdate) {
        if let Some(address) = update.instrument_address {
            metrics.instrument_address = address;
        }
        if let Some(running) = update.running {
            metrics.running = running;
        }
        if let Some(v) = update.tuple_count {
            metrics.tuple_count = v;
        }
        if let Some(v) = update.startup_time {
            metrics.startup_time = v;
        }
        if let Some(v) = update.total_time {
            metrics.total_time = v;
        }
        if let Some(v) = update.actual_rows {
            metrics.actual_rows = v;
        }
        if let Some(v) = update.actual_loops {
            metrics.actual_loops = v;
        }
        if let Some(buffers) = &update.buffers {
            metrics.buffers = Some(buffers.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::plan_tracer::models::PlanNode;

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut tree = PlanTree::default();
        tree.insert(PlanNode::new(109, 0x10));

        let first = MetricUpdate {
            plan_address: 0x10,
            tuple_count: Some(10.0),
            running: Some(true),
            ..Default::default()
        };
        let second =
            MetricUpdate { plan_address: 0x10, total_time: Some(2.5), ..Default::default() };

        assert_eq!(InstrumentUpdater::apply(&mut tree, &first), UpdateOutcome::Applied);
        assert_eq!(InstrumentUpdater::apply(&mut tree, &second), UpdateOutcome::Applied);

        let metrics = &tree.root().unwrap().metrics;
        assert_eq!(metrics.tuple_count, 10.0);
        assert!(metrics.running);
        assert_eq!(metrics.total_time, 2.5);
    }

    #[test]
    fn test_empty_tree_and_zero_address_miss() {
        let mut tree = PlanTree::default();
        let update = MetricUpdate { plan_address: 0x10, ..Default::default() };
        assert_eq!(InstrumentUpdater::apply(&mut tree, &update), UpdateOutcome::TargetMissing);

        tree.insert(PlanNode::new(109, 0x10));
        let update = MetricUpdate::default();
        assert_eq!(InstrumentUpdater::apply(&mut tree, &update), UpdateOutcome::TargetMissing);
    }
}
