//! Node-declared payload parser

use crate::services::plan_tracer::models::PlanNode;
use crate::services::plan_tracer::parser::core::{Decoded, PayloadFields};

/// Builds a `PlanNode` from a node-declared payload.
///
/// Recognised keys: `plantype`, `plan`, `leftplan`, `rightplan`, `instrument`,
/// `plan_rows`, `startup_cost`, `total_cost`, `plan_width`. Others are ignored.
pub struct NodeParser;

impl NodeParser {
    pub fn parse(payload: &str) -> Decoded<PlanNode> {
        let fields = PayloadFields::parse(payload);
        let mut errors = fields.errors().to_vec();

        let node_type_code = fields.i32_field("plantype", &mut errors).unwrap_or_default();
        let plan_address = fields.u64_field("plan", &mut errors).unwrap_or_default();

        let mut node = PlanNode::new(node_type_code, plan_address).with_children(
            fields.u64_field("leftplan", &mut errors).unwrap_or_default(),
            fields.u64_field("rightplan", &mut errors).unwrap_or_default(),
        );
        node.estimated_rows = fields.hex_double_field("plan_rows", &mut errors).unwrap_or_default();
        node.startup_cost = fields.hex_double_field("startup_cost", &mut errors).unwrap_or_default();
        node.total_cost = fields.hex_double_field("total_cost", &mut errors).unwrap_or_default();
        node.plan_width = fields.i32_field("plan_width", &mut errors).unwrap_or_default();
        node.metrics.instrument_address =
            fields.u64_field("instrument", &mut errors).unwrap_or_default();

        Decoded { value: node, field_errors: errors }
    }
}
