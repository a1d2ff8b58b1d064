//! Metric-update payload parser

use crate::services::plan_tracer::models::{BufferUsage, MetricUpdate};
use crate::services::plan_tracer::parser::core::{Decoded, PayloadFields};
use crate::services::plan_tracer::parser::error::ParseError;

const BUFFER_KEYS: [&str; 8] = [
    "shared_blks_hit",
    "shared_blks_read",
    "shared_blks_dirtied",
    "shared_blks_written",
    "local_blks_hit",
    "local_blks_read",
    "temp_blks_read",
    "temp_blks_written",
];

/// Builds a `MetricUpdate` from a metric-update payload
pub struct MetricParser;

impl MetricParser {
    pub fn parse(payload: &str) -> Decoded<MetricUpdate> {
        let fields = PayloadFields::parse(payload);
        let mut errors = fields.errors().to_vec();

        let update = MetricUpdate {
            plan_address: fields.u64_field("plannode", &mut errors).unwrap_or_default(),
            instrument_address: fields.u64_field("instrument", &mut errors),
            running: fields.bool_field("running", &mut errors),
            tuple_count: fields.hex_double_field("tuplecount", &mut errors),
            startup_time: fields.hex_double_field("startup", &mut errors),
            total_time: fields.hex_double_field("total", &mut errors),
            actual_rows: fields.hex_double_field("ntuples", &mut errors),
            actual_loops: fields.hex_double_field("nloops", &mut errors),
            buffers: Self::parse_buffers(&fields, &mut errors),
        };

        Decoded { value: update, field_errors: errors }
    }

    /// Buffer counters are printed together, so any one of them present means
    /// the whole group was sampled.
    fn parse_buffers(fields: &PayloadFields, errors: &mut Vec<ParseError>) -> Option<BufferUsage> {
        if !BUFFER_KEYS.iter().any(|key| fields.get(key).is_some()) {
            return None;
        }
        let mut counter = |key: &str| fields.u64_field(key, errors).unwrap_or_default();
        Some(BufferUsage {
            shared_blks_hit: counter("shared_blks_hit"),
            shared_blks_read: counter("shared_blks_read"),
            shared_blks_dirtied: counter("shared_blks_dirtied"),
            shared_blks_written: counter("shared_blks_written"),
            local_blks_hit: counter("local_blks_hit"),
            local_blks_read: counter("local_blks_read"),
            temp_blks_read: counter("temp_blks_read"),
            temp_blks_written: counter("temp_blks_written"),
        })
    }
}
