//! Instrumentation script generation
//!
//! Renders the probe script the agent runs to sample per-node instrumentation
//! of a running query.

use crate::config::InstrumentationSettings;
use crate::services::plan_tracer::models::InstrumentationConfig;
use crate::services::plan_tracer::parser::ValueParser;
use crate::services::plan_tracer::tree::PlanTree;
use crate::utils::{TracerError, TracerResult};
use std::fmt::Write;
use std::fs;

const NODE_PROBES: &str = "{{node_probes}}";
const PRINT_FORMAT: &str = "{{print_format}}";
const MEMBER_READS: &str = "{{member_reads}}";
const POSTGRES_BIN: &str = "{{postgres_bin}}";

const BUILTIN_TEMPLATE: &str = include_str!("../../templates/exec_proc_node.stp");

pub trait ScriptGenerator: Send + Sync {
    /// Render a script for `pid`, or `None` when no node can be sampled yet
    fn generate(
        &self,
        pid: i32,
        tree: &PlanTree,
        instrumentation: &InstrumentationConfig,
    ) -> TracerResult<Option<String>>;
}

pub struct StapScriptGenerator {
    template: String,
    postgres_bin: String,
}

impl StapScriptGenerator {
    pub fn new(template: impl Into<String>, postgres_bin: impl Into<String>) -> TracerResult<Self> {
        let template = template.into();
        if !template.contains(NODE_PROBES) {
            return Err(TracerError::script_generation(format!(
                "template has no {} placeholder",
                NODE_PROBES
            )));
        }
        Ok(Self { template, postgres_bin: postgres_bin.into() })
    }

    pub fn builtin(postgres_bin: impl Into<String>) -> TracerResult<Self> {
        Self::new(BUILTIN_TEMPLATE, postgres_bin)
    }

    pub fn from_settings(settings: &InstrumentationSettings) -> TracerResult<Self> {
        match settings.template_path.as_deref() {
            Some(path) => {
                let template = fs::read_to_string(path).map_err(|e| {
                    TracerError::script_generation(format!("failed to read template {}: {}", path, e))
                })?;
                Self::new(template, settings.postgres_bin.as_str())
            },
            None => Self::builtin(settings.postgres_bin.as_str()),
        }
    }

    /// One registration line per node whose instrument address is known
    fn node_probes(tree: &PlanTree) -> String {
        let mut probes = String::new();
        for node in tree.nodes() {
            let instrument = node.metrics.instrument_address;
            if instrument == 0 {
                continue;
            }
            let _ = writeln!(
                probes,
                "    nodes[{}] = {}",
                ValueParser::format_address(instrument),
                ValueParser::format_address(node.plan_address)
            );
        }
        probes
    }

    fn print_format(instrumentation: &InstrumentationConfig) -> String {
        instrumentation
            .enabled()
            .flat_map(|category| category.members().iter())
            .map(|(name, _)| format!(",{}:%p", name))
            .collect()
    }

    fn member_reads(instrumentation: &InstrumentationConfig) -> String {
        instrumentation
            .enabled()
            .flat_map(|category| category.members().iter())
            .map(|(_, offset)| format!(", user_long(instr+{})", offset))
            .collect()
    }
}

impl ScriptGenerator for StapScriptGenerator {
    fn generate(
        &self,
        pid: i32,
        tree: &PlanTree,
        instrumentation: &InstrumentationConfig,
    ) -> TracerResult<Option<String>> {
        let probes = Self::node_probes(tree);
        if probes.is_empty() {
            tracing::debug!(pid, "No node has an instrument address, nothing to sample");
            return Ok(None);
        }

        let script = self
            .template
            .replace(NODE_PROBES, probes.trim_end_matches('\n'))
            .replace(PRINT_FORMAT, &Self::print_format(instrumentation))
            .replace(MEMBER_READS, &Self::member_reads(instrumentation))
            .replace(POSTGRES_BIN, &self.postgres_bin);

        Ok(Some(script))
    }
}
