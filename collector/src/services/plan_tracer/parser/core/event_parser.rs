//! Event line parser
//!
//! A probe event is one line: `<pid>|<eventName>[|<payload>]`. The event name
//! is either the canonical name or the name of the probed function.
//! `GenerateNode` declares a node and also marks the query as executing.

use crate::services::plan_tracer::models::{MetricUpdate, PlanNode, QueryStatus};
use crate::services::plan_tracer::parser::core::{Decoded, MetricParser, NodeParser};
use crate::services::plan_tracer::parser::error::{ParseError, ParseResult};
use std::fmt;

/// An event line split into its three parts, payload still raw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireEvent {
    pub pid: i32,
    pub name: String,
    pub payload: Option<String>,
}

impl WireEvent {
    pub fn parse(line: &str) -> ParseResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']).trim();
        let mut parts = line.splitn(3, '|');

        let raw_pid = parts.next().unwrap_or_default().trim();
        let pid = raw_pid
            .parse::<i32>()
            .map_err(|_| ParseError::InvalidPid(raw_pid.to_string()))?;

        let name = parts.next().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(ParseError::MissingEventName(line.to_string()));
        }

        let payload = parts.next().map(|p| p.trim().to_string()).filter(|p| !p.is_empty());

        Ok(Self { pid, name: name.to_string(), payload })
    }

    fn require_payload(&self) -> ParseResult<&str> {
        self.payload
            .as_deref()
            .ok_or_else(|| ParseError::MissingPayload { event: self.name.clone() })
    }
}

/// What an event name means to the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Lifecycle(QueryStatus),
    /// `starts_query` is set for names that also imply executor-start
    NodeDeclared { starts_query: bool },
    MetricUpdate,
    EndOfTrace,
}

impl EventKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "submit-query" | "CreateQueryDesc" => EventKind::Lifecycle(QueryStatus::Submit),
            "executor-start" | "ExecutorStart" => EventKind::Lifecycle(QueryStatus::Start),
            "executor-finish" | "ExecutorFinish" => EventKind::Lifecycle(QueryStatus::Finish),
            "cancel" | "StatementCancelHandler" => EventKind::Lifecycle(QueryStatus::Cancel),
            "node-declared" | "ExecInitNode" => EventKind::NodeDeclared { starts_query: false },
            "GenerateNode" => EventKind::NodeDeclared { starts_query: true },
            "metric-update" | "GetInstrument" => EventKind::MetricUpdate,
            "end-of-trace" | "EndInstrument" => EventKind::EndOfTrace,
            _ => return None,
        };
        Some(kind)
    }

    pub fn canonical_name(&self) -> &'static str {
        match self {
            EventKind::Lifecycle(QueryStatus::Submit) => "submit-query",
            EventKind::Lifecycle(QueryStatus::Start) => "executor-start",
            EventKind::Lifecycle(QueryStatus::Finish) => "executor-finish",
            EventKind::Lifecycle(QueryStatus::Cancel) => "cancel",
            EventKind::NodeDeclared { .. } => "node-declared",
            EventKind::MetricUpdate => "metric-update",
            EventKind::EndOfTrace => "end-of-trace",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// A fully decoded probe event
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeEvent {
    Lifecycle { pid: i32, status: QueryStatus },
    NodeDeclared { pid: i32, node: Decoded<PlanNode>, starts_query: bool },
    MetricUpdate { pid: i32, update: Decoded<MetricUpdate> },
    EndOfTrace { pid: i32 },
    Unrecognized { pid: i32, name: String },
}

impl ProbeEvent {
    /// Decode one event line
    pub fn decode(line: &str) -> ParseResult<Self> {
        Self::from_wire(WireEvent::parse(line)?)
    }

    /// Decode one raw message off the bus
    pub fn decode_bytes(raw: &[u8]) -> ParseResult<Self> {
        let line = std::str::from_utf8(raw).map_err(|_| ParseError::InvalidUtf8)?;
        Self::decode(line)
    }

    pub fn from_wire(event: WireEvent) -> ParseResult<Self> {
        let pid = event.pid;
        let Some(kind) = EventKind::from_name(&event.name) else {
            return Ok(ProbeEvent::Unrecognized { pid, name: event.name });
        };

        let decoded = match kind {
            EventKind::Lifecycle(status) => ProbeEvent::Lifecycle { pid, status },
            EventKind::NodeDeclared { starts_query: true } if event.payload.is_none() => {
                ProbeEvent::Lifecycle { pid, status: QueryStatus::Start }
            },
            EventKind::NodeDeclared { starts_query } => ProbeEvent::NodeDeclared {
                pid,
                node: NodeParser::parse(event.require_payload()?),
                starts_query,
            },
            EventKind::MetricUpdate => ProbeEvent::MetricUpdate {
                pid,
                update: MetricParser::parse(event.require_payload()?),
            },
            EventKind::EndOfTrace => ProbeEvent::EndOfTrace { pid },
        };
        Ok(decoded)
    }

    pub fn pid(&self) -> i32 {
        match self {
            ProbeEvent::Lifecycle { pid, .. }
            | ProbeEvent::NodeDeclared { pid, .. }
            | ProbeEvent::MetricUpdate { pid, .. }
            | ProbeEvent::EndOfTrace { pid }
            | ProbeEvent::Unrecognized { pid, .. } => *pid,
        }
    }

    /// Canonical event name, or the raw name for unrecognized events
    pub fn name(&self) -> &str {
        match self {
            ProbeEvent::Lifecycle { status, .. } => EventKind::Lifecycle(*status).canonical_name(),
            ProbeEvent::NodeDeclared { starts_query, .. } => {
                EventKind::NodeDeclared { starts_query: *starts_query }.canonical_name()
            },
            ProbeEvent::MetricUpdate { .. } => EventKind::MetricUpdate.canonical_name(),
            ProbeEvent::EndOfTrace { .. } => EventKind::EndOfTrace.canonical_name(),
            ProbeEvent::Unrecognized { name, .. } => name,
        }
    }
}
