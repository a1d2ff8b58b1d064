//! Core decoding components for probe events

pub mod event_parser;
pub mod metric_parser;
pub mod node_parser;
pub mod payload_parser;
pub mod value_parser;

pub use event_parser::{EventKind, ProbeEvent, WireEvent};
pub use metric_parser::MetricParser;
pub use node_parser::NodeParser;
pub use payload_parser::{Decoded, PayloadFields};
pub use value_parser::ValueParser;
