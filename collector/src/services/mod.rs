pub mod command_dispatcher;
pub mod message_router;
pub mod metadata_lookup;
pub mod plan_broadcaster;
pub mod plan_polling_task;
pub mod plan_tracer;
pub mod probe_listener;
pub mod query_lifecycle;
pub mod query_registry;
pub mod script_generator;

pub use command_dispatcher::{
    AgentCommand, CommandDispatcher, CommandName, HttpCommandDispatcher, LogCommandDispatcher,
    build_command_dispatcher,
};
pub use message_router::{MessageRouter, RouteOutcome, RouterOptions};
pub use metadata_lookup::{
    MetadataLookup, NoopMetadataLookup, PgActivityLookup, QueryMetadata, build_metadata_lookup,
};
pub use plan_broadcaster::PlanBroadcaster;
pub use plan_polling_task::{AgentHooks, PlanPollingTask, start_plan_polling_task};
pub use probe_listener::{ProbeListener, RawEvent, run_router_loop};
pub use query_lifecycle::{NoopHooks, QueryLifecycle, Transition, TransitionHooks};
pub use query_registry::{QueryDefaults, QueryDetails, QueryInfo, QueryRegistry};
pub use script_generator::{ScriptGenerator, StapScriptGenerator};
