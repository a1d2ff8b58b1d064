use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;

use plantap_collector::config::Config;
use plantap_collector::services::{
    AgentHooks, MessageRouter, PlanBroadcaster, ProbeListener, QueryDefaults, QueryLifecycle,
    QueryRegistry, RouterOptions, StapScriptGenerator, build_command_dispatcher,
    build_metadata_lookup, run_router_loop,
};
use plantap_collector::utils::init_logging;
use plantap_collector::{AppState, build_router};

#[derive(Parser, Debug)]
#[command(name = "plantap-collector", version, about = "Live query plan trace collector")]
struct Args {
    /// Config file (default: conf/config.toml, then config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override probe.listen_addr
    #[arg(long)]
    probe_addr: Option<String>,

    /// Override server.port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(addr) = args.probe_addr {
        config.probe.listen_addr = addr;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let _log_guard = init_logging(&config.logging)?;
    tracing::info!("plantap collector starting");

    let metadata = build_metadata_lookup(&config.database).await?;
    let dispatcher = build_command_dispatcher(&config.agent)?;
    let generator = Arc::new(StapScriptGenerator::from_settings(&config.instrumentation)?);

    let defaults = QueryDefaults {
        instrumentation: config.instrumentation.to_instrumentation_config()?,
        max_pending_nodes: config.instrumentation.max_pending_nodes,
    };
    let registry = Arc::new(QueryRegistry::new(defaults));
    let broadcaster = Arc::new(PlanBroadcaster::new(config.export.broadcast_capacity));

    let hooks = Arc::new(AgentHooks::new(
        registry.clone(),
        generator,
        dispatcher,
        config.polling_interval(),
    ));
    let lifecycle = QueryLifecycle::new(registry.clone(), hooks);
    let options = RouterOptions {
        lookup_timeout: config.lookup_timeout(),
        export_on_terminal: config.export.on_terminal,
    };
    let router = Arc::new(MessageRouter::new(
        registry.clone(),
        lifecycle,
        metadata,
        broadcaster.clone(),
        options,
    ));

    let listener = ProbeListener::bind(&config.probe.listen_addr).await?;
    let (events_tx, events_rx) = mpsc::channel(config.probe.channel_capacity);
    tokio::spawn(listener.run(events_tx));
    let worker = tokio::spawn(run_router_loop(router, events_rx));

    let state = Arc::new(AppState::new(registry, broadcaster));
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let http = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Observer API listening on http://{}", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(http, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.abort();
    tracing::info!("plantap collector stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
