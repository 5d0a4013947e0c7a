use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use switchyard_core::config::AppConfig;
use switchyard_core::event::EventBus;
use switchyard_core::traits::{Approver, ModelClient};
use switchyard_core::types::{ApprovalDecision, RunEvent, RunStatus};
use switchyard_flows::expense::ExpenseDeps;
use switchyard_flows::monitor::{MockNewsFeed, MonitorDeps};
use switchyard_flows::sales::{CreditLedger, SalesDeps};
use switchyard_flows::support::SupportDeps;
use switchyard_flows::{expense, monitor, sales, support, ApprovalBroker, AutoApprover};
use switchyard_graph::{CompiledGraph, Interrupt, StateUpdate};

#[derive(Parser)]
#[command(
    name = "switchyard",
    version,
    about = "Run stateful workflow graphs over language models"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,

    /// Print every step as it starts and finishes
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review an expense and route it for approval
    Expense {
        /// Free-text description of the receipt
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
        /// Ask for the manager decision on the terminal instead of auto-approving
        #[arg(long)]
        ask: bool,
    },
    /// Watch the news feed and raise alerts for urgent items
    Monitor,
    /// Draft a cold email for a company's decision maker
    Sales {
        /// Billing account to charge
        #[arg(long, default_value = "user_123")]
        user: String,
        /// Company website
        #[arg(long)]
        url: String,
    },
    /// Ask the support bot a question
    Support {
        #[arg(trailing_var_arg = true, required = true)]
        question: Vec<String>,
    },
    /// Print a flow's nodes and routing table
    Graph {
        #[arg(value_enum)]
        flow: Flow,
    },
    /// Show the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum Flow {
    Expense,
    Monitor,
    Sales,
    Support,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("switchyard=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let model = switchyard_llm::create_client(&config.model)?;
    info!(
        provider = %config.model.provider,
        model = %config.model.model_id,
        "Model client ready"
    );

    let event_bus = Arc::new(EventBus::default());
    let auto: Arc<dyn Approver> = Arc::new(AutoApprover::approve());
    let mut broker = None;

    let (flow, input) = match cli.command {
        Commands::Expense { text, ask } => {
            let approver: Arc<dyn Approver> = if ask {
                let b = Arc::new(ApprovalBroker::new(event_bus.clone()));
                broker = Some(b.clone());
                b
            } else {
                auto
            };
            (
                build_flow(Flow::Expense, &config, model, approver)?,
                expense::input(text.join(" ")),
            )
        }
        Commands::Monitor => (
            build_flow(Flow::Monitor, &config, model, auto)?,
            monitor::input(),
        ),
        Commands::Sales { user, url } => (
            build_flow(Flow::Sales, &config, model, auto)?,
            sales::input(user, url),
        ),
        Commands::Support { question } => (
            build_flow(Flow::Support, &config, model, auto)?,
            support::input(question.join(" ")),
        ),
        Commands::Graph { flow } => {
            let graph = build_flow(flow, &config, model, auto)?;
            print_graph(&graph);
            return Ok(());
        }
        Commands::Config => return Ok(()),
    };

    let status = run_flow(
        flow.with_event_bus(event_bus.clone()),
        input,
        &event_bus,
        broker,
        cli.verbose,
    )
    .await?;

    match status {
        RunStatus::Failed => std::process::exit(1),
        // A terminal approval prompt may still be blocking a worker thread.
        RunStatus::Cancelled => std::process::exit(0),
        _ => Ok(()),
    }
}

/// A missing file is fine: defaults plus environment overrides.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let mut config = if path.exists() {
        AppConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?
    } else {
        warn!(path = %path.display(), "No config file found, using defaults");
        AppConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}

fn build_flow(
    flow: Flow,
    config: &AppConfig,
    model: Arc<dyn ModelClient>,
    approver: Arc<dyn Approver>,
) -> anyhow::Result<CompiledGraph> {
    let graph = match flow {
        Flow::Expense => expense::build(
            ExpenseDeps::new(model, approver, config.expense.clone()),
            &config.executor,
        )?,
        Flow::Monitor => monitor::build(
            MonitorDeps {
                model,
                feed: Arc::new(MockNewsFeed::new(config.monitor.demo_mode)),
                poll_interval: config.monitor.poll_interval(),
            },
            &config.monitor,
            &config.executor,
        )?,
        Flow::Sales => sales::build(
            SalesDeps {
                model,
                ledger: Arc::new(CreditLedger::mock()),
                billing: config.sales.clone(),
            },
            &config.executor,
        )?,
        Flow::Support => support::build(SupportDeps::new(model), &config.executor)?,
    };
    Ok(graph)
}

fn print_graph(graph: &CompiledGraph) {
    println!("graph: {}", graph.name());
    println!("entry: {}", graph.entry_point());
    println!("nodes: {}", graph.node_names().join(", "));
    println!("channels:");
    for channel in graph.channels() {
        println!("  {}", channel.name);
    }
    println!("routes:");
    for line in graph.describe() {
        println!("  {line}");
    }
}

/// How long the event printer may keep draining after the run returns.
const PRINTER_GRACE: Duration = Duration::from_millis(500);

/// Print run events until the run reports its terminal status.
fn spawn_printer(
    mut rx: broadcast::Receiver<RunEvent>,
    broker: Option<Arc<ApprovalBroker>>,
    verbose: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event printer fell behind");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            match event {
                RunEvent::RunStarted { graph, status, .. } if verbose => {
                    eprintln!("{graph}: {status}");
                }
                RunEvent::NodeStarted { node, step, .. } if verbose => {
                    eprintln!("[{step}] {node}");
                }
                RunEvent::NodeCompleted {
                    node, elapsed_ms, ..
                } if verbose => {
                    eprintln!("    {node} ok ({elapsed_ms}ms)");
                }
                RunEvent::NodeFailed { node, error, .. } => {
                    eprintln!("[{node}: ERROR] {error}");
                }
                RunEvent::ApprovalRequested { request } => {
                    let Some(broker) = broker.clone() else {
                        continue;
                    };
                    eprintln!("\n[APPROVAL] {}", request.summary);
                    let req_id = request.id.clone();
                    let answer = tokio::task::spawn_blocking(|| {
                        dialoguer::Confirm::new()
                            .with_prompt("Approve?")
                            .default(false)
                            .interact()
                            .unwrap_or(false)
                    })
                    .await
                    .unwrap_or(false);
                    let decision = if answer {
                        ApprovalDecision::Approved
                    } else {
                        ApprovalDecision::Denied {
                            reason: "Declined at the terminal".into(),
                        }
                    };
                    broker.respond(&req_id, decision).await;
                }
                RunEvent::RunFinished { .. } => break,
                _ => {}
            }
        }
    })
}

async fn run_flow(
    graph: CompiledGraph,
    input: StateUpdate,
    event_bus: &EventBus,
    broker: Option<Arc<ApprovalBroker>>,
    verbose: bool,
) -> anyhow::Result<RunStatus> {
    let interrupt = Interrupt::new();
    let signals = interrupt.install_signal_handlers();

    let mut printer = spawn_printer(event_bus.subscribe(), broker, verbose);

    let outcome = graph.invoke_with(input, &interrupt).await;
    signals.abort();
    // Let queued lines reach the terminal; a pending prompt is abandoned.
    let drained = tokio::time::timeout(PRINTER_GRACE, &mut printer).await;
    if drained.is_err() {
        printer.abort();
    }

    println!("Status: {}", outcome.status);
    if let Some(err) = &outcome.error {
        eprintln!("Error: {err}");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome.state.to_json())
            .context("rendering final state")?
    );
    Ok(outcome.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::types::RunId;

    #[tokio::test]
    async fn printer_drains_queued_events_before_stopping() {
        let bus = EventBus::default();
        let printer = spawn_printer(bus.subscribe(), None, true);
        let run_id = RunId::from_string("run-1");

        bus.publish(RunEvent::NodeFailed {
            run_id: run_id.clone(),
            node: "generate".into(),
            error: "model unavailable".into(),
        });
        bus.publish(RunEvent::RunFinished {
            run_id,
            status: RunStatus::Failed,
            steps: 1,
        });

        tokio::time::timeout(PRINTER_GRACE, printer)
            .await
            .expect("printer stops at RunFinished")
            .unwrap();
    }

    #[tokio::test]
    async fn printer_stops_when_the_bus_goes_away() {
        let bus = EventBus::default();
        let printer = spawn_printer(bus.subscribe(), None, false);
        drop(bus);

        tokio::time::timeout(PRINTER_GRACE, printer)
            .await
            .expect("printer stops on close")
            .unwrap();
    }
}
