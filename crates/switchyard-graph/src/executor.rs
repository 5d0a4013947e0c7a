use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use switchyard_core::types::{RunEvent, RunId, RunStatus};

use crate::channel::ChannelStore;
use crate::compiled::CompiledGraph;
use crate::error::{RunError, UnknownChannel};
use crate::interrupt::Interrupt;
use crate::node::NodeContext;
use crate::router::{NodeId, Route};
use crate::state::{State, StateUpdate};

/// One successful step: the snapshot a node saw and the update it returned.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub node: String,
    pub input: State,
    pub output: StateUpdate,
    pub elapsed_ms: u64,
}

/// Everything a finished run leaves behind.
///
/// `state` is always the state as of the last successful merge, whatever
/// the status.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    pub state: State,
    pub error: Option<RunError>,
    /// Empty when step recording is disabled.
    pub steps: Vec<StepRecord>,
    pub step_count: usize,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl RunOutcome {
    /// Final state, or the error that failed the run. Cancelled runs are `Ok`.
    pub fn into_result(self) -> Result<State, RunError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.state),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }

    /// Names of the nodes that completed, in order.
    pub fn visited(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.node.as_str()).collect()
    }
}

impl CompiledGraph {
    /// Run the graph to a terminal status with its own, never-cancelled interrupt.
    pub async fn invoke(&self, input: StateUpdate) -> RunOutcome {
        self.invoke_with(input, &Interrupt::new()).await
    }

    /// Run the graph, observing `interrupt` at every step boundary.
    ///
    /// Steps run strictly one after another: a node sees a snapshot holding
    /// every merge of the steps before it, and nothing else.
    pub async fn invoke_with(&self, input: StateUpdate, interrupt: &Interrupt) -> RunOutcome {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(
            run_id = %run_id,
            graph = %self.name,
            entry = %self.entry_point(),
            "Starting graph run"
        );
        self.publish(RunEvent::RunStarted {
            run_id: run_id.clone(),
            graph: self.name.clone(),
            entry: self.entry_point().to_string(),
            status: RunStatus::Running,
        });

        let mut run = RunProgress::default();

        let (status, error, state) = match ChannelStore::initialize(&self.channels, input) {
            Ok(mut store) => {
                let (status, error) = self
                    .drive(&run_id, &mut store, &mut run, interrupt)
                    .await;
                (status, error, store.snapshot())
            }
            Err(UnknownChannel(channel)) => (
                RunStatus::Failed,
                Some(RunError::InvalidInput(channel)),
                ChannelStore::with_defaults(&self.channels).snapshot(),
            ),
        };

        let elapsed_ms = clock.elapsed().as_millis() as u64;
        match &error {
            Some(err) => error!(
                run_id = %run_id,
                graph = %self.name,
                steps = run.step_count,
                error = %err,
                "Graph run failed"
            ),
            None => info!(
                run_id = %run_id,
                graph = %self.name,
                status = %status,
                steps = run.step_count,
                elapsed_ms,
                "Graph run finished"
            ),
        }
        self.publish(RunEvent::RunFinished {
            run_id: run_id.clone(),
            status,
            steps: run.step_count,
        });

        RunOutcome {
            run_id,
            status,
            state,
            error,
            steps: run.steps,
            step_count: run.step_count,
            started_at,
            elapsed_ms,
        }
    }

    async fn drive(
        &self,
        run_id: &RunId,
        store: &mut ChannelStore,
        run: &mut RunProgress,
        interrupt: &Interrupt,
    ) -> (RunStatus, Option<RunError>) {
        let budget = self.config.step_budget;
        let mut current = self.entry;

        loop {
            if interrupt.is_cancel_requested() {
                info!(
                    run_id = %run_id,
                    steps = run.step_count,
                    "Cancellation requested, stopping run"
                );
                return (RunStatus::Cancelled, None);
            }

            let name = self.node_name(current).to_string();
            let snapshot = store.snapshot();
            let step = run.step_count;

            debug!(run_id = %run_id, node = %name, step, "Executing node");
            self.publish(RunEvent::NodeStarted {
                run_id: run_id.clone(),
                node: name.clone(),
                step,
            });

            let ctx = NodeContext::new(run_id.clone(), &name, step, interrupt.clone());
            let node_start = Instant::now();
            let result = self.call_node(current, &name, snapshot.clone(), ctx).await;
            let elapsed_ms = node_start.elapsed().as_millis() as u64;

            if interrupt.is_cancel_requested() {
                info!(
                    run_id = %run_id,
                    node = %name,
                    "Cancellation requested while node was running, discarding its update"
                );
                return (RunStatus::Cancelled, None);
            }

            let update = match result {
                Ok(update) => update,
                Err(err) => {
                    self.publish(RunEvent::NodeFailed {
                        run_id: run_id.clone(),
                        node: name.clone(),
                        error: err.to_string(),
                    });
                    return (RunStatus::Failed, Some(err));
                }
            };

            let output = self.config.record_steps.then(|| update.clone());
            if let Err(UnknownChannel(channel)) = store.merge(update) {
                warn!(node = %name, channel = %channel, "Node wrote an undeclared channel");
                return (
                    RunStatus::Failed,
                    Some(RunError::UnknownChannel { node: name, channel }),
                );
            }
            run.step_count += 1;
            if let Some(output) = output {
                run.steps.push(StepRecord {
                    index: step,
                    node: name.clone(),
                    input: snapshot,
                    output,
                    elapsed_ms,
                });
            }

            debug!(run_id = %run_id, node = %name, step, elapsed_ms, "Node complete");
            self.publish(RunEvent::NodeCompleted {
                run_id: run_id.clone(),
                node: name.clone(),
                step,
                elapsed_ms,
            });

            match self.router.route(current, &store.snapshot()) {
                Err(err) => return (RunStatus::Failed, Some(err)),
                Ok(Route::End) => return (RunStatus::Completed, None),
                Ok(Route::Next(targets)) => {
                    if run.step_count >= budget {
                        return (
                            RunStatus::Failed,
                            Some(RunError::StepBudgetExceeded { budget, node: name }),
                        );
                    }
                    match targets.as_slice() {
                        [next] => {
                            debug!(from = %name, to = %self.node_name(*next), "Routing");
                            current = *next;
                        }
                        _ => {
                            return (
                                RunStatus::Failed,
                                Some(RunError::FanOut {
                                    node: name,
                                    count: targets.len(),
                                }),
                            )
                        }
                    }
                }
            }
        }
    }

    async fn call_node(
        &self,
        id: NodeId,
        name: &str,
        state: State,
        ctx: NodeContext,
    ) -> Result<StateUpdate, RunError> {
        let node = self
            .nodes
            .get(id.index())
            .ok_or_else(|| RunError::UnknownNode(name.to_string()))?;

        let fut = node.run(state, ctx);
        let result = match self.config.node_timeout() {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    error!(node = %name, timeout_ms = limit.as_millis() as u64, "Node timed out");
                    return Err(RunError::NodeTimeout {
                        node: name.to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => fut.await,
        };

        result.map_err(|source| {
            error!(node = %name, error = %source, "Node failed");
            RunError::Node {
                node: name.to_string(),
                source,
            }
        })
    }

    fn publish(&self, event: RunEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

#[derive(Default)]
struct RunProgress {
    step_count: usize,
    steps: Vec<StepRecord>,
}
