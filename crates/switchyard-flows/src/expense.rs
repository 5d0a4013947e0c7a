//! Expense approval: classify a receipt, check policy, then route by amount
//! to auto-approval, a manager, or auto-rejection.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use switchyard_core::config::{ExecutorConfig, ExpenseConfig};
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::{Approver, ModelClient, Tool};
use switchyard_core::types::{ApprovalDecision, ApprovalRequest, ChatMessage};
use switchyard_core::ToolRegistry;
use switchyard_graph::{
    ChannelSpec, CompileError, CompiledGraph, Node, NodeContext, RouteLabel, State, StateGraph,
    StateUpdate, END,
};

use crate::json::extract_as;

pub const EXPENSE_DETAILS: &str = "expense_details";
pub const CLASSIFICATION: &str = "classification";
pub const AMOUNT_USD: &str = "amount_usd";
pub const RISK_SCORE: &str = "risk_score";
pub const LOGS: &str = "logs";
pub const STATUS: &str = "status";

pub const INITIAL_REVIEW: &str = "initial_review";
pub const POLICY_CHECK: &str = "policy_check";
pub const HUMAN_APPROVAL: &str = "human_approval";
pub const AUTO_APPROVE: &str = "auto_approve";
pub const AUTO_REJECT_HIGH_VALUE: &str = "auto_reject_high_value";
pub const FINALIZE: &str = "finalize";

pub const PENDING: &str = "PENDING";
pub const APPROVED: &str = "APPROVED";
pub const REJECTED: &str = "REJECTED";

const EXTRACTION_PROMPT: &str =
    "Extract JSON: { category: string, amount: number, risk_score: number (1-10) }.";

/// Collaborators the expense graph runs against.
pub struct ExpenseDeps {
    pub model: Arc<dyn ModelClient>,
    pub approver: Arc<dyn Approver>,
    pub tools: Arc<ToolRegistry>,
    pub limits: ExpenseConfig,
}

impl ExpenseDeps {
    /// Uses the built-in [`PolicyTool`] for `check_policy`.
    pub fn new(
        model: Arc<dyn ModelClient>,
        approver: Arc<dyn Approver>,
        limits: ExpenseConfig,
    ) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(PolicyTool);
        Self {
            model,
            approver,
            tools: Arc::new(tools),
            limits,
        }
    }
}

pub fn channels() -> Vec<ChannelSpec> {
    vec![
        ChannelSpec::replace(EXPENSE_DETAILS, Value::Null),
        ChannelSpec::replace(CLASSIFICATION, Value::Null),
        ChannelSpec::replace(AMOUNT_USD, 0),
        ChannelSpec::replace(RISK_SCORE, 0),
        ChannelSpec::append(LOGS),
        ChannelSpec::replace(STATUS, PENDING),
    ]
}

/// Initial state for one receipt.
pub fn input(expense_details: impl Into<String>) -> StateUpdate {
    StateUpdate::new()
        .set(EXPENSE_DETAILS, expense_details.into())
}

pub fn graph(deps: ExpenseDeps) -> StateGraph {
    let mut g = StateGraph::new("expense_approval", channels());
    let limits = deps.limits.clone();

    g.add_node(INITIAL_REVIEW, InitialReview { model: deps.model });
    g.add_node(POLICY_CHECK, PolicyCheck { tools: deps.tools });
    g.add_node(
        HUMAN_APPROVAL,
        HumanApproval {
            approver: deps.approver,
            timeout: Duration::from_secs(limits.approval_timeout_secs),
        },
    );

    let approve_limit = limits.auto_approve_limit;
    g.add_node_fn(AUTO_APPROVE, move |_state: State, _ctx: NodeContext| async move {
        Ok(StateUpdate::new()
            .set(STATUS, APPROVED)
            .set(LOGS, json!([format!("Auto-Approved (<${approve_limit})")])))
    });

    let reject_limit = limits.auto_reject_limit;
    g.add_node_fn(AUTO_REJECT_HIGH_VALUE, move |_state: State, _ctx: NodeContext| async move {
        Ok(StateUpdate::new()
            .set(STATUS, REJECTED)
            .set(LOGS, json!([format!("Rejected (> ${reject_limit})")])))
    });

    g.add_node_fn(FINALIZE, |state: State, ctx: NodeContext| async move {
        info!(
            run_id = %ctx.run_id(),
            status = state.get_str(STATUS).unwrap_or(PENDING),
            "Expense finalized"
        );
        Ok(StateUpdate::new())
    });

    g.set_entry_point(INITIAL_REVIEW)
        .add_edge(INITIAL_REVIEW, POLICY_CHECK)
        .add_conditional_edges(
            POLICY_CHECK,
            move |state: &State| route_after_policy(state, &limits),
            [
                (FINALIZE, FINALIZE),
                (HUMAN_APPROVAL, HUMAN_APPROVAL),
                (AUTO_APPROVE, AUTO_APPROVE),
                (AUTO_REJECT_HIGH_VALUE, AUTO_REJECT_HIGH_VALUE),
            ],
        )
        .add_edge(HUMAN_APPROVAL, FINALIZE)
        .add_edge(AUTO_APPROVE, FINALIZE)
        .add_edge(AUTO_REJECT_HIGH_VALUE, FINALIZE)
        .add_edge(FINALIZE, END);
    g
}

pub fn build(
    deps: ExpenseDeps,
    executor: &ExecutorConfig,
) -> std::result::Result<CompiledGraph, CompileError> {
    graph(deps).with_config(executor.clone()).compile()
}

/// Where an expense goes once policy has been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyRoute {
    Finalize,
    HumanApproval,
    AutoApprove,
    AutoRejectHighValue,
}

impl RouteLabel for PolicyRoute {
    fn label(&self) -> &str {
        match self {
            Self::Finalize => FINALIZE,
            Self::HumanApproval => HUMAN_APPROVAL,
            Self::AutoApprove => AUTO_APPROVE,
            Self::AutoRejectHighValue => AUTO_REJECT_HIGH_VALUE,
        }
    }

    fn declared() -> Option<Vec<&'static str>> {
        Some(vec![
            FINALIZE,
            HUMAN_APPROVAL,
            AUTO_APPROVE,
            AUTO_REJECT_HIGH_VALUE,
        ])
    }
}

/// A policy rejection skips the amount checks entirely.
pub fn route_after_policy(state: &State, limits: &ExpenseConfig) -> PolicyRoute {
    if state.get_str(STATUS) == Some(REJECTED) {
        return PolicyRoute::Finalize;
    }
    let amount = state.get_f64(AMOUNT_USD).unwrap_or(0.0);
    if amount > limits.auto_reject_limit {
        info!(
            amount,
            limit = limits.auto_reject_limit,
            "Amount too high, auto-rejecting"
        );
        PolicyRoute::AutoRejectHighValue
    } else if amount > limits.auto_approve_limit {
        PolicyRoute::HumanApproval
    } else {
        PolicyRoute::AutoApprove
    }
}

#[derive(Debug, Deserialize)]
struct Extraction {
    category: String,
    amount: f64,
    risk_score: f64,
}

impl Default for Extraction {
    fn default() -> Self {
        Self {
            category: "Unknown".into(),
            amount: 0.0,
            risk_score: 10.0,
        }
    }
}

struct InitialReview {
    model: Arc<dyn ModelClient>,
}

impl Node for InitialReview {
    fn run(&self, state: State, _ctx: NodeContext) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let text = state
                .get_str(EXPENSE_DETAILS)
                .unwrap_or_default()
                .to_string();
            let reply = self
                .model
                .invoke(vec![
                    ChatMessage::system(EXTRACTION_PROMPT),
                    ChatMessage::user(text),
                ])
                .await?;

            let data = extract_as::<Extraction>(&reply).unwrap_or_else(|| {
                warn!(reply = %reply, "Could not parse extraction, using fallback");
                Extraction::default()
            });
            info!(
                category = %data.category,
                amount = data.amount,
                risk_score = data.risk_score,
                "Expense extracted"
            );

            Ok(StateUpdate::new()
                .set(CLASSIFICATION, data.category.clone())
                .set(AMOUNT_USD, data.amount)
                .set(RISK_SCORE, data.risk_score)
                .set(LOGS, json!([format!("Reviewed item: {}", data.category)])))
        })
    }
}

#[derive(Debug, Deserialize)]
struct PolicyVerdict {
    allowed: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    limit: Option<f64>,
}

struct PolicyCheck {
    tools: Arc<ToolRegistry>,
}

impl Node for PolicyCheck {
    fn run(&self, state: State, _ctx: NodeContext) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let category = state.get_str(CLASSIFICATION).unwrap_or("Unknown");
            let result = self
                .tools
                .call(PolicyTool::NAME, json!({ "category": category }))
                .await?;
            let verdict: PolicyVerdict = serde_json::from_value(result)?;

            if !verdict.allowed {
                let reason = verdict.reason.unwrap_or_else(|| "not allowed".into());
                info!(category, reason = %reason, "Policy violation");
                return Ok(StateUpdate::new()
                    .set(STATUS, REJECTED)
                    .set(LOGS, json!([format!("Policy Violation: {reason}")])));
            }

            info!(category, limit = ?verdict.limit, "Policy check passed");
            Ok(StateUpdate::new().set(LOGS, json!(["Policy Check Passed"])))
        })
    }
}

struct HumanApproval {
    approver: Arc<dyn Approver>,
    timeout: Duration,
}

impl Node for HumanApproval {
    fn run(&self, state: State, ctx: NodeContext) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let category = state.get_str(CLASSIFICATION).unwrap_or("Unknown");
            let amount = state.get_f64(AMOUNT_USD).unwrap_or(0.0);
            let request = ApprovalRequest::new(
                category,
                format!("Manager approval needed for {category} (${amount})"),
                ctx.run_id(),
            );
            info!(request_id = %request.id, category, amount, "Waiting for manager approval");

            let decision = tokio::select! {
                decision = self.approver.request(request) => decision?,
                _ = ctx.cancelled() => return Err(SwitchyardError::Cancelled),
                _ = tokio::time::sleep(self.timeout) => {
                    let secs = self.timeout.as_secs();
                    warn!(category, timeout_secs = secs, "Manager approval timed out");
                    return Ok(StateUpdate::new()
                        .set(STATUS, REJECTED)
                        .set(LOGS, json!([format!("Approval timed out after {secs}s")])));
                }
            };

            Ok(match decision {
                ApprovalDecision::Approved => StateUpdate::new()
                    .set(STATUS, APPROVED)
                    .set(LOGS, json!(["Manager Manually Approved"])),
                ApprovalDecision::Denied { reason } => StateUpdate::new()
                    .set(STATUS, REJECTED)
                    .set(LOGS, json!([format!("Manager Rejected: {reason}")])),
            })
        })
    }
}

/// Company expense policy handbook, exposed as the `check_policy` tool.
pub struct PolicyTool;

impl PolicyTool {
    pub const NAME: &'static str = "check_policy";
}

impl Tool for PolicyTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Checks company policy for a given expense category."
    }

    fn call(&self, args: Value) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let category = args
                .get("category")
                .and_then(Value::as_str)
                .ok_or_else(|| SwitchyardError::ToolValidation {
                    tool: Self::NAME.into(),
                    message: "missing string field 'category'".into(),
                })?;
            info!(category, "Consulting policy handbook");
            Ok(match category {
                "Alcohol" => json!({ "allowed": false, "reason": "No alcohol on weekdays." }),
                "Electronics" => json!({ "allowed": true, "limit": 500 }),
                _ => json!({ "allowed": true, "limit": 1000 }),
            })
        })
    }
}
