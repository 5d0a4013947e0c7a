//! Paid sales-email pipeline: charge the user, read the target company's
//! page, find the decision maker, and draft a cold email for them.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info};

use switchyard_core::config::{ExecutorConfig, SalesConfig};
use switchyard_core::error::Result;
use switchyard_core::traits::ModelClient;
use switchyard_core::types::ChatMessage;
use switchyard_graph::{
    ChannelSpec, CompileError, CompiledGraph, Node, NodeContext, RouteLabel, State, StateGraph,
    StateUpdate, END,
};

pub const USER_ID: &str = "user_id";
pub const TARGET_URL: &str = "target_url";
pub const COMPANY_INFO: &str = "company_info";
pub const DECISION_MAKER: &str = "decision_maker";
pub const EMAIL_DRAFT: &str = "email_draft";
pub const ERROR: &str = "error";

pub const BILLING_CHECK: &str = "billing_check";
pub const SCRAPE_COMPANY: &str = "scrape_company";
pub const IDENTIFY_PROSPECT: &str = "identify_prospect";
pub const DRAFT_EMAIL: &str = "draft_email";
pub const FINALIZE_ERROR: &str = "finalize_error";

const PROSPECT_PROMPT: &str =
    "Extract the CEO name and a personalized 'hook' based on their interests.";
const EMAIL_PROMPT: &str =
    "Write a short, punchy cold email selling 'Agent0 Sales Tool'. Use the hook.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub credits: u64,
    pub plan: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChargeError {
    #[error("User not found")]
    UnknownUser,
    #[error("Insufficient credits. You have {credits}, need {cost}. Please Upgrade.")]
    InsufficientCredits { credits: u64, cost: u64 },
}

/// Per-user credit balances. Charges are atomic per call.
#[derive(Debug, Default)]
pub struct CreditLedger {
    accounts: Mutex<HashMap<String, Account>>,
}

impl CreditLedger {
    pub fn new(accounts: impl IntoIterator<Item = (String, Account)>) -> Self {
        Self {
            accounts: Mutex::new(accounts.into_iter().collect()),
        }
    }

    /// One paying customer with room for two runs, one free user without.
    pub fn mock() -> Self {
        Self::new([
            (
                "user_123".to_string(),
                Account {
                    credits: 10,
                    plan: "PRO".into(),
                },
            ),
            (
                "user_456".to_string(),
                Account {
                    credits: 2,
                    plan: "FREE".into(),
                },
            ),
        ])
    }

    /// Deduct `cost` and return the remaining balance.
    pub async fn charge(&self, user_id: &str, cost: u64) -> std::result::Result<u64, ChargeError> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts.get_mut(user_id).ok_or(ChargeError::UnknownUser)?;
        if account.credits < cost {
            return Err(ChargeError::InsufficientCredits {
                credits: account.credits,
                cost,
            });
        }
        account.credits -= cost;
        Ok(account.credits)
    }

    pub async fn balance(&self, user_id: &str) -> Option<u64> {
        self.accounts.lock().await.get(user_id).map(|a| a.credits)
    }
}

pub struct SalesDeps {
    pub model: Arc<dyn ModelClient>,
    pub ledger: Arc<CreditLedger>,
    pub billing: SalesConfig,
}

pub fn channels() -> Vec<ChannelSpec> {
    [USER_ID, TARGET_URL, COMPANY_INFO, DECISION_MAKER, EMAIL_DRAFT, ERROR]
        .into_iter()
        .map(|name| ChannelSpec::replace(name, Value::Null))
        .collect()
}

pub fn input(user_id: impl Into<String>, target_url: impl Into<String>) -> StateUpdate {
    StateUpdate::new()
        .set(USER_ID, user_id.into())
        .set(TARGET_URL, target_url.into())
}

pub fn graph(deps: SalesDeps) -> StateGraph {
    let mut g = StateGraph::new("sales_email", channels());

    g.add_node(
        BILLING_CHECK,
        BillingCheck {
            ledger: deps.ledger,
            cost: deps.billing.cost_per_run,
        },
    );
    g.add_node_fn(SCRAPE_COMPANY, |state: State, _ctx: NodeContext| async move {
        let url = state.get_str(TARGET_URL).unwrap_or_default();
        info!(url, "Scraping company page");
        Ok(StateUpdate::new().set(COMPANY_INFO, mock_company_page(url)))
    });
    g.add_node(
        IDENTIFY_PROSPECT,
        IdentifyProspect {
            model: deps.model.clone(),
        },
    );
    g.add_node(DRAFT_EMAIL, DraftEmail { model: deps.model });
    g.add_node_fn(FINALIZE_ERROR, |state: State, _ctx: NodeContext| async move {
        error!(
            user_id = state.get_str(USER_ID).unwrap_or_default(),
            reason = state.get_str(ERROR).unwrap_or_default(),
            "Sales run refused"
        );
        Ok(StateUpdate::new())
    });

    g.set_entry_point(BILLING_CHECK)
        .add_conditional_edges(
            BILLING_CHECK,
            route_billing,
            [(FINALIZE_ERROR, FINALIZE_ERROR), (SCRAPE_COMPANY, SCRAPE_COMPANY)],
        )
        .add_edge(SCRAPE_COMPANY, IDENTIFY_PROSPECT)
        .add_edge(IDENTIFY_PROSPECT, DRAFT_EMAIL)
        .add_edge(DRAFT_EMAIL, END)
        .add_edge(FINALIZE_ERROR, END);
    g
}

pub fn build(
    deps: SalesDeps,
    executor: &ExecutorConfig,
) -> std::result::Result<CompiledGraph, CompileError> {
    graph(deps).with_config(executor.clone()).compile()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingRoute {
    FinalizeError,
    ScrapeCompany,
}

impl RouteLabel for BillingRoute {
    fn label(&self) -> &str {
        match self {
            Self::FinalizeError => FINALIZE_ERROR,
            Self::ScrapeCompany => SCRAPE_COMPANY,
        }
    }

    fn declared() -> Option<Vec<&'static str>> {
        Some(vec![FINALIZE_ERROR, SCRAPE_COMPANY])
    }
}

pub fn route_billing(state: &State) -> BillingRoute {
    if state.is_null(ERROR) {
        BillingRoute::ScrapeCompany
    } else {
        BillingRoute::FinalizeError
    }
}

/// Stand-in for a real scraper: a fixed landing page named after the domain.
pub fn mock_company_page(url: &str) -> String {
    let company = url.replace("https://", "").replace(".com", "");
    format!(
        "Welcome to {company} AI!\n\
         We build autonomous widgets for enterprise logistics.\n\
         Our mission is to optimize supply chains by 50%.\n\
         Lead by CEO Jane Doe, who loves sailing and efficiency."
    )
}

struct BillingCheck {
    ledger: Arc<CreditLedger>,
    cost: u64,
}

impl Node for BillingCheck {
    fn run(&self, state: State, _ctx: NodeContext) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let user_id = state.get_str(USER_ID).unwrap_or_default();
            info!(user_id, "Checking billing");
            match self.ledger.charge(user_id, self.cost).await {
                Ok(remaining) => {
                    info!(user_id, cost = self.cost, remaining, "Deducted credits");
                    Ok(StateUpdate::new())
                }
                Err(e) => {
                    info!(user_id, reason = %e, "Billing check failed");
                    Ok(StateUpdate::new().set(ERROR, e.to_string()))
                }
            }
        })
    }
}

struct IdentifyProspect {
    model: Arc<dyn ModelClient>,
}

impl Node for IdentifyProspect {
    fn run(&self, state: State, _ctx: NodeContext) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            info!("Identifying decision maker");
            let company = state.get_str(COMPANY_INFO).unwrap_or_default();
            let reply = self
                .model
                .invoke(vec![
                    ChatMessage::system(PROSPECT_PROMPT),
                    ChatMessage::user(company),
                ])
                .await?;
            Ok(StateUpdate::new().set(DECISION_MAKER, reply))
        })
    }
}

struct DraftEmail {
    model: Arc<dyn ModelClient>,
}

impl Node for DraftEmail {
    fn run(&self, state: State, _ctx: NodeContext) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            info!("Drafting email");
            let prospect = state.get_str(DECISION_MAKER).unwrap_or_default();
            let company = state.get_str(COMPANY_INFO).unwrap_or_default();
            let reply = self
                .model
                .invoke(vec![
                    ChatMessage::system(EMAIL_PROMPT),
                    ChatMessage::user(format!(
                        "Prospect Info: {prospect}. Company context: {company}"
                    )),
                ])
                .await?;
            Ok(StateUpdate::new().set(EMAIL_DRAFT, reply))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn charging_deducts_until_broke() {
        let ledger = CreditLedger::mock();
        assert_eq!(ledger.charge("user_123", 5).await, Ok(5));
        assert_eq!(ledger.charge("user_123", 5).await, Ok(0));
        assert_eq!(
            ledger.charge("user_123", 5).await,
            Err(ChargeError::InsufficientCredits {
                credits: 0,
                cost: 5,
            })
        );
        assert_eq!(ledger.balance("user_123").await, Some(0));
    }

    #[tokio::test]
    async fn charge_errors_read_like_upsells() {
        let ledger = CreditLedger::mock();
        let poor = ledger.charge("user_456", 5).await.unwrap_err();
        assert_eq!(
            poor.to_string(),
            "Insufficient credits. You have 2, need 5. Please Upgrade."
        );
        assert_eq!(ledger.balance("user_456").await, Some(2));

        let ghost = ledger.charge("user_999", 5).await.unwrap_err();
        assert_eq!(ghost.to_string(), "User not found");
    }

    #[test]
    fn billing_route() {
        let ok: State = [(ERROR, Value::Null)].into_iter().collect();
        assert_eq!(route_billing(&ok), BillingRoute::ScrapeCompany);
        let refused: State = [(ERROR, json!("User not found"))].into_iter().collect();
        assert_eq!(route_billing(&refused), BillingRoute::FinalizeError);
    }

    #[test]
    fn company_page_names_the_domain() {
        let page = mock_company_page("https://logistics-widgets.com");
        assert!(page.starts_with("Welcome to logistics-widgets AI!"));
        assert!(page.contains("CEO Jane Doe"));
    }
}
