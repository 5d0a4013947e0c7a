use std::sync::Arc;

use switchyard_core::config::{ExecutorConfig, SalesConfig};
use switchyard_flows::sales::{self, CreditLedger, SalesDeps};
use switchyard_graph::CompiledGraph;
use switchyard_test_utils::ScriptedModel;

const HOOK: &str = "CEO: Jane Doe. Hook: she races sailboats on weekends.";
const EMAIL: &str = "Subject: Smooth sailing for your supply chain";

fn pipeline(model: Arc<ScriptedModel>, ledger: Arc<CreditLedger>) -> CompiledGraph {
    let deps = SalesDeps {
        model,
        ledger,
        billing: SalesConfig::default(),
    };
    sales::build(deps, &ExecutorConfig::default()).unwrap()
}

fn scripted() -> Arc<ScriptedModel> {
    Arc::new(
        ScriptedModel::default()
            .when("Prospect Info:", EMAIL)
            .when("Welcome to", HOOK),
    )
}

#[tokio::test]
async fn paying_user_gets_a_draft() {
    let model = scripted();
    let ledger = Arc::new(CreditLedger::mock());
    let graph = pipeline(model.clone(), ledger.clone());

    let outcome = graph
        .invoke(sales::input("user_123", "https://logistics-widgets.com"))
        .await;

    assert!(outcome.is_completed());
    assert_eq!(
        outcome.visited(),
        vec!["billing_check", "scrape_company", "identify_prospect", "draft_email"]
    );
    assert_eq!(outcome.state.get_str(sales::EMAIL_DRAFT), Some(EMAIL));
    assert_eq!(outcome.state.get_str(sales::DECISION_MAKER), Some(HOOK));
    assert!(outcome.state.is_null(sales::ERROR));
    assert_eq!(ledger.balance("user_123").await, Some(5));

    let prompts = model.prompts().await;
    assert_eq!(prompts.len(), 2);
    let hook_prompt = &prompts[0][1].content;
    assert!(hook_prompt.starts_with("Welcome to logistics-widgets AI!"));
    let draft_prompt = format!("Prospect Info: {HOOK}. Company context: Welcome to");
    assert!(prompts[1][1].content.starts_with(&draft_prompt));
}

#[tokio::test]
async fn poor_user_is_sent_to_the_upsell() {
    let model = scripted();
    let ledger = Arc::new(CreditLedger::mock());
    let graph = pipeline(model.clone(), ledger.clone());

    let outcome = graph
        .invoke(sales::input("user_456", "https://another-startup.com"))
        .await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.visited(), vec!["billing_check", "finalize_error"]);
    assert_eq!(
        outcome.state.get_str(sales::ERROR),
        Some("Insufficient credits. You have 2, need 5. Please Upgrade.")
    );
    assert!(outcome.state.is_null(sales::EMAIL_DRAFT));
    assert_eq!(model.call_count().await, 0);
    assert_eq!(ledger.balance("user_456").await, Some(2));
}

#[tokio::test]
async fn unknown_user_is_refused() {
    let graph = pipeline(scripted(), Arc::new(CreditLedger::mock()));
    let outcome = graph
        .invoke(sales::input("user_999", "https://acme.com"))
        .await;

    assert_eq!(outcome.state.get_str(sales::ERROR), Some("User not found"));
    assert_eq!(outcome.visited().last().copied(), Some("finalize_error"));
}

#[tokio::test]
async fn credits_run_out_across_runs() {
    let ledger = Arc::new(CreditLedger::mock());
    let graph = pipeline(scripted(), ledger.clone());

    for _ in 0..2 {
        let outcome = graph
            .invoke(sales::input("user_123", "https://acme.com"))
            .await;
        assert_eq!(outcome.state.get_str(sales::EMAIL_DRAFT), Some(EMAIL));
    }
    let third = graph
        .invoke(sales::input("user_123", "https://acme.com"))
        .await;
    assert_eq!(
        third.state.get_str(sales::ERROR),
        Some("Insufficient credits. You have 0, need 5. Please Upgrade.")
    );
    assert_eq!(ledger.balance("user_123").await, Some(0));
}
