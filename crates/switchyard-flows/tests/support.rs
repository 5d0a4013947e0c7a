use std::sync::Arc;

use serde_json::json;

use switchyard_core::config::ExecutorConfig;
use switchyard_core::traits::ModelClient;
use switchyard_flows::support::{self, SupportDeps};
use switchyard_graph::{CompiledGraph, RunError};
use switchyard_test_utils::{FailingModel, ScriptedModel};

fn bot(model: Arc<dyn ModelClient>) -> CompiledGraph {
    support::build(SupportDeps::new(model), &ExecutorConfig::default()).unwrap()
}

#[tokio::test]
async fn answers_from_retrieved_docs() {
    let reply = "Pro users get 1000 requests per minute.";
    let model = Arc::new(ScriptedModel::always(reply));
    let graph = bot(model.clone());

    let input = support::input("What is the rate limit?");
    let outcome = graph.invoke(input).await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.state.get_str(support::ANSWER), Some(reply));
    assert_eq!(
        outcome.state.get(support::RETRIEVED_DOCS),
        Some(&json!([{
            "id": 1,
            "text": "The API rate limit is 1000 requests per minute for Pro users."
        }]))
    );

    let prompts = model.prompts().await;
    assert!(prompts[0][0].content.contains("ONLY the context"));
    assert_eq!(
        prompts[0][1].content,
        "Context:\n\
         - The API rate limit is 1000 requests per minute for Pro users.\n\n\
         Question: What is the rate limit?"
    );
}

#[tokio::test]
async fn punctuation_does_not_hide_keywords() {
    let model = Arc::new(ScriptedModel::always("Check the status page."));
    let graph = bot(model);

    let input = support::input("How do I fix a 500 error?");
    let outcome = graph.invoke(input).await;

    let docs = outcome.state.get_array(support::RETRIEVED_DOCS);
    let docs = docs.cloned().unwrap_or_default();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["id"], json!(3));
}

#[tokio::test]
async fn out_of_domain_question_gets_fallback_context() {
    let model = Arc::new(ScriptedModel::always("I don't know."));
    let graph = bot(model.clone());

    let outcome = graph.invoke(support::input("How do I cook pasta?")).await;

    let answer = outcome.state.get_str(support::ANSWER);
    assert_eq!(answer, Some("I don't know."));
    let prompts = model.prompts().await;
    let fallback = "Context:\n- No relevant documentation found.\n";
    assert!(prompts[0][1].content.starts_with(fallback));
}

#[tokio::test]
async fn model_failure_keeps_retrieval() {
    let graph = bot(Arc::new(FailingModel::default()));

    let outcome = graph.invoke(support::input("How do I reset my key?")).await;

    assert!(outcome.is_failed());
    assert!(matches!(
        outcome.error,
        Some(RunError::Node { ref node, .. }) if node == support::GENERATE
    ));
    assert_eq!(outcome.visited(), vec!["retrieve"]);
    let answer = outcome.state.get(support::ANSWER);
    assert!(answer.map_or(true, |v| v.is_null()));
    let docs = outcome.state.get_array(support::RETRIEVED_DOCS);
    assert!(docs.is_some_and(|d| !d.is_empty()));
}
