#![allow(dead_code)]
//! # Common Test Utilities
//!
//! Shared setup for the integration tests: tracing and orchestrator wiring over the
//! in-memory stores from `rolerag-test-utils`.

use dotenvy::dotenv;
use rolerag::{
    executor::StructuredExecutor, retrieval::DocumentRetriever, ChatOrchestrator,
    QueryClassifier, SqlTranslator,
};
use rolerag_test_utils::{MockAiProvider, TestSetup};
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT: Once = Once::new();

/// Initializes the tracing subscriber and loads .env for tests.
pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Wires an orchestrator over the test stores with one mock model for every task.
pub fn build_orchestrator(
    setup: &TestSetup,
    ai: &MockAiProvider,
    retriever: Arc<dyn DocumentRetriever>,
    timeout: Duration,
) -> ChatOrchestrator {
    ChatOrchestrator::builder()
        .classifier(QueryClassifier::new(Box::new(ai.clone())).with_timeout(timeout))
        .translator(SqlTranslator::new(Box::new(ai.clone())).with_timeout(timeout))
        .executor(StructuredExecutor::new(
            Box::new(setup.tabular_store.clone()),
            setup.locks.clone(),
        ))
        .retriever(retriever)
        .app_store(setup.app_store.clone())
        .tabular_store(setup.tabular_store.clone())
        .build()
        .expect("all components are set")
}

pub const POLICIES_CSV: &str = "policy,days\nannual leave,20\nsick leave,10\n";
pub const SALARIES_CSV: &str = "employee,salary\nAlice,5000\nBob,6000\n";
pub const HR_CSV: &str = "full name,department\nCarol,HR\n";

/// Seeds `general_policies` (general), `finance_salaries` (finance) and `hr_staff` (HR).
pub async fn seed_company(setup: &TestSetup) {
    setup.add_role("finance").await.unwrap();
    setup.add_role("HR").await.unwrap();
    setup
        .seed_table("general_policies", "general", POLICIES_CSV)
        .await
        .unwrap();
    setup
        .seed_table("finance_salaries", "finance", SALARIES_CSV)
        .await
        .unwrap();
    setup.seed_table("hr_staff", "HR", HR_CSV).await.unwrap();
}
