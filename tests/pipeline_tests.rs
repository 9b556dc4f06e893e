//! Tests de integración del pipeline completo de QueryLens
//!
//! Este módulo verifica el flujo completo upload -> profile -> query con
//! colaboradores simulados:
//! - Subida y perfilado de CSV con parche de seguridad
//! - Clasificación y planificación de consultas
//! - Routing semántico, híbrido y LLM
//! - Degradación ante fallos de agentes

use anyhow::Result;
use async_trait::async_trait;
use querylens::agent::{
    AgentOrchestrator, AgentType, ChartAgent, ChartRenderer, ConversationAgent, CsvProfiler,
    IntentType, LlmChunk, LlmClient, LlmStream, PlannerAgent, ProfilingAgent, SecurityAgent,
    SecurityAssessor, SemanticAgent, SemanticExecutor, SemanticRequest, SemanticResponse,
    VisualizationType,
};
use querylens::config::AppConfig;
use querylens::types::{
    ChartOutput, ColumnInfo, ColumnType, DataProfile, DataSchema, ProfileMetadata, RiskLevel,
    RoutingStrategy, SecurityPatch, UploadedFile,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct StubProfiler;

#[async_trait]
impl CsvProfiler for StubProfiler {
    async fn profile(&self, file: &UploadedFile) -> Result<DataProfile> {
        Ok(DataProfile {
            id: "sales-profile".to_string(),
            file_name: file.name.clone(),
            schema: DataSchema {
                columns: vec![
                    ColumnInfo::new("sales", ColumnType::Numeric),
                    ColumnInfo::new("region", ColumnType::Text),
                    ColumnInfo::new("order_date", ColumnType::Date),
                ],
            },
            metadata: ProfileMetadata {
                row_count: 5_000,
                column_count: 3,
            },
            security: None,
        })
    }
}

struct StubAssessor;

#[async_trait]
impl SecurityAssessor for StubAssessor {
    async fn assess(&self, _profile: &DataProfile) -> Result<SecurityPatch> {
        Ok(SecurityPatch {
            pii_columns: Some(vec!["region".to_string()]),
            risk_level: Some(RiskLevel::Medium),
            redaction_applied: Some(false),
        })
    }
}

struct StubSemantic {
    calls: AtomicUsize,
    requires_llm: bool,
}

impl StubSemantic {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            requires_llm: false,
        }
    }

    fn needing_llm() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            requires_llm: true,
        }
    }
}

#[async_trait]
impl SemanticExecutor for StubSemantic {
    async fn execute(&self, request: SemanticRequest) -> Result<SemanticResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.profile.id, "sales-profile");
        Ok(SemanticResponse {
            data: vec![json!({"sales": 12345})],
            insights: vec!["Total sales across all regions is 12345.".to_string()],
            suggestions: vec!["Break it down by region?".to_string()],
            requires_llm_processing: self.requires_llm,
        })
    }
}

struct StubLlm;

#[async_trait]
impl LlmClient for StubLlm {
    async fn stream(
        &self,
        _session_id: &str,
        query: &str,
        _file_id: Option<&str>,
    ) -> Result<LlmStream> {
        let chunks = vec![
            LlmChunk::Content(format!("About \"{}\": ", query)),
            LlmChunk::Content("here is what the data says.".to_string()),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

struct StubRenderer;

#[async_trait]
impl ChartRenderer for StubRenderer {
    async fn render(
        &self,
        _data: &[Value],
        visualization: VisualizationType,
    ) -> Result<ChartOutput> {
        Ok(ChartOutput {
            format: "svg".to_string(),
            payload: format!("<svg data-kind=\"{:?}\"/>", visualization),
        })
    }
}

async fn build_orchestrator(semantic: Arc<StubSemantic>) -> AgentOrchestrator {
    let orchestrator = AgentOrchestrator::new(AppConfig::default());
    orchestrator
        .register_agent(Arc::new(ProfilingAgent::new(Arc::new(StubProfiler))))
        .await
        .unwrap();
    orchestrator
        .register_agent(Arc::new(SecurityAgent::new(Arc::new(StubAssessor))))
        .await
        .unwrap();
    orchestrator
        .register_agent(Arc::new(PlannerAgent::new()))
        .await
        .unwrap();
    orchestrator
        .register_agent(Arc::new(SemanticAgent::new(semantic.clone())))
        .await
        .unwrap();
    orchestrator
        .register_agent(Arc::new(ChartAgent::new(Arc::new(StubRenderer))))
        .await
        .unwrap();
    orchestrator
        .register_conversation_agent(Arc::new(ConversationAgent::new(
            Arc::new(StubLlm),
            Some(semantic),
            querylens::config::RoutingConfig::default(),
        )))
        .await
        .unwrap();
    orchestrator
}

fn sales_csv() -> UploadedFile {
    UploadedFile::new(
        "sales.csv",
        "text/csv",
        b"region,sales,order_date\nwest,100,2024-01-01\n".to_vec(),
    )
}

#[tokio::test]
async fn test_upload_then_aggregation_query_end_to_end() {
    let semantic = Arc::new(StubSemantic::new());
    let orchestrator = build_orchestrator(semantic.clone()).await;

    let profile = orchestrator.process_data_upload(sales_csv()).await.unwrap();
    assert_eq!(profile.id, "sales-profile");
    // Security patch merged into the stored profile
    let security = profile.security.expect("security section present");
    assert_eq!(security.risk_level, RiskLevel::Medium);

    let result = orchestrator
        .execute_query("Sum of sales", &profile.id)
        .await
        .unwrap();
    assert_eq!(result.strategy, RoutingStrategy::SemanticOnly);
    assert_eq!(result.data, vec![json!({"sales": 12345})]);
    assert!(result.response.contains("12345"));
    assert_eq!(semantic.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_trend_query_attaches_chart() {
    let semantic = Arc::new(StubSemantic::new());
    let orchestrator = build_orchestrator(semantic).await;
    let profile = orchestrator.process_data_upload(sales_csv()).await.unwrap();

    let result = orchestrator
        .execute_query("sales trend over time", &profile.id)
        .await
        .unwrap();
    assert_eq!(result.strategy, RoutingStrategy::SemanticOnly);
    let chart = result.chart.expect("trend answers carry a chart");
    assert_eq!(chart.format, "svg");
    assert!(chart.payload.contains("Line"));
}

#[tokio::test]
async fn test_aggregation_query_suggests_table_and_skips_chart() {
    let semantic = Arc::new(StubSemantic::new());
    let orchestrator = build_orchestrator(semantic).await;
    let profile = orchestrator.process_data_upload(sales_csv()).await.unwrap();

    let result = orchestrator
        .execute_query("Sum of sales", &profile.id)
        .await
        .unwrap();
    // Aggregations suggest a table, which is never rendered
    assert!(result.chart.is_none());
}

#[tokio::test]
async fn test_unknown_query_routes_to_llm() {
    let semantic = Arc::new(StubSemantic::new());
    let orchestrator = build_orchestrator(semantic.clone()).await;
    let profile = orchestrator.process_data_upload(sales_csv()).await.unwrap();

    let result = orchestrator
        .execute_query("xyzzy plugh", &profile.id)
        .await
        .unwrap();
    assert_eq!(result.strategy, RoutingStrategy::LlmOnly);
    assert!(result.response.contains("what the data says"));
    // The semantic engine was never consulted
    assert_eq!(semantic.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_semantic_requesting_llm_falls_back_to_conversation() {
    let semantic = Arc::new(StubSemantic::needing_llm());
    let orchestrator = build_orchestrator(semantic.clone()).await;
    let profile = orchestrator.process_data_upload(sales_csv()).await.unwrap();

    let result = orchestrator
        .execute_query("Sum of sales", &profile.id)
        .await
        .unwrap();
    // The engine asked for LLM post-processing, so the conversation agent
    // owns the final answer; its session knows the dataset, so the semantic
    // pass runs again inside the conversation routing
    assert!(result.strategy == RoutingStrategy::SemanticOnly
        || result.strategy == RoutingStrategy::LlmOnly);
    assert!(semantic.calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_upload_rejections_never_reach_agents() {
    let semantic = Arc::new(StubSemantic::new());
    let orchestrator = build_orchestrator(semantic).await;

    for file in [
        UploadedFile::new("empty.csv", "text/csv", vec![]),
        UploadedFile::new("data.parquet", "application/octet-stream", vec![1]),
        UploadedFile::new("noext", "text/csv", vec![1]),
    ] {
        assert!(orchestrator.process_data_upload(file).await.is_err());
    }

    // The profiler never ran, so its health counters are untouched
    let health = orchestrator.get_system_health().await;
    assert_eq!(health[&AgentType::Profiler].total_executions, 0);
}

#[tokio::test]
async fn test_planner_cache_hit_on_repeat_query() {
    let semantic = Arc::new(StubSemantic::new());
    let orchestrator = build_orchestrator(semantic).await;
    let profile = orchestrator.process_data_upload(sales_csv()).await.unwrap();

    let first = orchestrator
        .execute_query("Sum of sales", &profile.id)
        .await
        .unwrap();
    let second = orchestrator
        .execute_query("Sum of sales", &profile.id)
        .await
        .unwrap();
    // Identical answers either way; the cache is a planner-internal detail
    assert_eq!(first.response, second.response);

    let health = orchestrator.get_system_health().await;
    assert_eq!(health[&AgentType::Planner].total_executions, 2);
    assert_eq!(health[&AgentType::Planner].error_count, 0);
}

#[tokio::test]
async fn test_classification_scenarios_via_planner() {
    use querylens::agent::IntentClassifier;

    let classifier = IntentClassifier::new();
    let columns = vec![
        "sales".to_string(),
        "region".to_string(),
        "order_date".to_string(),
    ];

    let intent = classifier.classify("Sum of sales", &columns).intent;
    assert_eq!(intent.intent_type, IntentType::Aggregation);
    assert!(intent.confidence > 0.8);
    assert_eq!(intent.measures, vec!["sales".to_string()]);
    assert!(!intent.requires_llm);
    assert_eq!(intent.estimated_cost, 3);

    let empty = classifier.classify("", &columns).intent;
    assert_eq!(empty.intent_type, IntentType::Unknown);
    assert!(empty.confidence < 0.5);
    assert!(empty.requires_llm);
}
