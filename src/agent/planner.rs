//! Query planner - turns a classified intent into a cost-estimated execution plan
//!
//! Plans are step DAGs: each step depends only on earlier steps, so creation
//! order is already a topological order. Low-confidence or unknown intents
//! fall back to a single LLM analysis step.

use super::classifier::{base_cost, IntentType, QueryIntent};
use crate::types::DataProfile;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Confidence below which the planner hands the query to the LLM path
pub const PLANNER_CONFIDENCE_FLOOR: f64 = 0.7;

const LOAD_STEP_MS: u64 = 50;
const FILTER_STEP_MS: u64 = 20;
const AGGREGATE_STEP_MS: u64 = 100;
const SORT_STEP_MS: u64 = 30;
const LIMIT_STEP_MS: u64 = 10;
const LLM_STEP_MS: u64 = 5_000;
const LLM_FALLBACK_COST: u8 = 8;

/// Kind of computation a plan step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Load,
    Filter,
    Aggregate,
    Sort,
    Limit,
    Transform,
    LlmAnalysis,
}

/// One node of the plan DAG
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub step_type: StepType,
    pub operation: String,
    pub params: Value,
    pub estimated_time_ms: u64,
    /// Ids of steps this one depends on; always earlier in the list
    pub depends_on: Vec<String>,
}

/// Informational optimization tags; nothing enforces them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Optimization {
    Cacheable,
    PredicatePushdown,
    ColumnPruning,
    IndexUsage,
}

/// Visualization suggested to the external chart collaborator; advisory only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationType {
    Line,
    Bar,
    Scatter,
    Heatmap,
    Table,
}

/// A complete plan for one classified query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: String,
    pub steps: Vec<PlanStep>,
    pub estimated_time_ms: u64,
    /// Cost on the shared 1-10 scale
    pub estimated_cost: u8,
    /// Present only for cacheable intent shapes with no filters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    pub fallback_to_llm: bool,
    pub optimizations: Vec<Optimization>,
    pub suggested_visualization: VisualizationType,
}

/// Intent types whose plans may be cached
const CACHEABLE_TYPES: &[IntentType] = &[
    IntentType::Profile,
    IntentType::Aggregation,
    IntentType::Comparison,
    IntentType::Distribution,
];

pub struct QueryPlanner;

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryPlanner {
    pub fn new() -> Self {
        Self
    }

    /// Build an execution plan for a classified intent against a data profile
    pub fn plan(&self, intent: &QueryIntent, profile: &DataProfile) -> ExecutionPlan {
        let fallback = intent.confidence < PLANNER_CONFIDENCE_FLOOR
            || intent.intent_type == IntentType::Unknown;

        if fallback {
            return Self::llm_fallback_plan(intent);
        }

        let mut steps = Vec::new();
        let mut last_id: Option<String> = None;
        let push = |step_type: StepType, operation: &str, params: Value, time_ms: u64,
                        steps: &mut Vec<PlanStep>,
                        last_id: &mut Option<String>| {
            let id = format!("step_{}", steps.len() + 1);
            steps.push(PlanStep {
                id: id.clone(),
                step_type,
                operation: operation.to_string(),
                params,
                estimated_time_ms: time_ms,
                depends_on: last_id.iter().cloned().collect(),
            });
            *last_id = Some(id);
        };

        push(
            StepType::Load,
            "load_dataset",
            json!({ "profile_id": profile.id }),
            LOAD_STEP_MS,
            &mut steps,
            &mut last_id,
        );

        for filter in &intent.filters {
            push(
                StepType::Filter,
                "apply_filter",
                json!({ "predicate": filter }),
                FILTER_STEP_MS,
                &mut steps,
                &mut last_id,
            );
        }

        if !intent.measures.is_empty() {
            push(
                StepType::Aggregate,
                "aggregate",
                json!({
                    "measures": intent.measures,
                    "dimensions": intent.dimensions,
                }),
                AGGREGATE_STEP_MS,
                &mut steps,
                &mut last_id,
            );
        }

        // A limit is only meaningful over ordered rows, so "top N" phrasings
        // need a sort even when a stronger pattern won the classification
        if intent.intent_type == IntentType::Ranking || intent.limit.is_some() {
            push(
                StepType::Sort,
                "sort",
                json!({ "keys": intent.measures, "descending": true }),
                SORT_STEP_MS,
                &mut steps,
                &mut last_id,
            );
        }

        if let Some(limit) = intent.limit {
            push(
                StepType::Limit,
                "limit",
                json!({ "count": limit }),
                LIMIT_STEP_MS,
                &mut steps,
                &mut last_id,
            );
        }

        let estimated_time_ms = Self::scaled_time(&steps, profile.metadata.row_count);
        let estimated_cost = Self::scaled_cost(intent);

        ExecutionPlan {
            id: Uuid::new_v4().to_string(),
            estimated_time_ms,
            estimated_cost,
            cache_key: Self::cache_key(intent),
            fallback_to_llm: false,
            optimizations: Self::optimizations(intent, profile),
            suggested_visualization: Self::suggest_visualization(intent.intent_type),
            steps,
        }
    }

    fn llm_fallback_plan(intent: &QueryIntent) -> ExecutionPlan {
        ExecutionPlan {
            id: Uuid::new_v4().to_string(),
            steps: vec![PlanStep {
                id: "step_1".to_string(),
                step_type: StepType::LlmAnalysis,
                operation: "llm_analysis".to_string(),
                params: json!({ "intent_type": intent.intent_type }),
                estimated_time_ms: LLM_STEP_MS,
                depends_on: Vec::new(),
            }],
            estimated_time_ms: LLM_STEP_MS,
            estimated_cost: LLM_FALLBACK_COST,
            cache_key: None,
            fallback_to_llm: true,
            optimizations: Vec::new(),
            suggested_visualization: Self::suggest_visualization(intent.intent_type),
        }
    }

    /// Crude data-size complexity multiplier over the fixed step estimates
    fn scaled_time(steps: &[PlanStep], row_count: u64) -> u64 {
        let multiplier = 1.0 + ((row_count + 1) as f64).log10() * 0.1;
        steps
            .iter()
            .map(|s| (s.estimated_time_ms as f64 * multiplier).round() as u64)
            .sum()
    }

    fn scaled_cost(intent: &QueryIntent) -> u8 {
        let base = base_cost(intent.intent_type) as f64;
        let scaled = base * (1.0 + (1.0 - intent.confidence) * 0.5);
        (scaled.round() as u8).clamp(1, 10)
    }

    /// Deterministic key over the intent's semantic shape, independent of the
    /// original phrasing. Present only for cacheable types with no filters.
    fn cache_key(intent: &QueryIntent) -> Option<String> {
        if !CACHEABLE_TYPES.contains(&intent.intent_type) || intent.has_filter_entity() {
            return None;
        }
        let measures = serde_json::to_string(&intent.measures).ok()?;
        let dimensions = serde_json::to_string(&intent.dimensions).ok()?;
        let filters = serde_json::to_string(&intent.filters).ok()?;
        Some(format!(
            "query_{}_{}_{}_{}",
            intent.intent_type, measures, dimensions, filters
        ))
    }

    fn optimizations(intent: &QueryIntent, profile: &DataProfile) -> Vec<Optimization> {
        let mut tags = Vec::new();
        if intent.can_use_cache {
            tags.push(Optimization::Cacheable);
        }
        if !intent.filters.is_empty() {
            tags.push(Optimization::PredicatePushdown);
        }
        if !intent.measures.is_empty() && intent.measures.len() < profile.schema.columns.len() {
            tags.push(Optimization::ColumnPruning);
        }
        if !intent.dimensions.is_empty() {
            tags.push(Optimization::IndexUsage);
        }
        tags
    }

    fn suggest_visualization(intent_type: IntentType) -> VisualizationType {
        match intent_type {
            IntentType::Trend => VisualizationType::Line,
            IntentType::Comparison | IntentType::Ranking => VisualizationType::Bar,
            IntentType::Distribution => VisualizationType::Heatmap,
            IntentType::Relationship => VisualizationType::Scatter,
            _ => VisualizationType::Table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::classifier::IntentClassifier;
    use crate::types::{ColumnInfo, ColumnType, DataSchema, ProfileMetadata};

    fn profile(rows: u64) -> DataProfile {
        DataProfile {
            id: "p1".to_string(),
            file_name: "sales.csv".to_string(),
            schema: DataSchema {
                columns: vec![
                    ColumnInfo::new("sales", ColumnType::Numeric),
                    ColumnInfo::new("region", ColumnType::Text),
                    ColumnInfo::new("order_date", ColumnType::Date),
                ],
            },
            metadata: ProfileMetadata {
                row_count: rows,
                column_count: 3,
            },
            security: None,
        }
    }

    fn classify(query: &str) -> crate::agent::classifier::QueryIntent {
        let classifier = IntentClassifier::new();
        let cols = vec![
            "sales".to_string(),
            "region".to_string(),
            "order_date".to_string(),
        ];
        classifier.classify(query, &cols).intent
    }

    fn assert_dag(plan: &ExecutionPlan) {
        for (index, step) in plan.steps.iter().enumerate() {
            for dep in &step.depends_on {
                let position = plan
                    .steps
                    .iter()
                    .position(|s| &s.id == dep)
                    .expect("dependency must exist");
                assert!(
                    position < index,
                    "step {} depends on {} which is not earlier",
                    step.id,
                    dep
                );
            }
        }
    }

    #[test]
    fn test_plan_steps_form_dag() {
        let planner = QueryPlanner::new();
        let intent = classify("top 3 regions by sum of sales where region = west");
        let plan = planner.plan(&intent, &profile(10_000));
        assert_dag(&plan);
        assert_eq!(plan.steps[0].step_type, StepType::Load);
    }

    #[test]
    fn test_aggregation_plan_shape() {
        let planner = QueryPlanner::new();
        let intent = classify("sum of sales");
        let plan = planner.plan(&intent, &profile(1_000));

        assert!(!plan.fallback_to_llm);
        let kinds: Vec<StepType> = plan.steps.iter().map(|s| s.step_type).collect();
        assert_eq!(kinds, vec![StepType::Load, StepType::Aggregate]);
        assert_dag(&plan);
    }

    #[test]
    fn test_ranking_plan_has_sort_and_limit() {
        let planner = QueryPlanner::new();
        let intent = classify("top 5 regions by sales");
        assert_eq!(intent.intent_type, IntentType::Ranking);
        let plan = planner.plan(&intent, &profile(1_000));

        let kinds: Vec<StepType> = plan.steps.iter().map(|s| s.step_type).collect();
        assert!(kinds.contains(&StepType::Sort));
        assert!(kinds.contains(&StepType::Limit));
        assert_dag(&plan);
    }

    #[test]
    fn test_limited_aggregation_sorts_before_limiting() {
        let planner = QueryPlanner::new();
        // "sum" and "top" tie in the pattern list and aggregation wins the
        // classification, but the extracted limit still forces ordered output
        let intent = classify("top 5 regions by sum of sales");
        assert_eq!(intent.intent_type, IntentType::Aggregation);
        assert_eq!(intent.limit, Some(5));

        let plan = planner.plan(&intent, &profile(1_000));
        let kinds: Vec<StepType> = plan.steps.iter().map(|s| s.step_type).collect();
        let sort_at = kinds.iter().position(|k| *k == StepType::Sort).unwrap();
        let limit_at = kinds.iter().position(|k| *k == StepType::Limit).unwrap();
        assert!(sort_at < limit_at);
        assert_dag(&plan);
    }

    #[test]
    fn test_low_confidence_falls_back_to_llm() {
        let planner = QueryPlanner::new();
        let intent = classify("");
        assert!(intent.confidence < PLANNER_CONFIDENCE_FLOOR);

        let plan = planner.plan(&intent, &profile(1_000));
        assert!(plan.fallback_to_llm);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].step_type, StepType::LlmAnalysis);
        assert_eq!(plan.estimated_time_ms, 5_000);
        assert_eq!(plan.estimated_cost, 8);
        assert!(plan.cache_key.is_none());
    }

    #[test]
    fn test_cache_key_present_iff_eligible() {
        let planner = QueryPlanner::new();

        // Aggregation without filters: eligible
        let agg = classify("sum of sales");
        let plan = planner.plan(&agg, &profile(100));
        assert!(plan.cache_key.is_some());

        // Aggregation with a filter entity: not eligible
        let filtered = classify("sum of sales where region = west");
        let plan = planner.plan(&filtered, &profile(100));
        assert!(plan.cache_key.is_none());

        // Trend: type not in the cacheable set
        let trend = classify("sales trend over time");
        let plan = planner.plan(&trend, &profile(100));
        assert!(plan.cache_key.is_none());
    }

    #[test]
    fn test_cache_key_independent_of_phrasing() {
        let planner = QueryPlanner::new();
        let a = planner.plan(&classify("sum of sales"), &profile(100));
        let b = planner.plan(&classify("total sales please show"), &profile(100));
        // Same semantic shape (aggregation over sales, no dimensions/filters)
        assert_eq!(a.cache_key, b.cache_key);
        assert!(a.cache_key.is_some());
    }

    #[test]
    fn test_row_count_scales_estimated_time() {
        let planner = QueryPlanner::new();
        let intent = classify("sum of sales");
        let small = planner.plan(&intent, &profile(10));
        let large = planner.plan(&intent, &profile(10_000_000));
        assert!(large.estimated_time_ms > small.estimated_time_ms);
    }

    #[test]
    fn test_cost_scaling_with_confidence() {
        let planner = QueryPlanner::new();
        let mut intent = classify("sum of sales");
        intent.confidence = 1.0;
        let confident = planner.plan(&intent, &profile(100));
        // base 3 * 1.0 = 3
        assert_eq!(confident.estimated_cost, 3);

        intent.confidence = 0.7;
        let unsure = planner.plan(&intent, &profile(100));
        // base 3 * 1.15 = 3.45 -> 3
        assert!(unsure.estimated_cost >= confident.estimated_cost);
    }

    #[test]
    fn test_optimization_tags() {
        let planner = QueryPlanner::new();
        let intent = classify("sum of sales by region");
        let plan = planner.plan(&intent, &profile(100));

        assert!(plan.optimizations.contains(&Optimization::Cacheable));
        assert!(plan.optimizations.contains(&Optimization::ColumnPruning));
        assert!(plan.optimizations.contains(&Optimization::IndexUsage));
        assert!(!plan.optimizations.contains(&Optimization::PredicatePushdown));
    }

    #[test]
    fn test_visualization_suggestions() {
        assert_eq!(
            QueryPlanner::suggest_visualization(IntentType::Trend),
            VisualizationType::Line
        );
        assert_eq!(
            QueryPlanner::suggest_visualization(IntentType::Comparison),
            VisualizationType::Bar
        );
        assert_eq!(
            QueryPlanner::suggest_visualization(IntentType::Distribution),
            VisualizationType::Heatmap
        );
        assert_eq!(
            QueryPlanner::suggest_visualization(IntentType::Ranking),
            VisualizationType::Bar
        );
        assert_eq!(
            QueryPlanner::suggest_visualization(IntentType::Relationship),
            VisualizationType::Scatter
        );
        assert_eq!(
            QueryPlanner::suggest_visualization(IntentType::Profile),
            VisualizationType::Table
        );
    }
}
