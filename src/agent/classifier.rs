//! Rule-based intent classifier for natural-language data questions
//!
//! A pure function over the query text and the known column names: no state,
//! no I/O. Patterns are evaluated in order; every match is kept and the ranked
//! list is exposed so alternates stay inspectable, but the top match drives
//! entity extraction.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Confidence below which a query always requires the LLM path
pub const LLM_CONFIDENCE_FLOOR: f64 = 0.6;

/// Column-name words that mark a column as a measure during the literal sweep
const MEASURE_LEXICON: &[&str] = &[
    "sales", "revenue", "amount", "price", "cost", "count", "total", "quantity", "profit",
    "income", "salary", "value", "score", "units", "spend",
];

/// Classified purpose of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Aggregation,
    Relationship,
    Trend,
    Ranking,
    Distribution,
    Filter,
    Comparison,
    Profile,
    Unknown,
}

impl std::fmt::Display for IntentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Aggregation => "aggregation",
            Self::Relationship => "relationship",
            Self::Trend => "trend",
            Self::Ranking => "ranking",
            Self::Distribution => "distribution",
            Self::Filter => "filter",
            Self::Comparison => "comparison",
            Self::Profile => "profile",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Base execution cost per intent type, on the 1-10 scale shared with the
/// planner's cost model.
pub(crate) fn base_cost(intent_type: IntentType) -> u8 {
    match intent_type {
        IntentType::Profile | IntentType::Filter => 2,
        IntentType::Aggregation | IntentType::Ranking => 3,
        IntentType::Comparison | IntentType::Distribution => 4,
        IntentType::Trend => 5,
        IntentType::Relationship => 6,
        IntentType::Unknown => 8,
    }
}

/// Kind of token extracted from a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Measure,
    Dimension,
    Filter,
    Time,
    Limit,
}

/// A token extracted from the query, optionally resolved to a known column
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryEntity {
    pub entity_type: EntityType,
    /// Raw extracted token (or "col op value" for filters)
    pub value: String,
    /// Resolved column name, when the token matched one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub confidence: f64,
}

/// Fully classified intent, consumed by the query planner
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryIntent {
    pub intent_type: IntentType,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
    pub entities: Vec<QueryEntity>,
    pub measures: Vec<String>,
    pub dimensions: Vec<String>,
    pub filters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub requires_llm: bool,
    pub can_use_cache: bool,
    /// Estimated execution cost in [1, 10]
    pub estimated_cost: u8,
}

impl QueryIntent {
    pub(crate) fn has_filter_entity(&self) -> bool {
        self.entities
            .iter()
            .any(|e| e.entity_type == EntityType::Filter)
    }
}

/// One entry of the ranked match list
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RankedIntent {
    pub intent_type: IntentType,
    pub confidence: f64,
}

/// Classification result: the winning intent plus all ranked alternatives
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Classification {
    pub intent: QueryIntent,
    /// All pattern matches sorted by confidence descending; list order breaks
    /// ties, so more specific patterns win over the profile catch-all.
    pub ranked: Vec<RankedIntent>,
}

struct IntentPattern {
    intent_type: IntentType,
    regex: Regex,
    base_confidence: f64,
    #[allow(dead_code)]
    examples: &'static [&'static str],
}

/// Classifier over an ordered pattern list.
///
/// Order matters: specific intents (aggregation, relationship, trend, ranking,
/// distribution, filter, comparison) are listed before the broad profile
/// catch-all, because the stable sort keeps list order for equal confidences.
pub struct IntentClassifier {
    patterns: Vec<IntentPattern>,
    measure_re: Regex,
    dimension_re: Regex,
    time_re: Regex,
    limit_re: Regex,
    filter_re: Regex,
    only_re: Regex,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    pub fn new() -> Self {
        let pattern = |intent_type, re: &str, base_confidence, examples| IntentPattern {
            intent_type,
            regex: Regex::new(re).expect("intent pattern regex"),
            base_confidence,
            examples,
        };

        Self {
            patterns: vec![
                pattern(
                    IntentType::Aggregation,
                    r"\b(sum|total|average|avg|mean|median|count|minimum|maximum|min|max)\b",
                    0.85,
                    &["sum of sales", "average price by region"],
                ),
                pattern(
                    IntentType::Relationship,
                    r"\b(correlat\w*|relationship|related|depends?|versus|vs|against|impact)\b",
                    0.8,
                    &["correlation between price and sales", "sales versus cost"],
                ),
                pattern(
                    IntentType::Trend,
                    r"\b(trends?|over time|time series|growth|evolution|monthly|weekly|daily|yearly)\b",
                    0.85,
                    &["sales trend over time", "monthly revenue growth"],
                ),
                pattern(
                    IntentType::Ranking,
                    r"\b(top|bottom|highest|lowest|best|worst|rank\w*|largest|smallest)\b",
                    0.85,
                    &["top 10 products", "lowest revenue regions"],
                ),
                pattern(
                    IntentType::Distribution,
                    r"\b(distribut\w*|histogram|spread|frequency|outliers?)\b",
                    0.8,
                    &["distribution of prices", "outliers in salary"],
                ),
                pattern(
                    IntentType::Filter,
                    r"\b(where|only|filter|exclude|include|between|greater than|less than)\b",
                    0.75,
                    &["only rows where region = west"],
                ),
                pattern(
                    IntentType::Comparison,
                    r"\b(compare|comparison|differences?|across)\b",
                    0.75,
                    &["compare sales across regions"],
                ),
                // Broad catch-all; must stay last
                pattern(
                    IntentType::Profile,
                    r"\b(describe|summar\w*|overview|profile|about|what|show|tell|data|dataset|columns?)\b",
                    0.7,
                    &["describe the dataset", "what is in this data"],
                ),
            ],
            measure_re: Regex::new(
                r"\b(?:sum|total|average|avg|mean|median|count|minimum|maximum|min|max)\s+(?:of\s+|the\s+)?([a-z_][a-z0-9_]*)",
            )
            .expect("measure extractor regex"),
            dimension_re: Regex::new(
                r"\b(?:by|per|for each|across|grouped by)\s+([a-z_][a-z0-9_]*)",
            )
            .expect("dimension extractor regex"),
            time_re: Regex::new(r"\b(?:over|by|per)\s+(time|date|month|year|week|day|quarter)\b")
                .expect("time extractor regex"),
            limit_re: Regex::new(r"\b(?:top|bottom|first|last|limit)\s+(\d+)\b")
                .expect("limit extractor regex"),
            filter_re: Regex::new(
                r"\bwhere\s+([a-z_][a-z0-9_]*)\s*(?:==|=|is|equals|above|below|over|under|greater than|less than|>|<)\s*([a-z0-9_.]+)",
            )
            .expect("filter extractor regex"),
            only_re: Regex::new(r"\b(?:only|just)\s+(?:for\s+|in\s+)?([a-z_][a-z0-9_]*)")
                .expect("only-filter extractor regex"),
        }
    }

    /// Classify a query against the known column names.
    ///
    /// Pure and deterministic: the same query and column list always yield the
    /// same classification.
    pub fn classify(&self, query: &str, columns: &[String]) -> Classification {
        let normalized = query.trim().to_lowercase();
        if normalized.is_empty() {
            return Self::unknown_classification();
        }

        let mut ranked: Vec<RankedIntent> = self
            .patterns
            .iter()
            .filter(|p| p.regex.is_match(&normalized))
            .map(|p| RankedIntent {
                intent_type: p.intent_type,
                confidence: p.base_confidence,
            })
            .collect();
        // Stable sort: equal confidences keep pattern-list order
        ranked.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let Some(top) = ranked.first().cloned() else {
            return Self::unknown_classification();
        };

        let mut entities = self.extract_entities(&normalized, top.intent_type, columns);
        self.sweep_columns(&normalized, columns, &mut entities);

        // An entity resolved against a real column is corroborating evidence
        let mut confidence = top.confidence;
        if entities.iter().any(|e| e.column.is_some()) {
            confidence = (confidence + 0.05).min(0.95);
        }

        let intent = Self::build_intent(top.intent_type, confidence, entities);
        Classification { intent, ranked }
    }

    fn unknown_classification() -> Classification {
        Classification {
            intent: Self::build_intent(IntentType::Unknown, 0.3, Vec::new()),
            ranked: vec![RankedIntent {
                intent_type: IntentType::Unknown,
                confidence: 0.3,
            }],
        }
    }

    fn build_intent(
        intent_type: IntentType,
        confidence: f64,
        entities: Vec<QueryEntity>,
    ) -> QueryIntent {
        let pick = |kind: EntityType| -> Vec<String> {
            entities
                .iter()
                .filter(|e| e.entity_type == kind)
                .map(|e| e.column.clone().unwrap_or_else(|| e.value.clone()))
                .collect()
        };

        let measures = pick(EntityType::Measure);
        let dimensions = pick(EntityType::Dimension);
        let filters: Vec<String> = entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Filter)
            .map(|e| e.value.clone())
            .collect();
        let time_column = entities
            .iter()
            .find(|e| e.entity_type == EntityType::Time)
            .map(|e| e.column.clone().unwrap_or_else(|| e.value.clone()));
        let limit = entities
            .iter()
            .find(|e| e.entity_type == EntityType::Limit)
            .and_then(|e| e.value.parse::<usize>().ok());

        let mut intent = QueryIntent {
            intent_type,
            confidence,
            entities,
            measures,
            dimensions,
            filters,
            time_column,
            limit,
            requires_llm: false,
            can_use_cache: false,
            estimated_cost: 0,
        };

        intent.requires_llm = matches!(
            intent_type,
            IntentType::Unknown | IntentType::Relationship
        ) || confidence < LLM_CONFIDENCE_FLOOR;
        intent.can_use_cache =
            intent_type == IntentType::Profile || !intent.has_filter_entity();
        intent.estimated_cost = Self::estimated_cost(intent_type, intent.entities.len());
        intent
    }

    fn estimated_cost(intent_type: IntentType, entity_count: usize) -> u8 {
        let mut cost = base_cost(intent_type);
        if entity_count > 3 {
            cost += 2;
        }
        if entity_count > 6 {
            cost += 3;
        }
        cost.clamp(1, 10)
    }

    /// Re-scan the query with the winning intent's extractors
    fn extract_entities(
        &self,
        query: &str,
        intent_type: IntentType,
        columns: &[String],
    ) -> Vec<QueryEntity> {
        let mut entities = Vec::new();
        if intent_type == IntentType::Unknown {
            return entities;
        }

        for cap in self.measure_re.captures_iter(query) {
            let token = cap[1].to_string();
            let (column, confidence) = Self::resolve_column(&token, columns, None);
            entities.push(QueryEntity {
                entity_type: EntityType::Measure,
                value: token,
                column,
                confidence,
            });
        }

        for cap in self.dimension_re.captures_iter(query) {
            let token = cap[1].to_string();
            // "by month" style tokens belong to the time extractor
            if self.time_re.is_match(&format!("by {}", token)) {
                continue;
            }
            let (column, confidence) = Self::resolve_column(&token, columns, None);
            entities.push(QueryEntity {
                entity_type: EntityType::Dimension,
                value: token,
                column,
                confidence,
            });
        }

        if let Some(cap) = self.time_re.captures(query) {
            let token = cap[1].to_string();
            let (column, confidence) =
                Self::resolve_column(&token, columns, Some(&["date", "time"]));
            entities.push(QueryEntity {
                entity_type: EntityType::Time,
                value: token,
                column,
                confidence,
            });
        }

        if let Some(cap) = self.limit_re.captures(query) {
            entities.push(QueryEntity {
                entity_type: EntityType::Limit,
                value: cap[1].to_string(),
                column: None,
                confidence: 0.9,
            });
        }

        for cap in self.filter_re.captures_iter(query) {
            let column_token = cap[1].to_string();
            let value_token = cap[2].to_string();
            let (column, confidence) = Self::resolve_column(&column_token, columns, None);
            entities.push(QueryEntity {
                entity_type: EntityType::Filter,
                value: format!("{} = {}", column_token, value_token),
                column,
                confidence,
            });
        }
        if intent_type == IntentType::Filter {
            for cap in self.only_re.captures_iter(query) {
                let token = cap[1].to_string();
                if entities
                    .iter()
                    .any(|e| e.entity_type == EntityType::Filter && e.value.starts_with(&token))
                {
                    continue;
                }
                let (column, confidence) = Self::resolve_column(&token, columns, None);
                entities.push(QueryEntity {
                    entity_type: EntityType::Filter,
                    value: token,
                    column,
                    confidence,
                });
            }
        }

        entities
    }

    /// Resolve an extracted token against the known columns: exact
    /// case-insensitive match first, then substring, optionally biased toward
    /// a preferred-type hint. Unresolved tokens stay at low confidence.
    fn resolve_column(
        token: &str,
        columns: &[String],
        hint: Option<&[&str]>,
    ) -> (Option<String>, f64) {
        let token_lower = token.to_lowercase();

        if let Some(col) = columns.iter().find(|c| c.to_lowercase() == token_lower) {
            return (Some(col.clone()), 0.9);
        }

        let substrings: Vec<&String> = columns
            .iter()
            .filter(|c| {
                let col_lower = c.to_lowercase();
                col_lower.contains(&token_lower) || token_lower.contains(&col_lower)
            })
            .collect();

        if let Some(hints) = hint {
            if let Some(col) = substrings
                .iter()
                .find(|c| hints.iter().any(|h| c.to_lowercase().contains(h)))
            {
                return (Some((*col).clone()), 0.75);
            }
            // No token overlap; fall back to any column of the hinted type
            if let Some(col) = columns
                .iter()
                .find(|c| hints.iter().any(|h| c.to_lowercase().contains(h)))
            {
                return (Some(col.clone()), 0.7);
            }
        }

        if let Some(col) = substrings.first() {
            return (Some((*col).clone()), 0.75);
        }

        (None, 0.5)
    }

    /// Add any column literally present in the query as a measure or
    /// dimension entity, deduplicated against entities already found.
    fn sweep_columns(&self, query: &str, columns: &[String], entities: &mut Vec<QueryEntity>) {
        for col in columns {
            let col_lower = col.to_lowercase();
            if !query.contains(&col_lower) {
                continue;
            }
            let already_known = entities.iter().any(|e| {
                e.column.as_deref() == Some(col.as_str()) || e.value == col_lower
            });
            if already_known {
                continue;
            }
            let is_measure = MEASURE_LEXICON.iter().any(|w| col_lower.contains(w));
            entities.push(QueryEntity {
                entity_type: if is_measure {
                    EntityType::Measure
                } else {
                    EntityType::Dimension
                },
                value: col_lower,
                column: Some(col.clone()),
                confidence: 0.8,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sum_of_sales_scenario() {
        let classifier = IntentClassifier::new();
        let cols = columns(&["sales", "region"]);
        let result = classifier.classify("Sum of sales", &cols);

        let intent = &result.intent;
        assert_eq!(intent.intent_type, IntentType::Aggregation);
        assert_eq!(intent.measures, vec!["sales".to_string()]);
        assert!(intent.confidence > 0.8);
        assert!(!intent.requires_llm);
        assert_eq!(intent.estimated_cost, 3);
    }

    #[test]
    fn test_empty_query_is_unknown() {
        let classifier = IntentClassifier::new();
        let result = classifier.classify("", &[]);
        assert_eq!(result.intent.intent_type, IntentType::Unknown);
        assert!(result.intent.confidence < 0.5);
        assert!(result.intent.requires_llm);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let classifier = IntentClassifier::new();
        let cols = columns(&["sales", "region", "order_date"]);
        let query = "top 5 regions by sales";

        let first = classifier.classify(query, &cols);
        let second = classifier.classify(query, &cols);
        assert_eq!(
            serde_json::to_value(&first.intent).unwrap(),
            serde_json::to_value(&second.intent).unwrap()
        );
    }

    #[test]
    fn test_requires_llm_invariants() {
        let classifier = IntentClassifier::new();
        let cols = columns(&["price", "sales"]);

        // Relationship always requires the LLM regardless of confidence
        let rel = classifier.classify("correlation between price and sales", &cols);
        assert_eq!(rel.intent.intent_type, IntentType::Relationship);
        assert!(rel.intent.requires_llm);

        // Unknown always requires the LLM
        let unknown = classifier.classify("zzz qqq", &[]);
        assert_eq!(unknown.intent.intent_type, IntentType::Unknown);
        assert!(unknown.intent.requires_llm);
        assert!(unknown.intent.confidence < LLM_CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_specific_pattern_beats_catch_all_on_order() {
        let classifier = IntentClassifier::new();
        let cols = columns(&["sales"]);
        // Matches both distribution (0.8) and the profile catch-all (0.7)
        let result = classifier.classify("show the distribution of sales", &cols);
        assert_eq!(result.intent.intent_type, IntentType::Distribution);
        // The profile match stays inspectable in the ranked list
        assert!(result
            .ranked
            .iter()
            .any(|r| r.intent_type == IntentType::Profile));
    }

    #[test]
    fn test_ranked_list_sorted_descending() {
        let classifier = IntentClassifier::new();
        let result =
            classifier.classify("show top 10 total sales by region", &columns(&["sales"]));
        let confidences: Vec<f64> = result.ranked.iter().map(|r| r.confidence).collect();
        let mut sorted = confidences.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(confidences, sorted);
    }

    #[test]
    fn test_limit_extraction() {
        let classifier = IntentClassifier::new();
        let result =
            classifier.classify("top 5 products by revenue", &columns(&["revenue", "product"]));
        assert_eq!(result.intent.intent_type, IntentType::Ranking);
        assert_eq!(result.intent.limit, Some(5));
    }

    #[test]
    fn test_filter_entity_disables_cache() {
        let classifier = IntentClassifier::new();
        let cols = columns(&["sales", "region"]);
        let result = classifier.classify("sum of sales where region = west", &cols);
        assert_eq!(result.intent.intent_type, IntentType::Aggregation);
        assert!(!result.intent.filters.is_empty());
        assert!(!result.intent.can_use_cache);
    }

    #[test]
    fn test_profile_always_cacheable() {
        let classifier = IntentClassifier::new();
        let result = classifier.classify("describe the dataset", &[]);
        assert_eq!(result.intent.intent_type, IntentType::Profile);
        assert!(result.intent.can_use_cache);
    }

    #[test]
    fn test_column_sweep_adds_literal_mentions() {
        let classifier = IntentClassifier::new();
        let cols = columns(&["revenue", "region"]);
        let result = classifier.classify("compare revenue across region", &cols);
        assert_eq!(result.intent.intent_type, IntentType::Comparison);
        // revenue is measure-ish, region is a dimension
        assert!(result.intent.measures.contains(&"revenue".to_string()));
        assert!(result.intent.dimensions.contains(&"region".to_string()));
    }

    #[test]
    fn test_unresolved_token_kept_at_low_confidence() {
        let classifier = IntentClassifier::new();
        let result = classifier.classify("average of widgets", &columns(&["sales"]));
        let entity = result
            .intent
            .entities
            .iter()
            .find(|e| e.value == "widgets")
            .expect("unresolved token still becomes an entity");
        assert!(entity.column.is_none());
        assert!(entity.confidence <= 0.6);
    }

    #[test]
    fn test_time_hint_resolution() {
        let classifier = IntentClassifier::new();
        let cols = columns(&["sales", "order_date"]);
        let result = classifier.classify("sales trend over time", &cols);
        assert_eq!(result.intent.intent_type, IntentType::Trend);
        assert_eq!(result.intent.time_column, Some("order_date".to_string()));
    }

    #[test]
    fn test_entity_count_cost_surcharge() {
        // 4 entities crosses the first surcharge threshold
        assert_eq!(
            IntentClassifier::estimated_cost(IntentType::Aggregation, 4),
            5
        );
        // 7 entities crosses both, capped at 10
        assert_eq!(
            IntentClassifier::estimated_cost(IntentType::Relationship, 7),
            10
        );
        assert_eq!(IntentClassifier::estimated_cost(IntentType::Profile, 1), 2);
    }
}
