//! Shared domain types exchanged between the orchestrator, its agents, and the
//! external collaborators (profiling, security, semantic execution, charting).

use serde::{Deserialize, Serialize};

/// Inferred type of a CSV column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Text,
    Date,
    Boolean,
}

/// A single column in the profiled schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name as it appears in the CSV header
    pub name: String,
    /// Inferred data type
    pub data_type: ColumnType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Profiled schema of an uploaded dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSchema {
    pub columns: Vec<ColumnInfo>,
}

impl DataSchema {
    /// Column names in schema order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Dataset-level statistics produced by the profiling collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub row_count: u64,
    pub column_count: usize,
}

/// Risk classification from the security collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Security assessment merged into a profile after upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityProfile {
    /// Columns flagged as containing PII
    pub pii_columns: Vec<String>,
    pub risk_level: RiskLevel,
    /// Whether redaction was applied by the security collaborator
    pub redaction_applied: bool,
}

impl Default for SecurityProfile {
    fn default() -> Self {
        Self {
            pii_columns: Vec::new(),
            risk_level: RiskLevel::Low,
            redaction_applied: false,
        }
    }
}

/// Explicit patch for merging a security assessment into a profile.
///
/// Only the fields listed here may be overridden; absent fields leave the
/// existing value in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pii_columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redaction_applied: Option<bool>,
}

impl SecurityPatch {
    /// Apply this patch on top of an existing security profile
    pub fn apply(&self, target: &mut SecurityProfile) {
        if let Some(pii) = &self.pii_columns {
            target.pii_columns = pii.clone();
        }
        if let Some(level) = self.risk_level {
            target.risk_level = level;
        }
        if let Some(redacted) = self.redaction_applied {
            target.redaction_applied = redacted;
        }
    }
}

/// Full profile of an uploaded dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataProfile {
    /// Unique profile identifier
    pub id: String,
    /// Original file name
    pub file_name: String,
    pub schema: DataSchema,
    pub metadata: ProfileMetadata,
    /// Present once the security agent has run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityProfile>,
}

impl DataProfile {
    /// Merge a security patch into this profile, creating the security
    /// section if it does not exist yet.
    pub fn apply_security(&mut self, patch: &SecurityPatch) {
        let security = self.security.get_or_insert_with(SecurityProfile::default);
        patch.apply(security);
    }
}

/// An uploaded blob as received from the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lowercased file extension, if any
    pub fn extension(&self) -> Option<String> {
        self.name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
    }
}

/// Output of the chart collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartOutput {
    /// Output format, e.g. "svg"
    pub format: String,
    /// Rendered payload
    pub payload: String,
}

/// Which execution path produced an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    SemanticOnly,
    LlmOnly,
    Hybrid,
}

impl std::fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SemanticOnly => write!(f, "semantic_only"),
            Self::LlmOnly => write!(f, "llm_only"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Final answer returned to the orchestrator's caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Natural-language response text
    pub response: String,
    /// Tabular rows backing the response (semantic path)
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    /// Derived insights (semantic path)
    #[serde(default)]
    pub insights: Vec<String>,
    /// Rendered chart, when one was requested and rendering succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartOutput>,
    /// Strategy that produced this answer
    pub strategy: RoutingStrategy,
    /// Follow-up question suggestions (at most 3)
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl AnalysisResult {
    /// Plain LLM text answer with no structured backing data
    pub fn llm_text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            data: Vec::new(),
            insights: Vec::new(),
            chart: None,
            strategy: RoutingStrategy::LlmOnly,
            suggestions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> DataProfile {
        DataProfile {
            id: "p1".to_string(),
            file_name: "sales.csv".to_string(),
            schema: DataSchema {
                columns: vec![
                    ColumnInfo::new("sales", ColumnType::Numeric),
                    ColumnInfo::new("region", ColumnType::Text),
                ],
            },
            metadata: ProfileMetadata {
                row_count: 1000,
                column_count: 2,
            },
            security: None,
        }
    }

    #[test]
    fn test_security_patch_overrides_only_listed_fields() {
        let mut profile = sample_profile();
        profile.security = Some(SecurityProfile {
            pii_columns: vec!["email".to_string()],
            risk_level: RiskLevel::Medium,
            redaction_applied: true,
        });

        let patch = SecurityPatch {
            pii_columns: None,
            risk_level: Some(RiskLevel::High),
            redaction_applied: None,
        };
        profile.apply_security(&patch);

        let security = profile.security.unwrap();
        assert_eq!(security.risk_level, RiskLevel::High);
        // Unlisted fields keep their previous values
        assert_eq!(security.pii_columns, vec!["email".to_string()]);
        assert!(security.redaction_applied);
    }

    #[test]
    fn test_security_patch_creates_section() {
        let mut profile = sample_profile();
        assert!(profile.security.is_none());

        let patch = SecurityPatch {
            pii_columns: Some(vec!["name".to_string()]),
            risk_level: Some(RiskLevel::Medium),
            redaction_applied: Some(false),
        };
        profile.apply_security(&patch);

        let security = profile.security.unwrap();
        assert_eq!(security.pii_columns, vec!["name".to_string()]);
        assert_eq!(security.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_uploaded_file_extension() {
        let file = UploadedFile::new("Data.CSV", "text/csv", vec![1, 2, 3]);
        assert_eq!(file.extension(), Some("csv".to_string()));
        assert_eq!(file.size(), 3);

        let no_ext = UploadedFile::new("data", "text/csv", vec![]);
        assert_eq!(no_ext.extension(), None);
    }

    #[test]
    fn test_analysis_result_roundtrip() {
        let result = AnalysisResult::llm_text("hello");
        let json = serde_json::to_string(&result).unwrap();
        let parsed: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.response, "hello");
        assert_eq!(parsed.strategy, RoutingStrategy::LlmOnly);
    }
}
