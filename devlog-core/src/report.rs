use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::ai_provider::AnalysisError;
use crate::filter::FilterOutcome;
use crate::validation::ValidatedQuery;

#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub invocation_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub environment: String,
    pub environment_display_name: String,
    pub log_source: String,
    pub log_source_description: String,
    pub path: PathBuf,
    pub device_id: String,
    pub keyword: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub limit: usize,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportStats {
    pub lines_scanned: usize,
    pub total_matches: usize,
    pub returned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportOutcome {
    /// Nothing matched; the analysis service was not contacted.
    Empty,
    Analyzed { analysis: String },
    /// Lines were found but the analysis call failed.
    Degraded { failure_kind: String, cause: String },
}

impl From<AnalysisError> for ReportOutcome {
    fn from(error: AnalysisError) -> Self {
        ReportOutcome::Degraded {
            failure_kind: error.kind().to_string(),
            cause: error.to_string(),
        }
    }
}

/// The result of one successful query invocation, in every outcome.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub metadata: ReportMetadata,
    pub stats: ReportStats,
    pub excerpt: Vec<String>,
    pub outcome: ReportOutcome,
}

impl QueryReport {
    pub fn new(invocation_id: Uuid, query: &ValidatedQuery, filtered: FilterOutcome, outcome: ReportOutcome) -> Self {
        let predicate = &query.predicate;
        let window = predicate.time_window();
        let metadata = ReportMetadata {
            invocation_id,
            generated_at: Utc::now(),
            environment: query.target.environment.name.clone(),
            environment_display_name: query.target.environment.display_name.clone(),
            log_source: query.target.source.name.clone(),
            log_source_description: query.target.source.description.clone(),
            path: query.target.path.clone(),
            device_id: predicate.device_id().to_string(),
            keyword: predicate.keyword().map(str::to_string),
            start_time: window.map(|w| w.start().to_string()),
            end_time: window.map(|w| w.end().to_string()),
            limit: predicate.limit(),
            model: query.model.clone(),
        };
        let stats = ReportStats {
            lines_scanned: filtered.lines_scanned,
            total_matches: filtered.total_matches,
            returned: filtered.lines.len(),
        };

        Self {
            metadata,
            stats,
            excerpt: filtered.lines,
            outcome,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.outcome, ReportOutcome::Empty)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, ReportOutcome::Degraded { .. })
    }

    /// One-line description of the scan that was performed.
    pub fn operation_description(&self) -> String {
        let m = &self.metadata;
        let mut description = format!("read {}, filter device ID '{}'", m.path.display(), m.device_id);
        if let Some(keyword) = &m.keyword {
            description.push_str(&format!(", keyword '{}'", keyword));
        }
        if let (Some(start), Some(end)) = (&m.start_time, &m.end_time) {
            description.push_str(&format!(", time range {} to {}", start, end));
        }
        description.push_str(&format!(", keep the last {} matching lines", m.limit));
        description
    }

    fn range_description(&self) -> String {
        match (&self.metadata.start_time, &self.metadata.end_time) {
            (Some(start), Some(end)) => format!("{} to {}", start, end),
            _ => format!("last {} lines", self.metadata.limit),
        }
    }

    fn stats_line(&self) -> String {
        format!(
            "showing last {} of {} matching lines ({} lines scanned)",
            self.stats.returned, self.stats.total_matches, self.stats.lines_scanned
        )
    }

    fn write_query(&self, out: &mut String, include_model: bool) {
        let m = &self.metadata;
        out.push_str("**Query**:\n");
        out.push_str(&format!("- Environment: {} ({})\n", m.environment_display_name, m.environment));
        out.push_str(&format!("- Log file: {} ({})\n", m.path.display(), m.log_source_description));
        out.push_str(&format!("- Device ID: {}\n", m.device_id));
        out.push_str(&format!("- Range: {}\n", self.range_description()));
        if let Some(keyword) = &m.keyword {
            out.push_str(&format!("- Keyword: {}\n", keyword));
        }
        if include_model {
            out.push_str(&format!("- AI model: {}\n", m.model));
        }
        out.push('\n');
        out.push_str(&format!("**Operation**: {}\n", self.operation_description()));
    }

    fn write_excerpt(&self, out: &mut String) {
        let text = self.excerpt.join("\n");
        let fence = fence_for(&text);
        out.push_str(&format!("**Log excerpt** ({}):\n\n", self.stats_line()));
        out.push_str(&fence);
        out.push('\n');
        out.push_str(&text);
        out.push('\n');
        out.push_str(&fence);
        out.push('\n');
    }

    /// Markdown rendering returned to MCP callers and printed by the CLI.
    pub fn render(&self) -> String {
        let mut out = String::new();
        match &self.outcome {
            ReportOutcome::Empty => {
                out.push_str("⚠️ **No matching log lines**\n\n");
                self.write_query(&mut out, false);
                out.push_str(&format!(
                    "**Scanned**: {} lines, 0 matches\n\n",
                    self.stats.lines_scanned
                ));
                out.push_str(
                    "**Possible causes**:\n\
                     - The device has no log entries under these conditions\n\
                     - The device ID or keyword is misspelled\n\
                     - The time range does not overlap the log contents\n\
                     - The log source points at the wrong file\n",
                );
            }
            ReportOutcome::Analyzed { analysis } => {
                out.push_str("🔍 **Device log analysis report**\n\n");
                self.write_query(&mut out, true);
                out.push_str(&format!("**Matches**: {}\n\n---\n\n", self.stats_line()));
                out.push_str(analysis.trim_end());
                out.push_str("\n\n---\n\n");
                self.write_excerpt(&mut out);
            }
            ReportOutcome::Degraded { failure_kind, cause } => {
                out.push_str("🔧 **Device log query result** (AI analysis failed)\n\n");
                self.write_query(&mut out, true);
                out.push_str(&format!("\n❌ **AI analysis error** ({}): {}\n\n", failure_kind, cause));
                out.push_str(
                    "**Suggestion**: review the excerpt below manually, or check that the AI service is running and the model is available\n\n",
                );
                self.write_excerpt(&mut out);
            }
        }
        out.push_str(&format!(
            "\n_Generated {} · invocation {}_\n",
            self.metadata.generated_at.to_rfc3339(),
            self.metadata.invocation_id
        ));
        out
    }
}

impl fmt::Display for QueryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// A code fence longer than any backtick run inside `text`.
fn fence_for(text: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in text.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat(longest.max(2) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{EnvironmentRef, LogSourceRef, ResolvedSource};
    use crate::validation::{QueryPredicate, TimeWindow};

    fn query(keyword: Option<&str>, window: Option<TimeWindow>) -> ValidatedQuery {
        ValidatedQuery {
            target: ResolvedSource {
                environment: EnvironmentRef {
                    name: "dev".into(),
                    display_name: "Development".into(),
                    host: "localhost".into(),
                    user: "local".into(),
                    port: 22,
                    credential_ref: Some("secret-key".into()),
                },
                source: LogSourceRef {
                    name: "oms".into(),
                    description: "OMS system log".into(),
                    aliases: vec![],
                    path_template: "{root}/{env}/{source}.log".into(),
                },
                path: PathBuf::from("/logs/dev/oms.log"),
            },
            predicate: QueryPredicate::new("devA", keyword, window, 10).unwrap(),
            model: "gemma3:27b".into(),
        }
    }

    fn outcome(lines: &[&str], total: usize) -> FilterOutcome {
        FilterOutcome {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            total_matches: total,
            lines_scanned: 100,
        }
    }

    #[test]
    fn test_operation_description() {
        let window = TimeWindow::new("2025-07-24 11:59:38.369", "2025-07-24 11:59:59.999").unwrap();
        let report = QueryReport::new(Uuid::new_v4(), &query(Some("timeout"), Some(window)), outcome(&[], 0), ReportOutcome::Empty);
        assert_eq!(
            report.operation_description(),
            "read /logs/dev/oms.log, filter device ID 'devA', keyword 'timeout', \
             time range 2025-07-24 11:59:38.369 to 2025-07-24 11:59:59.999, keep the last 10 matching lines"
        );
    }

    #[test]
    fn test_empty_report_lists_causes() {
        let report = QueryReport::new(Uuid::new_v4(), &query(None, None), outcome(&[], 0), ReportOutcome::Empty);
        let text = report.render();
        assert!(report.is_empty());
        assert!(text.contains("No matching log lines"));
        assert!(text.contains("Device ID: devA"));
        assert!(text.contains("last 10 lines"));
        assert!(text.contains("Possible causes"));
        assert!(!text.contains("secret-key"));
    }

    #[test]
    fn test_full_report_contains_analysis_and_excerpt() {
        let report = QueryReport::new(
            Uuid::new_v4(),
            &query(None, None),
            outcome(&["2025-07-24 12:00:00.000 devA world"], 12),
            ReportOutcome::Analyzed {
                analysis: "## Summary\nAll good".into(),
            },
        );
        let text = report.render();
        assert!(text.contains("Device log analysis report"));
        assert!(text.contains("## Summary\nAll good"));
        assert!(text.contains("2025-07-24 12:00:00.000 devA world"));
        assert!(text.contains("showing last 1 of 12 matching lines"));
        assert!(text.contains("AI model: gemma3:27b"));
    }

    #[test]
    fn test_degraded_report_names_failure() {
        let error = AnalysisError::TransportFailure {
            message: "operation timed out".into(),
            timed_out: true,
        };
        let report = QueryReport::new(Uuid::new_v4(), &query(None, None), outcome(&["devA hello"], 1), error.into());
        let text = report.render();
        assert!(report.is_degraded());
        assert!(text.contains("AI analysis failed"));
        assert!(text.contains("TransportFailure"));
        assert!(text.contains("request timed out"));
        assert!(text.contains("devA hello"));
    }

    #[test]
    fn test_json_shape() {
        let report = QueryReport::new(Uuid::new_v4(), &query(None, None), outcome(&[], 0), ReportOutcome::Empty);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"]["status"], "empty");
        assert_eq!(value["metadata"]["device_id"], "devA");
        assert_eq!(value["stats"]["returned"], 0);
    }

    #[test]
    fn test_fence_outgrows_backticks_in_logs() {
        assert_eq!(fence_for("plain"), "```");
        assert_eq!(fence_for("payload ```json```"), "````");
    }
}
