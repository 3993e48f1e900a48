// Devlog core - device log filtering and AI analysis
//
// Shared by the MCP server and the terminal binary: configuration, the
// environment/log-source directory, query validation, the streaming filter
// and the analysis pipeline that turns matches into a report.

pub mod ai_provider;
pub mod config;
pub mod directory;
pub mod error;
pub mod filter;
pub mod query;
pub mod report;
pub mod validation;

#[cfg(feature = "ai-providers")]
pub use ai_provider::OllamaClient;
pub use ai_provider::{AnalysisError, AnalysisRequest, PromptBuilder, TextGenerator};
pub use config::Config;
pub use directory::{Directory, DirectoryError, EnvironmentRef, LogSourceRef, PathResolver, ResolvedSource};
pub use error::{QueryError, ScanError, SourceResolutionError, ValidationError};
pub use filter::{filter_file, filter_log_source, FilterOutcome};
pub use query::{LogQueryService, Stage};
pub use report::{QueryReport, ReportOutcome};
pub use validation::{QueryPredicate, QueryValidator, RawQuery, SingleBoundPolicy, TimeWindow};
