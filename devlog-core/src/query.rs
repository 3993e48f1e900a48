use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::ai_provider::{AnalysisError, AnalysisRequest, PromptBuilder, TextGenerator};
use crate::directory::Directory;
use crate::error::QueryError;
use crate::filter::filter_log_source;
use crate::report::{QueryReport, ReportOutcome};
use crate::validation::{QueryValidator, RawQuery};

/// Where an invocation currently is. Only `Validating` and `Filtering` can
/// end an invocation with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Filtering,
    EmptyResult,
    Analyzing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Filtering => "filtering",
            Stage::EmptyResult => "empty_result",
            Stage::Analyzing => "analyzing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Runs device log queries end to end. Cheap to clone; every clone shares the
/// directory and the analysis backend.
#[derive(Clone)]
pub struct LogQueryService {
    directory: Arc<Directory>,
    validator: QueryValidator,
    prompts: PromptBuilder,
    generator: Arc<dyn TextGenerator>,
}

impl LogQueryService {
    pub fn new(
        directory: Arc<Directory>,
        validator: QueryValidator,
        prompts: PromptBuilder,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            directory,
            validator,
            prompts,
            generator,
        }
    }

    /// Wires the service to an Ollama backend as described by `config`.
    #[cfg(feature = "ai-providers")]
    pub fn from_config(config: &crate::config::Config) -> anyhow::Result<Self> {
        let client = crate::ai_provider::OllamaClient::new(config.base_url(), config.timeout())?;
        info!(
            base_url = config.base_url(),
            model = config.default_model(),
            timeout_secs = config.timeout().as_secs(),
            "Configured Ollama backend"
        );
        Ok(Self::new(
            Arc::new(config.directory()?),
            config.validator(),
            config.prompt_builder(),
            Arc::new(client),
        ))
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn default_model(&self) -> &str {
        self.validator.default_model()
    }

    pub fn provider_name(&self) -> &str {
        self.generator.provider_name()
    }

    /// Validates, scans and analyses one query. Analysis failures produce a
    /// degraded report rather than an error.
    pub async fn execute(&self, raw: &RawQuery, cancel: &CancellationToken) -> Result<QueryReport, QueryError> {
        let invocation_id = Uuid::new_v4();
        let span = info_span!(
            "query",
            %invocation_id,
            device_id = raw.device_id.as_deref().unwrap_or_default()
        );
        self.run(invocation_id, raw, cancel).instrument(span).await
    }

    async fn run(&self, invocation_id: Uuid, raw: &RawQuery, cancel: &CancellationToken) -> Result<QueryReport, QueryError> {
        let started = Instant::now();

        enter(Stage::Validating);
        let query = self.validator.validate(&self.directory, raw).map_err(|e| {
            warn!("Query rejected: {}", e);
            e
        })?;

        enter(Stage::Filtering);
        let filtered = filter_log_source(query.target.path.clone(), query.predicate.clone(), cancel.clone())
            .await
            .map_err(|error| {
                warn!("Log scan failed: {}", error);
                QueryError::Scan {
                    device_id: query.predicate.device_id().to_string(),
                    error,
                }
            })?;

        if filtered.is_empty() {
            enter(Stage::EmptyResult);
            info!(path = %query.target.path.display(), "No matching lines; skipping analysis");
            let report = QueryReport::new(invocation_id, &query, filtered, ReportOutcome::Empty);
            enter(Stage::Done);
            return Ok(report);
        }

        enter(Stage::Analyzing);
        let prompt = self
            .prompts
            .render(&filtered.text(), Some(&query.predicate.focus_description()));
        let request = AnalysisRequest::new(query.model.as_str(), prompt);
        let outcome = match self.generator.generate(&request, cancel).await {
            Ok(analysis) => ReportOutcome::Analyzed { analysis },
            Err(error) => {
                warn!(kind = error.kind(), "Analysis failed, returning excerpt only: {}", error);
                ReportOutcome::from(error)
            }
        };

        let report = QueryReport::new(invocation_id, &query, filtered, outcome);
        enter(Stage::Done);
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            degraded = report.is_degraded(),
            returned = report.stats.returned,
            "Query finished"
        );
        Ok(report)
    }

    /// Free-form question to the analysis backend, outside any log query.
    pub async fn ask(
        &self,
        question: &str,
        context: Option<&str>,
        model: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, AnalysisError> {
        let model = model.filter(|m| !m.is_empty()).unwrap_or(self.default_model());
        let request = AnalysisRequest::new(model, PromptBuilder::question(question, context));
        debug!(model, "Forwarding question to {}", self.generator.provider_name());
        self.generator.generate(&request, cancel).await
    }
}

fn enter(stage: Stage) {
    debug!(%stage, "stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{EnvironmentRef, LogSourceRef, PathResolver};
    use crate::validation::SingleBoundPolicy;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<AnalysisRequest>>,
    }

    #[async_trait]
    impl TextGenerator for RecordingGenerator {
        async fn generate(&self, request: &AnalysisRequest, _cancel: &CancellationToken) -> Result<String, AnalysisError> {
            self.prompts.lock().unwrap().push(request.clone());
            Ok("analysis text".to_string())
        }

        fn provider_name(&self) -> &str {
            "recording"
        }
    }

    fn service(root: &std::path::Path, generator: Arc<RecordingGenerator>) -> LogQueryService {
        let directory = Directory::new(
            vec![EnvironmentRef {
                name: "dev".into(),
                display_name: "Development".into(),
                host: "localhost".into(),
                user: "local".into(),
                port: 22,
                credential_ref: None,
            }],
            vec![LogSourceRef {
                name: "oms".into(),
                description: "OMS".into(),
                aliases: vec![],
                path_template: "{root}/{env}/{source}.log".into(),
            }],
            PathResolver::new(root),
        )
        .unwrap();
        LogQueryService::new(
            Arc::new(directory),
            QueryValidator::new(2000, "default-model", SingleBoundPolicy::Ignore),
            PromptBuilder::default(),
            generator,
        )
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::EmptyResult.to_string(), "empty_result");
        assert_eq!(Stage::Done.to_string(), "done");
    }

    #[tokio::test]
    async fn test_prompt_carries_excerpt_and_focus() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dev")).unwrap();
        std::fs::write(dir.path().join("dev/oms.log"), "devA boot TIMEOUT\ndevB noise\n").unwrap();
        let generator = Arc::new(RecordingGenerator::default());
        let service = service(dir.path(), generator.clone());

        let raw = RawQuery {
            environment: Some("dev".into()),
            log_type: Some("oms".into()),
            device_id: Some("devA".into()),
            keyword: Some("timeout".into()),
            model: Some("custom:1b".into()),
            ..Default::default()
        };
        let report = service.execute(&raw, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.outcome, ReportOutcome::Analyzed { analysis: "analysis text".into() });

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].model, "custom:1b");
        assert!(prompts[0].prompt.contains("devA boot TIMEOUT"));
        assert!(!prompts[0].prompt.contains("devB noise"));
        assert!(prompts[0].prompt.contains("Pay special attention to: device: devA, keyword: timeout"));
    }

    #[tokio::test]
    async fn test_ask_uses_default_model_and_context() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(RecordingGenerator::default());
        let service = service(dir.path(), generator.clone());

        let answer = service
            .ask("why did it reboot?", Some("devA, firmware 2.1"), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(answer, "analysis text");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts[0].model, "default-model");
        assert_eq!(prompts[0].prompt, "Context:\ndevA, firmware 2.1\n\nQuestion: why did it reboot?");
    }
}
