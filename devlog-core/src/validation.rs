use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

use crate::directory::{Directory, ResolvedSource};
use crate::error::{QueryError, ValidationError};

pub const MAX_DEVICE_ID_LENGTH: usize = 50;
pub const MAX_KEYWORD_LENGTH: usize = 100;
pub const MAX_LINES_LIMIT: u32 = 99_999;
pub const DEFAULT_LINES: u32 = 2000;

/// Width of the `YYYY-MM-DD HH:MM:SS.mmm` prefix compared against a time window.
pub const TIMESTAMP_WIDTH: usize = 23;

const SHELL_METACHARACTERS: &[char] = &[
    '\'', '`', '$', '\\', '"', ';', '&', '|', '<', '>', '(', ')', '!',
];

static DEVICE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("Failed to compile device ID regex"));

static TIMESTAMP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(\.\d{3})?$").expect("Failed to compile timestamp regex")
});

/// Parameters exactly as the caller supplied them. Empty strings count as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawQuery {
    pub environment: Option<String>,
    pub log_type: Option<String>,
    pub device_id: Option<String>,
    pub keyword: Option<String>,
    pub lines: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub model: Option<String>,
}

/// What to do when only one of `start_time`/`end_time` is supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SingleBoundPolicy {
    /// Drop the whole window, as if neither bound had been given.
    #[default]
    Ignore,
    /// Fail with `InvalidTimeFormat`.
    Reject,
}

/// Inclusive `[start, end]` window compared lexicographically against the
/// fixed-width timestamp at the start of each line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    start: String,
    end: String,
}

impl TimeWindow {
    pub fn new(start: &str, end: &str) -> Result<Self, ValidationError> {
        check_timestamp("start_time", start)?;
        check_timestamp("end_time", end)?;
        Ok(Self {
            start: start.to_string(),
            end: end.to_string(),
        })
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }

    /// Compares the first [`TIMESTAMP_WIDTH`] characters of `line`. Shorter
    /// lines never match.
    pub fn contains_line(&self, line: &str) -> bool {
        match timestamp_prefix(line) {
            Some(stamp) => stamp >= self.start.as_str() && stamp <= self.end.as_str(),
            None => false,
        }
    }
}

fn timestamp_prefix(line: &str) -> Option<&str> {
    let mut boundaries = line.char_indices().map(|(i, _)| i).chain(std::iter::once(line.len()));
    boundaries.nth(TIMESTAMP_WIDTH).map(|end| &line[..end])
}

fn check_timestamp(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if TIMESTAMP_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidTimeFormat {
            field,
            reason: format!("'{}' does not look like 2025-07-24 11:59:38.369", value),
        })
    }
}

/// Backslash-escapes shell metacharacters, one backslash per character.
/// The escaped form is what reports and prompts show; lines are matched
/// against the keyword as typed.
pub fn sanitize_keyword(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if SHELL_METACHARACTERS.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    sanitized: String,
    folded: String,
}

impl Keyword {
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let length = raw.chars().count();
        if length > MAX_KEYWORD_LENGTH {
            return Err(ValidationError::KeywordTooLong {
                length,
                max: MAX_KEYWORD_LENGTH,
            });
        }
        let sanitized = sanitize_keyword(raw);
        let folded = raw.to_lowercase();
        Ok(Self { sanitized, folded })
    }

    pub fn as_str(&self) -> &str {
        &self.sanitized
    }

    fn matches(&self, line: &str) -> bool {
        line.to_lowercase().contains(&self.folded)
    }
}

pub fn parse_line_limit(value: Option<&str>, default: u32) -> Result<usize, ValidationError> {
    let Some(value) = value else {
        return Ok(default as usize);
    };
    let invalid = || ValidationError::InvalidLineCount {
        value: value.to_string(),
        max: MAX_LINES_LIMIT,
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match value.parse::<u32>() {
        Ok(n) if (1..=MAX_LINES_LIMIT).contains(&n) => Ok(n as usize),
        _ => Err(invalid()),
    }
}

/// The validated filter criteria. Fields are private: the constructors are the
/// only place a predicate is checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPredicate {
    device_id: String,
    keyword: Option<Keyword>,
    time_window: Option<TimeWindow>,
    limit: usize,
}

impl QueryPredicate {
    pub fn new(
        device_id: &str,
        keyword: Option<&str>,
        time_window: Option<TimeWindow>,
        limit: usize,
    ) -> Result<Self, ValidationError> {
        if device_id.len() > MAX_DEVICE_ID_LENGTH || !DEVICE_ID_REGEX.is_match(device_id) {
            return Err(ValidationError::InvalidDeviceId {
                value: device_id.to_string(),
                max: MAX_DEVICE_ID_LENGTH,
            });
        }
        let keyword = keyword.map(Keyword::new).transpose()?;
        if limit == 0 || limit > MAX_LINES_LIMIT as usize {
            return Err(ValidationError::InvalidLineCount {
                value: limit.to_string(),
                max: MAX_LINES_LIMIT,
            });
        }

        Ok(Self {
            device_id: device_id.to_string(),
            keyword,
            time_window,
            limit,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_ref().map(Keyword::as_str)
    }

    pub fn time_window(&self) -> Option<&TimeWindow> {
        self.time_window.as_ref()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Device first, since it rejects most lines cheaply.
    pub fn matches(&self, line: &str) -> bool {
        if !line.contains(self.device_id.as_str()) {
            return false;
        }
        if let Some(keyword) = &self.keyword {
            if !keyword.matches(line) {
                return false;
            }
        }
        match &self.time_window {
            Some(window) => window.contains_line(line),
            None => true,
        }
    }

    /// Short description of what the analysis should focus on.
    pub fn focus_description(&self) -> String {
        let mut description = format!("device: {}", self.device_id);
        if let Some(keyword) = self.keyword() {
            description.push_str(&format!(", keyword: {}", keyword));
        }
        if let Some(window) = &self.time_window {
            description.push_str(&format!(", range: {} to {}", window.start, window.end));
        }
        description
    }
}

#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    pub target: ResolvedSource,
    pub predicate: QueryPredicate,
    pub model: String,
}

/// Turns a [`RawQuery`] into a [`ValidatedQuery`] without touching the file system.
#[derive(Debug, Clone)]
pub struct QueryValidator {
    default_lines: u32,
    default_model: String,
    single_bound: SingleBoundPolicy,
}

impl QueryValidator {
    pub fn new(default_lines: u32, default_model: impl Into<String>, single_bound: SingleBoundPolicy) -> Self {
        Self {
            default_lines,
            default_model: default_model.into(),
            single_bound,
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn validate(&self, directory: &Directory, raw: &RawQuery) -> Result<ValidatedQuery, QueryError> {
        let environment = present(&raw.environment).ok_or(ValidationError::MissingParameter("environment"))?;
        let log_type = present(&raw.log_type).ok_or(ValidationError::MissingParameter("log_type"))?;
        let target = directory.resolve(log_type, environment)?;

        let device_id = present(&raw.device_id).ok_or(ValidationError::InvalidDeviceId {
            value: String::new(),
            max: MAX_DEVICE_ID_LENGTH,
        })?;
        let keyword = present(&raw.keyword);
        let limit = parse_line_limit(present(&raw.lines), self.default_lines)?;
        let time_window = self.time_window(present(&raw.start_time), present(&raw.end_time))?;

        let predicate = QueryPredicate::new(device_id, keyword, time_window, limit)?;
        let model = present(&raw.model).unwrap_or(&self.default_model).to_string();

        debug!(
            environment = %target.environment.name,
            source = %target.source.name,
            path = %target.path.display(),
            limit = predicate.limit(),
            "query validated"
        );

        Ok(ValidatedQuery {
            target,
            predicate,
            model,
        })
    }

    fn time_window(&self, start: Option<&str>, end: Option<&str>) -> Result<Option<TimeWindow>, ValidationError> {
        match (start, end) {
            (Some(start), Some(end)) => TimeWindow::new(start, end).map(Some),
            (None, None) => Ok(None),
            (start, end) => {
                // The supplied bound is still format-checked.
                if let Some(start) = start {
                    check_timestamp("start_time", start)?;
                }
                if let Some(end) = end {
                    check_timestamp("end_time", end)?;
                }
                match self.single_bound {
                    SingleBoundPolicy::Ignore => Ok(None),
                    SingleBoundPolicy::Reject => Err(ValidationError::InvalidTimeFormat {
                        field: if start.is_none() { "start_time" } else { "end_time" },
                        reason: "start_time and end_time must be given together".to_string(),
                    }),
                }
            }
        }
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{EnvironmentRef, LogSourceRef, PathResolver};
    use crate::error::SourceResolutionError;

    fn directory() -> Directory {
        Directory::new(
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
                description: "OMS log".into(),
                aliases: vec![],
                path_template: "{root}/{env}/{source}.log".into(),
            }],
            PathResolver::new("/logs"),
        )
        .unwrap()
    }

    fn raw(device_id: &str) -> RawQuery {
        RawQuery {
            environment: Some("dev".into()),
            log_type: Some("oms".into()),
            device_id: Some(device_id.into()),
            ..Default::default()
        }
    }

    fn validator() -> QueryValidator {
        QueryValidator::new(DEFAULT_LINES, "gemma3:27b", SingleBoundPolicy::Ignore)
    }

    #[test]
    fn test_defaults_applied() {
        let query = validator().validate(&directory(), &raw("devA")).unwrap();
        assert_eq!(query.predicate.limit(), 2000);
        assert_eq!(query.model, "gemma3:27b");
        assert!(query.predicate.keyword().is_none());
        assert!(query.predicate.time_window().is_none());
    }

    #[test]
    fn test_model_override() {
        let mut q = raw("devA");
        q.model = Some("llama3".into());
        assert_eq!(validator().validate(&directory(), &q).unwrap().model, "llama3");
    }

    #[test]
    fn test_device_id_rejections() {
        let too_long = "x".repeat(51);
        for bad in ["dev A", "dev/A", "dev;A", "", too_long.as_str()] {
            let err = validator().validate(&directory(), &raw(bad)).unwrap_err();
            assert!(
                matches!(err, QueryError::Validation(ValidationError::InvalidDeviceId { .. })),
                "expected InvalidDeviceId for {:?}",
                bad
            );
        }
        assert!(validator().validate(&directory(), &raw(&"x".repeat(50))).is_ok());
        assert!(validator().validate(&directory(), &raw("yHkq_Ct-KAdW")).is_ok());
    }

    #[test]
    fn test_line_limit_bounds() {
        assert_eq!(parse_line_limit(Some("1"), DEFAULT_LINES).unwrap(), 1);
        assert_eq!(parse_line_limit(Some("99999"), DEFAULT_LINES).unwrap(), 99999);
        assert_eq!(parse_line_limit(None, DEFAULT_LINES).unwrap(), 2000);
        for bad in ["0", "100000", "abc", "-5", "+5", "1.5", " 10", "99999999999999999999"] {
            assert!(
                matches!(
                    parse_line_limit(Some(bad), DEFAULT_LINES),
                    Err(ValidationError::InvalidLineCount { .. })
                ),
                "expected InvalidLineCount for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_keyword_length_limit() {
        let mut q = raw("devA");
        q.keyword = Some("k".repeat(101));
        let err = validator().validate(&directory(), &q).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Validation(ValidationError::KeywordTooLong { length: 101, max: 100 })
        ));
        q.keyword = Some("k".repeat(100));
        assert!(validator().validate(&directory(), &q).is_ok());
    }

    #[test]
    fn test_keyword_sanitized() {
        assert_eq!(sanitize_keyword("plain words"), "plain words");
        assert_eq!(sanitize_keyword("a;b|c"), r"a\;b\|c");
        assert_eq!(sanitize_keyword(r#"$(rm) "x" 'y' `z` \ & < > !"#), r#"\$\(rm\) \"x\" \'y\' \`z\` \\ \& \< \> \!"#);
    }

    #[test]
    fn test_time_format_checked() {
        let mut q = raw("devA");
        q.start_time = Some("2025-07-24T11:59:38".into());
        q.end_time = Some("2025-07-24 12:00:00".into());
        let err = validator().validate(&directory(), &q).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Validation(ValidationError::InvalidTimeFormat { field: "start_time", .. })
        ));

        q.start_time = Some("2025-07-24 11:59:38.369".into());
        let query = validator().validate(&directory(), &q).unwrap();
        let window = query.predicate.time_window().unwrap();
        assert_eq!(window.start(), "2025-07-24 11:59:38.369");
        assert_eq!(window.end(), "2025-07-24 12:00:00");
    }

    #[test]
    fn test_single_bound_ignored_by_default() {
        let mut q = raw("devA");
        q.start_time = Some("2025-07-24 11:59:38.369".into());
        let query = validator().validate(&directory(), &q).unwrap();
        assert!(query.predicate.time_window().is_none());
    }

    #[test]
    fn test_single_bound_rejected_when_strict() {
        let strict = QueryValidator::new(DEFAULT_LINES, "m", SingleBoundPolicy::Reject);
        let mut q = raw("devA");
        q.start_time = Some("2025-07-24 11:59:38.369".into());
        let err = strict.validate(&directory(), &q).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Validation(ValidationError::InvalidTimeFormat { field: "end_time", .. })
        ));
    }

    #[test]
    fn test_resolution_precedes_field_checks() {
        let mut q = raw("bad id");
        q.log_type = Some("nginx".into());
        let err = validator().validate(&directory(), &q).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Resolution(SourceResolutionError::UnknownLogSource { .. })
        ));
    }

    #[test]
    fn test_missing_environment() {
        let mut q = raw("devA");
        q.environment = Some(String::new());
        let err = validator().validate(&directory(), &q).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Validation(ValidationError::MissingParameter("environment"))
        ));
    }

    #[test]
    fn test_predicate_matching() {
        let window = TimeWindow::new("2025-07-24 11:59:38.369", "2025-07-24 11:59:59.999").unwrap();
        let predicate = QueryPredicate::new("devA", Some("HELLO"), Some(window), 10).unwrap();
        assert!(predicate.matches("2025-07-24 11:59:38.369 devA hello"));
        assert!(predicate.matches("2025-07-24 11:59:59.999 devA Hello there"));
        assert!(!predicate.matches("2025-07-24 12:00:00.000 devA hello"));
        assert!(!predicate.matches("2025-07-24 11:59:40.000 deva hello"));
        assert!(!predicate.matches("2025-07-24 11:59:40.000 devA goodbye"));
        assert!(!predicate.matches("devA hello"));
    }

    #[test]
    fn test_time_window_counts_characters_not_bytes() {
        let window = TimeWindow::new("2025-07-24 11:59:00", "2025-07-24 11:59:59").unwrap();
        assert!(window.contains_line("2025-07-24 11:59:38 [设备] devA"));
        assert!(window.contains_line("2025-07-24 11:59:38 设备重启"));
        assert!(!window.contains_line("2025-07-24 12:00:01 [设备] devA"));

        // 22 characters, 28 bytes
        let short = "2025-07-24 11:59:38设备重";
        assert_eq!(short.chars().count(), 22);
        assert!(!window.contains_line(short));

        // exactly 23 characters
        assert!(window.contains_line("2025-07-24 11:59:38 设备重"));
    }

    #[test]
    fn test_keyword_matches_as_typed_and_displays_escaped() {
        let predicate = QueryPredicate::new("devA", Some("func("), None, 10).unwrap();
        assert_eq!(predicate.keyword(), Some(r"func\("));
        assert!(predicate.matches("2025-07-24 11:59:38.369 devA panic in FUNC(x)"));
        assert!(!predicate.matches(r"2025-07-24 11:59:38.369 devA func\(x)"));
    }

    #[test]
    fn test_focus_description() {
        let window = TimeWindow::new("2025-07-24 11:00:00", "2025-07-24 12:00:00").unwrap();
        let predicate = QueryPredicate::new("devA", Some("timeout"), Some(window), 10).unwrap();
        assert_eq!(
            predicate.focus_description(),
            "device: devA, keyword: timeout, range: 2025-07-24 11:00:00 to 2025-07-24 12:00:00"
        );
    }
}
