pub const DEFAULT_RESPONSE_LANGUAGE: &str = "English";

/// Renders analysis prompts. The response language is an operator setting and
/// does not follow the language of the logs or the caller.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    response_language: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_LANGUAGE)
    }
}

impl PromptBuilder {
    pub fn new(response_language: impl Into<String>) -> Self {
        let response_language = response_language.into();
        let response_language = if response_language.trim().is_empty() {
            DEFAULT_RESPONSE_LANGUAGE.to_string()
        } else {
            response_language
        };
        Self { response_language }
    }

    pub fn response_language(&self) -> &str {
        &self.response_language
    }

    pub fn render(&self, log_text: &str, context_description: Option<&str>) -> String {
        let mut prompt = format!(
            "{}\n\nLog excerpt:\n{}\n\n{}\n\n{}",
            Self::persona(),
            log_text,
            Self::structure(),
            self.language_clause()
        );

        if let Some(context) = context_description.map(str::trim).filter(|c| !c.is_empty()) {
            prompt.push_str("\n\nPay special attention to: ");
            prompt.push_str(context);
        }

        prompt
    }

    /// Prompt for a free-form question, optionally grounded in caller context.
    pub fn question(question: &str, context: Option<&str>) -> String {
        match context.filter(|c| !c.trim().is_empty()) {
            Some(context) => format!("Context:\n{}\n\nQuestion: {}", context, question),
            None => question.to_string(),
        }
    }

    fn persona() -> &'static str {
        "You are a senior operations engineer responsible for a fleet of field devices. \
         Analyse the following log excerpt."
    }

    fn structure() -> &'static str {
        r#"📊 **Analysis requirements**
Structure the answer under these headings:

## 🔍 Error and warning classification
- **Errors**: every ERROR entry with its code, timestamp and description
- **Warnings**: count of WARN entries and the risk they point to

## 🔁 Anomaly patterns
- Recurring anomalies, error bursts and trends over time

## 📈 Device and system state
- **Device status**: how each device ID is behaving
- **Communication**: links between devices and to external services

## ⚙️ Performance metrics
- CPU, memory, voltage, current and other key readings found in the excerpt

## ⚠️ Risk assessment
- **Severity**: grade each issue as high, medium or low
- **Impact**: modules or business functions that may be affected
- **Recommended actions**: concrete handling steps per issue

## 📋 Summary
- **Time range** covered by the excerpt
- **Counts** per log level
- **Devices**: every device ID that appears"#
    }

    fn language_clause(&self) -> String {
        format!(
            "Answer in {}, with clear formatting.",
            self.response_language
        )
    }
}
