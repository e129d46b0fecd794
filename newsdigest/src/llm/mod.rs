use anyhow::Result;

/// Core trait for LLM text generation backends
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate completion for a given prompt
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse>;

    /// Model name used for requests, for logging
    fn model(&self) -> &str;
}

/// Request structure for LLM generation
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: None,
            temperature: None,
            timeout_seconds: None,
        }
    }
}

/// Response from LLM generation
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: UsageMetadata,
    pub model: String,
}

/// Token usage metadata
#[derive(Debug, Clone, Default)]
pub struct UsageMetadata {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

pub mod remote;
pub mod summarizer;

/// Helper to extract a JSON document from text that might contain markdown backticks or preamble.
/// `open`/`close` select the outermost delimiters to fall back on (`{}` for objects, `[]` for arrays).
pub fn extract_json_from_text(text: &str, open: char, close: char) -> Option<String> {
    // 1. Try to find content between ```json and ```
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    // 2. Try to find content between ``` and ```
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        if let Some(end) = rest.find("```") {
            return Some(rest[..end].trim().to_string());
        }
    }

    // 3. Try to find the first opening and last closing delimiter
    if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
        if start < end {
            return Some(text[start..=end].to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let text = "Sure! Here you go:\n```json\n[\"a\", \"b\"]\n```\nAnything else?";
        assert_eq!(extract_json_from_text(text, '[', ']').as_deref(), Some("[\"a\", \"b\"]"));
    }

    #[test]
    fn extracts_bare_array_after_preamble() {
        let text = "Summaries: [\"one\", \"two\"] hope this helps";
        assert_eq!(
            extract_json_from_text(text, '[', ']').as_deref(),
            Some("[\"one\", \"two\"]")
        );
        assert_eq!(extract_json_from_text("no json here", '[', ']'), None);
        assert_eq!(extract_json_from_text("] backwards [", '[', ']'), None);
    }
}
