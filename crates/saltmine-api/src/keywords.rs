use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use saltmine_providers::gemini::{CompletionProvider, CompletionRequest};

const MIN_INPUT_CHARS: usize = 15;
const MAX_KEYWORD_CHARS: usize = 50;
const MULTI_WORD_THRESHOLD: usize = 3;

const QUESTION_MARKERS: &[&str] = &[
    "?", "？", "what", "why", "how", "when", "where", "who", "哪", "什么", "为什么", "怎么", "如何",
];

const SYSTEM_PROMPT: &str = r#"You are a keyword extraction expert. Extract the most relevant single keyword or short phrase from the user's input for searching pain points on Reddit and X.

Rules:
1. Output ONLY the keyword/phrase (2-4 words max)
2. Focus on the core product/service/topic
3. Remove modifiers like "problems with", "issues about", "why is"
4. Keep brand names intact (e.g., "Notion", "Gmail")
5. Output in English
6. If input is already a simple keyword, return it as-is

Examples:
Input: "Why is Notion so slow on mobile devices?"
Output: Notion mobile

Input: "I'm having trouble with email marketing campaigns"
Output: email marketing

Input: "What are common problems people face with meal prep?"
Output: meal prep

Input: "Notion"
Output: Notion

Input: "How can I improve my productivity when working remotely?"
Output: remote work productivity

Now extract the keyword from the following input:"#;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordExtraction {
    pub original: String,
    pub extracted: String,
    pub is_extracted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl KeywordExtraction {
    fn unchanged(input: &str, reason: impl Into<String>) -> Self {
        Self {
            original: input.to_string(),
            extracted: input.trim().to_string(),
            is_extracted: false,
            provider: None,
            reason: Some(reason.into()),
        }
    }
}

/// Condenses a sentence or question into a short search phrase with an LLM.
/// Never fails: any problem falls back to the trimmed input.
pub struct KeywordExtractor {
    enabled: bool,
    llm: Option<Arc<dyn CompletionProvider>>,
}

impl KeywordExtractor {
    pub fn new(llm: Option<Arc<dyn CompletionProvider>>, enabled: bool) -> Self {
        Self { enabled, llm }
    }

    pub fn disabled() -> Self {
        Self::new(None, false)
    }

    pub fn is_available(&self) -> bool {
        self.enabled && self.llm.is_some()
    }

    /// Short inputs, and inputs that read like neither a question nor a
    /// sentence, are taken to be keywords already.
    pub fn should_extract(&self, input: &str) -> bool {
        let input = input.trim();
        if !self.is_available() || input.chars().count() < MIN_INPUT_CHARS {
            return false;
        }
        looks_like_question(input) || input.split_whitespace().count() > MULTI_WORD_THRESHOLD
    }

    pub async fn extract(&self, input: &str) -> KeywordExtraction {
        let trimmed = input.trim();
        let Some(llm) = self.llm.as_ref().filter(|_| self.should_extract(trimmed)) else {
            return KeywordExtraction::unchanged(input, "Input is already a keyword or too short");
        };

        debug!(input = %trimmed, "Extracting keyword");
        let request = CompletionRequest {
            prompt: trimmed.to_string(),
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
            temperature: 0.3,
            max_tokens: 50,
        };

        let completion = match llm.generate(&request).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Keyword extraction failed: {}", e);
                return KeywordExtraction::unchanged(input, format!("Extraction failed: {}", e));
            }
        };

        let keyword = completion.content.trim();
        if keyword.is_empty() {
            warn!("Keyword extraction returned nothing");
            return KeywordExtraction::unchanged(input, "Extraction failed: empty keyword");
        }
        if keyword.chars().count() > MAX_KEYWORD_CHARS {
            warn!(len = keyword.len(), "Extracted keyword too long, using original input");
            return KeywordExtraction::unchanged(input, "Extracted keyword too long");
        }

        info!(keyword = %keyword, usage = ?completion.usage, "Keyword extracted");
        KeywordExtraction {
            original: input.to_string(),
            extracted: keyword.to_string(),
            is_extracted: true,
            provider: Some(llm.name()),
            reason: None,
        }
    }
}

fn looks_like_question(input: &str) -> bool {
    let lower = input.to_lowercase();
    QUESTION_MARKERS.iter().any(|m| lower.contains(m))
}
