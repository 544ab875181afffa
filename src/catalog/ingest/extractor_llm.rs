//! LLM call that turns a raw transcript into `<item>` markup.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client as ReqwestClient;
use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use rig::providers::ollama;

use crate::catalog::core::config::LlmConfig;
use crate::catalog::core::errors::{CatalogError, CatalogResult};

/// Boxed future type for extraction calls.
pub type ExtractFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Service producing item markup from a transcript.
pub trait ExtractionService: Send + Sync {
    /// Return the model's raw answer for one transcript.
    ///
    /// # Errors
    /// Returns an error if the model call fails.
    fn extract<'a>(&'a self, transcript: &'a str) -> ExtractFuture<'a, CatalogResult<String>>;
}

const EXTRACTION_PREAMBLE: &str = "You turn Japanese listening-comprehension transcripts into structured items. \
For every exercise in the transcript emit one block:\n\
<item>\n<introduction>...</introduction>\n<conversation>...</conversation>\n<question>...</question>\n</item>\n\
Copy all three parts verbatim from the transcript. \
Skip exam instructions, worked examples and any exercise that depends on spatial positions, directions, maps or diagrams. \
Output only the item blocks.";

/// Ollama-backed extractor using the Rig completion API.
pub struct OllamaExtractor {
    model: ollama::CompletionModel,
    temperature: f64,
    max_tokens: Option<u64>,
}

impl OllamaExtractor {
    /// Create a new extractor from the completion model config.
    ///
    /// # Errors
    /// Returns an error if the Ollama client cannot be built.
    pub fn new(llm: &LlmConfig) -> CatalogResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(rig::client::Nothing);
        let builder = if let Some(base_url) = &llm.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(CatalogError::from)?;
        let model = client.completion_model(llm.model.clone());
        Ok(Self {
            model,
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
        })
    }
}

impl ExtractionService for OllamaExtractor {
    fn extract<'a>(&'a self, transcript: &'a str) -> ExtractFuture<'a, CatalogResult<String>> {
        Box::pin(async move {
            let request = self
                .model
                .completion_request(format!("Transcript:\n{transcript}"))
                .preamble(EXTRACTION_PREAMBLE.to_string())
                .temperature(self.temperature)
                .max_tokens_opt(self.max_tokens)
                .build();

            let response = self.model.completion(request).await?;
            let text = extract_text(&response.choice);
            if text.trim().is_empty() {
                return Err(CatalogError::Extraction(
                    "model returned no text".to_string(),
                ));
            }
            Ok(text)
        })
    }
}

fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}
