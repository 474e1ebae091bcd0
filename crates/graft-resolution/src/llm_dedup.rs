//! LLM-backed batch deduplication.
//!
//! Implements [`BatchDedup`] over any [`Llm`] by rendering the request as a
//! JSON-mode prompt and parsing the reply leniently.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use graft_core::{
    BatchDedup, DedupCandidate, DedupRequest, DedupResolution, ErrorCode, GenerationOptions,
    GraftError, GraftResult, Llm, Message, ResponseFormat,
};

static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)\s*```").unwrap());
static THINK_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());
static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());

const DEDUP_SYSTEM_PROMPT: &str = r#"You deduplicate entities extracted from a document.

For every PENDING entity decide whether it refers to the SAME real-world concept or object as another entity in either list. Only merge entities that are truly the same thing; entities that are merely related stay separate.

Respond with a single JSON object:
{"resolutions": [{"id": "<pending id>", "canonical_id": "<id to merge into, or empty string if new>"}]}

Give exactly one resolution per pending entity, and use only ids from the lists."#;

/// [`BatchDedup`] implementation that asks an LLM.
pub struct LlmBatchDedup {
    llm: Arc<dyn Llm>,
    max_tokens: u32,
}

impl LlmBatchDedup {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self {
            llm,
            max_tokens: 2048,
        }
    }

    /// Cap the completion length.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_prompt(&self, request: &DedupRequest) -> String {
        let mut prompt = String::from("PENDING ENTITIES:\n");
        for candidate in &request.pending {
            prompt.push_str(&candidate_line(candidate));
        }

        prompt.push_str("\nEXISTING ENTITIES:\n");
        if request.existing.is_empty() {
            prompt.push_str("  (none)\n");
        }
        for candidate in &request.existing {
            prompt.push_str(&candidate_line(candidate));
        }

        prompt.push_str("\nReturn the resolutions JSON object.");
        prompt
    }
}

fn candidate_line(candidate: &DedupCandidate) -> String {
    format!(
        "  - ID: {} | Label: {} | Type: {} | Definition: {}\n",
        candidate.id, candidate.label, candidate.entity_type, candidate.definition
    )
}

#[async_trait]
impl BatchDedup for LlmBatchDedup {
    async fn deduplicate(&self, request: &DedupRequest) -> GraftResult<Vec<DedupResolution>> {
        let messages = vec![
            Message::system(DEDUP_SYSTEM_PROMPT),
            Message::user(self.build_prompt(request)),
        ];
        let options = GenerationOptions {
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            response_format: self
                .llm
                .supports_json_mode()
                .then_some(ResponseFormat::Json),
        };

        let response = self
            .llm
            .generate(&messages, Some(options))
            .await
            .map_err(|e| match e {
                GraftError::Llm { message, source, .. } => GraftError::Dedup {
                    message: format!("{} failed: {}", self.llm.model_name(), message),
                    code: ErrorCode::DedupCallFailed,
                    source,
                },
                other => other,
            })?;

        tracing::debug!(
            model = self.llm.model_name(),
            pending = request.pending.len(),
            tokens = response.usage.as_ref().map(|u| u.total_tokens).unwrap_or_default(),
            "Batch dedup response received"
        );

        parse_resolutions(response.content_or_empty(), request)
    }
}

/// Replies the adapter understands.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DedupReply {
    Resolutions { resolutions: Vec<DedupResolution> },
    Groups { groups: Vec<Vec<IdValue>> },
    Bare(Vec<DedupResolution>),
}

/// Ids sometimes come back as numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(i64),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

/// Strip code fences and reasoning tags, then cut to the outermost JSON
/// value.
pub fn extract_json(text: &str) -> String {
    let text = THINK_TAGS.replace_all(text, "");
    let text = text.trim();

    let inner = CODE_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    let start = inner.find(['{', '[']);
    let end = inner.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if end >= start => inner[start..=end].to_string(),
        _ => inner.trim().to_string(),
    }
}

/// Repair the usual LLM JSON slips: trailing commas and single quotes.
fn repair_json(json: &str) -> String {
    let repaired = TRAILING_COMMA.replace_all(json, "$1");
    if repaired.contains('"') {
        repaired.into_owned()
    } else {
        repaired.replace('\'', "\"")
    }
}

/// Parse a dedup reply into resolutions.
///
/// Accepts `{"resolutions": [...]}`, a bare resolution list, or
/// `{"groups": [[id, id, ...], ...]}` where each group merges into its first
/// member. Structural validation against the request is left to the caller.
pub fn parse_resolutions(response: &str, request: &DedupRequest) -> GraftResult<Vec<DedupResolution>> {
    let json = extract_json(response);
    if json.is_empty() {
        return Err(GraftError::Parse {
            message: "Empty dedup response".to_string(),
            code: ErrorCode::ParseInvalidJson,
        });
    }

    let reply: DedupReply = serde_json::from_str(&json)
        .or_else(|_| serde_json::from_str(&repair_json(&json)))
        .map_err(|e| GraftError::Parse {
            message: format!("Failed to parse dedup response JSON: {}", e),
            code: ErrorCode::ParseInvalidJson,
        })?;

    Ok(match reply {
        DedupReply::Resolutions { resolutions } | DedupReply::Bare(resolutions) => resolutions,
        DedupReply::Groups { groups } => groups_to_resolutions(groups, request),
    })
}

fn groups_to_resolutions(groups: Vec<Vec<IdValue>>, request: &DedupRequest) -> Vec<DedupResolution> {
    let mut resolutions = Vec::new();
    let mut decided: HashSet<String> = HashSet::new();

    for group in groups {
        let mut ids = group.into_iter().map(IdValue::into_string);
        let Some(anchor) = ids.next() else { continue };
        for id in ids {
            if request.is_pending(&id) && decided.insert(id.clone()) {
                resolutions.push(DedupResolution::merge(id, anchor.clone()));
            }
        }
    }

    for candidate in &request.pending {
        if !decided.contains(&candidate.id) {
            resolutions.push(DedupResolution::new_entity(candidate.id.clone()));
        }
    }
    resolutions
}
