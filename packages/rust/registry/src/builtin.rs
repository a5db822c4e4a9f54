//! Built-in text-analysis tools registered at process startup.
//!
//! - `summarize`: extractive summary made of the leading sentences
//! - `extract_names`: multi-word capitalized names found by pattern matching

use std::sync::LazyLock;

use ingestflow_shared::{Result, ToolFailure};
use regex::Regex;
use serde_json::{Value, json};

use crate::contract::Contract;
use crate::tool::{FnTool, Params};
use crate::{ToolDescriptor, ToolRegistry};

pub const SUMMARIZE: &str = "summarize";
pub const EXTRACT_NAMES: &str = "extract_names";

/// Register every built-in tool into `registry`.
pub fn register_builtin_tools(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(
        ToolDescriptor::new(SUMMARIZE, "1.0")
            .description("Extractive summary built from the leading sentences")
            .input(
                Contract::object()
                    .field("text", Contract::String)
                    .optional("max_sentences", Contract::Integer),
            )
            .output(
                Contract::object()
                    .field("summary", Contract::String)
                    .field("sentence_count", Contract::Integer),
            )
            .default_param("max_sentences", 3),
        FnTool::new(summarize),
    )?;

    registry.register(
        ToolDescriptor::new(EXTRACT_NAMES, "1.0")
            .description("Capitalized multi-word names found in the text")
            .input(
                Contract::object()
                    .field("text", Contract::String)
                    .optional("max_names", Contract::Integer),
            )
            .output(Contract::object().field("names", Contract::array(Contract::String)))
            .default_param("max_names", 20),
        FnTool::new(extract_names),
    )?;

    Ok(())
}

fn summarize(input: &Value, params: &Params) -> std::result::Result<Value, ToolFailure> {
    let text = required_text(input)?;
    let max = usize_param(input, params, "max_sentences", 3);

    let sentences = split_sentences(text);
    let summary = sentences
        .iter()
        .take(max)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    Ok(json!({
        "summary": summary,
        "sentence_count": sentences.len(),
    }))
}

fn extract_names(input: &Value, params: &Params) -> std::result::Result<Value, ToolFailure> {
    static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\b[A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)+\b").expect("valid regex")
    });

    let text = required_text(input)?;
    let max = usize_param(input, params, "max_names", 20);

    let mut names: Vec<&str> = Vec::new();
    for m in NAME_RE.find_iter(text) {
        if names.len() >= max {
            break;
        }
        if !names.contains(&m.as_str()) {
            names.push(m.as_str());
        }
    }

    Ok(json!({ "names": names }))
}

/// Split text into trimmed sentences, treating line breaks as boundaries and
/// dropping Markdown list/heading markers.
fn split_sentences(text: &str) -> Vec<&str> {
    static SENTENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^.!?\n]+[.!?]*").expect("valid regex"));

    SENTENCE_RE
        .find_iter(text)
        .map(|m| m.as_str().trim().trim_start_matches(['#', '-', '*', '>', ' ']))
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .collect()
}

fn required_text(input: &Value) -> std::result::Result<&str, ToolFailure> {
    let text = input["text"].as_str().unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ToolFailure::invalid_argument("text is empty"));
    }
    Ok(text)
}

/// Input value wins over the descriptor default.
fn usize_param(input: &Value, params: &Params, key: &str, fallback: usize) -> usize {
    input
        .get(key)
        .or_else(|| params.get(key))
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(fallback)
}
