//! Context builder: formats a ranked memory set into the string handed back
//! to the calling assistant, respecting a character budget by truncating
//! from the lowest-scored memory first.

use serde::Serialize;

use crate::rank::RankedMemory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextFormat {
    Plain,
    Markdown,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryContextEntry {
    pub memory_id: i64,
    pub content: String,
    pub memory_type: String,
    pub final_score: f32,
}

/// Why a `MemoryContext` looks the way it does. `Timeout` marks a soft
/// failure — the context is still valid, just built from whatever the
/// coordinator had scored before its deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallReason {
    Ok,
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextMetadata {
    pub memory_count: usize,
    pub truncated: bool,
    pub reason: RecallReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryContext {
    pub original_prompt: String,
    pub enhanced_prompt: String,
    pub memories: Vec<MemoryContextEntry>,
    pub metadata: ContextMetadata,
}

fn render_plain(prompt: &str, entries: &[MemoryContextEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str("- ");
        out.push_str(&entry.content);
        out.push('\n');
    }
    out.push('\n');
    out.push_str(prompt);
    out
}

fn render_markdown(prompt: &str, entries: &[MemoryContextEntry]) -> String {
    let mut out = String::from("## Relevant memories\n\n");
    for entry in entries {
        out.push_str(&format!("- **{}** ({:.2}): {}\n", entry.memory_type, entry.final_score, entry.content));
    }
    out.push_str("\n---\n\n");
    out.push_str(prompt);
    out
}

fn render_json(prompt: &str, entries: &[MemoryContextEntry]) -> String {
    #[derive(Serialize)]
    struct Wire<'a> {
        prompt: &'a str,
        memories: &'a [MemoryContextEntry],
    }
    serde_json::to_string(&Wire { prompt, memories: entries }).unwrap_or_default()
}

/// Builds the final `MemoryContext`, dropping the lowest-scored memories
/// first until the rendered prompt fits `max_chars`. `ranked` is expected
/// already sorted best-first by `rank::sort_and_truncate`.
pub fn build_context(original_prompt: &str, ranked: &[RankedMemory], format: ContextFormat, max_chars: usize) -> MemoryContext {
    let mut entries: Vec<MemoryContextEntry> = ranked
        .iter()
        .map(|r| MemoryContextEntry {
            memory_id: r.memory.id,
            content: r.memory.content.clone(),
            memory_type: r.memory.memory_type.as_str().to_string(),
            final_score: r.breakdown.final_score,
        })
        .collect();

    let mut truncated = false;
    let mut enhanced_prompt = render(original_prompt, &entries, format);
    while enhanced_prompt.len() > max_chars && !entries.is_empty() {
        entries.pop();
        truncated = true;
        enhanced_prompt = render(original_prompt, &entries, format);
    }

    MemoryContext {
        original_prompt: original_prompt.to_string(),
        enhanced_prompt,
        metadata: ContextMetadata {
            memory_count: entries.len(),
            truncated,
            reason: RecallReason::Ok,
        },
        memories: entries,
    }
}

/// Builds the timeout-path `MemoryContext`: the coordinator missed its
/// deadline, so the caller gets the prompt back verbatim rather than a
/// format-wrapped empty context (SPEC_FULL.md §4.5, §7, scenario S4 —
/// `enhanced_prompt == original_prompt` on timeout).
pub fn timeout_context(original_prompt: &str) -> MemoryContext {
    MemoryContext {
        original_prompt: original_prompt.to_string(),
        enhanced_prompt: original_prompt.to_string(),
        metadata: ContextMetadata {
            memory_count: 0,
            truncated: false,
            reason: RecallReason::Timeout,
        },
        memories: Vec::new(),
    }
}

fn render(prompt: &str, entries: &[MemoryContextEntry], format: ContextFormat) -> String {
    match format {
        ContextFormat::Plain => render_plain(prompt, entries),
        ContextFormat::Markdown => render_markdown(prompt, entries),
        ContextFormat::Json => render_json(prompt, entries),
    }
}
