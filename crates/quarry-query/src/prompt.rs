//! Grounded prompt construction.
//!
//! Pure: the prompt depends only on the query, the hits and the snapshot,
//! so it is testable without a live generator. The template revision is
//! recorded in the config snapshot as `prompt_version`.

use quarry_core::RagConfig;

use crate::types::RetrievalHit;

/// Deterministic answer returned when retrieval produces nothing usable.
pub const INSUFFICIENT_CONTEXT_ANSWER: &str =
    "The provided documents do not contain information about this topic.";

/// Render the grounded prompt: system instruction, numbered context in
/// similarity order, the raw query, and an answer cue.
pub fn build_prompt(query: &str, hits: &[RetrievalHit], config: &RagConfig) -> String {
    let mut context = String::new();
    for (i, hit) in hits.iter().enumerate() {
        if i > 0 {
            context.push_str("\n\n");
        }
        context.push_str(&format!(
            "[Source {}]: {}",
            i + 1,
            truncate_chars(&hit.text, config.context_chunk_chars)
        ));
    }

    format!(
        "You are a helpful assistant answering questions based on provided document excerpts.\n\
         \n\
         Answer the question using ONLY the information provided in the context below.\n\
         If the answer is not in the context, say \"{refusal}\"\n\
         Be concise and cite which sources you use.\n\
         \n\
         CONTEXT:\n\
         {context}\n\
         \n\
         QUESTION: {query}\n\
         \n\
         ANSWER:",
        refusal = INSUFFICIENT_CONTEXT_ANSWER,
        context = context,
        query = query,
    )
}

/// Truncate to at most `max_chars` characters on a character boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
