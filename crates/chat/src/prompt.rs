//! Prompt assembly.

/// Stands in for the context block when retrieval found nothing.
pub const NO_CONTEXT: &str = "[No relevant memory or document found.]";

const PREAMBLE: &str = "You are a helpful assistant for Python developers.\n\
Use CONTEXT and MEMORY to answer the QUESTION clearly and precisely. \
If code is given, analyze or modify it as needed.";

/// Render the model prompt for `question` with retrieved `context`.
///
/// Chunks appear in retrieval order separated by blank lines. The question
/// is inserted exactly as typed.
pub fn build_prompt(context: &[String], question: &str) -> String {
    let context = if context.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        context.join("\n\n")
    };

    format!(
        "{PREAMBLE}\n\n### CONTEXT ###\n{context}\n\n### QUESTION ###\n{question}\n\n### RESPONSE ###\n"
    )
}
