//! Prompt framing for question-answering models.

/// Marker that ends every prompt and precedes the model's answer.
pub const ANSWER_MARKER: &str = "Answer:";

/// Frame a user question, optionally preceded by conversation context.
///
/// ```rust
/// use smartbot::prompt::question_prompt;
///
/// assert_eq!(question_prompt("Hi?", ""), "Question: Hi?\nAnswer:");
/// assert_eq!(
///     question_prompt("Hi?", "User: hello"),
///     "Context: User: hello\n\nQuestion: Hi?\nAnswer:"
/// );
/// ```
pub fn question_prompt(prompt: &str, context: &str) -> String {
    if context.is_empty() {
        format!("Question: {}\n{}", prompt, ANSWER_MARKER)
    } else {
        format!("Context: {}\n\nQuestion: {}\n{}", context, prompt, ANSWER_MARKER)
    }
}

/// Strip an echoed prompt from generated text, keeping what follows the last `Answer:`.
pub fn extract_answer(raw: &str) -> String {
    match raw.rfind(ANSWER_MARKER) {
        Some(idx) => raw[idx + ANSWER_MARKER.len()..].trim().to_string(),
        None => raw.trim().to_string(),
    }
}
