//! Text helpers shared by the chat pipeline, exports, and the HTTP layer.
//!
//! Everything here is pure and synchronous. Lengths are counted in `char`s,
//! never bytes, so multi-byte input (emoji, accented text) is never split
//! inside a code point.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(\w+)?\n(.*?)\n```").expect("valid regex"));

/// Strip HTML-like tags and collapse runs of whitespace to single spaces.
pub fn sanitize_text(text: &str) -> String {
    let without_tags = TAG_RE.replace_all(text, "");
    WS_RE.replace_all(&without_tags, " ").trim().to_string()
}

/// The first `n` characters of `text`.
pub fn take_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

/// Shorten `text` to at most `max_length` characters, ending with `suffix` when cut.
pub fn truncate_text(text: &str, max_length: usize, suffix: &str) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let keep = max_length.saturating_sub(suffix.chars().count());
    format!("{}{}", take_chars(text, keep), suffix)
}

/// A fenced code block found in a response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

/// Fenced code blocks in order of appearance. Blocks without a language tag get `"text"`.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    CODE_BLOCK_RE
        .captures_iter(text)
        .map(|caps| CodeBlock {
            language: caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "text".to_string()),
            code: caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
        })
        .collect()
}

/// A piece of a message for rendering: prose or a code block.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Segment {
    Text { content: String },
    Code { language: String, code: String },
}

/// Split a message into alternating prose and code segments. Empty prose is dropped.
pub fn split_code_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in CODE_BLOCK_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        push_text(&mut segments, &text[last..whole.start()]);
        segments.push(Segment::Code {
            language: caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "text".to_string()),
            code: caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default(),
        });
        last = whole.end();
    }
    push_text(&mut segments, &text[last..]);
    segments
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        segments.push(Segment::Text {
            content: trimmed.to_string(),
        });
    }
}

/// Normalise raw model output: collapse whitespace and drop repeated sentences.
///
/// Sentences are split on `.` and re-joined with `". "` plus a final `.`;
/// an empty response stays empty.
pub fn clean_response(response: &str) -> String {
    let collapsed = WS_RE.replace_all(response, " ");
    let mut seen = HashSet::new();
    let sentences: Vec<&str> = collapsed
        .trim()
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty() && seen.insert(*s))
        .collect();

    if sentences.is_empty() {
        return String::new();
    }
    format!("{}.", sentences.join(". "))
}

/// Apply the configured bot personality to a reply.
///
/// `friendly` appends `" 😊"` unless the reply already sounds upbeat;
/// `professional` makes sure it ends with a period. Anything else is a no-op.
pub fn add_personality(response: &str, personality: &str) -> String {
    match personality {
        "friendly" => {
            let lower = response.to_lowercase();
            if ["!", "😊", "great", "wonderful"]
                .iter()
                .any(|w| lower.contains(w))
            {
                response.to_string()
            } else {
                format!("{} 😊", response)
            }
        }
        "professional" if !response.ends_with('.') => format!("{}.", response),
        _ => response.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Greeting,
    Question,
    Math,
    Help,
    Goodbye,
}

static INTENT_RULES: LazyLock<Vec<(Intent, Regex)>> = LazyLock::new(|| {
    [
        (
            Intent::Greeting,
            r"(?i)\b(hello|hi|hey|good morning|good afternoon)\b",
        ),
        (Intent::Question, r"(?i)\b(what|who|when|where|why|how)\b"),
        (Intent::Math, r"\b(\d+\s*[+\-*/]\s*\d+)\b"),
        (Intent::Help, r"(?i)\b(help|assist|support)\b"),
        (Intent::Goodbye, r"(?i)\b(bye|goodbye|see you|farewell)\b"),
    ]
    .into_iter()
    .map(|(intent, pattern)| (intent, Regex::new(pattern).expect("valid regex")))
    .collect()
});

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\b").expect("valid regex"));
static OPERATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[+\-*/]").expect("valid regex"));
static COUNTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(india|france|japan|usa|china|germany)\b").expect("valid regex")
});

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Entities {
    pub numbers: Vec<String>,
    pub math_operations: Vec<String>,
    pub countries: Vec<String>,
}

/// Shallow analysis of a user message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedInput {
    pub original_text: String,
    pub intent: Option<Intent>,
    pub entities: Entities,
    pub length: usize,
    pub word_count: usize,
}

/// Detect the first matching intent (greeting, question, math, help, goodbye)
/// and pull out numbers, operators, and country names.
pub fn parse_user_input(input: &str) -> ParsedInput {
    let text = sanitize_text(input);

    let intent = INTENT_RULES
        .iter()
        .find(|(_, re)| re.is_match(&text))
        .map(|(intent, _)| *intent);

    let collect = |re: &Regex| -> Vec<String> {
        re.find_iter(&text).map(|m| m.as_str().to_string()).collect()
    };
    let entities = Entities {
        numbers: collect(&NUMBER_RE),
        math_operations: collect(&OPERATOR_RE),
        countries: collect(&COUNTRY_RE),
    };

    ParsedInput {
        length: text.chars().count(),
        word_count: text.split_whitespace().count(),
        original_text: text,
        intent,
        entities,
    }
}

/// Jaccard similarity over lowercase whitespace-separated words.
pub fn calculate_similarity(a: &str, b: &str) -> f64 {
    let words_a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let words_b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();

    match (words_a.is_empty(), words_b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64
}

/// Up to three canned reply openers for the detected intent.
pub fn response_suggestions(input: &str) -> Vec<&'static str> {
    let suggestions: &[&'static str] = match parse_user_input(input).intent {
        Some(Intent::Greeting) => &[
            "Hello! How can I help you today?",
            "Hi there! What would you like to know?",
            "Greetings! I'm here to assist you.",
        ],
        Some(Intent::Question) => &[
            "That's an interesting question. Let me think...",
            "I'll do my best to answer that for you.",
            "Here's what I know about that topic:",
        ],
        Some(Intent::Math) => &[
            "Let me calculate that for you.",
            "Here's the mathematical result:",
            "The answer to your calculation is:",
        ],
        _ => &[],
    };
    suggestions.iter().take(3).copied().collect()
}

/// `HH:MM:SS`, or `YYYY-MM-DD HH:MM:SS` with `include_date`.
pub fn format_timestamp(ts: &DateTime<Utc>, include_date: bool) -> String {
    if include_date {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.format("%H:%M:%S").to_string()
    }
}

/// Human readable size with one decimal, e.g. `"1.5 KB"`.
pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

pub fn validate_file_size(size: usize, max_size: usize) -> bool {
    size <= max_size
}

/// Eight hex characters derived from the current time.
pub fn generate_short_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_string().as_bytes());
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    format!("{:x}", hasher.finalize())[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_strips_tags_and_whitespace() {
        assert_eq!(
            sanitize_text("  <b>Hello</b>\n\n  <script>x</script>world  "),
            "Hello xworld"
        );
        assert_eq!(sanitize_text("   "), "");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10, "..."), "short");
        assert_eq!(truncate_text("abcdefghijkl", 8, "..."), "abcde...");
        assert_eq!(truncate_text("ééééé", 4, "…"), "ééé…");
    }

    #[test]
    fn test_extract_code_blocks() {
        let text = "Try this:\n```rust\nfn main() {}\n```\nand\n```\nplain\n```";
        let blocks = extract_code_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language, "rust");
        assert_eq!(blocks[0].code, "fn main() {}");
        assert_eq!(blocks[1].language, "text");
    }

    #[test]
    fn test_split_code_segments() {
        let segs = split_code_segments("before\n```py\nprint(1)\n```\nafter");
        assert_eq!(
            segs,
            vec![
                Segment::Text {
                    content: "before".into()
                },
                Segment::Code {
                    language: "py".into(),
                    code: "print(1)".into()
                },
                Segment::Text {
                    content: "after".into()
                },
            ]
        );
    }

    #[test]
    fn test_clean_response_dedupes_sentences() {
        assert_eq!(
            clean_response("Paris is nice.  Paris is nice. It is big"),
            "Paris is nice. It is big."
        );
        assert_eq!(clean_response("4"), "4.");
        assert_eq!(clean_response("   "), "");
        assert_eq!(clean_response("..."), "");
    }

    #[test]
    fn test_add_personality() {
        assert_eq!(add_personality("Sure", "friendly"), "Sure 😊");
        assert_eq!(add_personality("Great idea", "friendly"), "Great idea");
        assert_eq!(add_personality("Wow!", "friendly"), "Wow!");
        assert_eq!(add_personality("Noted", "professional"), "Noted.");
        assert_eq!(add_personality("Noted.", "professional"), "Noted.");
        assert_eq!(add_personality("Noted", "none"), "Noted");
    }

    #[test]
    fn test_parse_user_input_intent_order() {
        assert_eq!(parse_user_input("hello, what time").intent, Some(Intent::Greeting));
        assert_eq!(parse_user_input("What is 2+2").intent, Some(Intent::Question));
        assert_eq!(parse_user_input("12 * 3").intent, Some(Intent::Math));
        assert_eq!(parse_user_input("please assist").intent, Some(Intent::Help));
        assert_eq!(parse_user_input("ok bye").intent, Some(Intent::Goodbye));
        assert_eq!(parse_user_input("xyz").intent, None);
    }

    #[test]
    fn test_parse_user_input_entities() {
        let parsed = parse_user_input("Is 10 - 3 bigger in France or Japan?");
        assert_eq!(parsed.entities.numbers, vec!["10", "3"]);
        assert_eq!(parsed.entities.math_operations, vec!["-"]);
        assert_eq!(parsed.entities.countries, vec!["France", "Japan"]);
        assert_eq!(parsed.word_count, 9);
    }

    #[test]
    fn test_calculate_similarity() {
        assert_eq!(calculate_similarity("", ""), 1.0);
        assert_eq!(calculate_similarity("a", ""), 0.0);
        assert!((calculate_similarity("the cat", "The dog") - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_response_suggestions() {
        assert_eq!(response_suggestions("hi").len(), 3);
        assert!(response_suggestions("lorem ipsum").is_empty());
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10.0 MB");
    }

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_timestamp(&ts, false), "07:05:01");
        assert_eq!(format_timestamp(&ts, true), "2024-03-09 07:05:01");
    }

    #[test]
    fn test_short_id_shape() {
        let id = generate_short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_validate_file_size() {
        assert!(validate_file_size(10, 10));
        assert!(!validate_file_size(11, 10));
    }
}
