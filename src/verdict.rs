//! Check outcomes: the verdict enum, the transient per-check result, and
//! the content fingerprint used to tell real novelty from restatement.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What a completed check concluded. Closed set; every consumer matches
/// all three arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Changed,
    Unchanged,
    Inconclusive,
}

impl Verdict {
    /// Tolerant mapping from model output. Anything unrecognized is
    /// inconclusive rather than a parse failure.
    pub fn from_label(s: &str) -> Verdict {
        match s.trim().to_ascii_lowercase().as_str() {
            "changed" | "update" | "updated" => Verdict::Changed,
            "unchanged" | "no_change" | "no change" | "none" => Verdict::Unchanged,
            _ => Verdict::Inconclusive,
        }
    }
}

/// Transient result of one check; consumed by dedup + notification and
/// then dropped.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub topic_name: String,
    pub verdict: Verdict,
    pub summary: String,
    pub fingerprint: String,
    pub source_url: Option<String>,
    pub error: Option<String>,
}

impl CheckResult {
    pub fn inconclusive(topic_name: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            topic_name: topic_name.to_string(),
            verdict: Verdict::Inconclusive,
            summary: error.clone(),
            fingerprint: String::new(),
            source_url: None,
            error: Some(error),
        }
    }
}

// --- tolerant shapes of the model's final JSON answer ---

#[derive(Debug, Deserialize)]
struct AnswerFlat {
    verdict: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    source_url: Option<String>,
}

/// Shape produced by older prompts: a boolean instead of a verdict label.
#[derive(Debug, Deserialize)]
struct AnswerLegacy {
    has_significant_update: bool,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnswerAny {
    Flat(AnswerFlat),
    Legacy(AnswerLegacy),
}

/// Parsed final answer, before dedup.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub verdict: Verdict,
    pub summary: String,
    pub source_url: Option<String>,
}

/// Parse the model's final text into a verdict + summary. Returns `None`
/// when no JSON object can be extracted at all. A fenced block that fails
/// to parse falls back to brace matching over the whole text.
pub fn parse_answer(text: &str) -> Option<Answer> {
    let any: AnswerAny = extract_fenced(text)
        .and_then(|json| serde_json::from_str(&json).ok())
        .or_else(|| extract_braced(text).and_then(|json| serde_json::from_str(&json).ok()))?;
    let (verdict, summary, source_url) = match any {
        AnswerAny::Flat(a) => (Verdict::from_label(&a.verdict), a.summary, a.source_url),
        AnswerAny::Legacy(a) => {
            let v = if a.has_significant_update {
                Verdict::Changed
            } else {
                Verdict::Unchanged
            };
            (v, a.summary, a.source_url)
        }
    };
    Some(Answer {
        verdict,
        summary: summary.trim().to_string(),
        source_url: source_url.filter(|u| {
            let u = u.trim();
            !u.is_empty() && u != "null"
        }),
    })
}

fn extract_fenced(text: &str) -> Option<String> {
    static RE_FENCE: OnceCell<Regex> = OnceCell::new();
    let re = RE_FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());
    re.captures(text).map(|cap| cap[1].to_string())
}

fn extract_braced(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Fingerprint of the substantive claim: SHA-256 over the normalized
/// summary, so restatements with different incidental wording collide.
pub fn fingerprint(summary: &str) -> String {
    let normalized = normalize_claim(summary);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize_claim(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        let c = if ch.is_alphanumeric() {
            prev_space = false;
            ch.to_ascii_lowercase()
        } else {
            if prev_space || out.is_empty() {
                continue;
            }
            prev_space = true;
            ' '
        };
        out.push(c);
    }
    out.trim_end().to_string()
}
