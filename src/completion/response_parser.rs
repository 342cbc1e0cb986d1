//! Completion reply parsing.
//!
//! Turns whatever the model produced into a `ParsedResponse`. Stages, in
//! order: strip a code fence, locate the first `{` (none means plain
//! conversation), parse, repair and re-parse, regex field extraction, and
//! finally a fixed fallback message. Raw JSON syntax never reaches the caller.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::json_repair::repair_truncated_json;

// ─── Constants ───────────────────────────────────────────────────────────────

pub const MAX_SECTIONS: usize = 8;
pub const MAX_SECTION_ITEMS: usize = 8;

/// Shown when nothing readable could be recovered from the reply.
pub const FALLBACK_MESSAGE: &str =
    "Sorry, the answer could not be displayed properly. Please try asking again.";

/// Fields tried, in order, when a parsed object has no recognised shape.
const TEXT_FIELDS: &[&str] = &["text", "summary", "message", "content", "answer", "reply"];

lazy_static! {
    static ref SUMMARY_RE: Regex =
        Regex::new(r#""summary"\s*:\s*"((?:[^"\\]|\\.)*)"#).unwrap();
    static ref TEXT_RE: Regex = Regex::new(r#""text"\s*:\s*"((?:[^"\\]|\\.)*)"#).unwrap();
    static ref ITEMS_RE: Regex =
        Regex::new(r#""items"\s*:\s*\[((?:[^\]"]|"(?:[^"\\]|\\.)*"?)*)"#).unwrap();
    static ref TITLE_RE: Regex = Regex::new(r#""title"\s*:\s*"((?:[^"\\]|\\.)*)"#).unwrap();
    static ref STRING_RE: Regex = Regex::new(r#""((?:[^"\\]|\\.)*)"?"#).unwrap();
    static ref SUPPORT_RE: Regex = Regex::new(r#""support_notice"\s*:\s*true"#).unwrap();
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// One titled block of an advice reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    #[serde(flatten)]
    pub body: SectionBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionBody {
    Items { items: Vec<String> },
    Text { text: String },
}

/// The structured result handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParsedResponse {
    Talk {
        text: String,
        #[serde(rename = "supportNotice", default)]
        support_notice: bool,
    },
    Advice {
        summary: String,
        sections: Vec<Section>,
        #[serde(rename = "supportNotice", default)]
        support_notice: bool,
    },
}

impl ParsedResponse {
    pub fn talk(text: impl Into<String>) -> Self {
        ParsedResponse::Talk {
            text: text.into(),
            support_notice: false,
        }
    }

    pub fn support_notice(&self) -> bool {
        match self {
            ParsedResponse::Talk { support_notice, .. }
            | ParsedResponse::Advice { support_notice, .. } => *support_notice,
        }
    }

    /// Plain-text rendering used as the outbound `message.content`.
    pub fn to_plain_text(&self) -> String {
        match self {
            ParsedResponse::Talk { text, .. } => text.clone(),
            ParsedResponse::Advice {
                summary, sections, ..
            } => {
                let mut blocks = Vec::new();
                if !summary.is_empty() {
                    blocks.push(summary.clone());
                }
                for section in sections {
                    let mut block = section.title.clone();
                    match &section.body {
                        SectionBody::Items { items } => {
                            for item in items {
                                block.push_str("\n- ");
                                block.push_str(item);
                            }
                        }
                        SectionBody::Text { text } => {
                            block.push('\n');
                            block.push_str(text);
                        }
                    }
                    blocks.push(block);
                }
                blocks.join("\n\n")
            }
        }
    }
}

/// The last stage the parser needed to reach a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    PlainText,
    Parsed,
    Repaired,
    Extracted,
    Fallback,
}

impl ParseStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStage::PlainText => "plain_text",
            ParseStage::Parsed => "parsed",
            ParseStage::Repaired => "repaired",
            ParseStage::Extracted => "extracted",
            ParseStage::Fallback => "fallback",
        }
    }
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Parse a completion reply. Never fails.
pub fn parse_response(raw: &str) -> ParsedResponse {
    parse_response_with_stage(raw).0
}

/// Parse a completion reply and report which stage produced the result.
pub fn parse_response_with_stage(raw: &str) -> (ParsedResponse, ParseStage) {
    let body = strip_code_fence(raw);

    let Some(brace) = body.find('{') else {
        let text = body.trim();
        if text.is_empty() {
            return (ParsedResponse::talk(FALLBACK_MESSAGE), ParseStage::Fallback);
        }
        return (ParsedResponse::talk(text), ParseStage::PlainText);
    };

    let candidate = &body[brace..];
    if let Some(value) = parse_first_value(candidate) {
        return (from_value(&value, body), ParseStage::Parsed);
    }

    let repaired = repair_truncated_json(candidate);
    if let Some(value) = parse_first_value(&repaired) {
        return (from_value(&value, body), ParseStage::Repaired);
    }

    if let Some(text) = extract_fields(candidate) {
        let response = ParsedResponse::Talk {
            text,
            support_notice: SUPPORT_RE.is_match(candidate),
        };
        return (response, ParseStage::Extracted);
    }

    (ParsedResponse::talk(fallback_text(body)), ParseStage::Fallback)
}

/// Inner content of the first fenced code block, or the input unchanged.
/// An unterminated fence yields everything after the opening line.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw;
    };
    let after = &raw[open + 3..];
    let content_start = match after.find('\n') {
        Some(nl) if after[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => nl + 1,
        _ => 0,
    };
    let inner = &after[content_start..];
    match inner.find("```") {
        Some(close) => &inner[..close],
        None => inner,
    }
}

/// Parse the first JSON value, ignoring any trailing prose.
pub(crate) fn parse_first_value(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
}

/// Prose before the first `{` when it is brace-free, else the fixed message.
fn fallback_text(body: &str) -> String {
    let prefix = body.split('{').next().unwrap_or("").trim();
    if prefix.is_empty() || prefix.contains(['{', '}']) {
        FALLBACK_MESSAGE.to_string()
    } else {
        prefix.to_string()
    }
}

// ─── Mapping ─────────────────────────────────────────────────────────────────

fn from_value(value: &Value, body: &str) -> ParsedResponse {
    let Some(obj) = value.as_object() else {
        return ParsedResponse::talk(fallback_text(body));
    };

    let support_notice = [obj.get("support_notice"), obj.get("supportNotice")]
        .into_iter()
        .flatten()
        .any(|v| v == &Value::Bool(true));
    let kind = obj.get("type").and_then(Value::as_str);

    if kind == Some("talk") {
        if let Some(text) = non_empty_str(obj, "text") {
            return ParsedResponse::Talk {
                text,
                support_notice,
            };
        }
    }

    if matches!(kind, Some("advice") | None) && obj.contains_key("summary") {
        let summary = non_empty_str(obj, "summary").unwrap_or_default();
        let sections = normalize_sections(obj.get("sections"));
        if !summary.is_empty() || !sections.is_empty() {
            return ParsedResponse::Advice {
                summary,
                sections,
                support_notice,
            };
        }
    }

    let text = TEXT_FIELDS
        .iter()
        .find_map(|field| non_empty_str(obj, field))
        .unwrap_or_else(|| fallback_text(body));
    ParsedResponse::Talk {
        text,
        support_notice,
    }
}

fn non_empty_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn normalize_sections(value: Option<&Value>) -> Vec<Section> {
    let Some(Value::Array(sections)) = value else {
        return Vec::new();
    };
    sections
        .iter()
        .filter_map(normalize_section)
        .take(MAX_SECTIONS)
        .collect()
}

fn normalize_section(value: &Value) -> Option<Section> {
    let obj = value.as_object()?;
    let title = non_empty_str(obj, "title")?;

    let items: Vec<String> = match obj.get("items") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(coerce_item)
            .take(MAX_SECTION_ITEMS)
            .collect(),
        Some(single) => coerce_item(single).into_iter().collect(),
        None => Vec::new(),
    };

    let body = if !items.is_empty() {
        SectionBody::Items { items }
    } else if let Some(text) = obj.get("text").and_then(coerce_item) {
        SectionBody::Text { text }
    } else {
        SectionBody::Items { items }
    };

    Some(Section { title, body })
}

/// Coerce a list entry into display text. Containers are reduced to their
/// `text` or `title` field, never serialized.
fn coerce_item(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(obj) => {
            return non_empty_str(obj, "text").or_else(|| non_empty_str(obj, "title"));
        }
        Value::Array(_) | Value::Null => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ─── Extraction ──────────────────────────────────────────────────────────────

/// Pull readable fields out of JSON that neither parsed nor repaired.
fn extract_fields(text: &str) -> Option<String> {
    let mut lines = Vec::new();

    if let Some(summary) = first_capture(&SUMMARY_RE, text) {
        lines.push(summary);
    }
    if let Some(body) = first_capture(&TEXT_RE, text) {
        lines.push(body);
    }
    for items in ITEMS_RE.captures_iter(text) {
        let Some(inner) = items.get(1) else {
            continue;
        };
        for item in STRING_RE.captures_iter(inner.as_str()) {
            if let Some(m) = item.get(1) {
                let value = unescape_json_string(m.as_str());
                if !value.trim().is_empty() {
                    lines.push(format!("- {}", value.trim()));
                }
            }
        }
    }
    if lines.is_empty() {
        lines.extend(
            TITLE_RE
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                .map(|m| unescape_json_string(m.as_str()))
                .filter(|t| !t.trim().is_empty()),
        );
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| unescape_json_string(m.as_str()))
        .filter(|s| !s.trim().is_empty())
}

/// Decode JSON string escapes. A trailing partial `\uXXXX` is dropped.
fn unescape_json_string(raw: &str) -> String {
    let mut raw = raw;
    if let Some(idx) = raw.rfind("\\u") {
        let hex = &raw[idx + 2..];
        if hex.len() < 4 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            raw = &raw[..idx];
        }
    }
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| {
        raw.replace("\\n", "\n")
            .replace("\\t", "\t")
            .replace("\\\"", "\"")
            .replace("\\\\", "\\")
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
