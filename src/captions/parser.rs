//! Caption payload parsing.
//!
//! The payload format behind a caption track URL is not guaranteed, so parsers are
//! tried in a fixed order and the first one producing real text wins.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::utils::normalize_whitespace;

/// Which parser accepted a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionFormat {
    /// `<transcript><text start=".." dur="..">..</text></transcript>`
    TimedTextV1,
    /// `<timedtext format="3"><body><p t=".." d=".."><s>..</s></p></body></timedtext>`
    TimedTextV2,
    /// `{"events":[{"segs":[{"utf8":".."}]}]}`
    Json3,
    /// Anything else, with every tag removed
    TagStripped,
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static caption regex"))
}

fn text_element() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"(?s)<text\b[^>]*>(.*?)</text>")
}

fn paragraph_element() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"(?s)<p\b[^>]*>(.*?)</p>")
}

fn any_tag() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"(?s)<[^>]*>")
}

fn entity() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);")
}

#[derive(Debug, Deserialize)]
struct Json3Payload {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(default)]
    segs: Vec<Json3Segment>,
}

#[derive(Debug, Deserialize)]
struct Json3Segment {
    #[serde(default)]
    utf8: String,
}

/// Parse a caption payload, trying each known format in order
pub fn parse_caption_payload(payload: &str) -> Option<(CaptionFormat, String)> {
    let attempts: [(CaptionFormat, fn(&str) -> Option<String>); 4] = [
        (CaptionFormat::TimedTextV1, parse_timedtext_v1),
        (CaptionFormat::TimedTextV2, parse_timedtext_v2),
        (CaptionFormat::Json3, parse_json3),
        (CaptionFormat::TagStripped, parse_tag_stripped),
    ];

    attempts.iter().find_map(|(format, parse)| {
        parse(payload)
            .filter(|text| is_meaningful(text))
            .map(|text| (*format, text))
    })
}

/// Non-empty and containing at least one letter or digit
fn is_meaningful(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

fn collect_elements(payload: &str, element: &Regex) -> Option<String> {
    let pieces: Vec<String> = element
        .captures_iter(payload)
        .filter_map(|caps| caps.get(1))
        .map(|inner| decode_text(&any_tag().replace_all(inner.as_str(), " ")))
        .filter(|piece| !piece.is_empty())
        .collect();

    if pieces.is_empty() {
        None
    } else {
        Some(normalize_whitespace(&pieces.join(" ")))
    }
}

pub fn parse_timedtext_v1(payload: &str) -> Option<String> {
    collect_elements(payload, text_element())
}

pub fn parse_timedtext_v2(payload: &str) -> Option<String> {
    collect_elements(payload, paragraph_element())
}

pub fn parse_json3(payload: &str) -> Option<String> {
    let parsed: Json3Payload = serde_json::from_str(payload.trim()).ok()?;
    let text = parsed
        .events
        .iter()
        .flat_map(|event| event.segs.iter())
        .map(|seg| seg.utf8.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let text = normalize_whitespace(&decode_text(&text));
    (!text.is_empty()).then_some(text)
}

/// Last resort: drop tags, WebVTT headers and cue timing lines
pub fn parse_tag_stripped(payload: &str) -> Option<String> {
    // Structured JSON that the event parser rejected is not prose
    if serde_json::from_str::<serde_json::Value>(payload.trim()).is_ok() {
        return None;
    }

    let without_tags = any_tag().replace_all(payload, " ");
    let kept: Vec<&str> = without_tags
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.eq_ignore_ascii_case("webvtt") && !line.contains("-->"))
        .filter(|line| !line.chars().all(|c| c.is_ascii_digit()))
        .collect();

    let text = normalize_whitespace(&decode_text(&kept.join(" ")));
    (!text.is_empty()).then_some(text)
}

/// Decode entity references and literal `\n` markers.
///
/// Payloads are sometimes double-escaped (`&amp;#39;`), so decoding runs until
/// the text stops changing, at most twice.
pub fn decode_text(raw: &str) -> String {
    let mut text = raw.replace("\\n", " ").replace('\n', " ");
    for _ in 0..2 {
        let decoded = decode_entities_once(&text);
        if decoded == text {
            break;
        }
        text = decoded;
    }
    text.trim().to_string()
}

fn decode_entities_once(text: &str) -> String {
    entity()
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
