//! Parsing of one turn's raw model output.
//!
//! The model is instructed to emit a line-oriented micro-format: one
//! optional metadata object, then one compact JSON array per segment,
//! terminated by a sentinel token. Real model output is messier than
//! that, so parsing is deliberately forgiving: unrecognized lines are
//! skipped, and a trailing unparseable fragment is treated as truncation
//! rather than an error.

use serde_json::Value;

use crate::models::Segment;

/// Sentinel the model emits when the transcript is complete.
pub const END_TOKEN: &str = "[END]";

/// Everything extracted from one turn's text.
#[derive(Debug, Default)]
pub struct TurnParse {
    pub segments: Vec<Segment>,
    /// Metadata object(s) seen this turn (detected speakers, language).
    pub metadata: serde_json::Map<String, Value>,
    /// A trailing line looked like JSON but did not parse: the response
    /// was cut off mid-line by the output limit.
    pub truncated: bool,
    pub end_token: bool,
}

/// Parse a turn's raw text into segments, metadata, and control flags.
pub fn parse_turn(text: &str) -> TurnParse {
    let mut parse = TurnParse::default();

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("```") {
            continue;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(value) => handle_value(value, &mut parse),
            Err(_) => {
                if line.contains(END_TOKEN) {
                    parse.end_token = true;
                } else if line.starts_with('[') || line.starts_with('{') {
                    parse.truncated = true;
                    tracing::debug!("truncated JSON line (will continue): {:.100}", line);
                } else {
                    tracing::debug!("skipping non-JSON line: {:.100}", line);
                }
            }
        }
    }

    parse
}

fn handle_value(value: Value, parse: &mut TurnParse) {
    match value {
        Value::String(s) if s == END_TOKEN => {
            parse.end_token = true;
        }
        Value::Object(map) => {
            let is_end = [map.get("speaker_id"), map.get("text")]
                .iter()
                .any(|v| matches!(v, Some(Value::String(s)) if s == END_TOKEN));
            if is_end {
                parse.end_token = true;
                return;
            }

            if map.contains_key("speakers") || map.contains_key("language") {
                for (key, val) in map {
                    parse.metadata.insert(key, val);
                }
                return;
            }

            // Some models ignore the compact-array instruction and emit
            // full objects; accept them when they deserialize as segments.
            match serde_json::from_value::<Segment>(Value::Object(map)) {
                Ok(segment) => parse.segments.push(segment),
                Err(_) => tracing::debug!("skipping unrecognized JSON object"),
            }
        }
        Value::Array(items) if items.len() >= 4 => {
            if let Some(segment) = segment_from_array(&items) {
                parse.segments.push(segment);
            } else {
                tracing::debug!("skipping malformed segment array");
            }
        }
        _ => {
            tracing::debug!("skipping unrecognized JSON structure");
        }
    }
}

/// `[start_time, end_time, speaker, text, confidence?]`
fn segment_from_array(items: &[Value]) -> Option<Segment> {
    let start_time = items[0].as_f64()?;
    let end_time = items[1].as_f64()?;
    let speaker_id = items[2].as_str()?.to_string();
    let text = items[3].as_str()?.to_string();
    let confidence = items.get(4).and_then(Value::as_f64);

    Some(Segment {
        start_time,
        end_time,
        speaker_id,
        text,
        confidence,
    })
}
