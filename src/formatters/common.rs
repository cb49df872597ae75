//! Shared helpers and the canonical in-memory record produced by every
//! per-transport normalizer (§4.C).

use serde_json::Value;

/// Canonical record shared by all five normalizers, before enrichment (§4.D)
/// and before a `uid` is assigned at insert time.
#[derive(Debug, Clone, Default)]
pub struct CanonicalMessage {
    pub message_type: String,
    pub timestamp: i64,
    pub station_id: Option<String>,
    pub toaddr: Option<i64>,
    pub fromaddr: Option<i64>,
    pub depa: Option<String>,
    pub dsta: Option<String>,
    pub eta: Option<String>,
    pub gtout: Option<String>,
    pub gtin: Option<String>,
    pub wloff: Option<String>,
    pub wlin: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    pub msg_text: Option<String>,
    pub libacars: Option<String>,
    pub tail: Option<String>,
    pub flight: Option<String>,
    pub icao: Option<String>,
    pub freq: Option<f64>,
    pub mode: Option<String>,
    pub label: Option<String>,
    pub block_id: Option<String>,
    pub msgno: Option<String>,
    pub ack: Option<String>,
    pub is_response: Option<bool>,
    /// Literal upstream value (`0`/`2`, not just `0`/`1`), preserved verbatim
    /// per the source decoders' own convention rather than coerced to bool.
    pub is_onground: Option<i64>,
    pub is_error: bool,
    pub level: Option<f64>,
}

/// Recursively count boolean `err: true` fields, top-level only within
/// arrays (§4.C).
pub fn count_errors(value: &Value) -> u32 {
    match value {
        Value::Object(map) => {
            let mut count = 0;
            for (key, val) in map {
                if key == "err" {
                    if let Value::Bool(true) = val {
                        count += 1;
                    }
                } else {
                    count += count_errors(val);
                }
            }
            count
        }
        Value::Array(items) => items
            .iter()
            .map(|item| if matches!(item, Value::Object(_)) { count_errors(item) } else { 0 })
            .sum(),
        _ => 0,
    }
}

/// ICAO normalization (§4.C): numeric -> `%06X`; hex string -> uppercase in
/// place; decimal string -> parse then hex.
pub fn normalize_icao(raw: &Value) -> Option<String> {
    match raw {
        Value::Number(n) => n.as_u64().map(|v| format!("{:06X}", v)),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if s.chars().all(|c| c.is_ascii_hexdigit()) && s.chars().any(|c| c.is_ascii_alphabetic()) {
                Some(s.to_uppercase())
            } else if let Ok(n) = s.parse::<u64>() {
                Some(format!("{:06X}", n))
            } else {
                Some(s.to_uppercase())
            }
        }
        _ => None,
    }
}

/// Remove embedded `.` separators from a tail number.
pub fn clean_tail(raw: &str) -> String {
    raw.replace('.', "")
}

/// Replace `\x7f` (DEL) with `d` in labels.
pub fn clean_label(raw: &str) -> String {
    raw.replace('\u{7f}', "d")
}

/// Replace `\x15` (NAK) with `!` in acks.
pub fn clean_ack(raw: &str) -> String {
    raw.replace('\u{15}', "!")
}

pub fn value_as_str(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn value_as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_nested_err_true_fields() {
        let payload = json!({
            "vdl2": {
                "app": {"err": false},
                "avlc": {
                    "acars": {"err": true},
                },
            },
            "extra": [{"err": true}, {"err": false}],
        });
        assert_eq!(count_errors(&payload), 3);
    }

    #[test]
    fn icao_numeric_formats_as_six_hex() {
        assert_eq!(normalize_icao(&json!(10)), Some("00000A".to_string()));
    }

    #[test]
    fn icao_hex_string_uppercased_in_place() {
        assert_eq!(normalize_icao(&json!("a1b2c3")), Some("A1B2C3".to_string()));
    }

    #[test]
    fn icao_decimal_string_parsed_then_hexed() {
        assert_eq!(normalize_icao(&json!("171")), Some("0000AB".to_string()));
    }

    #[test]
    fn tail_strips_dots() {
        assert_eq!(clean_tail("N.123.AB"), "N123AB");
    }
}
