//! Raw ACARS normalizer — the router's fallback when no other sentinel
//! structure matches (§4.C).

use serde_json::Value;

use super::common::*;
use super::{CanonicalMessage, FormatError};

pub fn normalize(raw: &Value) -> Result<CanonicalMessage, FormatError> {
    let timestamp = raw
        .get("timestamp")
        .and_then(value_as_i64)
        .unwrap_or_else(|| crate::db::now_unix());

    let tail = raw.get("tail").and_then(|v| v.as_str()).map(clean_tail);
    let label = raw.get("label").and_then(|v| v.as_str()).map(clean_label);
    let ack = raw.get("ack").and_then(|v| v.as_str()).map(clean_ack);

    let error_count = count_errors(raw);
    let explicit_error = raw.get("error").and_then(value_as_bool).unwrap_or(false);

    Ok(CanonicalMessage {
        message_type: "ACARS".to_string(),
        timestamp,
        station_id: raw.get("station_id").and_then(|v| v.as_str()).map(str::to_string),
        toaddr: raw.get("toaddr").and_then(value_as_i64),
        fromaddr: raw.get("fromaddr").and_then(value_as_i64),
        depa: raw.get("depa").and_then(|v| v.as_str()).map(str::to_string),
        dsta: raw.get("dsta").and_then(|v| v.as_str()).map(str::to_string),
        eta: raw.get("eta").and_then(|v| v.as_str()).map(str::to_string),
        gtout: raw.get("gtout").and_then(|v| v.as_str()).map(str::to_string),
        gtin: raw.get("gtin").and_then(|v| v.as_str()).map(str::to_string),
        wloff: raw.get("wloff").and_then(|v| v.as_str()).map(str::to_string),
        wlin: raw.get("wlin").and_then(|v| v.as_str()).map(str::to_string),
        lat: raw.get("lat").and_then(value_as_f64),
        lon: raw.get("lon").and_then(value_as_f64),
        alt: raw.get("alt").and_then(value_as_f64),
        msg_text: raw.get("text").and_then(|v| v.as_str()).map(str::to_string),
        libacars: raw.get("libacars").map(|v| v.to_string()),
        tail,
        flight: raw.get("flight").and_then(|v| v.as_str()).map(str::to_string),
        icao: raw.get("icao").map(normalize_icao).flatten(),
        freq: raw.get("freq").and_then(value_as_f64),
        mode: raw.get("mode").and_then(|v| v.as_str()).map(str::to_string),
        label,
        block_id: raw.get("block_id").and_then(|v| v.as_str()).map(str::to_string),
        msgno: raw.get("msgno").and_then(|v| v.as_str()).map(str::to_string),
        ack,
        is_response: raw.get("is-response").and_then(value_as_bool),
        is_onground: raw.get("is-onground").and_then(value_as_i64),
        is_error: explicit_error || error_count > 0,
        level: raw.get("level").and_then(value_as_f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_core_fields() {
        let payload = json!({
            "timestamp": 1700000000,
            "station_id": "KSFO1",
            "freq": 131.550,
            "level": -12.5,
            "tail": "N.123.AB",
            "flight": "WN4899",
            "text": "hello world",
            "label": "H1",
        });
        let msg = normalize(&payload).unwrap();
        assert_eq!(msg.message_type, "ACARS");
        assert_eq!(msg.tail.as_deref(), Some("N123AB"));
        assert_eq!(msg.flight.as_deref(), Some("WN4899"));
        assert_eq!(msg.msg_text.as_deref(), Some("hello world"));
        assert!(!msg.is_error);
    }

    #[test]
    fn counts_nested_errors_when_flag_absent() {
        let payload = json!({"timestamp": 1, "libacars": {"err": true}});
        let msg = normalize(&payload).unwrap();
        assert!(msg.is_error);
    }

    #[test]
    fn is_onground_literal_two_is_preserved_not_coerced_to_boolean() {
        let payload = json!({"timestamp": 1, "is-onground": 2});
        let msg = normalize(&payload).unwrap();
        assert_eq!(msg.is_onground, Some(2));
    }
}
