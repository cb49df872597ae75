//! Inmarsat/IMS-L normalizer: two source decoders (SatDump, JAERO), both
//! routed here by the sentinel dispatcher (§4.C).

use serde_json::Value;

use super::common::*;
use super::{CanonicalMessage, FormatError};

pub fn normalize_satdump(raw: &Value) -> Result<CanonicalMessage, FormatError> {
    let acars = raw.get("acars").unwrap_or(raw);

    let timestamp = raw
        .get("timestamp")
        .and_then(value_as_i64)
        .unwrap_or_else(|| crate::db::now_unix());

    let tail = acars.get("tail").and_then(|v| v.as_str()).map(clean_tail);
    let label = acars.get("label").and_then(|v| v.as_str()).map(clean_label);
    let error_count = count_errors(raw);

    Ok(CanonicalMessage {
        message_type: "IMS-L".to_string(),
        timestamp,
        station_id: Some("SatDump".to_string()),
        toaddr: None,
        fromaddr: None,
        depa: acars.get("depa").and_then(|v| v.as_str()).map(str::to_string),
        dsta: acars.get("dsta").and_then(|v| v.as_str()).map(str::to_string),
        eta: None,
        gtout: None,
        gtin: None,
        wloff: None,
        wlin: None,
        lat: None,
        lon: None,
        alt: None,
        msg_text: acars.get("text").and_then(|v| v.as_str()).map(str::to_string),
        libacars: None,
        tail,
        flight: acars.get("flight").and_then(|v| v.as_str()).map(str::to_string),
        icao: acars.get("icao").and_then(normalize_icao),
        freq: raw.get("freq").and_then(value_as_f64),
        mode: acars.get("mode").and_then(|v| v.as_str()).map(str::to_string),
        label,
        block_id: acars.get("block_id").and_then(|v| v.as_str()).map(str::to_string),
        msgno: acars.get("msgno").and_then(|v| v.as_str()).map(str::to_string),
        ack: acars.get("ack").and_then(|v| v.as_str()).map(clean_ack),
        is_response: None,
        is_onground: None,
        is_error: error_count > 0,
        level: raw.get("level").and_then(value_as_f64),
    })
}

pub fn normalize_jaero(raw: &Value) -> Result<CanonicalMessage, FormatError> {
    let timestamp = raw
        .get("timestamp")
        .and_then(value_as_i64)
        .unwrap_or_else(|| crate::db::now_unix());

    let tail = raw.get("tail").and_then(|v| v.as_str()).map(clean_tail);
    let label = raw.get("label").and_then(|v| v.as_str()).map(clean_label);
    let error_count = count_errors(raw);

    let more_to_come = raw.get("more_to_come").and_then(value_as_bool);

    Ok(CanonicalMessage {
        message_type: "IMS-L".to_string(),
        timestamp,
        station_id: Some("JAERO".to_string()),
        toaddr: None,
        fromaddr: None,
        depa: None,
        dsta: None,
        eta: None,
        gtout: None,
        gtin: None,
        wloff: None,
        wlin: None,
        lat: None,
        lon: None,
        alt: None,
        msg_text: raw.get("text").and_then(|v| v.as_str()).map(str::to_string),
        libacars: None,
        tail,
        flight: raw.get("flight").and_then(|v| v.as_str()).map(str::to_string),
        icao: raw.get("icao").and_then(normalize_icao),
        freq: raw.get("freq").and_then(value_as_f64),
        mode: raw.get("mode").and_then(|v| v.as_str()).map(str::to_string),
        label,
        block_id: raw.get("block_id").and_then(|v| v.as_str()).map(str::to_string),
        msgno: raw.get("msgno").and_then(|v| v.as_str()).map(str::to_string),
        ack: raw.get("ack").and_then(|v| v.as_str()).map(clean_ack),
        // `more_to_come` boolean inverted to produce `end` (§4.C); we don't
        // carry a distinct `end` field on CanonicalMessage, so a message
        // with more parts pending is flagged onground=None and left for the
        // multi-part detector in the enrichment stage to assemble.
        is_response: more_to_come.map(|m| !m),
        is_onground: None,
        is_error: error_count > 0,
        level: raw.get("level").and_then(value_as_f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn satdump_requires_acars_msg_name_upstream() {
        let payload = json!({
            "source": {"app": {"name": "SatDump"}},
            "msg_name": "ACARS",
            "timestamp": 1700000000,
            "acars": {"tail": "N123AB", "flight": "UA1", "text": "hi"}
        });
        let msg = normalize_satdump(&payload).unwrap();
        assert_eq!(msg.message_type, "IMS-L");
        assert_eq!(msg.station_id.as_deref(), Some("SatDump"));
    }

    #[test]
    fn jaero_inverts_more_to_come_for_end() {
        let payload = json!({"app": {"name": "JAERO"}, "more_to_come": true, "timestamp": 1});
        let msg = normalize_jaero(&payload).unwrap();
        assert_eq!(msg.is_response, Some(false));
    }
}
