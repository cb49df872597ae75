//! HFDL normalizer, dispatched on the `hfdl.*` sentinel (§4.C).

use serde_json::Value;

use super::common::*;
use super::{CanonicalMessage, FormatError};

/// Hz -> MHz to three decimals, trailing zeros trimmed (§4.C). Returned as
/// `f64`; the trimming only matters for the formatted string the wire layer
/// may later render, so this rounds rather than producing a display string.
fn freq_hz_to_mhz(hz: f64) -> f64 {
    (hz / 1_000_000.0 * 1000.0).round() / 1000.0
}

pub fn normalize(raw: &Value) -> Result<CanonicalMessage, FormatError> {
    let hfdl = raw
        .get("hfdl")
        .ok_or_else(|| FormatError::Malformed("missing hfdl object".to_string()))?;

    let lpdu = hfdl.get("lpdu");
    let acars = lpdu.and_then(|l| l.pointer("/hfnpdu/acars"));

    let timestamp = hfdl
        .pointer("/t/sec")
        .and_then(value_as_i64)
        .unwrap_or_else(|| crate::db::now_unix());

    let freq = hfdl.get("freq").and_then(value_as_f64).map(freq_hz_to_mhz);

    let tail = acars
        .and_then(|a| a.get("reg"))
        .and_then(|v| v.as_str())
        .map(clean_tail);
    let label = acars
        .and_then(|a| a.get("label"))
        .and_then(|v| v.as_str())
        .map(clean_label);

    let error_count = count_errors(raw);
    let explicit_error = hfdl.get("err").and_then(value_as_bool).unwrap_or(false);

    Ok(CanonicalMessage {
        message_type: "HFDL".to_string(),
        timestamp,
        station_id: hfdl
            .pointer("/ground_station/name")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        toaddr: None,
        fromaddr: lpdu.and_then(|l| l.pointer("/src/ac_info/icao")).and_then(value_as_i64),
        depa: None,
        dsta: None,
        eta: None,
        gtout: None,
        gtin: None,
        wloff: None,
        wlin: None,
        lat: lpdu.and_then(|l| l.pointer("/hfnpdu/pos/lat")).and_then(value_as_f64),
        lon: lpdu.and_then(|l| l.pointer("/hfnpdu/pos/lon")).and_then(value_as_f64),
        alt: None,
        msg_text: acars
            .and_then(|a| a.get("msg_text"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        libacars: hfdl.get("libacars").map(|v| v.to_string()),
        tail,
        flight: acars.and_then(|a| a.get("flight")).and_then(|v| v.as_str()).map(str::to_string),
        icao: lpdu
            .and_then(|l| l.pointer("/src/ac_info/icao"))
            .and_then(normalize_icao),
        freq,
        mode: acars.and_then(|a| a.get("mode")).and_then(|v| v.as_str()).map(str::to_string),
        label,
        block_id: acars.and_then(|a| a.get("blk_id")).and_then(|v| v.as_str()).map(str::to_string),
        msgno: acars
            .and_then(|a| a.get("msg_num"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        ack: None,
        is_response: None,
        is_onground: None,
        is_error: explicit_error || error_count > 0,
        level: hfdl.get("sig_level").and_then(value_as_f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_hz_to_mhz_three_decimals() {
        let payload = json!({"hfdl": {"freq": 8942000.0}});
        let msg = normalize(&payload).unwrap();
        assert_eq!(msg.freq, Some(8.942));
    }

    #[test]
    fn rounds_to_three_decimal_places() {
        let payload = json!({"hfdl": {"freq": 8957000.0}});
        let msg = normalize(&payload).unwrap();
        assert_eq!(msg.freq, Some(8.957));
    }
}
