//! Iridium (IRDM) normalizer, dispatched on `app.name == "iridium-toolkit"`
//! (§4.C).

use serde_json::Value;

use super::common::*;
use super::{CanonicalMessage, FormatError};

const CHANNEL_GRID_HZ: f64 = 8_333.0;

/// Round to the nearest 8.333 kHz channel (the Iridium channel grid).
fn round_to_channel_grid(hz: f64) -> f64 {
    (hz / CHANNEL_GRID_HZ).round() * CHANNEL_GRID_HZ
}

pub fn normalize(raw: &Value) -> Result<CanonicalMessage, FormatError> {
    let timestamp = raw
        .get("timestamp")
        .and_then(value_as_i64)
        .unwrap_or_else(|| crate::db::now_unix());

    let tail = raw.get("tail").and_then(|v| v.as_str()).map(clean_tail);
    let label = raw.get("label").and_then(|v| v.as_str()).map(clean_label);
    let error_count = count_errors(raw);

    let freq = raw.get("freq").and_then(value_as_f64).map(round_to_channel_grid);

    Ok(CanonicalMessage {
        message_type: "IRDM".to_string(),
        timestamp,
        station_id: Some("iridium-toolkit".to_string()),
        toaddr: None,
        fromaddr: None,
        depa: None,
        dsta: None,
        eta: None,
        gtout: None,
        gtin: None,
        wloff: None,
        wlin: None,
        lat: raw.get("lat").and_then(value_as_f64),
        lon: raw.get("lon").and_then(value_as_f64),
        alt: None,
        msg_text: raw.get("text").and_then(|v| v.as_str()).map(str::to_string),
        libacars: None,
        tail,
        flight: raw.get("flight").and_then(|v| v.as_str()).map(str::to_string),
        icao: raw.get("icao").and_then(normalize_icao),
        freq,
        mode: raw.get("mode").and_then(|v| v.as_str()).map(str::to_string),
        label,
        block_id: raw.get("block_id").and_then(|v| v.as_str()).map(str::to_string),
        msgno: raw.get("msgno").and_then(|v| v.as_str()).map(str::to_string),
        ack: raw.get("ack").and_then(|v| v.as_str()).map(clean_ack),
        is_response: None,
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
    fn rounds_frequency_to_channel_grid() {
        let payload = json!({"app": {"name": "iridium-toolkit"}, "freq": 1626270833.0, "timestamp": 1});
        let msg = normalize(&payload).unwrap();
        // 1626270833 / 8333 = 195160.004..., rounds to 195160 * 8333 = 1626270...
        assert_eq!(msg.freq, Some(round_to_channel_grid(1626270833.0)));
    }

    #[test]
    fn grid_rounding_is_a_multiple_of_the_channel_width() {
        let rounded = round_to_channel_grid(1626274000.0);
        let channel_index = rounded / CHANNEL_GRID_HZ;
        assert!((channel_index - channel_index.round()).abs() < 1e-6);
    }
}
