//! VDL-M2 normalizer, dispatched on the `vdl2.*` sentinel (§4.C).

use serde_json::Value;

use super::common::*;
use super::{CanonicalMessage, FormatError};

/// kHz -> MHz, at least one decimal place of precision retained.
fn freq_khz_to_mhz(khz: f64) -> f64 {
    khz / 1000.0
}

pub fn normalize(raw: &Value) -> Result<CanonicalMessage, FormatError> {
    let vdl2 = raw
        .get("vdl2")
        .ok_or_else(|| FormatError::Malformed("missing vdl2 object".to_string()))?;

    let acars = vdl2.pointer("/avlc/acars");

    let timestamp = vdl2
        .pointer("/t/sec")
        .and_then(value_as_i64)
        .unwrap_or_else(|| crate::db::now_unix());

    let freq = vdl2.get("freq").and_then(value_as_f64).map(freq_khz_to_mhz);

    let tail = acars
        .and_then(|a| a.get("reg"))
        .and_then(|v| v.as_str())
        .map(clean_tail);
    let label = acars
        .and_then(|a| a.get("label"))
        .and_then(|v| v.as_str())
        .map(clean_label);
    let ack = acars
        .and_then(|a| a.get("ack"))
        .and_then(|v| v.as_str())
        .map(clean_ack);

    let error_count = count_errors(raw);
    let explicit_error = acars.and_then(|a| a.get("err")).and_then(value_as_bool).unwrap_or(false);

    Ok(CanonicalMessage {
        message_type: "VDL-M2".to_string(),
        timestamp,
        station_id: vdl2.get("station").and_then(|v| v.as_str()).map(str::to_string),
        toaddr: vdl2.pointer("/avlc/dst/addr").and_then(value_as_i64),
        fromaddr: vdl2.pointer("/avlc/src/addr").and_then(value_as_i64),
        depa: acars.and_then(|a| a.get("depa")).and_then(|v| v.as_str()).map(str::to_string),
        dsta: acars.and_then(|a| a.get("dsta")).and_then(|v| v.as_str()).map(str::to_string),
        eta: acars.and_then(|a| a.get("eta")).and_then(|v| v.as_str()).map(str::to_string),
        gtout: None,
        gtin: None,
        wloff: None,
        wlin: None,
        lat: None,
        lon: None,
        alt: None,
        msg_text: acars
            .and_then(|a| a.get("msg_text"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        libacars: vdl2.get("libacars").map(|v| v.to_string()),
        tail,
        flight: acars.and_then(|a| a.get("flight")).and_then(|v| v.as_str()).map(str::to_string),
        icao: None,
        freq,
        mode: acars.and_then(|a| a.get("mode")).and_then(|v| v.as_str()).map(str::to_string),
        label,
        block_id: acars.and_then(|a| a.get("blk_id")).and_then(|v| v.as_str()).map(str::to_string),
        msgno: acars
            .and_then(|a| a.get("msg_num"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        ack,
        is_response: None,
        is_onground: None,
        is_error: explicit_error || error_count > 0,
        level: vdl2.get("sig_level").and_then(value_as_f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_khz_to_mhz() {
        let payload = json!({
            "vdl2": {
                "freq": 136975.0,
                "station": "vdlm2-1",
                "avlc": {"acars": {"reg": "N.123.AB", "flight": "WN4899", "msg_text": "hi"}}
            }
        });
        let msg = normalize(&payload).unwrap();
        assert_eq!(msg.message_type, "VDL-M2");
        assert_eq!(msg.freq, Some(136.975));
        assert_eq!(msg.tail.as_deref(), Some("N123AB"));
    }
}
