//! Per-transport JSON normalizers and the sentinel-based router (§4.C).

pub mod acars;
pub mod common;
pub mod hfdl;
pub mod imsl;
pub mod irdm;
pub mod vdlm2;

pub use common::CanonicalMessage;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("payload did not match any known decoder shape")]
    UnrecognizedShape,
    #[error("non-ACARS SatDump payload dropped (msg_name={0:?})")]
    DroppedSatDumpNonAcars(Option<String>),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Examine the input JSON and dispatch to one of five format-specific
/// normalizers based on sentinel structure (§4.C). Returns `Ok(None)` for
/// payloads that are intentionally dropped (non-ACARS SatDump).
pub fn normalize(raw: &Value) -> Result<Option<CanonicalMessage>, FormatError> {
    if raw.get("vdl2").is_some() {
        return vdlm2::normalize(raw).map(Some);
    }
    if raw.get("hfdl").is_some() {
        return hfdl::normalize(raw).map(Some);
    }

    let source_app_name = raw
        .pointer("/source/app/name")
        .and_then(|v| v.as_str());
    if source_app_name == Some("SatDump") {
        let msg_name = raw.get("msg_name").and_then(|v| v.as_str());
        if msg_name == Some("ACARS") {
            return imsl::normalize_satdump(raw).map(Some);
        }
        return Err(FormatError::DroppedSatDumpNonAcars(msg_name.map(str::to_string)));
    }

    let app_name = raw.pointer("/app/name").and_then(|v| v.as_str());
    if app_name == Some("JAERO") {
        return imsl::normalize_jaero(raw).map(Some);
    }
    if app_name == Some("iridium-toolkit") {
        return irdm::normalize(raw).map(Some);
    }

    acars::normalize(raw).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn routes_vdl2_sentinel() {
        let payload = json!({"vdl2": {"avlc": {"acars": {"freq": 136975000.0}}}});
        let result = normalize(&payload).unwrap().unwrap();
        assert_eq!(result.message_type, "VDL-M2");
    }

    #[test]
    fn routes_hfdl_sentinel() {
        let payload = json!({"hfdl": {"freq": 8942000, "lpdu": {}}});
        let result = normalize(&payload).unwrap().unwrap();
        assert_eq!(result.message_type, "HFDL");
    }

    #[test]
    fn drops_non_acars_satdump_payloads() {
        let payload = json!({"source": {"app": {"name": "SatDump"}}, "msg_name": "Other"});
        assert!(matches!(normalize(&payload), Err(FormatError::DroppedSatDumpNonAcars(_))));
    }

    #[test]
    fn routes_jaero_sentinel() {
        let payload = json!({"app": {"name": "JAERO"}, "freq": 1.625e9});
        let result = normalize(&payload).unwrap().unwrap();
        assert_eq!(result.message_type, "IMS-L");
    }

    #[test]
    fn routes_iridium_toolkit_sentinel() {
        let payload = json!({"app": {"name": "iridium-toolkit"}, "freq": 1626270833.0});
        let result = normalize(&payload).unwrap().unwrap();
        assert_eq!(result.message_type, "IRDM");
    }

    #[test]
    fn falls_back_to_raw_acars() {
        let payload = json!({"text": "hello", "station_id": "KSFO"});
        let result = normalize(&payload).unwrap().unwrap();
        assert_eq!(result.message_type, "ACARS");
    }
}
