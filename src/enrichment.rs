//! Pure transformation from the canonical DB-shaped record into the wire
//! format clients expect (§4.D).

use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

use crate::db::models::Message;
use crate::reference::ReferenceTables;

/// Keys that survive pruning even when their value is null/undefined/empty.
const PROTECTED_KEYS: &[&str] = &[
    "uid",
    "message_type",
    "text",
    "matched",
    "matched_text",
    "matched_icao",
    "matched_tail",
    "matched_flight",
];

/// Exact rename map from §4.D. Our DB columns are already snake_case for
/// every field except `msg_text`/`time`, but the rename is applied generically
/// so any camelCase source key reaching this function (e.g. from a
/// hand-built JSON payload in tests) is still normalized.
const RENAME_MAP: &[(&str, &str)] = &[
    ("messageType", "message_type"),
    ("stationId", "station_id"),
    ("msg_text", "text"),
    ("time", "timestamp"),
    ("blockId", "block_id"),
    ("isResponse", "is_response"),
    ("isOnground", "is_onground"),
    ("aircraftId", "aircraft_id"),
];

static FLIGHT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Z]{2,3})(\d+)").unwrap());

fn rename_keys(map: &mut Map<String, Value>) {
    for (source, dest) in RENAME_MAP {
        if let Some(value) = map.remove(*source) {
            map.insert(dest.to_string(), value);
        }
    }
}

fn is_prunable(value: &Value) -> bool {
    matches!(value, Value::Null) || matches!(value, Value::String(s) if s.is_empty())
}

fn prune_keys(map: &mut Map<String, Value>) {
    let to_remove: Vec<String> = map
        .iter()
        .filter(|(key, value)| !PROTECTED_KEYS.contains(&key.as_str()) && is_prunable(value))
        .map(|(key, _)| key.clone())
        .collect();
    for key in to_remove {
        map.remove(&key);
    }
}

/// Project a DB-loaded `Message` into the wire-format JSON object (§4.D).
pub fn enrich_message(message: &Message, tables: &ReferenceTables) -> Value {
    let mut map = Map::new();
    map.insert("uid".to_string(), json!(message.uid));
    map.insert("message_type".to_string(), json!(message.message_type));
    map.insert("timestamp".to_string(), json!(message.timestamp));
    map.insert("station_id".to_string(), json!(message.station_id));
    map.insert("toaddr".to_string(), json!(message.toaddr));
    map.insert("fromaddr".to_string(), json!(message.fromaddr));
    map.insert("depa".to_string(), json!(message.depa));
    map.insert("dsta".to_string(), json!(message.dsta));
    map.insert("eta".to_string(), json!(message.eta));
    map.insert("gtout".to_string(), json!(message.gtout));
    map.insert("gtin".to_string(), json!(message.gtin));
    map.insert("wloff".to_string(), json!(message.wloff));
    map.insert("wlin".to_string(), json!(message.wlin));
    map.insert("lat".to_string(), json!(message.lat));
    map.insert("lon".to_string(), json!(message.lon));
    map.insert("alt".to_string(), json!(message.alt));
    map.insert("msg_text".to_string(), json!(message.msg_text));
    map.insert("libacars".to_string(), json!(message.libacars));
    map.insert("tail".to_string(), json!(message.tail));
    map.insert("flight".to_string(), json!(message.flight));
    map.insert("icao".to_string(), json!(message.icao));
    map.insert("freq".to_string(), json!(message.freq));
    map.insert("mode".to_string(), json!(message.mode));
    map.insert("label".to_string(), json!(message.label));
    map.insert("block_id".to_string(), json!(message.block_id));
    map.insert("msgno".to_string(), json!(message.msgno));
    map.insert("ack".to_string(), json!(message.ack));
    map.insert("is_response".to_string(), json!(message.is_response));
    map.insert("is_onground".to_string(), json!(message.is_onground));
    map.insert("error".to_string(), json!(message.error));
    map.insert("level".to_string(), json!(message.level));
    map.insert("aircraft_id".to_string(), json!(message.aircraft_id));

    rename_keys(&mut map);

    // ICAO: always add icao_hex containing the uppercase six-hex form.
    if let Some(icao) = &message.icao {
        map.insert("icao_hex".to_string(), json!(icao.to_uppercase()));
    }

    // Flight: IATA/ICAO/flight-number split and airline resolution.
    if let Some(flight) = &message.flight {
        if let Some(captures) = FLIGHT_RE.captures(flight) {
            let prefix = captures.get(1).unwrap().as_str();
            let digits = captures.get(2).unwrap().as_str();
            if let Some((icao, name)) = tables.resolve_airline(prefix) {
                map.insert("iata_flight".to_string(), json!(prefix));
                map.insert("icao_flight".to_string(), json!(icao));
                map.insert("flight_number".to_string(), json!(digits));
                map.insert("airline".to_string(), json!(name));
            } else {
                map.insert("flight_number".to_string(), json!(digits));
            }
        }
    }

    // Label: labels table lookup, unknown -> literal sentinel.
    if let Some(label) = &message.label {
        map.insert("label_type".to_string(), json!(tables.resolve_label(label)));
    }

    // Ground-station decoding (§1/§2 row D): resolve the short station label
    // against the reference table when it names a known HFDL/VDL-M2 ground
    // station. Absent from the §4.D contract bullet list, so the exact wire
    // key isn't fixed by spec; `station_name` is the natural counterpart to
    // the existing `station_id` column.
    if let Some(station_id) = &message.station_id {
        if let Some(station) = tables.resolve_ground_station(station_id) {
            map.insert("station_name".to_string(), json!(station.name));
        }
    }

    prune_keys(&mut map);

    annotate_decoded_text(&mut map);

    Value::Object(map)
}

/// Decoder annotation (§4.D): if a text field exists and `decodedText` is
/// not already present, attach a best-effort structured decode. This crate
/// does not vendor a full libacars-equivalent decode table, so the decode
/// is always `partial` when it fires at all; failures (no recognizable
/// structure) are silent, never thrown, per spec.
fn annotate_decoded_text(map: &mut Map<String, Value>) {
    if map.contains_key("decodedText") {
        return;
    }
    let Some(text) = map.get("text").and_then(|v| v.as_str()) else {
        return;
    };
    if text.trim().is_empty() {
        return;
    }

    let formatted = vec![json!({"label": "Description", "value": summarize(text)})];

    map.insert(
        "decodedText".to_string(),
        json!({
            "decoder": {"name": "acarshub-core", "decodeLevel": "partial"},
            "formatted": formatted,
        }),
    );
}

fn summarize(text: &str) -> String {
    const MAX_CHARS: usize = 64;
    if text.chars().count() <= MAX_CHARS {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(MAX_CHARS).collect();
        format!("{truncated}...")
    }
}

/// Batch helper: map each message individually; empty input -> empty array.
pub fn enrich_batch(messages: &[Message], tables: &ReferenceTables) -> Vec<Value> {
    messages.iter().map(|m| enrich_message(m, tables)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message() -> Message {
        Message {
            id: 1,
            uid: "abc123".to_string(),
            message_type: "ACARS".to_string(),
            timestamp: 1700000000,
            station_id: Some("KSFO1".to_string()),
            toaddr: None,
            fromaddr: None,
            depa: Some("SFO".to_string()),
            dsta: Some("".to_string()),
            eta: None,
            gtout: None,
            gtin: None,
            wloff: None,
            wlin: None,
            lat: None,
            lon: None,
            alt: None,
            msg_text: Some("hello".to_string()),
            libacars: None,
            tail: Some("N123AB".to_string()),
            flight: Some("WN4899".to_string()),
            icao: Some("a1b2c3".to_string()),
            freq: Some(131.55),
            mode: None,
            label: Some("Q0".to_string()),
            block_id: None,
            msgno: None,
            ack: None,
            is_response: None,
            is_onground: None,
            error: false,
            level: None,
            aircraft_id: None,
        }
    }

    fn tables() -> ReferenceTables {
        ReferenceTables::load("")
    }

    #[test]
    fn icao_hex_is_always_uppercase() {
        let result = enrich_message(&sample_message(), &tables());
        assert_eq!(result.get("icao_hex").unwrap(), "A1B2C3");
    }

    #[test]
    fn flight_resolves_airline_via_iata_prefix() {
        let result = enrich_message(&sample_message(), &tables());
        assert_eq!(result.get("iata_flight").unwrap(), "WN");
        assert_eq!(result.get("flight_number").unwrap(), "4899");
        assert_eq!(result.get("airline").unwrap(), "Southwest Airlines");
    }

    #[test]
    fn unknown_label_yields_sentinel_string() {
        let mut msg = sample_message();
        msg.label = Some("ZZ".to_string());
        let result = enrich_message(&msg, &tables());
        assert_eq!(result.get("label_type").unwrap(), "Unknown Message Label");
    }

    #[test]
    fn empty_string_values_are_pruned_but_protected_keys_survive() {
        let result = enrich_message(&sample_message(), &tables());
        assert!(result.get("dsta").is_none());
        assert!(result.get("uid").is_some());
        assert!(result.get("message_type").is_some());
    }

    #[test]
    fn unknown_flight_prefix_keeps_digits_without_airline_fields() {
        let mut msg = sample_message();
        msg.flight = Some("ZZ9999".to_string());
        let result = enrich_message(&msg, &tables());
        assert_eq!(result.get("flight_number").unwrap(), "9999");
        assert!(result.get("airline").is_none());
    }

    #[test]
    fn known_station_id_resolves_station_name() {
        let mut msg = sample_message();
        msg.station_id = Some("SFO".to_string());
        let result = enrich_message(&msg, &tables());
        assert_eq!(result.get("station_name").unwrap(), "San Francisco");
    }

    #[test]
    fn unknown_station_id_has_no_station_name() {
        let mut msg = sample_message();
        msg.station_id = Some("ZZZZ".to_string());
        let result = enrich_message(&msg, &tables());
        assert!(result.get("station_name").is_none());
    }

    #[test]
    fn batch_helper_maps_individually_and_empty_input_is_empty() {
        let tables = tables();
        assert!(enrich_batch(&[], &tables).is_empty());
        let batch = enrich_batch(&[sample_message()], &tables);
        assert_eq!(batch.len(), 1);
    }
}
