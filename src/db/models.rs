//! Queryable/Insertable structs mirroring `schema.rs` (§3).

use diesel::prelude::*;

use super::schema::{alert_matches, alert_stats, connection_status, ignore_alert_terms, messages, timeseries_stats};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Message {
    pub id: i64,
    pub uid: String,
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
    /// Literal upstream value (`0`/`2`, not just `0`/`1`), preserved verbatim.
    pub is_onground: Option<i64>,
    pub error: bool,
    pub level: Option<f64>,
    pub aircraft_id: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub uid: String,
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
    /// Literal upstream value (`0`/`2`, not just `0`/`1`), preserved verbatim.
    pub is_onground: Option<i64>,
    pub error: bool,
    pub level: Option<f64>,
    pub aircraft_id: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = alert_stats)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AlertTerm {
    pub term: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = ignore_alert_terms)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct IgnoreAlertTerm {
    pub term: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = alert_matches)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AlertMatch {
    pub id: i64,
    pub message_uid: String,
    pub term: String,
    pub match_type: String,
    pub matched_at: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = alert_matches)]
pub struct NewAlertMatch {
    pub message_uid: String,
    pub term: String,
    pub match_type: String,
    pub matched_at: i64,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = timeseries_stats)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TimeseriesRow {
    pub id: i64,
    pub timestamp: i64,
    pub resolution: String,
    pub acars: i64,
    pub vdlm: i64,
    pub hfdl: i64,
    pub imsl: i64,
    pub irdm: i64,
    pub total: i64,
    pub error: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = timeseries_stats)]
pub struct NewTimeseriesRow {
    pub timestamp: i64,
    pub resolution: String,
    pub acars: i64,
    pub vdlm: i64,
    pub hfdl: i64,
    pub imsl: i64,
    pub irdm: i64,
    pub total: i64,
    pub error: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Queryable, Selectable, AsChangeset)]
#[diesel(table_name = connection_status)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConnectionStatusRow {
    pub decoder_type: String,
    pub enabled: bool,
    pub connected: bool,
    pub last_message_at: Option<i64>,
    pub consecutive_failures: i32,
}
