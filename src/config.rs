//! Configuration loaded once at startup from environment variables (and their
//! command-line equivalents). See spec §4.A and §6 for the full option list.

use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

/// Truthy token set accepted by every boolean option (case-insensitive, trimmed).
const TRUTHY: &[&str] = &[
    "1", "true", "on", "enabled", "enable", "yes", "y", "ok", "always", "set", "external",
];

pub fn parse_bool(raw: &str, default: bool) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return default;
    }
    TRUTHY.iter().any(|t| t.eq_ignore_ascii_case(trimmed))
}

fn bool_parser(raw: &str) -> Result<bool, std::convert::Infallible> {
    Ok(parse_bool(raw, false))
}

#[derive(Debug, Clone, Parser)]
#[command(name = "acarshub", about = "ACARS Hub ingest/alert/query core")]
pub struct Settings {
    #[arg(long, env = "ACARSHUB_DB", default_value = "/run/acars/messages.db")]
    pub db_path: PathBuf,

    #[arg(long, env = "DB_SAVEALL", value_parser = bool_parser, default_value_t = false)]
    pub save_all: bool,

    #[arg(long, env = "DB_SAVE_DAYS", default_value_t = 7)]
    pub db_save_days: i64,

    #[arg(long, env = "DB_ALERT_SAVE_DAYS", default_value_t = 120)]
    pub db_alert_save_days: i64,

    #[arg(long, env = "DB_BACKUP")]
    pub db_backup: Option<PathBuf>,

    #[arg(long, env = "ALLOW_REMOTE_UPDATES", value_parser = bool_parser, default_value_t = true)]
    pub allow_remote_updates: bool,

    #[arg(long, env = "ENABLE_ACARS", value_parser = bool_parser, default_value_t = true)]
    pub enable_acars: bool,
    #[arg(long, env = "ENABLE_VDLM", value_parser = bool_parser, default_value_t = true)]
    pub enable_vdlm: bool,
    #[arg(long, env = "ENABLE_HFDL", value_parser = bool_parser, default_value_t = false)]
    pub enable_hfdl: bool,
    #[arg(long, env = "ENABLE_IMSL", value_parser = bool_parser, default_value_t = false)]
    pub enable_imsl: bool,
    #[arg(long, env = "ENABLE_IRDM", value_parser = bool_parser, default_value_t = false)]
    pub enable_irdm: bool,

    #[arg(long, env = "ACARS_CONNECTIONS", default_value = "udp")]
    pub acars_connections: String,
    #[arg(long, env = "VDLM_CONNECTIONS", default_value = "udp")]
    pub vdlm_connections: String,
    #[arg(long, env = "HFDL_CONNECTIONS", default_value = "udp")]
    pub hfdl_connections: String,
    #[arg(long, env = "IMSL_CONNECTIONS", default_value = "udp")]
    pub imsl_connections: String,
    #[arg(long, env = "IRDM_CONNECTIONS", default_value = "udp")]
    pub irdm_connections: String,

    #[arg(long, env = "ENABLE_ADSB", value_parser = bool_parser, default_value_t = false)]
    pub enable_adsb: bool,
    #[arg(long, env = "ADSB_URL")]
    pub adsb_url: Option<String>,
    #[arg(long, env = "ADSB_LAT")]
    pub adsb_lat: Option<f64>,
    #[arg(long, env = "ADSB_LON")]
    pub adsb_lon: Option<f64>,
    #[arg(long, env = "DISABLE_RANGE_RINGS", value_parser = bool_parser, default_value_t = false)]
    pub disable_range_rings: bool,
    #[arg(long, env = "FLIGHT_TRACKING_URL")]
    pub flight_tracking_url: Option<String>,

    #[arg(long, env = "MIN_LOG_LEVEL", default_value = "info")]
    pub min_log_level: String,
    #[arg(long, env = "QUIET_MESSAGES", value_parser = bool_parser, default_value_t = false)]
    pub quiet_messages: bool,

    #[arg(long, env = "RRD_PATH")]
    pub rrd_path: Option<PathBuf>,

    #[arg(long, env = "HEYWHATSTHAT")]
    pub heywhatsthat_site_id: Option<String>,
    #[arg(long, env = "HEYWHATSTHAT_ALTS", default_value = "500,1000,3000,6000,12000")]
    pub heywhatsthat_alts: String,
    #[arg(long, env = "HEYWHATSTHAT_SAVE")]
    pub heywhatsthat_save: Option<PathBuf>,

    #[arg(long, env = "IATA_OVERRIDE", default_value = "")]
    pub iata_override: String,

    #[arg(long, env = "PORT", default_value_t = 1337)]
    pub port: u16,
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,
}

impl Settings {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Settings::parse()
    }

    /// Numeric log-level mapping accepted alongside named levels (2..6, matching
    /// the upstream decoder ecosystem's CRITICAL..DEBUG numbering).
    pub fn tracing_filter(&self) -> String {
        let level = match self.min_log_level.trim() {
            "2" => "error",
            "3" => "warn",
            "4" => "info",
            "5" => "debug",
            "6" => "trace",
            other => other,
        };
        level.to_string()
    }

    pub fn heywhatsthat_altitudes(&self) -> Vec<u32> {
        self.heywhatsthat_alts
            .split(',')
            .filter_map(|tok| tok.trim().parse::<u32>().ok())
            .collect()
    }
}

/// A decoder transport, parsed from a connection descriptor token (§3, §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenType {
    Udp,
    Tcp,
    Zmq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub listen_type: ListenType,
    pub host: String,
    pub port: u16,
}

/// Legacy default UDP ports for the bare `udp` token, one per decoder.
pub fn legacy_udp_port(decoder: &str) -> u16 {
    match decoder {
        "acars" => 15550,
        "vdlm" | "vdlm2" => 15555,
        "hfdl" => 15556,
        "imsl" => 15557,
        "irdm" => 15558,
        _ => 0,
    }
}

/// Parse a comma-separated descriptor string into connection descriptors.
///
/// Each token is either the literal `udp` (UDP bind on all interfaces, legacy
/// default port for `decoder_name`) or `<scheme>://<host>:<port>` with
/// scheme in {udp, tcp, zmq} and port in 1..=65535. Malformed tokens are
/// skipped with a warning; an all-malformed result yields an empty vec, which
/// the caller must treat as "disable this decoder" (§4.A).
pub fn parse_descriptors(raw: &str, decoder_name: &str) -> Vec<ConnectionDescriptor> {
    let mut out = Vec::new();
    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if token.eq_ignore_ascii_case("udp") {
            out.push(ConnectionDescriptor {
                listen_type: ListenType::Udp,
                host: "0.0.0.0".to_string(),
                port: legacy_udp_port(decoder_name),
            });
            continue;
        }
        match parse_scheme_token(token) {
            Some(desc) => out.push(desc),
            None => warn!(
                "Skipping malformed {} connection descriptor token: {:?}",
                decoder_name, token
            ),
        }
    }
    if out.is_empty() {
        tracing::error!(
            "No usable connection descriptors for {}; decoder disabled",
            decoder_name
        );
    }
    out
}

fn parse_scheme_token(token: &str) -> Option<ConnectionDescriptor> {
    let (scheme, rest) = token.split_once("://")?;
    let listen_type = match scheme.to_ascii_lowercase().as_str() {
        "udp" => ListenType::Udp,
        "tcp" => ListenType::Tcp,
        "zmq" => ListenType::Zmq,
        _ => return None,
    };
    let (host, port_str) = rest.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    let port: u16 = port_str.parse().ok()?;
    if port == 0 {
        return None;
    }
    Some(ConnectionDescriptor {
        listen_type,
        host: host.to_string(),
        port,
    })
}

/// Parsed `IATA_OVERRIDE` table: `IATA|ICAO|Name;IATA|ICAO|Name;...`.
#[derive(Debug, Clone, Default)]
pub struct IataOverride {
    pub entries: std::collections::HashMap<String, (String, String)>,
}

impl IataOverride {
    pub fn parse(raw: &str) -> Self {
        let mut entries = std::collections::HashMap::new();
        for record in raw.split(';') {
            let record = record.trim();
            if record.is_empty() {
                continue;
            }
            let parts: Vec<&str> = record.split('|').collect();
            if parts.len() != 3 {
                warn!("Skipping malformed IATA_OVERRIDE entry: {:?}", record);
                continue;
            }
            entries.insert(
                parts[0].trim().to_uppercase(),
                (parts[1].trim().to_uppercase(), parts[2].trim().to_string()),
            );
        }
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_tokens_match_spec() {
        for tok in TRUTHY {
            assert!(parse_bool(tok, false));
            assert!(parse_bool(&tok.to_uppercase(), false));
        }
        assert!(!parse_bool("no", false));
        assert!(parse_bool("  TRUE  ", false));
    }

    #[test]
    fn empty_uses_default() {
        assert!(parse_bool("", true));
        assert!(!parse_bool("", false));
    }

    #[test]
    fn bare_udp_token_uses_legacy_port() {
        let descs = parse_descriptors("udp", "acars");
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].listen_type, ListenType::Udp);
        assert_eq!(descs[0].port, 15550);
        assert_eq!(descs[0].host, "0.0.0.0");
    }

    #[test]
    fn scheme_tokens_parse() {
        let descs = parse_descriptors("udp://127.0.0.1:5550,tcp://example.com:6000", "acars");
        assert_eq!(descs.len(), 2);
        assert_eq!(descs[0].listen_type, ListenType::Udp);
        assert_eq!(descs[0].host, "127.0.0.1");
        assert_eq!(descs[0].port, 5550);
        assert_eq!(descs[1].listen_type, ListenType::Tcp);
        assert_eq!(descs[1].port, 6000);
    }

    #[test]
    fn malformed_tokens_are_skipped() {
        let descs = parse_descriptors("udp://:5550,garbage,zmq://host:999999", "vdlm");
        assert!(descs.is_empty());
    }

    #[test]
    fn mixed_valid_and_invalid_tokens() {
        let descs = parse_descriptors("garbage,zmq://feed.example:9000", "hfdl");
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].listen_type, ListenType::Zmq);
        assert_eq!(descs[0].host, "feed.example");
        assert_eq!(descs[0].port, 9000);
    }

    #[test]
    fn iata_override_parses_and_skips_malformed() {
        let table = IataOverride::parse("WN|SWA|Southwest Airlines;bad-entry;DL|DAL|Delta");
        assert_eq!(table.entries.len(), 2);
        assert_eq!(
            table.entries.get("WN"),
            Some(&("SWA".to_string(), "Southwest Airlines".to_string()))
        );
    }
}
