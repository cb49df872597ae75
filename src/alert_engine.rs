//! In-memory alert term cache plus the scan/match/regenerate logic (§4.G).
//! The durable half (`alert_matches`, `alert_stats`, `ignore_alert_terms`)
//! lives in [`crate::db::alerts_repo`]; this module owns the
//! `parking_lot::RwLock`-guarded cache the teacher's `airports_repo.rs`
//! batched-upsert pattern is generalized from for the regeneration pass.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::db::alerts_repo::AlertsRepository;
use crate::db::messages_repo::MessagesRepository;
use crate::db::models::{Message, NewAlertMatch};
use crate::db::now_unix;

/// Fields a message is scanned against, in the order matches are reported.
const SCAN_FIELDS: &[&str] = &["text", "icao", "tail", "flight"];

#[derive(Debug, Default)]
struct CacheInner {
    terms: HashSet<String>,
    ignore_terms: HashSet<String>,
}

/// Shared, cheaply cloned handle to the active term set.
#[derive(Debug, Clone, Default)]
pub struct AlertCache {
    inner: Arc<RwLock<CacheInner>>,
}

impl AlertCache {
    pub fn replace(&self, terms: impl IntoIterator<Item = String>, ignore: impl IntoIterator<Item = String>) {
        let mut inner = self.inner.write();
        inner.terms = terms.into_iter().map(|t| t.to_uppercase()).collect();
        inner.ignore_terms = ignore.into_iter().map(|t| t.to_uppercase()).collect();
    }

    pub fn terms(&self) -> Vec<String> {
        self.inner.read().terms.iter().cloned().collect()
    }

    pub fn ignore_terms(&self) -> Vec<String> {
        self.inner.read().ignore_terms.iter().cloned().collect()
    }

    fn is_empty(&self) -> bool {
        self.inner.read().terms.is_empty()
    }
}

/// One matched `(term, field)` pair for a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertHit {
    pub term: String,
    pub match_type: &'static str,
}

fn field_value(message: &Message, field: &str) -> Option<&str> {
    match field {
        "text" => message.msg_text.as_deref(),
        "icao" => message.icao.as_deref(),
        "tail" => message.tail.as_deref(),
        "flight" => message.flight.as_deref(),
        _ => None,
    }
}

/// Scan one message's text/icao/tail/flight fields against the active term
/// set, uppercased substring match (§4.G). A message containing any ignore
/// term is suppressed entirely, regardless of term hits.
pub fn scan_message(message: &Message, cache: &AlertCache) -> Vec<AlertHit> {
    if cache.is_empty() {
        return Vec::new();
    }

    let inner = cache.inner.read();
    for field in SCAN_FIELDS {
        if let Some(value) = field_value(message, field) {
            let upper = value.to_uppercase();
            if inner.ignore_terms.iter().any(|ignore| upper.contains(ignore.as_str())) {
                return Vec::new();
            }
        }
    }

    let mut hits = Vec::new();
    for field in SCAN_FIELDS {
        let Some(value) = field_value(message, field) else { continue };
        let upper = value.to_uppercase();
        for term in &inner.terms {
            if upper.contains(term.as_str()) {
                hits.push(AlertHit { term: term.clone(), match_type: field });
            }
        }
    }
    hits
}

#[derive(Clone)]
pub struct AlertEngine {
    alerts_repo: AlertsRepository,
    messages_repo: MessagesRepository,
    cache: AlertCache,
}

impl AlertEngine {
    /// Construct with an empty cache, no database access. Used at startup
    /// (§4.K) so the event layer can attach and start serving the migration
    /// banner before the schema exists; [`reload`](Self::reload) populates
    /// the cache once the migration chain has run.
    pub fn new(alerts_repo: AlertsRepository, messages_repo: MessagesRepository) -> Self {
        Self { alerts_repo, messages_repo, cache: AlertCache::default() }
    }

    /// Load the persisted term sets into a fresh cache at startup (§4.K).
    pub async fn load(alerts_repo: AlertsRepository, messages_repo: MessagesRepository) -> Result<Self> {
        let engine = Self::new(alerts_repo, messages_repo);
        engine.reload().await?;
        Ok(engine)
    }

    /// Re-read the persisted term sets from the database and replace the
    /// in-memory cache. Called once after the migration chain completes
    /// (§4.K step 5), since the underlying tables don't exist beforehand.
    pub async fn reload(&self) -> Result<()> {
        let terms = self.alerts_repo.load_terms().await?;
        let ignore = self.alerts_repo.load_ignore_terms().await?;
        self.cache.replace(terms.into_iter().map(|t| t.term), ignore.into_iter().map(|t| t.term));
        Ok(())
    }

    pub fn cache(&self) -> AlertCache {
        self.cache.clone()
    }

    /// Scan one freshly-ingested message, persist any hits, and return them
    /// for the caller (the real-time event layer) to broadcast.
    pub async fn process_message(&self, message: &Message) -> Result<Vec<AlertHit>> {
        let hits = scan_message(message, &self.cache);
        if hits.is_empty() {
            return Ok(hits);
        }

        let now = now_unix();
        let new_matches = hits
            .iter()
            .map(|hit| NewAlertMatch {
                message_uid: message.uid.clone(),
                term: hit.term.clone(),
                match_type: hit.match_type.to_string(),
                matched_at: now,
            })
            .collect();
        self.alerts_repo.record_matches(new_matches).await?;
        Ok(hits)
    }

    /// Replace the persisted + in-memory term sets (`update_alerts`, §4.G).
    pub async fn update_terms(&self, terms: Vec<String>, ignore: Vec<String>) -> Result<()> {
        self.alerts_repo.replace_terms(terms.clone(), ignore.clone()).await?;
        self.cache.replace(terms, ignore);
        Ok(())
    }

    /// Wipe `alert_matches` and rescan every stored message against the
    /// current term set, in batches, so a huge table never holds the whole
    /// scan in memory at once (§4.G). Returns the number of matches written.
    pub async fn regenerate(&self) -> Result<usize> {
        info!("regenerating alert matches against current term set");
        self.alerts_repo.clear_matches().await?;

        if self.cache.is_empty() {
            return Ok(0);
        }

        // `search` with no populated fields applies no FTS filter, so an
        // empty `SearchTerm` plus the `results_after` id cursor walks the
        // whole table newest-first in pages of up to 500 rows.
        let mut total_written = 0usize;
        let mut cursor: Option<i64> = None;
        loop {
            let batch = self.messages_repo.search(Default::default(), cursor, false).await?;
            if batch.is_empty() {
                break;
            }

            let mut matches = Vec::new();
            let now = now_unix();
            for message in &batch {
                for hit in scan_message(message, &self.cache) {
                    matches.push(NewAlertMatch {
                        message_uid: message.uid.clone(),
                        term: hit.term,
                        match_type: hit.match_type.to_string(),
                        matched_at: now,
                    });
                }
            }
            total_written += self.alerts_repo.record_matches(matches).await?;

            cursor = batch.iter().map(|m| m.id).min();
            if cursor.is_none() {
                break;
            }
        }

        if total_written == 0 {
            warn!("regenerate scanned messages but found no matches");
        }
        Ok(total_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: Option<&str>, icao: Option<&str>, flight: Option<&str>) -> Message {
        Message {
            id: 1,
            uid: "u1".into(),
            message_type: "ACARS".into(),
            timestamp: 0,
            station_id: None,
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
            msg_text: text.map(str::to_string),
            libacars: None,
            tail: None,
            flight: flight.map(str::to_string),
            icao: icao.map(str::to_string),
            freq: None,
            mode: None,
            label: None,
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

    #[test]
    fn empty_cache_never_matches() {
        let cache = AlertCache::default();
        let hits = scan_message(&message(Some("MAYDAY"), None, None), &cache);
        assert!(hits.is_empty());
    }

    #[test]
    fn substring_match_is_case_insensitive_via_uppercasing() {
        let cache = AlertCache::default();
        cache.replace(vec!["mayday".to_string()], vec![]);
        let hits = scan_message(&message(Some("we have a MayDay situation"), None, None), &cache);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_type, "text");
    }

    #[test]
    fn ignore_term_suppresses_every_hit_for_that_message() {
        let cache = AlertCache::default();
        cache.replace(vec!["mayday".to_string()], vec!["TEST FLIGHT".to_string()]);
        let hits = scan_message(&message(Some("mayday - this is a test flight"), None, None), &cache);
        assert!(hits.is_empty());
    }

    #[test]
    fn matches_across_multiple_fields() {
        let cache = AlertCache::default();
        cache.replace(vec!["N123AB".to_string()], vec![]);
        let hits = scan_message(&message(None, None, None).tap_tail("N123AB"), &cache);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_type, "tail");
    }

    trait TapTail {
        fn tap_tail(self, tail: &str) -> Message;
    }

    impl TapTail for Message {
        fn tap_tail(mut self, tail: &str) -> Message {
            self.tail = Some(tail.to_string());
            self
        }
    }
}
