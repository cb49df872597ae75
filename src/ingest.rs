//! The enrich -> persist -> match -> broadcast chain (§4.D/§4.E/§4.G/§4.H)
//! that drains the shared [`crate::queue::MessageQueue`]. One consumer task
//! runs this loop for the whole process, generalized from the teacher's
//! single intake-channel-consumer shape (`socket_server.rs`).

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, warn};
use uuid::Uuid;

use crate::alert_engine::{AlertEngine, AlertHit};
use crate::db::messages_repo::MessagesRepository;
use crate::db::models::NewMessage;
use crate::db::stats_repo::StatsRepository;
use crate::enrichment::enrich_message;
use crate::events::EventState;
use crate::formatters::CanonicalMessage;
use crate::queue::MessageQueue;
use crate::reference::ReferenceTables;
use crate::timeseries::DeltaAccumulator;

fn to_new_message(message: &CanonicalMessage) -> NewMessage {
    NewMessage {
        uid: Uuid::new_v4().to_string(),
        message_type: message.message_type.clone(),
        timestamp: message.timestamp,
        station_id: message.station_id.clone(),
        toaddr: message.toaddr,
        fromaddr: message.fromaddr,
        depa: message.depa.clone(),
        dsta: message.dsta.clone(),
        eta: message.eta.clone(),
        gtout: message.gtout.clone(),
        gtin: message.gtin.clone(),
        wloff: message.wloff.clone(),
        wlin: message.wlin.clone(),
        lat: message.lat,
        lon: message.lon,
        alt: message.alt,
        msg_text: message.msg_text.clone(),
        libacars: message.libacars.clone(),
        tail: message.tail.clone(),
        flight: message.flight.clone(),
        icao: message.icao.clone(),
        freq: message.freq,
        mode: message.mode.clone(),
        label: message.label.clone(),
        block_id: message.block_id.clone(),
        msgno: message.msgno.clone(),
        ack: message.ack.clone(),
        is_response: message.is_response,
        is_onground: message.is_onground,
        error: message.is_error,
        level: message.level,
        aircraft_id: None,
    }
}

/// Drive the ingest chain until the queue's sender side is dropped (process
/// shutdown). Every step logs and continues on failure; one bad message
/// must never stop the consumer (§4.E/§4.G).
pub async fn run(
    queue: Arc<MessageQueue>,
    messages_repo: MessagesRepository,
    stats_repo: StatsRepository,
    alert_engine: AlertEngine,
    reference: Arc<ReferenceTables>,
    deltas: DeltaAccumulator,
    event_state: EventState,
) {
    let receiver = queue.receiver();
    while let Ok(queued) = receiver.recv_async().await {
        let decoder_type = queued.decoder_type;
        let message = queued.message;
        let is_error = message.is_error;

        deltas.record(&message.message_type, is_error);

        if let Err(err) = stats_repo.increment_decoder_count(message.message_type.clone(), is_error).await {
            warn!(decoder = decoder_type, error = %err, "failed to increment decoder count");
        }
        if !queued.logged {
            if let Err(err) = stats_repo.increment_nonlogged_count(is_error).await {
                warn!(error = %err, "failed to increment nonlogged count");
            }
        }
        if let Some(freq) = message.freq {
            if let Err(err) = stats_repo.update_frequencies(message.message_type.clone(), freq).await {
                warn!(decoder = decoder_type, error = %err, "failed to update decoder frequency table");
            }
        }
        if let Some(level) = message.level {
            if let Err(err) = stats_repo.update_level(message.message_type.clone(), level).await {
                warn!(decoder = decoder_type, error = %err, "failed to update decoder level table");
            }
        }

        if !queued.logged {
            // Non-logged messages exist only to drive counters; they are
            // never written to `messages` (§4.E).
            continue;
        }

        let new_message = to_new_message(&message);
        let inserted = match messages_repo.insert(new_message).await {
            Ok(m) => m,
            Err(err) => {
                error!(decoder = decoder_type, error = %err, "failed to persist message");
                continue;
            }
        };

        // §5: enrich -> persist -> match -> broadcast is strictly sequential;
        // the message is only broadcast after its row is committed and its
        // matches are written, and the broadcast payload itself carries the
        // `matched*` tags §4.G step 4 requires.
        let hits = match alert_engine.process_message(&inserted).await {
            Ok(hits) => hits,
            Err(err) => {
                warn!(uid = %inserted.uid, error = %err, "alert scan failed");
                Vec::new()
            }
        };

        let mut enriched = enrich_message(&inserted, &reference);
        tag_matches(&mut enriched, &hits);
        event_state.broadcast_event("newmsg", json!({"message": enriched}));

        if !hits.is_empty() {
            event_state.broadcast_event(
                "alert_match",
                json!({
                    "message_uid": inserted.uid,
                    "terms": hits.iter().map(|h| h.term.clone()).collect::<Vec<_>>(),
                }),
            );
        }
    }
}

/// Tag the enriched wire object with `{matched, matched_text, matched_icao,
/// matched_tail, matched_flight}` from the alert scan's hits (§4.G step 4).
/// A no-op when there are no hits; the protected keys are simply absent then.
fn tag_matches(enriched: &mut Value, hits: &[AlertHit]) {
    if hits.is_empty() {
        return;
    }
    let Value::Object(map) = enriched else { return };
    map.insert("matched".to_string(), json!(true));
    for field in ["text", "icao", "tail", "flight"] {
        let terms: Vec<&str> = hits
            .iter()
            .filter(|h| h.match_type == field)
            .map(|h| h.term.as_str())
            .collect();
        if !terms.is_empty() {
            map.insert(format!("matched_{field}"), json!(terms));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_hits_leaves_enriched_value_untouched() {
        let mut value = json!({"uid": "abc"});
        tag_matches(&mut value, &[]);
        assert_eq!(value, json!({"uid": "abc"}));
    }

    #[test]
    fn hits_tag_matched_fields_by_match_type() {
        let mut value = json!({"uid": "abc"});
        let hits = vec![
            AlertHit { term: "MAYDAY".to_string(), match_type: "text" },
            AlertHit { term: "N123AB".to_string(), match_type: "tail" },
        ];
        tag_matches(&mut value, &hits);
        assert_eq!(value["matched"], json!(true));
        assert_eq!(value["matched_text"], json!(["MAYDAY"]));
        assert_eq!(value["matched_tail"], json!(["N123AB"]));
        assert!(value.get("matched_icao").is_none());
    }
}
