//! `nostr_sdk::Event` <-> row conversions. Reconstruction goes through
//! `Event::from_json`, same as `relay_sdk::toon::decode` — nostr-sdk doesn't
//! expose a constructor for an already-signed event, only a JSON parse path.

use nostr_sdk::Event;
use relay_sdk::Error;

use crate::error::StoreError;
use crate::models::{EventRow, NewEventRow, NewEventTagRow};

/// The tag kinds NIP-01 queries filter on (`#e`, `#p`, `#a`, ...). Every
/// single-letter tag is indexed; `d` gets its value mirrored onto
/// `events.d_tag` for addressable-event replacement lookups.
pub fn extract_single_letter_tags(event: &Event) -> Vec<NewEventTagRow> {
    event
        .tags
        .iter()
        .filter_map(|tag| {
            let slice = tag.as_slice();
            if slice.len() < 2 {
                return None;
            }
            let name = &slice[0];
            if name.len() == 1 {
                Some(NewEventTagRow {
                    event_id: event.id.to_hex(),
                    tag_name: name.clone(),
                    tag_value: slice[1].clone(),
                })
            } else {
                None
            }
        })
        .collect()
}

/// First value of the event's `d` tag, if any (addressable-event identifier).
pub fn d_tag_value(event: &Event) -> Option<String> {
    event.tags.iter().find_map(|tag| {
        let slice = tag.as_slice();
        (slice.len() >= 2 && slice[0] == "d").then(|| slice[1].clone())
    })
}

pub fn new_event_row(event: &Event) -> Result<NewEventRow, StoreError> {
    let tags_json = serde_json::to_string(&event.tags)
        .map_err(|e| StoreError::InvalidData(format!("tags serialize: {e}")))?;
    Ok(NewEventRow {
        id: event.id.to_hex(),
        pubkey: event.pubkey.to_hex(),
        created_at: event.created_at.as_u64() as i64,
        kind: event.kind.as_u16() as i32,
        content: event.content.clone(),
        sig: event.sig.to_string(),
        tags_json,
        d_tag: d_tag_value(event),
    })
}

pub fn event_from_row(row: &EventRow) -> Result<Event, StoreError> {
    let tags: serde_json::Value = serde_json::from_str(&row.tags_json)
        .map_err(|e| StoreError::InvalidData(format!("tags parse: {e}")))?;
    let json = serde_json::json!({
        "id": row.id,
        "pubkey": row.pubkey,
        "created_at": row.created_at,
        "kind": row.kind,
        "tags": tags,
        "content": row.content,
        "sig": row.sig,
    });
    Event::from_json(json.to_string())
        .map_err(|e| StoreError::InvalidData(format!("event reconstruct: {e}")))
        .and_then(|event| {
            // Rows only ever hold events that passed `verify_event` on ingest;
            // this guards against hand-edited rows or schema drift.
            relay_sdk::event::verify_event(&event)
                .map_err(|_: Error| StoreError::InvalidData("stored event failed signature verification".into()))?;
            Ok(event)
        })
}
