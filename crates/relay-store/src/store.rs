use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use nostr_sdk::Event;
use relay_sdk::Filter;

use crate::conversions::{d_tag_value, event_from_row, extract_single_letter_tags, new_event_row};
use crate::error::StoreError;
use crate::models::{ChannelStateRow, EventRow, NewChannelStateRow};
use crate::schema::{channel_state, event_tags, events};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Replaceable: `[10000,20000)` plus kinds 0 and 3.
fn is_replaceable(kind: u16) -> bool {
    (10_000..20_000).contains(&kind) || kind == 0 || kind == 3
}

/// Addressable: `[30000,40000)`, keyed additionally by `d` tag.
fn is_addressable(kind: u16) -> bool {
    (30_000..40_000).contains(&kind)
}

/// Ephemeral: `[20000,30000)`. Must never be persisted; callers forward
/// these straight to live subscribers instead of calling `store`.
pub fn is_ephemeral(kind: u16) -> bool {
    (20_000..30_000).contains(&kind)
}

/// Persistent storage for Nostr events (C1) and payment-channel state
/// (the persistent half of C5/C6's in-memory tracking).
///
/// All methods take `&mut self`: Diesel's `SqliteConnection` requires `&mut`
/// for every operation, including reads.
pub struct EventStore {
    conn: SqliteConnection,
}

impl EventStore {
    /// Open (or create) a store at the given file path. Runs migrations automatically.
    pub fn open(path: &str) -> crate::Result<Self> {
        let mut conn = SqliteConnection::establish(path)?;
        diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(EventStore { conn })
    }

    /// Open an in-memory store for tests.
    pub fn open_in_memory() -> crate::Result<Self> {
        let mut conn = SqliteConnection::establish(":memory:")?;
        diesel::sql_query("PRAGMA foreign_keys = ON").execute(&mut conn)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(EventStore { conn })
    }

    /// Idempotent on `event.id`. Ephemeral kinds are rejected rather than
    /// persisted — the relay layer forwards those to live subscribers
    /// without ever calling `store`. Returns whether the event was newly
    /// stored (false means it was already present, or a newer replaceable
    /// event already superseded it).
    pub fn store(&mut self, event: &Event) -> crate::Result<bool> {
        let kind = event.kind.as_u16();
        if is_ephemeral(kind) {
            return Err(StoreError::InvalidData(format!(
                "kind {kind} is ephemeral and must not be persisted"
            )));
        }

        self.conn.transaction(|conn| {
            let already_present: bool = diesel::select(diesel::dsl::exists(
                events::table.filter(events::id.eq(event.id.to_hex())),
            ))
            .get_result(conn)?;
            if already_present {
                return Ok(false);
            }

            if is_replaceable(kind) || is_addressable(kind) {
                let d_tag = d_tag_value(event);
                let mut query = events::table
                    .filter(events::pubkey.eq(event.pubkey.to_hex()))
                    .filter(events::kind.eq(kind as i32))
                    .into_boxed();
                query = match &d_tag {
                    Some(d) => query.filter(events::d_tag.eq(d)),
                    None => query.filter(events::d_tag.is_null()),
                };
                let superseding: Option<EventRow> = query
                    .order(events::created_at.desc())
                    .first(conn)
                    .optional()?;
                if let Some(existing) = &superseding {
                    if existing.created_at >= event.created_at.as_u64() as i64 {
                        return Ok(false);
                    }
                    diesel::delete(events::table.filter(events::id.eq(&existing.id)))
                        .execute(conn)?;
                }
            }

            let row = new_event_row(event)?;
            diesel::insert_into(events::table)
                .values(&row)
                .execute(conn)?;
            diesel::insert_into(event_tags::table)
                .values(&extract_single_letter_tags(event))
                .execute(conn)?;
            Ok(true)
        })
    }

    pub fn get(&mut self, id: &str) -> crate::Result<Option<Event>> {
        let row: Option<EventRow> = events::table
            .filter(events::id.eq(id))
            .first(&mut self.conn)
            .optional()?;
        row.as_ref().map(event_from_row).transpose().map_err(Into::into)
    }

    /// Matching events across all `filters` (OR of filters), sorted by
    /// `created_at` descending, tie-broken by `id` ascending. `limit` on a
    /// filter bounds that filter's own contribution before the union.
    pub fn query(&mut self, filters: &[Filter]) -> crate::Result<Vec<Event>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for filter in filters {
            let mut query = events::table.into_boxed();
            if let Some(kinds) = &filter.kinds {
                let kinds_i32: Vec<i32> = kinds.iter().map(|k| *k as i32).collect();
                query = query.filter(events::kind.eq_any(kinds_i32));
            }
            if let Some(since) = filter.since {
                query = query.filter(events::created_at.ge(since as i64));
            }
            if let Some(until) = filter.until {
                query = query.filter(events::created_at.le(until as i64));
            }
            query = query.order((events::created_at.desc(), events::id.asc()));
            if let Some(limit) = filter.limit {
                query = query.limit(limit as i64);
            }
            let rows: Vec<EventRow> = query.load(&mut self.conn)?;
            for row in rows {
                let event = event_from_row(&row)?;
                // ids/authors/tags can be hex prefixes, so they're applied
                // in-process via the pure matcher rather than as SQL `LIKE`.
                if relay_sdk::matches(&event, filter) && seen.insert(event.id) {
                    out.push(event);
                }
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    // ==================== Channel state (persistent half of C5/C6) ====================

    pub fn load_channel_state(&mut self, channel_id: &str) -> crate::Result<Option<ChannelStateRow>> {
        Ok(channel_state::table
            .filter(channel_state::channel_id.eq(channel_id))
            .first(&mut self.conn)
            .optional()?)
    }

    /// Upsert: insert on first sighting, otherwise overwrite nonce/cumulative-amount.
    pub fn save_channel_state(
        &mut self,
        channel_id: &str,
        chain_id: i64,
        token_network_address: &str,
        nonce: i64,
        cumulative_amount: &str,
    ) -> crate::Result<()> {
        self.conn.transaction(|conn| {
            let exists: bool = diesel::select(diesel::dsl::exists(
                channel_state::table.filter(channel_state::channel_id.eq(channel_id)),
            ))
            .get_result(conn)?;
            if exists {
                diesel::update(channel_state::table.filter(channel_state::channel_id.eq(channel_id)))
                    .set((
                        channel_state::nonce.eq(nonce),
                        channel_state::cumulative_amount.eq(cumulative_amount),
                        channel_state::updated_at.eq(diesel::dsl::sql::<diesel::sql_types::Text>(
                            "datetime('now')",
                        )),
                    ))
                    .execute(conn)?;
            } else {
                diesel::insert_into(channel_state::table)
                    .values(&NewChannelStateRow {
                        channel_id: channel_id.to_string(),
                        chain_id,
                        token_network_address: token_network_address.to_string(),
                        nonce,
                        cumulative_amount: cumulative_amount.to_string(),
                    })
                    .execute(conn)?;
            }
            Ok(())
        })
    }

    pub fn delete_channel_state(&mut self, channel_id: &str) -> crate::Result<()> {
        diesel::delete(channel_state::table.filter(channel_state::channel_id.eq(channel_id)))
            .execute(&mut self.conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::{EventBuilder, Keys, Kind, Tag, TagKind};

    fn signed(keys: &Keys, kind: u16, content: &str) -> Event {
        EventBuilder::new(Kind::Custom(kind), content)
            .sign_with_keys(keys)
            .unwrap()
    }

    #[test]
    fn store_is_idempotent_on_id() {
        let mut store = EventStore::open_in_memory().unwrap();
        let keys = Keys::generate();
        let event = signed(&keys, 1, "hello");
        assert!(store.store(&event).unwrap());
        assert!(!store.store(&event).unwrap());
        assert!(store.get(&event.id.to_hex()).unwrap().is_some());
    }

    #[test]
    fn newer_replaceable_event_supersedes_older() {
        let mut store = EventStore::open_in_memory().unwrap();
        let keys = Keys::generate();
        let older = EventBuilder::new(Kind::Custom(10032), "v1")
            .custom_created_at(nostr_sdk::Timestamp::from(1000))
            .sign_with_keys(&keys)
            .unwrap();
        let newer = EventBuilder::new(Kind::Custom(10032), "v2")
            .custom_created_at(nostr_sdk::Timestamp::from(2000))
            .sign_with_keys(&keys)
            .unwrap();
        assert!(store.store(&older).unwrap());
        assert!(store.store(&newer).unwrap());
        assert!(store.get(&older.id.to_hex()).unwrap().is_none());
        let kept = store.get(&newer.id.to_hex()).unwrap().unwrap();
        assert_eq!(kept.content, "v2");
    }

    #[test]
    fn older_replaceable_event_is_dropped() {
        let mut store = EventStore::open_in_memory().unwrap();
        let keys = Keys::generate();
        let newer = EventBuilder::new(Kind::Custom(10032), "v2")
            .custom_created_at(nostr_sdk::Timestamp::from(2000))
            .sign_with_keys(&keys)
            .unwrap();
        let older = EventBuilder::new(Kind::Custom(10032), "v1")
            .custom_created_at(nostr_sdk::Timestamp::from(1000))
            .sign_with_keys(&keys)
            .unwrap();
        assert!(store.store(&newer).unwrap());
        assert!(!store.store(&older).unwrap());
        assert!(store.get(&older.id.to_hex()).unwrap().is_none());
    }

    #[test]
    fn addressable_events_key_on_pubkey_kind_and_d_tag() {
        let mut store = EventStore::open_in_memory().unwrap();
        let keys = Keys::generate();
        let a = EventBuilder::new(Kind::Custom(30000), "a")
            .tags(vec![Tag::identifier("x")])
            .custom_created_at(nostr_sdk::Timestamp::from(1000))
            .sign_with_keys(&keys)
            .unwrap();
        let b = EventBuilder::new(Kind::Custom(30000), "b")
            .tags(vec![Tag::identifier("y")])
            .custom_created_at(nostr_sdk::Timestamp::from(1000))
            .sign_with_keys(&keys)
            .unwrap();
        assert!(store.store(&a).unwrap());
        assert!(store.store(&b).unwrap());
        assert!(store.get(&a.id.to_hex()).unwrap().is_some());
        assert!(store.get(&b.id.to_hex()).unwrap().is_some());
    }

    #[test]
    fn ephemeral_kinds_are_rejected() {
        let mut store = EventStore::open_in_memory().unwrap();
        let keys = Keys::generate();
        let event = signed(&keys, 23194, "ephemeral");
        assert!(store.store(&event).is_err());
    }

    #[test]
    fn query_filters_by_kind_and_respects_limit() {
        let mut store = EventStore::open_in_memory().unwrap();
        let keys = Keys::generate();
        for i in 0..5u64 {
            let event = EventBuilder::new(Kind::TextNote, format!("note {i}"))
                .custom_created_at(nostr_sdk::Timestamp::from(1000 + i))
                .sign_with_keys(&keys)
                .unwrap();
            store.store(&event).unwrap();
        }
        let filter = Filter {
            kinds: Some(vec![1]),
            limit: Some(2),
            ..Default::default()
        };
        let results = store.query(&[filter]).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].created_at >= results[1].created_at);
    }

    #[test]
    fn query_by_tag_matches_single_letter_tags() {
        let mut store = EventStore::open_in_memory().unwrap();
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "tagged")
            .tags(vec![Tag::custom(TagKind::custom("t"), vec!["hashtag".to_string()])])
            .sign_with_keys(&keys)
            .unwrap();
        store.store(&event).unwrap();

        let mut tags = std::collections::HashMap::new();
        tags.insert('t', vec!["hashtag".to_string()]);
        let filter = Filter {
            tags,
            ..Default::default()
        };
        let results = store.query(&[filter]).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn channel_state_round_trips_through_save_and_load() {
        let mut store = EventStore::open_in_memory().unwrap();
        store
            .save_channel_state("0xabc", 31337, "0xdef", 1, "1000")
            .unwrap();
        let loaded = store.load_channel_state("0xabc").unwrap().unwrap();
        assert_eq!(loaded.nonce, 1);
        assert_eq!(loaded.cumulative_amount, "1000");

        store
            .save_channel_state("0xabc", 31337, "0xdef", 2, "2000")
            .unwrap();
        let loaded = store.load_channel_state("0xabc").unwrap().unwrap();
        assert_eq!(loaded.nonce, 2);
        assert_eq!(loaded.cumulative_amount, "2000");
    }
}
