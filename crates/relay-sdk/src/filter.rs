//! NIP-01 filter type and a pure matcher over [`nostr_sdk::Event`].
//!
//! `nostr_sdk::Filter` ties `ids`/`authors` to full 32-byte ids, but NIP-01
//! filters match on hex *prefixes*. We keep our own wire-compatible type so
//! prefix matching is explicit and independently testable.

use std::collections::HashMap;

use nostr_sdk::Event;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Single-letter tag filters, e.g. `{"#e": ["abc..."]}` -> `{'e': ["abc..."]}`.
    #[serde(flatten, deserialize_with = "deserialize_tag_filters")]
    pub tags: HashMap<char, Vec<String>>,
}

fn deserialize_tag_filters<'de, D>(deserializer: D) -> Result<HashMap<char, Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: HashMap<String, Vec<String>> = HashMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| {
            let mut chars = k.strip_prefix('#')?.chars();
            let c = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            Some((c, v))
        })
        .collect())
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self.ids.is_none()
            && self.authors.is_none()
            && self.kinds.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && self.tags.is_empty()
    }
}

fn matches_prefix_set(value_hex: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| value_hex.starts_with(p.as_str()))
}

/// Pure NIP-01 predicate: AND across fields, OR within a field's list.
/// Empty filter matches everything. Does not consult `limit` — that is
/// applied by the caller after sorting (see [`crate::filter::Filter`]'s
/// docs and the event store's `query`).
pub fn matches(event: &Event, filter: &Filter) -> bool {
    if let Some(ids) = &filter.ids
        && !matches_prefix_set(&event.id.to_hex(), ids)
    {
        return false;
    }
    if let Some(authors) = &filter.authors
        && !matches_prefix_set(&event.pubkey.to_hex(), authors)
    {
        return false;
    }
    if let Some(kinds) = &filter.kinds
        && !kinds.contains(&u64::from(event.kind.as_u16()))
    {
        return false;
    }
    if let Some(since) = filter.since
        && event.created_at.as_u64() < since
    {
        return false;
    }
    if let Some(until) = filter.until
        && event.created_at.as_u64() > until
    {
        return false;
    }
    for (letter, wanted) in &filter.tags {
        let has_match = event.tags.iter().any(|tag| {
            let slice = tag.as_slice();
            slice.len() >= 2
                && slice[0].len() == 1
                && slice[0].starts_with(*letter)
                && wanted.contains(&slice[1])
        });
        if !has_match {
            return false;
        }
    }
    true
}

/// Returns true if `event` matches at least one filter in `filters` (the
/// wire form of a `REQ` always carries a list of filters, OR'd together).
pub fn matches_any(event: &Event, filters: &[Filter]) -> bool {
    filters.is_empty() || filters.iter().any(|f| matches(event, f))
}
