use diesel::prelude::*;

use crate::schema::{channel_state, event_tags, events};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = events)]
pub struct EventRow {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: i32,
    pub content: String,
    pub sig: String,
    pub tags_json: String,
    pub d_tag: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = events)]
pub struct NewEventRow {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: i32,
    pub content: String,
    pub sig: String,
    pub tags_json: String,
    pub d_tag: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = event_tags)]
pub struct EventTagRow {
    pub id: i32,
    pub event_id: String,
    pub tag_name: String,
    pub tag_value: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = event_tags)]
pub struct NewEventTagRow {
    pub event_id: String,
    pub tag_name: String,
    pub tag_value: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = channel_state)]
pub struct ChannelStateRow {
    pub channel_id: String,
    pub chain_id: i64,
    pub token_network_address: String,
    pub nonce: i64,
    pub cumulative_amount: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = channel_state)]
pub struct NewChannelStateRow {
    pub channel_id: String,
    pub chain_id: i64,
    pub token_network_address: String,
    pub nonce: i64,
    pub cumulative_amount: String,
}
