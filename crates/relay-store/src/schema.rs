// @generated automatically to match the migrations in ./migrations.

diesel::table! {
    events (id) {
        id -> Text,
        pubkey -> Text,
        created_at -> BigInt,
        kind -> Integer,
        content -> Text,
        sig -> Text,
        tags_json -> Text,
        d_tag -> Nullable<Text>,
    }
}

diesel::table! {
    event_tags (id) {
        id -> Integer,
        event_id -> Text,
        tag_name -> Text,
        tag_value -> Text,
    }
}

diesel::table! {
    channel_state (channel_id) {
        channel_id -> Text,
        chain_id -> BigInt,
        token_network_address -> Text,
        nonce -> BigInt,
        cumulative_amount -> Text,
        updated_at -> Text,
    }
}

diesel::joinable!(event_tags -> events (event_id));
diesel::allow_tables_to_appear_in_same_query!(events, event_tags, channel_state);
