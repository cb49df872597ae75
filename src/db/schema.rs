// Hand-maintained to track the migration chain in migrations/ (diesel CLI
// schema introspection needs a live sqlite file, which this workspace does
// not ship). Column set mirrors the final post-migration-08 shape.

diesel::table! {
    messages (id) {
        id -> BigInt,
        uid -> Text,
        message_type -> Text,
        timestamp -> BigInt,
        station_id -> Nullable<Text>,
        toaddr -> Nullable<BigInt>,
        fromaddr -> Nullable<BigInt>,
        depa -> Nullable<Text>,
        dsta -> Nullable<Text>,
        eta -> Nullable<Text>,
        gtout -> Nullable<Text>,
        gtin -> Nullable<Text>,
        wloff -> Nullable<Text>,
        wlin -> Nullable<Text>,
        lat -> Nullable<Double>,
        lon -> Nullable<Double>,
        alt -> Nullable<Double>,
        msg_text -> Nullable<Text>,
        libacars -> Nullable<Text>,
        tail -> Nullable<Text>,
        flight -> Nullable<Text>,
        icao -> Nullable<Text>,
        freq -> Nullable<Double>,
        mode -> Nullable<Text>,
        label -> Nullable<Text>,
        block_id -> Nullable<Text>,
        msgno -> Nullable<Text>,
        ack -> Nullable<Text>,
        is_response -> Nullable<Bool>,
        is_onground -> Nullable<BigInt>,
        error -> Bool,
        level -> Nullable<Double>,
        aircraft_id -> Nullable<Text>,
    }
}

diesel::table! {
    alert_stats (term) {
        term -> Text,
        created_at -> BigInt,
    }
}

diesel::table! {
    ignore_alert_terms (term) {
        term -> Text,
        created_at -> BigInt,
    }
}

diesel::table! {
    alert_matches (id) {
        id -> BigInt,
        message_uid -> Text,
        term -> Text,
        match_type -> Text,
        matched_at -> BigInt,
    }
}

diesel::table! {
    decoder_count (message_type) {
        message_type -> Text,
        total -> BigInt,
        errors -> BigInt,
        good -> BigInt,
    }
}

diesel::table! {
    nonlogged_count (id) {
        id -> Integer,
        nonlogged_errors -> BigInt,
        nonlogged_good -> BigInt,
    }
}

diesel::table! {
    decoder_freq_acars (freq) {
        freq -> Double,
        count -> BigInt,
    }
}

diesel::table! {
    decoder_freq_vdlm (freq) {
        freq -> Double,
        count -> BigInt,
    }
}

diesel::table! {
    decoder_freq_hfdl (freq) {
        freq -> Double,
        count -> BigInt,
    }
}

diesel::table! {
    decoder_freq_imsl (freq) {
        freq -> Double,
        count -> BigInt,
    }
}

diesel::table! {
    decoder_freq_irdm (freq) {
        freq -> Double,
        count -> BigInt,
    }
}

diesel::table! {
    decoder_level_acars (level) {
        level -> Double,
        count -> BigInt,
    }
}

diesel::table! {
    decoder_level_vdlm (level) {
        level -> Double,
        count -> BigInt,
    }
}

diesel::table! {
    decoder_level_hfdl (level) {
        level -> Double,
        count -> BigInt,
    }
}

diesel::table! {
    decoder_level_imsl (level) {
        level -> Double,
        count -> BigInt,
    }
}

diesel::table! {
    decoder_level_irdm (level) {
        level -> Double,
        count -> BigInt,
    }
}

diesel::table! {
    timeseries_stats (id) {
        id -> BigInt,
        timestamp -> BigInt,
        resolution -> Text,
        acars -> BigInt,
        vdlm -> BigInt,
        hfdl -> BigInt,
        imsl -> BigInt,
        irdm -> BigInt,
        total -> BigInt,
        error -> BigInt,
        created_at -> BigInt,
    }
}

diesel::table! {
    import_registry (file_hash) {
        file_hash -> Text,
        source_path -> Text,
        imported_at -> BigInt,
        rows_imported -> BigInt,
    }
}

diesel::table! {
    connection_status (decoder_type) {
        decoder_type -> Text,
        enabled -> Bool,
        connected -> Bool,
        last_message_at -> Nullable<BigInt>,
        consecutive_failures -> Integer,
    }
}

diesel::table! {
    schema_revision (id) {
        id -> Integer,
        revision -> Integer,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    messages,
    alert_stats,
    ignore_alert_terms,
    alert_matches,
    decoder_count,
    nonlogged_count,
    timeseries_stats,
    import_registry,
    connection_status,
    schema_revision,
);
