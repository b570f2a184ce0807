diesel::table! {
    mirrors (name) {
        name -> Text,
        archive_root -> Text,
        distribution -> Text,
        components -> Jsonb,
        architectures -> Jsonb,
        download_sources -> Bool,
        meta -> Jsonb,
        release_files -> Jsonb,
        last_download_date -> Nullable<Text>,
        ref_list_key -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    packages (key) {
        key -> Text,
        name -> Text,
        version -> Text,
        architecture -> Text,
        source -> Nullable<Text>,
        files -> Jsonb,
        stanza -> Text,
    }
}

diesel::table! {
    reflists (key) {
        key -> Text,
        refs -> Jsonb,
        created_at -> Text,
    }
}

diesel::table! {
    snapshots (name) {
        name -> Text,
        created_at -> Text,
        description -> Text,
        source_kind -> Text,
        ref_list_key -> Text,
    }
}

diesel::table! {
    snapshot_sources (snapshot_name, source_kind, source_name) {
        snapshot_name -> Text,
        source_kind -> Text,
        source_name -> Text,
    }
}

diesel::joinable!(snapshot_sources -> snapshots (snapshot_name));

diesel::allow_tables_to_appear_in_same_query!(
    mirrors,
    packages,
    reflists,
    snapshots,
    snapshot_sources,
);
