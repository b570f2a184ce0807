use diesel::prelude::*;

use crate::schema::core::{snapshot_sources, snapshots};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = snapshots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Snapshot {
    pub name: String,
    pub created_at: String,
    pub description: String,
    pub source_kind: String,
    pub ref_list_key: String,
}

#[derive(Insertable)]
#[diesel(table_name = snapshots)]
pub struct NewSnapshot<'a> {
    pub name: &'a str,
    pub created_at: String,
    pub description: &'a str,
    pub source_kind: &'a str,
    pub ref_list_key: &'a str,
}

#[derive(Insertable)]
#[diesel(table_name = snapshot_sources)]
pub struct NewSnapshotSource<'a> {
    pub snapshot_name: &'a str,
    pub source_kind: &'a str,
    pub source_name: &'a str,
}
