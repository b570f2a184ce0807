use diesel::prelude::*;
use serde_json::Value;

use crate::schema::core::mirrors;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = mirrors)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Mirror {
    pub name: String,
    pub archive_root: String,
    pub distribution: String,
    pub components: Value,
    pub architectures: Value,
    pub download_sources: bool,
    pub meta: Value,
    pub release_files: Value,
    pub last_download_date: Option<String>,
    pub ref_list_key: Option<String>,
    pub created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = mirrors)]
pub struct NewMirror<'a> {
    pub name: &'a str,
    pub archive_root: &'a str,
    pub distribution: &'a str,
    pub components: Value,
    pub architectures: Value,
    pub download_sources: bool,
    pub meta: Value,
    pub release_files: Value,
    pub last_download_date: Option<String>,
    pub ref_list_key: Option<&'a str>,
    pub created_at: String,
}

/// Every mutable column of a mirror row, written in one statement.
#[derive(AsChangeset)]
#[diesel(table_name = mirrors)]
#[diesel(treat_none_as_null = true)]
pub struct MirrorChanges<'a> {
    pub archive_root: &'a str,
    pub distribution: &'a str,
    pub components: Value,
    pub architectures: Value,
    pub download_sources: bool,
    pub meta: Value,
    pub release_files: Value,
    pub last_download_date: Option<String>,
    pub ref_list_key: Option<&'a str>,
}
