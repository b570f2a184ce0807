use diesel::prelude::*;
use serde_json::Value;

use crate::schema::core::packages;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = packages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Package {
    pub key: String,
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub source: Option<String>,
    pub files: Value,
    pub stanza: String,
}

#[derive(Insertable)]
#[diesel(table_name = packages)]
pub struct NewPackage<'a> {
    pub key: &'a str,
    pub name: &'a str,
    pub version: &'a str,
    pub architecture: &'a str,
    pub source: Option<&'a str>,
    pub files: Value,
    pub stanza: &'a str,
}
