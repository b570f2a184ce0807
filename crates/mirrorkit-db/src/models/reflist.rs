use diesel::prelude::*;
use serde_json::Value;

use crate::schema::core::reflists;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = reflists)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RefList {
    pub key: String,
    pub refs: Value,
    pub created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = reflists)]
pub struct NewRefList<'a> {
    pub key: &'a str,
    pub refs: Value,
    pub created_at: String,
}
