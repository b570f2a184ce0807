use diesel::prelude::*;

use crate::{
    models::reflist::{NewRefList, RefList},
    schema::core::reflists,
};

pub struct RefListRepository;

impl RefListRepository {
    pub fn find_by_key(conn: &mut SqliteConnection, key: &str) -> QueryResult<Option<RefList>> {
        reflists::table
            .find(key)
            .select(RefList::as_select())
            .first(conn)
            .optional()
    }

    /// Stores a reflist unless one with the same key already exists.
    ///
    /// Keys are content hashes, so an existing row already holds the same refs.
    pub fn insert_or_ignore(conn: &mut SqliteConnection, reflist: &NewRefList) -> QueryResult<usize> {
        diesel::insert_or_ignore_into(reflists::table)
            .values(reflist)
            .execute(conn)
    }
}
