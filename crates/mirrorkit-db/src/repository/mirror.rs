//! Mirror rows.

use diesel::{dsl::exists, prelude::*};

use crate::{
    models::mirror::{Mirror, MirrorChanges, NewMirror},
    schema::core::mirrors,
};

pub struct MirrorRepository;

impl MirrorRepository {
    pub fn find_by_name(conn: &mut SqliteConnection, name: &str) -> QueryResult<Option<Mirror>> {
        mirrors::table
            .find(name)
            .select(Mirror::as_select())
            .first(conn)
            .optional()
    }

    pub fn exists_by_name(conn: &mut SqliteConnection, name: &str) -> QueryResult<bool> {
        diesel::select(exists(mirrors::table.filter(mirrors::name.eq(name)))).get_result(conn)
    }

    /// Returns up to `limit` mirrors ordered by name, starting after `after`.
    pub fn list_page(
        conn: &mut SqliteConnection,
        after: Option<&str>,
        limit: i64,
    ) -> QueryResult<Vec<Mirror>> {
        let mut query = mirrors::table
            .select(Mirror::as_select())
            .order(mirrors::name.asc())
            .limit(limit)
            .into_boxed();

        if let Some(after) = after {
            query = query.filter(mirrors::name.gt(after));
        }

        query.load(conn)
    }

    pub fn count(conn: &mut SqliteConnection) -> QueryResult<i64> {
        mirrors::table.count().get_result(conn)
    }

    pub fn insert(conn: &mut SqliteConnection, mirror: &NewMirror) -> QueryResult<usize> {
        diesel::insert_into(mirrors::table)
            .values(mirror)
            .execute(conn)
    }

    /// Replaces every mutable column of the named mirror.
    pub fn update(
        conn: &mut SqliteConnection,
        name: &str,
        changes: &MirrorChanges,
    ) -> QueryResult<usize> {
        diesel::update(mirrors::table.find(name))
            .set(changes)
            .execute(conn)
    }

    pub fn delete_by_name(conn: &mut SqliteConnection, name: &str) -> QueryResult<usize> {
        diesel::delete(mirrors::table.find(name)).execute(conn)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::connection::DbConnection;

    fn new_mirror(name: &str) -> NewMirror<'_> {
        NewMirror {
            name,
            archive_root: "http://deb.example.org/debian/",
            distribution: "wheezy",
            components: json!(["main"]),
            architectures: json!(["amd64"]),
            download_sources: false,
            meta: json!({}),
            release_files: json!({}),
            last_download_date: None,
            ref_list_key: None,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn test_insert_find_delete() {
        let dir = tempdir().unwrap();
        let mut db = DbConnection::open(dir.path().join("db")).unwrap();

        MirrorRepository::insert(&mut db, &new_mirror("wheezy-main")).unwrap();
        assert!(MirrorRepository::exists_by_name(&mut db, "wheezy-main").unwrap());

        let row = MirrorRepository::find_by_name(&mut db, "wheezy-main")
            .unwrap()
            .unwrap();
        assert_eq!(row.distribution, "wheezy");
        assert_eq!(row.components, json!(["main"]));

        assert_eq!(MirrorRepository::delete_by_name(&mut db, "wheezy-main").unwrap(), 1);
        assert!(MirrorRepository::find_by_name(&mut db, "wheezy-main")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let dir = tempdir().unwrap();
        let mut db = DbConnection::open(dir.path().join("db")).unwrap();

        MirrorRepository::insert(&mut db, &new_mirror("m")).unwrap();
        assert!(MirrorRepository::insert(&mut db, &new_mirror("m")).is_err());
    }

    #[test]
    fn test_download_columns_must_agree() {
        let dir = tempdir().unwrap();
        let mut db = DbConnection::open(dir.path().join("db")).unwrap();

        let mut mirror = new_mirror("m");
        mirror.ref_list_key = Some("abc");
        assert!(MirrorRepository::insert(&mut db, &mirror).is_err());
    }

    #[test]
    fn test_update_writes_all_columns() {
        let dir = tempdir().unwrap();
        let mut db = DbConnection::open(dir.path().join("db")).unwrap();
        MirrorRepository::insert(&mut db, &new_mirror("m")).unwrap();

        let changes = MirrorChanges {
            archive_root: "http://other/",
            distribution: "jessie",
            components: json!(["main", "contrib"]),
            architectures: json!(["i386"]),
            download_sources: true,
            meta: json!({"Origin": "Debian"}),
            release_files: json!({}),
            last_download_date: Some("2026-02-02T00:00:00Z".into()),
            ref_list_key: Some("deadbeef"),
        };
        assert_eq!(MirrorRepository::update(&mut db, "m", &changes).unwrap(), 1);
        assert_eq!(MirrorRepository::update(&mut db, "absent", &changes).unwrap(), 0);

        let row = MirrorRepository::find_by_name(&mut db, "m").unwrap().unwrap();
        assert_eq!(row.distribution, "jessie");
        assert!(row.download_sources);
        assert_eq!(row.meta, json!({"Origin": "Debian"}));
        assert_eq!(row.ref_list_key.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn test_list_page_orders_by_name() {
        let dir = tempdir().unwrap();
        let mut db = DbConnection::open(dir.path().join("db")).unwrap();
        for name in ["c", "a", "b"] {
            MirrorRepository::insert(&mut db, &new_mirror(name)).unwrap();
        }

        let first = MirrorRepository::list_page(&mut db, None, 2).unwrap();
        assert_eq!(
            first.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        let rest = MirrorRepository::list_page(&mut db, Some("b"), 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].name, "c");
        assert_eq!(MirrorRepository::count(&mut db).unwrap(), 3);
    }
}
