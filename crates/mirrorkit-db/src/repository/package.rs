//! Content-addressed package records.

use diesel::prelude::*;

use crate::{
    models::package::{NewPackage, Package},
    schema::core::packages,
};

/// SQLite caps bound parameters per statement; batches stay well below it.
const INSERT_BATCH: usize = 500;

pub struct PackageRepository;

impl PackageRepository {
    pub fn find_by_key(conn: &mut SqliteConnection, key: &str) -> QueryResult<Option<Package>> {
        packages::table
            .find(key)
            .select(Package::as_select())
            .first(conn)
            .optional()
    }

    /// Loads the records for `keys`, ordered by key. Missing keys are skipped.
    pub fn find_by_keys(conn: &mut SqliteConnection, keys: &[&str]) -> QueryResult<Vec<Package>> {
        packages::table
            .filter(packages::key.eq_any(keys))
            .order(packages::key.asc())
            .select(Package::as_select())
            .load(conn)
    }

    pub fn count(conn: &mut SqliteConnection) -> QueryResult<i64> {
        packages::table.count().get_result(conn)
    }

    /// Inserts records whose key is not yet present. Returns the number inserted.
    pub fn insert_or_ignore(
        conn: &mut SqliteConnection,
        records: &[NewPackage],
    ) -> QueryResult<usize> {
        let mut inserted = 0;
        for chunk in records.chunks(INSERT_BATCH) {
            inserted += diesel::insert_or_ignore_into(packages::table)
                .values(chunk)
                .execute(conn)?;
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::connection::DbConnection;

    fn record<'a>(key: &'a str, name: &'a str) -> NewPackage<'a> {
        NewPackage {
            key,
            name,
            version: "1.0",
            architecture: "amd64",
            source: None,
            files: json!([]),
            stanza: "Package: a\n",
        }
    }

    #[test]
    fn test_insert_or_ignore_dedups() {
        let dir = tempdir().unwrap();
        let mut db = DbConnection::open(dir.path().join("db")).unwrap();

        let first = [record("Pamd64 a 1.0 01", "a"), record("Pamd64 b 1.0 02", "b")];
        assert_eq!(PackageRepository::insert_or_ignore(&mut db, &first).unwrap(), 2);

        let second = [record("Pamd64 b 1.0 02", "b"), record("Pamd64 c 1.0 03", "c")];
        assert_eq!(PackageRepository::insert_or_ignore(&mut db, &second).unwrap(), 1);
        assert_eq!(PackageRepository::count(&mut db).unwrap(), 3);
    }

    #[test]
    fn test_find_by_keys_sorted_and_skips_missing() {
        let dir = tempdir().unwrap();
        let mut db = DbConnection::open(dir.path().join("db")).unwrap();
        PackageRepository::insert_or_ignore(
            &mut db,
            &[record("Pamd64 b 1.0 02", "b"), record("Pamd64 a 1.0 01", "a")],
        )
        .unwrap();

        let rows = PackageRepository::find_by_keys(
            &mut db,
            &["Pamd64 b 1.0 02", "missing", "Pamd64 a 1.0 01"],
        )
        .unwrap();
        assert_eq!(
            rows.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert!(PackageRepository::find_by_key(&mut db, "missing")
            .unwrap()
            .is_none());
    }
}
