use diesel::prelude::*;

use crate::{
    models::snapshot::{NewSnapshot, NewSnapshotSource, Snapshot},
    schema::core::{snapshot_sources, snapshots},
};

pub struct SnapshotRepository;

impl SnapshotRepository {
    pub fn find_by_name(conn: &mut SqliteConnection, name: &str) -> QueryResult<Option<Snapshot>> {
        snapshots::table
            .find(name)
            .select(Snapshot::as_select())
            .first(conn)
            .optional()
    }

    pub fn source_names(conn: &mut SqliteConnection, name: &str) -> QueryResult<Vec<String>> {
        snapshot_sources::table
            .filter(snapshot_sources::snapshot_name.eq(name))
            .order(snapshot_sources::source_name.asc())
            .select(snapshot_sources::source_name)
            .load(conn)
    }

    /// Inserts a snapshot together with its source rows.
    pub fn insert(
        conn: &mut SqliteConnection,
        snapshot: &NewSnapshot,
        sources: &[NewSnapshotSource],
    ) -> QueryResult<()> {
        conn.transaction(|conn| {
            diesel::insert_into(snapshots::table)
                .values(snapshot)
                .execute(conn)?;
            diesel::insert_into(snapshot_sources::table)
                .values(sources)
                .execute(conn)?;
            Ok(())
        })
    }

    /// Names of snapshots built from the given source, sorted.
    pub fn find_by_source(
        conn: &mut SqliteConnection,
        source_kind: &str,
        source_name: &str,
    ) -> QueryResult<Vec<String>> {
        snapshot_sources::table
            .filter(snapshot_sources::source_kind.eq(source_kind))
            .filter(snapshot_sources::source_name.eq(source_name))
            .order(snapshot_sources::snapshot_name.asc())
            .select(snapshot_sources::snapshot_name)
            .distinct()
            .load(conn)
    }
}
