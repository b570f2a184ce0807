//! Minimal snapshot records, enough to protect mirrors that snapshots use.

use chrono::{DateTime, Utc};
use mirrorkit_db::{
    models::snapshot::{NewSnapshot, NewSnapshotSource, Snapshot as SnapshotRow},
    repository::snapshot::SnapshotRepository,
};
use tracing::info;

use crate::{
    database::MirrorDatabase,
    error::{MirrorError, Result},
    mirror::RemoteRepo,
    reflist::RefList,
};

const SOURCE_KIND_REPO: &str = "repo";

/// Answers which snapshots were taken from a mirror.
pub trait SnapshotSource {
    /// Snapshot names, sorted.
    fn find_by_remote_repo_source(&self, repo_name: &str) -> Result<Vec<String>>;
}

/// A frozen package list taken from a mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub source_kind: String,
    pub source_ids: Vec<String>,
    ref_list: RefList,
}

impl Snapshot {
    /// Snapshots the current package list of `repo`, which must be downloaded
    /// and loaded.
    pub fn from_mirror(repo: &RemoteRepo, name: &str) -> Result<Self> {
        let ref_list = repo
            .ref_list()
            .cloned()
            .ok_or_else(|| MirrorError::NotDownloaded(repo.name.clone()))?;

        Ok(Self {
            name: name.to_string(),
            created_at: Utc::now(),
            description: format!("Snapshot from mirror {repo}"),
            source_kind: SOURCE_KIND_REPO.to_string(),
            source_ids: vec![repo.name.clone()],
            ref_list,
        })
    }

    pub fn ref_list(&self) -> &RefList {
        &self.ref_list
    }

    pub fn ref_list_key(&self) -> String {
        self.ref_list.key()
    }
}

#[derive(Clone)]
pub struct SnapshotCollection {
    db: MirrorDatabase,
}

impl SnapshotCollection {
    pub fn new(db: MirrorDatabase) -> Self {
        Self { db }
    }

    /// Stores the snapshot, its package list and its sources in one transaction.
    pub fn add(&self, snapshot: &Snapshot) -> Result<()> {
        let key = snapshot.ref_list_key();
        self.db.transaction(|conn| {
            if SnapshotRepository::find_by_name(conn, &snapshot.name)?.is_some() {
                return Err(MirrorError::DuplicateSnapshot(snapshot.name.clone()));
            }

            snapshot.ref_list.save(conn)?;
            let sources: Vec<NewSnapshotSource> = snapshot
                .source_ids
                .iter()
                .map(|source| {
                    NewSnapshotSource {
                        snapshot_name: &snapshot.name,
                        source_kind: &snapshot.source_kind,
                        source_name: source,
                    }
                })
                .collect();
            SnapshotRepository::insert(
                conn,
                &NewSnapshot {
                    name: &snapshot.name,
                    created_at: snapshot.created_at.to_rfc3339(),
                    description: &snapshot.description,
                    source_kind: &snapshot.source_kind,
                    ref_list_key: &key,
                },
                &sources,
            )?;
            Ok(())
        })?;

        info!(snapshot = %snapshot.name, packages = snapshot.ref_list.len(), "snapshot created");
        Ok(())
    }

    pub fn by_name(&self, name: &str) -> Result<Snapshot> {
        self.db.transaction(|conn| {
            let row = SnapshotRepository::find_by_name(conn, name)?
                .ok_or_else(|| MirrorError::SnapshotNotFound(name.to_string()))?;
            let source_ids = SnapshotRepository::source_names(conn, name)?;
            let ref_list = RefList::load(conn, &row.ref_list_key)?;
            from_row(row, source_ids, ref_list)
        })
    }
}

impl SnapshotSource for SnapshotCollection {
    fn find_by_remote_repo_source(&self, repo_name: &str) -> Result<Vec<String>> {
        self.db.with_conn(|conn| {
            SnapshotRepository::find_by_source(conn, SOURCE_KIND_REPO, repo_name)
        })
    }
}

fn from_row(row: SnapshotRow, source_ids: Vec<String>, ref_list: RefList) -> Result<Snapshot> {
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|err| MirrorError::Custom(format!("snapshot {}: bad timestamp: {err}", row.name)))?;

    Ok(Snapshot {
        name: row.name,
        created_at,
        description: row.description,
        source_kind: row.source_kind,
        source_ids,
        ref_list,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mirrorkit_events::NullSink;

    use super::*;
    use crate::{
        mirror::DownloadOptions,
        testutil::{download_context, serve_archive, FakeDownloader, TestPackage},
    };

    const ROOT: &str = "http://deb.example.org/debian/";

    async fn downloaded_mirror() -> (tempfile::TempDir, MirrorDatabase, RemoteRepo) {
        let downloader = Arc::new(FakeDownloader::new());
        serve_archive(
            &downloader,
            ROOT,
            "wheezy",
            &[(
                "main/binary-amd64/Packages",
                vec![TestPackage::new("alpha", "1.0", "amd64")],
            )],
        );
        let (dir, ctx) = download_context(downloader.clone());
        let mut repo = RemoteRepo::new("wheezy-main", ROOT, "wheezy", vec![], vec![], false).unwrap();
        repo.fetch(downloader.as_ref(), None, &NullSink).unwrap();
        repo.download(&ctx, &DownloadOptions::default()).await.unwrap();

        let db = dir_database(&dir);
        (dir, db, repo)
    }

    fn dir_database(dir: &tempfile::TempDir) -> MirrorDatabase {
        MirrorDatabase::open(dir.path().join("db/mirrorkit.db")).unwrap()
    }

    #[test]
    fn test_from_mirror_requires_download() {
        let repo = RemoteRepo::new("m", ROOT, "wheezy", vec![], vec![], false).unwrap();
        assert!(matches!(
            Snapshot::from_mirror(&repo, "s"),
            Err(MirrorError::NotDownloaded(_))
        ));
    }

    #[tokio::test]
    async fn test_add_and_query() {
        let (_dir, db, repo) = downloaded_mirror().await;
        let snapshots = SnapshotCollection::new(db);

        let snapshot = Snapshot::from_mirror(&repo, "wheezy-2026").unwrap();
        assert_eq!(
            snapshot.description,
            format!("Snapshot from mirror [wheezy-main]: {ROOT} wheezy")
        );
        snapshots.add(&snapshot).unwrap();

        let loaded = snapshots.by_name("wheezy-2026").unwrap();
        assert_eq!(loaded.source_ids, vec!["wheezy-main"]);
        assert_eq!(loaded.ref_list(), repo.ref_list().unwrap());
        assert_eq!(loaded.ref_list_key(), repo.ref_list_key().unwrap());

        assert_eq!(
            snapshots.find_by_remote_repo_source("wheezy-main").unwrap(),
            vec!["wheezy-2026"]
        );
        assert!(snapshots.find_by_remote_repo_source("other").unwrap().is_empty());

        assert!(matches!(
            snapshots.add(&snapshot),
            Err(MirrorError::DuplicateSnapshot(_))
        ));
        assert!(matches!(
            snapshots.by_name("missing"),
            Err(MirrorError::SnapshotNotFound(_))
        ));
    }
}
