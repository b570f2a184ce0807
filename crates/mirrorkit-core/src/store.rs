//! Content-addressed package record store shared by all mirrors.

use mirrorkit_db::{
    models::package::{NewPackage, Package},
    repository::package::PackageRepository,
};
use tracing::debug;

use crate::{
    database::MirrorDatabase,
    error::Result,
    package::{PackageFile, PackageRecord},
};

#[derive(Clone)]
pub struct PackageStore {
    db: MirrorDatabase,
}

impl PackageStore {
    pub fn new(db: MirrorDatabase) -> Self {
        Self { db }
    }

    /// Inserts every record whose key is absent and returns the keys of all
    /// records, in input order.
    ///
    /// Runs in one transaction. A record already present under the same key is
    /// left as is, which is how identical packages from several mirrors collapse
    /// into one row.
    pub fn insert_all(&self, records: &[PackageRecord]) -> Result<Vec<String>> {
        let keys: Vec<String> = records.iter().map(PackageRecord::key).collect();
        let files = records
            .iter()
            .map(|r| serde_json::to_value(&r.files))
            .collect::<serde_json::Result<Vec<_>>>()?;

        let rows: Vec<NewPackage> = records
            .iter()
            .zip(&keys)
            .zip(files)
            .map(|((record, key), files)| {
                NewPackage {
                    key,
                    name: &record.name,
                    version: &record.version,
                    architecture: &record.architecture,
                    source: record.source.as_deref(),
                    files,
                    stanza: &record.stanza,
                }
            })
            .collect();

        let inserted = self.db.transaction(|conn| {
            Ok(PackageRepository::insert_or_ignore(conn, &rows)?)
        })?;
        debug!(
            total = rows.len(),
            inserted,
            "stored package records"
        );

        Ok(keys)
    }

    pub fn get(&self, key: &str) -> Result<Option<PackageRecord>> {
        self.db
            .with_conn(|conn| PackageRepository::find_by_key(conn, key))?
            .map(into_record)
            .transpose()
    }

    /// Loads the records for `keys`, ordered by key. Missing keys are skipped.
    pub fn get_many(&self, keys: &[&str]) -> Result<Vec<PackageRecord>> {
        self.db
            .with_conn(|conn| PackageRepository::find_by_keys(conn, keys))?
            .into_iter()
            .map(into_record)
            .collect()
    }

    pub fn count(&self) -> Result<usize> {
        let count = self.db.with_conn(PackageRepository::count)?;
        Ok(count as usize)
    }
}

fn into_record(row: Package) -> Result<PackageRecord> {
    let files: Vec<PackageFile> = serde_json::from_value(row.files)?;
    Ok(PackageRecord {
        name: row.name,
        version: row.version,
        architecture: row.architecture,
        source: row.source,
        files,
        stanza: row.stanza,
    })
}
