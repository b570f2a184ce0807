//! Persistent collection of mirrors.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use mirrorkit_db::{models::mirror::Mirror, repository::mirror::MirrorRepository};
use mirrorkit_utils::lock::FileLock;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::{
    database::MirrorDatabase,
    error::{MirrorError, Result},
    mirror::RemoteRepo,
    reflist::RefList,
    snapshot::SnapshotSource,
};

/// Rows fetched per round trip while iterating.
const PAGE_SIZE: i64 = 64;

/// How often a lock held by another process is polled.
const LOCK_POLL: Duration = Duration::from_millis(100);

/// Exclusive right to fetch, download or update one mirror.
///
/// Held both within the process and across processes; released on drop.
pub struct MirrorGuard {
    name: String,
    local: Option<OwnedMutexGuard<()>>,
    file: Option<FileLock>,
    locks: LockMap,
}

impl MirrorGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for MirrorGuard {
    fn drop(&mut self) {
        drop(self.file.take());
        drop(self.local.take());

        // Waiters clone the entry under the map lock, so a count of one
        // means nobody else wants this name.
        if let Ok(mut locks) = self.locks.lock() {
            if locks
                .get(&self.name)
                .is_some_and(|entry| Arc::strong_count(entry) == 1)
            {
                locks.remove(&self.name);
            }
        }
    }
}

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Clone)]
pub struct RemoteRepoCollection {
    db: MirrorDatabase,
    lock_dir: PathBuf,
    locks: LockMap,
}

impl RemoteRepoCollection {
    pub fn new<P: Into<PathBuf>>(db: MirrorDatabase, lock_dir: P) -> Self {
        Self {
            db,
            lock_dir: lock_dir.into(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Registers a new mirror. Fails if the name is taken.
    pub fn add(&self, repo: &RemoteRepo) -> Result<()> {
        let row = repo.new_row()?;
        self.db.transaction(|conn| {
            if MirrorRepository::exists_by_name(conn, &repo.name)? {
                return Err(MirrorError::DuplicateName(repo.name.clone()));
            }
            if let Some(ref_list) = repo.ref_list() {
                ref_list.save(conn)?;
            }
            MirrorRepository::insert(conn, &row)?;
            Ok(())
        })?;

        info!(mirror = %repo.name, "mirror added");
        Ok(())
    }

    /// Loads a mirror without its package list.
    pub fn by_name(&self, name: &str) -> Result<RemoteRepo> {
        let row = self
            .db
            .with_conn(|conn| MirrorRepository::find_by_name(conn, name))?
            .ok_or_else(|| MirrorError::NotFound(name.to_string()))?;
        RemoteRepo::from_row(row)
    }

    /// Loads the package list of a downloaded mirror.
    pub fn load_complete(&self, repo: &mut RemoteRepo) -> Result<()> {
        let Some(key) = repo.ref_list_key().map(String::from) else {
            return Ok(());
        };
        if repo.ref_list().is_some_and(|list| list.key() == key) {
            return Ok(());
        }

        let ref_list = {
            let mut conn = self.db.conn()?;
            RefList::load(conn.conn(), &key)?
        };
        debug!(mirror = %repo.name, packages = ref_list.len(), "package list loaded");
        repo.set_ref_list(ref_list);
        Ok(())
    }

    /// Persists every field of `repo`, storing its package list if it is new.
    pub fn update(&self, repo: &RemoteRepo) -> Result<()> {
        let changes = repo.changes()?;
        self.db.transaction(|conn| {
            if let Some(ref_list) = repo.ref_list() {
                ref_list.save(conn)?;
            }
            if MirrorRepository::update(conn, &repo.name, &changes)? == 0 {
                return Err(MirrorError::NotFound(repo.name.clone()));
            }
            Ok(())
        })?;

        debug!(mirror = %repo.name, ref_list = repo.ref_list_key(), "mirror updated");
        Ok(())
    }

    /// Every mirror in name order, loaded a page at a time. Each call starts over.
    pub fn iter(&self) -> MirrorIter {
        MirrorIter {
            db: self.db.clone(),
            after: None,
            page: Vec::new().into_iter(),
            exhausted: false,
        }
    }

    /// Calls `f` for each mirror in name order, stopping at the first error.
    pub fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&RemoteRepo) -> Result<()>,
    {
        for repo in self.iter() {
            f(&repo?)?;
        }
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let count = self.db.with_conn(MirrorRepository::count)?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Waits until no other task or process works on `name`.
    pub async fn lock(&self, name: &str) -> Result<MirrorGuard> {
        let local = {
            let mut locks = self.locks.lock()?;
            locks.entry(name.to_string()).or_default().clone()
        };
        let local = local.lock_owned().await;

        let mut waiting = false;
        loop {
            if let Some(file) = FileLock::try_acquire(&self.lock_dir, name)? {
                debug!(mirror = name, path = %file.path().display(), "mirror locked");
                return Ok(MirrorGuard {
                    name: name.to_string(),
                    local: Some(local),
                    file: Some(file),
                    locks: self.locks.clone(),
                });
            }
            if !waiting {
                info!(mirror = name, "waiting for another process to release the mirror");
                waiting = true;
            }
            tokio::time::sleep(LOCK_POLL).await;
        }
    }

    /// Removes a mirror. Package records and package lists are kept.
    ///
    /// Unless `force` is set, fails when snapshots were taken from the mirror.
    /// Callers hold [`lock`](Self::lock) for the name so a running update
    /// finishes first.
    pub fn drop_mirror(
        &self,
        repo: &RemoteRepo,
        snapshots: &dyn SnapshotSource,
        force: bool,
    ) -> Result<()> {
        let users = snapshots.find_by_remote_repo_source(&repo.name)?;
        if !users.is_empty() {
            if !force {
                return Err(MirrorError::Referenced {
                    mirror: repo.name.clone(),
                    snapshots: users,
                });
            }
            warn!(mirror = %repo.name, snapshots = ?users, "dropping mirror used by snapshots");
        }

        let deleted = self
            .db
            .with_conn(|conn| MirrorRepository::delete_by_name(conn, &repo.name))?;
        if deleted == 0 {
            return Err(MirrorError::NotFound(repo.name.clone()));
        }

        info!(mirror = %repo.name, "mirror dropped");
        Ok(())
    }
}

/// Iterator returned by [`RemoteRepoCollection::iter`].
pub struct MirrorIter {
    db: MirrorDatabase,
    after: Option<String>,
    page: std::vec::IntoIter<Mirror>,
    exhausted: bool,
}

impl Iterator for MirrorIter {
    type Item = Result<RemoteRepo>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.page.next() {
            return Some(RemoteRepo::from_row(row));
        }
        if self.exhausted {
            return None;
        }

        let after = self.after.take();
        let rows = match self
            .db
            .with_conn(|conn| MirrorRepository::list_page(conn, after.as_deref(), PAGE_SIZE))
        {
            Ok(rows) => rows,
            Err(err) => {
                self.exhausted = true;
                return Some(Err(err));
            }
        };

        self.exhausted = (rows.len() as i64) < PAGE_SIZE;
        self.after = rows.last().map(|row| row.name.clone());
        self.page = rows.into_iter();
        self.page.next().map(RemoteRepo::from_row)
    }
}
