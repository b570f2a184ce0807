//! Mirror create and update workflows.

use std::sync::Arc;

use tracing::info;

use crate::{
    collection::RemoteRepoCollection,
    error::{MirrorError, Result},
    mirror::{DownloadContext, DownloadOptions, DownloadReport, RemoteRepo},
    reflist::PackageDiff,
    verify::Verifier,
};

/// Outcome of [`MirrorSync::update`].
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub download: DownloadReport,
    /// Changes against the previous package list, empty on first download.
    pub changes: Vec<PackageDiff>,
}

impl UpdateReport {
    /// Counts of (added, removed, changed) packages.
    pub fn summary(&self) -> (usize, usize, usize) {
        self.changes
            .iter()
            .fold((0, 0, 0), |(a, r, c), diff| {
                match diff {
                    PackageDiff::Added(_) => (a + 1, r, c),
                    PackageDiff::Removed(_) => (a, r + 1, c),
                    PackageDiff::Changed { .. } => (a, r, c + 1),
                }
            })
    }
}

/// Everything needed to create and update mirrors.
#[derive(Clone)]
pub struct MirrorSync {
    repos: RemoteRepoCollection,
    ctx: DownloadContext,
    verifier: Option<Arc<dyn Verifier>>,
}

impl MirrorSync {
    /// Without a verifier, Release files are accepted unsigned.
    pub fn new(
        repos: RemoteRepoCollection,
        ctx: DownloadContext,
        verifier: Option<Arc<dyn Verifier>>,
    ) -> Self {
        Self {
            repos,
            ctx,
            verifier,
        }
    }

    pub fn repos(&self) -> &RemoteRepoCollection {
        &self.repos
    }

    pub fn context(&self) -> &DownloadContext {
        &self.ctx
    }

    /// Fetches the Release file of a new mirror and registers it.
    ///
    /// Nothing is stored when the fetch fails.
    pub async fn create(&self, repo: RemoteRepo) -> Result<RemoteRepo> {
        match self.repos.by_name(&repo.name) {
            Ok(_) => return Err(MirrorError::DuplicateName(repo.name)),
            Err(MirrorError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let repo = self.fetch(repo).await?;
        self.repos.add(&repo)?;
        info!(mirror = %repo.name, "mirror created");
        Ok(repo)
    }

    /// Refreshes a mirror: fetch, download, then persist the new package list.
    ///
    /// Updates of the same mirror run one at a time. A failed update leaves the
    /// stored mirror as it was.
    pub async fn update(&self, name: &str, options: &DownloadOptions) -> Result<UpdateReport> {
        let _guard = self.repos.lock(name).await?;

        let mut repo = self.repos.by_name(name)?;
        self.repos.load_complete(&mut repo)?;
        let previous = repo.ref_list().cloned();

        let mut repo = self.fetch(repo).await?;
        let download = repo.download(&self.ctx, options).await?;
        self.repos.update(&repo)?;

        let changes = match (previous, repo.ref_list()) {
            (Some(previous), Some(current)) => previous.diff(current),
            (None, Some(current)) => {
                current
                    .iter()
                    .map(|key| PackageDiff::Added(key.to_string()))
                    .collect()
            }
            _ => Vec::new(),
        };

        let report = UpdateReport { download, changes };
        let (added, removed, changed) = report.summary();
        info!(
            mirror = name,
            packages = report.download.packages,
            added,
            removed,
            changed,
            "mirror updated"
        );
        Ok(report)
    }

    async fn fetch(&self, mut repo: RemoteRepo) -> Result<RemoteRepo> {
        let downloader = self.ctx.downloader.clone();
        let verifier = self.verifier.clone();
        let events = self.ctx.events.clone();

        tokio::task::spawn_blocking(move || {
            repo.fetch(downloader.as_ref(), verifier.as_deref(), &*events)?;
            Ok::<_, MirrorError>(repo)
        })
        .await
        .map_err(|err| MirrorError::Custom(format!("fetch task failed: {err}")))?
    }
}
