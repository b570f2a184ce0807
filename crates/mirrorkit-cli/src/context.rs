use std::{path::PathBuf, sync::Arc};

use miette::Result;
use mirrorkit_config::config::Config;
use mirrorkit_core::{
    collection::RemoteRepoCollection,
    database::MirrorDatabase,
    mirror::DownloadContext,
    pool::PackagePool,
    snapshot::SnapshotCollection,
    store::PackageStore,
    sync::MirrorSync,
    verify::{MinisignVerifier, Verifier},
};
use mirrorkit_dl::{
    downloader::{Downloader, HttpDownloader},
    http_client::ClientConfig,
    retry::RetryPolicy,
};
use tracing::{debug, warn};

use crate::{cli::TrustArgs, progress::ProgressSink};

/// Everything a command needs, opened once from the config.
pub struct AppContext {
    pub config: Config,
    pub db: MirrorDatabase,
    pub progress: Arc<ProgressSink>,
}

impl AppContext {
    pub fn open(config: Config) -> Result<Self> {
        let db = MirrorDatabase::open(config.db_path())?;
        debug!(db = %config.db_path().display(), "database opened");
        Ok(Self {
            config,
            db,
            progress: Arc::new(ProgressSink::new()),
        })
    }

    pub fn repos(&self) -> RemoteRepoCollection {
        RemoteRepoCollection::new(self.db.clone(), self.config.lock_dir())
    }

    pub fn snapshots(&self) -> SnapshotCollection {
        SnapshotCollection::new(self.db.clone())
    }

    pub fn store(&self) -> PackageStore {
        PackageStore::new(self.db.clone())
    }

    pub fn downloader(&self) -> Result<Arc<dyn Downloader>> {
        let client = ClientConfig {
            user_agent: self
                .config
                .user_agent
                .clone()
                .or_else(|| ClientConfig::default().user_agent),
            proxy: self.config.proxy.clone(),
            timeout: Some(self.config.download_timeout()?),
        };
        let retry = RetryPolicy::new(self.config.download_retries(), self.config.retry_backoff()?);
        Ok(Arc::new(HttpDownloader::new(&client, retry)?))
    }

    /// Builds the Release verifier, or `None` when signatures are not checked.
    pub fn verifier(&self, trust: &TrustArgs) -> Result<Option<Arc<dyn Verifier>>> {
        if trust.ignore_signatures || !self.config.signature_verification() {
            warn!("Signature verification disabled, Release files are trusted as is");
            return Ok(None);
        }

        let mut keyrings: Vec<PathBuf> = self.config.keyring_paths()?;
        keyrings.extend(trust.keyrings.iter().cloned());
        if keyrings.is_empty() {
            warn!("No keyrings configured, Release files are trusted as is");
            return Ok(None);
        }

        let verifier = MinisignVerifier::from_keyrings(&keyrings)?;
        Ok(Some(Arc::new(verifier)))
    }

    pub fn sync(&self, trust: &TrustArgs) -> Result<MirrorSync> {
        let ctx = DownloadContext::new(
            self.downloader()?,
            self.store(),
            PackagePool::new(self.config.pool_path()),
            self.progress.clone(),
        );
        Ok(MirrorSync::new(self.repos(), ctx, self.verifier(trust)?))
    }
}
