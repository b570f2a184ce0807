//! Shared fixtures for unit tests.

use std::{
    collections::HashMap,
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use flate2::{write::GzEncoder, Compression};
use mirrorkit_dl::{
    downloader::Downloader,
    error::{DownloadError, Result as DownloadResult},
};
use mirrorkit_events::NullSink;
use mirrorkit_utils::hash::{md5_hex, sha256_hex};
use tempfile::{tempdir, TempDir};

use crate::{
    database::MirrorDatabase,
    error::Result,
    mirror::DownloadContext,
    pool::PackagePool,
    snapshot::SnapshotSource,
    store::PackageStore,
};

/// In-memory downloader. Unknown URLs answer 404.
#[derive(Default)]
pub struct FakeDownloader {
    files: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, u16>>,
    delays: Mutex<HashMap<String, Duration>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: &[u8]) {
        self.files.lock().unwrap().insert(url.to_string(), body.to_vec());
    }

    pub fn remove(&self, url: &str) {
        self.files.lock().unwrap().remove(url);
    }

    /// Answers `url` with an HTTP error status.
    pub fn fail(&self, url: &str, status: u16) {
        self.failures.lock().unwrap().insert(url.to_string(), status);
    }

    /// Holds every request for `url` for `delay`, or until cancelled.
    pub fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl Downloader for FakeDownloader {
    fn fetch_url_cancellable(&self, url: &str, cancel: &AtomicBool) -> DownloadResult<Vec<u8>> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_default() += 1;

        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            let until = Instant::now() + delay;
            while Instant::now() < until {
                if cancel.load(Ordering::Relaxed) {
                    return Err(DownloadError::Cancelled {
                        url: url.to_string(),
                    });
                }
                thread::sleep(Duration::from_millis(10));
            }
        }

        if let Some(status) = self.failures.lock().unwrap().get(url) {
            return Err(DownloadError::HttpError {
                status: *status,
                url: url.to_string(),
            });
        }

        self.files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| {
                DownloadError::HttpError {
                    status: 404,
                    url: url.to_string(),
                }
            })
    }
}

#[derive(Default)]
pub struct FakeSnapshotSource {
    pub by_mirror: HashMap<String, Vec<String>>,
}

impl FakeSnapshotSource {
    pub fn with(mirror: &str, snapshots: &[&str]) -> Self {
        let mut by_mirror = HashMap::new();
        by_mirror.insert(
            mirror.to_string(),
            snapshots.iter().map(|s| s.to_string()).collect(),
        );
        Self { by_mirror }
    }
}

impl SnapshotSource for FakeSnapshotSource {
    fn find_by_remote_repo_source(&self, repo_name: &str) -> Result<Vec<String>> {
        Ok(self.by_mirror.get(repo_name).cloned().unwrap_or_default())
    }
}

/// A binary package whose file content is its name.
pub struct TestPackage {
    pub name: String,
    pub version: String,
    pub arch: String,
}

impl TestPackage {
    pub fn new(name: &str, version: &str, arch: &str) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch: arch.into(),
        }
    }

    pub fn filename(&self) -> String {
        let initial = self.name.chars().next().unwrap_or('_');
        format!(
            "pool/main/{initial}/{0}/{0}_{1}_{2}.deb",
            self.name, self.version, self.arch
        )
    }

    pub fn content(&self) -> Vec<u8> {
        self.name.as_bytes().to_vec()
    }

    fn stanza(&self) -> String {
        let content = self.content();
        format!(
            "Package: {}\nVersion: {}\nArchitecture: {}\nFilename: {}\nSize: {}\nMD5sum: {}\nSHA256: {}\n",
            self.name,
            self.version,
            self.arch,
            self.filename(),
            content.len(),
            md5_hex(&content),
            sha256_hex(&content),
        )
    }
}

pub fn packages_index(packages: &[TestPackage]) -> String {
    packages
        .iter()
        .map(TestPackage::stanza)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A Release file listing `files` with MD5 and SHA256 sums.
pub fn release_file(
    codename: &str,
    architectures: &[&str],
    components: &[&str],
    files: &[(&str, &[u8])],
) -> String {
    let mut out = format!(
        "Codename: {codename}\nArchitectures: {}\nComponents: {}\nMD5Sum:\n",
        architectures.join(" "),
        components.join(" ")
    );
    for (path, data) in files {
        out.push_str(&format!(" {} {} {path}\n", md5_hex(data), data.len()));
    }
    out.push_str("SHA256:\n");
    for (path, data) in files {
        out.push_str(&format!(" {} {} {path}\n", sha256_hex(data), data.len()));
    }
    out
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn temp_database() -> (TempDir, MirrorDatabase) {
    let dir = tempdir().unwrap();
    let db = MirrorDatabase::open(dir.path().join("db/mirrorkit.db")).unwrap();
    (dir, db)
}

pub fn download_context(downloader: Arc<dyn Downloader>) -> (TempDir, DownloadContext) {
    let (dir, db) = temp_database();
    let ctx = DownloadContext::new(
        downloader,
        PackageStore::new(db),
        PackagePool::new(dir.path().join("pool")),
        Arc::new(NullSink),
    );
    (dir, ctx)
}

/// Serves a Release file, its indices and every package file below `root`.
pub fn serve_archive(
    downloader: &FakeDownloader,
    root: &str,
    dist: &str,
    indices: &[(&str, Vec<TestPackage>)],
) {
    let bodies: Vec<(String, String)> = indices
        .iter()
        .map(|(path, packages)| (path.to_string(), packages_index(packages)))
        .collect();
    let listed: Vec<(&str, &[u8])> = bodies
        .iter()
        .map(|(path, body)| (path.as_str(), body.as_bytes()))
        .collect();

    let mut archs: Vec<&str> = Vec::new();
    let mut comps: Vec<&str> = Vec::new();
    for (path, _) in indices {
        let mut parts = path.split('/');
        if let (Some(comp), Some(binary)) = (parts.next(), parts.next()) {
            if !comps.contains(&comp) {
                comps.push(comp);
            }
            if let Some(arch) = binary.strip_prefix("binary-") {
                if !archs.contains(&arch) {
                    archs.push(arch);
                }
            }
        }
    }

    downloader.serve(
        &format!("{root}dists/{dist}/Release"),
        release_file(dist, &archs, &comps, &listed).as_bytes(),
    );
    for (path, body) in &bodies {
        downloader.serve(&format!("{root}dists/{dist}/{path}"), body.as_bytes());
    }
    for (_, packages) in indices {
        for package in packages {
            downloader.serve(&format!("{root}{}", package.filename()), &package.content());
        }
    }
}
