/// Events emitted while a mirror is fetched and downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    /// Release file retrieval and verification.
    Fetch { mirror: String, stage: FetchStage },
    /// Index files have been planned and are about to be downloaded.
    IndicesPlanned { mirror: String, total: usize },
    /// One index file was downloaded and parsed.
    IndexParsed {
        mirror: String,
        path: String,
        packages: usize,
    },
    /// Package files missing from the pool, about to be downloaded.
    PackagesPlanned {
        mirror: String,
        total: usize,
        bytes: u64,
    },
    /// One package file landed in the pool.
    PackageDownloaded {
        mirror: String,
        filename: String,
        size: u64,
    },
    /// A checksum mismatch that was ignored on request.
    ChecksumAnomaly {
        mirror: String,
        url: String,
        expected: String,
        actual: String,
    },
    /// The new package list was committed to the mirror.
    DownloadComplete { mirror: String, package_count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStage {
    Release,
    Signature,
    /// Verification was turned off for this fetch.
    SignatureSkipped,
    Complete { indices: usize },
}
