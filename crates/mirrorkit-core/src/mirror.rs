//! The mirror entity and its fetch and download protocols.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    io::Read,
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use mirrorkit_config::config::Config;
use mirrorkit_db::{
    error::DbError,
    models::mirror::{Mirror, MirrorChanges, NewMirror},
};
use mirrorkit_dl::{downloader::Downloader, error::DownloadError, queue::run_bounded};
use mirrorkit_events::{EventSink, EventSinkHandle, FetchStage, MirrorEvent};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    checksum::{Anomaly, ChecksumInfo},
    error::{MirrorError, Result},
    package::{parse_index, IndexKind, PackageFile},
    pool::PackagePool,
    reflist::RefList,
    release::ReleaseFile,
    store::PackageStore,
    verify::Verifier,
};

/// A remote archive tracked locally.
///
/// Identity fields are public. Fetched and downloaded state only changes through
/// [`RemoteRepo::fetch`] and [`RemoteRepo::download`], which keeps
/// `ref_list_key` and `last_download_date` set or unset together.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRepo {
    pub name: String,
    pub archive_root: String,
    pub distribution: String,
    pub components: Vec<String>,
    pub architectures: Vec<String>,
    pub download_sources: bool,
    meta: BTreeMap<String, String>,
    release_files: BTreeMap<String, ChecksumInfo>,
    last_download_date: Option<DateTime<Utc>>,
    ref_list_key: Option<String>,
    ref_list: Option<RefList>,
    created_at: DateTime<Utc>,
}

/// Collaborators used by [`RemoteRepo::download`].
#[derive(Clone)]
pub struct DownloadContext {
    pub downloader: Arc<dyn Downloader>,
    pub store: PackageStore,
    pub pool: PackagePool,
    pub events: EventSinkHandle,
}

impl DownloadContext {
    pub fn new(
        downloader: Arc<dyn Downloader>,
        store: PackageStore,
        pool: PackagePool,
        events: EventSinkHandle,
    ) -> Self {
        Self {
            downloader,
            store,
            pool,
            events,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Record checksum mismatches as anomalies instead of failing.
    pub ignore_checksums: bool,
    /// Also fetch the package files into the pool.
    pub download_packages: bool,
    pub concurrency: usize,
    /// Upper bound for the whole download. Exceeding it commits nothing.
    pub deadline: Option<Duration>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            ignore_checksums: false,
            download_packages: true,
            concurrency: 4,
            deadline: None,
        }
    }
}

impl DownloadOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            concurrency: config.download_concurrency(),
            deadline: config.update_deadline()?,
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub mirror: String,
    pub ref_list_key: String,
    pub packages: usize,
    pub indices: usize,
    pub files_downloaded: usize,
    pub anomalies: Vec<Anomaly>,
}

impl RemoteRepo {
    pub fn new(
        name: &str,
        archive_root: &str,
        distribution: &str,
        components: Vec<String>,
        architectures: Vec<String>,
        download_sources: bool,
    ) -> Result<Self> {
        if name.is_empty() || name.contains(char::is_whitespace) || name.contains('/') {
            return Err(MirrorError::InvalidMirror(format!(
                "`{name}` is not a valid mirror name"
            )));
        }

        let url = Url::parse(archive_root).map_err(|err| {
            MirrorError::InvalidMirror(format!("`{archive_root}` is not a valid URL: {err}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MirrorError::InvalidMirror(format!(
                "unsupported URL scheme `{}`",
                url.scheme()
            )));
        }
        let mut archive_root = url.to_string();
        if !archive_root.ends_with('/') {
            archive_root.push('/');
        }

        let distribution = distribution.trim_matches('/');
        if distribution.is_empty() || distribution == "." {
            return Err(MirrorError::InvalidMirror(
                "flat repositories are not supported".into(),
            ));
        }

        for (kind, values) in [("component", &components), ("architecture", &architectures)] {
            let mut seen = BTreeSet::new();
            for value in values {
                if value.is_empty() || !seen.insert(value.as_str()) {
                    return Err(MirrorError::InvalidMirror(format!(
                        "{kind} `{value}` is empty or listed twice"
                    )));
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            archive_root,
            distribution: distribution.to_string(),
            components,
            architectures,
            download_sources,
            meta: BTreeMap::new(),
            release_files: BTreeMap::new(),
            last_download_date: None,
            ref_list_key: None,
            ref_list: None,
            created_at: Utc::now(),
        })
    }

    pub fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    pub fn last_download_date(&self) -> Option<DateTime<Utc>> {
        self.last_download_date
    }

    pub fn ref_list_key(&self) -> Option<&str> {
        self.ref_list_key.as_deref()
    }

    /// The package list, present after a download or `load_complete`.
    pub fn ref_list(&self) -> Option<&RefList> {
        self.ref_list.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_fetched(&self) -> bool {
        !self.release_files.is_empty()
    }

    pub fn num_packages(&self) -> usize {
        self.ref_list.as_ref().map_or(0, RefList::len)
    }

    pub fn release_url(&self) -> String {
        self.index_url("Release")
    }

    pub fn signature_url(&self, verifier: &dyn Verifier) -> String {
        self.index_url(verifier.signature_file())
    }

    /// URL of a file below `dists/{distribution}/`.
    pub fn index_url(&self, path: &str) -> String {
        format!("{}dists/{}/{}", self.archive_root, self.distribution, path)
    }

    /// URL of a file given relative to the archive root.
    pub fn package_url(&self, filename: &str) -> String {
        format!("{}{}", self.archive_root, filename.trim_start_matches('/'))
    }

    fn transport(&self, url: &str, source: DownloadError) -> MirrorError {
        MirrorError::Transport {
            mirror: self.name.clone(),
            url: url.to_string(),
            source,
        }
    }

    /// Downloads and verifies the Release file, then refreshes `meta` and the
    /// index list.
    ///
    /// Without a verifier the Release file is trusted as is. Nothing changes on
    /// failure, and download state is never touched.
    pub fn fetch(
        &mut self,
        downloader: &dyn Downloader,
        verifier: Option<&dyn Verifier>,
        events: &dyn EventSink,
    ) -> Result<()> {
        let release_url = self.release_url();
        info!(mirror = %self.name, url = %release_url, "downloading Release file");
        events.emit(MirrorEvent::Fetch {
            mirror: self.name.clone(),
            stage: FetchStage::Release,
        });
        let document = downloader
            .fetch_url(&release_url)
            .map_err(|err| self.transport(&release_url, err))?;

        match verifier {
            Some(verifier) => {
                let url = self.signature_url(verifier);
                events.emit(MirrorEvent::Fetch {
                    mirror: self.name.clone(),
                    stage: FetchStage::Signature,
                });
                let signature = match downloader.fetch_url(&url) {
                    Ok(signature) => Some(signature),
                    Err(DownloadError::HttpError { status: 404, .. }) => None,
                    Err(err) => return Err(self.transport(&url, err)),
                };

                if !verifier.verify(&document, signature.as_deref())? {
                    let reason = if signature.is_some() {
                        "signature does not match any trusted key"
                    } else {
                        "signature file not found"
                    };
                    return Err(MirrorError::Authenticity {
                        mirror: self.name.clone(),
                        url,
                        reason: reason.into(),
                    });
                }
                debug!(mirror = %self.name, "Release signature verified");
            }
            None => {
                warn!(mirror = %self.name, "signature verification is disabled, trusting Release as is");
                events.emit(MirrorEvent::Fetch {
                    mirror: self.name.clone(),
                    stage: FetchStage::SignatureSkipped,
                });
            }
        }

        let release = ReleaseFile::parse(&document).map_err(|reason| {
            MirrorError::Parse {
                mirror: self.name.clone(),
                location: release_url.clone(),
                reason,
            }
        })?;

        let architectures = self.select(
            "architecture",
            &self.architectures,
            release.architectures(),
        )?;
        let components = self.select("component", &self.components, release.components())?;

        self.meta = release.meta;
        self.release_files = release.files;
        self.architectures = architectures;
        self.components = components;

        events.emit(MirrorEvent::Fetch {
            mirror: self.name.clone(),
            stage: FetchStage::Complete {
                indices: self.release_files.len(),
            },
        });
        Ok(())
    }

    /// Takes everything offered when nothing was requested, otherwise checks
    /// every requested value is offered.
    fn select(
        &self,
        kind: &'static str,
        requested: &[String],
        available: Vec<String>,
    ) -> Result<Vec<String>> {
        if requested.is_empty() {
            if available.is_empty() {
                return Err(MirrorError::Parse {
                    mirror: self.name.clone(),
                    location: self.release_url(),
                    reason: format!("no {kind}s listed"),
                });
            }
            return Ok(available);
        }

        if let Some(missing) = requested.iter().find(|r| !available.contains(r)) {
            return Err(MirrorError::Unavailable {
                mirror: self.name.clone(),
                kind,
                value: missing.clone(),
                available,
            });
        }
        Ok(requested.to_vec())
    }

    /// Downloads indices, stores their packages and builds a new package list.
    ///
    /// State is committed only once everything succeeded within the deadline;
    /// on any error the previous package list and download date are kept.
    pub async fn download(
        &mut self,
        ctx: &DownloadContext,
        options: &DownloadOptions,
    ) -> Result<DownloadReport> {
        if !self.is_fetched() {
            return Err(MirrorError::NotFetched(self.name.clone()));
        }

        let collected = match options.deadline {
            Some(after) => {
                tokio::time::timeout(after, self.collect(ctx, options))
                    .await
                    .map_err(|_| {
                        MirrorError::Timeout {
                            mirror: self.name.clone(),
                            after,
                        }
                    })??
            }
            None => self.collect(ctx, options).await?,
        };

        let key = collected.ref_list.key();
        let packages = collected.ref_list.len();
        self.ref_list_key = Some(key.clone());
        self.last_download_date = Some(Utc::now());
        self.ref_list = Some(collected.ref_list);

        info!(mirror = %self.name, packages, ref_list = %key, "download complete");
        ctx.events.emit(MirrorEvent::DownloadComplete {
            mirror: self.name.clone(),
            package_count: packages,
        });

        Ok(DownloadReport {
            mirror: self.name.clone(),
            ref_list_key: key,
            packages,
            indices: collected.indices,
            files_downloaded: collected.files_downloaded,
            anomalies: collected.anomalies,
        })
    }

    fn plan_indices(&self) -> Result<Vec<(String, IndexKind)>> {
        let mut wanted = Vec::new();
        for component in &self.components {
            for arch in &self.architectures {
                wanted.push((format!("{component}/binary-{arch}/Packages"), IndexKind::Binary));
            }
        }
        if self.download_sources {
            for component in &self.components {
                wanted.push((format!("{component}/source/Sources"), IndexKind::Source));
            }
        }

        wanted
            .into_iter()
            .map(|(path, kind)| {
                let gz = format!("{path}.gz");
                if self.release_files.contains_key(&gz) {
                    Ok((gz, kind))
                } else if self.release_files.contains_key(&path) {
                    Ok((path, kind))
                } else {
                    Err(MirrorError::Parse {
                        mirror: self.name.clone(),
                        location: self.index_url(&path),
                        reason: "index not listed in Release".into(),
                    })
                }
            })
            .collect()
    }

    async fn collect(&self, ctx: &DownloadContext, options: &DownloadOptions) -> Result<Collected> {
        let plan = self.plan_indices()?;
        let indices = plan.len();
        info!(mirror = %self.name, indices, "downloading package indices");
        ctx.events.emit(MirrorEvent::IndicesPlanned {
            mirror: self.name.clone(),
            total: indices,
        });

        let jobs: Vec<_> = plan
            .into_iter()
            .map(|(path, kind)| {
                let job = IndexJob {
                    mirror: self.name.clone(),
                    url: self.index_url(&path),
                    checksums: self.release_files.get(&path).cloned().unwrap_or_default(),
                    compressed: path.ends_with(".gz"),
                    path,
                    kind,
                    ignore_checksums: options.ignore_checksums,
                    keep_files: options.download_packages,
                    downloader: ctx.downloader.clone(),
                    store: ctx.store.clone(),
                    events: ctx.events.clone(),
                };
                move |cancel: &AtomicBool| job.run(cancel)
            })
            .collect();
        let outcomes = run_bounded(jobs, options.concurrency).await?;

        let mut keys = Vec::new();
        let mut anomalies = Vec::new();
        let mut files: BTreeMap<String, (String, PackageFile)> = BTreeMap::new();
        for outcome in outcomes {
            keys.extend(outcome.keys);
            anomalies.extend(outcome.anomaly);
            for (package, file) in outcome.files {
                files.entry(file.filename.clone()).or_insert((package, file));
            }
        }

        let files_downloaded = if options.download_packages {
            let fetched = self.download_files(ctx, options, files).await?;
            let count = fetched.len();
            anomalies.extend(fetched.into_iter().flatten());
            count
        } else {
            0
        };

        Ok(Collected {
            ref_list: RefList::from_keys(keys),
            indices,
            files_downloaded,
            anomalies,
        })
    }

    async fn download_files(
        &self,
        ctx: &DownloadContext,
        options: &DownloadOptions,
        files: BTreeMap<String, (String, PackageFile)>,
    ) -> Result<Vec<Option<Anomaly>>> {
        let missing: Vec<(String, PackageFile)> = files
            .into_values()
            .filter(|(_, file)| !ctx.pool.contains(file))
            .collect();
        let bytes = missing.iter().map(|(_, f)| f.checksums.size).sum();
        info!(mirror = %self.name, files = missing.len(), bytes, "downloading package files");
        ctx.events.emit(MirrorEvent::PackagesPlanned {
            mirror: self.name.clone(),
            total: missing.len(),
            bytes,
        });

        let jobs: Vec<_> = missing
            .into_iter()
            .map(|(package, file)| {
                let job = PackageJob {
                    mirror: self.name.clone(),
                    url: self.package_url(&file.filename),
                    package,
                    file,
                    ignore_checksums: options.ignore_checksums,
                    downloader: ctx.downloader.clone(),
                    pool: ctx.pool.clone(),
                    events: ctx.events.clone(),
                };
                move |cancel: &AtomicBool| job.run(cancel)
            })
            .collect();

        run_bounded(jobs, options.concurrency).await
    }

    pub(crate) fn set_ref_list(&mut self, ref_list: RefList) {
        self.ref_list = Some(ref_list);
    }

    pub(crate) fn new_row(&self) -> Result<NewMirror<'_>> {
        Ok(NewMirror {
            name: &self.name,
            archive_root: &self.archive_root,
            distribution: &self.distribution,
            components: serde_json::to_value(&self.components)?,
            architectures: serde_json::to_value(&self.architectures)?,
            download_sources: self.download_sources,
            meta: serde_json::to_value(&self.meta)?,
            release_files: serde_json::to_value(&self.release_files)?,
            last_download_date: self.last_download_date.map(|d| d.to_rfc3339()),
            ref_list_key: self.ref_list_key.as_deref(),
            created_at: self.created_at.to_rfc3339(),
        })
    }

    pub(crate) fn changes(&self) -> Result<MirrorChanges<'_>> {
        let row = self.new_row()?;
        Ok(MirrorChanges {
            archive_root: row.archive_root,
            distribution: row.distribution,
            components: row.components,
            architectures: row.architectures,
            download_sources: row.download_sources,
            meta: row.meta,
            release_files: row.release_files,
            last_download_date: row.last_download_date,
            ref_list_key: row.ref_list_key,
        })
    }

    /// Rebuilds a mirror from its row. The package list is not loaded.
    pub(crate) fn from_row(row: Mirror) -> Result<Self> {
        let last_download_date = row.last_download_date.as_deref().map(parse_time).transpose()?;
        if last_download_date.is_some() != row.ref_list_key.is_some() {
            return Err(DbError::IntegrityError(format!(
                "mirror {} has a download date without a package list or the reverse",
                row.name
            ))
            .into());
        }

        Ok(Self {
            components: serde_json::from_value(row.components)?,
            architectures: serde_json::from_value(row.architectures)?,
            meta: serde_json::from_value(row.meta)?,
            release_files: serde_json::from_value(row.release_files)?,
            created_at: parse_time(&row.created_at)?,
            name: row.name,
            archive_root: row.archive_root,
            distribution: row.distribution,
            download_sources: row.download_sources,
            last_download_date,
            ref_list_key: row.ref_list_key,
            ref_list: None,
        })
    }
}

impl fmt::Display for RemoteRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]: {} {}", self.name, self.archive_root, self.distribution)?;
        if self.download_sources {
            write!(f, " [src]")?;
        }
        Ok(())
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|err| DbError::IntegrityError(format!("bad timestamp `{value}`: {err}")).into())
}

struct Collected {
    ref_list: RefList,
    indices: usize,
    files_downloaded: usize,
    anomalies: Vec<Anomaly>,
}

/// Checks `data`, turning a mismatch into an error or, when ignored, an anomaly.
fn check(
    mirror: &str,
    url: &str,
    checksums: &ChecksumInfo,
    data: &[u8],
    ignore: bool,
    events: &dyn EventSink,
) -> Result<Option<Anomaly>> {
    let Err(mismatch) = checksums.verify(data) else {
        return Ok(None);
    };

    if !ignore {
        return Err(MirrorError::ChecksumMismatch {
            mirror: mirror.to_string(),
            url: url.to_string(),
            kind: mismatch.kind,
            expected: mismatch.expected,
            actual: mismatch.actual,
        });
    }

    warn!(
        mirror,
        url,
        kind = mismatch.kind,
        expected = %mismatch.expected,
        actual = %mismatch.actual,
        "checksum mismatch ignored"
    );
    events.emit(MirrorEvent::ChecksumAnomaly {
        mirror: mirror.to_string(),
        url: url.to_string(),
        expected: mismatch.expected.clone(),
        actual: mismatch.actual.clone(),
    });
    Ok(Some(Anomaly::new(url, mismatch)))
}

struct IndexJob {
    mirror: String,
    path: String,
    url: String,
    checksums: ChecksumInfo,
    kind: IndexKind,
    compressed: bool,
    ignore_checksums: bool,
    keep_files: bool,
    downloader: Arc<dyn Downloader>,
    store: PackageStore,
    events: EventSinkHandle,
}

struct IndexOutcome {
    keys: Vec<String>,
    files: Vec<(String, PackageFile)>,
    anomaly: Option<Anomaly>,
}

impl IndexJob {
    fn parse_error(&self, reason: String) -> MirrorError {
        MirrorError::Parse {
            mirror: self.mirror.clone(),
            location: self.url.clone(),
            reason,
        }
    }

    fn run(self, cancel: &AtomicBool) -> Result<IndexOutcome> {
        let data = self
            .downloader
            .fetch_url_cancellable(&self.url, cancel)
            .map_err(|err| {
                MirrorError::Transport {
                    mirror: self.mirror.clone(),
                    url: self.url.clone(),
                    source: err,
                }
            })?;

        let anomaly = check(
            &self.mirror,
            &self.url,
            &self.checksums,
            &data,
            self.ignore_checksums,
            self.events.as_ref(),
        )?;

        let data = if self.compressed {
            let mut out = Vec::new();
            GzDecoder::new(data.as_slice())
                .read_to_end(&mut out)
                .map_err(|err| self.parse_error(format!("bad gzip stream: {err}")))?;
            out
        } else {
            data
        };
        let text = String::from_utf8(data)
            .map_err(|err| self.parse_error(format!("not UTF-8: {err}")))?;

        let records = parse_index(&text, self.kind).map_err(|reason| self.parse_error(reason))?;
        let keys = self.store.insert_all(&records)?;
        debug!(mirror = %self.mirror, index = %self.path, packages = records.len(), "index stored");
        self.events.emit(MirrorEvent::IndexParsed {
            mirror: self.mirror.clone(),
            path: self.path.clone(),
            packages: records.len(),
        });

        let files = if self.keep_files {
            records
                .into_iter()
                .flat_map(|record| {
                    let label = record.to_string();
                    record.files.into_iter().map(move |f| (label.clone(), f))
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(IndexOutcome {
            keys,
            files,
            anomaly,
        })
    }
}

struct PackageJob {
    mirror: String,
    package: String,
    url: String,
    file: PackageFile,
    ignore_checksums: bool,
    downloader: Arc<dyn Downloader>,
    pool: PackagePool,
    events: EventSinkHandle,
}

impl PackageJob {
    fn run(self, cancel: &AtomicBool) -> Result<Option<Anomaly>> {
        let data = self
            .downloader
            .fetch_url_cancellable(&self.url, cancel)
            .map_err(|err| {
                MirrorError::Fetch {
                    mirror: self.mirror.clone(),
                    package: self.package.clone(),
                    url: self.url.clone(),
                    source: err,
                }
            })?;

        let anomaly = check(
            &self.mirror,
            &self.url,
            &self.file.checksums,
            &data,
            self.ignore_checksums,
            self.events.as_ref(),
        )?;

        // Pool names promise their content; tolerated mismatches stay out.
        if anomaly.is_none() {
            self.pool.store(&self.file, &data)?;
        }
        self.events.emit(MirrorEvent::PackageDownloaded {
            mirror: self.mirror.clone(),
            filename: self.file.filename.clone(),
            size: data.len() as u64,
        });
        Ok(anomaly)
    }
}
