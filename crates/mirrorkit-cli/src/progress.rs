use std::{
    sync::{Arc, LazyLock, Mutex},
    time::Duration,
};

use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use mirrorkit_events::{EventSink, FetchStage, MirrorEvent};
use nu_ansi_term::Color::Cyan;
use tracing::{debug, info, warn};

use crate::utils::{progress_enabled, Colored};

static MULTI: LazyLock<Arc<MultiProgress>> = LazyLock::new(|| Arc::new(MultiProgress::new()));

/// Pause progress display, run the closure, then resume.
pub fn suspend<F: FnOnce()>(f: F) {
    MULTI.suspend(f);
}

/// Stop and clear all progress bars.
pub fn stop() {
    MULTI.clear().ok();
}

fn count_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {prefix}  {wide_bar:.cyan/dim}  {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━─")
}

fn bytes_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {prefix}  {wide_bar:.cyan/dim}  {bytes}/{total_bytes}  {bytes_per_sec}  {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━━─")
}

fn new_bar(len: u64, style: ProgressStyle, prefix: String) -> ProgressBar {
    let pb = if progress_enabled() {
        MULTI.add(ProgressBar::new(len))
    } else {
        MULTI.add(ProgressBar::hidden())
    };
    pb.set_style(style);
    pb.set_prefix(prefix);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[derive(Default)]
struct Bars {
    indices: Option<ProgressBar>,
    packages: Option<ProgressBar>,
}

impl Bars {
    fn clear(&mut self) {
        for pb in [self.indices.take(), self.packages.take()].into_iter().flatten() {
            pb.finish_and_clear();
        }
    }
}

/// Renders mirror events as progress bars and log lines.
#[derive(Default)]
pub struct ProgressSink {
    bars: Mutex<Bars>,
}

impl ProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears whatever bars an aborted update left behind.
    pub fn finish(&self) {
        if let Ok(mut bars) = self.bars.lock() {
            bars.clear();
        }
    }
}

impl EventSink for ProgressSink {
    fn emit(&self, event: MirrorEvent) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };

        match event {
            MirrorEvent::Fetch { mirror, stage } => {
                match stage {
                    FetchStage::Release => info!("Downloading Release file for {mirror}..."),
                    FetchStage::Signature => debug!("Verifying Release file signature..."),
                    FetchStage::SignatureSkipped => {
                        warn!("Signature verification is disabled for {mirror}")
                    }
                    FetchStage::Complete { indices } => {
                        debug!("Release file lists {indices} indices")
                    }
                }
            }
            MirrorEvent::IndicesPlanned { mirror, total } => {
                info!("Downloading & parsing package files...");
                bars.indices = Some(new_bar(
                    total as u64,
                    count_style(),
                    Colored(Cyan, &mirror).to_string(),
                ));
            }
            MirrorEvent::IndexParsed { path, packages, .. } => {
                debug!("{path}: {packages} packages");
                if let Some(pb) = &bars.indices {
                    pb.inc(1);
                }
            }
            MirrorEvent::PackagesPlanned {
                mirror,
                total,
                bytes,
            } => {
                if let Some(pb) = bars.indices.take() {
                    pb.finish_and_clear();
                }
                info!("Download queue: {total} items ({})", HumanBytes(bytes));
                bars.packages = Some(new_bar(
                    bytes,
                    bytes_style(),
                    Colored(Cyan, &mirror).to_string(),
                ));
            }
            MirrorEvent::PackageDownloaded { size, .. } => {
                if let Some(pb) = &bars.packages {
                    pb.inc(size);
                }
            }
            MirrorEvent::ChecksumAnomaly {
                url,
                expected,
                actual,
                ..
            } => {
                warn!("Checksum mismatch for {url}: expected {expected}, got {actual}");
            }
            MirrorEvent::DownloadComplete { package_count, .. } => {
                bars.clear();
                debug!("Package list holds {package_count} packages");
            }
        }
    }
}
