use miette::Result;
use mirrorkit_core::{
    error::MirrorError,
    mirror::{DownloadOptions, RemoteRepo},
};
use nu_ansi_term::Color::{Green, Yellow};
use tracing::info;

use crate::{
    cli::{MirrorCommand, TrustArgs},
    context::AppContext,
    utils::{yes_no, Colored},
};

/// Options of `mirror create` once flags and config are merged.
pub struct CreateOptions {
    pub name: String,
    pub url: String,
    pub distribution: String,
    pub components: Vec<String>,
    pub architectures: Vec<String>,
    pub with_sources: bool,
    pub trust: TrustArgs,
}

/// Options of `mirror update`.
pub struct UpdateOptions {
    pub name: String,
    pub ignore_checksums: bool,
    pub skip_packages: bool,
    pub trust: TrustArgs,
}

pub async fn run(ctx: &AppContext, command: MirrorCommand) -> Result<()> {
    match command {
        MirrorCommand::Create {
            name,
            url,
            distribution,
            components,
            architectures,
            with_sources,
            trust,
        } => {
            let architectures = if architectures.is_empty() {
                ctx.config.architectures.clone().unwrap_or_default()
            } else {
                architectures
            };
            let options = CreateOptions {
                name,
                url,
                distribution,
                components,
                architectures,
                with_sources: with_sources || ctx.config.download_sources(),
                trust,
            };
            create(ctx, options).await
        }
        MirrorCommand::List => list(ctx),
        MirrorCommand::Show {
            name,
            with_packages,
        } => show(ctx, &name, with_packages),
        MirrorCommand::Update {
            name,
            ignore_checksums,
            skip_packages,
            trust,
        } => {
            let options = UpdateOptions {
                name,
                ignore_checksums,
                skip_packages,
                trust,
            };
            update(ctx, options).await
        }
        MirrorCommand::Drop { name, force } => drop_mirror(ctx, &name, force).await,
    }
}

pub async fn create(ctx: &AppContext, options: CreateOptions) -> Result<()> {
    let repo = RemoteRepo::new(
        &options.name,
        &options.url,
        &options.distribution,
        options.components,
        options.architectures,
        options.with_sources,
    )?;

    let sync = ctx.sync(&options.trust)?;
    let repo = sync.create(repo).await;
    ctx.progress.finish();
    let repo = repo?;

    info!(
        "\nMirror {repo} successfully added.\nYou can run 'mirrorkit mirror update {}' to download repository contents.",
        repo.name
    );
    Ok(())
}

pub fn list(ctx: &AppContext) -> Result<()> {
    let repos = ctx.repos();
    if repos.is_empty()? {
        info!("No mirrors found, create one with `mirrorkit mirror create ...`.");
        return Ok(());
    }

    info!("List of mirrors:");
    repos.for_each(|repo| {
        info!(" * {repo}");
        Ok(())
    })?;
    info!("\nTo get more information about mirror, run `mirrorkit mirror show <name>`.");
    Ok(())
}

pub fn show(ctx: &AppContext, name: &str, with_packages: bool) -> Result<()> {
    let repos = ctx.repos();
    let mut repo = repos.by_name(name)?;
    repos.load_complete(&mut repo)?;

    for line in describe(&repo) {
        info!("{line}");
    }

    if with_packages {
        match repo.ref_list() {
            Some(ref_list) => {
                info!("Packages:");
                let store = ctx.store();
                for package in ref_list.packages(&store) {
                    info!("  {}", package?);
                }
            }
            None => info!("Unable to show package list, mirror hasn't been downloaded yet."),
        }
    }

    Ok(())
}

fn describe(repo: &RemoteRepo) -> Vec<String> {
    let mut lines = vec![
        format!("Name: {}", repo.name),
        format!("Archive Root URL: {}", repo.archive_root),
        format!("Distribution: {}", repo.distribution),
        format!("Components: {}", repo.components.join(", ")),
        format!("Architectures: {}", repo.architectures.join(", ")),
        format!("Download Sources: {}", yes_no(repo.download_sources)),
    ];
    match repo.last_download_date() {
        Some(date) => {
            lines.push(format!("Last update: {}", date.format("%Y-%m-%d %H:%M:%S %Z")));
            lines.push(format!("Number of packages: {}", repo.num_packages()));
        }
        None => lines.push("Last update: never".into()),
    }

    lines.push("\nInformation from release file:".into());
    lines.extend(repo.meta().iter().map(|(key, value)| format!("{key}: {value}")));
    lines
}

pub async fn update(ctx: &AppContext, options: UpdateOptions) -> Result<()> {
    let sync = ctx.sync(&options.trust)?;
    let download = DownloadOptions {
        ignore_checksums: options.ignore_checksums,
        download_packages: !options.skip_packages,
        ..DownloadOptions::from_config(&ctx.config)?
    };

    let report = sync.update(&options.name, &download).await;
    ctx.progress.finish();
    let report = report?;

    let (added, removed, changed) = report.summary();
    info!(
        "Packages: {} total, {} added, {} removed, {} changed",
        report.download.packages,
        Colored(Green, added),
        Colored(Yellow, removed),
        Colored(Yellow, changed),
    );
    if !report.download.anomalies.is_empty() {
        info!(
            "{} checksum mismatches were ignored",
            Colored(Yellow, report.download.anomalies.len())
        );
    }
    info!("\nMirror `{}` has been successfully updated.", options.name);
    Ok(())
}

pub async fn drop_mirror(ctx: &AppContext, name: &str, force: bool) -> Result<()> {
    let repos = ctx.repos();
    let _guard = repos.lock(name).await?;
    let repo = repos.by_name(name)?;

    match repos.drop_mirror(&repo, &ctx.snapshots(), force) {
        Ok(()) => {
            info!("Mirror `{name}` has been removed.");
            Ok(())
        }
        Err(MirrorError::Referenced { mirror, snapshots }) => {
            info!("Mirror `{mirror}` was used to create following snapshots:");
            for snapshot in &snapshots {
                info!(" * {snapshot}");
            }
            Err(MirrorError::Referenced { mirror, snapshots }.into())
        }
        Err(err) => Err(err.into()),
    }
}
