use std::path::PathBuf;

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "mirrorkit",
    about = "Mirror remote Debian-style package archives",
    version,
    arg_required_else_help = true
)]
pub struct Args {
    /// Unimportant output is suppressed
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// More output, repeat for even more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage mirrors of remote repositories
    #[command(arg_required_else_help = true)]
    Mirror {
        #[command(subcommand)]
        command: MirrorCommand,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Subcommand, Debug)]
pub enum MirrorCommand {
    /// Create a new mirror and fetch its Release file, without downloading packages
    #[command(arg_required_else_help = true)]
    Create {
        /// Name of the new mirror
        name: String,

        /// Archive root URL
        url: String,

        /// Distribution, e.g. `wheezy`
        distribution: String,

        /// Components to mirror; all from the Release file when omitted
        components: Vec<String>,

        /// Architectures to mirror; all from the Release file when omitted
        #[arg(long, value_delimiter = ',')]
        architectures: Vec<String>,

        /// Download source packages
        #[arg(long)]
        with_sources: bool,

        #[command(flatten)]
        trust: TrustArgs,
    },

    /// List mirrors of remote repositories
    List,

    /// Show details about a mirror
    #[command(arg_required_else_help = true)]
    Show {
        name: String,

        /// Also list every package
        #[arg(long)]
        with_packages: bool,
    },

    /// Download package lists and package files of a mirror
    #[command(arg_required_else_help = true)]
    Update {
        name: String,

        /// Ignore checksum mismatches of package files and metadata
        #[arg(long)]
        ignore_checksums: bool,

        /// Only refresh package lists, skip package files
        #[arg(long)]
        skip_packages: bool,

        #[command(flatten)]
        trust: TrustArgs,
    },

    /// Delete a mirror. Package data is kept
    #[command(arg_required_else_help = true)]
    Drop {
        name: String,

        /// Delete the mirror even if snapshots were taken from it
        #[arg(long)]
        force: bool,
    },
}

/// How Release files are authenticated.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct TrustArgs {
    /// Disable verification of Release file signatures
    #[arg(long)]
    pub ignore_signatures: bool,

    /// Trusted minisign public key, may be repeated
    #[arg(long = "keyring")]
    pub keyrings: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_create() {
        let args = Args::parse_from([
            "mirrorkit",
            "-v",
            "mirror",
            "create",
            "wheezy-main",
            "http://deb.example.org/debian/",
            "wheezy",
            "main",
            "contrib",
            "--architectures",
            "amd64,i386",
            "--keyring",
            "/etc/mirrorkit/trusted.pub",
        ]);
        assert_eq!(args.verbose, 1);
        match args.command {
            Commands::Mirror {
                command:
                    MirrorCommand::Create {
                        name,
                        components,
                        architectures,
                        with_sources,
                        trust,
                        ..
                    },
            } => {
                assert_eq!(name, "wheezy-main");
                assert_eq!(components, vec!["main", "contrib"]);
                assert_eq!(architectures, vec!["amd64", "i386"]);
                assert!(!with_sources);
                assert!(!trust.ignore_signatures);
                assert_eq!(trust.keyrings.len(), 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_update_and_drop() {
        let args = Args::parse_from([
            "mirrorkit",
            "mirror",
            "update",
            "wheezy-main",
            "--ignore-checksums",
            "--ignore-signatures",
            "--json",
        ]);
        assert!(args.json);
        assert!(matches!(
            args.command,
            Commands::Mirror {
                command: MirrorCommand::Update {
                    ignore_checksums: true,
                    skip_packages: false,
                    trust: TrustArgs { ignore_signatures: true, .. },
                    ..
                }
            }
        ));

        let args = Args::parse_from(["mirrorkit", "mirror", "drop", "wheezy-main", "--force"]);
        assert!(matches!(
            args.command,
            Commands::Mirror {
                command: MirrorCommand::Drop { force: true, .. }
            }
        ));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Args::try_parse_from(["mirrorkit", "-q", "-v", "mirror", "list"]).is_err());
    }
}
