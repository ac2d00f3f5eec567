// src/cli/mod.rs

use clap::{ArgAction, Parser, ValueEnum};

pub mod handlers;

/// tempsystem: Create and enter a completely temporary Arch Linux system.
///
/// Starts a fresh container, installs zsh with oh-my-zsh, a few plugins and the
/// `yay` AUR helper, drops you into an interactive shell in `~/work` and deletes
/// the container as soon as you leave it.
#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Extra packages to install with pacman (e.g. "nodejs,python").
    #[arg(short = 'p', long, value_name = "PKG", value_delimiter = ',', num_args = 1..)]
    pub extra_packages: Vec<String>,

    /// Extra packages to install from the AUR with yay.
    #[arg(short = 'a', long, value_name = "PKG", value_delimiter = ',', num_args = 1..)]
    pub extra_aur_packages: Vec<String>,

    /// Do not mount the current directory into the container.
    #[arg(short = 'd', long, conflicts_with = "ro_cwd")]
    pub disable_cwd_mount: bool,

    /// Mount the current directory read-only.
    #[arg(short = 'c', long)]
    pub ro_cwd: bool,

    /// Give the container extended privileges.
    #[arg(long)]
    pub privileged: bool,

    /// Bring your ~/.zsh_history into the container: as a copy, or bind-mounted so new
    /// entries land on the host.
    #[arg(long, value_enum, value_name = "MODE")]
    pub sync_history: Option<HistorySync>,

    /// Add the Chaotic-AUR binary repository before installing packages.
    #[arg(long)]
    pub chaotic_aur: bool,

    /// Add the landware repository before installing packages.
    #[arg(long)]
    pub landware: bool,

    /// Refresh the pkgfile database (slow; useful with extra repositories).
    #[arg(long)]
    pub update_pkgfile: bool,

    /// A command-not-found helper file to install into the container.
    #[arg(long, value_name = "PATH")]
    pub command_not_found: Option<String>,

    /// Container runtime: docker, podman, auto, or a path to a compatible binary.
    #[arg(long, value_name = "RUNTIME", env = "TEMPSYSTEM_RUNTIME")]
    pub runtime: Option<String>,

    /// Image to create the container from.
    #[arg(long, value_name = "IMAGE", env = "TEMPSYSTEM_IMAGE")]
    pub image: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Command to run instead of the login shell.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// How the host shell history reaches the container.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySync {
    /// Copy it in; changes are lost with the container.
    Copy,
    /// Bind-mount it read-write.
    Mount,
}
