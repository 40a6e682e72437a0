//! Clap derive structures for the `autotun` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// autotun -- bring WireGuard tunnels up and down as networks change
#[derive(Debug, Parser)]
#[command(
    name = "autotun",
    version,
    about = "Automatic WireGuard tunnel management",
    long_about = "Import WireGuard tunnels, mark trusted Wi-Fi networks, and let the\n\
        auto-tunnel controller decide when the tunnel should be up.\n\n\
        State is kept in a local file; `autotun run` feeds network changes\n\
        into the controller.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "AUTOTUN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Tunnel backend (overrides the config file)
    #[arg(long, short = 'b', env = "AUTOTUN_BACKEND", global = true)]
    pub backend: Option<BackendChoice>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "AUTOTUN_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendChoice {
    /// Drive `wg-quick` and `wg` (needs root)
    WgQuick,
    /// In-process simulation, nothing touches the system
    Simulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn enabled(self) -> bool {
        self == Self::On
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage imported tunnels
    #[command(alias = "t")]
    Tunnels(TunnelsArgs),

    /// Manage trusted Wi-Fi networks
    Trust(TrustArgs),

    /// Show or change auto-tunnel settings
    #[command(alias = "s")]
    Settings(SettingsArgs),

    /// Bring a tunnel up (the default one when omitted)
    Up {
        /// Tunnel name or ID
        tunnel: Option<String>,
    },

    /// Bring the running tunnel down
    Down,

    /// Show tunnel state and per-peer handshake health
    #[command(alias = "st")]
    Status,

    /// Run the controller, reading network changes from stdin
    ///
    /// One event per line: `wifi <ssid>`, `mobile`, `ethernet` or `none`.
    /// Blank lines and lines starting with `#` are ignored.
    Run,

    /// Send a start/stop request the way an external shortcut would
    Shortcut(ShortcutArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Tunnels ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TunnelsArgs {
    #[command(subcommand)]
    pub command: TunnelsCommand,
}

#[derive(Debug, Subcommand)]
pub enum TunnelsCommand {
    /// List tunnels in display order
    #[command(alias = "ls")]
    List,

    /// Import `.conf` profiles or `.zip` archives of them
    Import {
        /// Files to import
        #[arg(required_unless_present = "stdin")]
        files: Vec<PathBuf>,

        /// Read a single profile from stdin instead
        #[arg(long, conflicts_with = "files")]
        stdin: bool,
    },

    /// Show a tunnel's profile
    Show {
        /// Tunnel name or ID
        tunnel: String,
    },

    /// Delete a tunnel
    #[command(alias = "rm")]
    Delete {
        /// Tunnel name or ID
        tunnel: String,
    },
}

// ── Trusted networks ─────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TrustArgs {
    #[command(subcommand)]
    pub command: TrustCommand,
}

#[derive(Debug, Subcommand)]
pub enum TrustCommand {
    /// List trusted SSIDs
    #[command(alias = "ls")]
    List,

    /// Trust an SSID (tunnel stays down on it)
    Add { ssid: String },

    /// Stop trusting an SSID
    #[command(alias = "rm")]
    Remove { ssid: String },
}

// ── Settings ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommand,
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Show current settings
    Show,

    /// Arm or disarm auto-tunnel
    Auto { state: Switch },

    /// Arm or disarm always-on
    AlwaysOn { state: Switch },

    /// Set the default tunnel
    Default {
        /// Tunnel name or ID
        tunnel: String,
    },

    /// Toggle a single flag
    Set {
        flag: SettingFlag,
        state: Switch,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SettingFlag {
    /// Tunnel on untrusted Wi-Fi
    Wifi,
    /// Tunnel on mobile data
    Mobile,
    /// Tunnel on ethernet
    Ethernet,
    /// Kernel-mode WireGuard (checked against the backend)
    KernelMode,
    /// Battery saver
    BatterySaver,
    /// Accept external shortcut requests
    Shortcuts,
}

// ── Shortcuts ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ShortcutArgs {
    #[command(subcommand)]
    pub command: ShortcutCommand,
}

#[derive(Debug, Subcommand)]
pub enum ShortcutCommand {
    /// Start a tunnel (the default one when omitted)
    Start { tunnel: Option<String> },
    /// Stop the running tunnel
    Stop,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
