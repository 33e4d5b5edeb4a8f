//! Clap derive structures for the `fleetwire` CLI.
//!
//! Defines the command tree, global flags, and shared argument groups.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fleetwire -- live counters and notification streams
#[derive(Debug, Parser)]
#[command(
    name = "fleetwire",
    version,
    about = "Live counters and realtime notification streams for fleetwire platforms",
    long_about = "Counts alarms, events, inventory and operations on a fleetwire platform\n\
        and keeps the numbers current from realtime notifications, or streams\n\
        the notifications themselves.",
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
    /// Platform profile to use
    #[arg(long, short = 'p', env = "FLEETWIRE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Platform URL (overrides profile)
    #[arg(long, short = 'u', env = "FLEETWIRE_URL", global = true)]
    pub url: Option<String>,

    /// Tenant id (overrides profile)
    #[arg(long, short = 't', env = "FLEETWIRE_TENANT", global = true)]
    pub tenant: Option<String>,

    /// Username for basic auth (overrides profile)
    #[arg(long, env = "FLEETWIRE_USERNAME", global = true)]
    pub username: Option<String>,

    /// Bearer token (takes precedence over profile credentials)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "FLEETWIRE_OUTPUT",
        default_value = "plain",
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

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "FLEETWIRE_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "FLEETWIRE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text, one value per line (default)
    Plain,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON (one document per line when streaming)
    JsonCompact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

/// Collections that can be counted and watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceArg {
    Alarms,
    Events,
    Inventory,
    Operations,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Count a collection and optionally follow the count live
    #[command(alias = "c")]
    Count(CountArgs),

    /// Stream realtime notifications of a collection
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Filter Arguments ──────────────────────────────────────────

/// Client-side filter, also sent as query parameters for snapshots.
#[derive(Debug, Default, Args)]
pub struct FilterArgs {
    /// Field equality, KEY=VALUE (repeatable; dotted keys reach into objects)
    #[arg(long = "filter", short = 'f', value_name = "KEY=VALUE")]
    pub filters: Vec<String>,

    /// Only items whose source device has this id
    #[arg(long)]
    pub source: Option<String>,

    /// Only items at or after this RFC 3339 time
    #[arg(long, value_name = "TIME")]
    pub from: Option<String>,

    /// Only items before this RFC 3339 time
    #[arg(long, value_name = "TIME")]
    pub to: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COUNT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CountArgs {
    /// Collection to count
    pub resource: ResourceArg,

    /// Server-side query parameter for plain counting, KEY=VALUE (repeatable)
    #[arg(long, short = 'Q', value_name = "KEY=VALUE")]
    pub query: Vec<String>,

    /// Any filter switches to client-side filtered counting
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Realtime channel (defaults to the collection's catch-all channel)
    #[arg(long)]
    pub channel: Option<String>,

    /// Keep running and print every change until interrupted
    #[arg(long, short = 'F')]
    pub follow: bool,

    /// Print the tracked items (filtered counting only)
    #[arg(long)]
    pub items: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Collection to watch
    pub resource: ResourceArg,

    /// Realtime channel (defaults to the collection's catch-all channel)
    #[arg(long)]
    pub channel: Option<String>,

    /// Event kinds to show: create, update, delete (repeatable; default all)
    #[arg(long = "kind", value_name = "KIND")]
    pub kinds: Vec<String>,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Exit after this many notifications
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current configuration (secrets masked)
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key (url, tenant, auth_mode, username, password_env,
        /// token_env, ca_cert, insecure, timeout, idle_abort_secs, page_size)
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store the active profile's password (or token) in the system keyring
    SetSecret {
        /// Store a bearer token instead of a password
        #[arg(long)]
        bearer: bool,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
