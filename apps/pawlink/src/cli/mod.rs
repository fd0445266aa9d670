//! # pawlink CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show graph status
//! - `init` - Initialize a new database
//! - `follow` / `unfollow` / `toggle` - Mutate an edge as a given user
//! - `is-following` - Check follow status
//! - `counts` - Follower/following totals
//! - `followers` / `following` - Paginated listings
//! - `export` / `import` - Snapshot files
//! - `audit` - Check counts against the edge set

mod commands;

use crate::config::PawlinkConfig;
use crate::error::AppResult;
use clap::{Parser, Subcommand, ValueEnum};
use pawlink_core::ProjectionStrategy;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// pawlink - follow graph server
///
/// Directed follow edges between users with idempotent follow/unfollow
/// and follower/following counts that always match the edge set.
#[derive(Parser, Debug)]
#[command(name = "pawlink")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the graph database
    #[arg(short = 'D', long, global = true, default_value = "pawlink.redb")]
    pub database: PathBuf,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum, default_value_t = Backend::Redb)]
    pub backend: Backend,

    /// How follower/following counts are served: maintained or on-demand
    #[arg(long, global = true, default_value = "maintained")]
    pub counts: ProjectionStrategy,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// In-memory edge set, loaded from and saved to a snapshot file
    Memory,
    /// redb database (ACID, persistent)
    Redb,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redb => "redb",
        }
    }
}

/// Where graph commands read and write.
#[derive(Debug, Clone)]
pub struct StorageArgs {
    pub database: PathBuf,
    pub backend: Backend,
    pub counts: ProjectionStrategy,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Show graph status
    Status,

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Follow a user
    Follow {
        /// Acting user
        #[arg(long = "as", value_name = "USER")]
        caller: u64,

        /// User to follow
        target: u64,
    },

    /// Stop following a user
    Unfollow {
        /// Acting user
        #[arg(long = "as", value_name = "USER")]
        caller: u64,

        /// User to unfollow
        target: u64,
    },

    /// Follow if not following, otherwise unfollow
    Toggle {
        /// Acting user
        #[arg(long = "as", value_name = "USER")]
        caller: u64,

        target: u64,
    },

    /// Check whether a user follows another (anonymous if --as is omitted)
    IsFollowing {
        #[arg(long = "as", value_name = "USER")]
        caller: Option<u64>,

        target: u64,
    },

    /// Show follower/following totals
    Counts { user: u64 },

    /// List a user's followers, newest first
    Followers {
        user: u64,

        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// List the users a user follows, newest first
    Following {
        user: u64,

        #[arg(long, default_value = "0")]
        offset: usize,

        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Export the edge set as a snapshot file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Restore a snapshot file into an empty database
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Check counts against the edge set
    Audit,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli, config: PawlinkConfig) -> AppResult<()> {
    let storage = StorageArgs {
        database: cli.database,
        backend: cli.backend,
        counts: cli.counts,
    };
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&storage, config, &host, port).await,
        Some(Commands::Status) | None => cmd_status(&storage, json_mode),
        Some(Commands::Init { force }) => cmd_init(&storage, force),
        Some(Commands::Follow { caller, target }) => {
            cmd_mutate(&storage, json_mode, MutationCommand::Follow, caller, target)
        }
        Some(Commands::Unfollow { caller, target }) => {
            cmd_mutate(&storage, json_mode, MutationCommand::Unfollow, caller, target)
        }
        Some(Commands::Toggle { caller, target }) => {
            cmd_mutate(&storage, json_mode, MutationCommand::Toggle, caller, target)
        }
        Some(Commands::IsFollowing { caller, target }) => {
            cmd_is_following(&storage, json_mode, caller, target)
        }
        Some(Commands::Counts { user }) => cmd_counts(&storage, json_mode, user),
        Some(Commands::Followers {
            user,
            offset,
            limit,
        }) => cmd_list(&storage, json_mode, ListDirection::Followers, user, offset, limit),
        Some(Commands::Following {
            user,
            offset,
            limit,
        }) => cmd_list(&storage, json_mode, ListDirection::Following, user, offset, limit),
        Some(Commands::Export { output }) => cmd_export(&storage, json_mode, &output),
        Some(Commands::Import { input }) => cmd_import(&storage, json_mode, &input),
        Some(Commands::Audit) => cmd_audit(&storage, json_mode),
    }
}
