//! # Ranktrail CLI Module
//!
//! Command-line interface for running and administering Ranktrail.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Create a new empty database
//! - `seed` - Load the sample curriculum and accounts
//! - `create-user` - Add a login account
//! - `create-member` - Add a youth member record
//! - `add-requirement` - Add a curriculum requirement
//! - `link-leader` - Link a leader to a member
//! - `eligibility` - Preview a requirement's eligibility date
//! - `next-steps` - Print a member's suggested next steps
//! - `status` - Show record counts

mod commands;
mod seed;

use clap::{Parser, Subcommand};
use ranktrail_core::TrackerError;
use std::path::PathBuf;

pub use commands::*;
pub use seed::{SeedSummary, seed_sample_data};

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Ranktrail - rank advancement tracker
///
/// Tracks members' progress through the advancement curriculum, computes
/// eligibility dates, and routes sign-offs to linked leaders.
#[derive(Parser, Debug)]
#[command(name = "ranktrail")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the tracker database
    #[arg(short = 'D', long, global = true, default_value = "ranktrail.redb")]
    pub database: PathBuf,

    /// Storage backend: "redb" (ACID database file) or "memory" (lost on exit)
    #[arg(short = 'B', long, global = true, default_value = "redb")]
    pub backend: String,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
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

        /// Load the sample data before serving (handy with --backend memory)
        #[arg(long)]
        seed: bool,
    },

    /// Initialize a new empty database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Load the sample curriculum, accounts and progress
    Seed {
        /// Password given to every sample account
        #[arg(long, env = "RANKTRAIL_SEED_PASSWORD", default_value = "ranktrail")]
        password: String,
    },

    /// Add a login account
    CreateUser {
        /// Email address (used to sign in)
        #[arg(short, long)]
        email: String,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// member, leader or admin
        #[arg(short, long, default_value = "member")]
        role: String,

        /// Sign-off initials (leaders)
        #[arg(long)]
        initials: Option<String>,

        /// Password; prefer the environment variable over the command line
        #[arg(long, env = "RANKTRAIL_PASSWORD")]
        password: Option<String>,
    },

    /// Add a youth member record
    CreateMember {
        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,

        /// Current rank
        #[arg(short, long, default_value = "scout")]
        rank: String,

        /// Troop or unit name
        #[arg(short, long)]
        unit: Option<String>,

        #[arg(long)]
        council: Option<String>,

        /// Email of the login account that tracks this member
        #[arg(long)]
        user_email: Option<String>,
    },

    /// Add a curriculum requirement
    AddRequirement {
        /// Unique code, e.g. "TF-2a"
        #[arg(short, long)]
        code: String,

        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        rank: String,

        /// Waiting period in days
        #[arg(long)]
        days: Option<u32>,

        /// Waiting period in months
        #[arg(long)]
        months: Option<u32>,

        /// Position within the rank
        #[arg(short, long, default_value = "0")]
        sort_order: i32,
    },

    /// Link a leader to a member (approved immediately)
    LinkLeader {
        /// Leader's login email
        #[arg(short, long)]
        leader_email: String,

        /// Member record ID
        #[arg(short, long)]
        member: u64,
    },

    /// Preview the eligibility date for a requirement
    Eligibility {
        /// Requirement code, e.g. "TF-2a"
        code: String,

        /// Start date (YYYY-MM-DD)
        #[arg(short, long)]
        started: Option<String>,

        /// Manual eligibility date, used when no start date is given
        #[arg(short, long)]
        eligible: Option<String>,
    },

    /// Print a member's suggested next steps
    NextSteps {
        /// Member record ID
        member: u64,
    },

    /// Show record counts
    Status,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), TrackerError> {
    let backend = cli.backend.as_str();
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port, seed }) => {
            cmd_server(&cli.database, backend, &host, port, seed).await
        }
        Some(Commands::Init { force }) => cmd_init(&cli.database, backend, force),
        Some(Commands::Seed { password }) => {
            cmd_seed(&cli.database, backend, json_mode, &password)
        }
        Some(Commands::CreateUser {
            email,
            first_name,
            last_name,
            role,
            initials,
            password,
        }) => cmd_create_user(
            &cli.database,
            backend,
            json_mode,
            NewAccount {
                email,
                first_name,
                last_name,
                role,
                initials,
                password,
            },
        ),
        Some(Commands::CreateMember {
            first_name,
            last_name,
            rank,
            unit,
            council,
            user_email,
        }) => cmd_create_member(
            &cli.database,
            backend,
            json_mode,
            NewMemberArgs {
                first_name,
                last_name,
                rank,
                unit,
                council,
                user_email,
            },
        ),
        Some(Commands::AddRequirement {
            code,
            title,
            rank,
            days,
            months,
            sort_order,
        }) => cmd_add_requirement(
            &cli.database,
            backend,
            json_mode,
            NewRequirementArgs {
                code,
                title,
                rank,
                days,
                months,
                sort_order,
            },
        ),
        Some(Commands::LinkLeader {
            leader_email,
            member,
        }) => cmd_link_leader(&cli.database, backend, json_mode, &leader_email, member),
        Some(Commands::Eligibility {
            code,
            started,
            eligible,
        }) => cmd_eligibility(
            &cli.database,
            backend,
            json_mode,
            &code,
            started.as_deref(),
            eligible.as_deref(),
        ),
        Some(Commands::NextSteps { member }) => {
            cmd_next_steps(&cli.database, backend, json_mode, cli.verbose, member)
        }
        Some(Commands::Status) | None => cmd_status(&cli.database, backend, json_mode),
    }
}
