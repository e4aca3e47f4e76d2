//! # CLI Command Implementations
//!
//! Each command opens the tracker, does one thing, and prints either a short
//! human summary or, with `--json-mode`, a JSON document.

use super::seed::seed_sample_data;
use crate::api::{self, hash_password, parse_date};
use crate::config::ServerConfig;
use chrono::Utc;
use ranktrail_core::{
    MemberId, NewMember, NewRequirement, NewUser, Rank, Role, Tracker, TrackerError,
    days_remaining, next_steps_for,
};
use serde::Serialize;
use std::path::Path;

// =============================================================================
// ARGUMENT BUNDLES
// =============================================================================

/// Arguments of `create-user`.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub initials: Option<String>,
    pub password: Option<String>,
}

/// Arguments of `create-member`.
#[derive(Debug, Clone)]
pub struct NewMemberArgs {
    pub first_name: String,
    pub last_name: String,
    pub rank: String,
    pub unit: Option<String>,
    pub council: Option<String>,
    pub user_email: Option<String>,
}

/// Arguments of `add-requirement`.
#[derive(Debug, Clone)]
pub struct NewRequirementArgs {
    pub code: String,
    pub title: String,
    pub rank: String,
    pub days: Option<u32>,
    pub months: Option<u32>,
    pub sort_order: i32,
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    db_path: &Path,
    backend: &str,
    host: &str,
    port: u16,
    seed: bool,
) -> Result<(), TrackerError> {
    let mut tracker = open_tracker(db_path, backend)?;
    if seed {
        let summary = seed_sample_data(&mut tracker, "ranktrail", Utc::now())?;
        tracing::info!(
            member_id = %summary.member_id,
            "Loaded sample data (password \"ranktrail\")"
        );
    }
    let config = ServerConfig::from_env();

    println!("Ranktrail Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:       {}", host);
    println!("  Port:       {}", port);
    println!("  Backend:    {}", backend);
    println!("  Database:   {:?}", db_path);
    println!("  Rate limit: {} req/s", config.rate_limit);
    println!("  Session:    {} hours", config.session_ttl.num_hours());
    println!();
    println!("Endpoints:");
    println!("  POST /login                 - Sign in");
    println!("  GET  /tracker?member_id=    - Member dashboard");
    println!("  GET  /leader                - Leader dashboard");
    println!("  POST /progress              - Save progress");
    println!("  POST /progress/{{id}}/approve - Approve a requirement");
    println!("  GET  /health                - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, tracker, config).await
}

// =============================================================================
// SETUP COMMANDS
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(db_path: &Path, backend: &str, force: bool) -> Result<(), TrackerError> {
    if backend != "redb" {
        println!("The {} backend keeps nothing on disk; nothing to initialize.", backend);
        return Ok(());
    }

    if db_path.exists() {
        if !force {
            return Err(TrackerError::Conflict(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| TrackerError::IoError(format!("Remove old database: {}", e)))?;
    }

    Tracker::with_redb(db_path)?;
    println!("Initialized new redb database at {:?}", db_path);
    Ok(())
}

/// Load the sample troop.
pub fn cmd_seed(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    password: &str,
) -> Result<(), TrackerError> {
    let mut tracker = open_tracker(db_path, backend)?;
    let summary = seed_sample_data(&mut tracker, password, Utc::now())?;

    if json_mode {
        return print_json(&summary);
    }
    println!("Seeded sample data into {:?}", db_path);
    println!("  Requirements:     {}", summary.requirements);
    println!("  Progress records: {}", summary.progress_records);
    println!("  Member ID:        {}", summary.member_id);
    println!();
    println!("Accounts (all share the seed password):");
    println!("  admin@example.com   ADMIN");
    println!("  leader@example.com  LEADER");
    println!("  scout@example.com   MEMBER");
    Ok(())
}

/// Add a login account.
pub fn cmd_create_user(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    args: NewAccount,
) -> Result<(), TrackerError> {
    let role: Role = args.role.parse()?;
    let password_hash = args.password.as_deref().map(hash_password).transpose()?;
    if password_hash.is_none() {
        tracing::warn!("No password given; the account cannot sign in until one is set");
    }

    let mut tracker = open_tracker(db_path, backend)?;
    let user = tracker.create_user(
        NewUser {
            email: args.email,
            first_name: args.first_name,
            last_name: args.last_name,
            initials: args.initials,
            role,
            password_hash,
        },
        Utc::now(),
    )?;

    if json_mode {
        return print_json(&api::UserResponse::new(&user, None));
    }
    println!("Created {} account {} ({})", user.role, user.id, user.email);
    Ok(())
}

/// Add a youth member, optionally tied to an existing login.
pub fn cmd_create_member(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    args: NewMemberArgs,
) -> Result<(), TrackerError> {
    let rank: Rank = args.rank.parse()?;
    let mut tracker = open_tracker(db_path, backend)?;

    let user_id = match args.user_email.as_deref() {
        Some(email) => Some(
            tracker
                .find_user_by_email(email)?
                .ok_or_else(|| TrackerError::InvalidInput(format!("No account for {}", email)))?
                .id,
        ),
        None => None,
    };

    let member = tracker.create_member(
        NewMember {
            first_name: args.first_name,
            last_name: args.last_name,
            email: None,
            phone: None,
            unit: args.unit,
            council: args.council,
            current_rank: rank,
            date_of_birth: None,
            user_id,
        },
        Utc::now(),
    )?;

    if json_mode {
        return print_json(&member);
    }
    println!("Created member {} ({}, {})", member.id, member.full_name(), member.current_rank);
    Ok(())
}

/// Add a requirement to the curriculum.
pub fn cmd_add_requirement(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    args: NewRequirementArgs,
) -> Result<(), TrackerError> {
    let rank: Rank = args.rank.parse()?;
    let mut tracker = open_tracker(db_path, backend)?;
    let requirement = tracker.add_requirement(NewRequirement {
        code: args.code,
        title: args.title,
        rank,
        summary: None,
        dependency_text: None,
        duration_days: args.days,
        duration_months: args.months,
        sort_order: args.sort_order,
    })?;

    if json_mode {
        return print_json(&requirement);
    }
    println!(
        "Added {} ({}) as requirement {}",
        requirement.code, requirement.rank, requirement.id
    );
    Ok(())
}

/// Link a leader to a member on behalf of the first admin account.
pub fn cmd_link_leader(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    leader_email: &str,
    member: u64,
) -> Result<(), TrackerError> {
    let mut tracker = open_tracker(db_path, backend)?;
    let admin = tracker
        .store()
        .users()?
        .into_iter()
        .find(|u| u.role == Role::Admin)
        .ok_or_else(|| {
            TrackerError::InvalidInput("Create an admin account before linking leaders".to_string())
        })?;
    let leader = tracker
        .find_user_by_email(leader_email)?
        .ok_or_else(|| TrackerError::InvalidInput(format!("No account for {}", leader_email)))?;

    let link = tracker.request_link(&admin, leader.id, MemberId(member), Utc::now())?;

    if json_mode {
        return print_json(&link);
    }
    println!("Linked {} to member {}", leader.full_name(), link.member_id);
    Ok(())
}

// =============================================================================
// LOOKUP COMMANDS
// =============================================================================

/// Preview a requirement's eligibility date.
pub fn cmd_eligibility(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    code: &str,
    started: Option<&str>,
    eligible: Option<&str>,
) -> Result<(), TrackerError> {
    let tracker = open_tracker(db_path, backend)?;
    let requirement = tracker
        .store()
        .requirement_by_code(code.trim())?
        .ok_or_else(|| TrackerError::InvalidInput(format!("Unknown requirement code: {}", code)))?;

    let started_at = parse_date("started", started)?;
    let manual = parse_date("eligible", eligible)?;
    let eligible_at = tracker.preview_eligibility(requirement.id, started_at, manual)?;
    let remaining = eligible_at.map(|at| days_remaining(at, Utc::now()));

    if json_mode {
        return print_json(&serde_json::json!({
            "code": requirement.code,
            "duration_days": requirement.duration_days,
            "duration_months": requirement.duration_months,
            "eligible_at": eligible_at,
            "days_remaining": remaining,
        }));
    }

    println!("{} - {}", requirement.code, requirement.title);
    match (eligible_at, remaining) {
        (Some(at), Some(0)) => println!("Eligible since {}", at.format("%Y-%m-%d")),
        (Some(at), Some(days)) => {
            println!("Eligible on {} ({} days to go)", at.format("%Y-%m-%d"), days)
        }
        _ => println!("No eligibility date yet; enter a start date."),
    }
    Ok(())
}

/// Print a member's top next steps.
pub fn cmd_next_steps(
    db_path: &Path,
    backend: &str,
    json_mode: bool,
    verbose: bool,
    member: u64,
) -> Result<(), TrackerError> {
    let tracker = open_tracker(db_path, backend)?;
    let member = tracker.member(MemberId(member))?;
    let steps = next_steps_for(&tracker, member.id)?;

    if json_mode {
        return print_json(&steps);
    }

    println!("Next steps for {} ({})", member.full_name(), member.current_rank);
    if steps.is_empty() {
        println!("  All requirements are complete.");
    }
    for (i, step) in steps.iter().enumerate() {
        let marker = if step.in_progress { " [in progress]" } else { "" };
        println!("  {}. {} {} - {}{}", i + 1, step.rank, step.code, step.title, marker);
        if verbose {
            for message in &step.messages {
                println!("       {}", message);
            }
        }
    }
    Ok(())
}

/// Show record counts.
pub fn cmd_status(db_path: &Path, backend: &str, json_mode: bool) -> Result<(), TrackerError> {
    let tracker = open_tracker(db_path, backend)?;
    let stats = tracker.stats()?;

    if json_mode {
        return print_json(&serde_json::json!({
            "database": db_path.display().to_string(),
            "backend": backend,
            "users": stats.users,
            "members": stats.members,
            "requirements": stats.requirements,
            "progress_records": stats.progress_records,
            "audit_entries": stats.audit_entries,
        }));
    }

    println!("Ranktrail Status");
    println!("================");
    println!("Database: {:?}", db_path);
    println!("Backend:  {}", backend);
    println!();
    println!("Users:            {}", stats.users);
    println!("Members:          {}", stats.members);
    println!("Requirements:     {}", stats.requirements);
    println!("Progress records: {}", stats.progress_records);
    println!("Audit entries:    {}", stats.audit_entries);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the tracker for a database path with the given backend.
pub fn open_tracker(db_path: &Path, backend: &str) -> Result<Tracker, TrackerError> {
    match backend {
        "redb" => Tracker::with_redb(db_path),
        "memory" => Ok(Tracker::new()),
        other => Err(TrackerError::InvalidInput(format!(
            "Unknown backend '{}': expected redb or memory",
            other
        ))),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), TrackerError> {
    let output = serde_json::to_string_pretty(value)
        .map_err(|e| TrackerError::SerializationError(e.to_string()))?;
    println!("{}", output);
    Ok(())
}
