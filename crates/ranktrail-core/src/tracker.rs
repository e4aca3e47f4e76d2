//! # Tracker Module
//!
//! Record operations over a pluggable store.
//!
//! The tracker owns validation, access rules and audit bookkeeping. Every
//! mutation takes the acting user and the current time from the caller, so
//! the module stays deterministic and clock-free.
//!
//! ## Storage Backends
//!
//! - `InMemory`: uses `MemoryStore` (fast, volatile)
//! - `Persistent`: uses `RedbStore` for disk-backed ACID storage
//!
//! ## Access Rules
//!
//! | Role   | Member records it may touch            | May approve            |
//! |--------|----------------------------------------|------------------------|
//! | Member | the record linked to its own account   | never                  |
//! | Leader | members with an approved leader link   | linked members only    |
//! | Admin  | all                                    | all                    |

use crate::eligibility::compute_eligibility;
use crate::primitives::{
    MAX_DURATION_DAYS, MAX_DURATION_MONTHS, MAX_FIELD_LENGTH, MAX_NOTE_LENGTH, MAX_SORT_ORDER,
};
use crate::storage::RedbStore;
use crate::store::{MemoryStore, TrackerStore};
use crate::{
    Approval, ApprovalRequest, AuditAction, AuditEntry, AuditId, LeaderLink, LinkStatus,
    LoginSession, Member, MemberId, Note, NoteId, ProgressId, ProgressRecord, Rank, Requirement,
    RequirementId, Role, Subtask, SubtaskId, SubtaskProgress, TrackerError, User, UserId,
};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Storage backend for a Tracker.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

// =============================================================================
// INPUT TYPES
// =============================================================================

/// Fields for a new login account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub initials: Option<String>,
    pub role: Role,
    pub password_hash: Option<String>,
}

/// Fields for a new member.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub unit: Option<String>,
    pub council: Option<String>,
    pub current_rank: Rank,
    pub date_of_birth: Option<NaiveDate>,
    pub user_id: Option<UserId>,
}

/// Fields for a new curriculum requirement.
#[derive(Debug, Clone)]
pub struct NewRequirement {
    pub code: String,
    pub title: String,
    pub rank: Rank,
    pub summary: Option<String>,
    pub dependency_text: Option<String>,
    pub duration_days: Option<u32>,
    pub duration_months: Option<u32>,
    pub sort_order: i32,
}

/// Fields for a new subtask.
#[derive(Debug, Clone)]
pub struct NewSubtask {
    pub requirement_id: RequirementId,
    pub code: String,
    pub title: String,
    pub detail: Option<String>,
    pub sort_order: i32,
}

/// A progress save: the full editable state of one (member, requirement) pair.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub member_id: MemberId,
    pub requirement_id: RequirementId,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Used only when no eligibility date can be computed.
    pub eligible_override: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Outcome of looking up a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Active(User),
    /// The session exists but has lapsed; callers should delete it.
    Expired,
    Unknown,
}

/// Record counts, for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerStats {
    pub users: usize,
    pub members: usize,
    pub requirements: usize,
    pub progress_records: usize,
    pub audit_entries: usize,
}

// =============================================================================
// VALIDATION HELPERS
// =============================================================================

fn required(field: &str, value: &str) -> Result<String, TrackerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::InvalidInput(format!("{} is required", field)));
    }
    if trimmed.len() > MAX_FIELD_LENGTH {
        return Err(TrackerError::InvalidInput(format!(
            "{} exceeds {} characters",
            field, MAX_FIELD_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

/// Trim, treat empty as absent, and bound the length.
fn optional(field: &str, value: Option<String>, max: usize) -> Result<Option<String>, TrackerError> {
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) if v.len() > max => Err(TrackerError::InvalidInput(format!(
            "{} exceeds {} characters",
            field, max
        ))),
        Some(v) => Ok(Some(v.to_string())),
        None => Ok(None),
    }
}

fn validate_sort_order(sort_order: i32) -> Result<(), TrackerError> {
    if !(0..MAX_SORT_ORDER).contains(&sort_order) {
        return Err(TrackerError::InvalidInput(format!(
            "sort order must be between 0 and {}",
            MAX_SORT_ORDER - 1
        )));
    }
    Ok(())
}

/// Trimmed, lower-cased email.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn metadata<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Link audit rows hang off the member and name both sides of the pair.
fn link_metadata(leader: UserId, member: MemberId) -> BTreeMap<String, String> {
    metadata([
        ("leader_id", leader.to_string()),
        ("member_id", member.to_string()),
    ])
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map(|t| t.to_rfc3339()).unwrap_or_default()
}

// =============================================================================
// TRACKER
// =============================================================================

/// Record operations over a store.
#[derive(Debug, Default)]
pub struct Tracker {
    backend: StorageBackend,
}

impl Tracker {
    /// Create a tracker with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker with persistent redb storage.
    ///
    /// Opens or creates a redb database at the given path.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, TrackerError> {
        Ok(Self {
            backend: StorageBackend::Persistent(RedbStore::open(path)?),
        })
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Read access to the underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn TrackerStore {
        match &self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(store) => store,
        }
    }

    fn store_mut(&mut self) -> &mut dyn TrackerStore {
        match &mut self.backend {
            StorageBackend::InMemory(store) => store,
            StorageBackend::Persistent(store) => store,
        }
    }

    fn audit(
        &mut self,
        actor: Option<UserId>,
        action: AuditAction,
        entity: &str,
        entity_id: u64,
        metadata: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<AuditEntry, TrackerError> {
        Ok(AuditEntry {
            id: AuditId(self.store_mut().allocate_id()?),
            actor_id: actor,
            action,
            entity: entity.to_string(),
            entity_id,
            metadata,
            created_at: now,
        })
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    pub fn user(&self, id: UserId) -> Result<User, TrackerError> {
        self.store()
            .user(id)?
            .ok_or(TrackerError::NotFound("User", id.0))
    }

    /// Find a user by email, normalizing it first.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, TrackerError> {
        self.store().user_by_email(&normalize_email(email))
    }

    pub fn member(&self, id: MemberId) -> Result<Member, TrackerError> {
        self.store()
            .member(id)?
            .ok_or(TrackerError::NotFound("Member", id.0))
    }

    /// The member record attached to a login account, if any.
    pub fn member_for_user(&self, user_id: UserId) -> Result<Option<Member>, TrackerError> {
        Ok(self
            .store()
            .members()?
            .into_iter()
            .find(|m| m.user_id == Some(user_id)))
    }

    pub fn requirement(&self, id: RequirementId) -> Result<Requirement, TrackerError> {
        self.store()
            .requirement(id)?
            .ok_or(TrackerError::NotFound("Requirement", id.0))
    }

    pub fn progress(&self, id: ProgressId) -> Result<ProgressRecord, TrackerError> {
        self.store()
            .progress(id)?
            .ok_or(TrackerError::NotFound("Progress record", id.0))
    }

    /// All requirements, ordered by rank, then sort order, then code.
    pub fn curriculum(&self) -> Result<Vec<Requirement>, TrackerError> {
        let mut requirements = self.store().requirements()?;
        requirements.sort_by(|a, b| {
            (a.rank, a.sort_order, &a.code).cmp(&(b.rank, b.sort_order, &b.code))
        });
        Ok(requirements)
    }

    /// Subtasks of a requirement, ordered by sort order then code.
    pub fn subtasks(&self, requirement: RequirementId) -> Result<Vec<Subtask>, TrackerError> {
        let mut subtasks = self.store().subtasks(requirement)?;
        subtasks.sort_by(|a, b| (a.sort_order, &a.code).cmp(&(b.sort_order, &b.code)));
        Ok(subtasks)
    }

    pub fn stats(&self) -> Result<TrackerStats, TrackerError> {
        let store = self.store();
        Ok(TrackerStats {
            users: store.users()?.len(),
            members: store.members()?.len(),
            requirements: store.requirements()?.len(),
            progress_records: store.all_progress()?.len(),
            audit_entries: store.audit_log()?.len(),
        })
    }

    // =========================================================================
    // ACCOUNTS & CURRICULUM
    // =========================================================================

    /// Create a login account. Emails are unique after normalization.
    pub fn create_user(&mut self, new: NewUser, now: DateTime<Utc>) -> Result<User, TrackerError> {
        let email = normalize_email(&new.email);
        if email.is_empty() || !email.contains('@') {
            return Err(TrackerError::InvalidInput(
                "a valid email is required".to_string(),
            ));
        }
        if email.len() > MAX_FIELD_LENGTH {
            return Err(TrackerError::InvalidInput(format!(
                "email exceeds {} characters",
                MAX_FIELD_LENGTH
            )));
        }
        if self.store().user_by_email(&email)?.is_some() {
            return Err(TrackerError::Conflict(format!(
                "email already registered: {}",
                email
            )));
        }

        let user = User {
            id: UserId(self.store_mut().allocate_id()?),
            email,
            first_name: required("first name", &new.first_name)?,
            last_name: required("last name", &new.last_name)?,
            initials: optional("initials", new.initials, 8)?.map(|i| i.to_uppercase()),
            role: new.role,
            password_hash: new.password_hash,
            created_at: now,
        };
        self.store_mut().put_user(&user)?;
        Ok(user)
    }

    /// Replace a user's password hash.
    pub fn set_password_hash(&mut self, user_id: UserId, hash: String) -> Result<(), TrackerError> {
        let mut user = self.user(user_id)?;
        user.password_hash = Some(hash);
        self.store_mut().put_user(&user)
    }

    pub fn create_member(
        &mut self,
        new: NewMember,
        now: DateTime<Utc>,
    ) -> Result<Member, TrackerError> {
        if let Some(user_id) = new.user_id {
            self.user(user_id)?;
            if self.member_for_user(user_id)?.is_some() {
                return Err(TrackerError::Conflict(format!(
                    "user {} already has a member record",
                    user_id
                )));
            }
        }

        let member = Member {
            id: MemberId(self.store_mut().allocate_id()?),
            first_name: required("first name", &new.first_name)?,
            last_name: required("last name", &new.last_name)?,
            email: optional("email", new.email, MAX_FIELD_LENGTH)?.map(|e| e.to_lowercase()),
            phone: optional("phone", new.phone, MAX_FIELD_LENGTH)?,
            unit: optional("unit", new.unit, MAX_FIELD_LENGTH)?,
            council: optional("council", new.council, MAX_FIELD_LENGTH)?,
            current_rank: new.current_rank,
            date_of_birth: new.date_of_birth,
            user_id: new.user_id,
            created_at: now,
        };
        self.store_mut().put_member(&member)?;
        Ok(member)
    }

    /// Add a requirement to the curriculum. Codes are unique.
    pub fn add_requirement(&mut self, new: NewRequirement) -> Result<Requirement, TrackerError> {
        let code = required("code", &new.code)?;
        if self.store().requirement_by_code(&code)?.is_some() {
            return Err(TrackerError::Conflict(format!(
                "requirement code already exists: {}",
                code
            )));
        }
        if new.duration_days.is_some_and(|d| d > MAX_DURATION_DAYS) {
            return Err(TrackerError::InvalidInput(format!(
                "duration days exceeds {}",
                MAX_DURATION_DAYS
            )));
        }
        if new.duration_months.is_some_and(|m| m > MAX_DURATION_MONTHS) {
            return Err(TrackerError::InvalidInput(format!(
                "duration months exceeds {}",
                MAX_DURATION_MONTHS
            )));
        }
        validate_sort_order(new.sort_order)?;

        let requirement = Requirement {
            id: RequirementId(self.store_mut().allocate_id()?),
            code,
            title: required("title", &new.title)?,
            rank: new.rank,
            summary: optional("summary", new.summary, MAX_NOTE_LENGTH)?,
            dependency_text: optional("dependency text", new.dependency_text, MAX_NOTE_LENGTH)?,
            duration_days: new.duration_days,
            duration_months: new.duration_months,
            sort_order: new.sort_order,
        };
        self.store_mut().put_requirement(&requirement)?;
        Ok(requirement)
    }

    pub fn add_subtask(&mut self, new: NewSubtask) -> Result<Subtask, TrackerError> {
        self.requirement(new.requirement_id)?;
        validate_sort_order(new.sort_order)?;

        let subtask = Subtask {
            id: SubtaskId(self.store_mut().allocate_id()?),
            requirement_id: new.requirement_id,
            code: required("code", &new.code)?,
            title: required("title", &new.title)?,
            detail: optional("detail", new.detail, MAX_NOTE_LENGTH)?,
            sort_order: new.sort_order,
        };
        self.store_mut().put_subtask(&subtask)?;
        Ok(subtask)
    }

    // =========================================================================
    // ACCESS CHECKS
    // =========================================================================

    /// True when the leader has an approved link to the member.
    pub fn has_approved_link(&self, leader: UserId, member: MemberId) -> Result<bool, TrackerError> {
        Ok(self
            .store()
            .link(leader, member)?
            .is_some_and(|l| l.is_approved()))
    }

    /// Fail unless `actor` may read and edit this member's records.
    pub fn ensure_member_access(
        &self,
        actor: &User,
        member: MemberId,
    ) -> Result<Member, TrackerError> {
        let record = self.member(member)?;
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Leader => self.has_approved_link(actor.id, member)?,
            Role::Member => record.user_id == Some(actor.id),
        };
        if allowed {
            Ok(record)
        } else {
            Err(TrackerError::Forbidden(
                "You do not have access to this member.".to_string(),
            ))
        }
    }

    /// Fail unless `actor` may approve or revoke this member's records.
    pub fn ensure_can_approve(&self, actor: &User, member: MemberId) -> Result<(), TrackerError> {
        match actor.role {
            Role::Admin => Ok(()),
            Role::Leader if self.has_approved_link(actor.id, member)? => Ok(()),
            Role::Leader => Err(TrackerError::Forbidden(
                "You are not assigned to this member.".to_string(),
            )),
            Role::Member => Err(TrackerError::Forbidden(
                "Only leaders can approve requirements.".to_string(),
            )),
        }
    }

    // =========================================================================
    // ELIGIBILITY
    // =========================================================================

    /// Eligibility date for a requirement and a set of dates, without saving.
    pub fn preview_eligibility(
        &self,
        requirement: RequirementId,
        started_at: Option<DateTime<Utc>>,
        eligible_override: Option<DateTime<Utc>>,
    ) -> Result<Option<DateTime<Utc>>, TrackerError> {
        let requirement = self.requirement(requirement)?;
        Ok(compute_eligibility(
            started_at,
            requirement.duration_days,
            requirement.duration_months,
            eligible_override,
        ))
    }

    // =========================================================================
    // PROGRESS
    // =========================================================================

    /// Create or replace the progress record for a (member, requirement) pair.
    ///
    /// Re-saving always clears any approval and pending approval request.
    pub fn save_progress(
        &mut self,
        actor: &User,
        update: ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, TrackerError> {
        self.ensure_member_access(actor, update.member_id)?;
        let requirement = self.requirement(update.requirement_id)?;
        let notes = optional("notes", update.notes, MAX_NOTE_LENGTH)?;

        let eligible_at = compute_eligibility(
            update.started_at,
            requirement.duration_days,
            requirement.duration_months,
            update.eligible_override,
        );

        let existing = self
            .store()
            .progress_for(update.member_id, update.requirement_id)?;
        let mut record = match existing {
            Some(record) => record,
            None => ProgressRecord {
                id: ProgressId(self.store_mut().allocate_id()?),
                member_id: update.member_id,
                requirement_id: update.requirement_id,
                started_at: None,
                eligible_at: None,
                completed_at: None,
                notes: None,
                approval: None,
                approval_comment: None,
                approval_request: None,
                updated_at: now,
            },
        };

        record.started_at = update.started_at;
        record.eligible_at = eligible_at;
        record.completed_at = update.completed_at;
        record.notes = notes;
        record.clear_approval();
        record.updated_at = now;

        let audit = self.audit(
            Some(actor.id),
            AuditAction::ProgressUpdated,
            "ProgressRecord",
            record.id.0,
            metadata([
                ("member_id", record.member_id.to_string()),
                ("requirement_id", record.requirement_id.to_string()),
                ("code", requirement.code.clone()),
                ("started_at", timestamp(record.started_at)),
                ("eligible_at", timestamp(record.eligible_at)),
                ("completed_at", timestamp(record.completed_at)),
            ]),
            now,
        )?;
        self.store_mut().commit_progress(&record, &audit)?;
        Ok(record)
    }

    /// Sign off a progress record with the actor's initials.
    pub fn approve_progress(
        &mut self,
        actor: &User,
        progress: ProgressId,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, TrackerError> {
        let mut record = self.progress(progress)?;
        self.ensure_can_approve(actor, record.member_id)?;

        let initials = actor.signing_initials();
        if initials.is_empty() {
            return Err(TrackerError::InvalidInput(
                "approver has no initials to sign with".to_string(),
            ));
        }
        let comment = optional("comment", comment, MAX_NOTE_LENGTH)?;

        record.approval = Some(Approval {
            leader_id: actor.id,
            approved_at: now,
            initials,
        });
        record.approval_comment = comment.clone();
        record.approval_request = None;
        record.updated_at = now;

        let audit = self.audit(
            Some(actor.id),
            AuditAction::ProgressApproved,
            "ProgressRecord",
            record.id.0,
            metadata([
                ("member_id", record.member_id.to_string()),
                ("requirement_id", record.requirement_id.to_string()),
                ("approved_at", now.to_rfc3339()),
                ("comment", comment.unwrap_or_default()),
            ]),
            now,
        )?;
        self.store_mut().commit_progress(&record, &audit)?;
        Ok(record)
    }

    /// Withdraw an approval. The reason, if any, replaces the approval comment.
    pub fn revoke_progress(
        &mut self,
        actor: &User,
        progress: ProgressId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, TrackerError> {
        let mut record = self.progress(progress)?;
        self.ensure_can_approve(actor, record.member_id)?;
        let reason = optional("reason", reason, MAX_NOTE_LENGTH)?;

        record.clear_approval();
        record.approval_comment = reason.clone();
        record.updated_at = now;

        let audit = self.audit(
            Some(actor.id),
            AuditAction::ProgressRevoked,
            "ProgressRecord",
            record.id.0,
            metadata([
                ("member_id", record.member_id.to_string()),
                ("requirement_id", record.requirement_id.to_string()),
                ("reason", reason.unwrap_or_default()),
            ]),
            now,
        )?;
        self.store_mut().commit_progress(&record, &audit)?;
        Ok(record)
    }

    /// Ask a linked leader to review a record.
    ///
    /// A standing approval is withdrawn so the record returns to the leader's queue.
    pub fn request_approval(
        &mut self,
        actor: &User,
        progress: ProgressId,
        leader: UserId,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord, TrackerError> {
        let mut record = self.progress(progress)?;
        self.ensure_member_access(actor, record.member_id)?;

        if !self.has_approved_link(leader, record.member_id)? {
            return Err(TrackerError::Forbidden(
                "That leader is not currently assigned to this member.".to_string(),
            ));
        }

        record.clear_approval();
        record.approval_request = Some(ApprovalRequest {
            leader_id: leader,
            requested_by: actor.id,
            requested_at: now,
        });
        record.updated_at = now;

        let audit = self.audit(
            Some(actor.id),
            AuditAction::ApprovalRequested,
            "ProgressRecord",
            record.id.0,
            metadata([
                ("member_id", record.member_id.to_string()),
                ("requirement_id", record.requirement_id.to_string()),
                ("leader_id", leader.to_string()),
            ]),
            now,
        )?;
        self.store_mut().commit_progress(&record, &audit)?;
        Ok(record)
    }

    /// Append a note to a progress record.
    pub fn add_note(
        &mut self,
        actor: &User,
        progress: ProgressId,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<Note, TrackerError> {
        let record = self.progress(progress)?;
        self.ensure_member_access(actor, record.member_id)?;

        let body = body.trim();
        if body.is_empty() {
            return Err(TrackerError::InvalidInput(
                "Please enter a note before saving.".to_string(),
            ));
        }
        if body.len() > MAX_NOTE_LENGTH {
            return Err(TrackerError::InvalidInput(format!(
                "note exceeds {} characters",
                MAX_NOTE_LENGTH
            )));
        }

        let note = Note {
            id: NoteId(self.store_mut().allocate_id()?),
            progress_id: record.id,
            author_id: Some(actor.id),
            body: body.to_string(),
            created_at: now,
        };
        let audit = self.audit(
            Some(actor.id),
            AuditAction::NoteAdded,
            "Note",
            note.id.0,
            metadata([("progress_id", record.id.to_string())]),
            now,
        )?;
        self.store_mut().commit_note(&note, &audit)?;
        Ok(note)
    }

    /// Mark a subtask done (stamped with `now`) or not done.
    pub fn set_subtask_completed(
        &mut self,
        actor: &User,
        progress: ProgressId,
        subtask: SubtaskId,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<SubtaskProgress, TrackerError> {
        let record = self.progress(progress)?;
        self.ensure_member_access(actor, record.member_id)?;

        let subtask = self
            .store()
            .subtask(subtask)?
            .ok_or(TrackerError::NotFound("Subtask", subtask.0))?;
        if subtask.requirement_id != record.requirement_id {
            return Err(TrackerError::InvalidInput(
                "subtask belongs to a different requirement".to_string(),
            ));
        }

        let entry = SubtaskProgress {
            progress_id: record.id,
            subtask_id: subtask.id,
            completed_at: completed.then_some(now),
        };
        let audit = self.audit(
            Some(actor.id),
            AuditAction::SubtaskUpdated,
            "SubtaskProgress",
            subtask.id.0,
            metadata([
                ("progress_id", record.id.to_string()),
                ("completed", completed.to_string()),
            ]),
            now,
        )?;
        self.store_mut().commit_subtask_progress(&entry, &audit)?;
        Ok(entry)
    }

    // =========================================================================
    // LEADER LINKS
    // =========================================================================

    /// Link a leader to a member.
    ///
    /// Leaders may only request links for themselves and start `Pending`.
    /// Admins may link any leader and the link is approved immediately.
    pub fn request_link(
        &mut self,
        actor: &User,
        leader: UserId,
        member: MemberId,
        now: DateTime<Utc>,
    ) -> Result<LeaderLink, TrackerError> {
        let status = match actor.role {
            Role::Admin => LinkStatus::Approved,
            Role::Leader if actor.id == leader => LinkStatus::Pending,
            Role::Leader => {
                return Err(TrackerError::Forbidden(
                    "Leaders can only request links for themselves.".to_string(),
                ));
            }
            Role::Member => {
                return Err(TrackerError::Forbidden(
                    "Only leaders and admins can link leaders.".to_string(),
                ));
            }
        };

        if self.user(leader)?.role != Role::Leader {
            return Err(TrackerError::InvalidInput(format!(
                "user {} is not a leader",
                leader
            )));
        }
        self.member(member)?;

        if let Some(existing) = self.store().link(leader, member)? {
            if existing.is_approved() || status == LinkStatus::Pending {
                return Ok(existing);
            }
        }

        let approved = status == LinkStatus::Approved;
        let link = LeaderLink {
            leader_id: leader,
            member_id: member,
            status,
            approved_by: approved.then_some(actor.id),
            approved_at: approved.then_some(now),
            created_at: now,
        };
        let action = if approved {
            AuditAction::LinkApproved
        } else {
            AuditAction::LinkRequested
        };
        let audit = self.audit(
            Some(actor.id),
            action,
            "Member",
            member.0,
            link_metadata(leader, member),
            now,
        )?;
        self.store_mut().commit_link(&link, &audit)?;
        Ok(link)
    }

    /// Approve a pending link. Admins only.
    pub fn approve_link(
        &mut self,
        actor: &User,
        leader: UserId,
        member: MemberId,
        now: DateTime<Utc>,
    ) -> Result<LeaderLink, TrackerError> {
        if actor.role != Role::Admin {
            return Err(TrackerError::Forbidden(
                "Only admins can approve leader links.".to_string(),
            ));
        }
        let mut link = self
            .store()
            .link(leader, member)?
            .ok_or(TrackerError::LinkNotFound { leader, member })?;
        if link.is_approved() {
            return Ok(link);
        }

        link.status = LinkStatus::Approved;
        link.approved_by = Some(actor.id);
        link.approved_at = Some(now);

        let audit = self.audit(
            Some(actor.id),
            AuditAction::LinkApproved,
            "Member",
            member.0,
            link_metadata(leader, member),
            now,
        )?;
        self.store_mut().commit_link(&link, &audit)?;
        Ok(link)
    }

    /// Leaders with an approved link to the member, by last then first name.
    pub fn approved_leaders(&self, member: MemberId) -> Result<Vec<User>, TrackerError> {
        let mut leaders = Vec::new();
        for link in self.store().links_for_member(member)? {
            if link.is_approved() {
                leaders.push(self.user(link.leader_id)?);
            }
        }
        leaders.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));
        Ok(leaders)
    }

    /// Members the leader has an approved link to, by last then first name.
    pub fn linked_members(&self, leader: UserId) -> Result<Vec<Member>, TrackerError> {
        let mut members = Vec::new();
        for link in self.store().links_for_leader(leader)? {
            if link.is_approved() {
                members.push(self.member(link.member_id)?);
            }
        }
        members.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));
        Ok(members)
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    /// Store a new login session for an already-hashed token.
    pub fn open_session(
        &mut self,
        user: UserId,
        token_hash: String,
        ttl: TimeDelta,
        now: DateTime<Utc>,
    ) -> Result<LoginSession, TrackerError> {
        self.user(user)?;
        self.prune_sessions(now)?;
        let session = LoginSession {
            token_hash,
            user_id: user,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.store_mut().put_session(&session)?;
        Ok(session)
    }

    /// Look a token hash up without touching the store.
    pub fn lookup_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionLookup, TrackerError> {
        let Some(session) = self.store().session(token_hash)? else {
            return Ok(SessionLookup::Unknown);
        };
        if session.is_expired(now) {
            return Ok(SessionLookup::Expired);
        }
        Ok(match self.store().user(session.user_id)? {
            Some(user) => SessionLookup::Active(user),
            None => SessionLookup::Unknown,
        })
    }

    /// Resolve a token hash to its user. Expired sessions are deleted.
    pub fn resolve_session(
        &mut self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, TrackerError> {
        match self.lookup_session(token_hash, now)? {
            SessionLookup::Active(user) => Ok(Some(user)),
            SessionLookup::Expired => {
                self.store_mut().delete_session(token_hash)?;
                Ok(None)
            }
            SessionLookup::Unknown => Ok(None),
        }
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn prune_sessions(&mut self, now: DateTime<Utc>) -> Result<usize, TrackerError> {
        self.store_mut().prune_sessions(now)
    }

    /// Delete a session. Returns whether one existed.
    pub fn close_session(&mut self, token_hash: &str) -> Result<bool, TrackerError> {
        self.store_mut().delete_session(token_hash)
    }

    // =========================================================================
    // AUDIT
    // =========================================================================

    /// The full audit log, oldest first. Admins only.
    pub fn audit_log(&self, actor: &User) -> Result<Vec<AuditEntry>, TrackerError> {
        if actor.role != Role::Admin {
            return Err(TrackerError::Forbidden(
                "Only admins can read the audit log.".to_string(),
            ));
        }
        self.store().audit_log()
    }
}

// =============================================================================
// TESTS
// =============================================================================
