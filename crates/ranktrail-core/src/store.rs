//! # Record Store
//!
//! The `TrackerStore` trait and its in-memory implementation.
//!
//! Stores are dumb: they persist and index records. Validation, access rules
//! and audit bookkeeping live in [`crate::tracker`]. All data structures use
//! `BTreeMap` so listings come back in id order.
//!
//! Every `commit_*` method writes a record together with its audit entry;
//! persistent stores do both in a single transaction.

use crate::{
    AuditEntry, AuditId, LeaderLink, LoginSession, Member, MemberId, Note, NoteId, ProgressId,
    ProgressRecord, Requirement, RequirementId, Subtask, SubtaskId, SubtaskProgress, TrackerError,
    User, UserId,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

// =============================================================================
// TRACKERSTORE TRAIT
// =============================================================================

/// Persistence operations needed by the tracker.
///
/// All fallible operations return `Result<T, TrackerError>` so in-memory and
/// persistent backends can be used uniformly.
pub trait TrackerStore {
    /// Hand out the next unused record id. Ids are shared across record types.
    fn allocate_id(&mut self) -> Result<u64, TrackerError>;

    // --- users -------------------------------------------------------------

    /// Insert or replace a user and its email index entry.
    fn put_user(&mut self, user: &User) -> Result<(), TrackerError>;

    fn user(&self, id: UserId) -> Result<Option<User>, TrackerError>;

    /// Lookup by normalized (trimmed, lower-cased) email.
    fn user_by_email(&self, email: &str) -> Result<Option<User>, TrackerError>;

    fn users(&self) -> Result<Vec<User>, TrackerError>;

    // --- members -----------------------------------------------------------

    fn put_member(&mut self, member: &Member) -> Result<(), TrackerError>;

    fn member(&self, id: MemberId) -> Result<Option<Member>, TrackerError>;

    fn members(&self) -> Result<Vec<Member>, TrackerError>;

    // --- curriculum --------------------------------------------------------

    /// Insert or replace a requirement and its code index entry.
    fn put_requirement(&mut self, requirement: &Requirement) -> Result<(), TrackerError>;

    fn requirement(&self, id: RequirementId) -> Result<Option<Requirement>, TrackerError>;

    fn requirement_by_code(&self, code: &str) -> Result<Option<Requirement>, TrackerError>;

    fn requirements(&self) -> Result<Vec<Requirement>, TrackerError>;

    fn put_subtask(&mut self, subtask: &Subtask) -> Result<(), TrackerError>;

    fn subtask(&self, id: SubtaskId) -> Result<Option<Subtask>, TrackerError>;

    /// Subtasks belonging to one requirement, in id order.
    fn subtasks(&self, requirement: RequirementId) -> Result<Vec<Subtask>, TrackerError>;

    // --- progress ----------------------------------------------------------

    fn progress(&self, id: ProgressId) -> Result<Option<ProgressRecord>, TrackerError>;

    /// The unique record for a (member, requirement) pair.
    fn progress_for(
        &self,
        member: MemberId,
        requirement: RequirementId,
    ) -> Result<Option<ProgressRecord>, TrackerError>;

    fn member_progress(&self, member: MemberId) -> Result<Vec<ProgressRecord>, TrackerError>;

    fn all_progress(&self) -> Result<Vec<ProgressRecord>, TrackerError>;

    /// Insert or replace a progress record (and its pair index) plus audit entry.
    fn commit_progress(
        &mut self,
        record: &ProgressRecord,
        audit: &AuditEntry,
    ) -> Result<(), TrackerError>;

    // --- notes & subtasks --------------------------------------------------

    fn commit_note(&mut self, note: &Note, audit: &AuditEntry) -> Result<(), TrackerError>;

    /// Notes on one progress record, in id (creation) order.
    fn notes(&self, progress: ProgressId) -> Result<Vec<Note>, TrackerError>;

    fn commit_subtask_progress(
        &mut self,
        entry: &SubtaskProgress,
        audit: &AuditEntry,
    ) -> Result<(), TrackerError>;

    fn subtask_progress(&self, progress: ProgressId) -> Result<Vec<SubtaskProgress>, TrackerError>;

    // --- leader links ------------------------------------------------------

    fn commit_link(&mut self, link: &LeaderLink, audit: &AuditEntry) -> Result<(), TrackerError>;

    fn link(&self, leader: UserId, member: MemberId) -> Result<Option<LeaderLink>, TrackerError>;

    fn links_for_leader(&self, leader: UserId) -> Result<Vec<LeaderLink>, TrackerError>;

    fn links_for_member(&self, member: MemberId) -> Result<Vec<LeaderLink>, TrackerError>;

    // --- sessions ----------------------------------------------------------

    fn put_session(&mut self, session: &LoginSession) -> Result<(), TrackerError>;

    fn session(&self, token_hash: &str) -> Result<Option<LoginSession>, TrackerError>;

    /// Returns whether a session was removed.
    fn delete_session(&mut self, token_hash: &str) -> Result<bool, TrackerError>;

    /// Remove every session expired at `now`. Returns how many were removed.
    fn prune_sessions(&mut self, now: DateTime<Utc>) -> Result<usize, TrackerError>;

    // --- audit -------------------------------------------------------------

    fn audit_log(&self) -> Result<Vec<AuditEntry>, TrackerError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Volatile store backed by ordered maps.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    next_id: u64,
    users: BTreeMap<UserId, User>,
    emails: BTreeMap<String, UserId>,
    members: BTreeMap<MemberId, Member>,
    requirements: BTreeMap<RequirementId, Requirement>,
    requirement_codes: BTreeMap<String, RequirementId>,
    subtasks: BTreeMap<SubtaskId, Subtask>,
    progress: BTreeMap<ProgressId, ProgressRecord>,
    progress_index: BTreeMap<(MemberId, RequirementId), ProgressId>,
    notes: BTreeMap<(ProgressId, NoteId), Note>,
    subtask_progress: BTreeMap<(ProgressId, SubtaskId), SubtaskProgress>,
    links: BTreeMap<(UserId, MemberId), LeaderLink>,
    sessions: BTreeMap<String, LoginSession>,
    audit: BTreeMap<AuditId, AuditEntry>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            // Id 0 is never handed out.
            next_id: 1,
            users: BTreeMap::new(),
            emails: BTreeMap::new(),
            members: BTreeMap::new(),
            requirements: BTreeMap::new(),
            requirement_codes: BTreeMap::new(),
            subtasks: BTreeMap::new(),
            progress: BTreeMap::new(),
            progress_index: BTreeMap::new(),
            notes: BTreeMap::new(),
            subtask_progress: BTreeMap::new(),
            links: BTreeMap::new(),
            sessions: BTreeMap::new(),
            audit: BTreeMap::new(),
        }
    }
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push_audit(&mut self, audit: &AuditEntry) {
        self.audit.insert(audit.id, audit.clone());
    }
}

impl TrackerStore for MemoryStore {
    fn allocate_id(&mut self) -> Result<u64, TrackerError> {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        Ok(id)
    }

    fn put_user(&mut self, user: &User) -> Result<(), TrackerError> {
        self.emails.insert(user.email.clone(), user.id);
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    fn user(&self, id: UserId) -> Result<Option<User>, TrackerError> {
        Ok(self.users.get(&id).cloned())
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, TrackerError> {
        Ok(self
            .emails
            .get(email)
            .and_then(|id| self.users.get(id))
            .cloned())
    }

    fn users(&self) -> Result<Vec<User>, TrackerError> {
        Ok(self.users.values().cloned().collect())
    }

    fn put_member(&mut self, member: &Member) -> Result<(), TrackerError> {
        self.members.insert(member.id, member.clone());
        Ok(())
    }

    fn member(&self, id: MemberId) -> Result<Option<Member>, TrackerError> {
        Ok(self.members.get(&id).cloned())
    }

    fn members(&self) -> Result<Vec<Member>, TrackerError> {
        Ok(self.members.values().cloned().collect())
    }

    fn put_requirement(&mut self, requirement: &Requirement) -> Result<(), TrackerError> {
        self.requirement_codes
            .insert(requirement.code.clone(), requirement.id);
        self.requirements
            .insert(requirement.id, requirement.clone());
        Ok(())
    }

    fn requirement(&self, id: RequirementId) -> Result<Option<Requirement>, TrackerError> {
        Ok(self.requirements.get(&id).cloned())
    }

    fn requirement_by_code(&self, code: &str) -> Result<Option<Requirement>, TrackerError> {
        Ok(self
            .requirement_codes
            .get(code)
            .and_then(|id| self.requirements.get(id))
            .cloned())
    }

    fn requirements(&self) -> Result<Vec<Requirement>, TrackerError> {
        Ok(self.requirements.values().cloned().collect())
    }

    fn put_subtask(&mut self, subtask: &Subtask) -> Result<(), TrackerError> {
        self.subtasks.insert(subtask.id, subtask.clone());
        Ok(())
    }

    fn subtask(&self, id: SubtaskId) -> Result<Option<Subtask>, TrackerError> {
        Ok(self.subtasks.get(&id).cloned())
    }

    fn subtasks(&self, requirement: RequirementId) -> Result<Vec<Subtask>, TrackerError> {
        Ok(self
            .subtasks
            .values()
            .filter(|s| s.requirement_id == requirement)
            .cloned()
            .collect())
    }

    fn progress(&self, id: ProgressId) -> Result<Option<ProgressRecord>, TrackerError> {
        Ok(self.progress.get(&id).cloned())
    }

    fn progress_for(
        &self,
        member: MemberId,
        requirement: RequirementId,
    ) -> Result<Option<ProgressRecord>, TrackerError> {
        Ok(self
            .progress_index
            .get(&(member, requirement))
            .and_then(|id| self.progress.get(id))
            .cloned())
    }

    fn member_progress(&self, member: MemberId) -> Result<Vec<ProgressRecord>, TrackerError> {
        Ok(self
            .progress
            .values()
            .filter(|p| p.member_id == member)
            .cloned()
            .collect())
    }

    fn all_progress(&self) -> Result<Vec<ProgressRecord>, TrackerError> {
        Ok(self.progress.values().cloned().collect())
    }

    fn commit_progress(
        &mut self,
        record: &ProgressRecord,
        audit: &AuditEntry,
    ) -> Result<(), TrackerError> {
        self.progress_index
            .insert((record.member_id, record.requirement_id), record.id);
        self.progress.insert(record.id, record.clone());
        self.push_audit(audit);
        Ok(())
    }

    fn commit_note(&mut self, note: &Note, audit: &AuditEntry) -> Result<(), TrackerError> {
        self.notes.insert((note.progress_id, note.id), note.clone());
        self.push_audit(audit);
        Ok(())
    }

    fn notes(&self, progress: ProgressId) -> Result<Vec<Note>, TrackerError> {
        Ok(self
            .notes
            .range((progress, NoteId(0))..=(progress, NoteId(u64::MAX)))
            .map(|(_, note)| note.clone())
            .collect())
    }

    fn commit_subtask_progress(
        &mut self,
        entry: &SubtaskProgress,
        audit: &AuditEntry,
    ) -> Result<(), TrackerError> {
        self.subtask_progress
            .insert((entry.progress_id, entry.subtask_id), entry.clone());
        self.push_audit(audit);
        Ok(())
    }

    fn subtask_progress(&self, progress: ProgressId) -> Result<Vec<SubtaskProgress>, TrackerError> {
        Ok(self
            .subtask_progress
            .range((progress, SubtaskId(0))..=(progress, SubtaskId(u64::MAX)))
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    fn commit_link(&mut self, link: &LeaderLink, audit: &AuditEntry) -> Result<(), TrackerError> {
        self.links
            .insert((link.leader_id, link.member_id), link.clone());
        self.push_audit(audit);
        Ok(())
    }

    fn link(&self, leader: UserId, member: MemberId) -> Result<Option<LeaderLink>, TrackerError> {
        Ok(self.links.get(&(leader, member)).cloned())
    }

    fn links_for_leader(&self, leader: UserId) -> Result<Vec<LeaderLink>, TrackerError> {
        Ok(self
            .links
            .range((leader, MemberId(0))..=(leader, MemberId(u64::MAX)))
            .map(|(_, link)| link.clone())
            .collect())
    }

    fn links_for_member(&self, member: MemberId) -> Result<Vec<LeaderLink>, TrackerError> {
        Ok(self
            .links
            .values()
            .filter(|l| l.member_id == member)
            .cloned()
            .collect())
    }

    fn put_session(&mut self, session: &LoginSession) -> Result<(), TrackerError> {
        self.sessions
            .insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    fn session(&self, token_hash: &str) -> Result<Option<LoginSession>, TrackerError> {
        Ok(self.sessions.get(token_hash).cloned())
    }

    fn delete_session(&mut self, token_hash: &str) -> Result<bool, TrackerError> {
        Ok(self.sessions.remove(token_hash).is_some())
    }

    fn prune_sessions(&mut self, now: DateTime<Utc>) -> Result<usize, TrackerError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired(now));
        Ok(before - self.sessions.len())
    }

    fn audit_log(&self) -> Result<Vec<AuditEntry>, TrackerError> {
        Ok(self.audit.values().cloned().collect())
    }
}

// =============================================================================
// TESTS
// =============================================================================
