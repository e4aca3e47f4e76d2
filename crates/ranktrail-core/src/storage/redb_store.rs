//! # redb-backed Record Storage
//!
//! A disk-backed tracker store using the redb embedded database.
//!
//! Records are postcard-encoded byte values keyed by their numeric id.
//! Secondary lookups (email, requirement code, member/requirement pair) live
//! in small index tables. Each `commit_*` call writes the record, its indexes
//! and the audit entry in one ACID write transaction, so a crash can never
//! leave a change without its audit line.

use crate::store::TrackerStore;
use crate::{
    AuditEntry, LeaderLink, LoginSession, Member, MemberId, Note, ProgressId, ProgressRecord,
    Requirement, RequirementId, Subtask, SubtaskId, SubtaskProgress, TrackerError, User, UserId,
};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

type RecordTable = TableDefinition<'static, u64, &'static [u8]>;
type PairTable = TableDefinition<'static, (u64, u64), &'static [u8]>;
type IndexTable = TableDefinition<'static, &'static str, u64>;

/// Table for metadata: key string -> value u64
const METADATA: IndexTable = TableDefinition::new("metadata");

/// Table for users: UserId -> serialized User
const USERS: RecordTable = TableDefinition::new("users");

/// Table for the email index: normalized email -> UserId
const USER_EMAILS: IndexTable = TableDefinition::new("user_emails");

/// Table for members: MemberId -> serialized Member
const MEMBERS: RecordTable = TableDefinition::new("members");

/// Table for requirements: RequirementId -> serialized Requirement
const REQUIREMENTS: RecordTable = TableDefinition::new("requirements");

/// Table for the requirement code index: code -> RequirementId
const REQUIREMENT_CODES: IndexTable = TableDefinition::new("requirement_codes");

/// Table for subtasks: SubtaskId -> serialized Subtask
const SUBTASKS: RecordTable = TableDefinition::new("subtasks");

/// Table for progress records: ProgressId -> serialized ProgressRecord
const PROGRESS: RecordTable = TableDefinition::new("progress");

/// Table for the pair index: (member_id, requirement_id) -> ProgressId
const PROGRESS_INDEX: TableDefinition<(u64, u64), u64> = TableDefinition::new("progress_index");

/// Table for notes: (progress_id, note_id) -> serialized Note
const NOTES: PairTable = TableDefinition::new("notes");

/// Table for subtask completion: (progress_id, subtask_id) -> serialized SubtaskProgress
const SUBTASK_PROGRESS: PairTable = TableDefinition::new("subtask_progress");

/// Table for leader links: (leader_id, member_id) -> serialized LeaderLink
const LINKS: PairTable = TableDefinition::new("links");

/// Table for sessions: token hash -> serialized LoginSession
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Table for the audit log: AuditId -> serialized AuditEntry
const AUDIT: RecordTable = TableDefinition::new("audit");

const NEXT_ID_KEY: &str = "next_id";

fn io(e: impl std::fmt::Display) -> TrackerError {
    TrackerError::IoError(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TrackerError> {
    postcard::to_allocvec(value).map_err(|e| TrackerError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TrackerError> {
    postcard::from_bytes(bytes).map_err(|e| TrackerError::SerializationError(e.to_string()))
}

fn insert_record<T: Serialize>(
    txn: &WriteTransaction,
    table: RecordTable,
    id: u64,
    value: &T,
) -> Result<(), TrackerError> {
    let bytes = encode(value)?;
    let mut table = txn.open_table(table).map_err(io)?;
    table.insert(id, bytes.as_slice()).map_err(io)?;
    Ok(())
}

fn insert_pair<T: Serialize>(
    txn: &WriteTransaction,
    table: PairTable,
    key: (u64, u64),
    value: &T,
) -> Result<(), TrackerError> {
    let bytes = encode(value)?;
    let mut table = txn.open_table(table).map_err(io)?;
    table.insert(key, bytes.as_slice()).map_err(io)?;
    Ok(())
}

fn insert_index(
    txn: &WriteTransaction,
    table: IndexTable,
    key: &str,
    id: u64,
) -> Result<(), TrackerError> {
    let mut table = txn.open_table(table).map_err(io)?;
    table.insert(key, id).map_err(io)?;
    Ok(())
}

/// A disk-backed tracker store using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// Next available record id, mirrored in the metadata table.
    next_id: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a tracker database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrackerError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io)?;
            for table in [METADATA, USER_EMAILS, REQUIREMENT_CODES] {
                let _ = write_txn.open_table(table).map_err(io)?;
            }
            for table in [USERS, MEMBERS, REQUIREMENTS, SUBTASKS, PROGRESS, AUDIT] {
                let _ = write_txn.open_table(table).map_err(io)?;
            }
            for table in [NOTES, SUBTASK_PROGRESS, LINKS] {
                let _ = write_txn.open_table(table).map_err(io)?;
            }
            let _ = write_txn.open_table(PROGRESS_INDEX).map_err(io)?;
            let _ = write_txn.open_table(SESSIONS).map_err(io)?;
            write_txn.commit().map_err(io)?;
        }

        let next_id = {
            let read_txn = db.begin_read().map_err(io)?;
            let table = read_txn.open_table(METADATA).map_err(io)?;
            table
                .get(NEXT_ID_KEY)
                .map_err(io)?
                .map(|v| v.value())
                .unwrap_or(1)
        };

        Ok(Self { db, next_id })
    }

    fn get_record<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        id: u64,
    ) -> Result<Option<T>, TrackerError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(table).map_err(io)?;
        match table.get(id).map_err(io)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn scan_records<T: DeserializeOwned>(&self, table: RecordTable) -> Result<Vec<T>, TrackerError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(table).map_err(io)?;

        let mut records = Vec::new();
        for entry in table.iter().map_err(io)? {
            let (_, data) = entry.map_err(io)?;
            records.push(decode(data.value())?);
        }
        Ok(records)
    }

    fn scan_pairs<T: DeserializeOwned>(
        &self,
        table: PairTable,
        prefix: Option<u64>,
    ) -> Result<Vec<T>, TrackerError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(table).map_err(io)?;

        let (low, high) = match prefix {
            Some(first) => ((first, 0u64), (first, u64::MAX)),
            None => ((0u64, 0u64), (u64::MAX, u64::MAX)),
        };

        let mut records = Vec::new();
        for entry in table.range(low..=high).map_err(io)? {
            let (_, data) = entry.map_err(io)?;
            records.push(decode(data.value())?);
        }
        Ok(records)
    }

    fn lookup_index(&self, table: IndexTable, key: &str) -> Result<Option<u64>, TrackerError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(table).map_err(io)?;
        Ok(table.get(key).map_err(io)?.map(|v| v.value()))
    }

    /// Run `write` inside one write transaction and commit it.
    fn write<F>(&self, write: F) -> Result<(), TrackerError>
    where
        F: FnOnce(&WriteTransaction) -> Result<(), TrackerError>,
    {
        let write_txn = self.db.begin_write().map_err(io)?;
        write(&write_txn)?;
        write_txn.commit().map_err(io)?;
        Ok(())
    }
}

impl TrackerStore for RedbStore {
    fn allocate_id(&mut self) -> Result<u64, TrackerError> {
        let id = self.next_id;
        let next = id.saturating_add(1);
        self.write(|txn| insert_index(txn, METADATA, NEXT_ID_KEY, next))?;
        self.next_id = next;
        Ok(id)
    }

    fn put_user(&mut self, user: &User) -> Result<(), TrackerError> {
        self.write(|txn| {
            insert_record(txn, USERS, user.id.0, user)?;
            insert_index(txn, USER_EMAILS, &user.email, user.id.0)
        })
    }

    fn user(&self, id: UserId) -> Result<Option<User>, TrackerError> {
        self.get_record(USERS, id.0)
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, TrackerError> {
        match self.lookup_index(USER_EMAILS, email)? {
            Some(id) => self.get_record(USERS, id),
            None => Ok(None),
        }
    }

    fn users(&self) -> Result<Vec<User>, TrackerError> {
        self.scan_records(USERS)
    }

    fn put_member(&mut self, member: &Member) -> Result<(), TrackerError> {
        self.write(|txn| insert_record(txn, MEMBERS, member.id.0, member))
    }

    fn member(&self, id: MemberId) -> Result<Option<Member>, TrackerError> {
        self.get_record(MEMBERS, id.0)
    }

    fn members(&self) -> Result<Vec<Member>, TrackerError> {
        self.scan_records(MEMBERS)
    }

    fn put_requirement(&mut self, requirement: &Requirement) -> Result<(), TrackerError> {
        self.write(|txn| {
            insert_record(txn, REQUIREMENTS, requirement.id.0, requirement)?;
            insert_index(txn, REQUIREMENT_CODES, &requirement.code, requirement.id.0)
        })
    }

    fn requirement(&self, id: RequirementId) -> Result<Option<Requirement>, TrackerError> {
        self.get_record(REQUIREMENTS, id.0)
    }

    fn requirement_by_code(&self, code: &str) -> Result<Option<Requirement>, TrackerError> {
        match self.lookup_index(REQUIREMENT_CODES, code)? {
            Some(id) => self.get_record(REQUIREMENTS, id),
            None => Ok(None),
        }
    }

    fn requirements(&self) -> Result<Vec<Requirement>, TrackerError> {
        self.scan_records(REQUIREMENTS)
    }

    fn put_subtask(&mut self, subtask: &Subtask) -> Result<(), TrackerError> {
        self.write(|txn| insert_record(txn, SUBTASKS, subtask.id.0, subtask))
    }

    fn subtask(&self, id: SubtaskId) -> Result<Option<Subtask>, TrackerError> {
        self.get_record(SUBTASKS, id.0)
    }

    fn subtasks(&self, requirement: RequirementId) -> Result<Vec<Subtask>, TrackerError> {
        let all: Vec<Subtask> = self.scan_records(SUBTASKS)?;
        Ok(all
            .into_iter()
            .filter(|s| s.requirement_id == requirement)
            .collect())
    }

    fn progress(&self, id: ProgressId) -> Result<Option<ProgressRecord>, TrackerError> {
        self.get_record(PROGRESS, id.0)
    }

    fn progress_for(
        &self,
        member: MemberId,
        requirement: RequirementId,
    ) -> Result<Option<ProgressRecord>, TrackerError> {
        let id = {
            let read_txn = self.db.begin_read().map_err(io)?;
            let table = read_txn.open_table(PROGRESS_INDEX).map_err(io)?;
            table
                .get((member.0, requirement.0))
                .map_err(io)?
                .map(|v| v.value())
        };
        match id {
            Some(id) => self.get_record(PROGRESS, id),
            None => Ok(None),
        }
    }

    fn member_progress(&self, member: MemberId) -> Result<Vec<ProgressRecord>, TrackerError> {
        let ids = {
            let read_txn = self.db.begin_read().map_err(io)?;
            let table = read_txn.open_table(PROGRESS_INDEX).map_err(io)?;
            let mut ids = Vec::new();
            for entry in table
                .range((member.0, 0u64)..=(member.0, u64::MAX))
                .map_err(io)?
            {
                let (_, id) = entry.map_err(io)?;
                ids.push(id.value());
            }
            ids
        };

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get_record(PROGRESS, id)? {
                records.push(record);
            }
        }
        // Index order is by requirement; callers expect id order.
        records.sort_by_key(|r: &ProgressRecord| r.id);
        Ok(records)
    }

    fn all_progress(&self) -> Result<Vec<ProgressRecord>, TrackerError> {
        self.scan_records(PROGRESS)
    }

    fn commit_progress(
        &mut self,
        record: &ProgressRecord,
        audit: &AuditEntry,
    ) -> Result<(), TrackerError> {
        self.write(|txn| {
            insert_record(txn, PROGRESS, record.id.0, record)?;
            {
                let mut index = txn.open_table(PROGRESS_INDEX).map_err(io)?;
                index
                    .insert((record.member_id.0, record.requirement_id.0), record.id.0)
                    .map_err(io)?;
            }
            insert_record(txn, AUDIT, audit.id.0, audit)
        })
    }

    fn commit_note(&mut self, note: &Note, audit: &AuditEntry) -> Result<(), TrackerError> {
        self.write(|txn| {
            insert_pair(txn, NOTES, (note.progress_id.0, note.id.0), note)?;
            insert_record(txn, AUDIT, audit.id.0, audit)
        })
    }

    fn notes(&self, progress: ProgressId) -> Result<Vec<Note>, TrackerError> {
        self.scan_pairs(NOTES, Some(progress.0))
    }

    fn commit_subtask_progress(
        &mut self,
        entry: &SubtaskProgress,
        audit: &AuditEntry,
    ) -> Result<(), TrackerError> {
        self.write(|txn| {
            insert_pair(
                txn,
                SUBTASK_PROGRESS,
                (entry.progress_id.0, entry.subtask_id.0),
                entry,
            )?;
            insert_record(txn, AUDIT, audit.id.0, audit)
        })
    }

    fn subtask_progress(&self, progress: ProgressId) -> Result<Vec<SubtaskProgress>, TrackerError> {
        self.scan_pairs(SUBTASK_PROGRESS, Some(progress.0))
    }

    fn commit_link(&mut self, link: &LeaderLink, audit: &AuditEntry) -> Result<(), TrackerError> {
        self.write(|txn| {
            insert_pair(txn, LINKS, (link.leader_id.0, link.member_id.0), link)?;
            insert_record(txn, AUDIT, audit.id.0, audit)
        })
    }

    fn link(&self, leader: UserId, member: MemberId) -> Result<Option<LeaderLink>, TrackerError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(LINKS).map_err(io)?;
        match table.get((leader.0, member.0)).map_err(io)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn links_for_leader(&self, leader: UserId) -> Result<Vec<LeaderLink>, TrackerError> {
        self.scan_pairs(LINKS, Some(leader.0))
    }

    fn links_for_member(&self, member: MemberId) -> Result<Vec<LeaderLink>, TrackerError> {
        let all: Vec<LeaderLink> = self.scan_pairs(LINKS, None)?;
        Ok(all.into_iter().filter(|l| l.member_id == member).collect())
    }

    fn put_session(&mut self, session: &LoginSession) -> Result<(), TrackerError> {
        let bytes = encode(session)?;
        self.write(|txn| {
            let mut table = txn.open_table(SESSIONS).map_err(io)?;
            table
                .insert(session.token_hash.as_str(), bytes.as_slice())
                .map_err(io)?;
            Ok(())
        })
    }

    fn session(&self, token_hash: &str) -> Result<Option<LoginSession>, TrackerError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(SESSIONS).map_err(io)?;
        match table.get(token_hash).map_err(io)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    fn delete_session(&mut self, token_hash: &str) -> Result<bool, TrackerError> {
        let mut removed = false;
        self.write(|txn| {
            let mut table = txn.open_table(SESSIONS).map_err(io)?;
            removed = table.remove(token_hash).map_err(io)?.is_some();
            Ok(())
        })?;
        Ok(removed)
    }

    fn prune_sessions(&mut self, now: DateTime<Utc>) -> Result<usize, TrackerError> {
        let mut removed = 0;
        self.write(|txn| {
            let mut table = txn.open_table(SESSIONS).map_err(io)?;
            let mut expired = Vec::new();
            for entry in table.iter().map_err(io)? {
                let (key, data) = entry.map_err(io)?;
                let session: LoginSession = decode(data.value())?;
                if session.is_expired(now) {
                    expired.push(key.value().to_string());
                }
            }
            for key in &expired {
                table.remove(key.as_str()).map_err(io)?;
            }
            removed = expired.len();
            Ok(())
        })?;
        Ok(removed)
    }

    fn audit_log(&self) -> Result<Vec<AuditEntry>, TrackerError> {
        self.scan_records(AUDIT)
    }
}
