//! # Dashboards
//!
//! Read-only views assembled from tracker records: the member tracker page
//! and the leader approval queue.

use crate::eligibility::days_remaining;
use crate::next_steps::{NextStep, ProgressEntry, rank_next_steps};
use crate::tracker::Tracker;
use crate::{
    Member, MemberId, Note, ProgressRecord, Rank, Requirement, RequirementId, Role, Subtask,
    TrackerError, User, UserId,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Public view of a user: no email, no password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonSummary {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub initials: String,
    pub role: Role,
}

impl From<&User> for PersonSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            initials: user.signing_initials(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtaskStatus {
    pub subtask: Subtask,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementStatus {
    pub requirement: Requirement,
    pub progress: Option<ProgressRecord>,
    pub subtasks: Vec<SubtaskStatus>,
    pub complete: bool,
    /// Whole days until the eligibility date, zero once reached.
    pub days_until_eligible: Option<i64>,
}

/// All requirements of one rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankPanel {
    pub rank: Rank,
    pub title: &'static str,
    pub completed: usize,
    pub total: usize,
    pub requirements: Vec<RequirementStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedNote {
    pub note: Note,
    pub requirement_code: String,
    pub requirement_title: String,
    pub author: Option<PersonSummary>,
}

/// Everything shown on a member's tracker page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberDashboard {
    pub member: Member,
    pub rank_panels: Vec<RankPanel>,
    pub next_steps: Vec<NextStep>,
    /// Notes across all of the member's records, newest first.
    pub notes_feed: Vec<FeedNote>,
    pub leaders: Vec<PersonSummary>,
    /// Records with a completion date, approved or not.
    pub completed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingApproval {
    pub member_id: MemberId,
    pub member_name: String,
    pub requirement: Requirement,
    pub progress: ProgressRecord,
}

/// A leader's linked members and the approvals waiting on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderDashboard {
    pub leader: PersonSummary,
    pub assigned_members: Vec<Member>,
    pub pending: Vec<PendingApproval>,
}

fn progress_by_requirement(
    records: Vec<ProgressRecord>,
) -> BTreeMap<RequirementId, ProgressRecord> {
    records
        .into_iter()
        .map(|record| (record.requirement_id, record))
        .collect()
}

/// Next steps for one member over the whole curriculum.
pub fn next_steps_for(tracker: &Tracker, member: MemberId) -> Result<Vec<NextStep>, TrackerError> {
    let curriculum = tracker.curriculum()?;
    let progress = progress_by_requirement(tracker.store().member_progress(member)?);
    let entries: Vec<ProgressEntry<'_>> = curriculum
        .iter()
        .map(|r| ProgressEntry::new(r, progress.get(&r.id)))
        .collect();
    Ok(rank_next_steps(&entries))
}

/// Assemble the tracker page for a member. Access checks are the caller's job.
pub fn member_dashboard(
    tracker: &Tracker,
    member: MemberId,
    now: DateTime<Utc>,
) -> Result<MemberDashboard, TrackerError> {
    let member = tracker.member(member)?;
    let curriculum = tracker.curriculum()?;
    let records = tracker.store().member_progress(member.id)?;
    let completed_count = records.iter().filter(|r| r.completed_at.is_some()).count();
    let progress = progress_by_requirement(records);

    let mut rank_panels = Vec::new();
    for rank in Rank::ALL {
        let mut requirements = Vec::new();
        for requirement in curriculum.iter().filter(|r| r.rank == rank) {
            let record = progress.get(&requirement.id);
            let done: BTreeMap<_, _> = match record {
                Some(record) => tracker
                    .store()
                    .subtask_progress(record.id)?
                    .into_iter()
                    .map(|entry| (entry.subtask_id, entry.completed_at))
                    .collect(),
                None => BTreeMap::new(),
            };
            let subtasks = tracker
                .subtasks(requirement.id)?
                .into_iter()
                .map(|subtask| SubtaskStatus {
                    completed_at: done.get(&subtask.id).copied().flatten(),
                    subtask,
                })
                .collect();

            requirements.push(RequirementStatus {
                requirement: requirement.clone(),
                progress: record.cloned(),
                subtasks,
                complete: record.is_some_and(ProgressRecord::is_complete),
                days_until_eligible: record
                    .and_then(|r| r.eligible_at)
                    .map(|eligible| days_remaining(eligible, now)),
            });
        }

        // Ranks without curriculum entries get no panel.
        if requirements.is_empty() {
            continue;
        }
        rank_panels.push(RankPanel {
            rank,
            title: rank.title(),
            completed: requirements.iter().filter(|r| r.complete).count(),
            total: requirements.len(),
            requirements,
        });
    }

    let entries: Vec<ProgressEntry<'_>> = curriculum
        .iter()
        .map(|r| ProgressEntry::new(r, progress.get(&r.id)))
        .collect();
    let next_steps = rank_next_steps(&entries);

    let mut authors: BTreeMap<UserId, Option<PersonSummary>> = BTreeMap::new();
    let mut notes_feed = Vec::new();
    for requirement in &curriculum {
        let Some(record) = progress.get(&requirement.id) else {
            continue;
        };
        for note in tracker.store().notes(record.id)? {
            let author = match note.author_id {
                Some(id) => {
                    if !authors.contains_key(&id) {
                        let summary = tracker.store().user(id)?.as_ref().map(PersonSummary::from);
                        authors.insert(id, summary);
                    }
                    authors.get(&id).cloned().flatten()
                }
                None => None,
            };
            notes_feed.push(FeedNote {
                note,
                requirement_code: requirement.code.clone(),
                requirement_title: requirement.title.clone(),
                author,
            });
        }
    }
    notes_feed.sort_by(|a, b| {
        b.note
            .created_at
            .cmp(&a.note.created_at)
            .then(b.note.id.cmp(&a.note.id))
    });

    let leaders = tracker
        .approved_leaders(member.id)?
        .iter()
        .map(PersonSummary::from)
        .collect();

    Ok(MemberDashboard {
        member,
        rank_panels,
        next_steps,
        notes_feed,
        leaders,
        completed_count,
    })
}

/// Assemble the approval queue for a leader.
///
/// Pending items are unapproved records whose request names this leader, on
/// members the leader is still linked to. Ordered by member last name, first
/// name, then rank and sort order.
pub fn leader_dashboard(tracker: &Tracker, leader: &User) -> Result<LeaderDashboard, TrackerError> {
    let assigned_members = tracker.linked_members(leader.id)?;
    let by_id: BTreeMap<MemberId, &Member> = assigned_members.iter().map(|m| (m.id, m)).collect();

    let mut pending = Vec::new();
    for record in tracker.store().all_progress()? {
        if !record.is_pending_for(leader.id) {
            continue;
        }
        // Unlinked or pending-link members are hidden.
        let Some(member) = by_id.get(&record.member_id) else {
            continue;
        };
        pending.push(PendingApproval {
            member_id: member.id,
            member_name: member.full_name(),
            requirement: tracker.requirement(record.requirement_id)?,
            progress: record,
        });
    }

    pending.sort_by(|a, b| {
        let key = |p: &PendingApproval| {
            let member = by_id.get(&p.member_id);
            (
                member.map(|m| m.last_name.clone()),
                member.map(|m| m.first_name.clone()),
                p.requirement.rank,
                p.requirement.sort_order,
            )
        };
        key(a).cmp(&key(b))
    });

    Ok(LeaderDashboard {
        leader: PersonSummary::from(leader),
        assigned_members,
        pending,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tracker::{NewMember, NewRequirement, NewSubtask, NewUser, ProgressUpdate};
    use chrono::TimeZone;

    fn at(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, m, d, 12, 0, 0).unwrap()
    }

    fn user(tracker: &mut Tracker, email: &str, first: &str, last: &str, role: Role) -> User {
        tracker
            .create_user(
                NewUser {
                    email: email.to_string(),
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    initials: None,
                    role,
                    password_hash: None,
                },
                at(1, 1),
            )
            .unwrap()
    }

    fn member(tracker: &mut Tracker, first: &str, last: &str) -> Member {
        tracker
            .create_member(
                NewMember {
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    email: None,
                    phone: None,
                    unit: None,
                    council: None,
                    current_rank: Rank::Scout,
                    date_of_birth: None,
                    user_id: None,
                },
                at(1, 1),
            )
            .unwrap()
    }

    fn requirement(tracker: &mut Tracker, code: &str, rank: Rank, order: i32) -> Requirement {
        tracker
            .add_requirement(NewRequirement {
                code: code.to_string(),
                title: format!("Requirement {}", code),
                rank,
                summary: None,
                dependency_text: None,
                duration_days: None,
                duration_months: None,
                sort_order: order,
            })
            .unwrap()
    }

    fn start(
        tracker: &mut Tracker,
        actor: &User,
        member: MemberId,
        requirement: &Requirement,
    ) -> ProgressRecord {
        tracker
            .save_progress(
                actor,
                ProgressUpdate {
                    member_id: member,
                    requirement_id: requirement.id,
                    started_at: Some(at(2, 1)),
                    completed_at: None,
                    eligible_override: None,
                    notes: None,
                },
                at(2, 1),
            )
            .unwrap()
    }

    #[test]
    fn member_dashboard_panels_feed_and_steps() {
        let mut tracker = Tracker::new();
        let admin = user(&mut tracker, "a@example.com", "Ada", "Admin", Role::Admin);
        let leader = user(&mut tracker, "l@example.com", "Logan", "Leader", Role::Leader);
        let alex = member(&mut tracker, "Alex", "Trailblazer");
        let tf = requirement(&mut tracker, "TF-1a", Rank::Tenderfoot, 10);
        requirement(&mut tracker, "SC-1a", Rank::SecondClass, 10);
        tracker
            .add_subtask(NewSubtask {
                requirement_id: tf.id,
                code: "TF-1a.1".to_string(),
                title: "Pack".to_string(),
                detail: None,
                sort_order: 1,
            })
            .unwrap();
        tracker.request_link(&admin, leader.id, alex.id, at(1, 2)).unwrap();

        let record = start(&mut tracker, &admin, alex.id, &tf);
        tracker.add_note(&admin, record.id, "first", at(2, 2)).unwrap();
        tracker.add_note(&leader, record.id, "second", at(2, 3)).unwrap();

        let dashboard = member_dashboard(&tracker, alex.id, at(2, 5)).unwrap();

        let ranks: Vec<Rank> = dashboard.rank_panels.iter().map(|p| p.rank).collect();
        assert_eq!(ranks, vec![Rank::Tenderfoot, Rank::SecondClass]);
        assert_eq!(dashboard.rank_panels[0].requirements[0].subtasks.len(), 1);
        assert_eq!(dashboard.rank_panels[0].requirements[0].days_until_eligible, Some(0));

        let bodies: Vec<&str> = dashboard
            .notes_feed
            .iter()
            .map(|n| n.note.body.as_str())
            .collect();
        assert_eq!(bodies, vec!["second", "first"]);
        assert_eq!(
            dashboard.notes_feed[0].author.as_ref().map(|a| a.initials.as_str()),
            Some("LL")
        );

        let codes: Vec<&str> = dashboard.next_steps.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["TF-1a", "SC-1a"]);
        assert_eq!(dashboard.leaders.len(), 1);
        assert_eq!(dashboard.completed_count, 0);

        let steps = next_steps_for(&tracker, alex.id).unwrap();
        assert_eq!(steps, dashboard.next_steps);
    }

    #[test]
    fn leader_queue_filters_and_sorts() {
        let mut tracker = Tracker::new();
        let admin = user(&mut tracker, "a@example.com", "Ada", "Admin", Role::Admin);
        let leader = user(&mut tracker, "l@example.com", "Logan", "Leader", Role::Leader);
        let other = user(&mut tracker, "o@example.com", "Olive", "Other", Role::Leader);
        let zed = member(&mut tracker, "Zed", "Young");
        let amy = member(&mut tracker, "Amy", "Able");
        let tf = requirement(&mut tracker, "TF-1a", Rank::Tenderfoot, 10);
        let sc = requirement(&mut tracker, "SC-1a", Rank::SecondClass, 10);
        for m in [zed.id, amy.id] {
            tracker.request_link(&admin, leader.id, m, at(1, 2)).unwrap();
            tracker.request_link(&admin, other.id, m, at(1, 2)).unwrap();
        }

        let zed_sc = start(&mut tracker, &admin, zed.id, &sc);
        let amy_sc = start(&mut tracker, &admin, amy.id, &sc);
        let amy_tf = start(&mut tracker, &admin, amy.id, &tf);
        let zed_tf = start(&mut tracker, &admin, zed.id, &tf);
        for record in [&zed_sc, &amy_sc, &amy_tf] {
            tracker
                .request_approval(&admin, record.id, leader.id, at(2, 2))
                .unwrap();
        }
        // Addressed to someone else.
        tracker
            .request_approval(&admin, zed_tf.id, other.id, at(2, 2))
            .unwrap();

        let dashboard = leader_dashboard(&tracker, &leader).unwrap();
        let order: Vec<_> = dashboard.pending.iter().map(|p| p.progress.id).collect();
        assert_eq!(order, vec![amy_tf.id, amy_sc.id, zed_sc.id]);
        assert_eq!(dashboard.assigned_members.len(), 2);

        // Approved items drop out of the queue.
        tracker
            .approve_progress(&leader, amy_tf.id, None, at(2, 3))
            .unwrap();
        let dashboard = leader_dashboard(&tracker, &leader).unwrap();
        assert_eq!(dashboard.pending.len(), 2);
    }
}
