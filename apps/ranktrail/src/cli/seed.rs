//! # Sample Data
//!
//! The demo troop: a five-requirement curriculum across three ranks, one
//! account per role, and a member part-way through Tenderfoot.

use crate::api::hash_password;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ranktrail_core::{
    MemberId, NewMember, NewRequirement, NewSubtask, NewUser, ProgressUpdate, Rank, Role,
    Tracker, TrackerError, UserId,
};
use serde::Serialize;

/// What [`seed_sample_data`] created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub admin_id: UserId,
    pub leader_id: UserId,
    pub member_user_id: UserId,
    pub member_id: MemberId,
    pub requirements: usize,
    pub progress_records: usize,
}

struct SampleRequirement {
    code: &'static str,
    title: &'static str,
    summary: &'static str,
    rank: Rank,
    sort_order: i32,
    duration_days: Option<u32>,
}

const CURRICULUM: [SampleRequirement; 5] = [
    SampleRequirement {
        code: "TF-1a",
        title: "Camp overnight with your patrol or troop.",
        summary: "Attend a patrol or troop campout. Sleep overnight in a tent you helped pitch.",
        rank: Rank::Tenderfoot,
        sort_order: 10,
        duration_days: None,
    },
    SampleRequirement {
        code: "TF-2a",
        title: "Show how to whip and fuse the ends of a rope.",
        summary: "Demonstrate how to whip and fuse the ends of a rope to keep it from unraveling.",
        rank: Rank::Tenderfoot,
        sort_order: 20,
        duration_days: Some(14),
    },
    SampleRequirement {
        code: "TF-3a",
        title: "Demonstrate a practical use of two half-hitches.",
        summary: "Tie two half-hitches and describe a situation where you would use the knot.",
        rank: Rank::Tenderfoot,
        sort_order: 30,
        duration_days: Some(14),
    },
    SampleRequirement {
        code: "SC-1a",
        title: "Demonstrate how a compass works and orient a map.",
        summary: "Explain how a magnetic compass works and show how to orient a map.",
        rank: Rank::SecondClass,
        sort_order: 10,
        duration_days: Some(30),
    },
    SampleRequirement {
        code: "FC-1a",
        title: "Discuss the principles of Leave No Trace.",
        summary: "Explain the principles of Leave No Trace and why they are important.",
        rank: Rank::FirstClass,
        sort_order: 10,
        duration_days: Some(30),
    },
];

fn date(y: i32, m: u32, d: u32) -> Result<DateTime<Utc>, TrackerError> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0)
        .single()
        .ok_or_else(|| TrackerError::InvalidInput(format!("bad sample date {}-{}-{}", y, m, d)))
}

fn account(
    email: &str,
    first_name: &str,
    last_name: &str,
    role: Role,
    initials: Option<&str>,
    password: &str,
) -> Result<NewUser, TrackerError> {
    Ok(NewUser {
        email: email.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        initials: initials.map(str::to_string),
        role,
        password_hash: Some(hash_password(password)?),
    })
}

/// Load the sample troop into an empty tracker.
///
/// Every account gets `password`. Fails with `Conflict` if the sample
/// accounts already exist.
pub fn seed_sample_data(
    tracker: &mut Tracker,
    password: &str,
    now: DateTime<Utc>,
) -> Result<SeedSummary, TrackerError> {
    let admin = tracker.create_user(
        account("admin@example.com", "Avery", "Admin", Role::Admin, None, password)?,
        now,
    )?;
    let leader = tracker.create_user(
        account("leader@example.com", "Logan", "Leader", Role::Leader, Some("LL"), password)?,
        now,
    )?;
    let member_user = tracker.create_user(
        account("scout@example.com", "Alex", "Trailblazer", Role::Member, None, password)?,
        now,
    )?;

    let member = tracker.create_member(
        NewMember {
            first_name: "Alex".to_string(),
            last_name: "Trailblazer".to_string(),
            email: Some("alex.trailblazer@example.com".to_string()),
            phone: Some("555-0102".to_string()),
            unit: Some("Troop 123".to_string()),
            council: Some("Grand Valley Council".to_string()),
            current_rank: Rank::SecondClass,
            date_of_birth: NaiveDate::from_ymd_opt(2011, 6, 15),
            user_id: Some(member_user.id),
        },
        now,
    )?;

    let mut requirements = Vec::with_capacity(CURRICULUM.len());
    for sample in &CURRICULUM {
        requirements.push(tracker.add_requirement(NewRequirement {
            code: sample.code.to_string(),
            title: sample.title.to_string(),
            rank: sample.rank,
            summary: Some(sample.summary.to_string()),
            dependency_text: None,
            duration_days: sample.duration_days,
            duration_months: None,
            sort_order: sample.sort_order,
        })?);
    }

    let campout = requirements[0].id;
    for (sort_order, (code, title)) in [
        ("TF-1a.1", "Help pitch the tent you sleep in."),
        ("TF-1a.2", "Sleep overnight at the campsite."),
    ]
    .into_iter()
    .enumerate()
    {
        tracker.add_subtask(NewSubtask {
            requirement_id: campout,
            code: code.to_string(),
            title: title.to_string(),
            detail: None,
            sort_order: (sort_order as i32 + 1) * 10,
        })?;
    }

    tracker.request_link(&admin, leader.id, member.id, now)?;

    // (requirement index, started, completed, notes, approved on)
    let progress = [
        (
            0,
            Some(date(2024, 1, 15)?),
            Some(date(2024, 2, 20)?),
            Some("Completed during winter campout."),
            Some(date(2024, 2, 22)?),
        ),
        (
            1,
            Some(date(2024, 2, 10)?),
            Some(date(2024, 2, 25)?),
            Some("Demonstrated at troop meeting."),
            Some(date(2024, 2, 28)?),
        ),
        (
            2,
            Some(date(2024, 3, 5)?),
            None,
            Some("Needs to re-demo knot tying."),
            None,
        ),
        (3, Some(date(2024, 4, 1)?), None, None, None),
    ];

    let mut progress_records = 0;
    for (index, started_at, completed_at, notes, approved_on) in progress {
        let record = tracker.save_progress(
            &admin,
            ProgressUpdate {
                member_id: member.id,
                requirement_id: requirements[index].id,
                started_at,
                completed_at,
                eligible_override: None,
                notes: notes.map(str::to_string),
            },
            now,
        )?;
        if let Some(approved_on) = approved_on {
            tracker.approve_progress(&leader, record.id, None, approved_on)?;
        }
        progress_records += 1;
    }

    Ok(SeedSummary {
        admin_id: admin.id,
        leader_id: leader.id,
        member_user_id: member_user.id,
        member_id: member.id,
        requirements: requirements.len(),
        progress_records,
    })
}
