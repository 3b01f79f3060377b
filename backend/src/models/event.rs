//! Group lifecycle log
//!
//! Every group transition (construction attempt, join, leave, capacity
//! update, close) is captured as a [`GroupEvent`]. The log is kept in memory
//! for querying and rendered to a fixed 15-column CSV:
//!
//! ```text
//! type,time,group_id,edge_id,role,seed_id,attempt_id,reason,size,needed,members,group_cap,min,max,reserved
//! ```
//!
//! Absent fields are written as `-`, never left blank.
//!
//! # Example
//!
//! ```rust
//! use pcn_simulator_core_rs::models::event::{GroupEvent, GroupEventLog};
//!
//! let mut log = GroupEventLog::new();
//! log.log(GroupEvent::ConstructBegin { time: 10, seed_id: 4, attempt_id: 0 });
//!
//! assert_eq!(log.len(), 1);
//! assert_eq!(log.events()[0].to_csv_row(), "construct_begin,10,-,-,-,4,0,-,-,-,-,-,-,-,-");
//! ```

use crate::models::group::GroupId;
use crate::models::network::EdgeId;
use std::io::{self, Write};

pub const GROUP_EVENT_CSV_HEADER: &str =
    "type,time,group_id,edge_id,role,seed_id,attempt_id,reason,size,needed,members,group_cap,min,max,reserved";

const PLACEHOLDER: &str = "-";

/// Role an edge takes when joining a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRole {
    Seed,
    Member,
}

impl JoinRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRole::Seed => "seed",
            JoinRole::Member => "member",
        }
    }
}

/// A group lifecycle record
#[derive(Debug, Clone, PartialEq)]
pub enum GroupEvent {
    /// Construction attempt started from a seed edge
    ConstructBegin {
        time: u64,
        seed_id: EdgeId,
        attempt_id: u64,
    },

    /// Construction attempt failed to reach the target size
    ConstructAbort {
        time: u64,
        seed_id: EdgeId,
        attempt_id: u64,
        size: usize,
        needed: usize,
    },

    /// Construction attempt produced a committed group
    ConstructCommit {
        time: u64,
        group_id: GroupId,
        seed_id: EdgeId,
        attempt_id: u64,
        members: String,
        group_cap: u64,
        min: u64,
        max: u64,
    },

    Join {
        time: u64,
        group_id: GroupId,
        edge_id: EdgeId,
        role: JoinRole,
        seed_id: EdgeId,
        attempt_id: u64,
    },

    /// Member evicted by the leave policy; reason carries `UL=..;used=..`
    Leave {
        time: u64,
        group_id: GroupId,
        edge_id: EdgeId,
        reason: String,
    },

    /// Published capacity or observed extremes changed
    UpdateGroup {
        time: u64,
        group_id: GroupId,
        reason: String,
        size: usize,
        group_cap: u64,
        min: u64,
        max: u64,
    },

    Close {
        time: u64,
        group_id: GroupId,
        reason: String,
        members: String,
    },
}

/// One CSV row, field by field
struct Row<'a> {
    kind: &'a str,
    time: u64,
    group_id: Option<GroupId>,
    edge_id: Option<EdgeId>,
    role: Option<&'a str>,
    seed_id: Option<EdgeId>,
    attempt_id: Option<u64>,
    reason: Option<&'a str>,
    size: Option<usize>,
    needed: Option<usize>,
    members: Option<&'a str>,
    group_cap: Option<u64>,
    min: Option<u64>,
    max: Option<u64>,
}

impl<'a> Row<'a> {
    fn new(kind: &'a str, time: u64) -> Self {
        Self {
            kind,
            time,
            group_id: None,
            edge_id: None,
            role: None,
            seed_id: None,
            attempt_id: None,
            reason: None,
            size: None,
            needed: None,
            members: None,
            group_cap: None,
            min: None,
            max: None,
        }
    }

    fn render(&self) -> String {
        fn field<T: ToString>(value: Option<T>) -> String {
            value
                .map(|v| v.to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| PLACEHOLDER.to_string())
        }

        [
            self.kind.to_string(),
            self.time.to_string(),
            field(self.group_id),
            field(self.edge_id),
            field(self.role),
            field(self.seed_id),
            field(self.attempt_id),
            field(self.reason),
            field(self.size),
            field(self.needed),
            field(self.members),
            field(self.group_cap),
            field(self.min),
            field(self.max),
            PLACEHOLDER.to_string(),
        ]
        .join(",")
    }
}

impl GroupEvent {
    pub fn time(&self) -> u64 {
        match self {
            GroupEvent::ConstructBegin { time, .. }
            | GroupEvent::ConstructAbort { time, .. }
            | GroupEvent::ConstructCommit { time, .. }
            | GroupEvent::Join { time, .. }
            | GroupEvent::Leave { time, .. }
            | GroupEvent::UpdateGroup { time, .. }
            | GroupEvent::Close { time, .. } => *time,
        }
    }

    /// Record kind as written in the `type` column
    pub fn event_type(&self) -> &'static str {
        match self {
            GroupEvent::ConstructBegin { .. } => "construct_begin",
            GroupEvent::ConstructAbort { .. } => "construct_abort",
            GroupEvent::ConstructCommit { .. } => "construct_commit",
            GroupEvent::Join { .. } => "join",
            GroupEvent::Leave { .. } => "leave",
            GroupEvent::UpdateGroup { .. } => "update_group",
            GroupEvent::Close { .. } => "close",
        }
    }

    /// Committed group the record refers to, if any
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            GroupEvent::ConstructBegin { .. } | GroupEvent::ConstructAbort { .. } => None,
            GroupEvent::ConstructCommit { group_id, .. }
            | GroupEvent::Join { group_id, .. }
            | GroupEvent::Leave { group_id, .. }
            | GroupEvent::UpdateGroup { group_id, .. }
            | GroupEvent::Close { group_id, .. } => Some(*group_id),
        }
    }

    pub fn to_csv_row(&self) -> String {
        let mut row = Row::new(self.event_type(), self.time());
        row.group_id = self.group_id();

        match self {
            GroupEvent::ConstructBegin {
                seed_id,
                attempt_id,
                ..
            } => {
                row.seed_id = Some(*seed_id);
                row.attempt_id = Some(*attempt_id);
            }
            GroupEvent::ConstructAbort {
                seed_id,
                attempt_id,
                size,
                needed,
                ..
            } => {
                row.seed_id = Some(*seed_id);
                row.attempt_id = Some(*attempt_id);
                row.size = Some(*size);
                row.needed = Some(*needed);
            }
            GroupEvent::ConstructCommit {
                seed_id,
                attempt_id,
                members,
                group_cap,
                min,
                max,
                ..
            } => {
                row.seed_id = Some(*seed_id);
                row.attempt_id = Some(*attempt_id);
                row.members = Some(members.as_str());
                row.group_cap = Some(*group_cap);
                row.min = Some(*min);
                row.max = Some(*max);
            }
            GroupEvent::Join {
                edge_id,
                role,
                seed_id,
                attempt_id,
                ..
            } => {
                row.edge_id = Some(*edge_id);
                row.role = Some(role.as_str());
                row.seed_id = Some(*seed_id);
                row.attempt_id = Some(*attempt_id);
                row.reason = Some("join");
            }
            GroupEvent::Leave {
                edge_id, reason, ..
            } => {
                row.edge_id = Some(*edge_id);
                row.reason = Some(reason.as_str());
            }
            GroupEvent::UpdateGroup {
                reason,
                size,
                group_cap,
                min,
                max,
                ..
            } => {
                row.reason = Some(reason.as_str());
                row.size = Some(*size);
                row.group_cap = Some(*group_cap);
                row.min = Some(*min);
                row.max = Some(*max);
            }
            GroupEvent::Close {
                reason, members, ..
            } => {
                row.reason = Some(reason.as_str());
                row.members = Some(members.as_str());
            }
        }

        row.render()
    }
}

/// In-memory group event log
#[derive(Debug, Clone, Default)]
pub struct GroupEventLog {
    events: Vec<GroupEvent>,
}

impl GroupEventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: GroupEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[GroupEvent] {
        &self.events
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<&GroupEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_group(&self, group_id: GroupId) -> Vec<&GroupEvent> {
        self.events
            .iter()
            .filter(|e| e.group_id() == Some(group_id))
            .collect()
    }

    /// Write header plus one row per record
    pub fn write_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writeln!(writer, "{}", GROUP_EVENT_CSV_HEADER)?;
        for event in &self.events {
            writeln!(writer, "{}", event.to_csv_row())?;
        }
        writer.flush()
    }
}
