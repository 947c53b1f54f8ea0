/// Group and event type definitions

use crate::ids::{EventId, GroupId, UserId};
use crate::store::from_millis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Whether outsiders can read a group and join it without approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupPrivacy {
    Public,
    Private,
}

impl GroupPrivacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Private => "PRIVATE",
        }
    }
}

impl FromStr for GroupPrivacy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PUBLIC" => Ok(Self::Public),
            "PRIVATE" => Ok(Self::Private),
            other => Err(anyhow::anyhow!("Unknown group privacy: {}", other)),
        }
    }
}

/// A user's standing in one group; exactly one applies at any instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Owner of the group, never stored as a membership row
    Admin,
    Member,
    Outsider,
}

impl Role {
    /// Admins and members both take part in the group
    pub fn is_participant(&self) -> bool {
        matches!(self, Self::Admin | Self::Member)
    }
}

/// Privacy of a group together with one user's role in it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupAccess {
    pub privacy: GroupPrivacy,
    pub role: Role,
}

impl GroupAccess {
    pub fn can_read(&self) -> bool {
        self.privacy == GroupPrivacy::Public || self.role.is_participant()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub admin: UserId,
    pub privacy: GroupPrivacy,
    pub created_at: DateTime<Utc>,
    /// Membership rows plus the admin
    pub member_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct GroupRow {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub admin_id: UserId,
    pub privacy: String,
    pub created_at: i64,
    pub member_count: i64,
}

impl TryFrom<GroupRow> for Group {
    type Error = anyhow::Error;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(Self {
            privacy: row.privacy.parse()?,
            id: row.id,
            name: row.name,
            description: row.description,
            admin: row.admin_id,
            created_at: from_millis(row.created_at),
            member_count: row.member_count,
        })
    }
}

/// Input for creating a group
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub privacy: GroupPrivacy,
    /// Users invited as soon as the group exists
    #[serde(default)]
    pub invitations: Vec<UserId>,
}

/// A group as seen by one user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    #[serde(flatten)]
    pub group: Group,
    pub role: Role,
    /// The viewer has an open join request
    pub request_pending: bool,
}

/// An RSVP answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpResponse {
    Going,
    NotGoing,
    Maybe,
}

impl RsvpResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Going => "going",
            Self::NotGoing => "not_going",
            Self::Maybe => "maybe",
        }
    }
}

impl FromStr for RsvpResponse {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "going" => Ok(Self::Going),
            "not_going" => Ok(Self::NotGoing),
            "maybe" => Ok(Self::Maybe),
            other => Err(anyhow::anyhow!("Unknown RSVP response: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub group: GroupId,
    pub creator: UserId,
    pub title: String,
    pub description: String,
    pub starts_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRow {
    pub id: EventId,
    pub group_id: GroupId,
    pub creator_id: UserId,
    pub title: String,
    pub description: String,
    pub starts_at: i64,
    pub created_at: i64,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            group: row.group_id,
            creator: row.creator_id,
            title: row.title,
            description: row.description,
            starts_at: from_millis(row.starts_at),
            created_at: from_millis(row.created_at),
        }
    }
}

/// Input for scheduling an event
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub group: GroupId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub starts_at: DateTime<Utc>,
}

/// One user's current answer to an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub user: UserId,
    pub response: RsvpResponse,
}

/// Event with its current responses and tallies
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    #[serde(flatten)]
    pub event: Event,
    pub responses: Vec<EventResponse>,
    pub going: i64,
    pub not_going: i64,
    pub maybe: i64,
    /// The viewer's own answer, if any
    pub my_response: Option<RsvpResponse>,
}
