/// Work item type definitions
///
/// A `WorkItem` is a pending two-party workflow. In memory it is a typed sum
/// (`WorkItemBody`); on disk and on the wire it is the generic
/// `WorkItemRecord`, with `target`, `payload` and `initiator` meaning
/// different things per kind:
///
/// | kind          | target    | payload      | initiator |
/// |---------------|-----------|--------------|-----------|
/// | FOLLOW        | followee  | follower     | follower  |
/// | GROUP_REQUEST | group     | requester    | requester |
/// | GROUP_INVITE  | invitee   | group        | inviter   |
/// | CHAT_REQUEST  | recipient | conversation | sender    |
/// | EVENT         | attendee  | event        | creator   |

use crate::ids::{EventId, GroupId, UserId, WorkItemId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkItemKind {
    /// Informational notice that someone followed the target
    Follow,
    GroupRequest,
    GroupInvite,
    ChatRequest,
    Event,
}

impl WorkItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "FOLLOW",
            Self::GroupRequest => "GROUP_REQUEST",
            Self::GroupInvite => "GROUP_INVITE",
            Self::ChatRequest => "CHAT_REQUEST",
            Self::Event => "EVENT",
        }
    }
}

impl fmt::Display for WorkItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkItemKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FOLLOW" => Ok(Self::Follow),
            "GROUP_REQUEST" => Ok(Self::GroupRequest),
            "GROUP_INVITE" => Ok(Self::GroupInvite),
            "CHAT_REQUEST" => Ok(Self::ChatRequest),
            "EVENT" => Ok(Self::Event),
            other => Err(anyhow::anyhow!("Unknown work item kind: {}", other)),
        }
    }
}

/// What a work item is about, with every field strongly typed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItemBody {
    Follow {
        followee: UserId,
        follower: UserId,
    },
    GroupRequest {
        group: GroupId,
        requester: UserId,
    },
    GroupInvite {
        invitee: UserId,
        group: GroupId,
        inviter: UserId,
    },
    ChatRequest {
        recipient: UserId,
        sender: UserId,
        conversation: String,
    },
    Event {
        attendee: UserId,
        event: EventId,
        creator: UserId,
    },
}

impl WorkItemBody {
    pub fn kind(&self) -> WorkItemKind {
        match self {
            Self::Follow { .. } => WorkItemKind::Follow,
            Self::GroupRequest { .. } => WorkItemKind::GroupRequest,
            Self::GroupInvite { .. } => WorkItemKind::GroupInvite,
            Self::ChatRequest { .. } => WorkItemKind::ChatRequest,
            Self::Event { .. } => WorkItemKind::Event,
        }
    }

    /// Stored `target` column
    pub fn target(&self) -> &str {
        match self {
            Self::Follow { followee, .. } => followee.as_str(),
            Self::GroupRequest { group, .. } => group.as_str(),
            Self::GroupInvite { invitee, .. } => invitee.as_str(),
            Self::ChatRequest { recipient, .. } => recipient.as_str(),
            Self::Event { attendee, .. } => attendee.as_str(),
        }
    }

    /// Stored `payload` column
    pub fn payload(&self) -> &str {
        match self {
            Self::Follow { follower, .. } => follower.as_str(),
            Self::GroupRequest { requester, .. } => requester.as_str(),
            Self::GroupInvite { group, .. } => group.as_str(),
            Self::ChatRequest { conversation, .. } => conversation,
            Self::Event { event, .. } => event.as_str(),
        }
    }

    pub fn initiator(&self) -> &UserId {
        match self {
            Self::Follow { follower, .. } => follower,
            Self::GroupRequest { requester, .. } => requester,
            Self::GroupInvite { inviter, .. } => inviter,
            Self::ChatRequest { sender, .. } => sender,
            Self::Event { creator, .. } => creator,
        }
    }

    /// The user a notice is addressed to; group requests go to the group admin
    /// and so have no direct recipient.
    pub fn recipient(&self) -> Option<&UserId> {
        match self {
            Self::Follow { followee, .. } => Some(followee),
            Self::GroupRequest { .. } => None,
            Self::GroupInvite { invitee, .. } => Some(invitee),
            Self::ChatRequest { recipient, .. } => Some(recipient),
            Self::Event { attendee, .. } => Some(attendee),
        }
    }

    /// Group the item is scoped to, for kinds that carry one directly
    pub fn group(&self) -> Option<&GroupId> {
        match self {
            Self::GroupRequest { group, .. } | Self::GroupInvite { group, .. } => Some(group),
            _ => None,
        }
    }

    /// Rebuild the typed body from stored columns
    pub fn from_parts(kind: WorkItemKind, target: String, payload: String, initiator: UserId) -> Self {
        match kind {
            WorkItemKind::Follow => Self::Follow {
                followee: target.into(),
                follower: payload.into(),
            },
            WorkItemKind::GroupRequest => Self::GroupRequest {
                group: target.into(),
                requester: payload.into(),
            },
            WorkItemKind::GroupInvite => Self::GroupInvite {
                invitee: target.into(),
                group: payload.into(),
                inviter: initiator,
            },
            WorkItemKind::ChatRequest => Self::ChatRequest {
                recipient: target.into(),
                sender: initiator,
                conversation: payload,
            },
            WorkItemKind::Event => Self::Event {
                attendee: target.into(),
                event: payload.into(),
                creator: initiator,
            },
        }
    }
}

/// A stored work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WorkItemRecord", try_from = "WorkItemRecord")]
pub struct WorkItem {
    pub id: WorkItemId,
    pub body: WorkItemBody,
    pub read: bool,
    /// Monotonic creation order
    pub seq: i64,
}

impl WorkItem {
    pub fn kind(&self) -> WorkItemKind {
        self.body.kind()
    }
}

/// Generic storage and wire shape of a work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemRecord {
    pub id: WorkItemId,
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: WorkItemKind,
    pub content: String,
    pub sender: UserId,
    pub read: bool,
    pub created_seq: i64,
}

impl From<WorkItem> for WorkItemRecord {
    fn from(item: WorkItem) -> Self {
        Self {
            target_id: item.body.target().to_string(),
            kind: item.body.kind(),
            content: item.body.payload().to_string(),
            sender: item.body.initiator().clone(),
            id: item.id,
            read: item.read,
            created_seq: item.seq,
        }
    }
}

impl TryFrom<WorkItemRecord> for WorkItem {
    type Error = anyhow::Error;

    fn try_from(record: WorkItemRecord) -> Result<Self, Self::Error> {
        // FOLLOW and GROUP_REQUEST repeat the initiator in the payload
        if matches!(record.kind, WorkItemKind::Follow | WorkItemKind::GroupRequest)
            && record.content != record.sender.as_str()
        {
            return Err(anyhow::anyhow!(
                "{} work item {} has payload {} but initiator {}",
                record.kind,
                record.id,
                record.content,
                record.sender
            ));
        }

        Ok(Self {
            body: WorkItemBody::from_parts(record.kind, record.target_id, record.content, record.sender),
            id: record.id,
            read: record.read,
            seq: record.created_seq,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct WorkItemRow {
    pub seq: i64,
    pub id: WorkItemId,
    pub target: String,
    pub kind: String,
    pub payload: String,
    pub initiator: UserId,
    pub read: bool,
}

impl TryFrom<WorkItemRow> for WorkItem {
    type Error = anyhow::Error;

    fn try_from(row: WorkItemRow) -> Result<Self, Self::Error> {
        WorkItemRecord {
            id: row.id,
            target_id: row.target,
            kind: row.kind.parse()?,
            content: row.payload,
            sender: row.initiator,
            read: row.read,
            created_seq: row.seq,
        }
        .try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn invite_serializes_to_generic_wire_shape() {
        let item = WorkItem {
            id: WorkItemId::from("w1"),
            body: WorkItemBody::GroupInvite {
                invitee: UserId::from("bob"),
                group: GroupId::from("g1"),
                inviter: UserId::from("ann"),
            },
            read: false,
            seq: 7,
        };

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "w1",
                "targetId": "bob",
                "type": "GROUP_INVITE",
                "content": "g1",
                "sender": "ann",
                "read": false,
                "createdSeq": 7
            })
        );

        let back: WorkItem = serde_json::from_value(value).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn group_request_targets_the_group() {
        let body = WorkItemBody::from_parts(
            WorkItemKind::GroupRequest,
            "g1".to_string(),
            "carol".to_string(),
            UserId::from("carol"),
        );
        assert_eq!(body.target(), "g1");
        assert_eq!(body.group(), Some(&GroupId::from("g1")));
        assert_eq!(body.recipient(), None);
    }

    #[test]
    fn mismatched_follow_record_is_rejected() {
        let record = WorkItemRecord {
            id: WorkItemId::from("w1"),
            target_id: "ann".to_string(),
            kind: WorkItemKind::Follow,
            content: "bob".to_string(),
            sender: UserId::from("mallory"),
            read: false,
            created_seq: 1,
        };
        assert!(WorkItem::try_from(record).is_err());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!("POKE".parse::<WorkItemKind>().is_err());
        assert_eq!("CHAT_REQUEST".parse::<WorkItemKind>().unwrap(), WorkItemKind::ChatRequest);
    }
}
