/// Outbound push payloads and delivery failures

use crate::ids::{GroupId, UserId, WorkItemId};
use crate::workitem::{WorkItem, WorkItemKind};
use serde::Serialize;
use thiserror::Error;

/// One message pushed to a live client, sent as a JSON text frame
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Push {
    /// A new pending work item
    Notification { notification: WorkItem },
    /// The recipient is now a member of the group
    #[serde(rename_all = "camelCase")]
    GroupAccepted { group_id: GroupId },
    /// A work item was resolved and should leave the client's inbox
    Resolved {
        id: WorkItemId,
        #[serde(rename = "type")]
        kind: WorkItemKind,
        accepted: bool,
    },
}

impl Push {
    pub fn resolved(item: &WorkItem, accepted: bool) -> Self {
        Self::Resolved {
            id: item.id.clone(),
            kind: item.kind(),
            accepted,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Notification { .. } => "notification",
            Self::GroupAccepted { .. } => "groupAccepted",
            Self::Resolved { .. } => "resolved",
        }
    }
}

/// Why a push did not reach one connection
///
/// Never returned to callers of the engine; the dispatcher logs and drops it.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("push to connection {connection} of user {user} timed out")]
    Timeout { user: UserId, connection: u64 },

    #[error("connection {connection} of user {user} is closed")]
    Closed { user: UserId, connection: u64 },

    #[error("failed to encode push: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workitem::WorkItemBody;
    use serde_json::json;

    #[test]
    fn pushes_use_the_client_wire_shape() {
        let accepted = Push::GroupAccepted {
            group_id: GroupId::from("g1"),
        };
        assert_eq!(
            serde_json::to_value(&accepted).unwrap(),
            json!({ "action": "groupAccepted", "groupId": "g1" })
        );

        let item = WorkItem {
            id: WorkItemId::from("w1"),
            body: WorkItemBody::Follow {
                followee: UserId::from("ann"),
                follower: UserId::from("bob"),
            },
            read: false,
            seq: 3,
        };
        let notification = serde_json::to_value(Push::Notification { notification: item.clone() }).unwrap();
        assert_eq!(notification["action"], "notification");
        assert_eq!(notification["notification"]["type"], "FOLLOW");
        assert_eq!(notification["notification"]["targetId"], "ann");
        assert_eq!(notification["notification"]["sender"], "bob");

        assert_eq!(
            serde_json::to_value(Push::resolved(&item, false)).unwrap(),
            json!({ "action": "resolved", "id": "w1", "type": "FOLLOW", "accepted": false })
        );
    }
}
