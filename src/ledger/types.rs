/// Post and user type definitions
///
/// Visibility tiers are stored as upper-case strings; rows convert into the
/// public types through `TryFrom` so a corrupted tier never reaches callers.

use crate::ids::{GroupId, PostId, UserId};
use crate::store::from_millis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who may see a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// Everyone
    Public,
    /// The author's followers, tracked automatically as the follow graph changes
    AlmostPrivate,
    /// An explicit list chosen by the author when posting
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::AlmostPrivate => "ALMOST_PRIVATE",
            Self::Private => "PRIVATE",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    /// Accepts the stored form and the hyphenated form clients send ("almost-private")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "PUBLIC" => Ok(Self::Public),
            "ALMOST_PRIVATE" => Ok(Self::AlmostPrivate),
            "PRIVATE" => Ok(Self::Private),
            other => Err(anyhow::anyhow!("Unknown visibility tier: {}", other)),
        }
    }
}

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub nickname: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: UserId,
    pub nickname: String,
    pub created_at: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            nickname: row.nickname,
            created_at: from_millis(row.created_at),
        }
    }
}

/// Follower and following totals for a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowCounts {
    pub followers: i64,
    pub following: i64,
}

/// A stored post
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub author: UserId,
    /// Set for posts published inside a group
    pub group: Option<GroupId>,
    pub content: String,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: PostId,
    pub author_id: UserId,
    pub group_id: Option<GroupId>,
    pub content: String,
    pub visibility: String,
    pub created_at: i64,
}

impl TryFrom<PostRow> for Post {
    type Error = anyhow::Error;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Self {
            visibility: row.visibility.parse()?,
            id: row.id,
            author: row.author_id,
            group: row.group_id,
            content: row.content,
            created_at: from_millis(row.created_at),
        })
    }
}

/// Input for publishing a post
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub content: String,
    pub visibility: Visibility,
    /// Publish inside this group instead of on the author's profile
    #[serde(default)]
    pub group: Option<GroupId>,
    /// Users granted access to a PRIVATE post; ignored for other tiers
    #[serde(default)]
    pub access_list: Vec<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_parses_client_spellings() {
        assert_eq!("almost-private".parse::<Visibility>().unwrap(), Visibility::AlmostPrivate);
        assert_eq!("PRIVATE".parse::<Visibility>().unwrap(), Visibility::Private);
        assert!("friends".parse::<Visibility>().is_err());
    }

    #[test]
    fn corrupted_tier_is_rejected() {
        let row = PostRow {
            id: PostId::from("p1"),
            author_id: UserId::from("u1"),
            group_id: None,
            content: String::new(),
            visibility: "SECRET".to_string(),
            created_at: 0,
        };
        assert!(Post::try_from(row).is_err());
    }
}
