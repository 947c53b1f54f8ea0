/// Visibility ledger: follow graph and tiered post access
///
/// ALMOST_PRIVATE grants are a materialized view of the follow graph: they
/// are written and removed only inside the follow, unfollow and post-creation
/// cascades, so a reader never observes a follow edge without its grants or
/// the other way round. PRIVATE grants come from the author's access list at
/// post time and are stripped when the grantee unfollows the author.

use crate::error::{AppError, AppResult};
use crate::groups::access::group_access;
use crate::ids::{GroupId, PostId, UserId};
use crate::ledger::types::{FollowCounts, NewPost, Post, PostRow, User, UserRow, Visibility};
use crate::store::{now_millis, Cascade, Database};
use futures_util::{stream::BoxStream, StreamExt, TryStreamExt};

/// Posts readable by the viewer bound three times: author, almost-private grant, private grant
const VISIBLE_TO_VIEWER: &str = r#"
    (
        visibility = 'PUBLIC'
        OR author_id = ?
        OR (visibility = 'ALMOST_PRIVATE' AND EXISTS (
            SELECT 1 FROM almost_private_grants g WHERE g.post_id = posts.id AND g.user_id = ?
        ))
        OR (visibility = 'PRIVATE' AND EXISTS (
            SELECT 1 FROM private_grants g WHERE g.post_id = posts.id AND g.user_id = ?
        ))
    )
"#;

const POST_COLUMNS: &str = "id, author_id, group_id, content, visibility, created_at";

/// Result of a follow or unfollow cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowChange {
    /// Whether the edge itself was inserted or removed (false when already in that state)
    pub edge_changed: bool,
    /// Grant rows inserted or removed alongside the edge
    pub grants_changed: u64,
}

#[derive(Debug, Clone)]
pub struct VisibilityLedger {
    db: Database,
}

impl VisibilityLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Follow `followee` and derive grants to every ALMOST_PRIVATE post they wrote
    ///
    /// Following twice is a no-op for the edge; missing grants are still filled in.
    pub async fn grant_on_follow(&self, followee: &UserId, follower: &UserId) -> AppResult<FollowChange> {
        if followee == follower {
            return Err(AppError::conflict("users cannot follow themselves"));
        }
        self.require_user(followee).await?;
        self.require_user(follower).await?;

        let mut cascade = self.db.cascade("grant_on_follow").await?;
        let change = follow_steps(&mut cascade, followee, follower).await?;
        cascade.commit().await?;

        tracing::info!(
            "➕ {} follows {} ({} almost-private grants derived)",
            follower,
            followee,
            change.grants_changed
        );
        Ok(change)
    }

    /// Unfollow `followee`, dropping every grant the follower holds on their posts
    pub async fn revoke_on_unfollow(&self, followee: &UserId, follower: &UserId) -> AppResult<FollowChange> {
        let mut cascade = self.db.cascade("revoke_on_unfollow").await?;
        let change = unfollow_steps(&mut cascade, followee, follower).await?;
        cascade.commit().await?;

        tracing::info!(
            "➖ {} unfollowed {} ({} grants revoked)",
            follower,
            followee,
            change.grants_changed
        );
        Ok(change)
    }

    /// Publish a post and grant access according to its tier
    pub async fn create_post(&self, author: &UserId, new_post: NewPost) -> AppResult<Post> {
        let mut visibility = new_post.visibility;
        if let Some(group) = &new_post.group {
            let access = group_access(self.db.pool(), group, author)
                .await?
                .ok_or_else(|| AppError::not_found(format!("group {}", group)))?;
            if !access.role.is_participant() {
                return Err(AppError::unauthorized("only group members can post in a group"));
            }
            // Group posts are gated by membership, not by tier
            visibility = Visibility::Public;
        }

        let post = Post {
            id: PostId::generate(),
            author: author.clone(),
            group: new_post.group,
            content: new_post.content,
            visibility,
            created_at: chrono::Utc::now(),
        };

        let mut cascade = self.db.cascade("create_post").await?;
        sqlx::query(
            "INSERT INTO posts (id, author_id, group_id, content, visibility, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&post.id)
        .bind(&post.author)
        .bind(&post.group)
        .bind(&post.content)
        .bind(post.visibility.as_str())
        .bind(post.created_at.timestamp_millis())
        .execute(cascade.conn())
        .await?;

        let granted = match post.visibility {
            Visibility::AlmostPrivate => {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO almost_private_grants (post_id, user_id)
                    SELECT ?, follower_id FROM followers WHERE followee_id = ?
                    "#,
                )
                .bind(&post.id)
                .bind(&post.author)
                .execute(cascade.conn())
                .await?
                .rows_affected()
            }
            Visibility::Private => {
                let mut granted = 0;
                for grantee in new_post.access_list.iter().filter(|u| *u != author) {
                    // Unknown users are skipped rather than failing the post
                    granted += sqlx::query(
                        "INSERT OR IGNORE INTO private_grants (post_id, user_id) SELECT ?, id FROM users WHERE id = ?",
                    )
                    .bind(&post.id)
                    .bind(grantee)
                    .execute(cascade.conn())
                    .await?
                    .rows_affected();
                }
                granted
            }
            Visibility::Public => 0,
        };
        cascade.commit().await?;

        tracing::info!("📝 {} published {} post {} ({} grants)", author, post.visibility, post.id, granted);
        Ok(post)
    }

    pub async fn get_post(&self, post: &PostId) -> AppResult<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS);
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(post)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(Post::try_from).transpose().map_err(AppError::from)
    }

    /// Whether `viewer` may read `post`
    ///
    /// Store failures are returned, never folded into `false`.
    pub async fn can_view(&self, post: &PostId, viewer: &UserId) -> AppResult<bool> {
        let post = self
            .get_post(post)
            .await?
            .ok_or_else(|| AppError::not_found(format!("post {}", post)))?;

        if let Some(group) = &post.group {
            let access = group_access(self.db.pool(), group, viewer).await?;
            return Ok(access.is_some_and(|a| a.can_read()));
        }
        if &post.author == viewer {
            return Ok(true);
        }

        let sql = match post.visibility {
            Visibility::Public => return Ok(true),
            Visibility::AlmostPrivate => {
                "SELECT EXISTS(SELECT 1 FROM almost_private_grants WHERE post_id = ? AND user_id = ?)"
            }
            Visibility::Private => {
                "SELECT EXISTS(SELECT 1 FROM private_grants WHERE post_id = ? AND user_id = ?)"
            }
        };
        let (granted,): (bool,) = sqlx::query_as(sql)
            .bind(&post.id)
            .bind(viewer)
            .fetch_one(self.db.pool())
            .await?;
        Ok(granted)
    }

    /// Home feed: every non-group post the viewer may read, newest first
    ///
    /// Rows are pulled from the database as the stream is polled.
    pub fn visible_posts_for<'a>(&'a self, viewer: &'a UserId) -> BoxStream<'a, AppResult<Post>> {
        sqlx::query_as::<_, PostRow>(feed_sql())
            .bind(viewer)
            .bind(viewer)
            .bind(viewer)
            .fetch(self.db.pool())
            .map(|row| {
                let row = row?;
                Post::try_from(row).map_err(AppError::from)
            })
            .boxed()
    }

    /// Collected form of `visible_posts_for`, capped at `limit` posts
    pub async fn feed(&self, viewer: &UserId, limit: usize) -> AppResult<Vec<Post>> {
        self.visible_posts_for(viewer).take(limit).try_collect().await
    }

    /// One author's profile posts as seen by `viewer`
    pub async fn posts_by(&self, author: &UserId, viewer: &UserId) -> AppResult<Vec<Post>> {
        let sql = format!(
            "SELECT {} FROM posts WHERE group_id IS NULL AND author_id = ? AND {} ORDER BY created_at DESC, rowid DESC",
            POST_COLUMNS, VISIBLE_TO_VIEWER
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(author)
            .bind(viewer)
            .bind(viewer)
            .bind(viewer)
            .fetch_all(self.db.pool())
            .await?;
        rows.into_iter()
            .map(|row| Post::try_from(row).map_err(AppError::from))
            .collect()
    }

    /// Posts inside a group; PRIVATE groups are readable by participants only
    pub async fn group_posts(&self, group: &GroupId, viewer: &UserId) -> AppResult<Vec<Post>> {
        let access = group_access(self.db.pool(), group, viewer)
            .await?
            .ok_or_else(|| AppError::not_found(format!("group {}", group)))?;
        if !access.can_read() {
            return Err(AppError::unauthorized("private group content is for members only"));
        }

        let sql = format!(
            "SELECT {} FROM posts WHERE group_id = ? ORDER BY created_at DESC, rowid DESC",
            POST_COLUMNS
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(group)
            .fetch_all(self.db.pool())
            .await?;
        rows.into_iter()
            .map(|row| Post::try_from(row).map_err(AppError::from))
            .collect()
    }

    pub async fn is_following(&self, followee: &UserId, follower: &UserId) -> AppResult<bool> {
        let (following,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM followers WHERE followee_id = ? AND follower_id = ?)",
        )
        .bind(followee)
        .bind(follower)
        .fetch_one(self.db.pool())
        .await?;
        Ok(following)
    }

    pub async fn followers(&self, user: &UserId) -> AppResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.nickname, u.created_at FROM users u
            JOIN followers f ON f.follower_id = u.id
            WHERE f.followee_id = ?
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(user)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    pub async fn following(&self, user: &UserId) -> AppResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.nickname, u.created_at FROM users u
            JOIN followers f ON f.followee_id = u.id
            WHERE f.follower_id = ?
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(user)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    pub async fn follow_counts(&self, user: &UserId) -> AppResult<FollowCounts> {
        let (followers, following): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM followers WHERE followee_id = ?),
                (SELECT COUNT(*) FROM followers WHERE follower_id = ?)
            "#,
        )
        .bind(user)
        .bind(user)
        .fetch_one(self.db.pool())
        .await?;
        Ok(FollowCounts { followers, following })
    }

    async fn require_user(&self, user: &UserId) -> AppResult<()> {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
            .bind(user)
            .fetch_one(self.db.pool())
            .await?;
        if exists {
            Ok(())
        } else {
            Err(AppError::not_found(format!("user {}", user)))
        }
    }
}

fn feed_sql() -> &'static str {
    static FEED: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    FEED.get_or_init(|| {
        format!(
            "SELECT {} FROM posts WHERE group_id IS NULL AND {} ORDER BY created_at DESC, rowid DESC",
            POST_COLUMNS, VISIBLE_TO_VIEWER
        )
    })
}

/// Edge insert plus grant derivation
pub(crate) async fn follow_steps(
    cascade: &mut Cascade,
    followee: &UserId,
    follower: &UserId,
) -> AppResult<FollowChange> {
    let edge = sqlx::query(
        "INSERT OR IGNORE INTO followers (followee_id, follower_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(followee)
    .bind(follower)
    .bind(now_millis())
    .execute(cascade.conn())
    .await?;

    let grants = sqlx::query(
        r#"
        INSERT INTO almost_private_grants (post_id, user_id)
        SELECT id, ? FROM posts
        WHERE author_id = ?
          AND visibility = 'ALMOST_PRIVATE'
          AND group_id IS NULL
          AND id NOT IN (SELECT post_id FROM almost_private_grants WHERE user_id = ?)
        "#,
    )
    .bind(follower)
    .bind(followee)
    .bind(follower)
    .execute(cascade.conn())
    .await?;

    Ok(FollowChange {
        edge_changed: edge.rows_affected() > 0,
        grants_changed: grants.rows_affected(),
    })
}

/// Edge removal plus revocation of both grant kinds on the followee's posts
pub(crate) async fn unfollow_steps(
    cascade: &mut Cascade,
    followee: &UserId,
    follower: &UserId,
) -> AppResult<FollowChange> {
    let edge = sqlx::query("DELETE FROM followers WHERE followee_id = ? AND follower_id = ?")
        .bind(followee)
        .bind(follower)
        .execute(cascade.conn())
        .await?;

    let mut revoked = 0;
    for table in ["almost_private_grants", "private_grants"] {
        let sql = format!(
            "DELETE FROM {} WHERE user_id = ? AND post_id IN (SELECT id FROM posts WHERE author_id = ?)",
            table
        );
        revoked += sqlx::query(&sql)
            .bind(follower)
            .bind(followee)
            .execute(cascade.conn())
            .await?
            .rows_affected();
    }

    Ok(FollowChange {
        edge_changed: edge.rows_affected() > 0,
        grants_changed: revoked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::users::UserDirectory;

    struct Fixture {
        ledger: VisibilityLedger,
        users: UserDirectory,
        db: Database,
    }

    async fn fixture() -> Fixture {
        let db = Database::in_memory().await.unwrap();
        Fixture {
            ledger: VisibilityLedger::new(db.clone()),
            users: UserDirectory::new(db.clone()),
            db,
        }
    }

    fn post(visibility: Visibility, access_list: Vec<UserId>) -> NewPost {
        NewPost {
            content: "hello".to_string(),
            visibility,
            group: None,
            access_list,
        }
    }

    async fn almost_private_grants(db: &Database, post: &PostId, user: &UserId) -> i64 {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM almost_private_grants WHERE post_id = ? AND user_id = ?")
                .bind(post)
                .bind(user)
                .fetch_one(db.pool())
                .await
                .unwrap();
        count
    }

    #[tokio::test]
    async fn follow_then_unfollow_toggles_almost_private_access() {
        let f = fixture().await;
        let author = f.users.register("author").await.unwrap().id;
        let reader = f.users.register("reader").await.unwrap().id;
        let p = f.ledger.create_post(&author, post(Visibility::AlmostPrivate, vec![])).await.unwrap();

        assert!(!f.ledger.can_view(&p.id, &reader).await.unwrap());

        let change = f.ledger.grant_on_follow(&author, &reader).await.unwrap();
        assert!(change.edge_changed);
        assert_eq!(change.grants_changed, 1);
        assert_eq!(almost_private_grants(&f.db, &p.id, &reader).await, 1);
        assert!(f.ledger.can_view(&p.id, &reader).await.unwrap());

        f.ledger.revoke_on_unfollow(&author, &reader).await.unwrap();
        assert_eq!(almost_private_grants(&f.db, &p.id, &reader).await, 0);
        assert!(!f.ledger.can_view(&p.id, &reader).await.unwrap());
    }

    #[tokio::test]
    async fn grants_track_follow_state_through_any_sequence() {
        let f = fixture().await;
        let author = f.users.register("author").await.unwrap().id;
        let reader = f.users.register("reader").await.unwrap().id;
        let first = f.ledger.create_post(&author, post(Visibility::AlmostPrivate, vec![])).await.unwrap();

        let steps = [true, true, false, true, false, false, true];
        for (i, follow) in steps.iter().enumerate() {
            if *follow {
                f.ledger.grant_on_follow(&author, &reader).await.unwrap();
            } else {
                f.ledger.revoke_on_unfollow(&author, &reader).await.unwrap();
            }
            // A post created mid-sequence must follow the same rule
            if i == 3 {
                f.ledger.create_post(&author, post(Visibility::AlmostPrivate, vec![])).await.unwrap();
            }

            let following = f.ledger.is_following(&author, &reader).await.unwrap();
            assert_eq!(following, *follow);
            let (grants,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM almost_private_grants WHERE user_id = ?",
            )
            .bind(&reader)
            .fetch_one(f.db.pool())
            .await
            .unwrap();
            let (posts,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM posts WHERE author_id = ? AND visibility = 'ALMOST_PRIVATE'",
            )
            .bind(&author)
            .fetch_one(f.db.pool())
            .await
            .unwrap();
            assert_eq!(grants, if following { posts } else { 0 }, "step {}", i);
        }
        assert!(f.ledger.can_view(&first.id, &reader).await.unwrap());
    }

    #[tokio::test]
    async fn new_almost_private_post_reaches_existing_followers() {
        let f = fixture().await;
        let author = f.users.register("author").await.unwrap().id;
        let reader = f.users.register("reader").await.unwrap().id;
        f.ledger.grant_on_follow(&author, &reader).await.unwrap();

        let p = f.ledger.create_post(&author, post(Visibility::AlmostPrivate, vec![])).await.unwrap();
        assert!(f.ledger.can_view(&p.id, &reader).await.unwrap());
    }

    #[tokio::test]
    async fn private_access_list_is_explicit_and_revoked_on_unfollow() {
        let f = fixture().await;
        let author = f.users.register("author").await.unwrap().id;
        let u1 = f.users.register("u1").await.unwrap().id;
        let u2 = f.users.register("u2").await.unwrap().id;
        let u3 = f.users.register("u3").await.unwrap().id;
        for u in [&u1, &u3] {
            f.ledger.grant_on_follow(&author, u).await.unwrap();
        }

        let p = f
            .ledger
            .create_post(&author, post(Visibility::Private, vec![u1.clone(), u2.clone()]))
            .await
            .unwrap();

        assert!(f.ledger.can_view(&p.id, &u1).await.unwrap());
        assert!(f.ledger.can_view(&p.id, &u2).await.unwrap());
        // Following the author never grants private access
        assert!(!f.ledger.can_view(&p.id, &u3).await.unwrap());

        f.ledger.revoke_on_unfollow(&author, &u1).await.unwrap();
        assert!(!f.ledger.can_view(&p.id, &u1).await.unwrap());
        // u2 never followed, so nothing revoked it
        assert!(f.ledger.can_view(&p.id, &u2).await.unwrap());
    }

    #[tokio::test]
    async fn feed_is_newest_first_and_filtered() {
        let f = fixture().await;
        let author = f.users.register("author").await.unwrap().id;
        let reader = f.users.register("reader").await.unwrap().id;

        let public = f.ledger.create_post(&author, post(Visibility::Public, vec![])).await.unwrap();
        let hidden = f.ledger.create_post(&author, post(Visibility::AlmostPrivate, vec![])).await.unwrap();
        let shared = f
            .ledger
            .create_post(&author, post(Visibility::Private, vec![reader.clone()]))
            .await
            .unwrap();

        let feed = f.ledger.feed(&reader, 50).await.unwrap();
        let ids: Vec<_> = feed.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![shared.id.clone(), public.id.clone()]);
        assert!(!ids.contains(&hidden.id));

        let own = f.ledger.feed(&author, 50).await.unwrap();
        assert_eq!(own.len(), 3);
        assert_eq!(own[0].id, shared.id);
    }

    #[tokio::test]
    async fn missing_post_is_not_found() {
        let f = fixture().await;
        let reader = f.users.register("reader").await.unwrap().id;
        let result = f.ledger.can_view(&PostId::from("nope"), &reader).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn each_tier_answers_strangers_and_the_author() {
        let f = fixture().await;
        let author = f.users.register("author").await.unwrap().id;
        let stranger = f.users.register("stranger").await.unwrap().id;

        for (visibility, stranger_sees) in [
            (Visibility::Public, true),
            (Visibility::AlmostPrivate, false),
            (Visibility::Private, false),
        ] {
            let p = f.ledger.create_post(&author, post(visibility, vec![])).await.unwrap();
            assert_eq!(f.ledger.can_view(&p.id, &stranger).await.unwrap(), stranger_sees);
            assert!(f.ledger.can_view(&p.id, &author).await.unwrap());
        }
    }

    #[tokio::test]
    async fn self_follow_and_unknown_followee_are_rejected() {
        let f = fixture().await;
        let me = f.users.register("me").await.unwrap().id;
        assert!(matches!(f.ledger.grant_on_follow(&me, &me).await, Err(AppError::Conflict(_))));
        assert!(matches!(
            f.ledger.grant_on_follow(&UserId::from("ghost"), &me).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn counts_and_lists() {
        let f = fixture().await;
        let a = f.users.register("a").await.unwrap().id;
        let b = f.users.register("b").await.unwrap().id;
        let c = f.users.register("c").await.unwrap().id;
        f.ledger.grant_on_follow(&a, &b).await.unwrap();
        f.ledger.grant_on_follow(&a, &c).await.unwrap();
        f.ledger.grant_on_follow(&b, &a).await.unwrap();

        let counts = f.ledger.follow_counts(&a).await.unwrap();
        assert_eq!(counts, FollowCounts { followers: 2, following: 1 });
        assert_eq!(f.ledger.followers(&a).await.unwrap().len(), 2);
        assert_eq!(f.ledger.following(&a).await.unwrap()[0].id, b);
    }
}
