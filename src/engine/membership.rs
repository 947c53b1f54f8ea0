/// Group membership workflows
///
/// Join requests go to the group admin; invitations go from any participant
/// to an outsider. Accepting either inserts the membership if it is absent
/// and deletes the item in the same cascade, and also supersedes the opposite
/// item for the same (user, group) pair.

use crate::dispatch::{Outbox, Push};
use crate::engine::{already_resolved, WorkflowEngine};
use crate::error::{AppError, AppResult};
use crate::groups::access::{group_admin, require_group_access};
use crate::groups::directory::{add_member_step, delete_group_step, insert_group_step, remove_member_step};
use crate::groups::{Group, GroupPrivacy, GroupView, NewGroup, Role};
use crate::ids::{GroupId, UserId, WorkItemId};
use crate::store::Cascade;
use crate::workitem::store::{
    create_step, delete_by_initiator_match_step, delete_by_type_match_step, delete_for_group_step,
    delete_group_event_notices_step, take_step,
};
use crate::workitem::{Created, WorkItem, WorkItemBody, WorkItemKind};
use std::collections::HashSet;

impl WorkflowEngine {
    /// Create a group owned by the actor and invite the initial members
    pub async fn create_group(&self, actor: &UserId, new_group: NewGroup) -> AppResult<Group> {
        if new_group.name.trim().is_empty() {
            return Err(AppError::conflict("group name must not be empty"));
        }
        self.users.require(actor).await?;
        let invitees = self.eligible_invitees(None, actor, &new_group.invitations).await?;

        let mut cascade = self.db.cascade("create_group").await?;
        let group = insert_group_step(&mut cascade, actor, &new_group).await?;
        let invites = invite_steps(&mut cascade, &group.id, actor, &invitees).await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        tracing::info!(
            "👥 {} created {} group {} ({} invitations)",
            actor,
            group.privacy.as_str(),
            group.id,
            invites.len()
        );
        announce_invites(&outbox, invites);
        Ok(group)
    }

    /// A group with the viewer's role and pending-request flag
    pub async fn view_group(&self, actor: &UserId, group: &GroupId) -> AppResult<GroupView> {
        let found = self.groups.require(group).await?;
        let access = require_group_access(self.db.pool(), group, actor).await?;
        let request_pending = self
            .items
            .exists_match(group.as_str(), actor, WorkItemKind::GroupRequest)
            .await?;
        Ok(GroupView {
            group: found,
            role: access.role,
            request_pending,
        })
    }

    /// Ask to join a group
    ///
    /// Members get `Ok(None)`; a second request returns the open one.
    pub async fn request_join(&self, actor: &UserId, group: &GroupId) -> AppResult<Option<WorkItem>> {
        let access = require_group_access(self.db.pool(), group, actor).await?;
        match access.role {
            Role::Admin => return Err(AppError::conflict("the admin already owns this group")),
            Role::Member => return Ok(None),
            Role::Outsider => {}
        }
        let admin = group_admin(self.db.pool(), group)
            .await?
            .ok_or_else(|| AppError::not_found(format!("group {}", group)))?;

        let mut cascade = self.db.cascade("request_join").await?;
        let created = create_step(
            &mut cascade,
            WorkItemBody::GroupRequest {
                group: group.clone(),
                requester: actor.clone(),
            },
        )
        .await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        match created {
            Created::New(item) => {
                tracing::info!("🙋 {} asked to join {}", actor, group);
                outbox.notify(&admin, item.clone());
                Ok(Some(item))
            }
            Created::Existing(item) => Ok(Some(item)),
        }
    }

    pub async fn accept_join(&self, actor: &UserId, id: &WorkItemId) -> AppResult<()> {
        self.resolve_join(actor, id, true).await
    }

    pub async fn decline_join(&self, actor: &UserId, id: &WorkItemId) -> AppResult<()> {
        self.resolve_join(actor, id, false).await
    }

    async fn resolve_join(&self, actor: &UserId, id: &WorkItemId, accept: bool) -> AppResult<()> {
        let label = if accept { "accept_join" } else { "decline_join" };
        let mut cascade = self.db.cascade(label).await?;
        let item = take_step(&mut cascade, id).await?.ok_or_else(|| already_resolved(id))?;
        let WorkItemBody::GroupRequest { group, requester } = &item.body else {
            return Err(AppError::not_found(format!("join request {}", id)));
        };

        let access = require_group_access(cascade.conn(), group, actor).await?;
        if access.role != Role::Admin {
            return Err(AppError::unauthorized("only the group admin can answer join requests"));
        }

        let mut superseded = Vec::new();
        if accept {
            add_member_step(&mut cascade, group, requester).await?;
            superseded =
                delete_by_type_match_step(&mut cascade, requester.as_str(), WorkItemKind::GroupInvite, group.as_str())
                    .await?;
        }
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        tracing::info!(
            "{} {} {}'s request to join {}",
            if accept { "✅" } else { "🚫" },
            if accept { "Accepted" } else { "Declined" },
            requester,
            group
        );

        outbox.push(actor, &Push::resolved(&item, accept));
        if accept {
            outbox.push(requester, &Push::GroupAccepted { group_id: group.clone() });
        } else {
            outbox.push(requester, &Push::resolved(&item, false));
        }
        for invite in &superseded {
            outbox.push(requester, &Push::resolved(invite, true));
        }
        Ok(())
    }

    /// Withdraw the actor's own join request; idempotent
    pub async fn cancel_join(&self, actor: &UserId, group: &GroupId) -> AppResult<bool> {
        let admin = group_admin(self.db.pool(), group)
            .await?
            .ok_or_else(|| AppError::not_found(format!("group {}", group)))?;

        let mut cascade = self.db.cascade("cancel_join").await?;
        let removed =
            delete_by_initiator_match_step(&mut cascade, group.as_str(), actor, WorkItemKind::GroupRequest).await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        for item in &removed {
            tracing::info!("↩️ {} withdrew the request to join {}", actor, group);
            outbox.push(&admin, &Push::resolved(item, false));
        }
        Ok(!removed.is_empty())
    }

    /// Invite outsiders into a group
    ///
    /// Participants among `invitees` are skipped and an open invitation is
    /// reused. Returns the open invitation of every remaining invitee.
    pub async fn invite(&self, actor: &UserId, group: &GroupId, invitees: &[UserId]) -> AppResult<Vec<WorkItem>> {
        let access = require_group_access(self.db.pool(), group, actor).await?;
        if !access.role.is_participant() {
            return Err(AppError::unauthorized("only group members can invite"));
        }
        let invitees = self.eligible_invitees(Some(group), actor, invitees).await?;
        if invitees.is_empty() {
            return Ok(Vec::new());
        }

        let mut cascade = self.db.cascade("invite").await?;
        let invites = invite_steps(&mut cascade, group, actor, &invitees).await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        let items = invites.iter().map(|c| c.item().clone()).collect();
        tracing::info!(
            "✉️ {} invited {} users into {} ({} new)",
            actor,
            invites.len(),
            group,
            invites.iter().filter(|c| c.is_new()).count()
        );
        announce_invites(&outbox, invites);
        Ok(items)
    }

    pub async fn accept_invite(&self, actor: &UserId, id: &WorkItemId) -> AppResult<()> {
        let mut cascade = self.db.cascade("accept_invite").await?;
        let item = take_step(&mut cascade, id).await?.ok_or_else(|| already_resolved(id))?;
        let group = invited_group(&item, actor, id)?;
        require_group_access(cascade.conn(), group, actor).await?;

        add_member_step(&mut cascade, group, actor).await?;
        let requests =
            delete_by_initiator_match_step(&mut cascade, group.as_str(), actor, WorkItemKind::GroupRequest).await?;
        let admin = group_admin(cascade.conn(), group).await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        tracing::info!("✅ {} accepted the invitation into {}", actor, group);
        outbox.push(actor, &Push::resolved(&item, true));
        outbox.push(actor, &Push::GroupAccepted { group_id: group.clone() });
        if let Some(admin) = admin {
            for request in &requests {
                outbox.push(&admin, &Push::resolved(request, true));
            }
        }
        Ok(())
    }

    pub async fn decline_invite(&self, actor: &UserId, id: &WorkItemId) -> AppResult<()> {
        let mut cascade = self.db.cascade("decline_invite").await?;
        let item = take_step(&mut cascade, id).await?.ok_or_else(|| already_resolved(id))?;
        let group = invited_group(&item, actor, id)?;
        require_group_access(cascade.conn(), group, actor).await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        tracing::info!("🚫 {} declined the invitation into {}", actor, group);
        outbox.push(actor, &Push::resolved(&item, false));
        Ok(())
    }

    /// Withdraw an invitation; any participant may do so, idempotent
    pub async fn cancel_invite(&self, actor: &UserId, group: &GroupId, invitee: &UserId) -> AppResult<bool> {
        let access = require_group_access(self.db.pool(), group, actor).await?;
        if !access.role.is_participant() {
            return Err(AppError::unauthorized("only group members can withdraw invitations"));
        }

        let mut cascade = self.db.cascade("cancel_invite").await?;
        let removed =
            delete_by_type_match_step(&mut cascade, invitee.as_str(), WorkItemKind::GroupInvite, group.as_str())
                .await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        for item in &removed {
            tracing::info!("↩️ {} withdrew the invitation of {} into {}", actor, invitee, group);
            outbox.push(invitee, &Push::resolved(item, false));
        }
        Ok(!removed.is_empty())
    }

    /// Join a PUBLIC group directly
    ///
    /// Returns false when the actor already is a member.
    pub async fn join_public(&self, actor: &UserId, group: &GroupId) -> AppResult<bool> {
        let access = require_group_access(self.db.pool(), group, actor).await?;
        match access.role {
            Role::Admin => return Err(AppError::conflict("the admin already owns this group")),
            Role::Member => return Ok(false),
            Role::Outsider => {}
        }
        if access.privacy != GroupPrivacy::Public {
            return Err(AppError::unauthorized("private groups require a request or an invitation"));
        }

        let mut cascade = self.db.cascade("join_public").await?;
        let added = add_member_step(&mut cascade, group, actor).await?;
        delete_by_initiator_match_step(&mut cascade, group.as_str(), actor, WorkItemKind::GroupRequest).await?;
        let invites =
            delete_by_type_match_step(&mut cascade, actor.as_str(), WorkItemKind::GroupInvite, group.as_str()).await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        tracing::info!("👋 {} joined {}", actor, group);
        for invite in &invites {
            outbox.push(actor, &Push::resolved(invite, true));
        }
        outbox.push(actor, &Push::GroupAccepted { group_id: group.clone() });
        Ok(added)
    }

    /// Leave a group; the admin cannot leave
    pub async fn leave(&self, actor: &UserId, group: &GroupId) -> AppResult<()> {
        let access = require_group_access(self.db.pool(), group, actor).await?;
        match access.role {
            Role::Admin => return Err(AppError::conflict("the admin cannot leave their own group")),
            Role::Outsider => return Err(AppError::conflict("not a member of this group")),
            Role::Member => {}
        }

        let mut cascade = self.db.cascade("leave").await?;
        if !remove_member_step(&mut cascade, group, actor).await? {
            return Err(AppError::conflict("not a member of this group"));
        }
        let notices = delete_group_event_notices_step(&mut cascade, group, actor).await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        tracing::info!("🚪 {} left {}", actor, group);
        for notice in &notices {
            outbox.push(actor, &Push::resolved(notice, false));
        }
        Ok(())
    }

    /// Delete a group with everything scoped to it; admin only
    pub async fn delete_group(&self, actor: &UserId, group: &GroupId) -> AppResult<()> {
        let access = require_group_access(self.db.pool(), group, actor).await?;
        if access.role != Role::Admin {
            return Err(AppError::unauthorized("only the group admin can delete the group"));
        }

        let mut cascade = self.db.cascade("delete_group").await?;
        let items = delete_for_group_step(&mut cascade, group).await?;
        delete_group_step(&mut cascade, group).await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        tracing::info!("🗑️ {} deleted group {} ({} open items resolved)", actor, group, items.len());
        for item in &items {
            let holder = item.body.recipient().unwrap_or(actor);
            outbox.push(holder, &Push::resolved(item, false));
        }
        Ok(())
    }

    /// Open join requests; admin only
    pub async fn group_requests(&self, actor: &UserId, group: &GroupId) -> AppResult<Vec<WorkItem>> {
        let access = require_group_access(self.db.pool(), group, actor).await?;
        if access.role != Role::Admin {
            return Err(AppError::unauthorized("only the group admin can list join requests"));
        }
        self.items.list_group_requests(group).await
    }

    /// Open invitations; participants only
    pub async fn group_invites(&self, actor: &UserId, group: &GroupId) -> AppResult<Vec<WorkItem>> {
        let access = require_group_access(self.db.pool(), group, actor).await?;
        if !access.role.is_participant() {
            return Err(AppError::unauthorized("only group members can list invitations"));
        }
        self.items.list_group_invites(group).await
    }

    /// Deduplicate invitees, drop the actor and current participants, and
    /// require every remaining user to exist
    async fn eligible_invitees(
        &self,
        group: Option<&GroupId>,
        actor: &UserId,
        invitees: &[UserId],
    ) -> AppResult<Vec<UserId>> {
        let mut seen = HashSet::new();
        let mut eligible = Vec::new();
        for invitee in invitees {
            if invitee == actor || !seen.insert(invitee) {
                continue;
            }
            self.users.require(invitee).await?;
            if let Some(group) = group {
                let access = require_group_access(self.db.pool(), group, invitee).await?;
                if access.role.is_participant() {
                    tracing::debug!("{} already belongs to {}, not inviting", invitee, group);
                    continue;
                }
            }
            eligible.push(invitee.clone());
        }
        Ok(eligible)
    }
}

/// Notify each invitee whose invitation is new
fn announce_invites(outbox: &Outbox<'_>, invites: Vec<Created>) {
    for created in invites {
        if let Created::New(item) = created {
            if let WorkItemBody::GroupInvite { invitee, .. } = &item.body {
                let invitee = invitee.clone();
                outbox.notify(&invitee, item);
            }
        }
    }
}

async fn invite_steps(
    cascade: &mut Cascade,
    group: &GroupId,
    inviter: &UserId,
    invitees: &[UserId],
) -> AppResult<Vec<Created>> {
    let mut invites = Vec::with_capacity(invitees.len());
    for invitee in invitees {
        let body = WorkItemBody::GroupInvite {
            invitee: invitee.clone(),
            group: group.clone(),
            inviter: inviter.clone(),
        };
        invites.push(create_step(cascade, body).await?);
    }
    Ok(invites)
}

/// The group an invitation is for, checking it is addressed to `actor`
fn invited_group<'a>(item: &'a WorkItem, actor: &UserId, id: &WorkItemId) -> AppResult<&'a GroupId> {
    match &item.body {
        WorkItemBody::GroupInvite { invitee, group, .. } if invitee == actor => Ok(group),
        WorkItemBody::GroupInvite { .. } => Err(AppError::unauthorized("only the invitee can answer an invitation")),
        _ => Err(AppError::not_found(format!("invitation {}", id))),
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::testing::Harness;
    use crate::error::AppError;
    use crate::groups::{GroupPrivacy, NewGroup, Role};
    use crate::ids::{GroupId, UserId, WorkItemId};
    use crate::workitem::WorkItemBody;

    async fn group(h: &Harness, admin: &UserId, privacy: GroupPrivacy, invitations: Vec<UserId>) -> GroupId {
        h.engine
            .create_group(
                admin,
                NewGroup {
                    name: "book club".to_string(),
                    description: "monthly reads".to_string(),
                    privacy,
                    invitations,
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn member_rows(h: &Harness, group: &GroupId, user: &UserId) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group)
            .bind(user)
            .fetch_one(h.db.pool())
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn join_request_round_trip() {
        let h = Harness::new().await;
        let admin = h.user("admin").await;
        let carol = h.user("carol").await;
        let g = group(&h, &admin, GroupPrivacy::Private, vec![]).await;
        let (_a, mut admin_rx) = h.connect(&admin);
        let (_c, mut carol_rx) = h.connect(&carol);

        let request = h.engine.request_join(&carol, &g).await.unwrap().unwrap();
        // A second request returns the open one
        let again = h.engine.request_join(&carol, &g).await.unwrap().unwrap();
        assert_eq!(again.id, request.id);
        assert!(h.engine.view_group(&carol, &g).await.unwrap().request_pending);

        let pushed = h.drain(&mut admin_rx).await;
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0]["notification"]["type"], "GROUP_REQUEST");
        assert_eq!(pushed[0]["notification"]["targetId"], g.as_str());

        h.engine.accept_join(&admin, &request.id).await.unwrap();
        assert_eq!(member_rows(&h, &g, &carol).await, 1);
        let view = h.engine.view_group(&carol, &g).await.unwrap();
        assert_eq!(view.role, Role::Member);
        assert!(!view.request_pending);
        assert_eq!(view.group.member_count, 2);

        let pushed = h.drain(&mut carol_rx).await;
        assert_eq!(pushed[0]["action"], "groupAccepted");
        assert_eq!(pushed[0]["groupId"], g.as_str());

        // Already resolved
        assert!(matches!(
            h.engine.accept_join(&admin, &request.id).await,
            Err(AppError::Conflict(_))
        ));
        // Members request nothing
        assert!(h.engine.request_join(&carol, &g).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn accepting_for_an_existing_member_adds_no_duplicate() {
        let h = Harness::new().await;
        let admin = h.user("admin").await;
        let carol = h.user("carol").await;
        let g = group(&h, &admin, GroupPrivacy::Public, vec![]).await;

        let request = h.engine.request_join(&carol, &g).await.unwrap().unwrap();
        h.engine.join_public(&carol, &g).await.unwrap();
        // join_public superseded the request
        assert!(matches!(
            h.engine.accept_join(&admin, &request.id).await,
            Err(AppError::Conflict(_))
        ));

        // A request that slipped in after the member joined
        let item = h
            .engine
            .items()
            .create(WorkItemBody::GroupRequest {
                group: g.clone(),
                requester: carol.clone(),
            })
            .await
            .unwrap()
            .into_item();
        h.engine.accept_join(&admin, &item.id).await.unwrap();
        assert_eq!(member_rows(&h, &g, &carol).await, 1);
        assert!(h.engine.items().find_by_id(&item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn only_the_admin_answers_requests() {
        let h = Harness::new().await;
        let admin = h.user("admin").await;
        let carol = h.user("carol").await;
        let dave = h.user("dave").await;
        let g = group(&h, &admin, GroupPrivacy::Private, vec![]).await;

        let request = h.engine.request_join(&carol, &g).await.unwrap().unwrap();
        assert!(matches!(
            h.engine.decline_join(&dave, &request.id).await,
            Err(AppError::Unauthorized(_))
        ));
        // Rolled back: the request is still open
        assert_eq!(h.engine.group_requests(&admin, &g).await.unwrap().len(), 1);

        h.engine.decline_join(&admin, &request.id).await.unwrap();
        assert_eq!(member_rows(&h, &g, &carol).await, 0);
        assert!(h.engine.group_requests(&admin, &g).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn request_edge_cases() {
        let h = Harness::new().await;
        let admin = h.user("admin").await;
        let carol = h.user("carol").await;
        let g = group(&h, &admin, GroupPrivacy::Private, vec![]).await;

        assert!(matches!(
            h.engine.request_join(&carol, &GroupId::from("missing")).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(h.engine.request_join(&admin, &g).await, Err(AppError::Conflict(_))));
        assert!(matches!(
            h.engine.accept_join(&admin, &WorkItemId::from("missing")).await,
            Err(AppError::Conflict(_))
        ));

        assert!(!h.engine.cancel_join(&carol, &g).await.unwrap());
        h.engine.request_join(&carol, &g).await.unwrap();
        assert!(h.engine.cancel_join(&carol, &g).await.unwrap());
        assert!(!h.engine.cancel_join(&carol, &g).await.unwrap());
    }

    #[tokio::test]
    async fn invitations_skip_members_and_are_reused() {
        let h = Harness::new().await;
        let admin = h.user("admin").await;
        let bob = h.user("bob").await;
        let carol = h.user("carol").await;
        let (_b, mut bob_rx) = h.connect(&bob);
        let g = group(&h, &admin, GroupPrivacy::Private, vec![bob.clone(), bob.clone()]).await;

        let pushed = h.drain(&mut bob_rx).await;
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0]["notification"]["type"], "GROUP_INVITE");
        assert_eq!(pushed[0]["notification"]["content"], g.as_str());

        let again = h.engine.invite(&admin, &g, &[bob.clone()]).await.unwrap();
        assert_eq!(again.len(), 1);
        assert!(h.drain(&mut bob_rx).await.is_empty());
        assert_eq!(h.engine.group_invites(&admin, &g).await.unwrap().len(), 1);

        // Outsiders cannot invite
        assert!(matches!(
            h.engine.invite(&carol, &g, &[bob.clone()]).await,
            Err(AppError::Unauthorized(_))
        ));

        h.engine.accept_invite(&bob, &again[0].id).await.unwrap();
        assert_eq!(member_rows(&h, &g, &bob).await, 1);
        // Members are skipped
        assert!(h.engine.invite(&admin, &g, &[bob.clone()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_the_invitee_answers_and_cancel_is_idempotent() {
        let h = Harness::new().await;
        let admin = h.user("admin").await;
        let bob = h.user("bob").await;
        let carol = h.user("carol").await;
        let g = group(&h, &admin, GroupPrivacy::Private, vec![]).await;

        let invite = h.engine.invite(&admin, &g, &[bob.clone()]).await.unwrap().remove(0);
        assert!(matches!(
            h.engine.accept_invite(&carol, &invite.id).await,
            Err(AppError::Unauthorized(_))
        ));

        assert!(h.engine.cancel_invite(&admin, &g, &bob).await.unwrap());
        assert!(!h.engine.cancel_invite(&admin, &g, &bob).await.unwrap());
        assert!(matches!(
            h.engine.decline_invite(&bob, &invite.id).await,
            Err(AppError::Conflict(_))
        ));

        let invite = h.engine.invite(&admin, &g, &[bob.clone()]).await.unwrap().remove(0);
        h.engine.decline_invite(&bob, &invite.id).await.unwrap();
        assert_eq!(member_rows(&h, &g, &bob).await, 0);
    }

    #[tokio::test]
    async fn resolving_into_a_deleted_group_is_not_found() {
        let h = Harness::new().await;
        let admin = h.user("admin").await;
        let bob = h.user("bob").await;
        let g = group(&h, &admin, GroupPrivacy::Private, vec![]).await;
        let invite = h.engine.invite(&admin, &g, &[bob.clone()]).await.unwrap().remove(0);

        // Remove the group row behind the engine's back, leaving the invite open
        sqlx::query("DELETE FROM groups WHERE id = ?")
            .bind(&g)
            .execute(h.db.pool())
            .await
            .unwrap();

        assert!(matches!(
            h.engine.accept_invite(&bob, &invite.id).await,
            Err(AppError::NotFound(_))
        ));
        // No state change: the item is still there
        assert!(h.engine.items().find_by_id(&invite.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn public_join_leave_and_delete() {
        let h = Harness::new().await;
        let admin = h.user("admin").await;
        let carol = h.user("carol").await;
        let public = group(&h, &admin, GroupPrivacy::Public, vec![]).await;
        let private = group(&h, &admin, GroupPrivacy::Private, vec![]).await;

        assert!(h.engine.join_public(&carol, &public).await.unwrap());
        assert!(!h.engine.join_public(&carol, &public).await.unwrap());
        assert!(matches!(
            h.engine.join_public(&carol, &private).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            h.engine.join_public(&admin, &public).await,
            Err(AppError::Conflict(_))
        ));

        assert!(matches!(h.engine.leave(&admin, &public).await, Err(AppError::Conflict(_))));
        h.engine.leave(&carol, &public).await.unwrap();
        assert!(matches!(h.engine.leave(&carol, &public).await, Err(AppError::Conflict(_))));

        h.engine.request_join(&carol, &private).await.unwrap();
        assert!(matches!(
            h.engine.delete_group(&carol, &private).await,
            Err(AppError::Unauthorized(_))
        ));
        h.engine.delete_group(&admin, &private).await.unwrap();
        assert!(h.engine.groups().get(&private).await.unwrap().is_none());
        assert!(h.engine.notifications(&admin).await.unwrap().is_empty());
    }
}
