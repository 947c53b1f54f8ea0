/// Event notices and RSVP answers
///
/// Creating an event records the creator as going and leaves an EVENT notice
/// with every other participant of the group. Answering upserts the response
/// and resolves the answering user's notice.

use crate::dispatch::Push;
use crate::engine::{already_resolved, WorkflowEngine};
use crate::error::{AppError, AppResult};
use crate::groups::access::require_group_access;
use crate::groups::directory::participants;
use crate::groups::events::{event_group, insert_event_step, upsert_response_step};
use crate::groups::{Event, EventSummary, NewEvent, RsvpResponse};
use crate::ids::{EventId, GroupId, UserId, WorkItemId};
use crate::workitem::store::{create_step, delete_by_type_match_step, take_step};
use crate::workitem::{Created, WorkItemBody, WorkItemKind};

impl WorkflowEngine {
    /// Schedule an event and notify every other group participant
    pub async fn create_event(&self, actor: &UserId, new_event: NewEvent) -> AppResult<Event> {
        if new_event.title.trim().is_empty() {
            return Err(AppError::conflict("event title must not be empty"));
        }
        let access = require_group_access(self.db.pool(), &new_event.group, actor).await?;
        if !access.role.is_participant() {
            return Err(AppError::unauthorized("only group members can create events"));
        }

        let mut cascade = self.db.cascade("create_event").await?;
        let event = insert_event_step(&mut cascade, actor, &new_event).await?;
        upsert_response_step(&mut cascade, &event.id, actor, RsvpResponse::Going).await?;

        let mut notices = Vec::new();
        for attendee in participants(cascade.conn(), &event.group).await? {
            if &attendee == actor {
                continue;
            }
            let body = WorkItemBody::Event {
                attendee,
                event: event.id.clone(),
                creator: actor.clone(),
            };
            notices.push(create_step(&mut cascade, body).await?);
        }
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        tracing::info!(
            "📅 {} scheduled \"{}\" in {} ({} notices)",
            actor,
            event.title,
            event.group,
            notices.len()
        );
        for created in notices {
            if let Created::New(item) = created {
                if let WorkItemBody::Event { attendee, .. } = &item.body {
                    let attendee = attendee.clone();
                    outbox.notify(&attendee, item);
                }
            }
        }
        Ok(event)
    }

    /// Answer an event, resolving the actor's notice for it
    ///
    /// With `notice`, that exact item must be the actor's notice for this
    /// event; otherwise the notice is found by type match.
    pub async fn respond_to_event(
        &self,
        actor: &UserId,
        event: &EventId,
        response: RsvpResponse,
        notice: Option<&WorkItemId>,
    ) -> AppResult<EventSummary> {
        let mut cascade = self.db.cascade("respond_to_event").await?;
        let resolved = match notice {
            Some(id) => {
                let item = take_step(&mut cascade, id).await?.ok_or_else(|| already_resolved(id))?;
                match &item.body {
                    WorkItemBody::Event { attendee, event: noticed, .. } if attendee == actor && noticed == event => {}
                    _ => {
                        return Err(AppError::conflict(format!(
                            "work item {} is not your notice for event {}",
                            id, event
                        )))
                    }
                }
                vec![item]
            }
            None => delete_by_type_match_step(&mut cascade, actor.as_str(), WorkItemKind::Event, event.as_str()).await?,
        };

        let group = event_group(cascade.conn(), event)
            .await?
            .ok_or_else(|| AppError::not_found(format!("event {}", event)))?;
        let access = require_group_access(cascade.conn(), &group, actor).await?;
        if !access.role.is_participant() {
            return Err(AppError::unauthorized("only group members can answer events"));
        }
        upsert_response_step(&mut cascade, event, actor, response).await?;
        let outbox = self.dispatcher.outbox().await;
        cascade.commit().await?;

        tracing::info!("🗓️ {} answered {} to {}", actor, response.as_str(), event);
        for item in &resolved {
            outbox.push(actor, &Push::resolved(item, response == RsvpResponse::Going));
        }
        drop(outbox);
        self.events.summary(event, actor).await
    }

    /// Event summary for anyone who can read the group
    pub async fn event_summary(&self, actor: &UserId, event: &EventId) -> AppResult<EventSummary> {
        let group = event_group(self.db.pool(), event)
            .await?
            .ok_or_else(|| AppError::not_found(format!("event {}", event)))?;
        self.require_readable(actor, &group).await?;
        self.events.summary(event, actor).await
    }

    pub async fn group_events(&self, actor: &UserId, group: &GroupId) -> AppResult<Vec<Event>> {
        self.require_readable(actor, group).await?;
        self.events.group_events(group).await
    }

    async fn require_readable(&self, actor: &UserId, group: &GroupId) -> AppResult<()> {
        let access = require_group_access(self.db.pool(), group, actor).await?;
        if access.can_read() {
            Ok(())
        } else {
            Err(AppError::unauthorized("private group content is for members only"))
        }
    }
}
