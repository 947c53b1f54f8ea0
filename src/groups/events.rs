/// Group events and RSVP responses
///
/// A response is unique per (event, user); answering again overwrites the
/// previous answer, so tallies always reflect current answers only.

use crate::error::{AppError, AppResult};
use crate::groups::types::{Event, EventResponse, EventRow, EventSummary, NewEvent, RsvpResponse};
use crate::ids::{EventId, GroupId, UserId};
use crate::store::{now_millis, Cascade, Database};
use sqlx::SqliteExecutor;

const EVENT_COLUMNS: &str = "id, group_id, creator_id, title, description, starts_at, created_at";

#[derive(Debug, Clone)]
pub struct EventBook {
    db: Database,
}

impl EventBook {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, event: &EventId) -> AppResult<Option<Event>> {
        let sql = format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS);
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(event)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(Event::from))
    }

    pub async fn require(&self, event: &EventId) -> AppResult<Event> {
        self.get(event)
            .await?
            .ok_or_else(|| AppError::not_found(format!("event {}", event)))
    }

    /// Events of one group, soonest first
    pub async fn group_events(&self, group: &GroupId) -> AppResult<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events WHERE group_id = ? ORDER BY starts_at ASC, created_at ASC",
            EVENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(group)
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    pub async fn responses(&self, event: &EventId) -> AppResult<Vec<EventResponse>> {
        let rows: Vec<(UserId, String)> = sqlx::query_as(
            "SELECT user_id, response FROM event_responses WHERE event_id = ? ORDER BY updated_at ASC",
        )
        .bind(event)
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter()
            .map(|(user, response)| {
                Ok(EventResponse {
                    user,
                    response: response.parse().map_err(AppError::Internal)?,
                })
            })
            .collect()
    }

    /// Event with current answers, tallies and the viewer's own answer
    pub async fn summary(&self, event: &EventId, viewer: &UserId) -> AppResult<EventSummary> {
        let event = self.require(event).await?;
        let responses = self.responses(&event.id).await?;

        let tally = |wanted: RsvpResponse| responses.iter().filter(|r| r.response == wanted).count() as i64;
        let going = tally(RsvpResponse::Going);
        let not_going = tally(RsvpResponse::NotGoing);
        let maybe = tally(RsvpResponse::Maybe);
        let my_response = responses.iter().find(|r| &r.user == viewer).map(|r| r.response);

        Ok(EventSummary {
            event,
            responses,
            going,
            not_going,
            maybe,
            my_response,
        })
    }
}

/// Group an event belongs to, if the event exists
pub async fn event_group<'e, E>(executor: E, event: &EventId) -> AppResult<Option<GroupId>>
where
    E: SqliteExecutor<'e>,
{
    let row: Option<(GroupId,)> = sqlx::query_as("SELECT group_id FROM events WHERE id = ?")
        .bind(event)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|(group,)| group))
}

pub(crate) async fn insert_event_step(
    cascade: &mut Cascade,
    creator: &UserId,
    new_event: &NewEvent,
) -> AppResult<Event> {
    let id = EventId::generate();
    let created_at = now_millis();
    sqlx::query(
        r#"
        INSERT INTO events (id, group_id, creator_id, title, description, starts_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new_event.group)
    .bind(creator)
    .bind(new_event.title.trim())
    .bind(&new_event.description)
    .bind(new_event.starts_at.timestamp_millis())
    .bind(created_at)
    .execute(cascade.conn())
    .await?;

    Ok(Event::from(EventRow {
        id,
        group_id: new_event.group.clone(),
        creator_id: creator.clone(),
        title: new_event.title.trim().to_string(),
        description: new_event.description.clone(),
        starts_at: new_event.starts_at.timestamp_millis(),
        created_at,
    }))
}

/// Record or overwrite one user's answer
pub(crate) async fn upsert_response_step(
    cascade: &mut Cascade,
    event: &EventId,
    user: &UserId,
    response: RsvpResponse,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO event_responses (event_id, user_id, response, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(event_id, user_id) DO UPDATE SET
            response = excluded.response,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(event)
    .bind(user)
    .bind(response.as_str())
    .bind(now_millis())
    .execute(cascade.conn())
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::directory::insert_group_step;
    use crate::groups::types::{GroupPrivacy, NewGroup};
    use crate::ledger::UserDirectory;

    #[tokio::test]
    async fn later_answer_overwrites_earlier_one() {
        let db = Database::in_memory().await.unwrap();
        let users = UserDirectory::new(db.clone());
        let admin = users.register("admin").await.unwrap().id;
        let guest = users.register("guest").await.unwrap().id;

        let mut cascade = db.cascade("test-event").await.unwrap();
        let group = insert_group_step(
            &mut cascade,
            &admin,
            &NewGroup {
                name: "climbers".to_string(),
                description: String::new(),
                privacy: GroupPrivacy::Public,
                invitations: vec![],
            },
        )
        .await
        .unwrap();
        let event = insert_event_step(
            &mut cascade,
            &admin,
            &NewEvent {
                group: group.id.clone(),
                title: "bouldering".to_string(),
                description: String::new(),
                starts_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();
        upsert_response_step(&mut cascade, &event.id, &admin, RsvpResponse::Going).await.unwrap();
        upsert_response_step(&mut cascade, &event.id, &guest, RsvpResponse::Going).await.unwrap();
        upsert_response_step(&mut cascade, &event.id, &guest, RsvpResponse::NotGoing).await.unwrap();
        cascade.commit().await.unwrap();

        let book = EventBook::new(db);
        let summary = book.summary(&event.id, &guest).await.unwrap();
        assert_eq!(summary.responses.len(), 2);
        assert_eq!(summary.going, 1);
        assert_eq!(summary.not_going, 1);
        assert_eq!(summary.maybe, 0);
        assert_eq!(summary.my_response, Some(RsvpResponse::NotGoing));

        assert_eq!(book.group_events(&group.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_event_is_not_found() {
        let db = Database::in_memory().await.unwrap();
        let book = EventBook::new(db);
        let result = book.summary(&EventId::from("nope"), &UserId::from("u")).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
