//! Ticket engine: lifecycle mutations with their audit trail and
//! notification fan-out.
//!
//! Every public operation runs in one transaction so the state change, its
//! activity records and its in-app notifications commit together. Emails
//! are rendered inside the transaction but handed back to the caller, who
//! delivers them after commit (best-effort).

use chrono::Utc;
use diesel::prelude::*;
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::email::OutgoingEmail;
use crate::notifications::{
    self, comment_added_email, comment_email_recipients, created_email_recipients,
    ticket_created_email, ticket_updated_email, updated_email_recipients,
};
use crate::shared::enums::{CommentType, NotificationType, TicketStatus, UserRole, VoteType};
use crate::shared::error::ApiError;
use crate::shared::models::{Ticket, TicketActivity, TicketComment, TicketVote, User};
use crate::shared::schema::{
    categories, priorities, ticket_activities, ticket_attachments, ticket_comments,
    ticket_sequences, ticket_votes, tickets, users,
};

// ============================================================================
// Ticket numbers
// ============================================================================

/// `PREFIX-%03d`, growing past three digits once the pad is exhausted.
pub fn format_ticket_number(prefix: &str, n: i64) -> String {
    format!("{prefix}-{n:03}")
}

/// Atomic allocation via the per-prefix sequence row. The upsert takes a
/// row lock, so concurrent creations serialize here and can never observe
/// the same number.
fn next_ticket_number(conn: &mut PgConnection, prefix: &str) -> QueryResult<String> {
    let n: i64 = diesel::insert_into(ticket_sequences::table)
        .values((
            ticket_sequences::prefix.eq(prefix),
            ticket_sequences::last_number.eq(1_i64),
        ))
        .on_conflict(ticket_sequences::prefix)
        .do_update()
        .set(ticket_sequences::last_number.eq(ticket_sequences::last_number + 1))
        .returning(ticket_sequences::last_number)
        .get_result(conn)?;
    Ok(format_ticket_number(prefix, n))
}

// ============================================================================
// Field diff
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct TicketPatch {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub category_id: Option<Uuid>,
    pub priority_id: Option<Uuid>,
    pub tags: Option<Vec<String>>,
}

impl TicketPatch {
    pub fn status_only(status: TicketStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: Option<String>,
    pub new: Option<String>,
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Humanized field name for activity descriptions ("assigned_to" ->
/// "Assigned To").
pub fn humanize_field(field: &str) -> String {
    field
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fields that actually change value; equal or absent fields produce
/// nothing. Category and priority record raw ids here; `apply_update`
/// swaps in the referenced names before the activity rows are written.
pub fn diff(ticket: &Ticket, patch: &TicketPatch) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if let Some(subject) = &patch.subject {
        if subject != &ticket.subject {
            changes.push(FieldChange {
                field: "subject",
                old: non_empty(ticket.subject.clone()),
                new: non_empty(subject.clone()),
            });
        }
    }
    if let Some(description) = &patch.description {
        if description != &ticket.description {
            changes.push(FieldChange {
                field: "description",
                old: non_empty(ticket.description.clone()),
                new: non_empty(description.clone()),
            });
        }
    }
    if let Some(status) = patch.status {
        if status != ticket.status {
            changes.push(FieldChange {
                field: "status",
                old: Some(ticket.status.as_str().to_string()),
                new: Some(status.as_str().to_string()),
            });
        }
    }
    if let Some(category_id) = patch.category_id {
        if category_id != ticket.category_id {
            changes.push(FieldChange {
                field: "category",
                old: Some(ticket.category_id.to_string()),
                new: Some(category_id.to_string()),
            });
        }
    }
    if let Some(priority_id) = patch.priority_id {
        if priority_id != ticket.priority_id {
            changes.push(FieldChange {
                field: "priority",
                old: Some(ticket.priority_id.to_string()),
                new: Some(priority_id.to_string()),
            });
        }
    }
    if let Some(tags) = &patch.tags {
        if tags != &ticket.tags {
            changes.push(FieldChange {
                field: "tags",
                old: non_empty(ticket.tags.join(", ")),
                new: non_empty(tags.join(", ")),
            });
        }
    }

    changes
}

// ============================================================================
// Vote tally
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded(VoteType),
    Removed,
}

pub fn tally(votes: &[VoteType]) -> (i32, i32) {
    let up = votes.iter().filter(|v| **v == VoteType::Up).count() as i32;
    let down = votes.iter().filter(|v| **v == VoteType::Down).count() as i32;
    (up, down)
}

/// Authoritative recount over the vote rows; counters are never patched
/// incrementally, so they cannot drift under concurrent votes.
///
/// The ticket row is locked before counting. Under READ COMMITTED two
/// concurrent voters would otherwise both count before either commits and
/// the last writer would persist a stale total; serializing on the row
/// lock means each recount sees every committed vote that precedes its
/// write.
fn recompute_vote_counts(conn: &mut PgConnection, ticket_id: Uuid) -> QueryResult<(i32, i32)> {
    let _locked: Uuid = tickets::table
        .filter(tickets::id.eq(ticket_id))
        .select(tickets::id)
        .for_update()
        .first(conn)?;
    let votes: Vec<VoteType> = ticket_votes::table
        .filter(ticket_votes::ticket_id.eq(ticket_id))
        .select(ticket_votes::vote_type)
        .load(conn)?;
    let (up, down) = tally(&votes);
    diesel::update(tickets::table.filter(tickets::id.eq(ticket_id)))
        .set((tickets::upvotes.eq(up), tickets::downvotes.eq(down)))
        .execute(conn)?;
    Ok((up, down))
}

// ============================================================================
// Engine operations
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewTicketInput {
    pub subject: String,
    pub description: String,
    pub category_id: Uuid,
    pub priority_id: Uuid,
    pub tags: Vec<String>,
    pub is_internal: bool,
}

/// Result of an engine operation plus the emails to deliver after commit.
pub struct EngineOutcome<T> {
    pub value: T,
    pub emails: Vec<OutgoingEmail>,
}

fn append_activity(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    actor_id: Uuid,
    action: &str,
    description: String,
    old_value: Option<String>,
    new_value: Option<String>,
) -> QueryResult<()> {
    let activity = TicketActivity {
        id: Uuid::new_v4(),
        ticket_id,
        user_id: actor_id,
        action: action.to_string(),
        description,
        old_value,
        new_value,
        created_at: Utc::now(),
    };
    diesel::insert_into(ticket_activities::table)
        .values(&activity)
        .execute(conn)?;
    Ok(())
}

fn load_user(conn: &mut PgConnection, id: Uuid) -> Result<User, ApiError> {
    users::table
        .filter(users::id.eq(id))
        .first(conn)
        .optional()?
        .ok_or(ApiError::NotFound("User"))
}

fn active_agents(conn: &mut PgConnection) -> QueryResult<Vec<User>> {
    users::table
        .filter(users::role.eq(UserRole::Agent))
        .filter(users::is_active.eq(true))
        .load(conn)
}

fn active_staff(conn: &mut PgConnection) -> QueryResult<Vec<User>> {
    users::table
        .filter(users::role.eq_any(vec![UserRole::Agent, UserRole::Admin]))
        .filter(users::is_active.eq(true))
        .load(conn)
}

pub fn create_ticket(
    conn: &mut PgConnection,
    config: &AppConfig,
    input: NewTicketInput,
    actor: &User,
) -> Result<EngineOutcome<Ticket>, ApiError> {
    conn.transaction(|conn| {
        let category_ok: i64 = categories::table
            .filter(categories::id.eq(input.category_id))
            .filter(categories::is_active.eq(true))
            .count()
            .get_result(conn)?;
        if category_ok == 0 {
            return Err(ApiError::NotFound("Category"));
        }
        let priority_ok: i64 = priorities::table
            .filter(priorities::id.eq(input.priority_id))
            .count()
            .get_result(conn)?;
        if priority_ok == 0 {
            return Err(ApiError::NotFound("Priority"));
        }

        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            ticket_number: next_ticket_number(conn, &config.ticket_prefix)?,
            subject: input.subject,
            description: input.description,
            status: TicketStatus::Open,
            created_by: actor.id,
            assigned_to: None,
            category_id: input.category_id,
            priority_id: input.priority_id,
            upvotes: 0,
            downvotes: 0,
            is_internal: input.is_internal,
            tags: input.tags,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            closed_at: None,
        };
        diesel::insert_into(tickets::table)
            .values(&ticket)
            .execute(conn)?;

        append_activity(
            conn,
            ticket.id,
            actor.id,
            "created",
            format!("Ticket created by {}", actor.username),
            None,
            None,
        )?;

        let agents = active_agents(conn)?;
        if actor.role == UserRole::Customer {
            let recipients: Vec<Uuid> = agents.iter().map(|a| a.id).collect();
            notifications::notify(
                conn,
                NotificationType::TicketCreated,
                &ticket,
                &recipients,
                &actor.display_name(),
            )?;
        }

        let mut emails = Vec::new();
        if config.email_notifications_enabled {
            let recipients = created_email_recipients(actor, None, &agents);
            if !recipients.is_empty() {
                emails.push(ticket_created_email(config, &ticket, recipients));
            }
        }

        info!(ticket = %ticket.ticket_number, actor = %actor.username, "ticket created");
        Ok(EngineOutcome {
            value: ticket,
            emails,
        })
    })
}

/// Core update path, shared by direct edits, status endpoints and the
/// comment auto-transition. Must run inside an open transaction.
fn apply_update(
    conn: &mut PgConnection,
    config: &AppConfig,
    mut ticket: Ticket,
    patch: TicketPatch,
    actor: &User,
) -> Result<(Ticket, Vec<OutgoingEmail>), ApiError> {
    let mut changes = diff(&ticket, &patch);
    if changes.is_empty() {
        return Ok((ticket, Vec::new()));
    }

    // Category/priority ids in the diff become names for the audit trail.
    for change in &mut changes {
        match change.field {
            "category" => {
                change.old = lookup_category_name(conn, &change.old)?;
                change.new = lookup_category_name(conn, &change.new)?;
            }
            "priority" => {
                change.old = lookup_priority_name(conn, &change.old)?;
                change.new = lookup_priority_name(conn, &change.new)?;
            }
            _ => {}
        }
    }

    let status_changed = changes.iter().any(|c| c.field == "status");
    let now = Utc::now();

    if let Some(subject) = patch.subject {
        ticket.subject = subject;
    }
    if let Some(description) = patch.description {
        ticket.description = description;
    }
    if let Some(status) = patch.status {
        ticket.status = status;
        // First-time-reached markers; re-entering a state never moves them.
        if status == TicketStatus::Resolved && ticket.resolved_at.is_none() {
            ticket.resolved_at = Some(now);
        }
        if status == TicketStatus::Closed && ticket.closed_at.is_none() {
            ticket.closed_at = Some(now);
        }
    }
    if let Some(category_id) = patch.category_id {
        if category_exists(conn, category_id)? == 0 {
            return Err(ApiError::NotFound("Category"));
        }
        ticket.category_id = category_id;
    }
    if let Some(priority_id) = patch.priority_id {
        if priority_exists(conn, priority_id)? == 0 {
            return Err(ApiError::NotFound("Priority"));
        }
        ticket.priority_id = priority_id;
    }
    if let Some(tags) = patch.tags {
        ticket.tags = tags;
    }
    ticket.updated_at = now;

    diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
        .set(&ticket)
        .execute(conn)?;

    for change in &changes {
        append_activity(
            conn,
            ticket.id,
            actor.id,
            &format!("{}_changed", change.field),
            format!("{} changed", humanize_field(change.field)),
            change.old.clone(),
            change.new.clone(),
        )?;
    }

    let owner = load_user(conn, ticket.created_by)?;
    let assignee = match ticket.assigned_to {
        Some(id) => Some(load_user(conn, id)?),
        None => None,
    };

    let kind = if status_changed {
        NotificationType::StatusChanged
    } else {
        NotificationType::TicketUpdated
    };
    let mut recipients = Vec::new();
    if owner.id != actor.id {
        recipients.push(owner.id);
    }
    if let Some(agent) = &assignee {
        if agent.id != actor.id {
            recipients.push(agent.id);
        }
    }
    notifications::notify(conn, kind, &ticket, &recipients, &actor.display_name())?;

    let mut emails = Vec::new();
    if config.email_notifications_enabled {
        let email_recipients = updated_email_recipients(&owner, assignee.as_ref(), actor.id);
        if !email_recipients.is_empty() {
            emails.push(ticket_updated_email(
                config,
                &ticket,
                &actor.display_name(),
                email_recipients,
            ));
        }
    }

    Ok((ticket, emails))
}

fn category_exists(conn: &mut PgConnection, id: Uuid) -> QueryResult<i64> {
    categories::table
        .filter(categories::id.eq(id))
        .count()
        .get_result(conn)
}

fn priority_exists(conn: &mut PgConnection, id: Uuid) -> QueryResult<i64> {
    priorities::table
        .filter(priorities::id.eq(id))
        .count()
        .get_result(conn)
}

fn lookup_category_name(
    conn: &mut PgConnection,
    id: &Option<String>,
) -> Result<Option<String>, ApiError> {
    let Some(raw) = id else { return Ok(None) };
    let Ok(uuid) = raw.parse::<Uuid>() else {
        return Ok(Some(raw.clone()));
    };
    let name: Option<String> = categories::table
        .filter(categories::id.eq(uuid))
        .select(categories::name)
        .first(conn)
        .optional()?;
    Ok(name.or_else(|| Some(raw.clone())))
}

fn lookup_priority_name(
    conn: &mut PgConnection,
    id: &Option<String>,
) -> Result<Option<String>, ApiError> {
    let Some(raw) = id else { return Ok(None) };
    let Ok(uuid) = raw.parse::<Uuid>() else {
        return Ok(Some(raw.clone()));
    };
    let name: Option<String> = priorities::table
        .filter(priorities::id.eq(uuid))
        .select(priorities::name)
        .first(conn)
        .optional()?;
    Ok(name.or_else(|| Some(raw.clone())))
}

pub fn update_ticket(
    conn: &mut PgConnection,
    config: &AppConfig,
    ticket: Ticket,
    patch: TicketPatch,
    actor: &User,
) -> Result<EngineOutcome<Ticket>, ApiError> {
    conn.transaction(|conn| {
        let (ticket, emails) = apply_update(conn, config, ticket, patch, actor)?;
        Ok(EngineOutcome {
            value: ticket,
            emails,
        })
    })
}

/// The agent-role precondition on `agent` is the caller's contract; the
/// engine does not re-validate it.
pub fn assign_ticket(
    conn: &mut PgConnection,
    _config: &AppConfig,
    mut ticket: Ticket,
    agent: &User,
    actor: &User,
) -> Result<EngineOutcome<Ticket>, ApiError> {
    conn.transaction(|conn| {
        let old_assignee = match ticket.assigned_to {
            Some(id) => Some(load_user(conn, id)?.username),
            None => None,
        };

        ticket.assigned_to = Some(agent.id);
        ticket.updated_at = Utc::now();
        diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
            .set(&ticket)
            .execute(conn)?;

        append_activity(
            conn,
            ticket.id,
            actor.id,
            "assigned",
            format!("Ticket assigned to {}", agent.username),
            old_assignee,
            Some(agent.username.clone()),
        )?;

        notifications::notify(
            conn,
            NotificationType::TicketAssigned,
            &ticket,
            &[agent.id],
            &actor.display_name(),
        )?;
        if ticket.created_by != actor.id && ticket.created_by != agent.id {
            notifications::notify(
                conn,
                NotificationType::TicketUpdated,
                &ticket,
                &[ticket.created_by],
                &actor.display_name(),
            )?;
        }

        info!(ticket = %ticket.ticket_number, agent = %agent.username, "ticket assigned");
        Ok(EngineOutcome {
            value: ticket,
            emails: Vec::new(),
        })
    })
}

/// Upsert-or-toggle, one transaction per (ticket, user). The insert path
/// upserts on the (ticket_id, user_id) unique constraint so a concurrent
/// duplicate never surfaces as a raw conflict.
pub fn vote(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    user_id: Uuid,
    vote_type: VoteType,
) -> Result<VoteOutcome, ApiError> {
    conn.transaction(|conn| {
        let existing: Option<TicketVote> = ticket_votes::table
            .filter(ticket_votes::ticket_id.eq(ticket_id))
            .filter(ticket_votes::user_id.eq(user_id))
            .first(conn)
            .optional()?;

        let outcome = match existing {
            Some(prior) if prior.vote_type == vote_type => {
                diesel::delete(ticket_votes::table.filter(ticket_votes::id.eq(prior.id)))
                    .execute(conn)?;
                VoteOutcome::Removed
            }
            Some(prior) => {
                diesel::update(ticket_votes::table.filter(ticket_votes::id.eq(prior.id)))
                    .set(ticket_votes::vote_type.eq(vote_type))
                    .execute(conn)?;
                VoteOutcome::Recorded(vote_type)
            }
            None => {
                let row = TicketVote {
                    id: Uuid::new_v4(),
                    ticket_id,
                    user_id,
                    vote_type,
                    created_at: Utc::now(),
                };
                diesel::insert_into(ticket_votes::table)
                    .values(&row)
                    .on_conflict((ticket_votes::ticket_id, ticket_votes::user_id))
                    .do_update()
                    .set(ticket_votes::vote_type.eq(vote_type))
                    .execute(conn)?;
                VoteOutcome::Recorded(vote_type)
            }
        };

        recompute_vote_counts(conn, ticket_id)?;
        Ok(outcome)
    })
}

pub fn add_comment(
    conn: &mut PgConnection,
    config: &AppConfig,
    ticket: Ticket,
    content: String,
    comment_type: CommentType,
    is_internal: bool,
    actor: &User,
) -> Result<EngineOutcome<TicketComment>, ApiError> {
    conn.transaction(|conn| {
        let mut emails = Vec::new();

        // Staff replying publicly to an open ticket moves it to
        // in_progress through the regular update path, with its own
        // activity and notifications.
        let ticket = if matches!(actor.role, UserRole::Agent | UserRole::Admin)
            && !is_internal
            && ticket.status == TicketStatus::Open
        {
            let (ticket, status_emails) = apply_update(
                conn,
                config,
                ticket,
                TicketPatch::status_only(TicketStatus::InProgress),
                actor,
            )?;
            emails.extend(status_emails);
            ticket
        } else {
            ticket
        };

        let now = Utc::now();
        let comment = TicketComment {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            created_by: actor.id,
            comment_type,
            content,
            is_internal,
            created_at: now,
            updated_at: now,
        };
        diesel::insert_into(ticket_comments::table)
            .values(&comment)
            .execute(conn)?;

        append_activity(
            conn,
            ticket.id,
            actor.id,
            "comment_added",
            format!("Comment added by {}", actor.username),
            None,
            None,
        )?;

        let owner = load_user(conn, ticket.created_by)?;
        let assignee = match ticket.assigned_to {
            Some(id) => Some(load_user(conn, id)?),
            None => None,
        };
        let staff = active_staff(conn)?;

        let recipients: Vec<Uuid> = if is_internal {
            staff
                .iter()
                .filter(|u| u.id != actor.id)
                .map(|u| u.id)
                .collect()
        } else {
            let mut ids = Vec::new();
            if owner.id != actor.id {
                ids.push(owner.id);
            }
            if let Some(agent) = &assignee {
                if agent.id != actor.id {
                    ids.push(agent.id);
                }
            }
            ids
        };
        notifications::notify(
            conn,
            NotificationType::CommentAdded,
            &ticket,
            &recipients,
            &actor.display_name(),
        )?;

        if config.email_notifications_enabled {
            let email_recipients =
                comment_email_recipients(is_internal, &owner, assignee.as_ref(), &staff, actor.id);
            if !email_recipients.is_empty() {
                emails.push(comment_added_email(
                    config,
                    &ticket,
                    &actor.display_name(),
                    email_recipients,
                ));
            }
        }

        Ok(EngineOutcome {
            value: comment,
            emails,
        })
    })
}

/// Deleting a ticket removes every dependent row. The foreign keys cascade
/// as well; the explicit deletes keep the semantics visible and make the
/// operation work against databases restored without the constraints.
pub fn delete_ticket(conn: &mut PgConnection, ticket_id: Uuid) -> Result<(), ApiError> {
    conn.transaction(|conn| {
        use crate::shared::schema::notifications as notifs;

        let comment_ids: Vec<Uuid> = ticket_comments::table
            .filter(ticket_comments::ticket_id.eq(ticket_id))
            .select(ticket_comments::id)
            .load(conn)?;
        diesel::delete(
            ticket_attachments::table.filter(
                ticket_attachments::ticket_id
                    .eq(ticket_id)
                    .or(ticket_attachments::comment_id.eq_any(comment_ids)),
            ),
        )
        .execute(conn)?;
        diesel::delete(ticket_comments::table.filter(ticket_comments::ticket_id.eq(ticket_id)))
            .execute(conn)?;
        diesel::delete(ticket_votes::table.filter(ticket_votes::ticket_id.eq(ticket_id)))
            .execute(conn)?;
        diesel::delete(
            ticket_activities::table.filter(ticket_activities::ticket_id.eq(ticket_id)),
        )
        .execute(conn)?;
        diesel::delete(notifs::table.filter(notifs::ticket_id.eq(ticket_id))).execute(conn)?;
        let deleted =
            diesel::delete(tickets::table.filter(tickets::id.eq(ticket_id))).execute(conn)?;
        if deleted == 0 {
            return Err(ApiError::NotFound("Ticket"));
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ticket() -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            ticket_number: "TICK-001".into(),
            subject: "Cannot login".into(),
            description: "I cannot log in".into(),
            status: TicketStatus::Open,
            created_by: Uuid::new_v4(),
            assigned_to: None,
            category_id: Uuid::new_v4(),
            priority_id: Uuid::new_v4(),
            upvotes: 0,
            downvotes: 0,
            is_internal: false,
            tags: vec!["login".into()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
            resolved_at: None,
            closed_at: None,
        }
    }

    #[test]
    fn number_format_pads_to_three_digits_and_grows() {
        assert_eq!(format_ticket_number("TICK", 1), "TICK-001");
        assert_eq!(format_ticket_number("TICK", 42), "TICK-042");
        assert_eq!(format_ticket_number("TICK", 999), "TICK-999");
        assert_eq!(format_ticket_number("TICK", 1000), "TICK-1000");
    }

    #[test]
    fn diff_of_identical_values_is_empty() {
        let t = ticket();
        let patch = TicketPatch {
            subject: Some(t.subject.clone()),
            description: Some(t.description.clone()),
            status: Some(t.status),
            category_id: Some(t.category_id),
            priority_id: Some(t.priority_id),
            tags: Some(t.tags.clone()),
        };
        assert_eq!(diff(&t, &patch), Vec::new());
    }

    #[test]
    fn diff_reports_only_changed_fields() {
        let t = ticket();
        let patch = TicketPatch {
            subject: Some("Cannot login anymore".into()),
            status: Some(TicketStatus::InProgress),
            ..TicketPatch::default()
        };
        let changes = diff(&t, &patch);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "subject");
        assert_eq!(changes[0].old.as_deref(), Some("Cannot login"));
        assert_eq!(changes[1].field, "status");
        assert_eq!(changes[1].old.as_deref(), Some("open"));
        assert_eq!(changes[1].new.as_deref(), Some("in_progress"));
    }

    #[test]
    fn diff_treats_empty_strings_as_absent() {
        let mut t = ticket();
        t.tags = vec![];
        let patch = TicketPatch {
            tags: Some(vec!["vpn".into()]),
            ..TicketPatch::default()
        };
        let changes = diff(&t, &patch);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old, None);
        assert_eq!(changes[0].new.as_deref(), Some("vpn"));
    }

    #[test]
    fn tally_counts_by_type() {
        use VoteType::*;
        assert_eq!(tally(&[Up, Up, Down]), (2, 1));
        assert_eq!(tally(&[]), (0, 0));
        assert_eq!(tally(&[Down]), (0, 1));
    }

    #[test]
    fn humanized_field_names() {
        assert_eq!(humanize_field("priority"), "Priority");
        assert_eq!(humanize_field("assigned_to"), "Assigned To");
    }
}
