//! Notification dispatcher.
//!
//! Translates ticket engine events into persisted in-app notification rows
//! and rendered emails. In-app rows are written inside the caller's
//! transaction: if that write fails the whole operation fails. Email is
//! rendered here but delivered after commit, best-effort, by the `email`
//! module.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::config::AppConfig;
use crate::email::OutgoingEmail;
use crate::shared::enums::NotificationType;
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::models::{Notification, Ticket, User};
use crate::shared::schema::notifications;
use crate::shared::state::AppState;

// ============================================================================
// Templates
// ============================================================================

pub fn notification_title(kind: NotificationType, ticket: &Ticket) -> String {
    match kind {
        NotificationType::TicketCreated => {
            format!("New ticket created: {}", ticket.ticket_number)
        }
        NotificationType::TicketAssigned => {
            format!("Ticket assigned to you: {}", ticket.ticket_number)
        }
        NotificationType::TicketUpdated => format!("Ticket updated: {}", ticket.ticket_number),
        NotificationType::StatusChanged => {
            format!("Ticket status changed: {}", ticket.ticket_number)
        }
        NotificationType::CommentAdded => {
            format!("New comment on ticket: {}", ticket.ticket_number)
        }
    }
}

pub fn notification_message(kind: NotificationType, ticket: &Ticket, actor_name: &str) -> String {
    match kind {
        NotificationType::TicketCreated => format!(
            "A new ticket '{}' has been created by {}",
            ticket.subject, actor_name
        ),
        NotificationType::TicketAssigned => {
            format!("The ticket '{}' has been assigned to you", ticket.subject)
        }
        NotificationType::TicketUpdated => {
            format!("The ticket '{}' has been updated", ticket.subject)
        }
        NotificationType::StatusChanged => format!(
            "The status of ticket '{}' has been changed to {}",
            ticket.subject,
            ticket.status.display_name()
        ),
        NotificationType::CommentAdded => format!(
            "{} added a comment to '{}'",
            actor_name, ticket.subject
        ),
    }
}

// ============================================================================
// In-app dispatch (same unit of work as the triggering mutation)
// ============================================================================

/// Persist one in-app notification per recipient for a ticket event.
pub fn notify(
    conn: &mut PgConnection,
    kind: NotificationType,
    ticket: &Ticket,
    recipients: &[Uuid],
    actor_name: &str,
) -> QueryResult<()> {
    if recipients.is_empty() {
        return Ok(());
    }
    let now = Utc::now();
    let rows: Vec<Notification> = recipients
        .iter()
        .map(|user_id| Notification {
            id: Uuid::new_v4(),
            user_id: *user_id,
            ticket_id: ticket.id,
            notification_type: kind,
            title: notification_title(kind, ticket),
            message: notification_message(kind, ticket, actor_name),
            is_read: false,
            created_at: now,
        })
        .collect();
    diesel::insert_into(notifications::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

// ============================================================================
// Email rendering + recipient rules
// ============================================================================

fn wants_email(user: &User) -> bool {
    user.email_notifications && !user.email.is_empty()
}

/// Creation fan-out: the owner, plus every active opted-in agent while the
/// ticket is unassigned, or just the assignee once it has one.
pub fn created_email_recipients(
    owner: &User,
    assignee: Option<&User>,
    active_agents: &[User],
) -> Vec<String> {
    let mut recipients = Vec::new();
    if wants_email(owner) {
        recipients.push(owner.email.clone());
    }
    match assignee {
        None => {
            recipients.extend(active_agents.iter().filter(|a| wants_email(a)).map(|a| a.email.clone()));
        }
        Some(agent) => {
            if wants_email(agent) {
                recipients.push(agent.email.clone());
            }
        }
    }
    recipients
}

/// Update fan-out: owner and assignee, minus whoever made the change.
pub fn updated_email_recipients(
    owner: &User,
    assignee: Option<&User>,
    actor_id: Uuid,
) -> Vec<String> {
    let mut recipients = Vec::new();
    if owner.id != actor_id && wants_email(owner) {
        recipients.push(owner.email.clone());
    }
    if let Some(agent) = assignee {
        if agent.id != actor_id && wants_email(agent) {
            recipients.push(agent.email.clone());
        }
    }
    recipients
}

/// Comment fan-out: internal comments go to staff only; public comments go
/// to the owner and assignee. The commenter never mails themselves.
pub fn comment_email_recipients(
    is_internal: bool,
    owner: &User,
    assignee: Option<&User>,
    active_staff: &[User],
    actor_id: Uuid,
) -> Vec<String> {
    if is_internal {
        active_staff
            .iter()
            .filter(|u| u.id != actor_id && wants_email(u))
            .map(|u| u.email.clone())
            .collect()
    } else {
        updated_email_recipients(owner, assignee, actor_id)
    }
}

fn ticket_email(
    config: &AppConfig,
    subject: String,
    lead: &str,
    ticket: &Ticket,
    recipients: Vec<String>,
) -> OutgoingEmail {
    let link = format!("{}/tickets/{}", config.site_url, ticket.id);
    let plain_body = format!(
        "{lead}\n\nTicket: {} - {}\nStatus: {}\n\nView it at {link}\n\n-- {}",
        ticket.ticket_number,
        ticket.subject,
        ticket.status.display_name(),
        config.site_name,
    );
    let html_body = format!(
        "<p>{lead}</p>\
         <p><strong>{} - {}</strong><br>Status: {}</p>\
         <p><a href=\"{link}\">View ticket</a></p>\
         <p>-- {}</p>",
        ticket.ticket_number,
        ticket.subject,
        ticket.status.display_name(),
        config.site_name,
    );
    OutgoingEmail {
        subject,
        plain_body,
        html_body,
        recipients,
    }
}

pub fn ticket_created_email(
    config: &AppConfig,
    ticket: &Ticket,
    recipients: Vec<String>,
) -> OutgoingEmail {
    ticket_email(
        config,
        format!(
            "New Ticket Created: {} - {}",
            ticket.ticket_number, ticket.subject
        ),
        "A new support ticket has been created.",
        ticket,
        recipients,
    )
}

pub fn ticket_updated_email(
    config: &AppConfig,
    ticket: &Ticket,
    actor_name: &str,
    recipients: Vec<String>,
) -> OutgoingEmail {
    ticket_email(
        config,
        format!(
            "Ticket Updated: {} - {}",
            ticket.ticket_number, ticket.subject
        ),
        &format!("The ticket has been updated by {actor_name}."),
        ticket,
        recipients,
    )
}

pub fn comment_added_email(
    config: &AppConfig,
    ticket: &Ticket,
    actor_name: &str,
    recipients: Vec<String>,
) -> OutgoingEmail {
    ticket_email(
        config,
        format!("New Comment on Ticket: {}", ticket.ticket_number),
        &format!("{actor_name} added a comment."),
        ticket,
        recipients,
    )
}

// ============================================================================
// Endpoints
// ============================================================================

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<Vec<Notification>>> {
    let mut conn = state.conn.get()?;
    let rows: Vec<Notification> = notifications::table
        .filter(notifications::user_id.eq(user.id()))
        .order(notifications::created_at.desc())
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut conn = state.conn.get()?;
    let updated = diesel::update(
        notifications::table
            .filter(notifications::id.eq(id))
            .filter(notifications::user_id.eq(user.id())),
    )
    .set(notifications::is_read.eq(true))
    .execute(&mut conn)?;
    if updated == 0 {
        return Err(ApiError::NotFound("Notification"));
    }
    Ok(Json(json!({ "message": "Notification marked as read" })))
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<serde_json::Value>> {
    let mut conn = state.conn.get()?;
    let count = diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user.id()))
            .filter(notifications::is_read.eq(false)),
    )
    .set(notifications::is_read.eq(true))
    .execute(&mut conn)?;
    Ok(Json(json!({
        "message": format!("{count} notifications marked as read")
    })))
}

pub fn configure_notification_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/:id/mark_read", post(mark_read))
        .route("/api/notifications/mark_all_read", post(mark_all_read))
}
