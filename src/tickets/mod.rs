pub mod engine;
pub mod visibility;

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::auth::policy::{self, Action, TransitionDenied};
use crate::auth::AuthenticatedUser;
use crate::email;
use crate::shared::enums::{CommentType, TicketStatus, UserRole, VoteType};
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::models::{Ticket, TicketActivity, TicketAttachment, TicketComment, User};
use crate::shared::schema::{
    priorities, ticket_activities, ticket_attachments, ticket_comments, tickets, users,
};
use crate::shared::state::AppState;

use engine::{EngineOutcome, NewTicketInput, TicketPatch, VoteOutcome};
use visibility::{can_view, can_view_comment, scope};

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub description: String,
    pub category_id: Uuid,
    pub priority_id: Uuid,
    pub tags: Option<Vec<String>>,
    pub is_internal: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub category_id: Option<Uuid>,
    pub priority_id: Option<Uuid>,
    pub tags: Option<Vec<String>>,
}

impl From<UpdateTicketRequest> for TicketPatch {
    fn from(req: UpdateTicketRequest) -> Self {
        Self {
            subject: req.subject,
            description: req.description,
            status: req.status,
            category_id: req.category_id,
            priority_id: req.priority_id,
            tags: req.tags,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignTicketRequest {
    pub agent_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TicketStatus,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote_type: VoteType,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    pub comment_type: Option<CommentType>,
    pub is_internal: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub category: Option<Uuid>,
    pub priority: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub status: Option<String>,
    pub category: Option<Uuid>,
    pub priority: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub my_tickets: Option<bool>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub sort_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TicketDetail {
    pub ticket: Ticket,
    pub comments: Vec<TicketComment>,
    pub activities: Vec<TicketActivity>,
    pub attachments: Vec<TicketAttachment>,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub total_tickets: i64,
    pub open_tickets: i64,
    pub in_progress_tickets: i64,
    pub resolved_tickets: i64,
    pub closed_tickets: i64,
    pub urgent_tickets: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_tickets: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_tickets: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unassigned_tickets: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_resolution_time: Option<String>,
}

fn load_visible_ticket(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    id: Uuid,
) -> ApiResult<Ticket> {
    let ticket: Ticket = tickets::table
        .filter(tickets::id.eq(id))
        .first(conn)
        .optional()?
        .ok_or(ApiError::NotFound("Ticket"))?;
    // Invisible and nonexistent are indistinguishable to the caller.
    if !can_view(user.role(), user.id(), &ticket) {
        return Err(ApiError::NotFound("Ticket"));
    }
    Ok(ticket)
}

fn parse_status(raw: &str) -> ApiResult<TicketStatus> {
    raw.parse()
        .map_err(|_| ApiError::Validation("Invalid status".into()))
}

// ============================================================================
// Ticket CRUD
// ============================================================================

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Ticket>>> {
    let mut conn = state.conn.get()?;

    let mut q = scope(user.role(), user.id());
    if let Some(status) = query.status {
        q = q.filter(tickets::status.eq(parse_status(&status)?));
    }
    if let Some(category) = query.category {
        q = q.filter(tickets::category_id.eq(category));
    }
    if let Some(priority) = query.priority {
        q = q.filter(tickets::priority_id.eq(priority));
    }
    if let Some(assigned_to) = query.assigned_to {
        q = q.filter(tickets::assigned_to.eq(assigned_to));
    }
    if let Some(created_by) = query.created_by {
        q = q.filter(tickets::created_by.eq(created_by));
    }

    let rows: Vec<Ticket> = q
        .order(tickets::created_at.desc())
        .limit(query.limit.unwrap_or(50))
        .offset(query.offset.unwrap_or(0))
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateTicketRequest>,
) -> ApiResult<Json<Ticket>> {
    if req.subject.trim().is_empty() {
        return Err(ApiError::Validation("Subject is required".into()));
    }
    if req.description.trim().is_empty() {
        return Err(ApiError::Validation("Description is required".into()));
    }

    let mut conn = state.conn.get()?;
    let EngineOutcome { value, emails } = engine::create_ticket(
        &mut conn,
        &state.config,
        NewTicketInput {
            subject: req.subject,
            description: req.description,
            category_id: req.category_id,
            priority_id: req.priority_id,
            tags: req.tags.unwrap_or_default(),
            is_internal: req.is_internal.unwrap_or(false),
        },
        &user.0,
    )?;
    email::deliver(state.mailer.clone(), emails);
    Ok(Json(value))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TicketDetail>> {
    let mut conn = state.conn.get()?;
    let ticket = load_visible_ticket(&mut conn, &user, id)?;

    let comments: Vec<TicketComment> = ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(id))
        .order(ticket_comments::created_at.asc())
        .load(&mut conn)?;
    let comments = comments
        .into_iter()
        .filter(|c| can_view_comment(user.role(), c))
        .collect();

    let activities: Vec<TicketActivity> = ticket_activities::table
        .filter(ticket_activities::ticket_id.eq(id))
        .order(ticket_activities::created_at.desc())
        .load(&mut conn)?;

    let attachments: Vec<TicketAttachment> = ticket_attachments::table
        .filter(ticket_attachments::ticket_id.eq(id))
        .order(ticket_attachments::created_at.asc())
        .load(&mut conn)?;

    Ok(Json(TicketDetail {
        ticket,
        comments,
        activities,
        attachments,
    }))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTicketRequest>,
) -> ApiResult<Json<Ticket>> {
    let mut conn = state.conn.get()?;
    let ticket = load_visible_ticket(&mut conn, &user, id)?;

    if !policy::can_modify_ticket(user.role(), user.id(), &ticket) {
        return Err(ApiError::permission_denied());
    }
    if let Some(target) = req.status {
        check_transition(&user, &ticket, target)?;
    }

    let EngineOutcome { value, emails } =
        engine::update_ticket(&mut conn, &state.config, ticket, req.into(), &user.0)?;
    email::deliver(state.mailer.clone(), emails);
    Ok(Json(value))
}

pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut conn = state.conn.get()?;
    let ticket = load_visible_ticket(&mut conn, &user, id)?;
    if !policy::can_modify_ticket(user.role(), user.id(), &ticket) {
        return Err(ApiError::permission_denied());
    }

    engine::delete_ticket(&mut conn, id)?;
    info!(ticket = %ticket.ticket_number, actor = %user.0.username, "ticket deleted");
    Ok(Json(json!({ "message": "Ticket deleted" })))
}

// ============================================================================
// Lifecycle actions
// ============================================================================

pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTicketRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if !policy::role_allows(user.role(), Action::AssignTicket) {
        return Err(ApiError::permission_denied());
    }

    let mut conn = state.conn.get()?;
    let ticket = load_visible_ticket(&mut conn, &user, id)?;

    // The engine's agent-role contract is enforced here.
    let agent: User = users::table
        .filter(users::id.eq(req.agent_id))
        .filter(users::role.eq(UserRole::Agent))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("Agent"))?;

    engine::assign_ticket(&mut conn, &state.config, ticket, &agent, &user.0)?;
    Ok(Json(json!({
        "message": format!("Ticket assigned to {}", agent.username)
    })))
}

fn check_transition(
    user: &AuthenticatedUser,
    ticket: &Ticket,
    target: TicketStatus,
) -> ApiResult<()> {
    match policy::can_transition(user.role(), user.id(), ticket, target) {
        Ok(()) => Ok(()),
        Err(TransitionDenied::NotOwner) => Err(ApiError::permission_denied()),
        Err(TransitionDenied::StatusNotPermitted) => Err(ApiError::Permission(
            "Customers can only close or reopen tickets".into(),
        )),
    }
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut conn = state.conn.get()?;
    let ticket = load_visible_ticket(&mut conn, &user, id)?;
    check_transition(&user, &ticket, req.status)?;

    let old_status = ticket.status;
    let EngineOutcome { value, emails } = engine::update_ticket(
        &mut conn,
        &state.config,
        ticket,
        TicketPatch::status_only(req.status),
        &user.0,
    )?;
    email::deliver(state.mailer.clone(), emails);

    Ok(Json(json!({
        "message": format!(
            "Ticket status updated from {} to {}",
            old_status, value.status
        ),
        "status": value.status,
    })))
}

pub async fn vote_ticket(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut conn = state.conn.get()?;
    let ticket = load_visible_ticket(&mut conn, &user, id)?;

    let outcome = engine::vote(&mut conn, ticket.id, user.id(), req.vote_type)?;
    let message = match outcome {
        VoteOutcome::Removed => "Vote removed".to_string(),
        VoteOutcome::Recorded(VoteType::Up) => "Upvote recorded".to_string(),
        VoteOutcome::Recorded(VoteType::Down) => "Downvote recorded".to_string(),
    };
    Ok(Json(json!({ "message": message })))
}

// ============================================================================
// Comments
// ============================================================================

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<TicketComment>>> {
    let mut conn = state.conn.get()?;
    load_visible_ticket(&mut conn, &user, id)?;

    let mut q = ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(id))
        .into_boxed();
    if user.role() == UserRole::Customer {
        q = q.filter(ticket_comments::is_internal.eq(false));
    }
    let comments: Vec<TicketComment> = q.order(ticket_comments::created_at.asc()).load(&mut conn)?;
    Ok(Json(comments))
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<Json<TicketComment>> {
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation("Content is required".into()));
    }
    let is_internal = req.is_internal.unwrap_or(false);
    if is_internal && !user.is_agent_or_admin() {
        return Err(ApiError::permission_denied());
    }

    let mut conn = state.conn.get()?;
    let ticket = load_visible_ticket(&mut conn, &user, id)?;

    let EngineOutcome { value, emails } = engine::add_comment(
        &mut conn,
        &state.config,
        ticket,
        req.content,
        req.comment_type.unwrap_or_default(),
        is_internal,
        &user.0,
    )?;
    email::deliver(state.mailer.clone(), emails);
    Ok(Json(value))
}

// ============================================================================
// Attachments
// ============================================================================

pub async fn list_attachments(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<TicketAttachment>>> {
    let mut conn = state.conn.get()?;
    load_visible_ticket(&mut conn, &user, id)?;

    let attachments: Vec<TicketAttachment> = ticket_attachments::table
        .filter(ticket_attachments::ticket_id.eq(id))
        .order(ticket_attachments::created_at.asc())
        .load(&mut conn)?;
    Ok(Json(attachments))
}

pub async fn upload_attachment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<Json<TicketAttachment>> {
    let mut conn = state.conn.get()?;
    load_visible_ticket(&mut conn, &user, id)?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid upload: {e}")))?
        .ok_or_else(|| ApiError::Validation("File is required".into()))?;

    let original_filename = field.file_name().unwrap_or("upload").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid upload: {e}")))?;

    let attachment = TicketAttachment {
        id: Uuid::new_v4(),
        ticket_id: Some(id),
        comment_id: None,
        stored_name: format!("{}-{}", Uuid::new_v4(), original_filename),
        original_filename,
        file_size: bytes.len() as i64,
        content_type,
        uploaded_by: user.id(),
        created_at: Utc::now(),
    };
    if !attachment.parent_is_valid() {
        return Err(ApiError::Validation(
            "Attachment must be linked to either a ticket or comment".into(),
        ));
    }

    tokio::fs::create_dir_all(&state.config.attachments_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("attachment storage: {e}")))?;
    let path = std::path::Path::new(&state.config.attachments_dir).join(&attachment.stored_name);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("attachment storage: {e}")))?;

    diesel::insert_into(ticket_attachments::table)
        .values(&attachment)
        .execute(&mut conn)?;
    Ok(Json(attachment))
}

// ============================================================================
// Search
// ============================================================================

pub async fn search_tickets(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<Ticket>>> {
    let mut conn = state.conn.get()?;

    let mut q = scope(user.role(), user.id());
    if let Some(text) = query.q {
        let pattern = format!("%{text}%");
        q = q.filter(
            tickets::subject
                .ilike(pattern.clone())
                .or(tickets::description.ilike(pattern.clone()))
                .or(tickets::ticket_number.ilike(pattern)),
        );
    }
    if let Some(status) = query.status {
        q = q.filter(tickets::status.eq(parse_status(&status)?));
    }
    if let Some(category) = query.category {
        q = q.filter(tickets::category_id.eq(category));
    }
    if let Some(priority) = query.priority {
        q = q.filter(tickets::priority_id.eq(priority));
    }
    if let Some(assigned_to) = query.assigned_to {
        q = q.filter(tickets::assigned_to.eq(assigned_to));
    }
    if let Some(created_by) = query.created_by {
        q = q.filter(tickets::created_by.eq(created_by));
    }
    if query.my_tickets.unwrap_or(false) {
        q = q.filter(tickets::created_by.eq(user.id()));
    }
    if let Some(from) = query.date_from {
        q = q.filter(tickets::created_at.ge(from));
    }
    if let Some(to) = query.date_to {
        q = q.filter(tickets::created_at.le(to));
    }

    q = match query.sort_by.as_deref().unwrap_or("-created_at") {
        "created_at" => q.order(tickets::created_at.asc()),
        "updated_at" => q.order(tickets::updated_at.asc()),
        "-updated_at" => q.order(tickets::updated_at.desc()),
        "status" => q.order(tickets::status.asc()),
        _ => q.order(tickets::created_at.desc()),
    };

    let rows: Vec<Ticket> = q.load(&mut conn)?;
    Ok(Json(rows))
}

// ============================================================================
// Dashboard
// ============================================================================

fn count_with_status(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    status: TicketStatus,
) -> QueryResult<i64> {
    scope(user.role(), user.id())
        .filter(tickets::status.eq(status))
        .count()
        .get_result(conn)
}

pub async fn dashboard_stats(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<DashboardStats>> {
    let mut conn = state.conn.get()?;

    let total_tickets: i64 = scope(user.role(), user.id()).count().get_result(&mut conn)?;
    let open_tickets = count_with_status(&mut conn, &user, TicketStatus::Open)?;
    let in_progress_tickets = count_with_status(&mut conn, &user, TicketStatus::InProgress)?;
    let resolved_tickets = count_with_status(&mut conn, &user, TicketStatus::Resolved)?;
    let closed_tickets = count_with_status(&mut conn, &user, TicketStatus::Closed)?;

    let urgent_ids: Vec<Uuid> = priorities::table
        .filter(priorities::name.eq("urgent").or(priorities::level.ge(4)))
        .select(priorities::id)
        .load(&mut conn)?;
    let urgent_tickets: i64 = scope(user.role(), user.id())
        .filter(tickets::priority_id.eq_any(urgent_ids))
        .count()
        .get_result(&mut conn)?;

    let mut stats = DashboardStats {
        total_tickets,
        open_tickets,
        in_progress_tickets,
        resolved_tickets,
        closed_tickets,
        urgent_tickets,
        my_tickets: None,
        assigned_tickets: None,
        unassigned_tickets: None,
        avg_resolution_time: None,
    };

    match user.role() {
        UserRole::Customer => {
            stats.my_tickets = Some(total_tickets);
        }
        UserRole::Agent => {
            stats.assigned_tickets = Some(
                scope(user.role(), user.id())
                    .filter(tickets::assigned_to.eq(user.id()))
                    .count()
                    .get_result(&mut conn)?,
            );
            stats.unassigned_tickets = Some(
                scope(user.role(), user.id())
                    .filter(tickets::assigned_to.is_null())
                    .count()
                    .get_result(&mut conn)?,
            );
            stats.my_tickets = Some(
                tickets::table
                    .filter(tickets::created_by.eq(user.id()))
                    .count()
                    .get_result(&mut conn)?,
            );
        }
        UserRole::Admin => {}
    }

    if user.is_agent_or_admin() {
        let resolved: Vec<(DateTime<Utc>, Option<DateTime<Utc>>)> = scope(user.role(), user.id())
            .filter(tickets::resolved_at.is_not_null())
            .select((tickets::created_at, tickets::resolved_at))
            .load(&mut conn)?;
        stats.avg_resolution_time = average_resolution(&resolved);
    }

    Ok(Json(stats))
}

fn average_resolution(rows: &[(DateTime<Utc>, Option<DateTime<Utc>>)]) -> Option<String> {
    let durations: Vec<f64> = rows
        .iter()
        .filter_map(|(created, resolved)| {
            resolved.map(|r| (r - *created).num_seconds() as f64 / 3600.0)
        })
        .collect();
    if durations.is_empty() {
        return None;
    }
    let avg = durations.iter().sum::<f64>() / durations.len() as f64;
    Some(format!("{avg:.1}h"))
}

pub fn configure_ticket_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/search", get(search_tickets))
        .route(
            "/api/tickets/:id",
            get(get_ticket)
                .put(update_ticket)
                .patch(update_ticket)
                .delete(delete_ticket),
        )
        .route("/api/tickets/:id/assign", post(assign_ticket))
        .route("/api/tickets/:id/update_status", post(update_status))
        .route("/api/tickets/:id/vote", post(vote_ticket))
        .route(
            "/api/tickets/:id/comments",
            get(list_comments).post(add_comment),
        )
        .route(
            "/api/tickets/:id/attachments",
            get(list_attachments).post(upload_attachment),
        )
        .route("/api/dashboard/stats", get(dashboard_stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn average_resolution_formats_hours() {
        let created = Utc::now();
        let rows = vec![
            (created, Some(created + Duration::hours(2))),
            (created, Some(created + Duration::hours(4))),
            (created, None),
        ];
        assert_eq!(average_resolution(&rows).as_deref(), Some("3.0h"));
        assert_eq!(average_resolution(&[]), None);
    }

    #[test]
    fn invalid_status_filter_is_a_validation_error() {
        assert!(parse_status("open").is_ok());
        assert!(matches!(
            parse_status("pending"),
            Err(ApiError::Validation(_))
        ));
    }
}
