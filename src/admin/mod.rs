//! Administrative user management and platform stats.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::auth::policy::{role_allows, Action};
use crate::auth::AuthenticatedUser;
use crate::shared::enums::{TicketStatus, UserRole};
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::models::User;
use crate::shared::schema::{categories, priorities, tickets, users};
use crate::shared::state::AppState;

fn require_user_admin(user: &AuthenticatedUser) -> ApiResult<()> {
    if role_allows(user.role(), Action::ManageUsers) {
        Ok(())
    } else {
        Err(ApiError::permission_denied())
    }
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: UserRole,
}

#[derive(Debug, Serialize)]
pub struct AdminStats {
    pub total_users: i64,
    pub active_users: i64,
    pub total_tickets: i64,
    pub tickets_this_week: i64,
    pub tickets_by_status: HashMap<String, i64>,
    pub tickets_by_category: HashMap<String, i64>,
    pub tickets_by_priority: HashMap<String, i64>,
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListUsersQuery>,
) -> ApiResult<Json<Vec<User>>> {
    require_user_admin(&user)?;
    let mut conn = state.conn.get()?;

    let mut q = users::table.into_boxed();
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            users::username
                .ilike(pattern.clone())
                .or(users::email.ilike(pattern.clone()))
                .or(users::first_name.ilike(pattern.clone()))
                .or(users::last_name.ilike(pattern)),
        );
    }
    if let Some(role) = query.role {
        q = q.filter(users::role.eq(role));
    }
    if let Some(is_active) = query.is_active {
        q = q.filter(users::is_active.eq(is_active));
    }

    let rows: Vec<User> = q.order(users::username.asc()).load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn toggle_active(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    require_user_admin(&user)?;
    if id == user.id() {
        return Err(ApiError::Validation(
            "You cannot deactivate your own account".into(),
        ));
    }

    let mut conn = state.conn.get()?;
    let target: User = users::table
        .filter(users::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("User"))?;

    let now_active = !target.is_active;
    diesel::update(users::table.filter(users::id.eq(id)))
        .set((
            users::is_active.eq(now_active),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    info!(target = %target.username, active = now_active, "user toggled");
    let verb = if now_active { "activated" } else { "deactivated" };
    Ok(Json(json!({
        "message": format!("User {} {}", target.username, verb),
        "is_active": now_active,
    })))
}

pub async fn change_role(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeRoleRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_user_admin(&user)?;
    if id == user.id() {
        return Err(ApiError::Validation(
            "You cannot change your own role".into(),
        ));
    }

    let mut conn = state.conn.get()?;
    let target: User = users::table
        .filter(users::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("User"))?;

    diesel::update(users::table.filter(users::id.eq(id)))
        .set((
            users::role.eq(req.role),
            users::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;

    info!(target = %target.username, role = %req.role, "role changed");
    Ok(Json(json!({
        "message": format!("User {} role changed to {}", target.username, req.role),
        "role": req.role,
    })))
}

pub async fn admin_stats(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> ApiResult<Json<AdminStats>> {
    if !role_allows(user.role(), Action::ViewAdminStats) {
        return Err(ApiError::permission_denied());
    }
    let mut conn = state.conn.get()?;

    let total_users: i64 = users::table.count().get_result(&mut conn)?;
    let active_users: i64 = users::table
        .filter(users::is_active.eq(true))
        .count()
        .get_result(&mut conn)?;
    let total_tickets: i64 = tickets::table.count().get_result(&mut conn)?;
    let week_ago = Utc::now() - chrono::Duration::days(7);
    let tickets_this_week: i64 = tickets::table
        .filter(tickets::created_at.ge(week_ago))
        .count()
        .get_result(&mut conn)?;

    let by_status: Vec<(TicketStatus, i64)> = tickets::table
        .group_by(tickets::status)
        .select((tickets::status, count_star()))
        .load(&mut conn)?;
    let tickets_by_status = by_status
        .into_iter()
        .map(|(status, n)| (status.as_str().to_string(), n))
        .collect();

    let category_names: HashMap<Uuid, String> = categories::table
        .select((categories::id, categories::name))
        .load::<(Uuid, String)>(&mut conn)?
        .into_iter()
        .collect();
    let by_category: Vec<(Uuid, i64)> = tickets::table
        .group_by(tickets::category_id)
        .select((tickets::category_id, count_star()))
        .load(&mut conn)?;
    let tickets_by_category = by_category
        .into_iter()
        .map(|(id, n)| {
            let name = category_names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| id.to_string());
            (name, n)
        })
        .collect();

    let priority_names: HashMap<Uuid, String> = priorities::table
        .select((priorities::id, priorities::name))
        .load::<(Uuid, String)>(&mut conn)?
        .into_iter()
        .collect();
    let by_priority: Vec<(Uuid, i64)> = tickets::table
        .group_by(tickets::priority_id)
        .select((tickets::priority_id, count_star()))
        .load(&mut conn)?;
    let tickets_by_priority = by_priority
        .into_iter()
        .map(|(id, n)| {
            let name = priority_names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| id.to_string());
            (name, n)
        })
        .collect();

    Ok(Json(AdminStats {
        total_users,
        active_users,
        total_tickets,
        tickets_this_week,
        tickets_by_status,
        tickets_by_category,
        tickets_by_priority,
    }))
}

pub fn configure_admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id/toggle_active", post(toggle_active))
        .route("/api/admin/users/:id/change_role", post(change_role))
        .route("/api/admin/stats", get(admin_stats))
}
