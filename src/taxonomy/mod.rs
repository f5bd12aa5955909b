//! Category and priority administration.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::policy::{role_allows, Action};
use crate::auth::AuthenticatedUser;
use crate::shared::error::{ApiError, ApiResult};
use crate::shared::models::{Category, Priority};
use crate::shared::schema::{categories, priorities, tickets};
use crate::shared::state::AppState;

fn require_taxonomy_admin(user: &AuthenticatedUser) -> ApiResult<()> {
    if role_allows(user.role(), Action::ManageTaxonomy) {
        Ok(())
    } else {
        Err(ApiError::permission_denied())
    }
}

#[derive(Debug, Deserialize)]
pub struct ListCategoriesQuery {
    pub include_inactive: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePriorityRequest {
    pub name: String,
    pub level: i32,
    pub color: Option<String>,
}

const DEFAULT_CATEGORY_COLOR: &str = "#3B82F6";
const DEFAULT_PRIORITY_COLOR: &str = "#6B7280";

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Query(query): Query<ListCategoriesQuery>,
) -> ApiResult<Json<Vec<Category>>> {
    let mut conn = state.conn.get()?;

    // Inactive categories stay visible to staff so old tickets resolve.
    let include_inactive =
        query.include_inactive.unwrap_or(false) && user.is_agent_or_admin();

    let mut q = categories::table.into_boxed();
    if !include_inactive {
        q = q.filter(categories::is_active.eq(true));
    }
    let rows: Vec<Category> = q.order(categories::name.asc()).load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreateCategoryRequest>,
) -> ApiResult<Json<Category>> {
    require_taxonomy_admin(&user)?;
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("Name is required".into()));
    }

    let mut conn = state.conn.get()?;
    let taken: i64 = categories::table
        .filter(categories::name.eq(&req.name))
        .count()
        .get_result(&mut conn)?;
    if taken > 0 {
        return Err(ApiError::Validation("Category name already exists".into()));
    }

    let now = Utc::now();
    let category = Category {
        id: Uuid::new_v4(),
        name: req.name,
        description: req.description.unwrap_or_default(),
        color: req.color.unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
        is_active: true,
        created_by: user.id(),
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(categories::table)
        .values(&category)
        .execute(&mut conn)?;
    Ok(Json(category))
}

pub async fn get_category(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Category>> {
    let mut conn = state.conn.get()?;
    let category: Category = categories::table
        .filter(categories::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("Category"))?;
    Ok(Json(category))
}

pub async fn update_category(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCategoryRequest>,
) -> ApiResult<Json<Category>> {
    require_taxonomy_admin(&user)?;

    let mut conn = state.conn.get()?;
    let mut category: Category = categories::table
        .filter(categories::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("Category"))?;

    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("Name cannot be empty".into()));
        }
        category.name = name;
    }
    if let Some(description) = req.description {
        category.description = description;
    }
    if let Some(color) = req.color {
        category.color = color;
    }
    if let Some(is_active) = req.is_active {
        category.is_active = is_active;
    }
    category.updated_at = Utc::now();

    diesel::update(categories::table.filter(categories::id.eq(id)))
        .set(&category)
        .execute(&mut conn)?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    require_taxonomy_admin(&user)?;

    let mut conn = state.conn.get()?;
    let in_use: i64 = tickets::table
        .filter(tickets::category_id.eq(id))
        .count()
        .get_result(&mut conn)?;
    if in_use > 0 {
        return Err(ApiError::Validation(
            "Category is in use and cannot be deleted".into(),
        ));
    }

    let deleted =
        diesel::delete(categories::table.filter(categories::id.eq(id))).execute(&mut conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Category"));
    }
    Ok(Json(json!({ "message": "Category deleted" })))
}

pub async fn list_priorities(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
) -> ApiResult<Json<Vec<Priority>>> {
    let mut conn = state.conn.get()?;
    let rows: Vec<Priority> = priorities::table
        .order(priorities::level.asc())
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn create_priority(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreatePriorityRequest>,
) -> ApiResult<Json<Priority>> {
    require_taxonomy_admin(&user)?;
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("Name is required".into()));
    }
    if !(1..=4).contains(&req.level) {
        return Err(ApiError::Validation(
            "Level must be between 1 and 4".into(),
        ));
    }

    let mut conn = state.conn.get()?;
    let taken: i64 = priorities::table
        .filter(
            priorities::name
                .eq(&req.name)
                .or(priorities::level.eq(req.level)),
        )
        .count()
        .get_result(&mut conn)?;
    if taken > 0 {
        return Err(ApiError::Validation(
            "Priority name or level already exists".into(),
        ));
    }

    let priority = Priority {
        id: Uuid::new_v4(),
        name: req.name,
        level: req.level,
        color: req.color.unwrap_or_else(|| DEFAULT_PRIORITY_COLOR.to_string()),
        created_at: Utc::now(),
    };
    diesel::insert_into(priorities::table)
        .values(&priority)
        .execute(&mut conn)?;
    Ok(Json(priority))
}

pub async fn get_priority(
    State(state): State<Arc<AppState>>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Priority>> {
    let mut conn = state.conn.get()?;
    let priority: Priority = priorities::table
        .filter(priorities::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("Priority"))?;
    Ok(Json(priority))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriorityRequest {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// Levels are fixed once created; renames and recolors only.
pub async fn update_priority(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePriorityRequest>,
) -> ApiResult<Json<Priority>> {
    require_taxonomy_admin(&user)?;

    let mut conn = state.conn.get()?;
    let mut priority: Priority = priorities::table
        .filter(priorities::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("Priority"))?;

    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("Name cannot be empty".into()));
        }
        priority.name = name;
    }
    if let Some(color) = req.color {
        priority.color = color;
    }

    diesel::update(priorities::table.filter(priorities::id.eq(id)))
        .set((
            priorities::name.eq(&priority.name),
            priorities::color.eq(&priority.color),
        ))
        .execute(&mut conn)?;
    Ok(Json(priority))
}

pub async fn delete_priority(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    require_taxonomy_admin(&user)?;

    let mut conn = state.conn.get()?;
    let in_use: i64 = tickets::table
        .filter(tickets::priority_id.eq(id))
        .count()
        .get_result(&mut conn)?;
    if in_use > 0 {
        return Err(ApiError::Validation(
            "Priority is in use and cannot be deleted".into(),
        ));
    }

    let deleted =
        diesel::delete(priorities::table.filter(priorities::id.eq(id))).execute(&mut conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("Priority"));
    }
    Ok(Json(json!({ "message": "Priority deleted" })))
}

pub fn configure_taxonomy_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/categories",
            get(list_categories).post(create_category),
        )
        .route(
            "/api/categories/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route(
            "/api/priorities",
            get(list_priorities).post(create_priority),
        )
        .route(
            "/api/priorities/:id",
            get(get_priority).put(update_priority).delete(delete_priority),
        )
}
