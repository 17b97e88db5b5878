use std::collections::HashMap;

use axum::extract::{Json, Query, State};
use chrono::NaiveDateTime;
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::documents::{to_document_response, DocumentResponse};
use crate::{
    auth::{AuthenticatedUser, ROLE_ADMIN},
    error::{AppError, AppResult},
    models::{Document, User, Vehicle},
    schema::{documents, users, vehicles},
    state::AppState,
};

#[derive(Deserialize)]
pub struct AdminUserQuery {
    pub id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub vehicle_count: i64,
    pub document_count: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleDetail {
    pub id: Uuid,
    pub reg_number: String,
    pub model: String,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub token: Option<String>,
    pub documents: Vec<DocumentResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub documents: Vec<DocumentResponse>,
    pub vehicles: Vec<VehicleDetail>,
}

#[derive(Deserialize)]
pub struct DeleteUserRequest {
    pub id: Uuid,
}

/// `?id=` returns one user with license documents and vehicles (each with
/// documents); without it, all users newest-first with ownership counts.
pub async fn get_users(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Query(query): Query<AdminUserQuery>,
) -> AppResult<Json<Value>> {
    admin.require_role(ROLE_ADMIN)?;

    let mut conn = state.db()?;

    if let Some(user_id) = query.id {
        let user: User = match users::table.find(user_id).first(&mut conn).optional()? {
            Some(user) => user,
            None => return Err(AppError::not_found()),
        };

        let license_documents: Vec<Document> = documents::table
            .filter(documents::user_id.eq(user.id))
            .order(documents::created_at.desc())
            .load(&mut conn)?;

        let owned_vehicles: Vec<Vehicle> = vehicles::table
            .filter(vehicles::owner_id.eq(user.id))
            .order(vehicles::created_at.asc())
            .load(&mut conn)?;

        let grouped: Vec<Vec<Document>> = Document::belonging_to(&owned_vehicles)
            .load::<Document>(&mut conn)?
            .grouped_by(&owned_vehicles);

        let vehicles_out = owned_vehicles
            .into_iter()
            .zip(grouped)
            .map(|(vehicle, docs)| {
                let documents = docs
                    .into_iter()
                    .map(to_document_response)
                    .collect::<AppResult<Vec<_>>>()?;
                Ok(VehicleDetail {
                    id: vehicle.id,
                    reg_number: vehicle.reg_number,
                    model: vehicle.model,
                    vehicle_type: vehicle.vehicle_type,
                    token: vehicle.token,
                    documents,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        let detail = UserDetail {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
            documents: license_documents
                .into_iter()
                .map(to_document_response)
                .collect::<AppResult<Vec<_>>>()?,
            vehicles: vehicles_out,
        };

        return Ok(Json(json!({ "success": true, "user": detail })));
    }

    let all_users: Vec<User> = users::table
        .order(users::created_at.desc())
        .load(&mut conn)?;

    let vehicle_counts: Vec<(Uuid, i64)> = vehicles::table
        .group_by(vehicles::owner_id)
        .select((vehicles::owner_id, count_star()))
        .load(&mut conn)?;
    let vehicle_counts: HashMap<Uuid, i64> = vehicle_counts.into_iter().collect();

    let document_counts: Vec<(Option<Uuid>, i64)> = documents::table
        .filter(documents::user_id.is_not_null())
        .group_by(documents::user_id)
        .select((documents::user_id, count_star()))
        .load(&mut conn)?;
    let document_counts: HashMap<Uuid, i64> = document_counts
        .into_iter()
        .filter_map(|(id, count)| id.map(|id| (id, count)))
        .collect();

    let summaries: Vec<UserSummary> = all_users
        .into_iter()
        .map(|user| UserSummary {
            vehicle_count: vehicle_counts.get(&user.id).copied().unwrap_or(0),
            document_count: document_counts.get(&user.id).copied().unwrap_or(0),
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        })
        .collect();

    Ok(Json(json!({ "success": true, "users": summaries })))
}

/// Removes a user and everything they own in one transaction; a
/// mid-sequence failure rolls the whole deletion back.
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Json(payload): Json<DeleteUserRequest>,
) -> AppResult<Json<Value>> {
    admin.require_role(ROLE_ADMIN)?;

    let mut conn = state.db()?;
    conn.transaction::<(), AppError, _>(|conn| {
        let target: User = users::table.find(payload.id).first(conn)?;

        let owned_vehicle_ids: Vec<Uuid> = vehicles::table
            .filter(vehicles::owner_id.eq(target.id))
            .select(vehicles::id)
            .load(conn)?;

        diesel::delete(documents::table.filter(documents::user_id.eq(target.id)))
            .execute(conn)?;
        diesel::delete(
            documents::table.filter(documents::vehicle_id.eq_any(&owned_vehicle_ids)),
        )
        .execute(conn)?;
        diesel::delete(vehicles::table.filter(vehicles::owner_id.eq(target.id)))
            .execute(conn)?;
        diesel::delete(users::table.find(target.id)).execute(conn)?;

        info!(user_id = %target.id, username = %target.username, "deleted user and owned records");
        Ok(())
    })?;

    Ok(Json(json!({ "success": true })))
}
