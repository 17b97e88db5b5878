use axum::extract::{Json, State};
use chrono::{NaiveDateTime, Utc};
use diesel::{prelude::*, result::DatabaseErrorKind, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::documents::{to_document_response, DocumentResponse};
use crate::{
    auth::{AuthenticatedUser, ROLE_CITIZEN},
    error::{AppError, AppResult},
    models::{Document, NewVehicle, Vehicle},
    schema::vehicles,
    state::AppState,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterVehicleRequest {
    pub reg_number: String,
    pub model: String,
    #[serde(rename = "type")]
    pub vehicle_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleResponse {
    pub id: Uuid,
    pub reg_number: String,
    pub model: String,
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub token: String,
    /// Payload encoded into the scannable card for this vehicle.
    pub qr_payload: Value,
    pub created_at: NaiveDateTime,
    pub documents: Vec<DocumentResponse>,
}

#[derive(Serialize)]
pub struct VehicleCreatedResponse {
    pub success: bool,
    pub vehicle: VehicleResponse,
}

#[derive(Serialize)]
pub struct VehicleListResponse {
    pub success: bool,
    pub vehicles: Vec<VehicleResponse>,
}

fn to_vehicle_response(
    vehicle: Vehicle,
    token: String,
    documents: Vec<DocumentResponse>,
) -> VehicleResponse {
    let qr_payload = json!({ "type": "VEHICLE", "token": token });
    VehicleResponse {
        id: vehicle.id,
        reg_number: vehicle.reg_number,
        model: vehicle.model,
        vehicle_type: vehicle.vehicle_type,
        qr_payload,
        token,
        created_at: vehicle.created_at,
        documents,
    }
}

pub async fn register_vehicle(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<RegisterVehicleRequest>,
) -> AppResult<Json<VehicleCreatedResponse>> {
    user.require_role(ROLE_CITIZEN)?;

    let reg_number = payload.reg_number.trim();
    let model = payload.model.trim();
    let vehicle_type = payload.vehicle_type.trim();
    if reg_number.is_empty() || model.is_empty() || vehicle_type.is_empty() {
        return Err(AppError::bad_request("Missing required fields"));
    }

    let token = Uuid::new_v4().to_string();
    let new_vehicle = NewVehicle {
        id: Uuid::new_v4(),
        owner_id: user.user_id,
        reg_number: reg_number.to_string(),
        model: model.to_string(),
        vehicle_type: vehicle_type.to_string(),
        token: Some(token.clone()),
    };

    let mut conn = state.db()?;
    match diesel::insert_into(vehicles::table)
        .values(&new_vehicle)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::token_collision());
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let vehicle: Vehicle = vehicles::table.find(new_vehicle.id).first(&mut conn)?;
    info!(vehicle_id = %vehicle.id, reg_number = %vehicle.reg_number, "registered vehicle");

    Ok(Json(VehicleCreatedResponse {
        success: true,
        vehicle: to_vehicle_response(vehicle, token, Vec::new()),
    }))
}

/// Lists the caller's vehicles with their documents. Vehicles created before
/// tokens existed get one backfilled here; the check precedes the write so a
/// second read is a no-op.
pub async fn list_vehicles(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<VehicleListResponse>> {
    user.require_role(ROLE_CITIZEN)?;

    let mut conn = state.db()?;
    let owned: Vec<Vehicle> = vehicles::table
        .filter(vehicles::owner_id.eq(user.user_id))
        .order(vehicles::created_at.asc())
        .load(&mut conn)?;

    let mut with_tokens = Vec::with_capacity(owned.len());
    for vehicle in owned {
        let token = match &vehicle.token {
            Some(token) => token.clone(),
            None => backfill_token(&mut conn, &vehicle)?,
        };
        with_tokens.push((vehicle, token));
    }

    let vehicle_rows: Vec<Vehicle> = with_tokens.iter().map(|(v, _)| v.clone()).collect();
    let grouped_documents: Vec<Vec<Document>> = Document::belonging_to(&vehicle_rows)
        .load::<Document>(&mut conn)?
        .grouped_by(&vehicle_rows);

    let mut vehicles_out = Vec::with_capacity(with_tokens.len());
    for ((vehicle, token), documents) in with_tokens.into_iter().zip(grouped_documents) {
        let documents = documents
            .into_iter()
            .map(to_document_response)
            .collect::<AppResult<Vec<_>>>()?;
        vehicles_out.push(to_vehicle_response(vehicle, token, documents));
    }

    Ok(Json(VehicleListResponse {
        success: true,
        vehicles: vehicles_out,
    }))
}

fn backfill_token(conn: &mut PgConnection, vehicle: &Vehicle) -> AppResult<String> {
    let token = Uuid::new_v4().to_string();
    diesel::update(vehicles::table.find(vehicle.id))
        .set((
            vehicles::token.eq(&token),
            vehicles::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    info!(vehicle_id = %vehicle.id, "backfilled vehicle token");
    Ok(token)
}
