//! Token redemption: a single opaque token format services two kinds of
//! assertion (document-level compliance vs bare vehicle existence). The
//! lookup resolves the namespaces explicitly as a sum type so callers never
//! depend on query ordering.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    models::{Document, User, Vehicle},
    schema::{documents, users, vehicles},
    utils::codec,
};

pub enum TokenTarget {
    /// Token matched a stored classification record. `owner` is the license
    /// holder for user-attached documents, else the owning vehicle's user.
    Document {
        document: Document,
        owner: Option<User>,
        vehicle: Option<Vehicle>,
    },
    /// Token matched a vehicle registration; asserts existence only.
    Vehicle { vehicle: Vehicle, owner: User },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub status: String,
    pub timestamp: NaiveDateTime,
    pub vehicle: VehicleSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<Vec<String>>,
    pub analysis: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSummary {
    pub owner: String,
    pub model: String,
    pub reg_number: String,
}

/// Resolves a token against the document namespace first, then the vehicle
/// namespace. `None` means the token exists in neither.
pub fn resolve_token(conn: &mut PgConnection, token: &str) -> AppResult<Option<TokenTarget>> {
    let document: Option<Document> = documents::table
        .filter(documents::token.eq(token))
        .first(conn)
        .optional()?;

    if let Some(document) = document {
        let vehicle: Option<Vehicle> = match document.vehicle_id {
            Some(vehicle_id) => vehicles::table.find(vehicle_id).first(conn).optional()?,
            None => None,
        };
        let owner_id = document.user_id.or(vehicle.as_ref().map(|v| v.owner_id));
        let owner: Option<User> = match owner_id {
            Some(user_id) => users::table.find(user_id).first(conn).optional()?,
            None => None,
        };
        return Ok(Some(TokenTarget::Document {
            document,
            owner,
            vehicle,
        }));
    }

    let vehicle: Option<Vehicle> = vehicles::table
        .filter(vehicles::token.eq(token))
        .first(conn)
        .optional()?;

    if let Some(vehicle) = vehicle {
        let owner: User = users::table.find(vehicle.owner_id).first(conn)?;
        return Ok(Some(TokenTarget::Vehicle { vehicle, owner }));
    }

    Ok(None)
}

pub fn build_report(target: TokenTarget) -> AppResult<VerificationReport> {
    match target {
        TokenTarget::Document {
            document,
            owner,
            vehicle,
        } => document_report(document, owner, vehicle),
        TokenTarget::Vehicle { vehicle, owner } => Ok(vehicle_report(vehicle, owner)),
    }
}

/// Report for a stored classification: echoes the persisted status and the
/// stored analysis verbatim. Registration number falls back
/// vehicle.reg_number -> analysis.regNumber -> "N/A".
pub fn document_report(
    document: Document,
    owner: Option<User>,
    vehicle: Option<Vehicle>,
) -> AppResult<VerificationReport> {
    let analysis = codec::decode_analysis(&document.analysis_result)?;
    let images = codec::decode_image_urls(&document.image_url)?;

    let reg_number = vehicle
        .as_ref()
        .map(|v| v.reg_number.clone())
        .or_else(|| {
            analysis
                .get("regNumber")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "N/A".to_string());

    let owner_name = owner
        .map(|user| user.username)
        .or_else(|| {
            analysis
                .get("ownerName")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "N/A".to_string());

    let model = vehicle
        .map(|v| v.model)
        .unwrap_or_else(|| "N/A".to_string());

    Ok(VerificationReport {
        status: document.status,
        timestamp: document.created_at,
        vehicle: VehicleSummary {
            owner: owner_name,
            model,
            reg_number,
        },
        image_url: Some(images),
        analysis,
    })
}

/// A bare vehicle-registration token asserts only that the vehicle record
/// exists, so the status is forced to VALID and the analysis is stubbed.
pub fn vehicle_report(vehicle: Vehicle, owner: User) -> VerificationReport {
    VerificationReport {
        status: "VALID".to_string(),
        timestamp: vehicle.created_at,
        vehicle: VehicleSummary {
            owner: owner.username,
            model: vehicle.model,
            reg_number: vehicle.reg_number,
        },
        image_url: None,
        analysis: json!({
            "detectedType": "Vehicle Registration",
            "expiryDate": "N/A",
            "issues": [],
        }),
    }
}
