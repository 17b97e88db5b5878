use axum::extract::{Json, State};
use diesel::{prelude::*, result::DatabaseErrorKind};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    analysis::{self, AnalysisReport, DOC_TYPE_DRIVING_LICENSE},
    auth::{AuthenticatedUser, ROLE_CITIZEN},
    error::{AppError, AppResult},
    models::{NewDocument, Vehicle},
    schema::{documents, vehicles},
    state::AppState,
    utils::codec,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub vehicle_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub success: bool,
    pub analysis: AnalysisReport,
    pub token: String,
    pub document_id: Uuid,
}

/// Classify the submitted images and persist the verdict under a fresh
/// token. Classification and persistence are a single unit: if the insert
/// fails the verdict is lost and the caller resubmits.
pub async fn analyze_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<AnalyzeRequest>,
) -> AppResult<Json<AnalyzeResponse>> {
    user.require_role(ROLE_CITIZEN)?;

    if payload.images.is_empty() || payload.doc_type.trim().is_empty() {
        return Err(AppError::bad_request(
            "Missing required fields or invalid images format",
        ));
    }

    // License documents attach to the citizen; everything else needs a
    // target vehicle, which must belong to the caller.
    let (user_id, vehicle_id) = if payload.doc_type == DOC_TYPE_DRIVING_LICENSE {
        (Some(user.user_id), None)
    } else {
        let vehicle_id = payload.vehicle_id.ok_or_else(|| {
            AppError::bad_request("Vehicle ID required for this document type")
        })?;

        let mut conn = state.db()?;
        let owned: Option<Vehicle> = vehicles::table
            .find(vehicle_id)
            .filter(vehicles::owner_id.eq(user.user_id))
            .first(&mut conn)
            .optional()?;
        if owned.is_none() {
            return Err(AppError::not_found());
        }
        (None, Some(vehicle_id))
    };

    let parts: Vec<_> = payload
        .images
        .iter()
        .map(|raw| analysis::split_data_url(raw))
        .collect();

    let report = analysis::analyze(state.classifier.as_ref(), &parts, &payload.doc_type).await?;

    let token = Uuid::new_v4().to_string();
    let new_document = NewDocument {
        id: Uuid::new_v4(),
        doc_type: payload.doc_type.clone(),
        image_url: codec::encode_image_urls(&payload.images)?,
        analysis_result: codec::encode_analysis(&report)?,
        status: report.status.clone(),
        token: token.clone(),
        user_id,
        vehicle_id,
    };

    let mut conn = state.db()?;
    match diesel::insert_into(documents::table)
        .values(&new_document)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::token_collision());
        }
        Err(err) => return Err(AppError::from(err)),
    }

    info!(
        document_id = %new_document.id,
        doc_type = %new_document.doc_type,
        status = %new_document.status,
        "stored classification verdict"
    );

    Ok(Json(AnalyzeResponse {
        success: true,
        analysis: report,
        token,
        document_id: new_document.id,
    }))
}
