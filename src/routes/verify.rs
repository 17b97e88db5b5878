use axum::{
    extract::{Json, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    analysis::{self, AnalysisReport},
    auth::{AuthenticatedUser, ROLE_CITIZEN},
    error::{AppError, AppResult},
    state::AppState,
    verification::{self, VerificationReport},
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub token: Option<String>,
    pub images: Option<Vec<String>>,
    #[serde(rename = "type")]
    pub doc_type: Option<String>,
}

#[derive(Serialize)]
pub struct VerifyTokenResponse {
    pub success: bool,
    pub data: VerificationReport,
}

#[derive(Serialize)]
pub struct AdHocAnalysisResponse {
    pub success: bool,
    pub analysis: AnalysisReport,
}

/// Dual-mode endpoint. A `token` body redeems a stored verdict (any
/// authenticated role); an `images` + `type` body runs a preview
/// classification for citizens without persisting anything.
pub async fn verify(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<VerifyRequest>,
) -> AppResult<Response> {
    if let Some(token) = payload.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return verify_token(&state, &user, token).await;
    }

    match (payload.images, payload.doc_type) {
        (Some(images), Some(doc_type)) if !images.is_empty() && !doc_type.trim().is_empty() => {
            user.require_role(ROLE_CITIZEN)?;
            let parts: Vec<_> = images.iter().map(|raw| analysis::split_data_url(raw)).collect();
            let report =
                analysis::analyze(state.classifier.as_ref(), &parts, &doc_type).await?;
            Ok(Json(AdHocAnalysisResponse {
                success: true,
                analysis: report,
            })
            .into_response())
        }
        _ => Err(AppError::bad_request("Missing required fields")),
    }
}

async fn verify_token(state: &AppState, user: &AuthenticatedUser, token: &str) -> AppResult<Response> {
    let mut conn = state.db()?;
    let target = verification::resolve_token(&mut conn, token)?
        .ok_or_else(AppError::invalid_token)?;
    let report = verification::build_report(target)?;

    info!(
        verifier = %user.username,
        status = %report.status,
        "token redeemed"
    );

    Ok(Json(VerifyTokenResponse {
        success: true,
        data: report,
    })
    .into_response())
}
