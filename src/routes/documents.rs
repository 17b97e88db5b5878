use axum::extract::{Json, State};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::{AuthenticatedUser, ROLE_CITIZEN},
    error::AppResult,
    models::Document,
    schema::documents,
    state::AppState,
    utils::codec,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub status: String,
    pub token: String,
    pub image_url: Vec<String>,
    pub analysis: Value,
    pub created_at: NaiveDateTime,
}

pub(crate) fn to_document_response(document: Document) -> AppResult<DocumentResponse> {
    let image_url = codec::decode_image_urls(&document.image_url)?;
    let analysis = codec::decode_analysis(&document.analysis_result)?;
    Ok(DocumentResponse {
        id: document.id,
        doc_type: document.doc_type,
        status: document.status,
        token: document.token,
        image_url,
        analysis,
        created_at: document.created_at,
    })
}

#[derive(Serialize)]
pub struct UserDocumentsResponse {
    pub success: bool,
    pub documents: Vec<DocumentResponse>,
}

/// License documents attached directly to the authenticated citizen.
pub async fn list_user_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<UserDocumentsResponse>> {
    user.require_role(ROLE_CITIZEN)?;

    let mut conn = state.db()?;
    let rows: Vec<Document> = documents::table
        .filter(documents::user_id.eq(user.user_id))
        .order(documents::created_at.desc())
        .load(&mut conn)?;

    let documents = rows
        .into_iter()
        .map(to_document_response)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Json(UserDocumentsResponse {
        success: true,
        documents,
    }))
}
