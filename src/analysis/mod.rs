pub mod gemini;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::error::AppError;

pub use gemini::GeminiClassifier;

pub const DOC_TYPE_DRIVING_LICENSE: &str = "Driving License";

/// One image submitted for classification, already decomposed out of its
/// data-URL envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub mime_type: String,
    pub data: String,
}

/// Structured verdict extracted by the classifier. The adapter trusts the
/// model's judgment verbatim; no field is re-validated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    #[serde(default)]
    pub detected_type: String,
    #[serde(default)]
    pub reg_number: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub class_of_vehicle: Option<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("classifier call failed: {0}")]
    Upstream(String),
    #[error("classifier returned non-JSON output")]
    Parse { raw: String },
}

impl From<AnalysisError> for AppError {
    fn from(value: AnalysisError) -> Self {
        match value {
            AnalysisError::Parse { raw } => {
                // The raw model output is logged only, never returned to the
                // client.
                error!(raw_output = %raw, "failed to parse classifier response");
                AppError::internal("AI analysis failed")
            }
            AnalysisError::Upstream(message) => {
                error!(error = %message, "classifier request failed");
                AppError::internal("AI analysis failed")
            }
        }
    }
}

/// Submit-images-get-text seam over the hosted multimodal model, injected
/// through `AppState` so tests can script responses.
#[async_trait]
pub trait DocumentClassifier: Send + Sync {
    async fn classify(&self, prompt: &str, images: &[ImagePart]) -> Result<String, AnalysisError>;
}

/// Runs one classification call: fixed prompt embedding today's date and the
/// declared type, all images attached, single shot. No retry, no chunking.
pub async fn analyze(
    classifier: &dyn DocumentClassifier,
    images: &[ImagePart],
    declared_type: &str,
) -> Result<AnalysisReport, AnalysisError> {
    let prompt = build_prompt(declared_type, Utc::now().date_naive());
    let raw = classifier.classify(&prompt, images).await?;
    parse_report(&raw)
}

/// Decomposes a `data:<mime>;base64,<payload>` URL. Anything that doesn't
/// match falls back to `image/jpeg` with the raw string as payload.
pub fn split_data_url(raw: &str) -> ImagePart {
    if let Some(rest) = raw.strip_prefix("data:") {
        if let Some((mime, payload)) = rest.split_once(";base64,") {
            if !mime.is_empty() && !payload.is_empty() {
                return ImagePart {
                    mime_type: mime.to_string(),
                    data: payload.to_string(),
                };
            }
        }
    }
    ImagePart {
        mime_type: "image/jpeg".to_string(),
        data: raw.to_string(),
    }
}

pub fn build_prompt(doc_type: &str, today: NaiveDate) -> String {
    format!(
        r#"Today's Date: {date}
Analyze these vehicle document images/pages. They are supposed to be a {doc_type}.

If the document is a "Driving License":
- Look specifically for "DL No", "Licence No", "License No", or patterns like "SS-RR-YYYY-NNNNNNN" or "SSRR YYYY NNNNNNN" (where S is state code, R is RTO code, Y is year).
- Map this number to "regNumber".
- Look for "Valid Till", "Expires on", "Validity" for the expiry date.
- Look for "Class of Vehicle", "COV", "Vehicle Class" (e.g., LMV, MCWG, HGMV).

If the document is a "Registration Certificate" (RC):
- Look for "Regn No", "Registration No", or the main vehicle number plate string.
- Map this to "regNumber".
- Look for "Class", "Vehicle Class", "Type" (e.g., LMV, MCWG).

Extract the following information:
- Document Type Detected (e.g. "Driving License", "Registration Certificate", "Insurance", "PUC")
- Vehicle Registration Number / License Number (as "regNumber")
- Owner Name (if visible)
- Expiry Date (if visible, format DD-MM-YYYY if possible)
- Class of Vehicle (if visible, e.g. LMV, MCWG) as "classOfVehicle"
- Issues (e.g., blurry, edited, mismatch, expired)

Determine the status: VALID, EXPIRED, MISSING, or SUSPICIOUS.

Return ONLY a JSON object with this structure:
{{
  "detectedType": "string",
  "regNumber": "string",
  "ownerName": "string",
  "expiryDate": "string",
  "classOfVehicle": "string",
  "issues": ["string"],
  "status": "VALID" | "EXPIRED" | "MISSING" | "SUSPICIOUS"
}}"#,
        date = today.format("%a %b %d %Y"),
        doc_type = doc_type,
    )
}

/// Models habitually wrap JSON in markdown fences; strip them before parsing.
fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

fn parse_report(raw: &str) -> Result<AnalysisReport, AnalysisError> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(&cleaned).map_err(|_| AnalysisError::Parse {
        raw: raw.to_string(),
    })
}
