//! Explicit encode/decode pairs for the JSON-in-text columns on `documents`.
//! Image lists and classifier output are stored as JSON strings for wire
//! compatibility; nothing else in the crate touches that representation.

use serde_json::Value;

use crate::analysis::AnalysisReport;

pub fn encode_image_urls(images: &[String]) -> serde_json::Result<String> {
    serde_json::to_string(images)
}

pub fn decode_image_urls(raw: &str) -> serde_json::Result<Vec<String>> {
    serde_json::from_str(raw)
}

pub fn encode_analysis(report: &AnalysisReport) -> serde_json::Result<String> {
    serde_json::to_string(report)
}

/// Stored verdicts are echoed back verbatim, so decoding stays at the
/// `Value` level rather than re-imposing the report struct.
pub fn decode_analysis(raw: &str) -> serde_json::Result<Value> {
    serde_json::from_str(raw)
}
