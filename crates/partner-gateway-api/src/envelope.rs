//! The uniform success envelope used by every mutating endpoint, and the
//! timestamp helper both it and [`crate::error::ApiError`] share.

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessEnvelope {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<String>,
    pub timestamp: u64,
}

impl SuccessEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            partner_id: None,
            timestamp: now_millis(),
        }
    }

    pub fn for_partner(message: impl Into<String>, partner_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            partner_id: Some(partner_id.into()),
            timestamp: now_millis(),
        }
    }
}
