use serde::{Deserialize, Serialize};

use crate::domain::AccountStatus;

pub mod endpoints;

pub const API_V1_PREFIX: &str = "/api/v1";

// Sign-up; the server hashes the password before storing the parent
#[derive(Debug, Serialize, Deserialize)]
pub struct SignupReq {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub timezone: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub privacy_consent: bool,
    #[serde(default)]
    pub marketing_consent: bool,
    pub data_retention_consent: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionDto {
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountStatusReq {
    pub status: AccountStatus,
}

// Email verification
#[derive(Debug, Serialize, Deserialize)]
pub struct IssuedTokenDto {
    pub token_id: String,
    /// Plaintext token; only the hash is stored server-side.
    pub token: String,
    pub expires_at: String, // ISO-8601 UTC
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConsumeTokenReq {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailVerifiedDto {
    pub parent_id: String,
    pub email: String,
    pub email_verified_at: Option<String>,
}

// Workflow transitions
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TransitionReq {
    pub notes: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OccurrenceReq {
    pub due_date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemReq {
    pub child_id: String,
    pub request_key: Option<String>,
    pub notes: Option<String>,
}

// Points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsSummaryDto {
    pub child_id: String,
    pub balance: i64,
    pub lifetime_earned: i64,
    pub total_spent: i64,
    pub pending_redemptions: i64,
    /// `balance == lifetime_earned - total_spent`
    pub consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityDto {
    pub child_id: String,
    pub reward_id: String,
    pub eligible: bool,
    pub cost_points: i32,
    pub balance: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountDto {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}
