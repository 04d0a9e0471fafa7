// REST API dimensions
// This file collects the per-request attributes that become the tag set of
// the request duration sample
//
// Numan Thabit 2025 Nov

use super::token::CallerClaims;
use crate::tags::{result_value, Tags, TAG_RESULT};

pub const TAG_REQUEST_URI: &str = "Request URI";
pub const TAG_USER_ID: &str = "User Id";
pub const TAG_ACCOUNT_ID: &str = "Account Id";
pub const TAG_ACCOUNT_NAME: &str = "Account Name";
pub const TAG_HTTP_STATUS: &str = "Http Status";
pub const TAG_HTTP_METHOD: &str = "Http Method";
pub const TAG_COUNTRY_CODE: &str = "Country Code";
pub const TAG_IP_ADDRESS: &str = "Ip Address";

pub const UNKNOWN: &str = "Unknown";
pub const NOT_APPLICABLE: &str = "N/A";
pub const UNKNOWN_IP: &str = "0.0.0.0";

/// Snapshot of one request/response cycle, filled in as the request
/// progresses and turned into tags once at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestApiDimensions {
    pub request_uri: String,
    pub http_method: String,
    /// `0` until a response is produced
    pub http_status: u16,
    pub ip_address: Option<String>,
    pub country_code: Option<String>,
    pub user_id: Option<String>,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub operation_successful: bool,
}

impl RestApiDimensions {
    pub fn new(request_uri: impl Into<String>, http_method: impl Into<String>) -> Self {
        Self {
            request_uri: request_uri.into(),
            http_method: http_method.into(),
            ..Self::default()
        }
    }

    pub fn apply_claims(&mut self, claims: CallerClaims) {
        self.user_id = claims.user_id;
        self.account_id = claims.account_id;
        self.account_name = claims.account_name;
    }

    pub fn complete(&mut self, http_status: u16, success: bool) {
        self.http_status = http_status;
        self.operation_successful = success;
    }

    pub fn tags(&self) -> Tags {
        Tags::of(TAG_REQUEST_URI, self.request_uri.as_str())
            .and(TAG_HTTP_STATUS, self.http_status.to_string())
            .and(TAG_RESULT, result_value(self.operation_successful))
            .and(TAG_HTTP_METHOD, self.http_method.as_str())
            .and(TAG_USER_ID, or_default(&self.user_id, UNKNOWN))
            .and(TAG_ACCOUNT_ID, or_default(&self.account_id, UNKNOWN))
            .and(TAG_ACCOUNT_NAME, or_default(&self.account_name, NOT_APPLICABLE))
            .and(TAG_COUNTRY_CODE, or_default(&self.country_code, NOT_APPLICABLE))
            .and(TAG_IP_ADDRESS, or_default(&self.ip_address, UNKNOWN_IP))
    }
}

fn or_default<'a>(value: &'a Option<String>, fallback: &'a str) -> &'a str {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(fallback)
}
