//! Cloudflare v4 API data types for Zero Trust Access groups

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An Access group as the Cloudflare API represents it.
///
/// Only a transient snapshot from the controller's point of view; the
/// authoritative copy lives on the Cloudflare side.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct AccessGroup {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub include: Vec<AccessRule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One include rule on an Access group.
///
/// The controller only manages email rules. Other rule kinds round-trip as
/// raw JSON so an update never drops rules added in the dashboard.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub enum AccessRule {
    #[serde(rename = "email")]
    Email(EmailRule),
    #[serde(untagged)]
    Other(serde_json::Value),
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EmailRule {
    pub email: String,
}

impl AccessGroup {
    /// Build a group carrying one email rule per member.
    pub fn from_emails(id: String, name: String, emails: &[String]) -> Self {
        AccessGroup {
            id,
            name,
            include: emails
                .iter()
                .map(|email| AccessRule::Email(EmailRule { email: email.clone() }))
                .collect(),
            created_at: None,
            updated_at: None,
        }
    }

    /// The member email addresses as an unordered set, duplicates collapsed.
    pub fn email_set(&self) -> BTreeSet<&str> {
        self.include
            .iter()
            .filter_map(|rule| match rule {
                AccessRule::Email(e) => Some(e.email.as_str()),
                AccessRule::Other(_) => None,
            })
            .collect()
    }
}

/// The standard Cloudflare v4 response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMessage {
    pub code: i64,
    pub message: String,
}

impl<T> ApiEnvelope<T> {
    /// Join envelope errors into one printable reason.
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "unknown error".to_string();
        }
        self.errors
            .iter()
            .map(|e| format!("{} (code {})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
