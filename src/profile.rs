//! Profile normalization
//!
//! Maps a Passage user record into the provider-neutral profile shape that
//! application verify callbacks receive.
//!
//! # Example
//!
//! ```
//! use passage_auth::profile::{normalize, IdentityRecord};
//!
//! let record: IdentityRecord = serde_json::from_value(serde_json::json!({
//!     "id": "u1",
//!     "email": "a@b.com",
//!     "phone": "+15005550006",
//!     "user_metadata": {"firstName": "John", "lastName": "Doe"}
//! }))
//! .unwrap();
//!
//! let profile = normalize(&record).unwrap();
//! assert_eq!(profile.display_name, "John Doe");
//! assert_eq!(profile.emails[0].value, "a@b.com");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider label carried on every profile
pub const PROVIDER: &str = "passage";

/// Profile normalization errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    #[error("Identity record {0} has no user_metadata")]
    MissingMetadata(String),
}

/// User record as returned by the identity provider
///
/// Fields not listed here are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub user_metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub phone_verified: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub last_login_at: Option<String>,
    #[serde(default)]
    pub login_count: Option<u64>,
}

/// Structured name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileName {
    pub family_name: String,
    pub given_name: String,
}

/// Single email or phone entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileValue {
    pub value: String,
}

/// Canonical user profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub provider: String,
    pub id: String,
    pub display_name: String,
    pub name: ProfileName,
    pub emails: Vec<ProfileValue>,
    pub phone_numbers: Vec<ProfileValue>,
}

/// Normalize an identity record into a [`Profile`]
///
/// The record must carry a `user_metadata` object; its `firstName` and
/// `lastName` entries may be missing, in which case they count as empty
/// strings. Email and phone produce one entry each whenever present, even
/// when empty.
pub fn normalize(record: &IdentityRecord) -> Result<Profile, ProfileError> {
    let metadata = record
        .user_metadata
        .as_ref()
        .ok_or_else(|| ProfileError::MissingMetadata(record.id.clone()))?;

    let name_part = |key: &str| {
        metadata
            .get(key)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let given_name = name_part("firstName");
    let family_name = name_part("lastName");

    Ok(Profile {
        provider: PROVIDER.to_string(),
        id: record.id.clone(),
        display_name: format!("{} {}", given_name, family_name),
        name: ProfileName {
            family_name,
            given_name,
        },
        emails: single_entry(record.email.as_deref()),
        phone_numbers: single_entry(record.phone.as_deref()),
    })
}

fn single_entry(value: Option<&str>) -> Vec<ProfileValue> {
    value
        .map(|value| ProfileValue {
            value: value.to_string(),
        })
        .into_iter()
        .collect()
}
