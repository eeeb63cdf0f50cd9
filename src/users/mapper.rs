//! Flattening of MixItUp profiles into user table rows.
//!
//! A profile keeps per-platform details under `PlatformData`; the table wants
//! one flat row. Exactly one platform sub-record is promoted to the top-level
//! columns: the preferred platform when the profile has it, otherwise the first
//! entry in document order.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::HashMap;
use validator::Validate;

use crate::mixitup::{PlatformData, Profile};
use crate::validation::{violations, FieldViolation};

/// One row of the user table. `None` serializes as `null`; columns are never
/// omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub mixitup_user_id: String,
    pub user_id: String,
    pub notes: Option<String>,
    pub custom_title: Option<String>,
    pub last_updated: Option<String>,
    pub last_activity: Option<String>,
    pub platform_data: Option<PlatformData>,
    pub currency_amounts: Option<HashMap<String, f64>>,
    pub inventory_amounts: Option<HashMap<String, f64>>,
    pub stream_pass_amounts: Option<HashMap<String, f64>>,
    pub is_specialty_excluded: Option<bool>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub online_viewing_minutes: Option<i64>,
    pub platform: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    #[validate(url)]
    pub avatar_link: Option<String>,
    pub account_date: Option<String>,
    pub follow_date: Option<String>,
    pub subscribe_date: Option<String>,
    #[validate(range(min = 0, max = 3, message = "must be between 0 and 3"))]
    pub subscriber_tier: Option<i64>,
}

/// Pick the platform sub-record to flatten. Returns the platform key with the
/// parsed record, or a violation if the chosen entry is malformed.
pub fn select_platform(
    profile: &Profile,
    preferred: Option<&str>,
) -> Result<Option<(String, PlatformData)>, FieldViolation> {
    let Some(map) = profile.platform_data.as_ref() else {
        return Ok(None);
    };

    let chosen = preferred
        .and_then(|name| map.get(name).map(|value| (name.to_string(), value)))
        .or_else(|| map.iter().next().map(|(key, value)| (key.clone(), value)));

    let Some((key, value)) = chosen else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }

    serde_json::from_value::<PlatformData>(value.clone())
        .map(|data| Some((key.clone(), data)))
        .map_err(|e| FieldViolation {
            field: format!("platformData.{key}"),
            code: "type".to_string(),
            message: e.to_string(),
        })
}

/// Normalize a timestamp to RFC 3339 UTC with millisecond precision.
/// Offset-less values are taken as UTC.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let utc = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        dt.with_timezone(&Utc)
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        naive.and_utc()
    } else if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)?.and_utc()
    } else {
        return None;
    };
    Some(utc.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn timestamp(
    field: &str,
    value: Option<String>,
    problems: &mut Vec<FieldViolation>,
) -> Option<String> {
    let raw = non_empty(value)?;
    match normalize_timestamp(&raw) {
        Some(ts) => Some(ts),
        None => {
            problems.push(FieldViolation {
                field: field.to_string(),
                code: "datetime".to_string(),
                message: format!("'{raw}' is not a valid date-time"),
            });
            None
        }
    }
}

/// Flatten and validate a profile. All problems are collected and returned
/// together.
pub fn map_profile(
    profile: &Profile,
    preferred_platform: Option<&str>,
) -> Result<UserRecord, Vec<FieldViolation>> {
    let mut problems = Vec::new();

    let platform = match select_platform(profile, preferred_platform) {
        Ok(selected) => selected.map(|(_, data)| data),
        Err(violation) => {
            problems.push(violation);
            None
        }
    };
    let p = platform.clone().unwrap_or_default();

    let record = UserRecord {
        mixitup_user_id: profile.id.clone(),
        user_id: profile.id.clone(),
        notes: non_empty(profile.notes.clone()),
        custom_title: non_empty(profile.custom_title.clone()),
        last_updated: timestamp("lastUpdated", profile.last_updated.clone(), &mut problems),
        last_activity: timestamp("lastActivity", profile.last_activity.clone(), &mut problems),
        platform_data: platform,
        currency_amounts: profile.currency_amounts.clone(),
        inventory_amounts: profile.inventory_amounts.clone(),
        stream_pass_amounts: profile.stream_pass_amounts.clone(),
        is_specialty_excluded: profile.is_specialty_excluded,
        online_viewing_minutes: profile.online_viewing_minutes,
        platform: non_empty(p.platform),
        username: non_empty(p.username),
        display_name: non_empty(p.display_name),
        avatar_link: non_empty(p.avatar_link),
        account_date: timestamp("accountDate", p.account_date, &mut problems),
        follow_date: timestamp("followDate", p.follow_date, &mut problems),
        subscribe_date: timestamp("subscribeDate", p.subscribe_date, &mut problems),
        subscriber_tier: p.subscriber_tier,
    };

    if let Err(errors) = record.validate() {
        problems.extend(violations(&errors));
    }

    if problems.is_empty() {
        Ok(record)
    } else {
        problems.sort_by(|a, b| a.field.cmp(&b.field));
        Err(problems)
    }
}
