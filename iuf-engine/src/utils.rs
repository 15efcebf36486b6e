//! Time and naming helpers.

use chrono::Utc;
use uuid::Uuid;

/// Returns the current time as a millisecond Unix epoch.
#[must_use]
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Generates a session name: `<activity>-<8 hex chars>`.
#[must_use]
pub fn generate_session_name(activity: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{activity}-{}", &id[..8])
}
