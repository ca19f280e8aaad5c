//! Request IDs for log correlation.
//!
//! IDs only appear in spans and log lines. They are never sent upstream or
//! back to the client.

use uuid::Uuid;

/// Generate a new request ID (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
