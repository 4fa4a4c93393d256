//! Helpers shared by the async and sync façades: translating driver errors
//! into [`GatewayError`] and building the `set_state` transition guard.

use gateway_core::{GatewayError, JobState};
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};

/// MongoDB's well-known duplicate-key error code.
const DUPLICATE_KEY_CODE: i32 = 11000;

pub fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        _ => false,
    }
}

pub fn not_found(entity: &str, id: &str) -> GatewayError {
    GatewayError::NotFound(format!("{entity}[{id}]"))
}

pub fn already_exists(entity: &str, id: &str) -> GatewayError {
    GatewayError::AlreadyExists(format!("{entity}[{id}]"))
}

/// Builds the update document for a job-state transition, after the caller
/// has already verified the transition is legal.
pub fn state_transition_update(new_state: JobState) -> mongodb::bson::Document {
    doc! {
        "$set": {
            "job_state": mongodb::bson::to_bson(&new_state).unwrap_or_else(|_| new_state.to_string().into()),
            "updated_at": mongodb::bson::DateTime::now(),
        }
    }
}
