//! Async and sync façades over the document store backing the
//! workflow-execution gateway (§4.1). Both adapters share the
//! `gateway-core` schema and the [`entity::Entity`] wiring in this crate;
//! see Design Note "Two datastore façades" for why there are two adapters
//! instead of one.

mod async_store;
mod entity;
mod support;
mod sync_store;

pub use async_store::AsyncDatastore;
pub use entity::Entity;
pub use sync_store::SyncDatastore;

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::{JobState, Workflow};

    #[test]
    fn entity_wiring_matches_spec_collection_names() {
        assert_eq!(Workflow::COLLECTION, "workflows");
        assert_eq!(Workflow::ID_FIELD, "workflow_id");
    }

    #[test]
    fn job_state_terminality_matches_spec_invariant() {
        assert!(JobState::Success.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Stopped.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }
}
