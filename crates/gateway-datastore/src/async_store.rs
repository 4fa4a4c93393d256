//! The non-blocking datastore façade (§4.1), used by the out-of-scope
//! ingress path. Shares its schema and collection wiring with
//! [`crate::sync_store::SyncDatastore`].

use crate::entity::Entity;
use crate::support::{already_exists, is_duplicate_key, not_found, state_transition_update};
use gateway_core::{GatewayError, GatewayResult, JobState, WorkflowJob};
use mongodb::bson::{doc, Document};
use mongodb::{options::ClientOptions, Client, Collection};
use serde::{de::DeserializeOwned, Serialize};
use tracing::instrument;

#[derive(Clone)]
pub struct AsyncDatastore {
    client: Client,
    db_name: String,
}

impl AsyncDatastore {
    pub async fn connect(uri: &str, db_name: &str) -> GatewayResult<Self> {
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;
        let client = Client::with_options(options).map_err(|e| GatewayError::Internal(e.into()))?;
        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    fn collection<T>(&self, name: &str) -> Collection<T> {
        self.client.database(&self.db_name).collection(name)
    }

    /// Fails with [`GatewayError::AlreadyExists`] on key collision (§4.1).
    pub async fn create<T>(&self, entity: &T) -> GatewayResult<()>
    where
        T: Entity + Serialize + Send + Sync,
    {
        let collection = self.collection::<T>(T::COLLECTION);
        collection.insert_one(entity, None).await.map_err(|e| {
            if is_duplicate_key(&e) {
                already_exists(T::COLLECTION, entity.id())
            } else {
                GatewayError::Internal(e.into())
            }
        })?;
        Ok(())
    }

    /// Fails with [`GatewayError::NotFound`] when no matching document exists.
    pub async fn get<T>(&self, id: &str) -> GatewayResult<T>
    where
        T: Entity + DeserializeOwned + Unpin + Send + Sync,
    {
        let collection = self.collection::<T>(T::COLLECTION);
        collection
            .find_one(doc! { T::ID_FIELD: id }, None)
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?
            .ok_or_else(|| not_found(T::COLLECTION, id))
    }

    /// Merges `patch` into the document at `id`; fails with
    /// [`GatewayError::NotFound`] if no document matched.
    pub async fn update<T>(&self, id: &str, patch: Document) -> GatewayResult<()>
    where
        T: Entity,
    {
        let collection = self.collection::<Document>(T::COLLECTION);
        let result = collection
            .update_one(doc! { T::ID_FIELD: id }, doc! { "$set": patch }, None)
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;
        if result.matched_count == 0 {
            return Err(not_found(T::COLLECTION, id));
        }
        Ok(())
    }

    /// The only sanctioned mutator of [`WorkflowJob::job_state`] (§4.1).
    /// Rejects transitions out of a terminal state with
    /// [`GatewayError::IllegalTransition`]; all other transitions are
    /// accepted.
    #[instrument(skip(self))]
    pub async fn set_job_state(&self, job_id: &str, new_state: JobState) -> GatewayResult<()> {
        let current: WorkflowJob = self.get(job_id).await?;
        if current.job_state.is_terminal() {
            return Err(GatewayError::IllegalTransition {
                from: current.job_state.to_string(),
                to: new_state.to_string(),
            });
        }

        let collection = self.collection::<Document>(WorkflowJob::COLLECTION);
        let result = collection
            .update_one(
                doc! { WorkflowJob::ID_FIELD: job_id },
                state_transition_update(new_state),
                None,
            )
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;
        if result.matched_count == 0 {
            return Err(not_found(WorkflowJob::COLLECTION, job_id));
        }
        Ok(())
    }
}
