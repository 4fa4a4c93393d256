//! The publisher role of the message bus client (§4.2). Used by the
//! out-of-scope ingress path; kept here since it shares the broker
//! connection and queue-declaration code with [`crate::consumer::Consumer`].

use gateway_core::{GatewayError, GatewayResult};
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::instrument;

#[derive(Clone)]
pub struct Publisher {
    channel: Channel,
}

impl Publisher {
    pub async fn connect(uri: &str) -> GatewayResult<Self> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;
        Ok(Self { channel })
    }

    /// Declares `queue` durable; idempotent per AMQP semantics (§4.2).
    pub async fn declare_queue(&self, queue: &str) -> GatewayResult<()> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;
        Ok(())
    }

    /// Publishes `payload` to `queue`. With delivery-confirmations enabled
    /// (the default on this channel), returns only after the broker has
    /// acknowledged; a broker NACK fails with
    /// [`GatewayError::PublishRejected`] (§4.2).
    #[instrument(skip(self, payload))]
    pub async fn publish(&self, queue: &str, payload: &[u8]) -> GatewayResult<()> {
        let confirm = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| GatewayError::PublishRejected {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?
            .await
            .map_err(|e| GatewayError::PublishRejected {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        match confirm {
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
            Confirmation::Nack(_) => Err(GatewayError::PublishRejected {
                queue: queue.to_string(),
                reason: "broker nacked the publish".to_string(),
            }),
        }
    }
}
