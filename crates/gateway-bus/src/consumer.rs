//! The consumer role of the message bus client (§4.2). Delivers messages
//! serially with prefetch one; the caller is responsible for explicit ack
//! or nack via [`Delivery`] — a delivery that is dropped without either
//! leaves the message in-flight until connection loss, which requeues it,
//! matching the spec's documented behaviour.

use futures::StreamExt;
use gateway_core::{GatewayError, GatewayResult, QueueMessage};
use lapin::message::Delivery as RawDelivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use tracing::instrument;

pub struct Consumer {
    channel: Channel,
    inner: lapin::Consumer,
}

impl Consumer {
    /// Connects, declares `queue` durable, sets prefetch to one (§4.2, §5:
    /// "at most one job per worker is in flight at any moment"), and binds
    /// a consumer tag.
    #[instrument(skip(uri))]
    pub async fn bind(uri: &str, queue: &str, consumer_tag: &str) -> GatewayResult<Self> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;

        channel
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

        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;

        let inner = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;

        Ok(Self { channel, inner })
    }

    /// Awaits the next delivery. Returns `None` once the channel closes.
    pub async fn next(&mut self) -> GatewayResult<Option<Delivery>> {
        match self.inner.next().await {
            Some(Ok(raw)) => Ok(Some(Delivery { raw })),
            Some(Err(e)) => Err(GatewayError::Internal(e.into())),
            None => Ok(None),
        }
    }

    /// Closes the underlying channel (§4.6: done on interrupt, after the
    /// in-flight delivery has been acked).
    pub async fn close(&self) -> GatewayResult<()> {
        self.channel
            .close(200, "worker shutting down")
            .await
            .map_err(|e| GatewayError::Internal(e.into()))?;
        Ok(())
    }
}

/// One delivered message, not yet acked or nacked.
pub struct Delivery {
    raw: RawDelivery,
}

impl Delivery {
    pub fn delivery_tag(&self) -> u64 {
        self.raw.delivery_tag
    }

    /// Parses the payload as the required `{workflow_id, workspace_id,
    /// job_id, input_file_grp}` JSON object (§6). A parse failure is
    /// reported as [`GatewayError::PayloadMalformed`], which callers treat
    /// as a permanent per-message failure (§4.6 step 2).
    pub fn parse(&self) -> GatewayResult<QueueMessage> {
        serde_json::from_slice(&self.raw.data)
            .map_err(|e| GatewayError::PayloadMalformed(e.to_string()))
    }

    pub async fn ack(self) -> GatewayResult<()> {
        self.raw
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| GatewayError::Internal(e.into()))
    }

    pub async fn nack(self, requeue: bool) -> GatewayResult<()> {
        self.raw
            .nack(BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            })
            .await
            .map_err(|e| GatewayError::Internal(e.into()))
    }
}
