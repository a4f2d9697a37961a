//! AMQP-backed queue (spec.md §4.2/§6): "durable queue named per spider with
//! broker-side priority 0-255". `pop` uses `basic_get` (fetch-one, no
//! standing consumer) so it stays non-blocking the way spec.md §4.6 demands
//! of shared-backend schedulers; acknowledgement happens immediately after
//! a successful fetch, which is what spec.md §4.2's "never returns the same
//! request twice across workers" invariant rests on for broker-backed
//! variants.

use std::sync::Arc;

use async_trait::async_trait;
use engine_protocol::error::QueueError;
use engine_protocol::Request;
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicPublishOptions, QueueDeclareOptions, QueuePurgeOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};

use crate::serializer::RequestSerializer;
use crate::RequestQueue;

const MAX_BROKER_PRIORITY: u8 = 255;

pub struct AmqpQueue {
    channel: lapin::Channel,
    queue_name: String,
    serializer: Arc<dyn RequestSerializer>,
}

impl AmqpQueue {
    pub async fn connect(
        amqp_url: &str,
        spider_name: &str,
        serializer: Arc<dyn RequestSerializer>,
    ) -> Result<Self, QueueError> {
        let connection = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;

        let queue_name = format!("{spider_name}.requests");
        let mut args = FieldTable::default();
        args.insert(
            "x-max-priority".into(),
            lapin::types::AMQPValue::ShortShortUInt(MAX_BROKER_PRIORITY as i8),
        );

        channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                args,
            )
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;

        Ok(Self {
            channel,
            queue_name,
            serializer,
        })
    }

    /// Clamp a signed crawl priority into the broker's unsigned 0-255 range.
    fn broker_priority(priority: i64) -> u8 {
        priority.clamp(0, MAX_BROKER_PRIORITY as i64) as u8
    }
}

#[async_trait]
impl RequestQueue for AmqpQueue {
    async fn push(&self, request: Request) -> Result<(), QueueError> {
        let priority = Self::broker_priority(request.priority);
        let payload = self.serializer.serialize(&request)?;

        self.channel
            .basic_publish(
                "",
                &self.queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_priority(priority),
            )
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<Request>, QueueError> {
        let fetched = self
            .channel
            .basic_get(&self.queue_name, BasicGetOptions::default())
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;

        let Some(delivery) = fetched else {
            return Ok(None);
        };

        let request = self.serializer.deserialize(&delivery.data)?;
        delivery
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        Ok(Some(request))
    }

    async fn size(&self) -> Result<u64, QueueError> {
        let declared = self
            .channel
            .queue_declare(
                &self.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        Ok(declared.message_count() as u64)
    }

    async fn clear(&self) -> Result<(), QueueError> {
        self.channel
            .queue_purge(&self.queue_name, QueuePurgeOptions::default())
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.channel
            .close(0, "engine shutdown")
            .await
            .map_err(|e| QueueError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }
}
