//! Durable per-queue transport on Redis streams with consumer groups.
//!
//! At-least-once: messages are acked only after handling; deliveries
//! abandoned by dead consumers are reclaimed via XAUTOCLAIM. Exhausted
//! messages move to a bounded dead-letter stream.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::streams::{StreamAutoClaimReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Value};
use tracing::{debug, warn};

use super::request::EngineRequest;

const GROUP: &str = "workers";
const BODY_FIELD: &str = "body";
/// Dead-letter streams are trimmed to roughly this many entries, which at
/// crawl throughput approximates the 1 h retention contract.
const DLQ_MAX_LEN: usize = 10_000;

/// One delivered message: stream entry id + decoded request.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: String,
    pub request: EngineRequest,
}

#[derive(Clone)]
pub struct RedisQueue {
    redis: ConnectionManager,
    stream: String,
    consumer: String,
}

impl RedisQueue {
    #[must_use]
    pub fn new(redis: ConnectionManager, stream: String) -> Self {
        let consumer = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4().simple());
        Self { redis, stream, consumer }
    }

    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }

    fn dlq_stream(&self) -> String {
        format!("{}:dead", self.stream)
    }

    /// Create the consumer group if missing (BUSYGROUP is fine).
    pub async fn ensure_group(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        let created: redis::RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(GROUP)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e).context("creating consumer group"),
        }
    }

    /// Append a request. FIFO for initial attempts is the stream order.
    pub async fn push(&self, request: &EngineRequest) -> Result<()> {
        let mut conn = self.redis.clone();
        let body = serde_json::to_string(request).context("serializing engine request")?;
        let _: String = conn
            .xadd(&self.stream, "*", &[(BODY_FIELD, body)])
            .await
            .context("appending to queue stream")?;
        Ok(())
    }

    /// Blocking read of new deliveries for this consumer.
    pub async fn read(&self, count: usize, block_ms: usize) -> Result<Vec<Delivery>> {
        let mut conn = self.redis.clone();
        let opts = StreamReadOptions::default()
            .group(GROUP, &self.consumer)
            .count(count)
            .block(block_ms);

        let reply: StreamReadReply = conn
            .xread_options(&[&self.stream], &[">"], &opts)
            .await
            .context("reading from queue stream")?;

        let mut deliveries = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                match decode_entry(&entry.id, &entry.map) {
                    Some(delivery) => deliveries.push(delivery),
                    None => {
                        warn!(stream = %self.stream, id = %entry.id, "dropping undecodable entry");
                        self.ack(&entry.id).await.ok();
                    }
                }
            }
        }
        Ok(deliveries)
    }

    /// Reclaim deliveries stuck with dead consumers.
    pub async fn claim_abandoned(&self, min_idle_ms: usize, count: usize) -> Result<Vec<Delivery>> {
        let mut conn = self.redis.clone();
        let reply: StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.stream)
            .arg(GROUP)
            .arg(&self.consumer)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .context("claiming abandoned deliveries")?;

        let mut deliveries = Vec::new();
        for entry in reply.claimed {
            match decode_entry(&entry.id, &entry.map) {
                Some(delivery) => deliveries.push(delivery),
                None => {
                    self.ack(&entry.id).await.ok();
                }
            }
        }
        if !deliveries.is_empty() {
            debug!(stream = %self.stream, count = deliveries.len(), "reclaimed deliveries");
        }
        Ok(deliveries)
    }

    pub async fn ack(&self, id: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: i64 = conn
            .xack(&self.stream, GROUP, &[id])
            .await
            .context("acking delivery")?;
        Ok(())
    }

    /// Park an exhausted request in the bounded dead-letter stream.
    pub async fn move_to_dead_letter(&self, request: &EngineRequest, error: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        let body = serde_json::to_string(request).context("serializing dead request")?;
        let dlq = self.dlq_stream();
        let _: String = conn
            .xadd(&dlq, "*", &[(BODY_FIELD, body.as_str()), ("error", error)])
            .await
            .context("appending to dead-letter stream")?;

        let _: i64 = redis::cmd("XTRIM")
            .arg(&dlq)
            .arg("MAXLEN")
            .arg("~")
            .arg(DLQ_MAX_LEN)
            .query_async(&mut conn)
            .await
            .context("trimming dead-letter stream")?;
        Ok(())
    }

    pub async fn len(&self) -> Result<u64> {
        let mut conn = self.redis.clone();
        let n: u64 = conn.xlen(&self.stream).await.context("reading stream length")?;
        Ok(n)
    }
}

fn decode_entry(
    id: &str,
    map: &std::collections::HashMap<String, Value>,
) -> Option<Delivery> {
    let body = map.get(BODY_FIELD)?;
    let raw: String = redis::from_redis_value(body).ok()?;
    let request: EngineRequest = serde_json::from_str(&raw).ok()?;
    Some(Delivery { id: id.to_string(), request })
}
