//! Ingestor (C6): subscribes to the upstream feed and drives frames through C5 via C4.

pub mod deadletter;
pub mod dedup;
pub mod frame;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use zeromq::{Socket, SocketRecv};

use crate::config::Config;
use crate::handlers::{self, HandlerContext, Schema};
use crate::writelock::WriteLock;

use self::deadletter::DeadLetterBuffer;
use self::dedup::DedupCache;

const DEDUP_SOFT_CAP: usize = 50_000;
const LOG_EVERY_N_EVENTS: u64 = 1_000;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(30);

pub struct Ingestor {
    ctx: HandlerContext,
    feed_url: String,
    write_lock: WriteLock,
    dedup: DedupCache,
    dead_letters: DeadLetterBuffer,
    processed: u64,
    version_rejected: u64,
    started_at: Instant,
    processed_counter: Arc<AtomicU64>,
    dedup_size_counter: Arc<AtomicUsize>,
}

impl Ingestor {
    pub fn new(ctx: HandlerContext, cfg: &Config, write_lock: WriteLock) -> Self {
        Self {
            ctx,
            feed_url: cfg.feed_url.clone(),
            write_lock,
            dedup: DedupCache::new(DEDUP_SOFT_CAP),
            dead_letters: DeadLetterBuffer::new(),
            processed: 0,
            version_rejected: 0,
            started_at: Instant::now(),
            processed_counter: Arc::new(AtomicU64::new(0)),
            dedup_size_counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn processed_count(&self) -> u64 {
        self.processed
    }

    pub fn dedup_set_size(&self) -> usize {
        self.dedup.len()
    }

    /// Shared counters the HTTP status endpoint can read without touching the ingestor itself
    /// (which is moved into its own task by `run`).
    pub fn shared_counters(&self) -> (Arc<AtomicU64>, Arc<AtomicUsize>) {
        (self.processed_counter.clone(), self.dedup_size_counter.clone())
    }

    pub async fn run(mut self) -> Result<()> {
        let mut backoff = RECONNECT_BACKOFF;
        let mut socket = self.connect().await?;

        loop {
            let recv_result = socket.recv().await;
            let raw = match recv_result {
                Ok(msg) => msg
                    .into_vec()
                    .into_iter()
                    .next()
                    .map(|b| b.to_vec())
                    .unwrap_or_default(),
                Err(e) => {
                    warn!("upstream feed read failed, reconnecting in {backoff:?}: {e}");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);
                    socket = self.connect().await?;
                    continue;
                }
            };
            backoff = RECONNECT_BACKOFF;

            self.ingest_raw(raw).await;
            // Yield so the scheduler and HTTP listener get a chance between frames (§5).
            tokio::task::yield_now().await;
        }
    }

    async fn connect(&self) -> Result<zeromq::SubSocket> {
        let mut socket = zeromq::SubSocket::new();
        socket
            .connect(&self.feed_url)
            .await
            .with_context(|| format!("connecting to upstream feed {}", self.feed_url))?;
        socket.subscribe("").await.context("subscribing to all topics")?;
        info!("connected to upstream feed at {}", self.feed_url);
        Ok(socket)
    }

    /// Backpressure check (§4.4 step 1): buffer while the write-lock is held, otherwise drain
    /// anything buffered (in arrival order) before handling the new frame.
    async fn ingest_raw(&mut self, raw: Vec<u8>) {
        if self.write_lock.is_set() {
            self.dead_letters.push(raw);
            return;
        }

        if !self.dead_letters.is_empty() {
            for buffered in self.dead_letters.drain() {
                self.process_frame(buffered).await;
            }
        }

        self.process_frame(raw).await;
    }

    async fn process_frame(&mut self, raw: Vec<u8>) {
        match self.try_process_frame(raw).await {
            Ok(true) => {
                self.processed += 1;
                self.processed_counter.store(self.processed, Ordering::Relaxed);
                self.dedup_size_counter.store(self.dedup.len(), Ordering::Relaxed);
                if self.processed % LOG_EVERY_N_EVENTS == 0 {
                    let elapsed = self.started_at.elapsed().as_secs_f64().max(0.001);
                    info!(
                        "processed {} events, {:.1}/s average",
                        self.processed,
                        self.processed as f64 / elapsed
                    );
                }
            }
            Ok(false) => {
                // duplicate or recognized-but-no-op; not counted as a fresh processed event.
            }
            Err(crate::error::IngestError::VersionRejected(_)) => {
                self.version_rejected += 1;
            }
            Err(crate::error::IngestError::SchemaOutOfScope(_)) => {}
            Err(e) => {
                warn!("dropping frame: {e}");
            }
        }
    }

    async fn try_process_frame(&mut self, raw: Vec<u8>) -> Result<bool, crate::error::IngestError> {
        let text = frame::decompress(raw).await?;
        let parsed = frame::parse(&text)?;

        let Some(schema) = handlers::classify(&parsed.schema_ref) else {
            return Err(crate::error::IngestError::SchemaOutOfScope(parsed.schema_ref));
        };

        let version = parsed.header.gameversion.as_deref().unwrap_or("");
        handlers::version_gate(version)?;

        if !self.dedup.insert(parsed.dedup_key()) {
            debug!("dropping duplicate frame for {}", parsed.schema_ref);
            return Ok(false);
        }

        match schema {
            Schema::Commodity => crate::handlers::commodity::handle(&self.ctx, &parsed.message).await?,
            Schema::DiscoveryScan => crate::handlers::discovery_scan::handle(&self.ctx, &parsed.message).await?,
            Schema::NavRoute => crate::handlers::nav_route::handle(&self.ctx, &parsed.message).await?,
            Schema::ApproachSettlement => crate::handlers::approach_settlement::handle(&self.ctx, &parsed.message).await?,
            Schema::Journal => crate::handlers::journal::handle(&self.ctx, &parsed.message).await?,
        }

        Ok(true)
    }
}
