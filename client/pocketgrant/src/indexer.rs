//! Long-running background task that polls `eth_getLogs` and writes decoded
//! PocketGrant events to the database.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::chain::LogSource;
use crate::config::Config;
use crate::db;
use crate::errors::Result;
use crate::events::{self, EventKind};
use crate::types::Address;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct Indexer<S> {
    pool: SqlitePool,
    source: Arc<S>,
    contract: Address,
    poll_interval: Duration,
    block_range: u64,
    start_block: u64,
}

/// Result of one poll iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// First block the next iteration should read.
    pub next_block: u64,
    /// New rows written.
    pub inserted: usize,
    /// True when `next_block` is past the chain head.
    pub caught_up: bool,
}

impl<S: LogSource> Indexer<S> {
    pub fn new(pool: SqlitePool, source: Arc<S>, config: &Config) -> Self {
        Self {
            pool,
            source,
            contract: config.grant_address,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            block_range: config.log_block_range.max(1),
            start_block: config.start_block,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Block to resume from: one past the stored cursor, or the configured
    /// start block on a fresh database.
    pub async fn resume_block(&self) -> Result<u64> {
        Ok(match db::get_last_block(&self.pool).await? {
            Some(last) => (last + 1).max(self.start_block),
            None => self.start_block,
        })
    }

    /// Poll until `cancel` fires. Errors back off exponentially up to
    /// [`MAX_BACKOFF`]; a backlog is drained without sleeping.
    pub async fn run(self, cancel: CancellationToken) {
        info!("Indexer starting, contract: {}", self.contract);

        let mut next = loop {
            match self.resume_block().await {
                Ok(block) => break block,
                Err(e) => {
                    error!("Indexer could not read its cursor: {e}");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        };
        info!("Resuming from block {next}");

        let mut backoff = self.poll_interval;
        loop {
            let delay = match self.poll_once(next).await {
                Ok(progress) => {
                    next = progress.next_block;
                    backoff = self.poll_interval;
                    if progress.caught_up {
                        self.poll_interval
                    } else {
                        Duration::ZERO
                    }
                }
                Err(e) => {
                    warn!(from = next, retry_in = ?backoff, "Indexer poll error: {e}");
                    let delay = backoff;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    delay
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Indexer stopped at block {next}");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Index at most `block_range` blocks starting at `from`, then persist the
    /// cursor so restarts are deterministic.
    pub async fn poll_once(&self, from: u64) -> Result<Progress> {
        let head = self.source.block_number().await?;
        if from > head {
            return Ok(Progress {
                next_block: from,
                inserted: 0,
                caught_up: true,
            });
        }
        let to = head.min(from.saturating_add(self.block_range - 1));

        let logs = self
            .source
            .grant_logs(from, to, &EventKind::all_topics())
            .await?;
        let decoded: Vec<_> = logs
            .iter()
            .filter_map(|log| events::decode(log, self.contract))
            .collect();
        let inserted = if decoded.is_empty() {
            0
        } else {
            db::insert_events(&self.pool, &decoded).await?
        };
        if !logs.is_empty() {
            info!(from, to, "Polled {} logs -> {} new records stored", logs.len(), inserted);
        }

        db::save_cursor(&self.pool, to).await?;
        Ok(Progress {
            next_block: to + 1,
            inserted,
            caught_up: to == head,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::errors::ClientError;
    use crate::events::tests::{claimed_log, contract, created_log};
    use crate::types::Log;

    struct FakeLogs {
        head: Mutex<u64>,
        logs: Vec<Log>,
        fail: Mutex<u32>,
        ranges: Mutex<Vec<(u64, u64)>>,
    }

    impl FakeLogs {
        fn new(head: u64, logs: Vec<Log>) -> Arc<Self> {
            Arc::new(Self {
                head: Mutex::new(head),
                logs,
                fail: Mutex::new(0),
                ranges: Mutex::new(Vec::new()),
            })
        }
    }

    impl LogSource for FakeLogs {
        async fn block_number(&self) -> Result<u64> {
            let mut fail = self.fail.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(ClientError::Rpc {
                    code: -32000,
                    message: "header not found".to_string(),
                });
            }
            Ok(*self.head.lock().unwrap())
        }

        async fn grant_logs(&self, from: u64, to: u64, topics: &[[u8; 32]]) -> Result<Vec<Log>> {
            self.ranges.lock().unwrap().push((from, to));
            Ok(self
                .logs
                .iter()
                .filter(|l| {
                    let block = l.block_number.unwrap_or(0);
                    block >= from && block <= to && topics.contains(&l.topics[0])
                })
                .cloned()
                .collect())
        }
    }

    fn config(range: u64, start: u64) -> Config {
        let mut config = Config::for_tests();
        config.grant_address = contract();
        config.log_block_range = range;
        config.start_block = start;
        config.poll_interval_secs = 1;
        config
    }

    fn logs() -> Vec<Log> {
        vec![
            created_log(1, Address([0x11; 20]), 100_000, 12, 0),
            claimed_log(1, Address([0x22; 20]), 1_000, 15, 1),
            claimed_log(1, Address([0x23; 20]), 1_000, 31, 0),
        ]
    }

    #[tokio::test]
    async fn chunks_ranges_and_advances_cursor() {
        let pool = db::init_pool("sqlite::memory:").await.unwrap();
        let source = FakeLogs::new(35, logs());
        let indexer = Indexer::new(pool.clone(), source.clone(), &config(10, 10));

        assert_eq!(indexer.resume_block().await.unwrap(), 10);
        let first = indexer.poll_once(10).await.unwrap();
        assert_eq!(
            first,
            Progress {
                next_block: 20,
                inserted: 2,
                caught_up: false
            }
        );
        assert_eq!(db::get_last_block(&pool).await.unwrap(), Some(19));
        assert_eq!(indexer.resume_block().await.unwrap(), 20);

        let second = indexer.poll_once(20).await.unwrap();
        assert_eq!(second.inserted, 0);
        let third = indexer.poll_once(30).await.unwrap();
        assert_eq!(third.inserted, 1);
        assert!(third.caught_up);
        assert_eq!(third.next_block, 36);

        let idle = indexer.poll_once(36).await.unwrap();
        assert!(idle.caught_up);
        assert_eq!(idle.next_block, 36);
        assert_eq!(*source.ranges.lock().unwrap(), vec![(10, 19), (20, 29), (30, 35)]);
    }

    #[tokio::test]
    async fn reindexing_is_idempotent() {
        let pool = db::init_pool("sqlite::memory:").await.unwrap();
        let indexer = Indexer::new(pool.clone(), FakeLogs::new(40, logs()), &config(100, 0));

        assert_eq!(indexer.poll_once(0).await.unwrap().inserted, 3);
        assert_eq!(indexer.poll_once(0).await.unwrap().inserted, 0);
        assert_eq!(db::get_recent_events(&pool, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn run_retries_after_errors_and_stops_on_cancel() {
        let pool = db::init_pool("sqlite::memory:").await.unwrap();
        let source = FakeLogs::new(40, logs());
        *source.fail.lock().unwrap() = 2;
        let indexer = Indexer::new(pool.clone(), source.clone(), &config(100, 0))
            .with_poll_interval(Duration::from_millis(10));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(indexer.run(cancel.clone()));
        tokio::time::timeout(Duration::from_secs(5), async {
            while db::get_last_block(&pool).await.unwrap() != Some(40) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(*source.fail.lock().unwrap(), 0);
        assert_eq!(db::get_recent_events(&pool, 10).await.unwrap().len(), 3);

        cancel.cancel();
        task.await.unwrap();
    }
}
