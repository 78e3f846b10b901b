//! # Redis
//!
//! Document store holding the admin code registry.
//!
//! ## Requirements
//!
//! - One key, one JSON document, a handful of codes
//! - Atomic read-modify-write that holds across every server instance
//! - A conflicting concurrent commit aborts instead of overwriting
//!
//! ## Implementation
//!
//! - Plain reads go through the shared `ConnectionManager`
//! - Each transaction opens its own connection, `WATCH` state lives on the connection
//! - `WATCH key` + `GET key`, then `MULTI` / `SET` / `EXEC`
//! - A nil `EXEC` reply means someone wrote the key after our `WATCH`, so the attempt is rerun
//!   from the read
//! - Attempts are bounded by [`RetryPolicy`], after which the caller gets
//!   [`StoreError::RetryExhausted`]
use std::{
    future::Future,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use backon::{ExponentialBuilder, Retryable};
use redis::{
    AsyncCommands, Client, RedisError, Value,
    aio::{ConnectionManager, ConnectionManagerConfig, MultiplexedConnection},
};
use registry::{AdminCodeRegistry, RegistryError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::{RetryPolicy, StoreBackend, StoreConfig},
    memory::{MemoryStore, MemoryTransaction},
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Transaction conflict")]
    Conflict,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Document(#[from] RegistryError),

    #[error("Transaction gave up after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Conflict | StoreError::Unavailable(_) => true,
            StoreError::Redis(e) => {
                e.is_io_error()
                    || e.is_timeout()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
            }
            StoreError::Document(_) | StoreError::RetryExhausted { .. } => false,
        }
    }
}

pub trait DocumentStore: Send + Sync {
    type Transaction: StoreTransaction;

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, StoreError>> + Send;

    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Optimistic transaction handle.
///
/// Keys read through [`StoreTransaction::get`] are watched. Writes are buffered until
/// [`StoreTransaction::commit`], which returns `false` when any watched key changed in the
/// meantime and nothing was written.
pub trait StoreTransaction: Send {
    fn get(&mut self, key: &str)
    -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn set(&mut self, key: &str, value: String);

    fn commit(self) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// A value stored as one string under one key.
pub trait Document: Sized {
    fn encode(&self) -> Result<String, RegistryError>;

    fn decode(raw: &str) -> Result<Self, RegistryError>;
}

impl Document for AdminCodeRegistry {
    fn encode(&self) -> Result<String, RegistryError> {
        AdminCodeRegistry::encode(self)
    }

    fn decode(raw: &str) -> Result<Self, RegistryError> {
        AdminCodeRegistry::decode(raw)
    }
}

/// What a transaction body decided: the document to write back, if any, and the value to return.
pub struct TxPlan<T, R> {
    pub write: Option<T>,
    pub output: R,
}

impl<T, R> TxPlan<T, R> {
    pub fn read_only(output: R) -> Self {
        Self {
            write: None,
            output,
        }
    }

    pub fn write(document: T, output: R) -> Self {
        Self {
            write: Some(document),
            output,
        }
    }
}

/// Runs `decide` against the current document at `key` as one atomic read-modify-write.
///
/// `decide` may run several times, once per attempt, so it must not have side effects.
pub async fn run_transaction<S, T, R, F>(
    store: &S,
    key: &str,
    policy: &RetryPolicy,
    decide: F,
) -> Result<R, StoreError>
where
    S: DocumentStore,
    T: Document + Send,
    R: Send,
    F: Fn(Option<T>) -> TxPlan<T, R> + Sync,
{
    let backoff = ExponentialBuilder::default()
        .with_min_delay(policy.initial_backoff)
        .with_max_delay(policy.max_backoff)
        .with_max_times(policy.max_attempts.saturating_sub(1) as usize)
        .with_jitter();

    let attempts = AtomicU32::new(0);
    let attempts_ref = &attempts;
    let decide = &decide;

    let attempt = move || async move {
        attempts_ref.fetch_add(1, Ordering::Relaxed);

        let mut transaction = store.begin().await?;
        let current = transaction
            .get(key)
            .await?
            .map(|raw| T::decode(&raw))
            .transpose()?;

        let TxPlan { write, output } = decide(current);
        let Some(document) = write else {
            return Ok(output);
        };

        transaction.set(key, document.encode()?);

        if transaction.commit().await? {
            Ok(output)
        } else {
            Err(StoreError::Conflict)
        }
    };

    attempt
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(StoreError::is_retryable)
        .notify(|err: &StoreError, delay: Duration| {
            debug!(
                key,
                error = %err,
                backoff_ms = delay.as_millis() as u64,
                "retrying transaction"
            );
        })
        .await
        .map_err(|e| {
            if e.is_retryable() {
                let attempts = attempts.load(Ordering::Relaxed);
                warn!(key, attempts, error = %e, "transaction retries exhausted");

                StoreError::RetryExhausted {
                    attempts,
                    last_error: e.to_string(),
                }
            } else {
                e
            }
        })
}

#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(100));

        let client = Client::open(redis_url)?;
        let connection = client.get_connection_manager_with_config(config).await?;

        Ok(Self { client, connection })
    }
}

impl DocumentStore for RedisStore {
    type Transaction = RedisTransaction;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.get(key).await?;

        Ok(value)
    }

    async fn begin(&self) -> Result<RedisTransaction, StoreError> {
        let connection = self.client.get_multiplexed_async_connection().await?;

        Ok(RedisTransaction {
            connection,
            writes: Vec::new(),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        redis::cmd("PING").query_async::<()>(&mut connection).await?;

        Ok(())
    }
}

pub struct RedisTransaction {
    connection: MultiplexedConnection,
    writes: Vec<(String, String)>,
}

impl StoreTransaction for RedisTransaction {
    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        redis::cmd("WATCH")
            .arg(key)
            .query_async::<()>(&mut self.connection)
            .await?;

        let value: Option<String> = self.connection.get(key).await?;

        Ok(value)
    }

    fn set(&mut self, key: &str, value: String) {
        self.writes.push((key.to_string(), value));
    }

    async fn commit(mut self) -> Result<bool, StoreError> {
        if self.writes.is_empty() {
            redis::cmd("UNWATCH")
                .query_async::<()>(&mut self.connection)
                .await?;
            return Ok(true);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in &self.writes {
            pipe.set(key, value);
        }

        // EXEC replies nil when a watched key changed
        let reply: Option<Vec<Value>> = pipe.query_async(&mut self.connection).await?;

        Ok(reply.is_some())
    }
}

/// Backend chosen at startup.
#[derive(Clone)]
pub enum Store {
    Redis(RedisStore),
    Memory(MemoryStore),
}

impl Store {
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        match config.backend {
            StoreBackend::Redis => {
                info!("Connecting to Redis...");
                Ok(Store::Redis(RedisStore::connect(&config.redis_url).await?))
            }
            StoreBackend::Memory => {
                warn!("Using in-memory store, claims are not shared across instances");
                Ok(Store::Memory(MemoryStore::new()))
            }
        }
    }
}

pub enum Transaction {
    Redis(RedisTransaction),
    Memory(MemoryTransaction),
}

impl DocumentStore for Store {
    type Transaction = Transaction;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Store::Redis(store) => store.get(key).await,
            Store::Memory(store) => store.get(key).await,
        }
    }

    async fn begin(&self) -> Result<Transaction, StoreError> {
        match self {
            Store::Redis(store) => Ok(Transaction::Redis(store.begin().await?)),
            Store::Memory(store) => Ok(Transaction::Memory(store.begin().await?)),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match self {
            Store::Redis(store) => store.ping().await,
            Store::Memory(store) => store.ping().await,
        }
    }
}

impl StoreTransaction for Transaction {
    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Transaction::Redis(tx) => tx.get(key).await,
            Transaction::Memory(tx) => tx.get(key).await,
        }
    }

    fn set(&mut self, key: &str, value: String) {
        match self {
            Transaction::Redis(tx) => tx.set(key, value),
            Transaction::Memory(tx) => tx.set(key, value),
        }
    }

    async fn commit(self) -> Result<bool, StoreError> {
        match self {
            Transaction::Redis(tx) => tx.commit().await,
            Transaction::Memory(tx) => tx.commit().await,
        }
    }
}
