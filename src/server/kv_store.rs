use super::{
    clock::Clock,
    config::StoreConfig,
    entry::Entry,
    expiry::{is_expired, remove_expired, resolve_expires_at},
};
use crate::common::codec::{Condition, SetOptions};
use anyhow::Result;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

type Key = Bytes;

/// Result of a SET, which may be skipped by its NX/XX condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Stored,
    NotSet,
}

/// A key-value store whose entries may carry an absolute expiration time.
///
/// The store is owned by a single task, so every message is handled to
/// completion before the next one starts. Expired entries are never visible:
/// every access checks expiry first and drops what it finds expired, and an
/// interval removes the rest in the background.
pub struct KVStore {
    receiver: mpsc::Receiver<KVStoreMessage>,
    active_expiration_interval: Interval,
    clock: Arc<dyn Clock>,
    entries: HashMap<Key, Entry>,
}

pub enum KVStoreMessage {
    Set {
        key: Key,
        value: Bytes,
        options: SetOptions,
        respond_to: oneshot::Sender<SetOutcome>,
    },
    Put {
        key: Key,
        value: Bytes,
        expires_at: Option<u64>,
    },
    Get {
        key: Key,
        respond_to: oneshot::Sender<Option<Bytes>>,
    },
    Del {
        keys: Vec<Key>,
        respond_to: oneshot::Sender<usize>,
    },
    Exists {
        key: Key,
        respond_to: oneshot::Sender<bool>,
    },
    DbSize {
        respond_to: oneshot::Sender<usize>,
    },
    Shutdown,
}

impl KVStore {
    pub fn new(
        receiver: mpsc::Receiver<KVStoreMessage>,
        active_expiration_interval: Interval,
        clock: Arc<dyn Clock>,
    ) -> Self {
        KVStore {
            receiver,
            active_expiration_interval,
            clock,
            entries: HashMap::new(),
        }
    }

    fn handle_message(&mut self, msg: KVStoreMessage) {
        let now = self.clock.now_millis();

        match msg {
            KVStoreMessage::Set {
                key,
                value,
                options,
                respond_to,
            } => {
                let outcome = self.set(key, value, options, now);
                let _ = respond_to
                    .send(outcome)
                    .inspect_err(|err| log::error!("Failed to send response: {:?}", err));
            }
            KVStoreMessage::Put {
                key,
                value,
                expires_at,
            } => self.put(key, value, expires_at),
            KVStoreMessage::Get { key, respond_to } => {
                let value = self.get(&key, now);
                let _ = respond_to
                    .send(value)
                    .inspect_err(|err| log::error!("Failed to send response: {:?}", err));
            }
            KVStoreMessage::Del { keys, respond_to } => {
                let removed = keys.iter().map(|key| self.delete(key, now)).sum::<usize>();
                let _ = respond_to
                    .send(removed)
                    .inspect_err(|err| log::error!("Failed to send response: {:?}", err));
            }
            KVStoreMessage::Exists { key, respond_to } => {
                let exists = self.exists(&key, now);
                let _ = respond_to
                    .send(exists)
                    .inspect_err(|err| log::error!("Failed to send response: {:?}", err));
            }
            KVStoreMessage::DbSize { respond_to } => {
                let _ = respond_to
                    .send(self.entries.len())
                    .inspect_err(|err| log::error!("Failed to send response: {:?}", err));
            }
            KVStoreMessage::Shutdown => {
                self.receiver.close();
            }
        }
    }

    /// The entry for `key` if it is still alive at `now`. An expired entry is
    /// removed on the way.
    fn live_entry(&mut self, key: &Key, now: u64) -> Option<&Entry> {
        if self
            .entries
            .get(key)
            .is_some_and(|entry| is_expired(entry, now))
        {
            log::debug!("Lazily expired key {:?}", key);
            self.entries.remove(key);
            return None;
        }

        self.entries.get(key)
    }

    fn get(&mut self, key: &Key, now: u64) -> Option<Bytes> {
        self.live_entry(key, now).map(|entry| entry.value().clone())
    }

    fn exists(&mut self, key: &Key, now: u64) -> bool {
        self.live_entry(key, now).is_some()
    }

    fn put(&mut self, key: Key, value: Bytes, expires_at: Option<u64>) {
        self.entries.insert(key, Entry::new(value, expires_at));
    }

    /// Removes `key` if it is alive, returning the number of keys removed. An
    /// expired entry counts as already gone.
    fn delete(&mut self, key: &Key, now: u64) -> usize {
        if !self.exists(key, now) {
            return 0;
        }

        self.entries.remove(key);
        1
    }

    /// The whole conditional SET: existence check, expiry resolution and
    /// write happen within one message.
    fn set(&mut self, key: Key, value: Bytes, options: SetOptions, now: u64) -> SetOutcome {
        let live = self.live_entry(&key, now);

        match (options.condition, live.is_some()) {
            (Some(Condition::Nx), true) | (Some(Condition::Xx), false) => {
                return SetOutcome::NotSet
            }
            _ => {}
        }

        let expires_at = resolve_expires_at(options.expiry, now, live);
        self.put(key, value, expires_at);
        SetOutcome::Stored
    }

    fn remove_expired(&mut self) {
        let removed = remove_expired(&mut self.entries, self.clock.now_millis());
        if removed > 0 {
            log::debug!("Active expiration removed {} keys", removed);
        }
    }
}

/// Run the KVStore until it is shut down. The KVStore will handle messages and remove expired entries.
/// When the KVStore is shut down, a message will be sent to the `on_shutdown_complete` sender.
/// The KVStore will not accept any more messages after it is shut down but will finish all of the
/// in-flight requests.
async fn run_kv_store(mut kv_store: KVStore, on_shutdown_complete: oneshot::Sender<()>) {
    log::info!("KV store started");

    loop {
        tokio::select! {
            msg = kv_store.receiver.recv() => match msg {
                Some(msg) => kv_store.handle_message(msg),
                None => break,
            },
            _ = kv_store.active_expiration_interval.tick() => kv_store.remove_expired(),
        }
    }

    log::info!("KV store shut down");

    on_shutdown_complete.send(()).ok();
}

/// A handle to the KVStore. Cloning the handle is cheap; all clones talk to the same store.
#[derive(Clone)]
pub struct KVStoreHandle {
    sender: mpsc::Sender<KVStoreMessage>,
}

impl KVStoreHandle {
    /// Spawn a KVStore task and return a handle to it, along with a oneshot receiver that will be
    /// signalled when the KVStore is shut down. Must be called from within a Tokio runtime.
    pub fn new(config: StoreConfig, clock: Arc<dyn Clock>) -> (Self, oneshot::Receiver<()>) {
        let (sender, receiver) = mpsc::channel(config.channel_capacity);
        let (on_shutdown_complete, shutdown_complete) = oneshot::channel();
        let mut active_expiration_interval =
            interval_at(Instant::now() + config.sweep_interval, config.sweep_interval);
        active_expiration_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let kv_store = KVStore::new(receiver, active_expiration_interval, clock);
        tokio::spawn(run_kv_store(kv_store, on_shutdown_complete));
        (KVStoreHandle { sender }, shutdown_complete)
    }

    /// Execute a SET with its NX/XX condition and expiry option.
    pub async fn set(&self, key: Key, value: Bytes, options: SetOptions) -> Result<SetOutcome> {
        let (respond_to, response) = oneshot::channel();
        let msg = KVStoreMessage::Set {
            key,
            value,
            options,
            respond_to,
        };
        self.sender.send(msg).await?;
        response.await.map_err(Into::into)
    }

    /// Unconditionally install `value` under `key`, replacing any existing entry.
    pub async fn put(&self, key: Key, value: Bytes, expires_at: Option<u64>) -> Result<()> {
        let msg = KVStoreMessage::Put {
            key,
            value,
            expires_at,
        };
        self.sender.send(msg).await?;
        Ok(())
    }

    /// Get the value for a key, or `None` if it is missing or expired.
    pub async fn get(&self, key: Key) -> Result<Option<Bytes>> {
        let (respond_to, response) = oneshot::channel();
        let msg = KVStoreMessage::Get { key, respond_to };
        self.sender.send(msg).await?;
        response.await.map_err(Into::into)
    }

    /// Delete the given keys, returning how many of them were alive.
    pub async fn del(&self, keys: Vec<Key>) -> Result<usize> {
        let (respond_to, response) = oneshot::channel();
        let msg = KVStoreMessage::Del { keys, respond_to };
        self.sender.send(msg).await?;
        response.await.map_err(Into::into)
    }

    pub async fn exists(&self, key: Key) -> Result<bool> {
        let (respond_to, response) = oneshot::channel();
        let msg = KVStoreMessage::Exists { key, respond_to };
        self.sender.send(msg).await?;
        response.await.map_err(Into::into)
    }

    /// Number of physically stored entries, including expired ones the sweep
    /// has not reclaimed yet.
    pub async fn dbsize(&self) -> Result<usize> {
        let (respond_to, response) = oneshot::channel();
        let msg = KVStoreMessage::DbSize { respond_to };
        self.sender.send(msg).await?;
        response.await.map_err(Into::into)
    }

    pub async fn shutdown(&self) -> Result<()> {
        let msg = KVStoreMessage::Shutdown;
        self.sender.send(msg).await?;
        Ok(())
    }
}

#[cfg(test)]
use super::clock::ManualClock;
#[cfg(test)]
use crate::common::codec::Expiry;
#[cfg(test)]
use std::time::Duration;

#[cfg(test)]
const TEST_NOW: u64 = 1_700_000_000_000;

#[cfg(test)]
fn test_store() -> (KVStoreHandle, ManualClock) {
    let clock = ManualClock::new(TEST_NOW);
    let (kv_store, _) = KVStoreHandle::new(StoreConfig::default(), Arc::new(clock.clone()));
    (kv_store, clock)
}

#[cfg(test)]
fn key(name: &'static str) -> Bytes {
    Bytes::from_static(name.as_bytes())
}

#[tokio::test(start_paused = true)]
async fn test_set_and_get() {
    let (kv_store, _) = test_store();

    let outcome = kv_store
        .set(key("k"), key("v"), SetOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, SetOutcome::Stored);

    let result = kv_store.get(key("k")).await.unwrap();
    assert_eq!(result, Some(key("v")));

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_overwrite_resets_expiry() {
    let (kv_store, clock) = test_store();

    kv_store
        .set(key("k"), key("v1"), SetOptions::default().with_expiry(Expiry::Ex(1)))
        .await
        .unwrap();
    kv_store
        .set(key("k"), key("v2"), SetOptions::default())
        .await
        .unwrap();

    clock.advance(Duration::from_secs(10));

    let result = kv_store.get(key("k")).await.unwrap();
    assert_eq!(result, Some(key("v2")));

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_ex_expires() {
    let (kv_store, clock) = test_store();

    kv_store
        .set(key("k"), key("v"), SetOptions::default().with_expiry(Expiry::Ex(1)))
        .await
        .unwrap();
    assert_eq!(kv_store.get(key("k")).await.unwrap(), Some(key("v")));

    clock.advance(Duration::from_millis(999));
    assert_eq!(kv_store.get(key("k")).await.unwrap(), Some(key("v")));

    clock.advance(Duration::from_millis(1));
    assert_eq!(kv_store.get(key("k")).await.unwrap(), None);

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_past_absolute_expiry_is_stored_but_invisible() {
    let (kv_store, _) = test_store();

    for expiry in [Expiry::PxAt(123123), Expiry::ExAt(123123)] {
        let outcome = kv_store
            .set(key("k2"), key("v2"), SetOptions::default().with_expiry(expiry))
            .await
            .unwrap();
        assert_eq!(outcome, SetOutcome::Stored);
        assert_eq!(kv_store.get(key("k2")).await.unwrap(), None);
    }

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_absolute_expiry_in_future() {
    let (kv_store, clock) = test_store();
    let in_a_minute = TEST_NOW + 60_000;

    kv_store
        .set(
            key("k1"),
            key("v1"),
            SetOptions::default().with_expiry(Expiry::PxAt(in_a_minute)),
        )
        .await
        .unwrap();
    assert_eq!(kv_store.get(key("k1")).await.unwrap(), Some(key("v1")));

    clock.advance(Duration::from_secs(2));
    assert_eq!(kv_store.del(vec![key("k1")]).await.unwrap(), 1);
    assert_eq!(kv_store.del(vec![key("k1")]).await.unwrap(), 0);

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_xx() {
    let (kv_store, _) = test_store();

    let outcome = kv_store.set(key("k"), key("v"), SetOptions::xx()).await.unwrap();
    assert_eq!(outcome, SetOutcome::NotSet);
    assert_eq!(kv_store.get(key("k")).await.unwrap(), None);

    kv_store
        .set(key("k"), key("v1"), SetOptions::default())
        .await
        .unwrap();
    for value in ["v2", "v3"] {
        let outcome = kv_store.set(key("k"), key(value), SetOptions::xx()).await.unwrap();
        assert_eq!(outcome, SetOutcome::Stored);
    }
    assert_eq!(kv_store.get(key("k")).await.unwrap(), Some(key("v3")));

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_xx_on_expired_key_is_skipped() {
    let (kv_store, clock) = test_store();

    kv_store
        .set(key("k"), key("v"), SetOptions::default().with_expiry(Expiry::Px(10)))
        .await
        .unwrap();
    clock.advance(Duration::from_millis(10));

    let outcome = kv_store
        .set(key("k"), key("v2"), SetOptions::xx().with_expiry(Expiry::Ex(1)))
        .await
        .unwrap();
    assert_eq!(outcome, SetOutcome::NotSet);
    assert_eq!(kv_store.get(key("k")).await.unwrap(), None);

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_nx() {
    let (kv_store, clock) = test_store();

    let outcome = kv_store
        .set(key("k"), key("v1"), SetOptions::nx().with_expiry(Expiry::Px(10)))
        .await
        .unwrap();
    assert_eq!(outcome, SetOutcome::Stored);

    let outcome = kv_store.set(key("k"), key("v2"), SetOptions::nx()).await.unwrap();
    assert_eq!(outcome, SetOutcome::NotSet);
    assert_eq!(kv_store.get(key("k")).await.unwrap(), Some(key("v1")));

    clock.advance(Duration::from_millis(10));

    let outcome = kv_store.set(key("k"), key("v3"), SetOptions::nx()).await.unwrap();
    assert_eq!(outcome, SetOutcome::Stored);
    assert_eq!(kv_store.get(key("k")).await.unwrap(), Some(key("v3")));

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_keepttl() {
    let (kv_store, clock) = test_store();

    kv_store
        .set(key("k"), key("v1"), SetOptions::default().with_expiry(Expiry::Px(100)))
        .await
        .unwrap();
    kv_store
        .set(key("k"), key("v2"), SetOptions::default().with_expiry(Expiry::KeepTtl))
        .await
        .unwrap();
    assert_eq!(kv_store.get(key("k")).await.unwrap(), Some(key("v2")));

    clock.advance(Duration::from_millis(100));
    assert_eq!(kv_store.get(key("k")).await.unwrap(), None);

    kv_store
        .set(key("k"), key("v3"), SetOptions::default().with_expiry(Expiry::KeepTtl))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(3600));
    assert_eq!(kv_store.get(key("k")).await.unwrap(), Some(key("v3")));

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_put_and_exists() {
    let (kv_store, clock) = test_store();

    kv_store
        .put(key("k"), key("v"), Some(TEST_NOW + 50))
        .await
        .unwrap();
    assert!(kv_store.exists(key("k")).await.unwrap());

    clock.advance(Duration::from_millis(50));
    assert!(!kv_store.exists(key("k")).await.unwrap());

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_del_counts_only_live_keys() {
    let (kv_store, clock) = test_store();

    kv_store.put(key("a"), key("1"), None).await.unwrap();
    kv_store
        .put(key("b"), key("2"), Some(TEST_NOW + 10))
        .await
        .unwrap();
    clock.advance(Duration::from_millis(10));

    let removed = kv_store
        .del(vec![key("a"), key("b"), key("missing"), key("a")])
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(kv_store.get(key("a")).await.unwrap(), None);
    assert_eq!(kv_store.dbsize().await.unwrap(), 0);

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_active_expiration_reclaims_without_access() {
    let clock = ManualClock::new(TEST_NOW);
    let config = StoreConfig::default().with_sweep_interval(Duration::from_millis(100));
    let (kv_store, _) = KVStoreHandle::new(config, Arc::new(clock.clone()));

    kv_store
        .put(key("short"), key("v"), Some(TEST_NOW + 10))
        .await
        .unwrap();
    kv_store.put(key("forever"), key("v"), None).await.unwrap();
    assert_eq!(kv_store.dbsize().await.unwrap(), 2);

    clock.advance(Duration::from_millis(10));
    assert_eq!(kv_store.dbsize().await.unwrap(), 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(kv_store.dbsize().await.unwrap(), 1);
    assert_eq!(kv_store.get(key("forever")).await.unwrap(), Some(key("v")));

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_get_non_existent_key() {
    let (kv_store, _) = test_store();

    let result = kv_store.get(key("non_existent_key")).await.unwrap();
    assert_eq!(result, None);

    kv_store.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown() {
    let (kv_store, shutdown_complete) =
        KVStoreHandle::new(StoreConfig::default(), Arc::new(ManualClock::new(TEST_NOW)));

    kv_store.shutdown().await.unwrap();

    // Wait for the shutdown to complete
    shutdown_complete.await.unwrap();

    // Attempting to use the KVStore after shutdown should result in an error
    let result = kv_store
        .set(key("test_key"), key("test_value"), SetOptions::default())
        .await;
    assert!(result.is_err());

    let result = kv_store.get(key("test_key")).await;
    assert!(result.is_err());
}
