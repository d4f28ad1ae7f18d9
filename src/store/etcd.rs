//! etcd v3 client adapter (feature `etcd`).

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use etcd_client::{Client, ConnectOptions, EventType, GetOptions, WatchOptions};

use crate::store::{EventKind, KeyValue, KvStore, StoreError, WatchEvent, WatchStream};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(120);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// `KvStore` backed by an etcd cluster.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Dial the given endpoints.
    pub async fn connect(endpoints: &[String], dial_timeout: Duration) -> Result<Self, StoreError> {
        let options = ConnectOptions::new()
            .with_connect_timeout(dial_timeout)
            .with_keep_alive(KEEP_ALIVE_INTERVAL, KEEP_ALIVE_TIMEOUT);

        let client = Client::connect(endpoints, Some(options))
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        tracing::info!(endpoints = ?endpoints, "Connected to etcd");
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn request_err(e: etcd_client::Error) -> StoreError {
    StoreError::Request(e.to_string())
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut client = self.client.clone();
        let resp = client.get(key, None).await.map_err(request_err)?;
        Ok(resp
            .kvs()
            .first()
            .map(|kv| Bytes::copy_from_slice(kv.value())))
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>, StoreError> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(request_err)?;

        resp.kvs()
            .iter()
            .map(|kv| {
                Ok(KeyValue {
                    key: kv.key_str().map_err(request_err)?.to_string(),
                    value: Bytes::copy_from_slice(kv.value()),
                })
            })
            .collect()
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        client
            .put(key, value.to_vec(), None)
            .await
            .map_err(request_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut client = self.client.clone();
        let resp = client.delete(key, None).await.map_err(request_err)?;
        Ok(resp.deleted() > 0)
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream, StoreError> {
        let mut client = self.client.clone();
        let (watcher, stream) = client
            .watch(prefix, Some(WatchOptions::new().with_prefix().with_prev_key()))
            .await
            .map_err(|e| StoreError::Watch(e.to_string()))?;

        // the watcher handle is carried along so the stream stays registered
        let stream = futures_util::stream::unfold(
            (watcher, stream),
            |(watcher, mut stream)| async move {
                match stream.message().await {
                    Ok(Some(resp)) => {
                        let events = resp
                            .events()
                            .iter()
                            .filter_map(|ev| {
                                let kv = ev.kv()?;
                                let key = kv.key_str().ok()?.to_string();
                                let kind = match ev.event_type() {
                                    EventType::Put => EventKind::Put,
                                    EventType::Delete => EventKind::Delete,
                                };
                                Some(WatchEvent {
                                    kind,
                                    key,
                                    value: Bytes::copy_from_slice(kv.value()),
                                    prev_value: ev.prev_kv().map(|p| Bytes::copy_from_slice(p.value())),
                                })
                            })
                            .collect();
                        Some((Ok(events), (watcher, stream)))
                    }
                    Ok(None) => None,
                    Err(e) => Some((Err(StoreError::Watch(e.to_string())), (watcher, stream))),
                }
            },
        );

        Ok(Box::pin(stream))
    }
}
