//! Host-owned store of named, scoped data slices.
//!
//! Panels read slices through a [`SliceReader`] and may request a refresh;
//! only the host writes. Reads hand out the stored `Arc` itself, so two reads
//! without an intervening write observe the same object.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use markpane_events::EventBus;
use markpane_protocol::{SliceError, SliceScope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Current state of one slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSlice<T = Value> {
    pub scope: SliceScope,
    pub name: String,
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<SliceError>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> DataSlice<T> {
    pub fn empty(scope: SliceScope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
            data: None,
            loading: false,
            error: None,
            updated_at: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

impl DataSlice<Value> {
    /// Decode the JSON data into `T`; `Ok(None)` when no data is present.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.data {
            Some(v) => T::deserialize(v).map(Some),
            None => Ok(None),
        }
    }
}

/// Host-side fetch logic behind a slice's refresh.
#[async_trait::async_trait]
pub trait SliceFetcher: Send + Sync {
    async fn fetch(&self, scope: SliceScope, name: &str) -> Result<Value, SliceError>;
}

struct FnFetcher<F>(F);

#[async_trait::async_trait]
impl<F, Fut> SliceFetcher for FnFetcher<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, SliceError>> + Send,
{
    async fn fetch(&self, _scope: SliceScope, _name: &str) -> Result<Value, SliceError> {
        (self.0)().await
    }
}

/// Wrap an async closure as a [`SliceFetcher`].
pub fn fetcher_fn<F, Fut>(f: F) -> Arc<dyn SliceFetcher>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, SliceError>> + Send + 'static,
{
    Arc::new(FnFetcher(f))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SliceStoreError {
    #[error("unknown slice {scope}/{name}")]
    Unknown { scope: &'static str, name: String },
    #[error("slice {scope}/{name} has no fetcher")]
    NoFetcher { scope: &'static str, name: String },
}

type SliceKey = (SliceScope, String);

struct Slot {
    slice: Arc<DataSlice>,
    fetcher: Option<Arc<dyn SliceFetcher>>,
    // Bumped on every refresh start; completions from older refreshes are dropped.
    refresh_seq: u64,
}

/// Key-value store of slices, keyed by scope and name.
pub struct DataSliceStore {
    slots: RwLock<HashMap<SliceKey, Slot>>,
    bus: Option<EventBus>,
}

impl Default for DataSliceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSliceStore {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            bus: None,
        }
    }

    /// Store that announces every change as `host:slice-changed` on `bus`.
    pub fn with_bus(bus: EventBus) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            bus: Some(bus),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SliceKey, Slot>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SliceKey, Slot>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, scope: SliceScope, name: &str) {
        if let Some(bus) = &self.bus {
            bus.publish(
                markpane_topics::TOPIC_SLICE_CHANGED,
                markpane_topics::SOURCE_HOST,
                &json!({ "scope": scope, "name": name }),
            );
        }
    }

    fn update<F>(&self, scope: SliceScope, name: &str, f: F) -> Arc<DataSlice>
    where
        F: FnOnce(&mut DataSlice),
    {
        let updated = {
            let mut slots = self.write();
            let slot = slots
                .entry((scope, name.to_string()))
                .or_insert_with(|| Slot {
                    slice: Arc::new(DataSlice::empty(scope, name)),
                    fetcher: None,
                    refresh_seq: 0,
                });
            let mut next = (*slot.slice).clone();
            f(&mut next);
            slot.slice = Arc::new(next);
            slot.slice.clone()
        };
        self.notify(scope, name);
        updated
    }

    /// Create (or keep) a slice whose refresh runs `fetcher`.
    pub fn register(&self, scope: SliceScope, name: &str, fetcher: Arc<dyn SliceFetcher>) {
        {
            let mut slots = self.write();
            let slot = slots
                .entry((scope, name.to_string()))
                .or_insert_with(|| Slot {
                    slice: Arc::new(DataSlice::empty(scope, name)),
                    fetcher: None,
                    refresh_seq: 0,
                });
            slot.fetcher = Some(fetcher);
        }
        tracing::debug!(scope = scope.as_str(), name, "slice registered");
        self.notify(scope, name);
    }

    /// Replace the slice data, clearing any loading or error state.
    pub fn set(&self, scope: SliceScope, name: &str, data: Value) -> Arc<DataSlice> {
        self.update(scope, name, |slice| {
            slice.data = Some(data);
            slice.loading = false;
            slice.error = None;
            slice.updated_at = Some(Utc::now());
        })
    }

    /// Record a failure; existing data is kept.
    pub fn set_error(&self, scope: SliceScope, name: &str, error: SliceError) -> Arc<DataSlice> {
        self.update(scope, name, |slice| {
            slice.loading = false;
            slice.error = Some(error);
        })
    }

    pub fn get(&self, scope: SliceScope, name: &str) -> Option<Arc<DataSlice>> {
        self.read()
            .get(&(scope, name.to_string()))
            .map(|slot| slot.slice.clone())
    }

    /// Lookup across scopes; repository slices shadow workspace slices.
    pub fn get_slice(&self, name: &str) -> Option<Arc<DataSlice>> {
        self.get(SliceScope::Repository, name)
            .or_else(|| self.get(SliceScope::Workspace, name))
    }

    pub fn get_workspace_slice(&self, name: &str) -> Option<Arc<DataSlice>> {
        self.get(SliceScope::Workspace, name)
    }

    pub fn get_repository_slice(&self, name: &str) -> Option<Arc<DataSlice>> {
        self.get(SliceScope::Repository, name)
    }

    pub fn has_slice(&self, name: &str) -> bool {
        self.get_slice(name).is_some()
    }

    pub fn is_slice_loading(&self, name: &str) -> bool {
        self.get_slice(name).is_some_and(|s| s.loading)
    }

    pub fn names(&self, scope: SliceScope) -> Vec<String> {
        let mut names: Vec<String> = self
            .read()
            .keys()
            .filter(|(s, _)| *s == scope)
            .map(|(_, n)| n.clone())
            .collect();
        names.sort();
        names
    }

    pub fn remove(&self, scope: SliceScope, name: &str) -> bool {
        let removed = self.write().remove(&(scope, name.to_string())).is_some();
        if removed {
            self.notify(scope, name);
        }
        removed
    }

    /// Drop every slice of `scope` (eg. when a repository is closed).
    pub fn clear_scope(&self, scope: SliceScope) -> usize {
        let removed: Vec<String> = {
            let mut slots = self.write();
            let keys: Vec<SliceKey> = slots.keys().filter(|(s, _)| *s == scope).cloned().collect();
            for key in &keys {
                slots.remove(key);
            }
            keys.into_iter().map(|(_, n)| n).collect()
        };
        tracing::info!(scope = scope.as_str(), count = removed.len(), "slice scope cleared");
        for name in &removed {
            self.notify(scope, name);
        }
        removed.len()
    }

    /// Re-fetch a slice. Stale data stays visible while the fetch runs and
    /// after a failed fetch. Safe to call again while a refresh is in flight;
    /// only the most recently started refresh updates the slice.
    pub async fn refresh(
        &self,
        scope: SliceScope,
        name: &str,
    ) -> Result<Arc<DataSlice>, SliceStoreError> {
        let (fetcher, seq) = {
            let mut slots = self.write();
            let slot = slots
                .get_mut(&(scope, name.to_string()))
                .ok_or_else(|| SliceStoreError::Unknown {
                    scope: scope.as_str(),
                    name: name.to_string(),
                })?;
            let fetcher = slot.fetcher.clone().ok_or_else(|| SliceStoreError::NoFetcher {
                scope: scope.as_str(),
                name: name.to_string(),
            })?;
            slot.refresh_seq += 1;
            let mut next = (*slot.slice).clone();
            next.loading = true;
            next.error = None;
            slot.slice = Arc::new(next);
            (fetcher, slot.refresh_seq)
        };
        self.notify(scope, name);

        let mut pending = PendingRefresh {
            store: self,
            scope,
            name,
            seq,
            settled: false,
        };
        let result = fetcher.fetch(scope, name).await;
        pending.settled = true;

        let outcome = {
            let mut slots = self.write();
            let Some(slot) = slots.get_mut(&(scope, name.to_string())) else {
                // Scope torn down while fetching.
                return Err(SliceStoreError::Unknown {
                    scope: scope.as_str(),
                    name: name.to_string(),
                });
            };
            if slot.refresh_seq != seq {
                return Ok(slot.slice.clone());
            }
            let mut next = (*slot.slice).clone();
            next.loading = false;
            match result {
                Ok(data) => {
                    next.data = Some(data);
                    next.error = None;
                    next.updated_at = Some(Utc::now());
                }
                Err(err) => {
                    tracing::warn!(scope = scope.as_str(), name, error = %err, "slice refresh failed");
                    next.error = Some(err);
                }
            }
            slot.slice = Arc::new(next);
            slot.slice.clone()
        };
        self.notify(scope, name);
        Ok(outcome)
    }
}

/// Clears `loading` when a refresh future is dropped before its fetch
/// completes. A newer refresh keeps its own loading state.
struct PendingRefresh<'a> {
    store: &'a DataSliceStore,
    scope: SliceScope,
    name: &'a str,
    seq: u64,
    settled: bool,
}

impl Drop for PendingRefresh<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let cleared = {
            let mut slots = self.store.write();
            match slots.get_mut(&(self.scope, self.name.to_string())) {
                Some(slot) if slot.refresh_seq == self.seq && slot.slice.loading => {
                    let mut next = (*slot.slice).clone();
                    next.loading = false;
                    slot.slice = Arc::new(next);
                    true
                }
                _ => false,
            }
        };
        if cleared {
            tracing::debug!(scope = self.scope.as_str(), name = self.name, "slice refresh abandoned");
            self.store.notify(self.scope, self.name);
        }
    }
}

/// Read-only view of the store handed to panels.
#[derive(Clone)]
pub struct SliceReader {
    store: Arc<DataSliceStore>,
}

impl SliceReader {
    pub fn new(store: Arc<DataSliceStore>) -> Self {
        Self { store }
    }

    pub fn get_slice(&self, name: &str) -> Option<Arc<DataSlice>> {
        self.store.get_slice(name)
    }

    pub fn get_workspace_slice(&self, name: &str) -> Option<Arc<DataSlice>> {
        self.store.get_workspace_slice(name)
    }

    pub fn get_repository_slice(&self, name: &str) -> Option<Arc<DataSlice>> {
        self.store.get_repository_slice(name)
    }

    pub fn has_slice(&self, name: &str) -> bool {
        self.store.has_slice(name)
    }

    pub fn is_slice_loading(&self, name: &str) -> bool {
        self.store.is_slice_loading(name)
    }

    pub async fn refresh(
        &self,
        scope: SliceScope,
        name: &str,
    ) -> Result<Arc<DataSlice>, SliceStoreError> {
        self.store.refresh(scope, name).await
    }
}
