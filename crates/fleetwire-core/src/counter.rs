// ── Incremental aggregate engine ──
//
// Keeps a count (and, with a filter, the matching items) consistent with a
// remote collection from create/update/delete notifications, after one
// authoritative snapshot fetch. Notifications that arrive while a snapshot
// is being fetched are dropped: the snapshot already reflects them.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value, json};
use tracing::{debug, trace};

use fleetwire_api::Page;

use crate::error::CoreError;
use crate::event::{EventKind, Notification};
use crate::filter::{FilterConfiguration, IDENTITY_FIELD, PropertyMap, compile, values_equal};
use crate::multiplexer::{self, Multiplexer};

const DEFAULT_PAGE_SIZE: usize = 2000;

/// Snapshot fetch: one page of the collection for the given query.
pub type ListFn =
    Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<Page<Value>, fleetwire_api::Error>> + Send + Sync>;

/// Change callback, invoked with `(new, old)`.
pub type ChangeCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// What the counter tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Mode {
    /// Only the server-reported total.
    Counting,
    /// The matching items themselves, filtered client-side.
    FilteredList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Lifecycle {
    Created,
    Started,
    Stopped,
}

struct CounterState {
    lifecycle: Lifecycle,
    filter: Option<FilterConfiguration>,
    items: VecDeque<Value>,
    count: usize,
    /// Snapshot fetches in flight.
    refreshing: usize,
    page_size: usize,
    on_change: Option<ChangeCallback>,
}

impl CounterState {
    fn exposed_count(&self) -> usize {
        if self.filter.is_some() {
            self.items.len()
        } else {
            self.count
        }
    }
}

struct CounterInner {
    multiplexer: Multiplexer,
    channel: String,
    query: Map<String, Value>,
    list: ListFn,
    subscriber_id: String,
    state: Mutex<CounterState>,
}

/// Incremental counter over one collection and realtime channel.
///
/// Cheaply cloneable; all clones share the same state.
#[derive(Clone)]
pub struct Counter {
    inner: Arc<CounterInner>,
}

impl Counter {
    /// Counter over `channel`, seeded by `list(query)`.
    pub fn new<F, Fut>(
        multiplexer: Multiplexer,
        channel: impl Into<String>,
        query: Map<String, Value>,
        list: F,
    ) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Page<Value>, fleetwire_api::Error>> + Send + 'static,
    {
        let list: ListFn = Arc::new(move |query| list(query).boxed());
        Self {
            inner: Arc::new(CounterInner {
                multiplexer,
                channel: channel.into(),
                query,
                list,
                subscriber_id: format!("counter-{}", uuid::Uuid::new_v4()),
                state: Mutex::new(CounterState {
                    lifecycle: Lifecycle::Created,
                    filter: None,
                    items: VecDeque::new(),
                    count: 0,
                    refreshing: 0,
                    page_size: DEFAULT_PAGE_SIZE,
                    on_change: None,
                }),
            }),
        }
    }

    /// Page size for filtered snapshot fetches.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.inner.state().page_size = page_size.max(1);
        self
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn count(&self) -> usize {
        self.inner.state().exposed_count()
    }

    /// Tracked items, newest first. Empty in counting mode.
    pub fn items(&self) -> Vec<Value> {
        self.inner.state().items.iter().cloned().collect()
    }

    pub fn mode(&self) -> Mode {
        if self.inner.state().filter.is_some() {
            Mode::FilteredList
        } else {
            Mode::Counting
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.state().lifecycle
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.state().refreshing > 0
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    pub fn subscriber_id(&self) -> &str {
        &self.inner.subscriber_id
    }

    // ── Configuration ────────────────────────────────────────────

    /// Switch to filtered-list mode. One-time, before `start`.
    pub fn filter(
        &self,
        filter: Map<String, Value>,
        property_maps: Vec<PropertyMap>,
    ) -> Result<(), CoreError> {
        let mut state = self.inner.state();
        if state.filter.is_some() {
            return Err(CoreError::FilterAlreadySet);
        }
        match state.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Started => return Err(CoreError::AlreadyStarted),
            Lifecycle::Stopped => return Err(CoreError::AlreadyStopped),
        }
        state.filter = Some(compile(filter, property_maps));
        Ok(())
    }

    /// Register the change callback. Last registration wins.
    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.inner.state().on_change = Some(Arc::new(callback));
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Fetch the snapshot, then subscribe to the channel for every event
    /// kind. Does not wait for the wire acknowledgement.
    pub async fn start(&self) -> Result<(), CoreError> {
        multiplexer::validate(&self.inner.subscriber_id, &self.inner.channel)?;
        {
            let mut state = self.inner.state();
            match state.lifecycle {
                Lifecycle::Created => state.lifecycle = Lifecycle::Started,
                Lifecycle::Started => return Err(CoreError::AlreadyStarted),
                Lifecycle::Stopped => return Err(CoreError::AlreadyStopped),
            }
        }

        if let Err(e) = self.activate().await {
            {
                let mut state = self.inner.state();
                if state.lifecycle == Lifecycle::Started {
                    state.lifecycle = Lifecycle::Created;
                }
            }
            self.inner
                .multiplexer
                .remove_subscriber(&self.inner.subscriber_id, &self.inner.channel);
            return Err(e);
        }
        Ok(())
    }

    async fn activate(&self) -> Result<(), CoreError> {
        self.refresh().await?;

        if self.inner.state().lifecycle != Lifecycle::Started {
            debug!(channel = %self.inner.channel, "stopped during initial snapshot");
            return Err(CoreError::AlreadyStopped);
        }

        let id = &self.inner.subscriber_id;
        let channel = &self.inner.channel;
        for kind in EventKind::all() {
            let weak: Weak<CounterInner> = Arc::downgrade(&self.inner);
            self.inner
                .multiplexer
                .add_listener(id, channel, kind, move |notification: &Notification| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_notification(notification.kind, &notification.data);
                    }
                })?;
        }
        self.inner.multiplexer.start(id, channel)?;
        debug!(%channel, subscriber = %id, count = self.count(), "counter started");
        Ok(())
    }

    /// Unsubscribe. Terminal.
    pub fn stop(&self) -> Result<(), CoreError> {
        {
            let mut state = self.inner.state();
            match state.lifecycle {
                Lifecycle::Created => return Err(CoreError::NotStarted),
                Lifecycle::Stopped => return Err(CoreError::AlreadyStopped),
                Lifecycle::Started => state.lifecycle = Lifecycle::Stopped,
            }
        }
        self.inner
            .multiplexer
            .remove_subscriber(&self.inner.subscriber_id, &self.inner.channel);
        Ok(())
    }

    /// Re-establish ground truth from the collection.
    ///
    /// On failure the previous count and items are kept.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let (filter, page_size) = {
            let mut state = self.inner.state();
            state.refreshing += 1;
            (state.filter.clone(), state.page_size)
        };

        let snapshot = match &filter {
            None => self.inner.fetch_count().await.map(Snapshot::Count),
            Some(filter) => self
                .inner
                .fetch_items(filter, page_size)
                .await
                .map(Snapshot::Items),
        };

        let mut state = self.inner.state();
        state.refreshing = state.refreshing.saturating_sub(1);
        match snapshot {
            Ok(Snapshot::Count(count)) => state.count = count,
            Ok(Snapshot::Items(items)) => state.items = items,
            Err(e) => {
                debug!(channel = %self.inner.channel, error = %e, "snapshot fetch failed");
                return Err(CoreError::snapshot(&e));
            }
        }
        trace!(channel = %self.inner.channel, count = state.exposed_count(), "snapshot applied");
        Ok(())
    }

    /// Apply one notification as if it came from the channel.
    pub fn apply(&self, kind: EventKind, entity: &Value) {
        self.inner.on_notification(kind, entity);
    }
}

impl Drop for CounterInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.lifecycle == Lifecycle::Started {
            debug!(
                channel = %self.channel,
                subscriber = %self.subscriber_id,
                "started counter dropped, releasing subscription"
            );
            self.multiplexer
                .remove_subscriber(&self.subscriber_id, &self.channel);
        }
    }
}

enum Snapshot {
    Count(usize),
    Items(VecDeque<Value>),
}

impl CounterInner {
    fn state(&self) -> MutexGuard<'_, CounterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `{ ...query, pageSize: 1, withTotalPages: true }` turns the page
    /// count into the item count.
    async fn fetch_count(&self) -> Result<usize, fleetwire_api::Error> {
        let mut query = self.query.clone();
        query.insert("pageSize".into(), json!(1));
        query.insert("withTotalPages".into(), json!(true));

        let page = (self.list)(query).await?;
        Ok(page.statistics.total_pages.unwrap_or(page.data.len()))
    }

    /// Walk the filtered collection, keeping projected matches.
    async fn fetch_items(
        &self,
        filter: &FilterConfiguration,
        page_size: usize,
    ) -> Result<VecDeque<Value>, fleetwire_api::Error> {
        let mut query = filter.raw().clone();
        query.insert("pageSize".into(), json!(page_size));
        query.insert("withTotalPages".into(), json!(true));

        let mut items = VecDeque::new();
        let mut current_page: usize = 1;
        loop {
            query.insert("currentPage".into(), json!(current_page));
            let page = (self.list)(query.clone()).await?;
            let received = page.data.len();

            items.extend(
                page.data
                    .iter()
                    .filter(|entity| filter.matches(entity))
                    .map(|entity| filter.project(entity)),
            );

            // A reported page count wins over the short-page rule.
            let last_page = match page.statistics.total_pages {
                Some(total) => current_page >= total,
                None => received < page_size,
            };
            if last_page || received == 0 {
                break;
            }
            current_page += 1;
        }
        Ok(items)
    }

    fn on_notification(&self, kind: EventKind, entity: &Value) {
        let (callback, new, old) = {
            let mut state = self.state();
            if state.refreshing > 0 {
                trace!(%kind, channel = %self.channel, "notification during snapshot dropped");
                return;
            }
            if state.lifecycle != Lifecycle::Started {
                return;
            }

            let old = state.exposed_count();
            apply_notification(&mut state, kind, entity);
            let new = state.exposed_count();
            if new == old {
                return;
            }
            (state.on_change.clone(), new, old)
        };

        if let Some(callback) = callback {
            callback(new, old);
        }
    }
}

/// Entity identity: the `id` field, or the payload itself when a delete
/// carries only the id.
fn identity(entity: &Value) -> Option<&Value> {
    match entity {
        Value::Object(object) => object.get(IDENTITY_FIELD),
        Value::String(_) | Value::Number(_) => Some(entity),
        _ => None,
    }
}

fn position(items: &VecDeque<Value>, id: &Value) -> Option<usize> {
    items
        .iter()
        .position(|item| item.get(IDENTITY_FIELD).is_some_and(|v| values_equal(v, id)))
}

fn apply_notification(state: &mut CounterState, kind: EventKind, entity: &Value) {
    let CounterState {
        filter,
        items,
        count,
        ..
    } = state;

    let Some(filter) = filter.as_ref() else {
        match kind {
            EventKind::Create => *count += 1,
            EventKind::Delete => *count = count.saturating_sub(1),
            // Membership cannot change without a client-side filter.
            EventKind::Update => {}
        }
        return;
    };

    let Some(id) = identity(entity) else {
        debug!(%kind, "notification without entity id ignored");
        return;
    };
    let present = position(items, id);

    match kind {
        EventKind::Create => {
            if present.is_none() && filter.matches(entity) {
                items.push_front(filter.project(entity));
            }
        }
        EventKind::Update => match (present, filter.matches(entity)) {
            (None, true) => items.push_front(filter.project(entity)),
            (Some(pos), false) => {
                items.remove(pos);
            }
            _ => {}
        },
        EventKind::Delete => {
            if let Some(pos) = present {
                items.remove(pos);
            }
        }
    }
}
