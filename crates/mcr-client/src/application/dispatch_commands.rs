//! DispatchCommandsUseCase: applies user intents against the remote service.
//!
//! The [`DispatchEngine`] owns the canonical [`HomeState`] snapshot.  Every
//! intent first changes the snapshot locally and then reconciles with the
//! service on a spawned tokio task.
//!
//! # Slider protocol (for beginners)
//!
//! Dragging a slider produces a burst of values.  Each distinct value is sent
//! at once (no debounce), so responses can come back out of order:
//!
//! ```text
//!  UI drag:   30 ────── 45 ────── 60 (release)
//!  requests:  POST 30   POST 45   POST 60
//!  responses:      ...       45 ✓       30 ✗ (stale)     60 ✓
//! ```
//!
//! A response is applied only if the slider's local value still equals the
//! value that request carried.  When the user lets go, the final value is sent
//! once more unless it was already the last one sent.
//!
//! # Discrete commands
//!
//! Power and input changes are not coalesced.  A display that already has a
//! command in flight is marked `busy` and further commands for it are rejected
//! until the command and the follow-up list re-fetch finish.  The set of
//! displays with a command in flight lives in [`HomeState`], so a list that
//! lands for some other reason (a refresh, a slider response, another
//! display's command) keeps their `busy` flags.  Commands for a display that
//! is not in the current list are dropped locally.
//!
//! # Connection lifecycle
//!
//! ```text
//!  Disconnected ──► Connecting ──► Connected
//!        ▲              │              │
//!        └──────────────┴──────────────┘  on 401, 503, or transport failure
//! ```

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::slice;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mcr_core::domain::reducer::{
    aggregate_brightness, aggregate_volume, fold_displays, inputs_to_persist, merge_by_id,
};
use mcr_core::protocol::messages::{AllPowerResponse, HealthResponse, SinglePowerResponse};
use mcr_core::{
    ApiError, ConnectionSettings, Display, DisplayId, DisplayStatus, InputSource, PowerState,
};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::lock;
use super::manage_settings::InputCacheStore;
use super::notify::{message_for, Notifier, UserMessage};
use super::snapshot::StateStore;

/// Delay before the single retry of a list fetch that hit the upstream timeout.
pub const LIST_RETRY_DELAY: Duration = Duration::from_millis(120);

/// Initial value of both global sliders before any display is known.
pub const DEFAULT_GLOBAL_LEVEL: u8 = 50;

// ── Collaborator contracts ────────────────────────────────────────────────────

/// Authenticated client for the MonitorControl HTTP API.
#[async_trait]
pub trait RemoteControlClient: Send + Sync {
    async fn health(&self) -> Result<HealthResponse, ApiError>;

    /// Lists every display, including dummy placeholders.
    async fn list_displays(&self) -> Result<Vec<DisplayStatus>, ApiError>;

    async fn set_brightness(&self, id: DisplayId, value: u8) -> Result<DisplayStatus, ApiError>;

    async fn set_all_brightness(&self, value: u8) -> Result<Vec<DisplayStatus>, ApiError>;

    async fn set_volume(&self, id: DisplayId, value: u8) -> Result<DisplayStatus, ApiError>;

    async fn set_all_volume(&self, value: u8) -> Result<Vec<DisplayStatus>, ApiError>;

    async fn set_power(
        &self,
        id: DisplayId,
        state: PowerState,
    ) -> Result<SinglePowerResponse, ApiError>;

    async fn set_all_power(&self, state: PowerState) -> Result<AllPowerResponse, ApiError>;

    async fn set_input(&self, id: DisplayId, code: u8) -> Result<DisplayStatus, ApiError>;
}

/// Builds a [`RemoteControlClient`] for a set of connection settings.
pub trait RemoteClientFactory: Send + Sync {
    fn create(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn RemoteControlClient>, ApiError>;
}

impl<F> RemoteClientFactory for F
where
    F: Fn(&ConnectionSettings) -> Result<Arc<dyn RemoteControlClient>, ApiError> + Send + Sync,
{
    fn create(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn RemoteControlClient>, ApiError> {
        self(settings)
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Everything the home screen renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeState {
    pub connection: ConnectionStatus,
    /// Initial load (full-screen spinner).
    pub is_loading: bool,
    /// Pull-to-refresh style reload.
    pub is_refreshing: bool,
    pub displays: Vec<Display>,
    pub global_brightness: u8,
    pub global_volume: u8,
    /// An all-display power command is in flight.
    pub is_global_busy: bool,
    /// Displays whose own power or input command has not finished yet.
    in_flight: HashSet<DisplayId>,
}

impl Default for HomeState {
    fn default() -> Self {
        Self {
            connection: ConnectionStatus::Disconnected,
            is_loading: true,
            is_refreshing: false,
            displays: Vec::new(),
            global_brightness: DEFAULT_GLOBAL_LEVEL,
            global_volume: DEFAULT_GLOBAL_LEVEL,
            is_global_busy: false,
            in_flight: HashSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliderScope {
    Global,
    Display(DisplayId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliderKind {
    Brightness,
    Volume,
}

/// One slider on the home screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SliderTarget {
    pub scope: SliderScope,
    pub kind: SliderKind,
}

impl SliderTarget {
    pub fn global(kind: SliderKind) -> Self {
        Self {
            scope: SliderScope::Global,
            kind,
        }
    }

    pub fn display(id: DisplayId, kind: SliderKind) -> Self {
        Self {
            scope: SliderScope::Display(id),
            kind,
        }
    }
}

impl HomeState {
    pub fn display(&self, id: DisplayId) -> Option<&Display> {
        self.displays.iter().find(|d| d.id == id)
    }

    /// Current local value of a slider; `None` if the display is unknown or
    /// has no reported volume.
    pub fn slider_value(&self, target: SliderTarget) -> Option<u8> {
        match (target.scope, target.kind) {
            (SliderScope::Global, SliderKind::Brightness) => Some(self.global_brightness),
            (SliderScope::Global, SliderKind::Volume) => Some(self.global_volume),
            (SliderScope::Display(id), SliderKind::Brightness) => {
                self.display(id).map(|d| d.brightness)
            }
            (SliderScope::Display(id), SliderKind::Volume) => self.display(id).and_then(|d| d.volume),
        }
    }

    /// Replaces the display list and recomputes both aggregates.  Displays
    /// with a command in flight stay busy.
    fn with_displays(&self, mut displays: Vec<Display>) -> Self {
        for display in displays.iter_mut() {
            display.busy = self.in_flight.contains(&display.id);
        }
        Self {
            global_brightness: aggregate_brightness(&displays, self.global_brightness),
            global_volume: aggregate_volume(&displays, self.global_volume),
            displays,
            ..self.clone()
        }
    }

    /// Marks `id` busy; returns an unchanged copy if it already is.
    fn claim(&self, id: DisplayId) -> Self {
        self.with_busy(id, true)
    }

    /// Clears `id`'s busy flag once its own command is done.
    fn release(&self, id: DisplayId) -> Self {
        self.with_busy(id, false)
    }

    fn with_busy(&self, id: DisplayId, busy: bool) -> Self {
        let mut next = self.clone();
        if busy {
            next.in_flight.insert(id);
        } else {
            next.in_flight.remove(&id);
        }
        for display in next.displays.iter_mut().filter(|d| d.id == id) {
            display.busy = busy;
        }
        next
    }
}

/// Result of [`DispatchEngine::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Started,
    /// No connection settings are saved; the front end should open settings.
    NeedsSettings,
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Session {
    settings: Option<ConnectionSettings>,
    client: Option<Arc<dyn RemoteControlClient>>,
    /// Bumped by every `connect`; older connection attempts are ignored.
    generation: u64,
    last_sent: HashMap<SliderTarget, u8>,
}

struct EngineInner {
    state: StateStore<HomeState>,
    notifier: Notifier,
    factory: Arc<dyn RemoteClientFactory>,
    input_cache: Arc<dyn InputCacheStore>,
    session: Mutex<Session>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    retry_delay: Duration,
}

/// Remote half of a discrete display command; yields the input to cache, if any.
type CommandFuture = Pin<Box<dyn Future<Output = Result<Option<InputSource>, ApiError>> + Send>>;

enum SliderResponse {
    One(DisplayStatus),
    Many(Vec<DisplayStatus>),
}

/// The command dispatch and synchronization engine.
///
/// Cheap to clone; all clones share the same state.  Intent methods are
/// synchronous and must be called from within a tokio runtime because they
/// spawn the remote work.
#[derive(Clone)]
pub struct DispatchEngine {
    inner: Arc<EngineInner>,
}

impl DispatchEngine {
    pub fn new(
        factory: Arc<dyn RemoteClientFactory>,
        input_cache: Arc<dyn InputCacheStore>,
        notifier: Notifier,
    ) -> Self {
        Self::with_retry_delay(factory, input_cache, notifier, LIST_RETRY_DELAY)
    }

    /// Like [`DispatchEngine::new`] with a custom list-retry delay.
    pub fn with_retry_delay(
        factory: Arc<dyn RemoteClientFactory>,
        input_cache: Arc<dyn InputCacheStore>,
        notifier: Notifier,
        retry_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: StateStore::new(HomeState::default()),
                notifier,
                factory,
                input_cache,
                session: Mutex::new(Session::default()),
                tasks: Mutex::new(Vec::new()),
                retry_delay,
            }),
        }
    }

    pub fn state(&self) -> HomeState {
        self.inner.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<HomeState> {
        self.inner.state.subscribe()
    }

    pub fn messages(&self) -> broadcast::Receiver<UserMessage> {
        self.inner.notifier.subscribe()
    }

    pub fn current_settings(&self) -> Option<ConnectionSettings> {
        lock(&self.inner.session).settings.clone()
    }

    /// Waits until every spawned command, connect, and refresh task is done.
    pub async fn join_pending(&self) {
        loop {
            let handles = std::mem::take(&mut *lock(&self.inner.tasks));
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        warn!("dispatch task failed: {e}");
                    }
                }
            }
        }
    }

    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(work);
        let mut tasks = lock(&self.inner.tasks);
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    // ── Connection ────────────────────────────────────────────────────────────

    /// Settles the initial state when there is nothing to connect to.
    pub fn mark_unconfigured(&self) {
        self.inner.state.update(|s| HomeState {
            connection: ConnectionStatus::Disconnected,
            is_loading: false,
            is_refreshing: false,
            ..s.clone()
        });
    }

    /// Adopts `settings` and connects: health probe first, then the display
    /// list.  Supersedes any connection attempt still in flight.
    pub fn connect(&self, settings: ConnectionSettings) {
        self.start_connect(settings, false);
    }

    fn start_connect(&self, settings: ConnectionSettings, as_refresh: bool) {
        let generation = {
            let mut session = lock(&self.inner.session);
            session.generation += 1;
            session.settings = Some(settings.clone());
            session.client = None;
            session.last_sent.clear();
            session.generation
        };
        info!(host = %settings.host, port = settings.port, "connecting");
        self.inner.state.update(|s| HomeState {
            connection: ConnectionStatus::Connecting,
            is_loading: !as_refresh,
            is_refreshing: as_refresh,
            ..s.clone()
        });

        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            let result = async {
                let client = inner.factory.create(&settings)?;
                client.health().await?;
                let displays = inner.load_displays_with_retry(client.as_ref(), &settings).await?;
                Ok::<_, ApiError>((client, displays))
            }
            .await;

            {
                let mut session = lock(&inner.session);
                if session.generation != generation {
                    debug!("dropping result of a superseded connection attempt");
                    return;
                }
                session.client = result.as_ref().ok().map(|(client, _)| Arc::clone(client));
            }

            match result {
                Ok((_, displays)) => {
                    info!(count = displays.len(), "connected");
                    inner.state.update(|s| HomeState {
                        connection: ConnectionStatus::Connected,
                        is_loading: false,
                        is_refreshing: false,
                        ..s.with_displays(displays)
                    });
                }
                Err(e) => {
                    warn!("connection failed: {e}");
                    inner.state.update(|s| HomeState {
                        connection: ConnectionStatus::Disconnected,
                        is_loading: false,
                        is_refreshing: false,
                        ..s.clone()
                    });
                    inner.report_error(&e);
                }
            }
        });
    }

    /// Reloads the display list, connecting first if there is no client yet.
    pub fn refresh(&self) -> RefreshOutcome {
        let (settings, client) = {
            let session = lock(&self.inner.session);
            (session.settings.clone(), session.client.clone())
        };
        let Some(settings) = settings else {
            self.inner.notifier.notify(UserMessage::ConfigureFirst);
            return RefreshOutcome::NeedsSettings;
        };
        let Some(client) = client else {
            self.start_connect(settings, true);
            return RefreshOutcome::Started;
        };

        self.inner.state.update(|s| HomeState {
            is_refreshing: true,
            ..s.clone()
        });
        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            match inner.load_displays_with_retry(client.as_ref(), &settings).await {
                Ok(displays) => {
                    inner.state.update(|s| HomeState {
                        connection: ConnectionStatus::Connected,
                        is_refreshing: false,
                        ..s.with_displays(displays)
                    });
                }
                Err(e) => {
                    inner.state.update(|s| HomeState {
                        is_refreshing: false,
                        ..s.clone()
                    });
                    inner.report_error(&e);
                }
            }
        });
        RefreshOutcome::Started
    }

    // ── Sliders ───────────────────────────────────────────────────────────────

    /// Applies a slider value locally and submits it if it changed.
    ///
    /// Global changes are also written into every display that has the
    /// capability and is powered on; per-display changes apply only to a
    /// display with the capability and recompute the matching global
    /// aggregate.  Returns `true` when a request was issued.
    pub fn change_slider(&self, target: SliderTarget, value: i32) -> bool {
        // Clamped into 0..=100, so the cast cannot truncate.
        let value = value.clamp(0, 100) as u8;
        let mut known = false;
        let mut previous = None;

        self.inner.state.update(|s| {
            let mut next = s.clone();
            match (target.scope, target.kind) {
                (SliderScope::Global, kind) => {
                    known = true;
                    previous = s.slider_value(target);
                    for display in next.displays.iter_mut() {
                        match kind {
                            SliderKind::Brightness if display.accepts_brightness() => {
                                display.brightness = value;
                            }
                            SliderKind::Volume if display.accepts_volume() => {
                                display.volume = Some(value);
                            }
                            _ => {}
                        }
                    }
                    match kind {
                        SliderKind::Brightness => next.global_brightness = value,
                        SliderKind::Volume => next.global_volume = value,
                    }
                }
                (SliderScope::Display(id), kind) => {
                    let capable = |d: &Display| match kind {
                        SliderKind::Brightness => d.capabilities.brightness,
                        SliderKind::Volume => d.capabilities.volume,
                    };
                    if let Some(display) =
                        next.displays.iter_mut().find(|d| d.id == id && capable(d))
                    {
                        known = true;
                        match kind {
                            SliderKind::Brightness => {
                                previous = Some(display.brightness);
                                display.brightness = value;
                            }
                            SliderKind::Volume => {
                                previous = display.volume;
                                display.volume = Some(value);
                            }
                        }
                    }
                    match kind {
                        SliderKind::Brightness => {
                            next.global_brightness =
                                aggregate_brightness(&next.displays, next.global_brightness);
                        }
                        SliderKind::Volume => {
                            next.global_volume = aggregate_volume(&next.displays, next.global_volume);
                        }
                    }
                }
            }
            next
        });

        if known && previous != Some(value) {
            self.submit(target, value);
            true
        } else {
            false
        }
    }

    /// Called when the user lets go of a slider; re-sends the final value if
    /// it is not the one last sent.  Returns `true` when a request was issued.
    pub fn finish_slider(&self, target: SliderTarget) -> bool {
        let Some(value) = self.inner.state.snapshot().slider_value(target) else {
            return false;
        };
        let last_sent = lock(&self.inner.session).last_sent.get(&target).copied();
        if last_sent == Some(value) {
            return false;
        }
        self.submit(target, value);
        true
    }

    fn submit(&self, target: SliderTarget, value: u8) {
        lock(&self.inner.session).last_sent.insert(target, value);
        debug!(?target, value, "submitting slider value");
        let inner = Arc::clone(&self.inner);
        self.spawn(async move { inner.perform_slider(target, value).await });
    }

    // ── Discrete commands ─────────────────────────────────────────────────────

    /// Powers one display on or off.  Returns `false` when the display is
    /// busy or unknown, or there is no connection.
    pub fn set_display_power(&self, id: DisplayId, turn_on: bool) -> bool {
        let state = PowerState::from_on(turn_on);
        self.run_display_command(id, move |client| -> CommandFuture {
            Box::pin(async move { client.set_power(id, state).await.map(|_| None) })
        })
    }

    /// Switches a display's input source.
    ///
    /// Codes outside 0–255 are rejected before any request.  The chosen input
    /// is remembered in the input cache under `name`, the name the service
    /// reports, or `UNKNOWN-{code}`, in that order of preference.
    pub fn select_display_input(&self, id: DisplayId, code: i32, name: Option<String>) -> bool {
        let Ok(code) = u8::try_from(code) else {
            let error = ApiError::Validation("Input code must be between 0 and 255".to_string());
            self.inner.notifier.notify(message_for(&error));
            return false;
        };
        self.run_display_command(id, move |client| -> CommandFuture {
            Box::pin(async move {
                let status = client.set_input(id, code).await?;
                let name = name
                    .filter(|n| !n.trim().is_empty())
                    .or_else(|| status.input.current.as_ref().map(|c| c.name.clone()))
                    .unwrap_or_default();
                Ok(Some(InputSource::new(code, &name)))
            })
        })
    }

    fn run_display_command<F>(&self, id: DisplayId, command: F) -> bool
    where
        F: FnOnce(Arc<dyn RemoteControlClient>) -> CommandFuture + Send + 'static,
    {
        let Some((client, settings)) = self.inner.connection() else {
            self.inner.notifier.notify(UserMessage::NotConnected);
            return false;
        };
        if self.inner.state.snapshot().display(id).is_none() {
            debug!(display_id = id, "unknown display, command dropped");
            return false;
        }
        // Busy check and mark in one update.
        if !self.inner.state.update(|s| s.claim(id)) {
            debug!(display_id = id, "display busy, command rejected");
            return false;
        }
        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            let result = async {
                if let Some(input) = command(Arc::clone(&client)).await? {
                    inner.remember_input(&settings, id, &input);
                }
                inner.load_displays_with_retry(client.as_ref(), &settings).await
            }
            .await;

            match result {
                Ok(displays) => {
                    inner.state.update(|s| HomeState {
                        connection: ConnectionStatus::Connected,
                        ..s.release(id).with_displays(displays)
                    });
                }
                Err(e) => {
                    warn!(display_id = id, "display command failed: {e}");
                    inner.state.update(|s| s.release(id));
                    inner.report_error(&e);
                }
            }
        });
        true
    }

    /// Powers every display on or off.  Returns `false` while another
    /// all-display command is running or there is no connection.
    pub fn set_power_all(&self, turn_on: bool) -> bool {
        if self.inner.state.snapshot().is_global_busy {
            return false;
        }
        let Some((client, settings)) = self.inner.connection() else {
            self.inner.notifier.notify(UserMessage::NotConnected);
            return false;
        };

        self.inner.state.update(|s| HomeState {
            is_global_busy: true,
            ..s.clone()
        });
        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            let result = async {
                client.set_all_power(PowerState::from_on(turn_on)).await?;
                inner.load_displays_with_retry(client.as_ref(), &settings).await
            }
            .await;

            match result {
                Ok(displays) => {
                    inner.state.update(|s| HomeState {
                        connection: ConnectionStatus::Connected,
                        is_global_busy: false,
                        ..s.with_displays(displays)
                    });
                }
                Err(e) => {
                    warn!("all-display power command failed: {e}");
                    inner.state.update(|s| HomeState {
                        is_global_busy: false,
                        ..s.clone()
                    });
                    inner.report_error(&e);
                }
            }
        });
        true
    }
}

impl EngineInner {
    fn connection(&self) -> Option<(Arc<dyn RemoteControlClient>, ConnectionSettings)> {
        let session = lock(&self.session);
        Some((session.client.clone()?, session.settings.clone()?))
    }

    fn report_error(&self, error: &ApiError) {
        if error.should_disconnect() {
            info!("marking connection as disconnected");
            self.state.update(|s| HomeState {
                connection: ConnectionStatus::Disconnected,
                ..s.clone()
            });
        }
        self.notifier.notify(message_for(error));
    }

    fn remember_input(&self, settings: &ConnectionSettings, id: DisplayId, input: &InputSource) {
        if let Err(e) = self.input_cache.save(&settings.host, settings.port, id, input) {
            warn!(display_id = id, "failed to cache input source: {e}");
        }
    }

    /// Persists remote-reported inputs, then folds the records with the cache.
    fn fold_with_cache(
        &self,
        statuses: &[DisplayStatus],
        settings: &ConnectionSettings,
    ) -> Vec<Display> {
        for (id, input) in inputs_to_persist(statuses) {
            self.remember_input(settings, id, &input);
        }
        let cache = self.input_cache.read_for_connection(&settings.host, settings.port);
        fold_displays(statuses, &cache)
    }

    async fn load_displays_with_retry(
        &self,
        client: &dyn RemoteControlClient,
        settings: &ConnectionSettings,
    ) -> Result<Vec<Display>, ApiError> {
        let statuses = match client.list_displays().await {
            Err(e) if e.is_upstream_timeout() => {
                warn!("display list hit the upstream timeout, retrying once");
                tokio::time::sleep(self.retry_delay).await;
                client.list_displays().await?
            }
            other => other?,
        };
        Ok(self.fold_with_cache(&statuses, settings))
    }

    async fn perform_slider(&self, target: SliderTarget, value: u8) {
        let Some((client, settings)) = self.connection() else {
            return;
        };
        let response = match (target.scope, target.kind) {
            (SliderScope::Global, SliderKind::Brightness) => {
                client.set_all_brightness(value).await.map(SliderResponse::Many)
            }
            (SliderScope::Global, SliderKind::Volume) => {
                client.set_all_volume(value).await.map(SliderResponse::Many)
            }
            (SliderScope::Display(id), SliderKind::Brightness) => {
                client.set_brightness(id, value).await.map(SliderResponse::One)
            }
            (SliderScope::Display(id), SliderKind::Volume) => {
                client.set_volume(id, value).await.map(SliderResponse::One)
            }
        };

        let updates = match response {
            Ok(SliderResponse::Many(statuses)) => self.fold_with_cache(&statuses, &settings),
            Ok(SliderResponse::One(status)) => {
                self.fold_with_cache(slice::from_ref(&status), &settings)
            }
            Err(e) => {
                warn!(?target, value, "slider submission failed: {e}");
                self.report_error(&e);
                return;
            }
        };

        let mut stale = false;
        self.state.update(|s| {
            if s.slider_value(target) != Some(value) {
                stale = true;
                return s.clone();
            }
            HomeState {
                connection: ConnectionStatus::Connected,
                ..s.with_displays(merge_by_id(&s.displays, updates))
            }
        });
        if stale {
            debug!(?target, value, "discarding stale slider response");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::mock::{InMemoryRemoteControlClient, RemoteCall, RemoteOp};
    use crate::infrastructure::storage::mock::InMemoryInputCacheStore;
    use mcr_core::protocol::messages::{DisplayCapabilities, DisplayInputStatus};
    use mcr_core::ServiceError;

    fn status(id: i64, brightness: i32, volume: Option<i32>) -> DisplayStatus {
        DisplayStatus {
            id,
            name: format!("Display {id}"),
            friendly_name: String::new(),
            kind: "other".to_string(),
            is_virtual: false,
            is_dummy: false,
            brightness,
            volume,
            power_state: "on".to_string(),
            capabilities: DisplayCapabilities {
                brightness: true,
                volume: volume.is_some(),
                power: true,
            },
            input: DisplayInputStatus::default(),
        }
    }

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            host: "192.168.1.20".to_string(),
            port: 51423,
            token: "secret".to_string(),
        }
    }

    fn engine_with(remote: Arc<InMemoryRemoteControlClient>) -> DispatchEngine {
        let factory = move |_: &ConnectionSettings| -> Result<Arc<dyn RemoteControlClient>, ApiError> {
            Ok(Arc::clone(&remote) as Arc<dyn RemoteControlClient>)
        };
        DispatchEngine::with_retry_delay(
            Arc::new(factory),
            Arc::new(InMemoryInputCacheStore::new()),
            Notifier::new(),
            Duration::from_millis(1),
        )
    }

    async fn connected(remote: &Arc<InMemoryRemoteControlClient>) -> DispatchEngine {
        let engine = engine_with(Arc::clone(remote));
        engine.connect(settings());
        engine.join_pending().await;
        engine
    }

    #[tokio::test]
    async fn test_connect_probes_health_then_loads_displays() {
        // Arrange
        let remote = Arc::new(InMemoryRemoteControlClient::new(vec![
            status(1, 40, Some(10)),
            status(2, 60, None),
        ]));

        // Act
        let engine = connected(&remote).await;

        // Assert
        let state = engine.state();
        assert_eq!(state.connection, ConnectionStatus::Connected);
        assert!(!state.is_loading);
        assert_eq!(state.displays.len(), 2);
        assert_eq!(state.global_brightness, 50);
        assert_eq!(state.global_volume, 10);
        assert_eq!(remote.calls()[..2], [RemoteCall::Health, RemoteCall::ListDisplays]);
    }

    #[tokio::test]
    async fn test_connect_failure_marks_disconnected_and_reports_once() {
        // Arrange
        let remote = Arc::new(InMemoryRemoteControlClient::new(vec![status(1, 40, None)]));
        remote.fail_next(
            RemoteOp::Health,
            ApiError::Service(ServiceError {
                http_status: 401,
                code: Some("unauthorized".to_string()),
                message: "bad token".to_string(),
                display_ids: None,
            }),
        );
        let engine = engine_with(Arc::clone(&remote));
        let mut messages = engine.messages();

        // Act
        engine.connect(settings());
        engine.join_pending().await;

        // Assert
        assert_eq!(engine.state().connection, ConnectionStatus::Disconnected);
        assert_eq!(messages.try_recv().ok(), Some(UserMessage::AuthFailed));
        assert!(messages.try_recv().is_err());
        assert!(!remote.calls().contains(&RemoteCall::ListDisplays));
    }

    #[tokio::test]
    async fn test_refresh_without_settings_asks_for_settings() {
        let engine = engine_with(Arc::new(InMemoryRemoteControlClient::new(Vec::new())));
        let mut messages = engine.messages();

        assert_eq!(engine.refresh(), RefreshOutcome::NeedsSettings);
        assert_eq!(messages.try_recv().ok(), Some(UserMessage::ConfigureFirst));
    }

    #[tokio::test]
    async fn test_global_slider_writes_into_capable_powered_displays() {
        // Arrange
        let mut off = status(3, 20, Some(20));
        off.power_state = "off".to_string();
        let remote = Arc::new(InMemoryRemoteControlClient::new(vec![
            status(1, 40, Some(10)),
            off,
        ]));
        let engine = connected(&remote).await;

        // Act
        let submitted = engine.change_slider(SliderTarget::global(SliderKind::Volume), 80);

        // Assert (optimistic state, before the response lands)
        assert!(submitted);
        let state = engine.state();
        assert_eq!(state.global_volume, 80);
        assert_eq!(state.display(1).and_then(|d| d.volume), Some(80));
        assert_eq!(state.display(3).and_then(|d| d.volume), Some(20));
        engine.join_pending().await;
    }

    #[tokio::test]
    async fn test_unchanged_slider_value_is_not_resubmitted() {
        // Arrange
        let remote = Arc::new(InMemoryRemoteControlClient::new(vec![status(1, 40, None)]));
        let engine = connected(&remote).await;
        let target = SliderTarget::display(1, SliderKind::Brightness);

        // Act
        let first = engine.change_slider(target, 70);
        let repeat = engine.change_slider(target, 70);
        engine.join_pending().await;
        let finish = engine.finish_slider(target);

        // Assert
        assert!(first);
        assert!(!repeat);
        assert!(!finish);
        let sets = remote
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RemoteCall::SetBrightness { .. }))
            .count();
        assert_eq!(sets, 1);
    }

    #[tokio::test]
    async fn test_slider_for_unknown_display_is_ignored() {
        let remote = Arc::new(InMemoryRemoteControlClient::new(vec![status(1, 40, None)]));
        let engine = connected(&remote).await;

        assert!(!engine.change_slider(SliderTarget::display(9, SliderKind::Brightness), 10));
        assert!(!engine.finish_slider(SliderTarget::display(9, SliderKind::Brightness)));
    }

    #[tokio::test]
    async fn test_volume_slider_ignores_display_without_volume() {
        let remote = Arc::new(InMemoryRemoteControlClient::new(vec![status(1, 40, None)]));
        let engine = connected(&remote).await;

        assert!(!engine.change_slider(SliderTarget::display(1, SliderKind::Volume), 30));
        assert_eq!(engine.state().display(1).and_then(|d| d.volume), None);
    }

    #[tokio::test]
    async fn test_input_code_out_of_range_is_rejected_without_request() {
        // Arrange
        let remote = Arc::new(InMemoryRemoteControlClient::new(vec![status(1, 40, None)]));
        let engine = connected(&remote).await;
        let mut messages = engine.messages();
        let calls_before = remote.calls().len();

        // Act
        let accepted = engine.select_display_input(1, 256, None);

        // Assert
        assert!(!accepted);
        assert_eq!(remote.calls().len(), calls_before);
        assert!(matches!(messages.try_recv(), Ok(UserMessage::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_commands_without_connection_report_not_connected() {
        let engine = engine_with(Arc::new(InMemoryRemoteControlClient::new(Vec::new())));
        let mut messages = engine.messages();

        assert!(!engine.set_display_power(1, false));
        assert!(!engine.set_power_all(true));
        assert_eq!(messages.try_recv().ok(), Some(UserMessage::NotConnected));
    }
}
