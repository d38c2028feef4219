//! In-memory remote service for unit and integration tests.
//!
//! # Why an in-memory service?
//!
//! The real [`HttpRemoteControlClient`](super::api_client::HttpRemoteControlClient)
//! needs a Mac running the MonitorControl HTTP API.  The
//! [`InMemoryRemoteControlClient`] keeps a list of [`DisplayStatus`] records
//! as its "server" state, applies every command to it the way the service
//! would, and records each call so tests can assert what was sent and in
//! which order.
//!
//! # Scripted failures
//!
//! [`InMemoryRemoteControlClient::fail_next`] queues an error for one
//! operation; the next call of that operation consumes it and fails.
//!
//! # Holding responses
//!
//! Out-of-order responses are the interesting case for the slider protocol.
//! After [`InMemoryRemoteControlClient::pause`], every call is recorded and
//! then parked.  Tests wait with
//! [`wait_for_held`](InMemoryRemoteControlClient::wait_for_held) and let the
//! parked calls continue in any order with
//! [`release`](InMemoryRemoteControlClient::release).  A released call
//! applies its change to the server state at release time.
//!
//! ```ignore
//! remote.pause();
//! engine.change_slider(target, 30);
//! engine.change_slider(target, 60);
//! remote.wait_for_held(2).await;
//! remote.release(1); // the 60 response lands first
//! remote.release(0); // the 30 response is now stale
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use mcr_core::protocol::messages::{
    AllPowerResponse, HealthResponse, InputSourceStatus, SinglePowerResponse,
};
use mcr_core::{ApiError, DisplayId, DisplayStatus, PowerState, ServiceError};
use tokio::sync::{oneshot, Notify};

use crate::application::dispatch_commands::RemoteControlClient;
use crate::application::lock;
use crate::application::scan_hosts::CandidateSource;

/// Operation selector for [`InMemoryRemoteControlClient::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Health,
    ListDisplays,
    SetBrightness,
    SetAllBrightness,
    SetVolume,
    SetAllVolume,
    SetPower,
    SetAllPower,
    SetInput,
}

/// One recorded call, with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Health,
    ListDisplays,
    SetBrightness { id: DisplayId, value: u8 },
    SetAllBrightness { value: u8 },
    SetVolume { id: DisplayId, value: u8 },
    SetAllVolume { value: u8 },
    SetPower { id: DisplayId, state: PowerState },
    SetAllPower { state: PowerState },
    SetInput { id: DisplayId, code: u8 },
}

impl RemoteCall {
    fn op(&self) -> RemoteOp {
        match self {
            RemoteCall::Health => RemoteOp::Health,
            RemoteCall::ListDisplays => RemoteOp::ListDisplays,
            RemoteCall::SetBrightness { .. } => RemoteOp::SetBrightness,
            RemoteCall::SetAllBrightness { .. } => RemoteOp::SetAllBrightness,
            RemoteCall::SetVolume { .. } => RemoteOp::SetVolume,
            RemoteCall::SetAllVolume { .. } => RemoteOp::SetAllVolume,
            RemoteCall::SetPower { .. } => RemoteOp::SetPower,
            RemoteCall::SetAllPower { .. } => RemoteOp::SetAllPower,
            RemoteCall::SetInput { .. } => RemoteOp::SetInput,
        }
    }
}

#[derive(Default)]
struct Hold {
    paused: bool,
    parked: Vec<Option<oneshot::Sender<()>>>,
}

/// Recording, scriptable stand-in for the remote service.
#[derive(Default)]
pub struct InMemoryRemoteControlClient {
    displays: Mutex<Vec<DisplayStatus>>,
    calls: Mutex<Vec<RemoteCall>>,
    failures: Mutex<HashMap<RemoteOp, VecDeque<ApiError>>>,
    hold: Mutex<Hold>,
    parked_changed: Notify,
}

impl InMemoryRemoteControlClient {
    /// Creates a service that reports `displays`.
    pub fn new(displays: Vec<DisplayStatus>) -> Self {
        Self {
            displays: Mutex::new(displays),
            ..Self::default()
        }
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    /// Current server-side display records.
    pub fn displays(&self) -> Vec<DisplayStatus> {
        lock(&self.displays).clone()
    }

    /// Replaces the server-side display records.
    pub fn set_displays(&self, displays: Vec<DisplayStatus>) {
        *lock(&self.displays) = displays;
    }

    /// Makes the next call of `op` fail with `error`.  Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, op: RemoteOp, error: ApiError) {
        lock(&self.failures).entry(op).or_default().push_back(error);
    }

    /// Parks every following call until it is released.
    pub fn pause(&self) {
        lock(&self.hold).paused = true;
    }

    /// Stops parking calls and releases every call still parked.
    pub fn resume(&self) {
        let mut hold = lock(&self.hold);
        hold.paused = false;
        for sender in hold.parked.iter_mut().filter_map(Option::take) {
            let _ = sender.send(());
        }
    }

    /// Waits until at least `count` calls have been parked since the client
    /// was created.
    pub async fn wait_for_held(&self, count: usize) {
        loop {
            let changed = self.parked_changed.notified();
            if lock(&self.hold).parked.len() >= count {
                return;
            }
            changed.await;
        }
    }

    /// Lets the `index`-th parked call (in parking order) continue.
    pub fn release(&self, index: usize) {
        let sender = lock(&self.hold)
            .parked
            .get_mut(index)
            .and_then(Option::take);
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    /// Records the call, parks it if paused, then pops a scripted failure.
    async fn enter(&self, call: RemoteCall) -> Result<(), ApiError> {
        let op = call.op();
        lock(&self.calls).push(call);

        let parked = {
            let mut hold = lock(&self.hold);
            if hold.paused {
                let (tx, rx) = oneshot::channel();
                hold.parked.push(Some(tx));
                Some(rx)
            } else {
                None
            }
        };
        if let Some(rx) = parked {
            self.parked_changed.notify_waiters();
            let _ = rx.await;
        }

        match lock(&self.failures).get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Applies `change` to display `id` and returns the updated record.
    fn update_one(
        &self,
        id: DisplayId,
        change: impl FnOnce(&mut DisplayStatus),
    ) -> Result<DisplayStatus, ApiError> {
        let mut displays = lock(&self.displays);
        let display = displays
            .iter_mut()
            .find(|d| d.id == id && !d.is_dummy)
            .ok_or_else(|| not_found(id))?;
        change(display);
        Ok(display.clone())
    }

    /// Applies `change` to every display passing `filter` and returns the
    /// whole list.
    fn update_all(
        &self,
        filter: impl Fn(&DisplayStatus) -> bool,
        change: impl Fn(&mut DisplayStatus),
    ) -> Vec<DisplayStatus> {
        let mut displays = lock(&self.displays);
        for display in displays.iter_mut().filter(|d| !d.is_dummy && filter(d)) {
            change(display);
        }
        displays.clone()
    }
}

fn not_found(id: DisplayId) -> ApiError {
    ApiError::Service(ServiceError {
        http_status: 404,
        code: Some("display_not_found".to_string()),
        message: format!("Display {id} not found"),
        display_ids: Some(vec![id]),
    })
}

#[async_trait]
impl RemoteControlClient for InMemoryRemoteControlClient {
    async fn health(&self) -> Result<HealthResponse, ApiError> {
        self.enter(RemoteCall::Health).await?;
        Ok(HealthResponse {
            status: "ok".to_string(),
            version: "v1".to_string(),
        })
    }

    async fn list_displays(&self) -> Result<Vec<DisplayStatus>, ApiError> {
        self.enter(RemoteCall::ListDisplays).await?;
        Ok(self.displays())
    }

    async fn set_brightness(&self, id: DisplayId, value: u8) -> Result<DisplayStatus, ApiError> {
        self.enter(RemoteCall::SetBrightness { id, value }).await?;
        self.update_one(id, |d| d.brightness = i32::from(value))
    }

    async fn set_all_brightness(&self, value: u8) -> Result<Vec<DisplayStatus>, ApiError> {
        self.enter(RemoteCall::SetAllBrightness { value }).await?;
        Ok(self.update_all(
            |d| d.capabilities.brightness,
            |d| d.brightness = i32::from(value),
        ))
    }

    async fn set_volume(&self, id: DisplayId, value: u8) -> Result<DisplayStatus, ApiError> {
        self.enter(RemoteCall::SetVolume { id, value }).await?;
        self.update_one(id, |d| d.volume = Some(i32::from(value)))
    }

    async fn set_all_volume(&self, value: u8) -> Result<Vec<DisplayStatus>, ApiError> {
        self.enter(RemoteCall::SetAllVolume { value }).await?;
        Ok(self.update_all(
            |d| d.capabilities.volume,
            |d| d.volume = Some(i32::from(value)),
        ))
    }

    async fn set_power(
        &self,
        id: DisplayId,
        state: PowerState,
    ) -> Result<SinglePowerResponse, ApiError> {
        self.enter(RemoteCall::SetPower { id, state }).await?;
        self.update_one(id, |d| d.power_state = state.as_str().to_string())?;
        Ok(SinglePowerResponse {
            display_id: id,
            requested_state: state,
            accepted: true,
        })
    }

    async fn set_all_power(&self, state: PowerState) -> Result<AllPowerResponse, ApiError> {
        self.enter(RemoteCall::SetAllPower { state }).await?;
        let updated = self.update_all(
            |d| d.capabilities.power,
            |d| d.power_state = state.as_str().to_string(),
        );
        Ok(AllPowerResponse {
            requested_state: state,
            accepted_display_ids: updated
                .iter()
                .filter(|d| !d.is_dummy && d.capabilities.power)
                .map(|d| d.id)
                .collect(),
        })
    }

    async fn set_input(&self, id: DisplayId, code: u8) -> Result<DisplayStatus, ApiError> {
        self.enter(RemoteCall::SetInput { id, code }).await?;
        self.update_one(id, |d| {
            let name = d
                .input
                .available
                .iter()
                .find(|i| i.code == i32::from(code))
                .map(|i| i.name.clone())
                .unwrap_or_default();
            d.input.current = Some(InputSourceStatus {
                code: i32::from(code),
                name,
            });
        })
    }
}

/// [`CandidateSource`] that always returns the same hosts.
#[derive(Debug, Clone, Default)]
pub struct FixedCandidates(pub Vec<String>);

impl CandidateSource for FixedCandidates {
    fn candidates(&self, _preferred_host: Option<&str>) -> Vec<String> {
        self.0.clone()
    }
}
