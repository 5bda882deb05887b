//! Main loop owning the car state
//!
//! ```text
//!   stdin ──DriverCommand──┐
//!                          ▼
//!   Reader(body) ──┐   ┌────────────┐  publish "chassis"  ┌────────────────┐
//!   Reader(chassis)├──▶│Orchestrator│────────────────────▶│Sender(chassis) │──▶ pty
//!   Reader(...)  ──┘   │  CarState  │                     └────────────────┘
//!       EcuEvent       └────────────┘
//! ```
//!
//! Each tick drains queued [`EcuEvent`]s into the reported half of
//! [`CarState`], advances the held driver controls, publishes the driver
//! inputs to the chassis topic and checks ECU liveness.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use testbed_core::{observed_signal_name, CarState, EcuReport, EcuRole, GatewayCode, ObserverCode};
use testbed_serial::{ChannelEndpoint, ChannelResult, EcuEvent, Reader, Sender, TopicHub};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::config::TestbedConfig;
use crate::controls::{Controls, DriverCommand};
use crate::liveness::Liveness;

/// Topic carrying the driver inputs, written to the chassis ECU
pub const CHASSIS_TOPIC: &str = "chassis";

const EVENT_QUEUE: usize = 256;

pub struct Orchestrator {
    state: Arc<Mutex<CarState>>,
    controls: Controls,
    hub: TopicHub,
    events_tx: mpsc::Sender<EcuEvent>,
    events_rx: mpsc::Receiver<EcuEvent>,
    readers: Vec<Reader>,
    senders: Vec<Sender>,
    liveness: Liveness,
    read_timeout: Duration,
}

impl Orchestrator {
    pub fn new(read_timeout: Duration, liveness_timeout: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        Self {
            state: Arc::new(Mutex::new(CarState::new())),
            controls: Controls::new(),
            hub: TopicHub::new(),
            events_tx,
            events_rx,
            readers: Vec::new(),
            senders: Vec::new(),
            liveness: Liveness::new(liveness_timeout),
            read_timeout,
        }
    }

    pub fn from_config(config: &TestbedConfig) -> Self {
        Self::new(config.read_timeout(), config.liveness_timeout())
    }

    /// Shared handle for presentation code
    pub fn state(&self) -> Arc<Mutex<CarState>> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> CarState {
        self.state.lock().clone()
    }

    pub fn hub(&self) -> &TopicHub {
        &self.hub
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    pub fn channel_count(&self) -> usize {
        self.readers.len()
    }

    /// Start the tasks for one ECU channel
    ///
    /// Every channel gets a reader; the chassis channel also gets the sender
    /// for driver inputs, sharing the same endpoint.
    pub fn attach(&mut self, role: EcuRole, mut endpoint: ChannelEndpoint) -> ChannelResult<()> {
        let stream = endpoint.take_reader()?;
        if role == EcuRole::Chassis {
            let writer = endpoint.take_writer()?;
            let updates = self.hub.subscribe(CHASSIS_TOPIC);
            self.senders.push(Sender::spawn(CHASSIS_TOPIC, writer, updates));
        }
        self.readers.push(Reader::spawn(
            role,
            stream,
            self.events_tx.clone(),
            self.read_timeout,
        ));
        self.liveness.watch(role);
        Ok(())
    }

    /// Attach every channel in order
    ///
    /// On the first endpoint that fails to open or attach, the channels
    /// already attached are shut down before the error is returned.
    pub async fn attach_all<I>(mut self, channels: I, grace: Duration) -> ChannelResult<Self>
    where
        I: IntoIterator<Item = (EcuRole, ChannelResult<ChannelEndpoint>)>,
    {
        for (role, endpoint) in channels {
            if let Err(e) = endpoint.and_then(|endpoint| self.attach(role, endpoint)) {
                tracing::error!(ecu = %role, error = %e, "Channel attach failed");
                self.shutdown(grace).await;
                return Err(e);
            }
        }
        Ok(self)
    }

    pub fn handle_command(&mut self, command: DriverCommand) {
        tracing::debug!(?command, "Driver command");
        let mut state = self.state.lock();
        self.controls.handle(command, &mut state.driver);
    }

    /// Apply one decoded ECU frame to the reported state
    pub fn apply_event(&mut self, event: &EcuEvent) -> usize {
        if self.liveness.seen(event.role, event.received_at) {
            tracing::info!(ecu = %event.role, "ECU connected");
        }

        let mut state = self.state.lock();
        let before = state.reported.clone();
        let applied = event.role.apply(&mut state.reported, &event.updates);
        log_mitigation_verdicts(event.role, &before, &state.reported);
        applied
    }

    /// Apply every queued ECU frame; returns how many were processed
    pub fn drain_events(&mut self) -> usize {
        let mut drained = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(&event);
            drained += 1;
        }
        drained
    }

    /// Send the current driver inputs to the chassis ECU
    pub fn publish_driver_inputs(&self) -> usize {
        let updates = self.state.lock().driver.to_field_updates();
        self.hub.publish(CHASSIS_TOPIC, updates)
    }

    /// One main loop iteration
    pub fn tick(&mut self, now: Instant) {
        self.drain_events();
        {
            let mut state = self.state.lock();
            self.controls.tick(&mut state.driver);
        }
        self.publish_driver_inputs();

        for role in self.liveness.expire(now) {
            tracing::warn!(ecu = %role, "ECU disconnected");
        }
    }

    /// Tick at `interval` until `shutdown` resolves
    pub async fn run<F>(
        &mut self,
        interval: Duration,
        mut commands: mpsc::Receiver<DriverCommand>,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(command) = commands.recv() => self.handle_command(command),
                _ = ticker.tick() => self.tick(Instant::now()),
            }
        }
    }

    /// Stop every channel task and wait for it, so the relay ends can be
    /// closed safely afterwards
    pub async fn shutdown(self, grace: Duration) {
        for reader in &self.readers {
            reader.stop();
        }
        for sender in &self.senders {
            sender.stop();
        }

        for reader in self.readers {
            let role = reader.role();
            let posted = reader.join(grace).await;
            tracing::info!(channel = %role, ?posted, "Stopped reader");
        }
        for sender in self.senders {
            let topic = sender.topic().to_string();
            let written = sender.join(grace).await;
            tracing::info!(channel = topic, ?written, "Stopped sender");
        }
    }
}

fn log_mitigation_verdicts(role: EcuRole, before: &EcuReport, after: &EcuReport) {
    match role {
        EcuRole::Observer
            if (after.observer_code, after.observer_id)
                != (before.observer_code, before.observer_id)
                && after.observer_code != ObserverCode::Ok =>
        {
            tracing::warn!(
                code = %after.observer_code,
                signal = observed_signal_name(after.observer_id).unwrap_or("UNKNOWN"),
                "Observer flagged a signal"
            );
        }
        EcuRole::Gateway
            if (after.gateway_code, after.gateway_id) != (before.gateway_code, before.gateway_id)
                && after.gateway_code != GatewayCode::Ok =>
        {
            tracing::warn!(
                code = %after.gateway_code,
                can_id = format!("{:#x}", after.gateway_id),
                "Gateway blocked a frame"
            );
        }
        _ => {}
    }
}
