//! Trigger registry.
//!
//! Owns every loaded [`Trigger`] and turns them into live subscriptions:
//! hardware-edge triggers into `HardwareIo` input subscriptions,
//! schedule triggers into [`Scheduler`] entries.  Two background threads
//! feed activations back in:
//!
//! ```text
//!  HardwareInbox ──▶ edge dispatcher ──┐
//!                                      ├──▶ fire(id) ──▶ worker thread
//!  schedule poller (1 s) ──────────────┘                 ActionEngine
//! ```
//!
//! Lock order is `state` before `scheduler`; the poller collects due ids
//! under the scheduler lock only and fires after releasing it.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use serde_json::Value;

use super::actions::ActionEngine;
use super::commands::ControlCommand;
use super::events::OutboundEvent;
use super::model::{DeviceConfig, Trigger, TriggerKind, display_id, parse_actions};
use super::ports::{Clock, ControlHandler, EventSink, SchedulerDelegate};
use crate::drivers::gpio::HardwareIo;
use crate::drivers::worker::spawn_worker;
use crate::error::{ConfigError, Error};
use crate::events::HardwareEvent;
use crate::scheduler::Scheduler;

const SEQUENCE_STACK_KB: usize = 256;
const SERVICE_STACK_KB: usize = 128;

/// A running action sequence.
pub struct SequenceHandle(JoinHandle<bool>);

impl SequenceHandle {
    /// Wait for the sequence; `true` if every action succeeded.
    pub fn join(self) -> bool {
        self.0.join().unwrap_or(false)
    }
}

#[derive(Default)]
struct RegistryState {
    triggers: HashMap<String, Arc<Trigger>>,
    by_pin: HashMap<u8, String>,
}

pub struct TriggerRegistry {
    hw: Arc<HardwareIo>,
    engine: Arc<ActionEngine>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    state: Mutex<RegistryState>,
    scheduler: Mutex<Scheduler>,
    running: AtomicBool,
    services: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TriggerRegistry {
    pub fn new(
        hw: Arc<HardwareIo>,
        engine: Arc<ActionEngine>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            hw,
            engine,
            sink,
            clock,
            poll_interval,
            state: Mutex::new(RegistryState::default()),
            scheduler: Mutex::new(Scheduler::new()),
            running: AtomicBool::new(false),
            services: Mutex::new(Vec::new()),
        }
    }

    // ── lifecycle ────────────────────────────────────────────

    /// Start the edge dispatcher and the schedule poller.
    pub fn start(self: &Arc<Self>) -> io::Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let dispatcher = {
            let this = Arc::clone(self);
            spawn_worker("edge-dispatch", SERVICE_STACK_KB, move || this.dispatch_edges())?
        };
        let poller = {
            let this = Arc::clone(self);
            spawn_worker("schedule-poll", SERVICE_STACK_KB, move || this.poll_schedules())?
        };
        lock(&self.services).extend([dispatcher, poller]);
        info!("Triggers: dispatcher and schedule poller started");
        Ok(())
    }

    /// Retire every trigger and stop the background threads.
    pub fn shutdown(&self) {
        self.clear_all();
        if self.running.swap(false, Ordering::AcqRel) {
            self.hw.post(HardwareEvent::Shutdown);
        }
        let services: Vec<_> = lock(&self.services).drain(..).collect();
        for handle in services {
            if handle.join().is_err() {
                error!("Triggers: service thread panicked");
            }
        }
    }

    // ── configuration ────────────────────────────────────────

    /// Replace the loaded configuration.  Bad triggers and actions are
    /// reported and skipped; the rest load.
    pub fn load_configuration(&self, config: DeviceConfig) {
        self.clear_all();
        info!(
            "Triggers: loading config for '{}' ({} trigger(s))",
            config.device_name,
            config.triggers.len()
        );

        let now = self.clock.now();
        let mut state = lock(&self.state);
        for raw in &config.triggers {
            let (trigger, skipped) = match Trigger::parse(raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.report_config_error(&display_id(raw), None, &e.into());
                    continue;
                }
            };
            for s in skipped {
                self.report_config_error(&trigger.id, Some(&s.name), &s.error.into());
            }
            if let Err(e) = self.arm(&mut state, &trigger, now) {
                self.report_config_error(&trigger.id, None, &e);
                continue;
            }
            info!(
                "Triggers: armed '{}' ({}, {} action(s))",
                trigger.name,
                trigger.kind.label(),
                trigger.actions.len()
            );
            state.triggers.insert(trigger.id.clone(), Arc::new(trigger));
        }
        info!("Triggers: {} trigger(s) armed", state.triggers.len());
    }

    fn arm(
        &self,
        state: &mut RegistryState,
        trigger: &Trigger,
        now: Option<chrono::NaiveDateTime>,
    ) -> Result<(), Error> {
        if state.triggers.contains_key(&trigger.id) {
            return Err(ConfigError::Malformed(format!("duplicate trigger id '{}'", trigger.id)).into());
        }
        match &trigger.kind {
            TriggerKind::HardwareEdge { pin, input } => {
                if let Some(owner) = state.by_pin.get(pin) {
                    return Err(ConfigError::Malformed(format!(
                        "GPIO {pin} already used by trigger '{owner}'"
                    ))
                    .into());
                }
                self.hw.configure_input(*pin, *input)?;
                state.by_pin.insert(*pin, trigger.id.clone());
            }
            TriggerKind::Schedule(at) => lock(&self.scheduler).add(&trigger.id, *at, now),
            TriggerKind::RemoteCommand => {}
        }
        Ok(())
    }

    /// Tear down every subscription and schedule entry.
    pub fn clear_all(&self) {
        let mut state = lock(&self.state);
        let count = state.triggers.len();
        state.triggers.clear();
        state.by_pin.clear();
        lock(&self.scheduler).clear();
        self.hw.teardown();
        if count > 0 {
            info!("Triggers: retired {} trigger(s)", count);
        }
    }

    fn report_config_error(&self, trigger: &str, action: Option<&str>, error: &Error) {
        match action {
            Some(action) => {
                warn!("Triggers: skipping action '{}' of '{}': {}", action, trigger, error);
                self.sink.emit(OutboundEvent::error_report(
                    error.to_string(),
                    &[("trigger", trigger), ("action", action)],
                ));
            }
            None => {
                warn!("Triggers: skipping trigger '{}': {}", trigger, error);
                self.sink.emit(OutboundEvent::error_report(
                    error.to_string(),
                    &[("trigger", trigger)],
                ));
            }
        }
    }

    // ── firing ───────────────────────────────────────────────

    /// Fire a loaded trigger on its own worker thread.  `None` if the id
    /// is not loaded.
    pub fn fire(&self, trigger_id: &str) -> Option<SequenceHandle> {
        let Some(trigger) = lock(&self.state).triggers.get(trigger_id).cloned() else {
            debug!("Triggers: '{}' not loaded, ignoring", trigger_id);
            return None;
        };
        self.launch(trigger)
    }

    /// Fire a loaded trigger; `false` if it is not loaded.
    pub fn fire_by_id(&self, trigger_id: &str) -> bool {
        let Some(trigger) = lock(&self.state).triggers.get(trigger_id).cloned() else {
            return false;
        };
        self.launch(trigger);
        true
    }

    /// Run an ad-hoc action list sent along with `execute_trigger`.
    pub fn run_inline(&self, trigger_id: &str, trigger_name: &str, actions: &[Value]) -> Option<SequenceHandle> {
        let (actions, skipped) = parse_actions(actions);
        for s in skipped {
            self.report_config_error(trigger_id, Some(&s.name), &s.error.into());
        }
        self.launch(Arc::new(Trigger {
            id: trigger_id.to_string(),
            name: trigger_name.to_string(),
            kind: TriggerKind::RemoteCommand,
            actions,
        }))
    }

    fn launch(&self, trigger: Arc<Trigger>) -> Option<SequenceHandle> {
        info!("Triggers: '{}' fired", trigger.name);
        self.sink.emit(OutboundEvent::TriggerFired {
            trigger_id: trigger.id.clone(),
            trigger_name: trigger.name.clone(),
        });
        let engine = Arc::clone(&self.engine);
        let worker = Arc::clone(&trigger);
        match spawn_worker("trigger-seq", SEQUENCE_STACK_KB, move || {
            engine.run_sequence(&worker.id, &worker.name, &worker.actions)
        }) {
            Ok(handle) => Some(SequenceHandle(handle)),
            Err(e) => {
                error!("Triggers: cannot start sequence for '{}': {}", trigger.name, e);
                self.sink.emit(OutboundEvent::error_report(
                    format!("cannot start action sequence: {e}"),
                    &[("trigger", &trigger.id)],
                ));
                None
            }
        }
    }

    /// Ids of loaded triggers, sorted.
    pub fn loaded_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.state).triggers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of live schedule entries.
    pub fn scheduled_count(&self) -> usize {
        lock(&self.scheduler).len()
    }

    // ── background services ──────────────────────────────────

    fn dispatch_edges(&self) {
        let inbox = self.hw.inbox();
        loop {
            match futures_lite::future::block_on(inbox.receive()) {
                HardwareEvent::Edge { pin, level, epoch } => {
                    let owner = {
                        let state = lock(&self.state);
                        if epoch != self.hw.epoch() {
                            debug!("Triggers: GPIO {} edge predates reload, dropped", pin);
                            continue;
                        }
                        state.by_pin.get(&pin).cloned()
                    };
                    match owner {
                        Some(id) => {
                            debug!("Triggers: GPIO {} edge ({}) -> '{}'", pin, level, id);
                            self.fire(&id);
                        }
                        None => debug!("Triggers: GPIO {} edge with no trigger", pin),
                    }
                }
                HardwareEvent::Shutdown => {
                    info!("Triggers: edge dispatcher stopped");
                    return;
                }
            }
        }
    }

    fn poll_schedules(&self) {
        while self.running.load(Ordering::Acquire) {
            thread::sleep(self.poll_interval);
            self.run_due_schedules();
        }
        info!("Triggers: schedule poller stopped");
    }

    /// Fire every schedule entry due at the current clock reading.
    pub fn run_due_schedules(&self) {
        let Some(now) = self.clock.now() else {
            return;
        };
        let mut due = DueList::default();
        lock(&self.scheduler).tick(now, &mut due);
        for id in due.0 {
            self.fire(&id);
        }
    }
}

/// Collects due ids so firing happens outside the scheduler lock.
#[derive(Default)]
struct DueList(Vec<String>);

impl SchedulerDelegate for DueList {
    fn on_schedule_fired(&mut self, trigger_id: &str) {
        self.0.push(trigger_id.to_string());
    }
}

impl ControlHandler for TriggerRegistry {
    fn handle(&self, command: ControlCommand) {
        match command {
            ControlCommand::LoadConfig(Some(config)) => self.load_configuration(config),
            ControlCommand::LoadConfig(None) => {
                warn!("Triggers: server has no configuration for this device");
                self.clear_all();
            }
            ControlCommand::ExecuteTrigger {
                trigger_id,
                trigger_name,
                actions,
            } => {
                if self.fire_by_id(&trigger_id) {
                    return;
                }
                if actions.is_empty() {
                    warn!("Triggers: execute request for unknown trigger '{}'", trigger_id);
                    self.sink.emit(OutboundEvent::error_report(
                        "unknown trigger",
                        &[("trigger", &trigger_id)],
                    ));
                    return;
                }
                let name = trigger_name.unwrap_or_else(|| trigger_id.clone());
                self.run_inline(&trigger_id, &name, &actions);
            }
        }
    }
}
