//! Recording collaborators for integration tests.
//!
//! Every port the state machine drives has a mock here that records each
//! call, so tests can assert on the full I/O history of a cycle without a
//! radio, SD card or display attached.

use powermeter::app::events::AppEvent;
use powermeter::app::ports::{
    DisplayPort, EventSink, FirmwareUpdatePort, LinkInfo, NetworkPort, PortError, Ports,
    PushPort, RecordStorePort, TimeSourcePort, UpdateStatus,
};
use powermeter::app::service::AppService;
use powermeter::config::SystemConfig;
use powermeter::display::{DisplayFieldMask, DisplayValues};
use powermeter::drivers::button::EdgeQueue;
use powermeter::energy::EnergySample;
use powermeter::fsm::{StateId, Step};
use powermeter::sensors::pulse::PulseAccumulator;

/// Epoch handed out by the default time source: 2023-11-14T22:13:20Z.
pub const SYNC_EPOCH: u32 = 1_700_000_000;

/// Uptime advance per simulated main-loop iteration.
pub const TICK_MS: u64 = 100;

pub fn home_link() -> LinkInfo {
    let mut ssid = heapless::String::new();
    let _ = ssid.push_str("HomeNet");
    LinkInfo {
        ssid,
        ip: [192, 168, 1, 77],
    }
}

// ── Network ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockNetwork {
    pub connected: bool,
    /// Every `connect()` fails with this while set.
    pub fail_with: Option<PortError>,
    pub connects: u32,
    pub disconnects: u32,
}

impl NetworkPort for MockNetwork {
    fn connect(&mut self) -> Result<LinkInfo, PortError> {
        self.connects += 1;
        match self.fail_with {
            Some(e) => {
                self.connected = false;
                Err(e)
            }
            None => {
                self.connected = true;
                Ok(home_link())
            }
        }
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn link(&self) -> Option<LinkInfo> {
        self.connected.then(home_link)
    }
}

// ── Firmware updater ──────────────────────────────────────────

pub struct MockUpdater {
    pub result: Result<UpdateStatus, PortError>,
    pub checks: u32,
}

impl Default for MockUpdater {
    fn default() -> Self {
        Self {
            result: Ok(UpdateStatus::NoUpdate),
            checks: 0,
        }
    }
}

impl FirmwareUpdatePort for MockUpdater {
    fn check(&mut self) -> Result<UpdateStatus, PortError> {
        self.checks += 1;
        self.result
    }
}

// ── Time source ───────────────────────────────────────────────

pub struct MockTimeSource {
    pub result: Result<u32, PortError>,
    pub calls: u32,
}

impl Default for MockTimeSource {
    fn default() -> Self {
        Self {
            result: Ok(SYNC_EPOCH),
            calls: 0,
        }
    }
}

impl TimeSourcePort for MockTimeSource {
    fn fetch_epoch(&mut self) -> Result<u32, PortError> {
        self.calls += 1;
        self.result
    }
}

// ── Push endpoint ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockPush {
    pub fail_with: Option<PortError>,
    /// Every submission, including failed ones.
    pub attempts: Vec<EnergySample>,
    /// Submissions the endpoint accepted.
    pub accepted: Vec<EnergySample>,
}

impl PushPort for MockPush {
    fn submit(&mut self, sample: &EnergySample) -> Result<(), PortError> {
        self.attempts.push(*sample);
        match self.fail_with {
            Some(e) => Err(e),
            None => {
                self.accepted.push(*sample);
                Ok(())
            }
        }
    }
}

// ── Record store ──────────────────────────────────────────────

#[derive(Default)]
pub struct MockRecords {
    pub fail_with: Option<PortError>,
    pub appends: u32,
    pub written: Vec<EnergySample>,
}

impl RecordStorePort for MockRecords {
    fn append_record(&mut self, sample: &EnergySample) -> Result<(), PortError> {
        self.appends += 1;
        match self.fail_with {
            Some(e) => Err(e),
            None => {
                self.written.push(*sample);
                Ok(())
            }
        }
    }
}

// ── Display ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MockDisplay {
    pub fail_with: Option<PortError>,
    pub frames: Vec<(DisplayFieldMask, DisplayValues)>,
}

#[allow(dead_code)]
impl MockDisplay {
    pub fn last_frame(&self) -> Option<&(DisplayFieldMask, DisplayValues)> {
        self.frames.last()
    }
}

impl DisplayPort for MockDisplay {
    fn redraw(
        &mut self,
        dirty: DisplayFieldMask,
        values: &DisplayValues,
    ) -> Result<DisplayFieldMask, PortError> {
        if let Some(e) = self.fail_with {
            return Err(e);
        }
        self.frames.push((dirty, values.clone()));
        Ok(dirty)
    }
}

// ── Event sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

/// Build and start a service wired to the given ISR-side accumulators.
pub fn start_app<'a>(
    config: SystemConfig,
    pulses: &'a PulseAccumulator,
    edges: &'a EdgeQueue,
    rig: &mut Rig,
) -> AppService<'a> {
    let mut app = AppService::new(config, pulses, edges);
    app.start(&mut rig.sink);
    app
}

/// Queue a press of `hold_ms` starting at `at_ms`.
pub fn press_button(edges: &EdgeQueue, at_ms: u32, hold_ms: u32) {
    assert!(edges.on_edge_interrupt(true, at_ms));
    assert!(edges.on_edge_interrupt(false, at_ms + hold_ms));
}

// ── Rig: all collaborators plus a simulated uptime ────────────

#[derive(Default)]
pub struct Rig {
    pub network: MockNetwork,
    pub updater: MockUpdater,
    pub time_source: MockTimeSource,
    pub push: MockPush,
    pub records: MockRecords,
    pub display: MockDisplay,
    pub sink: RecordingSink,
    pub now_ms: u64,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ports(&mut self) -> Ports<'_> {
        Ports {
            network: &mut self.network,
            updater: &mut self.updater,
            time_source: &mut self.time_source,
            push: &mut self.push,
            records: &mut self.records,
            display: &mut self.display,
            sink: &mut self.sink,
        }
    }

    /// Advance uptime by one loop iteration and run one step.
    pub fn tick(&mut self, app: &mut AppService<'_>) -> Step {
        self.now_ms += TICK_MS;
        let now = self.now_ms;
        let mut ports = self.ports();
        app.tick(now, &mut ports)
    }

    /// Step until DisplayRefresh has run once.  Returns every step taken.
    pub fn run_cycle(&mut self, app: &mut AppService<'_>) -> Vec<Step> {
        let mut steps = Vec::new();
        for _ in 0..64 {
            let step = self.tick(app);
            steps.push(step);
            if step.from == StateId::DisplayRefresh {
                return steps;
            }
        }
        panic!("no DisplayRefresh within 64 steps: {:?}", steps);
    }

    /// Step until the machine sits in `state`, with a bound.
    pub fn run_until(&mut self, app: &mut AppService<'_>, state: StateId) {
        for _ in 0..64 {
            if app.state() == state {
                return;
            }
            self.tick(app);
        }
        panic!("never reached {:?}", state);
    }
}
