//! Table-driven operation state machine.
//!
//! Each state owns one phase function that performs a single bounded unit
//! of work and reports a [`PhaseResult`].  Where to go next is not decided
//! by the phase: the engine looks `(state, result)` up in [`TRANSITIONS`].
//!
//! ```text
//!            ┌──────────── Retry ───────────┐
//!            ▼                              │
//!   ┌─▶ WifiConnect ── Success ──▶ FirmwareUpdateCheck ──▶ TimeSync ⟲
//!   │        │ Fatal (local-only)                              │
//!   │        ▼                                                 ▼
//!   │   ButtonCheck ◀────────── LocalLog ◀──────────────── Publish ⟲
//!   │        │                      ▲
//!   │        ▼                      │ Degraded (cooldown running)
//!   └── DisplayRefresh ─────────────┘
//!          Success
//! ```
//!
//! Every phase receives the device [`FsmContext`] and the collaborator
//! bundle [`Ports`].  On each state entry the engine re-arms the context's
//! [`RetryBudget`](crate::retry::RetryBudget) with the limit configured
//! for the new state; a `Retry` result keeps the current budget running.

pub mod context;
pub mod states;

use context::FsmContext;
use log::{error, info};
use serde::Serialize;

use crate::app::ports::Ports;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Operational phases of the device cycle.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum StateId {
    WifiConnect = 0,
    FirmwareUpdateCheck = 1,
    TimeSync = 2,
    Publish = 3,
    LocalLog = 4,
    ButtonCheck = 5,
    DisplayRefresh = 6,
}

impl StateId {
    /// Total number of states — used to size the table array.
    pub const COUNT: usize = 7;

    /// Convert an index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns [`RECOVERY_STATE`] in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::WifiConnect,
            1 => Self::FirmwareUpdateCheck,
            2 => Self::TimeSync,
            3 => Self::Publish,
            4 => Self::LocalLog,
            5 => Self::ButtonCheck,
            6 => Self::DisplayRefresh,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                RECOVERY_STATE
            }
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::WifiConnect => "WifiConnect",
            Self::FirmwareUpdateCheck => "FirmwareUpdateCheck",
            Self::TimeSync => "TimeSync",
            Self::Publish => "Publish",
            Self::LocalLog => "LocalLog",
            Self::ButtonCheck => "ButtonCheck",
            Self::DisplayRefresh => "DisplayRefresh",
        }
    }
}

/// Where the machine goes when a `(state, result)` pair has no table row.
/// Input handling and the display keep working from here.
pub const RECOVERY_STATE: StateId = StateId::ButtonCheck;

/// Outcome of one phase step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseResult {
    Success,
    /// Transient failure; run the same phase again next iteration.
    Retry,
    /// Budget exhausted or unrecoverable; the cycle continues without it.
    Fatal,
    /// Local-only mode is active; network phases are skipped.
    Degraded,
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: StateId,
    pub on: PhaseResult,
    pub to: StateId,
}

const fn row(from: StateId, on: PhaseResult, to: StateId) -> Transition {
    Transition { from, on, to }
}

/// Every reachable `(state, result)` pair and its destination.
pub const TRANSITIONS: [Transition; 16] = {
    use PhaseResult::{Degraded, Fatal, Retry, Success};
    use StateId::{
        ButtonCheck, DisplayRefresh, FirmwareUpdateCheck, LocalLog, Publish, TimeSync,
        WifiConnect,
    };
    [
        row(WifiConnect, Success, FirmwareUpdateCheck),
        row(WifiConnect, Retry, WifiConnect),
        row(WifiConnect, Fatal, ButtonCheck),
        row(FirmwareUpdateCheck, Success, TimeSync),
        row(FirmwareUpdateCheck, Fatal, TimeSync),
        row(TimeSync, Success, Publish),
        row(TimeSync, Retry, TimeSync),
        row(TimeSync, Fatal, Publish),
        row(Publish, Success, LocalLog),
        row(Publish, Retry, Publish),
        row(Publish, Fatal, LocalLog),
        row(LocalLog, Success, ButtonCheck),
        row(LocalLog, Fatal, ButtonCheck),
        row(ButtonCheck, Success, DisplayRefresh),
        row(DisplayRefresh, Success, WifiConnect),
        row(DisplayRefresh, Degraded, LocalLog),
    ]
};

/// Look up the destination for `(from, on)`.
pub fn next_state(from: StateId, on: PhaseResult) -> Option<StateId> {
    TRANSITIONS
        .iter()
        .find(|t| t.from == from && t.on == on)
        .map(|t| t.to)
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` actions.  Runs once per state entry.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for a phase body.
pub type PhaseFn = fn(&mut FsmContext, &mut Ports<'_>) -> PhaseResult;

// ---------------------------------------------------------------------------
// State descriptor (one row in the state table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
pub struct StateDescriptor {
    pub id: StateId,
    pub on_enter: Option<StateActionFn>,
    pub run: PhaseFn,
}

/// What happened during one [`Fsm::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub from: StateId,
    pub result: PhaseResult,
    pub to: StateId,
}

impl Step {
    pub fn changed_state(&self) -> bool {
        self.from != self.to
    }
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    /// Rows must sit at the index of their own `id`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        for (idx, row) in table.iter().enumerate() {
            if row.id as usize != idx {
                debug_assert!(false, "state table row {idx} holds {:?}", row.id);
                error!("FSM: state table row {} holds {}", idx, row.id.name());
            }
        }
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Arm the budget and run `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        let id = self.current_state();
        info!("FSM starting in state: {}", id.name());
        ctx.arm_retry(id);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Run one phase step and follow the transition table.
    pub fn tick(&mut self, ctx: &mut FsmContext, ports: &mut Ports<'_>) -> Step {
        let from = self.current_state();
        let result = (self.table[self.current].run)(ctx, ports);

        let to = if let Some(to) = next_state(from, result) {
            to
        } else {
            debug_assert!(false, "no transition for {from:?} on {result:?}");
            error!(
                "FSM: no transition for {} on {:?}, recovering to {}",
                from.name(),
                result,
                RECOVERY_STATE.name()
            );
            RECOVERY_STATE
        };

        if to != from {
            self.transition(to, ctx);
        }

        Step { from, result, to }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut FsmContext) {
        info!(
            "FSM transition: {} -> {}",
            self.current_state().name(),
            next_id.name()
        );

        self.current = next_id as usize;
        ctx.arm_retry(next_id);

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
