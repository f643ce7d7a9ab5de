//! Recorded execution history
//!
//! Visits, atoms, and steps recorded by the telescope control system are
//! folded back into a generator so the remaining sequence reflects what has
//! already been observed. These records are external inputs: the crate
//! never creates them, only consumes them in caller order.

use serde::{Deserialize, Serialize};

use crate::ids::{AtomId, ObservationId, SequenceType, StepId, VisitId};
use crate::proto::{ObserveClass, StepConfig, TelescopeConfig};
use crate::units::{Timestamp, TimestampInterval};

/// Execution state shared by atom and step records.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    NotStarted,
    Ongoing,
    Completed,
    Abandoned,
}

/// Quality assessment assigned to a step's dataset.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum QaState {
    Pass,
    Usable,
    Fail,
}

impl QaState {
    /// Only `Pass` counts toward sequence completion; `Usable` data is kept
    /// but the step is repeated.
    pub const fn is_passing(self) -> bool {
        matches!(self, QaState::Pass)
    }
}

/// The instruments this generator understands.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Instrument {
    Flamingos2,
    GmosNorth,
    GmosSouth,
}

impl Instrument {
    pub const fn tag(self) -> &'static str {
        match self {
            Instrument::Flamingos2 => "flamingos2",
            Instrument::GmosNorth => "gmos_north",
            Instrument::GmosSouth => "gmos_south",
        }
    }
}

/// Observatory site.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Site {
    GeminiNorth,
    GeminiSouth,
}

/// Sequence-level commands recorded from the observer's console.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SequenceCommand {
    Abort,
    Continue,
    Pause,
    Start,
    Stop,
}

/// A recorded observing visit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub visit_id: VisitId,
    pub observation_id: ObservationId,
    pub instrument: Instrument,
    pub created: Timestamp,
    pub site: Site,
}

/// A recorded atom header. `step_count` is the number of steps the atom
/// was generated with; the completion tracker uses it to decide whether a
/// run of recorded steps closes the atom.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomRecord {
    pub atom_id: AtomId,
    pub visit_id: VisitId,
    pub sequence_type: SequenceType,
    pub step_count: u16,
    pub created: Timestamp,
    pub execution: ExecutionState,
}

/// A recorded step with the full configuration it executed under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord<D> {
    pub step_id: StepId,
    pub atom_id: AtomId,
    pub visit_id: VisitId,
    /// Position of the step within its atom.
    pub index: u16,
    pub instrument: D,
    pub step_config: StepConfig,
    pub telescope: TelescopeConfig,
    pub observe_class: ObserveClass,
    pub created: Timestamp,
    /// Execution interval derived from the step's events, when known.
    pub interval: Option<TimestampInterval>,
    pub sequence_type: SequenceType,
    pub execution: ExecutionState,
    pub qa: Option<QaState>,
}

impl<D> StepRecord<D> {
    /// A step contributes to completion only when it ran to the end and its
    /// dataset QA is passing or not yet assigned.
    pub fn successfully_completed(&self) -> bool {
        self.execution == ExecutionState::Completed
            && self.qa.map_or(true, QaState::is_passing)
    }

    /// The execution interval, degenerate at `created` when no events were
    /// recorded.
    pub fn interval_or_instant(&self) -> TimestampInterval {
        self.interval.unwrap_or_else(|| TimestampInterval::instant(self.created))
    }
}
