//! Step & atom prototypes
//!
//! A [`ProtoStep`] is a fully specified execution step *before* id and time
//! assignment; a [`ProtoAtom`] is an ordered, non-empty group of items
//! committed or abandoned as a unit. Both are plain value records: the
//! generators build them, the smart-gcal expander rewrites them, and the
//! atom builder promotes them to identified, time-estimated form.

use serde::{Deserialize, Serialize};

use crate::gcal::{GcalConfig, SmartGcalType};
use crate::hashing::{Digest, HashBytes};
use crate::records::StepRecord;
use crate::units::Offset;

// ============================================================================
// Step classification
// ============================================================================

/// Charge classification of a step.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ObserveClass {
    Science,
    NightCal,
    DayCal,
    Acquisition,
}

impl ObserveClass {
    pub const fn tag(self) -> &'static str {
        match self {
            ObserveClass::Science => "science",
            ObserveClass::NightCal => "night_cal",
            ObserveClass::DayCal => "day_cal",
            ObserveClass::Acquisition => "acquisition",
        }
    }
}

/// Whether execution should pause before the step.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Breakpoint {
    Enabled,
    #[default]
    Disabled,
}

/// Guide-loop state for a step.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GuideState {
    Enabled,
    Disabled,
}

/// Telescope pointing and guiding for one step.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TelescopeConfig {
    pub offset: Offset,
    pub guiding: GuideState,
}

impl TelescopeConfig {
    /// Guided pointing at the given offset.
    pub const fn guided(offset: Offset) -> Self {
        TelescopeConfig { offset, guiding: GuideState::Enabled }
    }

    /// Unguided pointing, used off-slit and for calibration light.
    pub const fn stationary(offset: Offset) -> Self {
        TelescopeConfig { offset, guiding: GuideState::Disabled }
    }
}

impl HashBytes for TelescopeConfig {
    fn absorb(&self, d: &mut Digest) {
        self.offset.absorb(d);
        d.absorb_bool(matches!(self.guiding, GuideState::Enabled));
    }
}

/// What a step exposes: science light, calibration light, or nothing.
/// `SmartGcal` is a placeholder that never survives expansion.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepConfig {
    Bias,
    Dark,
    Gcal(GcalConfig),
    Science,
    SmartGcal(SmartGcalType),
}

impl StepConfig {
    pub const fn tag(&self) -> &'static str {
        match self {
            StepConfig::Bias => "bias",
            StepConfig::Dark => "dark",
            StepConfig::Gcal(_) => "gcal",
            StepConfig::Science => "science",
            StepConfig::SmartGcal(_) => "smart_gcal",
        }
    }

    pub const fn is_science(&self) -> bool {
        matches!(self, StepConfig::Science)
    }

    pub const fn is_smart_gcal(&self) -> bool {
        matches!(self, StepConfig::SmartGcal(_))
    }

    /// The concrete GCAL configuration, for expanded calibration steps.
    pub const fn gcal(&self) -> Option<&GcalConfig> {
        match self {
            StepConfig::Gcal(g) => Some(g),
            _ => None,
        }
    }
}

impl HashBytes for StepConfig {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_str(self.tag());
        match self {
            StepConfig::Gcal(g) => g.absorb(d),
            StepConfig::SmartGcal(t) => {
                d.absorb_str(t.tag());
            }
            _ => {}
        }
    }
}

// ============================================================================
// ProtoStep
// ============================================================================

/// A step prior to id and time-estimate assignment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtoStep<D> {
    pub instrument: D,
    pub step_config: StepConfig,
    pub telescope: TelescopeConfig,
    pub observe_class: ObserveClass,
    pub breakpoint: Breakpoint,
}

impl<D> ProtoStep<D> {
    pub fn new(
        instrument: D,
        step_config: StepConfig,
        telescope: TelescopeConfig,
        observe_class: ObserveClass,
    ) -> Self {
        ProtoStep {
            instrument,
            step_config,
            telescope,
            observe_class,
            breakpoint: Breakpoint::Disabled,
        }
    }

    pub fn with_breakpoint(mut self, breakpoint: Breakpoint) -> Self {
        self.breakpoint = breakpoint;
        self
    }

    /// Rewrite the instrument configuration in place.
    pub fn map_instrument(self, f: impl FnOnce(D) -> D) -> Self {
        ProtoStep { instrument: f(self.instrument), ..self }
    }
}

impl<D: PartialEq> ProtoStep<D> {
    /// A recorded step matches this prototype when its instrument, step,
    /// telescope configurations and observe class agree. Breakpoints and
    /// ids are ignored.
    pub fn matches(&self, record: &StepRecord<D>) -> bool {
        self.instrument == record.instrument
            && self.step_config == record.step_config
            && self.telescope == record.telescope
            && self.observe_class == record.observe_class
    }
}

// ============================================================================
// ProtoAtom
// ============================================================================

/// An ordered, non-empty group of items with an optional description.
///
/// Emptiness is excluded by construction: the constructors either take a
/// first element or return `None` for an empty step list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtoAtom<A> {
    description: Option<String>,
    steps: Vec<A>,
}

impl<A> ProtoAtom<A> {
    /// Build from a non-empty list; `None` when `steps` is empty.
    pub fn new(description: Option<String>, steps: Vec<A>) -> Option<Self> {
        if steps.is_empty() {
            None
        } else {
            Some(ProtoAtom { description, steps })
        }
    }

    /// Single-step atom.
    pub fn one(description: Option<String>, step: A) -> Self {
        ProtoAtom { description, steps: vec![step] }
    }

    /// A first step followed by any number of others.
    pub fn of(description: Option<String>, first: A, rest: impl IntoIterator<Item = A>) -> Self {
        let mut steps = vec![first];
        steps.extend(rest);
        ProtoAtom { description, steps }
    }

    #[inline]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[inline]
    pub fn steps(&self) -> &[A] {
        &self.steps
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn into_steps(self) -> Vec<A> {
        self.steps
    }

    /// Same description, new steps. Used by expansion, which may grow the
    /// step list but never empties it (`steps` must be non-empty).
    pub(crate) fn with_steps<B>(&self, steps: Vec<B>) -> ProtoAtom<B> {
        debug_assert!(!steps.is_empty(), "an atom cannot lose all of its steps");
        ProtoAtom { description: self.description.clone(), steps }
    }

    pub fn map<B>(self, f: impl FnMut(A) -> B) -> ProtoAtom<B> {
        ProtoAtom {
            description: self.description,
            steps: self.steps.into_iter().map(f).collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
