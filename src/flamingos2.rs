//! Flamingos-2 long-slit sequence generation
//!
//! The science pattern is an ABBA nod cycle with periodic night-time
//! calibrations, laid out in time-bounded blocks:
//!
//! - a block closes after [`MAX_VISIT_LENGTH`] so a telluric standard can be
//!   taken (the standard itself is scheduled elsewhere; this generator just
//!   stops emitting into the block);
//! - science accumulated in a block beyond [`MAX_SCIENCE_PERIOD`] forces a
//!   calibration atom in the middle of the block rather than only at its
//!   end.
//!
//! Recorded execution folds into a [`SequenceRecord`]: ABBA cycles and
//! calibration groups are matched step by step, completed cycles advance
//! the goal accounting, and completed calibrations extend the block
//! interval. A mismatched step resets the current tracker and is offered to
//! a fresh one, so anomalous history degrades to re-doing work rather than
//! corrupting state.

use std::collections::{HashSet, VecDeque};

use crate::builder::{Atom, AtomBuilder, IndexTracker};
use crate::completion::{AtomMap, AtomMatch, State as CompletionState};
use crate::config::{
    Flamingos2Config, Flamingos2Decker, Flamingos2Dynamic, IntegrationTime,
    STANDIN_ACQUISITION_TIME,
};
use crate::estimate::{Last, TimeEstimateCalculator};
use crate::gcal::{SmartGcalError, SmartGcalExpander, SmartGcalType};
use crate::ids::{AtomId, SequenceIds, SequenceType, VisitId};
use crate::proto::{ObserveClass, ProtoAtom, ProtoStep, StepConfig, TelescopeConfig};
use crate::records::{AtomRecord, SequenceCommand, StepRecord, VisitRecord};
use crate::units::{Offset, TimeSpan, Timestamp, TimestampInterval};

/// A block must close for a telluric break after this much elapsed time.
pub const MAX_VISIT_LENGTH: TimeSpan = TimeSpan::from_hours(3);

/// Science time within a block beyond which a mid-block calibration is due.
pub const MAX_SCIENCE_PERIOD: TimeSpan = TimeSpan::from_minutes(90);

/// Slit length on the sky; offsets beyond half of it are off-slit.
pub const SLIT_LENGTH_UAS: i64 = 108_000_000;

const ABBA_CYCLE: &str = "ABBA Cycle";
const NIGHTTIME_CALS: &str = "Nighttime Calibrations";

/// `true` when an offset position keeps the target in the slit. Off-slit
/// positions sample sky and are necessarily unguided.
pub fn is_on_slit(offset: &Offset) -> bool {
    offset.p.as_uas() == 0 && offset.q.abs_uas() <= SLIT_LENGTH_UAS / 2
}

/// Flamingos-2 long-slit validation failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Flamingos2Error {
    #[error("Flamingos 2 Long Slit requires a positive exposure time.")]
    NonPositiveExposure,
    #[error("Exactly 4 offset positions are needed, grouped in ABBA order (got {0}).")]
    OffsetCount(usize),
    #[error("Estimated ABBA cycle time ({0}) must be less than 90 minutes.")]
    CycleTooLong(TimeSpan),
    #[error("At least one exposure must be taken on slit.")]
    NoOnSlitPosition,
    #[error(transparent)]
    SmartGcal(#[from] SmartGcalError),
}

// ============================================================================
// StepDefinition
// ============================================================================

/// The four science positions (ABBA order) and the concrete night-time
/// calibration steps, fixed for the whole observation.
#[derive(Clone, Debug)]
pub struct StepDefinition {
    pub a0: ProtoStep<Flamingos2Dynamic>,
    pub b0: ProtoStep<Flamingos2Dynamic>,
    pub b1: ProtoStep<Flamingos2Dynamic>,
    pub a1: ProtoStep<Flamingos2Dynamic>,
    /// Flats first, then arcs, already expanded to concrete GCAL steps.
    pub cals: Vec<ProtoStep<Flamingos2Dynamic>>,
}

impl StepDefinition {
    pub fn compute(
        config: &Flamingos2Config,
        exposure: TimeSpan,
        expander: &mut dyn SmartGcalExpander<Flamingos2Dynamic>,
    ) -> Result<Self, Flamingos2Error> {
        if exposure.is_zero() {
            return Err(Flamingos2Error::NonPositiveExposure);
        }
        if config.offsets.len() != 4 {
            return Err(Flamingos2Error::OffsetCount(config.offsets.len()));
        }
        if !config.offsets.iter().any(is_on_slit) {
            return Err(Flamingos2Error::NoOnSlitPosition);
        }

        let dynamic = config.science_dynamic(exposure);
        let science = |offset: Offset| {
            let telescope = if is_on_slit(&offset) {
                TelescopeConfig::guided(offset)
            } else {
                TelescopeConfig::stationary(offset)
            };
            ProtoStep::new(
                dynamic.clone(),
                StepConfig::Science,
                telescope,
                ObserveClass::Science,
            )
        };

        // Calibration light is insensitive to small pointings; take the
        // cals wherever the first science position leaves the telescope.
        let cal_telescope = TelescopeConfig::stationary(config.offsets[0]);
        let placeholder = |kind| {
            ProtoStep::new(
                dynamic.clone(),
                StepConfig::SmartGcal(kind),
                cal_telescope.clone(),
                ObserveClass::NightCal,
            )
        };
        let mut cals = expander.expand_step(&placeholder(SmartGcalType::Flat))?;
        cals.extend(expander.expand_step(&placeholder(SmartGcalType::Arc))?);

        Ok(StepDefinition {
            a0: science(config.offsets[0]),
            b0: science(config.offsets[1]),
            b1: science(config.offsets[2]),
            a1: science(config.offsets[3]),
            cals,
        })
    }

    pub fn science_positions(&self) -> [&ProtoStep<Flamingos2Dynamic>; 4] {
        [&self.a0, &self.b0, &self.b1, &self.a1]
    }

    /// On-slit positions per cycle; only these count toward the exposure
    /// goal even though all four are science steps.
    pub fn exposures_per_cycle(&self) -> u32 {
        self.science_positions()
            .iter()
            .filter(|s| is_on_slit(&s.telescope.offset))
            .count() as u32
    }

    pub fn abba_atom(&self) -> ProtoAtom<ProtoStep<Flamingos2Dynamic>> {
        ProtoAtom::of(
            Some(ABBA_CYCLE.into()),
            self.a0.clone(),
            [self.b0.clone(), self.b1.clone(), self.a1.clone()],
        )
    }

    pub fn cal_atom(&self) -> ProtoAtom<ProtoStep<Flamingos2Dynamic>> {
        ProtoAtom::new(Some(NIGHTTIME_CALS.into()), self.cals.clone())
            .expect("calibration step list is never empty")
    }
}

// ============================================================================
// Trackers
// ============================================================================

/// Progress through one ABBA cycle; the variant names the position awaited
/// next, carrying the union of intervals observed so far.
#[derive(Clone, Debug, PartialEq, Eq)]
enum AbbaState {
    A0,
    B0(TimestampInterval),
    B1(TimestampInterval),
    A1(TimestampInterval),
    End(TimestampInterval),
}

impl AbbaState {
    fn next(self, steps: &StepDefinition, record: &StepRecord<Flamingos2Dynamic>) -> AbbaState {
        let observed = record.interval_or_instant();
        let expected = match &self {
            AbbaState::A0 => &steps.a0,
            AbbaState::B0(_) => &steps.b0,
            AbbaState::B1(_) => &steps.b1,
            AbbaState::A1(_) => &steps.a1,
            AbbaState::End(_) => return self,
        };
        if expected.matches(record) {
            let interval = match self {
                AbbaState::A0 => observed,
                AbbaState::B0(i) | AbbaState::B1(i) | AbbaState::A1(i) => i.union(&observed),
                AbbaState::End(_) => unreachable!(),
            };
            match self {
                AbbaState::A0 => AbbaState::B0(interval),
                AbbaState::B0(_) => AbbaState::B1(interval),
                AbbaState::B1(_) => AbbaState::A1(interval),
                AbbaState::A1(_) => AbbaState::End(interval),
                AbbaState::End(_) => unreachable!(),
            }
        } else if matches!(self, AbbaState::A0) {
            AbbaState::A0
        } else {
            // A spurious step restarts the match from the first position
            // and is offered to the fresh cycle once.
            AbbaState::A0.next(steps, record)
        }
    }
}

/// The in-progress atom being matched against recorded steps.
#[derive(Clone, Debug)]
enum AtomTracker {
    Abba(AbbaState),
    Calibrations {
        interval: Option<TimestampInterval>,
        expected: Vec<ProtoStep<Flamingos2Dynamic>>,
    },
}

impl AtomTracker {
    fn fresh_abba() -> Self {
        AtomTracker::Abba(AbbaState::A0)
    }

    fn fresh_cals(steps: &StepDefinition) -> Self {
        AtomTracker::Calibrations { interval: None, expected: steps.cals.clone() }
    }
}

// ============================================================================
// SequenceRecord
// ============================================================================

/// Folded science-sequence execution state for one observation.
#[derive(Clone, Debug)]
pub struct SequenceRecord {
    current: AtomTracker,
    block: Option<TimestampInterval>,
    pending: Option<TimestampInterval>,
    stop: bool,
    completed_cycles: u32,
    visit: Option<VisitId>,
    atoms_seen: HashSet<AtomId>,
}

impl SequenceRecord {
    pub fn new() -> Self {
        SequenceRecord {
            current: AtomTracker::fresh_abba(),
            block: None,
            pending: None,
            stop: false,
            completed_cycles: 0,
            visit: None,
            atoms_seen: HashSet::new(),
        }
    }

    pub fn completed_cycles(&self) -> u32 {
        self.completed_cycles
    }

    pub fn block(&self) -> Option<TimestampInterval> {
        self.block
    }

    pub fn pending(&self) -> Option<TimestampInterval> {
        self.pending
    }

    pub fn stopped(&self) -> bool {
        self.stop
    }

    /// Distinct science atoms recorded, for id-index continuation.
    pub fn atom_count(&self) -> u32 {
        self.atoms_seen.len() as u32
    }

    /// A new visit abandons any in-progress block state; completed cycles
    /// are cumulative and survive.
    pub fn reset_visit(&mut self) {
        self.current = AtomTracker::fresh_abba();
        self.block = None;
        self.pending = None;
        self.stop = false;
    }

    /// A recorded stop closes the current block early.
    pub fn end_block_early(&mut self) {
        self.stop = true;
    }

    pub fn record_atom(&mut self, record: &AtomRecord) {
        if record.sequence_type == SequenceType::Science {
            self.atoms_seen.insert(record.atom_id);
        }
    }

    pub fn record_step(&mut self, steps: &StepDefinition, record: &StepRecord<Flamingos2Dynamic>) {
        if record.sequence_type != SequenceType::Science {
            return;
        }
        if self.visit != Some(record.visit_id) {
            self.reset_visit();
            self.visit = Some(record.visit_id);
        }
        if !record.successfully_completed() {
            return;
        }

        let is_gcal = matches!(record.step_config, StepConfig::Gcal(_));
        let is_science = record.step_config.is_science();
        if !is_gcal && !is_science {
            return;
        }

        let current = std::mem::replace(&mut self.current, AtomTracker::fresh_abba());
        self.current = match (current, is_science) {
            (AtomTracker::Abba(state), true) => AtomTracker::Abba(state.next(steps, record)),
            (AtomTracker::Abba(_), false) => {
                // Science gave way to calibrations; an unfinished cycle is
                // abandoned.
                Self::cal_step(AtomTracker::fresh_cals(steps), record)
            }
            (cals @ AtomTracker::Calibrations { .. }, false) => Self::cal_step(cals, record),
            (AtomTracker::Calibrations { .. }, true) => {
                // An incomplete calibration group is abandoned when science
                // resumes.
                AtomTracker::Abba(AbbaState::A0.next(steps, record))
            }
        };
        self.settle();
    }

    fn cal_step(tracker: AtomTracker, record: &StepRecord<Flamingos2Dynamic>) -> AtomTracker {
        match tracker {
            AtomTracker::Calibrations { interval, mut expected } => {
                let observed = record.interval_or_instant();
                match expected.iter().position(|p| p.matches(record)) {
                    Some(i) => {
                        expected.remove(i);
                        AtomTracker::Calibrations {
                            interval: Some(observed.union_opt(interval.as_ref())),
                            expected,
                        }
                    }
                    // Unrecognized calibration: the tracker restarts.
                    None => AtomTracker::fresh_abba(),
                }
            }
            other => other,
        }
    }

    /// Commit a completed tracker: a finished ABBA cycle joins the pending
    /// (uncalibrated) science, a finished calibration group clears it and
    /// extends the block.
    fn settle(&mut self) {
        match &self.current {
            AtomTracker::Abba(AbbaState::End(interval)) => {
                self.completed_cycles += 1;
                self.pending = Some(interval.union_opt(self.pending.as_ref()));
                self.current = AtomTracker::fresh_abba();
            }
            AtomTracker::Calibrations { interval, expected } if expected.is_empty() => {
                let mut block = *interval;
                if let (Some(b), Some(p)) = (&block, &self.pending) {
                    block = Some(b.union(p));
                }
                if let (Some(b), Some(prior)) = (&block, &self.block) {
                    block = Some(b.union(prior));
                }
                self.block = block.or(self.block);
                self.pending = None;
                self.current = AtomTracker::fresh_abba();
            }
            _ => {}
        }
    }
}

impl Default for SequenceRecord {
    fn default() -> Self {
        SequenceRecord::new()
    }
}

// ============================================================================
// Block layout
// ============================================================================

/// Lay out the atoms remaining in the current block.
///
/// Returns the proto-atoms and the number of ABBA cycles among them. The
/// reference time is clamped to the recorded block start and pending end so
/// time never runs backwards.
pub fn remaining_atoms_in_block(
    steps: &StepDefinition,
    when: Timestamp,
    block_start: Option<Timestamp>,
    pending: Option<TimestampInterval>,
    cycle_estimate: TimeSpan,
    max_cycles: u32,
) -> (Vec<ProtoAtom<ProtoStep<Flamingos2Dynamic>>>, u32) {
    let pending_start = pending.map(|i| i.start());
    let pending_end = pending.map(|i| i.end());

    let now = [Some(when), block_start, pending_end]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(when);
    let block_start = block_start.or(pending_start).unwrap_or(now);
    let end = block_start + MAX_VISIT_LENGTH;

    let window = TimeSpan::between(now, end);
    let cycles = (window.div_by(cycle_estimate) as u32).min(max_cycles);
    let pending_span = pending.map_or(TimeSpan::ZERO, |i| i.duration());
    let science_time = cycle_estimate * cycles + pending_span;

    let mut atoms = Vec::new();
    if science_time < MAX_SCIENCE_PERIOD {
        for _ in 0..cycles {
            atoms.push(steps.abba_atom());
        }
        if cycles > 0 || pending.is_some() {
            atoms.push(steps.cal_atom());
        }
    } else {
        // Place one calibration as close as possible to the middle of the
        // science, rounding to whole cycles.
        let science_start = pending_start.unwrap_or(now);
        let nominal_cal_time = science_start + science_time.half();
        let lead = TimeSpan::between(now, nominal_cal_time);
        let full = (lead.div_by(cycle_estimate) as u32).min(cycles);
        let remainder = lead.saturating_sub(cycle_estimate * full);
        let pre = if remainder >= cycle_estimate.half() { (full + 1).min(cycles) } else { full };
        let post = cycles - pre;

        for _ in 0..pre {
            atoms.push(steps.abba_atom());
        }
        atoms.push(steps.cal_atom());
        for _ in 0..post {
            atoms.push(steps.abba_atom());
        }
        if post > 0 {
            atoms.push(steps.cal_atom());
        }
    }
    (atoms, cycles)
}

// ============================================================================
// Generator
// ============================================================================

/// Flamingos-2 long-slit sequence generator for one observation.
pub struct Flamingos2Generator<'a> {
    config: Flamingos2Config,
    calc: &'a dyn TimeEstimateCalculator<Flamingos2Config, Flamingos2Dynamic>,
    ids: SequenceIds,
    steps: StepDefinition,
    cycle_estimate: TimeSpan,
    goal_cycles: u32,
    acq_exposure: TimeSpan,
    record: SequenceRecord,
    completion: CompletionState<Flamingos2Dynamic>,
}

impl<'a> std::fmt::Debug for Flamingos2Generator<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flamingos2Generator")
            .field("config", &self.config)
            .field("ids", &self.ids)
            .field("steps", &self.steps)
            .field("cycle_estimate", &self.cycle_estimate)
            .field("goal_cycles", &self.goal_cycles)
            .field("acq_exposure", &self.acq_exposure)
            .field("record", &self.record)
            .field("completion", &self.completion)
            .finish()
    }
}

impl<'a> Flamingos2Generator<'a> {
    pub fn new(
        config: Flamingos2Config,
        itc: IntegrationTime,
        acquisition_itc: Option<IntegrationTime>,
        calc: &'a dyn TimeEstimateCalculator<Flamingos2Config, Flamingos2Dynamic>,
        expander: &mut dyn SmartGcalExpander<Flamingos2Dynamic>,
        ids: SequenceIds,
    ) -> Result<Self, Flamingos2Error> {
        let steps = StepDefinition::compute(&config, itc.exposure_time, expander)?;

        let abba = steps.abba_atom();
        let cycle_estimate =
            calc.estimate_total(&config, &mut Last::new(), abba.steps());
        if cycle_estimate >= MAX_SCIENCE_PERIOD {
            return Err(Flamingos2Error::CycleTooLong(cycle_estimate));
        }

        let per_cycle = steps.exposures_per_cycle();
        let goal_cycles = itc.exposure_count.div_ceil(per_cycle);

        Ok(Flamingos2Generator {
            config,
            calc,
            ids,
            steps,
            cycle_estimate,
            goal_cycles,
            acq_exposure: acquisition_itc
                .map_or(STANDIN_ACQUISITION_TIME, |t| t.exposure_time),
            record: SequenceRecord::new(),
            completion: CompletionState::new(),
        })
    }

    pub fn config(&self) -> &Flamingos2Config {
        &self.config
    }

    pub fn goal_cycles(&self) -> u32 {
        self.goal_cycles
    }

    pub fn record_visit(&mut self, _visit: &VisitRecord) {
        self.record.reset_visit();
    }

    pub fn record_atom(&mut self, record: &AtomRecord) {
        self.record.record_atom(record);
        self.completion.record_atom(record);
    }

    pub fn record_step(&mut self, record: &StepRecord<Flamingos2Dynamic>) {
        match record.sequence_type {
            SequenceType::Science => self.record.record_step(&self.steps, record),
            SequenceType::Acquisition => {}
        }
        // The completion matchers also watch visit and sequence-type
        // transitions carried by science steps.
        self.completion.record_step(record);
    }

    pub fn record_sequence_command(&mut self, command: SequenceCommand) {
        if command == SequenceCommand::Stop {
            self.record.end_block_early();
        }
    }

    /// The remaining science sequence as of `when`.
    pub fn science_atoms(&self, when: Timestamp) -> ScienceAtoms<'_> {
        let builder =
            AtomBuilder::new(self.calc, &self.config, self.ids, SequenceType::Science);
        ScienceAtoms {
            generator: self,
            builder,
            last: Last::new(),
            indices: IndexTracker::starting_at(self.record.atom_count()),
            remaining_cycles: self.goal_cycles.saturating_sub(self.record.completed_cycles()),
            now: when,
            block_start: self.record.block().map(|i| i.start()),
            pending: self.record.pending(),
            stopped: self.record.stopped(),
            first_block: true,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// The remaining acquisition sequence: three initial alignment atoms,
    /// then slit checks forever. The caller takes as many as it needs.
    pub fn acquisition_atoms(&self) -> AcquisitionAtoms<'_> {
        let base = self.completion.acq_id_base();
        let builder = AtomBuilder::new(
            self.calc,
            &self.config,
            self.ids.acquisition_ids(base),
            SequenceType::Acquisition,
        );
        AcquisitionAtoms {
            builder,
            last: Last::new(),
            completed: self.completion.acquisition_completed(),
            initial: self.acquisition_initial(),
            repeat: self.acquisition_slit(),
            position: 0,
        }
    }

    // Acquisition images through the filter without the disperser; the
    // first exposure also pulls the slit out of the beam.
    fn acquisition_dynamic(&self, exposure: TimeSpan, slit_in: bool) -> Flamingos2Dynamic {
        let mut d = self.config.science_dynamic(exposure);
        d.disperser = None;
        if !slit_in {
            d.fpu = None;
            d.decker = Flamingos2Decker::Imaging;
        }
        d
    }

    fn acquisition_initial(&self) -> Vec<ProtoAtom<ProtoStep<Flamingos2Dynamic>>> {
        let t = self.acq_exposure;
        let image = ProtoStep::new(
            self.acquisition_dynamic(t, false),
            StepConfig::Science,
            TelescopeConfig::guided(Offset::ZERO),
            ObserveClass::Acquisition,
        );
        let slit_image = ProtoStep::new(
            self.acquisition_dynamic(t, true),
            StepConfig::Science,
            TelescopeConfig::guided(Offset::ZERO),
            ObserveClass::Acquisition,
        );
        let slit = ProtoStep::new(
            self.acquisition_dynamic(t * 2, true),
            StepConfig::Science,
            TelescopeConfig::guided(Offset::ZERO),
            ObserveClass::Acquisition,
        );
        [image, slit_image, slit]
            .into_iter()
            .map(|s| ProtoAtom::one(Some("Acquisition - Initial".into()), s))
            .collect()
    }

    fn acquisition_slit(&self) -> ProtoAtom<ProtoStep<Flamingos2Dynamic>> {
        let slit = ProtoStep::new(
            self.acquisition_dynamic(self.acq_exposure * 2, true),
            StepConfig::Science,
            TelescopeConfig::guided(Offset::ZERO),
            ObserveClass::Acquisition,
        );
        ProtoAtom::one(Some("Acquisition - Slit".into()), slit)
    }
}

/// Lazily emits the remaining F2 science atoms, one block at a time.
pub struct ScienceAtoms<'a> {
    generator: &'a Flamingos2Generator<'a>,
    builder: AtomBuilder<'a, Flamingos2Config, Flamingos2Dynamic>,
    last: Last<Flamingos2Dynamic>,
    indices: IndexTracker,
    remaining_cycles: u32,
    now: Timestamp,
    block_start: Option<Timestamp>,
    pending: Option<TimestampInterval>,
    stopped: bool,
    first_block: bool,
    buffer: VecDeque<ProtoAtom<ProtoStep<Flamingos2Dynamic>>>,
    done: bool,
}

impl Iterator for ScienceAtoms<'_> {
    type Item = Atom<Flamingos2Dynamic>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(proto) = self.buffer.pop_front() {
                let index = self.indices.claim();
                let atom = self.builder.build(&mut self.last, index, 0, &proto);
                self.now = self.now + atom.total_estimate();
                return Some(atom);
            }
            if self.done {
                return None;
            }
            if self.stopped {
                // The stop command closed the current block: drop its state
                // and continue in a fresh block after the break.
                self.stopped = false;
                self.block_start = None;
                self.pending = None;
                self.first_block = false;
                continue;
            }
            if self.remaining_cycles == 0 && self.pending.is_none() {
                self.done = true;
                continue;
            }
            let (atoms, cycles) = remaining_atoms_in_block(
                &self.generator.steps,
                self.now,
                if self.first_block { self.block_start } else { None },
                if self.first_block { self.pending } else { None },
                self.generator.cycle_estimate,
                self.remaining_cycles,
            );
            self.first_block = false;
            self.remaining_cycles -= cycles;
            self.block_start = None;
            self.pending = None;
            if atoms.is_empty() {
                // The recorded block has no room left; the next iteration
                // starts a fresh block.
                if self.remaining_cycles == 0 {
                    self.done = true;
                }
                continue;
            }
            self.buffer = atoms.into();
        }
    }
}

/// Lazily emits the remaining acquisition atoms; infinite past the initial
/// alignment, since slit checks repeat for as long as the observer asks.
pub struct AcquisitionAtoms<'a> {
    builder: AtomBuilder<'a, Flamingos2Config, Flamingos2Dynamic>,
    last: Last<Flamingos2Dynamic>,
    completed: AtomMap<Flamingos2Dynamic>,
    initial: Vec<ProtoAtom<ProtoStep<Flamingos2Dynamic>>>,
    repeat: ProtoAtom<ProtoStep<Flamingos2Dynamic>>,
    position: u32,
}

impl Iterator for AcquisitionAtoms<'_> {
    type Item = Atom<Flamingos2Dynamic>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let proto = self
                .initial
                .get(self.position as usize)
                .cloned()
                .unwrap_or_else(|| self.repeat.clone());
            let position = self.position;
            self.position += 1;
            // Atoms already executed this visit keep their index slot but
            // are not re-emitted.
            if self.completed.match_atom(&AtomMatch::of_proto(&proto)) {
                continue;
            }
            return Some(self.builder.build(&mut self.last, position, 0, &proto));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
