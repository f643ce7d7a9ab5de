//! GMOS long-slit sequence generation
//!
//! Science rotates through **wavelength blocks**: the cycle of `(Δλ, q)`
//! adjustments crossed from the configured dithers and spatial offsets.
//! Each block takes its science exposures bracketed by flats that stay
//! valid for [`CAL_VALIDITY_PERIOD`]; within that window a calibration is
//! not retaken. Arcs ride along separately: every science atom is zipped
//! with a matching arc atom, at most once per distinct instrument
//! configuration per visit, counting arcs already observed.
//!
//! The per-adjustment exposure goals split the requested exposure count so
//! that no block nominally exceeds [`SCIENCE_PERIOD`]; see [`goals_for`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

use crate::builder::{Atom, AtomBuilder, IndexTracker};
use crate::completion::{AtomMap, AtomMatch, State as CompletionState};
use crate::config::{
    GmosBinning, GmosCcdMode, GmosDynamic, GmosFilter, GmosFpu, GmosGrating,
    GmosLongSlitConfig, GmosNorthFilter, GmosNorthFpu, GmosNorthGrating, GmosRoi,
    GmosSouthFilter, GmosSouthFpu, GmosSouthGrating, IntegrationTime,
    STANDIN_ACQUISITION_TIME,
};
use crate::estimate::{Last, TimeEstimateCalculator};
use crate::gcal::{SmartGcalError, SmartGcalExpander, SmartGcalInstrument, SmartGcalType};
use crate::ids::{SequenceIds, SequenceType, VisitId};
use crate::proto::{ObserveClass, ProtoAtom, ProtoStep, StepConfig, TelescopeConfig};
use crate::records::{AtomRecord, SequenceCommand, StepRecord, VisitRecord};
use crate::units::{Adjustment, Offset, OffsetP, TimeSpan, Timestamp, Wavelength};

/// How long a calibration remains valid for the science around it.
pub const CAL_VALIDITY_PERIOD: TimeSpan = TimeSpan::from_minutes(90);

/// Nominal science time per wavelength block.
pub const SCIENCE_PERIOD: TimeSpan = TimeSpan::from_hours(1);

const ARC_ATOM: &str = "Arc";

/// GMOS long-slit validation failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GmosError {
    #[error("GMOS Long Slit requires a positive exposure time.")]
    NonPositiveExposure,
    #[error("Wavelength dither {0} underflows the central wavelength.")]
    WavelengthUnderflow(crate::units::WavelengthDither),
}

// ============================================================================
// Goals
// ============================================================================

/// Exposure goal for one adjustment: how many exposures each of its blocks
/// takes, and how many it owes over the whole observation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Goal {
    pub per_block: u32,
    pub total: u32,
}

/// Split `exposure_count` exposures over `size` adjustments.
///
/// When everything fits in one block per adjustment the count spreads
/// evenly, earlier adjustments taking the remainder. Otherwise blocks fill
/// to the per-block maximum and the final partial block lands on the
/// adjustment after the last full one.
pub fn goals_for(size: usize, exposure_time: TimeSpan, exposure_count: u32) -> Vec<Goal> {
    let size32 = size as u32;
    let max_per_block = (SCIENCE_PERIOD.div_by(exposure_time) as u32).max(1);
    if exposure_count <= size32 * max_per_block {
        let per = exposure_count / size32;
        let extra = exposure_count % size32;
        (0..size32)
            .map(|i| {
                let total = per + u32::from(i < extra);
                Goal { per_block: total, total }
            })
            .collect()
    } else {
        let full_blocks = exposure_count / max_per_block;
        let base = full_blocks / size32 * max_per_block;
        let pivot = full_blocks % size32;
        (0..size32)
            .map(|i| {
                let extra = match i.cmp(&pivot) {
                    std::cmp::Ordering::Less => max_per_block,
                    std::cmp::Ordering::Equal => exposure_count % max_per_block,
                    std::cmp::Ordering::Greater => 0,
                };
                Goal { per_block: max_per_block, total: base + extra }
            })
            .collect()
    }
}

// ============================================================================
// Wavelength blocks
// ============================================================================

/// One wavelength block's expected steps and recorded activity.
#[derive(Clone, Debug)]
pub struct WavelengthBlock<D: Eq + Hash> {
    adjustment: Adjustment,
    science: ProtoStep<D>,
    flats: Vec<ProtoStep<D>>,
    goal: Goal,
    science_times: Vec<Timestamp>,
    cal_times: HashMap<usize, Vec<Timestamp>>,
    completed: u32,
}

impl<D: Eq + Hash + Clone + PartialEq> WavelengthBlock<D> {
    pub fn new(
        adjustment: Adjustment,
        science: ProtoStep<D>,
        flats: Vec<ProtoStep<D>>,
        goal: Goal,
    ) -> Self {
        WavelengthBlock {
            adjustment,
            science,
            flats,
            goal,
            science_times: Vec::new(),
            cal_times: HashMap::new(),
            completed: 0,
        }
    }

    pub fn adjustment(&self) -> Adjustment {
        self.adjustment
    }

    pub fn science_step(&self) -> &ProtoStep<D> {
        &self.science
    }

    /// Earliest recorded calibration plus the validity period; `None` when
    /// the block has no calibrations yet.
    pub fn calibration_expiration(&self) -> Option<Timestamp> {
        self.cal_times
            .values()
            .flatten()
            .min()
            .copied()
            .map(|t| t + CAL_VALIDITY_PERIOD)
    }

    fn cal_valid_at(taken: Timestamp, at: Timestamp) -> bool {
        at < taken + CAL_VALIDITY_PERIOD && taken <= at + CAL_VALIDITY_PERIOD
    }

    /// Expected calibrations with no still-valid instance at `at`.
    pub fn missing_cals_at(&self, at: Timestamp) -> Vec<ProtoStep<D>> {
        self.flats
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                !self
                    .cal_times
                    .get(i)
                    .is_some_and(|ts| ts.iter().any(|t| Self::cal_valid_at(*t, at)))
            })
            .map(|(_, s)| s.clone())
            .collect()
    }

    pub fn has_valid_calibrations_at(&self, at: Timestamp) -> bool {
        self.missing_cals_at(at).is_empty()
    }

    /// Science exposures whose calibrations were valid when they were taken.
    pub fn science_count(&self) -> u32 {
        self.science_times
            .iter()
            .filter(|t| self.has_valid_calibrations_at(**t))
            .count() as u32
    }

    /// Exposures still owed by this adjustment, over all of its blocks.
    pub fn remaining_total(&self) -> u32 {
        self.goal.total.saturating_sub(self.completed + self.science_count())
    }

    /// How many science exposures the block can still take at `at`:
    /// bounded by the per-block goal, the observation total, and the time
    /// left before the recorded calibrations expire.
    pub fn remaining_science_at(&self, at: Timestamp, exposure: TimeSpan) -> u32 {
        let sc = self.science_count();
        let mut n = self
            .goal
            .per_block
            .saturating_sub(sc)
            .min(self.goal.total.saturating_sub(self.completed + sc));
        if let Some(expiry) = self.calibration_expiration() {
            n = n.min(TimeSpan::between(at, expiry).div_by(exposure) as u32);
        }
        n
    }

    /// Close the block: calibrated science becomes permanent, everything
    /// else is forgotten.
    pub fn settle(&mut self) {
        self.completed += self.science_count();
        self.science_times.clear();
        self.cal_times.clear();
    }

    /// `true` when the record belongs to this block's configuration.
    pub fn matches(&self, record: &StepRecord<D>) -> bool {
        self.science.matches(record) || self.flats.iter().any(|f| f.matches(record))
    }

    /// Fold one successful recorded step into the block.
    pub fn record(&mut self, record: &StepRecord<D>) {
        let when = record.interval_or_instant().start();
        if self.science.matches(record) {
            self.science_times.push(when);
        } else if let Some(i) = self.flats.iter().position(|f| f.matches(record)) {
            self.cal_times.entry(i).or_default().push(when);
        }
    }

    /// The atom that advances this block at `at`: missing calibrations plus
    /// as many science exposures as fit. A fresh block leads with its
    /// calibrations; an in-progress block finishes science first and closes
    /// with the calibrations it is missing. Settles the block afterwards.
    pub fn remainder_at(
        &mut self,
        at: Timestamp,
        exposure: TimeSpan,
    ) -> Option<ProtoAtom<ProtoStep<D>>> {
        let missing = self.missing_cals_at(at);
        let n = self.remaining_science_at(at, exposure);
        if missing.is_empty() && n == 0 {
            self.settle();
            return None;
        }
        let science = std::iter::repeat_with(|| self.science.clone()).take(n as usize);
        let steps: Vec<_> = if self.science_times.is_empty() {
            missing.into_iter().chain(science).collect()
        } else {
            science.chain(missing).collect()
        };
        self.completed += n;
        self.settle();
        ProtoAtom::new(Some(self.adjustment.to_string()), steps)
    }
}

// ============================================================================
// Generator
// ============================================================================

/// Per-adjustment expansion result, fixed at construction. An adjustment
/// whose smart-gcal lookup failed still occupies its slot so the failure
/// surfaces in the stream without aborting the others.
#[derive(Clone, Debug)]
struct BlockPrep<D: Eq + Hash> {
    block: WavelengthBlock<D>,
    arc_steps: Vec<ProtoStep<D>>,
}

type ArcKey<D> = (<D as SmartGcalInstrument>::Key, Option<Wavelength>);

fn arc_key<D: SmartGcalInstrument>(d: &D) -> ArcKey<D> {
    (d.gcal_key(SmartGcalType::Arc), d.gcal_wavelength())
}

/// GMOS long-slit sequence generator for one observation, shared by both
/// sites through the grating/filter/FPU type parameters.
pub struct GmosGenerator<'a, G, F, U>
where
    G: GmosGrating,
    F: GmosFilter,
    U: GmosFpu,
{
    config: GmosLongSlitConfig<G, F, U>,
    itc: IntegrationTime,
    acq_exposure: TimeSpan,
    calc: &'a dyn TimeEstimateCalculator<GmosLongSlitConfig<G, F, U>, GmosDynamic<G, F, U>>,
    ids: SequenceIds,
    prepared: Vec<Result<BlockPrep<GmosDynamic<G, F, U>>, SmartGcalError>>,
    current_block: Option<usize>,
    arcs_by_visit: HashMap<VisitId, HashSet<ArcKey<GmosDynamic<G, F, U>>>>,
    completion: CompletionState<GmosDynamic<G, F, U>>,
    visit: Option<VisitId>,
}

impl<'a, G, F, U> std::fmt::Debug for GmosGenerator<'a, G, F, U>
where
    G: GmosGrating + std::fmt::Debug,
    F: GmosFilter + std::fmt::Debug,
    U: GmosFpu + std::fmt::Debug,
    GmosDynamic<G, F, U>: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmosGenerator")
            .field("config", &self.config)
            .field("itc", &self.itc)
            .field("acq_exposure", &self.acq_exposure)
            .field("ids", &self.ids)
            .field("prepared", &self.prepared)
            .field("current_block", &self.current_block)
            .field("arcs_by_visit", &self.arcs_by_visit)
            .field("completion", &self.completion)
            .field("visit", &self.visit)
            .finish()
    }
}

impl<'a, G, F, U> GmosGenerator<'a, G, F, U>
where
    G: GmosGrating,
    F: GmosFilter,
    U: GmosFpu,
{
    pub fn new(
        config: GmosLongSlitConfig<G, F, U>,
        itc: IntegrationTime,
        acquisition_itc: Option<IntegrationTime>,
        calc: &'a dyn TimeEstimateCalculator<
            GmosLongSlitConfig<G, F, U>,
            GmosDynamic<G, F, U>,
        >,
        expander: &mut dyn SmartGcalExpander<GmosDynamic<G, F, U>>,
        ids: SequenceIds,
    ) -> Result<Self, GmosError> {
        if itc.exposure_time.is_zero() {
            return Err(GmosError::NonPositiveExposure);
        }

        let adjustments = config.adjustments();
        let goals = goals_for(adjustments.len(), itc.exposure_time, itc.exposure_count);

        let mut prepared = Vec::with_capacity(adjustments.len());
        for (adjustment, goal) in adjustments.iter().zip(goals) {
            let dynamic = config
                .science_dynamic(itc.exposure_time, adjustment.dither)
                .ok_or(GmosError::WavelengthUnderflow(adjustment.dither))?;
            let telescope = TelescopeConfig::guided(Offset::in_q(adjustment.offset));
            let science = ProtoStep::new(
                dynamic.clone(),
                StepConfig::Science,
                telescope.clone(),
                ObserveClass::Science,
            );
            let placeholder = |kind| {
                ProtoStep::new(
                    dynamic.clone(),
                    StepConfig::SmartGcal(kind),
                    telescope.clone(),
                    ObserveClass::NightCal,
                )
            };
            let prep = expander
                .expand_step(&placeholder(SmartGcalType::Flat))
                .and_then(|flats| {
                    let arc_steps = expander.expand_step(&placeholder(SmartGcalType::Arc))?;
                    Ok(BlockPrep {
                        block: WavelengthBlock::new(*adjustment, science, flats, goal),
                        arc_steps,
                    })
                });
            prepared.push(prep);
        }

        Ok(GmosGenerator {
            config,
            itc,
            acq_exposure: acquisition_itc
                .map_or(STANDIN_ACQUISITION_TIME, |t| t.exposure_time),
            calc,
            ids,
            prepared,
            current_block: None,
            arcs_by_visit: HashMap::new(),
            completion: CompletionState::new(),
            visit: None,
        })
    }

    pub fn config(&self) -> &GmosLongSlitConfig<G, F, U> {
        &self.config
    }

    pub fn record_visit(&mut self, visit: &VisitRecord) {
        self.settle_current();
        self.visit = Some(visit.visit_id);
    }

    pub fn record_atom(&mut self, record: &AtomRecord) {
        self.completion.record_atom(record);
    }

    pub fn record_sequence_command(&mut self, _command: SequenceCommand) {}

    pub fn record_step(&mut self, record: &StepRecord<GmosDynamic<G, F, U>>) {
        self.completion.record_step(record);
        if record.sequence_type != SequenceType::Science {
            return;
        }
        if self.visit != Some(record.visit_id) {
            self.settle_current();
            self.visit = Some(record.visit_id);
        }
        if !record.successfully_completed() {
            return;
        }

        if record.step_config.gcal().is_some_and(|g| g.is_arc()) {
            self.arcs_by_visit
                .entry(record.visit_id)
                .or_default()
                .insert(arc_key(&record.instrument));
            return;
        }

        // Route science and flats to the block they belong to; a step that
        // leaves the current block closes it.
        let target = self
            .prepared
            .iter()
            .position(|p| p.as_ref().is_ok_and(|prep| prep.block.matches(record)));
        let Some(j) = target else { return };
        if self.current_block != Some(j) {
            self.settle_current();
            self.current_block = Some(j);
        }
        if let Ok(prep) = &mut self.prepared[j] {
            prep.block.record(record);
        }
    }

    fn settle_current(&mut self) {
        if let Some(i) = self.current_block.take() {
            if let Ok(prep) = &mut self.prepared[i] {
                prep.block.settle();
            }
        }
    }

    /// The remaining science sequence as of `when`.
    pub fn science_atoms(&self, when: Timestamp) -> ScienceAtoms<'_, G, F, U> {
        let builder =
            AtomBuilder::new(self.calc, &self.config, self.ids, SequenceType::Science);
        let visit = self.visit.or(self.completion.current_visit());
        let arcs_seen = visit
            .and_then(|v| self.arcs_by_visit.get(&v).cloned())
            .unwrap_or_default();
        ScienceAtoms {
            generator: self,
            builder,
            last: Last::new(),
            indices: IndexTracker::starting_at(self.completion.science_atom_count()),
            blocks: self
                .prepared
                .iter()
                .map(|p| p.as_ref().map(|prep| prep.block.clone()).map_err(Clone::clone))
                .collect(),
            error_emitted: vec![false; self.prepared.len()],
            cursor: 0,
            now: when,
            visit,
            arcs_emitted: arcs_seen,
            science_map: self.completion.science_completed(),
            queue: VecDeque::new(),
        }
    }

    /// The remaining acquisition sequence: CCD2 alignment, the p-offset
    /// nudge, a slit-centred exposure, then slit checks forever.
    pub fn acquisition_atoms(&self) -> AcquisitionAtoms<'_, G, F, U> {
        let builder = AtomBuilder::new(
            self.calc,
            &self.config,
            self.ids.acquisition_ids(self.completion.acq_id_base()),
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

    fn acquisition_dynamic(
        &self,
        exposure: TimeSpan,
        slit_in: bool,
        roi: GmosRoi,
        bin: GmosBinning,
    ) -> GmosDynamic<G, F, U> {
        GmosDynamic {
            exposure,
            readout: GmosCcdMode {
                x_bin: bin,
                y_bin: bin,
                amp_read_mode: self.config.amp_read_mode,
                amp_gain: self.config.amp_gain,
            },
            roi,
            grating: None,
            filter: self.config.filter,
            fpu: slit_in.then_some(self.config.fpu),
        }
    }

    fn acquisition_initial(&self) -> Vec<ProtoAtom<ProtoStep<GmosDynamic<G, F, U>>>> {
        let t = self.acq_exposure;
        let ccd2 = ProtoStep::new(
            self.acquisition_dynamic(t, false, GmosRoi::Ccd2, GmosBinning::Two),
            StepConfig::Science,
            TelescopeConfig::guided(Offset::ZERO),
            ObserveClass::Acquisition,
        );
        let p10 = ProtoStep::new(
            self.acquisition_dynamic(t, true, GmosRoi::CentralStamp, GmosBinning::One),
            StepConfig::Science,
            TelescopeConfig::guided(Offset::new(
                OffsetP::from_arcsec(10),
                crate::units::OffsetQ::ZERO,
            )),
            ObserveClass::Acquisition,
        );
        let slit = ProtoStep::new(
            self.acquisition_dynamic(t * 4, true, GmosRoi::CentralStamp, GmosBinning::One),
            StepConfig::Science,
            TelescopeConfig::guided(Offset::ZERO),
            ObserveClass::Acquisition,
        );
        [ccd2, p10, slit]
            .into_iter()
            .map(|s| ProtoAtom::one(Some("Acquisition - Initial".into()), s))
            .collect()
    }

    fn acquisition_slit(&self) -> ProtoAtom<ProtoStep<GmosDynamic<G, F, U>>> {
        let slit = ProtoStep::new(
            self.acquisition_dynamic(
                self.acq_exposure * 4,
                true,
                GmosRoi::CentralStamp,
                GmosBinning::One,
            ),
            StepConfig::Science,
            TelescopeConfig::guided(Offset::ZERO),
            ObserveClass::Acquisition,
        );
        ProtoAtom::one(Some("Acquisition - Slit".into()), slit)
    }
}

// ============================================================================
// Science stream
// ============================================================================

/// Lazily emits the remaining GMOS science atoms, rotating through the
/// wavelength blocks and zipping arcs alongside the science.
pub struct ScienceAtoms<'a, G, F, U>
where
    G: GmosGrating,
    F: GmosFilter,
    U: GmosFpu,
{
    generator: &'a GmosGenerator<'a, G, F, U>,
    builder: AtomBuilder<'a, GmosLongSlitConfig<G, F, U>, GmosDynamic<G, F, U>>,
    last: Last<GmosDynamic<G, F, U>>,
    indices: IndexTracker,
    blocks: Vec<Result<WavelengthBlock<GmosDynamic<G, F, U>>, SmartGcalError>>,
    error_emitted: Vec<bool>,
    cursor: usize,
    now: Timestamp,
    visit: Option<VisitId>,
    arcs_emitted: HashSet<ArcKey<GmosDynamic<G, F, U>>>,
    science_map: AtomMap<GmosDynamic<G, F, U>>,
    queue: VecDeque<ProtoAtom<ProtoStep<GmosDynamic<G, F, U>>>>,
}

impl<G, F, U> ScienceAtoms<'_, G, F, U>
where
    G: GmosGrating,
    F: GmosFilter,
    U: GmosFpu,
{
    fn arc_atom(
        &self,
        j: usize,
    ) -> Option<ProtoAtom<ProtoStep<GmosDynamic<G, F, U>>>> {
        let prep = self.generator.prepared[j].as_ref().ok()?;
        ProtoAtom::new(Some(ARC_ATOM.into()), prep.arc_steps.clone())
    }

    /// Zip the science atom with its arc if the configuration has not been
    /// arc'd this visit. The arc goes after the atom when the atom leads
    /// with science, before it otherwise.
    fn enqueue_science(
        &mut self,
        j: usize,
        proto: ProtoAtom<ProtoStep<GmosDynamic<G, F, U>>>,
    ) {
        let science_index =
            proto.steps().iter().position(|s| s.step_config.is_science());
        let key = self.blocks[j]
            .as_ref()
            .ok()
            .map(|b| arc_key(&b.science_step().instrument));
        let arc = match (science_index, key) {
            (Some(_), Some(k)) if !self.arcs_emitted.contains(&k) => {
                self.arcs_emitted.insert(k);
                self.arc_atom(j)
            }
            _ => None,
        };
        match (arc, science_index) {
            (Some(arc), Some(0)) => {
                self.queue.push_back(proto);
                self.queue.push_back(arc);
            }
            (Some(arc), Some(_)) => {
                self.queue.push_back(arc);
                self.queue.push_back(proto);
            }
            _ => self.queue.push_back(proto),
        }
    }
}

impl<G, F, U> Iterator for ScienceAtoms<'_, G, F, U>
where
    G: GmosGrating,
    F: GmosFilter,
    U: GmosFpu,
{
    type Item = Result<Atom<GmosDynamic<G, F, U>>, SmartGcalError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(proto) = self.queue.pop_front() {
                let index = self.indices.claim();
                let atom = self.builder.build(&mut self.last, index, 0, &proto);
                self.now = self.now + atom.total_estimate();
                return Some(Ok(atom));
            }

            // Next adjustment with work left, in rotation order.
            let size = self.blocks.len();
            let mut picked = None;
            for step in 0..size {
                let j = (self.cursor + step) % size;
                match &self.blocks[j] {
                    Ok(block) if block.remaining_total() > 0 => {
                        picked = Some(j);
                        break;
                    }
                    Err(_) if !self.error_emitted[j] => {
                        picked = Some(j);
                        break;
                    }
                    _ => {}
                }
            }
            let j = picked?;
            self.cursor = (j + 1) % size;

            let block = match &mut self.blocks[j] {
                Ok(block) => block,
                Err(e) => {
                    self.error_emitted[j] = true;
                    return Some(Err(e.clone()));
                }
            };
            let Some(proto) = block.remainder_at(self.now, self.generator.itc.exposure_time)
            else {
                continue;
            };

            // Consume the atom from recorded completions before emitting.
            let key = AtomMatch::of_proto(&proto);
            let visit = self.visit.unwrap_or(VisitId(0));
            if let Some(past) = self.science_map.match_past(&key, visit) {
                let arc_seen = self
                    .blocks[j]
                    .as_ref()
                    .ok()
                    .map(|b| arc_key(&b.science_step().instrument))
                    .is_some_and(|k| {
                        self.generator
                            .arcs_by_visit
                            .get(&past)
                            .is_some_and(|arcs| arcs.contains(&k))
                    });
                if arc_seen {
                    // Science and arc both observed in that visit: the pair
                    // is suppressed entirely.
                    continue;
                }
                // The science was observed but never arc'd; only the arc
                // remains to be taken.
                if let Some(k) =
                    self.blocks[j].as_ref().ok().map(|b| arc_key(&b.science_step().instrument))
                {
                    if !self.arcs_emitted.contains(&k) {
                        self.arcs_emitted.insert(k);
                        if let Some(arc) = self.arc_atom(j) {
                            self.queue.push_back(arc);
                        }
                    }
                }
                continue;
            }
            if self.science_map.match_current(&key, visit) {
                continue;
            }
            self.enqueue_science(j, proto);
        }
    }
}

// ============================================================================
// Acquisition stream
// ============================================================================

/// Lazily emits the remaining acquisition atoms; infinite past the initial
/// alignment.
pub struct AcquisitionAtoms<'a, G, F, U>
where
    G: GmosGrating,
    F: GmosFilter,
    U: GmosFpu,
{
    builder: AtomBuilder<'a, GmosLongSlitConfig<G, F, U>, GmosDynamic<G, F, U>>,
    last: Last<GmosDynamic<G, F, U>>,
    completed: AtomMap<GmosDynamic<G, F, U>>,
    initial: Vec<ProtoAtom<ProtoStep<GmosDynamic<G, F, U>>>>,
    repeat: ProtoAtom<ProtoStep<GmosDynamic<G, F, U>>>,
    position: u32,
}

impl<G, F, U> Iterator for AcquisitionAtoms<'_, G, F, U>
where
    G: GmosGrating,
    F: GmosFilter,
    U: GmosFpu,
{
    type Item = Atom<GmosDynamic<G, F, U>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let proto = self
                .initial
                .get(self.position as usize)
                .cloned()
                .unwrap_or_else(|| self.repeat.clone());
            let position = self.position;
            self.position += 1;
            if self.completed.match_atom(&AtomMatch::of_proto(&proto)) {
                continue;
            }
            return Some(self.builder.build(&mut self.last, position, 0, &proto));
        }
    }
}

/// GMOS North generator.
pub type GmosNorthGenerator<'a> =
    GmosGenerator<'a, GmosNorthGrating, GmosNorthFilter, GmosNorthFpu>;

/// GMOS South generator.
pub type GmosSouthGenerator<'a> =
    GmosGenerator<'a, GmosSouthGrating, GmosSouthFilter, GmosSouthFpu>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GmosAmpGain, GmosAmpReadMode, GmosNorthConfig};
    use crate::estimate::GmosEstimator;
    use crate::gcal::{
        GcalArc, GcalConfig, GcalContinuum, GcalDiffuser, GcalEntry, GcalFilter, GcalLamp,
        GcalRow, GcalShutter, SmartGcalInstrument, TableExpander,
    };
    use crate::hashing::fingerprint;
    use crate::ids::{AtomId, CommitHash, ObservationId, StepId};
    use crate::records::{ExecutionState, QaState};
    use crate::units::{OffsetQ, WavelengthDither};
    use chrono::TimeZone;
    use uuid::Uuid;

    type Dyn = crate::config::GmosNorthDynamic;

    fn at(s: i64) -> Timestamp {
        chrono::Utc.timestamp_opt(s, 0).unwrap()
    }

    fn seconds(s: u64) -> TimeSpan {
        TimeSpan::from_seconds(s)
    }

    #[test]
    fn goals_spread_evenly_when_everything_fits() {
        // 3 adjustments, 10 exposures per block, 7 requested.
        let goals = goals_for(3, TimeSpan::from_minutes(6), 7);
        let totals: Vec<_> = goals.iter().map(|g| g.total).collect();
        assert_eq!(totals, vec![3, 2, 2]);
        assert!(goals.iter().all(|g| g.per_block == g.total));
    }

    #[test]
    fn goals_fill_blocks_when_the_count_overflows() {
        // 3 adjustments, 10 per block, 25 requested: two full blocks then
        // the 5-exposure remainder on the next adjustment.
        let goals = goals_for(3, TimeSpan::from_minutes(6), 25);
        let totals: Vec<_> = goals.iter().map(|g| g.total).collect();
        assert_eq!(totals, vec![10, 10, 5]);
        assert!(goals.iter().all(|g| g.per_block == 10));
    }

    #[test]
    fn goals_conserve_the_exposure_count() {
        for count in [1u32, 3, 7, 10, 25, 61] {
            let goals = goals_for(3, TimeSpan::from_minutes(6), count);
            assert_eq!(goals.iter().map(|g| g.total).sum::<u32>(), count, "count={count}");
        }
    }

    fn config(dithers: Vec<WavelengthDither>, offsets: Vec<OffsetQ>) -> GmosNorthConfig {
        GmosNorthConfig {
            grating: GmosNorthGrating::R831G5302,
            filter: None,
            fpu: GmosNorthFpu::LongSlit050,
            central_wavelength: Wavelength::from_nm(750).unwrap(),
            explicit_x_bin: None,
            explicit_y_bin: None,
            amp_read_mode: GmosAmpReadMode::Slow,
            amp_gain: GmosAmpGain::Low,
            roi: GmosRoi::FullFrame,
            wavelength_dithers: dithers,
            spatial_offsets: offsets,
        }
    }

    fn expander(config: &GmosNorthConfig) -> TableExpander<Dyn> {
        let mut x = TableExpander::new();
        for dither in
            config.wavelength_dithers.iter().copied().chain([WavelengthDither::ZERO])
        {
            let Some(dynamic) = config.science_dynamic(seconds(1), dither) else { continue };
            x.insert(
                dynamic.gcal_key(SmartGcalType::Flat),
                GcalRow {
                    coverage: None,
                    entries: vec![GcalEntry {
                        gcal: GcalConfig {
                            lamp: GcalLamp::Continuum(GcalContinuum::QuartzHalogen100W),
                            filter: GcalFilter::Gmos,
                            diffuser: GcalDiffuser::Visible,
                            shutter: GcalShutter::Open,
                        },
                        exposure: seconds(2),
                    }],
                },
            );
            x.insert(
                dynamic.gcal_key(SmartGcalType::Arc),
                GcalRow {
                    coverage: None,
                    entries: vec![GcalEntry {
                        gcal: GcalConfig {
                            lamp: GcalLamp::one_arc(GcalArc::CuArArc),
                            filter: GcalFilter::Gmos,
                            diffuser: GcalDiffuser::Visible,
                            shutter: GcalShutter::Closed,
                        },
                        exposure: seconds(20),
                    }],
                },
            );
        }
        x
    }

    fn generator<'a>(
        config: &GmosNorthConfig,
        exposure_s: u64,
        count: u32,
        calc: &'a GmosEstimator,
    ) -> GmosNorthGenerator<'a> {
        let mut x = expander(config);
        let ids = SequenceIds::new(
            &CommitHash::from_bytes([5; 20]),
            ObservationId(33),
            &fingerprint(&count),
        );
        GmosGenerator::new(
            config.clone(),
            IntegrationTime { exposure_time: seconds(exposure_s), exposure_count: count },
            None,
            calc,
            &mut x,
            ids,
        )
        .unwrap()
    }

    fn dithers_and_offsets() -> (Vec<WavelengthDither>, Vec<OffsetQ>) {
        (
            vec![WavelengthDither::ZERO, WavelengthDither::from_nm(5)],
            vec![OffsetQ::from_arcsec(0), OffsetQ::from_arcsec(15)],
        )
    }

    #[test]
    fn science_atoms_rotate_through_adjustments_with_arcs() {
        let calc = GmosEstimator;
        let (d, q) = dithers_and_offsets();
        let config = config(d, q);
        let generator = generator(&config, 600, 4, &calc);

        let atoms: Vec<_> =
            generator.science_atoms(at(0)).collect::<Result<_, _>>().unwrap();
        // Two adjustments (lcm = 2), each: flat+science block atom plus one
        // arc atom.
        assert_eq!(atoms.len(), 4);
        let descriptions: Vec<_> =
            atoms.iter().map(|a| a.description.clone().unwrap_or_default()).collect();
        assert_eq!(descriptions.iter().filter(|d| d.as_str() == ARC_ATOM).count(), 2);

        // A fresh block leads with its flat, so its science step sits past
        // index 0 and the arc lands *before* the block atom.
        assert_eq!(descriptions[0], ARC_ATOM);
        assert!(descriptions[1].starts_with("Δλ"));

        let block_atom = &atoms[1];
        assert!(block_atom.steps[0].step_config.gcal().unwrap().is_flat());
        assert!(block_atom.steps[1].step_config.is_science());
    }

    #[test]
    fn at_most_one_arc_per_configuration_per_visit() {
        let calc = GmosEstimator;
        let (d, q) = dithers_and_offsets();
        let config = config(d, q);
        // Enough exposures that each adjustment fills several blocks.
        let generator = generator(&config, 1200, 12, &calc);

        let atoms: Vec<_> =
            generator.science_atoms(at(0)).collect::<Result<_, _>>().unwrap();
        let arcs = atoms
            .iter()
            .filter(|a| a.description.as_deref() == Some(ARC_ATOM))
            .count();
        // Two distinct configurations (one per adjustment): two arcs, no
        // matter how many blocks each configuration runs.
        assert_eq!(arcs, 2);
    }

    #[test]
    fn emitted_exposures_meet_the_goals() {
        let calc = GmosEstimator;
        let (d, q) = dithers_and_offsets();
        let config = config(d, q);
        let count = 7;
        let generator = generator(&config, 600, count, &calc);

        let atoms: Vec<_> =
            generator.science_atoms(at(0)).collect::<Result<_, _>>().unwrap();
        let science_steps: u32 = atoms
            .iter()
            .flat_map(|a| &a.steps)
            .filter(|s| s.step_config.is_science())
            .count() as u32;
        assert_eq!(science_steps, count);
    }

    fn record_step(
        step: &ProtoStep<Dyn>,
        atom: u128,
        visit: u64,
        index: u16,
        at_s: i64,
    ) -> StepRecord<Dyn> {
        StepRecord {
            step_id: StepId(Uuid::from_u128((atom << 16) | index as u128)),
            atom_id: AtomId(Uuid::from_u128(atom)),
            visit_id: VisitId(visit),
            index,
            instrument: step.instrument.clone(),
            step_config: step.step_config.clone(),
            telescope: step.telescope.clone(),
            observe_class: step.observe_class,
            created: at(at_s),
            interval: None,
            sequence_type: SequenceType::Science,
            execution: ExecutionState::Completed,
            qa: Some(QaState::Pass),
        }
    }

    #[test]
    fn wavelength_block_calibration_window() {
        let calc = GmosEstimator;
        let config = config(vec![], vec![]);
        let generator = generator(&config, 600, 4, &calc);
        let prep = generator.prepared[0].as_ref().unwrap();
        let mut block = prep.block.clone();

        // Flat at t=0: valid until 90 minutes.
        let flat = prep.block.flats[0].clone();
        block.record(&record_step(&flat, 1, 1, 0, 0));
        assert_eq!(
            block.calibration_expiration(),
            Some(at(0) + CAL_VALIDITY_PERIOD),
        );
        assert!(block.has_valid_calibrations_at(at(60 * 60)));
        assert!(!block.has_valid_calibrations_at(at(2 * 60 * 60)));

        // Science inside the window counts; outside it does not.
        let science = prep.block.science.clone();
        block.record(&record_step(&science, 1, 1, 1, 30 * 60));
        block.record(&record_step(&science, 1, 1, 2, 2 * 60 * 60));
        assert_eq!(block.science_count(), 1);
    }

    #[test]
    fn remaining_science_is_bounded_by_calibration_expiry() {
        let calc = GmosEstimator;
        let config = config(vec![], vec![]);
        let generator = generator(&config, 600, 4, &calc);
        let prep = generator.prepared[0].as_ref().unwrap();
        let mut block = prep.block.clone();

        let flat = prep.block.flats[0].clone();
        block.record(&record_step(&flat, 1, 1, 0, 0));
        // 80 minutes into the 90-minute window, 600-second exposures: one
        // more fits.
        assert_eq!(block.remaining_science_at(at(80 * 60), seconds(600)), 1);
        // Past expiry nothing fits.
        assert_eq!(block.remaining_science_at(at(95 * 60), seconds(600)), 0);
    }

    #[test]
    fn recorded_science_reduces_the_remaining_sequence() {
        let calc = GmosEstimator;
        let config = config(vec![], vec![]);
        let mut generator = generator(&config, 600, 4, &calc);

        let (flat, science) = {
            let prep = generator.prepared[0].as_ref().unwrap();
            (prep.block.flats[0].clone(), prep.block.science.clone())
        };
        generator.record_step(&record_step(&flat, 1, 1, 0, 0));
        generator.record_step(&record_step(&science, 1, 1, 1, 700));
        generator.record_step(&record_step(&science, 1, 1, 2, 1400));

        let atoms: Vec<_> = generator
            .science_atoms(at(2_100))
            .collect::<Result<_, _>>()
            .unwrap();
        let science_steps: u32 = atoms
            .iter()
            .flat_map(|a| &a.steps)
            .filter(|s| s.step_config.is_science())
            .count() as u32;
        assert_eq!(science_steps, 2);
    }

    #[test]
    fn recorded_arc_suppresses_the_arc_atom() {
        let calc = GmosEstimator;
        let config = config(vec![], vec![]);
        let mut generator = generator(&config, 600, 2, &calc);

        let arc_step = {
            let prep = generator.prepared[0].as_ref().unwrap();
            prep.arc_steps[0].clone()
        };
        generator.record_step(&record_step(&arc_step, 9, 1, 0, 0));

        let atoms: Vec<_> =
            generator.science_atoms(at(100)).collect::<Result<_, _>>().unwrap();
        assert!(atoms.iter().all(|a| a.description.as_deref() != Some(ARC_ATOM)));
    }

    #[test]
    fn missing_smart_gcal_mapping_surfaces_in_the_stream() {
        let calc = GmosEstimator;
        let config = config(vec![], vec![]);
        let mut empty: TableExpander<Dyn> = TableExpander::new();
        let ids = SequenceIds::new(
            &CommitHash::from_bytes([5; 20]),
            ObservationId(33),
            &fingerprint(&1u32),
        );
        let generator = GmosGenerator::new(
            config,
            IntegrationTime { exposure_time: seconds(600), exposure_count: 2 },
            None,
            &calc,
            &mut empty,
            ids,
        )
        .unwrap();

        let items: Vec<_> = generator.science_atoms(at(0)).collect();
        assert_eq!(items.len(), 1);
        let err = items[0].as_ref().unwrap_err();
        assert!(err.to_string().contains("missing Smart GCAL mapping"));
    }

    #[test]
    fn acquisition_shape_and_determinism() {
        let calc = GmosEstimator;
        let (d, q) = dithers_and_offsets();
        let config = config(d, q);
        let generator = generator(&config, 600, 4, &calc);

        let atoms: Vec<_> = generator.acquisition_atoms().take(5).collect();
        assert_eq!(atoms[0].steps[0].instrument.roi, GmosRoi::Ccd2);
        assert!(atoms[0].steps[0].instrument.fpu.is_none());
        assert_eq!(
            atoms[1].steps[0].telescope.offset.p,
            OffsetP::from_arcsec(10),
        );
        assert!(atoms[2].steps[0].instrument.fpu.is_some());
        assert_eq!(atoms[3].description.as_deref(), Some("Acquisition - Slit"));

        let again: Vec<_> = generator.acquisition_atoms().take(5).collect();
        assert_eq!(atoms, again);
    }

    #[test]
    fn wavelength_underflow_is_a_configuration_error() {
        let calc = GmosEstimator;
        let config = config(vec![WavelengthDither::from_nm(-800)], vec![]);
        let mut x = expander(&config);
        let ids = SequenceIds::new(
            &CommitHash::from_bytes([5; 20]),
            ObservationId(33),
            &fingerprint(&1u32),
        );
        let err = GmosGenerator::new(
            config,
            IntegrationTime { exposure_time: seconds(600), exposure_count: 2 },
            None,
            &calc,
            &mut x,
            ids,
        )
        .unwrap_err();
        assert!(matches!(err, GmosError::WavelengthUnderflow(_)));
    }
}
