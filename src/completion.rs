//! Completion tracking
//!
//! Folds recorded steps into a queryable multiset of completed atoms so a
//! generator can drop work that has already been observed. Matching is
//! structural: an executed atom matches a nominal atom iff the ordered list
//! of `(instrument config, step config)` pairs of its steps is equal.
//!
//! Acquisition and science sequences are tracked by separate matchers with
//! different reset policies:
//!
//! - the **acquisition** matcher only ever describes the current visit; a
//!   visit change (or a sequence-type switch) clears it outright and
//!   advances an id base so a restarted acquisition derives fresh ids;
//! - the **science** matcher is cumulative; a reset commits a fully
//!   collected in-progress atom and discards a partial one, and the map
//!   itself survives across visits.
//!
//! Completions are consumed atomically per atom: `match_*` decrements the
//! multiset, so asking twice only succeeds while recorded count remains.

use std::collections::HashMap;
use std::hash::Hash;

use crate::ids::{AtomId, SequenceType, VisitId};
use crate::proto::{ProtoAtom, ProtoStep, StepConfig};
use crate::records::{AtomRecord, StepRecord};

// ============================================================================
// Match keys
// ============================================================================

/// The pair of configurations that identifies a step for matching.
/// Telescope config and observe class participate in [`ProtoStep::matches`]
/// but not in atom-level matching, which compares instrument activity only.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StepMatch<D> {
    pub instrument: D,
    pub step_config: StepConfig,
}

impl<D: Clone> StepMatch<D> {
    pub fn of_proto(step: &ProtoStep<D>) -> Self {
        StepMatch { instrument: step.instrument.clone(), step_config: step.step_config.clone() }
    }

    pub fn of_record(record: &StepRecord<D>) -> Self {
        StepMatch {
            instrument: record.instrument.clone(),
            step_config: record.step_config.clone(),
        }
    }
}

/// Ordered step matches of one atom; two atoms match iff these are equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AtomMatch<D>(pub Vec<StepMatch<D>>);

impl<D: Clone> AtomMatch<D> {
    pub fn of_proto(atom: &ProtoAtom<ProtoStep<D>>) -> Self {
        AtomMatch(atom.steps().iter().map(StepMatch::of_proto).collect())
    }
}

// ============================================================================
// AtomMap
// ============================================================================

/// Multiset of completed atoms. Each completion is tagged with the visit it
/// finished in, which both carries the count (entry list length) and lets
/// the GMOS generator distinguish past-visit from current-visit work.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AtomMap<D: Eq + Hash> {
    map: HashMap<AtomMatch<D>, Vec<VisitId>>,
}

impl<D: Eq + Hash> AtomMap<D> {
    pub fn new() -> Self {
        AtomMap { map: HashMap::new() }
    }

    /// Record one completion of `key` in `visit`.
    pub fn increment(&mut self, key: AtomMatch<D>, visit: VisitId) {
        self.map.entry(key).or_default().push(visit);
    }

    /// Completions recorded for `key`, over all visits.
    pub fn count(&self, key: &AtomMatch<D>) -> usize {
        self.map.get(key).map_or(0, Vec::len)
    }

    /// Total completions over all keys.
    pub fn total(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Consume one completion of `key` from any visit.
    pub fn match_atom(&mut self, key: &AtomMatch<D>) -> bool {
        self.take(key, |_| true).is_some()
    }

    /// Consume one completion of `key` from a visit other than `current`,
    /// returning the visit it was recorded in.
    pub fn match_past(&mut self, key: &AtomMatch<D>, current: VisitId) -> Option<VisitId> {
        self.take(key, |v| v != current)
    }

    /// Consume one completion of `key` recorded in `current`.
    pub fn match_current(&mut self, key: &AtomMatch<D>, current: VisitId) -> bool {
        self.take(key, |v| v == current).is_some()
    }

    fn take(&mut self, key: &AtomMatch<D>, pred: impl Fn(VisitId) -> bool) -> Option<VisitId> {
        let visits = self.map.get_mut(key)?;
        let idx = visits.iter().rposition(|v| pred(*v))?;
        let visit = visits.remove(idx);
        if visits.is_empty() {
            self.map.remove(key);
        }
        Some(visit)
    }
}

// ============================================================================
// Per-sequence matcher
// ============================================================================

/// Builder state machine for one sequence (acquisition *or* science).
///
/// Steps arrive in recorded order tagged with their atom id and the atom's
/// declared step count. A change of atom id closes the previous run: a run
/// whose length equals the declared count commits to the completed map,
/// anything else is discarded.
#[derive(Clone, Debug)]
pub enum SequenceMatch<D: Eq + Hash> {
    Reset(AtomMap<D>),
    InProgress {
        atom: AtomId,
        expected: u16,
        visit: VisitId,
        steps: Vec<StepMatch<D>>,
        completed: AtomMap<D>,
    },
}

impl<D: Eq + Hash> Default for SequenceMatch<D> {
    fn default() -> Self {
        SequenceMatch::Reset(AtomMap::new())
    }
}

impl<D: Eq + Hash> SequenceMatch<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one successfully completed step.
    pub fn next(&mut self, atom: AtomId, expected: u16, visit: VisitId, step: StepMatch<D>) {
        let state = std::mem::take(self);
        *self = match state {
            SequenceMatch::Reset(completed) => SequenceMatch::InProgress {
                atom,
                expected,
                visit,
                steps: vec![step],
                completed,
            },
            SequenceMatch::InProgress {
                atom: current,
                expected: current_expected,
                visit: current_visit,
                mut steps,
                completed,
            } => {
                if atom == current {
                    steps.push(step);
                    SequenceMatch::InProgress {
                        atom: current,
                        expected: current_expected,
                        visit,
                        steps,
                        completed,
                    }
                } else {
                    let completed = Self::close(
                        completed,
                        current_expected,
                        current_visit,
                        steps,
                    );
                    SequenceMatch::InProgress {
                        atom,
                        expected,
                        visit,
                        steps: vec![step],
                        completed,
                    }
                }
            }
        };
    }

    fn close(
        mut completed: AtomMap<D>,
        expected: u16,
        visit: VisitId,
        steps: Vec<StepMatch<D>>,
    ) -> AtomMap<D> {
        if steps.len() == expected as usize && expected > 0 {
            completed.increment(AtomMatch(steps), visit);
        }
        completed
    }

    /// Commit a fully collected in-progress atom, discard a partial one,
    /// and return to the reset state keeping the completed map.
    pub fn settle(&mut self) {
        let state = std::mem::take(self);
        *self = match state {
            SequenceMatch::Reset(completed) => SequenceMatch::Reset(completed),
            SequenceMatch::InProgress { expected, visit, steps, completed, .. } => {
                SequenceMatch::Reset(Self::close(completed, expected, visit, steps))
            }
        };
    }

    /// The completed map, closing a complete in-progress atom and
    /// discarding a partial one.
    pub fn build(self) -> AtomMap<D> {
        match self {
            SequenceMatch::Reset(completed) => completed,
            SequenceMatch::InProgress { expected, visit, steps, completed, .. } => {
                Self::close(completed, expected, visit, steps)
            }
        }
    }
}

impl<D: Eq + Hash + Clone> SequenceMatch<D> {
    /// Non-consuming [`Self::build`].
    pub fn snapshot(&self) -> AtomMap<D> {
        self.clone().build()
    }
}

// ============================================================================
// Per-observation completion state
// ============================================================================

/// The `(visit, sequence type)` a matcher is currently following.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MatchContext {
    pub visit: VisitId,
    pub sequence_type: SequenceType,
}

/// Per-observation completion: the acquisition and science matchers plus
/// the reset triggers that coordinate them.
#[derive(Clone, Debug, Default)]
pub struct State<D: Eq + Hash> {
    ctx: Option<MatchContext>,
    acq: SequenceMatch<D>,
    sci: SequenceMatch<D>,
    acq_id_base: u32,
    atom_counts: HashMap<AtomId, u16>,
    acq_atoms: u32,
    sci_atoms: u32,
}

impl<D: Eq + Hash + Clone> State<D> {
    pub fn new() -> Self {
        State {
            ctx: None,
            acq: SequenceMatch::new(),
            sci: SequenceMatch::new(),
            acq_id_base: 0,
            atom_counts: HashMap::new(),
            acq_atoms: 0,
            sci_atoms: 0,
        }
    }

    /// Id base for acquisition atom indices; advances on every reset so a
    /// restarted acquisition never reuses earlier ids.
    pub fn acq_id_base(&self) -> u32 {
        self.acq_id_base
    }

    /// Atoms recorded against the science sequence, for index continuation.
    pub fn science_atom_count(&self) -> u32 {
        self.sci_atoms
    }

    /// Acquisition atoms recorded since the last reset.
    pub fn acquisition_atom_count(&self) -> u32 {
        self.acq_atoms
    }

    pub fn current_visit(&self) -> Option<VisitId> {
        self.ctx.map(|c| c.visit)
    }

    /// Register an atom header; its declared step count is what lets the
    /// step fold decide when a run of steps closes the atom.
    pub fn record_atom(&mut self, record: &AtomRecord) {
        if self.atom_counts.insert(record.atom_id, record.step_count).is_none() {
            match record.sequence_type {
                SequenceType::Acquisition => self.acq_atoms += 1,
                SequenceType::Science => self.sci_atoms += 1,
            }
        }
    }

    /// Fold one recorded step. Every step moves the context (so a failed
    /// step still triggers visit and sequence-type resets); only
    /// successfully completed steps feed the matchers.
    pub fn record_step(&mut self, record: &StepRecord<D>) {
        let next_ctx =
            MatchContext { visit: record.visit_id, sequence_type: record.sequence_type };
        match self.ctx {
            Some(ctx) if ctx == next_ctx => {}
            _ => self.reset(),
        }
        self.ctx = Some(next_ctx);

        if !record.successfully_completed() {
            return;
        }
        // An atom id never registered cannot close; its steps collect and
        // are discarded, which is the required handling for anomalous
        // history.
        let expected = self.atom_counts.get(&record.atom_id).copied().unwrap_or(0);
        let step = StepMatch::of_record(record);
        match record.sequence_type {
            SequenceType::Acquisition => {
                self.acq.next(record.atom_id, expected, record.visit_id, step)
            }
            SequenceType::Science => {
                self.sci.next(record.atom_id, expected, record.visit_id, step)
            }
        }
    }

    fn reset(&mut self) {
        // Acquisition restarts from scratch with a fresh id base.
        self.acq = SequenceMatch::new();
        self.acq_id_base += 1;
        self.acq_atoms = 0;
        // Science commits what completed and keeps accumulating.
        self.sci.settle();
    }

    /// Snapshot of completed science atoms (a fully collected in-progress
    /// atom counts; a partial one does not).
    pub fn science_completed(&self) -> AtomMap<D> {
        self.sci.snapshot()
    }

    /// Snapshot of acquisition atoms completed in the current visit.
    pub fn acquisition_completed(&self) -> AtomMap<D> {
        self.acq.snapshot()
    }
}

// ============================================================================
// Tests
// ============================================================================
