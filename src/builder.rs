//! Atom construction
//!
//! Promotes proto-atoms to emitted [`Atom`]s: every step gets a time
//! estimate from the stateful calculator and a deterministic id derived
//! from the sequence namespace. The prior-step state threads *across* atom
//! boundaries, so the first step of an atom still pays for configuration
//! changes relative to the last step of the previous atom.

use crate::estimate::{Last, TimeEstimateCalculator};
use crate::ids::{AtomId, SequenceIds, SequenceType, StepId};
use crate::proto::{Breakpoint, ObserveClass, ProtoAtom, ProtoStep, StepConfig, TelescopeConfig};
use crate::units::TimeSpan;

/// An atom-bound, time-estimated step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step<D> {
    pub id: StepId,
    pub instrument: D,
    pub step_config: StepConfig,
    pub telescope: TelescopeConfig,
    pub estimate: TimeSpan,
    pub observe_class: ObserveClass,
    pub breakpoint: Breakpoint,
}

/// An emitted atom: id, description, and at least one step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Atom<D> {
    pub id: AtomId,
    pub description: Option<String>,
    pub steps: Vec<Step<D>>,
}

impl<D> Atom<D> {
    /// Sum of the step estimates.
    pub fn total_estimate(&self) -> TimeSpan {
        self.steps.iter().fold(TimeSpan::ZERO, |acc, s| acc + s.estimate)
    }
}

/// Hands out consecutive atom indices for one sequence.
#[derive(Copy, Clone, Debug, Default)]
pub struct IndexTracker {
    next: u32,
}

impl IndexTracker {
    /// Start from the number of atoms already recorded, so freshly emitted
    /// atoms continue the index sequence instead of reusing ids.
    pub fn starting_at(next: u32) -> Self {
        IndexTracker { next }
    }

    /// Claim the next atom index.
    pub fn claim(&mut self) -> u32 {
        let idx = self.next;
        self.next += 1;
        idx
    }
}

/// Builds [`Atom`]s for one sequence of one observation.
pub struct AtomBuilder<'a, S, D> {
    calc: &'a dyn TimeEstimateCalculator<S, D>,
    static_config: &'a S,
    ids: SequenceIds,
    sequence_type: SequenceType,
}

impl<'a, S, D: Clone> AtomBuilder<'a, S, D> {
    pub fn new(
        calc: &'a dyn TimeEstimateCalculator<S, D>,
        static_config: &'a S,
        ids: SequenceIds,
        sequence_type: SequenceType,
    ) -> Self {
        AtomBuilder { calc, static_config, ids, sequence_type }
    }

    #[inline]
    pub fn sequence_type(&self) -> SequenceType {
        self.sequence_type
    }

    /// Emit one atom at `atom_index`, numbering its steps from
    /// `step_base` and advancing `last` across its steps.
    pub fn build(
        &self,
        last: &mut Last<D>,
        atom_index: u32,
        step_base: u32,
        proto: &ProtoAtom<ProtoStep<D>>,
    ) -> Atom<D> {
        let atom_id = self.ids.atom_id(self.sequence_type, atom_index);
        let steps = proto
            .steps()
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let estimate = self.calc.estimate_step(self.static_config, last, step);
                last.advance(step);
                Step {
                    id: self.ids.step_id(atom_id, step_base + i as u32),
                    instrument: step.instrument.clone(),
                    step_config: step.step_config.clone(),
                    telescope: step.telescope.clone(),
                    estimate,
                    observe_class: step.observe_class,
                    breakpoint: step.breakpoint,
                }
            })
            .collect();
        Atom {
            id: atom_id,
            description: proto.description().map(str::to_owned),
            steps,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::fingerprint;
    use crate::ids::{CommitHash, ObservationId};
    use crate::proto::TelescopeConfig;
    use crate::units::Offset;

    struct Flat;

    impl TimeEstimateCalculator<(), u8> for Flat {
        fn estimate_step(&self, _s: &(), _prior: &Last<u8>, step: &ProtoStep<u8>) -> TimeSpan {
            TimeSpan::from_seconds(step.instrument as u64)
        }
    }

    fn ids() -> SequenceIds {
        SequenceIds::new(
            &CommitHash::from_bytes([1; 20]),
            ObservationId(99),
            &fingerprint(&0u32),
        )
    }

    fn proto(instruments: &[u8]) -> ProtoAtom<ProtoStep<u8>> {
        let steps: Vec<_> = instruments
            .iter()
            .map(|&i| {
                ProtoStep::new(
                    i,
                    StepConfig::Science,
                    TelescopeConfig::guided(Offset::ZERO),
                    ObserveClass::Science,
                )
            })
            .collect();
        ProtoAtom::new(Some("test".into()), steps).unwrap()
    }

    #[test]
    fn ids_are_derived_from_indices() {
        let seq = ids();
        let builder = AtomBuilder::new(&Flat, &(), seq, SequenceType::Science);
        let atom = builder.build(&mut Last::new(), 3, 0, &proto(&[10, 20]));
        assert_eq!(atom.id, seq.atom_id(SequenceType::Science, 3));
        assert_eq!(atom.steps[0].id, seq.step_id(atom.id, 0));
        assert_eq!(atom.steps[1].id, seq.step_id(atom.id, 1));
    }

    #[test]
    fn step_base_shifts_step_ids() {
        let seq = ids();
        let builder = AtomBuilder::new(&Flat, &(), seq, SequenceType::Science);
        let atom = builder.build(&mut Last::new(), 0, 2, &proto(&[10]));
        assert_eq!(atom.steps[0].id, seq.step_id(atom.id, 2));
    }

    #[test]
    fn estimates_and_total_accumulate() {
        let builder = AtomBuilder::new(&Flat, &(), ids(), SequenceType::Science);
        let atom = builder.build(&mut Last::new(), 0, 0, &proto(&[10, 20, 30]));
        assert_eq!(atom.total_estimate(), TimeSpan::from_seconds(60));
    }

    #[test]
    fn rebuilding_yields_identical_atoms() {
        let builder = AtomBuilder::new(&Flat, &(), ids(), SequenceType::Science);
        let a = builder.build(&mut Last::new(), 1, 0, &proto(&[10, 20]));
        let b = builder.build(&mut Last::new(), 1, 0, &proto(&[10, 20]));
        assert_eq!(a, b);
    }

    #[test]
    fn index_tracker_is_consecutive() {
        let mut t = IndexTracker::starting_at(5);
        assert_eq!(t.claim(), 5);
        assert_eq!(t.claim(), 6);
    }
}
