//! Step time estimation
//!
//! Per-step execution time is the exposure itself plus detector readout and
//! write-out, plus configuration-change overheads that depend on the
//! *previous* step: moving the telescope, swapping a filter or disperser,
//! reconfiguring the focal plane, or switching between sky and calibration
//! light. The previous step is threaded through [`Last`], which the atom
//! builder advances as it walks a sequence, so estimates are a pure fold of
//! step order.
//!
//! The calculators here are the crate defaults; the trait is the seam for a
//! caller-supplied model.

use crate::config::{
    Exposure, Flamingos2Config, Flamingos2Dynamic, Flamingos2ReadMode, GmosDynamic, GmosFilter,
    GmosFpu, GmosGrating, GmosLongSlitConfig, GmosRoi,
};
use crate::proto::{ProtoStep, StepConfig};
use crate::units::TimeSpan;

/// The previously estimated step, if any. One `Last` value tracks one
/// sequence; a fresh atom chain starts from [`Last::new`].
#[derive(Clone, Debug, Default)]
pub struct Last<D> {
    prior: Option<ProtoStep<D>>,
}

impl<D> Last<D> {
    pub fn new() -> Self {
        Last { prior: None }
    }

    #[inline]
    pub fn prior(&self) -> Option<&ProtoStep<D>> {
        self.prior.as_ref()
    }
}

impl<D: Clone> Last<D> {
    /// Record `step` as the new prior.
    pub fn advance(&mut self, step: &ProtoStep<D>) {
        self.prior = Some(step.clone());
    }
}

/// Stateful step time estimation.
pub trait TimeEstimateCalculator<S, D> {
    /// Estimate one step given the prior step.
    fn estimate_step(&self, static_config: &S, prior: &Last<D>, step: &ProtoStep<D>) -> TimeSpan;

    /// Estimate a run of steps, advancing `last` across it.
    fn estimate_total(
        &self,
        static_config: &S,
        last: &mut Last<D>,
        steps: &[ProtoStep<D>],
    ) -> TimeSpan
    where
        D: Clone,
    {
        let mut total = TimeSpan::ZERO;
        for step in steps {
            total += self.estimate_step(static_config, last, step);
            last.advance(step);
        }
        total
    }
}

/// Time to transfer a completed frame to permanent store.
const WRITE_OUT: TimeSpan = TimeSpan::from_seconds(10);

/// Telescope offset-and-settle cost when the pointing changes.
const OFFSET_MOVE: TimeSpan = TimeSpan::from_seconds(7);

/// Switching between sky and GCAL light (fold mirror + lamp settle).
const GCAL_SWITCH: TimeSpan = TimeSpan::from_seconds(15);

fn light_path_changed(prior: &StepConfig, step: &StepConfig) -> bool {
    let gcal = |c: &StepConfig| matches!(c, StepConfig::Gcal(_) | StepConfig::SmartGcal(_));
    gcal(prior) != gcal(step)
}

// ============================================================================
// Flamingos-2
// ============================================================================

const F2_FILTER_CHANGE: TimeSpan = TimeSpan::from_seconds(50);
const F2_DISPERSER_CHANGE: TimeSpan = TimeSpan::from_seconds(40);
const F2_FPU_CHANGE: TimeSpan = TimeSpan::from_seconds(95);

/// Default Flamingos-2 estimator.
#[derive(Copy, Clone, Debug, Default)]
pub struct Flamingos2Estimator;

impl Flamingos2Estimator {
    fn readout(read_mode: Flamingos2ReadMode) -> TimeSpan {
        match read_mode {
            Flamingos2ReadMode::Bright => TimeSpan::from_seconds(8),
            Flamingos2ReadMode::Medium => TimeSpan::from_seconds(14),
            Flamingos2ReadMode::Faint => TimeSpan::from_seconds(20),
        }
    }
}

impl TimeEstimateCalculator<Flamingos2Config, Flamingos2Dynamic> for Flamingos2Estimator {
    fn estimate_step(
        &self,
        _static_config: &Flamingos2Config,
        prior: &Last<Flamingos2Dynamic>,
        step: &ProtoStep<Flamingos2Dynamic>,
    ) -> TimeSpan {
        let d = &step.instrument;
        let mut total = d.exposure() + Self::readout(d.read_mode) + WRITE_OUT;
        if let Some(p) = prior.prior() {
            if p.telescope.offset != step.telescope.offset {
                total += OFFSET_MOVE;
            }
            if p.instrument.filter != d.filter {
                total += F2_FILTER_CHANGE;
            }
            if p.instrument.disperser != d.disperser {
                total += F2_DISPERSER_CHANGE;
            }
            if p.instrument.fpu != d.fpu {
                total += F2_FPU_CHANGE;
            }
            if light_path_changed(&p.step_config, &step.step_config) {
                total += GCAL_SWITCH;
            }
        }
        total
    }
}

// ============================================================================
// GMOS
// ============================================================================

const GMOS_FILTER_CHANGE: TimeSpan = TimeSpan::from_seconds(20);
const GMOS_GRATING_CHANGE: TimeSpan = TimeSpan::from_seconds(90);
const GMOS_FPU_CHANGE: TimeSpan = TimeSpan::from_seconds(60);

/// Full-frame unbinned readout; binning and smaller regions divide it.
const GMOS_READOUT_FULL: TimeSpan = TimeSpan::from_seconds(72);

/// Default GMOS estimator, shared by both sites.
#[derive(Copy, Clone, Debug, Default)]
pub struct GmosEstimator;

impl GmosEstimator {
    fn readout<G, F, U>(d: &GmosDynamic<G, F, U>) -> TimeSpan {
        let bins = (d.readout.x_bin.count() * d.readout.y_bin.count()) as u64;
        let us = GMOS_READOUT_FULL.as_micros() / bins.max(1);
        let us = match d.roi {
            GmosRoi::FullFrame => us,
            GmosRoi::Ccd2 | GmosRoi::CentralSpectrum => us / 3,
            GmosRoi::CentralStamp => us / 10,
        };
        TimeSpan::from_micros(us)
    }
}

impl<G, F, U> TimeEstimateCalculator<GmosLongSlitConfig<G, F, U>, GmosDynamic<G, F, U>>
    for GmosEstimator
where
    G: GmosGrating,
    F: GmosFilter,
    U: GmosFpu,
{
    fn estimate_step(
        &self,
        _static_config: &GmosLongSlitConfig<G, F, U>,
        prior: &Last<GmosDynamic<G, F, U>>,
        step: &ProtoStep<GmosDynamic<G, F, U>>,
    ) -> TimeSpan {
        let d = &step.instrument;
        let mut total = d.exposure() + Self::readout(d) + WRITE_OUT;
        if let Some(p) = prior.prior() {
            if p.telescope.offset != step.telescope.offset {
                total += OFFSET_MOVE;
            }
            if p.instrument.filter != d.filter {
                total += GMOS_FILTER_CHANGE;
            }
            if p.instrument.grating != d.grating {
                total += GMOS_GRATING_CHANGE;
            }
            if p.instrument.fpu != d.fpu {
                total += GMOS_FPU_CHANGE;
            }
            if light_path_changed(&p.step_config, &step.step_config) {
                total += GCAL_SWITCH;
            }
        }
        total
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Flamingos2Disperser, Flamingos2Filter, Flamingos2Fpu,
    };
    use crate::proto::{ObserveClass, TelescopeConfig};
    use crate::units::{Offset, OffsetQ};

    fn f2_config() -> Flamingos2Config {
        Flamingos2Config {
            disperser: Flamingos2Disperser::R1200JH,
            filter: Flamingos2Filter::JH,
            fpu: Flamingos2Fpu::LongSlit4,
            explicit_read_mode: None,
            explicit_reads: None,
            explicit_decker: None,
            explicit_readout_mode: None,
            offsets: vec![],
        }
    }

    fn science_at(config: &Flamingos2Config, q: i64) -> ProtoStep<Flamingos2Dynamic> {
        ProtoStep::new(
            config.science_dynamic(TimeSpan::from_seconds(300)),
            StepConfig::Science,
            TelescopeConfig::guided(Offset::in_q(OffsetQ::from_arcsec(q))),
            ObserveClass::Science,
        )
    }

    #[test]
    fn first_step_has_no_change_overheads() {
        let config = f2_config();
        let step = science_at(&config, 15);
        let est = Flamingos2Estimator.estimate_step(&config, &Last::new(), &step);
        // 300s exposure + 20s faint readout + 10s write.
        assert_eq!(est, TimeSpan::from_seconds(330));
    }

    #[test]
    fn offset_change_adds_a_move() {
        let config = f2_config();
        let a = science_at(&config, 15);
        let b = science_at(&config, -15);
        let mut last = Last::new();
        last.advance(&a);
        let est = Flamingos2Estimator.estimate_step(&config, &last, &b);
        assert_eq!(est, TimeSpan::from_seconds(330) + OFFSET_MOVE);
    }

    #[test]
    fn same_configuration_has_no_move() {
        let config = f2_config();
        let a = science_at(&config, 15);
        let mut last = Last::new();
        last.advance(&a);
        let est = Flamingos2Estimator.estimate_step(&config, &last, &a);
        assert_eq!(est, TimeSpan::from_seconds(330));
    }

    #[test]
    fn total_is_the_fold_of_steps() {
        let config = f2_config();
        let steps =
            vec![science_at(&config, 15), science_at(&config, -15), science_at(&config, -15)];
        let mut last = Last::new();
        let total = Flamingos2Estimator.estimate_total(&config, &mut last, &steps);
        // Two distinct pointings after the first: one offset move.
        assert_eq!(total, TimeSpan::from_seconds(3 * 330) + OFFSET_MOVE);
        assert!(last.prior().is_some());
    }
}
