//! Generator facade
//!
//! The single entry point the observatory database drives: given the
//! code-version commit hash, an observation id, and the assembled
//! [`GeneratorParams`], it instantiates the per-instrument generator,
//! accepts the recorded execution history in event order, and produces the
//! typed acquisition/science atom streams.
//!
//! Everything that can influence the emitted sequence participates in the
//! parameter fingerprint, which doubles as the caller's cache key: identical
//! `(commit, observation, params, history)` reproduce the byte-identical
//! stream, ids included.

use std::fmt;

use tracing::debug;

use crate::builder::Atom;
use crate::config::{
    Flamingos2Config, Flamingos2Dynamic, GmosNorthConfig, GmosNorthDynamic, GmosSouthConfig,
    GmosSouthDynamic, IntegrationTime,
};
use crate::estimate::{Flamingos2Estimator, GmosEstimator};
use crate::flamingos2::{Flamingos2Error, Flamingos2Generator};
use crate::gcal::{SmartGcalError, SmartGcalExpander};
use crate::gmos::{GmosError, GmosGenerator, GmosNorthGenerator, GmosSouthGenerator};
use crate::hashing::{fingerprint, Digest, Fingerprint, HashBytes};
use crate::ids::{CommitHash, ObservationId, SequenceIds};
use crate::records::{AtomRecord, Instrument, SequenceCommand, StepRecord, VisitRecord};
use crate::units::Timestamp;

// ============================================================================
// Parameters & fingerprint
// ============================================================================

/// The observing mode with its full static configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObservingMode {
    Flamingos2LongSlit(Flamingos2Config),
    GmosNorthLongSlit(GmosNorthConfig),
    GmosSouthLongSlit(GmosSouthConfig),
}

impl ObservingMode {
    pub const fn tag(&self) -> &'static str {
        match self {
            ObservingMode::Flamingos2LongSlit(_) => "flamingos2_long_slit",
            ObservingMode::GmosNorthLongSlit(_) => "gmos_north_long_slit",
            ObservingMode::GmosSouthLongSlit(_) => "gmos_south_long_slit",
        }
    }

    pub const fn instrument(&self) -> Instrument {
        match self {
            ObservingMode::Flamingos2LongSlit(_) => Instrument::Flamingos2,
            ObservingMode::GmosNorthLongSlit(_) => Instrument::GmosNorth,
            ObservingMode::GmosSouthLongSlit(_) => Instrument::GmosSouth,
        }
    }
}

impl HashBytes for ObservingMode {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_str(self.tag());
        match self {
            ObservingMode::Flamingos2LongSlit(c) => c.absorb(d),
            ObservingMode::GmosNorthLongSlit(c) => c.absorb(d),
            ObservingMode::GmosSouthLongSlit(c) => c.absorb(d),
        }
    }
}

/// Why a calibration observation exists; science observations carry none.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CalibrationRole {
    SpectroPhotometric,
    Twilight,
}

impl CalibrationRole {
    pub const fn tag(self) -> &'static str {
        match self {
            CalibrationRole::SpectroPhotometric => "spectro_photometric",
            CalibrationRole::Twilight => "twilight",
        }
    }
}

/// Everything (besides commit hash and observation id) that determines the
/// generated sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratorParams {
    pub itc: IntegrationTime,
    pub acquisition_itc: Option<IntegrationTime>,
    pub mode: ObservingMode,
    pub calibration_role: Option<CalibrationRole>,
}

impl GeneratorParams {
    /// The content fingerprint callers cache generator output under.
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(self)
    }
}

impl HashBytes for GeneratorParams {
    fn absorb(&self, d: &mut Digest) {
        self.itc.absorb(d);
        self.acquisition_itc.absorb(d);
        self.mode.absorb(d);
        if let Some(role) = self.calibration_role {
            d.absorb_str(role.tag());
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Generator-level failures surfaced to the caller.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The configuration cannot produce a sequence until the user changes
    /// inputs.
    #[error("Could not generate the {observation} sequence: {message}")]
    SequenceUnavailable { observation: ObservationId, message: String },
    /// A smart calibration lookup had no mapping for a configuration.
    #[error(transparent)]
    SmartGcal(#[from] SmartGcalError),
    /// The integration time service failed for one or more targets.
    #[error("ITC service error: {message}")]
    ItcService { message: String },
    /// The requested generation mode exists but has no implementation yet.
    #[error("{message}")]
    NotImplemented { message: String },
    /// The request itself cannot be served.
    #[error("{message}")]
    InvalidData { message: String },
}

impl Error {
    fn unavailable(observation: ObservationId, err: impl fmt::Display) -> Error {
        Error::SequenceUnavailable { observation, message: err.to_string() }
    }
}

// ============================================================================
// Sequence generator abstraction
// ============================================================================

/// The typed execution config for one observation: its static instrument
/// configuration plus the lazy acquisition and science atom streams.
pub struct ProtoExecutionConfig<'g, S, D> {
    pub static_config: &'g S,
    pub acquisition: Box<dyn Iterator<Item = Result<Atom<D>, Error>> + 'g>,
    pub science: Box<dyn Iterator<Item = Result<Atom<D>, Error>> + 'g>,
}

/// Instrument-agnostic generator operations. Implemented by each
/// per-instrument state type; `generate` is a pure function of the folded
/// history, so calling it twice yields identical streams.
pub trait SequenceGenerator<D> {
    type Static;

    fn record_visit(&mut self, visit: &VisitRecord);
    fn record_atom(&mut self, atom: &AtomRecord);
    fn record_step(&mut self, step: &StepRecord<D>);
    fn record_sequence_command(&mut self, command: SequenceCommand);
    fn generate(&self, when: Timestamp) -> ProtoExecutionConfig<'_, Self::Static, D>;
}

impl<'a> SequenceGenerator<Flamingos2Dynamic> for Flamingos2Generator<'a> {
    type Static = Flamingos2Config;

    fn record_visit(&mut self, visit: &VisitRecord) {
        Flamingos2Generator::record_visit(self, visit)
    }

    fn record_atom(&mut self, atom: &AtomRecord) {
        Flamingos2Generator::record_atom(self, atom)
    }

    fn record_step(&mut self, step: &StepRecord<Flamingos2Dynamic>) {
        Flamingos2Generator::record_step(self, step)
    }

    fn record_sequence_command(&mut self, command: SequenceCommand) {
        Flamingos2Generator::record_sequence_command(self, command)
    }

    fn generate(
        &self,
        when: Timestamp,
    ) -> ProtoExecutionConfig<'_, Flamingos2Config, Flamingos2Dynamic> {
        ProtoExecutionConfig {
            static_config: self.config(),
            acquisition: Box::new(self.acquisition_atoms().map(Ok)),
            science: Box::new(self.science_atoms(when).map(Ok)),
        }
    }
}

impl<'a, G, F, U> SequenceGenerator<crate::config::GmosDynamic<G, F, U>>
    for GmosGenerator<'a, G, F, U>
where
    G: crate::config::GmosGrating,
    F: crate::config::GmosFilter,
    U: crate::config::GmosFpu,
{
    type Static = crate::config::GmosLongSlitConfig<G, F, U>;

    fn record_visit(&mut self, visit: &VisitRecord) {
        GmosGenerator::record_visit(self, visit)
    }

    fn record_atom(&mut self, atom: &AtomRecord) {
        GmosGenerator::record_atom(self, atom)
    }

    fn record_step(&mut self, step: &StepRecord<crate::config::GmosDynamic<G, F, U>>) {
        GmosGenerator::record_step(self, step)
    }

    fn record_sequence_command(&mut self, command: SequenceCommand) {
        GmosGenerator::record_sequence_command(self, command)
    }

    fn generate(
        &self,
        when: Timestamp,
    ) -> ProtoExecutionConfig<'_, Self::Static, crate::config::GmosDynamic<G, F, U>> {
        ProtoExecutionConfig {
            static_config: self.config(),
            acquisition: Box::new(self.acquisition_atoms().map(Ok)),
            science: Box::new(self.science_atoms(when).map(|r| r.map_err(Error::from))),
        }
    }
}

// ============================================================================
// Facade
// ============================================================================

/// A recorded step tagged by instrument, so history for any observation can
/// flow through one channel.
#[derive(Clone, Debug)]
pub enum InstrumentStepRecord {
    Flamingos2(StepRecord<Flamingos2Dynamic>),
    GmosNorth(StepRecord<GmosNorthDynamic>),
    GmosSouth(StepRecord<GmosSouthDynamic>),
}

/// The per-instrument generator sum.
#[derive(Debug)]
pub enum InstrumentGenerator<'a> {
    Flamingos2(Flamingos2Generator<'a>),
    GmosNorth(GmosNorthGenerator<'a>),
    GmosSouth(GmosSouthGenerator<'a>),
}

/// The typed execution configs the sum produces.
pub enum ExecutionConfig<'g> {
    Flamingos2(ProtoExecutionConfig<'g, Flamingos2Config, Flamingos2Dynamic>),
    GmosNorth(ProtoExecutionConfig<'g, GmosNorthConfig, GmosNorthDynamic>),
    GmosSouth(ProtoExecutionConfig<'g, GmosSouthConfig, GmosSouthDynamic>),
}

impl InstrumentGenerator<'_> {
    pub fn record_visit(&mut self, visit: &VisitRecord) {
        match self {
            InstrumentGenerator::Flamingos2(g) => g.record_visit(visit),
            InstrumentGenerator::GmosNorth(g) => g.record_visit(visit),
            InstrumentGenerator::GmosSouth(g) => g.record_visit(visit),
        }
    }

    pub fn record_atom(&mut self, atom: &AtomRecord) {
        match self {
            InstrumentGenerator::Flamingos2(g) => g.record_atom(atom),
            InstrumentGenerator::GmosNorth(g) => g.record_atom(atom),
            InstrumentGenerator::GmosSouth(g) => g.record_atom(atom),
        }
    }

    /// Fold a recorded step. A record for a different instrument than the
    /// one generating is anomalous history and is ignored.
    pub fn record_step(&mut self, step: &InstrumentStepRecord) {
        match (self, step) {
            (InstrumentGenerator::Flamingos2(g), InstrumentStepRecord::Flamingos2(s)) => {
                g.record_step(s)
            }
            (InstrumentGenerator::GmosNorth(g), InstrumentStepRecord::GmosNorth(s)) => {
                g.record_step(s)
            }
            (InstrumentGenerator::GmosSouth(g), InstrumentStepRecord::GmosSouth(s)) => {
                g.record_step(s)
            }
            _ => debug!("ignoring step record for a different instrument"),
        }
    }

    pub fn record_sequence_command(&mut self, command: SequenceCommand) {
        match self {
            InstrumentGenerator::Flamingos2(g) => g.record_sequence_command(command),
            InstrumentGenerator::GmosNorth(g) => g.record_sequence_command(command),
            InstrumentGenerator::GmosSouth(g) => g.record_sequence_command(command),
        }
    }

    /// Produce the typed atom streams as of `when`.
    pub fn execution_config(&self, when: Timestamp) -> ExecutionConfig<'_> {
        match self {
            InstrumentGenerator::Flamingos2(g) => {
                ExecutionConfig::Flamingos2(g.generate(when))
            }
            InstrumentGenerator::GmosNorth(g) => ExecutionConfig::GmosNorth(g.generate(when)),
            InstrumentGenerator::GmosSouth(g) => ExecutionConfig::GmosSouth(g.generate(when)),
        }
    }
}

/// The smart-gcal expanders the facade resolves placeholders with, one per
/// instrument family.
pub struct SmartGcalExpanders<'x> {
    pub flamingos2: &'x mut dyn SmartGcalExpander<Flamingos2Dynamic>,
    pub gmos_north: &'x mut dyn SmartGcalExpander<GmosNorthDynamic>,
    pub gmos_south: &'x mut dyn SmartGcalExpander<GmosSouthDynamic>,
}

/// Sequence generation service for one deployed code version.
pub struct Generator {
    commit: CommitHash,
    f2_estimator: Flamingos2Estimator,
    gmos_estimator: GmosEstimator,
}

impl Generator {
    pub fn new(commit: CommitHash) -> Self {
        Generator {
            commit,
            f2_estimator: Flamingos2Estimator,
            gmos_estimator: GmosEstimator,
        }
    }

    pub fn commit(&self) -> &CommitHash {
        &self.commit
    }

    /// The namespace ids for one observation under these parameters.
    pub fn sequence_ids(
        &self,
        observation: ObservationId,
        params: &GeneratorParams,
    ) -> SequenceIds {
        SequenceIds::new(&self.commit, observation, &params.fingerprint())
    }

    /// Instantiate the generator for one observation. The result owns the
    /// fold state; the caller replays recorded history into it and then
    /// asks for [`InstrumentGenerator::execution_config`].
    pub fn instantiate<'g>(
        &'g self,
        observation: ObservationId,
        params: &GeneratorParams,
        expanders: SmartGcalExpanders<'_>,
    ) -> Result<InstrumentGenerator<'g>, Error> {
        if params.calibration_role == Some(CalibrationRole::SpectroPhotometric) {
            return Err(Error::NotImplemented {
                message: "GMOS long-slit spectrophotometric sequence generation is not \
                          implemented"
                    .into(),
            });
        }
        if params.itc.exposure_count == 0 {
            return Err(Error::unavailable(
                observation,
                "the ITC returned a zero exposure count",
            ));
        }

        let ids = self.sequence_ids(observation, params);
        debug!(%observation, namespace = %ids.namespace(), mode = params.mode.tag(),
               "instantiating sequence generator");

        match &params.mode {
            ObservingMode::Flamingos2LongSlit(config) => Flamingos2Generator::new(
                config.clone(),
                params.itc,
                params.acquisition_itc,
                &self.f2_estimator,
                expanders.flamingos2,
                ids,
            )
            .map(InstrumentGenerator::Flamingos2)
            .map_err(|e| match e {
                Flamingos2Error::SmartGcal(e) => Error::SmartGcal(e),
                other => Error::unavailable(observation, other),
            }),
            ObservingMode::GmosNorthLongSlit(config) => GmosGenerator::new(
                config.clone(),
                params.itc,
                params.acquisition_itc,
                &self.gmos_estimator,
                expanders.gmos_north,
                ids,
            )
            .map(InstrumentGenerator::GmosNorth)
            .map_err(|e: GmosError| Error::unavailable(observation, e)),
            ObservingMode::GmosSouthLongSlit(config) => GmosGenerator::new(
                config.clone(),
                params.itc,
                params.acquisition_itc,
                &self.gmos_estimator,
                expanders.gmos_south,
                ids,
            )
            .map(InstrumentGenerator::GmosSouth)
            .map_err(|e: GmosError| Error::unavailable(observation, e)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Flamingos2Disperser, Flamingos2Filter, Flamingos2Fpu, GmosAmpGain, GmosAmpReadMode,
        GmosNorthFpu, GmosNorthGrating, GmosRoi,
    };
    use crate::gcal::{
        GcalArc, GcalConfig, GcalContinuum, GcalDiffuser, GcalEntry, GcalFilter, GcalLamp,
        GcalRow, GcalShutter, SmartGcalInstrument, SmartGcalType, TableExpander,
    };
    use crate::ids::{SequenceType, VisitId};
    use crate::records::ExecutionState;
    use crate::units::{Offset, OffsetQ, TimeSpan, Wavelength};
    use chrono::TimeZone;

    fn at(s: i64) -> Timestamp {
        chrono::Utc.timestamp_opt(s, 0).unwrap()
    }

    fn f2_config() -> Flamingos2Config {
        Flamingos2Config {
            disperser: Flamingos2Disperser::R1200JH,
            filter: Flamingos2Filter::JH,
            fpu: Flamingos2Fpu::LongSlit4,
            explicit_read_mode: None,
            explicit_reads: None,
            explicit_decker: None,
            explicit_readout_mode: None,
            offsets: [15, -15, -15, 15]
                .into_iter()
                .map(|q| Offset::in_q(OffsetQ::from_arcsec(q)))
                .collect(),
        }
    }

    fn f2_expander(config: &Flamingos2Config) -> TableExpander<Flamingos2Dynamic> {
        let dynamic = config.science_dynamic(TimeSpan::from_seconds(1));
        let mut x = TableExpander::new();
        x.insert(
            dynamic.gcal_key(SmartGcalType::Flat),
            GcalRow {
                coverage: None,
                entries: vec![GcalEntry {
                    gcal: GcalConfig {
                        lamp: GcalLamp::Continuum(GcalContinuum::IrGreyBodyHigh),
                        filter: GcalFilter::Nir,
                        diffuser: GcalDiffuser::Ir,
                        shutter: GcalShutter::Open,
                    },
                    exposure: TimeSpan::from_seconds(4),
                }],
            },
        );
        x.insert(
            dynamic.gcal_key(SmartGcalType::Arc),
            GcalRow {
                coverage: None,
                entries: vec![GcalEntry {
                    gcal: GcalConfig {
                        lamp: GcalLamp::one_arc(GcalArc::ArArc),
                        filter: GcalFilter::Nir,
                        diffuser: GcalDiffuser::Ir,
                        shutter: GcalShutter::Closed,
                    },
                    exposure: TimeSpan::from_seconds(30),
                }],
            },
        );
        x
    }

    fn params(mode: ObservingMode) -> GeneratorParams {
        GeneratorParams {
            itc: IntegrationTime {
                exposure_time: TimeSpan::from_seconds(300),
                exposure_count: 4,
            },
            acquisition_itc: None,
            mode,
            calibration_role: None,
        }
    }

    fn expanders<'x>(
        f2: &'x mut TableExpander<Flamingos2Dynamic>,
        gn: &'x mut TableExpander<GmosNorthDynamic>,
        gs: &'x mut TableExpander<GmosSouthDynamic>,
    ) -> SmartGcalExpanders<'x> {
        SmartGcalExpanders { flamingos2: f2, gmos_north: gn, gmos_south: gs }
    }

    #[test]
    fn fingerprint_separates_observably_different_params() {
        let base = params(ObservingMode::Flamingos2LongSlit(f2_config()));
        assert_eq!(base.fingerprint(), base.fingerprint());

        let mut longer = base.clone();
        longer.itc.exposure_time = TimeSpan::from_seconds(301);
        assert_ne!(base.fingerprint(), longer.fingerprint());

        let mut role = base.clone();
        role.calibration_role = Some(CalibrationRole::Twilight);
        assert_ne!(base.fingerprint(), role.fingerprint());

        let mut acq = base.clone();
        acq.acquisition_itc = Some(IntegrationTime {
            exposure_time: TimeSpan::from_seconds(5),
            exposure_count: 1,
        });
        assert_ne!(base.fingerprint(), acq.fingerprint());
    }

    #[test]
    fn spectrophotometric_role_is_rejected() {
        let generator = Generator::new(CommitHash::from_bytes([1; 20]));
        let mut p = params(ObservingMode::Flamingos2LongSlit(f2_config()));
        p.calibration_role = Some(CalibrationRole::SpectroPhotometric);
        let mut f2 = f2_expander(&f2_config());
        let mut gn = TableExpander::new();
        let mut gs = TableExpander::new();
        let err = generator
            .instantiate(ObservationId(1), &p, expanders(&mut f2, &mut gn, &mut gs))
            .unwrap_err();
        assert!(matches!(err, Error::NotImplemented { .. }));
    }

    #[test]
    fn configuration_errors_name_the_observation() {
        let generator = Generator::new(CommitHash::from_bytes([1; 20]));
        let mut config = f2_config();
        config.offsets.truncate(2);
        let p = params(ObservingMode::Flamingos2LongSlit(config));
        let mut f2 = f2_expander(&f2_config());
        let mut gn = TableExpander::new();
        let mut gs = TableExpander::new();
        let err = generator
            .instantiate(ObservationId(7), &p, expanders(&mut f2, &mut gn, &mut gs))
            .unwrap_err();
        assert!(err.to_string().starts_with("Could not generate the o-7 sequence"));
    }

    fn f2_instance<'g>(
        generator: &'g Generator,
        f2: &mut TableExpander<Flamingos2Dynamic>,
    ) -> InstrumentGenerator<'g> {
        let p = params(ObservingMode::Flamingos2LongSlit(f2_config()));
        let mut gn = TableExpander::new();
        let mut gs = TableExpander::new();
        generator
            .instantiate(ObservationId(1), &p, expanders(f2, &mut gn, &mut gs))
            .unwrap()
    }

    #[test]
    fn round_trip_executed_sequence_leaves_nothing_remaining() {
        let service = Generator::new(CommitHash::from_bytes([1; 20]));
        let mut f2 = f2_expander(&f2_config());
        let mut instance = f2_instance(&service, &mut f2);

        // Generate the nominal sequence and pretend the telescope executed
        // it exactly, in order, within one visit.
        let emitted: Vec<Atom<Flamingos2Dynamic>> = match instance.execution_config(at(0)) {
            ExecutionConfig::Flamingos2(cfg) => cfg.science.map(Result::unwrap).collect(),
            _ => unreachable!(),
        };
        assert!(!emitted.is_empty());

        let visit = VisitId(1);
        let mut clock = 0i64;
        for atom in &emitted {
            instance.record_atom(&AtomRecord {
                atom_id: atom.id,
                visit_id: visit,
                sequence_type: SequenceType::Science,
                step_count: atom.steps.len() as u16,
                created: at(clock),
                execution: ExecutionState::Ongoing,
            });
            for (i, step) in atom.steps.iter().enumerate() {
                let start = clock;
                clock += step.estimate.as_seconds() as i64;
                instance.record_step(&InstrumentStepRecord::Flamingos2(StepRecord {
                    step_id: step.id,
                    atom_id: atom.id,
                    visit_id: visit,
                    index: i as u16,
                    instrument: step.instrument.clone(),
                    step_config: step.step_config.clone(),
                    telescope: step.telescope.clone(),
                    observe_class: step.observe_class,
                    created: at(start),
                    interval: Some(crate::units::TimestampInterval::between(
                        at(start),
                        at(clock),
                    )),
                    sequence_type: SequenceType::Science,
                    execution: ExecutionState::Completed,
                    qa: None,
                }));
            }
        }

        let remaining = match instance.execution_config(at(clock)) {
            ExecutionConfig::Flamingos2(cfg) => cfg.science.count(),
            _ => unreachable!(),
        };
        assert_eq!(remaining, 0);
    }

    #[test]
    fn gmos_north_streams_are_typed_and_deterministic() {
        let service = Generator::new(CommitHash::from_bytes([9; 20]));
        let config = GmosNorthConfig {
            grating: GmosNorthGrating::R831G5302,
            filter: None,
            fpu: GmosNorthFpu::LongSlit050,
            central_wavelength: Wavelength::from_nm(750).unwrap(),
            explicit_x_bin: None,
            explicit_y_bin: None,
            amp_read_mode: GmosAmpReadMode::Slow,
            amp_gain: GmosAmpGain::Low,
            roi: GmosRoi::FullFrame,
            wavelength_dithers: vec![],
            spatial_offsets: vec![],
        };
        let dynamic = config
            .science_dynamic(TimeSpan::from_seconds(300), crate::units::WavelengthDither::ZERO)
            .unwrap();
        let mut gn = TableExpander::new();
        gn.insert(
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
                    exposure: TimeSpan::from_seconds(2),
                }],
            },
        );
        gn.insert(
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
                    exposure: TimeSpan::from_seconds(20),
                }],
            },
        );
        let p = params(ObservingMode::GmosNorthLongSlit(config));
        let mut f2 = TableExpander::new();
        let mut gs = TableExpander::new();
        let instance = service
            .instantiate(ObservationId(2), &p, expanders(&mut f2, &mut gn, &mut gs))
            .unwrap();

        let collect_ids = |cfg: ExecutionConfig<'_>| match cfg {
            ExecutionConfig::GmosNorth(c) => c
                .science
                .map(|r| r.unwrap().id)
                .collect::<Vec<_>>(),
            _ => unreachable!(),
        };
        let a = collect_ids(instance.execution_config(at(0)));
        let b = collect_ids(instance.execution_config(at(0)));
        assert_eq!(a, b);
        assert!(!a.is_empty());
    }
}
