//! Crate root: public surface and sequence-generation invariants
//!
//! This crate is the observation **sequence generator** for an observatory
//! database: given an observation's static configuration, ITC result, and
//! recorded execution history, it produces the deterministic, resumable
//! schedule of *atoms* (indivisible step groups) a telescope control system
//! executes next. It is a pure library: no I/O, no persistence, no clock —
//! callers supply the reference time and fold recorded events in order.
//!
//! ## Invariants
//!
//! - **Determinism.** The emitted atom stream, ids included, is a pure
//!   function of `(commit hash, observation id, parameters, recorded
//!   history)`; re-running in any process reproduces it byte for byte.
//!   There is no hidden clock and no randomness anywhere in the crate.
//!
//! - **Id stability.** Atom and step ids are UUIDv5 derivations from a
//!   per-observation namespace ([`ids`]); appending history never changes
//!   ids already derived for the same indices. Acquisition restarts are
//!   re-keyed through an id base that advances on every reset.
//!
//! - **Completion is a fold.** Recorded visits, atoms, and steps fold into
//!   matcher state ([`completion`]) in caller order; already-executed atoms
//!   are consumed from the nominal stream atomically, with acquisition
//!   resetting per visit and science accumulating across visits.
//!
//! - **Failures are values.** Configuration problems, missing smart-gcal
//!   mappings, and anomalous history are typed errors or silently skipped
//!   records, per the policy of each layer; nothing panics on input.
//!
//! The per-instrument generators are [`flamingos2`] (ABBA cycles with
//! periodic night-time calibrations) and [`gmos`] (wavelength-block
//! rotation with arc zipping); [`generator`] is the facade the database
//! service drives.

#![forbid(unsafe_code)]

/// Atom construction: id assignment and time estimation.
pub mod builder;
/// Completion tracking: matching recorded atoms against the nominal
/// sequence.
pub mod completion;
/// Instrument configuration (Flamingos-2 and GMOS North/South long-slit).
pub mod config;
/// Step time estimation with configuration-change overheads.
pub mod estimate;
/// Flamingos-2 long-slit sequence generation.
pub mod flamingos2;
/// Calibration unit configuration and smart-gcal expansion.
pub mod gcal;
/// Generator facade, parameters, and fingerprint.
pub mod generator;
/// GMOS long-slit sequence generation.
pub mod gmos;
/// Canonical byte encoding and MD5 content fingerprints.
pub mod hashing;
/// Identifiers and deterministic UUID derivation.
pub mod ids;
/// Step and atom prototypes.
pub mod proto;
/// Recorded execution history.
pub mod records;
/// Time, angle, and wavelength quantities.
pub mod units;

pub use builder::{Atom, AtomBuilder, IndexTracker, Step};
pub use completion::{AtomMap, AtomMatch, SequenceMatch, StepMatch};
pub use config::{IntegrationTime, STANDIN_ACQUISITION_TIME};
pub use estimate::{Last, TimeEstimateCalculator};
pub use gcal::{SmartGcalError, SmartGcalExpander, SmartGcalType, TableExpander};
pub use generator::{
    CalibrationRole, Error, ExecutionConfig, Generator, GeneratorParams, InstrumentGenerator,
    InstrumentStepRecord, ObservingMode, ProtoExecutionConfig, SequenceGenerator,
    SmartGcalExpanders,
};
pub use hashing::{fingerprint, Digest, Fingerprint, HashBytes};
pub use ids::{
    AtomId, CommitHash, ObservationId, SequenceIds, SequenceType, StepId, VisitId,
};
pub use proto::{
    Breakpoint, GuideState, ObserveClass, ProtoAtom, ProtoStep, StepConfig, TelescopeConfig,
};
pub use records::{
    AtomRecord, ExecutionState, Instrument, QaState, SequenceCommand, Site, StepRecord,
    VisitRecord,
};
pub use units::{
    Adjustment, Offset, OffsetP, OffsetQ, TimeSpan, Timestamp, TimestampInterval, Wavelength,
    WavelengthDither,
};
