//! Calibration unit configuration & smart calibration expansion
//!
//! A *smart* calibration step is a placeholder (`SmartGcal(Arc|Flat)`) whose
//! concrete lamp configuration is resolved against a lookup table keyed on
//! the instrument configuration, optionally narrowed by the wavelength the
//! configuration observes at. Expansion replaces one placeholder with one or
//! more concrete `Gcal(..)` steps whose instrument config matches the
//! placeholder's, with the exposure (and any exposure-derived fields)
//! adjusted to the table entry.
//!
//! The expander is a seam: the crate ships the table-backed reference
//! implementation, and callers may substitute a service-backed one. For a
//! given expander instance and inputs expansion must behave as a pure
//! function; the table implementation memoizes per distinct key.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::hashing::{Digest, HashBytes};
use crate::proto::{ProtoAtom, ProtoStep, StepConfig};
use crate::units::{TimeSpan, Wavelength};

// ============================================================================
// GCAL unit configuration
// ============================================================================

/// Continuum (flat-field) lamps.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GcalContinuum {
    IrGreyBodyLow,
    IrGreyBodyHigh,
    QuartzHalogen5W,
    QuartzHalogen100W,
}

impl GcalContinuum {
    pub const fn tag(self) -> &'static str {
        match self {
            GcalContinuum::IrGreyBodyLow => "ir_grey_body_low",
            GcalContinuum::IrGreyBodyHigh => "ir_grey_body_high",
            GcalContinuum::QuartzHalogen5W => "quartz_halogen_5",
            GcalContinuum::QuartzHalogen100W => "quartz_halogen_100",
        }
    }
}

/// Arc (wavelength reference) lamps.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GcalArc {
    ArArc,
    ThArArc,
    CuArArc,
    XeArc,
}

impl GcalArc {
    pub const fn tag(self) -> &'static str {
        match self {
            GcalArc::ArArc => "ar_arc",
            GcalArc::ThArArc => "thar_arc",
            GcalArc::CuArArc => "cuar_arc",
            GcalArc::XeArc => "xe_arc",
        }
    }
}

/// The lamp selection: one continuum lamp, or one or more arc lamps.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GcalLamp {
    Continuum(GcalContinuum),
    Arcs(BTreeSet<GcalArc>),
}

impl GcalLamp {
    pub fn one_arc(arc: GcalArc) -> Self {
        GcalLamp::Arcs(BTreeSet::from([arc]))
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GcalFilter {
    None,
    Gmos,
    Nir,
    Nd10,
    Nd20,
    Nd30,
    Nd40,
    Nd50,
}

impl GcalFilter {
    pub const fn tag(self) -> &'static str {
        match self {
            GcalFilter::None => "none",
            GcalFilter::Gmos => "gmos",
            GcalFilter::Nir => "nir",
            GcalFilter::Nd10 => "nd10",
            GcalFilter::Nd20 => "nd20",
            GcalFilter::Nd30 => "nd30",
            GcalFilter::Nd40 => "nd40",
            GcalFilter::Nd50 => "nd50",
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GcalDiffuser {
    Ir,
    Visible,
}

impl GcalDiffuser {
    pub const fn tag(self) -> &'static str {
        match self {
            GcalDiffuser::Ir => "ir",
            GcalDiffuser::Visible => "visible",
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GcalShutter {
    Open,
    Closed,
}

impl GcalShutter {
    pub const fn tag(self) -> &'static str {
        match self {
            GcalShutter::Open => "open",
            GcalShutter::Closed => "closed",
        }
    }
}

/// Complete GCAL unit state for one calibration exposure.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GcalConfig {
    pub lamp: GcalLamp,
    pub filter: GcalFilter,
    pub diffuser: GcalDiffuser,
    pub shutter: GcalShutter,
}

impl GcalConfig {
    /// `true` when the lamp selection is an arc.
    pub fn is_arc(&self) -> bool {
        matches!(self.lamp, GcalLamp::Arcs(_))
    }

    /// `true` when the lamp selection is a continuum (flat) lamp.
    pub fn is_flat(&self) -> bool {
        matches!(self.lamp, GcalLamp::Continuum(_))
    }
}

impl HashBytes for GcalConfig {
    fn absorb(&self, d: &mut Digest) {
        match &self.lamp {
            GcalLamp::Continuum(c) => {
                d.absorb_str(c.tag());
            }
            GcalLamp::Arcs(arcs) => {
                for a in arcs {
                    d.absorb_str(a.tag());
                }
            }
        }
        d.absorb_str(self.filter.tag());
        d.absorb_str(self.diffuser.tag());
        d.absorb_str(self.shutter.tag());
    }
}

/// The two kinds of smart calibration placeholder.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SmartGcalType {
    Arc,
    Flat,
}

impl SmartGcalType {
    pub const fn tag(self) -> &'static str {
        match self {
            SmartGcalType::Arc => "arc",
            SmartGcalType::Flat => "flat",
        }
    }
}

// ============================================================================
// Expansion
// ============================================================================

/// One concrete calibration resolved from the table: the GCAL state plus
/// the exposure time it requires.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GcalEntry {
    pub gcal: GcalConfig,
    pub exposure: TimeSpan,
}

/// Smart-calibration lookup failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SmartGcalError {
    #[error("Could not generate a sequence, missing Smart GCAL mapping: {key}")]
    MissingMapping { key: String },
}

/// Instrument configurations that can be keyed into a smart-gcal table.
pub trait SmartGcalInstrument: Sized {
    /// Lookup key derived from the configuration fields that select a
    /// calibration (disperser, filter, aperture, binning, ...).
    type Key: Eq + Hash + Clone + fmt::Display;

    fn gcal_key(&self, kind: SmartGcalType) -> Self::Key;

    /// Wavelength the configuration observes at, when it narrows the
    /// table row selection.
    fn gcal_wavelength(&self) -> Option<Wavelength>;

    /// This configuration adjusted for taking the given calibration:
    /// exposure set from the entry, along with any exposure-derived fields.
    fn for_calibration(&self, entry: &GcalEntry) -> Self;
}

/// Maps abstract smart-calibration placeholders to concrete steps.
pub trait SmartGcalExpander<D> {
    /// Expand one step. Non-placeholder steps pass through unchanged as a
    /// singleton; placeholders resolve to one or more concrete `Gcal`
    /// steps. The result is never empty.
    fn expand_step(&mut self, step: &ProtoStep<D>) -> Result<Vec<ProtoStep<D>>, SmartGcalError>;

    /// Expand every step of an atom, preserving order and description.
    fn expand_atom(
        &mut self,
        atom: &ProtoAtom<ProtoStep<D>>,
    ) -> Result<ProtoAtom<ProtoStep<D>>, SmartGcalError> {
        let mut steps = Vec::with_capacity(atom.len());
        for step in atom.steps() {
            steps.extend(self.expand_step(step)?);
        }
        Ok(atom.with_steps(steps))
    }
}

/// Expand a whole atom stream. A lookup failure surfaces as an `Err`
/// element; the stream continues so later atoms can still be inspected.
pub fn expand_sequence<'a, D, E, I>(
    expander: &'a mut E,
    atoms: I,
) -> impl Iterator<Item = Result<ProtoAtom<ProtoStep<D>>, SmartGcalError>> + 'a
where
    E: SmartGcalExpander<D>,
    I: IntoIterator<Item = ProtoAtom<ProtoStep<D>>> + 'a,
{
    atoms.into_iter().map(move |atom| expander.expand_atom(&atom))
}

// ============================================================================
// Table-backed expander
// ============================================================================

/// One table row: entries valid over an optional wavelength coverage.
#[derive(Clone, Debug)]
pub struct GcalRow {
    /// Inclusive wavelength range the row applies to; `None` matches any.
    pub coverage: Option<(Wavelength, Wavelength)>,
    pub entries: Vec<GcalEntry>,
}

impl GcalRow {
    fn covers(&self, wavelength: Option<Wavelength>) -> bool {
        match (self.coverage, wavelength) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some((lo, hi)), Some(w)) => lo <= w && w <= hi,
        }
    }
}

/// Reference [`SmartGcalExpander`] backed by an in-memory table, with a
/// per-key memo of resolved entries.
pub struct TableExpander<D: SmartGcalInstrument> {
    rows: HashMap<D::Key, Vec<GcalRow>>,
    memo: HashMap<(D::Key, Option<Wavelength>), Vec<GcalEntry>>,
}

impl<D: SmartGcalInstrument> TableExpander<D> {
    pub fn new() -> Self {
        TableExpander { rows: HashMap::new(), memo: HashMap::new() }
    }

    /// Add a row for a key; later rows for the same key are consulted in
    /// insertion order.
    pub fn insert(&mut self, key: D::Key, row: GcalRow) -> &mut Self {
        self.rows.entry(key).or_default().push(row);
        self
    }

    fn resolve(
        &mut self,
        key: D::Key,
        wavelength: Option<Wavelength>,
    ) -> Result<Vec<GcalEntry>, SmartGcalError> {
        let memo_key = (key.clone(), wavelength);
        if let Some(entries) = self.memo.get(&memo_key) {
            return Ok(entries.clone());
        }
        let entries = self
            .rows
            .get(&key)
            .and_then(|rows| rows.iter().find(|r| r.covers(wavelength)))
            .map(|r| r.entries.clone())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| SmartGcalError::MissingMapping { key: key.to_string() })?;
        self.memo.insert(memo_key, entries.clone());
        Ok(entries)
    }
}

impl<D: SmartGcalInstrument> Default for TableExpander<D> {
    fn default() -> Self {
        TableExpander::new()
    }
}

impl<D: SmartGcalInstrument + Clone> SmartGcalExpander<D> for TableExpander<D> {
    fn expand_step(&mut self, step: &ProtoStep<D>) -> Result<Vec<ProtoStep<D>>, SmartGcalError> {
        let kind = match step.step_config {
            StepConfig::SmartGcal(kind) => kind,
            _ => return Ok(vec![step.clone()]),
        };
        let key = step.instrument.gcal_key(kind);
        let wavelength = step.instrument.gcal_wavelength();
        let entries = self.resolve(key, wavelength)?;
        Ok(entries
            .iter()
            .map(|entry| ProtoStep {
                instrument: step.instrument.for_calibration(entry),
                step_config: StepConfig::Gcal(entry.gcal.clone()),
                telescope: step.telescope.clone(),
                observe_class: step.observe_class,
                breakpoint: step.breakpoint,
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{Breakpoint, ObserveClass, TelescopeConfig};
    use crate::units::Offset;

    // A one-field instrument config: the key is the field itself.
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    struct Toy(u8);

    impl SmartGcalInstrument for Toy {
        type Key = u8;

        fn gcal_key(&self, _kind: SmartGcalType) -> u8 {
            self.0
        }

        fn gcal_wavelength(&self) -> Option<Wavelength> {
            None
        }

        fn for_calibration(&self, _entry: &GcalEntry) -> Self {
            self.clone()
        }
    }

    fn placeholder(kind: SmartGcalType) -> ProtoStep<Toy> {
        ProtoStep {
            instrument: Toy(1),
            step_config: StepConfig::SmartGcal(kind),
            telescope: TelescopeConfig::stationary(Offset::ZERO),
            observe_class: ObserveClass::NightCal,
            breakpoint: Breakpoint::Disabled,
        }
    }

    fn flat_entry() -> GcalEntry {
        GcalEntry {
            gcal: GcalConfig {
                lamp: GcalLamp::Continuum(GcalContinuum::QuartzHalogen100W),
                filter: GcalFilter::Gmos,
                diffuser: GcalDiffuser::Visible,
                shutter: GcalShutter::Open,
            },
            exposure: TimeSpan::from_seconds(2),
        }
    }

    #[test]
    fn placeholder_expands_to_concrete_gcal() {
        let mut x = TableExpander::<Toy>::new();
        x.insert(1, GcalRow { coverage: None, entries: vec![flat_entry()] });
        let out = x.expand_step(&placeholder(SmartGcalType::Flat)).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0].step_config, StepConfig::Gcal(g) if g.is_flat()));
    }

    #[test]
    fn missing_mapping_reports_the_key() {
        let mut x = TableExpander::<Toy>::new();
        let err = x.expand_step(&placeholder(SmartGcalType::Arc)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not generate a sequence, missing Smart GCAL mapping: 1",
        );
    }

    #[test]
    fn non_placeholder_steps_pass_through() {
        let mut x = TableExpander::<Toy>::new();
        let mut step = placeholder(SmartGcalType::Flat);
        step.step_config = StepConfig::Science;
        assert_eq!(x.expand_step(&step).unwrap(), vec![step]);
    }

    #[test]
    fn expansion_preserves_atom_order() {
        let mut x = TableExpander::<Toy>::new();
        x.insert(1, GcalRow { coverage: None, entries: vec![flat_entry(), flat_entry()] });
        let mut science = placeholder(SmartGcalType::Flat);
        science.step_config = StepConfig::Science;
        let atom = ProtoAtom::new(
            Some("cals".into()),
            vec![placeholder(SmartGcalType::Flat), science.clone()],
        )
        .unwrap();
        let out = x.expand_atom(&atom).unwrap();
        assert_eq!(out.len(), 3);
        assert!(matches!(out.steps()[0].step_config, StepConfig::Gcal(_)));
        assert!(matches!(out.steps()[2].step_config, StepConfig::Science));
    }
}
