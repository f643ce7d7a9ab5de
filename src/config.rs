//! Instrument configuration
//!
//! Static observing-mode configuration (chosen once per observation) and
//! per-step dynamic configuration for the three supported instruments:
//! Flamingos-2 long-slit and GMOS North/South long-slit. The GMOS types are
//! generic in grating/filter/FPU so both sites share one implementation.
//!
//! Derived defaults live here with the fields they derive from: the
//! Flamingos-2 read mode follows the exposure time unless overridden, and
//! the GMOS spectral binning follows the slit width at a fixed sampling of
//! two bins per slit-width.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::gcal::{GcalEntry, SmartGcalInstrument, SmartGcalType};
use crate::hashing::{Digest, HashBytes};
use crate::units::{Adjustment, Offset, OffsetQ, TimeSpan, Wavelength, WavelengthDither};

/// Acquisition exposure time used until the ITC can provide one.
pub const STANDIN_ACQUISITION_TIME: TimeSpan = TimeSpan::from_seconds(10);

/// ITC result driving a science sequence.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrationTime {
    pub exposure_time: TimeSpan,
    /// Requested number of exposures, at least one.
    pub exposure_count: u32,
}

impl HashBytes for IntegrationTime {
    fn absorb(&self, d: &mut Digest) {
        self.exposure_time.absorb(d);
        d.absorb_i32(self.exposure_count as i32);
    }
}

/// Dynamic configurations expose their exposure time to the overhead model.
pub trait Exposure {
    fn exposure(&self) -> TimeSpan;
}

macro_rules! hash_via_tag {
    ($($t:ty),+ $(,)?) => {
        $(impl HashBytes for $t {
            fn absorb(&self, d: &mut Digest) {
                d.absorb_str(self.tag());
            }
        })+
    };
}

// ============================================================================
// Flamingos-2
// ============================================================================

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Flamingos2Disperser {
    R1200JH,
    R1200HK,
    R3000,
}

impl Flamingos2Disperser {
    pub const fn tag(self) -> &'static str {
        match self {
            Flamingos2Disperser::R1200JH => "R1200JH",
            Flamingos2Disperser::R1200HK => "R1200HK",
            Flamingos2Disperser::R3000 => "R3000",
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Flamingos2Filter {
    Y,
    J,
    H,
    JH,
    HK,
    KLong,
}

impl Flamingos2Filter {
    pub const fn tag(self) -> &'static str {
        match self {
            Flamingos2Filter::Y => "Y",
            Flamingos2Filter::J => "J",
            Flamingos2Filter::H => "H",
            Flamingos2Filter::JH => "JH",
            Flamingos2Filter::HK => "HK",
            Flamingos2Filter::KLong => "K_long",
        }
    }
}

/// Long-slit focal-plane units, named by slit width in detector pixels.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Flamingos2Fpu {
    LongSlit1,
    LongSlit2,
    LongSlit3,
    LongSlit4,
    LongSlit6,
    LongSlit8,
}

impl Flamingos2Fpu {
    pub const fn tag(self) -> &'static str {
        match self {
            Flamingos2Fpu::LongSlit1 => "long_slit_1",
            Flamingos2Fpu::LongSlit2 => "long_slit_2",
            Flamingos2Fpu::LongSlit3 => "long_slit_3",
            Flamingos2Fpu::LongSlit4 => "long_slit_4",
            Flamingos2Fpu::LongSlit6 => "long_slit_6",
            Flamingos2Fpu::LongSlit8 => "long_slit_8",
        }
    }
}

/// Detector read mode. Unless overridden it follows the exposure time:
/// long exposures can afford the low-noise multi-read pattern.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Flamingos2ReadMode {
    Bright,
    Medium,
    Faint,
}

impl Flamingos2ReadMode {
    pub const fn tag(self) -> &'static str {
        match self {
            Flamingos2ReadMode::Bright => "bright",
            Flamingos2ReadMode::Medium => "medium",
            Flamingos2ReadMode::Faint => "faint",
        }
    }

    /// Default read mode for an exposure time.
    pub fn for_exposure(exposure: TimeSpan) -> Self {
        if exposure >= TimeSpan::from_seconds(85) {
            Flamingos2ReadMode::Faint
        } else if exposure >= TimeSpan::from_seconds(21) {
            Flamingos2ReadMode::Medium
        } else {
            Flamingos2ReadMode::Bright
        }
    }

    /// Default read count for the mode.
    pub const fn reads(self) -> Flamingos2Reads {
        match self {
            Flamingos2ReadMode::Bright => Flamingos2Reads::Reads1,
            Flamingos2ReadMode::Medium => Flamingos2Reads::Reads4,
            Flamingos2ReadMode::Faint => Flamingos2Reads::Reads8,
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Flamingos2Reads {
    Reads1,
    Reads4,
    Reads8,
}

impl Flamingos2Reads {
    pub const fn tag(self) -> &'static str {
        match self {
            Flamingos2Reads::Reads1 => "reads_1",
            Flamingos2Reads::Reads4 => "reads_4",
            Flamingos2Reads::Reads8 => "reads_8",
        }
    }

    pub const fn count(self) -> u32 {
        match self {
            Flamingos2Reads::Reads1 => 1,
            Flamingos2Reads::Reads4 => 4,
            Flamingos2Reads::Reads8 => 8,
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Flamingos2Decker {
    Imaging,
    LongSlit,
    Mos,
}

impl Flamingos2Decker {
    pub const fn tag(self) -> &'static str {
        match self {
            Flamingos2Decker::Imaging => "imaging",
            Flamingos2Decker::LongSlit => "long_slit",
            Flamingos2Decker::Mos => "mos",
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Flamingos2ReadoutMode {
    Science,
    Engineering,
}

impl Flamingos2ReadoutMode {
    pub const fn tag(self) -> &'static str {
        match self {
            Flamingos2ReadoutMode::Science => "science",
            Flamingos2ReadoutMode::Engineering => "engineering",
        }
    }
}

hash_via_tag!(
    Flamingos2Disperser,
    Flamingos2Filter,
    Flamingos2Fpu,
    Flamingos2ReadMode,
    Flamingos2Reads,
    Flamingos2Decker,
    Flamingos2ReadoutMode,
);

/// Flamingos-2 long-slit observing mode.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flamingos2Config {
    pub disperser: Flamingos2Disperser,
    pub filter: Flamingos2Filter,
    pub fpu: Flamingos2Fpu,
    pub explicit_read_mode: Option<Flamingos2ReadMode>,
    pub explicit_reads: Option<Flamingos2Reads>,
    pub explicit_decker: Option<Flamingos2Decker>,
    pub explicit_readout_mode: Option<Flamingos2ReadoutMode>,
    /// Spatial offsets of the nodding pattern, in ABBA order.
    pub offsets: Vec<Offset>,
}

impl Flamingos2Config {
    pub fn read_mode_for(&self, exposure: TimeSpan) -> Flamingos2ReadMode {
        self.explicit_read_mode.unwrap_or_else(|| Flamingos2ReadMode::for_exposure(exposure))
    }

    pub fn reads_for(&self, read_mode: Flamingos2ReadMode) -> Flamingos2Reads {
        self.explicit_reads.unwrap_or_else(|| read_mode.reads())
    }

    pub fn decker(&self) -> Flamingos2Decker {
        self.explicit_decker.unwrap_or(Flamingos2Decker::LongSlit)
    }

    pub fn readout_mode(&self) -> Flamingos2ReadoutMode {
        self.explicit_readout_mode.unwrap_or(Flamingos2ReadoutMode::Science)
    }

    /// The science dynamic configuration for one exposure time.
    pub fn science_dynamic(&self, exposure: TimeSpan) -> Flamingos2Dynamic {
        let read_mode = self.read_mode_for(exposure);
        Flamingos2Dynamic {
            exposure,
            disperser: Some(self.disperser),
            filter: self.filter,
            read_mode,
            reads: self.reads_for(read_mode),
            decker: self.decker(),
            readout_mode: self.readout_mode(),
            fpu: Some(self.fpu),
        }
    }
}

impl HashBytes for Flamingos2Config {
    fn absorb(&self, d: &mut Digest) {
        self.disperser.absorb(d);
        self.filter.absorb(d);
        self.fpu.absorb(d);
        self.explicit_read_mode.absorb(d);
        self.explicit_reads.absorb(d);
        self.explicit_decker.absorb(d);
        self.explicit_readout_mode.absorb(d);
        self.offsets.absorb(d);
    }
}

/// Flamingos-2 per-step instrument state.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flamingos2Dynamic {
    pub exposure: TimeSpan,
    /// `None` for undispersed imaging (acquisition).
    pub disperser: Option<Flamingos2Disperser>,
    pub filter: Flamingos2Filter,
    pub read_mode: Flamingos2ReadMode,
    pub reads: Flamingos2Reads,
    pub decker: Flamingos2Decker,
    pub readout_mode: Flamingos2ReadoutMode,
    /// `None` when the slit is out of the beam (acquisition imaging).
    pub fpu: Option<Flamingos2Fpu>,
}

impl Exposure for Flamingos2Dynamic {
    fn exposure(&self) -> TimeSpan {
        self.exposure
    }
}

/// Smart-gcal lookup key for Flamingos-2.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Flamingos2GcalKey {
    pub kind: SmartGcalType,
    pub disperser: Option<Flamingos2Disperser>,
    pub filter: Flamingos2Filter,
    pub fpu: Option<Flamingos2Fpu>,
}

impl fmt::Display for Flamingos2GcalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Flamingos2 {} ({}, {}, {})",
            self.kind.tag(),
            self.disperser.map_or("none", Flamingos2Disperser::tag),
            self.filter.tag(),
            self.fpu.map_or("none", Flamingos2Fpu::tag),
        )
    }
}

impl SmartGcalInstrument for Flamingos2Dynamic {
    type Key = Flamingos2GcalKey;

    fn gcal_key(&self, kind: SmartGcalType) -> Flamingos2GcalKey {
        Flamingos2GcalKey {
            kind,
            disperser: self.disperser,
            filter: self.filter,
            fpu: self.fpu,
        }
    }

    fn gcal_wavelength(&self) -> Option<Wavelength> {
        None
    }

    // The read pattern must match the calibration exposure, not the science
    // exposure the placeholder inherited.
    fn for_calibration(&self, entry: &GcalEntry) -> Self {
        let read_mode = Flamingos2ReadMode::for_exposure(entry.exposure);
        Flamingos2Dynamic {
            exposure: entry.exposure,
            read_mode,
            reads: read_mode.reads(),
            ..self.clone()
        }
    }
}

// ============================================================================
// GMOS — site-generic pieces
// ============================================================================

/// GMOS unbinned pixel scale, microarcseconds per pixel.
const GMOS_PIXEL_SCALE_UAS: i64 = 80_700;

/// Slit sampling factor: bins per slit width when deriving spectral binning.
pub const GMOS_SAMPLING: i64 = 2;

pub trait GmosGrating: Copy + Eq + Hash + fmt::Debug {
    fn tag(&self) -> &'static str;
}

pub trait GmosFilter: Copy + Eq + Hash + fmt::Debug {
    fn tag(&self) -> &'static str;
}

pub trait GmosFpu: Copy + Eq + Hash + fmt::Debug {
    fn tag(&self) -> &'static str;
    /// Slit width in microarcseconds.
    fn slit_width_uas(&self) -> i64;
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GmosBinning {
    One,
    Two,
    Four,
}

impl GmosBinning {
    pub const fn tag(self) -> &'static str {
        match self {
            GmosBinning::One => "one",
            GmosBinning::Two => "two",
            GmosBinning::Four => "four",
        }
    }

    pub const fn count(self) -> u32 {
        match self {
            GmosBinning::One => 1,
            GmosBinning::Two => 2,
            GmosBinning::Four => 4,
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GmosAmpReadMode {
    Slow,
    Fast,
}

impl GmosAmpReadMode {
    pub const fn tag(self) -> &'static str {
        match self {
            GmosAmpReadMode::Slow => "slow",
            GmosAmpReadMode::Fast => "fast",
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GmosAmpGain {
    Low,
    High,
}

impl GmosAmpGain {
    pub const fn tag(self) -> &'static str {
        match self {
            GmosAmpGain::Low => "low",
            GmosAmpGain::High => "high",
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GmosRoi {
    FullFrame,
    Ccd2,
    CentralSpectrum,
    CentralStamp,
}

impl GmosRoi {
    pub const fn tag(self) -> &'static str {
        match self {
            GmosRoi::FullFrame => "full_frame",
            GmosRoi::Ccd2 => "ccd2",
            GmosRoi::CentralSpectrum => "central_spectrum",
            GmosRoi::CentralStamp => "central_stamp",
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GmosGratingOrder {
    Zero,
    One,
    Two,
}

impl GmosGratingOrder {
    pub const fn tag(self) -> &'static str {
        match self {
            GmosGratingOrder::Zero => "zero",
            GmosGratingOrder::One => "one",
            GmosGratingOrder::Two => "two",
        }
    }
}

hash_via_tag!(GmosBinning, GmosAmpReadMode, GmosAmpGain, GmosRoi, GmosGratingOrder);

/// CCD readout configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GmosCcdMode {
    pub x_bin: GmosBinning,
    pub y_bin: GmosBinning,
    pub amp_read_mode: GmosAmpReadMode,
    pub amp_gain: GmosAmpGain,
}

impl HashBytes for GmosCcdMode {
    fn absorb(&self, d: &mut Digest) {
        self.x_bin.absorb(d);
        self.y_bin.absorb(d);
        self.amp_read_mode.absorb(d);
        self.amp_gain.absorb(d);
    }
}

/// In-beam grating state: which grating, at which order and wavelength.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GmosGratingConfig<G> {
    pub grating: G,
    pub order: GmosGratingOrder,
    pub wavelength: Wavelength,
}

/// GMOS per-step instrument state, shared by both sites.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GmosDynamic<G, F, U> {
    pub exposure: TimeSpan,
    pub readout: GmosCcdMode,
    pub roi: GmosRoi,
    pub grating: Option<GmosGratingConfig<G>>,
    pub filter: Option<F>,
    pub fpu: Option<U>,
}

impl<G, F, U> Exposure for GmosDynamic<G, F, U> {
    fn exposure(&self) -> TimeSpan {
        self.exposure
    }
}

/// Smart-gcal lookup key for GMOS, shared by both sites.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GmosGcalKey<G, F, U> {
    pub kind: SmartGcalType,
    pub grating: Option<G>,
    pub filter: Option<F>,
    pub fpu: Option<U>,
    pub x_bin: GmosBinning,
    pub y_bin: GmosBinning,
    pub amp_gain: GmosAmpGain,
}

impl<G: GmosGrating, F: GmosFilter, U: GmosFpu> fmt::Display for GmosGcalKey<G, F, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GMOS {} ({}, {}, {}, {}x{}, {})",
            self.kind.tag(),
            self.grating.map_or("mirror", |g| g.tag()),
            self.filter.map_or("none", |x| x.tag()),
            self.fpu.map_or("none", |u| u.tag()),
            self.x_bin.count(),
            self.y_bin.count(),
            self.amp_gain.tag(),
        )
    }
}

impl<G, F, U> SmartGcalInstrument for GmosDynamic<G, F, U>
where
    G: GmosGrating,
    F: GmosFilter,
    U: GmosFpu,
{
    type Key = GmosGcalKey<G, F, U>;

    fn gcal_key(&self, kind: SmartGcalType) -> Self::Key {
        GmosGcalKey {
            kind,
            grating: self.grating.map(|g| g.grating),
            filter: self.filter,
            fpu: self.fpu,
            x_bin: self.readout.x_bin,
            y_bin: self.readout.y_bin,
            amp_gain: self.readout.amp_gain,
        }
    }

    fn gcal_wavelength(&self) -> Option<Wavelength> {
        self.grating.map(|g| g.wavelength)
    }

    fn for_calibration(&self, entry: &GcalEntry) -> Self {
        GmosDynamic { exposure: entry.exposure, ..self.clone() }
    }
}

/// GMOS long-slit observing mode, shared by both sites.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GmosLongSlitConfig<G, F, U> {
    pub grating: G,
    pub filter: Option<F>,
    pub fpu: U,
    pub central_wavelength: Wavelength,
    pub explicit_x_bin: Option<GmosBinning>,
    pub explicit_y_bin: Option<GmosBinning>,
    pub amp_read_mode: GmosAmpReadMode,
    pub amp_gain: GmosAmpGain,
    pub roi: GmosRoi,
    pub wavelength_dithers: Vec<WavelengthDither>,
    pub spatial_offsets: Vec<OffsetQ>,
}

impl<G: GmosGrating, F: GmosFilter, U: GmosFpu> GmosLongSlitConfig<G, F, U> {
    /// Spectral binning: explicit, or the largest binning that still gives
    /// [`GMOS_SAMPLING`] bins across the slit.
    pub fn x_bin(&self) -> GmosBinning {
        self.explicit_x_bin.unwrap_or_else(|| {
            let effective = self.fpu.slit_width_uas() / GMOS_SAMPLING;
            if effective >= 4 * GMOS_PIXEL_SCALE_UAS {
                GmosBinning::Four
            } else if effective >= 2 * GMOS_PIXEL_SCALE_UAS {
                GmosBinning::Two
            } else {
                GmosBinning::One
            }
        })
    }

    /// Spatial binning defaults to two.
    pub fn y_bin(&self) -> GmosBinning {
        self.explicit_y_bin.unwrap_or(GmosBinning::Two)
    }

    pub fn ccd_mode(&self) -> GmosCcdMode {
        GmosCcdMode {
            x_bin: self.x_bin(),
            y_bin: self.y_bin(),
            amp_read_mode: self.amp_read_mode,
            amp_gain: self.amp_gain,
        }
    }

    /// The wavelength-block adjustment cycle for this mode.
    pub fn adjustments(&self) -> Vec<Adjustment> {
        Adjustment::cycle(&self.wavelength_dithers, &self.spatial_offsets)
    }

    /// Science dynamic configuration at one adjustment's dithered
    /// wavelength; `None` when the dither underflows the wavelength scale.
    pub fn science_dynamic(
        &self,
        exposure: TimeSpan,
        dither: WavelengthDither,
    ) -> Option<GmosDynamic<G, F, U>> {
        let wavelength = self.central_wavelength.offset_by(dither)?;
        Some(GmosDynamic {
            exposure,
            readout: self.ccd_mode(),
            roi: self.roi,
            grating: Some(GmosGratingConfig {
                grating: self.grating,
                order: GmosGratingOrder::One,
                wavelength,
            }),
            filter: self.filter,
            fpu: Some(self.fpu),
        })
    }
}

impl<G: GmosGrating, F: GmosFilter, U: GmosFpu> HashBytes for GmosLongSlitConfig<G, F, U> {
    fn absorb(&self, d: &mut Digest) {
        d.absorb_str(self.grating.tag());
        if let Some(f) = self.filter {
            d.absorb_str(f.tag());
        }
        d.absorb_str(self.fpu.tag());
        self.central_wavelength.absorb(d);
        self.explicit_x_bin.absorb(d);
        self.explicit_y_bin.absorb(d);
        self.amp_read_mode.absorb(d);
        self.amp_gain.absorb(d);
        self.roi.absorb(d);
        self.wavelength_dithers.absorb(d);
        self.spatial_offsets.absorb(d);
    }
}

// ============================================================================
// GMOS North
// ============================================================================

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GmosNorthGrating {
    B1200G5301,
    R831G5302,
    R600G5304,
    R400G5305,
    R150G5308,
}

impl GmosGrating for GmosNorthGrating {
    fn tag(&self) -> &'static str {
        match self {
            GmosNorthGrating::B1200G5301 => "B1200_G5301",
            GmosNorthGrating::R831G5302 => "R831_G5302",
            GmosNorthGrating::R600G5304 => "R600_G5304",
            GmosNorthGrating::R400G5305 => "R400_G5305",
            GmosNorthGrating::R150G5308 => "R150_G5308",
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GmosNorthFilter {
    GPrime,
    RPrime,
    IPrime,
    ZPrime,
    Gg455,
    Og515,
}

impl GmosFilter for GmosNorthFilter {
    fn tag(&self) -> &'static str {
        match self {
            GmosNorthFilter::GPrime => "g_prime",
            GmosNorthFilter::RPrime => "r_prime",
            GmosNorthFilter::IPrime => "i_prime",
            GmosNorthFilter::ZPrime => "z_prime",
            GmosNorthFilter::Gg455 => "GG455",
            GmosNorthFilter::Og515 => "OG515",
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GmosNorthFpu {
    LongSlit025,
    LongSlit050,
    LongSlit075,
    LongSlit100,
    LongSlit150,
    LongSlit200,
    LongSlit500,
}

impl GmosFpu for GmosNorthFpu {
    fn tag(&self) -> &'static str {
        match self {
            GmosNorthFpu::LongSlit025 => "long_slit_0_25",
            GmosNorthFpu::LongSlit050 => "long_slit_0_50",
            GmosNorthFpu::LongSlit075 => "long_slit_0_75",
            GmosNorthFpu::LongSlit100 => "long_slit_1_00",
            GmosNorthFpu::LongSlit150 => "long_slit_1_50",
            GmosNorthFpu::LongSlit200 => "long_slit_2_00",
            GmosNorthFpu::LongSlit500 => "long_slit_5_00",
        }
    }

    fn slit_width_uas(&self) -> i64 {
        match self {
            GmosNorthFpu::LongSlit025 => 250_000,
            GmosNorthFpu::LongSlit050 => 500_000,
            GmosNorthFpu::LongSlit075 => 750_000,
            GmosNorthFpu::LongSlit100 => 1_000_000,
            GmosNorthFpu::LongSlit150 => 1_500_000,
            GmosNorthFpu::LongSlit200 => 2_000_000,
            GmosNorthFpu::LongSlit500 => 5_000_000,
        }
    }
}

pub type GmosNorthDynamic = GmosDynamic<GmosNorthGrating, GmosNorthFilter, GmosNorthFpu>;
pub type GmosNorthConfig = GmosLongSlitConfig<GmosNorthGrating, GmosNorthFilter, GmosNorthFpu>;

// ============================================================================
// GMOS South
// ============================================================================

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GmosSouthGrating {
    B1200G5321,
    R831G5322,
    R600G5324,
    R400G5325,
    R150G5326,
}

impl GmosGrating for GmosSouthGrating {
    fn tag(&self) -> &'static str {
        match self {
            GmosSouthGrating::B1200G5321 => "B1200_G5321",
            GmosSouthGrating::R831G5322 => "R831_G5322",
            GmosSouthGrating::R600G5324 => "R600_G5324",
            GmosSouthGrating::R400G5325 => "R400_G5325",
            GmosSouthGrating::R150G5326 => "R150_G5326",
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GmosSouthFilter {
    GPrime,
    RPrime,
    IPrime,
    ZPrime,
    Gg455,
    Og515,
}

impl GmosFilter for GmosSouthFilter {
    fn tag(&self) -> &'static str {
        match self {
            GmosSouthFilter::GPrime => "g_prime",
            GmosSouthFilter::RPrime => "r_prime",
            GmosSouthFilter::IPrime => "i_prime",
            GmosSouthFilter::ZPrime => "z_prime",
            GmosSouthFilter::Gg455 => "GG455",
            GmosSouthFilter::Og515 => "OG515",
        }
    }
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GmosSouthFpu {
    LongSlit025,
    LongSlit050,
    LongSlit075,
    LongSlit100,
    LongSlit150,
    LongSlit200,
    LongSlit500,
}

impl GmosFpu for GmosSouthFpu {
    fn tag(&self) -> &'static str {
        match self {
            GmosSouthFpu::LongSlit025 => "long_slit_0_25",
            GmosSouthFpu::LongSlit050 => "long_slit_0_50",
            GmosSouthFpu::LongSlit075 => "long_slit_0_75",
            GmosSouthFpu::LongSlit100 => "long_slit_1_00",
            GmosSouthFpu::LongSlit150 => "long_slit_1_50",
            GmosSouthFpu::LongSlit200 => "long_slit_2_00",
            GmosSouthFpu::LongSlit500 => "long_slit_5_00",
        }
    }

    fn slit_width_uas(&self) -> i64 {
        match self {
            GmosSouthFpu::LongSlit025 => 250_000,
            GmosSouthFpu::LongSlit050 => 500_000,
            GmosSouthFpu::LongSlit075 => 750_000,
            GmosSouthFpu::LongSlit100 => 1_000_000,
            GmosSouthFpu::LongSlit150 => 1_500_000,
            GmosSouthFpu::LongSlit200 => 2_000_000,
            GmosSouthFpu::LongSlit500 => 5_000_000,
        }
    }
}

pub type GmosSouthDynamic = GmosDynamic<GmosSouthGrating, GmosSouthFilter, GmosSouthFpu>;
pub type GmosSouthConfig = GmosLongSlitConfig<GmosSouthGrating, GmosSouthFilter, GmosSouthFpu>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::fingerprint;

    #[test]
    fn f2_read_mode_follows_exposure_time() {
        assert_eq!(
            Flamingos2ReadMode::for_exposure(TimeSpan::from_seconds(5)),
            Flamingos2ReadMode::Bright,
        );
        assert_eq!(
            Flamingos2ReadMode::for_exposure(TimeSpan::from_seconds(21)),
            Flamingos2ReadMode::Medium,
        );
        assert_eq!(
            Flamingos2ReadMode::for_exposure(TimeSpan::from_seconds(84)),
            Flamingos2ReadMode::Medium,
        );
        assert_eq!(
            Flamingos2ReadMode::for_exposure(TimeSpan::from_seconds(85)),
            Flamingos2ReadMode::Faint,
        );
    }

    #[test]
    fn f2_explicit_read_mode_wins() {
        let mut config = f2_config();
        config.explicit_read_mode = Some(Flamingos2ReadMode::Bright);
        let dynamic = config.science_dynamic(TimeSpan::from_seconds(300));
        assert_eq!(dynamic.read_mode, Flamingos2ReadMode::Bright);
        assert_eq!(dynamic.reads, Flamingos2Reads::Reads1);
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
            offsets: vec![],
        }
    }

    fn gn_config(fpu: GmosNorthFpu) -> GmosNorthConfig {
        GmosLongSlitConfig {
            grating: GmosNorthGrating::R831G5302,
            filter: None,
            fpu,
            central_wavelength: Wavelength::from_nm(750).unwrap(),
            explicit_x_bin: None,
            explicit_y_bin: None,
            amp_read_mode: GmosAmpReadMode::Slow,
            amp_gain: GmosAmpGain::Low,
            roi: GmosRoi::FullFrame,
            wavelength_dithers: vec![],
            spatial_offsets: vec![],
        }
    }

    #[test]
    fn gmos_x_bin_follows_slit_width() {
        // 0.25″ slit: 0.125″ effective, under two pixels -> unbinned.
        assert_eq!(gn_config(GmosNorthFpu::LongSlit025).x_bin(), GmosBinning::One);
        // 0.5″ slit: 0.25″ effective, two to four pixels -> 2x.
        assert_eq!(gn_config(GmosNorthFpu::LongSlit050).x_bin(), GmosBinning::Two);
        // 1.0″ slit: 0.5″ effective, at least four pixels -> 4x.
        assert_eq!(gn_config(GmosNorthFpu::LongSlit100).x_bin(), GmosBinning::Four);
    }

    #[test]
    fn gmos_science_dynamic_carries_the_dithered_wavelength() {
        let config = gn_config(GmosNorthFpu::LongSlit050);
        let d = config
            .science_dynamic(TimeSpan::from_seconds(30), WavelengthDither::from_nm(5))
            .unwrap();
        assert_eq!(d.grating.unwrap().wavelength.as_pm(), 755_000);
    }

    #[test]
    fn config_fingerprints_differ_on_material_fields() {
        let a = gn_config(GmosNorthFpu::LongSlit050);
        let mut b = a.clone();
        b.central_wavelength = Wavelength::from_nm(751).unwrap();
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
