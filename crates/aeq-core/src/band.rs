//! Band model
//!
//! Every value that reaches the designer passes through here first, so the
//! ranges below are enforced at construction (and on deserialization) and
//! never re-checked downstream.

use serde::{Deserialize, Serialize};

use crate::{AeqError, AeqResult, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};

pub const MIN_GAIN_DB: f64 = -20.0;
pub const MAX_GAIN_DB: f64 = 20.0;
pub const MIN_Q: f64 = 0.1;
pub const MAX_Q: f64 = 10.0;

pub const DEFAULT_FREQUENCY_HZ: f64 = 1000.0;
pub const DEFAULT_GAIN_DB: f64 = 0.0;
pub const DEFAULT_Q: f64 = 1.0;

/// Maximum number of bands (and therefore cascade sections)
pub const MAX_BANDS: usize = 32;

/// ISO octave centres used by the 10-band graphic EQ
pub const GRAPHIC_FREQUENCIES: [f64; 10] = [
    31.0, 63.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Fixed Q of a graphic band (one octave bandwidth)
pub const GRAPHIC_Q: f64 = std::f64::consts::SQRT_2;

/// Replace non-finite input by the default, then clamp into range
#[inline]
fn sanitize(value: f64, default: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        default
    }
}

// ============================================================================
// FILTER SHAPE
// ============================================================================

/// Filter shape of a band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterShape {
    #[default]
    Bell,
    LowShelf,
    HighShelf,
    LowPass,
    HighPass,
}

impl FilterShape {
    pub const ALL: [FilterShape; 5] = [
        FilterShape::Bell,
        FilterShape::LowShelf,
        FilterShape::HighShelf,
        FilterShape::LowPass,
        FilterShape::HighPass,
    ];

    /// Pass filters have no gain parameter
    pub fn uses_gain(self) -> bool {
        match self {
            FilterShape::Bell | FilterShape::LowShelf | FilterShape::HighShelf => true,
            FilterShape::LowPass | FilterShape::HighPass => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterShape::Bell => "Bell",
            FilterShape::LowShelf => "Low Shelf",
            FilterShape::HighShelf => "High Shelf",
            FilterShape::LowPass => "Low Pass",
            FilterShape::HighPass => "High Pass",
        }
    }
}

// ============================================================================
// PARAMETRIC BAND
// ============================================================================

/// A single EQ band
///
/// Fields are private so that a `Band` is always in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "BandParams", into = "BandParams")]
pub struct Band {
    frequency: f64,
    gain_db: f64,
    q: f64,
    shape: FilterShape,
    enabled: bool,
}

/// Wire shape of a band; deserialization funnels through `Band::new`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BandParams {
    frequency: f64,
    #[serde(default)]
    gain_db: f64,
    #[serde(default = "default_q")]
    q: f64,
    #[serde(default)]
    shape: FilterShape,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_q() -> f64 {
    DEFAULT_Q
}

fn default_enabled() -> bool {
    true
}

impl From<BandParams> for Band {
    fn from(p: BandParams) -> Self {
        Band::new(p.shape, p.frequency, p.gain_db, p.q).with_enabled(p.enabled)
    }
}

impl From<Band> for BandParams {
    fn from(b: Band) -> Self {
        Self {
            frequency: b.frequency,
            gain_db: b.gain_db,
            q: b.q,
            shape: b.shape,
            enabled: b.enabled,
        }
    }
}

impl Default for Band {
    fn default() -> Self {
        Self::new(FilterShape::Bell, DEFAULT_FREQUENCY_HZ, DEFAULT_GAIN_DB, DEFAULT_Q)
    }
}

impl Band {
    /// Create an enabled band, clamping every parameter into range
    pub fn new(shape: FilterShape, frequency: f64, gain_db: f64, q: f64) -> Self {
        Self {
            frequency: sanitize(frequency, DEFAULT_FREQUENCY_HZ, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ),
            gain_db: sanitize(gain_db, DEFAULT_GAIN_DB, MIN_GAIN_DB, MAX_GAIN_DB),
            q: sanitize(q, DEFAULT_Q, MIN_Q, MAX_Q),
            shape,
            enabled: true,
        }
    }

    pub fn bell(frequency: f64, gain_db: f64, q: f64) -> Self {
        Self::new(FilterShape::Bell, frequency, gain_db, q)
    }

    pub fn low_shelf(frequency: f64, gain_db: f64, q: f64) -> Self {
        Self::new(FilterShape::LowShelf, frequency, gain_db, q)
    }

    pub fn high_shelf(frequency: f64, gain_db: f64, q: f64) -> Self {
        Self::new(FilterShape::HighShelf, frequency, gain_db, q)
    }

    pub fn low_pass(frequency: f64, q: f64) -> Self {
        Self::new(FilterShape::LowPass, frequency, 0.0, q)
    }

    pub fn high_pass(frequency: f64, q: f64) -> Self {
        Self::new(FilterShape::HighPass, frequency, 0.0, q)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[inline]
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    #[inline]
    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    #[inline]
    pub fn q(&self) -> f64 {
        self.q
    }

    #[inline]
    pub fn shape(&self) -> FilterShape {
        self.shape
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.frequency = sanitize(frequency, self.frequency, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ);
    }

    pub fn set_gain_db(&mut self, gain_db: f64) {
        self.gain_db = sanitize(gain_db, self.gain_db, MIN_GAIN_DB, MAX_GAIN_DB);
    }

    pub fn set_q(&mut self, q: f64) {
        self.q = sanitize(q, self.q, MIN_Q, MAX_Q);
    }

    pub fn set_shape(&mut self, shape: FilterShape) {
        self.shape = shape;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

// ============================================================================
// GRAPHIC BAND
// ============================================================================

/// Fixed-frequency band of the 10-band graphic EQ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "GraphicParams", into = "GraphicParams")]
pub struct GraphicBand {
    index: usize,
    gain_db: f64,
    enabled: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphicParams {
    frequency: f64,
    #[serde(default)]
    gain_db: f64,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

impl From<GraphicParams> for GraphicBand {
    fn from(p: GraphicParams) -> Self {
        Self {
            index: nearest_graphic_index(p.frequency),
            gain_db: sanitize(p.gain_db, DEFAULT_GAIN_DB, MIN_GAIN_DB, MAX_GAIN_DB),
            enabled: p.enabled,
        }
    }
}

impl From<GraphicBand> for GraphicParams {
    fn from(b: GraphicBand) -> Self {
        Self {
            frequency: b.frequency(),
            gain_db: b.gain_db,
            enabled: b.enabled,
        }
    }
}

/// Snap an arbitrary frequency to the closest ISO centre (log distance)
fn nearest_graphic_index(frequency: f64) -> usize {
    if !frequency.is_finite() || frequency <= 0.0 {
        return 0;
    }
    let target = frequency.ln();
    GRAPHIC_FREQUENCIES
        .iter()
        .enumerate()
        .map(|(i, f)| (i, (f.ln() - target).abs()))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
        .0
}

impl GraphicBand {
    /// Band `index` of the ISO set at `gain_db` (clamped)
    pub fn new(index: usize, gain_db: f64) -> AeqResult<Self> {
        if index >= GRAPHIC_FREQUENCIES.len() {
            return Err(AeqError::InvalidParam(format!(
                "graphic band index {} out of range (0..{})",
                index,
                GRAPHIC_FREQUENCIES.len()
            )));
        }
        Ok(Self {
            index,
            gain_db: sanitize(gain_db, DEFAULT_GAIN_DB, MIN_GAIN_DB, MAX_GAIN_DB),
            enabled: true,
        })
    }

    /// All ten bands at the given gains
    pub fn from_gains(gains: &[f64; 10]) -> [GraphicBand; 10] {
        std::array::from_fn(|i| Self {
            index: i,
            gain_db: sanitize(gains[i], DEFAULT_GAIN_DB, MIN_GAIN_DB, MAX_GAIN_DB),
            enabled: true,
        })
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn frequency(&self) -> f64 {
        GRAPHIC_FREQUENCIES[self.index]
    }

    #[inline]
    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_gain_db(&mut self, gain_db: f64) {
        self.gain_db = sanitize(gain_db, self.gain_db, MIN_GAIN_DB, MAX_GAIN_DB);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Realize as a bell band with the fixed graphic Q
    pub fn to_band(&self) -> Band {
        Band::bell(self.frequency(), self.gain_db, GRAPHIC_Q).with_enabled(self.enabled)
    }
}

// ============================================================================
// BAND SET
// ============================================================================

/// Ordered bands; order is the processing order of the cascade
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Band>", into = "Vec<Band>")]
pub struct BandSet {
    bands: Vec<Band>,
}

impl TryFrom<Vec<Band>> for BandSet {
    type Error = AeqError;

    fn try_from(bands: Vec<Band>) -> AeqResult<Self> {
        Self::from_bands(bands)
    }
}

impl From<BandSet> for Vec<Band> {
    fn from(set: BandSet) -> Self {
        set.bands
    }
}

impl BandSet {
    pub fn new() -> Self {
        Self { bands: Vec::new() }
    }

    pub fn from_bands(bands: Vec<Band>) -> AeqResult<Self> {
        if bands.len() > MAX_BANDS {
            return Err(AeqError::TooManyBands {
                requested: bands.len(),
                max: MAX_BANDS,
            });
        }
        Ok(Self { bands })
    }

    /// Realize graphic bands (always ISO order, ascending)
    pub fn graphic(bands: &[GraphicBand]) -> Self {
        let mut realized: Vec<Band> = bands.iter().map(GraphicBand::to_band).collect();
        realized.truncate(MAX_BANDS);
        Self { bands: realized }
    }

    /// Ten graphic bands at 0 dB
    pub fn flat_graphic() -> Self {
        Self::graphic(&GraphicBand::from_gains(&[0.0; 10]))
    }

    /// Append a band, returning its index
    pub fn push(&mut self, band: Band) -> AeqResult<usize> {
        if self.bands.len() >= MAX_BANDS {
            return Err(AeqError::TooManyBands {
                requested: self.bands.len() + 1,
                max: MAX_BANDS,
            });
        }
        self.bands.push(band);
        Ok(self.bands.len() - 1)
    }

    pub fn set(&mut self, index: usize, band: Band) -> AeqResult<()> {
        let len = self.bands.len();
        let slot = self.bands.get_mut(index).ok_or_else(|| {
            AeqError::InvalidParam(format!("band index {} out of range (len {})", index, len))
        })?;
        *slot = band;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<Band> {
        if index < self.bands.len() {
            Some(self.bands.remove(index))
        } else {
            None
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Band> {
        self.bands.get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Band> {
        self.bands.get_mut(index)
    }

    #[inline]
    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn iter(&self) -> impl Iterator<Item = &Band> {
        self.bands.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.bands.iter().filter(|b| b.is_enabled()).count()
    }

    /// Stable ascending sort by frequency, for reproducible cascade order
    pub fn sort_by_frequency(&mut self) {
        self.bands.sort_by(|a, b| a.frequency().total_cmp(&b.frequency()));
    }

    pub fn set_all_enabled(&mut self, enabled: bool) {
        for band in &mut self.bands {
            band.set_enabled(enabled);
        }
    }
}

impl<'a> IntoIterator for &'a BandSet {
    type Item = &'a Band;
    type IntoIter = std::slice::Iter<'a, Band>;

    fn into_iter(self) -> Self::IntoIter {
        self.bands.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_clamps_on_construction() {
        let band = Band::bell(5.0, 40.0, 0.0);
        assert_eq!(band.frequency(), MIN_FREQUENCY_HZ);
        assert_eq!(band.gain_db(), MAX_GAIN_DB);
        assert_eq!(band.q(), MIN_Q);

        let band = Band::bell(96000.0, -40.0, 50.0);
        assert_eq!(band.frequency(), MAX_FREQUENCY_HZ);
        assert_eq!(band.gain_db(), MIN_GAIN_DB);
        assert_eq!(band.q(), MAX_Q);
    }

    #[test]
    fn test_band_non_finite_uses_defaults() {
        let band = Band::new(FilterShape::LowShelf, f64::NAN, f64::INFINITY, f64::NAN);
        assert_eq!(band.frequency(), DEFAULT_FREQUENCY_HZ);
        assert_eq!(band.gain_db(), DEFAULT_GAIN_DB);
        assert_eq!(band.q(), DEFAULT_Q);
    }

    #[test]
    fn test_setters_keep_previous_value_on_nan() {
        let mut band = Band::bell(440.0, 3.0, 2.0);
        band.set_frequency(f64::NAN);
        band.set_gain_db(f64::NAN);
        band.set_q(f64::NEG_INFINITY);
        assert_eq!(band.frequency(), 440.0);
        assert_eq!(band.gain_db(), 3.0);
        assert_eq!(band.q(), 2.0);

        band.set_q(0.0);
        assert_eq!(band.q(), MIN_Q);
    }

    #[test]
    fn test_pass_filters_ignore_gain() {
        assert!(!FilterShape::LowPass.uses_gain());
        assert!(!FilterShape::HighPass.uses_gain());
        assert!(FilterShape::Bell.uses_gain());
        assert_eq!(Band::low_pass(8000.0, 0.707).gain_db(), 0.0);
    }

    #[test]
    fn test_deserialize_clamps() {
        let json = r#"{"frequency": 50000.0, "gainDb": -99.0, "q": 0.0, "shape": "highShelf"}"#;
        let band: Band = serde_json::from_str(json).unwrap();
        assert_eq!(band.frequency(), MAX_FREQUENCY_HZ);
        assert_eq!(band.gain_db(), MIN_GAIN_DB);
        assert_eq!(band.q(), MIN_Q);
        assert_eq!(band.shape(), FilterShape::HighShelf);
        assert!(band.is_enabled());
    }

    #[test]
    fn test_graphic_band_index_validation() {
        assert!(GraphicBand::new(9, 3.0).is_ok());
        assert!(GraphicBand::new(10, 3.0).is_err());
        let band = GraphicBand::new(5, 30.0).unwrap();
        assert_eq!(band.frequency(), 1000.0);
        assert_eq!(band.gain_db(), MAX_GAIN_DB);
    }

    #[test]
    fn test_graphic_band_snaps_frequency() {
        let band: GraphicBand =
            serde_json::from_str(r#"{"frequency": 64.0, "gainDb": 2.0}"#).unwrap();
        assert_eq!(band.frequency(), 63.0);
        let band: GraphicBand =
            serde_json::from_str(r#"{"frequency": 32.0, "gainDb": 2.0}"#).unwrap();
        assert_eq!(band.frequency(), 31.0);
    }

    #[test]
    fn test_graphic_realizes_as_bell() {
        let band = GraphicBand::new(3, -4.0).unwrap().to_band();
        assert_eq!(band.shape(), FilterShape::Bell);
        assert_eq!(band.frequency(), 250.0);
        assert_eq!(band.q(), GRAPHIC_Q);
    }

    #[test]
    fn test_band_set_limit() {
        let mut set = BandSet::new();
        for _ in 0..MAX_BANDS {
            set.push(Band::default()).unwrap();
        }
        assert!(matches!(
            set.push(Band::default()),
            Err(AeqError::TooManyBands { .. })
        ));

        let too_many = vec![Band::default(); MAX_BANDS + 1];
        assert!(BandSet::from_bands(too_many).is_err());
    }

    #[test]
    fn test_band_set_sort_is_stable() {
        let mut set = BandSet::from_bands(vec![
            Band::bell(4000.0, 1.0, 1.0),
            Band::bell(100.0, 2.0, 1.0),
            Band::bell(4000.0, 3.0, 1.0),
        ])
        .unwrap();
        set.sort_by_frequency();
        let gains: Vec<f64> = set.iter().map(|b| b.gain_db()).collect();
        assert_eq!(gains, vec![2.0, 1.0, 3.0]);
    }

    #[test]
    fn test_flat_graphic() {
        let set = BandSet::flat_graphic();
        assert_eq!(set.len(), 10);
        assert!(set.iter().all(|b| b.gain_db() == 0.0 && b.is_enabled()));
        assert_eq!(set.get(0).unwrap().frequency(), 31.0);
        assert_eq!(set.get(9).unwrap().frequency(), 16000.0);
    }

    #[test]
    fn test_band_set_deserialize_rejects_oversize() {
        let bands = vec![Band::default(); MAX_BANDS + 1];
        let json = serde_json::to_string(&bands).unwrap();
        assert!(serde_json::from_str::<BandSet>(&json).is_err());
    }
}
