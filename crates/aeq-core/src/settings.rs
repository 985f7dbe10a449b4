//! EQ settings: a named pair of graphic and parametric band lists plus a
//! mode selecting which one drives the cascade.

use serde::{Deserialize, Serialize};

use crate::{AeqResult, Band, BandSet, GraphicBand};

/// Which band list is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EqMode {
    #[default]
    Graphic,
    Parametric,
}

/// Complete EQ state as persisted by presets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EqSettings {
    pub name: String,
    #[serde(default)]
    pub mode: EqMode,
    #[serde(default = "default_graphic_bands")]
    pub graphic_bands: Vec<GraphicBand>,
    #[serde(default = "default_parametric_bands")]
    pub parametric_bands: Vec<Band>,
    /// Master enable; when false the processor passes audio through
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_graphic_bands() -> Vec<GraphicBand> {
    GraphicBand::from_gains(&[0.0; 10]).to_vec()
}

/// Five neutral bells spread across the range
fn default_parametric_bands() -> Vec<Band> {
    [60.0, 250.0, 1000.0, 4000.0, 10000.0]
        .iter()
        .map(|&f| Band::bell(f, 0.0, 1.0))
        .collect()
}

impl Default for EqSettings {
    fn default() -> Self {
        Self::flat()
    }
}

impl EqSettings {
    /// Neutral settings in graphic mode
    pub fn flat() -> Self {
        Self::named("Flat")
    }

    /// Neutral settings under a new name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: EqMode::Graphic,
            graphic_bands: default_graphic_bands(),
            parametric_bands: default_parametric_bands(),
            enabled: true,
        }
    }

    /// Graphic settings with the given 10-band gains
    pub fn graphic(name: impl Into<String>, gains: &[f64; 10]) -> Self {
        Self {
            graphic_bands: GraphicBand::from_gains(gains).to_vec(),
            ..Self::named(name)
        }
    }

    /// Parametric settings with the given bands
    pub fn parametric(name: impl Into<String>, bands: Vec<Band>) -> Self {
        Self {
            mode: EqMode::Parametric,
            parametric_bands: bands,
            ..Self::named(name)
        }
    }

    /// Bands that drive the cascade in the current mode
    pub fn band_set(&self) -> AeqResult<BandSet> {
        match self.mode {
            EqMode::Graphic => Ok(BandSet::graphic(&self.graphic_bands)),
            EqMode::Parametric => BandSet::from_bands(self.parametric_bands.clone()),
        }
    }

    /// Update one graphic band gain; out-of-range indices are ignored
    pub fn set_graphic_gain(&mut self, index: usize, gain_db: f64) {
        if let Some(band) = self.graphic_bands.get_mut(index) {
            band.set_gain_db(gain_db);
        }
    }

    /// Replace one parametric band; out-of-range indices are ignored
    pub fn set_parametric_band(&mut self, index: usize, band: Band) {
        if let Some(slot) = self.parametric_bands.get_mut(index) {
            *slot = band;
        }
    }

    /// Graphic gains as a fixed table (missing bands read as 0 dB)
    pub fn graphic_gains(&self) -> [f64; 10] {
        let mut gains = [0.0; 10];
        for band in &self.graphic_bands {
            gains[band.index()] = band.gain_db();
        }
        gains
    }
}
