//! Slicer configuration

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Infill pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPattern {
    /// Axis-aligned lines in both X and Y
    #[default]
    Grid,
}

impl FillPattern {
    /// Name used in configuration documents
    pub fn as_str(&self) -> &'static str {
        match self {
            FillPattern::Grid => "grid",
        }
    }
}

impl fmt::Display for FillPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FillPattern {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grid" => Ok(FillPattern::Grid),
            other => Err(ConfigError::UnknownFillPattern(other.to_string())),
        }
    }
}

/// How infill candidate lines are limited to the layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfillMode {
    /// Lines are clipped to the area enclosed by closed contours (even-odd)
    #[default]
    Clipped,
    /// Degraded fallback: lines span the full contour bounding box
    BoundingBox,
}

impl InfillMode {
    /// Name used in configuration documents
    pub fn as_str(&self) -> &'static str {
        match self {
            InfillMode::Clipped => "clipped",
            InfillMode::BoundingBox => "bounding_box",
        }
    }
}

impl fmt::Display for InfillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InfillMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clipped" => Ok(InfillMode::Clipped),
            "bounding_box" => Ok(InfillMode::BoundingBox),
            other => Err(ConfigError::UnknownInfillMode(other.to_string())),
        }
    }
}

/// Slicing parameters
///
/// All lengths are in millimeters. `perimeter_count`, `top_solid_layers` and
/// `bottom_solid_layers` are carried through to exports only.
///
/// # Example
///
/// ```
/// use meshslice::{FillPattern, SlicerConfig};
///
/// let config = SlicerConfig::new()
///     .with_layer_height(0.1)
///     .with_first_layer_height(0.3)
///     .with_fill_density(0.5)
///     .with_fill_pattern(FillPattern::Grid);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.effective_first_layer_height(), 0.3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlicerConfig {
    /// Distance between consecutive layers
    pub layer_height: f64,
    /// Height of the first layer above the mesh bottom; `None` means `layer_height`
    pub first_layer_height: Option<f64>,
    /// Extrusion width, used for infill spacing
    pub nozzle_diameter: f64,
    /// Infill density in `0..=1`; 0 disables infill
    pub fill_density: f64,
    /// Infill pattern
    pub fill_pattern: FillPattern,
    /// Clipped or bounding-box infill
    pub infill_mode: InfillMode,
    /// Perimeter wall count
    pub perimeter_count: u32,
    /// Solid top skin layers
    pub top_solid_layers: u32,
    /// Solid bottom skin layers
    pub bottom_solid_layers: u32,
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self {
            layer_height: 0.2,
            first_layer_height: None,
            nozzle_diameter: 0.4,
            fill_density: 0.2,
            fill_pattern: FillPattern::Grid,
            infill_mode: InfillMode::Clipped,
            perimeter_count: 2,
            top_solid_layers: 3,
            bottom_solid_layers: 3,
        }
    }
}

impl SlicerConfig {
    /// Configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and validate a JSON object; missing keys take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the layer height
    pub fn with_layer_height(mut self, layer_height: f64) -> Self {
        self.layer_height = layer_height;
        self
    }

    /// Override the first layer height
    pub fn with_first_layer_height(mut self, first_layer_height: f64) -> Self {
        self.first_layer_height = Some(first_layer_height);
        self
    }

    /// Set the nozzle diameter
    pub fn with_nozzle_diameter(mut self, nozzle_diameter: f64) -> Self {
        self.nozzle_diameter = nozzle_diameter;
        self
    }

    /// Set the infill density
    pub fn with_fill_density(mut self, fill_density: f64) -> Self {
        self.fill_density = fill_density;
        self
    }

    /// Set the infill pattern
    pub fn with_fill_pattern(mut self, fill_pattern: FillPattern) -> Self {
        self.fill_pattern = fill_pattern;
        self
    }

    /// Choose clipped or bounding-box infill
    pub fn with_infill_mode(mut self, infill_mode: InfillMode) -> Self {
        self.infill_mode = infill_mode;
        self
    }

    /// Set the perimeter count
    pub fn with_perimeter_count(mut self, count: u32) -> Self {
        self.perimeter_count = count;
        self
    }

    /// Set the number of solid top layers
    pub fn with_top_solid_layers(mut self, count: u32) -> Self {
        self.top_solid_layers = count;
        self
    }

    /// Set the number of solid bottom layers
    pub fn with_bottom_solid_layers(mut self, count: u32) -> Self {
        self.bottom_solid_layers = count;
        self
    }

    /// First layer height, falling back to the layer height
    pub fn effective_first_layer_height(&self) -> f64 {
        self.first_layer_height.unwrap_or(self.layer_height)
    }

    /// Distance between infill lines, or `None` when infill is disabled
    pub fn infill_spacing(&self) -> Option<f64> {
        (self.fill_density > 0.0).then(|| self.nozzle_diameter / self.fill_density)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.layer_height.is_finite() && self.layer_height > 0.0) {
            return Err(ConfigError::InvalidLayerHeight(self.layer_height));
        }
        if let Some(first) = self.first_layer_height {
            if !(first.is_finite() && first > 0.0) {
                return Err(ConfigError::InvalidFirstLayerHeight(first));
            }
        }
        if !(self.nozzle_diameter.is_finite() && self.nozzle_diameter > 0.0) {
            return Err(ConfigError::InvalidNozzleDiameter(self.nozzle_diameter));
        }
        if !(0.0..=1.0).contains(&self.fill_density) {
            return Err(ConfigError::InvalidFillDensity(self.fill_density));
        }
        Ok(())
    }
}
