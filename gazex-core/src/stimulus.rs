use std::fmt;

use gazex_cache::{get_label, intern_label};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Defines stimuli and their render data
pub trait Stimulus: Clone + Send + Sync + std::fmt::Debug {
    fn cache_id(&self) -> usize;
}

/// Visual form of a target. `Wheel` is the pre-trial fixator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StimulusShape {
    Circle,
    Cross,
    Star,
    #[serde(alias = "t")]
    Tee,
    Wheel,
}

impl StimulusShape {
    pub const COUNT: usize = 5;
}

impl Stimulus for StimulusShape {
    fn cache_id(&self) -> usize {
        match self {
            StimulusShape::Circle => 0,
            StimulusShape::Cross => 1,
            StimulusShape::Star => 2,
            StimulusShape::Tee => 3,
            StimulusShape::Wheel => 4,
        }
    }
}

/// Interned target label. Cheap to copy and compare; serialized as the label.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(usize);

impl TargetId {
    pub fn new(label: &str) -> Self {
        TargetId(intern_label(label))
    }

    pub fn label(&self) -> String {
        get_label(self.0).map_or_else(|| format!("#{}", self.0), |a| a.to_string())
    }
}

impl fmt::Debug for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TargetId({})", self.label())
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl From<&str> for TargetId {
    fn from(label: &str) -> Self {
        TargetId::new(label)
    }
}

impl Serialize for TargetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl<'de> Deserialize<'de> for TargetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(TargetId::new(&label))
    }
}

/// Everything a render surface needs to draw one target for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetVisual {
    pub target: TargetId,
    pub shape: StimulusShape,
    /// Center in centered screen coordinates, +y up.
    pub position: (f32, f32),
    pub size: f32,
    pub opacity: f32,
    /// Degrees, clockwise.
    pub orientation: f32,
}
