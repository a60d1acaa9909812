use serde::{Deserialize, Serialize};

use crate::gaze::GazeSample;
use crate::stimulus::TargetId;

pub trait Region {
    fn target(&self) -> TargetId;
    fn contains(&self, sample: &GazeSample) -> bool;
}

/// Area of interest around a target, in centered screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Geometry {
    Rectangle {
        center: (f32, f32),
        width: f32,
        height: f32,
    },
    Circle {
        center: (f32, f32),
        radius: f32,
    },
}

impl Geometry {
    pub fn contains_point(&self, (x, y): (f32, f32)) -> bool {
        match *self {
            Geometry::Rectangle {
                center: (cx, cy),
                width,
                height,
            } => (x - cx).abs() <= width / 2.0 && (y - cy).abs() <= height / 2.0,
            Geometry::Circle {
                center: (cx, cy),
                radius,
            } => {
                let (dx, dy) = (x - cx, y - cy);
                dx * dx + dy * dy <= radius * radius
            }
        }
    }

    pub fn center(&self) -> (f32, f32) {
        match *self {
            Geometry::Rectangle { center, .. } | Geometry::Circle { center, .. } => center,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionOfInterest {
    pub target: TargetId,
    pub geometry: Geometry,
}

impl RegionOfInterest {
    pub fn new(target: TargetId, geometry: Geometry) -> Self {
        Self { target, geometry }
    }

    pub fn rectangle(target: TargetId, center: (f32, f32), width: f32, height: f32) -> Self {
        Self::new(
            target,
            Geometry::Rectangle {
                center,
                width,
                height,
            },
        )
    }
}

impl Region for RegionOfInterest {
    fn target(&self) -> TargetId {
        self.target
    }

    /// Invalid samples are never inside any region.
    fn contains(&self, sample: &GazeSample) -> bool {
        sample.valid && self.geometry.contains_point((sample.x, sample.y))
    }
}
