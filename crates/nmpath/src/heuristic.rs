use glam::Vec3;

/// Estimate of the remaining distance used to order an A* search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum DistanceHeuristic {
    /// Largest per-axis difference
    #[default]
    LongestAxis,
    /// Sum of the per-axis differences
    Manhattan,
}

impl DistanceHeuristic {
    pub fn distance(self, a: Vec3, b: Vec3) -> f32 {
        let d = (a - b).abs();
        match self {
            DistanceHeuristic::LongestAxis => d.max_element(),
            DistanceHeuristic::Manhattan => d.x + d.y + d.z,
        }
    }
}
