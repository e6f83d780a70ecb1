//! Per-agent navigation state shared by the steering components

use glam::{Quat, Vec3};

/// Default distance within which a position counts as reached
pub const DEFAULT_POSITION_TOLERANCE: f32 = 0.005;

/// Overall navigation state of an agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum NavigationState {
    #[default]
    Inactive,
    Active,
    Complete,
    Failed,
}

/// Blackboard owned by one agent and updated once per tick
///
/// The path manager writes `target_position` from `position` and
/// `goal_position`. Movement components read the target and write the
/// position, rotation and velocity.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct NavigationData {
    pub position: Vec3,
    pub rotation: Quat,
    pub radius: f32,
    pub goal_position: Vec3,
    pub goal_rotation: Quat,
    pub target_position: Vec3,
    pub target_velocity: Vec3,
    pub xz_tolerance: f32,
    pub y_tolerance: f32,
    pub maximum_speed: f32,
    pub movement_enabled: bool,
    /// Move even when the path manager reports no progress
    pub force_movement: bool,
    pub state: NavigationState,
}

impl NavigationData {
    /// An agent standing at `position` whose goal and target are its own
    /// location
    pub fn new(position: Vec3, rotation: Quat, radius: f32) -> Self {
        Self {
            position,
            rotation,
            radius,
            goal_position: position,
            goal_rotation: rotation,
            target_position: position,
            target_velocity: Vec3::ZERO,
            xz_tolerance: DEFAULT_POSITION_TOLERANCE,
            y_tolerance: DEFAULT_POSITION_TOLERANCE,
            maximum_speed: 1.0,
            movement_enabled: true,
            force_movement: false,
            state: NavigationState::Inactive,
        }
    }

    fn within_tolerance(&self, p: Vec3) -> bool {
        let d = p - self.position;
        d.x * d.x + d.z * d.z <= self.xz_tolerance * self.xz_tolerance && d.y.abs() <= self.y_tolerance
    }

    pub fn is_at_target(&self) -> bool {
        self.within_tolerance(self.target_position)
    }

    pub fn is_at_goal(&self) -> bool {
        self.within_tolerance(self.goal_position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerances() {
        let mut nav = NavigationData::new(Vec3::new(1.0, 0.0, 1.0), Quat::IDENTITY, 0.4);
        assert!(nav.is_at_goal());
        assert!(nav.is_at_target());
        assert_eq!(nav.state, NavigationState::Inactive);

        nav.goal_position = Vec3::new(1.003, 0.004, 1.0);
        assert!(nav.is_at_goal());
        nav.goal_position = Vec3::new(1.0, 0.01, 1.0);
        assert!(!nav.is_at_goal());

        nav.xz_tolerance = 1.0;
        nav.target_position = Vec3::new(1.5, 0.0, 1.5);
        assert!(nav.is_at_target());
    }
}
