//! Build progress tracking

use std::fmt;

/// Progress of an [`IncrementalBuilder`](crate::IncrementalBuilder)
///
/// Each state names the stage that completed most recently. States only move
/// forward in declaration order; `Aborted` can be reached from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum BuildState {
    Initialized,
    ClearUnwalkableTris,
    HeightfieldBuild,
    MarkSpans,
    CompactFieldBuild,
    ApplyAreaMarkers,
    ErodeWalkableArea,
    DistanceFieldBuild,
    RegionBuild,
    ContourBuild,
    PolyMeshBuild,
    DetailMeshBuild,
    Complete,
    Aborted,
}

impl BuildState {
    /// All states in pipeline order
    pub const ALL: [BuildState; 14] = [
        BuildState::Initialized,
        BuildState::ClearUnwalkableTris,
        BuildState::HeightfieldBuild,
        BuildState::MarkSpans,
        BuildState::CompactFieldBuild,
        BuildState::ApplyAreaMarkers,
        BuildState::ErodeWalkableArea,
        BuildState::DistanceFieldBuild,
        BuildState::RegionBuild,
        BuildState::ContourBuild,
        BuildState::PolyMeshBuild,
        BuildState::DetailMeshBuild,
        BuildState::Complete,
        BuildState::Aborted,
    ];

    /// True for the terminal states
    pub fn is_finished(self) -> bool {
        matches!(self, BuildState::Complete | BuildState::Aborted)
    }

    /// The stage executed after this one, `None` for terminal states
    pub fn next(self) -> Option<BuildState> {
        use BuildState::*;
        match self {
            Initialized => Some(ClearUnwalkableTris),
            ClearUnwalkableTris => Some(HeightfieldBuild),
            HeightfieldBuild => Some(MarkSpans),
            MarkSpans => Some(CompactFieldBuild),
            CompactFieldBuild => Some(ApplyAreaMarkers),
            ApplyAreaMarkers => Some(ErodeWalkableArea),
            ErodeWalkableArea => Some(DistanceFieldBuild),
            DistanceFieldBuild => Some(RegionBuild),
            RegionBuild => Some(ContourBuild),
            ContourBuild => Some(PolyMeshBuild),
            PolyMeshBuild => Some(DetailMeshBuild),
            DetailMeshBuild => Some(Complete),
            Complete | Aborted => None,
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
