//! Build processors hooked into the pipeline stages

use bitflags::bitflags;
use nav_common::{Error, Result};

use crate::processors::{ApplyPolygonFlags, FilterLedgeSpans, FilterLowHeightSpans, FilterLowObstacles};
use crate::{
    BuildContext, BuildState, CompactHeightfield, ContourSet, Heightfield, NMGenFlags,
    NMGenParams, NMGenTileParams, PolyMesh, PolyMeshDetail, DEFAULT_POLY_FLAG,
};

/// Lowest processor priority, run first
pub const MIN_PRIORITY: i32 = 0;
/// Priority used by the standard processors
pub const DEFAULT_PRIORITY: i32 = 100;

bitflags! {
    /// Intermediate build assets
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(
        feature = "serialization",
        derive(serde::Serialize, serde::Deserialize)
    )]
    pub struct AssetFlags: u8 {
        const HEIGHTFIELD = 0x01;
        const COMPACT_FIELD = 0x02;
        const CONTOUR_SET = 0x04;
        const POLY_MESH = 0x08;
        const DETAIL_MESH = 0x10;
    }
}

/// Build data that exists while a tile is being built
///
/// Which fields are set depends on the stage. The builder drops each asset
/// once later stages no longer need it, unless a processor asked for it to be
/// preserved.
#[derive(Debug, Default)]
pub struct NMGenAssets {
    pub heightfield: Option<Heightfield>,
    pub compact_field: Option<CompactHeightfield>,
    pub contours: Option<ContourSet>,
    pub poly_mesh: Option<PolyMesh>,
    pub detail_mesh: Option<PolyMeshDetail>,
}

/// What a processor sees while it runs
pub struct NMGenContext<'a> {
    pub assets: &'a mut NMGenAssets,
    pub build: &'a mut BuildContext,
    pub params: &'a NMGenParams,
    pub tile: &'a NMGenTileParams,
}

impl NMGenContext<'_> {
    pub fn log(&mut self, message: impl Into<String>, source: &str) {
        self.build.log(message, Some(source));
    }

    pub fn log_error(&mut self, message: impl Into<String>, source: &str) {
        self.build.log_error(message, Some(source));
    }
}

/// A plugin invoked at every build stage
///
/// Processors are called with the stage that just completed and ignore the
/// stages they are not interested in. Returning `false` aborts the build, in
/// which case the processor should log why.
pub trait NMGenProcessor: Send {
    fn name(&self) -> &str;

    /// Processors run in ascending priority order
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// True if the processor may run on a worker thread
    fn is_thread_safe(&self) -> bool {
        true
    }

    /// Assets that must outlive their normal disposal point
    fn preserve_assets(&self) -> AssetFlags {
        AssetFlags::empty()
    }

    fn process_build(&mut self, state: BuildState, ctx: &mut NMGenContext<'_>) -> bool;
}

/// An ordered set of processors
#[derive(Default)]
pub struct ProcessorSet {
    processors: Vec<Box<dyn NMGenProcessor>>,
}

impl std::fmt::Debug for ProcessorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ProcessorSet {
    pub fn new(mut processors: Vec<Box<dyn NMGenProcessor>>) -> Self {
        processors.sort_by_key(|p| p.priority());
        Self { processors }
    }

    /// The processors selected by the standard build flags
    pub fn standard(flags: NMGenFlags) -> Self {
        let mut processors: Vec<Box<dyn NMGenProcessor>> = Vec::new();
        if flags.contains(NMGenFlags::APPLY_POLY_FLAGS) {
            processors.push(Box::new(ApplyPolygonFlags::new(
                "ApplyDefaultPolyFlag",
                MIN_PRIORITY,
                DEFAULT_POLY_FLAG,
            )));
        }
        if flags.contains(NMGenFlags::LEDGE_SPANS_NOT_WALKABLE) {
            processors.push(Box::new(FilterLedgeSpans));
        }
        if flags.contains(NMGenFlags::LOW_HEIGHT_SPANS_NOT_WALKABLE) {
            processors.push(Box::new(FilterLowHeightSpans));
        }
        if flags.contains(NMGenFlags::LOW_OBSTACLES_WALKABLE) {
            processors.push(Box::new(FilterLowObstacles));
        }
        Self::new(processors)
    }

    /// Adds a processor, keeping the priority order
    pub fn add(&mut self, processor: Box<dyn NMGenProcessor>) {
        let at = self
            .processors
            .partition_point(|p| p.priority() <= processor.priority());
        self.processors.insert(at, processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }

    /// True only if every processor is thread safe
    pub fn is_thread_safe(&self) -> bool {
        self.processors.iter().all(|p| p.is_thread_safe())
    }

    /// Union of the assets every processor wants preserved
    pub fn preserve_assets(&self) -> AssetFlags {
        self.processors
            .iter()
            .fold(AssetFlags::empty(), |acc, p| acc | p.preserve_assets())
    }

    /// Logs the processors in run order
    pub fn log_processors(&self, ctx: &mut BuildContext) {
        for p in &self.processors {
            ctx.log(format!("Processor: {} (priority {})", p.name(), p.priority()), Some("ProcessorSet"));
        }
    }

    /// Runs every processor for `state`, stopping at the first veto
    pub fn process(&mut self, state: BuildState, ctx: &mut NMGenContext<'_>) -> Result<()> {
        for p in &mut self.processors {
            if !p.process_build(state, ctx) {
                return Err(Error::Build(format!(
                    "processor {} aborted the build at {}",
                    p.name(),
                    state
                )));
            }
        }
        Ok(())
    }
}
