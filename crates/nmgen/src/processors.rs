//! Standard build processors

use glam::Vec3;
use nav_common::{ChunkyTriMesh, Error, Result, TriangleMesh};

use crate::processor::{NMGenContext, NMGenProcessor, DEFAULT_PRIORITY};
use crate::{BuildState, MAX_AREA};

const LOW_OBSTACLES_PRIORITY: i32 = DEFAULT_PRIORITY - 10;
const LEDGE_SPANS_PRIORITY: i32 = DEFAULT_PRIORITY;
const LOW_HEIGHT_PRIORITY: i32 = DEFAULT_PRIORITY + 10;

/// Makes low obstacles next to walkable spans walkable
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterLowObstacles;

impl NMGenProcessor for FilterLowObstacles {
    fn name(&self) -> &str {
        "FilterLowObstacles"
    }

    fn priority(&self) -> i32 {
        LOW_OBSTACLES_PRIORITY
    }

    fn process_build(&mut self, state: BuildState, ctx: &mut NMGenContext<'_>) -> bool {
        if state != BuildState::MarkSpans {
            return true;
        }
        let step = ctx.params.walkable_step;
        let Some(hf) = ctx.assets.heightfield.as_mut() else {
            ctx.log_error("No heightfield available", self.name());
            return false;
        };
        if step > 0 {
            hf.filter_low_hanging_walkable_obstacles(step);
            ctx.log("Marked low obstacles as walkable", self.name());
        }
        true
    }
}

/// Marks spans next to ledges as unwalkable
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterLedgeSpans;

impl NMGenProcessor for FilterLedgeSpans {
    fn name(&self) -> &str {
        "FilterLedgeSpans"
    }

    fn priority(&self) -> i32 {
        LEDGE_SPANS_PRIORITY
    }

    fn process_build(&mut self, state: BuildState, ctx: &mut NMGenContext<'_>) -> bool {
        if state != BuildState::MarkSpans {
            return true;
        }
        let (height, step) = (ctx.params.walkable_height, ctx.params.walkable_step);
        let Some(hf) = ctx.assets.heightfield.as_mut() else {
            ctx.log_error("No heightfield available", self.name());
            return false;
        };
        hf.filter_ledge_spans(height, step);
        ctx.log("Marked ledge spans as not walkable", self.name());
        true
    }
}

/// Marks spans without enough clearance above them as unwalkable
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterLowHeightSpans;

impl NMGenProcessor for FilterLowHeightSpans {
    fn name(&self) -> &str {
        "FilterLowHeightSpans"
    }

    fn priority(&self) -> i32 {
        LOW_HEIGHT_PRIORITY
    }

    fn process_build(&mut self, state: BuildState, ctx: &mut NMGenContext<'_>) -> bool {
        if state != BuildState::MarkSpans {
            return true;
        }
        let height = ctx.params.walkable_height;
        let Some(hf) = ctx.assets.heightfield.as_mut() else {
            ctx.log_error("No heightfield available", self.name());
            return false;
        };
        hf.filter_walkable_low_height_spans(height);
        ctx.log("Marked low height spans as not walkable", self.name());
        true
    }
}

fn check_area(area: u8) -> Result<()> {
    if area > MAX_AREA {
        return Err(Error::InvalidConfig(format!(
            "area {area} exceeds the maximum of {MAX_AREA}"
        )));
    }
    Ok(())
}

/// Applies an area to the spans inside a convex polygon
#[derive(Debug, Clone)]
pub struct AreaConvexMarker {
    name: String,
    priority: i32,
    area: u8,
    verts: Vec<Vec3>,
    ymin: f32,
    ymax: f32,
}

impl AreaConvexMarker {
    pub fn new(
        name: impl Into<String>,
        priority: i32,
        area: u8,
        verts: Vec<Vec3>,
        ymin: f32,
        ymax: f32,
    ) -> Result<Self> {
        check_area(area)?;
        if verts.len() < 3 || ymin > ymax {
            return Err(Error::InvalidConfig(
                "convex marker needs at least 3 vertices and ymin <= ymax".into(),
            ));
        }
        Ok(Self {
            name: name.into(),
            priority,
            area,
            verts,
            ymin,
            ymax,
        })
    }
}

impl NMGenProcessor for AreaConvexMarker {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn process_build(&mut self, state: BuildState, ctx: &mut NMGenContext<'_>) -> bool {
        if state != BuildState::ApplyAreaMarkers {
            return true;
        }
        let Some(chf) = ctx.assets.compact_field.as_mut() else {
            ctx.log_error("No compact heightfield available", &self.name);
            return false;
        };
        let marked = chf.mark_convex_poly_area(&self.verts, self.ymin, self.ymax, self.area);
        ctx.log(
            format!(
                "Marked convex polygon area: Area: {}, Priority: {}, Spans: {}",
                self.area, self.priority, marked
            ),
            &self.name,
        );
        true
    }
}

/// Applies an area to the spans inside a vertical cylinder
#[derive(Debug, Clone)]
pub struct AreaCylinderMarker {
    name: String,
    priority: i32,
    area: u8,
    centre_base: Vec3,
    radius: f32,
    height: f32,
}

impl AreaCylinderMarker {
    /// Negative radius and height are clamped to zero
    pub fn new(
        name: impl Into<String>,
        priority: i32,
        area: u8,
        centre_base: Vec3,
        radius: f32,
        height: f32,
    ) -> Result<Self> {
        check_area(area)?;
        Ok(Self {
            name: name.into(),
            priority,
            area,
            centre_base,
            radius: radius.max(0.0),
            height: height.max(0.0),
        })
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn height(&self) -> f32 {
        self.height
    }
}

impl NMGenProcessor for AreaCylinderMarker {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn process_build(&mut self, state: BuildState, ctx: &mut NMGenContext<'_>) -> bool {
        if state != BuildState::ApplyAreaMarkers {
            return true;
        }
        let Some(chf) = ctx.assets.compact_field.as_mut() else {
            ctx.log_error("No compact heightfield available", &self.name);
            return false;
        };
        let marked = chf.mark_cylinder_area(self.centre_base, self.radius, self.height, self.area);
        ctx.log(
            format!(
                "Marked cylinder area: Area: {}, Priority: {}, Spans: {}",
                self.area, self.priority, marked
            ),
            &self.name,
        );
        true
    }
}

/// Applies an area to the spans lying on the surface of a triangle mesh
///
/// Only the triangles whose chunks overlap the tile are tested.
#[derive(Debug, Clone)]
pub struct AreaMeshMarker {
    name: String,
    priority: i32,
    area: u8,
    mesh: TriangleMesh,
    chunks: ChunkyTriMesh,
}

impl AreaMeshMarker {
    pub fn new(
        name: impl Into<String>,
        priority: i32,
        area: u8,
        mesh: TriangleMesh,
        tris_per_chunk: usize,
    ) -> Result<Self> {
        check_area(area)?;
        if mesh.is_empty() {
            return Err(Error::InvalidMesh("area marker mesh is empty".into()));
        }
        let chunks = ChunkyTriMesh::new(&mesh, &vec![area; mesh.tri_count()], tris_per_chunk)?;
        Ok(Self {
            name: name.into(),
            priority,
            area,
            mesh,
            chunks,
        })
    }
}

impl NMGenProcessor for AreaMeshMarker {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn process_build(&mut self, state: BuildState, ctx: &mut NMGenContext<'_>) -> bool {
        if state != BuildState::ApplyAreaMarkers {
            return true;
        }
        let tolerance = ctx.params.world_walkable_step() + ctx.params.y_cell_size;
        let Some(chf) = ctx.assets.compact_field.as_mut() else {
            ctx.log_error("No compact heightfield available", &self.name);
            return false;
        };

        let mut leaves = Vec::new();
        self.chunks
            .query([chf.bmin.x, chf.bmin.z], [chf.bmax.x, chf.bmax.z], &mut leaves);

        let mut marked = 0;
        for leaf in &leaves {
            for &tri in self.chunks.chunk_source_triangles(leaf) {
                let verts = self.mesh.triangle_vertices(tri as usize);
                marked += chf.mark_triangle_area(&verts, tolerance, self.area);
            }
        }
        ctx.log(
            format!(
                "Marked mesh area: Area: {}, Priority: {}, Spans: {}",
                self.area, self.priority, marked
            ),
            &self.name,
        );
        true
    }
}

/// Adds flags to every polygon of the poly mesh
#[derive(Debug, Clone)]
pub struct ApplyPolygonFlags {
    name: String,
    priority: i32,
    flags: u16,
}

impl ApplyPolygonFlags {
    pub fn new(name: impl Into<String>, priority: i32, flags: u16) -> Self {
        Self {
            name: name.into(),
            priority,
            flags,
        }
    }
}

impl NMGenProcessor for ApplyPolygonFlags {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn process_build(&mut self, state: BuildState, ctx: &mut NMGenContext<'_>) -> bool {
        if state != BuildState::PolyMeshBuild {
            return true;
        }
        let Some(mesh) = ctx.assets.poly_mesh.as_mut() else {
            ctx.log_error("No poly mesh available", &self.name);
            return false;
        };
        for f in &mut mesh.flags {
            *f |= self.flags;
        }
        ctx.log(
            format!("Applied flags 0x{:02x} to all polygons", self.flags),
            &self.name,
        );
        true
    }
}
