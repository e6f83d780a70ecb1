//! Chunked triangle mesh for fast rectangular queries on the XZ plane
//!
//! The mesh is split into chunks of a bounded number of triangles and stored
//! as a flattened, depth-first tree. Internal nodes carry a negative escape
//! offset so a query can skip a whole non-overlapping subtree without
//! recursion.

use crate::{overlap_rect_2d, Error, Result, TriangleMesh};

/// Smallest chunk size accepted, bounds the depth of the tree
pub const MIN_TRIS_PER_CHUNK: usize = 64;

/// Node of a [`ChunkyTriMesh`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkyTriMeshNode {
    /// Minimum XZ bounds of the node's subtree
    pub bmin: [f32; 2],
    /// Maximum XZ bounds of the node's subtree
    pub bmax: [f32; 2],
    /// Leaf: index of the first triangle in the compacted buffers.
    /// Internal node: negated size of the subtree (escape offset).
    pub index: i32,
    /// Number of triangles owned by a leaf, zero for internal nodes
    pub count: usize,
}

impl ChunkyTriMeshNode {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.index >= 0
    }

    /// Offset to the first node after this node's subtree
    #[inline]
    pub fn escape_offset(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.index.unsigned_abs() as usize
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BoundsItem {
    bmin: [f32; 2],
    bmax: [f32; 2],
    tri: u32,
}

/// A triangle mesh partitioned into spatially coherent chunks
#[derive(Debug, Clone)]
pub struct ChunkyTriMesh {
    nodes: Vec<ChunkyTriMeshNode>,
    /// Vertex indices, three per triangle, in chunk order
    tris: Vec<u32>,
    /// Area id per triangle, in chunk order
    areas: Vec<u8>,
    /// Index of each compacted triangle in the source mesh
    source: Vec<u32>,
    max_tris_per_chunk: usize,
}

impl ChunkyTriMesh {
    /// Builds the chunk tree for `mesh`
    ///
    /// `areas` holds one area id per triangle. `tris_per_chunk` is clamped to
    /// [`MIN_TRIS_PER_CHUNK`].
    pub fn new(mesh: &TriangleMesh, areas: &[u8], tris_per_chunk: usize) -> Result<Self> {
        Self::build(mesh.vertices(), mesh.indices(), areas, tris_per_chunk)
    }

    /// Builds the chunk tree from raw buffers
    pub fn build(
        vertices: &[f32],
        indices: &[u32],
        areas: &[u8],
        tris_per_chunk: usize,
    ) -> Result<Self> {
        let ntris = indices.len() / 3;
        if indices.len() % 3 != 0 {
            return Err(Error::InvalidMesh(
                "index buffer length is not a multiple of 3".into(),
            ));
        }
        if areas.len() != ntris {
            return Err(Error::InvalidMesh(format!(
                "expected {} area ids, got {}",
                ntris,
                areas.len()
            )));
        }
        let nverts = vertices.len() / 3;
        if indices.iter().any(|&i| i as usize >= nverts) {
            return Err(Error::InvalidMesh("triangle index out of range".into()));
        }

        let max_tris_per_chunk = tris_per_chunk.max(MIN_TRIS_PER_CHUNK);

        let mut items: Vec<BoundsItem> = indices
            .chunks_exact(3)
            .enumerate()
            .map(|(tri, idx)| {
                let mut bmin = [f32::MAX; 2];
                let mut bmax = [f32::MIN; 2];
                for &vi in idx {
                    let v = &vertices[vi as usize * 3..vi as usize * 3 + 3];
                    bmin[0] = bmin[0].min(v[0]);
                    bmin[1] = bmin[1].min(v[2]);
                    bmax[0] = bmax[0].max(v[0]);
                    bmax[1] = bmax[1].max(v[2]);
                }
                BoundsItem {
                    bmin,
                    bmax,
                    tri: tri as u32,
                }
            })
            .collect();

        let nchunks = ntris.div_ceil(max_tris_per_chunk);
        let mut mesh = Self {
            nodes: Vec::with_capacity(nchunks * 4),
            tris: Vec::with_capacity(indices.len()),
            areas: Vec::with_capacity(ntris),
            source: Vec::with_capacity(ntris),
            max_tris_per_chunk,
        };

        if ntris > 0 {
            mesh.subdivide(&mut items, indices, areas);
        }

        log::debug!(
            "Built chunky mesh: {} triangles, {} nodes, {} per chunk",
            ntris,
            mesh.nodes.len(),
            max_tris_per_chunk
        );

        Ok(mesh)
    }

    fn subdivide(&mut self, items: &mut [BoundsItem], indices: &[u32], areas: &[u8]) {
        let icur = self.nodes.len();
        let (bmin, bmax) = calc_extents(items);
        self.nodes.push(ChunkyTriMeshNode {
            bmin,
            bmax,
            index: 0,
            count: 0,
        });

        if items.len() <= self.max_tris_per_chunk {
            let first = self.source.len();
            for item in items.iter() {
                let t = item.tri as usize;
                self.tris.extend_from_slice(&indices[t * 3..t * 3 + 3]);
                self.areas.push(areas[t]);
                self.source.push(item.tri);
            }
            let node = &mut self.nodes[icur];
            node.index = first as i32;
            node.count = items.len();
            return;
        }

        // Split along the longest axis at the median of the minimum bounds
        let axis = if bmax[0] - bmin[0] >= bmax[1] - bmin[1] {
            0
        } else {
            1
        };
        items.sort_by(|a, b| a.bmin[axis].total_cmp(&b.bmin[axis]));

        let split = items.len() / 2;
        let (lower, upper) = items.split_at_mut(split);
        self.subdivide(lower, indices, areas);
        self.subdivide(upper, indices, areas);

        let escape = self.nodes.len() - icur;
        self.nodes[icur].index = -(escape as i32);
    }

    /// Collects the leaves whose bounds overlap the XZ rectangle.
    ///
    /// Returns the number of triangles owned by the collected leaves.
    pub fn query(&self, bmin: [f32; 2], bmax: [f32; 2], out: &mut Vec<ChunkyTriMeshNode>) -> usize {
        let mut i = 0;
        let mut tri_count = 0;
        while i < self.nodes.len() {
            let node = &self.nodes[i];
            let overlap = overlap_rect_2d(bmin, bmax, node.bmin, node.bmax);

            if node.is_leaf() && overlap {
                out.push(*node);
                tri_count += node.count;
            }

            if overlap || node.is_leaf() {
                i += 1;
            } else {
                i += node.escape_offset();
            }
        }
        tri_count
    }

    /// Vertex indices of the triangles owned by a leaf, three per triangle
    pub fn chunk_triangles(&self, node: &ChunkyTriMeshNode) -> &[u32] {
        let (start, end) = leaf_range(node);
        &self.tris[start * 3..end * 3]
    }

    /// Area ids of the triangles owned by a leaf
    pub fn chunk_areas(&self, node: &ChunkyTriMeshNode) -> &[u8] {
        let (start, end) = leaf_range(node);
        &self.areas[start..end]
    }

    /// Source mesh triangle indices of the triangles owned by a leaf
    pub fn chunk_source_triangles(&self, node: &ChunkyTriMeshNode) -> &[u32] {
        let (start, end) = leaf_range(node);
        &self.source[start..end]
    }

    pub fn nodes(&self) -> &[ChunkyTriMeshNode] {
        &self.nodes
    }

    pub fn max_tris_per_chunk(&self) -> usize {
        self.max_tris_per_chunk
    }

    pub fn tri_count(&self) -> usize {
        self.source.len()
    }
}

fn leaf_range(node: &ChunkyTriMeshNode) -> (usize, usize) {
    if node.is_leaf() {
        let start = node.index as usize;
        (start, start + node.count)
    } else {
        (0, 0)
    }
}

fn calc_extents(items: &[BoundsItem]) -> ([f32; 2], [f32; 2]) {
    let mut bmin = [f32::MAX; 2];
    let mut bmax = [f32::MIN; 2];
    for item in items {
        bmin[0] = bmin[0].min(item.bmin[0]);
        bmin[1] = bmin[1].min(item.bmin[1]);
        bmax[0] = bmax[0].max(item.bmax[0]);
        bmax[1] = bmax[1].max(item.bmax[1]);
    }
    (bmin, bmax)
}
