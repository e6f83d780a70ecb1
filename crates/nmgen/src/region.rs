//! Monotone region partitioning
//!
//! Spans are swept row by row along x. Every region ends up with exactly one
//! contiguous run of spans per row and no holes, which keeps the contours
//! simple.

use std::collections::{HashMap, VecDeque};

use nav_common::{Error, Result};

use crate::{CompactHeightfield, NULL_AREA};

const NULL_NEI: u16 = 0xffff;

#[derive(Debug, Clone, Copy, Default)]
struct SweepSpan {
    /// Region of the previous row this sweep continues
    ns: u16,
    /// Number of spans linking to `ns`
    nei: u16,
    id: u16,
}

#[derive(Debug, Clone, Copy)]
struct RegionInfo {
    span_count: usize,
    zmin: i32,
    zmax: i32,
    area: u8,
}

/// Partitions the walkable spans into monotone regions
///
/// Spans inside the border are left without a region. Regions smaller than
/// `merge_region_area` are merged into a region directly above or below them
/// when the result stays monotone, and connected groups of regions smaller
/// than `min_region_area` are removed.
pub fn build_regions(
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
    merge_region_area: i32,
) -> Result<()> {
    let w = chf.width;
    let d = chf.depth;
    let mut reg = vec![0u16; chf.span_count()];
    let mut infos: Vec<RegionInfo> = vec![RegionInfo {
        span_count: 0,
        zmin: 0,
        zmax: 0,
        area: NULL_AREA,
    }];

    let mut sweeps: Vec<SweepSpan> = Vec::new();
    let mut prev: Vec<u16> = Vec::new();

    for z in border_size..d - border_size {
        sweeps.clear();
        sweeps.push(SweepSpan::default());
        prev.clear();
        prev.resize(infos.len(), 0);

        for x in border_size..w - border_size {
            for i in chf.cell_spans(x, z) {
                if chf.areas[i] == NULL_AREA {
                    continue;
                }

                // -x neighbour
                let mut previd = 0u16;
                if let Some((_, _, ai)) = chf.neighbour(x, z, i, 0) {
                    if reg[ai] != 0 && chf.areas[ai] == chf.areas[i] {
                        previd = reg[ai];
                    }
                }
                if previd == 0 {
                    if sweeps.len() >= NULL_NEI as usize {
                        return Err(Error::NavMeshGeneration("too many sweeps in one row".into()));
                    }
                    previd = sweeps.len() as u16;
                    sweeps.push(SweepSpan::default());
                }
                reg[i] = previd;

                // -z neighbour
                if let Some((_, _, ai)) = chf.neighbour(x, z, i, 3) {
                    let nr = reg[ai];
                    if nr != 0 && chf.areas[ai] == chf.areas[i] {
                        let sweep = &mut sweeps[previd as usize];
                        if sweep.nei == 0 || sweep.ns == nr {
                            sweep.ns = nr;
                            sweep.nei = sweep.nei.saturating_add(1);
                            prev[nr as usize] = prev[nr as usize].saturating_add(1);
                        } else {
                            sweep.nei = NULL_NEI;
                        }
                    }
                }
            }
        }

        // Continue a region from the previous row only when this sweep is
        // its sole continuation
        for s in 1..sweeps.len() {
            let sweep = sweeps[s];
            if sweep.nei != NULL_NEI && sweep.nei != 0 && prev[sweep.ns as usize] == sweep.nei {
                sweeps[s].id = sweep.ns;
            } else {
                if infos.len() >= u16::MAX as usize {
                    return Err(Error::NavMeshGeneration("region id overflow".into()));
                }
                sweeps[s].id = infos.len() as u16;
                infos.push(RegionInfo {
                    span_count: 0,
                    zmin: z,
                    zmax: z,
                    area: NULL_AREA,
                });
            }
        }

        for x in border_size..w - border_size {
            for i in chf.cell_spans(x, z) {
                if reg[i] != 0 && (reg[i] as usize) < sweeps.len() && chf.areas[i] != NULL_AREA {
                    let id = sweeps[reg[i] as usize].id;
                    reg[i] = id;
                    let info = &mut infos[id as usize];
                    info.span_count += 1;
                    info.zmax = z;
                    info.area = chf.areas[i];
                }
            }
        }
    }

    merge_small_regions(chf, &mut reg, &mut infos, merge_region_area as usize);
    remove_small_islands(chf, &mut reg, min_region_area as usize);

    // Compact the region ids
    let mut remap: HashMap<u16, u16> = HashMap::new();
    for r in reg.iter_mut().filter(|r| **r != 0) {
        let next = remap.len() as u16 + 1;
        *r = *remap.entry(*r).or_insert(next);
    }

    chf.border_size = border_size;
    chf.max_regions = remap.len() as u16 + 1;
    chf.regions = reg;

    log::debug!("Built {} regions", remap.len());
    Ok(())
}

/// Region of the span across a row boundary that touches region `r`
fn vertical_neighbours(
    chf: &CompactHeightfield,
    reg: &[u16],
    r: u16,
    z: i32,
    dir: usize,
) -> Vec<u16> {
    let mut out = Vec::new();
    for x in 0..chf.width {
        for i in chf.cell_spans(x, z) {
            if reg[i] != r {
                continue;
            }
            if let Some((_, _, ni)) = chf.neighbour(x, z, i, dir) {
                let nr = reg[ni];
                if nr != 0 && nr != r && chf.areas[ni] == chf.areas[i] && !out.contains(&nr) {
                    out.push(nr);
                }
            }
        }
    }
    out
}

fn merge_small_regions(
    chf: &CompactHeightfield,
    reg: &mut [u16],
    infos: &mut [RegionInfo],
    merge_region_area: usize,
) {
    loop {
        let mut merged = false;

        let mut order: Vec<u16> = (1..infos.len() as u16)
            .filter(|&r| infos[r as usize].span_count > 0)
            .filter(|&r| infos[r as usize].span_count < merge_region_area)
            .collect();
        order.sort_by_key(|&r| infos[r as usize].span_count);

        for r in order {
            let info = infos[r as usize];

            // Stacking keeps one run per row: the target must end on the row
            // just below, or start on the row just above
            let below = vertical_neighbours(chf, reg, r, info.zmin, 3)
                .into_iter()
                .filter(|&n| infos[n as usize].zmax == info.zmin - 1);
            let above = vertical_neighbours(chf, reg, r, info.zmax, 1)
                .into_iter()
                .filter(|&n| infos[n as usize].zmin == info.zmax + 1);

            let target = below
                .chain(above)
                .filter(|&n| infos[n as usize].area == info.area)
                .min_by_key(|&n| infos[n as usize].span_count);

            if let Some(n) = target {
                for v in reg.iter_mut().filter(|v| **v == r) {
                    *v = n;
                }
                let target = &mut infos[n as usize];
                target.span_count += info.span_count;
                target.zmin = target.zmin.min(info.zmin);
                target.zmax = target.zmax.max(info.zmax);
                infos[r as usize].span_count = 0;
                merged = true;
                break;
            }
        }

        if !merged {
            break;
        }
    }
}

/// Clears connected groups of regions whose total span count is too small
fn remove_small_islands(chf: &CompactHeightfield, reg: &mut [u16], min_region_area: usize) {
    if min_region_area == 0 {
        return;
    }

    let mut visited = vec![false; reg.len()];
    let mut queue = VecDeque::new();
    let mut island = Vec::new();

    for z in 0..chf.depth {
        for x in 0..chf.width {
            for start in chf.cell_spans(x, z) {
                if visited[start] || reg[start] == 0 {
                    continue;
                }

                island.clear();
                visited[start] = true;
                queue.push_back((x, z, start));
                while let Some((cx, cz, i)) = queue.pop_front() {
                    island.push(i);
                    for dir in 0..4 {
                        if let Some((nx, nz, ni)) = chf.neighbour(cx, cz, i, dir) {
                            if !visited[ni] && reg[ni] != 0 {
                                visited[ni] = true;
                                queue.push_back((nx, nz, ni));
                            }
                        }
                    }
                }

                if island.len() < min_region_area {
                    for &i in &island {
                        reg[i] = 0;
                    }
                }
            }
        }
    }
}
