//! End to end tests of the incremental build pipeline

use glam::Vec3;
use nav_common::{Error, Result, TriangleMesh};

use crate::*;

fn plane_mesh(x0: f32, z0: f32, size: f32) -> Result<TriangleMesh> {
    TriangleMesh::from_parts(
        &[
            Vec3::new(x0, 0.0, z0),
            Vec3::new(x0, 0.0, z0 + size),
            Vec3::new(x0 + size, 0.0, z0 + size),
            Vec3::new(x0 + size, 0.0, z0),
        ],
        &[[0, 1, 2], [0, 2, 3]],
    )
}

fn tile() -> Result<NMGenTileParams> {
    NMGenTileParams::new(0, 0, Vec3::new(0.0, -1.0, 0.0), Vec3::new(10.0, 1.0, 10.0))
}

fn builder_for(mesh: TriangleMesh, processors: ProcessorSet) -> Result<IncrementalBuilder> {
    let areas = vec![MAX_AREA; mesh.tri_count()];
    IncrementalBuilder::new(tile()?, &NMGenParams::default(), mesh, areas, processors)
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;

    #[test]
    fn test_plane_builds_complete() -> Result<()> {
        let mut builder = builder_for(
            plane_mesh(0.0, 0.0, 10.0)?,
            ProcessorSet::standard(NMGenFlags::default()),
        )?;
        assert_eq!(builder.build_all(), BuildState::Complete);

        let result = builder.result().expect("complete build has a result");
        assert!(result.has_result());
        let poly = result.poly_mesh.as_ref().unwrap();
        assert!(poly.npolys > 0);
        assert!(poly.flags.iter().all(|f| f & DEFAULT_POLY_FLAG != 0));

        for i in 0..poly.nverts {
            let v = poly.world_vertex(i);
            assert!((-0.01..=10.01).contains(&v.x), "vertex {v} outside the tile");
            assert!((-0.01..=10.01).contains(&v.z), "vertex {v} outside the tile");
        }

        let detail = result.detail_mesh.as_ref().unwrap();
        assert_eq!(detail.poly_count, poly.npolys);
        assert!(detail.tri_count >= poly.npolys);
        Ok(())
    }

    #[test]
    fn test_states_advance_in_order() -> Result<()> {
        let mut builder = builder_for(plane_mesh(0.0, 0.0, 10.0)?, ProcessorSet::default())?;
        assert_eq!(builder.state(), BuildState::Initialized);

        let mut states = Vec::new();
        while !builder.is_finished() {
            states.push(builder.build());
        }
        assert_eq!(states, BuildState::ALL[1..=12].to_vec());
        assert!(states.windows(2).all(|w| w[0] < w[1]));

        // Finished builders stay put
        assert_eq!(builder.build(), BuildState::Complete);
        Ok(())
    }

    #[test]
    fn test_steep_geometry_has_no_result() -> Result<()> {
        let wall = TriangleMesh::from_parts(
            &[
                Vec3::new(1.0, 0.0, 5.0),
                Vec3::new(9.0, 0.0, 5.0),
                Vec3::new(1.0, 8.0, 5.0),
            ],
            &[[0, 1, 2]],
        )?;
        let mut builder = builder_for(wall, ProcessorSet::default())?;

        // The first stage already finds nothing to build
        assert_eq!(builder.build(), BuildState::Complete);
        let result = builder.take_result().unwrap();
        assert!(!result.has_result());
        assert!(result.poly_mesh.is_none());
        assert!(!builder.context().has_errors());
        Ok(())
    }

    #[test]
    fn test_geometry_outside_tile_aborts() -> Result<()> {
        let mut builder = builder_for(plane_mesh(30.0, 30.0, 5.0)?, ProcessorSet::default())?;
        assert_eq!(builder.build_all(), BuildState::Aborted);
        assert!(builder.result().is_none());
        assert!(builder
            .messages()
            .iter()
            .any(|m| m.contains("Aborted at HeightfieldBuild")));
        Ok(())
    }

    #[test]
    fn test_rejects_bad_input() -> Result<()> {
        let mesh = plane_mesh(0.0, 0.0, 10.0)?;
        let err = IncrementalBuilder::new(
            tile()?,
            &NMGenParams::default(),
            mesh.clone(),
            vec![MAX_AREA],
            ProcessorSet::default(),
        );
        assert!(matches!(err, Err(Error::InvalidMesh(_))));

        let err = IncrementalBuilder::new(
            tile()?,
            &NMGenParams::default(),
            TriangleMesh::default(),
            Vec::new(),
            ProcessorSet::default(),
        );
        assert!(matches!(err, Err(Error::InvalidMesh(_))));

        let params = NMGenParams {
            max_verts_per_poly: 9,
            ..NMGenParams::default()
        };
        let err = IncrementalBuilder::new(tile()?, &params, mesh, vec![MAX_AREA; 2], ProcessorSet::default());
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
        Ok(())
    }
}

#[cfg(test)]
mod kernel_tests {
    use super::*;

    struct FailingRegions;

    impl GeometryKernel for FailingRegions {
        fn build_regions(
            &mut self,
            _ctx: &mut BuildContext,
            _chf: &mut CompactHeightfield,
            _border_size: i32,
            _min_region_area: i32,
            _merge_region_area: i32,
        ) -> Result<()> {
            Err(Error::NavMeshGeneration("region failure".into()))
        }
    }

    #[test]
    fn test_kernel_failure_aborts() -> Result<()> {
        let mesh = plane_mesh(0.0, 0.0, 10.0)?;
        let areas = vec![MAX_AREA; mesh.tri_count()];
        let mut builder = IncrementalBuilder::with_kernel(
            tile()?,
            &NMGenParams::default(),
            mesh,
            areas,
            ProcessorSet::default(),
            Box::new(FailingRegions),
        )?;

        assert_eq!(builder.build_all(), BuildState::Aborted);
        assert!(builder.context().has_errors());
        assert!(builder.result().is_none());
        assert!(builder.compact_field().is_none());
        let messages = builder.messages();
        assert!(messages
            .iter()
            .any(|m| m.contains("Aborted at RegionBuild") && m.contains("region failure")));
        Ok(())
    }
}

#[cfg(test)]
mod processor_tests {
    use super::*;

    struct Hook {
        veto_at: Option<BuildState>,
        preserve: AssetFlags,
        seen: std::sync::Arc<parking_lot::Mutex<Vec<BuildState>>>,
    }

    impl NMGenProcessor for Hook {
        fn name(&self) -> &str {
            "Hook"
        }

        fn preserve_assets(&self) -> AssetFlags {
            self.preserve
        }

        fn process_build(&mut self, state: BuildState, _ctx: &mut NMGenContext<'_>) -> bool {
            self.seen.lock().push(state);
            self.veto_at != Some(state)
        }
    }

    fn hook(veto_at: Option<BuildState>, preserve: AssetFlags) -> (Hook, std::sync::Arc<parking_lot::Mutex<Vec<BuildState>>>) {
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        (
            Hook {
                veto_at,
                preserve,
                seen: seen.clone(),
            },
            seen,
        )
    }

    #[test]
    fn test_processor_sees_every_stage() -> Result<()> {
        let (probe, seen) = hook(None, AssetFlags::empty());
        let mut builder = builder_for(plane_mesh(0.0, 0.0, 10.0)?, ProcessorSet::new(vec![Box::new(probe)]))?;
        assert_eq!(builder.build_all(), BuildState::Complete);
        assert_eq!(*seen.lock(), BuildState::ALL[1..=11].to_vec());
        Ok(())
    }

    #[test]
    fn test_processor_veto_aborts() -> Result<()> {
        let (veto, seen) = hook(Some(BuildState::ContourBuild), AssetFlags::empty());
        let mut builder = builder_for(plane_mesh(0.0, 0.0, 10.0)?, ProcessorSet::new(vec![Box::new(veto)]))?;
        assert_eq!(builder.build_all(), BuildState::Aborted);
        assert_eq!(seen.lock().last(), Some(&BuildState::ContourBuild));
        assert!(builder
            .messages()
            .iter()
            .any(|m| m.contains("Aborted at ContourBuild")));
        assert!(builder.contours().is_none());
        Ok(())
    }

    #[test]
    fn test_preserved_assets_survive() -> Result<()> {
        let (keep, _) = hook(
            None,
            AssetFlags::HEIGHTFIELD | AssetFlags::COMPACT_FIELD | AssetFlags::CONTOUR_SET,
        );
        let mut builder = builder_for(plane_mesh(0.0, 0.0, 10.0)?, ProcessorSet::new(vec![Box::new(keep)]))?;
        assert_eq!(builder.build_all(), BuildState::Complete);
        assert!(builder.heightfield().is_some());
        assert!(builder.compact_field().is_some());
        assert!(builder.contours().is_some());

        let mut plain = builder_for(plane_mesh(0.0, 0.0, 10.0)?, ProcessorSet::default())?;
        assert_eq!(plain.build_all(), BuildState::Complete);
        assert!(plain.heightfield().is_none());
        assert!(plain.compact_field().is_none());
        assert!(plain.contours().is_none());
        Ok(())
    }

    #[test]
    fn test_cylinder_marker_reaches_poly_mesh() -> Result<()> {
        let marker = AreaCylinderMarker::new(
            "Pond",
            DEFAULT_PRIORITY,
            5,
            Vec3::new(5.0, -1.0, 5.0),
            2.0,
            3.0,
        )?;
        let mut builder = builder_for(plane_mesh(0.0, 0.0, 10.0)?, ProcessorSet::new(vec![Box::new(marker)]))?;
        assert_eq!(builder.build_all(), BuildState::Complete);

        let result = builder.take_result().unwrap();
        let poly = result.poly_mesh.unwrap();
        assert!(poly.areas.contains(&5));
        assert!(poly.areas.contains(&MAX_AREA));
        Ok(())
    }
}
