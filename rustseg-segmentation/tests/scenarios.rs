#![allow(clippy::uninlined_format_args)]
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::sync::Arc;

use rustseg_segmentation::{
    cell_ids_par, positions_par, registry, BitFieldCoder, CartesianGridXY, Error, HitPosition,
    ProjectiveCylinder, RegistryBuilder, Segmentation, SegmentationType, Vector3D, WaferGridXY,
};

#[test]
fn test_signed_field_round_trip() {
    let coder = BitFieldCoder::new("system:8,barrel:3,layer:8,slice:5,x:32:-16,y:-16").unwrap();
    let mut id = 0u64;
    coder.set(&mut id, "x", -32).unwrap();
    assert_eq!(coder.get(id, "x").unwrap(), -32);
    assert_eq!(coder.get(id, "y").unwrap(), 0);
    assert_eq!(coder.get(id, "system").unwrap(), 0);
    assert_eq!(id >> 32, 0xFFE0, "bits 32..47 hold the two's complement of -32");
}

#[test]
fn test_projective_cell_centre() {
    let mut seg = ProjectiveCylinder::new("system:8,theta:16,phi:16").unwrap();
    seg.set_parameter("theta_bins", 180i64.into()).unwrap();
    seg.set_parameter("phi_bins", 360i64.into()).unwrap();

    let global = Vector3D::new(1000.0, 0.0, 0.0);
    assert!((global.theta() - FRAC_PI_2).abs() < 1e-12);
    let id = seg.cell_id(&Vector3D::default(), &global, 0).unwrap();

    let centre = seg.position(id).unwrap();
    assert!((centre.theta() - FRAC_PI_2).abs() <= PI / 180.0);
    assert!(centre.phi().abs() <= TAU / 360.0);
}

#[test]
fn test_cartesian_quantization() {
    let mut grid = CartesianGridXY::new("system:8,x:-16,y:-16").unwrap();
    grid.set_parameter("grid_size_x", 10.0.into()).unwrap();
    let local = Vector3D::new(24.9, 0.0, 0.0);
    let id = grid.cell_id(&local, &local, 0).unwrap();
    assert_eq!(grid.decoder().get(id, "x").unwrap(), 2);
    assert_eq!(grid.position(id).unwrap().x, 20.0);
}

#[test]
fn test_wafer_offsets_separate_positions() {
    let mut grid = WaferGridXY::new("system:5,layer:9,wafer:6,x:-16,y:-16").unwrap();
    grid.set_wafer_offset_x(3, 0, 50.0).unwrap();
    grid.set_wafer_offset_y(3, 0, 25.0).unwrap();
    grid.set_wafer_offset_x(3, 1, -50.0).unwrap();
    grid.set_wafer_offset_y(3, 1, -25.0).unwrap();

    let coder = grid.decoder();
    let a = coder
        .encode(0, &[("layer", 3), ("wafer", 0), ("x", 7), ("y", 7)])
        .unwrap();
    let b = coder
        .encode(0, &[("layer", 3), ("wafer", 1), ("x", 7), ("y", 7)])
        .unwrap();
    assert_ne!(grid.position(a).unwrap(), grid.position(b).unwrap());
}

#[test]
fn test_unknown_type() {
    match registry::create("HexGrid", "x:8") {
        Err(Error::UnknownType(name)) => assert_eq!(name, "HexGrid"),
        other => panic!("expected UnknownType, got {:?}", other.map(|s| s.type_name())),
    }
}

#[test]
fn test_registry_instances_share_coder() {
    let coder = Arc::new(BitFieldCoder::new("system:8,layer:8,x:-16,y:-16").unwrap());
    let registry = RegistryBuilder::with_builtins().freeze();
    let mut a = registry
        .create_with_coder("CartesianGridXY", Arc::clone(&coder))
        .unwrap();
    a.set_parameter("grid_size_x", 2.0.into()).unwrap();
    let b = registry
        .create_with_coder("CartesianGridXY", Arc::clone(&coder))
        .unwrap();

    let local = Vector3D::new(9.0, 0.0, 0.0);
    let ida = a.cell_id(&local, &local, 0).unwrap();
    let idb = b.cell_id(&local, &local, 0).unwrap();
    assert_eq!(coder.get(ida, "x").unwrap(), 5);
    assert_eq!(coder.get(idb, "x").unwrap(), 9);
}

#[test]
fn test_parallel_lookup_on_shared_segmentation() {
    let seg: Box<dyn Segmentation> = registry::create("GridPhiEta", "system:4,eta:-12,phi:10").unwrap();
    let hits: Vec<HitPosition> = (0..1000)
        .map(|i| {
            let phi = f64::from(i) * 0.006 - PI;
            let eta = f64::from(i % 50) * 0.04 - 1.0;
            HitPosition::new(Vector3D::from_r_eta_phi(1500.0, eta, phi), 3)
        })
        .collect();

    let ids = cell_ids_par(seg.as_ref(), &hits).unwrap();
    assert_eq!(ids.len(), hits.len());
    for (i, (hit, id)) in hits.iter().zip(&ids).enumerate() {
        let expected = seg.cell_id(&hit.local, &hit.global, hit.volume_id).unwrap();
        assert_eq!(*id, expected, "hit {}", i);
        assert_eq!(seg.decoder().get(*id, "system").unwrap(), 3);
    }

    let positions = positions_par(seg.as_ref(), &ids).unwrap();
    assert!(positions.iter().all(|p| (p.radius_xy() - 1.0).abs() < 1e-12));
}
