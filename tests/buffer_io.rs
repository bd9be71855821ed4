//! Integration tests for persisted buffers and scene description files.

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Write};

use shadow_bvh::bake::FILE_MAGIC;
use shadow_bvh::bvh::walk::leaves;
use shadow_bvh::prelude::*;

use tempfile::NamedTempFile;

fn fan(n: usize) -> Vec<Triangle> {
    (0..n)
        .map(|i| {
            let a = i as f32 * 0.3;
            let c = Vec3::new(a.cos() * 10.0, a.sin() * 10.0, i as f32 * 0.1);
            Triangle::new(c, c + Vec3::new(0.5, 0.0, 0.0), c + Vec3::new(0.0, 0.5, 0.25), 100 + i as u32)
        })
        .collect()
}

#[test]
fn test_file_roundtrip() {
    let temp = NamedTempFile::new().expect("Failed to create temp file");
    let baked = bake(&fan(33), &BakeSettings::default()).expect("bake failed");

    {
        let file = File::create(temp.path()).unwrap();
        baked.write_to(BufWriter::new(file)).expect("write failed");
    }

    let file = File::open(temp.path()).unwrap();
    let loaded = BakedBvh::read_from(BufReader::new(file)).expect("read failed");

    assert_eq!(loaded.units(), baked.units());
    assert_eq!(loaded.desc(), baked.desc());
    assert_eq!(loaded.stats().leaf_records, 33);
    assert_eq!(loaded.stats().internal_records, baked.stats().internal_records);

    let ids: Vec<u32> = leaves(loaded.units()).unwrap().iter().map(|t| t.instance_id).collect();
    let expected: Vec<u32> = leaves(baked.units()).unwrap().iter().map(|t| t.instance_id).collect();
    assert_eq!(ids, expected);
}

#[test]
fn test_header_layout() {
    let baked = bake(&fan(3), &BakeSettings::default()).unwrap();
    let mut bytes = Vec::new();
    baked.write_to(&mut bytes).unwrap();

    assert_eq!(&bytes[0..4], &FILE_MAGIC);
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1);
    let count = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
    assert_eq!(count, baked.units().len());
    assert_eq!(bytes.len(), 12 + baked.byte_len());

    // First float of the body is vertex0.x or a box min.x, stored little-endian.
    let first = f32::from_le_bytes(bytes[12..16].try_into().unwrap());
    assert_eq!(first, baked.units()[0][0]);
}

#[test]
fn test_bad_magic() {
    let mut bytes = Vec::new();
    bake(&fan(2), &BakeSettings::default()).unwrap().write_to(&mut bytes).unwrap();
    bytes[0] = b'X';
    assert!(matches!(
        BakedBvh::read_from(Cursor::new(bytes)),
        Err(Error::MalformedBuffer(_))
    ));
}

#[test]
fn test_unknown_version() {
    let mut bytes = Vec::new();
    bake(&fan(2), &BakeSettings::default()).unwrap().write_to(&mut bytes).unwrap();
    bytes[4..8].copy_from_slice(&7u32.to_le_bytes());
    assert!(matches!(
        BakedBvh::read_from(Cursor::new(bytes)),
        Err(Error::MalformedBuffer(_))
    ));
}

#[test]
fn test_truncated_file() {
    let mut bytes = Vec::new();
    bake(&fan(5), &BakeSettings::default()).unwrap().write_to(&mut bytes).unwrap();
    bytes.truncate(bytes.len() - 6);
    assert!(matches!(BakedBvh::read_from(Cursor::new(bytes)), Err(Error::Io(_))));
}

#[test]
fn test_huge_count_with_empty_body() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&FILE_MAGIC);
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());

    match BakedBvh::read_from(Cursor::new(bytes)) {
        Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("expected EOF error, got {:?}", other.map(|b| b.desc())),
    }
}

#[test]
fn test_scene_file_to_buffer() {
    let mut scene_file = NamedTempFile::new().unwrap();
    write!(
        scene_file,
        r#"{{
            "meshes": [
                {{
                    "positions": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]],
                    "indices": [0,1,2, 0,2,3],
                    "instance_id": 5
                }},
                {{
                    "positions": [[0,0,0],[1,0,0],[0,1,0]],
                    "indices": [0,1,2],
                    "transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,20,1]
                }}
            ]
        }}"#
    )
    .unwrap();
    scene_file.flush().unwrap();

    let scene = SceneDesc::load(scene_file.path()).expect("scene load failed");
    let tris = scene.triangles();
    assert_eq!(tris.len(), 3);

    let baked = bake(&tris, &BakeSettings::default()).unwrap();
    let mut ids: Vec<u32> = leaves(baked.units()).unwrap().iter().map(|t| t.instance_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 5, 5]);

    let bounds = scene_bounds(baked.units()).unwrap();
    assert_eq!(bounds.max.z, 20.0);
}

#[test]
fn test_materials_survive_file_roundtrip() {
    let mut scene_file = NamedTempFile::new().unwrap();
    write!(
        scene_file,
        r#"{{
            "meshes": [
                {{ "positions": [[0,0,0],[1,0,0],[0,1,0]], "indices": [0,1,2] }},
                {{
                    "positions": [[5,0,0],[6,0,0],[5,1,0]],
                    "indices": [0,1,2],
                    "material_id": 12,
                    "alpha_tested": true
                }},
                {{ "positions": [[9,0,0],[10,0,0],[9,1,0]], "indices": [0,1,2], "instance_id": 3 }}
            ]
        }}"#
    )
    .unwrap();
    scene_file.flush().unwrap();

    let tris = SceneDesc::load(scene_file.path()).unwrap().triangles();
    let baked = bake(&tris, &BakeSettings::default()).unwrap();

    let mut bytes = Vec::new();
    baked.write_to(&mut bytes).unwrap();
    let loaded = BakedBvh::read_from(Cursor::new(bytes)).unwrap();

    let mut tags: Vec<(u32, MaterialTag)> = leaves(loaded.units())
        .unwrap()
        .iter()
        .map(|t| (t.instance_id, t.material))
        .collect();
    tags.sort_unstable_by_key(|(id, m)| (*id, m.id));

    assert_eq!(
        tags,
        vec![
            (0, MaterialTag::new(0, false)),
            (1, MaterialTag::new(12, true)),
            (3, MaterialTag::new(2, false)),
        ]
    );
}

#[test]
fn test_settings_file_drives_budget() {
    let temp = NamedTempFile::new().unwrap();
    BakeSettings {
        max_records: Some(3),
        log_stats: false,
    }
    .save(temp.path())
    .unwrap();

    let settings = BakeSettings::load(temp.path()).unwrap();
    let err = bake(&fan(8), &settings).unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { capacity: 3, .. }));
}
