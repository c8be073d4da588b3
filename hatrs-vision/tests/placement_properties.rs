use anyhow::Result;
use hatrs_vision::placement::keyed;
use hatrs_vision::{
    place, place_all, BoundingBox, DetectionResult, FaceId, FaceObservation, OverlayConfig,
};

fn face(id: u64, bbox: [f32; 4], roll: f32, yaw: f32) -> FaceObservation {
    FaceObservation {
        id: FaceId(id),
        bounding_box: BoundingBox::from_xywh(bbox),
        roll_angle: roll,
        yaw_angle: yaw,
    }
}

fn sample_faces() -> Vec<FaceObservation> {
    vec![
        face(1, [10.0, 10.0, 50.0, 50.0], 0.0, 0.0),
        face(2, [200.0, 40.0, 60.0, 60.0], 10.0, -10.0),
        face(3, [-4.0, 512.5, 33.3, 41.0], -179.5, 88.49),
    ]
}

#[test]
fn test_placement_is_deterministic() {
    let cfg = OverlayConfig::default();
    for f in sample_faces() {
        assert_eq!(place(&f, &cfg), place(&f, &cfg));
    }
}

#[test]
fn test_one_transform_per_face() {
    let cfg = OverlayConfig::default();
    let faces = sample_faces();
    for n in 0..=faces.len() {
        let out = place_all(&faces[..n], &cfg);
        assert_eq!(out.len(), n);
        for (t, f) in out.iter().zip(&faces[..n]) {
            assert_eq!(t.id, f.id);
            assert_eq!(t.anchor, f.bounding_box.origin);
            assert_eq!(t.size, f.bounding_box.size);
        }
    }
}

#[test]
fn test_faces_are_placed_independently() {
    let cfg = OverlayConfig::default();
    let f1 = face(1, [10.0, 10.0, 50.0, 50.0], 0.0, 0.0);
    let f2 = face(2, [200.0, 40.0, 60.0, 60.0], 10.0, -10.0);

    let forward = keyed(&place_all(&[f1.clone(), f2.clone()], &cfg));
    let reversed = keyed(&place_all(&[f2.clone(), f1.clone()], &cfg));
    assert_eq!(forward, reversed);

    assert_eq!(forward[&FaceId(1)], place(&f1, &cfg));
    assert_eq!(forward[&FaceId(2)], place(&f2, &cfg));
    assert_eq!(forward[&FaceId(2)].roll_degrees, 10.0);
    assert_eq!(forward[&FaceId(2)].yaw_degrees, -10.0);
}

#[test]
fn test_no_faces_scenario() -> Result<()> {
    let result: DetectionResult = serde_json::from_str(r#"{"faces": []}"#)?;
    result.validate()?;
    let out = place_all(&result.faces, &OverlayConfig::default());
    assert!(out.is_empty());
    assert_eq!(serde_json::to_string(&keyed(&out))?, "{}");
    Ok(())
}

#[test]
fn test_single_centered_face_scenario() -> Result<()> {
    let result: DetectionResult = serde_json::from_str(
        r#"{"faces": [{"id": 1, "boundingBox": {"origin": {"x": 0, "y": 0}, "size": {"width": 100, "height": 100}}, "rollAngle": 0, "yawAngle": 0}]}"#,
    )?;
    result.validate()?;
    let out = place_all(&result.faces, &OverlayConfig::default());

    let expected: serde_json::Value = serde_json::from_str(
        r#"[{"id": 1, "anchor": {"x": 0.0, "y": 0.0}, "size": {"width": 100.0, "height": 100.0}, "verticalOffset": -75.0, "rollDegrees": 0.0, "yawDegrees": 0.0}]"#,
    )?;
    assert_eq!(serde_json::to_value(&out)?, expected);
    Ok(())
}

#[test]
fn test_invalid_result_rejected_before_placement() {
    let mut bad = face(1, [0.0, 0.0, 10.0, 10.0], f32::INFINITY, 0.0);
    assert!(DetectionResult::new(vec![bad.clone()]).validate().is_err());
    bad.roll_angle = 0.0;
    bad.bounding_box.size.height = -3.0;
    assert!(DetectionResult::new(vec![bad]).validate().is_err());
}
