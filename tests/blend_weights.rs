use glam::DMat4;
use uninstance::config::{BakeConfig, BakeMode};
use uninstance::driver::BakeDriver;
use uninstance::geometry::BlendDuplicate;
use uninstance::harness::{HarnessScene, ParticleFrame, RecordingProgress, ScriptedSim};
use uninstance::host::ATTR_BLEND_WEIGHT;
use uninstance::particle::OPTION_OBJECT_INDEX;

#[test]
fn weight_levels_encode_each_target_distinctly() {
    assert_eq!(BlendDuplicate::weight_level(4, Some(1)), 0.5);
    assert_eq!(BlendDuplicate::weight_level(4, Some(0)), 0.25);
    assert_eq!(BlendDuplicate::weight_level(4, Some(3)), 1.0);
    assert_eq!(BlendDuplicate::weight_level(4, None), 0.0, "the base shape is weight zero");
    assert_eq!(BlendDuplicate::weight_level(3, Some(0)), 0.333, "levels round to 3 decimals");
}

/// An explicit per-particle index that changes mid-bake converts the
/// duplicate to a blend duplicate: deformers appear on its shapes, the
/// base shape is pinned one frame before the divergence, and the weight
/// is keyed on every baked frame from then on.
#[test]
fn index_change_converts_to_blend_and_keys_monotonically() {
    let mut sim = ScriptedSim::new(1);
    for (frame, index) in [(1, 0i64), (2, 1), (3, 1), (4, 0)] {
        sim.script_frame(frame, ParticleFrame::new(vec![1]).with_int("shapeIndex", vec![index]));
    }
    sim.map_attribute(0, OPTION_OBJECT_INDEX, "shapeIndex");

    let mut scene = HarnessScene::new(&sim);
    let cone = scene.add_template("cone", DMat4::IDENTITY);
    let cube = scene.add_template("cube", DMat4::IDENTITY);
    let cone_shape = scene.find("coneShape").expect("template shape");
    let cube_shape = scene.find("cubeShape").expect("template shape");
    scene.add_instancer(vec![cone, cube]);

    let mut config = BakeConfig::new(1, 4);
    config.mode = BakeMode::Animated;
    let driver = BakeDriver::new(config).expect("valid config");
    let outcome = driver
        .run(&mut sim, &mut scene, &mut RecordingProgress::default())
        .expect("bake succeeds");

    assert_eq!(outcome.created.len(), 1, "one particle, one duplicate");
    let root = scene.find(&outcome.created[0]).expect("duplicate root exists");

    let deformers = scene.deformers_under(root);
    assert_eq!(deformers.len(), 1, "one deformer per shape part");

    // With two templates the levels are 0.5 (cone) and 1.0 (cube). The
    // conversion happened at frame 2, so the base shape holds frame 1.
    assert_eq!(
        scene.keys(deformers[0], ATTR_BLEND_WEIGHT),
        vec![(1.0, 0.0), (2.0, 1.0), (3.0, 1.0), (4.0, 0.5)],
        "base back-fill, then one key per baked frame even when unchanged"
    );

    // Both templates were registered as targets at their own level.
    let targets = scene.blend_targets(deformers[0]);
    assert_eq!(targets, vec![(cone_shape, 0.5), (cube_shape, 1.0)]);
}

#[test]
fn stable_index_never_converts() {
    let mut sim = ScriptedSim::new(1);
    for frame in 1..=3 {
        sim.script_frame(frame, ParticleFrame::new(vec![1]).with_int("shapeIndex", vec![1]));
    }
    sim.map_attribute(0, OPTION_OBJECT_INDEX, "shapeIndex");

    let mut scene = HarnessScene::new(&sim);
    let cone = scene.add_template("cone", DMat4::IDENTITY);
    let cube = scene.add_template("cube", DMat4::IDENTITY);
    scene.add_instancer(vec![cone, cube]);

    let mut config = BakeConfig::new(1, 3);
    config.mode = BakeMode::Animated;
    let driver = BakeDriver::new(config).expect("valid config");
    let outcome = driver
        .run(&mut sim, &mut scene, &mut RecordingProgress::default())
        .expect("bake succeeds");

    let root = scene.find(&outcome.created[0]).expect("duplicate root exists");
    assert!(
        scene.deformers_under(root).is_empty(),
        "no blend conversion while the resolved index never changes"
    );
}
