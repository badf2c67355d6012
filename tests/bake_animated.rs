use glam::{DMat4, DVec3};
use uninstance::config::{BakeConfig, BakeMode};
use uninstance::driver::BakeDriver;
use uninstance::harness::{HarnessScene, ParticleFrame, RecordingProgress, ScriptedSim};
use uninstance::host::ATTR_BLEND_WEIGHT;
use uninstance::particle::OPTION_OBJECT_INDEX;
use uninstance::resolver::{CycleMode, CycleUnit};
use uninstance::BakeError;

fn translation(x: f64, y: f64, z: f64) -> DMat4 {
    DMat4::from_translation(DVec3::new(x, y, z))
}

fn two_template_scene(sim: &ScriptedSim) -> HarnessScene {
    let mut scene = HarnessScene::new(sim);
    let cone = scene.add_template("cone", DMat4::IDENTITY);
    let cube = scene.add_template("cube", DMat4::IDENTITY);
    scene.add_instancer(vec![cone, cube]);
    scene
}

fn animated_config(start: i32, end: i32) -> BakeConfig {
    let mut config = BakeConfig::new(start, end);
    config.mode = BakeMode::Animated;
    config
}

/// Ages that advance one frame's worth per frame, in seconds at 24 fps.
fn aging_frames(sim: &mut ScriptedSim, ids: Vec<i64>, frames: std::ops::RangeInclusive<i32>) {
    let birth = *frames.start();
    for frame in frames {
        let ages = ids.iter().map(|_| (frame - birth) as f64 / 24.0).collect();
        sim.script_frame(frame, ParticleFrame::new(ids.clone()).with_double("age", ages));
    }
}

#[test]
fn wide_cycle_steps_never_convert_to_blends() {
    let mut sim = ScriptedSim::new(1);
    aging_frames(&mut sim, vec![1, 2], 1..=4);
    let mut scene = two_template_scene(&sim);

    let mut config = animated_config(1, 4);
    // 100 seconds per step: no particle crosses a template boundary in
    // four frames.
    config.cycling = CycleMode::Sequential { step: 100.0, unit: CycleUnit::Seconds };
    let driver = BakeDriver::new(config).expect("valid config");
    let outcome = driver
        .run(&mut sim, &mut scene, &mut RecordingProgress::default())
        .expect("bake succeeds");

    assert_eq!(outcome.created.len(), 2);
    for name in &outcome.created {
        let root = scene.find(name).expect("created root exists");
        assert!(scene.deformers_under(root).is_empty(), "{name} must stay a plain duplicate");
    }
}

#[test]
fn tight_cycle_steps_convert_and_key_every_frame() {
    let mut sim = ScriptedSim::new(1);
    aging_frames(&mut sim, vec![1], 1..=4);
    let mut scene = two_template_scene(&sim);

    let mut config = animated_config(1, 4);
    config.cycling = CycleMode::Sequential { step: 1.0, unit: CycleUnit::Frames };
    let driver = BakeDriver::new(config).expect("valid config");
    let outcome = driver
        .run(&mut sim, &mut scene, &mut RecordingProgress::default())
        .expect("bake succeeds");

    let root = scene.find(&outcome.created[0]).expect("created root exists");
    let deformers = scene.deformers_under(root);
    assert_eq!(deformers.len(), 1);
    // Index sequence 0 1 0 1; the switch at frame 2 back-fills the base
    // one frame earlier, then every frame keys the active level (cone
    // 0.5, cube 1.0).
    assert_eq!(
        scene.keys(deformers[0], ATTR_BLEND_WEIGHT),
        vec![(1.0, 0.0), (2.0, 1.0), (3.0, 0.5), (4.0, 1.0)]
    );
}

#[test]
fn copy_as_instance_rotates_shared_blend_slots() {
    let mut sim = ScriptedSim::new(1);
    sim.script_frame(1, ParticleFrame::new(vec![1]).with_double("age", vec![0.0]));
    sim.script_frame(2, ParticleFrame::new(vec![1, 2]).with_double("age", vec![1.0 / 24.0, 1.0 / 24.0]));
    sim.script_frame(3, ParticleFrame::new(vec![1, 2]).with_double("age", vec![2.0 / 24.0, 2.0 / 24.0]));
    let mut scene = two_template_scene(&sim);

    let mut config = animated_config(1, 3);
    config.copy_as_instance = true;
    config.cycling = CycleMode::Sequential { step: 1.0, unit: CycleUnit::Frames };
    let driver = BakeDriver::new(config).expect("valid config");
    let outcome = driver
        .run(&mut sim, &mut scene, &mut RecordingProgress::default())
        .expect("bake succeeds");

    assert_eq!(outcome.created.len(), 2);

    // The first sighting built the slot's blend duplicate; the second
    // particle landed on the same rotated slot and got an instance copy
    // of it, deformation shared.
    let first = scene.find(&outcome.created[0]).expect("blend root exists");
    let second = scene.find(&outcome.created[1]).expect("instance copy exists");
    let slot_deformers = scene.deformers_under(first);
    assert_eq!(slot_deformers.len(), 1);
    assert!(!scene.deformers_under(second).is_empty(), "instance copies share the slot deformer");

    // The rotation keys the slot one template ahead each frame: cube
    // (1.0) on frame 2, cone (0.5) on frame 3, on top of the base key
    // from creation.
    assert_eq!(
        scene.keys(slot_deformers[0], ATTR_BLEND_WEIGHT),
        vec![(1.0, 0.0), (2.0, 1.0), (3.0, 0.5)]
    );
}

#[test]
fn copy_as_instance_without_sequential_cycling_fails_and_rolls_back() {
    let mut sim = ScriptedSim::new(1);
    sim.script_frame(1, ParticleFrame::new(vec![1]).with_int("shapeIndex", vec![0]));
    sim.script_frame(2, ParticleFrame::new(vec![1]).with_int("shapeIndex", vec![1]));
    sim.map_attribute(0, OPTION_OBJECT_INDEX, "shapeIndex");
    let mut scene = two_template_scene(&sim);
    let nodes_before = scene.live_node_count();

    let mut config = animated_config(1, 2);
    config.copy_as_instance = true;
    let driver = BakeDriver::new(config).expect("valid config");
    let result = driver.run(&mut sim, &mut scene, &mut RecordingProgress::default());

    assert!(matches!(result, Err(BakeError::Configuration(_))), "got {result:?}");
    assert_eq!(scene.live_node_count(), nodes_before, "partial work must be rolled back");
}

#[test]
fn cancellation_rolls_back_every_created_node() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut sim = ScriptedSim::new(1);
    aging_frames(&mut sim, vec![1, 2, 3], 1..=5);
    let mut scene = two_template_scene(&sim);
    let nodes_before = scene.live_node_count();
    let roots_before = scene.live_world_roots();

    // Run-up advances one unit, each baked frame one more: cancel right
    // after the second baked frame.
    let mut progress = RecordingProgress::cancelling_after(3);
    let driver = BakeDriver::new(animated_config(1, 5)).expect("valid config");
    let result = driver.run(&mut sim, &mut scene, &mut progress);

    assert!(matches!(result, Err(BakeError::Cancelled)), "got {result:?}");
    assert_eq!(scene.live_node_count(), nodes_before, "the scene is exactly as before the bake");
    assert_eq!(scene.live_world_roots(), roots_before);
}

#[test]
fn animated_templates_are_rejected_before_any_mutation() {
    let mut sim = ScriptedSim::new(1);
    aging_frames(&mut sim, vec![1], 1..=2);
    let mut scene = HarnessScene::new(&sim);
    let cone = scene.add_template("cone", DMat4::IDENTITY);
    let cube = scene.add_template("cube", DMat4::IDENTITY);
    scene.add_instancer(vec![cone, cube]);
    scene.set_animated(cube, true);
    let nodes_before = scene.live_node_count();

    let driver = BakeDriver::new(animated_config(1, 2)).expect("valid config");
    let result = driver.run(&mut sim, &mut scene, &mut RecordingProgress::default());

    match result {
        Err(BakeError::Configuration(message)) => {
            assert!(message.contains("cube"), "the offending template is named: {message}")
        }
        other => panic!("expected a configuration error, got {other:?}"),
    }
    assert_eq!(scene.live_node_count(), nodes_before);
}

#[test]
fn dying_particles_leave_keyed_ghost_free_duplicates() {
    let mut sim = ScriptedSim::new(1);
    sim.script_frame(1, ParticleFrame::new(vec![1, 2]));
    sim.script_frame(2, ParticleFrame::new(vec![1, 2]));
    // Particle 1 dies; particle 2 shifts into index 0.
    for frame in 3..=6 {
        sim.script_frame(frame, ParticleFrame::new(vec![2]));
    }
    let mut scene = HarnessScene::new(&sim);
    let template = scene.add_template("pebble", DMat4::IDENTITY);
    scene.add_instancer(vec![template]);

    let driver = BakeDriver::new(animated_config(1, 6)).expect("valid config");
    let outcome = driver
        .run(&mut sim, &mut scene, &mut RecordingProgress::default())
        .expect("bake succeeds");

    assert_eq!(outcome.created.len(), 2);
    let dead = scene.find(&outcome.created[0]).expect("duplicate of particle 1");
    let alive = scene.find(&outcome.created[1]).expect("duplicate of particle 2");

    // Particle 1 was last seen at frame 2 and is confirmed gone over
    // frame 3, so it pops out at frame 4.
    assert_eq!(scene.keys(dead, "visibility"), vec![(1.0, 1.0), (4.0, 0.0)]);
    assert_eq!(scene.keys(dead, "tx").len(), 2, "keys only while alive");

    assert_eq!(scene.keys(alive, "visibility"), vec![(1.0, 1.0)]);
    assert_eq!(scene.keys(alive, "tx").len(), 6, "keyed on every baked frame");
}
