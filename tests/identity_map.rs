use uninstance::harness::{ParticleFrame, ScriptedSim};
use uninstance::host::SimulationClock;
use uninstance::identity::IdentityMap;

#[test]
fn id_index_round_trip_holds_for_every_live_index() {
    let mut sim = ScriptedSim::new(1);
    sim.script_frame(1, ParticleFrame::new(vec![7, 9, 3]));
    sim.advance_to(1);

    let mut map = IdentityMap::new();
    map.refresh(&sim).expect("refresh from scripted frame");

    assert_eq!(map.len(), 3);
    for index in 0..map.len() {
        let id = map.index_to_id(index).expect("live index maps to an id");
        assert_eq!(map.id_to_index(id), Some(index), "id {id} should round-trip to index {index}");
    }
}

#[test]
fn dead_ids_stop_resolving_after_refresh() {
    let mut sim = ScriptedSim::new(1);
    sim.script_frame(1, ParticleFrame::new(vec![0, 1, 2]));
    sim.script_frame(2, ParticleFrame::new(vec![0, 2]));

    let mut map = IdentityMap::new();
    sim.advance_to(1);
    map.refresh(&sim).expect("frame 1 refresh");
    assert_eq!(map.id_to_index(1), Some(1));

    // Particle 1 dies; particle 2 shifts down into its slot.
    sim.advance_to(2);
    map.refresh(&sim).expect("frame 2 refresh");
    assert_eq!(map.id_to_index(1), None, "dead id must not resolve");
    assert_eq!(map.id_to_index(2), Some(1));
    assert_eq!(map.index_to_id(2), None, "index beyond the live range must not resolve");
}
