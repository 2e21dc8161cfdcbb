mod common;

use common::World;
use panes_core::{BodyLabel, BodySpec, MemoryStore, Point, Rect, Role, Settings, WindowEvent};

fn rect(x: f64, y: f64) -> Rect {
    Rect::new(x, y, 400.0, 300.0)
}

#[test]
fn exactly_one_authority_among_opened_windows() {
    let mut world = World::new();
    for i in 0..3 {
        world.open(rect(i as f64 * 350.0, 0.0), 0.0);
    }
    let host = world.authority();
    assert_eq!(host.id(), world.windows[0].id());
    assert_eq!(world.shared().authority(), Some(host.id()));

    let ids: Vec<_> = world.windows.iter().map(|w| w.id()).collect();
    assert_eq!(world.shared().live_set(), ids);

    let peer = host.node.peer();
    assert_eq!(peer.infos().len(), 3);
    // Overlapping windows form one play area.
    assert_eq!(peer.frames().len(), 1);
}

#[test]
fn separate_windows_get_separate_walls() {
    let mut world = World::new();
    world.open(rect(0.0, 0.0), 0.0);
    world.open(rect(1000.0, 0.0), 0.0);
    assert_eq!(world.authority().node.peer().frames().len(), 2);
}

#[test]
fn touching_windows_share_one_seamless_outline() {
    let mut world = World::new();
    world.open(Rect::new(0.0, 0.0, 400.0, 300.0), 0.0);
    world.open(Rect::new(400.0, 0.0, 400.0, 300.0), 0.0);
    let peer = world.authority().node.peer();
    assert_eq!(peer.frames().len(), 1);
    // Four corners plus the notch.
    assert_eq!(peer.frames()[0].outline.len(), 5);
    assert_eq!(peer.frames()[0].outline[2], Point::new(800.0, 300.0));
}

#[test]
fn follower_takes_over_when_authority_closes() {
    let mut world = World::new();
    for i in 0..3 {
        world.open(rect(i as f64 * 350.0, 0.0), 0.0);
    }
    let old = world.windows[0].id();
    world.close(0);
    assert_eq!(world.windows[0].role(), Role::Closed);

    let host = world.authority();
    assert_ne!(host.id(), old);
    assert_eq!(world.shared().authority(), Some(host.id()));
    assert_eq!(world.shared().live_set().len(), 2);
    assert_eq!(host.node.peer().infos().len(), 2);
}

#[test]
fn window_close_shrinks_live_set_and_recomputes_once() {
    let mut world = World::new();
    for i in 0..3 {
        world.open(rect(i as f64 * 350.0, 0.0), 0.0);
    }
    let before = world.authority().node.peer().recomputes();
    world.close(2);
    let host = world.authority();
    assert_eq!(host.node.peer().recomputes(), before + 1);
    assert_eq!(world.shared().live_set().len(), 2);
    assert!(!world.shared().live_set().contains(&world.windows[2].id()));
}

#[test]
fn silent_authority_is_replaced_after_heartbeat_timeout() {
    let mut world = World::new();
    for i in 0..3 {
        world.open(rect(i as f64 * 350.0, 0.0), 0.0);
    }
    let dead = world.windows[0].id();
    world.tick_all(1_000.0);
    world.crash(0);

    // Still within the grace period.
    world.tick_all(3_500.0);
    assert!(world.authorities().is_empty());

    world.tick_all(4_500.0);
    let host = world.authority();
    assert_ne!(host.id(), dead);
    assert!(!world.shared().live_set().contains(&dead));
}

#[test]
fn duplicate_authorities_converge_to_the_last_writer() {
    let mut world = World::new();
    world.open(rect(0.0, 0.0), 0.0);
    // Lose the record, as if two windows raced on an empty store.
    world.shared().set_authority(None);
    world.open(rect(350.0, 0.0), 0.0);
    assert_eq!(world.authorities(), vec![0, 1]);

    world.tick_all(100.0);
    assert_eq!(world.authorities(), vec![1]);
    assert_eq!(world.windows[0].role(), Role::Follower);
    assert!(!world.windows[0].node.peer().sim().is_running());
}

#[test]
fn unavailable_store_means_alone_and_in_charge() {
    let mut world = World::with_store(MemoryStore::unavailable());
    world.open(rect(0.0, 0.0), 0.0);
    assert_eq!(world.windows[0].role(), Role::Authority);
    assert!(world.shared().live_set().is_empty());

    world.tick_all(5_000.0);
    let peer = world.windows[0].node.peer();
    assert_eq!(peer.role(), Role::Authority);
    assert_eq!(peer.infos().len(), 1);
}

#[test]
fn crashed_follower_is_pruned_after_request_timeout() {
    let mut world = World::new();
    world.open(rect(0.0, 0.0), 0.0);
    world.open(rect(350.0, 0.0), 0.0);
    let gone = world.windows[1].id();
    world.crash(1);

    world.windows[0]
        .node
        .window_event(WindowEvent::Resized)
        .unwrap();
    world.settle();
    assert!(world.shared().live_set().contains(&gone));

    world.tick(0, 1_500.0);
    assert!(!world.shared().live_set().contains(&gone));
    assert_eq!(world.authority().node.peer().infos().len(), 1);
}

#[test]
fn moving_a_follower_updates_the_outline() {
    let mut world = World::new();
    world.open(rect(0.0, 0.0), 0.0);
    world.open(rect(350.0, 0.0), 0.0);
    assert_eq!(world.authority().node.peer().frames().len(), 1);

    world.windows[1].move_to(rect(2_000.0, 0.0));
    world.windows[1]
        .node
        .window_event(WindowEvent::Moved)
        .unwrap();
    world.settle();
    let peer = world.authority().node.peer();
    assert_eq!(peer.frames().len(), 2);
    assert_eq!(peer.infos()[1].rect, rect(2_000.0, 0.0));
}

#[test]
fn follower_add_appears_only_after_a_snapshot() {
    let mut world = World::new();
    world.open(rect(0.0, 0.0), 0.0);
    world.open(rect(350.0, 0.0), 0.0);

    let ball = BodySpec::default_circle(Point::new(400.0, 150.0));
    let id = ball.id;
    world.windows[1].node.spawn(ball).unwrap();
    world.settle();
    let seen = |world: &World| {
        world.windows[1]
            .node
            .peer()
            .sim()
            .bodies()
            .iter()
            .any(|b| b.id == id)
    };
    assert!(!seen(&world));

    world.tick(0, 16.0);
    assert!(seen(&world));
}

#[test]
fn bodies_survive_a_change_of_authority() {
    let mut world = World::new();
    world.open(rect(0.0, 0.0), 0.0);
    world.open(rect(350.0, 0.0), 0.0);
    let ball = BodySpec::default_circle(Point::new(300.0, 150.0));
    let id = ball.id;
    world.windows[0].node.spawn(ball).unwrap();
    world.tick(0, 16.0);

    world.close(0);
    assert_eq!(world.authorities(), vec![1]);
    world.tick(1, 32.0);
    let peer = world.windows[1].node.peer();
    assert!(peer.sim().is_running());
    assert!(peer.sim().bodies().iter().any(|b| b.id == id));
}

#[test]
fn border_toggle_from_a_follower_reaches_the_authority() {
    let mut world = World::new();
    world.open(rect(0.0, 0.0), 0.0);
    world.open(rect(350.0, 0.0), 0.0);
    world.tick(0, 16.0);
    let walls = |world: &World| {
        world.windows[1]
            .node
            .peer()
            .sim()
            .bodies()
            .iter()
            .filter(|b| b.label == BodyLabel::Border)
            .count()
    };
    assert_eq!(walls(&world), 1);

    world.windows[1]
        .node
        .update_settings(Settings {
            enable_border: false,
            ..Settings::default()
        })
        .unwrap();
    world.settle();
    world.tick(0, 32.0);
    assert_eq!(walls(&world), 0);
    assert!(!world.shared().settings().enable_border);
}

#[test]
fn authority_taken_over_while_paused_rejoins_the_live_set() {
    let mut world = World::new();
    world.open(rect(0.0, 0.0), 0.0);
    world.open(rect(350.0, 0.0), 0.0);
    let paused = world.windows[0].id();

    // Only the second window keeps its frame timer running.
    world.tick(1, 3_500.0);
    assert_eq!(world.windows[1].role(), Role::Authority);
    assert!(!world.shared().live_set().contains(&paused));

    world.tick(0, 3_600.0);
    world.tick_all(3_700.0);
    assert_eq!(world.windows[0].role(), Role::Follower);
    assert!(world.shared().live_set().contains(&paused));
    let host = world.authority();
    assert_eq!(host.id(), world.windows[1].id());
    assert_eq!(host.node.peer().infos().len(), 2);
}

#[test]
fn losing_duplicate_authority_rejoins_the_live_set() {
    let mut world = World::new();
    world.open(rect(0.0, 0.0), 0.0);
    world.shared().set_authority(None);
    world.open(rect(350.0, 0.0), 0.0);
    let loser = world.windows[0].id();

    // The other authority ignores follower-bound requests and gets pruned.
    world.tick(1, 1_200.0);
    assert!(!world.shared().live_set().contains(&loser));

    world.tick_all(1_300.0);
    assert_eq!(world.authorities(), vec![1]);
    assert!(world.shared().live_set().contains(&loser));
    assert_eq!(world.authority().node.peer().infos().len(), 2);
}
