//! View iteration scenarios: filtering, exclusion, caching, and chunked
//! parallel execution on both executors.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

use strata_ecs::prelude::*;

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct Renderable;

#[derive(Debug, Clone, PartialEq)]
struct Mass(f32);

#[derive(Debug, Clone, PartialEq)]
struct Name(String);

static TRACING: Once = Once::new();

/// Route library events to the test output; `RUST_LOG=strata_ecs=trace` shows
/// every migration.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn setup_world(config: WorldConfig) -> World {
    init_tracing();
    let mut world = World::with_config(config).unwrap();
    world.register_component::<Position>().unwrap();
    world.register_component::<Velocity>().unwrap();
    world.register_component::<Renderable>().unwrap();
    world.register_component::<Mass>().unwrap();
    world
}

/// Spawns `n` movers, every third one also renderable and every fifth one
/// without velocity.
fn populate(world: &mut World, n: usize) -> Vec<Entity> {
    (0..n)
        .map(|i| {
            let pos = Position { x: i as f32, y: 0.0 };
            let vel = Velocity { x: 1.0, y: 2.0 };
            if i % 5 == 0 {
                world.spawn((pos,)).unwrap()
            } else if i % 3 == 0 {
                world.spawn((pos, vel, Renderable)).unwrap()
            } else {
                world.spawn((pos, vel)).unwrap()
            }
        })
        .collect()
}

#[test]
fn end_to_end_position_plus_velocity() {
    let mut world = setup_world(WorldConfig::default());
    let e = world.create_entity();
    world.add_component(e, Position { x: 1.0, y: 2.0 }).unwrap();
    world.add_component(e, Velocity { x: 1.0, y: 1.0 }).unwrap();

    let view = world.view::<(&mut Position, &Velocity)>().unwrap();
    view.each(&mut world, |(pos, vel)| {
        pos.x += vel.x;
        pos.y += vel.y;
    })
    .unwrap();

    assert_eq!(
        world.get_component::<Position>(e).unwrap(),
        &Position { x: 2.0, y: 3.0 }
    );
}

#[test]
fn exclusion_filters_whole_archetypes() {
    let mut world = setup_world(WorldConfig::default());
    let entities = populate(&mut world, 60);

    let all = world.view::<(&Position, &Velocity)>().unwrap();
    let mut with_vel = HashSet::new();
    all.each_with_entity(&mut world, |e, _| {
        with_vel.insert(e);
    })
    .unwrap();

    let hidden = world
        .view_with_exclude::<(&Position, &Velocity), (Renderable,)>()
        .unwrap();
    let mut visible = HashSet::new();
    hidden
        .each_with_entity(&mut world, |e, _| {
            visible.insert(e);
        })
        .unwrap();

    for (i, e) in entities.iter().enumerate() {
        assert_eq!(with_vel.contains(e), i % 5 != 0, "entity {i}");
        assert_eq!(visible.contains(e), i % 5 != 0 && i % 3 != 0, "entity {i}");
    }
}

#[test]
fn excluding_a_required_kind_matches_nothing() {
    let mut world = setup_world(WorldConfig::default());
    populate(&mut world, 10);
    let view = world
        .view_with_exclude::<(&Position,), (Position,)>()
        .unwrap();
    let mut count = 0;
    view.each(&mut world, |_| count += 1).unwrap();
    assert_eq!(count, 0);
}

#[test]
fn four_component_query() {
    let mut world = setup_world(WorldConfig::default());
    let e = world
        .spawn((
            Position { x: 0.0, y: 0.0 },
            Velocity { x: 3.0, y: 4.0 },
            Renderable,
            Mass(2.0),
        ))
        .unwrap();
    world.spawn((Position { x: 0.0, y: 0.0 }, Mass(1.0))).unwrap();

    let view = world
        .view::<(&mut Position, &Velocity, &Mass, &Renderable)>()
        .unwrap();
    let mut visited = 0;
    view.each(&mut world, |(pos, vel, mass, _)| {
        pos.x = vel.x * mass.0;
        pos.y = vel.y * mass.0;
        visited += 1;
    })
    .unwrap();

    assert_eq!(visited, 1);
    assert_eq!(
        world.get_component::<Position>(e).unwrap(),
        &Position { x: 6.0, y: 8.0 }
    );
}

#[test]
fn conflicting_query_is_rejected() {
    let world = setup_world(WorldConfig::default());
    assert!(matches!(
        world.view::<(&mut Position, &mut Position)>(),
        Err(EcsError::ConflictingAccess { .. })
    ));
    assert!(matches!(
        world.view::<(&Position, &u64)>(),
        Err(EcsError::UnregisteredComponent { .. })
    ));
}

#[test]
fn cache_goes_stale_after_each_kind_of_edit() {
    let mut world = setup_world(WorldConfig::default());
    let entities = populate(&mut world, 20);
    let mut view = world.view::<(&Position,)>().unwrap();
    let (moved, destroyed) = (entities[1], entities[2]);

    let edits: Vec<Box<dyn Fn(&mut World)>> = vec![
        Box::new(|w: &mut World| {
            let e = w.create_entity();
            w.add_component(e, Mass(1.0)).unwrap();
        }),
        Box::new(move |w: &mut World| {
            w.remove_component::<Position>(moved).unwrap();
        }),
        Box::new(move |w: &mut World| {
            w.destroy_entity(destroyed);
        }),
        Box::new(|w: &mut World| {
            let e = w.create_entity();
            let mut batch = ComponentBatch::new();
            batch.add(w.registry(), Position { x: 0.0, y: 0.0 }).unwrap();
            w.add_batch(e, &mut batch).unwrap();
        }),
    ];

    for edit in &edits {
        view.cache_archetypes(&mut world).unwrap();
        assert!(view.is_cache_fresh(&world));
        edit(&mut world);
        assert!(!view.is_cache_fresh(&world));
        assert!(matches!(
            view.each_cached(&mut world, |_| {}),
            Err(EcsError::StaleViewCache { .. })
        ));
    }
}

#[test]
fn non_structural_work_keeps_cache_fresh() {
    let mut world = setup_world(WorldConfig::default());
    let entities = populate(&mut world, 20);
    let mut view = world.view::<(&mut Position,)>().unwrap();
    view.cache_archetypes(&mut world).unwrap();

    // Creating an empty entity, writing through get_component_mut, and
    // iterating do not move rows.
    world.create_entity();
    world.get_component_mut::<Position>(entities[0]).unwrap().y = 5.0;
    view.each_cached(&mut world, |(p,)| p.y += 1.0).unwrap();

    assert!(view.is_cache_fresh(&world));
    assert_eq!(world.get_component::<Position>(entities[0]).unwrap().y, 6.0);
}

fn run_parallel_batch<E: Executor>(executor: &E) {
    let config = WorldConfig {
        parallel_chunk_rows: 100,
        ..WorldConfig::default()
    };
    let mut world = setup_world(config);
    let entities = populate(&mut world, 2_000);

    let mut view = world.view::<(&mut Position, &Velocity)>().unwrap();
    view.cache_archetypes(&mut world).unwrap();

    let chunks = AtomicUsize::new(0);
    let seen = Mutex::new(HashSet::new());
    view.each_cached_par_batch(&mut world, executor, |ents, (pos, vel)| {
        assert!(ents.len() <= 100);
        assert_eq!(ents.len(), pos.len());
        assert_eq!(pos.len(), vel.len());
        for (p, v) in pos.iter_mut().zip(vel) {
            p.x += v.x;
            p.y += v.y;
        }
        chunks.fetch_add(1, Ordering::Relaxed);
        seen.lock().unwrap().extend(ents.iter().copied());
    })
    .unwrap();

    let seen = seen.into_inner().unwrap();
    // 400 entities lack velocity; the rest split 1067 / 533 across two archetypes.
    assert_eq!(seen.len(), 1_600);
    assert_eq!(chunks.load(Ordering::Relaxed), 11 + 6);

    for (i, e) in entities.iter().enumerate() {
        let pos = world.get_component::<Position>(*e).unwrap();
        if i % 5 == 0 {
            assert_eq!(pos, &Position { x: i as f32, y: 0.0 });
        } else {
            assert_eq!(pos, &Position { x: i as f32 + 1.0, y: 2.0 });
        }
    }
}

#[test]
fn parallel_batch_serial_executor() {
    run_parallel_batch(&SerialExecutor);
}

#[test]
fn parallel_batch_rayon_executor() {
    run_parallel_batch(&RayonExecutor::with_threads(4).unwrap());
}

#[test]
fn parallel_single_visits_each_row_once() {
    let mut world = setup_world(WorldConfig::default());
    populate(&mut world, 5_000);
    let mut view = world.view::<(&Position, &Velocity)>().unwrap();
    view.set_chunk_rows(256);
    view.cache_archetypes(&mut world).unwrap();

    let visits = AtomicUsize::new(0);
    view.each_cached_par_single(&mut world, &RayonExecutor::global(), |(pos, _)| {
        assert!(pos.x >= 0.0);
        visits.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();
    assert_eq!(visits.load(Ordering::Relaxed), 4_000);
}

#[test]
fn parallel_requires_fresh_cache() {
    let mut world = setup_world(WorldConfig::default());
    let entities = populate(&mut world, 10);
    let mut view = world.view::<(&Position,)>().unwrap();

    assert!(matches!(
        view.each_cached_par_single(&mut world, &SerialExecutor, |_| {}),
        Err(EcsError::ViewNotCached)
    ));

    view.cache_archetypes(&mut world).unwrap();
    world.destroy_entity(entities[3]);
    assert!(matches!(
        view.each_cached_par_batch(&mut world, &SerialExecutor, |_, _| {}),
        Err(EcsError::StaleViewCache { .. })
    ));
}

#[test]
fn batch_from_another_world_leaves_cache_usable() {
    let mut other = World::new();
    other.register_component::<Name>().unwrap();

    let mut world = setup_world(WorldConfig::default());
    world.register_component::<Name>().unwrap();
    let e = world.spawn((Name("twenty characters...".into()),)).unwrap();
    let mut view = world.view::<(&Name,)>().unwrap();
    view.cache_archetypes(&mut world).unwrap();

    // Name is kind 0 in `other` but Position in `world`.
    let mut batch = ComponentBatch::new();
    batch.add(other.registry(), Name("intruder".into())).unwrap();
    assert!(world.add_batch(e, &mut batch).is_err());

    assert!(view.is_cache_fresh(&world));
    let mut names = Vec::new();
    view.each_cached(&mut world, |(name,)| names.push(name.0.clone()))
        .unwrap();
    assert_eq!(names, vec!["twenty characters...".to_string()]);
    assert_eq!(
        world.get_component::<Name>(e).unwrap(),
        &Name("twenty characters...".into())
    );
}
