//! # Query Benchmark
//!
//! Iteration cost of live vs cached filters over a fragmented world, and of
//! relation-scoped queries against full scans.

#![allow(missing_docs)]

use bytemuck::{Pod, Zeroable};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tessera_core::{ComponentId, Filter, World};

const ENTITY_COUNT: usize = 100_000;

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

macro_rules! tags {
    ($($name:ident),*) => {
        $(
            #[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
            #[repr(C)]
            struct $name(u8);
        )*
    };
}

tags!(T0, T1, T2, T3, T4, T5);

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct ChildOf(u32);

struct Fixture {
    world: World,
    pos: ComponentId,
    vel: ComponentId,
}

/// Spreads entities over 64 archetypes through six tag components.
fn fragmented() -> Fixture {
    let mut world = World::default();
    let pos = world.component_id::<Position>();
    let vel = world.component_id::<Velocity>();
    let tags = [
        world.component_id::<T0>(),
        world.component_id::<T1>(),
        world.component_id::<T2>(),
        world.component_id::<T3>(),
        world.component_id::<T4>(),
        world.component_id::<T5>(),
    ];
    let per_archetype = ENTITY_COUNT / 64;
    for bits in 0..64usize {
        let mut ids = vec![pos, vel];
        ids.extend((0..6).filter(|b| bits & (1 << b) != 0).map(|b| tags[b]));
        world.batch().new_entities(per_archetype, &ids).unwrap();
    }
    Fixture { world, pos, vel }
}

fn integrate(world: &mut World, query: &mut tessera_core::Query, pos: ComponentId, vel: ComponentId) {
    while query.next() {
        let v = *query.get(world, vel).get::<Velocity>();
        let mut p = query.get_mut(world, pos);
        let p = p.get_mut::<Position>();
        p.x += v.x * 0.016;
        p.y += v.y * 0.016;
        p.z += v.z * 0.016;
    }
}

fn bench_live_filter(c: &mut Criterion) {
    let Fixture { mut world, pos, vel } = fragmented();
    let filter = Filter::all(&[pos, vel]);

    c.bench_function("live_filter_update_100K_64_archetypes", |b| {
        b.iter(|| {
            let mut query = world.query(&filter);
            integrate(&mut world, &mut query, pos, vel);
            black_box(query.count())
        });
    });
}

fn bench_cached_filter(c: &mut Criterion) {
    let Fixture { mut world, pos, vel } = fragmented();
    let handle = world.cache().register(Filter::all(&[pos, vel]));

    c.bench_function("cached_filter_update_100K_64_archetypes", |b| {
        b.iter(|| {
            let mut query = world.query_cached(handle);
            integrate(&mut world, &mut query, pos, vel);
            black_box(query.count())
        });
    });
}

fn bench_query_setup(c: &mut Criterion) {
    let Fixture { mut world, pos, .. } = fragmented();
    let filter = Filter::all(&[pos]).exclusive();
    let handle = world.cache().register(filter.clone());

    c.bench_function("live_query_setup_sparse_match", |b| {
        b.iter(|| black_box(world.query(&filter).count()));
    });
    c.bench_function("cached_query_setup_sparse_match", |b| {
        b.iter(|| black_box(world.query_cached(handle).count()));
    });
}

fn bench_relation_scope(c: &mut Criterion) {
    let mut world = World::default();
    let pos = world.component_id::<Position>();
    let child = world.relation_id::<ChildOf>();
    let parents = world.batch().new_entities(100, &[pos]).unwrap();
    for &parent in &parents {
        world
            .batch()
            .new_entities_with_target(1_000, &[pos, child], child, parent)
            .unwrap();
    }
    let target = parents[42];
    let scoped = Filter::all(&[child]).with_target(target);

    c.bench_function("relation_scoped_query_1K_of_100K", |b| {
        b.iter(|| {
            let mut query = world.query(&scoped);
            let mut n = 0;
            while query.next() {
                n += 1;
            }
            black_box(n)
        });
    });

    c.bench_function("relation_full_scan_filter_1K_of_100K", |b| {
        b.iter(|| {
            let mut query = world.query(&Filter::all(&[child]));
            let mut n = 0;
            while query.next() {
                if query.relation(&world, child) == target {
                    n += 1;
                }
            }
            black_box(n)
        });
    });
}

criterion_group!(
    benches,
    bench_live_filter,
    bench_cached_filter,
    bench_query_setup,
    bench_relation_scope,
);

criterion_main!(benches);
