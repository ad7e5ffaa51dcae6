use observable_collections::{
    CollectionChange, ObservableConcurrentMap, Tracked, cloned, merge_fields,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Clone, Debug, PartialEq)]
struct Job {
    owner: u32,
    attempts: u32,
}

merge_fields!(Job { owner, attempts });

type Map = ObservableConcurrentMap<u32, Tracked<Job>>;

const THREADS: u32 = 8;
const ROUNDS: u32 = 400;
const KEYS: u32 = 32;

#[derive(Default)]
struct Tally {
    adds: AtomicUsize,
    removes: AtomicUsize,
    replaces: AtomicUsize,
    resets: AtomicUsize,
}

fn tally(map: &Map) -> Arc<Tally> {
    let tally = Arc::new(Tally::default());
    map.subscribe(cloned!(tally => move |change: &CollectionChange<Arc<Tracked<Job>>>| {
        let counter = match change {
            CollectionChange::Add(_) => &tally.adds,
            CollectionChange::Remove(_) => &tally.removes,
            CollectionChange::Replace { .. } => &tally.replaces,
            CollectionChange::Reset => &tally.resets,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    tally
}

#[test]
fn concurrent_mutation_keeps_subscriptions_in_step() {
    let map = Map::with_capacity_and_shard_amount(KEYS as usize, 8);
    let tally = tally(&map);
    let created: Mutex<Vec<Arc<Tracked<Job>>>> = Mutex::new(Vec::new());

    thread::scope(|scope| {
        for owner in 0..THREADS {
            let map = &map;
            let created = &created;
            scope.spawn(move || {
                for round in 0..ROUNDS {
                    let key = (round * 7 + owner * 13) % KEYS;
                    let value = Arc::new(Tracked::new(Job { owner, attempts: round }));
                    created.lock().unwrap().push(value.clone());

                    match round % 5 {
                        0 => {
                            map.try_add(key, value);
                        }
                        1 => {
                            map.add_or_update(key, |_| value.clone(), |_, _| value.clone());
                        }
                        2 => {
                            map.add_or_merge(key, value);
                        }
                        3 => {
                            map.try_remove(&key);
                        }
                        _ => {
                            if let Some(current) = map.get(&key) {
                                map.try_update(&key, value, &current);
                            }
                        }
                    }
                }
            });
        }
    });

    for (_, value) in map.snapshot() {
        assert_eq!(value.subscriber_count(), 1, "present values have one router");
    }
    let live: Vec<_> = map.values();
    for value in created.lock().unwrap().iter() {
        if !live.iter().any(|v| Arc::ptr_eq(v, value)) {
            assert_eq!(value.subscriber_count(), 0, "retired values have none");
        }
    }

    let adds = tally.adds.load(Ordering::SeqCst);
    let removes = tally.removes.load(Ordering::SeqCst);
    assert_eq!(adds - removes, map.len());
    assert_eq!(tally.resets.load(Ordering::SeqCst), 0);
}

#[test]
fn concurrent_field_changes_are_forwarded() {
    let map = Map::new();
    for key in 0..KEYS {
        map.try_add(key, Tracked::new(Job { owner: key, attempts: 0 }));
    }

    let forwarded = Arc::new(AtomicUsize::new(0));
    map.subscribe_items(cloned!(forwarded => move |_| {
        forwarded.fetch_add(1, Ordering::SeqCst);
    }));
    let structural = tally(&map);

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let map = &map;
            scope.spawn(move || {
                for key in 0..KEYS {
                    if let Some(job) = map.get(&key) {
                        job.update_field("attempts", |j| j.attempts += 1);
                    }
                }
            });
        }
    });

    assert_eq!(forwarded.load(Ordering::SeqCst), (THREADS * KEYS) as usize);
    assert_eq!(structural.adds.load(Ordering::SeqCst), 0);
    assert_eq!(structural.replaces.load(Ordering::SeqCst), 0);
    for key in 0..KEYS {
        assert_eq!(map.get(&key).unwrap().with(|j| j.attempts), THREADS);
    }
}

#[test]
fn observers_may_reenter_the_map() {
    let map = Arc::new(Map::new());
    let seen_len = Arc::new(Mutex::new(Vec::new()));

    let weak = Arc::downgrade(&map);
    map.subscribe(cloned!(seen_len => move |_: &CollectionChange<Arc<Tracked<Job>>>| {
        if let Some(map) = weak.upgrade() {
            seen_len.lock().unwrap().push(map.len());
        }
    }));

    thread::scope(|scope| {
        for owner in 0..4 {
            let map = &map;
            scope.spawn(move || {
                for key in 0..50 {
                    map.try_add(owner * 100 + key, Tracked::new(Job { owner, attempts: 0 }));
                }
            });
        }
    });

    assert_eq!(map.len(), 200);
    assert_eq!(seen_len.lock().unwrap().len(), 200);
}
