use observable_collections::{ObservableConcurrentMap, Tracked, merge_fields};
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq)]
struct Sensor {
    label: String,
    reading: i32,
}

merge_fields!(Sensor { label, reading });

type Map = ObservableConcurrentMap<u32, Tracked<Sensor>>;

fn sensor(label: &str, reading: i32) -> Arc<Tracked<Sensor>> {
    Arc::new(Tracked::new(Sensor {
        label: label.into(),
        reading,
    }))
}

fn count_item_events(map: &Map) -> Arc<Mutex<usize>> {
    let count = Arc::new(Mutex::new(0));
    let sink = count.clone();
    map.subscribe_items(move |_| *sink.lock().unwrap() += 1);
    count
}

#[test]
fn test_map_drop_detaches_every_value() {
    let a = sensor("a", 1);
    let b = sensor("b", 2);

    {
        let map = Map::new();
        map.try_add(1, a.clone());
        map.try_add(2, b.clone());
        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(b.subscriber_count(), 1);
        // map drops here
    }

    assert_eq!(a.subscriber_count(), 0, "dropping the map should detach its router");
    assert_eq!(b.subscriber_count(), 0);

    // Values outlive the map and keep working on their own.
    a.update_field("reading", |s| s.reading = 10);
    assert_eq!(a.with(|s| s.reading), 10);
}

#[test]
fn test_removed_value_stops_forwarding() {
    let map = Map::new();
    let changes = count_item_events(&map);
    let value = sensor("probe", 0);

    map.try_add(7, value.clone());
    value.update_field("reading", |s| s.reading = 1);
    assert_eq!(*changes.lock().unwrap(), 1);

    let removed = map.try_remove(&7).unwrap();
    assert!(Arc::ptr_eq(&removed, &value));
    assert_eq!(value.subscriber_count(), 0);

    value.update_field("reading", |s| s.reading = 2);
    assert_eq!(*changes.lock().unwrap(), 1, "a removed value must not reach the map");
}

#[test]
fn test_replaced_value_is_detached() {
    let map = Map::new();
    let changes = count_item_events(&map);
    let first = sensor("first", 0);
    let second = sensor("second", 0);

    map.try_add(1, first.clone());
    map.add_or_update(1, |_| second.clone(), |_, _| second.clone());

    assert_eq!(first.subscriber_count(), 0);
    assert_eq!(second.subscriber_count(), 1);

    first.update_field("reading", |s| s.reading = 5);
    assert_eq!(*changes.lock().unwrap(), 0);

    second.update_field("reading", |s| s.reading = 5);
    assert_eq!(*changes.lock().unwrap(), 1);
}

#[test]
fn test_try_update_moves_subscription() {
    let map = Map::new();
    let first = sensor("first", 0);
    let second = sensor("second", 0);

    map.try_add(1, first.clone());
    assert!(!map.try_update(&1, second.clone(), &second));
    assert_eq!(first.subscriber_count(), 1);

    assert!(map.try_update(&1, second.clone(), &first));
    assert_eq!(first.subscriber_count(), 0);
    assert_eq!(second.subscriber_count(), 1);
}

#[test]
fn test_clear_detaches_everything() {
    let map = Map::new();
    let values: Vec<_> = (0..16).map(|i| sensor("s", i)).collect();
    for (i, value) in values.iter().enumerate() {
        map.try_add(i as u32, value.clone());
    }

    map.clear();

    assert!(map.is_empty());
    assert!(values.iter().all(|v| v.subscriber_count() == 0));
}

#[test]
fn test_value_shared_between_maps() {
    let shared = sensor("shared", 0);
    let left = Map::new();
    let right = Map::new();
    let left_changes = count_item_events(&left);
    let right_changes = count_item_events(&right);

    left.try_add(1, shared.clone());
    right.try_add(9, shared.clone());
    assert_eq!(shared.subscriber_count(), 2);

    left.try_remove(&1);
    assert_eq!(shared.subscriber_count(), 1);

    shared.update_field("label", |s| s.label = "moved".into());
    assert_eq!(*left_changes.lock().unwrap(), 0);
    assert_eq!(*right_changes.lock().unwrap(), 1);
}

#[test]
fn test_unsubscribed_observer_is_released() {
    let map = Map::new();
    let token = Arc::new(());
    let held = token.clone();

    let id = map.subscribe(move |_| {
        let _ = &held;
    });
    assert_eq!(Arc::strong_count(&token), 2);

    assert!(map.unsubscribe(id));
    assert_eq!(Arc::strong_count(&token), 1, "unsubscribing should drop the closure");
    assert!(!map.unsubscribe(id));
}
