use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::test::{name_of, people_data, people_query, person_data, person_query};
use crate::*;

fn counter(cache: &Cache, descriptor: QueryDescriptor) -> (SubscriptionHandle, Rc<Cell<usize>>) {
    let count = Rc::new(Cell::new(0));
    let count_clone = count.clone();
    let handle = cache.subscribe(descriptor, move |_, _| {
        count_clone.set(count_clone.get() + 1);
        Ok(())
    });
    (handle, count)
}

#[test]
fn test_cache_write_notifies_synchronously_once() -> Result<()> {
    let cache = Cache::new();
    cache.write(&person_query(2), &person_data(2, "Bob"))?;

    let received = Rc::new(RefCell::new(Vec::new()));
    let received_clone = received.clone();
    cache.subscribe(person_query(2), move |_, result| {
        received_clone.borrow_mut().push(result.clone());
        Ok(())
    });

    cache.write(&person_query(2), &person_data(2, "Bob1"))?;

    // Delivered before write returned, exactly once
    let received = received.borrow();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0], person_data(2, "Bob1"));
    Ok(())
}

#[test]
fn test_change_through_other_query_notifies() -> Result<()> {
    let cache = Cache::new();
    cache.write(&people_query(), &people_data(&[(1, "Ann"), (2, "Bob")]))?;
    let (_, people_count) = counter(&cache, people_query());

    // Same entity, written through a different query
    cache.write(&person_query(2), &person_data(2, "Bobby"))?;
    assert_eq!(people_count.get(), 1);
    Ok(())
}

#[test]
fn test_no_spurious_notifications() -> Result<()> {
    let cache = Cache::new();
    cache.write(&person_query(1), &person_data(1, "Ann"))?;
    cache.write(&person_query(2), &person_data(2, "Bob"))?;

    let (_, count) = counter(&cache, person_query(2));

    // Unrelated entity
    cache.write(&person_query(1), &person_data(1, "Annie"))?;
    assert_eq!(count.get(), 0);

    // Same data again
    cache.write(&person_query(2), &person_data(2, "Bob"))?;
    assert_eq!(count.get(), 0);

    // Unrelated field on a dependency does not change the result
    let email = QueryDescriptor::new(
        Selection::new().field(
            FieldSelection::new("person")
                .arg("id", Argument::literal(2))
                .of_type("Person")
                .select(Selection::leaves(&["id", "email"])),
        ),
    );
    cache.write(&email, &sobj! { "person" => sobj! { "id" => 2, "email" => "bob@example.com" } })?;
    assert_eq!(count.get(), 0);
    Ok(())
}

#[test]
fn test_unresolved_watch_fires_once_resolved() -> Result<()> {
    let cache = Cache::new();
    let (_, count) = counter(&cache, person_query(2));

    cache.write(&person_query(1), &person_data(1, "Ann"))?;
    assert_eq!(count.get(), 0);

    cache.write(&person_query(2), &person_data(2, "Bob"))?;
    assert_eq!(count.get(), 1);
    Ok(())
}

#[test]
fn test_evicted_then_rewritten_fires_again() -> Result<()> {
    let cache = Cache::new();
    cache.write(&person_query(2), &person_data(2, "Bob"))?;
    let (_, count) = counter(&cache, person_query(2));

    cache.evict(&EntityKey::from("Person:2"))?;
    assert_eq!(count.get(), 0);

    cache.write(&person_query(2), &person_data(2, "Bob"))?;
    assert_eq!(count.get(), 1);
    Ok(())
}

#[test]
fn test_equivalent_descriptors_share_a_watch() -> Result<()> {
    let cache = Cache::new();
    cache.write(&person_query(2), &person_data(2, "Bob"))?;

    let (first, first_count) = counter(&cache, person_query(2));
    let (second, second_count) = counter(&cache, person_query(2));
    let (other, _) = counter(&cache, person_query(3));

    assert_eq!(first.watch_id(), second.watch_id());
    assert_ne!(first.watch_id(), other.watch_id());
    assert_ne!(first, second);
    assert_eq!(cache.watch_count(), 2);
    assert_eq!(cache.subscription_count(), 3);

    cache.write(&person_query(2), &person_data(2, "Bob1"))?;
    assert_eq!(first_count.get(), 1);
    assert_eq!(second_count.get(), 1);

    assert!(cache.unsubscribe(&first));
    assert!(!cache.unsubscribe(&first));
    assert_eq!(cache.watch_count(), 2);

    // The remaining observer keeps the watch state, so no forced miss
    cache.write(&person_query(2), &person_data(2, "Bob1"))?;
    assert_eq!(second_count.get(), 1);

    assert!(cache.unsubscribe(&second));
    assert_eq!(cache.watch_count(), 1);
    Ok(())
}

#[test]
fn test_nested_write_is_dispatched_depth_first() -> Result<()> {
    let cache = Cache::new();
    cache.write(&person_query(1), &person_data(1, "Ann"))?;
    cache.write(&person_query(2), &person_data(2, "Bob"))?;

    let events = Rc::new(RefCell::new(Vec::new()));

    let events_a = events.clone();
    cache.subscribe(person_query(1), move |cache, _| {
        events_a.borrow_mut().push("A start".to_string());
        cache.write(&person_query(2), &person_data(2, "Bob from A"))?;
        events_a.borrow_mut().push("A end".to_string());
        Ok(())
    });

    let events_b = events.clone();
    cache.subscribe(person_query(2), move |_, result| {
        events_b
            .borrow_mut()
            .push(format!("B {}", name_of(result, "person").unwrap_or_default()));
        Ok(())
    });

    cache.write(&person_query(1), &person_data(1, "Annie"))?;

    assert_eq!(
        *events.borrow(),
        vec!["A start", "B Bob from A", "A end"]
    );
    Ok(())
}

#[test]
fn test_read_inside_callback_sees_post_write_state() -> Result<()> {
    let cache = Cache::new();
    cache.write(&people_query(), &people_data(&[(1, "Ann"), (2, "Bob")]))?;
    cache.write(&person_query(2), &person_data(2, "Bob"))?;

    let seen = Rc::new(RefCell::new(None));
    let seen_clone = seen.clone();
    cache.subscribe(person_query(2), move |cache, _| {
        *seen_clone.borrow_mut() = cache.read(&people_query());
        Ok(())
    });

    cache.write(&people_query(), &people_data(&[(1, "Ann2"), (2, "Bob2")]))?;
    assert_eq!(*seen.borrow(), Some(people_data(&[(1, "Ann2"), (2, "Bob2")])));
    Ok(())
}

#[test]
fn test_self_triggering_callback_is_bounded() -> Result<()> {
    let cache = Cache::with_config(CacheConfig::default().with_max_dispatch_depth(3));
    cache.write(&person_query(2), &person_data(2, "Bob"))?;

    let count = Rc::new(Cell::new(0));
    let count_clone = count.clone();
    cache.subscribe(person_query(2), move |cache, result| {
        count_clone.set(count_clone.get() + 1);
        let name = name_of(result, "person").unwrap_or_default();
        cache.write(&person_query(2), &person_data(2, &format!("{}1", name)))
    });

    // The outer write succeeds; the innermost nested write is refused
    cache.write(&person_query(2), &person_data(2, "Bob1"))?;
    assert_eq!(count.get(), 3);
    assert_eq!(
        name_of(&cache.read(&person_query(2)).unwrap(), "person").as_deref(),
        Some("Bob111")
    );

    // Depth is back to zero afterwards
    cache.write(&person_query(1), &person_data(1, "Ann"))?;
    Ok(())
}

#[test]
fn test_callback_writing_same_result_does_not_loop() -> Result<()> {
    let cache = Cache::new();
    cache.write(&person_query(2), &person_data(2, "Bob"))?;

    let count = Rc::new(Cell::new(0));
    let count_clone = count.clone();
    cache.subscribe(person_query(2), move |cache, result| {
        count_clone.set(count_clone.get() + 1);
        cache.write(&person_query(2), result)
    });

    cache.write(&person_query(2), &person_data(2, "Bob1"))?;
    assert_eq!(count.get(), 1);
    Ok(())
}

#[test]
fn test_result_restored_by_nested_writes_is_not_delivered_twice() -> Result<()> {
    let cache = Cache::new();
    cache.write(&person_query(2), &person_data(2, "Bob"))?;

    // First observer flips the name away and back from inside its callback
    let calls = Rc::new(Cell::new(0));
    let calls_clone = calls.clone();
    cache.subscribe(person_query(2), move |cache, _| {
        calls_clone.set(calls_clone.get() + 1);
        match calls_clone.get() {
            1 => cache.write(&person_query(2), &person_data(2, "Bob2")),
            2 => cache.write(&person_query(2), &person_data(2, "Bob1")),
            _ => Ok(()),
        }
    });

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_clone = seen.clone();
    cache.subscribe(person_query(2), move |_, result| {
        seen_clone
            .borrow_mut()
            .push(name_of(result, "person").unwrap_or_default());
        Ok(())
    });

    cache.write(&person_query(2), &person_data(2, "Bob1"))?;

    assert_eq!(calls.get(), 3);
    assert_eq!(*seen.borrow(), vec!["Bob1"]);

    // A later real change still reaches the second observer
    cache.write(&person_query(2), &person_data(2, "Bob3"))?;
    assert_eq!(*seen.borrow(), vec!["Bob1", "Bob3"]);
    Ok(())
}

#[test]
fn test_failing_subscriber_is_isolated() -> Result<()> {
    let cache = Cache::new();
    cache.write(&person_query(2), &person_data(2, "Bob"))?;

    cache.subscribe(person_query(2), |_, _| Err(Error::Subscriber("broken".to_string())));
    cache.subscribe(person_query(2), |_, _| panic!("subscriber panicked"));
    let (_, count) = counter(&cache, person_query(2));

    cache.write(&person_query(2), &person_data(2, "Bob1"))?;
    assert_eq!(count.get(), 1);
    assert_eq!(cache.read(&person_query(2)), Some(person_data(2, "Bob1")));
    Ok(())
}

#[test]
fn test_unsubscribe_during_own_notification() -> Result<()> {
    let cache = Cache::new();
    cache.write(&person_query(2), &person_data(2, "Bob"))?;

    let own_handle: Rc<RefCell<Option<SubscriptionHandle>>> = Rc::new(RefCell::new(None));
    let count = Rc::new(Cell::new(0));

    let handle = {
        let own_handle = own_handle.clone();
        let count = count.clone();
        cache.subscribe(person_query(2), move |cache, _| {
            count.set(count.get() + 1);
            if let Some(handle) = own_handle.borrow().as_ref() {
                cache.unsubscribe(handle);
            }
            Ok(())
        })
    };
    *own_handle.borrow_mut() = Some(handle);
    let (_, other_count) = counter(&cache, person_query(2));

    cache.write(&person_query(2), &person_data(2, "Bob1"))?;
    assert_eq!(count.get(), 1);
    assert_eq!(other_count.get(), 1);

    cache.write(&person_query(2), &person_data(2, "Bob2"))?;
    assert_eq!(count.get(), 1);
    assert_eq!(other_count.get(), 2);
    Ok(())
}

#[test]
fn test_unsubscribe_other_observer_during_dispatch() -> Result<()> {
    let cache = Cache::new();
    cache.write(&person_query(2), &person_data(2, "Bob"))?;

    let victim: Rc<RefCell<Option<SubscriptionHandle>>> = Rc::new(RefCell::new(None));
    let victim_clone = victim.clone();
    cache.subscribe(person_query(2), move |cache, _| {
        if let Some(handle) = victim_clone.borrow_mut().take() {
            cache.unsubscribe(&handle);
        }
        Ok(())
    });
    let (handle, victim_count) = counter(&cache, person_query(2));
    *victim.borrow_mut() = Some(handle);

    cache.write(&person_query(2), &person_data(2, "Bob1"))?;
    assert_eq!(victim_count.get(), 0);
    assert_eq!(cache.subscription_count(), 1);
    Ok(())
}

#[test]
fn test_watch_channel() -> Result<()> {
    let cache = Cache::new();
    cache.write(&person_query(2), &person_data(2, "Bob"))?;

    let (handle, mut receiver) = cache.watch_channel(person_query(2));
    cache.write(&person_query(2), &person_data(2, "Bob1"))?;
    cache.write(&person_query(2), &person_data(2, "Bob2"))?;

    assert_eq!(receiver.try_recv().ok(), Some(person_data(2, "Bob1")));
    assert_eq!(receiver.try_recv().ok(), Some(person_data(2, "Bob2")));
    assert!(receiver.try_recv().is_err());

    // A dropped receiver only makes the callback fail
    drop(receiver);
    cache.write(&person_query(2), &person_data(2, "Bob3"))?;
    assert!(cache.unsubscribe(&handle));
    Ok(())
}

#[test]
fn test_restore_notifies_changed_watches() -> Result<()> {
    let cache = Cache::new();
    cache.write(&person_query(2), &person_data(2, "Bob"))?;
    let snapshot = cache.extract();

    cache.write(&person_query(2), &person_data(2, "Bob1"))?;
    let (_, count) = counter(&cache, person_query(2));

    cache.restore(snapshot)?;
    assert_eq!(count.get(), 1);
    assert_eq!(cache.read(&person_query(2)), Some(person_data(2, "Bob")));
    Ok(())
}
