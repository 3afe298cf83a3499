//! Deferred elements and batches.

use std::cell::Cell;
use std::error::Error as _;
use std::rc::Rc;

use kiln_lib::{CollectionError, DomainObjectCollection, Result};
use tracing_test::traced_test;

use super::common::{Compile, Task, compile, counted, new_log, record, tag, test_run};

#[test]
fn deferred_element_is_created_once_on_iteration() {
  let tasks = DomainObjectCollection::<Task>::new();
  let calls = Rc::new(Cell::new(0));
  let added = new_log::<Task>();

  let handle = tasks.add_later(counted(&calls, compile("main"))).unwrap();
  tasks.configure_each(record(&added)).unwrap();
  assert_eq!(calls.get(), 0);
  assert!(added.borrow().is_empty());

  let first: Vec<Task> = tasks.iter().unwrap().collect();
  let second: Vec<Task> = tasks.iter().unwrap().collect();

  assert_eq!(first, vec![compile("main")]);
  assert_eq!(second, vec![compile("main")]);
  assert_eq!(*added.borrow(), vec![compile("main")]);
  assert_eq!(calls.get(), 1);
  assert!(handle.is_realized());
}

#[test]
fn get_is_idempotent() {
  let tasks = DomainObjectCollection::<Task>::new();
  let calls = Rc::new(Cell::new(0));
  let handle = tasks.add_later(counted(&calls, compile("main"))).unwrap();

  assert_eq!(handle.get().unwrap(), compile("main"));
  assert_eq!(handle.get().unwrap(), compile("main"));
  assert_eq!(calls.get(), 1);
}

#[test]
fn flush_preserves_declaration_order() {
  let tasks = DomainObjectCollection::<Task>::new();
  tasks.add(compile("a")).unwrap();
  tasks.add_later(|| Ok(compile("b"))).unwrap();
  tasks.add(compile("c")).unwrap();
  tasks.add_later(|| Ok(compile("d"))).unwrap();

  assert_eq!(
    tasks.to_vec().unwrap(),
    vec![compile("a"), compile("b"), compile("c"), compile("d")]
  );
}

#[test]
fn size_counts_pending_without_realizing() {
  let tasks = DomainObjectCollection::<Task>::new();
  let calls = Rc::new(Cell::new(0));
  tasks.add(compile("a")).unwrap();
  let handle = tasks.add_later(counted(&calls, compile("b"))).unwrap();

  assert_eq!(tasks.size().unwrap(), 2);
  assert!(tasks.estimated_size() >= 2);
  assert!(!tasks.is_empty().unwrap());
  assert_eq!(calls.get(), 0);
  assert!(!handle.is_realized());
}

#[test]
fn eager_subscriber_forces_realization() {
  let tasks = DomainObjectCollection::<Task>::new();
  let added = new_log::<Task>();
  let handle = tasks.add_later(|| Ok(compile("main"))).unwrap();
  assert!(!handle.is_realized());

  tasks.when_object_added(record(&added)).unwrap();

  assert!(handle.is_realized());
  assert_eq!(*added.borrow(), vec![compile("main")]);
}

#[test]
fn add_later_realizes_immediately_when_subscribed() {
  let tasks = DomainObjectCollection::<Task>::new();
  let added = new_log::<Task>();
  tasks.configure_each(record(&added)).unwrap();

  let handle = tasks.add_later(|| Ok(compile("main"))).unwrap();

  assert!(handle.is_realized());
  assert_eq!(*added.borrow(), vec![compile("main")]);
}

#[test]
fn removing_pending_element_cancels_it() {
  let tasks = DomainObjectCollection::<Task>::new();
  let calls = Rc::new(Cell::new(0));
  let removed = new_log::<Task>();
  tasks.when_object_removed(record(&removed));
  let handle = tasks.add_later(counted(&calls, compile("main"))).unwrap();

  assert!(tasks.remove_deferred(&handle).unwrap());

  assert!(tasks.to_vec().unwrap().is_empty());
  assert_eq!(calls.get(), 0);
  assert!(removed.borrow().is_empty());
  assert!(handle.was_removed());
  assert!(!handle.is_present());
  assert!(matches!(handle.get(), Err(CollectionError::NoLongerPresent { .. })));
  assert_eq!(handle.get_or_none().unwrap(), None);
}

#[test]
fn removing_realized_element_fires_event() {
  let tasks = DomainObjectCollection::<Task>::new();
  let removed = new_log::<Task>();
  tasks.when_object_removed(record(&removed));
  let handle = tasks.add_later(|| Ok(compile("main"))).unwrap();
  handle.get().unwrap();

  assert!(tasks.remove_deferred(&handle).unwrap());
  assert!(!tasks.remove_deferred(&handle).unwrap());
  assert_eq!(*removed.borrow(), vec![compile("main")]);
}

#[test]
fn handle_reports_removal_after_realization() {
  let tasks = DomainObjectCollection::<Task>::new();
  let handle = tasks.add_later(|| Ok(compile("main"))).unwrap();
  let value = handle.get().unwrap();
  assert!(handle.is_present());

  tasks.remove(&value).unwrap();

  assert!(handle.was_removed());
  let err = handle.get().unwrap_err();
  assert_eq!(
    err.to_string(),
    "the domain object (Task) for this provider is no longer present in its container"
  );
  assert_eq!(handle.get_or_none().unwrap(), None);
}

#[test]
fn clear_cancels_pending_elements() {
  let tasks = DomainObjectCollection::<Task>::new();
  let calls = Rc::new(Cell::new(0));
  tasks.add(compile("a")).unwrap();
  let handle = tasks.add_later(counted(&calls, compile("b"))).unwrap();

  tasks.clear().unwrap();

  assert!(handle.was_removed());
  assert!(tasks.to_vec().unwrap().is_empty());
  assert_eq!(calls.get(), 0);
}

fn failing(calls: &Rc<Cell<usize>>, message: &'static str) -> impl FnOnce() -> Result<Task> + 'static {
  let calls = Rc::clone(calls);
  move || {
    calls.set(calls.get() + 1);
    Err(CollectionError::action(message))
  }
}

#[test]
#[traced_test]
fn creation_failure_is_cached() {
  let tasks = DomainObjectCollection::<Task>::new();
  let calls = Rc::new(Cell::new(0));
  tasks.add(compile("a")).unwrap();
  let handle = tasks.add_later(failing(&calls, "toolchain not found")).unwrap();

  let first = handle.get().unwrap_err();
  let second = handle.get().unwrap_err();

  assert_eq!(first.to_string(), "could not create domain object (Task)");
  assert_eq!(
    first.source().map(|s| s.to_string()).as_deref(),
    Some("toolchain not found")
  );
  assert_eq!(first, second);
  assert_eq!(calls.get(), 1);
  assert!(!handle.is_present());
  assert!(logs_contain("failed to create deferred element"));

  // The failed element leaves the container, which stays usable.
  assert_eq!(tasks.size().unwrap(), 1);
  assert_eq!(tasks.to_vec().unwrap(), vec![compile("a")]);
  assert!(tasks.contains(&compile("a")).unwrap());
  assert_eq!(calls.get(), 1);
}

#[test]
fn failure_during_flush_still_realizes_later_elements() {
  let tasks = DomainObjectCollection::<Task>::new();
  let calls = Rc::new(Cell::new(0));
  tasks.add(compile("a")).unwrap();
  let bad = tasks.add_later(failing(&calls, "boom")).unwrap();
  let good = tasks.add_later(|| Ok(compile("c"))).unwrap();

  let err = tasks.to_vec().unwrap_err();

  assert!(matches!(err, CollectionError::CreationFailed { .. }));
  assert!(good.is_realized());
  assert_eq!(tasks.to_vec().unwrap(), vec![compile("a"), compile("c")]);
  assert_eq!(tasks.size().unwrap(), 2);
  assert_eq!(bad.get().unwrap_err(), err);
  assert_eq!(calls.get(), 1);
}

#[test]
fn removing_failed_element_returns_false() {
  let tasks = DomainObjectCollection::<Task>::new();
  let calls = Rc::new(Cell::new(0));
  let removed = new_log::<Task>();
  tasks.when_object_removed(record(&removed));
  let handle = tasks.add_later(failing(&calls, "boom")).unwrap();
  assert!(handle.get().is_err());

  assert!(!tasks.remove_deferred(&handle).unwrap());

  assert!(removed.borrow().is_empty());
  assert!(tasks.is_empty().unwrap());
  assert!(matches!(handle.get(), Err(CollectionError::CreationFailed { .. })));
}

#[test]
fn configure_on_failed_element_returns_failure() {
  let tasks = DomainObjectCollection::<Task>::new();
  let calls = Rc::new(Cell::new(0));
  let handle = tasks.add_later(failing(&calls, "boom")).unwrap();
  let failure = handle.get().unwrap_err();

  assert_eq!(handle.configure(|_| Ok(())).unwrap_err(), failure);
}

#[test]
fn configure_runs_after_container_subscribers_at_realization() {
  let tasks = DomainObjectCollection::<Task>::new();
  let log = new_log::<String>();
  let handle = tasks.add_later(|| Ok(compile("main"))).unwrap();
  tasks.configure_each(tag::<Task>(&log, "each")).unwrap();

  handle.configure(tag::<Task>(&log, "configure")).unwrap();
  assert!(log.borrow().is_empty());
  assert!(!handle.is_realized());

  handle.get().unwrap();
  assert_eq!(*log.borrow(), vec!["each", "configure"]);
}

#[test]
fn configure_on_realized_element_runs_immediately() {
  let tasks = DomainObjectCollection::<Task>::new();
  let seen = new_log::<Task>();
  let handle = tasks.add_later(|| Ok(compile("main"))).unwrap();
  handle.get().unwrap();

  handle.configure(record(&seen)).unwrap();
  assert_eq!(*seen.borrow(), vec![compile("main")]);
}

#[test]
fn configure_disables_mutation() {
  let tasks = DomainObjectCollection::<Task>::new();
  let handle = tasks.add_later(|| Ok(compile("main"))).unwrap();
  handle.get().unwrap();

  let inner = tasks.clone();
  let err = handle
    .configure(move |_| inner.add(test_run("sneaky")).map(|_| ()))
    .unwrap_err();

  assert!(matches!(err, CollectionError::IllegalMutation { .. }));
  assert!(!tasks.contains(&test_run("sneaky")).unwrap());
}

#[test]
fn configure_on_cancelled_element_fails() {
  let tasks = DomainObjectCollection::<Task>::new();
  let handle = tasks.add_later(|| Ok(compile("main"))).unwrap();
  tasks.remove_deferred(&handle).unwrap();

  let err = handle.configure(|_| Ok(())).unwrap_err();
  assert!(matches!(err, CollectionError::NoLongerPresent { .. }));
}

#[test]
fn deferred_element_through_view_is_realized_by_view_subscriber() {
  let tasks = DomainObjectCollection::<Task>::new();
  let compiles = tasks.with_type::<Compile>();
  let root_pending = tasks.add_later(|| Ok(compile("declared-as-task"))).unwrap();
  let view_pending = compiles
    .add_later(|| {
      Ok(Compile {
        name: "declared-as-compile".to_string(),
      })
    })
    .unwrap();
  assert_eq!(view_pending.to_string(), "provider(Compile, Compile)");

  let seen = new_log::<Compile>();
  compiles.when_object_added(record(&seen)).unwrap();

  // Only producers declared with a compatible type are forced.
  assert!(view_pending.is_realized());
  assert!(!root_pending.is_realized());
  assert_eq!(
    *seen.borrow(),
    vec![Compile {
      name: "declared-as-compile".to_string()
    }]
  );
}

#[test]
fn batch_is_evaluated_once_and_realized_on_flush() {
  let tasks = DomainObjectCollection::<Task>::new();
  let calls = Rc::new(Cell::new(0));
  let added = new_log::<Task>();
  tasks.add(compile("first")).unwrap();
  tasks
    .add_all_later(counted(&calls, vec![compile("a"), test_run("b")]))
    .unwrap();
  tasks.configure_each(record(&added)).unwrap();

  assert_eq!(tasks.size().unwrap(), 3);
  assert_eq!(tasks.summary().realized, 1);
  assert_eq!(added.borrow().len(), 1);

  assert_eq!(
    tasks.to_vec().unwrap(),
    vec![compile("first"), compile("a"), test_run("b")]
  );
  assert_eq!(*added.borrow(), vec![compile("first"), compile("a"), test_run("b")]);
  assert_eq!(calls.get(), 1);
}

#[test]
#[traced_test]
fn failing_batch_is_dropped_after_reporting() {
  let tasks = DomainObjectCollection::<Task>::new();
  tasks.add(compile("a")).unwrap();
  tasks
    .add_all_later(|| Err::<Vec<Task>, _>(CollectionError::action("offline")))
    .unwrap();

  let err = tasks.size().unwrap_err();

  assert!(matches!(err, CollectionError::CreationFailed { .. }));
  assert!(logs_contain("failed to create deferred batch"));
  assert_eq!(tasks.size().unwrap(), 1);
  assert!(!tasks.is_empty().unwrap());
  assert_eq!(tasks.to_vec().unwrap(), vec![compile("a")]);
  assert_eq!(tasks.summary().pending, 0);
}

#[test]
fn failing_batch_does_not_block_flush_for_good() {
  let tasks = DomainObjectCollection::<Task>::new();
  tasks
    .add_all_later(|| Err::<Vec<Task>, _>(CollectionError::action("offline")))
    .unwrap();
  tasks.add_later(|| Ok(compile("b"))).unwrap();

  assert!(tasks.to_vec().is_err());
  assert_eq!(tasks.to_vec().unwrap(), vec![compile("b")]);
}

#[test]
fn size_does_not_count_duplicate_batch_values() {
  let tasks = DomainObjectCollection::<Task>::new();
  tasks.add(compile("a")).unwrap();
  tasks
    .add_all_later(|| Ok(vec![compile("a"), compile("b"), compile("b")]))
    .unwrap();

  assert_eq!(tasks.size().unwrap(), 2);
  assert_eq!(tasks.to_vec().unwrap(), vec![compile("a"), compile("b")]);
}

#[test]
fn pending_single_counts_until_realized_as_duplicate() {
  let tasks = DomainObjectCollection::<Task>::new();
  tasks.add(compile("a")).unwrap();
  tasks.add_later(|| Ok(compile("a"))).unwrap();

  assert_eq!(tasks.size().unwrap(), 2);
  assert_eq!(tasks.to_vec().unwrap(), vec![compile("a")]);
  assert_eq!(tasks.size().unwrap(), 1);
}

#[test]
fn batch_realizes_immediately_when_subscribed() {
  let tasks = DomainObjectCollection::<Task>::new();
  let added = new_log::<Task>();
  tasks.when_object_added(record(&added)).unwrap();

  tasks.add_all_later(|| Ok([compile("a"), compile("b")])).unwrap();

  assert_eq!(*added.borrow(), vec![compile("a"), compile("b")]);
  assert_eq!(tasks.summary().pending, 0);
}
