//! Shared element model and helpers for collection integration tests.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use kiln_lib::{Element, Result, Subtype};

/// A build task. Compile and test tasks are addressable through `with_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
  Compile(Compile),
  Test(TestRun),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Compile {
  pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestRun {
  pub name: String,
}

impl Task {
  pub fn name(&self) -> &str {
    match self {
      Task::Compile(c) => &c.name,
      Task::Test(t) => &t.name,
    }
  }
}

impl Subtype<Task> for Compile {
  fn narrow(value: &Task) -> Option<Self> {
    match value {
      Task::Compile(c) => Some(c.clone()),
      Task::Test(_) => None,
    }
  }

  fn widen(self) -> Task {
    Task::Compile(self)
  }
}

impl Subtype<Task> for TestRun {
  fn narrow(value: &Task) -> Option<Self> {
    match value {
      Task::Test(t) => Some(t.clone()),
      Task::Compile(_) => None,
    }
  }

  fn widen(self) -> Task {
    Task::Test(self)
  }
}

pub fn compile(name: &str) -> Task {
  Task::Compile(Compile { name: name.to_string() })
}

pub fn test_run(name: &str) -> Task {
  Task::Test(TestRun { name: name.to_string() })
}

/// Shared, growable log that callbacks push into.
pub type Log<T> = Rc<RefCell<Vec<T>>>;

pub fn new_log<T>() -> Log<T> {
  Rc::new(RefCell::new(Vec::new()))
}

/// A callback appending every element it sees to `log`.
pub fn record<T: Element>(log: &Log<T>) -> impl Fn(&T) -> Result<()> + 'static {
  let log = Rc::clone(log);
  move |value: &T| {
    log.borrow_mut().push(value.clone());
    Ok(())
  }
}

/// A callback appending `tag` to `log` for every element it sees.
pub fn tag<T: Element>(log: &Log<String>, tag: &'static str) -> impl Fn(&T) -> Result<()> + 'static {
  let log = Rc::clone(log);
  move |_: &T| {
    log.borrow_mut().push(tag.to_string());
    Ok(())
  }
}

/// A factory that counts its invocations.
pub fn counted<T: 'static>(calls: &Rc<Cell<usize>>, value: T) -> impl FnOnce() -> Result<T> + 'static {
  let calls = Rc::clone(calls);
  move || {
    calls.set(calls.get() + 1);
    Ok(value)
  }
}
