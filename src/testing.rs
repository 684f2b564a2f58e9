//! Host-side fixtures shared by the unit tests.

use std::boxed::Box;
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use crate::context::{Context, Cx};
use crate::error::{ErrorCode, Status};

/// Lifecycle event recorded by a [`Probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    New(&'static str),
    Enter(&'static str),
    Run(&'static str),
    Idle(&'static str),
    Exit(&'static str),
    Drop(&'static str),
}

pub(crate) type Journal = Arc<Mutex<Vec<Event>>>;

pub(crate) fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn events(journal: &Journal) -> Vec<Event> {
    journal.lock().unwrap().clone()
}

type Hook = Box<dyn FnMut(&Cx) -> Status + Send>;

/// Context that records every lifecycle call and optionally runs a hook.
pub(crate) struct Probe {
    name: &'static str,
    journal: Journal,
    on_enter: Option<Hook>,
    on_run: Option<Hook>,
    on_idle: Option<Hook>,
    on_exit: Option<Hook>,
}

impl Probe {
    pub(crate) fn new(name: &'static str, journal: &Journal) -> Self {
        journal.lock().unwrap().push(Event::New(name));
        Self {
            name,
            journal: journal.clone(),
            on_enter: None,
            on_run: None,
            on_idle: None,
            on_exit: None,
        }
    }

    pub(crate) fn on_enter(mut self, hook: impl FnMut(&Cx) -> Status + Send + 'static) -> Self {
        self.on_enter = Some(Box::new(hook));
        self
    }

    pub(crate) fn on_run(mut self, hook: impl FnMut(&Cx) -> Status + Send + 'static) -> Self {
        self.on_run = Some(Box::new(hook));
        self
    }

    pub(crate) fn on_idle(mut self, hook: impl FnMut(&Cx) -> Status + Send + 'static) -> Self {
        self.on_idle = Some(Box::new(hook));
        self
    }

    pub(crate) fn on_exit(mut self, hook: impl FnMut(&Cx) -> Status + Send + 'static) -> Self {
        self.on_exit = Some(Box::new(hook));
        self
    }

    fn record(&self, event: Event) {
        self.journal.lock().unwrap().push(event);
    }
}

fn call(hook: &mut Option<Hook>, cx: &Cx) -> Status {
    match hook {
        Some(hook) => hook(cx),
        None => Ok(()),
    }
}

impl Context for Probe {
    fn enter(&mut self, cx: &Cx) -> Status {
        self.record(Event::Enter(self.name));
        call(&mut self.on_enter, cx)
    }

    fn run(&mut self, cx: &Cx) -> Status {
        self.record(Event::Run(self.name));
        call(&mut self.on_run, cx)
    }

    fn idle(&mut self, cx: &Cx) -> Status {
        self.record(Event::Idle(self.name));
        call(&mut self.on_idle, cx)
    }

    fn exit(&mut self, cx: &Cx) -> Status {
        self.record(Event::Exit(self.name));
        call(&mut self.on_exit, cx)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for Probe {
    fn drop(&mut self) {
        self.record(Event::Drop(self.name));
    }
}

/// Shorthand for a non-zero status code in tests.
pub(crate) fn code(value: i32) -> ErrorCode {
    ErrorCode::from_status(value).unwrap()
}
