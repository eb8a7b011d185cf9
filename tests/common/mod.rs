//! Shared fixtures for the end-to-end tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use spark_fiber::{
    HostHandle, MemoryHost, Node, Root, RootOptions, SetState, TestScheduler, create_root_with_options, el,
};

/// A root over an in-memory tree, driven by a test scheduler.
pub struct Harness {
    pub scheduler: Rc<TestScheduler>,
    pub host: MemoryHost,
    pub container: HostHandle,
    pub root: Root,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(RootOptions::default())
    }

    pub fn with_options(options: RootOptions) -> Self {
        let scheduler = TestScheduler::new();
        let host = MemoryHost::new();
        let container = host.create_container();
        let root = create_root_with_options(container, host.clone(), scheduler.clone(), options);
        Self {
            scheduler,
            host,
            container,
            root,
        }
    }

    /// Render at the sync lane and run everything that follows.
    pub fn render(&self, node: impl Into<Node>) {
        self.root.render(node);
        self.scheduler.flush_all();
    }

    pub fn html(&self) -> String {
        self.host.render_to_string(self.container)
    }

    /// The first host node under the container.
    pub fn first_child(&self) -> HostHandle {
        self.host.children(self.container)[0]
    }
}

/// `<ul>` of keyed `<li>`s: `(key, text)`.
pub fn keyed_list(items: &[(&str, &str)]) -> Node {
    el("ul")
        .children(items.iter().map(|(key, content)| el("li").key(key).text(content)))
        .into()
}

/// Slot a component fills with its setter on every render.
pub type SetterSlot<T> = Rc<RefCell<Option<SetState<T>>>>;

pub fn take_setter<T>(slot: &SetterSlot<T>) -> SetState<T> {
    slot.borrow().clone().expect("component rendered at least once")
}

/// Shared log of strings.
pub type Log = Rc<RefCell<Vec<String>>>;

pub fn drain(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.borrow_mut())
}
