//! Counter Example - Hooks, batching, transitions and keyed reorders
//!
//! This example drives a root by hand with the deterministic scheduler:
//! - Mounting a component tree into an in-memory host
//! - Batching several `set_state` calls into one render
//! - A transition that shows its pending state first
//! - Reordering a keyed list and reading back the commit record
//!
//! Set `RUST_LOG=spark_fiber=debug` to watch the work loop.
//!
//! Run with: cargo run --example counter

use std::cell::RefCell;
use std::rc::Rc;

use crossterm::style::Stylize;
use spark_fiber::{
    Component, HostHandle, MemoryHost, Root, SetState, StartTransition, TestScheduler, component, create_root, el,
};
use tracing_subscriber::EnvFilter;

type Slot<T> = Rc<RefCell<Option<T>>>;

fn show(step: &str, host: &MemoryHost, container: HostHandle, root: &Root) {
    println!("{} {}", "▸".cyan(), step.bold());
    println!("  {}", host.render_to_string(container).green());
    if let Some(commit) = root.last_commit() {
        println!(
            "  {} lane={:?} effects={} deleted={:?} moved={:?}",
            "commit".dark_grey(),
            commit.lane,
            commit.effects.len(),
            commit.deleted_keys(),
            commit.moved_keys(),
        );
    }
    println!();
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    println!("=== spark-fiber Counter Example ===\n");

    let scheduler = TestScheduler::new();
    let host = MemoryHost::new();
    let container = host.create_container();
    let root = create_root(container, host.clone(), scheduler.clone());

    // Components publish their setters so main can play the user.
    let set_count: Slot<SetState<i64>> = Rc::default();
    let set_items: Slot<SetState<Vec<&'static str>>> = Rc::default();
    let starter: Slot<StartTransition> = Rc::default();

    let counter = {
        let set_count = set_count.clone();
        let starter = starter.clone();
        Component::new("Counter", move |cx, _props| {
            let (count, set) = cx.use_state(|| 0_i64)?;
            let (pending, start) = cx.use_transition()?;
            *set_count.borrow_mut() = Some(set);
            *starter.borrow_mut() = Some(start);
            let label = if pending { " (pending)" } else { "" };
            Ok(el("h1").text(format!("count: {count}{label}")).into())
        })
    };

    let list = {
        let set_items = set_items.clone();
        Component::new("List", move |cx, _props| {
            let (items, set) = cx.use_state(|| vec!["one", "two", "three"])?;
            *set_items.borrow_mut() = Some(set);
            Ok(el("ul")
                .children(items.iter().map(|item| el("li").key(item).text(item)))
                .into())
        })
    };

    root.render(el("main").child(component(&counter)).child(component(&list)));
    scheduler.flush_all();
    show("mount", &host, container, &root);

    let Some(set) = set_count.borrow().clone() else {
        return;
    };
    for _ in 0..3 {
        set.update(|c| c + 1);
    }
    scheduler.flush_all();
    show("three increments, one render", &host, container, &root);

    let Some(start) = starter.borrow().clone() else {
        return;
    };
    start.start(|| set.set(100));
    scheduler.run_next_task();
    show("transition: urgent pass", &host, container, &root);
    scheduler.flush_all();
    show("transition: done", &host, container, &root);

    let Some(set_list) = set_items.borrow().clone() else {
        return;
    };
    set_list.set(vec!["three", "two", "one"]);
    scheduler.flush_all();
    show("reversed list", &host, container, &root);

    set_list.update(|items| items.iter().copied().filter(|item| *item != "two").collect());
    scheduler.flush_all();
    show("removed \"two\"", &host, container, &root);

    root.unmount();
    scheduler.flush_all();
    show("unmount", &host, container, &root);

    for err in root.take_errors() {
        eprintln!("{} {err}", "error:".red());
    }
}
