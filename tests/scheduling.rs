//! Lanes, time slicing and transitions through a mounted root.

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use common::{Harness, SetterSlot, take_setter};
use pretty_assertions::assert_eq;
use spark_fiber::scheduler::run_with_priority;
use spark_fiber::{Component, Lanes, Priority, StartTransition, component, el};

fn counter(slot: &SetterSlot<i64>) -> Component {
    let slot = slot.clone();
    Component::new("Counter", move |cx, _props| {
        let (count, set_count) = cx.use_state(|| 0_i64)?;
        *slot.borrow_mut() = Some(set_count);
        Ok(el("span").text(count).into())
    })
}

#[test]
fn test_dispatch_lane_follows_scheduler_priority() {
    let slot = SetterSlot::default();
    let c = counter(&slot);
    let h = Harness::new();
    h.render(component(&c));
    let set_count = take_setter(&slot);

    set_count.set(1);
    assert_eq!(h.root.pending_lanes(), Lanes::DEFAULT);
    assert_eq!(h.scheduler.queued_priorities(), vec![Priority::Normal]);
    h.scheduler.flush_all();

    run_with_priority(h.scheduler.as_ref(), Priority::UserBlocking, || set_count.set(2));
    assert_eq!(h.root.pending_lanes(), Lanes::INPUT_CONTINUOUS);
    assert_eq!(h.scheduler.queued_priorities(), vec![Priority::UserBlocking]);
    h.scheduler.flush_all();

    run_with_priority(h.scheduler.as_ref(), Priority::Immediate, || set_count.set(3));
    assert_eq!(h.root.pending_lanes(), Lanes::SYNC);
    assert_eq!(h.scheduler.pending_task_count(), 0);
    h.scheduler.flush_microtasks();
    assert_eq!(h.html(), "<span>3</span>");
}

#[test]
fn test_sync_render_skips_transition_updates() {
    let slot = SetterSlot::default();
    let c = counter(&slot);
    let h = Harness::new();
    h.render(component(&c));
    let set_count = take_setter(&slot);

    h.root.start_transition(|| set_count.update(|c| c + 1));
    assert_eq!(h.root.pending_lanes(), Lanes::TRANSITION);

    // Start the transition render, one unit per slice.
    h.scheduler.set_yield_after(Some(1));
    h.scheduler.run_next_task();
    assert!(h.root.is_rendering());
    assert_eq!(h.html(), "<span>0</span>");

    // A sync update throws the partial pass away and does not see the
    // transition update.
    h.root.render(component(&c));
    h.scheduler.flush_microtasks();
    assert_eq!(h.root.last_commit().map(|commit| commit.lane), Some(Lanes::SYNC));
    assert_eq!(h.html(), "<span>0</span>");
    assert_eq!(h.root.pending_lanes(), Lanes::TRANSITION);

    h.scheduler.set_yield_after(None);
    h.scheduler.flush_all();
    assert_eq!(h.html(), "<span>1</span>");
    assert_eq!(h.root.last_commit().map(|commit| commit.lane), Some(Lanes::TRANSITION));
}

#[test]
fn test_skipped_update_replays_in_order() {
    let slot = SetterSlot::default();
    let c = counter(&slot);
    let h = Harness::new();
    h.render(component(&c));
    let set_count = take_setter(&slot);

    // Transition first, then an urgent update that depends on it.
    h.root.start_transition(|| set_count.set(10));
    set_count.update(|c| c + 1);

    // The default render skips the transition: 0 + 1.
    h.scheduler.run_next_task();
    assert_eq!(h.html(), "<span>1</span>");

    // The transition render replays both in dispatch order: 10 + 1.
    h.scheduler.flush_all();
    assert_eq!(h.html(), "<span>11</span>");
}

#[test]
fn test_sliced_render_commits_in_one_piece() {
    let h = Harness::new();
    let list = |label: &str| {
        el("ul").children((0..5).map(|i| el("li").key(i).text(format!("{label}{i}"))))
    };
    h.render(list("a"));

    h.scheduler.set_yield_after(Some(2));
    h.root.update_container(list("b"), Lanes::DEFAULT);
    let mut slices = 0;
    while h.scheduler.run_next_task() {
        slices += 1;
        if h.root.is_rendering() {
            // Nothing is visible until the pass completes.
            assert!(h.html().starts_with("<ul><li>a0</li>"));
        }
    }
    assert!(slices > 1, "render finished in {slices} slice(s)");
    assert_eq!(
        h.html(),
        "<ul><li>b0</li><li>b1</li><li>b2</li><li>b3</li><li>b4</li></ul>"
    );
}

#[test]
fn test_transition_shows_pending_state_first() {
    let starter: Rc<RefCell<Option<StartTransition>>> = Rc::default();
    let page_slot: SetterSlot<&'static str> = SetterSlot::default();
    let tabs = {
        let starter = starter.clone();
        let page_slot = page_slot.clone();
        Component::new("Tabs", move |cx, _props| {
            let (pending, start) = cx.use_transition()?;
            let (page, set_page) = cx.use_state(|| "home")?;
            *starter.borrow_mut() = Some(start);
            *page_slot.borrow_mut() = Some(set_page);
            let status = if pending { "loading" } else { "ready" };
            Ok(el("p").text(format!("{status} {page}")).into())
        })
    };

    let h = Harness::new();
    h.render(component(&tabs));
    assert_eq!(h.html(), "<p>ready home</p>");

    let start = starter.borrow().clone().expect("rendered");
    let set_page = take_setter(&page_slot);
    start.start(|| set_page.set("settings"));
    assert_eq!(h.root.pending_lanes(), Lanes::DEFAULT | Lanes::TRANSITION);

    h.scheduler.run_next_task();
    assert_eq!(h.html(), "<p>loading home</p>");

    h.scheduler.flush_all();
    assert_eq!(h.html(), "<p>ready settings</p>");
    assert!(h.root.pending_lanes().is_empty());
}

#[test]
fn test_update_during_open_render_stays_pending() {
    let slot = SetterSlot::default();
    let renders = Rc::new(Cell::new(0));
    let c = {
        let slot = slot.clone();
        let renders = renders.clone();
        Component::new("Counter", move |cx, _props| {
            renders.set(renders.get() + 1);
            let (count, set_count) = cx.use_state(|| 0_i64)?;
            *slot.borrow_mut() = Some(set_count);
            Ok(el("span").text(count).into())
        })
    };
    let h = Harness::new();
    h.render(el("div").child(component(&c)).child(el("p").text("tail")));
    let set_count = take_setter(&slot);
    assert_eq!(renders.get(), 1);

    // Root, div and Counter fit in the first slice.
    set_count.update(|c| c + 1);
    h.scheduler.set_yield_after(Some(3));
    assert!(h.scheduler.run_next_task());
    assert!(h.root.is_rendering());
    assert_eq!(renders.get(), 2);

    // Same lane as the open pass, but Counter already consumed its queue.
    set_count.update(|c| c + 100);
    h.scheduler.set_yield_after(None);
    h.scheduler.flush_all();

    assert_eq!(h.html(), "<div><span>101</span><p>tail</p></div>");
    assert_eq!(renders.get(), 3);
    assert!(h.root.pending_lanes().is_empty());
}

#[test]
fn test_transition_started_during_sync_render_commits() {
    let starter: Rc<RefCell<Option<StartTransition>>> = Rc::default();
    let page_slot: SetterSlot<&'static str> = SetterSlot::default();
    let tabs = {
        let starter = starter.clone();
        let page_slot = page_slot.clone();
        Component::new("Tabs", move |cx, _props| {
            let (pending, start) = cx.use_transition()?;
            let (page, set_page) = cx.use_state(|| "home")?;
            *starter.borrow_mut() = Some(start);
            *page_slot.borrow_mut() = Some(set_page);
            let status = if pending { "loading" } else { "ready" };
            Ok(el("p").text(format!("{status} {page}")).into())
        })
    };
    // Renders after Tabs and navigates once, from inside its own body.
    let armed = Rc::new(Cell::new(false));
    let trigger = {
        let armed = armed.clone();
        let starter = starter.clone();
        let page_slot = page_slot.clone();
        Component::new("Trigger", move |_cx, _props| {
            if armed.replace(false) {
                let start = starter.borrow().clone().expect("Tabs rendered first");
                let set_page = take_setter(&page_slot);
                start.start(|| set_page.set("settings"));
            }
            Ok(el("i").into())
        })
    };
    let tree = || el("div").child(component(&tabs)).child(component(&trigger));

    let h = Harness::new();
    h.render(tree());
    assert_eq!(h.html(), "<div><p>ready home</p><i></i></div>");

    armed.set(true);
    h.root.render(tree());
    h.scheduler.flush_microtasks();
    assert_eq!(h.root.last_commit().map(|commit| commit.lane), Some(Lanes::SYNC));
    assert_eq!(h.html(), "<div><p>ready home</p><i></i></div>");
    assert_eq!(h.root.pending_lanes(), Lanes::DEFAULT | Lanes::TRANSITION);

    h.scheduler.flush_all();
    assert_eq!(h.html(), "<div><p>ready settings</p><i></i></div>");
    assert!(h.root.pending_lanes().is_empty());
}

#[test]
fn test_mixed_lane_dispatches_apply_in_order() {
    let slot = SetterSlot::default();
    let c = counter(&slot);
    let h = Harness::new();
    h.render(component(&c));
    let set_count = take_setter(&slot);

    set_count.update(|c| c + 2);
    h.root.start_transition(|| set_count.update(|c| c * 4));
    run_with_priority(h.scheduler.as_ref(), Priority::Immediate, || set_count.update(|c| c + 1));

    // Sync sees only its own update.
    h.scheduler.flush_microtasks();
    assert_eq!(h.html(), "<span>1</span>");

    // Default rebases from the first skipped update: 0 + 2 + 1.
    h.scheduler.run_next_task();
    assert_eq!(h.html(), "<span>3</span>");

    // The transition replays all three in dispatch order: (0 + 2) * 4 + 1.
    h.scheduler.flush_all();
    assert_eq!(h.html(), "<span>9</span>");
    assert!(h.root.pending_lanes().is_empty());
}
