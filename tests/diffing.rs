//! Child diffing as seen from the output tree.

mod common;

use common::{Harness, keyed_list};
use pretty_assertions::assert_eq;
use spark_fiber::{Component, Flags, HostOp, Node, WorkTag, component, el, fragment};

#[test]
fn test_identical_rerender_is_a_noop() {
    let h = Harness::new();
    let tree = || {
        el("div")
            .attr("class", "panel")
            .child(keyed_list(&[("a", "alpha"), ("b", "beta")]))
            .child(el("p").text("footer"))
    };

    h.render(tree());
    let first = h.root.last_commit().expect("first commit");
    assert_eq!(first.inserted_keys(), Vec::<&str>::new());
    assert_eq!(first.with_flags(Flags::PLACEMENT).count(), 1);
    h.host.take_ops();

    h.render(tree());
    let second = h.root.last_commit().expect("second commit");
    assert!(second.is_empty(), "unexpected effects: {second:?}");
    assert_eq!(h.host.take_ops(), vec![]);
    assert_eq!(
        h.html(),
        "<div class=\"panel\"><ul><li>alpha</li><li>beta</li></ul><p>footer</p></div>"
    );
}

#[test]
fn test_swap_moves_one_child_and_keeps_instances() {
    let h = Harness::new();
    h.render(keyed_list(&[("1", "A"), ("2", "B")]));
    let ul = h.first_child();
    let before = h.host.children(ul);
    h.host.take_ops();

    h.render(keyed_list(&[("2", "B"), ("1", "A")]));
    let commit = h.root.last_commit().expect("commit");
    assert_eq!(commit.moved_keys(), vec!["1"]);
    assert_eq!(commit.inserted_keys(), Vec::<&str>::new());
    assert!(commit.deletions.is_empty());

    assert_eq!(h.host.children(ul), vec![before[1], before[0]]);
    assert_eq!(
        h.host.take_ops(),
        vec![HostOp::Append {
            parent: ul,
            child: before[0]
        }]
    );
}

#[test]
fn test_reversed_list_reuses_items_and_updates_text() {
    let h = Harness::new();
    h.render(keyed_list(&[("1", "1"), ("2", "2"), ("3", "3")]));
    let ul = h.first_child();
    let items = h.host.children(ul);

    h.render(keyed_list(&[("3", "1"), ("2", "2"), ("1", "3")]));
    let commit = h.root.last_commit().expect("commit");

    // Key 3 keeps its slot; 2 and 1 are placed after it.
    assert_eq!(commit.moved_keys(), vec!["2", "1"]);
    assert!(commit.deletions.is_empty());
    let text_updates = commit
        .with_flags(Flags::UPDATE)
        .filter(|entry| entry.tag == WorkTag::HostText)
        .count();
    assert_eq!(text_updates, 2);

    assert_eq!(h.host.children(ul), vec![items[2], items[1], items[0]]);
    assert_eq!(h.html(), "<ul><li>1</li><li>2</li><li>3</li></ul>");
    let third = h.host.children(items[2])[0];
    assert_eq!(h.host.text(third).as_deref(), Some("1"));
}

#[test]
fn test_inserted_and_removed_keys() {
    let h = Harness::new();
    h.render(keyed_list(&[("a", "A"), ("b", "B"), ("c", "C")]));
    let ul = h.first_child();
    let items = h.host.children(ul);

    h.render(keyed_list(&[("a", "A"), ("x", "X"), ("c", "C")]));
    let commit = h.root.last_commit().expect("commit");
    assert_eq!(commit.inserted_keys(), vec!["x"]);
    assert_eq!(commit.deleted_keys(), vec!["b"]);
    assert_eq!(commit.deletions[0].removed, vec![items[1]]);
    assert_eq!(h.html(), "<ul><li>A</li><li>X</li><li>C</li></ul>");

    let now = h.host.children(ul);
    assert_eq!(now[0], items[0]);
    assert_eq!(now[2], items[2]);
    assert_eq!(h.host.parent(items[1]), None);
}

#[test]
fn test_deleted_subtree_releases_its_fibers() {
    let nested = |keys: &[&str]| -> Node {
        el("ul")
            .children(keys.iter().map(|key| {
                el("li")
                    .key(key)
                    .child(el("span").text(key))
                    .child(el("em").text("!"))
            }))
            .into()
    };

    let shrunk = Harness::new();
    shrunk.render(nested(&["a", "b", "c"]));
    shrunk.render(nested(&["a", "b", "c"]));
    shrunk.render(nested(&["a", "c"]));
    shrunk.render(nested(&["a", "c"]));

    let fresh = Harness::new();
    fresh.render(nested(&["a", "c"]));
    fresh.render(nested(&["a", "c"]));

    assert_eq!(shrunk.root.fiber_count(), fresh.root.fiber_count());
    assert_eq!(shrunk.html(), fresh.html());
}

#[test]
fn test_deleting_component_removes_every_host_child() {
    let pair = Component::new("Pair", |_cx, _props| {
        Ok(fragment().child(el("a")).child(el("b")).into())
    });

    let h = Harness::new();
    h.render(el("div").child(component(&pair).key("p")).child(el("span")));
    assert_eq!(h.html(), "<div><a></a><b></b><span></span></div>");
    let div = h.first_child();
    let span = h.host.children(div)[2];

    h.render(el("div").child(el("span")));
    let commit = h.root.last_commit().expect("commit");
    assert_eq!(commit.deleted_keys(), vec!["p"]);
    assert_eq!(commit.deletions[0].tag, WorkTag::FunctionComponent);
    assert_eq!(commit.deletions[0].removed.len(), 2);
    assert_eq!(h.host.children(div), vec![span]);
    assert_eq!(h.html(), "<div><span></span></div>");
}

#[test]
fn test_type_change_replaces_instance() {
    let h = Harness::new();
    h.render(el("div").child(el("p").text("same")));
    let div = h.first_child();
    let old = h.host.children(div)[0];

    h.render(el("div").child(el("section").text("same")));
    let new = h.host.children(div)[0];
    assert_ne!(old, new);
    assert_eq!(h.host.parent(old), None);
    assert_eq!(h.html(), "<div><section>same</section></div>");
}

#[test]
fn test_insert_before_existing_sibling() {
    let h = Harness::new();
    h.render(keyed_list(&[("b", "B")]));
    let ul = h.first_child();
    let b = h.host.children(ul)[0];
    h.host.take_ops();

    h.render(keyed_list(&[("a", "A"), ("b", "B")]));
    let a = h.host.children(ul)[0];
    assert_eq!(h.host.children(ul), vec![a, b]);
    assert!(h.host.take_ops().contains(&HostOp::Insert {
        parent: ul,
        child: a,
        before: b
    }));
}

#[test]
fn test_attribute_change_updates_in_place() {
    let h = Harness::new();
    h.render(el("input").attr("value", "a"));
    let input = h.first_child();
    h.host.take_ops();

    h.render(el("input").attr("value", "b"));
    assert_eq!(h.first_child(), input);
    assert_eq!(h.host.take_ops(), vec![HostOp::Update { handle: input }]);
    assert_eq!(h.html(), "<input value=\"b\"></input>");
}
