//! In-memory output tree.
//!
//! Every node lives in a flat slot table indexed by its handle. Each node
//! records its parent so inconsistent operations surface as [`HostError`]s
//! instead of silently corrupting the tree. Every mutation is also appended to
//! an operation log that tests read back with [`MemoryHost::take_ops`].
//!
//! Slots are never freed. A handle names one node for the lifetime of the
//! host, so a removed node stays inspectable and a stale handle can never
//! alias a newer node. The table grows with every created node, including
//! instances of abandoned render passes, which suits short-lived test trees.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use super::{HostConfig, HostError, HostHandle};
use crate::element::{Props, Value};

/// A node of the in-memory tree.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryNode {
    Container {
        children: Vec<HostHandle>,
    },
    Element {
        tag: String,
        attrs: Vec<(String, Value)>,
        children: Vec<HostHandle>,
    },
    Text {
        content: String,
    },
}

/// One mutation applied to the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    Create { handle: HostHandle, tag: String },
    CreateText { handle: HostHandle, content: String },
    AppendInitial { parent: HostHandle, child: HostHandle },
    Append { parent: HostHandle, child: HostHandle },
    Insert { parent: HostHandle, child: HostHandle, before: HostHandle },
    Remove { parent: HostHandle, child: HostHandle },
    UpdateText { handle: HostHandle, content: String },
    Update { handle: HostHandle },
}

struct Slot {
    node: MemoryNode,
    parent: Option<HostHandle>,
}

#[derive(Default)]
struct MemoryTree {
    slots: Vec<Slot>,
    ops: Vec<HostOp>,
}

impl MemoryTree {
    /// Append a slot. Handles are never recycled.
    fn alloc(&mut self, node: MemoryNode) -> HostHandle {
        let handle = HostHandle(self.slots.len() as u64);
        self.slots.push(Slot { node, parent: None });
        handle
    }

    fn slot(&self, handle: HostHandle) -> Result<&Slot, HostError> {
        self.slots
            .get(handle.0 as usize)
            .ok_or(HostError::UnknownHandle(handle))
    }

    fn slot_mut(&mut self, handle: HostHandle) -> Result<&mut Slot, HostError> {
        self.slots
            .get_mut(handle.0 as usize)
            .ok_or(HostError::UnknownHandle(handle))
    }

    fn children_mut(&mut self, parent: HostHandle) -> Result<&mut Vec<HostHandle>, HostError> {
        match &mut self.slot_mut(parent)?.node {
            MemoryNode::Container { children } | MemoryNode::Element { children, .. } => Ok(children),
            MemoryNode::Text { .. } => Err(HostError::WrongKind(parent)),
        }
    }

    /// Claim `child` for `parent`, detaching it first if it is already there.
    fn adopt(&mut self, parent: HostHandle, child: HostHandle) -> Result<(), HostError> {
        let current = self.slot(child)?.parent;
        match current {
            Some(current) if current != parent => {
                return Err(HostError::ParentMismatch {
                    child,
                    current,
                    requested: parent,
                });
            }
            Some(_) => self.children_mut(parent)?.retain(|c| *c != child),
            None => {}
        }
        self.slot_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn render(&self, handle: HostHandle, out: &mut String) -> Result<(), HostError> {
        match &self.slot(handle)?.node {
            MemoryNode::Container { children } => {
                for child in children {
                    self.render(*child, out)?;
                }
            }
            MemoryNode::Element { tag, attrs, children } => {
                let _ = write!(out, "<{tag}");
                for (name, value) in attrs {
                    let _ = write!(out, " {name}=\"{value}\"");
                }
                out.push('>');
                for child in children {
                    self.render(*child, out)?;
                }
                let _ = write!(out, "</{tag}>");
            }
            MemoryNode::Text { content } => out.push_str(content),
        }
        Ok(())
    }
}

fn attrs_of(props: &Props) -> Vec<(String, Value)> {
    props
        .attrs()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Output adapter backed by an in-memory tree.
///
/// Cloning shares the tree, so a test can keep one clone for inspection while
/// the root owns another.
#[derive(Clone, Default)]
pub struct MemoryHost {
    tree: Rc<RefCell<MemoryTree>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new empty container.
    pub fn create_container(&self) -> HostHandle {
        self.tree
            .borrow_mut()
            .alloc(MemoryNode::Container { children: Vec::new() })
    }

    /// Snapshot of a node.
    pub fn node(&self, handle: HostHandle) -> Option<MemoryNode> {
        self.tree.borrow().slot(handle).ok().map(|slot| slot.node.clone())
    }

    /// Children of a container or element, in order.
    pub fn children(&self, handle: HostHandle) -> Vec<HostHandle> {
        match self.node(handle) {
            Some(MemoryNode::Container { children }) | Some(MemoryNode::Element { children, .. }) => children,
            _ => Vec::new(),
        }
    }

    /// Parent a node is currently attached to.
    pub fn parent(&self, handle: HostHandle) -> Option<HostHandle> {
        self.tree.borrow().slot(handle).ok().and_then(|slot| slot.parent)
    }

    /// Content of a text node.
    pub fn text(&self, handle: HostHandle) -> Option<String> {
        match self.node(handle) {
            Some(MemoryNode::Text { content }) => Some(content),
            _ => None,
        }
    }

    /// Markup of everything under `handle`, e.g. `<ul><li>1</li></ul>`.
    pub fn render_to_string(&self, handle: HostHandle) -> String {
        let mut out = String::new();
        if let Err(error) = self.tree.borrow().render(handle, &mut out) {
            tracing::warn!(%error, "render_to_string on a broken tree");
        }
        out
    }

    /// Drain the operation log.
    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut self.tree.borrow_mut().ops)
    }
}

impl HostConfig for MemoryHost {
    fn create_instance(&mut self, element_type: &str, props: &Props) -> HostHandle {
        let mut tree = self.tree.borrow_mut();
        let handle = tree.alloc(MemoryNode::Element {
            tag: element_type.to_string(),
            attrs: attrs_of(props),
            children: Vec::new(),
        });
        tree.ops.push(HostOp::Create {
            handle,
            tag: element_type.to_string(),
        });
        handle
    }

    fn create_text_instance(&mut self, content: &str) -> HostHandle {
        let mut tree = self.tree.borrow_mut();
        let handle = tree.alloc(MemoryNode::Text {
            content: content.to_string(),
        });
        tree.ops.push(HostOp::CreateText {
            handle,
            content: content.to_string(),
        });
        handle
    }

    fn append_initial_child(&mut self, parent: HostHandle, child: HostHandle) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.adopt(parent, child)?;
        tree.children_mut(parent)?.push(child);
        tree.ops.push(HostOp::AppendInitial { parent, child });
        Ok(())
    }

    fn append_child_to_container(&mut self, container: HostHandle, child: HostHandle) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.adopt(container, child)?;
        tree.children_mut(container)?.push(child);
        tree.ops.push(HostOp::Append {
            parent: container,
            child,
        });
        Ok(())
    }

    fn insert_child_to_container(
        &mut self,
        child: HostHandle,
        container: HostHandle,
        before: HostHandle,
    ) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        if !tree.children_mut(container)?.contains(&before) {
            return Err(HostError::ReferenceNotFound {
                before,
                parent: container,
            });
        }
        tree.adopt(container, child)?;
        let children = tree.children_mut(container)?;
        // Position is taken after the child left its old slot.
        let index = children
            .iter()
            .position(|c| *c == before)
            .ok_or(HostError::ReferenceNotFound {
                before,
                parent: container,
            })?;
        children.insert(index, child);
        tree.ops.push(HostOp::Insert {
            parent: container,
            child,
            before,
        });
        Ok(())
    }

    fn remove_child(&mut self, child: HostHandle, container: HostHandle) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        let children = tree.children_mut(container)?;
        let index = children
            .iter()
            .position(|c| *c == child)
            .ok_or(HostError::ChildNotFound {
                child,
                parent: container,
            })?;
        children.remove(index);
        tree.slot_mut(child)?.parent = None;
        tree.ops.push(HostOp::Remove {
            parent: container,
            child,
        });
        Ok(())
    }

    fn commit_text_update(&mut self, handle: HostHandle, content: &str) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        match &mut tree.slot_mut(handle)?.node {
            MemoryNode::Text { content: current } => *current = content.to_string(),
            _ => return Err(HostError::WrongKind(handle)),
        }
        tree.ops.push(HostOp::UpdateText {
            handle,
            content: content.to_string(),
        });
        Ok(())
    }

    fn commit_update(&mut self, handle: HostHandle, props: &Props) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        match &mut tree.slot_mut(handle)?.node {
            MemoryNode::Element { attrs, .. } => *attrs = attrs_of(props),
            _ => return Err(HostError::WrongKind(handle)),
        }
        tree.ops.push(HostOp::Update { handle });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn list(host: &mut MemoryHost, container: HostHandle, items: &[&str]) -> Vec<HostHandle> {
        items
            .iter()
            .map(|item| {
                let li = host.create_instance("li", &Props::default());
                let text = host.create_text_instance(item);
                host.append_initial_child(li, text).unwrap();
                host.append_child_to_container(container, li).unwrap();
                li
            })
            .collect()
    }

    #[test]
    fn test_render_to_string() {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let mut props = Props::default();
        props.set("id", "list");
        let ul = host.create_instance("ul", &props);
        host.append_child_to_container(container, ul).unwrap();
        list(&mut host, ul, &["1", "2"]);

        assert_eq!(
            host.render_to_string(container),
            r#"<ul id="list"><li>1</li><li>2</li></ul>"#
        );
    }

    #[test]
    fn test_insert_moves_existing_child() {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let items = list(&mut host, container, &["a", "b", "c"]);

        host.insert_child_to_container(items[2], container, items[0]).unwrap();
        assert_eq!(host.children(container), vec![items[2], items[0], items[1]]);

        host.append_child_to_container(container, items[2]).unwrap();
        assert_eq!(host.children(container), vec![items[0], items[1], items[2]]);
    }

    #[test]
    fn test_parent_mismatch() {
        let mut host = MemoryHost::new();
        let a = host.create_container();
        let b = host.create_container();
        let text = host.create_text_instance("x");
        host.append_child_to_container(a, text).unwrap();

        let error = host.append_child_to_container(b, text).unwrap_err();
        assert_eq!(
            error,
            HostError::ParentMismatch {
                child: text,
                current: a,
                requested: b
            }
        );
    }

    #[test]
    fn test_missing_reference_and_child() {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let loose = host.create_text_instance("loose");
        let other = host.create_text_instance("other");

        assert!(matches!(
            host.insert_child_to_container(loose, container, other),
            Err(HostError::ReferenceNotFound { .. })
        ));
        assert!(matches!(
            host.remove_child(loose, container),
            Err(HostError::ChildNotFound { .. })
        ));
    }

    #[test]
    fn test_remove_detaches_and_logs() {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let text = host.create_text_instance("x");
        host.append_child_to_container(container, text).unwrap();
        host.take_ops();

        host.remove_child(text, container).unwrap();
        assert_eq!(host.parent(text), None);
        assert_eq!(host.render_to_string(container), "");
        assert_eq!(
            host.take_ops(),
            vec![HostOp::Remove {
                parent: container,
                child: text
            }]
        );
    }

    #[test]
    fn test_removed_node_keeps_its_handle() {
        let mut host = MemoryHost::new();
        let container = host.create_container();
        let old = host.create_text_instance("old");
        host.append_child_to_container(container, old).unwrap();
        host.remove_child(old, container).unwrap();

        let new = host.create_text_instance("new");
        assert_ne!(new, old);
        assert_eq!(host.text(old), Some("old".to_string()));
        assert_eq!(host.text(new), Some("new".to_string()));
    }

    #[test]
    fn test_text_update_rejects_elements() {
        let mut host = MemoryHost::new();
        let div = host.create_instance("div", &Props::default());
        assert_eq!(host.commit_text_update(div, "x"), Err(HostError::WrongKind(div)));
    }
}
