//! Declarative Tree - What components describe and the reconciler diffs.
//!
//! A [`Node`] is an immutable description of output:
//!
//! ```text
//! Node::Empty                  nothing (null / false)
//! Node::Text("hi")             a text node
//! Node::Element(Rc<Element>)   host element, component, fragment or provider
//! Node::List(vec![..])         several siblings (arrays, fragments' children)
//! ```
//!
//! Elements are built with [`el`], [`component`], [`fragment`] and
//! [`Context::provider`]. Children follow the usual convention: one child is
//! stored as-is, several children become a `Node::List`.
//!
//! ```ignore
//! let list = el("ul")
//!     .child(el("li").key(1).text("one"))
//!     .child(el("li").key(2).text("two"));
//! root.render(list);
//! ```

use std::any::Any;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::Result;
use crate::host::HostHandle;
use crate::reconciler::RenderCx;

/// Type-erased shared value (state, context values, refs).
pub type AnyValue = Rc<dyn Any>;

/// Author-supplied stable identity of a child.
pub type Key = Rc<str>;

// =============================================================================
// Values
// =============================================================================

/// A prop or dependency value.
///
/// `Any` compares by pointer identity, everything else by value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Any(AnyValue),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // Same-value semantics: NaN equals NaN, 0.0 and -0.0 differ.
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Any(a), Value::Any(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Any(_) => f.write_str("<any>"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(v) => f.write_str(v),
            other => write!(f, "{other:?}"),
        }
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

/// Sizes beyond `i64::MAX` become floats rather than wrapping negative.
impl From<usize> for Value {
    fn from(v: usize) -> Self {
        i64::try_from(v).map_or(Value::Float(v as f64), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<Rc<str>> for Value {
    fn from(v: Rc<str>) -> Self {
        Value::Str(v)
    }
}

// =============================================================================
// Props
// =============================================================================

/// Props of an element: named attributes, children and (for providers) a value.
#[derive(Clone, Default)]
pub struct Props {
    attrs: BTreeMap<Rc<str>, Value>,
    /// Declarative children.
    pub children: Node,
    /// Value carried by a context provider.
    pub value: Option<AnyValue>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an attribute.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Set an attribute.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.attrs.insert(Rc::from(name), value.into());
    }

    /// Attributes in name order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attrs.iter().map(|(k, v)| (&**k, v))
    }

    /// True if both props carry the same attributes. Children are not compared.
    pub fn same_attrs(&self, other: &Props) -> bool {
        self.attrs == other.attrs
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.attrs)
            .field("children", &self.children)
            .field("value", &self.value.as_ref().map(|_| "<any>"))
            .finish()
    }
}

// =============================================================================
// Refs
// =============================================================================

/// Slot that receives the host handle of the element it is attached to.
#[derive(Clone, Default)]
pub struct NodeRef(Rc<Cell<Option<HostHandle>>>);

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// The attached handle, if the element is mounted.
    pub fn get(&self) -> Option<HostHandle> {
        self.0.get()
    }

    pub(crate) fn set(&self, handle: Option<HostHandle>) {
        self.0.set(handle);
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({:?})", self.get())
    }
}

/// Pointer comparison of optional refs.
pub(crate) fn same_ref(a: &Option<NodeRef>, b: &Option<NodeRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.ptr_eq(b),
        (None, None) => true,
        _ => false,
    }
}

// =============================================================================
// Components
// =============================================================================

type RenderFn = dyn Fn(&mut RenderCx<'_>, &Props) -> Result<Node>;

struct ComponentInner {
    name: &'static str,
    render: Box<RenderFn>,
}

/// A function component. Identity is the allocation, so create it once and
/// clone it into every element that uses it.
#[derive(Clone)]
pub struct Component(Rc<ComponentInner>);

impl Component {
    pub fn new(
        name: &'static str,
        render: impl Fn(&mut RenderCx<'_>, &Props) -> Result<Node> + 'static,
    ) -> Self {
        Self(Rc::new(ComponentInner {
            name,
            render: Box::new(render),
        }))
    }

    pub fn name(&self) -> &'static str {
        self.0.name
    }

    pub(crate) fn render(&self, cx: &mut RenderCx<'_>, props: &Props) -> Result<Node> {
        (self.0.render)(cx, props)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.0.name)
    }
}

// =============================================================================
// Context
// =============================================================================

thread_local! {
    /// Counter for context identities.
    static CONTEXT_COUNTER: Cell<u64> = const { Cell::new(0) };
}

/// Untyped identity of a context, carried by provider elements.
#[derive(Clone)]
pub struct ContextHandle {
    id: u64,
    name: &'static str,
    default: AnyValue,
}

impl ContextHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn default_value(&self) -> &AnyValue {
        &self.default
    }
}

impl PartialEq for ContextHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Context({})", self.name)
    }
}

/// A typed context. Read with [`RenderCx::use_context`].
#[derive(Clone)]
pub struct Context<T> {
    handle: ContextHandle,
    _marker: PhantomData<T>,
}

impl<T: Clone + 'static> Context<T> {
    pub fn new(name: &'static str, default: T) -> Self {
        let id = CONTEXT_COUNTER.with(|counter| {
            let id = counter.get();
            counter.set(id + 1);
            id
        });
        Self {
            handle: ContextHandle {
                id,
                name,
                default: Rc::new(default),
            },
            _marker: PhantomData,
        }
    }

    pub fn handle(&self) -> &ContextHandle {
        &self.handle
    }

    /// Provider element that makes `value` visible to every descendant.
    pub fn provider(&self, value: T) -> ElementBuilder {
        ElementBuilder::new(ElementType::Provider(self.handle.clone())).value(Rc::new(value))
    }
}

// =============================================================================
// Elements
// =============================================================================

/// What produced an element.
#[derive(Clone, PartialEq)]
pub enum ElementType {
    /// Host element, e.g. `"div"`.
    Host(Rc<str>),
    /// Function component.
    Component(Component),
    /// Grouping without a host node.
    Fragment,
    /// Context provider.
    Provider(ContextHandle),
}

impl ElementType {
    /// Human readable name, for logs and errors.
    pub fn label(&self) -> String {
        match self {
            ElementType::Host(tag) => tag.to_string(),
            ElementType::Component(c) => c.name().to_string(),
            ElementType::Fragment => "Fragment".to_string(),
            ElementType::Provider(ctx) => format!("{}.Provider", ctx.name()),
        }
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// An element of the declarative tree.
#[derive(Clone, Debug)]
pub struct Element {
    pub element_type: ElementType,
    pub key: Option<Key>,
    pub props: Props,
    pub node_ref: Option<NodeRef>,
}

/// Fluent builder for [`Element`].
pub struct ElementBuilder {
    element_type: ElementType,
    key: Option<Key>,
    props: Props,
    node_ref: Option<NodeRef>,
    children: Vec<Node>,
}

impl ElementBuilder {
    pub fn new(element_type: ElementType) -> Self {
        Self {
            element_type,
            key: None,
            props: Props::default(),
            node_ref: None,
            children: Vec::new(),
        }
    }

    /// Set the key. Keys are compared as strings.
    pub fn key(mut self, key: impl fmt::Display) -> Self {
        self.key = Some(Rc::from(key.to_string()));
        self
    }

    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.props.set(name, value);
        self
    }

    /// Append one child.
    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append several children.
    pub fn children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Append a text child.
    pub fn text(self, content: impl fmt::Display) -> Self {
        self.child(text(content))
    }

    pub fn node_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    /// Set the provider value.
    pub fn value(mut self, value: AnyValue) -> Self {
        self.props.value = Some(value);
        self
    }

    pub fn build(self) -> Element {
        let mut props = self.props;
        let mut children = self.children;
        props.children = match children.len() {
            0 => Node::Empty,
            1 => children.pop().unwrap_or_default(),
            _ => Node::List(children),
        };
        Element {
            element_type: self.element_type,
            key: self.key,
            props,
            node_ref: self.node_ref,
        }
    }
}

/// Host element builder.
pub fn el(tag: &str) -> ElementBuilder {
    ElementBuilder::new(ElementType::Host(Rc::from(tag)))
}

/// Function component element builder.
pub fn component(component: &Component) -> ElementBuilder {
    ElementBuilder::new(ElementType::Component(component.clone()))
}

/// Fragment element builder.
pub fn fragment() -> ElementBuilder {
    ElementBuilder::new(ElementType::Fragment)
}

/// Text node.
pub fn text(content: impl fmt::Display) -> Node {
    Node::Text(Rc::from(content.to_string()))
}

// =============================================================================
// Node
// =============================================================================

/// A node of the declarative tree.
#[derive(Clone, Default)]
pub enum Node {
    #[default]
    Empty,
    Text(Rc<str>),
    Element(Rc<Element>),
    List(Vec<Node>),
}

impl Node {
    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    /// The element, if this node is one.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Empty => f.write_str("Empty"),
            Node::Text(text) => write!(f, "{text:?}"),
            Node::Element(element) => {
                write!(f, "<{}", element.element_type.label())?;
                if let Some(key) = &element.key {
                    write!(f, " key={key}")?;
                }
                write!(f, ">{:?}", element.props.children)
            }
            Node::List(nodes) => f.debug_list().entries(nodes).finish(),
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(Rc::new(element))
    }
}

impl From<ElementBuilder> for Node {
    fn from(builder: ElementBuilder) -> Self {
        Node::from(builder.build())
    }
}

impl From<Vec<Node>> for Node {
    fn from(nodes: Vec<Node>) -> Self {
        Node::List(nodes)
    }
}

impl From<&str> for Node {
    fn from(content: &str) -> Self {
        Node::Text(Rc::from(content))
    }
}

impl From<String> for Node {
    fn from(content: String) -> Self {
        Node::Text(Rc::from(content))
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        text(value)
    }
}

impl From<Option<Node>> for Node {
    fn from(node: Option<Node>) -> Self {
        node.unwrap_or_default()
    }
}
