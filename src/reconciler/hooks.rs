//! Hooks - Per-call-site state of function components.
//!
//! A function component renders through a [`RenderCx`]. Every hook call takes
//! the next slot of the fiber's hook list:
//!
//! ```text
//! mount   (no committed fiber)   MOUNT_DISPATCHER    append a fresh record
//! update  (committed fiber)      UPDATE_DISPATCHER   clone the record at the same index
//! ```
//!
//! The update dispatcher checks every call against the committed list, so a
//! component that calls hooks conditionally fails its render with
//! `TooManyHooks`, `TooFewHooks` or `HookOrderMismatch` instead of reading
//! another call site's state.
//!
//! # Example
//!
//! ```ignore
//! let counter = Component::new("Counter", |cx, _props| {
//!     let (count, set_count) = cx.use_state(|| 0)?;
//!     cx.use_effect(move || { set_count.update(|c| c + 1); None }, Some(vec![]))?;
//!     Ok(el("span").text(count).into())
//! });
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use super::context::ContextStack;
use super::root::RootInner;
use super::update_queue::{Action, QueueBase, SharedQueue, UpdateQueue, rebase};
use crate::element::{AnyValue, Context, ElementType, Node, Value};
use crate::error::{FiberError, Result};
use crate::fiber::{FiberArena, FiberId, FiberState, Flags, HookFlags};
use crate::lanes::Lane;

const USE_STATE: &str = "use_state";
const USE_EFFECT: &str = "use_effect";
const USE_REF: &str = "use_ref";
const USE_TRANSITION: &str = "use_transition";

/// Cleanup returned by an effect setup.
pub type Teardown = Box<dyn FnOnce()>;

type EffectSetup = Box<dyn FnOnce() -> Option<Teardown>>;
type ValueInit<'a> = Box<dyn FnOnce() -> AnyValue + 'a>;

// =============================================================================
// Hook Records
// =============================================================================

/// One hook slot.
#[derive(Clone)]
pub(crate) enum Hook {
    State(StateHook),
    Effect(Rc<Effect>),
    Ref(AnyValue),
    Transition(StartTransition),
}

impl Hook {
    fn kind(&self) -> &'static str {
        match self {
            Hook::State(_) => USE_STATE,
            Hook::Effect(_) => USE_EFFECT,
            Hook::Ref(_) => USE_REF,
            Hook::Transition(_) => USE_TRANSITION,
        }
    }

    /// The owning fiber was deleted: drop later dispatches.
    pub fn detach(&self) {
        if let Hook::State(state) = self {
            state.dispatch.queue.borrow_mut().detach();
        }
    }
}

/// Effect records of a hook list, in call order.
pub(crate) fn effects_of(hooks: &[Hook]) -> impl Iterator<Item = &Rc<Effect>> {
    hooks.iter().filter_map(|hook| match hook {
        Hook::Effect(effect) => Some(effect),
        _ => None,
    })
}

#[derive(Clone)]
pub(crate) struct StateHook {
    base: QueueBase<AnyValue>,
    dispatch: Rc<StateQueue>,
}

/// Effect record.
///
/// The teardown slot is shared by every generation of the same call site, so
/// the cleanup produced by one commit is found by the next one.
pub(crate) struct Effect {
    pub tag: HookFlags,
    setup: RefCell<Option<EffectSetup>>,
    teardown: Rc<RefCell<Option<Teardown>>>,
    deps: Option<Vec<Value>>,
}

impl Effect {
    fn new(tag: HookFlags, setup: EffectSetup, teardown: Rc<RefCell<Option<Teardown>>>, deps: Option<Vec<Value>>) -> Self {
        Self {
            tag,
            setup: RefCell::new(Some(setup)),
            teardown,
            deps,
        }
    }

    pub fn has_effect(&self) -> bool {
        self.tag.contains(HookFlags::PASSIVE | HookFlags::HAS_EFFECT)
    }

    /// Run and clear the stored cleanup, if any.
    pub fn run_teardown(&self) {
        let teardown = self.teardown.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// Run the setup once and store its cleanup.
    pub fn run_setup(&self) {
        let setup = self.setup.borrow_mut().take();
        if let Some(setup) = setup {
            let teardown = setup();
            *self.teardown.borrow_mut() = teardown;
        }
    }
}

/// Shallow dependency comparison over the common prefix.
fn are_hook_inputs_equal(next: &[Value], previous: &[Value]) -> bool {
    next.iter().zip(previous).all(|(a, b)| a == b)
}

// =============================================================================
// Dispatch
// =============================================================================

/// Queue of one state hook, bound to its root.
pub(crate) struct StateQueue {
    queue: SharedQueue<AnyValue>,
    root: Weak<RootInner>,
}

impl StateQueue {
    fn dispatch(&self, action: Action<AnyValue>) {
        let Some(root) = self.root.upgrade() else {
            tracing::debug!("state update after the root was dropped");
            return;
        };
        if self.queue.borrow().is_detached() {
            if root.options.diagnostics {
                tracing::warn!("state update on an unmounted component was dropped");
            }
            return;
        }
        let lane = root.request_update_lane();
        self.queue.borrow_mut().enqueue(action, lane);
        root.schedule_update_on_fiber(lane);
    }
}

/// Stable setter returned by [`RenderCx::use_state`].
pub struct SetState<T> {
    inner: Rc<StateQueue>,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for SetState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> SetState<T> {
    fn new(inner: Rc<StateQueue>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Replace the state.
    pub fn set(&self, value: T) {
        self.inner.dispatch(Action::Replace(Rc::new(value)));
    }

    /// Compute the next state from the previous one.
    pub fn update(&self, reducer: impl Fn(&T) -> T + 'static) {
        self.inner.dispatch(Action::Reduce(Rc::new(move |previous: &AnyValue| -> AnyValue {
            match previous.downcast_ref::<T>() {
                Some(value) => Rc::new(reducer(value)),
                None => previous.clone(),
            }
        })));
    }

    /// True if both setters drive the same hook.
    pub fn ptr_eq(&self, other: &SetState<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Starter returned by [`RenderCx::use_transition`].
#[derive(Clone)]
pub struct StartTransition {
    set_pending: SetState<bool>,
    root: Weak<RootInner>,
}

impl StartTransition {
    /// Flag the transition as pending, then run `callback` so that the updates
    /// it requests land in the transition lane.
    pub fn start(&self, callback: impl FnOnce()) {
        self.set_pending.set(true);
        match self.root.upgrade() {
            Some(root) => root.with_transition(|| {
                callback();
                self.set_pending.set(false);
            }),
            None => callback(),
        }
    }
}

// =============================================================================
// Dispatcher Tables
// =============================================================================

pub(crate) struct Dispatcher {
    phase: &'static str,
    use_state: for<'a, 'b> fn(&mut RenderCx<'a>, ValueInit<'b>) -> Result<(AnyValue, Rc<StateQueue>)>,
    use_effect: for<'a> fn(&mut RenderCx<'a>, EffectSetup, Option<Vec<Value>>) -> Result<()>,
    use_ref: for<'a, 'b> fn(&mut RenderCx<'a>, ValueInit<'b>) -> Result<AnyValue>,
    use_transition: for<'a> fn(&mut RenderCx<'a>) -> Result<(bool, StartTransition)>,
}

static MOUNT_DISPATCHER: Dispatcher = Dispatcher {
    phase: "mount",
    use_state: mount_state,
    use_effect: mount_effect,
    use_ref: mount_ref,
    use_transition: mount_transition,
};

static UPDATE_DISPATCHER: Dispatcher = Dispatcher {
    phase: "update",
    use_state: update_state,
    use_effect: update_effect,
    use_ref: update_ref,
    use_transition: update_transition,
};

fn mount_state(cx: &mut RenderCx<'_>, init: ValueInit<'_>) -> Result<(AnyValue, Rc<StateQueue>)> {
    let state = init();
    let queue: SharedQueue<AnyValue> = UpdateQueue::shared();
    let dispatch = Rc::new(StateQueue {
        queue,
        root: cx.root.clone(),
    });
    cx.hooks.push(Hook::State(StateHook {
        base: QueueBase::new(state.clone()),
        dispatch: dispatch.clone(),
    }));
    Ok((state, dispatch))
}

fn update_state(cx: &mut RenderCx<'_>, _init: ValueInit<'_>) -> Result<(AnyValue, Rc<StateQueue>)> {
    let index = cx.hooks.len();
    let Hook::State(current) = cx.next_current_hook(USE_STATE)? else {
        return Err(cx.type_mismatch(index));
    };
    let (memoized, base) = rebase(&current.dispatch.queue, &current.base, cx.render_lane);
    cx.hooks.push(Hook::State(StateHook {
        base,
        dispatch: current.dispatch.clone(),
    }));
    Ok((memoized, current.dispatch))
}

fn mount_effect(cx: &mut RenderCx<'_>, setup: EffectSetup, deps: Option<Vec<Value>>) -> Result<()> {
    cx.has_passive_effect = true;
    let effect = Effect::new(HookFlags::PASSIVE | HookFlags::HAS_EFFECT, setup, Rc::default(), deps);
    cx.hooks.push(Hook::Effect(Rc::new(effect)));
    Ok(())
}

fn update_effect(cx: &mut RenderCx<'_>, setup: EffectSetup, deps: Option<Vec<Value>>) -> Result<()> {
    let index = cx.hooks.len();
    let Hook::Effect(previous) = cx.next_current_hook(USE_EFFECT)? else {
        return Err(cx.type_mismatch(index));
    };

    let unchanged = match (&deps, &previous.deps) {
        (Some(next), Some(prev)) => {
            if next.len() != prev.len() && cx.diagnostics {
                tracing::warn!(
                    component = cx.component,
                    index,
                    previous = prev.len(),
                    next = next.len(),
                    "effect dependency list changed size"
                );
            }
            are_hook_inputs_equal(next, prev)
        }
        _ => false,
    };

    let tag = if unchanged {
        HookFlags::PASSIVE
    } else {
        cx.has_passive_effect = true;
        HookFlags::PASSIVE | HookFlags::HAS_EFFECT
    };
    let effect = Effect::new(tag, setup, previous.teardown.clone(), deps);
    cx.hooks.push(Hook::Effect(Rc::new(effect)));
    Ok(())
}

fn mount_ref(cx: &mut RenderCx<'_>, init: ValueInit<'_>) -> Result<AnyValue> {
    let value = init();
    cx.hooks.push(Hook::Ref(value.clone()));
    Ok(value)
}

fn update_ref(cx: &mut RenderCx<'_>, _init: ValueInit<'_>) -> Result<AnyValue> {
    let index = cx.hooks.len();
    let Hook::Ref(value) = cx.next_current_hook(USE_REF)? else {
        return Err(cx.type_mismatch(index));
    };
    cx.hooks.push(Hook::Ref(value.clone()));
    Ok(value)
}

fn mount_transition(cx: &mut RenderCx<'_>) -> Result<(bool, StartTransition)> {
    let (_, queue) = mount_state(cx, Box::new(|| Rc::new(false) as AnyValue))?;
    let start = StartTransition {
        set_pending: SetState::new(queue),
        root: cx.root.clone(),
    };
    cx.hooks.push(Hook::Transition(start.clone()));
    Ok((false, start))
}

fn update_transition(cx: &mut RenderCx<'_>) -> Result<(bool, StartTransition)> {
    let state_index = cx.hooks.len();
    let (pending, _) = update_state(cx, Box::new(|| Rc::new(false) as AnyValue))?;
    let pending = pending
        .downcast_ref::<bool>()
        .copied()
        .ok_or_else(|| cx.type_mismatch(state_index))?;

    let index = cx.hooks.len();
    let Hook::Transition(start) = cx.next_current_hook(USE_TRANSITION)? else {
        return Err(cx.type_mismatch(index));
    };
    cx.hooks.push(Hook::Transition(start.clone()));
    Ok((pending, start))
}

// =============================================================================
// Render Context
// =============================================================================

/// What a function component can do while it renders.
pub struct RenderCx<'a> {
    component: &'static str,
    dispatcher: &'static Dispatcher,
    current_hooks: Vec<Hook>,
    hooks: Vec<Hook>,
    render_lane: Lane,
    root: Weak<RootInner>,
    contexts: &'a ContextStack,
    has_passive_effect: bool,
    diagnostics: bool,
}

impl<'a> RenderCx<'a> {
    /// Name of the component being rendered.
    pub fn component_name(&self) -> &'static str {
        self.component
    }

    /// Lane of the render pass in progress.
    pub fn render_lane(&self) -> Lane {
        self.render_lane
    }

    /// State that survives re-renders, plus a stable setter.
    ///
    /// `init` only runs on mount.
    pub fn use_state<T: Clone + 'static>(&mut self, init: impl FnOnce() -> T) -> Result<(T, SetState<T>)> {
        let index = self.hooks.len();
        let use_state = self.dispatcher.use_state;
        let (value, queue) = use_state(self, Box::new(move || Rc::new(init()) as AnyValue))?;
        let value = value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| self.type_mismatch(index))?;
        Ok((value, SetState::new(queue)))
    }

    /// Run `setup` after commit.
    ///
    /// With `deps = None` it runs after every commit. Otherwise it runs on
    /// mount and whenever a dependency changed, after the previous teardown.
    pub fn use_effect(
        &mut self,
        setup: impl FnOnce() -> Option<Teardown> + 'static,
        deps: Option<Vec<Value>>,
    ) -> Result<()> {
        let use_effect = self.dispatcher.use_effect;
        use_effect(self, Box::new(setup), deps)
    }

    /// Mutable box created on mount and returned as-is afterwards.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Result<Rc<RefCell<T>>> {
        let index = self.hooks.len();
        let use_ref = self.dispatcher.use_ref;
        let value = use_ref(self, Box::new(move || Rc::new(RefCell::new(init())) as AnyValue))?;
        value
            .downcast::<RefCell<T>>()
            .map_err(|_| self.type_mismatch(index))
    }

    /// `(is_pending, start)` for marking updates as non-urgent.
    pub fn use_transition(&mut self) -> Result<(bool, StartTransition)> {
        let use_transition = self.dispatcher.use_transition;
        use_transition(self)
    }

    /// Value of the innermost enclosing provider, or the context default.
    pub fn use_context<T: Clone + 'static>(&self, context: &Context<T>) -> Result<T> {
        self.contexts
            .read(context.handle())
            .downcast_ref::<T>()
            .cloned()
            .ok_or(FiberError::MissingContextValue {
                context: context.handle().name(),
            })
    }

    /// Committed record for the next call site, checked against `requested`.
    fn next_current_hook(&self, requested: &'static str) -> Result<Hook> {
        let index = self.hooks.len();
        let hook = self
            .current_hooks
            .get(index)
            .cloned()
            .ok_or(FiberError::TooManyHooks {
                component: self.component.to_string(),
            })?;
        if hook.kind() != requested {
            return Err(FiberError::HookOrderMismatch {
                component: self.component.to_string(),
                index,
                previous: hook.kind(),
                requested,
            });
        }
        Ok(hook)
    }

    fn type_mismatch(&self, index: usize) -> FiberError {
        FiberError::HookTypeMismatch {
            component: self.component.to_string(),
            index,
        }
    }
}

/// Render a function component fiber and store its new hook list.
pub(crate) fn render_with_hooks(
    root: &RootInner,
    arena: &mut FiberArena,
    contexts: &ContextStack,
    render_lane: Lane,
    wip: FiberId,
) -> Result<Node> {
    let fiber = &arena[wip];
    let Some(ElementType::Component(component)) = fiber.element_type.clone() else {
        if root.options.diagnostics {
            tracing::warn!(label = fiber.label(), "function component fiber without a component");
        }
        return Ok(Node::Empty);
    };
    let props = fiber.pending_props.element().cloned().unwrap_or_default();
    let current_hooks = fiber.alternate.map(|current| arena[current].hooks().to_vec());
    let updating = current_hooks.is_some();

    let mut cx = RenderCx {
        component: component.name(),
        dispatcher: if updating { &UPDATE_DISPATCHER } else { &MOUNT_DISPATCHER },
        current_hooks: current_hooks.unwrap_or_default(),
        hooks: Vec::new(),
        render_lane,
        root: root.this.clone(),
        contexts,
        has_passive_effect: false,
        diagnostics: root.options.diagnostics,
    };
    tracing::trace!(component = cx.component, phase = cx.dispatcher.phase, "render component");

    let children = component.render(&mut cx, &props)?;

    if updating && cx.hooks.len() < cx.current_hooks.len() {
        return Err(FiberError::TooFewHooks {
            component: cx.component.to_string(),
            expected: cx.current_hooks.len(),
            found: cx.hooks.len(),
        });
    }

    let RenderCx {
        hooks,
        has_passive_effect,
        ..
    } = cx;
    let fiber = &mut arena[wip];
    fiber.memoized_state = FiberState::Hooks(hooks);
    if has_passive_effect {
        fiber.flags |= Flags::PASSIVE;
    }
    Ok(children)
}
