use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::command::Command;
use crate::runtime::RuntimeHandle;

/// Action discriminant; one per reducer-map entry.
pub type Tag = &'static str;

type Clause<S, D> = dyn Fn(&Rc<S>, Box<dyn Any>) -> Option<Command<S, D>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    UnknownTag {
        tag: String,
    },
    ArgumentMismatch {
        tag: Tag,
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::UnknownTag { tag } => write!(f, "no reducer registered for `{tag}`"),
            DispatchError::ArgumentMismatch {
                tag,
                expected,
                found,
            } => write!(
                f,
                "`{tag}` expects arguments of type {expected}, got {found}"
            ),
        }
    }
}

impl std::error::Error for DispatchError {}

/// A reducer clause with its argument type erased.
pub(crate) struct Reducer<S, D> {
    args: TypeId,
    args_name: &'static str,
    clause: Rc<Clause<S, D>>,
}

impl<S, D> Clone for Reducer<S, D> {
    fn clone(&self) -> Self {
        Self {
            args: self.args,
            args_name: self.args_name,
            clause: Rc::clone(&self.clause),
        }
    }
}

impl<S: 'static, D: 'static> Reducer<S, D> {
    fn new<T, F>(clause: F) -> Self
    where
        T: 'static,
        F: Fn(&Rc<S>, T) -> Command<S, D> + 'static,
    {
        Self {
            args: TypeId::of::<T>(),
            args_name: type_name::<T>(),
            clause: Rc::new(move |state: &Rc<S>, args: Box<dyn Any>| {
                args.downcast::<T>().ok().map(|args| clause(state, *args))
            }),
        }
    }

    pub(crate) fn check<T: 'static>(&self, tag: Tag) -> Result<(), DispatchError> {
        if self.args == TypeId::of::<T>() {
            Ok(())
        } else {
            Err(DispatchError::ArgumentMismatch {
                tag,
                expected: self.args_name,
                found: type_name::<T>(),
            })
        }
    }

    pub(crate) fn reduce<T: 'static>(
        &self,
        tag: Tag,
        state: &Rc<S>,
        args: T,
    ) -> Result<Command<S, D>, DispatchError> {
        (self.clause)(state, Box::new(args)).ok_or_else(|| DispatchError::ArgumentMismatch {
            tag,
            expected: self.args_name,
            found: type_name::<T>(),
        })
    }
}

/// The reducer clauses of an instance, keyed by action tag.
///
/// Only the map seen when an instance is created is ever used; maps supplied
/// on later renders are ignored for the rest of that instance's life.
///
/// ```
/// use std::rc::Rc;
/// use backlash_core::{Command, UpdateMap};
///
/// let update: UpdateMap<i32> = UpdateMap::new()
///     .on("inc", |state: &Rc<i32>, (): ()| Command::new(**state + 1))
///     .on("add", |state: &Rc<i32>, amount: i32| Command::new(**state + amount));
/// assert_eq!(update.len(), 2);
/// ```
pub struct UpdateMap<S, D = ()> {
    reducers: Rc<HashMap<Tag, Reducer<S, D>>>,
}

impl<S: 'static, D: 'static> UpdateMap<S, D> {
    pub fn new() -> Self {
        Self {
            reducers: Rc::new(HashMap::default()),
        }
    }

    /// Registers the clause for `tag`; its arguments are one value of type
    /// `T` (use a tuple for several, `()` for none).
    pub fn on<T, F>(mut self, tag: Tag, clause: F) -> Self
    where
        T: 'static,
        F: Fn(&Rc<S>, T) -> Command<S, D> + 'static,
    {
        if Rc::make_mut(&mut self.reducers)
            .insert(tag, Reducer::new(clause))
            .is_some()
        {
            log::debug!("reducer for `{tag}` replaced while building the update map");
        }
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.reducers.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.reducers, &other.reducers)
    }
}

impl<S: 'static, D: 'static> Default for UpdateMap<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, D> Clone for UpdateMap<S, D> {
    fn clone(&self) -> Self {
        Self {
            reducers: Rc::clone(&self.reducers),
        }
    }
}

impl<S, D> fmt::Debug for UpdateMap<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<Tag> = self.reducers.keys().copied().collect();
        tags.sort_unstable();
        f.debug_struct("UpdateMap").field("tags", &tags).finish()
    }
}

struct DispatcherInner<S, D> {
    tag: Tag,
    reducer: Reducer<S, D>,
    runtime: RuntimeHandle<S, D>,
}

/// Stable callable handle for one action tag.
///
/// Clones share identity; the reducer clause is fixed when the dispatch
/// table is built.
pub struct Dispatcher<S, D = ()> {
    inner: Rc<DispatcherInner<S, D>>,
}

impl<S, D> Clone for Dispatcher<S, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S: 'static, D: 'static> Dispatcher<S, D> {
    pub fn tag(&self) -> Tag {
        self.inner.tag
    }

    /// Name of the argument type this dispatcher accepts.
    pub fn args_type(&self) -> &'static str {
        self.inner.reducer.args_name
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.inner, &other.inner)
    }

    /// Runs the reducer for this tag and drains the resulting effects.
    ///
    /// Dispatching on a detached or dropped instance does nothing and
    /// returns `Ok`.
    pub fn try_dispatch<T: 'static>(&self, args: T) -> Result<(), DispatchError> {
        self.inner
            .runtime
            .dispatch(self.inner.tag, &self.inner.reducer, args)
    }

    /// Like [`Dispatcher::try_dispatch`], panicking on an argument type
    /// mismatch.
    pub fn dispatch<T: 'static>(&self, args: T) {
        if let Err(err) = self.try_dispatch(args) {
            panic!("{err}");
        }
    }
}

impl<S, D> fmt::Debug for Dispatcher<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tag", &self.inner.tag)
            .field("args", &self.inner.reducer.args_name)
            .finish()
    }
}

/// One dispatcher per action tag, built once per instance.
pub struct DispatchTable<S, D = ()> {
    dispatchers: Rc<HashMap<Tag, Dispatcher<S, D>>>,
}

impl<S, D> Clone for DispatchTable<S, D> {
    fn clone(&self) -> Self {
        Self {
            dispatchers: Rc::clone(&self.dispatchers),
        }
    }
}

impl<S: 'static, D: 'static> DispatchTable<S, D> {
    pub(crate) fn build(update: &UpdateMap<S, D>, runtime: RuntimeHandle<S, D>) -> Self {
        let dispatchers = update
            .reducers
            .iter()
            .map(|(&tag, reducer)| {
                let dispatcher = Dispatcher {
                    inner: Rc::new(DispatcherInner {
                        tag,
                        reducer: reducer.clone(),
                        runtime: runtime.clone(),
                    }),
                };
                (tag, dispatcher)
            })
            .collect();
        Self {
            dispatchers: Rc::new(dispatchers),
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(update: &UpdateMap<S, D>) -> Self {
        Self::build(update, RuntimeHandle::dangling())
    }

    pub fn get(&self, tag: &str) -> Option<&Dispatcher<S, D>> {
        self.dispatchers.get(tag)
    }

    pub fn try_dispatch<T: 'static>(&self, tag: &str, args: T) -> Result<(), DispatchError> {
        match self.get(tag) {
            Some(dispatcher) => dispatcher.try_dispatch(args),
            None => Err(DispatchError::UnknownTag {
                tag: tag.to_owned(),
            }),
        }
    }

    /// Dispatches `args` to `tag`, panicking on an unknown tag or an
    /// argument type mismatch.
    pub fn dispatch<T: 'static>(&self, tag: &str, args: T) {
        if let Err(err) = self.try_dispatch(tag, args) {
            panic!("{err}");
        }
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self.dispatchers.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.dispatchers, &other.dispatchers)
    }

    /// Address-based identity, stable for the table's lifetime.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.dispatchers) as *const () as usize
    }
}

impl<S, D> fmt::Debug for DispatchTable<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<Tag> = self.dispatchers.keys().copied().collect();
        tags.sort_unstable();
        f.debug_struct("DispatchTable").field("tags", &tags).finish()
    }
}
