//! Typed handler handles and their type-erased form stored by the bus.

use crate::error::EventError;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Any value that can travel through the event bus.
///
/// Implemented automatically for every `Send + Sync + 'static` type.
pub trait GameEvent: Any + Send + Sync + 'static {
    fn event_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> GameEvent for T {
    fn event_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback<T> = Arc<dyn Fn(&T) -> Result<(), EventError> + Send + Sync>;

/// A subscribable event handler.
///
/// Identity is the handle itself: clones compare equal and can be used to
/// unsubscribe, while two handlers built from identical closures are
/// distinct.
///
/// # Examples
///
/// ```rust
/// use scarlet_core::Handler;
///
/// struct Damage(u32);
///
/// let on_damage = Handler::new(|event: &Damage| {
///     println!("took {} damage", event.0);
///     Ok(())
/// });
/// assert!(on_damage.same_as(&on_damage.clone()));
/// ```
pub struct Handler<T> {
    callback: Callback<T>,
    name: Arc<str>,
}

impl<T: GameEvent> Handler<T> {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        Self::named(std::any::type_name::<F>(), callback)
    }

    /// Creates a handler with an explicit name for diagnostics.
    pub fn named<F>(name: impl Into<Arc<str>>, callback: F) -> Self
    where
        F: Fn(&T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when both handles refer to the same handler.
    pub fn same_as(&self, other: &Handler<T>) -> bool {
        self.key() == other.key()
    }

    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.callback) as *const () as usize
    }

    pub(crate) fn erase(&self) -> Arc<dyn EventHandler> {
        Arc::new(TypedEventHandler {
            handler: self.clone(),
            _phantom: PhantomData,
        })
    }
}

impl<T> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
            name: Arc::clone(&self.name),
        }
    }
}

impl<T> std::fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}

/// Type-erased handler as stored in the subscriber table.
pub(crate) trait EventHandler: Send + Sync {
    fn handle(&self, event: &(dyn Any + Send + Sync)) -> Result<(), EventError>;

    fn handler_key(&self) -> usize;

    fn handler_name(&self) -> &str;
}

/// Downcasts the payload and forwards it to a [`Handler<T>`].
struct TypedEventHandler<T> {
    handler: Handler<T>,
    _phantom: PhantomData<fn(T)>,
}

impl<T: GameEvent> EventHandler for TypedEventHandler<T> {
    fn handle(&self, event: &(dyn Any + Send + Sync)) -> Result<(), EventError> {
        match event.downcast_ref::<T>() {
            Some(event) => (self.handler.callback)(event),
            None => Err(EventError::HandlerExecution(format!(
                "{} expected {}",
                self.handler.name,
                std::any::type_name::<T>()
            ))),
        }
    }

    fn handler_key(&self) -> usize {
        self.handler.key()
    }

    fn handler_name(&self) -> &str {
        &self.handler.name
    }
}
