//! Handler instance construction.
//!
//! Receive points never hold handler instances; they call back into a
//! [`HandlerResolver`] at dispatch time. [`HandlerContainer`] is the default
//! resolver, keyed by [`HandlerType`].

use crate::descriptor::registered_consumers;
use crate::error::HandlerResolutionError;
use crate::handler::{Consumer, ConsumerHandler, HandlerLifetime, HandlerType, MessageHandler};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;

/// Object-construction collaborator used at dispatch time
pub trait HandlerResolver: Send + Sync {
    fn resolve(&self, handler_type: &HandlerType) -> Result<Arc<dyn MessageHandler>, HandlerResolutionError>;
}

type Constructor = Arc<dyn Fn() -> Result<Arc<dyn MessageHandler>, HandlerResolutionError> + Send + Sync>;

enum Registration {
    /// Constructed on first resolve, then shared
    Lazy {
        construct: Constructor,
        instance: Mutex<Option<Arc<dyn MessageHandler>>>,
    },
    /// Constructor called on every resolve
    PerResolve(Constructor),
}

impl Registration {
    fn for_lifetime(lifetime: HandlerLifetime, construct: Constructor) -> Self {
        match lifetime {
            HandlerLifetime::Singleton => Self::Lazy {
                construct,
                instance: Mutex::new(None),
            },
            HandlerLifetime::Transient => Self::PerResolve(construct),
        }
    }

    fn resolve(&self) -> Result<Arc<dyn MessageHandler>, HandlerResolutionError> {
        match self {
            Self::PerResolve(construct) => construct(),
            Self::Lazy { construct, instance } => {
                let mut slot = instance.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(handler) = slot.as_ref() {
                    return Ok(handler.clone());
                }
                let handler = construct()?;
                *slot = Some(handler.clone());
                Ok(handler)
            }
        }
    }
}

/// Default [`HandlerResolver`]
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use pubsub_runtime::{ConsumeContext, Consumer, HandlerContainer, HandlerResolver, HandlerType};
///
/// #[derive(Default)]
/// struct Auditor;
///
/// #[async_trait]
/// impl Consumer for Auditor {
///     type Message = String;
///
///     async fn consume(&self, _ctx: ConsumeContext<String>) -> anyhow::Result<()> {
///         Ok(())
///     }
/// }
///
/// let mut container = HandlerContainer::new();
/// container.transient(Auditor::default);
/// assert!(container.resolve(&HandlerType::of::<Auditor>()).is_ok());
/// ```
#[derive(Default)]
pub struct HandlerContainer {
    registrations: HashMap<HandlerType, Registration>,
}

impl HandlerContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-built instance shared by every dispatch
    pub fn singleton<C: Consumer>(&mut self, consumer: C) -> &mut Self {
        let handler = ConsumerHandler::into_handler(consumer);
        self.insert(
            HandlerType::of::<C>(),
            Registration::PerResolve(Arc::new(move || Ok(handler.clone()))),
        )
    }

    /// Register a factory called once, on first dispatch
    pub fn lazy_singleton<C, F>(&mut self, factory: F) -> &mut Self
    where
        C: Consumer,
        F: Fn() -> anyhow::Result<C> + Send + Sync + 'static,
    {
        self.insert(
            HandlerType::of::<C>(),
            Registration::for_lifetime(HandlerLifetime::Singleton, fallible::<C, F>(factory)),
        )
    }

    /// Register a factory called on every dispatch
    pub fn transient<C, F>(&mut self, factory: F) -> &mut Self
    where
        C: Consumer,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.insert(
            HandlerType::of::<C>(),
            Registration::PerResolve(Arc::new(move || Ok(ConsumerHandler::into_handler(factory())))),
        )
    }

    /// Register a fallible factory called on every dispatch
    pub fn try_transient<C, F>(&mut self, factory: F) -> &mut Self
    where
        C: Consumer,
        F: Fn() -> anyhow::Result<C> + Send + Sync + 'static,
    {
        self.insert(
            HandlerType::of::<C>(),
            Registration::PerResolve(fallible::<C, F>(factory)),
        )
    }

    /// Register the constructors of every consumer declared with `consumer!`.
    ///
    /// Types that already have an explicit registration keep it.
    pub fn register_discovered(&mut self) -> &mut Self {
        for registration in registered_consumers() {
            let candidate = (registration.describe)();
            if self.registrations.contains_key(&candidate.handler_type) {
                continue;
            }

            let lifetime = candidate
                .binding
                .map(|options| options.lifetime)
                .unwrap_or_default();
            let construct = registration.construct;
            debug!(handler = %candidate.handler_type, ?lifetime, "Registered discovered consumer");
            self.registrations.insert(
                candidate.handler_type,
                Registration::for_lifetime(lifetime, Arc::new(move || Ok(construct()))),
            );
        }
        self
    }

    pub fn contains(&self, handler_type: &HandlerType) -> bool {
        self.registrations.contains_key(handler_type)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    fn insert(&mut self, handler_type: HandlerType, registration: Registration) -> &mut Self {
        self.registrations.insert(handler_type, registration);
        self
    }
}

impl HandlerResolver for HandlerContainer {
    fn resolve(&self, handler_type: &HandlerType) -> Result<Arc<dyn MessageHandler>, HandlerResolutionError> {
        self.registrations
            .get(handler_type)
            .ok_or_else(|| HandlerResolutionError::NotRegistered {
                handler_type: handler_type.to_string(),
            })?
            .resolve()
    }
}

impl std::fmt::Debug for HandlerContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.registrations.keys().collect();
        types.sort();
        f.debug_struct("HandlerContainer")
            .field("registrations", &types)
            .finish()
    }
}

fn fallible<C, F>(factory: F) -> Constructor
where
    C: Consumer,
    F: Fn() -> anyhow::Result<C> + Send + Sync + 'static,
{
    Arc::new(move || {
        factory()
            .map(ConsumerHandler::into_handler)
            .map_err(|e| HandlerResolutionError::ConstructionFailed {
                handler_type: HandlerType::of::<C>().to_string(),
                message: format!("{:#}", e),
            })
    })
}
