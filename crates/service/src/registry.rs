//! Handler registry and dependency injection.
//!
//! Every handler is registered with the message type it handles and a
//! [`Needs`] value naming the collaborators it uses. When the bus calls a
//! handler it builds an [`Injected`] holding exactly those collaborators, so
//! a handler can be driven in tests with fakes for just the ports it touches.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use domain::{Command, CommandKind, CommandType, Event, EventKind, EventType};
use futures_util::future::{BoxFuture, FutureExt};
use store::{Backend, UnitOfWork};
use tracing::warn;

use crate::bus::CommandOutcome;
use crate::error::{Result, ServiceError};
use crate::services::{Notifier, Publisher};

/// The collaborators a handler declares it needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Needs {
    pub uow: bool,
    pub notifier: bool,
    pub publisher: bool,
}

impl Needs {
    /// No collaborators at all.
    pub const NONE: Needs = Needs {
        uow: false,
        notifier: false,
        publisher: false,
    };

    /// Only the unit of work.
    pub const UOW: Needs = Needs {
        uow: true,
        ..Needs::NONE
    };

    /// Only the notifier.
    pub const NOTIFIER: Needs = Needs {
        notifier: true,
        ..Needs::NONE
    };

    /// Only the publisher.
    pub const PUBLISHER: Needs = Needs {
        publisher: true,
        ..Needs::NONE
    };

    /// Combines two sets of needs.
    pub const fn and(self, other: Needs) -> Needs {
        Needs {
            uow: self.uow || other.uow,
            notifier: self.notifier || other.notifier,
            publisher: self.publisher || other.publisher,
        }
    }
}

/// Process-wide collaborators the bus can hand to handlers.
///
/// The unit of work is not in here: the bus creates a fresh one for every
/// `handle()` run.
#[derive(Clone)]
pub struct Dependencies {
    pub notifier: Arc<dyn Notifier>,
    pub publisher: Arc<dyn Publisher>,
}

impl Dependencies {
    pub fn new(notifier: Arc<dyn Notifier>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            notifier,
            publisher,
        }
    }
}

/// The collaborators bound for one handler call.
///
/// Only what the handler declared is present. Asking for anything else fails
/// with `MissingDependency`.
pub struct Injected<B: Backend> {
    uow: Option<Arc<UnitOfWork<B>>>,
    notifier: Option<Arc<dyn Notifier>>,
    publisher: Option<Arc<dyn Publisher>>,
}

impl<B: Backend> Injected<B> {
    /// Binds the declared subset of the available collaborators.
    pub fn bind(needs: Needs, uow: &Arc<UnitOfWork<B>>, dependencies: &Dependencies) -> Self {
        Self {
            uow: needs.uow.then(|| uow.clone()),
            notifier: needs.notifier.then(|| dependencies.notifier.clone()),
            publisher: needs.publisher.then(|| dependencies.publisher.clone()),
        }
    }

    /// Nothing bound.
    pub fn empty() -> Self {
        Self {
            uow: None,
            notifier: None,
            publisher: None,
        }
    }

    pub fn with_uow(mut self, uow: Arc<UnitOfWork<B>>) -> Self {
        self.uow = Some(uow);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn uow(&self) -> Result<&Arc<UnitOfWork<B>>> {
        self.uow.as_ref().ok_or(ServiceError::MissingDependency("uow"))
    }

    pub fn notifier(&self) -> Result<&Arc<dyn Notifier>> {
        self.notifier
            .as_ref()
            .ok_or(ServiceError::MissingDependency("notifier"))
    }

    pub fn publisher(&self) -> Result<&Arc<dyn Publisher>> {
        self.publisher
            .as_ref()
            .ok_or(ServiceError::MissingDependency("publisher"))
    }
}

type CommandFn<B> =
    Arc<dyn Fn(Command, Injected<B>) -> BoxFuture<'static, Result<CommandOutcome>> + Send + Sync>;
type EventFn<B> = Arc<dyn Fn(Event, Injected<B>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A registered command handler.
pub struct CommandHandler<B: Backend> {
    pub name: &'static str,
    pub needs: Needs,
    call: CommandFn<B>,
}

impl<B: Backend> CommandHandler<B> {
    pub(crate) fn call(&self, command: Command, injected: Injected<B>) -> BoxFuture<'static, Result<CommandOutcome>> {
        (self.call)(command, injected)
    }
}

/// A registered event handler.
pub struct EventHandler<B: Backend> {
    pub name: &'static str,
    pub needs: Needs,
    call: EventFn<B>,
}

impl<B: Backend> EventHandler<B> {
    pub(crate) fn call(&self, event: Event, injected: Injected<B>) -> BoxFuture<'static, Result<()>> {
        (self.call)(event, injected)
    }
}

/// Maps each command type to its one handler and each event type to its
/// ordered list of handlers.
pub struct HandlerRegistry<B: Backend> {
    commands: HashMap<CommandKind, CommandHandler<B>>,
    events: HashMap<EventKind, Vec<EventHandler<B>>>,
}

impl<B: Backend> HandlerRegistry<B> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            events: HashMap::new(),
        }
    }

    /// Registers the handler for command type `C`, replacing any previous one.
    pub fn on_command<C, F, Fut>(&mut self, name: &'static str, needs: Needs, handler: F) -> &mut Self
    where
        C: CommandType,
        F: Fn(C, Injected<B>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CommandOutcome>> + Send + 'static,
    {
        let call: CommandFn<B> = Arc::new(move |command, injected| match C::try_from_command(command) {
            Ok(command) => handler(command, injected).boxed(),
            Err(other) => {
                let kind = other.kind().to_string();
                async move { Err(ServiceError::UnknownCommand(kind)) }.boxed()
            }
        });

        let previous = self.commands.insert(C::KIND, CommandHandler { name, needs, call });
        if let Some(previous) = previous {
            warn!(command = %C::KIND, replaced = previous.name, by = name, "Command handler replaced");
        }
        self
    }

    /// Appends a handler for event type `E`. Handlers run in registration
    /// order.
    pub fn on_event<E, F, Fut>(&mut self, name: &'static str, needs: Needs, handler: F) -> &mut Self
    where
        E: EventType,
        F: Fn(E, Injected<B>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let call: EventFn<B> = Arc::new(move |event, injected| match E::try_from_event(event) {
            Ok(event) => handler(event, injected).boxed(),
            Err(other) => {
                let kind = other.kind().to_string();
                async move { Err(ServiceError::UnroutableMessage(kind)) }.boxed()
            }
        });

        self.events
            .entry(E::KIND)
            .or_default()
            .push(EventHandler { name, needs, call });
        self
    }

    /// Removes the handler for a command type.
    pub fn remove_command(&mut self, kind: CommandKind) -> &mut Self {
        self.commands.remove(&kind);
        self
    }

    /// Returns the handler for a command type.
    pub fn command_handler(&self, kind: CommandKind) -> Option<&CommandHandler<B>> {
        self.commands.get(&kind)
    }

    /// Returns the handlers for an event type, possibly none.
    pub fn event_handlers(&self, kind: EventKind) -> &[EventHandler<B>] {
        self.events
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl<B: Backend> Default for HandlerRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}
