//! Message bus: runs a command and every message it leads to.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use common::BatchReference;
use domain::{Command, Event, Message};
use store::{Backend, UnitOfWork};
use tracing::{debug, error, info, warn};

use crate::error::{Result, ServiceError};
use crate::registry::{Dependencies, HandlerRegistry, Injected};
use crate::retry::RetryPolicy;

/// What a command handler returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command ran and has nothing to report.
    Completed,
    /// An allocation ran. `None` means no batch could take the line.
    Allocated(Option<BatchReference>),
}

impl CommandOutcome {
    /// The batch an allocation landed in, if any.
    pub fn batch_reference(&self) -> Option<&BatchReference> {
        match self {
            CommandOutcome::Allocated(reference) => reference.as_ref(),
            CommandOutcome::Completed => None,
        }
    }
}

/// Routes messages to their handlers.
///
/// One `handle()` call runs to completion before it returns: it works
/// through a FIFO queue seeded with the given message, and after each handler
/// appends whatever the touched products recorded. Commands go to their one
/// handler and fail the whole call when that handler fails. Events go to each
/// of their handlers in turn, each retried on failure and given up on
/// (logged) once its attempts are spent.
///
/// Every `handle()` call gets its own [`UnitOfWork`], so concurrent calls
/// never share a queue or a seen list.
pub struct MessageBus<B: Backend> {
    backend: Arc<B>,
    registry: Arc<HandlerRegistry<B>>,
    dependencies: Dependencies,
    retry: RetryPolicy,
}

impl<B: Backend> MessageBus<B> {
    /// Creates a bus.
    pub fn new(
        backend: Arc<B>,
        registry: HandlerRegistry<B>,
        dependencies: Dependencies,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            registry: Arc::new(registry),
            dependencies,
            retry,
        }
    }

    /// Returns the storage backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Returns the retry policy for event handlers.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Opens a fresh unit of work, for read-side queries.
    pub fn unit_of_work(&self) -> UnitOfWork<B> {
        UnitOfWork::new(self.backend.clone())
    }

    /// Handles a message and everything it leads to.
    ///
    /// Returns the result of every command handler that ran, in order. Events
    /// contribute nothing to the list.
    ///
    /// # Errors
    ///
    /// Fails with the first command handler error. Messages still queued at
    /// that point are dropped. Event handler errors never fail the call.
    pub async fn handle(&self, message: impl Into<Message>) -> Result<Vec<CommandOutcome>> {
        self.dispatch(message.into()).await
    }

    #[tracing::instrument(skip_all, fields(message = message.name()))]
    async fn dispatch(&self, message: Message) -> Result<Vec<CommandOutcome>> {
        let started = Instant::now();
        let uow = Arc::new(UnitOfWork::new(self.backend.clone()));
        let mut queue = VecDeque::from([message]);
        let mut results = Vec::new();

        while let Some(message) = queue.pop_front() {
            match message {
                Message::Command(command) => {
                    let outcome = self.handle_command(&uow, command, &mut queue).await?;
                    results.push(outcome);
                }
                Message::Event(event) => self.handle_event(&uow, event, &mut queue).await,
            }
        }

        metrics::histogram!("messagebus_handle_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        debug!(commands = results.len(), "Message handled");
        Ok(results)
    }

    async fn handle_command(
        &self,
        uow: &Arc<UnitOfWork<B>>,
        command: Command,
        queue: &mut VecDeque<Message>,
    ) -> Result<CommandOutcome> {
        let kind = command.kind();
        metrics::counter!("messagebus_commands_total", "command" => kind.as_str()).increment(1);

        let Some(handler) = self.registry.command_handler(kind) else {
            metrics::counter!("messagebus_command_failures_total", "command" => kind.as_str())
                .increment(1);
            error!(command = %kind, "No handler registered for command");
            return Err(ServiceError::UnknownCommand(kind.to_string()));
        };

        debug!(command = %kind, handler = handler.name, "Handling command");
        let injected = Injected::bind(handler.needs, uow, &self.dependencies);
        match handler.call(command, injected).await {
            Ok(outcome) => {
                queue.extend(uow.collect_new_events());
                Ok(outcome)
            }
            Err(err) => {
                metrics::counter!("messagebus_command_failures_total", "command" => kind.as_str())
                    .increment(1);
                error!(command = %kind, handler = handler.name, error = %err, "Command failed");
                Err(err)
            }
        }
    }

    async fn handle_event(
        &self,
        uow: &Arc<UnitOfWork<B>>,
        event: Event,
        queue: &mut VecDeque<Message>,
    ) {
        let kind = event.kind();
        metrics::counter!("messagebus_events_total", "event" => kind.as_str()).increment(1);

        let handlers = self.registry.event_handlers(kind);
        if handlers.is_empty() {
            debug!(event = %kind, "No handlers for event");
            return;
        }

        let max_attempts = self.retry.max_attempts();
        for handler in handlers {
            for attempt in 1..=max_attempts {
                debug!(event = %kind, handler = handler.name, attempt, "Handling event");
                let injected = Injected::bind(handler.needs, uow, &self.dependencies);
                let result = handler.call(event.clone(), injected).await;
                queue.extend(uow.collect_new_events());

                let err = match result {
                    Ok(()) => break,
                    Err(err) => err,
                };

                if attempt < max_attempts {
                    metrics::counter!("messagebus_event_handler_retries_total", "handler" => handler.name)
                        .increment(1);
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        event = %kind,
                        handler = handler.name,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Event handler failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                } else {
                    metrics::counter!("messagebus_event_handler_failures_total", "handler" => handler.name)
                        .increment(1);
                    error!(
                        event = %kind,
                        handler = handler.name,
                        attempts = max_attempts,
                        error = %err,
                        "Event handler gave up"
                    );
                }
            }
        }
        info!(event = %kind, handlers = handlers.len(), "Event handled");
    }
}
