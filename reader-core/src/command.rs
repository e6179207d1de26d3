use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::CommandError;

const ERROR_CHANNEL_CAPACITY: usize = 16;

type CommandBody = Arc<dyn Fn() -> BoxFuture<'static, Result<(), CommandError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    Idle,
    Executing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed,
    Failed,
}

/// Re-invokable asynchronous command.
///
/// Each `execute` runs the body once on the runtime. Executions do not exclude
/// each other; the command counts as executing while any of them is in flight.
/// Body failures go to the error channel and the log, never to the caller.
pub struct ReactiveCommand {
    name: &'static str,
    body: CommandBody,
    in_flight: Arc<watch::Sender<usize>>,
    errors: broadcast::Sender<Arc<CommandError>>,
}

impl ReactiveCommand {
    pub fn from_async<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CommandError>> + Send + 'static,
    {
        let (in_flight, _) = watch::channel(0usize);
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            name,
            body: Arc::new(move || body().boxed()),
            in_flight: Arc::new(in_flight),
            errors,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Starts one execution. The command reports itself as executing before
    /// this returns. Must be called from within a tokio runtime.
    pub fn execute(&self) -> CommandHandle {
        self.in_flight.send_modify(|count| *count += 1);
        let guard = InFlightGuard(self.in_flight.clone());
        debug!(command = self.name, "command started");

        // The body starts here, so it sees the state current at invocation.
        let body = match std::panic::catch_unwind(AssertUnwindSafe(|| (self.body)())) {
            Ok(body) => body,
            Err(panic) => {
                let err = CommandError::Panicked(panic_message(panic.as_ref()));
                async move { Err(err) }.boxed()
            }
        };
        let errors = self.errors.clone();
        let name = self.name;
        let join = tokio::spawn(async move {
            let _guard = guard;
            let result = match AssertUnwindSafe(body).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(CommandError::Panicked(panic_message(panic.as_ref()))),
            };

            match result {
                Ok(()) => {
                    debug!(command = name, "command finished");
                    CommandOutcome::Completed
                }
                Err(e) => {
                    error!(command = name, error = %e, "command failed");
                    // Nobody listening is fine; the failure is already logged.
                    let _ = errors.send(Arc::new(e));
                    CommandOutcome::Failed
                }
            }
        });

        CommandHandle { join }
    }

    pub fn is_executing(&self) -> bool {
        *self.in_flight.borrow() > 0
    }

    pub fn phase(&self) -> CommandPhase {
        if self.is_executing() {
            CommandPhase::Executing
        } else {
            CommandPhase::Idle
        }
    }

    /// Read-only busy projection of this command.
    pub fn busy_state(&self) -> BusyState {
        BusyState {
            in_flight: self.in_flight.subscribe(),
        }
    }

    pub fn subscribe_errors(&self) -> broadcast::Receiver<Arc<CommandError>> {
        self.errors.subscribe()
    }
}

impl std::fmt::Debug for ReactiveCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveCommand")
            .field("name", &self.name)
            .field("in_flight", &*self.in_flight.borrow())
            .finish()
    }
}

struct InFlightGuard(Arc<watch::Sender<usize>>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Handle on a single execution.
#[derive(Debug)]
pub struct CommandHandle {
    join: JoinHandle<CommandOutcome>,
}

impl CommandHandle {
    /// Waits for the body to finish. Failures are reported as
    /// [`CommandOutcome::Failed`]; the error itself is on the error channel.
    pub async fn join(self) -> CommandOutcome {
        self.join.await.unwrap_or(CommandOutcome::Failed)
    }
}

/// Busy flag derived from a command's executions.
#[derive(Debug, Clone)]
pub struct BusyState {
    in_flight: watch::Receiver<usize>,
}

impl BusyState {
    pub fn get(&self) -> bool {
        *self.in_flight.borrow() > 0
    }

    /// Resolves once the flag equals `busy`. Returns immediately if it already does.
    pub async fn wait_for(&mut self, busy: bool) -> bool {
        let reached = self.in_flight.wait_for(|count| (*count > 0) == busy).await.is_ok();
        if reached {
            busy
        } else {
            self.get()
        }
    }
}
