use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use update_supervisor::errors::Result;
use update_supervisor::exec::{UpdateInvocation, UpdateOutcome, UpdateRunner};

type RunHook = Box<dyn FnMut(&UpdateInvocation) + Send>;

/// A fake update runner that:
/// - records every invocation
/// - calls an optional hook (to fake the engine's side effects)
/// - answers with scripted outcomes, then with plain successes.
pub struct FakeRunner {
    outcomes: VecDeque<UpdateOutcome>,
    invocations: Arc<Mutex<Vec<UpdateInvocation>>>,
    on_run: Option<RunHook>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            outcomes: VecDeque::new(),
            invocations: Arc::new(Mutex::new(Vec::new())),
            on_run: None,
        }
    }

    pub fn with_outcome(mut self, exit_code: i32, trace: &str) -> Self {
        self.outcomes.push_back(UpdateOutcome {
            exit_code,
            trace: trace.to_string(),
        });
        self
    }

    pub fn on_run(mut self, hook: impl FnMut(&UpdateInvocation) + Send + 'static) -> Self {
        self.on_run = Some(Box::new(hook));
        self
    }

    /// Shared handle to the recorded invocations.
    pub fn invocations(&self) -> Arc<Mutex<Vec<UpdateInvocation>>> {
        Arc::clone(&self.invocations)
    }
}

impl Default for FakeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateRunner for FakeRunner {
    fn run_update(
        &mut self,
        invocation: UpdateInvocation,
    ) -> Pin<Box<dyn Future<Output = Result<UpdateOutcome>> + Send + '_>> {
        Box::pin(async move {
            if let Some(hook) = self.on_run.as_mut() {
                hook(&invocation);
            }
            self.invocations.lock().unwrap().push(invocation);

            Ok(self.outcomes.pop_front().unwrap_or(UpdateOutcome {
                exit_code: 0,
                trace: String::new(),
            }))
        })
    }
}
