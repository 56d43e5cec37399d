/*!
 * Guest Registry
 * Commands a sandbox can run, each backed by a guest module factory
 */

use ahash::HashMap;
use std::sync::Arc;

use crate::syscalls::{GuestHost, Trap};

/// An instantiated guest program
///
/// `start` runs the program to completion against the import set in
/// `host`. Returning `Ok` is exit code 0; `Trap::Exit` carries any other
/// code.
pub trait GuestModule: Send {
    fn start(&mut self, host: &mut GuestHost) -> Result<(), Trap>;
}

/// Builds a fresh guest instance per process
pub type GuestFactory = Arc<dyn Fn() -> Box<dyn GuestModule> + Send + Sync>;

struct FnGuest<F>(Arc<F>);

impl<F> GuestModule for FnGuest<F>
where
    F: Fn(&mut GuestHost) -> Result<(), Trap> + Send + Sync,
{
    fn start(&mut self, host: &mut GuestHost) -> Result<(), Trap> {
        (self.0)(host)
    }
}

/// Command name → guest factory
#[derive(Clone, Default)]
pub struct GuestRegistry {
    commands: HashMap<String, GuestFactory>,
}

impl GuestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, command: &str, factory: GuestFactory) {
        self.commands.insert(command.to_string(), factory);
    }

    /// Register a stateless guest written as a function
    pub fn register_fn<F>(&mut self, command: &str, program: F)
    where
        F: Fn(&mut GuestHost) -> Result<(), Trap> + Send + Sync + 'static,
    {
        let program = Arc::new(program);
        self.register(
            command,
            Arc::new(move || Box::new(FnGuest(Arc::clone(&program))) as Box<dyn GuestModule>),
        );
    }

    #[must_use]
    pub fn with_fn<F>(mut self, command: &str, program: F) -> Self
    where
        F: Fn(&mut GuestHost) -> Result<(), Trap> + Send + Sync + 'static,
    {
        self.register_fn(command, program);
        self
    }

    /// New instance of `command`
    pub fn instantiate(&self, command: &str) -> Option<Box<dyn GuestModule>> {
        self.commands.get(command).map(|factory| factory())
    }

    pub fn contains(&self, command: &str) -> bool {
        self.commands.contains_key(command)
    }

    pub fn commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for GuestRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestRegistry")
            .field("commands", &self.commands())
            .finish()
    }
}
