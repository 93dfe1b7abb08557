//! Initialization logic spawning one thread per fabric endpoint.

use std::thread;

use crate::allocator::generic::GenericBuilder;
use crate::allocator::process::Process;
use crate::allocator::thread::ThreadBuilder;
use crate::allocator::FabricBuilder;
use crate::Generic;

/// Possible configurations for the communication infrastructure.
///
/// A multi-process cluster transport would slot in here; the engine only
/// requires the collective contract, not any particular transport.
pub enum Configuration {
    /// Use one thread.
    Thread,
    /// Use one process with an indicated number of worker threads.
    Process(usize),
}

impl Configuration {
    /// Returns a `getopts::Options` that parses the worker count.
    pub fn options() -> getopts::Options {
        let mut opts = getopts::Options::new();
        opts.optopt("w", "workers", "number of worker threads", "NUM");
        opts
    }

    /// Constructs a configuration from supplied text arguments.
    ///
    /// Most commonly, this uses `std::env::args()` as the supplied iterator.
    pub fn from_args<I: Iterator<Item = String>>(args: I) -> Result<Configuration, String> {
        let opts = Configuration::options();
        let matches = opts.parse(args).map_err(|e| format!("{:?}", e))?;
        let workers = matches
            .opt_str("w")
            .map(|x| x.parse().map_err(|e| format!("{:?}", e)))
            .transpose()?
            .unwrap_or(1);
        if workers > 1 {
            Ok(Configuration::Process(workers))
        } else {
            Ok(Configuration::Thread)
        }
    }

    /// Assembles the described communication infrastructure.
    pub fn try_build(self) -> Result<Vec<GenericBuilder>, String> {
        match self {
            Configuration::Thread => Ok(vec![GenericBuilder::Thread(ThreadBuilder)]),
            Configuration::Process(workers) => {
                if workers == 0 {
                    return Err("at least one worker required".to_owned());
                }
                Ok(Process::new_vector(workers)
                    .into_iter()
                    .map(GenericBuilder::Process)
                    .collect())
            }
        }
    }
}

/// Initializes communication and executes a distributed computation.
///
/// This method allocates a fabric endpoint builder for each worker, spawns
/// local worker threads, and invokes the supplied function with each built
/// endpoint. The returned [`WorkerGuards`] can be `join`ed to retrieve the
/// return values (or errors) of the workers.
pub fn initialize<T, F>(config: Configuration, func: F) -> Result<WorkerGuards<T>, String>
where
    T: Send + 'static,
    F: Fn(Generic) -> T + Send + Sync + 'static,
{
    let builders = config.try_build()?;
    initialize_from(builders, func)
}

/// Initializes computation from an explicit list of endpoint builders.
pub fn initialize_from<A, T, F>(builders: Vec<A>, func: F) -> Result<WorkerGuards<T>, String>
where
    A: FabricBuilder + 'static,
    T: Send + 'static,
    F: Fn(<A as FabricBuilder>::Fabric) -> T + Send + Sync + 'static,
{
    let logic = std::sync::Arc::new(func);
    let mut guards = Vec::new();
    for (index, builder) in builders.into_iter().enumerate() {
        let clone = logic.clone();
        guards.push(
            thread::Builder::new()
                .name(format!("matching:work-{}", index))
                .spawn(move || {
                    let fabric = builder.build();
                    (*clone)(fabric)
                })
                .map_err(|e| format!("{:?}", e))?,
        );
    }
    Ok(WorkerGuards { guards })
}

/// Maintains `JoinHandle`s for worker threads.
pub struct WorkerGuards<T: Send + 'static> {
    guards: Vec<thread::JoinHandle<T>>,
}

impl<T: Send + 'static> WorkerGuards<T> {
    /// Provides access to the underlying join handles.
    pub fn guards(&self) -> &[thread::JoinHandle<T>] {
        &self.guards[..]
    }

    /// Waits on the worker threads and returns the results they produce.
    pub fn join(mut self) -> Vec<Result<T, String>> {
        self.guards
            .drain(..)
            .map(|guard| guard.join().map_err(|e| format!("{:?}", e)))
            .collect()
    }
}

impl<T: Send + 'static> Drop for WorkerGuards<T> {
    fn drop(&mut self) {
        for guard in self.guards.drain(..) {
            guard.join().expect("worker panic");
        }
    }
}
