//! Bookkeeping for the threads the broker spawns.

use std::io;
use std::mem;
use std::thread::{self, JoinHandle};

/// Named threads whose completion can be observed.
///
/// Finished threads are collected with [`reap`](Self::reap) so that their return value (or
/// panic) is not lost; [`join_all`](Self::join_all) waits for everything still running.
pub(crate) struct TaskSet<T> {
    tasks: Vec<Task<T>>,
}

struct Task<T> {
    name: String,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> TaskSet<T> {
    pub fn new() -> Self {
        Self { tasks: vec![] }
    }

    pub fn spawn<F>(&mut self, name: String, f: F) -> io::Result<()>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.clone()).spawn(f)?;
        self.tasks.push(Task { name, handle });
        Ok(())
    }

    /// Number of tasks not reaped yet, finished or not.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Joins every task that already finished.
    pub fn reap(&mut self) -> Vec<(String, thread::Result<T>)> {
        let (finished, running): (Vec<_>, Vec<_>) = mem::take(&mut self.tasks)
            .into_iter()
            .partition(|task| task.handle.is_finished());
        self.tasks = running;
        finished.into_iter().map(Task::join).collect()
    }

    /// Blocks until every task finished.
    pub fn join_all(&mut self) -> Vec<(String, thread::Result<T>)> {
        mem::take(&mut self.tasks).into_iter().map(Task::join).collect()
    }
}

impl<T> Task<T> {
    fn join(self) -> (String, thread::Result<T>) {
        (self.name, self.handle.join())
    }
}
