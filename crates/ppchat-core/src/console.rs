//! Console input: a reader thread feeding the bounded command queue.
//!
//! The reader blocks on `read_line` and pushes each normalised line into a
//! [`BoundedCommandQueue`].  The main dispatch loop pulls lines back out
//! with [`ConsoleInput::try_dequeue_console_line`] or
//! [`ConsoleInput::wait_console_line`].  A full queue drops the line
//! silently, exactly like any other queue overflow.
//!
//! End of input (or a read error) raises the process-wide quit flag: with no
//! console there is no way to issue `/quit` any more.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::InputConfig;
use crate::context::SharedContext;
use crate::queue::BoundedCommandQueue;

/// Strips the trailing line terminator and rejects lines with nothing left.
pub fn normalize_console_line(raw: &str) -> Option<&str> {
    let line = raw.trim_end_matches(['\r', '\n']);
    (!line.is_empty()).then_some(line)
}

/// Handle to the console command queue.  Clones share the same queue.
#[derive(Clone)]
pub struct ConsoleInput {
    queue: Arc<BoundedCommandQueue>,
}

impl ConsoleInput {
    pub fn new(max_items: usize, item_size: usize) -> Self {
        Self {
            queue: Arc::new(BoundedCommandQueue::new(max_items, item_size)),
        }
    }

    pub fn from_config(input: &InputConfig) -> Self {
        Self::new(input.max_items, input.item_size)
    }

    /// Normalises `raw` and queues it.
    ///
    /// Returns `false` when the line was empty or the queue was full.
    pub fn enqueue_console_line(&self, raw: &str) -> bool {
        match normalize_console_line(raw) {
            Some(line) => match self.queue.try_enqueue(line) {
                Ok(()) => true,
                Err(e) => {
                    debug!("{e}, dropping line");
                    false
                }
            },
            None => false,
        }
    }

    /// Oldest queued line, if any.  Never blocks.
    pub fn try_dequeue_console_line(&self) -> Option<String> {
        self.queue.try_dequeue().ok()
    }

    /// Oldest queued line, waiting up to `timeout` for one to arrive.
    pub fn wait_console_line(&self, timeout: Duration) -> Option<String> {
        self.queue.wait_dequeue(timeout)
    }

    pub fn queue(&self) -> &BoundedCommandQueue {
        &self.queue
    }

    /// Starts a thread that reads lines from `reader` until end of input,
    /// a read error, or the quit flag.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be created.
    pub fn spawn_reader<R>(&self, reader: R, context: Arc<SharedContext>) -> io::Result<JoinHandle<()>>
    where
        R: BufRead + Send + 'static,
    {
        let input = self.clone();
        thread::Builder::new()
            .name("ppchat-console".to_string())
            .spawn(move || input.read_loop(reader, &context))
    }

    /// [`spawn_reader`](Self::spawn_reader) over the process's standard input.
    pub fn spawn_stdin_reader(&self, context: Arc<SharedContext>) -> io::Result<JoinHandle<()>> {
        self.spawn_reader(io::BufReader::new(io::stdin()), context)
    }

    fn read_loop<R: BufRead>(&self, mut reader: R, context: &SharedContext) {
        let mut line = String::new();
        while !context.is_quit() {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => {
                    if !context.is_quit() {
                        info!("console input closed");
                        context.request_quit();
                    }
                    return;
                }
                Ok(_) => {
                    self.enqueue_console_line(&line);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    if !context.is_quit() {
                        error!("couldn't read from stdin: {e}");
                        context.request_quit();
                    }
                    return;
                }
            }
        }
    }
}

impl Default for ConsoleInput {
    fn default() -> Self {
        Self::from_config(&InputConfig::default())
    }
}
