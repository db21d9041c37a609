//! Stand-ins for fonts that are still being built
//!
//! While a backend constructs a font the registry lock is released, so a
//! second thread may ask for the same key. It finds a [`Placeholder`] in the
//! table, waits on it, and retries once the builder has published the real
//! font (or given up).

use parking_lot::{Condvar, Mutex};

/// A gate that opens once, when construction of its key has finished
#[derive(Debug, Default)]
pub(crate) struct Placeholder {
    done: Mutex<bool>,
    opened: Condvar,
}

impl Placeholder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Block until [`Placeholder::open`] has been called
    pub(crate) fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.opened.wait(&mut done);
        }
    }

    /// Release every waiter; later waits return at once
    pub(crate) fn open(&self) {
        *self.done.lock() = true;
        self.opened.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn waiters_block_until_opened() {
        let placeholder = Arc::new(Placeholder::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let placeholder = Arc::clone(&placeholder);
                thread::spawn(move || placeholder.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        assert!(waiters.iter().all(|w| !w.is_finished()));

        placeholder.open();
        for waiter in waiters {
            waiter.join().unwrap();
        }
    }

    #[test]
    fn wait_after_open_returns_immediately() {
        let placeholder = Placeholder::new();
        placeholder.open();
        placeholder.wait();
    }
}
