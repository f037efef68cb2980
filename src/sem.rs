//! A small counting semaphore, backed by a Linux `eventfd`.
//!
//! Adapted from the wake primitive in `burst-chan` (an eventfd opened with
//! `EFD_SEMAPHORE`, polled to sleep, `read`/`write` to decrement/increment).
//! `burst-chan` used this to wake *all* receivers at once and let them race
//! for work; here we want the plain textbook semaphore instead — `post`
//! increments the counter, `wait` blocks until it can decrement it by
//! exactly one. `EFD_SEMAPHORE` gives us exactly that: every successful
//! `read` consumes 1 from the counter, no matter how high it is, and blocks
//! while the counter is zero.
//!
//! This is the primitive behind the connection engine's sender wakeup and
//! the worker pool's per-slot start/end signals.

use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};

/// A counting semaphore. `post`/`post_n` increment; `wait` blocks until it
/// can decrement by one; `wait_timeout` gives up after a deadline.
pub struct Semaphore {
    efd: EventFd,
}

impl Semaphore {
    /// Create a semaphore with the given initial count.
    pub fn new(initial: u32) -> nix::Result<Semaphore> {
        let efd = EventFd::from_flags(EfdFlags::EFD_SEMAPHORE | EfdFlags::EFD_CLOEXEC)?;
        if initial > 0 {
            efd.write(u64::from(initial))?;
        }
        Ok(Semaphore { efd })
    }

    /// Increment the count by one, waking a single waiter.
    pub fn post(&self) {
        self.efd.write(1).expect("eventfd write never fails for a live fd");
    }

    /// Increment the count by `n`, waking up to `n` waiters.
    pub fn post_n(&self, n: u32) {
        if n > 0 {
            self.efd
                .write(u64::from(n))
                .expect("eventfd write never fails for a live fd");
        }
    }

    /// Block until the count is non-zero, then decrement it by one.
    pub fn wait(&self) {
        self.efd.read().expect("eventfd read never fails for a live fd");
    }

    /// Block until the count is non-zero (decrementing by one) or `timeout`
    /// elapses. Returns `true` if it was signalled, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let mut fds = [PollFd::new(self.efd.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::try_from(ms).unwrap_or(PollTimeout::MAX)) {
            Ok(n) if n > 0 => {
                self.efd.read().expect("eventfd read never fails once poll reports readable");
                true
            }
            _ => false,
        }
    }
}

// `EventFd` is just an owned file descriptor; sharing it across threads
// behind an `Arc<Semaphore>` is sound the same way sharing any other fd is.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn post_then_wait_does_not_block() {
        let sem = Semaphore::new(0).unwrap();
        sem.post();
        sem.wait(); // must return promptly
    }

    #[test]
    fn wait_timeout_times_out_when_unsignalled() {
        let sem = Semaphore::new(0).unwrap();
        assert!(!sem.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn post_wakes_a_blocked_waiter() {
        let sem = Arc::new(Semaphore::new(0).unwrap());
        let sem2 = sem.clone();
        let th = thread::spawn(move || sem2.wait());
        thread::sleep(Duration::from_millis(20));
        sem.post();
        th.join().unwrap();
    }

    #[test]
    fn post_n_satisfies_n_waiters() {
        let sem = Arc::new(Semaphore::new(0).unwrap());
        sem.post_n(3);
        sem.wait();
        sem.wait();
        sem.wait();
        assert!(!sem.wait_timeout(Duration::from_millis(10)));
    }
}
