//! Optical Gate Edge Detector
//!
//! Counts debounced falling edges from the coin gate inside a detection
//! window. [`EdgeDetector::on_edge`] runs in interrupt context; every other
//! method belongs to the polling loop. The two sides share nothing but the
//! atomics below, so neither ever waits on the other.
//!
//! Field ownership:
//! - `last_edge`, `bounced`: interrupt only.
//! - `window_start`: written by the interrupt when a window opens, read by
//!   the poller only while `edge_count > 0`.
//! - `edge_count`: incremented by the interrupt, swapped to zero by the
//!   poller in [`EdgeDetector::reset`].
//! - `triggered`: set by the interrupt, cleared by the poller.
//!
//! The interrupt preempts the polling loop and runs to completion, so each
//! side observes the other's updates as a whole. The interrupt publishes
//! `window_start` before the increment (release), and the poller reads the
//! count before the start (acquire), so a non-zero count always comes with
//! the start of its own window.
//!
//! A reset is a single swap of the count. An edge that lands right after it
//! sees a zero count and opens a fresh window with its own start time.
//!
//! The poller consumes a window with [`EdgeDetector::consume`], which clears
//! the trigger before swapping the count. An edge landing between the two
//! steps is swapped away but leaves the trigger set, which reads as an empty
//! window. The reverse order could leave a counted edge with no trigger.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::time::Instant;

pub struct EdgeDetector {
    debounce_ms: u32,
    edge_count: AtomicU32,
    window_start: AtomicU32,
    last_edge: AtomicU32,
    triggered: AtomicBool,
    bounced: AtomicU32,
}

impl EdgeDetector {
    /// Creates an idle detector. `const` so it can live in a `static` shared
    /// with the interrupt handler.
    pub const fn new(debounce_ms: u32) -> Self {
        Self {
            debounce_ms,
            edge_count: AtomicU32::new(0),
            window_start: AtomicU32::new(0),
            // A virtual edge one debounce interval before t=0, so the very
            // first real edge is never mistaken for bounce.
            last_edge: AtomicU32::new(0u32.wrapping_sub(debounce_ms)),
            triggered: AtomicBool::new(false),
            bounced: AtomicU32::new(0),
        }
    }

    /// Records a falling edge seen at `now`. Interrupt context.
    ///
    /// Returns `false` when the edge was suppressed as bounce.
    pub fn on_edge(&self, now: Instant) -> bool {
        let now = now.as_millis();
        let last = self.last_edge.load(Ordering::Relaxed);
        if now.wrapping_sub(last) < self.debounce_ms {
            self.bounced.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.last_edge.store(now, Ordering::Relaxed);

        if self.edge_count.load(Ordering::Acquire) == 0 {
            self.window_start.store(now, Ordering::Relaxed);
        }
        self.edge_count.fetch_add(1, Ordering::Release);
        self.triggered.store(true, Ordering::Release);
        true
    }

    /// Has any edge been recorded since the last [`clear_triggered`](Self::clear_triggered)?
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Clears the trigger flag. The count is untouched.
    pub fn clear_triggered(&self) {
        self.triggered.store(false, Ordering::Release);
    }

    /// Edges counted in the open window.
    pub fn current_count(&self) -> u32 {
        self.edge_count.load(Ordering::Acquire)
    }

    /// Time since the first edge of the open window, `None` when no window is
    /// open.
    pub fn window_age(&self, now: Instant) -> Option<u32> {
        if self.edge_count.load(Ordering::Acquire) == 0 {
            return None;
        }
        let start = Instant::from_millis(self.window_start.load(Ordering::Relaxed));
        Some(now.millis_since(start))
    }

    /// Closes the open window and returns the number of edges it held.
    ///
    /// The start time is not cleared: it is meaningless while the count is
    /// zero and the next accepted edge overwrites it.
    pub fn reset(&self) -> u32 {
        self.edge_count.swap(0, Ordering::AcqRel)
    }

    /// Clears the trigger, then closes the window. Returns the edges it held.
    pub fn consume(&self) -> u32 {
        self.clear_triggered();
        self.reset()
    }

    /// Anything to look at: a trigger, or edges counted in an open window.
    pub fn pending(&self) -> bool {
        self.is_triggered() || self.current_count() > 0
    }

    /// Edges suppressed as bounce since start-up.
    pub fn bounced(&self) -> u32 {
        self.bounced.load(Ordering::Relaxed)
    }

    /// Minimum spacing between two counted edges.
    pub fn debounce_ms(&self) -> u32 {
        self.debounce_ms
    }
}
