//! Output-subsystem boundary.
//!
//! The presenter talks to a [`VideoOutput`]: upload the converted frame with
//! [`VideoOutput::render`], then make it visible with
//! [`VideoOutput::present`] once the frame's scheduled time arrives. The
//! window backend lives behind the `window` feature; [`NullOutput`] serves
//! headless runs and tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::Result;

#[cfg(feature = "window")]
pub mod window;

/// Tightly packed RGBA picture ready for display.
pub struct DisplayFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub pts: f64,
}

/// Sink for converted video frames, driven by the presenter thread.
pub trait VideoOutput: Send + 'static {
    /// Upload the frame. Not yet visible.
    fn render(&mut self, frame: DisplayFrame) -> Result<()>;

    /// Make the last rendered frame visible.
    fn present(&mut self) -> Result<()>;
}

/// Discards frames, counting them. For tests and display-less operation.
pub struct NullOutput {
    rendered: Arc<AtomicUsize>,
    presented: Arc<AtomicUsize>,
}

/// Observer handle onto a [`NullOutput`]'s counters.
#[derive(Clone)]
pub struct NullOutputStats {
    rendered: Arc<AtomicUsize>,
    presented: Arc<AtomicUsize>,
}

impl NullOutputStats {
    pub fn rendered(&self) -> usize {
        self.rendered.load(Ordering::Relaxed)
    }

    pub fn presented(&self) -> usize {
        self.presented.load(Ordering::Relaxed)
    }
}

impl NullOutput {
    pub fn new() -> (Self, NullOutputStats) {
        let rendered = Arc::new(AtomicUsize::new(0));
        let presented = Arc::new(AtomicUsize::new(0));
        let stats = NullOutputStats {
            rendered: Arc::clone(&rendered),
            presented: Arc::clone(&presented),
        };
        (
            Self {
                rendered,
                presented,
            },
            stats,
        )
    }
}

impl VideoOutput for NullOutput {
    fn render(&mut self, _frame: DisplayFrame) -> Result<()> {
        self.rendered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.presented.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
