//! Resize coalescing
//!
//! A resize applied to a window can trigger more resize notifications
//! synchronously (the native layer reports the size change it was just told
//! to make, a callback resizes again). [`ResizeCoalescer`] keeps those from
//! nesting: while one dispatch is applying, later requests are folded into a
//! single pending request that the running dispatch applies next.
//!
//! ```text
//! Idle --begin--> Dispatching --begin--> Pending(merged)
//!   ^                  |                      |
//!   +-----finish-------+<-------finish--------+
//! ```
//!
//! Once the window's native handles are released the coalescer is closed and
//! every later request is dropped.

use std::thread::{self, ThreadId};

/// One resize to apply to a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeRequest {
    /// Logical client width
    pub width: u32,
    /// Logical client height
    pub height: u32,
    /// Also resize the native window's client area
    pub update_native_window: bool,
    /// Invoke the context's resize callback
    pub notify_client: bool,
    /// Only update recorded geometry; leave surface and backend alone
    pub skip_native_apply: bool,
}

impl ResizeRequest {
    /// Resize reported by the native layer: notify, don't touch the window
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            update_native_window: false,
            notify_client: true,
            skip_native_apply: false,
        }
    }

    /// Also resize the native window
    #[must_use]
    pub const fn with_native_update(mut self, update: bool) -> Self {
        self.update_native_window = update;
        self
    }

    /// Control the resize callback
    #[must_use]
    pub const fn with_notify(mut self, notify: bool) -> Self {
        self.notify_client = notify;
        self
    }

    /// Control surface and backend updates
    #[must_use]
    pub const fn with_skip_native_apply(mut self, skip: bool) -> Self {
        self.skip_native_apply = skip;
        self
    }

    /// Fold a newer request into this one
    ///
    /// The newer size and `skip_native_apply` win; native updates and client
    /// notifications are kept if either request asked for them.
    #[must_use]
    pub const fn merge(self, newer: Self) -> Self {
        Self {
            width: newer.width,
            height: newer.height,
            update_native_window: self.update_native_window || newer.update_native_window,
            notify_client: self.notify_client || newer.notify_client,
            skip_native_apply: newer.skip_native_apply,
        }
    }
}

/// What happened to a dispatched resize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// Applied by this call, together with `passes - 1` coalesced follow-ups
    Applied {
        /// Apply passes run by this dispatch
        passes: u32,
    },
    /// Folded into the pending request of a dispatch already in progress
    Coalesced,
    /// The window was released; nothing was applied
    Dropped,
}

/// Coalescer phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePhase {
    /// Nothing in flight
    Idle,
    /// A dispatch is applying and nothing is queued behind it
    Dispatching,
    /// A dispatch is applying and one merged request is queued
    Pending,
}

/// Per-window resize state machine
#[derive(Debug, Default)]
pub struct ResizeCoalescer {
    dispatcher: Option<ThreadId>,
    pending: Option<ResizeRequest>,
    coalesced: u64,
    closed: bool,
}

impl ResizeCoalescer {
    /// Create an idle coalescer
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a request
    ///
    /// Returns the request when the caller became the dispatcher and must
    /// apply it, then call [`ResizeCoalescer::finish`]. Returns `None` when
    /// the request was stashed behind the dispatch in progress, or dropped
    /// because the coalescer is closed.
    pub fn begin(&mut self, request: ResizeRequest) -> Option<ResizeRequest> {
        if self.closed {
            return None;
        }
        if self.dispatcher.is_some() {
            self.pending = Some(match self.pending {
                Some(pending) => pending.merge(request),
                None => request,
            });
            self.coalesced += 1;
            None
        } else {
            self.dispatcher = Some(thread::current().id());
            Some(request)
        }
    }

    /// Finish one apply pass
    ///
    /// Returns the next request to apply, or `None` once idle again.
    pub fn finish(&mut self) -> Option<ResizeRequest> {
        let next = self.pending.take();
        if next.is_none() {
            self.dispatcher = None;
        }
        next
    }

    /// Refuse every later request
    pub fn close(&mut self) {
        self.closed = true;
        self.pending = None;
    }

    /// Whether [`ResizeCoalescer::close`] has run
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a thread other than the caller is mid-dispatch
    pub fn is_busy_elsewhere(&self) -> bool {
        self.dispatcher
            .is_some_and(|dispatcher| dispatcher != thread::current().id())
    }

    /// Current phase
    pub const fn phase(&self) -> ResizePhase {
        match (self.dispatcher.is_some(), self.pending.is_some()) {
            (false, _) => ResizePhase::Idle,
            (true, false) => ResizePhase::Dispatching,
            (true, true) => ResizePhase::Pending,
        }
    }

    /// Request waiting behind the current dispatch
    pub const fn pending(&self) -> Option<ResizeRequest> {
        self.pending
    }

    /// Requests folded into a pending request so far
    pub const fn coalesced_count(&self) -> u64 {
        self.coalesced
    }
}
