use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::CancelFlag;

/// Upper bound on a single condvar wait so cancellation is noticed promptly.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Returned when a blocked [`RateMeter::acquire`] observes cancellation.
#[derive(Debug, Error)]
#[error("rate meter wait interrupted")]
pub struct Interrupted;

#[derive(Debug)]
struct MeterState {
    /// Expiry instants of issued tickets, oldest first.
    issued: VecDeque<Instant>,
    /// Turns of blocked acquirers, arrival order.
    waiting: VecDeque<u64>,
    next_turn: u64,
}

/// Grants tickets at a bounded rate over a rolling time window.
///
/// At most `quantity` tickets may be issued during any window of
/// `window` length. A ticket stops counting against capacity once its
/// window has elapsed, regardless of when (or whether) the holder closes it,
/// so capacity can never leak even if a worker dies mid-request.
///
/// Blocked callers are served strictly in arrival order: each `acquire`
/// takes a turn from a monotonic counter and capacity is only ever granted
/// to the front of the turn queue.
///
/// ```
/// use std::time::Duration;
/// use vx_http::{CancelFlag, RateMeter};
///
/// let meter = RateMeter::new(5, Duration::from_millis(32_500));
/// let cancel = CancelFlag::new();
/// let ticket = meter.acquire(&cancel).expect("not cancelled");
/// // ... perform the rate-limited call ...
/// ticket.close();
/// ```
#[derive(Debug)]
pub struct RateMeter {
    quantity: usize,
    window: Duration,
    state: Mutex<MeterState>,
    recycled: Condvar,
}

impl RateMeter {
    /// Creates a meter allowing `quantity` tickets per rolling `window`.
    ///
    /// Zero values are lifted to the smallest useful configuration rather
    /// than rejected; callers validate their own configuration up front.
    #[must_use]
    pub fn new(quantity: usize, window: Duration) -> Self {
        Self {
            quantity: quantity.max(1),
            window: window.max(Duration::from_millis(1)),
            state: Mutex::new(MeterState {
                issued: VecDeque::new(),
                waiting: VecDeque::new(),
                next_turn: 0,
            }),
            recycled: Condvar::new(),
        }
    }

    #[must_use]
    pub fn quantity(&self) -> usize {
        self.quantity
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Blocks until a ticket can be issued under the rolling window, or until
    /// `cancel` is raised.
    ///
    /// Waiters are granted capacity in arrival order; a cancelled waiter
    /// gives up its place in line.
    pub fn acquire(&self, cancel: &CancelFlag) -> Result<Ticket<'_>, Interrupted> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let turn = state.next_turn;
        state.next_turn += 1;
        state.waiting.push_back(turn);
        loop {
            let now = Instant::now();
            while state.issued.front().is_some_and(|expiry| *expiry <= now) {
                state.issued.pop_front();
            }
            let at_head = state.waiting.front() == Some(&turn);
            if at_head && state.issued.len() < self.quantity {
                state.waiting.pop_front();
                let expires_at = now + self.window;
                state.issued.push_back(expires_at);
                tracing::trace!(outstanding = state.issued.len(), "ticket issued");
                self.recycled.notify_all();
                return Ok(Ticket {
                    meter: self,
                    expires_at,
                    released: false,
                });
            }
            if cancel.is_set() {
                if let Some(position) = state.waiting.iter().position(|waiter| *waiter == turn) {
                    state.waiting.remove(position);
                }
                self.recycled.notify_all();
                return Err(Interrupted);
            }
            let wait = if at_head {
                state
                    .issued
                    .front()
                    .map(|expiry| expiry.saturating_duration_since(now))
                    .unwrap_or(WAIT_SLICE)
            } else {
                WAIT_SLICE
            }
            .min(WAIT_SLICE);
            let (guard, _) = self
                .recycled
                .wait_timeout(state, wait)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn release(&self) {
        self.recycled.notify_all();
    }
}

/// A single grant from a [`RateMeter`].
///
/// Dropping the ticket releases it, so holding one inside a scope guarantees
/// release on every exit path, including panics. `close` is idempotent.
#[derive(Debug)]
pub struct Ticket<'a> {
    meter: &'a RateMeter,
    expires_at: Instant,
    released: bool,
}

impl Ticket<'_> {
    /// The instant this ticket stops counting against the meter's capacity.
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Returns the ticket to the meter.
    pub fn close(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.meter.release();
        }
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.release_once();
    }
}
