use core::time::Duration;
use tokio::time::Instant;

/// Default quiet period before a burst of resizes triggers a refresh.
pub const DEFAULT_RESIZE_DEBOUNCE: Duration = Duration::from_millis(300);

/// Longest quiet period honoured; larger delays are clamped to it.
pub const MAX_RESIZE_DEBOUNCE: Duration = Duration::from_secs(86_400);

/// Debounces viewport resize notifications into a single refresh.
///
/// Every notification cancels the pending deadline and schedules a new one
/// `delay` later, so a refresh only happens once the viewport has been quiet
/// for a full delay. The width reported when the deadline fires is the width
/// of the last notification.
#[derive(Debug)]
pub struct ResizeCoalescer {
    /// Quiet period required before firing.
    delay: Duration,
    /// When the pending refresh fires, if one is scheduled.
    deadline: Option<Instant>,
    /// Width carried by the most recent notification.
    pending_width: Option<u32>,
    /// Number of schedules superseded by a later notification.
    coalesced: u64,
}

impl ResizeCoalescer {
    /// Delays above [`MAX_RESIZE_DEBOUNCE`] are clamped.
    #[inline]
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        let delay = if delay.as_millis() > MAX_RESIZE_DEBOUNCE.as_millis() {
            MAX_RESIZE_DEBOUNCE
        } else {
            delay
        };
        Self {
            delay,
            deadline: None,
            pending_width: None,
            coalesced: 0,
        }
    }

    /// Returns the configured quiet period.
    #[inline]
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Record a resize to `width` observed at `now`, rescheduling the deadline.
    pub fn notify(&mut self, width: u32, now: Instant) {
        if self.deadline.is_some() {
            self.coalesced = self.coalesced.saturating_add(1);
        }
        // Only an instant near the clock's own limit can overflow here.
        self.deadline = Some(now.checked_add(self.delay).unwrap_or(now));
        self.pending_width = Some(width);
    }

    /// The instant the pending refresh is due, if any.
    #[inline]
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[inline]
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Fire the pending refresh if its deadline has passed.
    ///
    /// Returns the width to refresh with. Fires at most once per schedule.
    pub fn poll(&mut self, now: Instant) -> Option<u32> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        self.pending_width.take()
    }

    /// Drop the pending refresh without firing it.
    pub const fn cancel(&mut self) {
        self.deadline = None;
        self.pending_width = None;
    }

    /// Returns how many scheduled refreshes were superseded since creation.
    #[inline]
    #[must_use]
    pub const fn coalesced(&self) -> u64 {
        self.coalesced
    }
}

impl Default for ResizeCoalescer {
    fn default() -> Self {
        Self::new(DEFAULT_RESIZE_DEBOUNCE)
    }
}
