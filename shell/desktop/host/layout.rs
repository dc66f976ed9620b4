/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! View bounds computation with caching and debounced resize.
//!
//! Bounds place a view to the right of the sidebar, spanning the remaining
//! width and the full content height. The cache is valid only while sidebar
//! width and window size are unchanged and the entry is younger than the
//! freshness window; any mismatch recomputes. Rapid resize calls coalesce
//! into one recompute after a quiet period, with an explicit abort handle so
//! pending work can always be cancelled.

use std::time::Duration;

use log::error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use hiveshell_runtime::{HostWindow, Rect, WindowSize};

use crate::error::ShellError;
use crate::shell::desktop::runtime::events::ShellEvent;

struct BoundsCache {
    sidebar_width: u32,
    window_size: WindowSize,
    rect: Rect,
    computed_at: Instant,
}

pub struct LayoutCalculator {
    cache_ttl: Duration,
    quiet_period: Duration,
    cache: Option<BoundsCache>,
    recompute_count: u64,
    pending_resize: Option<JoinHandle<()>>,
    events_tx: UnboundedSender<ShellEvent>,
}

impl LayoutCalculator {
    pub fn new(
        cache_ttl: Duration,
        quiet_period: Duration,
        events_tx: UnboundedSender<ShellEvent>,
    ) -> Self {
        Self {
            cache_ttl,
            quiet_period,
            cache: None,
            recompute_count: 0,
            pending_resize: None,
            events_tx,
        }
    }

    /// Bounds a visible view should occupy right now. `sidebar_override`
    /// takes precedence over the window's current sidebar width.
    pub fn compute_bounds(
        &mut self,
        sidebar_override: Option<u32>,
        window: &dyn HostWindow,
    ) -> Result<Rect, ShellError> {
        if window.is_destroyed() {
            error!("layout: bounds requested against a destroyed window");
            return Err(ShellError::WindowDestroyed);
        }
        let sidebar_width = sidebar_override.unwrap_or_else(|| window.sidebar_width());
        let window_size = window.content_size();

        if let Some(cache) = &self.cache
            && cache.sidebar_width == sidebar_width
            && cache.window_size == window_size
            && cache.computed_at.elapsed() < self.cache_ttl
        {
            return Ok(cache.rect);
        }

        let rect = Rect::new(
            sidebar_width as i32,
            0,
            window_size.width.saturating_sub(sidebar_width),
            window_size.height,
        );
        self.recompute_count += 1;
        self.cache = Some(BoundsCache {
            sidebar_width,
            window_size,
            rect,
            computed_at: Instant::now(),
        });
        Ok(rect)
    }

    /// Coalesce a resize into one recompute after the quiet period. Each call
    /// cancels the previously pending one; only the newest sidebar width
    /// survives.
    pub fn schedule_resize(&mut self, sidebar_width: u32) {
        self.cancel_pending();
        let tx = self.events_tx.clone();
        let quiet = self.quiet_period;
        self.pending_resize = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            let _ = tx.send(ShellEvent::ResizeRequested { sidebar_width });
        }));
    }

    /// Abort any pending debounced resize.
    pub fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending_resize.take() {
            pending.abort();
        }
    }

    /// Number of cache misses so far.
    pub fn recompute_count(&self) -> u64 {
        self.recompute_count
    }
}

impl Drop for LayoutCalculator {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryWindow;
    use tokio::sync::mpsc;

    fn calculator() -> (LayoutCalculator, mpsc::UnboundedReceiver<ShellEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            LayoutCalculator::new(Duration::from_secs(1), Duration::from_millis(150), tx),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn bounds_sit_right_of_the_sidebar() {
        let (mut layout, _rx) = calculator();
        let window = MemoryWindow::new(1280, 720, 300);
        let rect = layout.compute_bounds(None, &window).expect("bounds");
        assert_eq!(rect, Rect::new(300, 0, 980, 720));
    }

    #[tokio::test(start_paused = true)]
    async fn sidebar_wider_than_window_yields_zero_width() {
        let (mut layout, _rx) = calculator();
        let window = MemoryWindow::new(200, 720, 300);
        let rect = layout.compute_bounds(None, &window).expect("bounds");
        assert_eq!(rect.width, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_inputs_within_ttl_hit_the_cache() {
        let (mut layout, _rx) = calculator();
        let window = MemoryWindow::new(1280, 720, 300);
        let first = layout.compute_bounds(None, &window).expect("bounds");
        let second = layout.compute_bounds(None, &window).expect("bounds");
        assert_eq!(first, second);
        assert_eq!(layout.recompute_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn changing_either_input_invalidates_the_cache() {
        let (mut layout, _rx) = calculator();
        let window = MemoryWindow::new(1280, 720, 300);
        layout.compute_bounds(None, &window).expect("bounds");

        window.set_sidebar_width(250);
        let narrowed = layout.compute_bounds(None, &window).expect("bounds");
        assert_eq!(narrowed.x, 250);
        assert_eq!(layout.recompute_count(), 2);

        window.set_content_size(1600, 900);
        let resized = layout.compute_bounds(None, &window).expect("bounds");
        assert_eq!(resized.width, 1350);
        assert_eq!(layout.recompute_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_expires_after_the_freshness_window() {
        let (mut layout, _rx) = calculator();
        let window = MemoryWindow::new(1280, 720, 300);
        layout.compute_bounds(None, &window).expect("bounds");
        tokio::time::advance(Duration::from_millis(1100)).await;
        layout.compute_bounds(None, &window).expect("bounds");
        assert_eq!(layout.recompute_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn destroyed_window_is_a_loud_failure() {
        let (mut layout, _rx) = calculator();
        let window = MemoryWindow::new(1280, 720, 300);
        window.mark_destroyed();
        let err = layout.compute_bounds(None, &window).expect_err("must fail");
        assert!(matches!(err, ShellError::WindowDestroyed));
        assert!(err.is_invariant_violation());
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_resizes_coalesce_to_one_event_with_newest_width() {
        let (mut layout, mut rx) = calculator();
        layout.schedule_resize(300);
        layout.schedule_resize(280);
        layout.schedule_resize(260);

        tokio::time::advance(Duration::from_millis(200)).await;
        let event = rx.recv().await.expect("one resize event");
        assert_eq!(event, ShellEvent::ResizeRequested { sidebar_width: 260 });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_pending_suppresses_the_debounced_event() {
        let (mut layout, mut rx) = calculator();
        layout.schedule_resize(300);
        layout.cancel_pending();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }
}
