//! Re-render scheduling.
//!
//! Edits set dirty flags; a recurring timer (owned by the front-end, not by
//! the engine) calls `tick()`. A tick with nothing dirty is a no-op, so a
//! burst of edits inside one debounce interval collapses into a single
//! pipeline run reflecting the final state. `tick()` is an explicit
//! function precisely so tests drive it directly instead of waiting on
//! real time.

use crate::compose::RenderPayload;

/// Which inputs changed since the last completed render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyFlags {
    pub query: bool,
    pub data: bool,
    pub style: bool,
    pub script: bool,
}

impl DirtyFlags {
    pub fn any(&self) -> bool {
        self.query || self.data || self.style || self.script
    }

    /// Query re-execution is only needed when the query text or the
    /// dataset changed; style/script edits recompose from the cached
    /// result.
    pub fn needs_requery(&self) -> bool {
        self.query || self.data
    }
}

/// The pipeline input an edit touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    Query,
    Data,
    Style,
    Script,
}

/// External renderer that displays a composed payload. Dispatch is one-way,
/// fire-and-forget; a payload already handed over is never recalled.
pub trait RenderSink {
    fn render(&mut self, payload: &RenderPayload);
}

/// Coalesces edit notifications and guards the single in-flight render.
#[derive(Debug, Default)]
pub struct RenderScheduler {
    dirty: DirtyFlags,
    in_flight: bool,
    closed: bool,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, kind: EditKind) {
        if self.closed {
            return;
        }
        match kind {
            EditKind::Query => self.dirty.query = true,
            EditKind::Data => self.dirty.data = true,
            EditKind::Style => self.dirty.style = true,
            EditKind::Script => self.dirty.script = true,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.any()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Claim the current dirty set and begin a render, or `None` when
    /// nothing changed, a render is already in flight, or the document is
    /// closed. The flags are taken eagerly so edits arriving re-entrantly
    /// during the render accumulate for exactly one follow-up render.
    pub fn tick(&mut self) -> Option<DirtyFlags> {
        if self.closed || self.in_flight || !self.dirty.any() {
            return None;
        }
        self.in_flight = true;
        Some(std::mem::take(&mut self.dirty))
    }

    /// The render claimed by `tick` completed (or was abandoned).
    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    /// Document close: no further renders are dispatched.
    pub fn close(&mut self) {
        self.closed = true;
        self.dirty = DirtyFlags::default();
        log::debug!("render scheduler closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_tick_is_noop() {
        let mut scheduler = RenderScheduler::new();
        assert_eq!(scheduler.tick(), None);
    }

    #[test]
    fn test_burst_coalesces_to_one_tick() {
        let mut scheduler = RenderScheduler::new();
        scheduler.mark(EditKind::Query);
        scheduler.mark(EditKind::Style);
        scheduler.mark(EditKind::Query);
        scheduler.mark(EditKind::Script);

        let flags = scheduler.tick().unwrap();
        assert!(flags.query && flags.style && flags.script);
        assert!(!flags.data);
        scheduler.finish();

        // Nothing new arrived: next tick does nothing
        assert_eq!(scheduler.tick(), None);
    }

    #[test]
    fn test_style_only_skips_requery() {
        let mut scheduler = RenderScheduler::new();
        scheduler.mark(EditKind::Style);
        let flags = scheduler.tick().unwrap();
        assert!(!flags.needs_requery());
        assert!(flags.any());
    }

    #[test]
    fn test_edit_during_render_triggers_one_more() {
        let mut scheduler = RenderScheduler::new();
        scheduler.mark(EditKind::Query);
        let _flags = scheduler.tick().unwrap();

        // Render in flight: a newer edit must not interrupt it
        scheduler.mark(EditKind::Data);
        assert_eq!(scheduler.tick(), None);

        scheduler.finish();
        let flags = scheduler.tick().unwrap();
        assert!(flags.data);
        assert!(!flags.query);
    }

    #[test]
    fn test_closed_scheduler_never_ticks() {
        let mut scheduler = RenderScheduler::new();
        scheduler.mark(EditKind::Query);
        scheduler.close();
        assert_eq!(scheduler.tick(), None);
        scheduler.mark(EditKind::Data);
        assert_eq!(scheduler.tick(), None);
    }
}
