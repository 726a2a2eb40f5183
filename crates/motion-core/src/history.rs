//! Ring of past scaled frames and its rotating cursors.

/// Circular history of the last `B + M + 1` scaled frames.
///
/// Slots start zeroed, which produces the documented warm-up transient:
/// until a cursor wraps onto a written slot, evictions subtract nothing from
/// the running sums.
pub struct FrameHistory {
    slots: Vec<Vec<u8>>,
    newest: usize,
    bg_remove: usize,
    mvt_remove: usize,
}

impl FrameHistory {
    /// `bg_len` and `mvt_len` are the stabilization window lengths B and M.
    ///
    /// The removal cursors advance before use, so tick `t` evicts frame
    /// `t - B` from the background sum and frame `t - M` from the movement
    /// sum. Both sums telescope to exact trailing windows once the zeroed
    /// transient has passed.
    pub fn new(bg_len: u32, mvt_len: u32, frame_len: usize) -> Self {
        let slot_count = (bg_len + mvt_len + 1) as usize;
        Self {
            slots: vec![vec![0u8; frame_len]; slot_count],
            newest: 0,
            bg_remove: mvt_len as usize + 1,
            mvt_remove: slot_count - mvt_len as usize,
        }
    }

    /// Number of ring slots (`B + M + 1`).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Rotates the newest cursor and overwrites its slot with the freshly
    /// scaled frame.
    pub fn record(&mut self, frame: &[u8]) {
        self.newest = (self.newest + 1) % self.slots.len();
        self.slots[self.newest].copy_from_slice(frame);
    }

    /// Rotates both removal cursors onto this tick's eviction slots.
    pub fn advance_removals(&mut self) {
        self.bg_remove = (self.bg_remove + 1) % self.slots.len();
        self.mvt_remove = (self.mvt_remove + 1) % self.slots.len();
    }

    /// Frame leaving the background window this tick.
    pub fn bg_removal(&self) -> &[u8] {
        &self.slots[self.bg_remove]
    }

    /// Frame leaving the movement window this tick.
    pub fn mvt_removal(&self) -> &[u8] {
        &self.slots[self.mvt_remove]
    }
}
