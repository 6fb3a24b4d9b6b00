//! Multi-channel ring buffer with named read cursors
//!
//! The pre-FFT and post-FFT sample stores of the engine. One mutable write
//! cursor, several named read cursors, all kept in `[0, capacity)` and
//! advanced modulo capacity. Power-of-two capacities take a bitwise-AND
//! fast path.
//!
//! Out-of-range channel or index arguments are programming errors and
//! assert; they are never reported as runtime errors.

use sw_core::Sample;

/// Region copy/merge operation for `blend_write`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BlendOp {
    /// dst = src
    Assign,
    /// dst += src
    Add,
    /// dst *= src
    Multiply,
    /// dst += src * t, t ramping 0 -> 1 across the region
    FadeInAdd,
    /// dst += src * (1 - t)
    FadeOutAdd,
    /// dst = dst * (1 - t) + src * t
    Interpolate,
}

/// Named read cursors
///
/// Cursor positions are owned by the buffer so that `reserve` can rebase
/// them all when capacity changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ReadCursor {
    /// Oldest sample the host has not yet been given
    LastOutputBlock = 0,
    /// First sample of the frame currently being analyzed
    BlockBegin = 1,
    /// One past the newest overlap-added sample
    BlockEnd = 2,
}

const CURSOR_COUNT: usize = 3;

/// Fixed-capacity multi-channel sample store with wrap-around access
pub struct RingBuffer {
    data: Vec<Vec<Sample>>,
    capacity: usize,
    /// `Some(capacity - 1)` when capacity is a power of two
    mask: Option<usize>,
    write_pos: usize,
    cursors: [usize; CURSOR_COUNT],
}

impl RingBuffer {
    pub fn new(channels: usize, capacity: usize) -> Self {
        assert!(channels > 0 && capacity > 0);
        Self {
            data: vec![vec![0.0; capacity]; channels],
            capacity,
            mask: mask_for(capacity),
            write_pos: 0,
            cursors: [0; CURSOR_COUNT],
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn wrap(&self, index: usize) -> usize {
        match self.mask {
            Some(m) => index & m,
            None => index % self.capacity,
        }
    }

    #[inline]
    pub fn write_position(&self) -> usize {
        self.write_pos
    }

    #[inline]
    pub fn cursor(&self, c: ReadCursor) -> usize {
        self.cursors[c as usize]
    }

    pub fn set_cursor(&mut self, c: ReadCursor, position: usize) {
        assert!(position < self.capacity);
        self.cursors[c as usize] = position;
    }

    pub fn advance_cursor(&mut self, c: ReadCursor, count: usize) {
        self.cursors[c as usize] = self.wrap(self.cursors[c as usize] + count);
    }

    /// Samples between a cursor and the write position (how far it lags)
    #[inline]
    pub fn distance_behind_write(&self, c: ReadCursor) -> usize {
        self.wrap(self.write_pos + self.capacity - self.cursors[c as usize])
    }

    /// Grow capacity, preserving the most recent `min(old, new)` samples per
    /// channel and rebasing every cursor so its distance behind the write
    /// position is unchanged (clamped to the preserved span).
    ///
    /// Never shrinks below current capacity unless `force` is set.
    pub fn reserve(&mut self, channels: usize, new_capacity: usize, force: bool) {
        assert!(channels > 0 && new_capacity > 0);
        if new_capacity < self.capacity && !force {
            // Still honor a channel-count grow
            if channels > self.data.len() {
                self.data.resize(channels, vec![0.0; self.capacity]);
            }
            return;
        }
        if new_capacity == self.capacity && channels <= self.data.len() {
            return;
        }
        log::debug!("ring capacity {} -> {new_capacity}", self.capacity);

        let keep = self.capacity.min(new_capacity);
        let old_channels = self.data.len();
        let mut fresh: Vec<Vec<Sample>> = Vec::with_capacity(channels.max(old_channels));

        for ch in 0..channels.max(old_channels) {
            let mut lane = vec![0.0; new_capacity];
            if ch < old_channels {
                // Most recent `keep` samples, ending just before the write cursor
                for i in 0..keep {
                    let src = self.wrap(self.write_pos + self.capacity - keep + i);
                    lane[i] = self.data[ch][src];
                }
            }
            fresh.push(lane);
        }
        fresh.truncate(channels.max(old_channels));

        let new_write = if keep == new_capacity { 0 } else { keep };
        for cursor in self.cursors.iter_mut() {
            let behind = {
                let d = (self.write_pos + self.capacity - *cursor) % self.capacity;
                d.min(keep)
            };
            *cursor = (new_write + new_capacity - behind) % new_capacity;
        }

        self.data = fresh;
        self.capacity = new_capacity;
        self.mask = mask_for(new_capacity);
        self.write_pos = new_write;
    }

    /// Copy one block per channel into the region starting at the write
    /// cursor and advance it by the block length.
    pub fn write_to_end(&mut self, input: &[&[Sample]]) {
        assert_eq!(input.len(), self.data.len());
        let count = input[0].len();
        assert!(count <= self.capacity);
        for (ch, src) in input.iter().enumerate() {
            assert_eq!(src.len(), count);
            for (i, &sample) in src.iter().enumerate() {
                let idx = self.wrap(self.write_pos + i);
                self.data[ch][idx] = sample;
            }
        }
        self.write_pos = self.wrap(self.write_pos + count);
    }

    /// Advance the write cursor without writing. The overlap-add output
    /// ring is filled through `blend_write` at explicit offsets; its write
    /// cursor only tracks stream time so `reserve` rebases correctly.
    pub fn advance_write(&mut self, count: usize) {
        assert!(count <= self.capacity);
        self.write_pos = self.wrap(self.write_pos + count);
    }

    /// Copy out of an arbitrary offset without mutating any cursor
    pub fn read(&self, channel: usize, dst: &mut [Sample], start: usize) {
        assert!(channel < self.data.len());
        assert!(dst.len() <= self.capacity);
        for (i, out) in dst.iter_mut().enumerate() {
            *out = self.data[channel][self.wrap(start + i)];
        }
    }

    /// Read a single sample at a wrapped offset
    #[inline]
    pub fn at(&self, channel: usize, index: usize) -> Sample {
        assert!(channel < self.data.len());
        self.data[channel][self.wrap(index)]
    }

    /// Blended region write. `ramp` gives the progress value at the first
    /// and one-past-last sample of the region; fade and interpolate
    /// operations read the per-sample progress from it.
    pub fn blend_write(
        &mut self,
        channel: usize,
        src: &[Sample],
        start: usize,
        op: BlendOp,
        ramp: (f64, f64),
    ) {
        assert!(channel < self.data.len());
        assert!(src.len() <= self.capacity);
        let len = src.len();
        if len == 0 {
            return;
        }
        let step = (ramp.1 - ramp.0) / len as f64;
        for (i, &s) in src.iter().enumerate() {
            let idx = self.wrap(start + i);
            let t = ramp.0 + step * i as f64;
            let dst = &mut self.data[channel][idx];
            *dst = match op {
                BlendOp::Assign => s,
                BlendOp::Add => *dst + s,
                BlendOp::Multiply => *dst * s,
                BlendOp::FadeInAdd => *dst + s * t,
                BlendOp::FadeOutAdd => *dst + s * (1.0 - t),
                BlendOp::Interpolate => *dst * (1.0 - t) + s * t,
            };
        }
    }

    /// Multiply a wrapped region by a constant gain. Used for overlap-add
    /// energy compensation once a region of summed output is final.
    pub fn scale_region(&mut self, channel: usize, start: usize, count: usize, gain: f64) {
        assert!(channel < self.data.len());
        assert!(count <= self.capacity);
        for i in 0..count {
            let idx = self.wrap(start + i);
            self.data[channel][idx] *= gain;
        }
    }

    /// Zero a wrapped region on every channel
    pub fn clear_region(&mut self, start: usize, count: usize) {
        assert!(count <= self.capacity);
        for ch in 0..self.data.len() {
            for i in 0..count {
                let idx = self.wrap(start + i);
                self.data[ch][idx] = 0.0;
            }
        }
    }
}

#[inline]
fn mask_for(capacity: usize) -> Option<usize> {
    if capacity.is_power_of_two() {
        Some(capacity - 1)
    } else {
        None
    }
}
