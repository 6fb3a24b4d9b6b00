//! Effect lane: an ordered module chain plus its worker handshake
//!
//! Each lane is processed by one persistent worker thread. The handshake
//! is a single `AtomicU8` status: the control side stores `Ready` to start
//! a frame, the worker walks Ready -> Running -> Finished. `Stopped` is
//! terminal and only ever entered from the idle spin, so deletion lands
//! between frames.
//!
//! The data mutex is an aliasing guard, not a contention point: the control
//! side locks it only while the lane is idle (before `Ready`, or after it
//! observed `Finished`), the worker only while `Running`. A downstream lane
//! locks an upstream's data strictly after acquiring on its `Finished`
//! store.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use parking_lot::Mutex;
use sw_core::SIMD_CHANNELS;
use sw_dsp::ring::BlendOp;
use sw_dsp::spectral::{SpectralBuffer, SpectralRepr, SpectralView, FULL_MASK};

use crate::module::EffectModule;

/// Worker handshake states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LaneStatus {
    /// Frame result published (also the idle state between frames)
    Finished = 0,
    /// Start signal for the current frame
    Ready = 1,
    /// Worker is processing
    Running = 2,
    /// Worker has exited
    Stopped = 3,
}

impl LaneStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LaneStatus::Finished,
            1 => LaneStatus::Ready,
            2 => LaneStatus::Running,
            _ => LaneStatus::Stopped,
        }
    }
}

/// Where a lane takes its frame from
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LaneInput {
    /// A physical channel group of the analyzed frame. Must be aligned to
    /// the SIMD package width.
    Channel(usize),
    /// Another lane's output, by registry index
    Lane(usize),
}

/// Mutable lane state, guarded by the handshake protocol
pub struct LaneData {
    pub input: LaneInput,
    /// Physical channel group the result sums into, `None` for a lane that
    /// only feeds other lanes
    pub output: Option<usize>,
    pub modules: Vec<EffectModule>,
    /// Frame input before `run`, lane result after it
    pub source: SpectralBuffer,
    work: SpectralBuffer,
}

impl LaneData {
    fn new(input: LaneInput, output: Option<usize>, bins: usize) -> Self {
        Self {
            input,
            output,
            modules: Vec::new(),
            source: SpectralBuffer::new(SIMD_CHANNELS, bins),
            work: SpectralBuffer::new(SIMD_CHANNELS, bins),
        }
    }

    /// Grow the lane buffers to at least `bins`
    pub fn reserve(&mut self, bins: usize) {
        self.source.reserve(SIMD_CHANNELS, bins);
        self.work.reserve(SIMD_CHANNELS, bins);
    }

    /// Set the lane buffers to exactly `bins`. Effects normalize their
    /// boundary regions against the buffer's bin count, so a smaller
    /// frame must shrink the buffers rather than leave stale high bins.
    pub fn resize(&mut self, bins: usize) {
        self.source.resize(SIMD_CHANNELS, bins);
        self.work.resize(SIMD_CHANNELS, bins);
    }

    /// Copy the viewed frame package into the lane as this frame's input.
    /// The view may carry fewer logical channels than the package width;
    /// the copy clamps to what exists.
    pub fn load(&mut self, view: &SpectralView) {
        let bins = self.source.bins().min(view.bins());
        let channels = SIMD_CHANNELS.min(view.channels());
        SpectralBuffer::apply_to(
            &mut self.source,
            view.buffer(),
            channels,
            bins,
            BlendOp::Assign,
            FULL_MASK,
            0,
            view.channel_offset(),
        );
    }

    /// Run the module chain. Source and work swap after every module, so
    /// the result always ends up back in `source`. The last module may
    /// leave it polar; summation converts on demand.
    pub fn run(&mut self, progress: &AtomicUsize) {
        for index in 0..self.modules.len() {
            progress.store(index, Ordering::Relaxed);
            if !self.modules[index].enabled {
                continue;
            }
            if self.source.repr() != SpectralRepr::Cartesian {
                self.source.convert_to(SpectralRepr::Cartesian);
            }
            self.modules[index].process(&self.source, &mut self.work, SIMD_CHANNELS);
            std::mem::swap(&mut self.source, &mut self.work);
        }
        progress.store(self.modules.len(), Ordering::Relaxed);
    }
}

/// Shared lane handle: handshake atomics plus the guarded data
pub struct LaneShared {
    pub status: AtomicU8,
    /// Cooperative deletion flag, observed only from the idle spin
    pub stop: AtomicBool,
    pub enabled: AtomicBool,
    /// Module index the worker is currently inside, for the control side
    pub current_module: AtomicUsize,
    pub data: Mutex<LaneData>,
}

impl LaneShared {
    pub fn new(input: LaneInput, output: Option<usize>, bins: usize) -> Self {
        Self {
            status: AtomicU8::new(LaneStatus::Finished as u8),
            stop: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            current_module: AtomicUsize::new(0),
            data: Mutex::new(LaneData::new(input, output, bins)),
        }
    }

    #[inline]
    pub fn status(&self) -> LaneStatus {
        LaneStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_status(&self, status: LaneStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}
