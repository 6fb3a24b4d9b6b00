//! The host-facing block engine
//!
//! Per callback: append input to the pre-FFT ring, analyze as many hop
//! frames as the buffered data allows (window, forward FFT, effects,
//! inverse FFT, overlap-add into the post-FFT ring), then mix the delayed
//! dry signal with the wet ring and fill the host block. Data starvation
//! is silence, never an error; an FFT-order change re-derives cursors and
//! clears the unfinalized overlap-add tail instead of resetting anything.
//!
//! Post-ring cursor roles: `LastOutputBlock` is the next sample to hand to
//! the host, `BlockBegin` the end of the fully-summed (finalized) region,
//! `BlockEnd` one past the newest overlap-added sample. The pre and post
//! rings always share one capacity so a stream position is the same index
//! in both.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use sw_core::{
    AtomicParam, BlockSize, EngineContext, ParamId, Phase, Sample, SampleRate, SwError, SwResult,
    UpdatePhase,
};
use sw_dsp::ring::{BlendOp, ReadCursor, RingBuffer};
use sw_dsp::spectral::{SpectralBuffer, SpectralRepr};
use sw_dsp::transform::{TransformSet, MAX_FFT_ORDER, MIN_FFT_ORDER};
use sw_dsp::window::{WindowKind, WindowTable};

use crate::params;
use crate::state::EffectsState;

pub struct SoundEngine {
    context: Arc<EngineContext>,
    effects: EffectsState,
    transforms: TransformSet,
    window: WindowTable,
    pre: RingBuffer,
    post: RingBuffer,
    channels: usize,
    block_size: usize,
    sample_rate: SampleRate,
    order: u32,
    pending_order: Option<u32>,
    /// Overlap fraction in [0, 15/16]
    overlap: f64,
    /// 0 pure dry, 1 pure wet; atomic so controls can write mid-block
    dry_wet: AtomicParam,
    pre_updates: Vec<(ParamId, f64)>,
    post_updates: Vec<(ParamId, f64)>,
    /// Analysis frame, shared with channel-input lanes through views
    spectrum: Arc<SpectralBuffer>,
    processed: SpectralBuffer,
    time_scratch: Vec<Sample>,
    complex_scratch: Vec<Complex<Sample>>,
}

/// Both rings must hold a full analysis span plus the output lag
fn ring_capacity(fft_size: usize, block_size: usize) -> usize {
    (2 * (fft_size + block_size)).next_power_of_two()
}

impl SoundEngine {
    pub fn new(
        channels: usize,
        block: BlockSize,
        sample_rate: SampleRate,
        window: WindowKind,
        order: u32,
    ) -> SwResult<Self> {
        if !(MIN_FFT_ORDER..=MAX_FFT_ORDER).contains(&order) {
            return Err(SwError::FftOrder(order));
        }
        assert!(channels > 0 && channels <= 64);

        let block_size = block.as_usize();
        let fft_size = TransformSet::fft_size(order);
        let bins = TransformSet::bins(order);
        let capacity = ring_capacity(fft_size, block_size);
        let context = Arc::new(EngineContext::new());

        Ok(Self {
            effects: EffectsState::new(Arc::clone(&context), bins),
            context,
            transforms: TransformSet::new(),
            window: WindowTable::new(window),
            pre: RingBuffer::new(channels, capacity),
            post: RingBuffer::new(channels, capacity),
            channels,
            block_size,
            sample_rate,
            order,
            pending_order: None,
            overlap: 0.5,
            dry_wet: AtomicParam::new(1.0),
            pre_updates: Vec::new(),
            post_updates: Vec::new(),
            spectrum: Arc::new(SpectralBuffer::new(channels, bins)),
            processed: SpectralBuffer::new(channels, bins),
            time_scratch: vec![0.0; fft_size],
            complex_scratch: vec![Complex::new(0.0, 0.0); bins],
        })
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    pub fn effects(&self) -> &EffectsState {
        &self.effects
    }

    pub fn effects_mut(&mut self) -> &mut EffectsState {
        &mut self.effects
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// Request an FFT-order change. Applied at the top of the next
    /// callback; never destructive to buffered audio.
    pub fn set_order(&mut self, order: u32) -> SwResult<()> {
        if !(MIN_FFT_ORDER..=MAX_FFT_ORDER).contains(&order) {
            return Err(SwError::FftOrder(order));
        }
        self.pending_order = Some(order);
        Ok(())
    }

    pub fn set_window(&mut self, kind: WindowKind) {
        if kind != self.window.kind() {
            self.window = WindowTable::new(kind);
        }
    }

    pub fn set_overlap(&mut self, overlap: f64) {
        self.overlap = overlap.clamp(0.0, 15.0 / 16.0);
    }

    pub fn set_dry_wet(&self, mix: f64) {
        self.dry_wet.set(mix.clamp(0.0, 1.0));
    }

    /// Ingest one scaled host parameter value. `Realtime` applies
    /// immediately; the block phases queue the value until the matching
    /// point of the next `process` call.
    pub fn set_param(&mut self, id: ParamId, value: f64, phase: UpdatePhase) -> SwResult<()> {
        let range = params::range(id)
            .ok_or_else(|| SwError::InvalidParam(format!("unknown parameter id {}", id.0)))?;
        let value = value.clamp(range.min, range.max);
        match phase {
            UpdatePhase::Realtime => self.apply_param(id, value),
            UpdatePhase::BeforeProcess => self.pre_updates.push((id, value)),
            UpdatePhase::AfterProcess => self.post_updates.push((id, value)),
        }
        Ok(())
    }

    /// Values are range-clamped at ingestion, so application cannot fail.
    fn apply_param(&mut self, id: ParamId, value: f64) {
        match id {
            params::DRY_WET => self.set_dry_wet(value),
            params::OVERLAP => self.set_overlap(value),
            params::FFT_ORDER => {
                let order = (value.round() as u32).clamp(MIN_FFT_ORDER, MAX_FFT_ORDER);
                self.pending_order = Some(order);
            }
            params::WINDOW => self.set_window(WindowKind::from_index(value.round() as usize)),
            _ => {}
        }
    }

    /// Processing delay the host should compensate: one frame plus one
    /// host block, or the frame alone once it exceeds the block.
    pub fn latency_samples(&self) -> usize {
        let fft_size = TransformSet::fft_size(self.order);
        if fft_size > self.block_size {
            fft_size
        } else {
            fft_size + self.block_size
        }
    }

    /// One host callback. `input` and `output` carry `channels` slices of
    /// exactly the configured block size.
    pub fn process(&mut self, input: &[&[Sample]], output: &mut [&mut [Sample]]) {
        assert_eq!(input.len(), self.channels);
        assert_eq!(output.len(), self.channels);
        // Ring writes and cursor advances both assume the configured block
        // size; a short or long host slice would silently desync them
        for block in input.iter() {
            assert_eq!(block.len(), self.block_size);
        }
        for block in output.iter() {
            assert_eq!(block.len(), self.block_size);
        }
        self.context.set_phase(Phase::PreBlock);

        for (id, value) in std::mem::take(&mut self.pre_updates) {
            self.apply_param(id, value);
        }
        if let Some(order) = self.pending_order.take() {
            if order != self.order {
                self.apply_order_change(order);
            }
        }

        self.pre.write_to_end(input);
        self.post.advance_write(self.block_size);
        let (input_mask, output_mask) = self.effects.routing_masks();

        self.context.set_phase(Phase::Processing);
        let fft_size = TransformSet::fft_size(self.order);
        let bins = TransformSet::bins(self.order);
        let hop = ((fft_size as f64 * (1.0 - self.overlap)).floor() as usize).max(1);
        let compensation = self.window.overlap_compensation(self.overlap);

        while self.pre.distance_behind_write(ReadCursor::BlockBegin) >= fft_size {
            let begin = self.pre.cursor(ReadCursor::BlockBegin);

            // Window + forward transform, channels some lane reads only.
            // Lane views of the frame never outlive their load, so the
            // frame is uniquely held here and make_mut never copies.
            let spectrum = Arc::make_mut(&mut self.spectrum);
            for ch in 0..self.channels {
                if input_mask & (1 << ch) == 0 {
                    continue;
                }
                self.pre.read(ch, &mut self.time_scratch[..fft_size], begin);
                self.window.apply(&mut self.time_scratch[..fft_size]);
                self.transforms.forward(
                    self.order,
                    &mut self.time_scratch[..fft_size],
                    &mut self.complex_scratch[..bins],
                );
                for (bin, value) in self.complex_scratch[..bins].iter().enumerate() {
                    spectrum.write_at(ch, bin, value.re, value.im);
                }
            }
            spectrum.set_repr(SpectralRepr::Cartesian);

            self.effects.process(&self.spectrum, &mut self.processed);

            // Inverse + overlap-add into the post ring, routed channels only
            let written_end = self.post.cursor(ReadCursor::BlockEnd);
            for ch in 0..self.channels {
                if output_mask & (1 << ch) == 0 {
                    continue;
                }
                for (bin, value) in self.complex_scratch[..bins].iter_mut().enumerate() {
                    let (re, im) = self.processed.read_at(ch, bin);
                    *value = Complex::new(re, im);
                }
                self.transforms.inverse(
                    self.order,
                    &mut self.complex_scratch[..bins],
                    &mut self.time_scratch[..fft_size],
                );
                self.overlap_add(ch, begin, written_end, fft_size);
            }

            // Advance the summation cursors and compensate the samples
            // that just became final
            let capacity = self.post.capacity();
            let finalized_old = self.post.cursor(ReadCursor::BlockBegin);
            self.post
                .set_cursor(ReadCursor::BlockEnd, (begin + fft_size) % capacity);
            self.post
                .set_cursor(ReadCursor::BlockBegin, (begin + hop) % capacity);
            if (compensation - 1.0).abs() > 1e-12 {
                let count = ((begin + hop + capacity - finalized_old) % capacity).min(capacity);
                for ch in 0..self.channels {
                    if output_mask & (1 << ch) != 0 {
                        self.post.scale_region(ch, finalized_old, count, compensation);
                    }
                }
            }
            self.pre.advance_cursor(ReadCursor::BlockBegin, hop);
        }

        self.context.set_phase(Phase::PostBlock);
        self.mix_and_fill(output, output_mask);
        for (id, value) in std::mem::take(&mut self.post_updates) {
            self.apply_param(id, value);
        }
        self.context.set_phase(Phase::Outside);
    }

    /// Overlap-add one inverse-transformed frame. The region up to the
    /// previously written end sums onto existing content; the fresh tail
    /// overwrites whatever stale samples the ring still holds there.
    fn overlap_add(&mut self, channel: usize, begin: usize, written_end: usize, fft_size: usize) {
        let frame = &self.time_scratch[..fft_size];
        if !self.window.kind().needs_blending() {
            self.post
                .blend_write(channel, frame, begin, BlendOp::Assign, (0.0, 1.0));
            return;
        }
        let capacity = self.post.capacity();
        let overlap_len = ((written_end + capacity - begin) % capacity).min(fft_size);
        if overlap_len > 0 {
            self.post.blend_write(
                channel,
                &frame[..overlap_len],
                begin,
                BlendOp::Add,
                (0.0, 1.0),
            );
        }
        if overlap_len < fft_size {
            self.post.blend_write(
                channel,
                &frame[overlap_len..],
                (begin + overlap_len) % capacity,
                BlendOp::Assign,
                (0.0, 1.0),
            );
        }
    }

    /// Steps 3 and 4: dry/wet mix and host-output fill. Starvation emits
    /// silence without advancing any cursor.
    fn mix_and_fill(&mut self, output: &mut [&mut [Sample]], output_mask: u64) {
        let capacity = self.post.capacity();
        let last = self.post.cursor(ReadCursor::LastOutputBlock);
        let finalized = self.post.cursor(ReadCursor::BlockBegin);
        let ready = (finalized + capacity - last) % capacity;

        if ready < self.block_size {
            for block in output.iter_mut() {
                block.fill(0.0);
            }
            return;
        }

        let mix = self.dry_wet.get();
        for (ch, block) in output.iter_mut().enumerate() {
            let routed = output_mask & (1 << ch) != 0;
            for (i, out) in block.iter_mut().enumerate() {
                let dry = self.pre.at(ch, last + i);
                *out = if !routed {
                    dry
                } else if mix >= 1.0 {
                    self.post.at(ch, last + i)
                } else if mix <= 0.0 {
                    dry
                } else {
                    dry * (1.0 - mix) + self.post.at(ch, last + i) * mix
                };
            }
        }
        self.post
            .advance_cursor(ReadCursor::LastOutputBlock, self.block_size);
    }

    /// Re-derive state for a new FFT order. Rings grow (never shrink) and
    /// rebase their cursors; the unfinalized overlap-add tail mixes the
    /// old order's window shape with the new one, so it is discarded and
    /// summation restarts at the finalized edge.
    fn apply_order_change(&mut self, order: u32) {
        let fft_size = TransformSet::fft_size(order);
        let bins = TransformSet::bins(order);
        let capacity = ring_capacity(fft_size, self.block_size).max(self.pre.capacity());

        self.pre.reserve(self.channels, capacity, false);
        self.post.reserve(self.channels, capacity, false);

        let finalized = self.post.cursor(ReadCursor::BlockBegin);
        let written_end = self.post.cursor(ReadCursor::BlockEnd);
        let stale = (written_end + capacity - finalized) % capacity;
        if stale > 0 {
            self.post.clear_region(finalized, stale);
        }
        self.post.set_cursor(ReadCursor::BlockEnd, finalized);

        if self.time_scratch.len() < fft_size {
            self.time_scratch.resize(fft_size, 0.0);
        }
        if self.complex_scratch.len() < bins {
            self.complex_scratch.resize(bins, Complex::new(0.0, 0.0));
        }
        // Exact size, not a grow: effects map normalized boundaries onto
        // the buffer's bin count, so stale high bins from a larger order
        // would skew every region until the next change.
        Arc::make_mut(&mut self.spectrum).resize(self.channels, bins);
        self.processed.resize(self.channels, bins);
        self.effects.set_bins(bins);

        log::debug!("fft order {} -> {}, frame {} samples", self.order, order, fft_size);
        self.order = order;
    }
}
