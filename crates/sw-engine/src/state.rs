//! Effects state: lane registry, worker threads, frame orchestration
//!
//! One persistent worker thread per lane. Per frame the control side locks
//! every lane's data, stores `Ready` on all of them (clearing the previous
//! frame's `Finished` before any worker can observe it), loads channel-input
//! lanes through shared views of the frame, then releases the locks. Workers that take
//! their input from another lane spin on the upstream's `Finished` store
//! before copying, so cross-lane chains resolve inside the frame. The
//! control side then spins until every lane has finished and sums the lane
//! results into the output, 1/N per shared target channel.
//!
//! Structural edits (lane or module insertion, removal, rerouting) are
//! only legal while the engine context is `Phase::Outside`, which is also
//! what keeps the registry lock uncontended during frames.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_utils::Backoff;
use parking_lot::RwLock;
use sw_core::{EngineContext, SwError, SwResult, SIMD_CHANNELS};
use sw_dsp::spectral::{SpectralBuffer, SpectralRepr, SpectralView};
use sw_dsp::EffectKind;
use wide::f64x4;

use crate::lane::{LaneData, LaneInput, LaneShared, LaneStatus};
use crate::module::EffectModule;

type LaneRegistry = Arc<RwLock<Vec<Arc<LaneShared>>>>;

pub struct EffectsState {
    context: Arc<EngineContext>,
    lanes: LaneRegistry,
    workers: Vec<Option<JoinHandle<()>>>,
    bins: usize,
}

impl EffectsState {
    pub fn new(context: Arc<EngineContext>, bins: usize) -> Self {
        Self {
            context,
            lanes: Arc::new(RwLock::new(Vec::new())),
            workers: Vec::new(),
            bins,
        }
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.read().len()
    }

    /// Retarget every lane buffer to a new active bin count. Runs between
    /// frames with all workers idle, so taking the data locks is safe.
    pub fn set_bins(&mut self, bins: usize) {
        self.bins = bins;
        for lane in self.lanes.read().iter() {
            lane.data.lock().resize(bins);
        }
    }

    /// Append a lane and start its worker. Returns the lane index.
    pub fn add_lane(&mut self, input: LaneInput, output: Option<usize>) -> SwResult<usize> {
        self.context.guard_structural_edit()?;
        validate_alignment(input, output)?;

        let mut lanes = self.lanes.write();
        if let LaneInput::Lane(upstream) = input {
            if upstream >= lanes.len() {
                return Err(SwError::LaneIndex(upstream, lanes.len()));
            }
        }
        let index = lanes.len();
        let shared = Arc::new(LaneShared::new(input, output, self.bins));
        lanes.push(Arc::clone(&shared));
        drop(lanes);

        let registry = Arc::clone(&self.lanes);
        let handle = thread::Builder::new()
            .name(format!("sw-lane-{index}"))
            .spawn(move || worker_loop(shared, registry))
            .map_err(|e| SwError::InvalidParam(format!("failed to spawn lane worker: {e}")))?;
        self.workers.push(Some(handle));
        log::debug!("lane {index} added, input {input:?}, output {output:?}");
        Ok(index)
    }

    /// Stop a lane's worker and drop the lane.
    ///
    /// A lane that still feeds another lane cannot be removed; reroute the
    /// downstream lane first. Lane-input indices above the removed slot
    /// shift down by one.
    pub fn remove_lane(&mut self, index: usize) -> SwResult<()> {
        self.context.guard_structural_edit()?;
        let mut lanes = self.lanes.write();
        if index >= lanes.len() {
            return Err(SwError::LaneIndex(index, lanes.len()));
        }
        for (i, lane) in lanes.iter().enumerate() {
            if i != index && lane.data.lock().input == LaneInput::Lane(index) {
                return Err(SwError::InvalidParam(format!(
                    "lane {index} is the input of lane {i}"
                )));
            }
        }

        let lane = lanes.remove(index);
        for other in lanes.iter() {
            let mut data = other.data.lock();
            if let LaneInput::Lane(n) = data.input {
                if n > index {
                    data.input = LaneInput::Lane(n - 1);
                }
            }
        }
        drop(lanes);

        lane.stop.store(true, Ordering::Release);
        if let Some(handle) = self.workers.remove(index) {
            let _ = handle.join();
        }
        log::debug!("lane {index} removed");
        Ok(())
    }

    /// Reroute a lane's input, rejecting direct or transitive loops before
    /// any worker can observe the edge.
    pub fn set_lane_input(&self, index: usize, input: LaneInput) -> SwResult<()> {
        self.context.guard_structural_edit()?;
        validate_alignment(input, None)?;
        let lanes = self.lanes.read();
        if index >= lanes.len() {
            return Err(SwError::LaneIndex(index, lanes.len()));
        }
        check_feedback(&lanes, index, input)?;
        lanes[index].data.lock().input = input;
        Ok(())
    }

    pub fn set_lane_output(&self, index: usize, output: Option<usize>) -> SwResult<()> {
        self.context.guard_structural_edit()?;
        validate_alignment(LaneInput::Channel(0), output)?;
        let lanes = self.lanes.read();
        if index >= lanes.len() {
            return Err(SwError::LaneIndex(index, lanes.len()));
        }
        lanes[index].data.lock().output = output;
        Ok(())
    }

    /// Enable flag is a parameter, not a structural edit; it may flip at
    /// any time and takes effect at the next frame.
    pub fn set_lane_enabled(&self, index: usize, enabled: bool) -> SwResult<()> {
        let lanes = self.lanes.read();
        if index >= lanes.len() {
            return Err(SwError::LaneIndex(index, lanes.len()));
        }
        lanes[index].enabled.store(enabled, Ordering::Release);
        Ok(())
    }

    /// Append a module to a lane. Returns the new module's id.
    pub fn add_module(&self, lane: usize, kind: EffectKind) -> SwResult<u64> {
        self.context.guard_structural_edit()?;
        let lanes = self.lanes.read();
        if lane >= lanes.len() {
            return Err(SwError::LaneIndex(lane, lanes.len()));
        }
        let id = self.context.alloc_module_id();
        lanes[lane].data.lock().modules.push(EffectModule::new(id, kind));
        Ok(id)
    }

    pub fn remove_module(&self, lane: usize, index: usize) -> SwResult<()> {
        self.context.guard_structural_edit()?;
        let lanes = self.lanes.read();
        if lane >= lanes.len() {
            return Err(SwError::LaneIndex(lane, lanes.len()));
        }
        let mut data = lanes[lane].data.lock();
        if index >= data.modules.len() {
            return Err(SwError::ModuleIndex(index, data.modules.len()));
        }
        data.modules.remove(index);
        Ok(())
    }

    /// Edit a module's parameters in place. Not a structural edit: the
    /// data lock alone keeps the worker out.
    pub fn edit_module<R>(
        &self,
        lane: usize,
        index: usize,
        f: impl FnOnce(&mut EffectModule) -> R,
    ) -> SwResult<R> {
        let lanes = self.lanes.read();
        if lane >= lanes.len() {
            return Err(SwError::LaneIndex(lane, lanes.len()));
        }
        let mut data = lanes[lane].data.lock();
        let len = data.modules.len();
        match data.modules.get_mut(index) {
            Some(module) => Ok(f(module)),
            None => Err(SwError::ModuleIndex(index, len)),
        }
    }

    /// Bitmasks of the physical channels enabled lanes read from and sum
    /// into. Channels outside both masks can skip the transform path
    /// entirely.
    pub fn routing_masks(&self) -> (u64, u64) {
        let mut inputs = 0u64;
        let mut outputs = 0u64;
        for lane in self.lanes.read().iter() {
            if !lane.is_enabled() {
                continue;
            }
            let data = lane.data.lock();
            if let LaneInput::Channel(channel) = data.input {
                for c in channel..(channel + SIMD_CHANNELS).min(64) {
                    inputs |= 1 << c;
                }
            }
            if let Some(channel) = data.output {
                for c in channel..(channel + SIMD_CHANNELS).min(64) {
                    outputs |= 1 << c;
                }
            }
        }
        (inputs, outputs)
    }

    /// Run one frame through every lane and sum the results into `output`.
    ///
    /// Blocks until all lanes report finished; a stalled lane stalls the
    /// frame. Channels no lane targets are left untouched in `output`.
    pub fn process(&mut self, frame: &Arc<SpectralBuffer>, output: &mut SpectralBuffer) {
        let bins = frame.bins();
        self.bins = self.bins.max(bins);
        let lanes = self.lanes.read();
        if lanes.is_empty() {
            return;
        }

        // Setup under lock: no worker can read lane data or observe a
        // stale Finished until every status says Ready.
        {
            let mut guards: Vec<_> = lanes.iter().map(|lane| lane.data.lock()).collect();
            for guard in guards.iter_mut() {
                guard.reserve(bins);
            }
            for lane in lanes.iter() {
                lane.current_module.store(0, Ordering::Relaxed);
                lane.set_status(LaneStatus::Ready);
            }
            for guard in guards.iter_mut() {
                if let LaneInput::Channel(channel) = guard.input {
                    if channel < frame.channels() {
                        guard.load(&SpectralView::new(Arc::clone(frame), channel));
                    } else {
                        guard.source.clear();
                    }
                }
            }
        }

        // Wait for the slowest lane
        let backoff = Backoff::new();
        loop {
            let pending = lanes
                .iter()
                .any(|lane| matches!(lane.status(), LaneStatus::Ready | LaneStatus::Running));
            if !pending {
                break;
            }
            backoff.snooze();
        }

        // Fan-in: 1/N sum per shared output channel. Enable and routing
        // are sampled once; `set_lane_enabled` is not phase-gated, so a
        // flip between the count and the sum would otherwise divide by a
        // zero fan-in count.
        let routes: Vec<Option<usize>> = lanes
            .iter()
            .map(|lane| {
                if !lane.is_enabled() {
                    return None;
                }
                lane.data.lock().output.filter(|&c| c < output.channels())
            })
            .collect();
        let mut fan_in: Vec<usize> = vec![0; output.channels().div_ceil(SIMD_CHANNELS)];
        for &channel in routes.iter().flatten() {
            fan_in[channel / SIMD_CHANNELS] += 1;
        }
        for (pkg, &n) in fan_in.iter().enumerate() {
            if n > 0 {
                for bin in 0..bins.min(output.bins()) {
                    output.set_package(pkg, bin, sw_dsp::ComplexSimd::zero());
                }
            }
        }
        for (lane, route) in lanes.iter().zip(routes.iter()) {
            let channel = match *route {
                Some(c) => c,
                None => continue,
            };
            let mut data = lane.data.lock();
            if data.source.repr() == SpectralRepr::Polar {
                data.source.convert_to(SpectralRepr::Cartesian);
            }
            let pkg = channel / SIMD_CHANNELS;
            let scale = f64x4::splat(1.0 / fan_in[pkg] as f64);
            for bin in 0..bins.min(output.bins()).min(data.source.bins()) {
                let sum = output.package(pkg, bin).add(data.source.package(0, bin).scale(scale));
                output.set_package(pkg, bin, sum);
            }
        }
        output.set_repr(SpectralRepr::Cartesian);
    }
}

impl Drop for EffectsState {
    fn drop(&mut self) {
        for lane in self.lanes.read().iter() {
            lane.stop.store(true, Ordering::Release);
        }
        for handle in self.workers.iter_mut().filter_map(Option::take) {
            let _ = handle.join();
        }
    }
}

fn validate_alignment(input: LaneInput, output: Option<usize>) -> SwResult<()> {
    if let LaneInput::Channel(c) = input {
        if c % SIMD_CHANNELS != 0 {
            return Err(SwError::InvalidParam(format!(
                "lane input channel {c} is not package-aligned"
            )));
        }
    }
    if let Some(c) = output {
        if c % SIMD_CHANNELS != 0 {
            return Err(SwError::InvalidParam(format!(
                "lane output channel {c} is not package-aligned"
            )));
        }
    }
    Ok(())
}

/// Reject an input edge that would make lane routing cyclic.
///
/// Every lane has exactly one input, so the transitive closure of the
/// proposed edge is a single chain walk; revisiting `lane` (or any node
/// twice) means a loop.
fn check_feedback(lanes: &[Arc<LaneShared>], lane: usize, input: LaneInput) -> SwResult<()> {
    let mut current = input;
    let mut hops = 0;
    while let LaneInput::Lane(upstream) = current {
        if upstream == lane {
            return Err(SwError::FeedbackLoop(lane));
        }
        if upstream >= lanes.len() {
            return Err(SwError::LaneIndex(upstream, lanes.len()));
        }
        hops += 1;
        if hops > lanes.len() {
            // A pre-existing loop not involving `lane`; still refuse
            return Err(SwError::FeedbackLoop(lane));
        }
        current = lanes[upstream].data.lock().input;
    }
    Ok(())
}

/// Per-lane worker: spin for the start signal, resolve the input, run the
/// module chain, publish the result.
fn worker_loop(shared: Arc<LaneShared>, registry: LaneRegistry) {
    loop {
        let backoff = Backoff::new();
        loop {
            if shared.stop.load(Ordering::Acquire) {
                shared.set_status(LaneStatus::Stopped);
                return;
            }
            if shared.status() == LaneStatus::Ready {
                break;
            }
            backoff.snooze();
        }

        if !shared.is_enabled() {
            shared.set_status(LaneStatus::Finished);
            continue;
        }

        shared.set_status(LaneStatus::Running);
        let mut data = shared.data.lock();
        if let LaneInput::Lane(upstream_index) = data.input {
            let upstream = registry.read().get(upstream_index).cloned();
            if let Some(upstream) = upstream {
                wait_for_upstream(&upstream, &shared);
                let updata = upstream.data.lock();
                copy_lane_result(&mut data, &updata);
            } else {
                data.source.clear();
            }
        }
        data.run(&shared.current_module);
        drop(data);
        shared.set_status(LaneStatus::Finished);
    }
}

fn wait_for_upstream(upstream: &LaneShared, own: &LaneShared) {
    let backoff = Backoff::new();
    loop {
        match upstream.status() {
            LaneStatus::Finished | LaneStatus::Stopped => return,
            _ => {}
        }
        if own.stop.load(Ordering::Acquire) {
            return;
        }
        backoff.snooze();
    }
}

fn copy_lane_result(dest: &mut LaneData, upstream: &LaneData) {
    let bins = dest.source.bins().min(upstream.source.bins());
    SpectralBuffer::apply_to(
        &mut dest.source,
        &upstream.source,
        SIMD_CHANNELS,
        bins,
        sw_dsp::BlendOp::Assign,
        sw_dsp::spectral::FULL_MASK,
        0,
        0,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use sw_core::Phase;

    fn state_with_lanes(n: usize) -> EffectsState {
        let context = Arc::new(EngineContext::new());
        let mut state = EffectsState::new(context, 65);
        for _ in 0..n {
            state.add_lane(LaneInput::Channel(0), Some(0)).unwrap();
        }
        state
    }

    #[test]
    fn direct_feedback_rejected() {
        let state = state_with_lanes(2);
        state.set_lane_input(0, LaneInput::Lane(1)).unwrap();
        let err = state.set_lane_input(1, LaneInput::Lane(0)).unwrap_err();
        assert!(matches!(err, SwError::FeedbackLoop(1)));
    }

    #[test]
    fn transitive_feedback_rejected() {
        let state = state_with_lanes(3);
        state.set_lane_input(1, LaneInput::Lane(0)).unwrap();
        state.set_lane_input(2, LaneInput::Lane(1)).unwrap();
        let err = state.set_lane_input(0, LaneInput::Lane(2)).unwrap_err();
        assert!(matches!(err, SwError::FeedbackLoop(0)));
    }

    #[test]
    fn self_feedback_rejected() {
        let state = state_with_lanes(1);
        let err = state.set_lane_input(0, LaneInput::Lane(0)).unwrap_err();
        assert!(matches!(err, SwError::FeedbackLoop(0)));
    }

    #[test]
    fn edits_rejected_while_processing() {
        let context = Arc::new(EngineContext::new());
        let mut state = EffectsState::new(Arc::clone(&context), 65);
        state.add_lane(LaneInput::Channel(0), Some(0)).unwrap();

        context.set_phase(Phase::Processing);
        assert!(matches!(
            state.add_lane(LaneInput::Channel(0), Some(0)),
            Err(SwError::ProcessingActive)
        ));
        assert!(matches!(
            state.add_module(0, EffectKind::Filter),
            Err(SwError::ProcessingActive)
        ));
        context.set_phase(Phase::Outside);
        assert!(state.add_module(0, EffectKind::Filter).is_ok());
    }

    #[test]
    fn unaligned_channel_rejected() {
        let mut state = state_with_lanes(0);
        assert!(state.add_lane(LaneInput::Channel(1), Some(0)).is_err());
        assert!(state.add_lane(LaneInput::Channel(4), Some(4)).is_ok());
    }

    #[test]
    fn referenced_lane_cannot_be_removed() {
        let mut state = state_with_lanes(2);
        state.set_lane_input(1, LaneInput::Lane(0)).unwrap();
        assert!(state.remove_lane(0).is_err());
        assert!(state.remove_lane(1).is_ok());
        assert!(state.remove_lane(0).is_ok());
        assert_eq!(state.lane_count(), 0);
    }

    #[test]
    fn modules_insert_and_remove_in_order() {
        let state = state_with_lanes(1);
        let first = state.add_module(0, EffectKind::Filter).unwrap();
        let second = state.add_module(0, EffectKind::Contrast).unwrap();
        assert_ne!(first, second);

        state.remove_module(0, 0).unwrap();
        let remaining = state.edit_module(0, 0, |m| m.id).unwrap();
        assert_eq!(remaining, second);
        assert!(state.remove_module(0, 5).is_err());
    }

    #[test]
    fn edit_module_reaches_into_the_effect() {
        let state = state_with_lanes(1);
        state.add_module(0, EffectKind::Filter).unwrap();
        state
            .edit_module(0, 0, |m| {
                *m.effect.bounds_mut() = sw_dsp::Bounds::mono(0.2, 0.8);
                m.mix = 0.5;
            })
            .unwrap();
        let mix = state.edit_module(0, 0, |m| m.mix).unwrap();
        assert_eq!(mix, 0.5);
        assert!(state.edit_module(0, 3, |_| ()).is_err());
    }

    #[test]
    fn frame_runs_through_a_passthrough_lane() {
        let mut state = state_with_lanes(1);
        let mut frame = SpectralBuffer::new(SIMD_CHANNELS, 65);
        frame.write_at(0, 10, 0.5, 0.25);
        let mut output = SpectralBuffer::new(SIMD_CHANNELS, 65);
        state.process(&Arc::new(frame), &mut output);
        assert_eq!(output.read_at(0, 10), (0.5, 0.25));
    }

    #[test]
    fn disabled_lane_reports_finished() {
        let mut state = state_with_lanes(1);
        state.set_lane_enabled(0, false).unwrap();
        let frame = Arc::new(SpectralBuffer::new(SIMD_CHANNELS, 65));
        let mut output = SpectralBuffer::new(SIMD_CHANNELS, 65);
        // Must not hang; a disabled lane's worker publishes immediately
        state.process(&frame, &mut output);
    }

    #[test]
    fn disabled_lane_is_excluded_from_fan_in() {
        // Both lanes target the same package; only the enabled one may
        // count toward the 1/N scale or contribute, and the result must
        // stay finite
        let mut state = state_with_lanes(2);
        state.set_lane_enabled(1, false).unwrap();

        let mut frame = SpectralBuffer::new(SIMD_CHANNELS, 65);
        frame.write_at(0, 4, 2.0, 0.0);
        let mut output = SpectralBuffer::new(SIMD_CHANNELS, 65);
        state.process(&Arc::new(frame), &mut output);

        let (re, im) = output.read_at(0, 4);
        assert!(re.is_finite() && im.is_finite());
        assert!((re - 2.0).abs() < 1e-12, "summed value was {re}");
    }

    #[test]
    fn chained_lane_sees_upstream_result() {
        let mut state = state_with_lanes(1);
        let second = state.add_lane(LaneInput::Lane(0), Some(0)).unwrap();
        state.set_lane_output(0, None).unwrap();
        assert_eq!(second, 1);

        let mut frame = SpectralBuffer::new(SIMD_CHANNELS, 65);
        frame.write_at(0, 7, 1.5, 0.0);
        let mut output = SpectralBuffer::new(SIMD_CHANNELS, 65);
        state.process(&Arc::new(frame), &mut output);
        // Lane 1 pulled lane 0's pass-through result
        assert_eq!(output.read_at(0, 7), (1.5, 0.0));
    }
}
