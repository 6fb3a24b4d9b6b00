//! Engine context: the explicit replacement for ambient global state
//!
//! The context carries the update-phase state machine that gates structural
//! edits and hands out module ids. One context is shared (via `Arc`) by the
//! sound engine, the effects state, and every lane.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use crate::{SwError, SwResult};

/// Where the engine currently is within its block cycle.
///
/// Structural edits (lane/module insertion, deletion, replacement) are only
/// legal in `Outside`. The control thread moves the phase forward at defined
/// boundaries; nothing else writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Not inside an audio callback
    Outside = 0,
    /// Callback entered, before the first FFT frame
    PreBlock = 1,
    /// FFT frames in flight
    Processing = 2,
    /// Frames done, before callback return
    PostBlock = 3,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Phase::Outside,
            1 => Phase::PreBlock,
            2 => Phase::Processing,
            _ => Phase::PostBlock,
        }
    }
}

/// Shared engine context
pub struct EngineContext {
    phase: AtomicU8,
    next_module_id: AtomicU64,
}

impl EngineContext {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Outside as u8),
            next_module_id: AtomicU64::new(1),
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Advance the block state machine. Only the control thread calls this.
    #[inline]
    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Check that a structural edit is legal right now.
    ///
    /// Returns `Err(SwError::ProcessingActive)` without mutating anything
    /// when the engine is inside its audio-processing window.
    pub fn guard_structural_edit(&self) -> SwResult<()> {
        if self.phase() == Phase::Outside {
            Ok(())
        } else {
            log::warn!("structural edit rejected: engine phase is {:?}", self.phase());
            Err(SwError::ProcessingActive)
        }
    }

    /// Allocate a unique module id
    #[inline]
    pub fn alloc_module_id(&self) -> u64 {
        self.next_module_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_gated_by_phase() {
        let ctx = EngineContext::new();
        assert!(ctx.guard_structural_edit().is_ok());

        ctx.set_phase(Phase::Processing);
        assert!(matches!(
            ctx.guard_structural_edit(),
            Err(SwError::ProcessingActive)
        ));

        ctx.set_phase(Phase::Outside);
        assert!(ctx.guard_structural_edit().is_ok());
    }

    #[test]
    fn module_ids_unique() {
        let ctx = EngineContext::new();
        let a = ctx.alloc_module_id();
        let b = ctx.alloc_module_id();
        assert_ne!(a, b);
    }
}
