//! Per-tick staging of transition requests.

use heapless::Vec;

use crate::mode::{ModeId, Phase};

/// Pending transitions keyed by mode, in first-request order.
pub type PendingMap<const N: usize> = Vec<(ModeId, Phase), N>;

/// Modes waiting to be activated at the next tick.
pub type ActivationSet<const N: usize> = Vec<ModeId, N>;

/// Requests collected between two ticks.
///
/// Each mode holds at most one pending phase. A second request for the same
/// mode keeps the later lifecycle phase, so a pending transition never
/// regresses.
#[derive(Debug, Default)]
pub struct MessageQueue<const N: usize> {
    pending: PendingMap<N>,
    activations: ActivationSet<N>,
}

impl<const N: usize> MessageQueue<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
            activations: Vec::new(),
        }
    }

    /// Stages `phase` for `id`, refusing to lower an already pending phase.
    pub fn post(&mut self, id: ModeId, phase: Phase) -> bool {
        if let Some((_, pending)) = self.pending.iter_mut().find(|(mode, _)| *mode == id) {
            if phase < *pending {
                return false;
            }
            *pending = phase;
            return true;
        }
        self.pending.push((id, phase)).is_ok()
    }

    /// Marks `id` for activation at the next tick.
    pub fn activate(&mut self, id: ModeId) -> bool {
        if self.activations.contains(&id) {
            return true;
        }
        self.activations.push(id).is_ok()
    }

    /// Drops everything staged for `id`.
    pub fn forget(&mut self, id: ModeId) {
        self.pending.retain(|(mode, _)| *mode != id);
        self.activations.retain(|mode| *mode != id);
    }

    #[must_use]
    pub fn pending_phase(&self, id: ModeId) -> Option<Phase> {
        self.pending
            .iter()
            .find(|(mode, _)| *mode == id)
            .map(|(_, phase)| *phase)
    }

    #[must_use]
    pub fn is_activating(&self, id: ModeId) -> bool {
        self.activations.contains(&id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.activations.is_empty()
    }

    /// Swaps the staged requests out, leaving the queue empty for requests
    /// made during dispatch.
    pub fn take(&mut self) -> (PendingMap<N>, ActivationSet<N>) {
        (
            core::mem::replace(&mut self.pending, Vec::new()),
            core::mem::replace(&mut self.activations, Vec::new()),
        )
    }
}
