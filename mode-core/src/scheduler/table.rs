//! Mode registry, active set and the transition request guard.

use core::fmt;
use core::time::Duration;

use heapless::Vec;

use super::queue::{ActivationSet, MessageQueue, PendingMap};
use super::ModeControl;
use crate::journal::LogBuffer;
use crate::mode::{Mode, ModeId, Phase, ReservedMode};

/// Errors raised while registering modes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegistryError {
    /// The scheduler already tracks its full capacity of modes.
    RegistryFull,
    /// The identifier belongs to a built-in system mode.
    ReservedId(ModeId),
    /// Another mode is registered under the identifier.
    DuplicateId(ModeId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::RegistryFull => f.write_str("mode registry is full"),
            RegistryError::ReservedId(id) => write!(f, "{} is a reserved mode id", id.get()),
            RegistryError::DuplicateId(id) => write!(f, "mode id {} is already registered", id.get()),
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Registration {
    id: ModeId,
    // Running time of the latest activation, kept after the mode is removed.
    last_active_time: Duration,
}

/// Everything a handler may observe or change about its scheduler.
///
/// Handlers are stored separately so a dispatched handler can borrow the
/// table mutably through its [`ModeContext`](super::ModeContext).
#[derive(Debug)]
pub(crate) struct ModeTable<const N: usize> {
    registry: Vec<Registration, N>,
    active: Vec<Mode, N>,
    queue: MessageQueue<N>,
    frozen: MessageQueue<N>,
    journal: LogBuffer,
}

impl<const N: usize> ModeTable<N> {
    pub(crate) const fn new(logging_enabled: bool) -> Self {
        Self {
            registry: Vec::new(),
            active: Vec::new(),
            queue: MessageQueue::new(),
            frozen: MessageQueue::new(),
            journal: LogBuffer::new(logging_enabled),
        }
    }

    pub(crate) fn register(&mut self, id: ModeId) -> Result<(), RegistryError> {
        if self.got_mode(id) {
            return Err(RegistryError::DuplicateId(id));
        }
        self.registry
            .push(Registration {
                id,
                last_active_time: Duration::ZERO,
            })
            .map_err(|_| RegistryError::RegistryFull)
    }

    /// Removes an inactive mode from the registry.
    pub(crate) fn unregister(&mut self, id: ModeId) -> bool {
        if !self.got_mode(id) || self.is_engaged(id) {
            return false;
        }
        self.registry.retain(|entry| entry.id != id);
        true
    }

    pub(crate) fn is_full(&self) -> bool {
        self.registry.is_full()
    }

    /// Active, or about to become active on the next tick.
    fn is_engaged(&self, id: ModeId) -> bool {
        self.mode(id).is_some()
            || self.queue.is_activating(id)
            || self.frozen.pending_phase(id).is_some()
    }

    pub(crate) fn mode(&self, id: ModeId) -> Option<&Mode> {
        self.active.iter().find(|mode| mode.id() == id)
    }

    pub(crate) fn mode_mut(&mut self, id: ModeId) -> Option<&mut Mode> {
        self.active.iter_mut().find(|mode| mode.id() == id)
    }

    pub(crate) fn active_ids(&self) -> impl Iterator<Item = ModeId> + '_ {
        self.active.iter().map(Mode::id)
    }

    pub(crate) fn registered_ids(&self) -> impl Iterator<Item = ModeId> + '_ {
        self.registry.iter().map(|entry| entry.id)
    }

    /// Guarded entry point for every transition request.
    ///
    /// Active modes accept any phase not behind their current one, except
    /// `Begin`. Inactive modes accept only `Begin`, which also schedules their
    /// activation.
    pub(crate) fn request(&mut self, id: ModeId, phase: Phase) -> bool {
        if !self.got_mode(id) {
            log::debug!("request {phase} for unknown mode {}", id.get());
            return false;
        }

        if let Some(mode) = self.mode(id) {
            if phase == Phase::Begin || phase < mode.phase() {
                log::trace!("{id} is {}, dropped request {phase}", mode.phase());
                return false;
            }
            return self.queue.post(id, phase);
        }

        if phase != Phase::Begin {
            log::trace!("{id} is inactive, dropped request {phase}");
            return false;
        }
        self.queue.forget(id);
        self.queue.post(id, phase) && self.queue.activate(id)
    }

    /// Creates the active record for `id`, resetting its running time.
    pub(crate) fn activate(&mut self, id: ModeId) -> bool {
        if self.mode(id).is_some() {
            return false;
        }
        if self.active.push(Mode::new(id)).is_err() {
            return false;
        }
        if let Some(entry) = self.registration_mut(id) {
            entry.last_active_time = Duration::ZERO;
        }
        log::debug!("{id} activated");
        true
    }

    /// Removes `id` from the active set along with anything staged for it.
    pub(crate) fn deactivate(&mut self, id: ModeId) {
        let Some(index) = self.active.iter().position(|mode| mode.id() == id) else {
            return;
        };
        let mode = self.active.remove(index);
        if let Some(entry) = self.registration_mut(id) {
            entry.last_active_time = mode.active_time();
        }
        self.queue.forget(id);
        self.frozen.forget(id);
        log::debug!("{id} removed after {:?}", mode.active_time());
    }

    fn registration_mut(&mut self, id: ModeId) -> Option<&mut Registration> {
        self.registry.iter_mut().find(|entry| entry.id == id)
    }

    pub(crate) fn take_requests(&mut self) -> (PendingMap<N>, ActivationSet<N>) {
        self.queue.take()
    }

    /// Stashes a request that arrived while the scheduler is paused.
    pub(crate) fn freeze(&mut self, id: ModeId, phase: Phase) {
        if !self.frozen.post(id, phase) {
            log::trace!("{id} already frozen past {phase}");
        }
    }

    /// Re-delivers every stashed request through the request guard.
    pub(crate) fn thaw(&mut self) {
        let (frozen, _) = self.frozen.take();
        for (id, phase) in frozen {
            self.request(id, phase);
        }
    }

    /// The later of the queued and frozen phase for `id`.
    pub(crate) fn pending_phase(&self, id: ModeId) -> Option<Phase> {
        self.queue.pending_phase(id).max(self.frozen.pending_phase(id))
    }

    pub(crate) fn has_requests(&self) -> bool {
        !self.queue.is_empty()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.active.is_empty() && self.queue.is_empty() && self.frozen.is_empty()
    }

    pub(crate) fn journal(&self) -> &LogBuffer {
        &self.journal
    }

    pub(crate) fn journal_mut(&mut self) -> &mut LogBuffer {
        &mut self.journal
    }

    fn stop_where(&mut self, keep: impl Fn(ModeId) -> bool) -> bool {
        let targets: Vec<ModeId, N> = self.active_ids().filter(|id| !keep(*id)).collect();
        targets
            .into_iter()
            .fold(true, |accepted, id| self.request(id, Phase::End) && accepted)
    }
}

impl<const N: usize> ModeControl for ModeTable<N> {
    fn got_mode(&self, id: ModeId) -> bool {
        self.registry.iter().any(|entry| entry.id == id)
    }

    fn mode_active(&self, id: ModeId) -> bool {
        self.mode(id).is_some()
    }

    fn active_time(&self, id: ModeId) -> Duration {
        if let Some(mode) = self.mode(id) {
            return mode.active_time();
        }
        self.registry
            .iter()
            .find(|entry| entry.id == id)
            .map_or(Duration::ZERO, |entry| entry.last_active_time)
    }

    fn begin_mode(&mut self, id: ModeId) -> bool {
        if !self.request(id, Phase::Begin) {
            return false;
        }
        if ReservedMode::from_id(id).is_some_and(ReservedMode::is_takeover) {
            self.stop_where(|active| active == id);
        }
        true
    }

    fn stop_mode(&mut self, id: ModeId) -> bool {
        self.request(id, Phase::End)
    }

    fn stop_all_except(&mut self, id: ModeId) -> bool {
        let started = !self.mode_active(id) && self.begin_mode(id);
        self.stop_where(|active| active == id);
        started
    }

    fn stop_all(&mut self) -> bool {
        self.stop_where(|_| false)
    }

    fn log(&mut self, args: fmt::Arguments<'_>) {
        self.journal.push(args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODE: ModeId = ModeId::new(100);
    const OTHER: ModeId = ModeId::new(101);

    fn table() -> ModeTable<8> {
        let mut table = ModeTable::new(true);
        for reserved in ReservedMode::ALL {
            table.register(reserved.id()).expect("reserved ids fit");
        }
        table.register(MODE).expect("mode registers");
        table.register(OTHER).expect("other registers");
        table
    }

    fn activate(table: &mut ModeTable<8>, id: ModeId) {
        assert!(table.request(id, Phase::Begin));
        let (_, activations) = table.take_requests();
        for id in activations {
            table.activate(id);
        }
    }

    #[test]
    fn duplicate_and_overflow_registrations_fail() {
        let mut table = table();
        assert_eq!(table.register(MODE), Err(RegistryError::DuplicateId(MODE)));
        table.register(ModeId::new(200)).expect("slot 8");
        assert_eq!(
            table.register(ModeId::new(201)),
            Err(RegistryError::RegistryFull)
        );
    }

    #[test]
    fn unknown_modes_are_rejected() {
        let mut table = table();
        assert!(!table.request(ModeId::new(999), Phase::Begin));
        assert!(!table.begin_mode(ModeId::new(999)));
        assert!(table.is_idle());
    }

    #[test]
    fn inactive_modes_only_accept_begin() {
        let mut table = table();
        assert!(!table.request(MODE, Phase::Running));
        assert!(!table.stop_mode(MODE));
        assert!(table.request(MODE, Phase::Begin));
        assert_eq!(table.pending_phase(MODE), Some(Phase::Begin));
    }

    #[test]
    fn active_modes_reject_begin_and_regressions() {
        let mut table = table();
        activate(&mut table, MODE);
        table.mode_mut(MODE).expect("active").advance(Phase::Running);

        assert!(!table.request(MODE, Phase::Begin));
        assert!(table.request(MODE, Phase::Running));
        assert!(table.request(MODE, Phase::End));
        assert!(!table.request(MODE, Phase::Running));
        assert_eq!(table.pending_phase(MODE), Some(Phase::End));
    }

    #[test]
    fn takeover_stops_every_other_active_mode() {
        let mut table = table();
        activate(&mut table, MODE);
        activate(&mut table, OTHER);

        assert!(table.begin_mode(ReservedMode::Exit.id()));
        assert_eq!(table.pending_phase(MODE), Some(Phase::End));
        assert_eq!(table.pending_phase(OTHER), Some(Phase::End));
        assert_eq!(
            table.pending_phase(ReservedMode::Exit.id()),
            Some(Phase::Begin)
        );
    }

    #[test]
    fn stop_all_except_begins_an_inactive_survivor() {
        let mut table = table();
        activate(&mut table, MODE);

        assert!(table.stop_all_except(OTHER));
        assert_eq!(table.pending_phase(OTHER), Some(Phase::Begin));
        assert_eq!(table.pending_phase(MODE), Some(Phase::End));
    }

    #[test]
    fn stop_all_except_reports_an_already_active_survivor() {
        let mut table = table();
        activate(&mut table, MODE);
        activate(&mut table, OTHER);

        assert!(!table.stop_all_except(MODE));
        assert_eq!(table.pending_phase(MODE), None);
        assert_eq!(table.pending_phase(OTHER), Some(Phase::End));
    }

    #[test]
    fn stop_all_except_rejects_unknown_survivors() {
        let mut table = table();
        activate(&mut table, MODE);

        assert!(!table.stop_all_except(ModeId::new(999)));
        assert_eq!(table.pending_phase(MODE), Some(Phase::End));
    }

    #[test]
    fn pause_does_not_take_over() {
        let mut table = table();
        activate(&mut table, MODE);
        assert!(table.begin_mode(ReservedMode::Pause.id()));
        assert_eq!(table.pending_phase(MODE), None);
    }

    #[test]
    fn active_time_survives_removal_until_next_activation() {
        let mut table = table();
        activate(&mut table, MODE);
        table
            .mode_mut(MODE)
            .expect("active")
            .accrue(Duration::from_millis(250));
        table.deactivate(MODE);

        assert!(!table.mode_active(MODE));
        assert_eq!(table.active_time(MODE), Duration::from_millis(250));

        activate(&mut table, MODE);
        assert_eq!(table.active_time(MODE), Duration::ZERO);
    }

    #[test]
    fn frozen_requests_coalesce_and_replay() {
        let mut table = table();
        activate(&mut table, MODE);
        table.mode_mut(MODE).expect("active").advance(Phase::Running);

        table.freeze(MODE, Phase::End);
        table.freeze(MODE, Phase::Running);
        assert_eq!(table.pending_phase(MODE), Some(Phase::End));

        table.thaw();
        let (pending, _) = table.take_requests();
        assert_eq!(pending.as_slice(), &[(MODE, Phase::End)]);
    }

    #[test]
    fn engaged_modes_cannot_be_unregistered() {
        let mut table = table();
        assert!(table.request(MODE, Phase::Begin));
        assert!(!table.unregister(MODE));
        table.take_requests();
        assert!(table.unregister(MODE));
        assert!(!table.got_mode(MODE));
    }
}
