//! Timer Service: up to `MAX_TIMERS` named one-shot/periodic slots driven
//! by a 1 Hz tick.
//!
//! The original registered function-pointer callbacks and cancelled them
//! by comparing pointers. Callbacks never did more than flip a flag, so
//! here a timer firing just appends a [`TimerId`] to the fired set the
//! caller drains after `tick()` — there is nothing left for a callback to
//! do that isn't already "post this event".

pub const MAX_TIMERS: usize = 8;

/// Named timer purposes. Every armed slot carries one of these so the tick
/// result can be routed without any callback machinery.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TimerId {
    DhcpRetry,
    DhcpT1,
    DhcpT2,
    DhcpLeaseExpiry,
    DhcpSafeToUse,
    DhcpDeclineWait,
}

#[derive(Copy, Clone, PartialEq)]
enum Kind {
    OneShot,
    Periodic,
}

#[derive(Copy, Clone)]
struct Slot {
    id: TimerId,
    kind: Kind,
    remaining: u32,
    reload: u32,
}

/// Fixed-capacity set of timer IDs that fired on the most recent tick.
pub struct FiredTimers {
    ids: [TimerId; MAX_TIMERS],
    count: usize,
}

impl FiredTimers {
    fn empty() -> Self {
        FiredTimers {
            ids: [TimerId::DhcpRetry; MAX_TIMERS],
            count: 0,
        }
    }

    fn push(&mut self, id: TimerId) {
        if self.count < MAX_TIMERS {
            self.ids[self.count] = id;
            self.count += 1;
        }
    }

    pub fn as_slice(&self) -> &[TimerId] {
        &self.ids[..self.count]
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

pub struct TimerService {
    slots: [Option<Slot>; MAX_TIMERS],
}

impl TimerService {
    pub const fn new() -> Self {
        TimerService { slots: [None; MAX_TIMERS] }
    }

    pub fn arm_one_shot(&mut self, id: TimerId, seconds: u32) {
        self.replace(id, Kind::OneShot, seconds);
    }

    pub fn arm_periodic(&mut self, id: TimerId, seconds: u32) {
        self.replace(id, Kind::Periodic, seconds);
    }

    fn replace(&mut self, id: TimerId, kind: Kind, seconds: u32) {
        self.stop(id);
        if let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) {
            *slot = Some(Slot {
                id,
                kind,
                remaining: seconds,
                reload: seconds,
            });
        }
    }

    pub fn stop(&mut self, id: TimerId) {
        for slot in self.slots.iter_mut() {
            if slot.map(|s| s.id) == Some(id) {
                *slot = None;
            }
        }
    }

    pub fn stop_all(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.slots.iter().any(|s| s.map(|s| s.id) == Some(id))
    }

    /// Decrement every active slot by one second; return the set of IDs
    /// that reached zero. Periodic slots reload; one-shot slots free.
    pub fn tick(&mut self) -> FiredTimers {
        let mut fired = FiredTimers::empty();
        for slot in self.slots.iter_mut() {
            if let Some(s) = slot {
                if s.remaining > 0 {
                    s.remaining -= 1;
                }
                if s.remaining == 0 {
                    fired.push(s.id);
                    match s.kind {
                        Kind::Periodic => s.remaining = s.reload,
                        Kind::OneShot => *slot = None,
                    }
                }
            }
        }
        fired
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_fires_once_and_frees_slot() {
        let mut t = TimerService::new();
        t.arm_one_shot(TimerId::DhcpSafeToUse, 2);
        assert!(t.tick().is_empty());
        assert!(t.tick().as_slice().contains(&TimerId::DhcpSafeToUse));
        assert!(!t.is_armed(TimerId::DhcpSafeToUse));
    }

    #[test]
    fn periodic_reloads_after_firing() {
        let mut t = TimerService::new();
        t.arm_periodic(TimerId::DhcpRetry, 1);
        assert!(t.tick().as_slice().contains(&TimerId::DhcpRetry));
        assert!(t.is_armed(TimerId::DhcpRetry));
        assert!(t.tick().as_slice().contains(&TimerId::DhcpRetry));
    }

    #[test]
    fn stop_all_clears_every_slot() {
        let mut t = TimerService::new();
        t.arm_periodic(TimerId::DhcpT1, 5);
        t.arm_one_shot(TimerId::DhcpDeclineWait, 10);
        t.stop_all();
        assert!(!t.is_armed(TimerId::DhcpT1));
        assert!(!t.is_armed(TimerId::DhcpDeclineWait));
    }

    #[test]
    fn t1_and_rebind_periodic_never_coexist() {
        // DHCP safety property: the client only ever arms DhcpT1 while
        // bound, and swaps it for DhcpRetry (the rebind periodic) before
        // entering REBINDING — never both at once.
        let mut t = TimerService::new();
        t.arm_one_shot(TimerId::DhcpT1, 150);
        t.stop(TimerId::DhcpT1);
        t.arm_periodic(TimerId::DhcpRetry, 15);
        assert!(!t.is_armed(TimerId::DhcpT1));
        assert!(t.is_armed(TimerId::DhcpRetry));
    }
}
