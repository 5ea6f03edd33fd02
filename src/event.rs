//! Event Sorter (§4.2).
//!
//! Sorting is indirect: an index array is sorted, not the event records
//! themselves, so the caller-programmed array stays in original order for
//! debug capture — mirrored on the teacher's descriptor-ring convention of
//! keeping a stable backing store and indexing into it (`virtqueue/split.rs`
//! keeps `ref_ring` separate from the hardware-visible rings for the same
//! reason: don't disturb the programmer-visible layout to satisfy an
//! internal ordering need).

use crate::error::{CoreError, StateErrorKind};
use crate::limits::{PORTS_EVENT_NUMBER, TIMER_EVENT_NUMBER};

/// Timer-domain event kinds (§3 Event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerEventKind {
    MdtStart,
    AtStart,
    UccOpen,
    UccLast,
    UccClose,
    SyncPortSet,
    SyncPortReset,
    TimerInterrupt,
    BufferRequest,
    Reload,
    ReloadValue,
    NoEvent,
}

/// Port-domain event kinds (§3 Event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortEventKind {
    AtWindowOpen,
    AtWindowClose,
    UccRxOpen,
    UccRxClose,
    MstWindowOpen,
    MstWindowClose,
    RxBufferRequest,
    SvcStart,
    ReloadValue,
    NoEvent,
}

/// One scheduled event: `(time_ns, type, subcycle_count, subcycle_select)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event<K> {
    pub time_ns: u32,
    pub kind: K,
    pub subcycle_count: u8,
    pub subcycle_select: u8,
}

impl<K> Event<K> {
    pub const fn new(time_ns: u32, kind: K) -> Self {
        Self {
            time_ns,
            kind,
            subcycle_count: 0,
            subcycle_select: 0,
        }
    }
}

/// Stable-sorts `events` ascending by `time_ns`, via an indirect index array,
/// and verifies the tail invariant named by `tail_ok`. Returns the sorted
/// events (padded to `capacity` with `no_event`) or, on invariant violation,
/// `CoreError::State(StateErrorKind::EventTableInvalid)` (§4.2 "the table is
/// rejected").
fn sort_indirect<K: Copy + PartialEq>(
    events: &[Event<K>],
    capacity: usize,
    no_event: K,
    tail_ok: impl Fn(&[Event<K>]) -> bool,
) -> Result<Vec<Event<K>>, CoreError> {
    let mut order: Vec<usize> = (0..events.len()).collect();
    // Stable sort on the index array; ties keep their original relative order.
    order.sort_by_key(|&i| events[i].time_ns);

    let sorted: Vec<Event<K>> = order.iter().map(|&i| events[i]).collect();

    if !tail_ok(&sorted) {
        return Err(CoreError::state(StateErrorKind::EventTableInvalid));
    }

    let mut out = sorted;
    out.resize(
        capacity,
        Event {
            time_ns: 0,
            kind: no_event,
            subcycle_count: 0,
            subcycle_select: 0,
        },
    );
    Ok(out)
}

/// Sorts a timer-event table; the last two non-padding entries must be
/// `Reload, ReloadValue`.
pub fn sort_timer_events(events: &[Event<TimerEventKind>]) -> Result<Vec<Event<TimerEventKind>>, CoreError> {
    sort_indirect(events, TIMER_EVENT_NUMBER, TimerEventKind::NoEvent, |sorted| {
        tail_matches(
            sorted,
            TimerEventKind::NoEvent,
            [TimerEventKind::Reload, TimerEventKind::ReloadValue],
        )
    })
}

/// Sorts a port-event table; the last two non-padding entries must be
/// `MstWindowClose, ReloadValue`.
pub fn sort_port_events(events: &[Event<PortEventKind>]) -> Result<Vec<Event<PortEventKind>>, CoreError> {
    sort_indirect(events, PORTS_EVENT_NUMBER, PortEventKind::NoEvent, |sorted| {
        tail_matches(
            sorted,
            PortEventKind::NoEvent,
            [PortEventKind::MstWindowClose, PortEventKind::ReloadValue],
        )
    })
}

fn tail_matches<K: Copy + PartialEq>(sorted: &[Event<K>], no_event: K, want: [K; 2]) -> bool {
    let real: Vec<&Event<K>> = sorted.iter().filter(|e| e.kind != no_event).collect();
    if real.len() < 2 {
        return false;
    }
    let n = real.len();
    real[n - 2].kind == want[0] && real[n - 1].kind == want[1]
}

/// Programs a sorted event table into the controller's register-mapped
/// event array slot by slot. `sorted` is already padded with `NoEvent` by
/// the sorter, so this is a plain copy into the shared memory region.
pub fn emit_to_controller<K: Copy>(sorted: &[Event<K>], dest: &mut [Event<K>]) {
    let n = sorted.len().min(dest.len());
    dest[..n].copy_from_slice(&sorted[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_sort_ascending_with_valid_tail() {
        let events = [
            Event::new(500, TimerEventKind::MdtStart),
            Event::new(100, TimerEventKind::AtStart),
            Event::new(500, TimerEventKind::TimerInterrupt),
            Event::new(900, TimerEventKind::Reload),
            Event::new(950, TimerEventKind::ReloadValue),
        ];
        let sorted = sort_timer_events(&events).unwrap();
        let times: Vec<u32> = sorted
            .iter()
            .filter(|e| e.kind != TimerEventKind::NoEvent)
            .map(|e| e.time_ns)
            .collect();
        assert_eq!(times, vec![100, 500, 500, 900, 950]);
        // Stability: the two time=500 entries keep their input order.
        let kinds: Vec<_> = sorted
            .iter()
            .filter(|e| e.kind != TimerEventKind::NoEvent)
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds[1], TimerEventKind::MdtStart);
        assert_eq!(kinds[2], TimerEventKind::TimerInterrupt);
        assert_eq!(sorted.len(), TIMER_EVENT_NUMBER);
    }

    #[test]
    fn rejects_wrong_tail() {
        let events = [
            Event::new(100, TimerEventKind::MdtStart),
            Event::new(200, TimerEventKind::Reload),
        ];
        assert!(sort_timer_events(&events).is_err());
    }

    #[test]
    fn port_table_tail_contract() {
        let events = [
            Event::new(10, PortEventKind::AtWindowOpen),
            Event::new(20, PortEventKind::MstWindowClose),
            Event::new(30, PortEventKind::ReloadValue),
        ];
        let sorted = sort_port_events(&events).unwrap();
        assert_eq!(sorted.len(), PORTS_EVENT_NUMBER);
    }
}
