//! Shared status storage for the firmware target.
//!
//! The charger service publishes a compact copy of the arbiter state after
//! every cycle so the heartbeat task can report it without taking the arbiter
//! lock.

use charger_core::repl::status::StatusSnapshot;
use charger_core::usecase::{HardwareModeValue, UseCase};
use portable_atomic::{AtomicU8, AtomicU16, Ordering};

const FLAG_DEVICE_READY: u8 = 1 << 0;
const FLAG_RETRY_PENDING: u8 = 1 << 1;
const FLAG_ERROR_RESULT: u8 = 1 << 2;

/// Index of the active use case.
static USE_CASE: AtomicU16 = AtomicU16::new(UseCase::Standby.as_index());
/// Mode register value last committed.
static MODE: AtomicU8 = AtomicU8::new(0);
/// Number of active votes (saturating).
static VOTES: AtomicU8 = AtomicU8::new(0);
/// Bitmask of the `FLAG_*` values.
static FLAGS: AtomicU8 = AtomicU8::new(FLAG_DEVICE_READY);

/// Compact view of the published state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublishedStatus {
    pub use_case: UseCase,
    pub mode: HardwareModeValue,
    pub votes: u8,
    pub device_ready: bool,
    pub retry_pending: bool,
    /// The last cycle ended in forced standby.
    pub faulted: bool,
}

/// Stores the arbiter snapshot.
pub fn publish(snapshot: &StatusSnapshot) {
    let mut flags = 0;
    if snapshot.device_ready {
        flags |= FLAG_DEVICE_READY;
    }
    if snapshot.retry_pending {
        flags |= FLAG_RETRY_PENDING;
    }
    if snapshot.result.as_ref().is_some_and(|result| result.is_error()) {
        flags |= FLAG_ERROR_RESULT;
    }

    USE_CASE.store(snapshot.use_case.as_index(), Ordering::Relaxed);
    MODE.store(snapshot.mode.raw(), Ordering::Relaxed);
    VOTES.store(
        u8::try_from(snapshot.vote_count).unwrap_or(u8::MAX),
        Ordering::Relaxed,
    );
    FLAGS.store(flags, Ordering::Relaxed);
}

/// Reads back the last published state.
pub fn published() -> PublishedStatus {
    let flags = FLAGS.load(Ordering::Relaxed);
    PublishedStatus {
        use_case: UseCase::from_index(USE_CASE.load(Ordering::Relaxed))
            .unwrap_or(UseCase::Standby),
        mode: HardwareModeValue::new(MODE.load(Ordering::Relaxed)),
        votes: VOTES.load(Ordering::Relaxed),
        device_ready: flags & FLAG_DEVICE_READY != 0,
        retry_pending: flags & FLAG_RETRY_PENDING != 0,
        faulted: flags & FLAG_ERROR_RESULT != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charger_core::election::{ERROR_REASON, ElectionResult, Reason};
    use charger_core::usecase::InputMask;

    #[test]
    fn published_state_round_trips() {
        let boot = published();
        assert_eq!(boot.use_case, UseCase::Standby);
        assert!(boot.device_ready);

        let mut reason = Reason::new();
        reason.push_str(ERROR_REASON).expect("fits");
        let snapshot = StatusSnapshot {
            use_case: UseCase::UsbOtgWlcRx,
            mode: HardwareModeValue::OTG_BUCK_BOOST_ON,
            inputs: Some(InputMask::BOTH),
            result: Some(ElectionResult {
                reason,
                mode: HardwareModeValue::ALL_OFF,
            }),
            vote_count: 300,
            device_ready: false,
            retry_pending: true,
        };
        publish(&snapshot);

        assert_eq!(
            published(),
            PublishedStatus {
                use_case: UseCase::UsbOtgWlcRx,
                mode: HardwareModeValue::OTG_BUCK_BOOST_ON,
                votes: u8::MAX,
                device_ready: false,
                retry_pending: true,
                faulted: true,
            }
        );
    }
}
