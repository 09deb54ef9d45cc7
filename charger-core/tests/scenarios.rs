mod common;

use charger_core::arbiter::{ArbiterError, CycleOutcome};
use charger_core::election::SymbolicMode;
use charger_core::hw::{Level, regs};
use charger_core::telemetry::TelemetryEventKind;
use charger_core::usecase::{
    HardwareModeValue, InputMask, ResolveError, ResolverPolicy, UseCase,
};

use common::{
    Bench, EXT_BOOST_EN, EXT_BOOST_SEL, OTG_SWITCH, WLC_EN, WLC_TX_EN, board_arbiter,
    full_lines, internal_boost_arbiter,
};

fn applied(outcome: CycleOutcome) -> charger_core::sequencer::TransitionReport {
    match outcome {
        CycleOutcome::Applied(report) => report,
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn two_charger_votes_confirm_charging_from_usb() {
    let mut bench = Bench::new(internal_boost_arbiter());

    bench
        .arbiter
        .cast_vote("USB", SymbolicMode::ChargerBuckOn.into())
        .expect("vote");
    bench
        .arbiter
        .cast_vote("BATT", SymbolicMode::ChargerBuckOn.into())
        .expect("vote");

    let report = applied(bench.cycle());
    assert_eq!(report.from, UseCase::Standby);
    assert_eq!(report.to, UseCase::UsbChg);
    assert_eq!(report.mode, HardwareModeValue::CHGR_BUCK_ON);
    assert!(!report.transited_standby);

    assert_eq!(bench.charger.mode(), HardwareModeValue::CHGR_BUCK_ON.raw());
    assert_eq!(bench.charger.mode_writes, [0x05]);
    assert_eq!(bench.charger.inputs(), InputMask::WIRED);
    assert_eq!(bench.level(WLC_EN), Level::Low);

    assert_eq!(bench.arbiter.current_use_case(), UseCase::UsbChg);
    assert_eq!(
        bench.arbiter.current_mode_value(),
        HardwareModeValue::CHGR_BUCK_ON
    );
}

#[test]
fn single_charger_vote_keeps_buck_only() {
    let mut bench = Bench::new(internal_boost_arbiter());

    bench
        .arbiter
        .cast_vote("USB", SymbolicMode::ChargerBuckOn.into())
        .expect("vote");
    let report = applied(bench.cycle());
    assert_eq!(report.to, UseCase::UsbChg);
    assert_eq!(report.mode, HardwareModeValue::BUCK_ON);

    // The confirming vote only changes the mode value, not the use case.
    bench
        .arbiter
        .cast_vote("BATT", SymbolicMode::ChargerBuckOn.into())
        .expect("vote");
    let report = applied(bench.cycle());
    assert_eq!(report.from, UseCase::UsbChg);
    assert_eq!(report.mode, HardwareModeValue::CHGR_BUCK_ON);
    assert!(!report.transited_standby);
    assert_eq!(bench.charger.mode_writes, [0x04, 0x05]);
}

#[test]
fn otg_joins_wireless_rx_and_leaves_through_standby_once() {
    let mut bench = Bench::new(internal_boost_arbiter());

    bench
        .arbiter
        .cast_vote("WLC", SymbolicMode::WlcRx.into())
        .expect("vote");
    let report = applied(bench.cycle());
    assert_eq!(report.to, UseCase::WlcRx);
    assert_eq!(bench.level(WLC_EN), Level::High);

    bench
        .arbiter
        .cast_vote("USB-OTG", SymbolicMode::OtgOn.into())
        .expect("vote");
    let report = applied(bench.cycle());
    assert_eq!(report.from, UseCase::WlcRx);
    assert_eq!(report.to, UseCase::UsbOtgWlcRx);
    assert!(
        !report.transited_standby,
        "combined OTG state is entered directly from WLC_RX"
    );
    assert_eq!(bench.level(OTG_SWITCH), Level::High);

    assert!(bench.arbiter.withdraw_vote("USB-OTG"));
    let report = applied(bench.cycle());
    assert_eq!(report.from, UseCase::UsbOtgWlcRx);
    assert_eq!(report.to, UseCase::WlcRx);
    assert!(report.transited_standby);
    assert_eq!(bench.level(OTG_SWITCH), Level::Low);

    let standby_writes = bench
        .charger
        .mode_writes
        .iter()
        .filter(|mode| **mode == HardwareModeValue::ALL_OFF.raw())
        .count();
    assert_eq!(standby_writes, 1, "expected exactly one pass through STANDBY");

    let transits = bench
        .telemetry
        .oldest_first()
        .filter(|record| matches!(record.event, TelemetryEventKind::StandbyTransit(_)))
        .count();
    assert_eq!(transits, 1);

    assert_eq!(
        bench.charger.mode_writes,
        [
            HardwareModeValue::BUCK_ON.raw(),
            HardwareModeValue::OTG_BUCK_BOOST_ON.raw(),
            HardwareModeValue::ALL_OFF.raw(),
            HardwareModeValue::BUCK_ON.raw(),
        ]
    );
    assert_eq!(bench.arbiter.current_use_case(), UseCase::WlcRx);
}

/// Drives an external-boost board into `USB_OTG_WLC_RX` with `first` cast
/// before `second`.
fn ext_boost_combined_state(first: (&str, SymbolicMode), second: (&str, SymbolicMode)) -> Bench {
    let mut bench = Bench::new(board_arbiter(full_lines(), ResolverPolicy::new(false, true)));

    bench.arbiter.cast_vote(first.0, first.1.into()).expect("vote");
    applied(bench.cycle());
    bench.arbiter.cast_vote(second.0, second.1.into()).expect("vote");
    let report = applied(bench.cycle());
    assert_eq!(report.to, UseCase::UsbOtgWlcRx);
    assert!(!report.transited_standby);
    bench
}

#[test]
fn external_boost_state_is_independent_of_entry_path() {
    let via_otg = ext_boost_combined_state(
        ("USB-OTG", SymbolicMode::OtgOn),
        ("WLC", SymbolicMode::WlcRx),
    );
    let via_rx = ext_boost_combined_state(
        ("WLC", SymbolicMode::WlcRx),
        ("USB-OTG", SymbolicMode::OtgOn),
    );

    for bench in [&via_otg, &via_rx] {
        assert_eq!(bench.level(EXT_BOOST_EN), Level::High);
        assert_eq!(bench.level(EXT_BOOST_SEL), Level::High);
        assert_eq!(bench.level(OTG_SWITCH), Level::High);
        assert_eq!(bench.level(WLC_EN), Level::High);
        // The charger's own boost must stay off while the external one drives VBUS.
        assert_eq!(bench.charger.mode(), HardwareModeValue::BUCK_ON.raw());
    }
    assert_eq!(
        via_otg.arbiter.current_mode_value(),
        via_rx.arbiter.current_mode_value()
    );
}

#[test]
fn external_boost_drops_when_otg_leaves_combined_state() {
    let mut bench = ext_boost_combined_state(
        ("WLC", SymbolicMode::WlcRx),
        ("USB-OTG", SymbolicMode::OtgOn),
    );

    assert!(bench.arbiter.withdraw_vote("USB-OTG"));
    let report = applied(bench.cycle());
    assert_eq!(report.to, UseCase::WlcRx);
    assert!(report.transited_standby);
    assert_eq!(bench.level(EXT_BOOST_EN), Level::Low);
    assert_eq!(bench.level(EXT_BOOST_SEL), Level::Low);
    assert_eq!(bench.level(OTG_SWITCH), Level::Low);
    assert_eq!(bench.charger.mode(), HardwareModeValue::BUCK_ON.raw());
}

#[test]
fn otg_against_wireless_tx_is_rejected_without_touching_hardware() {
    let mut bench = Bench::new(internal_boost_arbiter());

    bench
        .arbiter
        .cast_vote("TX", SymbolicMode::WlcTx.into())
        .expect("vote");
    let report = applied(bench.cycle());
    assert_eq!(report.to, UseCase::WlcTx);
    assert_eq!(report.mode, HardwareModeValue::BOOST_UNO_ON);
    assert_eq!(
        bench.charger.file[usize::from(regs::REVERSE_BOOST_REGISTER)],
        charger_core::sequencer::DEFAULT_REVERSE_BOOST_CODE
    );
    assert_eq!(bench.level(WLC_TX_EN), Level::High);

    let file_before = bench.charger.file;
    let writes_before = bench.charger.mode_writes.len();
    let result_before = bench.arbiter.election_result();

    bench
        .arbiter
        .cast_vote("USB-OTG", SymbolicMode::OtgOn.into())
        .expect("vote");
    let outcome = bench.cycle();
    assert_eq!(outcome, CycleOutcome::Rejected(ResolveError::OtgWithWlcTx));
    assert_eq!(
        outcome.error(),
        Some(ArbiterError::InvalidCombination(ResolveError::OtgWithWlcTx))
    );

    assert_eq!(bench.charger.file, file_before);
    assert_eq!(bench.charger.mode_writes.len(), writes_before);
    assert_eq!(bench.arbiter.election_result(), result_before);
    assert_eq!(bench.arbiter.current_use_case(), UseCase::WlcTx);
    assert_eq!(bench.level(WLC_TX_EN), Level::High);
    assert_eq!(
        bench.telemetry.latest().map(|record| record.event),
        Some(TelemetryEventKind::CombinationRejected)
    );

    // Withdrawing the conflicting vote lets the next cycle settle again.
    assert!(bench.arbiter.withdraw_vote("USB-OTG"));
    let report = applied(bench.cycle());
    assert_eq!(report.to, UseCase::WlcTx);
    assert!(!report.mode_written);
}

#[test]
fn leaving_wireless_tx_restores_receiver_after_commit() {
    let mut bench = Bench::new(internal_boost_arbiter());

    bench
        .arbiter
        .cast_vote("TX", SymbolicMode::WlcTx.into())
        .expect("vote");
    applied(bench.cycle());

    assert!(bench.arbiter.withdraw_vote("TX"));
    bench
        .arbiter
        .cast_vote("WLC", SymbolicMode::WlcRx.into())
        .expect("vote");
    let report = applied(bench.cycle());

    assert_eq!(report.from, UseCase::WlcTx);
    assert_eq!(report.to, UseCase::WlcRx);
    assert!(report.transited_standby);
    assert_eq!(report.inputs, InputMask::WIRELESS);
    assert_eq!(bench.charger.inputs(), InputMask::WIRELESS);
    assert_eq!(bench.level(WLC_TX_EN), Level::Low);
    assert_eq!(bench.level(WLC_EN), Level::High);
}
