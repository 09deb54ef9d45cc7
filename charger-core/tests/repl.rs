mod common;

use charger_core::arbiter::CycleOutcome;
use charger_core::election::{ModeRequest, SymbolicMode};
use charger_core::repl::commands::{CommandError, CommandExecutor, CommandOutcome};
use charger_core::repl::grammar::{FaultCommand, FaultPoint};
use charger_core::repl::status::StatusFormatter;
use charger_core::usecase::{HardwareModeValue, UseCase};

use common::{Bench, internal_boost_arbiter};

fn status_lines(bench: &Bench) -> [String; 3] {
    let snapshot = bench.arbiter.status();
    let formatter = StatusFormatter::new(&snapshot);
    let mut lines: [String; 3] = Default::default();
    formatter
        .write_usecase_line(&mut lines[0])
        .expect("usecase line");
    formatter
        .write_election_line(&mut lines[1])
        .expect("election line");
    formatter
        .write_device_line(&mut lines[2])
        .expect("device line");
    lines
}

#[test]
fn typed_votes_drive_the_arbiter() {
    let mut bench = Bench::new(internal_boost_arbiter());

    for line in ["vote USB charger-buck-on", "vote BATT charger-buck-on"] {
        let outcome = CommandExecutor::new(&bench.arbiter)
            .execute(line)
            .expect("vote accepted");
        assert!(outcome.needs_cycle());
    }

    assert!(matches!(bench.cycle(), CycleOutcome::Applied(_)));
    assert_eq!(bench.arbiter.current_use_case(), UseCase::UsbChg);

    let [usecase, election, device] = status_lines(&bench);
    assert_eq!(usecase, "usecase USB_CHG mode=CHGR_BUCK_ON(0x05) inputs=wired");
    assert_eq!(election, "election result=CHGR_BUCK_ON(0x05) reason=BATT votes=2");
    assert_eq!(device, "device ready=yes retry=idle");
}

#[test]
fn raw_vote_and_withdraw_round_trip() {
    let mut bench = Bench::new(internal_boost_arbiter());

    let outcome = CommandExecutor::new(&bench.arbiter)
        .execute("vote FACTORY raw=0x0c")
        .expect("raw vote accepted");
    assert_eq!(
        outcome,
        CommandOutcome::Voted {
            reason: "FACTORY",
            value: ModeRequest::Raw(HardwareModeValue::new(0x0C)),
            changed: true,
        }
    );
    assert!(matches!(bench.cycle(), CycleOutcome::Applied(_)));
    assert_eq!(bench.arbiter.current_use_case(), UseCase::Raw);

    let outcome = CommandExecutor::new(&bench.arbiter)
        .execute("withdraw FACTORY")
        .expect("withdraw accepted");
    assert!(outcome.needs_cycle());
    assert_eq!(bench.arbiter.vote_count(), 0);
    assert_eq!(bench.cycle(), CycleOutcome::Idle);
}

#[test]
fn device_suspend_is_visible_in_status() {
    let mut bench = Bench::new(internal_boost_arbiter());
    let executor = CommandExecutor::new(&bench.arbiter);

    executor.execute("device suspend").expect("suspend");
    executor.execute("vote WLC wlc-rx").expect("vote");
    assert_eq!(
        executor
            .execute("fault inject commit")
            .expect("fault command"),
        CommandOutcome::Fault(FaultCommand::Inject(FaultPoint::Commit))
    );

    assert!(bench.cycle().retry_after().is_some());
    let [usecase, _, device] = status_lines(&bench);
    assert_eq!(usecase, "usecase STANDBY mode=ALL_OFF(0x00) inputs=unset");
    assert_eq!(device, "device ready=no retry=pending");

    CommandExecutor::new(&bench.arbiter)
        .execute("device ready")
        .expect("resume");
    assert!(matches!(bench.cycle(), CycleOutcome::Applied(_)));
    assert_eq!(
        bench.arbiter.with_votes(|votes| votes[0].value),
        ModeRequest::Symbolic(SymbolicMode::WlcRx)
    );
}

#[test]
fn malformed_lines_leave_the_election_alone() {
    let bench = Bench::new(internal_boost_arbiter());
    let executor = CommandExecutor::new(&bench.arbiter);

    for line in ["vote", "vote USB", "vote USB boost-please", "withdraw", "launch"] {
        let error = executor.execute(line).expect_err("line should be rejected");
        assert!(
            matches!(error, CommandError::Parse(_)),
            "unexpected error for {line:?}: {error:?}"
        );
    }
    assert_eq!(bench.arbiter.vote_count(), 0);
    assert!(!bench.arbiter.is_dirty());
}
