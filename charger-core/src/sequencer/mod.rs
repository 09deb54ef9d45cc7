//! Transition sequencer.
//!
//! Drives the charger from the use case it currently occupies to the one the
//! resolver selected. Every cycle runs the same ordered steps:
//!
//! 1. program the input-select register;
//! 2. pass through standby when [`needs_standby`] says so;
//! 3. run the board's `to_usecase` hook;
//! 4. commit the mode value with one masked register update;
//! 5. run the board's `finish_usecase` hook and apply the settle inputs.
//!
//! Steps 2 to 5 are skipped when neither the use case nor the mode value
//! changed, and step 2 and 3 are skipped when only the mode value changed.

use core::fmt;

use crate::hw::{RegisterBus, RegisterError, regs};
use crate::usecase::{
    DEFAULT_SAFE_INPUTS, HardwareModeValue, InputMask, InputSelection, Resolution, UseCase,
    needs_standby,
};

pub mod hooks;

pub use hooks::{
    BoardConfig, BoardHooks, BoardLines, DEFAULT_REVERSE_BOOST_CODE, HookError,
    MAX_SEQUENCE_DELAY_MS, NoopHooks, PlatformUseCaseHooks,
};

/// One requested move between use cases.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Transition {
    pub from: UseCase,
    pub to: UseCase,
    pub mode: HardwareModeValue,
}

/// Ordered steps of a transition.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransitionStep {
    InputSelect,
    ToStandby,
    ToUseCase,
    CommitMode,
    FinishUseCase,
}

impl TransitionStep {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransitionStep::InputSelect => "input-select",
            TransitionStep::ToStandby => "to-standby",
            TransitionStep::ToUseCase => "to-usecase",
            TransitionStep::CommitMode => "commit",
            TransitionStep::FinishUseCase => "finish",
        }
    }

    /// Stable code carried by telemetry payloads.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            TransitionStep::InputSelect => 1,
            TransitionStep::ToStandby => 2,
            TransitionStep::ToUseCase => 3,
            TransitionStep::CommitMode => 4,
            TransitionStep::FinishUseCase => 5,
        }
    }
}

impl fmt::Display for TransitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Underlying failure of a faulted step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultCause {
    Register(RegisterError),
    Hook(HookError),
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultCause::Register(error) => write!(f, "register {error}"),
            FaultCause::Hook(error) => write!(f, "hook {error}"),
        }
    }
}

/// Non-transient failure of a transition step.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TransitionFault {
    pub step: TransitionStep,
    pub cause: FaultCause,
}

impl fmt::Display for TransitionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.cause)
    }
}

/// Reasons a transition stopped before completing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransitionError {
    /// The hardware asked to be retried later; state up to `step` is kept.
    RetryLater(TransitionStep),
    Fault(TransitionFault),
}

impl TransitionError {
    fn register(step: TransitionStep, error: RegisterError) -> Self {
        if error.is_transient() {
            TransitionError::RetryLater(step)
        } else {
            TransitionError::Fault(TransitionFault {
                step,
                cause: FaultCause::Register(error),
            })
        }
    }

    fn hook(step: TransitionStep, error: HookError) -> Self {
        match error {
            HookError::RetryLater => TransitionError::RetryLater(step),
            other => TransitionError::Fault(TransitionFault {
                step,
                cause: FaultCause::Hook(other),
            }),
        }
    }
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::RetryLater(step) => write!(f, "{step} asked to retry later"),
            TransitionError::Fault(fault) => fault.fmt(f),
        }
    }
}

/// Summary of a completed transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TransitionReport {
    pub from: UseCase,
    pub to: UseCase,
    pub mode: HardwareModeValue,
    /// Inputs left in place when the transition completed.
    pub inputs: InputMask,
    pub transited_standby: bool,
    /// `false` when the mode register was already correct and left alone.
    pub mode_written: bool,
}

/// Converts an [`InputMask`] into input-select register bits.
#[must_use]
pub const fn insel_bits(mask: InputMask) -> u8 {
    let mut bits = 0;
    if mask.contains(InputMask::WIRED) {
        bits |= regs::INSEL_WIRED;
    }
    if mask.contains(InputMask::WIRELESS) {
        bits |= regs::INSEL_WIRELESS;
    }
    bits
}

/// Owner of the applied hardware state.
pub struct Sequencer<H> {
    hooks: H,
    current: UseCase,
    mode: HardwareModeValue,
    inputs: Option<InputMask>,
}

impl<H> Sequencer<H>
where
    H: PlatformUseCaseHooks,
{
    /// Creates a sequencer assuming the hardware starts in standby.
    pub const fn new(hooks: H) -> Self {
        Self {
            hooks,
            current: UseCase::Standby,
            mode: HardwareModeValue::ALL_OFF,
            inputs: None,
        }
    }

    #[must_use]
    pub const fn current_use_case(&self) -> UseCase {
        self.current
    }

    #[must_use]
    pub const fn current_mode(&self) -> HardwareModeValue {
        self.mode
    }

    /// Last input selection written to hardware, if any.
    #[must_use]
    pub const fn applied_inputs(&self) -> Option<InputMask> {
        self.inputs
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Moves the hardware to `target` using `inputs` for the input switch.
    ///
    /// # Errors
    ///
    /// [`TransitionError::RetryLater`] keeps whatever completed (a finished
    /// standby transit leaves the sequencer in standby).
    /// [`TransitionError::Fault`] leaves the hardware in an unknown state; the
    /// caller is expected to run [`Sequencer::force_standby`].
    pub fn transition<B>(
        &mut self,
        regs: &mut B,
        target: Resolution,
        inputs: InputSelection,
    ) -> Result<TransitionReport, TransitionError>
    where
        B: RegisterBus,
    {
        let from = self.current;

        self.apply_inputs(regs, inputs.mask)?;

        let mut report = TransitionReport {
            from,
            to: target.use_case,
            mode: target.mode,
            inputs: inputs.mask,
            transited_standby: false,
            mode_written: false,
        };

        if from == target.use_case && self.mode == target.mode {
            if let Some(settle) = inputs.settle {
                self.apply_inputs(regs, settle)?;
                report.inputs = settle;
            }
            return Ok(report);
        }

        let transition = Transition {
            from,
            to: target.use_case,
            mode: target.mode,
        };

        if from != target.use_case {
            if needs_standby(from, target.use_case) {
                self.to_standby(regs, from)?;
                report.transited_standby = true;
            }

            self.hooks
                .to_usecase(regs, &transition)
                .map_err(|error| TransitionError::hook(TransitionStep::ToUseCase, error))?;
        }

        regs.update(regs::MODE_REGISTER, regs::MODE_MASK, target.mode.raw())
            .map_err(|error| TransitionError::register(TransitionStep::CommitMode, error))?;
        report.mode_written = true;
        self.current = target.use_case;
        self.mode = target.mode;

        self.hooks
            .finish_usecase(regs, &transition)
            .map_err(|error| TransitionError::hook(TransitionStep::FinishUseCase, error))?;

        if let Some(settle) = inputs.settle {
            self.apply_inputs(regs, settle)
                .map_err(|error| match error {
                    TransitionError::RetryLater(_) => {
                        TransitionError::RetryLater(TransitionStep::FinishUseCase)
                    }
                    TransitionError::Fault(fault) => TransitionError::Fault(TransitionFault {
                        step: TransitionStep::FinishUseCase,
                        ..fault
                    }),
                })?;
            report.inputs = settle;
        }

        Ok(report)
    }

    /// Recovery path: returns the hardware to the safe baseline.
    ///
    /// Every step is attempted even when an earlier one fails; the sequencer
    /// records standby regardless.
    ///
    /// # Errors
    ///
    /// Returns the first register error seen.
    pub fn force_standby<B>(&mut self, regs: &mut B) -> Result<(), RegisterError>
    where
        B: RegisterBus,
    {
        let mode = regs.update(
            regs::MODE_REGISTER,
            regs::MODE_MASK,
            HardwareModeValue::ALL_OFF.raw(),
        );
        self.hooks.force_safe();
        let inputs = regs.update(
            regs::INSEL_REGISTER,
            regs::INSEL_MASK,
            insel_bits(DEFAULT_SAFE_INPUTS),
        );

        self.current = UseCase::Standby;
        self.mode = HardwareModeValue::ALL_OFF;
        self.inputs = inputs.ok().map(|()| DEFAULT_SAFE_INPUTS);

        mode.and(inputs)
    }

    fn apply_inputs<B>(&mut self, regs: &mut B, mask: InputMask) -> Result<(), TransitionError>
    where
        B: RegisterBus,
    {
        regs.update(regs::INSEL_REGISTER, regs::INSEL_MASK, insel_bits(mask))
            .map_err(|error| TransitionError::register(TransitionStep::InputSelect, error))?;
        self.inputs = Some(mask);
        Ok(())
    }

    fn to_standby<B>(&mut self, regs: &mut B, from: UseCase) -> Result<(), TransitionError>
    where
        B: RegisterBus,
    {
        self.hooks
            .to_standby(regs, from)
            .map_err(|error| TransitionError::hook(TransitionStep::ToStandby, error))?;

        regs.update(
            regs::MODE_REGISTER,
            regs::MODE_MASK,
            HardwareModeValue::ALL_OFF.raw(),
        )
        .map_err(|error| TransitionError::register(TransitionStep::ToStandby, error))?;

        self.current = UseCase::Standby;
        self.mode = HardwareModeValue::ALL_OFF;
        Ok(())
    }
}
