use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    SwitchToSource,
    Approve,
    Deposit,
    ConfirmSettlement,
    SwitchToDestination,
    /// Caller-supplied step; carries its id, 6 or above.
    Additional(u8),
}

impl Step {
    pub const BUILT_IN: [Step; 5] = [
        Step::SwitchToSource,
        Step::Approve,
        Step::Deposit,
        Step::ConfirmSettlement,
        Step::SwitchToDestination,
    ];

    /// 1-based position in the flow.
    pub fn id(self) -> u8 {
        match self {
            Step::SwitchToSource => 1,
            Step::Approve => 2,
            Step::Deposit => 3,
            Step::ConfirmSettlement => 4,
            Step::SwitchToDestination => 5,
            Step::Additional(id) => id,
        }
    }

    pub fn from_id(id: u8) -> Option<Step> {
        match id {
            0 => None,
            1..=5 => Step::BUILT_IN.into_iter().find(|s| s.id() == id),
            _ => Some(Step::Additional(id)),
        }
    }

    /// The caller-supplied step at `index` in registration order.
    pub fn additional(index: usize) -> Step {
        let id = u8::try_from(index + 6).unwrap_or(u8::MAX);
        Step::Additional(id)
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::SwitchToSource => "Connecting to Base",
            Step::Approve => "Approving token spend",
            Step::Deposit => "Executing deposit transaction",
            Step::ConfirmSettlement => "Confirming completion",
            Step::SwitchToDestination => "Connecting to Sapphire",
            Step::Additional(_) => "Additional step",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.id(), self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StepStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Processing => "processing",
            StepStatus::Completed => "completed",
            StepStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaEvent {
    /// A new run begins with these additional step labels; statuses and error from
    /// the previous run are dropped.
    Started(Vec<String>),
    StepStarted(Step),
    StepCompleted(Step),
    /// The step in progress failed with this message.
    Failed(String),
    Finished,
    Reset,
}

/// Progress of one saga run. Only changes through [`SagaState::transition`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SagaState {
    statuses: BTreeMap<Step, StepStatus>,
    current_step: Option<Step>,
    error: Option<String>,
    running: bool,
    additional: Vec<String>,
}

impl SagaState {
    pub fn status(&self, step: Step) -> StepStatus {
        self.statuses.get(&step).copied().unwrap_or_default()
    }

    pub fn steps(&self) -> impl Iterator<Item = Step> + '_ {
        let additional = (0..self.additional.len()).map(Step::additional);
        Step::BUILT_IN.into_iter().chain(additional)
    }

    pub fn statuses(&self) -> impl Iterator<Item = (Step, StepStatus)> + '_ {
        self.steps().map(|s| (s, self.status(s)))
    }

    pub fn label(&self, step: Step) -> &str {
        match step {
            Step::Additional(id) => self
                .additional
                .get(usize::from(id).saturating_sub(6))
                .map(String::as_str)
                .unwrap_or(step.label()),
            _ => step.label(),
        }
    }

    /// The last step that started. Kept after a failure so the failed step stays visible.
    pub fn current_step(&self) -> Option<Step> {
        self.current_step
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn transition(&mut self, event: SagaEvent) {
        match event {
            SagaEvent::Started(additional) => {
                *self = SagaState {
                    running: true,
                    additional,
                    ..SagaState::default()
                };
            }
            SagaEvent::StepStarted(step) => {
                self.current_step = Some(step);
                self.statuses.insert(step, StepStatus::Processing);
            }
            SagaEvent::StepCompleted(step) => {
                self.statuses.insert(step, StepStatus::Completed);
            }
            SagaEvent::Finished => self.running = false,
            SagaEvent::Failed(message) => {
                if let Some(step) = self.current_step {
                    self.statuses.insert(step, StepStatus::Error);
                }
                self.error = Some(message);
                self.running = false;
            }
            SagaEvent::Reset => {
                *self = SagaState {
                    additional: std::mem::take(&mut self.additional),
                    ..SagaState::default()
                };
            }
        }
    }
}
