//! Per-role step indicators shown under the startup progress bar.

use serde::Serialize;
use shared::domain::{Phase, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    InProgress,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepIndicator {
    pub label: &'static str,
    pub state: StepState,
}

const HOST_STEPS: &[(&str, &[Phase])] = &[
    ("Room Scan", &[Phase::CheckingRoomScan, Phase::PromptingRoomScan]),
    ("Session", &[Phase::CreatingSession, Phase::WaitingForColocation]),
    ("Share Room", &[Phase::SharingRoomMesh]),
    ("Ready", &[Phase::Ready]),
];

const JOINER_STEPS: &[(&str, &[Phase])] = &[
    ("Join", &[Phase::JoiningSession]),
    ("Find Anchor", &[Phase::WaitingForAnchor]),
    ("Align", &[Phase::LocalizingAnchor]),
    ("Load Room", &[Phase::LoadingRoomMesh]),
    ("Ready", &[Phase::Ready]),
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepIndicators {
    role: Option<Role>,
    steps: Vec<StepIndicator>,
}

impl StepIndicators {
    pub fn for_role(role: Role) -> Self {
        let steps = table(role)
            .iter()
            .map(|(label, _)| StepIndicator {
                label: *label,
                state: StepState::Pending,
            })
            .collect();
        Self {
            role: Some(role),
            steps,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn steps(&self) -> &[StepIndicator] {
        &self.steps
    }

    /// Recomputes every indicator for `phase`. In `Error`, `failed_phase` marks the failing step.
    pub fn update(&mut self, phase: Phase, failed_phase: Option<Phase>) {
        let Some(role) = self.role else {
            return;
        };
        let (current, current_state) = match phase {
            Phase::Ready => (self.steps.len(), StepState::Completed),
            Phase::Error => match failed_phase.and_then(|failed| step_index(role, failed)) {
                Some(index) => (index, StepState::Error),
                None => return,
            },
            other => match step_index(role, other) {
                Some(index) => (index, StepState::InProgress),
                None => return,
            },
        };

        for (index, step) in self.steps.iter_mut().enumerate() {
            step.state = if index < current {
                StepState::Completed
            } else if index == current {
                current_state
            } else {
                StepState::Pending
            };
        }
    }
}

fn table(role: Role) -> &'static [(&'static str, &'static [Phase])] {
    match role {
        Role::Host => HOST_STEPS,
        Role::Joiner => JOINER_STEPS,
    }
}

fn step_index(role: Role, phase: Phase) -> Option<usize> {
    table(role)
        .iter()
        .position(|(_, phases)| phases.contains(&phase))
}
