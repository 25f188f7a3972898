use shared::domain::{Role, SessionName};

/// Why an intent had no effect. These come from UI races, not real failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    AlreadyResolved,
    /// Role selection has not opened yet.
    NotOpen,
    /// A transport-started session cannot stand in for the human's choice.
    AwaitingHumanChoice,
    NotInError,
    HostOnly,
    NotPromptingForScan,
    ScanAlreadyRunning,
    NothingToCancel,
    AlreadyComplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChoice {
    pub role: Role,
    pub session_name: Option<SessionName>,
    /// The transport already started this session; creating or joining it again is skipped.
    pub adopted_session: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Resolved(RoleChoice),
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Closed,
    Open,
    Resolved(Role),
}

/// One-shot resolution of the host-or-join decision for a startup attempt.
#[derive(Debug, Clone)]
pub struct RoleIntentGate {
    require_role_selection: bool,
    state: GateState,
}

impl RoleIntentGate {
    pub fn new(require_role_selection: bool) -> Self {
        Self {
            require_role_selection,
            state: GateState::Closed,
        }
    }

    pub fn open(&mut self) {
        if self.state == GateState::Closed {
            self.state = GateState::Open;
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == GateState::Open
    }

    pub fn resolved_role(&self) -> Option<Role> {
        match self.state {
            GateState::Resolved(role) => Some(role),
            GateState::Closed | GateState::Open => None,
        }
    }

    pub fn choose_host(&mut self) -> GateDecision {
        self.resolve_human(Role::Host, None)
    }

    pub fn choose_join(&mut self, session_name: SessionName) -> GateDecision {
        self.resolve_human(Role::Joiner, Some(session_name))
    }

    /// The transport signalled it started (or joined) a session on its own. This only resolves
    /// the role when role selection is disabled; the master becomes the host.
    pub fn transport_session_started(
        &mut self,
        session_name: SessionName,
        is_master: bool,
    ) -> GateDecision {
        if let GateState::Resolved(_) = self.state {
            return GateDecision::Ignored(IgnoreReason::AlreadyResolved);
        }
        if self.require_role_selection {
            return GateDecision::Ignored(IgnoreReason::AwaitingHumanChoice);
        }

        let role = if is_master { Role::Host } else { Role::Joiner };
        self.state = GateState::Resolved(role);
        GateDecision::Resolved(RoleChoice {
            role,
            session_name: Some(session_name),
            adopted_session: true,
        })
    }

    /// Closes the gate for a fresh attempt.
    pub fn reset(&mut self) {
        self.state = GateState::Closed;
    }

    fn resolve_human(&mut self, role: Role, session_name: Option<SessionName>) -> GateDecision {
        match self.state {
            GateState::Resolved(_) => GateDecision::Ignored(IgnoreReason::AlreadyResolved),
            GateState::Closed => GateDecision::Ignored(IgnoreReason::NotOpen),
            GateState::Open => {
                self.state = GateState::Resolved(role);
                GateDecision::Resolved(RoleChoice {
                    role,
                    session_name,
                    adopted_session: false,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> SessionName {
        SessionName::new(raw).expect("session name")
    }

    #[test]
    fn first_choice_wins() {
        let mut gate = RoleIntentGate::new(true);
        gate.open();

        assert!(matches!(
            gate.choose_host(),
            GateDecision::Resolved(RoleChoice { role: Role::Host, .. })
        ));
        assert_eq!(
            gate.choose_join(name("Game_AB12")),
            GateDecision::Ignored(IgnoreReason::AlreadyResolved)
        );
        assert_eq!(
            gate.choose_host(),
            GateDecision::Ignored(IgnoreReason::AlreadyResolved)
        );
        assert_eq!(gate.resolved_role(), Some(Role::Host));
    }

    #[test]
    fn join_carries_session_name() {
        let mut gate = RoleIntentGate::new(true);
        gate.open();

        let GateDecision::Resolved(choice) = gate.choose_join(name("Game_AB12")) else {
            panic!("join should resolve");
        };
        assert_eq!(choice.role, Role::Joiner);
        assert_eq!(choice.session_name, Some(name("Game_AB12")));
        assert!(!choice.adopted_session);
    }

    #[test]
    fn choices_before_opening_are_ignored() {
        let mut gate = RoleIntentGate::new(true);
        assert_eq!(
            gate.choose_host(),
            GateDecision::Ignored(IgnoreReason::NotOpen)
        );
        assert!(!gate.is_open());
    }

    #[test]
    fn transport_start_waits_for_human_when_selection_required() {
        let mut gate = RoleIntentGate::new(true);
        gate.open();

        assert_eq!(
            gate.transport_session_started(name("Game_AB12"), true),
            GateDecision::Ignored(IgnoreReason::AwaitingHumanChoice)
        );
        assert!(gate.is_open());
        assert!(matches!(gate.choose_host(), GateDecision::Resolved(_)));
    }

    #[test]
    fn transport_start_resolves_when_selection_disabled() {
        let mut gate = RoleIntentGate::new(false);

        let GateDecision::Resolved(choice) =
            gate.transport_session_started(name("Game_AB12"), false)
        else {
            panic!("legacy path should resolve");
        };
        assert_eq!(choice.role, Role::Joiner);
        assert!(choice.adopted_session);
        assert_eq!(
            gate.choose_host(),
            GateDecision::Ignored(IgnoreReason::AlreadyResolved)
        );
    }

    #[test]
    fn reset_allows_a_new_choice() {
        let mut gate = RoleIntentGate::new(true);
        gate.open();
        gate.choose_host();

        gate.reset();
        gate.open();
        assert!(matches!(
            gate.choose_join(name("Game_AB12")),
            GateDecision::Resolved(RoleChoice { role: Role::Joiner, .. })
        ));
    }
}
