//! Back/forward navigation affordance.
//!
//! Re-evaluated on every finished navigation. The outcome decides whether
//! the navigation bar is attached to the view hierarchy and which of the
//! two mutually exclusive bottom anchors the content uses.
//!
//! | policy | history         | affordance | state  | anchor           |
//! |--------|-----------------|------------|--------|------------------|
//! | Never  | any             | any        | Hidden | ContainerBottom  |
//! | Auto   | nothing         | any        | Hidden | ContainerBottom  |
//! | Auto   | back or forward | Default    | Shown  | AffordanceTop    |
//! | Auto   | back or forward | Custom     | Shown  | ContainerBottom  |
//! | Always | any             | Default    | Shown  | AffordanceTop    |
//! | Always | any             | Custom     | Shown  | ContainerBottom  |

use std::collections::BTreeSet;

use miniapp_common::{NavBarVisibility, NavigationAction};
use tracing::debug;

use crate::surface::HistoryState;

/// Receives the allowed navigation actions after every transition.
pub trait NavigationDelegate: Send + Sync {
    fn on_capability_changed(&self, actions: &BTreeSet<NavigationAction>);
}

/// Which directions the affordance offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capability {
    pub back: bool,
    pub forward: bool,
}

impl Capability {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn both() -> Self {
        Self {
            back: true,
            forward: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.back && !self.forward
    }

    pub fn actions(&self) -> BTreeSet<NavigationAction> {
        let mut actions = BTreeSet::new();
        if self.back {
            actions.insert(NavigationAction::Back);
        }
        if self.forward {
            actions.insert(NavigationAction::Forward);
        }
        actions
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffordanceState {
    Hidden,
    Shown(Capability),
}

/// Bottom constraint of the content area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutAnchor {
    /// Content fills to the container bottom.
    ContainerBottom,
    /// Content bottom sits on the affordance's top edge.
    AffordanceTop,
}

/// Built-in bar, or a host-supplied view that places itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AffordanceKind {
    Default,
    Custom,
}

/// Whether the affordance is in the view hierarchy, and the active anchor.
///
/// Holding a single anchor value makes "exactly one anchor active" hold by
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationBarAttachment {
    pub attached: bool,
    pub anchor: LayoutAnchor,
}

impl NavigationBarAttachment {
    pub fn detached() -> Self {
        Self {
            attached: false,
            anchor: LayoutAnchor::ContainerBottom,
        }
    }

    pub fn is_active(&self, anchor: LayoutAnchor) -> bool {
        self.anchor == anchor
    }
}

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: AffordanceState,
    pub attachment: NavigationBarAttachment,
    /// Sent to the navigation delegate. Computed from history and the
    /// `Always` override, even when the policy keeps the bar hidden.
    pub actions: BTreeSet<NavigationAction>,
}

/// Pure transition function.
pub fn evaluate(
    policy: NavBarVisibility,
    kind: AffordanceKind,
    history: HistoryState,
) -> Transition {
    let always = policy == NavBarVisibility::Always;
    let capability = Capability {
        back: history.can_go_back || always,
        forward: history.can_go_forward || always,
    };

    let state = if policy == NavBarVisibility::Never || capability.is_empty() {
        AffordanceState::Hidden
    } else {
        AffordanceState::Shown(capability)
    };

    let attachment = match (state, kind) {
        (AffordanceState::Hidden, _) => NavigationBarAttachment::detached(),
        (AffordanceState::Shown(_), AffordanceKind::Default) => NavigationBarAttachment {
            attached: true,
            anchor: LayoutAnchor::AffordanceTop,
        },
        (AffordanceState::Shown(_), AffordanceKind::Custom) => NavigationBarAttachment {
            attached: true,
            anchor: LayoutAnchor::ContainerBottom,
        },
    };

    Transition {
        state,
        attachment,
        actions: capability.actions(),
    }
}

pub struct NavigationAffordanceStateMachine {
    policy: NavBarVisibility,
    kind: AffordanceKind,
    state: AffordanceState,
    attachment: NavigationBarAttachment,
}

impl NavigationAffordanceStateMachine {
    /// Starts `Hidden` with the content anchored to the container bottom.
    pub fn new(policy: NavBarVisibility, kind: AffordanceKind) -> Self {
        Self {
            policy,
            kind,
            state: AffordanceState::Hidden,
            attachment: NavigationBarAttachment::detached(),
        }
    }

    pub fn policy(&self) -> NavBarVisibility {
        self.policy
    }

    pub fn kind(&self) -> AffordanceKind {
        self.kind
    }

    pub fn state(&self) -> AffordanceState {
        self.state
    }

    pub fn attachment(&self) -> NavigationBarAttachment {
        self.attachment
    }

    /// Apply a finished navigation.
    pub fn on_navigation_finished(&mut self, history: HistoryState) -> Transition {
        let transition = evaluate(self.policy, self.kind, history);
        if transition.state != self.state {
            debug!(from = ?self.state, to = ?transition.state, "navigation affordance transition");
        }
        self.state = transition.state;
        self.attachment = transition.attachment;
        transition
    }
}
