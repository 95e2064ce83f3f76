//! Wait Predicates
//!
//! Canonical conditions evaluated by the [`crate::wait::Poller`]. Each one
//! inspects the current matches of a locator and answers Ready or not yet.
//!
//! ## Toyota Way Application
//!
//! - **Jidoka**: a predicate never waits on its own; the poller owns time
//! - **Poka-Yoke**: state a predicate carries lives in `Condition::State`,
//!   created fresh for every poll invocation

use crate::driver::ElementHandle;
use crate::locator::Point;
use crate::wait::{Condition, PollOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-axis displacement (pixels) below which an element counts as still
pub const STABILITY_THRESHOLD_PX: u32 = 5;

/// Consecutive still comparisons required before an element counts as stable
pub const STABLE_COMPARISONS_REQUIRED: u32 = 2;

const NO_ELEMENTS: &str = "no elements found";

/// Which predicate a wait was for; its `Display` is the timeout phrase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionKind {
    /// At least one match
    Present,
    /// A displayed match
    Visible,
    /// A displayed and enabled match
    Clickable,
    /// First match stopped moving
    NotMoving,
    /// First match's effective text contains the target
    ContainsText(String),
    /// No match at all
    Absent,
    /// No displayed match
    NotVisible,
    /// Caller-defined condition
    Custom(String),
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "is not present"),
            Self::Visible => write!(f, "is not visible"),
            Self::Clickable => write!(f, "is not clickable"),
            Self::NotMoving => write!(f, "did not stop moving"),
            Self::ContainsText(text) => write!(f, "did not contain text {text:?}"),
            Self::Absent => write!(f, "is still present"),
            Self::NotVisible => write!(f, "is still visible"),
            Self::Custom(description) => write!(f, "did not satisfy {description}"),
        }
    }
}

// =============================================================================
// PRESENCE
// =============================================================================

/// Ready with the first match
#[derive(Debug, Clone, Copy, Default)]
pub struct Present;

impl Condition for Present {
    type Output = ElementHandle;
    type State = ();

    fn kind(&self) -> ConditionKind {
        ConditionKind::Present
    }

    fn evaluate(&self, _state: &mut (), children: Vec<ElementHandle>) -> PollOutcome<ElementHandle> {
        children
            .into_iter()
            .next()
            .map_or_else(|| PollOutcome::not_yet(NO_ELEMENTS), PollOutcome::Ready)
    }
}

/// Ready once nothing matches
#[derive(Debug, Clone, Copy, Default)]
pub struct Absent;

impl Condition for Absent {
    type Output = ();
    type State = ();

    fn kind(&self) -> ConditionKind {
        ConditionKind::Absent
    }

    fn evaluate(&self, _state: &mut (), children: Vec<ElementHandle>) -> PollOutcome<()> {
        if children.is_empty() {
            PollOutcome::Ready(())
        } else {
            PollOutcome::not_yet(format!("{} element(s) still present", children.len()))
        }
    }
}

// =============================================================================
// VISIBILITY
// =============================================================================

/// Ready with the first displayed match
#[derive(Debug, Clone, Copy, Default)]
pub struct Visible;

impl Condition for Visible {
    type Output = ElementHandle;
    type State = ();

    fn kind(&self) -> ConditionKind {
        ConditionKind::Visible
    }

    fn evaluate(&self, _state: &mut (), children: Vec<ElementHandle>) -> PollOutcome<ElementHandle> {
        first_matching(children, ElementHandle::is_displayed, "not displayed yet")
    }
}

/// Ready with the first displayed and enabled match
#[derive(Debug, Clone, Copy, Default)]
pub struct Clickable;

impl Condition for Clickable {
    type Output = ElementHandle;
    type State = ();

    fn kind(&self) -> ConditionKind {
        ConditionKind::Clickable
    }

    fn evaluate(&self, _state: &mut (), children: Vec<ElementHandle>) -> PollOutcome<ElementHandle> {
        first_matching(children, ElementHandle::is_clickable, "not clickable yet")
    }
}

/// Ready once no match is displayed
#[derive(Debug, Clone, Copy, Default)]
pub struct NotVisible;

impl Condition for NotVisible {
    type Output = ();
    type State = ();

    fn kind(&self) -> ConditionKind {
        ConditionKind::NotVisible
    }

    fn evaluate(&self, _state: &mut (), children: Vec<ElementHandle>) -> PollOutcome<()> {
        match children.iter().find(|el| el.is_displayed()) {
            None => PollOutcome::Ready(()),
            Some(el) => PollOutcome::not_yet(format!("element {} is displayed", el.id)),
        }
    }
}

fn first_matching(
    children: Vec<ElementHandle>,
    check: fn(&ElementHandle) -> bool,
    reason: &str,
) -> PollOutcome<ElementHandle> {
    if children.is_empty() {
        return PollOutcome::not_yet(NO_ELEMENTS);
    }
    let count = children.len();
    children
        .into_iter()
        .find(|el| check(el))
        .map_or_else(
            || PollOutcome::not_yet(format!("{count} element(s) found, {reason}")),
            PollOutcome::Ready,
        )
}

// =============================================================================
// STABILITY
// =============================================================================

/// Position history carried through one poll invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StabilityState {
    /// Position seen on the previous sample
    pub previous: Option<Point>,
    /// Consecutive comparisons under the threshold
    pub still_comparisons: u32,
}

/// Ready when the first match holds its position across consecutive samples
#[derive(Debug, Clone, Copy, Default)]
pub struct NotMoving;

impl Condition for NotMoving {
    type Output = ElementHandle;
    type State = StabilityState;

    fn kind(&self) -> ConditionKind {
        ConditionKind::NotMoving
    }

    fn evaluate(
        &self,
        state: &mut StabilityState,
        children: Vec<ElementHandle>,
    ) -> PollOutcome<ElementHandle> {
        let Some(current) = children.into_iter().next() else {
            return PollOutcome::not_yet(NO_ELEMENTS);
        };
        let Some(previous) = state.previous.replace(current.location) else {
            return PollOutcome::not_yet(format!("first sample at {}", current.location));
        };

        let (dx, dy) = previous.displacement(&current.location);
        if dx < STABILITY_THRESHOLD_PX && dy < STABILITY_THRESHOLD_PX {
            state.still_comparisons += 1;
        } else {
            state.still_comparisons = 0;
            return PollOutcome::not_yet(format!(
                "moved from {previous} to {}",
                current.location
            ));
        }

        if state.still_comparisons >= STABLE_COMPARISONS_REQUIRED {
            PollOutcome::Ready(current)
        } else {
            PollOutcome::not_yet(format!("settling at {}", current.location))
        }
    }
}

// =============================================================================
// TEXT
// =============================================================================

/// Ready when the first match's effective text contains `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainsText {
    target: String,
}

impl ContainsText {
    /// Wait for `target` to appear
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Condition for ContainsText {
    type Output = ElementHandle;
    type State = ();

    fn kind(&self) -> ConditionKind {
        ConditionKind::ContainsText(self.target.clone())
    }

    fn evaluate(&self, _state: &mut (), children: Vec<ElementHandle>) -> PollOutcome<ElementHandle> {
        let Some(first) = children.into_iter().next() else {
            return PollOutcome::not_yet(NO_ELEMENTS);
        };
        if first.effective_text().contains(&self.target) {
            PollOutcome::Ready(first)
        } else {
            PollOutcome::not_yet(format!("text is {:?}", first.effective_text()))
        }
    }
}
