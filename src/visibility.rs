//! Visibility state machine.
//!
//! While the dashboard is hidden the raw chart goes stale. Becoming visible
//! again is the only transition with an effect: the dashboard clears the raw
//! and peak series and re-seeds from a fresh fetch. Hiding tears nothing down.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Hidden,
    Visible,
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hidden" | "hide" => Ok(Visibility::Hidden),
            "visible" | "show" => Ok(Visibility::Visible),
            other => Err(format!("unknown visibility state {:?}", other)),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Hidden => write!(f, "hidden"),
            Visibility::Visible => write!(f, "visible"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisibilityController {
    state: Visibility,
}

impl VisibilityController {
    pub fn new(initial: Visibility) -> Self {
        Self { state: initial }
    }

    pub fn state(&self) -> Visibility {
        self.state
    }

    /// Record what the host reports. Returns `true` on a hidden → visible transition.
    pub fn observe(&mut self, next: Visibility) -> bool {
        let regained = self.state == Visibility::Hidden && next == Visibility::Visible;
        self.state = next;
        regained
    }
}
