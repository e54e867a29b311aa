//! Performer action vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of things the performer can do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Talk,
    React,
    Game,
    #[serde(rename = "q_and_a")]
    QAndA,
    Idle,
}

impl Action {
    /// The full default action set
    pub const ALL: [Action; 5] = [
        Action::Talk,
        Action::React,
        Action::Game,
        Action::QAndA,
        Action::Idle,
    ];

    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Talk => "talk",
            Action::React => "react",
            Action::Game => "game",
            Action::QAndA => "q_and_a",
            Action::Idle => "idle",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| crate::Error::Bandit(format!("unknown action: {}", s)))
    }
}
