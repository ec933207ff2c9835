//! The ordered stage ladder a project moves through.
//!
//! Every project advances series → book → chapter → scene → beat → prose →
//! editorial. The orchestrator is the only component that moves the marker,
//! and only after both quality reviews approve the stage's output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One step in the drafting progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Series,
    Book,
    Chapter,
    Scene,
    Beat,
    Prose,
    Editorial,
}

/// Error returned when parsing an unrecognized stage name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stage: {0}")]
pub struct UnknownStage(pub String);

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 7] = [
        Stage::Series,
        Stage::Book,
        Stage::Chapter,
        Stage::Scene,
        Stage::Beat,
        Stage::Prose,
        Stage::Editorial,
    ];

    /// The stage that follows this one, or `None` after editorial.
    pub fn next(self) -> Option<Stage> {
        let idx = self.index();
        Stage::ALL.get(idx + 1).copied()
    }

    /// Zero-based position in the ladder.
    pub fn index(self) -> usize {
        Stage::ALL.iter().position(|s| *s == self).expect("stage in ALL")
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Series => "series",
            Stage::Book => "book",
            Stage::Chapter => "chapter",
            Stage::Scene => "scene",
            Stage::Beat => "beat",
            Stage::Prose => "prose",
            Stage::Editorial => "editorial",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "series" => Ok(Stage::Series),
            "book" => Ok(Stage::Book),
            "chapter" => Ok(Stage::Chapter),
            "scene" => Ok(Stage::Scene),
            "beat" => Ok(Stage::Beat),
            "prose" => Ok(Stage::Prose),
            "editorial" => Ok(Stage::Editorial),
            other => Err(UnknownStage(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_totally_ordered() {
        for pair in Stage::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn next_walks_the_full_ladder() {
        let mut stage = Stage::Series;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            visited.push(next);
            stage = next;
        }
        assert_eq!(visited, Stage::ALL);
        assert_eq!(Stage::Editorial.next(), None);
    }

    #[test]
    fn display_and_from_str_roundtrip() {
        for stage in Stage::ALL {
            let parsed: Stage = stage.to_string().parse().unwrap();
            assert_eq!(parsed, stage);
        }
    }

    #[test]
    fn from_str_is_case_insensitive() {
        assert_eq!("Series".parse::<Stage>().unwrap(), Stage::Series);
        assert_eq!(" PROSE ".parse::<Stage>().unwrap(), Stage::Prose);
    }

    #[test]
    fn from_str_rejects_unknown_names() {
        let err = "epilogue".parse::<Stage>().unwrap_err();
        assert_eq!(err, UnknownStage("epilogue".to_string()));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Stage::Chapter).unwrap();
        assert_eq!(json, "\"chapter\"");
        let parsed: Stage = serde_json::from_str("\"editorial\"").unwrap();
        assert_eq!(parsed, Stage::Editorial);
    }
}
