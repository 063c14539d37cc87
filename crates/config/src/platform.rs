use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// AI coding tools that skills can be installed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Claude,
    Cursor,
    Codex,
    Copilot,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Claude,
        Platform::Cursor,
        Platform::Codex,
        Platform::Copilot,
    ];

    /// Name of the tool's config directory, relative to home or a project root.
    pub fn config_dir_name(self) -> &'static str {
        match self {
            Self::Claude => ".claude",
            Self::Cursor => ".cursor",
            Self::Codex => ".codex",
            Self::Copilot => ".copilot",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Cursor => "cursor",
            Self::Codex => "codex",
            Self::Copilot => "copilot",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!("unknown platform '{wanted}' (expected claude, cursor, codex, or copilot)")
            })
    }
}
