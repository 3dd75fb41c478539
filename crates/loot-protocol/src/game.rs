//! Supported game identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Games the engine can evaluate load orders for.
///
/// The string forms are the identifiers accepted by the `init` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameId {
    Oblivion,
    Skyrim,
    SkyrimSe,
    SkyrimVr,
    Fallout3,
    FalloutNv,
    Fallout4,
    Fallout4Vr,
}

impl GameId {
    /// All supported games.
    pub const ALL: [GameId; 8] = [
        GameId::Oblivion,
        GameId::Skyrim,
        GameId::SkyrimSe,
        GameId::SkyrimVr,
        GameId::Fallout3,
        GameId::FalloutNv,
        GameId::Fallout4,
        GameId::Fallout4Vr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameId::Oblivion => "oblivion",
            GameId::Skyrim => "skyrim",
            GameId::SkyrimSe => "skyrimse",
            GameId::SkyrimVr => "skyrimvr",
            GameId::Fallout3 => "fallout3",
            GameId::FalloutNv => "falloutnv",
            GameId::Fallout4 => "fallout4",
            GameId::Fallout4Vr => "fallout4vr",
        }
    }

    /// Master file that is always first in the load order.
    pub fn master_file(&self) -> &'static str {
        match self {
            GameId::Oblivion => "Oblivion.esm",
            GameId::Skyrim | GameId::SkyrimSe | GameId::SkyrimVr => "Skyrim.esm",
            GameId::Fallout3 => "Fallout3.esm",
            GameId::FalloutNv => "FalloutNV.esm",
            GameId::Fallout4 | GameId::Fallout4Vr => "Fallout4.esm",
        }
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a game identifier is not in the supported set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("game not supported: {0}")]
pub struct UnsupportedGame(pub String);

impl FromStr for GameId {
    type Err = UnsupportedGame;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameId::ALL
            .into_iter()
            .find(|game| game.as_str() == s)
            .ok_or_else(|| UnsupportedGame(s.to_string()))
    }
}
