use serde::{Deserialize, Serialize};

/// Outcome recorded on a game. Only `White` and `Black` are decisive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Winner {
    White,
    Black,
    Draw,
    /// Any other label ("outoftime", "", ...), kept verbatim.
    Other(String),
}

impl Winner {
    pub fn is_decisive(&self) -> bool {
        matches!(self, Self::White | Self::Black)
    }
}

impl From<String> for Winner {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => Self::White,
            "black" => Self::Black,
            "draw" => Self::Draw,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for Winner {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Winner> for String {
    fn from(w: Winner) -> Self {
        match w {
            Winner::White => "white".to_string(),
            Winner::Black => "black".to_string(),
            Winner::Draw => "draw".to_string(),
            Winner::Other(s) => s,
        }
    }
}

/// A finalized game. Immutable once ingested.
///
/// The id is the key suffix of `game:<id>` and is not part of the stored body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    #[serde(skip)]
    pub game_id: String,
    #[serde(rename = "moveset")]
    pub moves: Vec<String>,
    pub winner: Winner,
    pub victory_status: String,
    #[serde(rename = "number_of_turns")]
    pub turns: u32,
    pub white_player_id: String,
    pub black_player_id: String,
    #[serde(rename = "opening_eco")]
    pub opening: String,
}

impl MatchRecord {
    /// Decode a stored body, attaching the id it was stored under.
    pub fn from_body(game_id: &str, body: &str) -> Result<Self, serde_json::Error> {
        let mut record: MatchRecord = serde_json::from_str(body)?;
        record.game_id = game_id.to_string();
        Ok(record)
    }

    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// `(winner, loser)` for decisive results.
    pub fn decisive_pair(&self) -> Option<(&str, &str)> {
        match self.winner {
            Winner::White => Some((
                self.white_player_id.as_str(),
                self.black_player_id.as_str(),
            )),
            Winner::Black => Some((
                self.black_player_id.as_str(),
                self.white_player_id.as_str(),
            )),
            _ => None,
        }
    }

    /// The other side of the board from `player`, or `None` when `player`
    /// did not take part in this game.
    pub fn opponent_of(&self, player: &str) -> Option<&str> {
        if self.white_player_id == player {
            Some(self.black_player_id.as_str())
        } else if self.black_player_id == player {
            Some(self.white_player_id.as_str())
        } else {
            None
        }
    }
}

/// A pending game commitment between two players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledMatch {
    pub game_id: String,
    pub player_1: String,
    pub player_2: String,
}

impl ScheduledMatch {
    pub fn new(
        game_id: impl Into<String>,
        player_1: impl Into<String>,
        player_2: impl Into<String>,
    ) -> Self {
        Self {
            game_id: game_id.into(),
            player_1: player_1.into(),
            player_2: player_2.into(),
        }
    }

    /// Stored body: a JSON array `[player_1, player_2]`.
    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&[&self.player_1, &self.player_2])
    }

    pub fn from_body(game_id: &str, body: &str) -> Result<Self, serde_json::Error> {
        let (player_1, player_2): (String, String) = serde_json::from_str(body)?;
        Ok(Self::new(game_id, player_1, player_2))
    }
}

/// A registered player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub user_id: String,
    pub email: String,
}

/// A player id paired with the counter a leaderboard was ranked by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedPlayer {
    pub player_id: String,
    pub count: i64,
}

/// An analytics pointer together with the counter behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedValue {
    pub value: String,
    pub count: i64,
}

/// The game with the fewest turns ingested so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortestGame {
    pub game_id: String,
    pub turns: u32,
}
