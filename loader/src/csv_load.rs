//! CSV ingestion of players, schedules and game records.
//!
//! Rows that fail to decode, and rows the analytics core rejects as bad
//! data, are logged and skipped. A store failure aborts the load.

use std::io::Read;
use std::path::Path;

use analytics::{
    AnalyticsError, AnalyticsService, KeyValueStore, MatchRecord, Player, ScheduledMatch, Winner,
};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
    #[error("malformed move list: {0}")]
    MalformedMoveset(String),
}

/// Rows applied and rows skipped from one file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct PlayerRow {
    user_id: String,
    email: String,
}

#[derive(Debug, Deserialize)]
struct ScheduleRow {
    game_id: String,
    player_1: String,
    player_2: String,
}

#[derive(Debug, Deserialize)]
struct GameRow {
    game_id: String,
    moveset: String,
    winner: String,
    victory_status: String,
    number_of_turns: u32,
    white_player_id: String,
    black_player_id: String,
    opening_eco: String,
}

impl GameRow {
    fn into_record(self) -> Result<MatchRecord, LoadError> {
        Ok(MatchRecord {
            moves: parse_moveset(&self.moveset)?,
            game_id: self.game_id,
            winner: Winner::from(self.winner),
            victory_status: self.victory_status,
            turns: self.number_of_turns,
            white_player_id: self.white_player_id,
            black_player_id: self.black_player_id,
            opening: self.opening_eco,
        })
    }
}

/// Parse a move list written either as a bracketed list literal
/// (`['e4', 'e5']`) or as whitespace-separated tokens (`e4 e5`).
pub fn parse_moveset(raw: &str) -> Result<Vec<String>, LoadError> {
    let raw = raw.trim();
    let Some(inner) = raw.strip_prefix('[') else {
        return Ok(raw.split_whitespace().map(str::to_string).collect());
    };
    let inner = inner
        .strip_suffix(']')
        .ok_or_else(|| LoadError::MalformedMoveset(raw.to_string()))?;
    if inner.trim().is_empty() {
        return Ok(vec![]);
    }

    inner
        .split(',')
        .map(|item| {
            let item = item.trim();
            let unquoted = ['\'', '"']
                .iter()
                .find_map(|q| item.strip_prefix(*q).and_then(|s| s.strip_suffix(*q)))
                .unwrap_or(item);
            if unquoted.is_empty() || unquoted.contains(char::is_whitespace) {
                Err(LoadError::MalformedMoveset(raw.to_string()))
            } else {
                Ok(unquoted.to_string())
            }
        })
        .collect()
}

/// Skip data-quality rejections, propagate everything else.
fn tally(
    report: &mut LoadReport,
    row: usize,
    result: Result<(), AnalyticsError>,
) -> Result<(), LoadError> {
    match result {
        Ok(()) => report.loaded += 1,
        Err(e) if e.is_data_quality() => {
            tracing::warn!(row, "Skipping rejected row: {}", e);
            report.skipped += 1;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

pub async fn load_players<S: KeyValueStore + 'static>(
    service: &AnalyticsService<S>,
    path: &Path,
) -> Result<LoadReport, LoadError> {
    tracing::info!(path = %path.display(), "Loading players");
    let reader = csv::Reader::from_path(path)?;
    load_players_from(service, reader).await
}

pub async fn load_players_from<S: KeyValueStore + 'static, R: Read>(
    service: &AnalyticsService<S>,
    mut reader: csv::Reader<R>,
) -> Result<LoadReport, LoadError> {
    let mut report = LoadReport::default();
    for (i, row) in reader.deserialize::<PlayerRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(row = i + 1, "Skipping malformed player row: {}", e);
                report.skipped += 1;
                continue;
            }
        };
        let player = Player {
            user_id: row.user_id,
            email: row.email,
        };
        tally(&mut report, i + 1, service.register_player(&player).await)?;
    }
    tracing::info!(loaded = report.loaded, skipped = report.skipped, "Players loaded");
    Ok(report)
}

pub async fn load_schedules<S: KeyValueStore + 'static>(
    service: &AnalyticsService<S>,
    path: &Path,
) -> Result<LoadReport, LoadError> {
    tracing::info!(path = %path.display(), "Loading schedules");
    let reader = csv::Reader::from_path(path)?;
    load_schedules_from(service, reader).await
}

pub async fn load_schedules_from<S: KeyValueStore + 'static, R: Read>(
    service: &AnalyticsService<S>,
    mut reader: csv::Reader<R>,
) -> Result<LoadReport, LoadError> {
    let mut report = LoadReport::default();
    for (i, row) in reader.deserialize::<ScheduleRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(row = i + 1, "Skipping malformed schedule row: {}", e);
                report.skipped += 1;
                continue;
            }
        };
        let scheduled = ScheduledMatch::new(row.game_id, row.player_1, row.player_2);
        tally(&mut report, i + 1, service.schedule_match(&scheduled).await)?;
    }
    tracing::info!(loaded = report.loaded, skipped = report.skipped, "Schedules loaded");
    Ok(report)
}

pub async fn load_games<S: KeyValueStore + 'static>(
    service: &AnalyticsService<S>,
    path: &Path,
) -> Result<LoadReport, LoadError> {
    tracing::info!(path = %path.display(), "Loading game records");
    let reader = csv::Reader::from_path(path)?;
    load_games_from(service, reader).await
}

pub async fn load_games_from<S: KeyValueStore + 'static, R: Read>(
    service: &AnalyticsService<S>,
    mut reader: csv::Reader<R>,
) -> Result<LoadReport, LoadError> {
    let mut report = LoadReport::default();
    for (i, row) in reader.deserialize::<GameRow>().enumerate() {
        let record = match row.map_err(LoadError::from).and_then(GameRow::into_record) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(row = i + 1, "Skipping malformed game row: {}", e);
                report.skipped += 1;
                continue;
            }
        };
        let result = service.ingest(&record).await.map(|_| ());
        tally(&mut report, i + 1, result)?;
    }
    tracing::info!(loaded = report.loaded, skipped = report.skipped, "Game records loaded");
    Ok(report)
}
