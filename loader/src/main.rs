//! chess-loader - batch driver for the chess analytics store.
//!
//! Loads players, scheduled games and finished game records from CSV into a
//! SQLite-backed store, keeping every analytic up to date as games arrive,
//! and answers read-side queries from the command line.
//!
//! Scheduled games expire 72 hours after scheduling. Expiry timers only run
//! while a `load --stay-alive` process is up; every start re-arms pending
//! schedules from their stored TTLs.

mod config;
mod csv_load;
mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use analytics::{AnalyticsService, KeyValueStore, ScheduleConfig};
use anyhow::Context;
use clap::{Parser, Subcommand};

use sqlite::{Database, SqliteStore};

type Service = AnalyticsService<SqliteStore>;

#[derive(Parser)]
#[command(name = "chess-loader", about = "Chess match analytics loader and query tool")]
struct Cli {
    /// SQLite database file (defaults to <data dir>/analytics.db).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load players, schedules and game records from CSV, in that order.
    Load {
        /// Flush the store before loading.
        #[arg(long)]
        reset: bool,
        #[arg(long)]
        players: Option<PathBuf>,
        #[arg(long)]
        schedule: Option<PathBuf>,
        #[arg(long)]
        games: Option<PathBuf>,
        /// Keep running to expire scheduled games until Ctrl-C.
        #[arg(long)]
        stay_alive: bool,
    },
    /// Withdraw a scheduled game before it is played.
    Withdraw { game_id: String },
    /// Print one read-side view.
    Query {
        #[command(subcommand)]
        view: QueryView,
    },
}

#[derive(Subcommand)]
enum QueryView {
    /// Players with the most wins.
    TopPlayers {
        #[arg(default_value_t = 10)]
        limit: usize,
    },
    /// Players with the most losses.
    BottomPlayers {
        #[arg(default_value_t = 10)]
        limit: usize,
    },
    ShortestGame,
    CheckCount { game_id: String },
    MostFrequentOpening,
    MostCommonSequence,
    LeastCommonSequence,
    /// The opening a player has used most.
    PlayerOpening { player: String },
    MatchHistory { player: String },
    ScheduledGames { player: String },
    GamesBetween { first: String, second: String },
    /// Games containing three consecutive moves.
    SearchSequence {
        m1: String,
        m2: String,
        m3: String,
        /// Only search this player's games.
        #[arg(long)]
        player: Option<String>,
    },
    FriendsOfFriends { player: String },
    StrongerFriendsOfFriends { player: String },
    LargestComponent,
    /// Whether an email is (probably) registered.
    EmailExists { email: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::fmt::format::FmtSpan;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let data_dir = config::get_data_dir();
    let db_path = cli.db.unwrap_or_else(|| config::get_db_path(&data_dir));
    tracing::info!("Using data directory: {}", data_dir.display());

    let db = Database::open(&db_path, config::db_max_connections())
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    let store = Arc::new(SqliteStore::new(&db));
    let schedule_config = ScheduleConfig {
        worker_count: config::expiry_worker_count(),
        ..ScheduleConfig::default()
    };
    let service = AnalyticsService::new(store, schedule_config);

    let result = match cli.command {
        Commands::Load {
            reset,
            players,
            schedule,
            games,
            stay_alive,
        } => {
            let inputs = LoadInputs {
                players: config::input_path(players, &data_dir, config::PLAYERS_FILE),
                schedule: config::input_path(schedule, &data_dir, config::SCHEDULE_FILE),
                games: config::input_path(games, &data_dir, config::GAME_RECORDS_FILE),
            };
            run_load(&service, reset, inputs, stay_alive).await
        }
        Commands::Withdraw { game_id } => {
            let withdrawn = service.withdraw(&game_id).await?;
            if withdrawn {
                println!("withdrawn {game_id}");
            } else {
                println!("{game_id} was not scheduled");
            }
            Ok(())
        }
        Commands::Query { view } => run_query(&service, view).await,
    };

    service.shutdown().await;
    db.close().await;
    result
}

struct LoadInputs {
    players: PathBuf,
    schedule: PathBuf,
    games: PathBuf,
}

async fn run_load(
    service: &Service,
    reset: bool,
    inputs: LoadInputs,
    stay_alive: bool,
) -> anyhow::Result<()> {
    if reset {
        tracing::info!("Resetting store");
        service.store().flush().await?;
    } else {
        service.recover_pending_schedules().await?;
    }

    if inputs.players.exists() {
        csv_load::load_players(service, &inputs.players).await?;
    } else {
        tracing::warn!(path = %inputs.players.display(), "Players file not found, skipping");
    }
    if inputs.schedule.exists() {
        csv_load::load_schedules(service, &inputs.schedule).await?;
    } else {
        tracing::warn!(path = %inputs.schedule.display(), "Schedule file not found, skipping");
    }
    if inputs.games.exists() {
        csv_load::load_games(service, &inputs.games).await?;
    } else {
        tracing::warn!(path = %inputs.games.display(), "Game records file not found, skipping");
    }

    if stay_alive {
        tracing::info!("Waiting for scheduled games to expire, press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        tracing::info!("Shutting down");
    }
    Ok(())
}

async fn run_query(service: &Service, view: QueryView) -> anyhow::Result<()> {
    let queries = service.queries();
    let graph = service.graph();

    match view {
        QueryView::TopPlayers { limit } => {
            for (rank, entry) in queries.top_players(limit).await?.iter().enumerate() {
                println!("{}. {} ({} wins)", rank + 1, entry.player_id, entry.count);
            }
        }
        QueryView::BottomPlayers { limit } => {
            for (rank, entry) in queries.bottom_players(limit).await?.iter().enumerate() {
                println!("{}. {} ({} losses)", rank + 1, entry.player_id, entry.count);
            }
        }
        QueryView::ShortestGame => match queries.shortest_game().await? {
            Some(game) => println!("{} ({} turns)", game.game_id, game.turns),
            None => println!("no games"),
        },
        QueryView::CheckCount { game_id } => match queries.check_count(&game_id).await? {
            Some(count) => println!("{count}"),
            None => println!("unknown game {game_id}"),
        },
        QueryView::MostFrequentOpening => print_counted(queries.most_frequent_opening().await?),
        QueryView::MostCommonSequence => print_counted(queries.most_common_sequence().await?),
        QueryView::LeastCommonSequence => print_counted(queries.least_common_sequence().await?),
        QueryView::PlayerOpening { player } => {
            print_counted(queries.player_most_used_opening(&player).await?)
        }
        QueryView::MatchHistory { player } => {
            for game in queries.match_history(&player).await? {
                println!(
                    "{}: {} vs {}, winner {}, {} turns, {}",
                    game.game_id,
                    game.white_player_id,
                    game.black_player_id,
                    String::from(game.winner),
                    game.turns,
                    game.opening
                );
            }
        }
        QueryView::ScheduledGames { player } => {
            for scheduled in queries.scheduled_games(&player).await? {
                println!(
                    "{}: {} vs {}",
                    scheduled.game_id, scheduled.player_1, scheduled.player_2
                );
            }
        }
        QueryView::GamesBetween { first, second } => {
            print_lines(queries.games_between(&first, &second).await?)
        }
        QueryView::SearchSequence { m1, m2, m3, player } => {
            let games = match player {
                Some(player) => {
                    queries
                        .search_sequence_in_player_games(&player, &m1, &m2, &m3)
                        .await?
                }
                None => queries.search_sequence_in_all_games(&m1, &m2, &m3).await?,
            };
            print_lines(games)
        }
        QueryView::FriendsOfFriends { player } => {
            print_lines(graph.friends_of_friends(&player).await?)
        }
        QueryView::StrongerFriendsOfFriends { player } => {
            print_lines(graph.stronger_friends_of_friends(&player).await?)
        }
        QueryView::LargestComponent => {
            println!("{}", graph.largest_connected_component().await?)
        }
        QueryView::EmailExists { email } => {
            println!("{}", service.players().email_may_exist(&email).await?)
        }
    }
    Ok(())
}

fn print_counted(value: Option<analytics::CountedValue>) {
    match value {
        Some(v) => println!("{} ({})", v.value, v.count),
        None => println!("none"),
    }
}

fn print_lines(lines: impl IntoIterator<Item = String>) {
    let mut lines: Vec<String> = lines.into_iter().collect();
    lines.sort();
    for line in lines {
        println!("{line}");
    }
}
