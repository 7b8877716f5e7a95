//! Keyspace conventions shared with existing data sets.

pub const PLAYERS: &str = "players";
pub const EMAIL_FILTER: &str = "email_filter";
pub const SCHEDULED_GAMES: &str = "scheduled_games";
pub const TOP_PLAYERS: &str = "leaderboard:top_players";
pub const BOTTOM_PLAYERS: &str = "leaderboard:bottom_players";
pub const MOST_FREQUENT_OPENING: &str = "analytics:most_frequent_opening";
pub const MOST_COMMON_SEQUENCE: &str = "analytics:most_common_sequence";
pub const LEAST_COMMON_SEQUENCE: &str = "analytics:least_common_sequence";
pub const SHORTEST_GAME: &str = "analytics:shortest_game";
pub const SHORTEST_GAME_TURNS: &str = "analytics:shortest_game_turns";

pub fn player(id: &str) -> String {
    format!("player:{id}")
}

pub fn email_user(email: &str) -> String {
    format!("email_user:{email}")
}

pub fn player_games(id: &str) -> String {
    format!("player:{id}:games")
}

pub fn player_scheduled_games(id: &str) -> String {
    format!("player:{id}:scheduled_games")
}

pub fn player_openings(id: &str) -> String {
    format!("player:{id}:openings")
}

pub fn player_opening_count(id: &str, opening: &str) -> String {
    format!("player:{id}:opening:{opening}:count")
}

pub fn player_sequences(id: &str) -> String {
    format!("player:{id}:sequences")
}

pub fn player_versus(first: &str, second: &str) -> String {
    format!("player_versus:{first}:{second}")
}

pub fn game(id: &str) -> String {
    format!("game:{id}")
}

pub fn game_check_count(id: &str) -> String {
    format!("game:{id}:analytics:check_count")
}

pub fn scheduled_game(id: &str) -> String {
    format!("scheduled_game:{id}")
}

pub fn wins(player: &str) -> String {
    format!("leaderboard:wins:{player}")
}

pub fn losses(player: &str) -> String {
    format!("leaderboard:losses:{player}")
}

pub fn opening(code: &str) -> String {
    format!("opening:{code}")
}

pub fn sequence(sequence: &str) -> String {
    format!("sequence:{sequence}")
}

pub fn sequence_games(sequence: &str) -> String {
    format!("sequence:{sequence}:games")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(player_games("alice"), "player:alice:games");
        assert_eq!(player_versus("a", "b"), "player_versus:a:b");
        assert_eq!(game_check_count("g1"), "game:g1:analytics:check_count");
        assert_eq!(sequence_games("e4>e5>Nf3"), "sequence:e4>e5>Nf3:games");
        assert_eq!(
            player_opening_count("bob", "C20"),
            "player:bob:opening:C20:count"
        );
    }
}
