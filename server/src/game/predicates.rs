//! Compatibility checks between a game and a searching client.
//! All checks are pure reads of the game's anchor and the client's request.

use super::{MatchClient, Session};
use crate::config::LevelGap;

pub fn is_pending_game(game: &dyn Session) -> bool {
    game.is_pending()
}

pub fn is_same_format(game: &dyn Session, client: &dyn MatchClient) -> bool {
    game.params() == client.params()
}

/// True only when both sides have a clan and it is the same one.
pub fn is_same_clan(game: &dyn Session, client: &dyn MatchClient) -> bool {
    match (game.anchor_clan(), client.clan()) {
        (Some(game_clan), Some(client_clan)) => game_clan == client_clan,
        _ => false,
    }
}

pub fn is_same_level(game: &dyn Session, client: &dyn MatchClient) -> bool {
    game.level() == client.player_level()
}

/// Group formats accept a candidate sitting exactly on the game's average
/// level or exactly `gap.max` above or below it.
pub fn is_range_level(game: &dyn Session, client: &dyn MatchClient, gap: LevelGap) -> bool {
    let average = i64::from(game.average_level());
    let level = i64::from(client.player_level());
    let max = i64::from(gap.max);
    level == average || level == average + max || level == average - max
}

/// The game's anchor is the opponent this client just fought.
pub fn is_same_prev_opponent(game: &dyn Session, client: &dyn MatchClient) -> bool {
    match (game.anchor(), client.last_opponent_id()) {
        (Some(anchor), Some(previous)) => anchor == previous,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityTracker;
    use crate::db::init_memory_db;
    use crate::db::models::CharacterRecord;
    use crate::game::{ChatClient, GameParams, LifecycleSink, LobbySession};
    use crate::store::SqliteKvStore;
    use std::sync::{Arc, Weak};

    struct NullSink;

    impl LifecycleSink for NullSink {
        fn notify_destroyed(&self, _game_id: crate::game::GameId) {}
        fn notify_refreshed(&self, _game_id: crate::game::GameId) {}
    }

    fn character(id: i64, level: u32, clan: Option<&str>) -> CharacterRecord {
        CharacterRecord {
            id,
            name: format!("hero-{}", id),
            level,
            clan: clan.map(str::to_string),
            health: 100.0,
            max_health: 100.0,
            light_bonus: 0.0,
            effect_bonus: 0.0,
        }
    }

    fn client(c: CharacterRecord, params: GameParams) -> Arc<ChatClient> {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        Arc::new(ChatClient::new(c, params, tx))
    }

    fn game_anchored_by(anchor: CharacterRecord, params: GameParams) -> LobbySession {
        let store = Arc::new(SqliteKvStore::new(init_memory_db().unwrap()));
        let sink: Weak<dyn LifecycleSink> = Weak::<NullSink>::new();
        let game = LobbySession::new(
            uuid::Uuid::new_v4(),
            params,
            sink,
            Arc::new(ActivityTracker::new(store)),
            None,
        );
        game.player_create(client(anchor, params));
        game
    }

    #[test]
    fn test_clan_requires_both_sides() {
        let game = game_anchored_by(character(1, 5, Some("wolves")), GameParams::single());
        let same = client(character(2, 5, Some("wolves")), GameParams::single());
        let other = client(character(3, 5, Some("bears")), GameParams::single());
        let clanless = client(character(4, 5, None), GameParams::single());
        assert!(is_same_clan(&game, same.as_ref()));
        assert!(!is_same_clan(&game, other.as_ref()));
        assert!(!is_same_clan(&game, clanless.as_ref()));

        let clanless_game = game_anchored_by(character(5, 5, None), GameParams::single());
        let clanless_peer = client(character(6, 5, None), GameParams::single());
        assert!(!is_same_clan(&clanless_game, clanless_peer.as_ref()));
    }

    #[test]
    fn test_format_and_level() {
        let game = game_anchored_by(character(1, 5, None), GameParams::single());
        assert!(is_pending_game(&game));

        let same = client(character(2, 5, None), GameParams::single());
        let higher = client(character(3, 6, None), GameParams::single());
        let teams = client(character(4, 5, None), GameParams::teams());
        assert!(is_same_format(&game, same.as_ref()));
        assert!(is_same_level(&game, same.as_ref()));
        assert!(!is_same_level(&game, higher.as_ref()));
        assert!(!is_same_format(&game, teams.as_ref()));
    }

    #[test]
    fn test_range_level_checks_exact_points() {
        let game = game_anchored_by(character(1, 10, None), GameParams::teams());
        let gap = LevelGap { min: 0, max: 2 };
        let at = |level: u32| client(character(level as i64 + 100, level, None), GameParams::teams());

        assert!(is_range_level(&game, at(10).as_ref(), gap));
        assert!(is_range_level(&game, at(12).as_ref(), gap));
        assert!(is_range_level(&game, at(8).as_ref(), gap));
        assert!(!is_range_level(&game, at(11).as_ref(), gap));
        assert!(!is_range_level(&game, at(13).as_ref(), gap));
    }

    #[test]
    fn test_prev_opponent() {
        let game = game_anchored_by(character(1, 5, None), GameParams::single());
        let rematch = client(character(2, 5, None), GameParams::single());
        rematch.set_last_opponent(1);
        let fresh = client(character(3, 5, None), GameParams::single());
        fresh.set_last_opponent(99);
        let newcomer = client(character(4, 5, None), GameParams::single());

        assert!(is_same_prev_opponent(&game, rematch.as_ref()));
        assert!(!is_same_prev_opponent(&game, fresh.as_ref()));
        assert!(!is_same_prev_opponent(&game, newcomer.as_ref()));
    }
}
