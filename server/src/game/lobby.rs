//! Lifecycle-only game session.
//!
//! `LobbySession` gathers participants, starts when full and tears down on
//! cancel, leave, surrender or a finishing turn. It marks participants as
//! playing while active. Combat resolution lives in the turn payloads and is
//! not interpreted here beyond the `finished` flag.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use super::results::GameResultHandler;
use super::{
    GameFormat, GameId, GameParams, GamePhase, GameSnapshot, LifecycleSink, MatchClient,
    ParticipantSummary, Session, SessionFactory, TeamId, TurnResults,
};
use crate::activity::ActivityTracker;
use crate::db::models::PlayerId;

struct Participant {
    client: Arc<dyn MatchClient>,
    team: TeamId,
}

struct LobbyState {
    phase: GamePhase,
    participants: Vec<Participant>,
    turn: u32,
    last_results: Option<TurnResults>,
}

enum LeaveOutcome {
    Ignored,
    Refresh,
    /// Carries the leaver when the game was running, so both sides still
    /// record each other as last opponents.
    End(GamePhase, Option<Participant>),
}

pub struct LobbySession {
    id: GameId,
    params: GameParams,
    sink: Weak<dyn LifecycleSink>,
    activity: Arc<ActivityTracker>,
    results: Option<Arc<dyn GameResultHandler>>,
    state: Mutex<LobbyState>,
}

impl LobbySession {
    pub fn new(
        id: GameId,
        params: GameParams,
        sink: Weak<dyn LifecycleSink>,
        activity: Arc<ActivityTracker>,
        results: Option<Arc<dyn GameResultHandler>>,
    ) -> Self {
        Self {
            id,
            params,
            sink,
            activity,
            results,
            state: Mutex::new(LobbyState {
                phase: GamePhase::Pending,
                participants: Vec::new(),
                turn: 0,
                last_results: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LobbyState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Last turn payload accepted while active.
    pub fn last_results(&self) -> Option<TurnResults> {
        self.lock().last_results.clone()
    }

    fn team_for(&self, index: usize) -> TeamId {
        match self.params.format {
            GameFormat::Single | GameFormat::Teams => (index % 2) as TeamId,
            GameFormat::Royal => index as TeamId,
        }
    }

    fn snapshot_of(&self, state: &LobbyState) -> GameSnapshot {
        let players: Vec<ParticipantSummary> = state
            .participants
            .iter()
            .map(|p| ParticipantSummary {
                player_id: p.client.player_id(),
                name: p.client.character().map(|c| c.name),
                level: p.client.player_level(),
                team: p.team,
            })
            .collect();
        let level = players.first().map(|p| p.level).unwrap_or(0);
        let average_level = if players.is_empty() {
            0
        } else {
            let total: u64 = players.iter().map(|p| u64::from(p.level)).sum();
            (total as f64 / players.len() as f64).round() as u32
        };

        GameSnapshot {
            id: self.id,
            params: self.params,
            phase: state.phase,
            level,
            average_level,
            turn: state.turn,
            players,
        }
    }

    fn clients_of(state: &LobbyState) -> Vec<(Arc<dyn MatchClient>, TeamId)> {
        state
            .participants
            .iter()
            .map(|p| (p.client.clone(), p.team))
            .collect()
    }

    /// Transition into a terminal phase and tell everyone. `departed` is a
    /// participant already removed from the roster by the ending leave.
    fn end(&self, outcome: GamePhase, departed: Option<Participant>) {
        let (snapshot, clients) = {
            let mut state = self.lock();
            if matches!(state.phase, GamePhase::Finished | GamePhase::Cancelled) {
                return;
            }
            state.phase = outcome;
            (self.snapshot_of(&state), Self::clients_of(&state))
        };

        for (client, _) in &clients {
            self.activity.set_playing(client.player_id(), false);
        }

        if outcome == GamePhase::Finished {
            let mut roster = clients.clone();
            if let Some(p) = departed {
                roster.push((p.client, p.team));
            }
            for (client, team) in &roster {
                if let Some((opponent, _)) = roster.iter().find(|(_, t)| t != team) {
                    client.set_last_opponent(opponent.player_id());
                }
            }
            if let Some(handler) = &self.results {
                if let Err(e) = handler.on_game_finished(&snapshot) {
                    tracing::error!(game_id = %self.id, "Game result handler failed: {}", e);
                }
            }
        }

        tracing::info!(game_id = %self.id, phase = ?outcome, "Game ended");

        for (client, _) in &clients {
            client.on_game_update(&snapshot);
        }
        if let Some(sink) = self.sink.upgrade() {
            sink.notify_refreshed(self.id);
            sink.notify_destroyed(self.id);
        }
    }
}

impl Session for LobbySession {
    fn id(&self) -> GameId {
        self.id
    }

    fn params(&self) -> GameParams {
        self.params
    }

    fn phase(&self) -> GamePhase {
        self.lock().phase
    }

    fn level(&self) -> u32 {
        self.lock()
            .participants
            .first()
            .map(|p| p.client.player_level())
            .unwrap_or(0)
    }

    fn average_level(&self) -> u32 {
        let state = self.lock();
        self.snapshot_of(&state).average_level
    }

    fn anchor(&self) -> Option<PlayerId> {
        self.lock().participants.first().map(|p| p.client.player_id())
    }

    fn anchor_clan(&self) -> Option<String> {
        self.lock()
            .participants
            .first()
            .and_then(|p| p.client.clan())
    }

    fn has_player(&self, player_id: PlayerId) -> bool {
        self.lock()
            .participants
            .iter()
            .any(|p| p.client.player_id() == player_id)
    }

    fn client_ids(&self) -> Vec<PlayerId> {
        self.lock()
            .participants
            .iter()
            .map(|p| p.client.player_id())
            .collect()
    }

    fn state(&self) -> GameSnapshot {
        let state = self.lock();
        self.snapshot_of(&state)
    }

    fn player_create(&self, client: Arc<dyn MatchClient>) {
        {
            let mut state = self.lock();
            if state.phase != GamePhase::Pending || !state.participants.is_empty() {
                return;
            }
            state.participants.push(Participant { client, team: 0 });
        }
        tracing::info!(game_id = %self.id, format = ?self.params.format, "Game created");
        self.refresh();
    }

    fn player_join(&self, client: Arc<dyn MatchClient>) {
        let player_id = client.player_id();
        let started = {
            let mut state = self.lock();
            if state.phase != GamePhase::Pending
                || state.participants.len() >= self.params.players
                || state
                    .participants
                    .iter()
                    .any(|p| p.client.player_id() == player_id)
            {
                return;
            }
            let team = self.team_for(state.participants.len());
            state.participants.push(Participant { client, team });
            if state.participants.len() == self.params.players {
                state.phase = GamePhase::Active;
                Some(Self::clients_of(&state))
            } else {
                None
            }
        };

        if let Some(clients) = started {
            for (client, _) in &clients {
                self.activity.set_playing(client.player_id(), true);
            }
            tracing::info!(game_id = %self.id, players = clients.len(), "Game started");
        }
        self.refresh();
    }

    fn player_rejoin(&self, client: Arc<dyn MatchClient>) {
        let player_id = client.player_id();
        {
            let mut state = self.lock();
            let Some(slot) = state
                .participants
                .iter_mut()
                .find(|p| p.client.player_id() == player_id)
            else {
                return;
            };
            slot.client = client;
        }
        tracing::debug!(game_id = %self.id, player_id, "Player rejoined");
        self.refresh();
    }

    fn player_cancel(&self) {
        if self.phase() == GamePhase::Pending {
            self.end(GamePhase::Cancelled, None);
        }
    }

    fn player_leave(&self, player_id: PlayerId, team_id: Option<TeamId>) {
        let (outcome, was_active) = {
            let mut state = self.lock();
            let Some(index) = state.participants.iter().position(|p| {
                p.client.player_id() == player_id && team_id.map_or(true, |t| p.team == t)
            }) else {
                return;
            };
            let was_active = state.phase == GamePhase::Active;
            let outcome = match state.phase {
                GamePhase::Pending => {
                    state.participants.remove(index);
                    if state.participants.is_empty() {
                        LeaveOutcome::End(GamePhase::Cancelled, None)
                    } else {
                        LeaveOutcome::Refresh
                    }
                }
                GamePhase::Active => {
                    let leaver = state.participants.remove(index);
                    let mut teams: Vec<TeamId> = state.participants.iter().map(|p| p.team).collect();
                    teams.sort_unstable();
                    teams.dedup();
                    if teams.len() < 2 {
                        LeaveOutcome::End(GamePhase::Finished, Some(leaver))
                    } else {
                        LeaveOutcome::Refresh
                    }
                }
                GamePhase::Finished | GamePhase::Cancelled => LeaveOutcome::Ignored,
            };
            (outcome, was_active)
        };

        if was_active {
            self.activity.set_playing(player_id, false);
        }

        match outcome {
            LeaveOutcome::Ignored => {}
            LeaveOutcome::Refresh => self.refresh(),
            LeaveOutcome::End(phase, leaver) => self.end(phase, leaver),
        }
    }

    fn player_surrender(&self, player_id: PlayerId) {
        match self.phase() {
            GamePhase::Active if self.has_player(player_id) => {
                tracing::info!(game_id = %self.id, player_id, "Player surrendered");
                self.end(GamePhase::Finished, None);
            }
            GamePhase::Pending => self.player_leave(player_id, None),
            _ => {}
        }
    }

    fn player_finish_turn(&self, results: TurnResults) {
        let finished = {
            let mut state = self.lock();
            if state.phase != GamePhase::Active {
                return;
            }
            state.turn += 1;
            let finished = results
                .get("finished")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            state.last_results = Some(results);
            finished
        };

        if finished {
            self.end(GamePhase::Finished, None);
        } else {
            self.refresh();
        }
    }

    fn player_timeout(&self, player_id: PlayerId) {
        tracing::info!(game_id = %self.id, player_id, "Player timed out");
        self.player_leave(player_id, None);
    }

    fn refresh(&self) {
        let (snapshot, clients) = {
            let state = self.lock();
            (self.snapshot_of(&state), Self::clients_of(&state))
        };
        for (client, _) in &clients {
            client.on_game_update(&snapshot);
        }
        if let Some(sink) = self.sink.upgrade() {
            sink.notify_refreshed(self.id);
        }
    }
}

/// Default factory handing out `LobbySession`s.
pub struct LobbySessionFactory {
    activity: Arc<ActivityTracker>,
    results: Option<Arc<dyn GameResultHandler>>,
}

impl LobbySessionFactory {
    pub fn new(
        activity: Arc<ActivityTracker>,
        results: Option<Arc<dyn GameResultHandler>>,
    ) -> Self {
        Self { activity, results }
    }
}

impl SessionFactory for LobbySessionFactory {
    fn create(
        &self,
        id: GameId,
        params: GameParams,
        sink: Weak<dyn LifecycleSink>,
    ) -> Arc<dyn Session> {
        Arc::new(LobbySession::new(
            id,
            params,
            sink,
            self.activity.clone(),
            self.results.clone(),
        ))
    }
}
