use rand::seq::SliceRandom;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use uuid::Uuid;
use wordwolf_protocol::*;

pub type Tx = UnboundedSender<ServerToClient>;

pub struct Player {
    pub id: Uuid,
    /// Opaque client-held token. Falls back to the connection id when the
    /// client did not supply one.
    pub session_id: String,
    pub name: String,
    pub role: Option<Role>,
    pub word: Option<String>,
    pub has_asked: bool,
    pub has_answered: bool,
    pub is_connected: bool,
    pub tx: Tx,
}

impl Player {
    pub fn new(id: Uuid, session_id: String, name: String, tx: Tx) -> Self {
        Player {
            id,
            session_id,
            name,
            role: None,
            word: None,
            has_asked: false,
            has_answered: false,
            is_connected: true,
            tx,
        }
    }
}

/// An ordered ballot box. Insertion order is observable: the tie-break
/// rule picks the first target (in first-vote order) to hold the top
/// count, so a plain `Vec` is the right container here.
#[derive(Debug, Default, Clone)]
pub struct Ballot {
    entries: Vec<VoteRecord>,
}

impl Ballot {
    /// Records a vote. A repeat voter overwrites their earlier choice in
    /// place, keeping their original position in the order.
    pub fn record(&mut self, voter: Uuid, target: Uuid) {
        match self.entries.iter_mut().find(|e| e.voter == voter) {
            Some(e) => e.target = target,
            None => self.entries.push(VoteRecord { voter, target }),
        }
    }

    pub fn has_voted(&self, voter: Uuid) -> bool {
        self.entries.iter().any(|e| e.voter == voter)
    }

    /// Rewrites ballots cast under an old connection id after a reconnect.
    pub fn rebind_voter(&mut self, old: Uuid, new: Uuid) {
        for e in &mut self.entries {
            if e.voter == old {
                e.voter = new;
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn records(&self) -> &[VoteRecord] {
        &self.entries
    }

    /// Plurality winner. Counts are accumulated in first-vote order and a
    /// later target only wins with a strictly greater count, so ties go
    /// to whichever target was voted for first.
    pub fn tally(&self) -> Option<Uuid> {
        let mut counts: Vec<(Uuid, usize)> = Vec::new();
        for e in &self.entries {
            match counts.iter_mut().find(|(t, _)| *t == e.target) {
                Some((_, n)) => *n += 1,
                None => counts.push((e.target, 1)),
            }
        }
        let mut best: Option<(Uuid, usize)> = None;
        for &(target, n) in &counts {
            if best.map_or(true, |(_, top)| n > top) {
                best = Some((target, n));
            }
        }
        best.map(|(target, _)| target)
    }
}

pub struct Room {
    pub id: String,
    pub host: Uuid,
    pub players: Vec<Player>,
    pub wolf_count: usize,
    pub topics: Option<Topics>,
    pub phase: Phase,
    pub timer_seconds: u64,
    /// Bumped whenever the countdown is (re)started or must stop; a tick
    /// task exits as soon as its captured generation goes stale.
    pub timer_gen: u64,
    pub fox_votes: Ballot,
    pub wolf_votes: Ballot,
    /// Pending grace-period removals, keyed by session token. Aborted on
    /// successful reconnection; the task re-validates on fire either way.
    pub grace: HashMap<String, AbortHandle>,
}

impl Room {
    pub fn new(id: String, host: Uuid, wolf_count: usize) -> Self {
        Room {
            id,
            host,
            players: Vec::new(),
            wolf_count,
            topics: None,
            phase: Phase::Waiting,
            timer_seconds: 0,
            timer_gen: 0,
            fox_votes: Ballot::default(),
            wolf_votes: Ballot::default(),
            grace: HashMap::new(),
        }
    }
}

pub fn seat_of(r: &Room, id: Uuid) -> Option<usize> {
    r.players.iter().position(|p| p.id == id)
}

/// Roster view shared with the whole room. Roles and words stay private.
pub fn public_players(r: &Room) -> Vec<PublicPlayer> {
    r.players
        .iter()
        .map(|p| PublicPlayer {
            id: p.id,
            name: p.name.clone(),
            has_asked: p.has_asked,
            has_answered: p.has_answered,
            is_connected: p.is_connected,
        })
        .collect()
}

/// Roster with roles revealed, for the result screen only.
pub fn result_players(r: &Room) -> Vec<ResultPlayer> {
    r.players
        .iter()
        .map(|p| ResultPlayer {
            id: p.id,
            name: p.name.clone(),
            role: p.role,
            word: p.word.clone(),
            has_asked: p.has_asked,
            has_answered: p.has_answered,
            is_connected: p.is_connected,
        })
        .collect()
}

pub fn vote_targets(r: &Room) -> Vec<PlayerRef> {
    r.players
        .iter()
        .map(|p| PlayerRef {
            id: p.id,
            name: p.name.clone(),
        })
        .collect()
}

pub fn non_fox_targets(r: &Room) -> Vec<PlayerRef> {
    r.players
        .iter()
        .filter(|p| p.role != Some(Role::Fox))
        .map(|p| PlayerRef {
            id: p.id,
            name: p.name.clone(),
        })
        .collect()
}

pub fn vote_snapshot(r: &Room) -> VoteSnapshot {
    VoteSnapshot {
        fox: r.fox_votes.records().to_vec(),
        wolf: r.wolf_votes.records().to_vec(),
    }
}

pub fn broadcast(r: &Room, msg: ServerToClient) {
    for p in r.players.iter() {
        let _ = p.tx.send(msg.clone());
    }
}

pub fn broadcast_except(r: &Room, skip: Uuid, msg: ServerToClient) {
    for p in r.players.iter() {
        if p.id != skip {
            let _ = p.tx.send(msg.clone());
        }
    }
}

pub fn send_to(r: &Room, id: Uuid, msg: ServerToClient) {
    if let Some(p) = r.players.iter().find(|p| p.id == id) {
        let _ = p.tx.send(msg);
    }
}

pub fn send_err_to(r: &Room, id: Uuid, msg: impl Into<String>) {
    send_to(
        r,
        id,
        ServerToClient::Error {
            message: msg.into(),
        },
    );
}

/// Shuffles the roster and deals roles: one fox, up to `wolf_count`
/// wolves (bounded by the roster), villagers for the rest. Words mirror
/// the role's topic slot. With `wolf_count >= players - 1` no villagers
/// remain; the vote flow still holds up, so the degenerate roster is
/// allowed rather than rejected.
pub fn assign_roles(r: &mut Room) {
    let Some(topics) = r.topics.clone() else {
        return;
    };
    let mut order: Vec<usize> = (0..r.players.len()).collect();
    order.shuffle(&mut rand::thread_rng());
    for (pos, &seat) in order.iter().enumerate() {
        let p = &mut r.players[seat];
        if pos == 0 {
            p.role = Some(Role::Fox);
            p.word = Some(topics.fox.clone());
        } else if pos <= r.wolf_count {
            p.role = Some(Role::Wolf);
            p.word = Some(topics.wolf.clone());
        } else {
            p.role = Some(Role::Village);
            p.word = Some(topics.village.clone());
        }
    }
}

/// Every currently connected player has cast a fox ballot. Disconnected
/// players never block the tally.
pub fn fox_vote_complete(r: &Room) -> bool {
    r.players
        .iter()
        .filter(|p| p.is_connected)
        .all(|p| r.fox_votes.has_voted(p.id))
}

/// Every connected non-fox player has cast a wolf ballot. Ballots from
/// since-disconnected players still count at tally time.
pub fn wolf_vote_complete(r: &Room) -> bool {
    r.players
        .iter()
        .filter(|p| p.is_connected && p.role != Some(Role::Fox))
        .all(|p| r.wolf_votes.has_voted(p.id))
}

/// Enters the fox-voting phase: stops the countdown, wipes both ballot
/// boxes, announces the full roster as targets.
pub fn begin_fox_voting(r: &mut Room) {
    r.timer_gen += 1;
    r.phase = Phase::VotingFox;
    r.fox_votes.clear();
    r.wolf_votes.clear();
    broadcast(
        r,
        ServerToClient::VotingStarted {
            phase: VotePhase::Fox,
            players: vote_targets(r),
        },
    );
}

pub fn finish_game(r: &mut Room, winner: Winner) {
    r.phase = Phase::Result;
    r.timer_gen += 1;
    let Some(topics) = r.topics.clone() else {
        return;
    };
    broadcast(
        r,
        ServerToClient::GameResult {
            winner,
            players: result_players(r),
            topics,
            votes: vote_snapshot(r),
        },
    );
}

/// Back to the lobby: roster and host survive, everything game-scoped is
/// wiped.
pub fn reset_for_new_game(r: &mut Room) {
    r.phase = Phase::Waiting;
    r.topics = None;
    r.timer_seconds = 0;
    r.timer_gen += 1;
    r.fox_votes.clear();
    r.wolf_votes.clear();
    for p in r.players.iter_mut() {
        p.role = None;
        p.word = None;
        p.has_asked = false;
        p.has_answered = false;
    }
}

pub fn log_room(tag: &str, r: &Room) {
    tracing::debug!(
        room = %r.id,
        players = r.players.len(),
        phase = ?r.phase,
        "{tag}"
    );
}
