use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// ---- Roles ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Village,
    Wolf,
    Fox,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Village => write!(f, "village"),
            Role::Wolf => write!(f, "wolf"),
            Role::Fox => write!(f, "fox"),
        }
    }
}

/// ---- Game phases ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Waiting,
    Playing,
    VotingFox,
    VotingWolf,
    Result,
}

/// Which ballot a vote goes into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VotePhase {
    Fox,
    Wolf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Village,
    Wolf,
    Fox,
}

/// ---- Discussion bookkeeping ----
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Asked,
    Answered,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Nice,
    Suspicious,
}

/// ---- Topic words ----
/// One secret word per role slot. Villagers share `village`, wolves
/// share `wolf`, the lone fox gets `fox`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Topics {
    pub village: String,
    pub wolf: String,
    pub fox: String,
}

/// Roster entry visible to everyone in the room. Never carries a
/// role or word.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicPlayer {
    pub id: Uuid,
    pub name: String,
    pub has_asked: bool,
    pub has_answered: bool,
    pub is_connected: bool,
}

/// Roster entry with roles revealed. Only appears in `GameResult`
/// and in a rejoin snapshot taken during the result phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPlayer {
    pub id: Uuid,
    pub name: String,
    pub role: Option<Role>,
    pub word: Option<String>,
    pub has_asked: bool,
    pub has_answered: bool,
    pub is_connected: bool,
}

/// Minimal id/name pair used for vote targets and questioner/answerer
/// announcements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerRef {
    pub id: Uuid,
    pub name: String,
}

/// A single cast ballot. Order within a snapshot is insertion order,
/// which is what the tie-break rule keys off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteRecord {
    pub voter: Uuid,
    pub target: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteSnapshot {
    pub fox: Vec<VoteRecord>,
    pub wolf: Vec<VoteRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientToServer {
    CreateRoom {
        player_name: String,
        wolf_count: usize,
        session_id: Option<String>,
    },
    JoinRoom {
        room_id: String,
        player_name: String,
        session_id: Option<String>,
    },
    RejoinRoom {
        room_id: String,
        session_id: String,
        player_name: String,
    },
    StartGame {
        seconds_per_player: Option<u64>,
    },
    RerollTopics,

    // Discussion helpers
    Reaction {
        kind: ReactionKind,
    },
    RequestQuestions,
    SelectQuestioner,
    SelectAnswerer,
    SubmitAllAnswer {
        answer: String,
    },
    UpdateCheck {
        player_id: Uuid,
        kind: CheckKind,
        checked: bool,
    },

    // Voting
    GoToVoting,
    Vote {
        phase: VotePhase,
        target_id: Uuid,
    },

    PlayAgain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerToClient {
    Hello {
        your_id: Uuid,
    },
    RoomCreated {
        room_id: String,
        players: Vec<PublicPlayer>,
        session_id: String,
    },
    RejoinSuccess {
        room_id: String,
        game_state: Phase,
        role: Option<Role>,
        word: Option<String>,
        timer_seconds: u64,
        players: Vec<PublicPlayer>,
        topics: Option<Topics>,
        votes: Option<VoteSnapshot>,
    },
    RejoinFailed {
        message: String,
    },
    PlayerReconnected {
        player_id: Uuid,
        player_name: String,
        players: Vec<PublicPlayer>,
    },
    PlayerDisconnected {
        player_id: Uuid,
        player_name: String,
        players: Vec<PublicPlayer>,
    },
    PlayerJoined {
        players: Vec<PublicPlayer>,
    },
    GameStarted {
        role: Role,
        word: String,
        timer_seconds: u64,
        players: Vec<PublicPlayer>,
    },
    TimerUpdate {
        seconds: u64,
    },
    TopicsRerolled {
        role: Role,
        word: String,
    },
    ShowReaction {
        kind: ReactionKind,
        player_name: String,
    },
    QuestionsGenerated {
        questions: Vec<String>,
    },
    QuestionerSelected {
        questioner: PlayerRef,
        all_answer_mode: bool,
    },
    AnswererSelected {
        answerer: PlayerRef,
        all_answer_mode: bool,
    },
    AllAnswerSubmitted {
        player_id: Uuid,
        player_name: String,
        answer: String,
    },
    CheckUpdated {
        player_id: Uuid,
        kind: CheckKind,
        checked: bool,
    },
    VotingStarted {
        phase: VotePhase,
        players: Vec<PlayerRef>,
    },
    FoxVoteResult {
        fox_caught: bool,
        fox_id: Uuid,
        fox_name: String,
    },
    GameResult {
        winner: Winner,
        players: Vec<ResultPlayer>,
        topics: Topics,
        votes: VoteSnapshot,
    },
    GameReset {
        players: Vec<PublicPlayer>,
    },
    PlayerLeft {
        players: Vec<PublicPlayer>,
        new_host: Uuid,
    },
    Error {
        message: String,
    },
}
