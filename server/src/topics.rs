use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use thiserror::Error;
use wordwolf_protocol::Topics;

#[derive(Debug, Error)]
#[error("topic provider error: {0}")]
pub struct TopicError(pub String);

/// Seam for the word/question generator. The state machine only cares
/// that it is async and fallible; a failed call must surface to the
/// requester instead of leaving a half-started game behind.
pub trait TopicProvider: Send + Sync {
    fn generate_topics(&self) -> BoxFuture<'_, Result<Topics, TopicError>>;

    fn generate_questions(&self, word: &str) -> BoxFuture<'_, Result<Vec<String>, TopicError>>;
}

/// In-process provider backed by a fixed word table, so the server runs
/// standalone without any upstream generation service.
pub struct BuiltinTopics;

/// (village, wolf, fox) triples. Village and wolf words are close
/// neighbors; the fox word sits one step further out.
const TOPIC_TABLE: &[(&str, &str, &str)] = &[
    ("coffee", "black tea", "energy drink"),
    ("dog", "cat", "hamster"),
    ("the beach", "the pool", "a hot spring"),
    ("ramen", "udon", "spaghetti"),
    ("the cinema", "the theater", "a concert"),
    ("train", "bus", "tram"),
    ("apple", "pear", "peach"),
    ("soccer", "rugby", "basketball"),
    ("camping", "hiking", "fishing"),
    ("piano", "guitar", "violin"),
    ("sushi", "sashimi", "grilled fish"),
    ("snowboarding", "skiing", "ice skating"),
];

/// Discussion prompts that can be answered without naming the word.
const QUESTION_TEMPLATES: &[&str] = &[
    "How often does it come up in your week?",
    "Is yours more of an indoor or an outdoor thing?",
    "Would you recommend it to a friend?",
    "Does enjoying it cost money?",
    "When did you last enjoy it?",
    "Is it better alone or with other people?",
    "Does it have a season?",
    "Could a small child enjoy it?",
    "Is it something you'd do on a weekday?",
    "Does it make any noise?",
];

const QUESTIONS_PER_REQUEST: usize = 5;

impl TopicProvider for BuiltinTopics {
    fn generate_topics(&self) -> BoxFuture<'_, Result<Topics, TopicError>> {
        Box::pin(async {
            let &(village, wolf, fox) = TOPIC_TABLE
                .choose(&mut rand::thread_rng())
                .ok_or_else(|| TopicError("empty topic table".into()))?;
            Ok(Topics {
                village: village.to_string(),
                wolf: wolf.to_string(),
                fox: fox.to_string(),
            })
        })
    }

    fn generate_questions(&self, _word: &str) -> BoxFuture<'_, Result<Vec<String>, TopicError>> {
        Box::pin(async {
            let mut picks: Vec<&str> = QUESTION_TEMPLATES.to_vec();
            picks.shuffle(&mut rand::thread_rng());
            picks.truncate(QUESTIONS_PER_REQUEST);
            Ok(picks.into_iter().map(str::to_string).collect())
        })
    }
}
