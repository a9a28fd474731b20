use crate::context::RequestContext;
use crate::errors::TriviaError;
use crate::resource::ResourceService;
use crate::upstream::Upstream;
use serde::{Deserialize, Deserializer, Serialize};
use std::num::NonZeroU8;
use std::str::FromStr;
use std::sync::Arc;

const QUESTIONS_PATH: &str = "questions";

/// Number of questions requested when the caller gives no usable limit.
pub const DEFAULT_LIMIT: u8 = 10;

/// The six labelled answer slots. Unused slots are `null` upstream.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Answers {
    pub answer_a: Option<String>,
    pub answer_b: Option<String>,
    pub answer_c: Option<String>,
    pub answer_d: Option<String>,
    pub answer_e: Option<String>,
    pub answer_f: Option<String>,
}

/// Correctness flag per answer slot, `"true"` or `"false"`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CorrectAnswers {
    #[serde(deserialize_with = "null_as_empty")]
    pub answer_a_correct: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub answer_b_correct: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub answer_c_correct: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub answer_d_correct: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub answer_e_correct: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub answer_f_correct: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Question {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub question: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub multiple_correct_answers: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub answers: Answers,
    #[serde(default, deserialize_with = "null_as_default")]
    pub correct_answers: CorrectAnswers,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub explanation: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub difficulty: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    null_as_default(deserializer)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Query parameter not one of 'easy', 'medium', 'hard'. Received {0}.")]
pub struct UnknownDifficulty(pub String);

impl FromStr for Difficulty {
    type Err = UnknownDifficulty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownDifficulty(s.to_string()))
    }
}

/// Question filters exactly as received from the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuestionParams {
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub limit: Option<String>,
}

/// Normalized filters forwarded upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuestionFilter {
    /// Passed through verbatim; omitted when empty.
    pub category: Option<String>,
    /// Unrecognised values are dropped with a warning.
    pub difficulty: Option<Difficulty>,
    /// 1..=255; anything else falls back to [`DEFAULT_LIMIT`].
    pub limit: u8,
}

impl QuestionFilter {
    pub fn from_params(params: &QuestionParams) -> Self {
        let category = params.category.clone().filter(|c| !c.is_empty());

        let difficulty = params
            .difficulty
            .as_deref()
            .filter(|d| !d.is_empty())
            .and_then(|raw| match raw.parse::<Difficulty>() {
                Ok(difficulty) => Some(difficulty),
                Err(e) => {
                    tracing::warn!(difficulty = %raw, "{e}");
                    None
                }
            });

        let limit = params
            .limit
            .as_deref()
            // Plain decimal digits only: no sign, no base prefix.
            .filter(|raw| raw.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|raw| raw.parse::<NonZeroU8>().ok())
            .map_or(DEFAULT_LIMIT, NonZeroU8::get);

        QuestionFilter {
            category,
            difficulty,
            limit,
        }
    }

    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::with_capacity(3);
        if let Some(category) = &self.category {
            query.push(("category", category.clone()));
        }
        if let Some(difficulty) = self.difficulty {
            query.push(("difficulty", difficulty.as_str().to_string()));
        }
        query.push(("limit", self.limit.to_string()));
        query
    }
}

/// Uncached, filtered view of the provider's questions.
pub struct QuestionsService {
    resource: ResourceService<Question>,
}

impl QuestionsService {
    pub fn new(upstream: Arc<dyn Upstream>) -> Self {
        QuestionsService {
            resource: ResourceService::uncached(upstream, QUESTIONS_PATH),
        }
    }

    pub async fn fetch(
        &self,
        ctx: &RequestContext,
        params: &QuestionParams,
    ) -> Result<Vec<Question>, TriviaError> {
        let query = QuestionFilter::from_params(params).to_query();
        self.resource.fetch(ctx, &query).await
    }
}
