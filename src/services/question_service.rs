//! Question generation with a local fallback, storage of generated questions and explanations.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use rand::{Rng, seq::SliceRandom};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    dao::{
        models::{Difficulty, QuestionEntity, QuestionSource},
        realtime_store::allocate_id,
    },
    dto::question::{ExplanationResponse, GenerateQuestionRequest, QuestionDto, QuizMode},
    error::ServiceError,
    state::{SharedState, now_ms},
};

/// Question content returned by a generator, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuestion {
    /// Question text.
    pub prompt: String,
    /// Answer choices.
    pub options: Vec<String>,
    /// Must be one of `options`.
    pub correct_answer: String,
    /// Shown after answering.
    pub explanation: Option<String>,
}

impl GeneratedQuestion {
    /// A usable question has a prompt and a correct answer that is one of its options.
    fn check(self) -> Result<Self, GenerationError> {
        if self.prompt.trim().is_empty() || self.options.len() < 2 {
            return Err(GenerationError::Malformed("missing prompt or options".into()));
        }
        if !self.options.contains(&self.correct_answer) {
            return Err(GenerationError::Malformed(
                "correct answer is not among the options".into(),
            ));
        }
        Ok(self)
    }
}

/// Failures of a question generator.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The request could not be sent or read.
    #[error("generator request failed: {0}")]
    Request(String),
    /// Non-success HTTP status.
    #[error("generator answered with status {0}")]
    Status(u16),
    /// The reply is not a usable question.
    #[error("generator returned a malformed question: {0}")]
    Malformed(String),
    /// Nothing left for this topic.
    #[error("no question available for `{0}`")]
    Exhausted(String),
}

/// Opaque source of quiz questions.
pub trait QuestionGenerator: Send + Sync {
    /// Produce one question on `topic`.
    fn generate(
        &self,
        topic: &str,
        difficulty: Difficulty,
        language: &str,
    ) -> BoxFuture<'static, Result<GeneratedQuestion, GenerationError>>;

    /// Explain why `question.correct_answer` is right.
    fn explain(&self, question: &QuestionEntity)
    -> BoxFuture<'static, Result<String, GenerationError>>;
}

/// Pick the generator matching the configuration: remote when an endpoint is set and the
/// `ai-generator` feature is enabled, local mock questions otherwise.
pub fn default_generator(config: &AppConfig) -> Arc<dyn QuestionGenerator> {
    #[cfg(feature = "ai-generator")]
    if let Some(url) = config.question_api_url.as_deref() {
        match http::HttpQuestionGenerator::new(url) {
            Ok(generator) => {
                info!(url, "using remote question generator");
                return Arc::new(generator);
            }
            Err(err) => warn!(url, error = %err, "remote question generator unusable"),
        }
    }
    #[cfg(not(feature = "ai-generator"))]
    if config.question_api_url.is_some() {
        warn!("questionApiUrl ignored: built without the ai-generator feature");
    }

    Arc::new(MockQuestionGenerator)
}

/// Offline generator producing templated questions for any topic.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockQuestionGenerator;

const MOCK_TEMPLATES: &[(&str, [&str; 4], usize)] = &[
    (
        "Which activity best helps you learn more about {topic}?",
        [
            "Reading reliable sources",
            "Ignoring the subject",
            "Guessing every answer",
            "Avoiding questions",
        ],
        0,
    ),
    (
        "What is a good first step when studying {topic}?",
        [
            "Memorising random numbers",
            "Learning the key vocabulary",
            "Skipping the basics",
            "Studying something else",
        ],
        1,
    ),
    (
        "How can you check a surprising claim about {topic}?",
        [
            "Trust the loudest voice",
            "Assume it is true",
            "Compare several trusted sources",
            "Share it immediately",
        ],
        2,
    ),
    (
        "Which habit makes quizzes about {topic} easier over time?",
        [
            "Cramming once a year",
            "Never reviewing mistakes",
            "Answering without reading",
            "Regular short practice sessions",
        ],
        3,
    ),
];

impl QuestionGenerator for MockQuestionGenerator {
    fn generate(
        &self,
        topic: &str,
        _difficulty: Difficulty,
        _language: &str,
    ) -> BoxFuture<'static, Result<GeneratedQuestion, GenerationError>> {
        let topic = topic.trim().to_owned();
        Box::pin(async move {
            let mut rng = rand::rng();
            let (template, options, correct) = MOCK_TEMPLATES
                .get(rng.random_range(0..MOCK_TEMPLATES.len()))
                .ok_or_else(|| GenerationError::Exhausted(topic.clone()))?;

            let correct_answer = options[*correct].to_owned();
            let mut options: Vec<String> = options.iter().map(|o| (*o).to_owned()).collect();
            options.shuffle(&mut rng);

            Ok(GeneratedQuestion {
                prompt: template.replace("{topic}", &topic),
                options,
                explanation: Some(format!(
                    "\"{correct_answer}\" is the approach that builds real knowledge of {topic}."
                )),
                correct_answer,
            })
        })
    }

    fn explain(
        &self,
        question: &QuestionEntity,
    ) -> BoxFuture<'static, Result<String, GenerationError>> {
        let text = fallback_explanation(question);
        Box::pin(async move { Ok(text) })
    }
}

fn fallback_explanation(question: &QuestionEntity) -> String {
    format!(
        "The correct answer to \"{}\" is \"{}\".",
        question.prompt, question.correct_answer
    )
}

#[cfg(feature = "ai-generator")]
mod http {
    use futures::future::BoxFuture;
    use reqwest::Client;
    use serde::{Deserialize, Serialize};

    use super::{GeneratedQuestion, GenerationError, QuestionGenerator};
    use crate::dao::models::{Difficulty, QuestionEntity};

    /// Generator delegating to a remote HTTP endpoint.
    #[derive(Clone)]
    pub struct HttpQuestionGenerator {
        client: Client,
        url: String,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct GenerateBody<'a> {
        topic: &'a str,
        difficulty: Difficulty,
        language: &'a str,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct GenerateReply {
        prompt: String,
        options: Vec<String>,
        correct_answer: String,
        #[serde(default)]
        explanation: Option<String>,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct ExplainBody<'a> {
        prompt: &'a str,
        options: &'a [String],
        correct_answer: &'a str,
        language: &'a str,
    }

    #[derive(Deserialize)]
    struct ExplainReply {
        explanation: String,
    }

    impl HttpQuestionGenerator {
        /// Generator calling the service at `url`.
        pub fn new(url: &str) -> Result<Self, GenerationError> {
            let client = Client::builder()
                .build()
                .map_err(|err| GenerationError::Request(err.to_string()))?;
            Ok(Self {
                client,
                url: url.trim_end_matches('/').to_owned(),
            })
        }

        async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, GenerationError>
        where
            B: Serialize + ?Sized,
            R: for<'de> Deserialize<'de>,
        {
            let response = self
                .client
                .post(format!("{}{}", self.url, path))
                .json(body)
                .send()
                .await
                .map_err(|err| GenerationError::Request(err.to_string()))?;

            if !response.status().is_success() {
                return Err(GenerationError::Status(response.status().as_u16()));
            }

            response
                .json::<R>()
                .await
                .map_err(|err| GenerationError::Malformed(err.to_string()))
        }
    }

    impl QuestionGenerator for HttpQuestionGenerator {
        fn generate(
            &self,
            topic: &str,
            difficulty: Difficulty,
            language: &str,
        ) -> BoxFuture<'static, Result<GeneratedQuestion, GenerationError>> {
            let this = self.clone();
            let topic = topic.to_owned();
            let language = language.to_owned();
            Box::pin(async move {
                let reply: GenerateReply = this
                    .post(
                        "/generate",
                        &GenerateBody {
                            topic: &topic,
                            difficulty,
                            language: &language,
                        },
                    )
                    .await?;
                Ok(GeneratedQuestion {
                    prompt: reply.prompt,
                    options: reply.options,
                    correct_answer: reply.correct_answer,
                    explanation: reply.explanation,
                })
            })
        }

        fn explain(
            &self,
            question: &QuestionEntity,
        ) -> BoxFuture<'static, Result<String, GenerationError>> {
            let this = self.clone();
            let question = question.clone();
            Box::pin(async move {
                let reply: ExplainReply = this
                    .post(
                        "/explain",
                        &ExplainBody {
                            prompt: &question.prompt,
                            options: &question.options,
                            correct_answer: &question.correct_answer,
                            language: &question.language,
                        },
                    )
                    .await?;
                Ok(reply.explanation)
            })
        }
    }
}

/// Produce a question, falling back to local mock content when the generator fails or
/// exceeds the configured timeout. The question is stored before being returned.
pub async fn generate_question(
    state: &SharedState,
    topic: &str,
    difficulty: Difficulty,
    language: &str,
) -> Result<QuestionEntity, ServiceError> {
    let store = state.require_store().await?;
    let (generated, source) = generate_with_fallback(
        state.question_generator().as_ref(),
        state.config().generation_timeout,
        topic,
        difficulty,
        language,
    )
    .await?;

    let question = QuestionEntity {
        id: allocate_id(),
        topic: topic.to_owned(),
        difficulty,
        language: language.to_owned(),
        prompt: generated.prompt,
        options: generated.options,
        correct_answer: generated.correct_answer,
        explanation: generated.explanation,
        source,
        created_at: now_ms(),
    };
    store.save_question(question.clone()).await?;
    debug!(question_id = %question.id, topic, ?source, "question stored");

    Ok(question)
}

async fn generate_with_fallback(
    generator: &dyn QuestionGenerator,
    limit: Duration,
    topic: &str,
    difficulty: Difficulty,
    language: &str,
) -> Result<(GeneratedQuestion, QuestionSource), ServiceError> {
    let live = match timeout(limit, generator.generate(topic, difficulty, language)).await {
        Ok(result) => result.and_then(GeneratedQuestion::check),
        Err(_) => Err(GenerationError::Request(format!(
            "timed out after {}ms",
            limit.as_millis()
        ))),
    };

    match live {
        Ok(question) => Ok((question, QuestionSource::Live)),
        Err(err) => {
            warn!(topic, error = %err, "question generation failed; using fallback question");
            let fallback = MockQuestionGenerator
                .generate(topic, difficulty, language)
                .await
                .and_then(GeneratedQuestion::check)
                .map_err(|fallback_err| ServiceError::Generation(fallback_err.to_string()))?;
            Ok((fallback, QuestionSource::Fallback))
        }
    }
}

/// Handle a single-question request from the quiz screens.
pub async fn generate_for_request(
    state: &SharedState,
    request: GenerateQuestionRequest,
) -> Result<QuestionDto, ServiceError> {
    let question = generate_question(
        state,
        request.topic.trim(),
        request.difficulty,
        &request.language,
    )
    .await?;

    let duration = match request.mode {
        QuizMode::Solo => state.config().solo_question_duration,
        QuizMode::Battle => state.config().battle_question_duration,
    };
    let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    Ok(QuestionDto::from_entity(question, duration_ms))
}

/// Generate `count` questions for a battle and return their identifiers in order.
pub async fn generate_batch(
    state: &SharedState,
    topic: &str,
    difficulty: Difficulty,
    language: &str,
    count: usize,
) -> Result<Vec<String>, ServiceError> {
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let question = generate_question(state, topic, difficulty, language).await?;
        ids.push(question.id);
    }
    info!(topic, count, "generated battle questions");
    Ok(ids)
}

/// Explain a stored question, generating (and caching) the explanation when missing.
pub async fn explain(
    state: &SharedState,
    question_id: &str,
    selected_answer: Option<String>,
) -> Result<ExplanationResponse, ServiceError> {
    let store = state.require_store().await?;
    let Some(mut question) = store.find_question(question_id).await? else {
        return Err(ServiceError::NotFound(format!(
            "question `{question_id}` not found"
        )));
    };

    let explanation = match question.explanation.clone() {
        Some(explanation) => explanation,
        None => {
            let limit = state.config().generation_timeout;
            let generated = match timeout(limit, state.question_generator().explain(&question)).await
            {
                Ok(Ok(text)) if !text.trim().is_empty() => text,
                Ok(Ok(_)) => fallback_explanation(&question),
                Ok(Err(err)) => {
                    warn!(question_id, error = %err, "explanation failed; using fallback");
                    fallback_explanation(&question)
                }
                Err(_) => {
                    warn!(question_id, "explanation timed out; using fallback");
                    fallback_explanation(&question)
                }
            };
            question.explanation = Some(generated.clone());
            store.save_question(question.clone()).await?;
            generated
        }
    };

    Ok(ExplanationResponse {
        question_id: question.id,
        was_correct: selected_answer.map(|answer| answer == question.correct_answer),
        correct_answer: question.correct_answer,
        explanation,
    })
}
