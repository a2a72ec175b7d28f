//! # API Module
//!
//! Talks to the chat-completion API and ties the query path together.
//!
//! - [`Generator`] is the seam to the language model: one flattened prompt in,
//!   one text out. [`OpenAiGenerator`] implements it over `async-openai`.
//! - [`recommend`] runs the whole online pipeline: retrieve, assemble the
//!   prompt with the retrieved products as context, check its size, generate.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vetrina::{
//!     api::{OpenAiGenerator, RecommendRequest, recommend},
//!     catalog_index::{CatalogHandle, CatalogIndex},
//!     config::RecommenderConfig,
//!     embedding::OpenAiEmbedder,
//!     retrieval::Retriever,
//!     retry::RetryPolicy,
//!     template::RecommendationTemplate,
//! };
//!
//! # async fn run(config: RecommenderConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = CatalogIndex::load(&config.index_path, &config.store_path)?;
//! let retriever = Retriever::new(
//!     Arc::new(OpenAiEmbedder::from_config(&config)?),
//!     Arc::new(CatalogHandle::new(catalog)),
//!     RetryPolicy::from_config(&config),
//! );
//! let generator = OpenAiGenerator::from_config(&config)?;
//! let template = RecommendationTemplate::product_recommendation();
//!
//! let answer = recommend(
//!     &retriever,
//!     &generator,
//!     &template,
//!     &config,
//!     RecommendRequest::new("Ho bisogno di etichette adesive", 3),
//! )
//! .await?;
//! println!("{}", answer.response);
//! # Ok(()) }
//! ```

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    config::RecommenderConfig,
    error::{RecommendError, Result},
    prompt::Prompt,
    retrieval::{PriceRange, RetrievalResult, Retriever},
    retry::RetryPolicy,
    template::RecommendationTemplate,
};

const SERVICE: &str = "chat";

/// Creates a new OpenAI API client from configuration.
pub fn create_client(config: &RecommenderConfig) -> Result<Client<OpenAIConfig>> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.api_key.clone())
        .with_api_base(config.api_base.clone());
    debug!("Client created for {}", config.api_base);
    Ok(Client::with_config(openai_config))
}

/// Anything that can complete a flattened prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// Chat-completion client sending the prompt as a single user message.
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiGenerator {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    pub fn from_config(config: &RecommenderConfig) -> Result<Self> {
        Ok(Self::new(
            create_client(config)?,
            config.chat_model.clone(),
            config.request_timeout(),
        ))
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        let message = ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
            name: None,
        });

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .temperature(temperature)
            .messages(vec![message])
            .build()
            .map_err(classify)?;

        debug!("Sending {} chars to {}", prompt.len(), self.model);

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| RecommendError::Transient {
                service: SERVICE,
                message: format!("no response within {:?}", self.timeout),
            })?
            .map_err(classify)?;

        let text: String = response
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .collect();

        if text.trim().is_empty() {
            return Err(RecommendError::Fatal {
                service: SERVICE,
                message: "completion contained no text".into(),
            });
        }
        Ok(text)
    }
}

fn classify(err: OpenAIError) -> RecommendError {
    match err {
        OpenAIError::Reqwest(e) if e.is_timeout() || e.is_connect() => RecommendError::Transient {
            service: SERVICE,
            message: e.to_string(),
        },
        OpenAIError::ApiError(api) => {
            let retryable = matches!(
                api.code.as_deref(),
                Some("rate_limit_exceeded" | "server_error" | "service_unavailable")
            );
            if retryable {
                RecommendError::Transient {
                    service: SERVICE,
                    message: api.message,
                }
            } else {
                RecommendError::Fatal {
                    service: SERVICE,
                    message: api.message,
                }
            }
        }
        other => RecommendError::Fatal {
            service: SERVICE,
            message: other.to_string(),
        },
    }
}

/// One user question and its retrieval parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendRequest<'a> {
    pub query: &'a str,
    pub k: usize,
    pub category: Option<&'a str>,
    pub price: Option<PriceRange>,
}

impl<'a> RecommendRequest<'a> {
    pub fn new(query: &'a str, k: usize) -> Self {
        Self {
            query,
            k,
            category: None,
            price: None,
        }
    }

    pub fn category(mut self, category: Option<&'a str>) -> Self {
        self.category = category;
        self
    }

    pub fn price(mut self, price: Option<PriceRange>) -> Self {
        self.price = price;
        self
    }
}

/// The retrieved products and the model's answer about them.
#[derive(Debug, Clone)]
pub struct Recommendation {
    pub products: RetrievalResult,
    pub prompt_tokens: Option<usize>,
    pub response: String,
}

/// Retrieve, assemble and generate.
///
/// The prompt is never truncated; exceeding `context_max_tokens` only logs a
/// warning.
///
/// # Errors
/// Any retrieval error, and generation failures (transient ones are retried
/// per the config, then surface as [`RecommendError::Unavailable`]).
pub async fn recommend(
    retriever: &Retriever,
    generator: &dyn Generator,
    template: &RecommendationTemplate,
    config: &RecommenderConfig,
    request: RecommendRequest<'_>,
) -> Result<Recommendation> {
    let products = retriever
        .retrieve(request.query, request.k, request.category, request.price)
        .await?;

    let context: Vec<&str> = products.iter().map(|p| p.entry.text.as_str()).collect();
    let prompt = Prompt::from_template(template, &context, request.query);

    let prompt_tokens = match prompt.token_count() {
        Ok(tokens) => {
            if tokens > config.context_max_tokens {
                warn!(
                    "Prompt is {} tokens, above the {} token budget",
                    tokens, config.context_max_tokens
                );
            }
            Some(tokens)
        }
        Err(e) => {
            warn!("Could not count prompt tokens: {}", e);
            None
        }
    };

    let rendered = prompt.render();
    let text = rendered.as_str();
    let temperature = config.temperature;
    let response = RetryPolicy::from_config(config)
        .run(move || generator.complete(text, temperature))
        .await?;

    info!(
        "Recommended from {} products ({} chars)",
        products.len(),
        response.len()
    );

    Ok(Recommendation {
        products,
        prompt_tokens,
        response,
    })
}
