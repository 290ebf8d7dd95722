//! LLM access with exponential backoff.
//!
//! - [`AskAsync`]: one prompt in, one response out
//! - [`AskFnWrapper`]: the `awful_aj` chat call behind that trait
//! - [`RetryAsk`]: decorator retrying any [`AskAsync`] with [`ExponentialBackoff`]
//!
//! The endpoint, model and API key live in `awful_aj`'s own `config.yaml`;
//! the system prompt is an `awful_aj` template loaded by name.

use crate::config::LlmConfig;
use crate::ratelimit::ExponentialBackoff;
use awful_aj::api::ask;
use awful_aj::{config, config_dir, config::AwfulJadeConfig, template, template::ChatTemplate};
use std::error::Error;
use std::fmt;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Trait for async LLM interaction.
pub trait AskAsync {
    type Response;

    /// Send text to the LLM and receive its reply.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Retries the wrapped client on any error.
pub struct RetryAsk<T> {
    inner: T,
    backoff: ExponentialBackoff,
}

impl<T: AskAsync> RetryAsk<T> {
    pub fn new(inner: T, backoff: ExponentialBackoff) -> Self {
        Self { inner, backoff }
    }

    /// Backoff taken from the `llm` section of the pipeline config.
    pub fn from_config(inner: T, config: &LlmConfig) -> Self {
        Self::new(
            inner,
            ExponentialBackoff::new(config.max_retries, config.base_delay(), config.max_delay(), true),
        )
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk").field("backoff", &self.backoff).finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = self.backoff.execute_all(|| self.inner.ask(text)).await;
        if let Err(e) = &res {
            error!(
                elapsed_ms_total = t0.elapsed().as_millis() as u64,
                max_retries = self.backoff.max_retries(),
                error = %e,
                "ask() exhausted retries"
            );
        }
        res
    }
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    pub config: &'a AwfulJadeConfig,
    pub template: &'a ChatTemplate,
}

impl AskAsync for AskFnWrapper<'_> {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        let dt = t0.elapsed();

        match &res {
            Ok(r) => info!(elapsed_ms = dt.as_millis() as u64, response_bytes = r.len(), "LLM call succeeded"),
            Err(e) => warn!(elapsed_ms = dt.as_millis() as u64, error = %e, "LLM call failed"),
        }
        res
    }
}

/// The `awful_aj` connection settings and the story template.
#[derive(Debug)]
pub struct LlmContext {
    pub config: AwfulJadeConfig,
    pub template: ChatTemplate,
}

impl LlmContext {
    /// Load the template named in `llm` and the `awful_aj` config, either
    /// from `config_path` or from `config.yaml` in its config directory.
    #[instrument(level = "info", skip_all, fields(template = %llm.template))]
    pub async fn load(llm: &LlmConfig, config_path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let template = template::load_template(&llm.template).await?;
        info!("Loaded story template");

        let conf_file = match config_path {
            Some(p) => p.to_path_buf(),
            None => config_dir()?.join("config.yaml"),
        };
        let config_path = conf_file
            .to_str()
            .ok_or_else(|| format!("not a valid config filename: {}", conf_file.display()))?;
        let config = config::load_config(config_path)?;
        info!(config_path, "Loaded LLM configuration");

        Ok(Self { config, template })
    }

    pub fn client(&self, llm: &LlmConfig) -> RetryAsk<AskFnWrapper<'_>> {
        RetryAsk::from_config(
            AskFnWrapper {
                config: &self.config,
                template: &self.template,
            },
            llm,
        )
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::AskAsync;
    use std::collections::VecDeque;
    use std::error::Error;
    use std::sync::Mutex;

    /// Replays canned responses in order; errors once the script runs out.
    #[derive(Debug, Default)]
    pub struct ScriptedAsk {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedAsk {
        pub fn new<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = Result<S, S>>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(Into::into).map_err(Into::into))
                        .collect(),
                ),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl AskAsync for ScriptedAsk {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            self.prompts.lock().unwrap().push(text.to_string());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(e)) => Err(e.into()),
                None => Err("script exhausted".into()),
            }
        }
    }
}
