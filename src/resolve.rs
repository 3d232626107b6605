//! Decides where the bearer token comes from: an explicit value, the cache,
//! the headless console routine, or a pasted value, in that order.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::browser::HeadlessConsole;
use crate::cache::TokenCache;
use crate::console::ConsoleError;
use crate::spotify::{ApiError, SpotifyClient};
use crate::token::Token;
use crate::utils::redact;

pub const MANUAL_INSTRUCTIONS: &str = "\
Go to the Spotify Developer page:

    https://developer.spotify.com/console/get-playlist-tracks

At the bottom click \"Get Token\" and choose the playlist permissions
\"playlist-read-private\" and \"playlist-read-collaborative\".
Press \"Request Token\" and you'll be redirected to a sign-in page.

Sign in with your credentials and you'll be redirected back to
the Spotify Developer page. Your bearer token is at the bottom
under \"OAuth Token\".
";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Console(#[from] ConsoleError),
    #[error("Bearer token was rejected: {0}")]
    Rejected(ApiError),
    #[error("Prompt failed: {0}")]
    Prompt(String),
    #[error("No working bearer token available")]
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Explicit,
    Cache,
    Console,
    Prompt,
}

#[derive(Debug)]
pub struct Resolution {
    pub token: Token,
    pub source: TokenSource,
}

#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &Token) -> Result<(), ApiError>;
}

#[async_trait]
pub trait TokenAcquirer: Send + Sync {
    async fn acquire(&self) -> Result<Token, ConsoleError>;
}

/// Asks a human for a token. `Ok(None)` means they gave up.
#[async_trait]
pub trait TokenPrompt: Send + Sync {
    async fn ask(&self, retry: bool) -> Result<Option<Token>, ResolveError>;
}

#[async_trait]
impl TokenValidator for SpotifyClient {
    async fn validate(&self, token: &Token) -> Result<(), ApiError> {
        SpotifyClient::validate(self, token).await
    }
}

#[async_trait]
impl TokenAcquirer for HeadlessConsole {
    async fn acquire(&self) -> Result<Token, ConsoleError> {
        HeadlessConsole::acquire(self).await
    }
}

/// dialoguer prompt on the controlling terminal.
pub struct TerminalPrompt;

#[async_trait]
impl TokenPrompt for TerminalPrompt {
    async fn ask(&self, retry: bool) -> Result<Option<Token>, ResolveError> {
        let answer = tokio::task::spawn_blocking(move || {
            let term = ::console::Term::stderr();
            if retry {
                let _ = term.write_line("Incorrect bearer token.");
            } else {
                let _ = term.write_line(MANUAL_INSTRUCTIONS);
            }
            dialoguer::Input::<String>::new()
                .with_prompt("Paste the bearer token (empty to give up)")
                .allow_empty(true)
                .report(false)
                .interact_text_on(&term)
        })
        .await
        .map_err(|e| ResolveError::Prompt(e.to_string()))?
        .map_err(|e| ResolveError::Prompt(e.to_string()))?;

        Ok(Token::parse(&answer))
    }
}

pub struct TokenResolver<'a> {
    validator: &'a dyn TokenValidator,
    cache: Option<&'a TokenCache>,
    acquirer: Option<&'a dyn TokenAcquirer>,
    prompt: Option<&'a dyn TokenPrompt>,
}

impl<'a> TokenResolver<'a> {
    pub fn new(validator: &'a dyn TokenValidator) -> Self {
        Self {
            validator,
            cache: None,
            acquirer: None,
            prompt: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<&'a TokenCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_acquirer(mut self, acquirer: Option<&'a dyn TokenAcquirer>) -> Self {
        self.acquirer = acquirer;
        self
    }

    pub fn with_prompt(mut self, prompt: Option<&'a dyn TokenPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Resolves a working token. `read_cache` controls only the lookup;
    /// a freshly obtained token is still written to the cache when one is set.
    pub async fn resolve(
        &self,
        explicit: Option<Token>,
        read_cache: bool,
    ) -> Result<Resolution, ResolveError> {
        if let Some(token) = explicit {
            self.validator
                .validate(&token)
                .await
                .map_err(ResolveError::Rejected)?;
            return Ok(self.accept(token, TokenSource::Explicit).await);
        }

        if read_cache {
            if let Some(token) = self.cached().await {
                return Ok(Resolution {
                    token,
                    source: TokenSource::Cache,
                });
            }
        }

        let mut last_error = None;

        if let Some(acquirer) = self.acquirer {
            match acquirer.acquire().await {
                Ok(token) => match self.validator.validate(&token).await {
                    Ok(()) => return Ok(self.accept(token, TokenSource::Console).await),
                    Err(e) => {
                        warn!("Console issued a token the API rejects: {}", e);
                        last_error = Some(ResolveError::Rejected(e));
                    }
                },
                Err(e) => {
                    warn!("Console sign-in failed: {}", e);
                    last_error = Some(ResolveError::Console(e));
                }
            }
        }

        if let Some(prompt) = self.prompt {
            let mut retry = false;
            while let Some(token) = prompt.ask(retry).await? {
                match self.validator.validate(&token).await {
                    Ok(()) => return Ok(self.accept(token, TokenSource::Prompt).await),
                    Err(e) => {
                        info!("Pasted token rejected: {}", e);
                        retry = true;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ResolveError::Unavailable))
    }

    async fn cached(&self) -> Option<Token> {
        let cache = self.cache?;
        let token = match cache.load().await {
            Ok(token) => token?,
            Err(e) => {
                warn!("Failed to read cached token at {}: {}", cache.path().display(), e);
                return None;
            }
        };

        match self.validator.validate(&token).await {
            Ok(()) => {
                info!("Loaded previous bearer token {}", redact(token.as_str()));
                Some(token)
            }
            Err(e) => {
                info!("Cached bearer token no longer works: {}", e);
                if let Err(e) = cache.clear().await {
                    warn!("Failed to clear cached token: {}", e);
                }
                None
            }
        }
    }

    async fn accept(&self, token: Token, source: TokenSource) -> Resolution {
        if let Some(cache) = self.cache {
            match cache.store(&token).await {
                Ok(()) => info!("Saved bearer token to {}", cache.path().display()),
                Err(e) => warn!("Failed to cache token at {}: {}", cache.path().display(), e),
            }
        }
        Resolution { token, source }
    }
}
