//! The console sign-in routine.
//!
//! One linear pass over the developer console: open the page, expand the
//! header section, tick both playlist scopes, request a token, sign in, and
//! read the issued token back out of its input field. Every interaction waits
//! for its control to be present instead of sleeping a fixed amount.

use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{AppConfig, ConsoleSelectors, Credentials, TimeoutConfig};
use crate::token::Token;
use crate::utils::redact;

/// Each interaction of the routine, in the order it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Navigate,
    HeaderButton,
    ScopeReadPrivate,
    ScopeReadCollaborative,
    RequestToken,
    Username,
    Password,
    LoginButton,
    TokenField,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Navigate => "navigate",
            Step::HeaderButton => "header button",
            Step::ScopeReadPrivate => "playlist-read-private scope",
            Step::ScopeReadCollaborative => "playlist-read-collaborative scope",
            Step::RequestToken => "request token button",
            Step::Username => "username field",
            Step::Password => "password field",
            Step::LoginButton => "login button",
            Step::TokenField => "token field",
        };
        f.write_str(name)
    }
}

/// Failure reported by a page driver.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct PageError(pub String);

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),
    #[error("Browser error at {step}: {source}")]
    Browser { step: Step, source: PageError },
    #[error("{step} '{selector}' did not appear within {waited_ms}ms")]
    ElementMissing {
        step: Step,
        selector: String,
        waited_ms: u128,
    },
    #[error("Token field '{selector}' was still empty {waited_ms}ms after sign-in")]
    EmptyToken { selector: String, waited_ms: u128 },
    #[error("No credentials configured; set [credentials] in the config file or SPOTIFY_USERNAME and SPOTIFY_PASSWORD")]
    MissingCredentials,
}

impl ConsoleError {
    fn at(step: Step) -> impl FnOnce(PageError) -> ConsoleError {
        move |source| ConsoleError::Browser { step, source }
    }
}

/// The handful of page operations the routine needs.
#[async_trait]
pub trait ConsolePage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), PageError>;
    async fn exists(&self, selector: &str) -> Result<bool, PageError>;
    async fn scroll_into_view(&self, selector: &str) -> Result<(), PageError>;
    async fn click(&self, selector: &str) -> Result<(), PageError>;
    /// Focuses the element, then types `text` into it.
    async fn type_text(&self, selector: &str, text: &str) -> Result<(), PageError>;
    /// Current `value` of an input, or `None` when no element matches.
    async fn value(&self, selector: &str) -> Result<Option<String>, PageError>;
}

#[derive(Debug, Clone)]
pub struct ConsoleSettings {
    pub url: String,
    pub selectors: ConsoleSelectors,
    pub timeouts: TimeoutConfig,
}

impl From<&AppConfig> for ConsoleSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            url: config.console.url.clone(),
            selectors: config.selectors.clone(),
            timeouts: config.timeouts.clone(),
        }
    }
}

/// Polls until `selector` is present, failing once `timeout` has elapsed.
///
/// A failed lookup counts as "not there yet": clicking a control may start a
/// navigation, and queries issued while the old document is torn down fail
/// until the new one is ready. If the control never showed up and the last
/// lookup failed, that failure is reported instead of a missing element.
pub async fn wait_for<P: ConsolePage + ?Sized>(
    page: &P,
    step: Step,
    selector: &str,
    timeout: Duration,
    poll: Duration,
) -> Result<(), ConsoleError> {
    let start = Instant::now();
    let mut last_error = None;
    loop {
        match page.exists(selector).await {
            Ok(true) => {
                debug!("{} ready after {}ms", step, start.elapsed().as_millis());
                return Ok(());
            }
            Ok(false) => last_error = None,
            Err(e) => {
                debug!("{} lookup failed, still waiting: {}", step, e);
                last_error = Some(e);
            }
        }
        if start.elapsed() >= timeout {
            return Err(match last_error {
                Some(source) => ConsoleError::Browser { step, source },
                None => ConsoleError::ElementMissing {
                    step,
                    selector: selector.to_string(),
                    waited_ms: start.elapsed().as_millis(),
                },
            });
        }
        tokio::time::sleep(poll).await;
    }
}

async fn click_when_ready<P: ConsolePage + ?Sized>(
    page: &P,
    step: Step,
    selector: &str,
    timeouts: &TimeoutConfig,
) -> Result<(), ConsoleError> {
    wait_for(page, step, selector, timeouts.element(), timeouts.poll()).await?;
    page.click(selector).await.map_err(ConsoleError::at(step))?;
    debug!("Clicked {}", step);
    Ok(())
}

async fn type_when_ready<P: ConsolePage + ?Sized>(
    page: &P,
    step: Step,
    selector: &str,
    text: &str,
    timeouts: &TimeoutConfig,
) -> Result<(), ConsoleError> {
    wait_for(page, step, selector, timeouts.element(), timeouts.poll()).await?;
    page.type_text(selector, text)
        .await
        .map_err(ConsoleError::at(step))?;
    debug!("Filled {}", step);
    Ok(())
}

/// Waits for the token field to hold a non-blank value and returns it as read.
async fn read_token<P: ConsolePage + ?Sized>(
    page: &P,
    selector: &str,
    timeouts: &TimeoutConfig,
) -> Result<Token, ConsoleError> {
    let start = Instant::now();
    let mut seen = false;
    let mut last_error = None;
    loop {
        match page.value(selector).await {
            Ok(Some(value)) => {
                seen = true;
                last_error = None;
                if let Some(token) = Token::verbatim(value) {
                    return Ok(token);
                }
            }
            Ok(None) => last_error = None,
            // Login navigates back to the console; reads fail until it has loaded.
            Err(e) => {
                debug!("Token field read failed, still waiting: {}", e);
                last_error = Some(e);
            }
        }

        if start.elapsed() >= timeouts.token() {
            let selector = selector.to_string();
            let waited_ms = start.elapsed().as_millis();
            return Err(match (seen, last_error) {
                (true, _) => ConsoleError::EmptyToken {
                    selector,
                    waited_ms,
                },
                (false, Some(source)) => ConsoleError::Browser {
                    step: Step::TokenField,
                    source,
                },
                (false, None) => ConsoleError::ElementMissing {
                    step: Step::TokenField,
                    selector,
                    waited_ms,
                },
            });
        }
        tokio::time::sleep(timeouts.poll()).await;
    }
}

/// Runs the whole sign-in sequence against `page` and returns the issued token.
pub async fn fetch_token<P: ConsolePage + ?Sized>(
    page: &P,
    settings: &ConsoleSettings,
    credentials: &Credentials,
) -> Result<Token, ConsoleError> {
    let s = &settings.selectors;
    let t = &settings.timeouts;

    info!("Opening {}", settings.url);
    page.goto(&settings.url)
        .await
        .map_err(ConsoleError::at(Step::Navigate))?;

    wait_for(page, Step::HeaderButton, &s.header_button, t.element(), t.poll()).await?;
    page.scroll_into_view(&s.header_button)
        .await
        .map_err(ConsoleError::at(Step::HeaderButton))?;
    page.click(&s.header_button)
        .await
        .map_err(ConsoleError::at(Step::HeaderButton))?;

    click_when_ready(page, Step::ScopeReadPrivate, &s.scope_read_private, t).await?;
    click_when_ready(page, Step::ScopeReadCollaborative, &s.scope_read_collaborative, t).await?;
    click_when_ready(page, Step::RequestToken, &s.request_token, t).await?;

    info!("Signing in as {}", credentials.username);
    type_when_ready(page, Step::Username, &s.username, &credentials.username, t).await?;
    type_when_ready(page, Step::Password, &s.password, &credentials.password, t).await?;
    click_when_ready(page, Step::LoginButton, &s.login_button, t).await?;

    let token = read_token(page, &s.token_field, t).await?;
    info!("Token issued: {}", redact(token.as_str()));
    Ok(token)
}
