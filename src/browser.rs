use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task;

// Import chromiumoxide for CDP automation
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, Credentials};
use crate::console::{fetch_token, ConsoleError, ConsolePage, ConsoleSettings, PageError};
use crate::token::Token;

/// `ConsolePage` backed by a live Chrome tab.
pub struct ChromePage {
    page: Page,
}

impl ChromePage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval_json(&self, js: String) -> Result<String, PageError> {
        self.page
            .evaluate(js)
            .await
            .map_err(|e| PageError(format!("Script evaluation failed: {}", e)))?
            .into_value::<String>()
            .map_err(|e| PageError(format!("Unexpected script result: {}", e)))
    }
}

fn js_string(value: &str) -> Result<String, PageError> {
    serde_json::to_string(value).map_err(|e| PageError(e.to_string()))
}

#[async_trait]
impl ConsolePage for ChromePage {
    async fn goto(&self, url: &str) -> Result<(), PageError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| PageError(format!("Navigation failed: {}", e)))?;

        // Wait for page load
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| PageError(format!("Wait for navigation failed: {}", e)))?;
        Ok(())
    }

    async fn exists(&self, selector: &str) -> Result<bool, PageError> {
        let js = format!(
            "JSON.stringify(document.querySelector({}) !== null)",
            js_string(selector)?
        );
        let raw = self.eval_json(js).await?;
        serde_json::from_str(&raw).map_err(|e| PageError(e.to_string()))
    }

    async fn scroll_into_view(&self, selector: &str) -> Result<(), PageError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| PageError(format!("Element '{}' not found: {}", selector, e)))?;
        element
            .scroll_into_view()
            .await
            .map_err(|e| PageError(format!("Scroll to '{}' failed: {}", selector, e)))?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| PageError(format!("Element '{}' not found: {}", selector, e)))?;
        element
            .click()
            .await
            .map_err(|e| PageError(format!("CDP click on '{}' failed: {}", selector, e)))?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), PageError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| PageError(format!("Input element '{}' not found: {}", selector, e)))?;

        // Click to focus, then type
        element
            .click()
            .await
            .map_err(|e| PageError(format!("Failed to focus input '{}': {}", selector, e)))?;
        element
            .type_str(text)
            .await
            .map_err(|e| PageError(format!("Failed to type into '{}': {}", selector, e)))?;
        Ok(())
    }

    async fn value(&self, selector: &str) -> Result<Option<String>, PageError> {
        let js = format!(
            "JSON.stringify((() => {{ const el = document.querySelector({}); return el ? String(el.value ?? '') : null; }})())",
            js_string(selector)?
        );
        let raw = self.eval_json(js).await?;
        serde_json::from_str(&raw).map_err(|e| PageError(e.to_string()))
    }
}

/// Launches Chrome, runs the console routine in one tab, and closes Chrome again.
pub struct HeadlessConsole {
    settings: ConsoleSettings,
    credentials: Credentials,
    headless: bool,
    no_sandbox: bool,
    chrome_executable: Option<PathBuf>,
    show_progress: bool,
}

impl HeadlessConsole {
    pub fn new(config: &AppConfig, credentials: Credentials) -> Self {
        Self {
            settings: ConsoleSettings::from(config),
            credentials,
            headless: config.console.headless,
            no_sandbox: config.console.no_sandbox,
            chrome_executable: config.console.chrome_executable.clone(),
            show_progress: false,
        }
    }

    pub fn headed(mut self, headed: bool) -> Self {
        if headed {
            self.headless = false;
        }
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn browser_config(&self) -> Result<BrowserConfig, ConsoleError> {
        let mut builder = BrowserConfig::builder()
            .window_size(1280, 900)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");
        if !self.headless {
            builder = builder.with_head();
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &self.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|e| ConsoleError::Launch(format!("Failed to build browser config: {}", e)))
    }

    pub async fn acquire(&self) -> Result<Token, ConsoleError> {
        let spinner = self.show_progress.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message("Requesting token from the developer console...");
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        });

        let result = self.run().await;

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }
        result
    }

    async fn run(&self) -> Result<Token, ConsoleError> {
        let config = self.browser_config()?;
        info!(headless = self.headless, "Launching chromium");

        // Launch the browser process
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ConsoleError::Launch(format!("Failed to launch chromium: {}", e)))?;

        // Spawn a background task to process CDP events
        // Without this, the browser connection will stall.
        let handler_task = task::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    debug!("CDP handler event loop ended");
                    break;
                }
            }
        });

        let result = match browser.new_page("about:blank").await {
            Ok(page) => {
                let page = ChromePage::new(page);
                fetch_token(&page, &self.settings, &self.credentials).await
            }
            Err(e) => Err(ConsoleError::Launch(format!(
                "Failed to create initial page: {}",
                e
            ))),
        };

        if let Err(e) = browser.close().await {
            warn!("Error closing browser: {}", e);
        }
        if let Err(e) = browser.wait().await {
            warn!("Error waiting for browser exit: {}", e);
        }
        let _ = handler_task.await;
        debug!("Browser closed");

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console(config: &AppConfig) -> HeadlessConsole {
        HeadlessConsole::new(config, Credentials::new("alice", "secret"))
    }

    #[test]
    fn test_headless_by_default() {
        let config = AppConfig::default();
        let console = console(&config);
        assert!(console.headless);
        assert!(!console.no_sandbox);
        assert!(console.chrome_executable.is_none());
    }

    #[test]
    fn test_headed_flag_overrides_config() {
        let config = AppConfig::default();
        let console = console(&config).headed(true);
        assert!(!console.headless);
    }

    #[test]
    fn test_headed_false_keeps_config_choice() {
        let mut config = AppConfig::default();
        config.console.headless = false;
        let console = console(&config).headed(false);
        assert!(!console.headless);
    }

    #[test]
    fn test_selector_literals_are_escaped() {
        let quoted = js_string("#a\"b").unwrap();
        assert_eq!(quoted, "\"#a\\\"b\"");
    }
}
