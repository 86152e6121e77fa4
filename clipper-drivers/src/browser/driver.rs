use super::fingerprint::UserAgentProfile;
use super::stealth::{build_launch_arguments, CORE_EVASIONS};
use crate::{BrowserConfig, BrowserElement, BrowserLauncher, BrowserSession, DriverError};
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use std::collections::HashMap;
use webdriver::capabilities::Capabilities;

/// Starts Chrome sessions through a running WebDriver service.
#[derive(Debug, Clone, Default)]
pub struct FantocciniLauncher;

impl FantocciniLauncher {
    pub fn new() -> Self {
        Self
    }
}

fn chrome_capabilities(config: &BrowserConfig) -> Capabilities {
    let profile = UserAgentProfile::desktop(&config.user_agent, config.viewport);
    let mut chrome_opts = HashMap::new();
    chrome_opts.insert("args".to_string(), json!(build_launch_arguments(config, &profile)));
    chrome_opts.insert("excludeSwitches".to_string(), json!(["enable-automation"]));

    let mut caps = Capabilities::new();
    caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));
    caps.insert(
        "timeouts".to_string(),
        json!({ "pageLoad": config.navigate_timeout_ms }),
    );
    caps
}

#[async_trait]
impl BrowserLauncher for FantocciniLauncher {
    async fn launch(&self, config: &BrowserConfig) -> Result<Box<dyn BrowserSession>, DriverError> {
        let client = ClientBuilder::native()
            .capabilities(chrome_capabilities(config))
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;
        tracing::debug!(webdriver=%config.webdriver_url, headless=config.headless, "browser.launched");
        Ok(Box::new(FantocciniSession {
            client: Some(client),
        }))
    }
}

/// One WebDriver session. `client` is `None` once closed.
pub struct FantocciniSession {
    client: Option<Client>,
}

impl FantocciniSession {
    fn client(&self) -> Result<&Client, DriverError> {
        self.client.as_ref().ok_or(DriverError::Closed)
    }
}

#[async_trait]
impl BrowserSession for FantocciniSession {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        let client = self.client()?;
        client.goto(url).await.map_err(|e| DriverError::Navigate {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        if let Err(e) = client.execute(CORE_EVASIONS, vec![]).await {
            tracing::debug!(error=%e, "browser.evasions_failed");
        }
        Ok(())
    }

    async fn find_by_selector(
        &self,
        selector: &str,
    ) -> Result<Vec<Box<dyn BrowserElement>>, DriverError> {
        let elements = self
            .client()?
            .find_all(Locator::Css(selector))
            .await
            .map_err(|e| DriverError::Command(e.to_string()))?;
        Ok(elements
            .into_iter()
            .map(|element| Box::new(FantocciniElement { element }) as Box<dyn BrowserElement>)
            .collect())
    }

    async fn rendered_html(&self) -> Result<String, DriverError> {
        self.client()?
            .source()
            .await
            .map_err(|e| DriverError::Command(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        client
            .close()
            .await
            .map_err(|e| DriverError::Command(e.to_string()))?;
        tracing::debug!("browser.closed");
        Ok(())
    }
}

pub struct FantocciniElement {
    element: Element,
}

#[async_trait]
impl BrowserElement for FantocciniElement {
    async fn text(&self) -> Result<String, DriverError> {
        self.element
            .text()
            .await
            .map_err(|e| DriverError::Command(e.to_string()))
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, DriverError> {
        self.element
            .attr(name)
            .await
            .map_err(|e| DriverError::Command(e.to_string()))
    }

    async fn click(&self) -> Result<(), DriverError> {
        self.element
            .click()
            .await
            .map_err(|e| DriverError::Command(e.to_string()))
    }
}
