//! HTTP browser session for the registry site
//!
//! A reqwest client with its own cookie jar and rate limiter per worker.
//! Pages come back for any HTTP status; the site renders invalid ids as a
//! server error page, which the extractor classifies, not the transport.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::domain::services::{
    BrowserError, BrowserLauncher, BrowserSession, LoadedPage, LoginConfig, LoginOutcome, SavedSession,
};

/// Settings shared by every browser a launcher creates
#[derive(Debug, Clone)]
pub struct HttpBrowserConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
    pub max_requests_per_second: u32,
}

pub struct HttpBrowser {
    worker_index: usize,
    client: Client,
    jar: Arc<Jar>,
    base_url: Url,
    timeout: Duration,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

/// Login form as found on the login page
#[derive(Debug, Clone, PartialEq, Eq)]
struct LoginForm {
    action: Url,
    fields: Vec<(String, String)>,
}

impl HttpBrowser {
    pub fn new(config: &HttpBrowserConfig, worker_index: usize) -> Result<Self, BrowserError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| BrowserError::InvalidUrl {
            url: config.base_url.clone(),
            message: e.to_string(),
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| BrowserError::Launch(format!("Invalid user agent: {e}")))?,
        );

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .cookie_provider(Arc::clone(&jar))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let per_second = NonZeroU32::new(config.max_requests_per_second)
            .ok_or_else(|| BrowserError::Launch("Rate limit must be greater than 0".into()))?;

        Ok(Self {
            worker_index,
            client,
            jar,
            base_url,
            timeout: config.timeout,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    fn parse_url(url: &str) -> Result<Url, BrowserError> {
        Url::parse(url).map_err(|e| BrowserError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    fn transport_error(&self, url: &str, error: &reqwest::Error) -> BrowserError {
        if error.is_timeout() {
            BrowserError::Timeout {
                url: url.to_string(),
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            BrowserError::Transport {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }

    async fn submit_login(&self, form: LoginForm) -> Result<LoadedPage, BrowserError> {
        self.rate_limiter.until_ready().await;
        let url = form.action.to_string();
        let response = self
            .client
            .post(form.action)
            .form(&form.fields)
            .send()
            .await
            .map_err(|e| self.transport_error(&url, &e))?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let html = response.text().await.map_err(|e| self.transport_error(&url, &e))?;
        Ok(LoadedPage {
            url: final_url,
            status,
            html,
        })
    }
}

/// Build the login submission from the page, or `None` when no login form is shown
fn login_form(page: &LoadedPage, login: &LoginConfig) -> Result<Option<LoginForm>, BrowserError> {
    let parse = |s: &str| Selector::parse(s).map_err(|e| BrowserError::Login(format!("selector {s}: {e}")));
    let user_selector = parse(&format!("input[name=\"{}\"]", login.user_field))?;
    let hidden_selector = parse("input[type=\"hidden\"]")?;
    let submit_selector = parse(&format!("input[name=\"{}\"]", login.submit_field))?;
    let form_selector = parse("form")?;

    let document = Html::parse_document(&page.html);
    if document.select(&user_selector).next().is_none() {
        return Ok(None);
    }

    let page_url = HttpBrowser::parse_url(&page.url)?;
    let action = document
        .select(&form_selector)
        .next()
        .and_then(|form| form.value().attr("action"))
        .filter(|action| !action.trim().is_empty())
        .and_then(|action| page_url.join(action.trim()).ok())
        .unwrap_or(page_url);

    let mut fields: Vec<(String, String)> = document
        .select(&hidden_selector)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            Some((name.to_string(), input.value().attr("value").unwrap_or_default().to_string()))
        })
        .collect();

    let submit_value = document
        .select(&submit_selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .unwrap_or("Login")
        .to_string();

    fields.push((login.user_field.clone(), login.user_id.clone()));
    fields.push((login.password_field.clone(), login.password.clone()));
    fields.push((login.submit_field.clone(), submit_value));

    Ok(Some(LoginForm { action, fields }))
}

#[async_trait]
impl BrowserSession for HttpBrowser {
    async fn navigate(&mut self, url: &str) -> Result<LoadedPage, BrowserError> {
        let target = Self::parse_url(url)?;
        self.rate_limiter.until_ready().await;

        debug!(worker = self.worker_index, url, "Navigating");
        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| self.transport_error(url, &e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let html = response.text().await.map_err(|e| self.transport_error(url, &e))?;

        Ok(LoadedPage {
            url: final_url,
            status,
            html,
        })
    }

    async fn login(&mut self, login: &LoginConfig) -> Result<LoginOutcome, BrowserError> {
        let login_page = self.navigate(&login.login_url).await?;
        let Some(form) = login_form(&login_page, login)? else {
            info!(worker = self.worker_index, "Session cookies accepted, no login needed");
            return Ok(LoginOutcome::AlreadyAuthenticated);
        };

        if !login.has_credentials() {
            warn!(worker = self.worker_index, "Login form shown but no credentials configured");
            return Ok(LoginOutcome::SkippedNoCredentials);
        }

        let after = self.submit_login(form).await?;
        if login_form(&after, login)?.is_some() {
            return Err(BrowserError::Login("login form still shown after submitting credentials".into()));
        }

        info!(worker = self.worker_index, "Logged in");
        Ok(LoginOutcome::LoggedIn)
    }

    fn export_session(&self, site: &str) -> SavedSession {
        let cookies = self
            .jar
            .cookies(&self.base_url)
            .and_then(|header| header.to_str().ok().map(str::to_string))
            .map(|header| {
                header
                    .split(';')
                    .map(str::trim)
                    .filter(|pair| !pair.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        SavedSession {
            site: site.to_string(),
            cookies,
            saved_at: Utc::now(),
        }
    }

    fn restore_session(&mut self, session: &SavedSession) -> Result<(), BrowserError> {
        // all or nothing: a rejected session leaves the jar untouched
        if let Some(bad) = session.cookies.iter().find(|cookie| !cookie.contains('=')) {
            return Err(BrowserError::Session(format!("malformed cookie: {bad}")));
        }
        for cookie in &session.cookies {
            self.jar.add_cookie_str(cookie, &self.base_url);
        }
        debug!(worker = self.worker_index, cookies = session.cookies.len(), "Session restored");
        Ok(())
    }

    async fn close(&mut self) {
        debug!(worker = self.worker_index, "Browser session closed");
    }
}

pub struct HttpBrowserLauncher {
    config: HttpBrowserConfig,
}

impl HttpBrowserLauncher {
    #[must_use]
    pub const fn new(config: HttpBrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for HttpBrowserLauncher {
    async fn launch(&self, worker_index: usize) -> Result<Box<dyn BrowserSession>, BrowserError> {
        Ok(Box::new(HttpBrowser::new(&self.config, worker_index)?))
    }
}
