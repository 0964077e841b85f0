//! Chromium discovery and launch.
//!
//! Finds a system Chrome/Chromium (env override, well-known paths, `which`)
//! or downloads a managed build, then launches it with the service's
//! standard argument set. Each launch gets its own user-data directory.

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Locate a Chrome/Chromium executable on this machine.
pub async fn find_browser_executable() -> Result<PathBuf> {
    // CHROMIUM_PATH overrides all other discovery.
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!("CHROMIUM_PATH points to a non-existent file: {}", path.display());
    }

    let paths = if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    for path_str in paths {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("found browser at: {}", path.display());
            return Ok(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in &["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output()
                && output.status.success()
            {
                let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path_str.is_empty() {
                    let path = PathBuf::from(path_str);
                    info!("found browser via which: {}", path.display());
                    return Ok(path);
                }
            }
        }
    }

    warn!("no Chrome/Chromium executable found, will download a managed build");
    anyhow::bail!("Chrome/Chromium executable not found")
}

/// Download a managed Chromium build into the cache directory.
pub async fn download_managed_browser() -> Result<PathBuf> {
    let download_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("anycrawl")
        .join("chromium");
    tokio::fs::create_dir_all(&download_dir)
        .await
        .context("creating browser download directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&download_dir)
            .build()
            .map_err(|e| anyhow::anyhow!("browser fetcher options: {e}"))?,
    );

    info!("downloading managed Chromium to {}", download_dir.display());
    let info = fetcher
        .fetch()
        .await
        .context("downloading managed Chromium")?;
    Ok(info.executable_path)
}

/// Options applied at browser launch.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub ignore_ssl_errors: bool,
    pub user_agent: String,
    /// `--proxy-server` value for every request this browser makes.
    pub proxy: Option<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            ignore_ssl_errors: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
        }
    }
}

/// Launch a browser and spawn the task driving its CDP connection.
///
/// Returns the browser, the handler task, and the user-data directory that
/// must be removed when the session is discarded.
pub async fn launch_browser(opts: &LaunchOptions) -> Result<(Browser, JoinHandle<()>, PathBuf)> {
    let chrome_path = match find_browser_executable().await {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    let user_data_dir = std::env::temp_dir().join(format!(
        "anycrawl_chrome_{}_{}",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::create_dir_all(&user_data_dir).context("creating user data directory")?;

    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(Duration::from_secs(30))
        .window_size(1920, 1080)
        .user_data_dir(user_data_dir.clone())
        .chrome_executable(chrome_path);

    if opts.headless {
        config_builder = config_builder.headless_mode(HeadlessMode::default());
    } else {
        config_builder = config_builder.with_head();
    }

    config_builder = config_builder
        .arg(format!("--user-agent={}", opts.user_agent))
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-extensions")
        .arg("--disable-popup-blocking")
        .arg("--disable-background-networking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-breakpad")
        .arg("--disable-hang-monitor")
        .arg("--disable-ipc-flooding-protection")
        .arg("--disable-prompt-on-repost")
        .arg("--metrics-recording-only")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--no-sandbox");

    if opts.ignore_ssl_errors {
        config_builder = config_builder.arg("--ignore-certificate-errors");
    }
    if let Some(proxy) = &opts.proxy {
        config_builder = config_builder.arg(format!("--proxy-server={proxy}"));
    }

    let browser_config = config_builder
        .build()
        .map_err(|e| anyhow::anyhow!("building browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .context("launching browser")?;

    let handler_task = task::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                let error_msg = e.to_string();
                // Chrome emits CDP events chromiumoxide doesn't model; those
                // deserialization misses are noise, not faults.
                let benign = error_msg
                    .contains("data did not match any variant of untagged enum Message")
                    || error_msg.contains("Failed to deserialize WS response");
                if benign {
                    trace!("suppressed benign CDP serialization error: {error_msg}");
                } else {
                    error!("browser handler error: {e:?}");
                }
            }
        }
        trace!("browser handler task completed");
    });

    Ok((browser, handler_task, user_data_dir))
}
