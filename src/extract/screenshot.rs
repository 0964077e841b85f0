//! Screenshot capture over CDP.
//!
//! Full-page capture overrides the device metrics to the document size
//! before capturing; any failure in the override path falls back to the
//! engine's default capture.

use anyhow::{Context, Result};
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::emulation::{
    ClearDeviceMetricsOverrideParams, SetDeviceMetricsOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, GetLayoutMetricsParams,
};
use tracing::warn;

const SCREENSHOT_QUALITY: i64 = 100;

/// Capture a JPEG screenshot; quality 100, full page when requested.
pub async fn capture(page: &Page, full_page: bool) -> Result<Vec<u8>> {
    if full_page {
        match capture_full_page(page).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => warn!("full-page capture failed, falling back to viewport: {e:#}"),
        }
    }

    capture_viewport(page).await
}

async fn capture_viewport(page: &Page) -> Result<Vec<u8>> {
    let params = CaptureScreenshotParams {
        format: Some(CaptureScreenshotFormat::Jpeg),
        quality: Some(SCREENSHOT_QUALITY),
        ..Default::default()
    };
    page.screenshot(params).await.context("capturing screenshot")
}

async fn capture_full_page(page: &Page) -> Result<Vec<u8>> {
    let metrics = page
        .execute(GetLayoutMetricsParams::default())
        .await
        .context("reading layout metrics")?;

    let content = &metrics.css_content_size;
    let width = content.width.ceil() as i64;
    let height = content.height.ceil() as i64;
    if width == 0 || height == 0 {
        anyhow::bail!("document has zero content size");
    }

    let override_params = SetDeviceMetricsOverrideParams::builder()
        .width(width)
        .height(height)
        .device_scale_factor(1.0)
        .mobile(false)
        .build()
        .map_err(|e| anyhow::anyhow!("building device metrics override: {e}"))?;
    page.execute(override_params)
        .await
        .context("overriding device metrics")?;

    let result = page
        .screenshot(CaptureScreenshotParams {
            format: Some(CaptureScreenshotFormat::Jpeg),
            quality: Some(SCREENSHOT_QUALITY),
            capture_beyond_viewport: Some(true),
            ..Default::default()
        })
        .await
        .context("capturing full-page screenshot");

    // Restore the viewport whether or not the capture worked.
    if let Err(e) = page.execute(ClearDeviceMetricsOverrideParams::default()).await {
        warn!("clearing device metrics override failed: {e}");
    }

    result
}
