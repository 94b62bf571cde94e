//! Server-side heartbeat loop against a registry.
//!
//! A server announces itself once, then keeps re-posting the same
//! [`ServerEntry`] on a fixed interval so the registry's TTL never
//! lapses while the server is up. The loop stops permanently on the
//! first failed beat; the entry then expires out of the registry on
//! its own.

use std::time::Duration;

use crate::error::Result;
use crate::registry::{ServerEntry, DEFAULT_TTL};

/// Default beat interval, one minute inside the default registry TTL.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration =
    Duration::from_secs(DEFAULT_TTL.as_secs() - 60);

/// Timeout applied to each registry request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Announce `entry` at `registry_url` and keep it alive.
///
/// One beat is sent before this function returns, so a server is
/// discoverable as soon as registration succeeds. The returned task
/// then beats on `interval`, or [`DEFAULT_HEARTBEAT_INTERVAL`] when
/// `None`, until a beat fails, after which it exits and never
/// retries. An explicit interval must stay shorter than the registry
/// TTL or the entry will flap in and out of the alive list.
///
/// # Errors
///
/// Returns an error when the HTTP client cannot be built or the
/// initial beat is rejected or unreachable.
///
/// # Panics
///
/// Panics when `interval` is `Some(Duration::ZERO)`.
pub async fn start_heartbeat(
    registry_url: &str,
    entry: ServerEntry,
    interval: Option<Duration>,
) -> Result<tokio::task::JoinHandle<()>> {
    let interval = interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);
    let client = reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()?;
    send_beat(&client, registry_url, &entry).await?;
    tracing::debug!(
        url = %registry_url,
        protocol = %entry.protocol,
        address = %entry.address,
        "registered with registry"
    );

    let url = registry_url.to_string();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately and is already covered
        // by the beat sent before this task was spawned.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(error) = send_beat(&client, &url, &entry).await {
                tracing::warn!(%error, url = %url, "heartbeat failed, stopping");
                break;
            }
        }
    });
    Ok(handle)
}

async fn send_beat(client: &reqwest::Client, url: &str, entry: &ServerEntry) -> Result<()> {
    client
        .post(url)
        .json(entry)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}
