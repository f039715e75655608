//! Huddle client - terminal entry point
//!
//! Connects to the real-time endpoint, logs every server-pushed event and
//! forwards each JSON line typed on stdin as an outbound frame.
//!
//! Commands: `/connect` (retry after giving up), `/status`, `/quit`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Context;
use huddle_client::{ClientConfig, ConnectionManager, ConnectionState};
use huddle_shared::ServerEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("huddle_client=debug")),
        )
        .init();

    let config = ClientConfig::from_env().context("loading configuration")?;
    tracing::info!("Using real-time endpoint {}", config.ws_url);

    let manager = ConnectionManager::from_config(&config)?;

    let _events = manager.subscribe_events(log_event);

    let banner = Arc::new(Banner::new(manager.max_reconnect_attempts()));
    {
        let banner = banner.clone();
        manager.on_connect(move || {
            banner.reset();
            tracing::info!("Connected");
        });
    }
    {
        let banner = banner.clone();
        manager.on_disconnect(move || match banner.record_close() {
            BannerState::Reconnecting { attempt, max } => {
                tracing::warn!("Disconnected; reconnecting ({}/{})", attempt, max)
            }
            BannerState::GaveUp => {
                tracing::warn!("Disconnected; gave up reconnecting, type /connect to retry")
            }
        });
    }

    manager.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/connect" => {
                // Only a connect from CLOSED restores the manager's retry budget.
                if manager.state() == ConnectionState::Closed {
                    banner.reset();
                }
                manager.connect();
            }
            "/status" => tracing::info!(
                "state={:?} reconnect_attempts={}",
                manager.state(),
                manager.reconnect_attempts()
            ),
            text => match serde_json::from_str::<serde_json::Value>(text) {
                Ok(payload) => manager.send(&payload),
                Err(e) => tracing::warn!("Not sent, input is not JSON: {}", e),
            },
        }
    }

    manager.disconnect();
    Ok(())
}

/// Tracks closes since the last open or manual connect, mirroring the
/// manager's retry budget.
struct Banner {
    drops: AtomicU32,
    max: u32,
}

#[derive(Debug, PartialEq, Eq)]
enum BannerState {
    Reconnecting { attempt: u32, max: u32 },
    GaveUp,
}

impl Banner {
    fn new(max: u32) -> Self {
        Self {
            drops: AtomicU32::new(0),
            max,
        }
    }

    fn reset(&self) {
        self.drops.store(0, Ordering::SeqCst);
    }

    fn record_close(&self) -> BannerState {
        let n = self.drops.fetch_add(1, Ordering::SeqCst) + 1;
        if n > self.max {
            BannerState::GaveUp
        } else {
            BannerState::Reconnecting {
                attempt: n,
                max: self.max,
            }
        }
    }
}

fn log_event(event: ServerEvent) {
    match event {
        ServerEvent::ChatMessage(msg) => tracing::info!(
            "[chat] {}: {}",
            msg.sender_id.as_deref().unwrap_or("?"),
            msg.content
        ),
        ServerEvent::GroupMessage(msg) => {
            tracing::info!("[group {}] {}: {}", msg.group_id, msg.sender_id, msg.content)
        }
        ServerEvent::JoinRequest(req) => tracing::info!(
            "[join request] {} wants to join {}",
            req.requester_name.as_deref().unwrap_or(&req.requester_id),
            req.group_name.as_deref().unwrap_or(&req.group_id)
        ),
        ServerEvent::GroupInvitation(inv) => tracing::info!(
            "[invitation] {} invited you to {}",
            inv.inviter_name.as_deref().unwrap_or(&inv.inviter_id),
            inv.group_name.as_deref().unwrap_or(&inv.group_id)
        ),
        ServerEvent::UserStatus(status) => tracing::info!(
            "[status] {} is {}",
            status.user_id,
            if status.online { "online" } else { "offline" }
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closes(banner: &Banner, n: usize) -> Vec<BannerState> {
        (0..n).map(|_| banner.record_close()).collect()
    }

    #[test]
    fn gives_up_after_the_budget() {
        let banner = Banner::new(5);
        let states = closes(&banner, 6);
        assert_eq!(states[0], BannerState::Reconnecting { attempt: 1, max: 5 });
        assert_eq!(states[4], BannerState::Reconnecting { attempt: 5, max: 5 });
        assert_eq!(states[5], BannerState::GaveUp);
    }

    #[test]
    fn manual_connect_after_giving_up_counts_from_one() {
        let banner = Banner::new(5);
        closes(&banner, 6);

        banner.reset();
        let states = closes(&banner, 6);
        assert_eq!(states[0], BannerState::Reconnecting { attempt: 1, max: 5 });
        assert_eq!(states[4], BannerState::Reconnecting { attempt: 5, max: 5 });
        assert_eq!(states[5], BannerState::GaveUp);
    }

    #[test]
    fn open_resets_the_count() {
        let banner = Banner::new(2);
        closes(&banner, 2);
        banner.reset();
        assert_eq!(
            banner.record_close(),
            BannerState::Reconnecting { attempt: 1, max: 2 }
        );
    }
}
