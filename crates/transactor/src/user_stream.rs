//! User-data stream lifecycle.
//!
//! POSTs a listen key at startup and every 60 minutes; when the returned
//! key differs from the one in the current URL the old stream is closed
//! and a new one opened. `listenKeyExpired` triggers the same rotation
//! immediately. Reconnects back off exponentially.

use crate::events::{parse_user_event, UserEvent};
use crate::transactor::Transactor;
use common::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Listen-key refresh cadence.
const KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Timeout for WebSocket connection attempts.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

enum SessionEnd {
    Shutdown,
    /// The key changed or expired; reconnect with a fresh key, no backoff.
    KeyRotate,
    Error(String),
}

/// Run the user-data stream until shutdown.
pub async fn run_user_stream(
    transactor: Arc<Transactor>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = ExponentialBackoff::default();

    loop {
        if *shutdown_rx.borrow() {
            info!("shutdown requested, exiting user stream");
            return;
        }

        let listen_key = match transactor.client().create_listen_key().await {
            Ok(key) => {
                backoff.reset();
                key
            }
            Err(e) => {
                warn!(error = %e, "failed to create listen key");
                let delay = backoff.next_delay();
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
                continue;
            }
        };

        match run_session(&transactor, &listen_key, &mut shutdown_rx).await {
            SessionEnd::Shutdown => {
                info!("user stream closed");
                return;
            }
            SessionEnd::KeyRotate => {
                info!("listen key rotated, reconnecting");
            }
            SessionEnd::Error(reason) => {
                let delay = backoff.next_delay();
                warn!(
                    reason = %reason,
                    delay_secs = delay.as_secs_f64(),
                    "user stream lost, reconnecting"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn run_session(
    transactor: &Arc<Transactor>,
    listen_key: &str,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let url = format!(
        "{}/ws/{}",
        transactor.client().environment().futures_ws_base_url(),
        listen_key
    );

    let ws_stream = match tokio::time::timeout(CONNECTION_TIMEOUT, connect_async(&url)).await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => return SessionEnd::Error(e.to_string()),
        Err(_) => return SessionEnd::Error("connection timeout".into()),
    };

    info!("user-data stream connected");
    let (mut write, mut read) = ws_stream.split();

    let mut refresh = tokio::time::interval(KEY_REFRESH_INTERVAL);
    refresh.tick().await; // skip the immediate first tick

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    let _ = write.close().await;
                    return SessionEnd::Shutdown;
                }
            }

            _ = refresh.tick() => {
                match transactor.client().create_listen_key().await {
                    Ok(fresh) if fresh != listen_key => {
                        info!("listen key changed on refresh");
                        let _ = write.close().await;
                        return SessionEnd::KeyRotate;
                    }
                    Ok(_) => {
                        debug!("listen key refreshed, unchanged");
                    }
                    Err(e) => {
                        warn!(error = %e, "listen key refresh failed, will retry");
                    }
                }
            }

            msg_opt = read.next() => {
                match msg_opt {
                    Some(Ok(Message::Text(text))) => {
                        match parse_user_event(&text) {
                            Ok(UserEvent::ListenKeyExpired) => {
                                warn!("listen key expired");
                                let _ = write.close().await;
                                return SessionEnd::KeyRotate;
                            }
                            Ok(UserEvent::Unknown) => {}
                            Ok(event) => transactor.apply_user_event(event),
                            Err(e) => {
                                warn!(error = %e, "failed to parse user-data message");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            return SessionEnd::Error(e.to_string());
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        return SessionEnd::Error("closed by server".into());
                    }
                    Some(Err(e)) => {
                        return SessionEnd::Error(e.to_string());
                    }
                    None => {
                        return SessionEnd::Error("stream ended".into());
                    }
                    _ => {}
                }
            }
        }
    }
}
