//! Market-stream WebSocket sessions.
//!
//! One task per subscription, each running connect → read → reconnect with
//! a fixed 10-second backoff. Handlers never block on locks held by other
//! components: each message is parsed and appended to a ring, nothing else.

use crate::parse::{parse_agg_trade, parse_book_ticker, parse_mark_price_array};
use common::BinanceEnvironment;
use futures_util::{SinkExt, StreamExt};
use model::{AggregateTrade, EventRing, QuoteEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Backoff between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Timeout for WebSocket connection attempts.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Which market subscription a task serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamKind {
    /// `!markPrice@arr@1s`, one stream carrying all symbols.
    MarkPriceArray,
    /// `{symbol}@bookTicker`.
    BookTicker(String),
    /// `{symbol}@aggTrade`.
    AggTrade(String),
}

impl StreamKind {
    /// Stream URL for an environment.
    pub fn url(&self, environment: BinanceEnvironment) -> String {
        let base = environment.futures_ws_base_url();
        match self {
            Self::MarkPriceArray => format!("{base}/ws/!markPrice@arr@1s"),
            Self::BookTicker(symbol) => {
                format!("{base}/ws/{}@bookTicker", symbol.to_lowercase())
            }
            Self::AggTrade(symbol) => format!("{base}/ws/{}@aggTrade", symbol.to_lowercase()),
        }
    }
}

/// Run one market stream until shutdown, reconnecting on failure.
///
/// On every reconnect of an `@aggTrade` stream its ring is cleared so stale
/// trades cannot corrupt the next candle synthesis.
pub async fn run_market_stream(
    kind: StreamKind,
    environment: BinanceEnvironment,
    quote_ring: Arc<EventRing<QuoteEvent>>,
    trade_ring: Arc<EventRing<AggregateTrade>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let url = kind.url(environment);

    loop {
        if *shutdown_rx.borrow() {
            info!(url = %url, "shutdown requested, exiting market stream");
            return;
        }

        if matches!(kind, StreamKind::AggTrade(_)) {
            trade_ring.clear();
        }

        match run_session(&url, &kind, &quote_ring, &trade_ring, &mut shutdown_rx).await {
            SessionEnd::Shutdown => {
                info!(url = %url, "market stream closed");
                return;
            }
            SessionEnd::Disconnected(reason) => {
                warn!(url = %url, reason = %reason, "market stream lost, reconnecting");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
        }
    }
}

enum SessionEnd {
    Shutdown,
    Disconnected(String),
}

async fn run_session(
    url: &str,
    kind: &StreamKind,
    quote_ring: &EventRing<QuoteEvent>,
    trade_ring: &EventRing<AggregateTrade>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    info!(url = %url, "connecting to market stream");

    let ws_stream = match tokio::time::timeout(CONNECTION_TIMEOUT, connect_async(url)).await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => return SessionEnd::Disconnected(e.to_string()),
        Err(_) => return SessionEnd::Disconnected("connection timeout".into()),
    };

    info!(url = %url, "market stream connected");
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    let _ = write.close().await;
                    return SessionEnd::Shutdown;
                }
            }

            msg_opt = read.next() => {
                match msg_opt {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(kind, &text, quote_ring, trade_ring);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        debug!("ping, answering pong");
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            return SessionEnd::Disconnected(e.to_string());
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        return SessionEnd::Disconnected("closed by server".into());
                    }
                    Some(Err(e)) => {
                        return SessionEnd::Disconnected(e.to_string());
                    }
                    None => {
                        return SessionEnd::Disconnected("stream ended".into());
                    }
                    _ => {}
                }
            }
        }
    }
}

fn handle_message(
    kind: &StreamKind,
    text: &str,
    quote_ring: &EventRing<QuoteEvent>,
    trade_ring: &EventRing<AggregateTrade>,
) {
    match kind {
        StreamKind::MarkPriceArray => match parse_mark_price_array(text) {
            Ok(prices) => {
                for price in prices {
                    quote_ring.push(QuoteEvent::Mark(price));
                }
            }
            Err(e) => warn!(error = %e, "failed to parse mark-price array"),
        },
        StreamKind::BookTicker(_) => match parse_book_ticker(text) {
            Ok(ticker) => quote_ring.push(QuoteEvent::Book(ticker)),
            Err(e) => warn!(error = %e, "failed to parse book ticker"),
        },
        StreamKind::AggTrade(_) => match parse_agg_trade(text) {
            Ok(trade) => trade_ring.push(trade),
            Err(e) => warn!(error = %e, "failed to parse aggregate trade"),
        },
    }
}
