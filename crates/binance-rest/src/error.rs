//! Futures REST error types.

use rest_client::RestError;
use thiserror::Error;

/// Errors from the futures REST API.
#[derive(Debug, Error)]
pub enum BinanceRestError {
    /// Transport or HTTP-layer error without a Binance payload.
    #[error("REST client error: {0}")]
    Rest(RestError),

    /// The exchange returned an error body.
    #[error("Binance API error {binance_code} (HTTP {http_code}): {message}")]
    Api {
        http_code: u16,
        binance_code: i32,
        message: String,
        /// Raw response body, kept for diagnostics.
        payload: String,
    },

    /// Listen key has expired or is invalid.
    #[error("listen key expired or invalid")]
    ListenKeyExpired,

    /// Failed to parse a response body.
    #[error("parse error: {0}")]
    Parse(String),

    /// A historical archive was missing or undecodable.
    #[error("archive error: {0}")]
    Archive(String),
}

impl From<RestError> for BinanceRestError {
    /// Lift Binance `{"code": .., "msg": ..}` bodies out of HTTP errors.
    fn from(err: RestError) -> Self {
        match err {
            RestError::Http { status, body } => match parse_error_body(&body) {
                Some((-1125, message)) => {
                    let _ = message;
                    Self::ListenKeyExpired
                }
                Some((code, message)) => Self::Api {
                    http_code: status,
                    binance_code: code,
                    message,
                    payload: body,
                },
                None => Self::Rest(RestError::Http { status, body }),
            },
            other => Self::Rest(other),
        }
    }
}

fn parse_error_body(body: &str) -> Option<(i32, String)> {
    #[derive(serde::Deserialize)]
    struct ApiErrorBody {
        code: i32,
        msg: String,
    }

    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|e| (e.code, e.msg))
}

impl BinanceRestError {
    /// Whether retrying the same request next tick is reasonable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rest(rest_err) => rest_err.is_retryable(),
            // -1000 UNKNOWN, -1001 DISCONNECTED, -1003 TOO_MANY_REQUESTS,
            // -1007 TIMEOUT, -1016 SERVICE_SHUTTING_DOWN
            Self::Api { binance_code, .. } => {
                matches!(binance_code, -1000 | -1001 | -1003 | -1007 | -1016)
            }
            _ => false,
        }
    }

    /// Whether this is a client-side rejection (4xx) that should stay silent
    /// in the conflicting-order canceller.
    pub fn is_client_rejection(&self) -> bool {
        match self {
            Self::Api { http_code, .. } => (400..500).contains(http_code),
            Self::Rest(RestError::Http { status, .. }) => (400..500).contains(status),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_lifted_from_http_body() {
        let err: BinanceRestError = RestError::Http {
            status: 400,
            body: r#"{"code":-2019,"msg":"Margin is insufficient."}"#.into(),
        }
        .into();

        match err {
            BinanceRestError::Api {
                http_code,
                binance_code,
                ref message,
                ..
            } => {
                assert_eq!(http_code, 400);
                assert_eq!(binance_code, -2019);
                assert_eq!(message, "Margin is insufficient.");
            }
            other => panic!("expected Api, got {other:?}"),
        }
        assert!(err.is_client_rejection());
    }

    #[test]
    fn test_listen_key_expiry_code() {
        let err: BinanceRestError = RestError::Http {
            status: 400,
            body: r#"{"code":-1125,"msg":"This listenKey does not exist."}"#.into(),
        }
        .into();
        assert!(matches!(err, BinanceRestError::ListenKeyExpired));
    }

    #[test]
    fn test_unparseable_body_stays_rest() {
        let err: BinanceRestError = RestError::Http {
            status: 502,
            body: "<html>bad gateway</html>".into(),
        }
        .into();
        assert!(matches!(err, BinanceRestError::Rest(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retryable_codes() {
        let retryable: BinanceRestError = RestError::Http {
            status: 500,
            body: r#"{"code":-1001,"msg":"Internal error."}"#.into(),
        }
        .into();
        assert!(retryable.is_retryable());

        let fatal: BinanceRestError = RestError::Http {
            status: 400,
            body: r#"{"code":-2019,"msg":"Margin is insufficient."}"#.into(),
        }
        .into();
        assert!(!fatal.is_retryable());
    }
}
