//! Request extractors.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON body that may be omitted.
///
/// An empty or whitespace-only body yields `T::default()`. Anything else
/// must parse as `T`, or the request is rejected with 422.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionalJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::Unprocessable(e.body_text()))?;
        parse(&bytes).map(OptionalJson)
    }
}

fn parse<T: DeserializeOwned + Default>(bytes: &[u8]) -> Result<T, AppError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes)
        .map_err(|e| AppError::Unprocessable(format!("invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Body {
        interval_secs: Option<u64>,
    }

    #[test]
    fn test_empty_body_is_default() {
        assert_eq!(parse::<Body>(b"").unwrap(), Body::default());
        assert_eq!(parse::<Body>(b"  \n").unwrap(), Body::default());
    }

    #[test]
    fn test_valid_body_parses() {
        let body: Body = parse(br#"{"intervalSecs": 30}"#).unwrap();
        assert_eq!(body.interval_secs, Some(30));
    }

    #[test]
    fn test_malformed_body_rejected() {
        assert!(matches!(
            parse::<Body>(b"{\"intervalSecs\": "),
            Err(AppError::Unprocessable(_))
        ));
        assert!(matches!(
            parse::<Body>(br#"{"intervalSecs": "soon"}"#),
            Err(AppError::Unprocessable(_))
        ));
    }
}
