//! Turns a raw upstream response into either entities or a forwardable error.

use crate::errors::{TriviaError, UpstreamError};
use crate::upstream::UpstreamResponse;
use serde::de::DeserializeOwned;

/// Status >= 400 becomes [`TriviaError::Upstream`] carrying the original
/// status, body and content type. Anything else is decoded as a JSON array
/// of `T`; a body that does not parse is [`TriviaError::Decode`].
pub fn decode_entities<T: DeserializeOwned>(
    response: UpstreamResponse,
) -> Result<Vec<T>, TriviaError> {
    if response.status.as_u16() >= 400 {
        return Err(UpstreamError {
            status: response.status,
            body: response.body,
            content_type: response.content_type,
        }
        .into());
    }

    Ok(serde_json::from_slice(&response.body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::json_response;
    use hyper::StatusCode;
    use hyper::body::Bytes;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Item {
        id: i64,
    }

    #[test]
    fn test_success_decodes() {
        let items: Vec<Item> =
            decode_entities(json_response(StatusCode::OK, r#"[{"id":1},{"id":2}]"#)).unwrap();
        assert_eq!(items, vec![Item { id: 1 }, Item { id: 2 }]);
    }

    #[test]
    fn test_error_status_is_passed_through() {
        let result = decode_entities::<Item>(json_response(
            StatusCode::NOT_FOUND,
            r#"{"error":"not found"}"#,
        ));

        match result {
            Err(TriviaError::Upstream(err)) => {
                assert_eq!(err.status, StatusCode::NOT_FOUND);
                assert_eq!(err.body, Bytes::from_static(br#"{"error":"not found"}"#));
                assert_eq!(err.content_type.as_deref(), Some("application/json"));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_body_is_not_decoded() {
        // A 500 with a body that happens to be a valid array is still an error.
        let result = decode_entities::<Item>(json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"[{"id":1}]"#,
        ));
        assert!(matches!(result, Err(TriviaError::Upstream(_))));
    }

    #[test]
    fn test_malformed_payload() {
        let result = decode_entities::<Item>(json_response(StatusCode::OK, r#"{"id":1}"#));
        assert!(matches!(result, Err(TriviaError::Decode(_))));

        let result = decode_entities::<Item>(json_response(StatusCode::OK, "<html>"));
        assert!(matches!(result, Err(TriviaError::Decode(_))));
    }
}
