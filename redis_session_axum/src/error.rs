use http::StatusCode;
use redis_session::SessionError;

/// Helper trait for converting session errors into a handler's error response
pub trait IntoResponseError<T> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)>;
}

impl<T> IntoResponseError<T> for Result<T, SessionError> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)> {
        self.map_err(|e| {
            let status = match e {
                SessionError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                SessionError::InvalidSessionId(_) => StatusCode::BAD_REQUEST,
                SessionError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis_session::SessionState;

    fn status_of(err: SessionError) -> StatusCode {
        let result: Result<(), SessionError> = Err(err);
        match result.into_response_error() {
            Err((status, _)) => status,
            Ok(()) => panic!("Expected an error response"),
        }
    }

    #[test]
    fn test_store_unavailable() {
        assert_eq!(
            status_of(SessionError::StoreUnavailable("refused".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_client_errors() {
        assert_eq!(
            status_of(SessionError::InvalidSessionId("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(SessionError::Serialization("bad".to_string())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_invalid_state_is_server_error() {
        let err = SessionError::InvalidState {
            operation: "set",
            state: SessionState::Destroyed,
        };
        let result: Result<(), SessionError> = Err(err);
        let (status, message) = result.into_response_error().unwrap_err();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.contains("cannot set while destroyed"));
    }

    #[test]
    fn test_success_case() {
        let result: Result<String, SessionError> = Ok("Success".to_string());
        assert_eq!(result.into_response_error().unwrap(), "Success");
    }
}
