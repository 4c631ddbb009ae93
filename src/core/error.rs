use thiserror::Error;

/// Errors are carried as a string code plus a human-readable message. The code
/// namespace is part of the external contract: callers switch on it, so codes
/// are append-only.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct HubError {
    pub code: String,
    pub message: String,
}

impl HubError {
    pub fn validation_failure(error_message: &str) -> HubError {
        HubError {
            code: "bad_request.validation_failure".to_string(),
            message: error_message.to_string(),
        }
    }

    pub fn invalid_parameter(error_message: &str) -> HubError {
        HubError {
            code: "bad_request.invalid_param".to_string(),
            message: error_message.to_string(),
        }
    }

    pub fn parse_failure(error_message: &str) -> HubError {
        HubError {
            code: "bad_request.parse_failure".to_string(),
            message: error_message.to_string(),
        }
    }

    pub fn duplicate(error_message: &str) -> HubError {
        HubError {
            code: "bad_request.duplicate".to_string(),
            message: error_message.to_string(),
        }
    }

    pub fn not_found(error_message: &str) -> HubError {
        HubError {
            code: "not_found".to_string(),
            message: error_message.to_string(),
        }
    }

    pub fn internal_db_error(error_message: &str) -> HubError {
        HubError {
            code: "unavailable.storage_failure".to_string(),
            message: error_message.to_string(),
        }
    }

    pub fn invalid_internal_state(error_message: &str) -> HubError {
        HubError {
            code: "unknown".to_string(),
            message: error_message.to_string(),
        }
    }

    pub fn unauthenticated(error_message: &str) -> HubError {
        HubError {
            code: "unauthenticated".to_string(),
            message: error_message.to_string(),
        }
    }

    pub fn unauthorized(error_message: &str) -> HubError {
        HubError {
            code: "unauthorized".to_string(),
            message: error_message.to_string(),
        }
    }

    pub fn unavailable(error_message: &str) -> HubError {
        HubError {
            code: "unavailable".to_string(),
            message: error_message.to_string(),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.code == "bad_request.duplicate"
    }
}

impl From<crate::storage::db::RocksdbError> for HubError {
    fn from(e: crate::storage::db::RocksdbError) -> HubError {
        HubError {
            code: "unavailable.storage_failure".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<prost::DecodeError> for HubError {
    fn from(e: prost::DecodeError) -> HubError {
        HubError {
            code: "bad_request.parse_failure".to_string(),
            message: e.to_string(),
        }
    }
}
