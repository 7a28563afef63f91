//! Conversions from external infrastructure errors into domain errors.

use clinicflow_common::auth::StorageError;
use clinicflow_domain::ClinicFlowError;
use keyring::Error as KeyringError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub ClinicFlowError);

impl From<InfraError> for ClinicFlowError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<ClinicFlowError> for InfraError {
    fn from(value: ClinicFlowError) -> Self {
        InfraError(value)
    }
}

/// Slot backends report through the auth port's error type.
impl From<InfraError> for StorageError {
    fn from(value: InfraError) -> Self {
        StorageError::Backend(value.0.to_string())
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoClinicFlowError {
    fn into_clinicflow(self) -> ClinicFlowError;
}

/* -------------------------------------------------------------------------- */
/* keyring::Error → ClinicFlowError */
/* -------------------------------------------------------------------------- */

impl IntoClinicFlowError for KeyringError {
    fn into_clinicflow(self) -> ClinicFlowError {
        use KeyringError::*;

        let description = self.to_string();

        match self {
            NoEntry => ClinicFlowError::NotFound("keychain entry not found".into()),
            BadEncoding(_) => {
                ClinicFlowError::Storage("credential in keychain is not valid UTF-8".into())
            }
            TooLong(name, limit) => ClinicFlowError::Storage(format!(
                "keychain attribute '{name}' exceeds platform limit ({limit})"
            )),
            Invalid(attr, reason) => {
                ClinicFlowError::Storage(format!("keychain attribute '{attr}' is invalid: {reason}"))
            }
            PlatformFailure(err) => {
                ClinicFlowError::Storage(format!("keychain platform error: {err}"))
            }
            NoStorageAccess(err) => {
                ClinicFlowError::Storage(format!("unable to access secure storage: {err}"))
            }
            _ => ClinicFlowError::Storage(description),
        }
    }
}

impl From<KeyringError> for InfraError {
    fn from(value: KeyringError) -> Self {
        InfraError(value.into_clinicflow())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → ClinicFlowError */
/* -------------------------------------------------------------------------- */

impl IntoClinicFlowError for HttpError {
    fn into_clinicflow(self) -> ClinicFlowError {
        if self.is_timeout() {
            return ClinicFlowError::Network("HTTP request timed out".into());
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return ClinicFlowError::Network("HTTP connection failure".into());
        }

        if self.is_builder() {
            return ClinicFlowError::InvalidInput(format!("invalid HTTP request: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => ClinicFlowError::Auth(message),
                404 => ClinicFlowError::NotFound(message),
                400..=499 => ClinicFlowError::InvalidInput(message),
                _ => ClinicFlowError::Network(message),
            };
        }

        ClinicFlowError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_clinicflow())
    }
}

/* -------------------------------------------------------------------------- */
/* std::io::Error → ClinicFlowError */
/* -------------------------------------------------------------------------- */

impl IntoClinicFlowError for std::io::Error {
    fn into_clinicflow(self) -> ClinicFlowError {
        use std::io::ErrorKind;

        match self.kind() {
            ErrorKind::NotFound => ClinicFlowError::NotFound(format!("file not found: {self}")),
            ErrorKind::PermissionDenied => {
                ClinicFlowError::Storage(format!("permission denied: {self}"))
            }
            _ => ClinicFlowError::Storage(format!("I/O failure: {self}")),
        }
    }
}

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        InfraError(value.into_clinicflow())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use reqwest::{Client, StatusCode};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn keyring_no_entry_maps_to_not_found() {
        let err = KeyringError::NoEntry;
        let mapped: ClinicFlowError = InfraError::from(err).into();
        match mapped {
            ClinicFlowError::NotFound(msg) => assert!(msg.contains("keychain")),
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn io_permission_denied_maps_to_storage() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let mapped: ClinicFlowError = InfraError::from(err).into();
        assert!(matches!(mapped, ClinicFlowError::Storage(_)));
    }

    #[test]
    fn infra_error_becomes_storage_backend_error() {
        let infra = InfraError(ClinicFlowError::Storage("disk full".into()));
        assert_eq!(
            StorageError::from(infra),
            StorageError::Backend("Storage error: disk full".into())
        );
    }

    #[tokio::test]
    async fn http_status_401_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::UNAUTHORIZED))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        let mapped: ClinicFlowError = InfraError::from(error).into();
        match mapped {
            ClinicFlowError::Auth(msg) => assert!(msg.contains("401")),
            other => panic!("expected auth error, got {:?}", other),
        }
    }
}
