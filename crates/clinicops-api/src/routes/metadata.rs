//! Tenant, actor and client context taken from request headers.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use clinicops_core::command::CommandMetadata;
use clinicops_core::error::DomainError;
use clinicops_core::event::ClientInfo;
use uuid::Uuid;

use crate::error::ApiError;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";
pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const DEVICE_HEADER: &str = "x-device-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Command metadata for the calling tenant. Rejects requests without a
/// valid `x-tenant-id`.
#[derive(Debug, Clone)]
pub struct RequestMetadata(pub CommandMetadata);

impl RequestMetadata {
    #[must_use]
    pub fn tenant_id(&self) -> Uuid {
        self.0.tenant_id
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestMetadata {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(from_headers(&parts.headers)?))
    }
}

fn from_headers(headers: &HeaderMap) -> Result<CommandMetadata, DomainError> {
    let tenant_id = uuid_header(headers, TENANT_HEADER)?
        .ok_or_else(|| DomainError::invalid(TENANT_HEADER, "header is required"))?;
    let mut metadata = CommandMetadata::for_tenant(tenant_id);
    metadata.actor_id = uuid_header(headers, ACTOR_HEADER)?;
    metadata.correlation_id = uuid_header(headers, CORRELATION_HEADER)?;

    let client = ClientInfo {
        user_agent: text_header(headers, axum::http::header::USER_AGENT.as_str()),
        ip_address: text_header(headers, FORWARDED_FOR_HEADER)
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string())),
        device_id: text_header(headers, DEVICE_HEADER),
    };
    if client.user_agent.is_some() || client.ip_address.is_some() || client.device_id.is_some() {
        metadata.client = Some(client);
    }
    Ok(metadata)
}

fn text_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn uuid_header(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, DomainError> {
    text_header(headers, name)
        .map(|raw| Uuid::parse_str(&raw).map_err(|_| DomainError::invalid(name, "must be a UUID")))
        .transpose()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_headers_fill_actor_correlation_and_client() {
        // Arrange
        let tenant = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_str(&tenant.to_string()).unwrap());
        headers.insert(ACTOR_HEADER, HeaderValue::from_str(&actor.to_string()).unwrap());
        headers.insert("user-agent", HeaderValue::from_static("front-desk/2.1"));
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("10.0.0.7, 172.16.0.1"));

        // Act
        let metadata = from_headers(&headers).unwrap();

        // Assert
        assert_eq!(metadata.tenant_id, tenant);
        assert_eq!(metadata.actor_id, Some(actor));
        assert_eq!(metadata.correlation_id, None);
        let client = metadata.client.unwrap();
        assert_eq!(client.user_agent.as_deref(), Some("front-desk/2.1"));
        assert_eq!(client.ip_address.as_deref(), Some("10.0.0.7"));
        assert_eq!(client.device_id, None);
    }

    #[test]
    fn test_missing_tenant_is_rejected() {
        // Act
        let result = from_headers(&HeaderMap::new());

        // Assert
        match result {
            Err(DomainError::Validation(errors)) => {
                assert_eq!(errors.errors()[0].field, TENANT_HEADER);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_actor_is_rejected() {
        // Arrange
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap());
        headers.insert(ACTOR_HEADER, HeaderValue::from_static("front-desk"));

        // Act
        let result = from_headers(&headers);

        // Assert
        match result {
            Err(DomainError::Validation(errors)) => {
                assert_eq!(errors.errors()[0].field, ACTOR_HEADER);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }
}
