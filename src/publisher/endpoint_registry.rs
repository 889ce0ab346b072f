use async_trait::async_trait;
use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;

use crate::EndpointRegistrationModel;
use crate::Result;

/// Resolves endpoint ids handed to the configuration service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EndpointRegistry: Send + Sync + 'static {
    async fn get_endpoint(
        &self,
        endpoint_id: &str,
    ) -> Result<Option<EndpointRegistrationModel>>;
}

/// Registry backed by registrations handed in at startup
#[derive(Debug, Default)]
pub struct StaticEndpointRegistry {
    endpoints: DashMap<String, EndpointRegistrationModel>,
}

impl StaticEndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        registration: EndpointRegistrationModel,
    ) {
        self.endpoints.insert(registration.id.clone(), registration);
    }

    pub fn unregister(
        &self,
        endpoint_id: &str,
    ) -> Option<EndpointRegistrationModel> {
        self.endpoints.remove(endpoint_id).map(|(_, r)| r)
    }
}

#[async_trait]
impl EndpointRegistry for StaticEndpointRegistry {
    async fn get_endpoint(
        &self,
        endpoint_id: &str,
    ) -> Result<Option<EndpointRegistrationModel>> {
        Ok(self.endpoints.get(endpoint_id).map(|r| r.clone()))
    }
}
