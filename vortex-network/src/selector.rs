//! Provider selection by network type.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{NetworkError, Result};
use crate::provider::{
    CommandRunner, FakeProvider, LinuxBridgeProvider, NetworkProvider, OvsProvider,
    SystemCommandRunner,
};
use crate::types::NetworkType;

/// Registry that routes each network type to its provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<NetworkType, Arc<dyn NetworkProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry; every type is unsupported until registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the host providers: Linux bridge, OVS (both datapaths) and fake.
    pub fn with_system_defaults() -> Self {
        Self::with_command_runner(Arc::new(SystemCommandRunner::new()))
    }

    /// Host providers that run their substrate commands through `runner`.
    pub fn with_command_runner(runner: Arc<dyn CommandRunner>) -> Self {
        let ovs: Arc<dyn NetworkProvider> = Arc::new(OvsProvider::with_runner(runner.clone()));

        Self::new()
            .with(NetworkType::Bridge, Arc::new(LinuxBridgeProvider::with_runner(runner)))
            .with(NetworkType::System, ovs.clone())
            .with(NetworkType::Netdev, ovs)
            .with(NetworkType::Fake, Arc::new(FakeProvider::new()))
    }

    /// Registry that maps every type onto one shared fake provider.
    pub fn fake_only(fake: Arc<FakeProvider>) -> Self {
        let mut registry = Self::new();
        for ty in NetworkType::ALL {
            registry.register(ty, fake.clone());
        }
        registry
    }

    /// Register (or replace) the provider for a type.
    pub fn register(&mut self, network_type: NetworkType, provider: Arc<dyn NetworkProvider>) {
        self.providers.insert(network_type, provider);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, network_type: NetworkType, provider: Arc<dyn NetworkProvider>) -> Self {
        self.register(network_type, provider);
        self
    }

    /// Keep only the given types.
    pub fn retain(&mut self, enabled: &[NetworkType]) {
        self.providers.retain(|ty, _| enabled.contains(ty));
    }

    /// Select the provider for a network type.
    pub fn select(&self, network_type: NetworkType) -> Result<Arc<dyn NetworkProvider>> {
        let provider = self.providers.get(&network_type).cloned().ok_or_else(|| {
            NetworkError::InvalidSpec(format!("unsupported network type: {}", network_type))
        })?;
        debug!(network_type = %network_type, provider = provider.kind(), "Provider selected");
        Ok(provider)
    }

    /// Types with a registered provider.
    pub fn supported_types(&self) -> Vec<NetworkType> {
        NetworkType::ALL
            .into_iter()
            .filter(|ty| self.providers.contains_key(ty))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_defaults() {
        let registry = ProviderRegistry::with_system_defaults();
        assert_eq!(registry.select(NetworkType::Bridge).unwrap().kind(), "linux-bridge");
        assert_eq!(registry.select(NetworkType::System).unwrap().kind(), "ovs");
        assert_eq!(registry.select(NetworkType::Netdev).unwrap().kind(), "ovs");
        assert_eq!(registry.select(NetworkType::Fake).unwrap().kind(), "fake");
    }

    #[test]
    fn test_unregistered_type_fails_closed() {
        let mut registry = ProviderRegistry::with_system_defaults();
        registry.retain(&[NetworkType::Fake]);

        assert!(matches!(
            registry.select(NetworkType::Bridge),
            Err(NetworkError::InvalidSpec(_))
        ));
        assert_eq!(registry.supported_types(), vec![NetworkType::Fake]);
    }

    #[test]
    fn test_fake_only() {
        let registry = ProviderRegistry::fake_only(Arc::new(FakeProvider::new()));
        for ty in NetworkType::ALL {
            assert_eq!(registry.select(ty).unwrap().kind(), "fake");
        }
    }
}
