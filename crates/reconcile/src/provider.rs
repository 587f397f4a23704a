//! Provider capability interface
//!
//! A provider owns the real lifecycle of one [`ResourceKind`]. The
//! reconciler never talks to a cloud API directly: it looks the kind up in
//! a [`ProviderRegistry`] and calls through the [`Provider`] it finds.

use crate::error::{ProviderError, UnsupportedKindError};
use crate::types::{ResourceKind, ResourceSpec};
use std::collections::BTreeMap;
use std::fmt;

/// Capability set for one resource kind
///
/// Implementations are expected to be blocking. Any waiting for a
/// provider-side transition must be bounded (see [`crate::wait`]) and
/// surface as [`ProviderError::Timeout`] when the bound is exceeded.
///
/// # Example
///
/// ```ignore
/// use reconcile::{Provider, ProviderError, ResourceKind, ResourceSpec};
///
/// #[derive(Debug)]
/// struct Buckets;
///
/// impl Provider for Buckets {
///     fn kind(&self) -> ResourceKind {
///         ResourceKind::StorageBucket
///     }
///
///     fn create(&self, spec: &ResourceSpec) -> Result<String, ProviderError> {
///         // call the storage API...
///         Ok(spec.name.clone())
///     }
///
///     fn destroy(&self, _kind: &ResourceKind, id: &str, _region: &str) -> Result<(), ProviderError> {
///         // delete `id`...
///         Ok(())
///     }
/// }
/// ```
pub trait Provider: Send + Sync + fmt::Debug {
    /// The kind this provider manages
    fn kind(&self) -> ResourceKind;

    /// Whether tracked resources of this kind are converged in place
    ///
    /// Kinds that return `false` treat a tracked resource as a no-op.
    fn supports_update(&self) -> bool {
        false
    }

    /// Create the resource and return its provider-assigned identifier
    fn create(&self, spec: &ResourceSpec) -> Result<String, ProviderError>;

    /// Converge an existing resource to match `spec`
    ///
    /// May take several steps (e.g. stop, modify, start), each waiting
    /// for the provider to reach a terminal condition.
    fn update(&self, spec: &ResourceSpec, provider_id: &str) -> Result<(), ProviderError> {
        let _ = (spec, provider_id);
        Err(ProviderError::Other(format!(
            "{} does not support in-place update",
            self.kind()
        )))
    }

    /// Destroy the resource identified by `provider_id`
    fn destroy(
        &self,
        kind: &ResourceKind,
        provider_id: &str,
        region: &str,
    ) -> Result<(), ProviderError>;
}

/// A boxed provider for type-erased storage
pub type BoxedProvider = Box<dyn Provider>;

/// Type dispatch from [`ResourceKind`] to its provider
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ResourceKind, BoxedProvider>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own kind
    ///
    /// Returns the provider it replaced, if any.
    pub fn register(&mut self, provider: BoxedProvider) -> Option<BoxedProvider> {
        self.providers.insert(provider.kind(), provider)
    }

    /// Builder-style [`ProviderRegistry::register`]
    pub fn with(mut self, provider: BoxedProvider) -> Self {
        self.register(provider);
        self
    }

    /// Get the provider for a kind
    pub fn get(&self, kind: &ResourceKind) -> Result<&dyn Provider, UnsupportedKindError> {
        self.providers
            .get(kind)
            .map(AsRef::as_ref)
            .ok_or_else(|| UnsupportedKindError { kind: kind.clone() })
    }

    /// Whether a kind has a provider
    pub fn supports(&self, kind: &ResourceKind) -> bool {
        self.providers.contains_key(kind)
    }

    /// Registered kinds
    pub fn kinds(&self) -> impl Iterator<Item = &ResourceKind> {
        self.providers.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct StaticProvider(ResourceKind);

    impl Provider for StaticProvider {
        fn kind(&self) -> ResourceKind {
            self.0.clone()
        }

        fn create(&self, spec: &ResourceSpec) -> Result<String, ProviderError> {
            Ok(spec.name.clone())
        }

        fn destroy(&self, _: &ResourceKind, _: &str, _: &str) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_dispatch() {
        let registry = ProviderRegistry::new()
            .with(Box::new(StaticProvider(ResourceKind::StorageBucket)));

        assert!(registry.supports(&ResourceKind::StorageBucket));
        assert!(registry.get(&ResourceKind::StorageBucket).is_ok());

        let err = registry.get(&ResourceKind::ComputeInstance).unwrap_err();
        assert_eq!(err.kind, ResourceKind::ComputeInstance);
    }

    #[test]
    fn test_registry_rejects_unknown_kind() {
        let registry = ProviderRegistry::new()
            .with(Box::new(StaticProvider(ResourceKind::StorageBucket)));
        let kind = ResourceKind::parse("gcp_bucket");
        assert!(registry.get(&kind).is_err());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ProviderRegistry::new();
        assert!(
            registry
                .register(Box::new(StaticProvider(ResourceKind::StorageBucket)))
                .is_none()
        );
        assert!(
            registry
                .register(Box::new(StaticProvider(ResourceKind::StorageBucket)))
                .is_some()
        );
        assert_eq!(registry.kinds().count(), 1);
    }

    #[test]
    fn test_default_update_refuses() {
        let provider = StaticProvider(ResourceKind::StorageBucket);
        let spec = ResourceSpec::new(ResourceKind::StorageBucket, "a", "us-east-1");
        assert!(!provider.supports_update());
        assert!(provider.update(&spec, "a").is_err());
    }
}
