//! Shared handle over the resolved configuration.
//!
//! The handle owns the [`Resolver`] it was initialized from, so a
//! reload re-runs the exact same source layers. Readers hold cheap
//! [`Arc`] snapshots; a snapshot taken before a reload stays valid and
//! unchanged for as long as the reader keeps it.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::error::ConfigError;
use crate::config::options::VcmsConfig;
use crate::config::resolve::Resolver;

pub struct ConfigHandle {
    current: ArcSwap<VcmsConfig>,
    resolver: Resolver,
}

impl ConfigHandle {
    /// Run the first resolution and wrap the result.
    pub fn init(resolver: Resolver) -> Result<Self, ConfigError> {
        let config = resolver.resolve()?;
        Ok(Self {
            current: ArcSwap::from_pointee(config),
            resolver,
        })
    }

    /// Snapshot of the current configuration.
    pub fn get(&self) -> Arc<VcmsConfig> {
        self.current.load_full()
    }

    /// Re-run resolution over the stored sources and swap the result
    /// in. On failure the previous configuration stays current.
    pub fn reload(&self) -> Result<Arc<VcmsConfig>, ConfigError> {
        let config = Arc::new(self.resolver.resolve()?);
        self.current.store(config.clone());
        tracing::info!("configuration reloaded");
        Ok(config)
    }
}
