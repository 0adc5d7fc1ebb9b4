use std::sync::Arc;

use crate::config::ContainerConfig;
use crate::container::binding::BindingTable;
use crate::container::Container;
use crate::errors::CoreError;

/// Builder for composition roots
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    bindings: Option<Arc<BindingTable>>,
    config: Option<ContainerConfig>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the binding table every container in the tree will share
    pub fn with_bindings(mut self, bindings: impl Into<Arc<BindingTable>>) -> Self {
        self.bindings = Some(bindings.into());
        self
    }

    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configuration from `SCOPEWISE_*` environment variables
    pub fn with_env_config(self) -> Result<Self, CoreError> {
        let config = ContainerConfig::from_env()?;
        Ok(self.with_config(config))
    }

    /// Build the composition root.
    ///
    /// Fails with a configuration error when no binding table was supplied or the
    /// configuration does not validate.
    pub fn build(self) -> Result<Container<'static>, CoreError> {
        let bindings = self.bindings.ok_or_else(|| {
            CoreError::configuration("a binding table is required to build a container")
        })?;

        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Container::with_config(bindings, config))
    }
}
