use terrace_domain::{AbsResourceInstance, Config, ResourceMode};

use crate::error::ImportError;
use crate::transform::module_instance_config;

/// A resource instance to adopt into state, with the provider-specific id
/// of the existing remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportTarget {
    pub addr: AbsResourceInstance,
    pub id: String,
}

impl ImportTarget {
    /// Parse and check an import address against the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the address is not a resource instance, names a
    /// data resource, lives in an undeclared module, names a resource the
    /// module does not declare, or when `id` is empty.
    pub fn parse(config: &Config, addr: &str, id: &str) -> Result<Self, ImportError> {
        let addr = validate_import_address(config, addr)?;
        if id.trim().is_empty() {
            return Err(ImportError::EmptyId { addr });
        }
        Ok(Self {
            addr,
            id: id.to_string(),
        })
    }
}

/// # Errors
///
/// See [`ImportTarget::parse`].
pub fn validate_import_address(
    config: &Config,
    raw: &str,
) -> Result<AbsResourceInstance, ImportError> {
    let addr: AbsResourceInstance = raw.parse()?;
    if addr.resource.mode != ResourceMode::Managed {
        return Err(ImportError::NotManaged { addr });
    }
    let Some(module) = module_instance_config(config, &addr.module) else {
        return Err(ImportError::UndeclaredModule {
            module: addr.module.to_string(),
        });
    };
    if module.resource(&addr.resource).is_none() {
        return Err(ImportError::UndeclaredResource { addr });
    }
    Ok(addr)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use terrace_domain::{Config, ModuleCallConfig, ModuleConfig, Resource, ResourceConfig};

    use super::{ImportTarget, validate_import_address};
    use crate::error::ImportError;

    fn config() -> Config {
        let mut child = ModuleConfig::default();
        child
            .resources
            .push(ResourceConfig::new(Resource::managed("test_instance", "foo")));
        let mut root = ModuleConfig::default();
        root.resources
            .push(ResourceConfig::new(Resource::managed("test_instance", "bar")));
        root.resources
            .push(ResourceConfig::new(Resource::data("test_data_source", "foo")));
        root.module_calls.push(ModuleCallConfig::new("child", child));
        Config::new(root)
    }

    #[test]
    fn accepts_declared_resources() {
        let addr = validate_import_address(&config(), "module.child.test_instance.foo")
            .expect("valid address");
        assert_eq!(addr.to_string(), "module.child.test_instance.foo");
    }

    #[test]
    fn rejects_invalid_addresses() {
        let error = validate_import_address(&config(), "bananas").expect_err("must fail");
        assert!(error.to_string().contains("Invalid address"));
    }

    #[test]
    fn rejects_module_addresses() {
        let error = validate_import_address(&config(), "module.child").expect_err("must fail");
        assert!(matches!(error, ImportError::InvalidAddress(_)));
        assert!(error.to_string().contains("Invalid address"));
    }

    #[test]
    fn rejects_data_resources() {
        let error =
            validate_import_address(&config(), "data.test_data_source.foo").expect_err("must fail");
        assert!(
            error
                .to_string()
                .contains("A managed resource address is required")
        );
    }

    #[test]
    fn rejects_undeclared_modules() {
        let error =
            validate_import_address(&config(), "module.baz.test_instance.foo").expect_err("must fail");
        assert!(
            error
                .to_string()
                .contains("module.baz is not defined in the configuration")
        );
    }

    #[test]
    fn rejects_undeclared_resources() {
        let error = validate_import_address(&config(), "test_instance.foo").expect_err("must fail");
        assert_eq!(
            error.to_string(),
            "resource address \"test_instance.foo\" does not exist in the configuration"
        );
    }

    #[test]
    fn rejects_empty_ids() {
        let error = ImportTarget::parse(&config(), "test_instance.bar", " ").expect_err("must fail");
        assert!(matches!(error, ImportError::EmptyId { .. }));
    }
}
