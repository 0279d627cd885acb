use std::{collections::BTreeMap, sync::Arc};

use tno_model::{ClientConfig, Node, Task};
use tracing::{debug, instrument, trace};

use crate::{Driver, DriverContext, DriverError};

/// Constructor of a driver instance for one task.
pub type DriverFactory = fn(DriverContext) -> Arc<dyn Driver>;

/// Maps driver names to their factories.
#[derive(Default, Clone)]
pub struct DriverRouter {
    factories: BTreeMap<&'static str, DriverFactory>,
}

impl DriverRouter {
    #[inline]
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registers a driver. A later registration under the same name replaces the earlier one.
    #[inline]
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) {
        self.factories.insert(name, factory);
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    #[instrument(level = "trace", skip(self, ctx), fields(task = ctx.task_name()))]
    pub fn build(&self, name: &str, ctx: DriverContext) -> Result<Arc<dyn Driver>, DriverError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| DriverError::UnknownDriver(name.to_string()))?;
        let driver = factory(ctx);
        trace!(driver = driver.name(), "driver built");
        Ok(driver)
    }

    /// Builds the driver named by `task.driver`.
    pub fn for_task(
        &self,
        task: &Task,
        config: Arc<ClientConfig>,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        self.build(&task.driver, DriverContext::new(task.name.clone(), config))
    }

    /// Fingerprints every registered driver and returns the names of the eligible ones.
    ///
    /// Stops at the first driver that reports a configuration error.
    pub fn fingerprint(
        &self,
        config: &ClientConfig,
        node: &mut Node,
    ) -> Result<Vec<&'static str>, DriverError> {
        let shared = Arc::new(config.clone());
        let mut eligible = Vec::new();
        for (name, factory) in &self.factories {
            let driver = factory(DriverContext::new("", Arc::clone(&shared)));
            if driver.fingerprint(config, node)? {
                eligible.push(*name);
            }
        }
        debug!(target: "tno.core.router", drivers = ?eligible, "fingerprint complete");
        Ok(eligible)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{DriverHandle, ExecContext};

    struct Always(&'static str, bool);

    #[async_trait]
    impl Driver for Always {
        fn name(&self) -> &'static str {
            self.0
        }

        fn fingerprint(&self, _: &ClientConfig, node: &mut Node) -> Result<bool, DriverError> {
            if self.1 {
                node.set_attribute(format!("driver.{}", self.0), "1");
            }
            Ok(self.1)
        }

        async fn start(
            &self,
            _: &ExecContext,
            _: &Task,
        ) -> Result<Box<dyn DriverHandle>, DriverError> {
            Err(DriverError::Launch("not supported".into()))
        }

        async fn open(
            &self,
            _: &ExecContext,
            _: &str,
        ) -> Result<Box<dyn DriverHandle>, DriverError> {
            Err(DriverError::Lookup("not supported".into()))
        }
    }

    fn yes(_: DriverContext) -> Arc<dyn Driver> {
        Arc::new(Always("yes", true))
    }

    fn no(_: DriverContext) -> Arc<dyn Driver> {
        Arc::new(Always("no", false))
    }

    #[test]
    fn build_known_and_unknown() {
        let mut router = DriverRouter::new();
        router.register("yes", yes);

        let cfg = Arc::new(ClientConfig::new());
        let driver = router.build("yes", DriverContext::new("web", cfg.clone())).unwrap();
        assert_eq!(driver.name(), "yes");

        let err = router.build("docker", DriverContext::new("web", cfg)).err().unwrap();
        assert!(matches!(err, DriverError::UnknownDriver(name) if name == "docker"));
    }

    #[test]
    fn for_task_uses_task_driver() {
        let mut router = DriverRouter::new();
        router.register("yes", yes);

        let task = Task::new("web", "yes");
        let driver = router.for_task(&task, Arc::new(ClientConfig::new())).unwrap();
        assert_eq!(driver.name(), "yes");
    }

    #[test]
    fn fingerprint_collects_eligible_drivers() {
        let mut router = DriverRouter::new();
        router.register("yes", yes);
        router.register("no", no);

        let mut node = Node::new("n1", "node-1");
        let eligible = router.fingerprint(&ClientConfig::new(), &mut node).unwrap();

        assert_eq!(eligible, vec!["yes"]);
        assert_eq!(node.attribute("driver.yes"), Some("1"));
        assert_eq!(node.attribute("driver.no"), None);
        assert_eq!(router.names().collect::<Vec<_>>(), vec!["no", "yes"]);
    }
}
