//! Go-side plugin registration, discovery, and invocation.
//!
//! Registration is atomic: `OnLoad` runs first, then each function's
//! qualified name (`<plugin>_<function>`) is checked against the flat map;
//! on any collision the whole plugin is rolled back via `OnUnload`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{ReplError, Result};

/// A parameter of a plugin function.
#[derive(Debug, Clone)]
pub struct ParamSchema {
    pub name: String,
    pub param_type: String,
    pub description: String,
    pub required: bool,
}

/// A single callable exposed by a plugin.
#[async_trait]
pub trait PluginFunction: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Vec<ParamSchema>;
    async fn call(&self, args: &[String]) -> Result<String>;
}

/// A loadable unit exposing a set of functions under its own namespace.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    async fn on_load(&self) -> Result<()> {
        Ok(())
    }

    async fn on_unload(&self) -> Result<()> {
        Ok(())
    }

    fn functions(&self) -> Vec<Box<dyn PluginFunction>>;
}

struct Registered {
    plugin: Box<dyn Plugin>,
    qualified_names: Vec<String>,
}

/// Flat qualified-name → function lookup plus the registered plugin set.
#[derive(Default)]
pub struct PluginManager {
    plugins: RwLock<HashMap<String, Registered>>,
    functions: RwLock<HashMap<String, usize>>,
    plugin_order: RwLock<Vec<String>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn qualify(plugin_name: &str, function_name: &str) -> String {
        format!("{plugin_name}_{function_name}")
    }

    /// Register a plugin: `OnLoad` runs first; if any qualified function
    /// name already exists, the plugin is rolled back via `OnUnload` and the
    /// registration fails without touching the existing map.
    pub async fn register(&self, plugin: Box<dyn Plugin>) -> Result<()> {
        plugin.on_load().await?;

        let plugin_name = plugin.name().to_string();
        let qualified_names: Vec<String> = plugin
            .functions()
            .iter()
            .map(|f| Self::qualify(&plugin_name, f.name()))
            .collect();

        {
            let functions = self.functions.read().unwrap();
            if let Some(collision) = qualified_names.iter().find(|n| functions.contains_key(*n)) {
                drop(functions);
                let _ = plugin.on_unload().await;
                return Err(ReplError::Validation(format!(
                    "plugin '{plugin_name}' rolled back: function '{collision}' already registered"
                )));
            }
        }

        let mut plugins = self.plugins.write().unwrap();
        let mut functions = self.functions.write().unwrap();
        let mut order = self.plugin_order.write().unwrap();

        if plugins.contains_key(&plugin_name) {
            drop(plugins);
            drop(functions);
            drop(order);
            let _ = plugin.on_unload().await;
            return Err(ReplError::Validation(format!(
                "plugin '{plugin_name}' already registered"
            )));
        }

        for name in &qualified_names {
            functions.insert(name.clone(), 0);
        }
        order.push(plugin_name.clone());
        plugins.insert(
            plugin_name,
            Registered {
                plugin,
                qualified_names,
            },
        );
        Ok(())
    }

    /// Unregister a plugin by name, restoring the prior function set and
    /// invoking `on_unload` exactly once.
    pub async fn unregister(&self, plugin_name: &str) -> Result<()> {
        let registered = {
            let mut plugins = self.plugins.write().unwrap();
            plugins.remove(plugin_name)
        };
        let Some(registered) = registered else {
            return Err(ReplError::UnknownPlugin(plugin_name.to_string()));
        };

        {
            let mut functions = self.functions.write().unwrap();
            for name in &registered.qualified_names {
                functions.remove(name);
            }
        }
        {
            let mut order = self.plugin_order.write().unwrap();
            order.retain(|n| n != plugin_name);
        }

        registered.plugin.on_unload().await
    }

    pub fn list(&self) -> Vec<String> {
        self.plugin_order.read().unwrap().clone()
    }

    /// Call `<plugin>_<function>(args)` by its flat qualified name.
    pub async fn call(&self, qualified_name: &str, args: &[String]) -> Result<String> {
        let plugins = self.plugins.read().unwrap();
        for registered in plugins.values() {
            for func in registered.plugin.functions() {
                if Self::qualify(registered.plugin.name(), func.name()) == qualified_name {
                    // Drop the read guard before the (possibly async) call by
                    // cloning what's needed is not possible across trait
                    // objects; instead we call while holding a shared lock,
                    // which is fine since functions only ever need read access.
                    return func.call(args).await;
                }
            }
        }
        Err(ReplError::UnknownPlugin(qualified_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct EchoFunction;

    #[async_trait]
    impl PluginFunction for EchoFunction {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes back its first argument"
        }
        fn parameters(&self) -> Vec<ParamSchema> {
            vec![ParamSchema {
                name: "text".into(),
                param_type: "string".into(),
                description: "text to echo".into(),
                required: true,
            }]
        }
        async fn call(&self, args: &[String]) -> Result<String> {
            Ok(args.first().cloned().unwrap_or_default())
        }
    }

    struct TestPlugin {
        unload_count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            "test"
        }
        fn description(&self) -> &str {
            "a test plugin"
        }
        async fn on_unload(&self) -> Result<()> {
            self.unload_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn functions(&self) -> Vec<Box<dyn PluginFunction>> {
            vec![Box::new(EchoFunction)]
        }
    }

    #[tokio::test]
    async fn register_then_call_qualified_name() {
        let manager = PluginManager::new();
        let unload_count = Arc::new(AtomicUsize::new(0));
        manager
            .register(Box::new(TestPlugin {
                unload_count: unload_count.clone(),
            }))
            .await
            .unwrap();

        let result = manager.call("test_echo", &["hello".to_string()]).await.unwrap();
        assert_eq!(result, "hello");
        assert_eq!(unload_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unregister_restores_prior_set_and_calls_unload_once() {
        let manager = PluginManager::new();
        let unload_count = Arc::new(AtomicUsize::new(0));
        manager
            .register(Box::new(TestPlugin {
                unload_count: unload_count.clone(),
            }))
            .await
            .unwrap();

        manager.unregister("test").await.unwrap();
        assert_eq!(unload_count.load(Ordering::SeqCst), 1);

        let err = manager.call("test_echo", &[]).await.unwrap_err();
        assert!(matches!(err, ReplError::UnknownPlugin(_)));
    }

    #[tokio::test]
    async fn colliding_function_name_rolls_back_via_on_unload() {
        let manager = PluginManager::new();
        let unload_count_a = Arc::new(AtomicUsize::new(0));
        manager
            .register(Box::new(TestPlugin {
                unload_count: unload_count_a.clone(),
            }))
            .await
            .unwrap();

        let unload_count_b = Arc::new(AtomicUsize::new(0));
        struct CollidingPlugin {
            unload_count: Arc<AtomicUsize>,
        }
        #[async_trait]
        impl Plugin for CollidingPlugin {
            fn name(&self) -> &str {
                "test"
            }
            fn description(&self) -> &str {
                "colliding"
            }
            async fn on_unload(&self) -> Result<()> {
                self.unload_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            fn functions(&self) -> Vec<Box<dyn PluginFunction>> {
                vec![Box::new(EchoFunction)]
            }
        }

        let err = manager
            .register(Box::new(CollidingPlugin {
                unload_count: unload_count_b.clone(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplError::Validation(_)));
        assert_eq!(unload_count_b.load(Ordering::SeqCst), 1);

        // Original registration untouched.
        let result = manager.call("test_echo", &["still here".to_string()]).await.unwrap();
        assert_eq!(result, "still here");
    }

    #[tokio::test]
    async fn unknown_function_is_an_error() {
        let manager = PluginManager::new();
        let err = manager.call("nope_nothing", &[]).await.unwrap_err();
        assert!(matches!(err, ReplError::UnknownPlugin(_)));
    }
}
