//! 函数注册表
//!
//! 启动时由全部插件一次性构建，之后不可变：
//! - 函数目录（FunctionDescriptor 列表，随每次请求发送）；
//! - 限定名 → (插件, 操作名) 的分发表，构建时校验名称合法且全局唯一。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::core::RegistryError;
use crate::tools::{describe, split_qualified_name, ChatPlugin, FunctionDescriptor};

/// 插件标识与操作名：不得包含分隔符，保证限定名可无歧义拆分
fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"))
}

/// 远端协议对函数名的限制
fn function_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid regex"))
}

fn invalid(name: &str, reason: &str) -> RegistryError {
    RegistryError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// 分发目标：插件与其未限定的操作名
struct Handler {
    plugin: Arc<dyn ChatPlugin>,
    operation: String,
}

/// resolve 的结果
pub struct Resolved<'a> {
    pub plugin: &'a Arc<dyn ChatPlugin>,
    pub operation: &'a str,
    pub descriptor: &'a FunctionDescriptor,
}

/// 注册表构建器：按注册顺序收集插件
#[derive(Default)]
pub struct FunctionRegistryBuilder {
    plugins: Vec<Arc<dyn ChatPlugin>>,
}

impl FunctionRegistryBuilder {
    pub fn register(self, plugin: impl ChatPlugin + 'static) -> Self {
        self.register_arc(Arc::new(plugin))
    }

    pub fn register_arc(mut self, plugin: Arc<dyn ChatPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn build(self) -> Result<FunctionRegistry, RegistryError> {
        FunctionRegistry::build(self.plugins)
    }
}

/// 不可变函数注册表
pub struct FunctionRegistry {
    catalog: Vec<FunctionDescriptor>,
    handlers: Vec<Handler>,
    index: HashMap<String, usize>,
    plugin_ids: HashSet<String>,
}

impl FunctionRegistry {
    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder::default()
    }

    /// 由全部插件构建；UnsupportedType、名称非法、插件或函数重名均为启动期错误
    pub fn build(plugins: Vec<Arc<dyn ChatPlugin>>) -> Result<Self, RegistryError> {
        let mut registry = Self {
            catalog: Vec::new(),
            handlers: Vec::new(),
            index: HashMap::new(),
            plugin_ids: HashSet::new(),
        };

        for plugin in plugins {
            let plugin_id = plugin.id().to_string();
            if !identifier_re().is_match(&plugin_id) {
                return Err(invalid(&plugin_id, "plugin id must match [A-Za-z0-9_]+"));
            }
            if !registry.plugin_ids.insert(plugin_id.clone()) {
                return Err(RegistryError::DuplicatePlugin(plugin_id));
            }

            let operations = plugin.operations();
            let descriptors = describe(plugin.as_ref())?;
            for (op, descriptor) in operations.into_iter().zip(descriptors) {
                validate_descriptor(&op.name, &descriptor)?;
                if registry.index.contains_key(&descriptor.name) {
                    return Err(RegistryError::DuplicateFunction(descriptor.name));
                }
                registry
                    .index
                    .insert(descriptor.name.clone(), registry.catalog.len());
                registry.catalog.push(descriptor);
                registry.handlers.push(Handler {
                    plugin: Arc::clone(&plugin),
                    operation: op.name,
                });
            }
            tracing::info!(plugin = %plugin_id, "plugin registered");
        }

        tracing::info!(functions = registry.catalog.len(), "function registry built");
        Ok(registry)
    }

    /// 函数目录（注册顺序、声明顺序稳定）
    pub fn catalog(&self) -> &[FunctionDescriptor] {
        &self.catalog
    }

    pub fn function_names(&self) -> Vec<String> {
        self.catalog.iter().map(|d| d.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// 限定名 → (插件, 操作)；拆分失败、插件不存在或操作不存在均返回 NotFound
    pub fn resolve(&self, qualified_name: &str) -> Result<Resolved<'_>, RegistryError> {
        let not_found = || RegistryError::NotFound(qualified_name.to_string());
        let (plugin_id, _) = split_qualified_name(qualified_name).ok_or_else(not_found)?;
        if !self.plugin_ids.contains(plugin_id) {
            return Err(not_found());
        }
        let &idx = self.index.get(qualified_name).ok_or_else(not_found)?;
        let handler = &self.handlers[idx];
        Ok(Resolved {
            plugin: &handler.plugin,
            operation: &handler.operation,
            descriptor: &self.catalog[idx],
        })
    }
}

fn validate_descriptor(operation: &str, descriptor: &FunctionDescriptor) -> Result<(), RegistryError> {
    if !identifier_re().is_match(operation) {
        return Err(invalid(operation, "operation name must match [A-Za-z0-9_]+"));
    }
    if !function_name_re().is_match(&descriptor.name) {
        return Err(invalid(
            &descriptor.name,
            "function name must match [A-Za-z0-9_-]{1,64}",
        ));
    }
    let mut seen = HashSet::new();
    for param in &descriptor.parameters {
        if param.name.is_empty() {
            return Err(invalid(&descriptor.name, "empty parameter name"));
        }
        if !seen.insert(param.name.as_str()) {
            return Err(invalid(&param.name, "duplicate parameter name"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::Value;

    use super::*;
    use crate::core::SchemaError;
    use crate::tools::{CallArguments, OperationSpec, ParamDecl, ValueType};

    struct StubPlugin {
        id: String,
        ops: Vec<OperationSpec>,
    }

    impl StubPlugin {
        fn new(id: &str, ops: &[&str]) -> Self {
            Self {
                id: id.to_string(),
                ops: ops.iter().map(|o| OperationSpec::new(*o, "")).collect(),
            }
        }
    }

    #[async_trait]
    impl ChatPlugin for StubPlugin {
        fn id(&self) -> &str {
            &self.id
        }

        fn operations(&self) -> Vec<OperationSpec> {
            self.ops.clone()
        }

        async fn invoke(&self, operation: &str, _args: &CallArguments) -> Result<Value, String> {
            Ok(Value::String(format!("{}:{}", self.id, operation)))
        }
    }

    #[test]
    fn test_build_and_resolve() {
        let registry = FunctionRegistry::builder()
            .register(StubPlugin::new("FileOps", &["ReadTextFile", "DeleteFile"]))
            .register(StubPlugin::new("Clock", &["Now"]))
            .build()
            .unwrap();

        assert_eq!(
            registry.function_names(),
            vec!["FileOps-ReadTextFile", "FileOps-DeleteFile", "Clock-Now"]
        );
        let resolved = registry.resolve("Clock-Now").unwrap();
        assert_eq!(resolved.plugin.id(), "Clock");
        assert_eq!(resolved.operation, "Now");
        assert_eq!(resolved.descriptor.name, "Clock-Now");
    }

    #[test]
    fn test_resolve_not_found() {
        let registry = FunctionRegistry::builder()
            .register(StubPlugin::new("FileOps", &["ReadTextFile"]))
            .build()
            .unwrap();

        for name in ["FileOps-Nonexistent", "Other-ReadTextFile", "FileOps", "", "-x"] {
            assert!(
                matches!(registry.resolve(name), Err(RegistryError::NotFound(_))),
                "{name} should not resolve"
            );
        }
    }

    #[test]
    fn test_duplicate_plugin() {
        let err = FunctionRegistry::builder()
            .register(StubPlugin::new("FileOps", &["A"]))
            .register(StubPlugin::new("FileOps", &["B"]))
            .build()
            .err()
            .unwrap();
        assert_eq!(err, RegistryError::DuplicatePlugin("FileOps".into()));
    }

    #[test]
    fn test_duplicate_function() {
        let err = FunctionRegistry::builder()
            .register(StubPlugin::new("FileOps", &["Read", "Read"]))
            .build()
            .err()
            .unwrap();
        assert_eq!(err, RegistryError::DuplicateFunction("FileOps-Read".into()));
    }

    #[test]
    fn test_invalid_names() {
        let err = FunctionRegistry::builder()
            .register(StubPlugin::new("File-Ops", &["Read"]))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::InvalidName { .. }));

        let err = FunctionRegistry::builder()
            .register(StubPlugin::new("FileOps", &["Read File"]))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::InvalidName { .. }));

        let long_op = "x".repeat(70);
        let err = FunctionRegistry::builder()
            .register(StubPlugin::new("FileOps", &[long_op.as_str()]))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::InvalidName { .. }));
    }

    #[test]
    fn test_duplicate_parameter_name() {
        let plugin = StubPlugin {
            id: "FileOps".into(),
            ops: vec![OperationSpec::new("Write", "")
                .param(ParamDecl::required("path", ValueType::Text, ""))
                .param(ParamDecl::optional("path", ValueType::Text, ""))],
        };
        let err = FunctionRegistry::builder().register(plugin).build().err().unwrap();
        assert!(matches!(err, RegistryError::InvalidName { .. }));
    }

    #[test]
    fn test_unsupported_type_stops_build() {
        let plugin = StubPlugin {
            id: "Blob".into(),
            ops: vec![OperationSpec::new("Put", "").param(ParamDecl::required(
                "data",
                ValueType::Other("Stream".into()),
                "",
            ))],
        };
        let err = FunctionRegistry::builder().register(plugin).build().err().unwrap();
        assert!(matches!(
            err,
            RegistryError::Schema(SchemaError::UnsupportedType { .. })
        ));
    }

    proptest! {
        #[test]
        fn resolve_round_trips_every_descriptor(
            plugin_count in 1usize..5,
            op_counts in prop::collection::vec(1usize..6, 5),
        ) {
            let mut builder = FunctionRegistry::builder();
            for p in 0..plugin_count {
                let ops: Vec<String> = (0..op_counts[p]).map(|o| format!("Op_{o}")).collect();
                let op_refs: Vec<&str> = ops.iter().map(String::as_str).collect();
                builder = builder.register(StubPlugin::new(&format!("Plugin{p}"), &op_refs));
            }
            let registry = builder.build().unwrap();

            for p in 0..plugin_count {
                for o in 0..op_counts[p] {
                    let name = format!("Plugin{p}-Op_{o}");
                    let resolved = registry.resolve(&name).unwrap();
                    let plugin_id = format!("Plugin{p}");
                    let operation = format!("Op_{o}");
                    prop_assert_eq!(resolved.plugin.id(), plugin_id.as_str());
                    prop_assert_eq!(resolved.operation, operation.as_str());
                    prop_assert_eq!(resolved.descriptor.name.as_str(), name.as_str());
                }
            }
        }
    }
}
