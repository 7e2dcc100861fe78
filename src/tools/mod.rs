//! 工具层：类型映射、Schema 生成、函数注册表、调用分发与内置 FileOps 插件

pub mod executor;
pub mod filesystem;
pub mod plugin;
pub mod registry;
pub mod schema;
pub mod value_type;

pub use executor::{bind_arguments, coerce, parse_arguments, Dispatcher};
pub use filesystem::{FileOps, FsError, SafeFs};
pub use plugin::{CallArguments, ChatPlugin, OperationSpec, ParamDecl};
pub use registry::{FunctionRegistry, FunctionRegistryBuilder, Resolved};
pub use schema::{
    describe, qualified_name, split_qualified_name, FunctionDescriptor, ParameterSpec,
    NAME_SEPARATOR,
};
pub use value_type::{classify, SchemaKind, ValueType};
