//! 沙箱文件系统插件
//!
//! SafeFs 绑定 root_dir，所有路径经 resolve 校验必须在 root 下（禁止 ../ 逃逸；路径或其最近的已存在祖先经符号链接解析后也必须在 root 下）；
//! FileOps 插件基于 SafeFs 提供读 / 写 / 删除 / 列目录四个操作。

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::tools::{CallArguments, ChatPlugin, OperationSpec, ParamDecl, ValueType};

#[derive(Error, Debug)]
pub enum FsError {
    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("{op} failed for '{path}': {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 沙箱文件系统：绑定根目录，resolve 校验路径在根下，防止路径逃逸
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self { root_dir }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 解析为根目录下的绝对路径；目标可以不存在（写文件时）
    pub fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let escape = || FsError::PathEscape(path.to_string());
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root_dir.join(candidate)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(escape());
                    }
                }
                other => normalized.push(other.as_os_str()),
            }
        }
        if !normalized.starts_with(&self.root_dir) {
            return Err(escape()); // 如 ../../etc/passwd
        }
        // 最近的已存在祖先（含自身）规范化后仍须在根下，防止经符号链接目录逃逸
        let mut existing = normalized.as_path();
        loop {
            if existing.symlink_metadata().is_ok() {
                // 悬空链接无法规范化，一律拒绝
                let canonical = existing.canonicalize().map_err(|_| escape())?;
                if !canonical.starts_with(&self.root_dir) {
                    return Err(escape());
                }
                break;
            }
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        Ok(normalized)
    }

    pub fn read_file(&self, path: &str) -> Result<String, FsError> {
        let resolved = self.resolve(path)?;
        std::fs::read_to_string(&resolved).map_err(|source| FsError::Io {
            op: "read",
            path: path.to_string(),
            source,
        })
    }

    pub fn write_file(&self, path: &str, contents: &str, append: bool) -> Result<(), FsError> {
        let resolved = self.resolve(path)?;
        let io_err = |source| FsError::Io {
            op: "write",
            path: path.to_string(),
            source,
        };
        if append {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&resolved)
                .map_err(io_err)?;
            file.write_all(contents.as_bytes()).map_err(io_err)
        } else {
            std::fs::write(&resolved, contents).map_err(io_err)
        }
    }

    /// 删除文件；文件本不存在时返回 false
    pub fn delete_file(&self, path: &str) -> Result<bool, FsError> {
        let resolved = self.resolve(path)?;
        match std::fs::remove_file(&resolved) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(FsError::Io {
                op: "delete",
                path: path.to_string(),
                source,
            }),
        }
    }

    pub fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let base = if path.is_empty() || path == "." {
            self.root_dir.clone()
        } else {
            self.resolve(path)?
        };
        let io_err = |source| FsError::Io {
            op: "list",
            path: path.to_string(),
            source,
        };
        let mut entries = Vec::new();
        for e in std::fs::read_dir(&base).map_err(io_err)? {
            let e = e.map_err(io_err)?;
            let name = e.file_name().to_string_lossy().to_string();
            if !name.starts_with('.') {
                let ty = if e.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                    "/"
                } else {
                    ""
                };
                entries.push(format!("{}{}", name, ty));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

/// FileOps 插件：ReadTextFile / WriteTextFile / DeleteFile / ListDirectory
pub struct FileOps {
    fs: SafeFs,
}

impl FileOps {
    pub const ID: &'static str = "FileOps";

    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            fs: SafeFs::new(root_dir),
        }
    }
}

#[async_trait]
impl ChatPlugin for FileOps {
    fn id(&self) -> &str {
        Self::ID
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::new("ReadTextFile", "Read all the text in the file").param(
                ParamDecl::required("path", ValueType::Text, "The file to open for reading"),
            ),
            OperationSpec::new("WriteTextFile", "Write the content to the file")
                .param(ParamDecl::required("path", ValueType::Text, "The file to write to"))
                .param(ParamDecl::required(
                    "contents",
                    ValueType::Text,
                    "The string to write to the file",
                ))
                .param(ParamDecl::optional(
                    "append",
                    ValueType::Boolean,
                    "Append to the end of the file instead of overwriting it",
                )),
            OperationSpec::new("DeleteFile", "Delete the file, return true if it succeeded.")
                .param(ParamDecl::required(
                    "path",
                    ValueType::Text,
                    "The name of the file to be deleted",
                )),
            OperationSpec::new(
                "ListDirectory",
                "List the entries of a directory; directories end with '/'",
            )
            .param(ParamDecl::optional(
                "path",
                ValueType::Text,
                "The directory to list, defaults to the working directory",
            )),
        ]
    }

    async fn invoke(&self, operation: &str, args: &CallArguments) -> Result<Value, String> {
        tracing::info!(operation = %operation, "file ops invoke");
        match operation {
            "ReadTextFile" => {
                let text = self.fs.read_file(args.str("path")?).map_err(|e| e.to_string())?;
                Ok(Value::String(text))
            }
            "WriteTextFile" => {
                let append = args.opt_bool("append").unwrap_or(false);
                self.fs
                    .write_file(args.str("path")?, args.str("contents")?, append)
                    .map_err(|e| e.to_string())?;
                Ok(Value::Null)
            }
            "DeleteFile" => {
                let deleted = self.fs.delete_file(args.str("path")?).map_err(|e| e.to_string())?;
                Ok(Value::Bool(deleted))
            }
            "ListDirectory" => {
                let path = args.opt_str("path").unwrap_or(".");
                let entries = self.fs.list_dir(path).map_err(|e| e.to_string())?;
                Ok(Value::from(entries))
            }
            other => Err(format!("FileOps has no operation '{other}'")),
        }
    }
}
