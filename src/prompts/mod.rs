//! 提示词加载
//!
//! 提示词以 `<domain>/<name>` 标识（如 `build/planner`），对应 `<root>/<domain>/<name>.txt`。
//! 文件缺失时回退到编译期内置的默认文本；读取结果按标识缓存。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::PipelineError;

/// 提示词加载器
#[async_trait]
pub trait PromptLoader: Send + Sync {
    async fn load(&self, id: &str) -> Result<String, PipelineError>;
}

/// 内置默认提示词
fn builtin(id: &str) -> Option<&'static str> {
    let text = match id {
        "build/spatial" => include_str!("../../config/prompts/build/spatial.txt"),
        "build/planner" => include_str!("../../config/prompts/build/planner.txt"),
        "build/planner-image" => include_str!("../../config/prompts/build/planner-image.txt"),
        "build/executor" => include_str!("../../config/prompts/build/executor.txt"),
        "build/finalizer" => include_str!("../../config/prompts/build/finalizer.txt"),
        "build/image" => include_str!("../../config/prompts/build/image.txt"),
        "circuit/spatial" => include_str!("../../config/prompts/circuit/spatial.txt"),
        "circuit/planner" => include_str!("../../config/prompts/circuit/planner.txt"),
        "circuit/executor" => include_str!("../../config/prompts/circuit/executor.txt"),
        "circuit/finalizer" => include_str!("../../config/prompts/circuit/finalizer.txt"),
        _ => return None,
    };
    Some(text)
}

/// 从目录读取提示词
pub struct FilePromptLoader {
    root: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

impl FilePromptLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}.txt", id.trim_start_matches('/')))
    }
}

#[async_trait]
impl PromptLoader for FilePromptLoader {
    async fn load(&self, id: &str) -> Result<String, PipelineError> {
        if let Some(text) = self.cache.read().await.get(id) {
            return Ok(text.clone());
        }

        let path = self.path_for(id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => match builtin(id) {
                Some(text) => {
                    tracing::debug!("Prompt {} not found at {}, using built-in", id, path.display());
                    text.to_string()
                }
                None => return Err(PipelineError::Prompt(format!("Prompt not found: {}", id))),
            },
            Err(e) => {
                return Err(PipelineError::Prompt(format!(
                    "Failed to load prompt {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        self.cache.write().await.insert(id.to_string(), text.clone());
        Ok(text)
    }
}

/// 内存中的提示词表（测试用）；`permissive` 模式下未知标识返回占位文本
#[derive(Debug, Default, Clone)]
pub struct StaticPromptLoader {
    prompts: HashMap<String, String>,
    permissive: bool,
}

impl StaticPromptLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permissive() -> Self {
        Self {
            prompts: HashMap::new(),
            permissive: true,
        }
    }

    pub fn with(mut self, id: impl Into<String>, text: impl Into<String>) -> Self {
        self.prompts.insert(id.into(), text.into());
        self
    }
}

#[async_trait]
impl PromptLoader for StaticPromptLoader {
    async fn load(&self, id: &str) -> Result<String, PipelineError> {
        match self.prompts.get(id) {
            Some(text) => Ok(text.clone()),
            None if self.permissive => Ok(format!("[prompt:{}]", id)),
            None => Err(PipelineError::Prompt(format!("Prompt not found: {}", id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_loader_reads_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("build")).unwrap();
        std::fs::write(dir.path().join("build/planner.txt"), "plan carefully").unwrap();

        let loader = FilePromptLoader::new(dir.path());
        assert_eq!(loader.load("build/planner").await.unwrap(), "plan carefully");

        // 缓存命中：删除文件后仍返回旧内容
        std::fs::remove_file(dir.path().join("build/planner.txt")).unwrap();
        assert_eq!(loader.load("build/planner").await.unwrap(), "plan carefully");
    }

    #[tokio::test]
    async fn test_file_loader_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FilePromptLoader::new(dir.path());
        let text = loader.load("circuit/executor").await.unwrap();
        assert!(!text.trim().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_prompt_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FilePromptLoader::new(dir.path());
        let err = loader.load("nope/missing").await.unwrap_err();
        assert_eq!(err.kind(), "PromptError");
    }

    #[tokio::test]
    async fn test_static_loader() {
        let strict = StaticPromptLoader::new().with("a/b", "text");
        assert_eq!(strict.load("a/b").await.unwrap(), "text");
        assert!(strict.load("a/c").await.is_err());
        assert_eq!(
            StaticPromptLoader::permissive().load("a/c").await.unwrap(),
            "[prompt:a/c]"
        );
    }
}
