//! JSON 文件存储
//!
//! 在 [`Store`] 之上叠加持久化：每次变更后把整个映射写回 JSON 文件。
//! 存储 id 为规范化后的文件路径，因此同一文件只对应一份状态。

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use super::{SharedState, Store, StoreSpace};

/// JSON 存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    /// 路径不是文件
    #[error("File at '{0}' must be a JSON file")]
    NotAFile(PathBuf),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 编解码错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 以 JSON 文件为后端的存储
#[derive(Debug, Clone)]
pub struct JsonStore<T> {
    /// JSON 文件路径
    path: PathBuf,
    /// 内存状态
    store: Store<String, T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// 打开已有的 JSON 文件
    ///
    /// 文件内容覆盖同 id 存储的当前状态。此后每次变更自动同步到文件。
    pub fn open(
        space: &StoreSpace,
        path: impl AsRef<Path>,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(StoreError::NotAFile(path));
        }

        let entries = read_entries::<T>(&path)?;
        let store = Store::new(space, normalize(&path));
        store.replace_state(entries);

        let sync_path = path.clone();
        let state = store.state.clone();
        store.subscribe(move |_| {
            if let Err(err) = write_entries(&sync_path, &state) {
                warn!("Failed to sync '{}': {}", sync_path.display(), err);
            }
        });

        Ok(Self { path, store })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 内存中的存储视图
    pub fn store(&self) -> &Store<String, T> {
        &self.store
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<T> {
        self.store.get(&key.to_string())
    }

    pub fn set(
        &self,
        key: impl Into<String>,
        value: T,
    ) {
        self.store.set(key.into(), value);
    }

    pub fn delete(
        &self,
        key: &str,
    ) -> bool {
        self.store.delete(&key.to_string())
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// 把当前状态写入文件
    pub fn sync(&self) -> Result<(), StoreError> {
        write_entries(&self.path, &self.store.state)
    }

    /// 丢弃内存中的修改，从文件重新读取
    pub fn revert(&self) -> Result<(), StoreError> {
        let entries = read_entries::<T>(&self.path)?;
        self.store.replace_state(entries);
        Ok(())
    }
}

/// 去掉首尾斜杠并统一分隔符
fn normalize(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .trim_matches('/')
        .to_string()
}

fn read_entries<T: DeserializeOwned>(path: &Path) -> Result<IndexMap<String, T>, StoreError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_entries<T: Serialize>(
    path: &Path,
    state: &SharedState<String, T>,
) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(&*state.read())?;
    fs::write(path, content)?;
    Ok(())
}
