//! 进程级持久存储
//!
//! 每个存储由一个全局 id 标识。同一 [`StoreSpace`] 中，以相同 id 构造的
//! 多个 [`Store`] 实例共享同一份底层状态，因此重复注入引擎时复用已有状态，
//! 而不是重新创建一份。
//!
//! # 生命周期
//!
//! | 操作 | 效果 |
//! |------|------|
//! | [`Store::new`] | 按 id 获取或创建底层状态 |
//! | [`Store::clear`] | 清空状态，id 仍保留在存储空间中 |
//! | [`Store::destruct`] | 清空状态并从存储空间中移除 id |
//!
//! 存储空间通过句柄显式传入各组件（[`StoreSpace::global`] 为进程级单例），
//! 测试中可以为每个用例构造独立的空间。

pub mod json;

pub use json::{JsonStore, StoreError};

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

/// 存储的底层状态
type SharedState<K, V> = Arc<RwLock<IndexMap<K, V>>>;

/// 变更监听器
type Listener<K> = Arc<dyn Fn(&StoreChange<K>) + Send + Sync>;

/// 进程级存储空间（id -> 底层状态）
static GLOBAL_SPACE: Lazy<StoreSpace> = Lazy::new(StoreSpace::new);

/// 存储空间
///
/// 保存所有命名存储的底层状态。克隆得到的句柄指向同一空间。
#[derive(Clone, Default)]
pub struct StoreSpace {
    stores: Arc<Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>>,
}

impl StoreSpace {
    /// 创建一个独立的空间
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级单例空间
    pub fn global() -> StoreSpace {
        GLOBAL_SPACE.clone()
    }

    /// 检查空间中是否存在指定 id 的存储
    pub fn contains(
        &self,
        id: &str,
    ) -> bool {
        self.stores.lock().contains_key(id)
    }

    /// 所有存储 id
    pub fn ids(&self) -> Vec<String> {
        self.stores.lock().keys().cloned().collect()
    }

    /// 获取或创建 id 对应的底层状态
    fn acquire<K, V>(
        &self,
        id: &str,
    ) -> SharedState<K, V>
    where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let mut stores = self.stores.lock();

        if let Some(existing) = stores.get(id) {
            if let Some(state) = existing.downcast_ref::<SharedState<K, V>>() {
                return state.clone();
            }
            warn!("Store '{}' is reused with a different entry type; replacing it", id);
        }

        let state: SharedState<K, V> = Arc::new(RwLock::new(IndexMap::new()));
        stores.insert(id.to_string(), Arc::new(state.clone()));
        debug!("Created store '{}'", id);
        state
    }

    /// 移除 id（仅当它仍指向 `state` 时）
    fn release<K, V>(
        &self,
        id: &str,
        state: &SharedState<K, V>,
    ) where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let mut stores = self.stores.lock();
        let owned = stores
            .get(id)
            .and_then(|existing| existing.downcast_ref::<SharedState<K, V>>())
            .is_some_and(|current| Arc::ptr_eq(current, state));

        if owned {
            stores.remove(id);
            debug!("Destructed store '{}'", id);
        }
    }
}

impl fmt::Debug for StoreSpace {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StoreSpace")
            .field("ids", &self.ids())
            .finish()
    }
}

/// 存储变更通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange<K> {
    /// 写入了键
    Set(K),
    /// 删除了键
    Deleted(K),
    /// 清空了存储
    Cleared,
}

/// 命名存储
///
/// 对底层状态的类型化视图。监听器属于当前实例，不随底层状态共享。
pub struct Store<K, V> {
    /// 全局标识
    id: String,
    /// 所属空间
    space: StoreSpace,
    /// 底层状态（同 id 的实例共享）
    state: SharedState<K, V>,
    /// 变更监听器
    listeners: Arc<RwLock<Vec<Listener<K>>>>,
}

impl<K, V> Clone for Store<K, V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            space: self.space.clone(),
            state: self.state.clone(),
            listeners: self.listeners.clone(),
        }
    }
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// 按 id 获取或创建存储
    pub fn new(
        space: &StoreSpace,
        id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let state = space.acquire::<K, V>(&id);

        Self {
            id,
            space: space.clone(),
            state,
            listeners: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 获取键对应的值
    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.state.read().get(key).cloned()
    }

    /// 写入值，覆盖已有值
    pub fn set(
        &self,
        key: K,
        value: V,
    ) {
        self.state.write().insert(key.clone(), value);
        self.notify(StoreChange::Set(key));
    }

    /// 删除键，返回键是否存在
    pub fn delete(
        &self,
        key: &K,
    ) -> bool {
        let removed = self.state.write().shift_remove(key).is_some();
        if removed {
            self.notify(StoreChange::Deleted(key.clone()));
        }
        removed
    }

    /// 在同一把锁内检查并删除
    ///
    /// 仅当 `predicate` 对当前值返回 true 时删除。
    pub fn remove_if(
        &self,
        key: &K,
        predicate: impl FnOnce(&V) -> bool,
    ) -> bool {
        let removed = {
            let mut state = self.state.write();
            match state.get(key) {
                Some(value) if predicate(value) => state.shift_remove(key).is_some(),
                _ => false,
            }
        };
        if removed {
            self.notify(StoreChange::Deleted(key.clone()));
        }
        removed
    }

    /// 检查键是否存在
    pub fn has(
        &self,
        key: &K,
    ) -> bool {
        self.state.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    /// 当前状态的副本
    pub fn snapshot(&self) -> IndexMap<K, V> {
        self.state.read().clone()
    }

    /// 清空存储
    pub fn clear(&self) {
        self.state.write().clear();
        self.notify(StoreChange::Cleared);
    }

    /// 清空存储并从存储空间中移除
    pub fn destruct(&self) {
        self.clear();
        self.space.release(&self.id, &self.state);
    }

    /// 注册变更监听器
    pub fn subscribe(
        &self,
        listener: impl Fn(&StoreChange<K>) + Send + Sync + 'static,
    ) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// 用新状态整体替换当前状态
    pub(crate) fn replace_state(
        &self,
        entries: IndexMap<K, V>,
    ) {
        *self.state.write() = entries;
    }

    fn notify(
        &self,
        change: StoreChange<K>,
    ) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(&change);
        }
    }
}

impl<K, V> fmt::Debug for Store<K, V> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("entries", &self.state.read().len())
            .finish()
    }
}
