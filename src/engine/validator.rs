//! 依赖校验器（循环依赖检测）
//!
//! 记录"调用者当前正在加载哪个模块"：每个调用者至多一条未完成的边，
//! 新边覆盖旧边。因此边表描述的是一条路径而不是多重图，沿着边从某个
//! 模块出发即可重建当前活跃的 require 链。
//!
//! ```text
//! A 加载 B，B 加载 C，C 加载 A:
//!
//!   A -> B -> C -> A   ⇒  CyclicDependency [A, B, C, A]
//! ```
//!
//! `track` 与 `untrack` 成对出现在每次 require 前后，`untrack` 由
//! [`EdgeGuard`] 在所有退出路径上执行（包括失败与取消）。

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::error::EngineError;
use super::module::ModuleUnit;
use super::unit::Executable;
use crate::store::{Store, StoreSpace};
use crate::tree::{Instance, InstanceId};

/// 依赖校验器
#[derive(Debug, Clone)]
pub struct DependencyValidator {
    /// 调用者 -> 正在加载的模块
    currently_loading: Store<InstanceId, Arc<ModuleUnit>>,
}

impl DependencyValidator {
    /// 按 id 获取或创建边表
    pub fn new(
        space: &StoreSpace,
        id: &str,
    ) -> Self {
        Self {
            currently_loading: Store::new(space, id),
        }
    }

    /// 记录 `caller` 正在加载 `module`
    ///
    /// 返回的守卫在销毁时撤销这条边。
    pub fn track(
        &self,
        caller: &Instance,
        module: &Arc<ModuleUnit>,
    ) -> EdgeGuard {
        debug!("Tracking '{}' -> '{}'", caller.full_name(), module.identify());
        self.currently_loading.set(caller.id(), module.clone());

        EdgeGuard {
            validator: self.clone(),
            caller: caller.clone(),
            module: module.clone(),
        }
    }

    /// 撤销边 `caller -> module`
    ///
    /// 仅当该调用者的边仍指向 `module` 时才删除，返回是否删除。
    pub fn untrack(
        &self,
        caller: &Instance,
        module: &Arc<ModuleUnit>,
    ) -> bool {
        self.currently_loading
            .remove_if(&caller.id(), |current| Arc::ptr_eq(current, module))
    }

    /// 调用者当前正在加载的模块
    pub fn current(
        &self,
        caller: &Instance,
    ) -> Option<Arc<ModuleUnit>> {
        self.currently_loading.get(&caller.id())
    }

    /// 从 `module` 出发沿边行走，检查循环引用
    ///
    /// 成功时返回以 `module` 开头的依赖链；再次遇到 `module` 时返回
    /// [`EngineError::CyclicDependency`]，携带完整链路。
    pub fn traceback(
        &self,
        module: &Arc<ModuleUnit>,
    ) -> Result<Vec<Arc<ModuleUnit>>, EngineError> {
        let mut chain = vec![module.clone()];
        let mut visited = HashSet::new();
        visited.insert(module.instance().id());

        let mut current = self.currently_loading.get(&module.instance().id());
        while let Some(next) = current {
            chain.push(next.clone());

            if Arc::ptr_eq(&next, module) {
                let chain: Vec<String> = chain.iter().map(|unit| unit.identify()).collect();
                warn!(
                    "Cyclic require detected: {}",
                    chain.join(" -> ")
                );
                return Err(EngineError::CyclicDependency {
                    module: module.identify(),
                    chain,
                });
            }

            // 不经过起点的环不属于本次加载
            if !visited.insert(next.instance().id()) {
                break;
            }

            current = self.currently_loading.get(&next.instance().id());
        }

        Ok(chain)
    }

    /// 未完成的边数
    pub fn len(&self) -> usize {
        self.currently_loading.len()
    }

    pub fn is_empty(&self) -> bool {
        self.currently_loading.is_empty()
    }

    /// 清空边表
    pub fn clear(&self) {
        self.currently_loading.clear();
    }
}

/// 在销毁时撤销一条依赖边
#[must_use = "the edge is untracked as soon as the guard is dropped"]
pub struct EdgeGuard {
    validator: DependencyValidator,
    caller: Instance,
    module: Arc<ModuleUnit>,
}

impl Drop for EdgeGuard {
    fn drop(&mut self) {
        if self.validator.untrack(&self.caller, &self.module) {
            debug!(
                "Untracked '{}' -> '{}'",
                self.caller.full_name(),
                self.module.identify()
            );
        }
    }
}

impl std::fmt::Debug for EdgeGuard {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EdgeGuard")
            .field("caller", &self.caller.full_name())
            .field("module", &self.module.identify())
            .finish()
    }
}
