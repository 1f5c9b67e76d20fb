//! 单元注册表
//!
//! 把被包装的对象映射到对应的可执行单元，使单元可以从它包装的对象反查。
//! 底层是进程级 [`Store`]，同一存储空间中以相同 id 构造的注册表共享状态，
//! 重复注入时复用已有条目。

use std::sync::Arc;

use super::module::ModuleUnit;
use super::script::ScriptUnit;
use super::unit::Unit;
use crate::store::{Store, StoreSpace};
use crate::tree::{Instance, InstanceId};

/// 单元注册表（instance -> Unit）
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    units: Store<InstanceId, Unit>,
}

impl UnitRegistry {
    /// 按 id 获取或创建注册表
    pub fn new(
        space: &StoreSpace,
        id: &str,
    ) -> Self {
        Self {
            units: Store::new(space, id),
        }
    }

    /// 登记单元，覆盖该对象已有的单元
    pub fn set(
        &self,
        instance: &Instance,
        unit: Unit,
    ) {
        self.units.set(instance.id(), unit);
    }

    /// 获取对象对应的单元
    pub fn get(
        &self,
        instance: &Instance,
    ) -> Option<Unit> {
        self.units.get(&instance.id())
    }

    /// 获取对象对应的模块（脚本返回 None）
    pub fn get_module(
        &self,
        instance: &Instance,
    ) -> Option<Arc<ModuleUnit>> {
        self.get(instance).and_then(|unit| unit.as_module().cloned())
    }

    /// 获取对象对应的脚本（模块返回 None）
    pub fn get_script(
        &self,
        instance: &Instance,
    ) -> Option<Arc<ScriptUnit>> {
        self.get(instance).and_then(|unit| unit.as_script().cloned())
    }

    /// 检查对象是否已登记
    pub fn has(
        &self,
        instance: &Instance,
    ) -> bool {
        self.units.has(&instance.id())
    }

    /// 移除对象的单元，返回是否存在
    pub fn delete(
        &self,
        instance: &Instance,
    ) -> bool {
        self.units.delete(&instance.id())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// 清空注册表
    pub fn clear(&self) {
        self.units.clear();
    }

    /// 清空注册表并从存储空间中移除
    pub fn destruct(&self) {
        self.units.destruct();
    }

    /// 底层存储，可用于订阅变更
    pub fn store(&self) -> &Store<InstanceId, Unit> {
        &self.units
    }
}
