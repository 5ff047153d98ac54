//! 登记式翻译表

use hashbrown::HashMap;
use sync::RwLock;

use crate::{DmaRegion, Paddr, PhysResolver, Vaddr};

/// 分配时登记的 va→pa 表
///
/// 查找支持区域内部地址：`pa = 区域 pa + (va - 区域 va)`。
#[derive(Debug, Default)]
pub struct TrackedTable {
    entries: RwLock<HashMap<Vaddr, (Paddr, usize)>>,
}

impl TrackedTable {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 表项数
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl PhysResolver for TrackedTable {
    fn record(&self, region: &DmaRegion) {
        self.entries
            .write()
            .insert(region.vaddr, (region.paddr, region.size));
    }

    fn forget(&self, vaddr: Vaddr) {
        self.entries.write().remove(&vaddr);
    }

    fn resolve(&self, vaddr: Vaddr) -> Option<Paddr> {
        let entries = self.entries.read();
        if let Some(&(pa, _)) = entries.get(&vaddr) {
            return Some(pa);
        }
        entries.iter().find_map(|(&va, &(pa, size))| {
            vaddr
                .offset_from(va)
                .filter(|&off| off < size)
                .map(|off| pa + off)
        })
    }
}
