//! 临时目录树
//!
//! 用于搭建 sysfs 风格的设备目录；析构时整棵树被删除。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT: AtomicUsize = AtomicUsize::new(0);

/// 临时目录树
pub struct TempTree {
    root: PathBuf,
}

impl TempTree {
    /// 在系统临时目录下创建一棵新树
    pub fn new(tag: &str) -> Self {
        let root = std::env::temp_dir().join(format!(
            "pcibridge-{}-{}-{}",
            tag,
            std::process::id(),
            NEXT.fetch_add(1, Ordering::SeqCst)
        ));
        fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    /// 根目录
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// 根目录下的相对路径
    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    /// 创建目录（含父目录）
    pub fn mkdir(&self, rel: impl AsRef<Path>) -> PathBuf {
        let path = self.join(rel);
        fs::create_dir_all(&path).unwrap();
        path
    }

    /// 写文件（含父目录）
    pub fn write(&self, rel: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }
}

impl Drop for TempTree {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}
