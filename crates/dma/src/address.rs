//! 地址类型
//!
//! 与 C 接口交换时一律按 `usize`（`unsigned long`）传递。

use core::fmt;
use core::ops::Add;

macro_rules! impl_address {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// 空地址（翻译失败时交给客户内核的值）
            pub const NULL: Self = Self(0);

            /// 从 usize 构造
            pub const fn from_usize(value: usize) -> Self {
                Self(value)
            }

            /// 转换为 usize
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// 是否为空地址
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }

            /// 页内偏移
            pub const fn page_offset(self, page_size: usize) -> usize {
                self.0 & (page_size - 1)
            }

            /// 向下对齐到页边界
            pub const fn align_down(self, page_size: usize) -> Self {
                Self(self.0 & !(page_size - 1))
            }

            /// 相对 `base` 的偏移，`self < base` 时返回 `None`
            pub fn offset_from(self, base: Self) -> Option<usize> {
                self.0.checked_sub(base.0)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            fn add(self, rhs: usize) -> Self {
                Self(self.0 + rhs)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }
    };
}

impl_address!(Paddr, "物理（总线）地址");
impl_address!(Vaddr, "本进程中的虚拟地址");
