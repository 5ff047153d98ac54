//! DMA 错误类型

use std::io;

use thiserror::Error;

use crate::Vaddr;

/// DMA 操作错误
#[derive(Debug, Error)]
pub enum DmaError {
    /// 请求的对齐超过平台页大小
    #[error("requested alignment {align:#x} is larger than page size {page_size:#x}")]
    AlignmentUnsupported {
        /// 请求的对齐
        align: usize,
        /// 平台页大小
        page_size: usize,
    },
    /// 多段缓冲区映射
    #[error("mapping {0} DMA segments is not supported, only single-segment buffers")]
    MultiSegment(usize),
    /// 段列表为空或长度不匹配
    #[error("invalid DMA segment list: {0}")]
    InvalidSegments(&'static str),
    /// 长度为零的分配
    #[error("zero-sized DMA allocation")]
    ZeroSize,
    /// 释放或映射了未登记的区域
    #[error("no DMA region at {0:?}")]
    UnknownRegion(Vaddr),
    /// 分配成功但无法得到物理地址
    #[error("physical address of {0:?} could not be resolved")]
    Unresolved(Vaddr),
    /// 平台分配/释放失败
    #[error(transparent)]
    Platform(#[from] io::Error),
}

impl DmaError {
    /// 是否为能力缺失（而非瞬时故障）
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            DmaError::AlignmentUnsupported { .. } | DmaError::MultiSegment(_)
        )
    }
}
