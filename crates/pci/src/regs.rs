//! 标准 PCI 配置空间寄存器偏移

use bitflags::bitflags;

/// Vendor ID (16-bit, offset 0x00)
pub const VENDOR_ID: u16 = 0x00;
/// Device ID (16-bit, offset 0x02)
pub const DEVICE_ID: u16 = 0x02;
/// 命令寄存器 (16-bit, offset 0x04)，与状态寄存器共享一个 dword
pub const COMMAND: u16 = 0x04;
/// Revision ID / Class code dword (offset 0x08)
pub const CLASS_REVISION: u16 = 0x08;
/// Header type 所在 dword (offset 0x0C)，header type 位于 bits 16..24
pub const HEADER_DWORD: u16 = 0x0C;
/// BAR0 (offset 0x10)，BAR1-5 依次 +4
pub const BAR0: u16 = 0x10;
/// BAR 数量（header type 0）
pub const BAR_COUNT: usize = 6;
/// Interrupt line / pin dword (offset 0x3C)
pub const INTERRUPT_DWORD: u16 = 0x3C;

/// Header type 中的多功能设备标志
pub const HEADER_MULTI_FUNCTION: u8 = 0x80;

/// 读到该 vendor ID 表示槽位为空
pub const VENDOR_NONE: u16 = 0xFFFF;

bitflags! {
    /// 命令寄存器位（低 16 位）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Command: u16 {
        /// 响应 I/O 空间访问
        const IO_SPACE = 1 << 0;
        /// 响应内存空间访问
        const MEMORY_SPACE = 1 << 1;
        /// 允许作为总线主控（DMA）
        const BUS_MASTER = 1 << 2;
        /// 奇偶校验错误响应
        const PARITY_ERROR_RESPONSE = 1 << 6;
        /// SERR# 使能
        const SERR = 1 << 8;
        /// 禁止 INTx 中断
        const INTX_DISABLE = 1 << 10;
    }
}

/// BAR 低位标志
pub mod bar {
    /// 位 0：I/O 空间 BAR
    pub const IO: u32 = 0x1;
    /// 内存 BAR 类型字段（位 1..3），0b10 表示 64 位
    pub const MEM_TYPE_MASK: u32 = 0x6;
    /// 64 位内存 BAR
    pub const MEM_TYPE_64: u32 = 0x4;
    /// 内存 BAR 地址掩码
    pub const MEM_ADDR_MASK: u32 = !0xF;
    /// I/O BAR 地址掩码
    pub const IO_ADDR_MASK: u32 = !0x3;
}
