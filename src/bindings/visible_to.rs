// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Buffer usage declarations and memory placement.
//!
//! When creating a buffer you declare how it will be used with [`BufferFlags`].  From those
//! flags the buffer picks a [`BufferStrategy`] once, at creation time, which decides where the
//! memory lives and whether the GPU needs explicit state transitions for it.
//!
//! The flags fall into four groups:
//!
//! - CPU access: [`BufferFlags::CPU_READ`], [`BufferFlags::CPU_SEQUENTIAL_WRITE`].  At most one.
//! - Copies: [`BufferFlags::COPY_SRC`], [`BufferFlags::COPY_DST`].
//! - Shader access: [`BufferFlags::GPU_CONSTANT`], [`BufferFlags::GPU_READ_ONLY`],
//!   [`BufferFlags::GPU_READ_WRITE`].
//! - Structural kind: [`BufferFlags::TYPED`], [`BufferFlags::STRUCTURED`],
//!   [`BufferFlags::BYTE_ADDRESS`].  At most one.
//!
//! # Examples
//!
//! ```
//! use explicit_compute::bindings::visible_to::{BufferFlags, BufferStrategy};
//!
//! // Staging memory the CPU fills and the GPU copies from
//! let upload = BufferFlags::CPU_SEQUENTIAL_WRITE | BufferFlags::COPY_SRC;
//! assert_eq!(BufferStrategy::select(upload), Ok(BufferStrategy::Upload));
//!
//! // GPU-resident memory written by compute shaders
//! let resident = BufferFlags::GPU_READ_WRITE | BufferFlags::TYPED | BufferFlags::COPY_SRC;
//! assert_eq!(BufferStrategy::select(resident), Ok(BufferStrategy::Default));
//! ```

bitflags::bitflags! {
    /// Declared usage of a buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// The CPU reads the buffer back.
        const CPU_READ = 0x1;
        /// The CPU writes the buffer front to back, without reading it.
        const CPU_SEQUENTIAL_WRITE = 0x2;
        /// Source of copy commands.
        const COPY_SRC = 0x8;
        /// Destination of copy commands.
        const COPY_DST = 0x10;
        /// Bindable as a constant buffer.
        const GPU_CONSTANT = 0x20;
        /// Bindable as a read-only shader resource.
        const GPU_READ_ONLY = 0x40;
        /// Bindable as a read-write shader resource, and clearable.
        const GPU_READ_WRITE = 0x80;
        /// Elements have a fixed [`crate::format::Format`].
        const TYPED = 0x100;
        /// Elements are opaque structures of a declared size.
        const STRUCTURED = 0x200;
        /// Raw memory addressed in 32-bit words.
        const BYTE_ADDRESS = 0x400;

        const CPU_MASK = Self::CPU_READ.bits() | Self::CPU_SEQUENTIAL_WRITE.bits();
        const COPY_MASK = Self::COPY_SRC.bits() | Self::COPY_DST.bits();
        const SHADER_MASK = Self::GPU_CONSTANT.bits() | Self::GPU_READ_ONLY.bits() | Self::GPU_READ_WRITE.bits();
        const STRUCTURAL_MASK = Self::TYPED.bits() | Self::STRUCTURED.bits() | Self::BYTE_ADDRESS.bits();
        const USAGE_MASK = Self::CPU_MASK.bits() | Self::COPY_MASK.bits() | Self::SHADER_MASK.bits();
    }
}

impl BufferFlags {
    /// Number of structural kind flags set.
    pub fn structural_kind_count(self) -> u32 {
        (self & BufferFlags::STRUCTURAL_MASK).bits().count_ones()
    }

    pub fn cpu_access_count(self) -> u32 {
        (self & BufferFlags::CPU_MASK).bits().count_ones()
    }
}

/// Where a buffer's memory lives.
///
/// Only [`BufferStrategy::Default`] memory changes GPU state as it is used; the other
/// strategies sit in one fixed state for their whole life, are persistently mapped, and are
/// never barriered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferStrategy {
    /// CPU-written, GPU-read staging memory.
    ///
    /// Fixed in the generic-read state.
    Upload,
    /// CPU-written memory the GPU reads directly at full speed.
    ///
    /// Only reachable by explicit override; behaves like [`BufferStrategy::Upload`].
    GpuUpload,
    /// GPU-resident memory.  Needs explicit transitions and read-write hazard barriers.
    Default,
    /// GPU-written, CPU-read memory.
    ///
    /// Fixed in the copy-destination state.
    Readback,
}

impl BufferStrategy {
    /// Derives the strategy from declared usage.
    ///
    /// - read-write shader access wins: [`BufferStrategy::Default`], and CPU reads are refused
    /// - else sequential CPU writes: [`BufferStrategy::Upload`], and copies into it are refused
    /// - else CPU reads: [`BufferStrategy::Readback`], refusing copy-source and shader use
    /// - else [`BufferStrategy::Default`]
    pub fn select(flags: BufferFlags) -> Result<BufferStrategy, &'static str> {
        if flags.contains(BufferFlags::GPU_READ_WRITE) {
            if flags.contains(BufferFlags::CPU_READ) {
                return Err("read-write shader buffers cannot be read by the CPU");
            }
            Ok(BufferStrategy::Default)
        } else if flags.contains(BufferFlags::CPU_SEQUENTIAL_WRITE) {
            if flags.contains(BufferFlags::COPY_DST) {
                return Err("upload buffers cannot be copy destinations");
            }
            Ok(BufferStrategy::Upload)
        } else if flags.contains(BufferFlags::CPU_READ) {
            if flags.intersects(BufferFlags::COPY_SRC | BufferFlags::SHADER_MASK) {
                return Err("readback buffers cannot be copy sources or shader resources");
            }
            Ok(BufferStrategy::Readback)
        } else {
            Ok(BufferStrategy::Default)
        }
    }

    /// Whether GPU use of the buffer is tracked with native barriers.
    pub fn needs_barriers(self) -> bool {
        self == BufferStrategy::Default
    }

    /// Whether the CPU can reach the memory through a persistent mapping.
    pub fn is_persistently_mapped(self) -> bool {
        self != BufferStrategy::Default
    }
}
