// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Buffer descriptions and validation.

use crate::bindings::visible_to::{BufferFlags, BufferStrategy};
use crate::compute::registry::Handle;
use crate::format::Format;
use crate::imp;
use crate::status::{Error, ensure_arg};

/// Handle to a buffer owned by a [`crate::compute::Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Buffer(pub(crate) Handle);

/// Parameters of a new buffer.
///
/// ```
/// use explicit_compute::compute::BufferDesc;
/// use explicit_compute::bindings::visible_to::BufferFlags;
/// use explicit_compute::format::Format;
///
/// let desc = BufferDesc::new("squares", BufferFlags::GPU_READ_WRITE | BufferFlags::TYPED | BufferFlags::COPY_SRC, 32)
///     .with_format(Format::R32Float);
/// assert_eq!(desc.size, 32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub name: String,
    pub flags: BufferFlags,
    /// Size in bytes.  A positive multiple of 4 and of the element size.
    pub size: usize,
    /// Element format.  Required for, and only allowed with, [`BufferFlags::TYPED`].
    pub element_format: Format,
    /// Structure size in bytes.  Required for, and only allowed with, [`BufferFlags::STRUCTURED`].
    pub structure_size: usize,
    /// Replaces the strategy derived from the flags.  Only [`BufferStrategy::Upload`] can be
    /// replaced, and only by [`BufferStrategy::GpuUpload`].
    pub strategy_override: Option<BufferStrategy>,
}

impl BufferDesc {
    pub fn new(name: impl Into<String>, flags: BufferFlags, size: usize) -> Self {
        BufferDesc {
            name: name.into(),
            flags,
            size,
            element_format: Format::Unknown,
            structure_size: 0,
            strategy_override: None,
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.element_format = format;
        self
    }

    pub fn with_structure_size(mut self, structure_size: usize) -> Self {
        self.structure_size = structure_size;
        self
    }

    pub fn with_strategy(mut self, strategy: BufferStrategy) -> Self {
        self.strategy_override = Some(strategy);
        self
    }

    /// Checks the description and derives everything else about the buffer.
    ///
    /// `initial_data_len` is the size of the data the buffer is created with, if any.
    pub(crate) fn validate(&self, initial_data_len: usize) -> Result<BufferInfo, Error> {
        let flags = self.flags;
        ensure_arg!(flags.intersects(BufferFlags::USAGE_MASK), "buffer needs at least one usage flag");
        ensure_arg!(flags.cpu_access_count() <= 1, "at most one CPU access flag");
        ensure_arg!(flags.structural_kind_count() <= 1, "at most one of typed, structured or byte-address");
        ensure_arg!(self.size > 0 && self.size % 4 == 0, "buffer size must be a positive multiple of 4");

        let typed = flags.contains(BufferFlags::TYPED);
        ensure_arg!(typed == (self.element_format != Format::Unknown), "element format goes with the typed flag");
        if typed {
            ensure_arg!(self.element_format.is_buffer_compatible(), "element format cannot back a typed buffer");
        }
        let structured = flags.contains(BufferFlags::STRUCTURED);
        ensure_arg!(structured == (self.structure_size > 0), "structure size goes with the structured flag");
        if structured {
            ensure_arg!(self.structure_size % 4 == 0, "structure size must be a multiple of 4");
        }

        let element_size = element_size(flags, self.element_format, self.structure_size);
        if element_size > 0 {
            ensure_arg!(self.size % element_size == 0, "buffer size must be a multiple of the element size");
        }

        let mut strategy = BufferStrategy::select(flags).map_err(crate::status::invalid_argument)?;
        if let Some(requested) = self.strategy_override {
            if requested != strategy {
                ensure_arg!(
                    strategy == BufferStrategy::Upload && requested == BufferStrategy::GpuUpload,
                    "only upload buffers can be placed in GPU upload memory"
                );
                strategy = requested;
            }
        }

        if initial_data_len > 0 {
            ensure_arg!(flags.contains(BufferFlags::CPU_SEQUENTIAL_WRITE), "initial data needs sequential CPU write");
            ensure_arg!(strategy.is_persistently_mapped(), "initial data needs a CPU-visible buffer");
            ensure_arg!(initial_data_len <= self.size, "initial data larger than the buffer");
        }

        Ok(BufferInfo {
            size: self.size,
            flags,
            element_format: self.element_format,
            structure_size: self.structure_size,
            element_size,
            strategy,
        })
    }
}

/// Size of one element: format size when typed, structure size when structured, 4 when
/// byte-addressed, otherwise 0.
pub fn element_size(flags: BufferFlags, format: Format, structure_size: usize) -> usize {
    if flags.contains(BufferFlags::TYPED) {
        format.element_size()
    } else if flags.contains(BufferFlags::STRUCTURED) {
        structure_size
    } else if flags.contains(BufferFlags::BYTE_ADDRESS) {
        4
    } else {
        0
    }
}

/// Everything about a buffer that is fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub size: usize,
    pub flags: BufferFlags,
    pub element_format: Format,
    pub structure_size: usize,
    pub element_size: usize,
    pub strategy: BufferStrategy,
}

impl BufferInfo {
    pub(crate) fn heap_type(&self) -> imp::HeapType {
        match self.strategy {
            BufferStrategy::Default => imp::HeapType::Default,
            BufferStrategy::Upload => imp::HeapType::Upload,
            BufferStrategy::GpuUpload => imp::HeapType::GpuUpload,
            BufferStrategy::Readback => imp::HeapType::Readback,
        }
    }
}

#[derive(Debug)]
pub(crate) struct BufferEntity {
    pub(crate) name: String,
    pub(crate) info: BufferInfo,
    pub(crate) resource: imp::Resource,
    /// Currently handed out through a mapping.
    pub(crate) mapped: bool,
}
