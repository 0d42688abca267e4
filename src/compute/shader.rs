// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::compute::registry::Handle;
use crate::imp;
use crate::status::{Error, ensure_arg};

/// Handle to a compute shader owned by a [`crate::compute::Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Shader(pub(crate) Handle);

/// Most threads a single thread group may hold.
pub const MAX_THREADS_PER_GROUP: u32 = 1024;
/// Largest thread-group depth.
pub const MAX_THREAD_GROUP_DEPTH: u32 = 64;

/// Parameters of a new compute shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDesc {
    pub name: String,
    /// Threads per group in each dimension.
    pub thread_group_size: [u32; 3],
}

impl ShaderDesc {
    pub fn new(name: impl Into<String>, thread_group_size: [u32; 3]) -> Self {
        ShaderDesc { name: name.into(), thread_group_size }
    }

    pub(crate) fn validate(&self, bytecode: &[u8]) -> Result<ShaderInfo, Error> {
        let [x, y, z] = self.thread_group_size;
        ensure_arg!(x > 0 && y > 0 && z > 0, "thread group size must be non-zero");
        ensure_arg!(z <= MAX_THREAD_GROUP_DEPTH, "thread group depth cannot exceed 64");
        let threads = u64::from(x) * u64::from(y) * u64::from(z);
        ensure_arg!(threads <= u64::from(MAX_THREADS_PER_GROUP), "thread group cannot exceed 1024 threads");
        if bytecode.is_empty() {
            return Err(Error::Unexpected("empty shader bytecode"));
        }
        Ok(ShaderInfo { thread_group_size: self.thread_group_size, bytecode_len: bytecode.len() })
    }
}

/// Everything about a shader that is fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderInfo {
    pub thread_group_size: [u32; 3],
    pub bytecode_len: usize,
}

#[derive(Debug)]
pub(crate) struct ShaderEntity {
    pub(crate) name: String,
    pub(crate) info: ShaderInfo,
    pub(crate) pipeline: imp::Pipeline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation() {
        let desc = ShaderDesc::new("square", [8, 1, 1]);
        assert_eq!(desc.validate(b"x").unwrap().thread_group_size, [8, 1, 1]);
        assert!(matches!(desc.validate(&[]), Err(Error::Unexpected(_))));
        let flat = ShaderDesc::new("flat", [8, 0, 1]);
        assert!(flat.validate(b"x").unwrap_err().is_invalid_argument());
    }

    #[test]
    fn thread_group_limits() {
        assert!(ShaderDesc::new("widest", [1024, 1, 1]).validate(b"x").is_ok());
        assert!(ShaderDesc::new("square", [32, 32, 1]).validate(b"x").is_ok());
        assert!(ShaderDesc::new("deep", [1, 1, 64]).validate(b"x").is_ok());
        for size in [[1025, 1, 1], [64, 32, 1], [1, 1, 65], [u32::MAX, u32::MAX, 2]] {
            let err = ShaderDesc::new("too big", size).validate(b"x").unwrap_err();
            assert!(err.is_invalid_argument(), "{size:?}");
        }
    }
}
