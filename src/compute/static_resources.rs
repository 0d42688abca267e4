// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Buffers and shaders declared up front and created together with a device.

Fill a [`StaticResourceRegistry`], pass it to
[`crate::entry_point::EntryPoint::create_device`], and look up the created objects with the keys
the registry handed out.  The objects are destroyed with the device.

```
# use explicit_compute::compute::{BufferDesc, DeviceDesc, StaticResourceRegistry};
# use explicit_compute::bindings::visible_to::BufferFlags;
# use explicit_compute::entry_point::EntryPoint;
# test_executors::spin_on(async {
let mut registry = StaticResourceRegistry::new();
let zeros = registry.add_buffer(BufferDesc::new("zeros", BufferFlags::COPY_SRC | BufferFlags::COPY_DST, 256));

let entry_point = EntryPoint::new().await.unwrap();
let device = entry_point.create_device(&DeviceDesc::new("device"), &mut registry).await.unwrap();
let buffer = registry.buffer(zeros).unwrap();
assert_eq!(device.buffer_info(buffer).unwrap().size, 256);
# });
```
*/

use crate::compute::buffer::{Buffer, BufferDesc};
use crate::compute::device::Device;
use crate::compute::loading::read_file;
use crate::compute::shader::{Shader, ShaderDesc};
use crate::status::Error;
use std::path::PathBuf;

/// Key of a buffer declared in a [`StaticResourceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticBufferKey(usize);

/// Key of a shader declared in a [`StaticResourceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticShaderKey(usize);

enum Source {
    Empty,
    Memory(Vec<u8>),
    File { path: PathBuf, priority: async_file::Priority },
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Empty => f.write_str("Empty"),
            Source::Memory(data) => write!(f, "Memory({} bytes)", data.len()),
            Source::File { path, .. } => write!(f, "File({})", path.display()),
        }
    }
}

impl Source {
    async fn load(&self) -> Result<Vec<u8>, Error> {
        match self {
            Source::Empty => Ok(Vec::new()),
            Source::Memory(data) => Ok(data.clone()),
            Source::File { path, priority } => read_file(path, *priority).await,
        }
    }
}

#[derive(Debug)]
struct StaticBuffer {
    desc: BufferDesc,
    source: Source,
    created: Option<Buffer>,
}

#[derive(Debug)]
struct StaticShader {
    desc: ShaderDesc,
    source: Source,
    created: Option<Shader>,
}

/// Buffers and shaders to create along with a device.
#[derive(Debug, Default)]
pub struct StaticResourceRegistry {
    buffers: Vec<StaticBuffer>,
    shaders: Vec<StaticShader>,
}

impl StaticResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_buffer(&mut self, desc: BufferDesc, source: Source) -> StaticBufferKey {
        self.buffers.push(StaticBuffer { desc, source, created: None });
        StaticBufferKey(self.buffers.len() - 1)
    }

    fn push_shader(&mut self, desc: ShaderDesc, source: Source) -> StaticShaderKey {
        self.shaders.push(StaticShader { desc, source, created: None });
        StaticShaderKey(self.shaders.len() - 1)
    }

    pub fn add_buffer(&mut self, desc: BufferDesc) -> StaticBufferKey {
        self.push_buffer(desc, Source::Empty)
    }

    pub fn add_buffer_from_memory(&mut self, desc: BufferDesc, initial_data: Vec<u8>) -> StaticBufferKey {
        self.push_buffer(desc, Source::Memory(initial_data))
    }

    pub fn add_buffer_from_file(&mut self, desc: BufferDesc, path: impl Into<PathBuf>, priority: async_file::Priority) -> StaticBufferKey {
        self.push_buffer(desc, Source::File { path: path.into(), priority })
    }

    pub fn add_shader_from_memory(&mut self, desc: ShaderDesc, bytecode: Vec<u8>) -> StaticShaderKey {
        self.push_shader(desc, Source::Memory(bytecode))
    }

    pub fn add_shader_from_file(&mut self, desc: ShaderDesc, path: impl Into<PathBuf>, priority: async_file::Priority) -> StaticShaderKey {
        self.push_shader(desc, Source::File { path: path.into(), priority })
    }

    /// The buffer created for `key`, once a device has been created from this registry.
    pub fn buffer(&self, key: StaticBufferKey) -> Option<Buffer> {
        self.buffers.get(key.0).and_then(|entry| entry.created)
    }

    /// The shader created for `key`, once a device has been created from this registry.
    pub fn shader(&self, key: StaticShaderKey) -> Option<Shader> {
        self.shaders.get(key.0).and_then(|entry| entry.created)
    }

    pub fn len(&self) -> usize {
        self.buffers.len() + self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates every entry on `device`, shaders first.  The device takes ownership of them.
    pub(crate) async fn create_all(&mut self, device: &mut Device) -> Result<(), Error> {
        let mut shaders = Vec::with_capacity(self.shaders.len());
        let mut buffers = Vec::with_capacity(self.buffers.len());
        let result = async {
            for entry in &mut self.shaders {
                let bytecode = entry.source.load().await?;
                let shader = device.create_shader_from_memory(&entry.desc, &bytecode)?;
                entry.created = Some(shader);
                shaders.push(shader);
            }
            for entry in &mut self.buffers {
                let data = entry.source.load().await?;
                if data.len() > entry.desc.size {
                    return Err(Error::OutOfBounds);
                }
                let buffer = device.create_buffer_from_memory(&entry.desc, &data)?;
                entry.created = Some(buffer);
                buffers.push(buffer);
            }
            Ok(())
        }
        .await;
        //whatever was created is torn down with the device, even on failure
        device.adopt_static(buffers, shaders);
        if result.is_ok() {
            logwise::info_sync!(
                "Created {buffers} static buffers and {shaders} static shaders",
                buffers = self.buffers.len(),
                shaders = self.shaders.len()
            );
        }
        result
    }
}
