// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Binding and dispatching compute kernels.

use explicit_compute::bindings::BufferFlags;
use explicit_compute::compute::{
    Buffer, BufferDesc, CommandFlags, Device, DeviceDesc, MAX_DISPATCH_GROUPS, Shader, ShaderDesc,
    StaticResourceRegistry, Timeout,
};
use explicit_compute::entry_point::EntryPoint;
use explicit_compute::{Format, KernelContext, Range, Status};
use test_executors::async_test;

struct Fixture {
    device: Device,
    square: Shader,
    input: Buffer,
    output: Buffer,
    readback: Buffer,
}

impl Fixture {
    async fn new(name: &str) -> Fixture {
        let entry_point = EntryPoint::new().await.unwrap();
        let bytecode = entry_point.register_kernel("square", |context: &KernelContext<'_>, id: [u32; 3]| {
            let index = id[0] as usize;
            let value = context.read(0).load_f32(index);
            context.read_write(0).store_f32(index, value * value);
        });
        let mut device = entry_point
            .create_device(&DeviceDesc::new(name), &mut StaticResourceRegistry::new())
            .await
            .unwrap();
        let square = device.create_shader_from_memory(&ShaderDesc::new("square", [4, 1, 1]), &bytecode).unwrap();

        let input_flags = BufferFlags::CPU_SEQUENTIAL_WRITE | BufferFlags::GPU_READ_ONLY | BufferFlags::TYPED;
        let inputs: Vec<f32> = (1..=8).map(|v| v as f32).collect();
        let bytes: Vec<u8> = inputs.iter().flat_map(|v| v.to_le_bytes()).collect();
        let input = device
            .create_buffer_from_memory(&BufferDesc::new("input", input_flags, 32).with_format(Format::R32Float), &bytes)
            .unwrap();
        let output_flags = BufferFlags::GPU_READ_WRITE | BufferFlags::TYPED | BufferFlags::COPY_SRC;
        let output = device
            .create_buffer(&BufferDesc::new("output", output_flags, 32).with_format(Format::R32Float))
            .unwrap();
        let readback = device
            .create_buffer(&BufferDesc::new("readback", BufferFlags::CPU_READ | BufferFlags::COPY_DST, 32))
            .unwrap();
        Fixture { device, square, input, output, readback }
    }

    fn results(&mut self) -> Vec<f32> {
        self.device.copy_buffer(self.output, self.readback).unwrap();
        let mut values = [0f32; 8];
        self.device
            .read_buffer_to_slice(self.readback, 0, &mut values, CommandFlags::empty())
            .unwrap();
        values.to_vec()
    }

    fn finish(mut self) {
        self.device.reset_all_bindings();
        for buffer in [self.input, self.output, self.readback] {
            self.device.destroy_buffer(buffer).unwrap();
        }
        self.device.destroy_shader(self.square).unwrap();
    }
}

#[async_test]
async fn squares_eight_floats() {
    logwise::info_sync!("squares_eight_floats");
    let mut fixture = Fixture::new("square").await;
    let device = &mut fixture.device;
    device.bind_buffer(0, Some(fixture.input), Range::FULL).unwrap();
    device.bind_rw_buffer(0, Some(fixture.output), Range::FULL).unwrap();
    assert_eq!(device.dispatch_compute_shader(fixture.square, [2, 1, 1]).unwrap(), Status::Success);

    let expected: Vec<f32> = (1..=8).map(|v| (v * v) as f32).collect();
    assert_eq!(fixture.results(), expected);
    let stats = fixture.device.native().stats();
    assert_eq!(stats.dispatches, 1);
    assert_eq!(stats.validation_errors, 0);
    fixture.finish();
}

#[async_test]
async fn squares_in_place_in_gpu_memory() {
    let entry_point = EntryPoint::new().await.unwrap();
    let bytecode = entry_point.register_kernel("square_in_place", |context: &KernelContext<'_>, id: [u32; 3]| {
        let values = context.read_write(0);
        let index = id[0] as usize;
        let value = values.load_f32(index);
        values.store_f32(index, value * value);
    });
    let mut device = entry_point
        .create_device(&DeviceDesc::new("in place"), &mut StaticResourceRegistry::new())
        .await
        .unwrap();
    let square = device.create_shader_from_memory(&ShaderDesc::new("square", [8, 1, 1]), &bytecode).unwrap();

    let inputs: Vec<f32> = (1..=8).map(|v| v as f32).collect();
    let bytes: Vec<u8> = inputs.iter().flat_map(|v| v.to_le_bytes()).collect();
    let upload = device
        .create_buffer_from_memory(
            &BufferDesc::new("upload", BufferFlags::CPU_SEQUENTIAL_WRITE | BufferFlags::COPY_SRC, 32),
            &bytes,
        )
        .unwrap();
    let gpu_flags = BufferFlags::GPU_READ_WRITE | BufferFlags::TYPED | BufferFlags::COPY_SRC | BufferFlags::COPY_DST;
    let values = device
        .create_buffer(&BufferDesc::new("values", gpu_flags, 32).with_format(Format::R32Float))
        .unwrap();
    let readback = device
        .create_buffer(&BufferDesc::new("readback", BufferFlags::CPU_READ | BufferFlags::COPY_DST, 32))
        .unwrap();

    device.copy_buffer(upload, values).unwrap();
    device.bind_rw_buffer(0, Some(values), Range::FULL).unwrap();
    assert_eq!(device.dispatch_compute_shader(square, [1, 1, 1]).unwrap(), Status::Success);
    device.copy_buffer(values, readback).unwrap();
    let mut out = [0f32; 8];
    device.read_buffer_to_slice(readback, 0, &mut out, CommandFlags::empty()).unwrap();
    assert_eq!(out, [1.0, 4.0, 9.0, 16.0, 25.0, 36.0, 49.0, 64.0]);

    let stats = device.native().stats();
    //copy-dest to read-write to copy-source
    assert_eq!(stats.transition_barriers, 2);
    assert_eq!(stats.validation_errors, 0);

    device.reset_all_bindings();
    for buffer in [upload, values, readback] {
        device.destroy_buffer(buffer).unwrap();
    }
    device.destroy_shader(square).unwrap();
}

#[async_test]
async fn dispatch_bounds() {
    let mut fixture = Fixture::new("bounds").await;
    let device = &mut fixture.device;
    assert_eq!(device.dispatch_compute_shader(fixture.square, [0, 1, 1]).unwrap(), Status::NoOp);
    assert_eq!(device.dispatch_compute_shader(fixture.square, [1, 1, 0]).unwrap(), Status::NoOp);
    let too_many = device.dispatch_compute_shader(fixture.square, [1, MAX_DISPATCH_GROUPS + 1, 1]);
    assert!(too_many.unwrap_err().is_invalid_argument());
    assert_eq!(device.submit_pending_commands().unwrap(), Status::NoOp);
    fixture.finish();
}

#[async_test]
async fn rebinding_the_same_range_keeps_the_view() {
    let mut fixture = Fixture::new("rebind").await;
    let device = &mut fixture.device;
    assert_eq!(device.bind_buffer(0, Some(fixture.input), Range::FULL).unwrap(), Status::Success);
    assert_eq!(device.bind_buffer(0, Some(fixture.input), Range::new(0, 32)).unwrap(), Status::NoOp);
    assert_eq!(device.bind_rw_buffer(0, Some(fixture.output), Range::FULL).unwrap(), Status::Success);
    device.dispatch_compute_shader(fixture.square, [2, 1, 1]).unwrap();

    assert_eq!(device.bind_rw_buffer(0, Some(fixture.output), Range::FULL).unwrap(), Status::NoOp);
    device.dispatch_compute_shader(fixture.square, [2, 1, 1]).unwrap();
    assert_eq!(device.wait_for_gpu(Timeout::INFINITE).unwrap(), Status::Success);

    let stats = device.native().stats();
    assert_eq!(stats.dispatches, 2);
    //back-to-back writes to the same output are serialized
    assert_eq!(stats.read_write_barriers, 1);
    assert_eq!(stats.validation_errors, 0);

    //squaring the same input twice writes the same result
    let expected: Vec<f32> = (1..=8).map(|v| (v * v) as f32).collect();
    assert_eq!(fixture.results(), expected);
    fixture.finish();
}

#[async_test]
async fn bound_subrange_limits_the_kernel() {
    let mut fixture = Fixture::new("subrange").await;
    let device = &mut fixture.device;
    device.bind_buffer(0, Some(fixture.input), Range::FULL).unwrap();
    device.bind_rw_buffer(0, Some(fixture.output), Range::new(0, 16)).unwrap();
    device.dispatch_compute_shader(fixture.square, [2, 1, 1]).unwrap();
    assert_eq!(fixture.results(), [1.0, 4.0, 9.0, 16.0, 0.0, 0.0, 0.0, 0.0]);
    fixture.finish();
}

#[async_test]
async fn unbound_slots_read_zero() {
    let mut fixture = Fixture::new("unbound").await;
    let device = &mut fixture.device;
    device.bind_rw_buffer(0, Some(fixture.output), Range::FULL).unwrap();
    device.clear_buffer_to_float_values(fixture.output, [3.0, 0.0, 0.0, 0.0], Range::FULL).unwrap();
    device.dispatch_compute_shader(fixture.square, [2, 1, 1]).unwrap();
    assert_eq!(fixture.results(), [0.0; 8]);
    assert_eq!(fixture.device.native().stats().validation_errors, 0);
    fixture.finish();
}

#[async_test]
async fn binding_validation() {
    let mut fixture = Fixture::new("validation").await;
    let device = &mut fixture.device;
    let input = fixture.input;
    let output = fixture.output;
    assert!(device.bind_buffer(16, Some(input), Range::FULL).unwrap_err().is_invalid_argument());
    assert!(device.bind_rw_buffer(8, Some(output), Range::FULL).unwrap_err().is_invalid_argument());
    //the input is not writable from shaders
    assert!(device.bind_rw_buffer(0, Some(input), Range::FULL).unwrap_err().is_invalid_argument());
    assert!(device.bind_buffer(0, Some(input), Range::new(2, 4)).unwrap_err().is_invalid_argument());
    assert!(device.bind_buffer(0, Some(input), Range::new(0, 36)).unwrap_err().is_invalid_argument());
    assert!(device.bind_buffer(0, Some(input), Range::new(32, 4)).unwrap_err().is_invalid_argument());
    //constant views are 256-byte aligned
    assert!(device.bind_constant_buffer(0, Some(input), Range::FULL).unwrap_err().is_invalid_argument());

    let constants = device
        .create_buffer(&BufferDesc::new("constants", BufferFlags::CPU_SEQUENTIAL_WRITE | BufferFlags::GPU_CONSTANT, 512))
        .unwrap();
    assert_eq!(device.bind_constant_buffer(0, Some(constants), Range::new(256, 256)).unwrap(), Status::Success);
    assert!(device.bind_constant_buffer(1, Some(constants), Range::new(0, 128)).unwrap_err().is_invalid_argument());
    assert_eq!(device.bind_constant_buffer(0, None, Range::FULL).unwrap(), Status::Success);
    assert_eq!(device.bind_constant_buffer(0, None, Range::FULL).unwrap(), Status::NoOp);
    device.destroy_buffer(constants).unwrap();
    fixture.finish();
}

#[async_test]
async fn constants_reach_the_kernel() {
    let entry_point = EntryPoint::new().await.unwrap();
    let bytecode = entry_point.register_kernel("scale", |context: &KernelContext<'_>, id: [u32; 3]| {
        let factor = f32::from_bits(context.constant(0).load_u32(0));
        let index = id[0] as usize;
        let output = context.read_write(0);
        output.store_f32(index, output.load_f32(index) * factor);
    });
    let mut device = entry_point
        .create_device(&DeviceDesc::new("constants"), &mut StaticResourceRegistry::new())
        .await
        .unwrap();
    let scale = device.create_shader_from_memory(&ShaderDesc::new("scale", [4, 1, 1]), &bytecode).unwrap();
    let constants = device
        .create_buffer(&BufferDesc::new("factor", BufferFlags::CPU_SEQUENTIAL_WRITE | BufferFlags::GPU_CONSTANT, 256))
        .unwrap();
    device.write_value_to_buffer(&2.5f32, constants, 0, CommandFlags::empty()).unwrap();
    let output_flags = BufferFlags::GPU_READ_WRITE | BufferFlags::BYTE_ADDRESS | BufferFlags::COPY_SRC;
    let output = device.create_buffer(&BufferDesc::new("values", output_flags, 16)).unwrap();
    let readback = device
        .create_buffer(&BufferDesc::new("readback", BufferFlags::CPU_READ | BufferFlags::COPY_DST, 16))
        .unwrap();

    device.write_slice_to_buffer(&[1.0f32, 2.0, 3.0, 4.0], output, 0, CommandFlags::empty()).unwrap();
    device.bind_constant_buffer(0, Some(constants), Range::FULL).unwrap();
    device.bind_rw_buffer(0, Some(output), Range::FULL).unwrap();
    device.dispatch_compute_shader(scale, [1, 1, 1]).unwrap();
    device.copy_buffer(output, readback).unwrap();
    let mut values = [0f32; 4];
    device.read_buffer_to_slice(readback, 0, &mut values, CommandFlags::empty()).unwrap();
    assert_eq!(values, [2.5, 5.0, 7.5, 10.0]);

    let stats = device.native().stats();
    //copy-dest to read-write to copy-source
    assert_eq!(stats.transition_barriers, 2);
    assert_eq!(stats.validation_errors, 0);

    device.reset_all_bindings();
    for buffer in [constants, output, readback] {
        device.destroy_buffer(buffer).unwrap();
    }
    device.destroy_shader(scale).unwrap();
}
