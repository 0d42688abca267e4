// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Copies, clears, CPU access and the barriers they need.

use explicit_compute::bindings::{BufferFlags, BufferStrategy, MapType};
use explicit_compute::compute::{
    Buffer, BufferDesc, CommandFlags, CommandListState, Device, DeviceDesc, MAX_IMMEDIATE_WRITE, StaticResourceRegistry,
    Timeout,
};
use explicit_compute::entry_point::EntryPoint;
use explicit_compute::{Error, Format, Range, Status};
use test_executors::async_test;

async fn device(name: &str) -> Device {
    let entry_point = EntryPoint::new().await.expect("entry point");
    entry_point
        .create_device(&DeviceDesc::new(name), &mut StaticResourceRegistry::new())
        .await
        .expect("device")
}

fn upload(device: &mut Device, size: usize, data: &[u8]) -> Buffer {
    let desc = BufferDesc::new("upload", BufferFlags::CPU_SEQUENTIAL_WRITE | BufferFlags::COPY_SRC, size);
    device.create_buffer_from_memory(&desc, data).expect("upload buffer")
}

fn readback(device: &mut Device, size: usize) -> Buffer {
    let desc = BufferDesc::new("readback", BufferFlags::CPU_READ | BufferFlags::COPY_DST, size);
    device.create_buffer(&desc).expect("readback buffer")
}

fn read_all(device: &mut Device, buffer: Buffer) -> Vec<u8> {
    let size = device.buffer_info(buffer).unwrap().size;
    let mut out = vec![0u8; size];
    assert_eq!(
        device.read_buffer_to_memory(buffer, Range::FULL, &mut out, CommandFlags::empty()).unwrap(),
        Status::Success
    );
    out
}

#[async_test]
async fn round_trip_through_gpu_memory() {
    logwise::info_sync!("round_trip_through_gpu_memory");
    let mut device = device("round trip").await;
    let data: Vec<u8> = (0..64).collect();
    let src = upload(&mut device, 64, &data);
    let gpu = device
        .create_buffer(&BufferDesc::new("gpu", BufferFlags::COPY_SRC | BufferFlags::COPY_DST, 64))
        .unwrap();
    let dst = readback(&mut device, 64);

    device.copy_buffer(src, gpu).unwrap();
    device.copy_buffer(gpu, dst).unwrap();
    assert_eq!(read_all(&mut device, dst), data);

    let stats = device.native().stats();
    assert_eq!(stats.copies, 2);
    //copy-dest then copy-source on GPU memory; the upload and readback buffers never transition
    assert_eq!(stats.transition_barriers, 1);
    assert_eq!(stats.validation_errors, 0);

    for buffer in [src, gpu, dst] {
        device.destroy_buffer(buffer).unwrap();
    }
}

#[async_test]
async fn round_trip_at_several_sizes() {
    let mut device = device("sizes").await;
    for size in [4usize, 12, 100, 256, 4096] {
        let data: Vec<u8> = (0..size).map(|i| (i * 7 % 251) as u8).collect();
        let src = upload(&mut device, size, &data);
        let gpu = device
            .create_buffer(&BufferDesc::new("gpu", BufferFlags::COPY_SRC | BufferFlags::COPY_DST, size))
            .unwrap();
        let dst = readback(&mut device, size);

        device.copy_buffer(src, gpu).unwrap();
        device.copy_buffer(gpu, dst).unwrap();
        assert_eq!(read_all(&mut device, dst), data, "{size} bytes");

        for buffer in [src, gpu, dst] {
            device.destroy_buffer(buffer).unwrap();
        }
    }
    let stats = device.native().stats();
    assert_eq!(stats.copies, 10);
    assert_eq!(stats.validation_errors, 0);
}

#[async_test]
async fn repeated_use_in_one_state_needs_no_barrier() {
    let mut device = device("elision").await;
    let src = upload(&mut device, 16, &[9; 16]);
    let dst = readback(&mut device, 16);
    let gpu = device
        .create_buffer(&BufferDesc::new("gpu", BufferFlags::COPY_SRC | BufferFlags::COPY_DST, 16))
        .unwrap();

    device.copy_buffer_region(src, Range::new(0, 8), gpu, 0).unwrap();
    device.copy_buffer_region(src, Range::new(8, 8), gpu, 8).unwrap();
    device.copy_buffer(gpu, dst).unwrap();
    device.copy_buffer(gpu, dst).unwrap();
    assert_eq!(device.wait_for_gpu(Timeout::INFINITE).unwrap(), Status::Success);

    let stats = device.native().stats();
    assert_eq!(stats.copies, 4);
    assert_eq!(stats.transition_barriers, 1);
    assert_eq!(stats.read_write_barriers, 0);
    assert_eq!(stats.validation_errors, 0);
    assert_eq!(read_all(&mut device, dst), vec![9; 16]);

    for buffer in [src, gpu, dst] {
        device.destroy_buffer(buffer).unwrap();
    }
}

#[async_test]
async fn cpu_write_waits_for_gpu_reads() {
    let mut device = device("hazard").await;
    let src = upload(&mut device, 16, &[1; 16]);
    let dst = readback(&mut device, 16);

    device.copy_buffer(src, dst).unwrap();
    assert_eq!(device.command_list_state(), CommandListState::Recording);
    //the recorded copy must see the old contents
    assert_eq!(device.write_memory_to_buffer(&[2; 16], src, 0, CommandFlags::empty()).unwrap(), Status::Success);
    assert_eq!(device.command_list_state(), CommandListState::Idle);
    assert_eq!(read_all(&mut device, dst), vec![1; 16]);

    let hold = device.native().hold_queue();
    device.copy_buffer(src, dst).unwrap();
    assert_eq!(device.write_memory_to_buffer(&[3; 16], src, 0, CommandFlags::DONT_WAIT).unwrap(), Status::NotReady);
    drop(hold);
    assert_eq!(device.wait_for_gpu(Timeout::INFINITE).unwrap(), Status::Success);
    assert_eq!(read_all(&mut device, dst), vec![2; 16]);

    device.destroy_buffer(src).unwrap();
    device.destroy_buffer(dst).unwrap();
}

#[async_test]
async fn cpu_reads_only_wait_for_gpu_writes() {
    let mut device = device("read hazard").await;
    let src = upload(&mut device, 16, &[5; 16]);
    let dst = readback(&mut device, 16);
    let other = readback(&mut device, 16);

    //the list writes `dst` only; reading `other` does not flush it
    device.copy_buffer(src, dst).unwrap();
    assert_eq!(read_all(&mut device, other), vec![0; 16]);
    assert_eq!(device.command_list_state(), CommandListState::Recording);
    assert_eq!(read_all(&mut device, dst), vec![5; 16]);
    assert_eq!(device.command_list_state(), CommandListState::Idle);

    for buffer in [src, dst, other] {
        device.destroy_buffer(buffer).unwrap();
    }
}

#[async_test]
async fn write_limits_and_strategy_rules() {
    let mut device = device("writes").await;
    let big = device
        .create_buffer(&BufferDesc::new("big", BufferFlags::COPY_SRC | BufferFlags::COPY_DST, 2 * MAX_IMMEDIATE_WRITE))
        .unwrap();
    assert_eq!(device.buffer_info(big).unwrap().strategy, BufferStrategy::Default);
    let too_much = vec![0u8; MAX_IMMEDIATE_WRITE + 4];
    assert!(device.write_memory_to_buffer(&too_much, big, 0, CommandFlags::empty()).unwrap_err().is_invalid_argument());
    assert!(device.write_memory_to_buffer(&[1, 2, 3], big, 0, CommandFlags::empty()).unwrap_err().is_invalid_argument());
    assert_eq!(device.write_memory_to_buffer(&[], big, 0, CommandFlags::empty()).unwrap(), Status::NoOp);
    let past_end = device.write_memory_to_buffer(&[0; 8], big, 2 * MAX_IMMEDIATE_WRITE - 4, CommandFlags::empty());
    assert!(past_end.unwrap_err().is_invalid_argument());

    let dst = readback(&mut device, 16);
    assert!(matches!(
        device.write_memory_to_buffer(&[0; 4], dst, 0, CommandFlags::empty()),
        Err(Error::Unexpected(_))
    ));
    let mut out = [0u8; 4];
    let no_cpu_read = device.read_buffer_to_memory(big, Range::new(0, 4), &mut out, CommandFlags::empty());
    assert!(no_cpu_read.unwrap_err().is_invalid_argument());
    assert_eq!(
        device.read_buffer_to_memory(dst, Range::new(0, 0), &mut [], CommandFlags::empty()).unwrap(),
        Status::NoOp
    );

    let gpu_upload = BufferDesc::new("gpu upload", BufferFlags::CPU_SEQUENTIAL_WRITE | BufferFlags::COPY_SRC, 16)
        .with_strategy(BufferStrategy::GpuUpload);
    let gpu_upload = device.create_buffer_from_memory(&gpu_upload, &[4; 16]).unwrap();
    assert_eq!(device.buffer_info(gpu_upload).unwrap().strategy, BufferStrategy::GpuUpload);
    device.copy_buffer(gpu_upload, dst).unwrap();
    assert_eq!(read_all(&mut device, dst), vec![4; 16]);

    let initial_data_on_gpu = BufferDesc::new("gpu data", BufferFlags::COPY_SRC, 16);
    assert!(device.create_buffer_from_memory(&initial_data_on_gpu, &[0; 16]).unwrap_err().is_invalid_argument());

    for buffer in [big, dst, gpu_upload] {
        device.destroy_buffer(buffer).unwrap();
    }
}

#[async_test]
async fn copy_validation() {
    let mut device = device("copies").await;
    let src = upload(&mut device, 16, &[0; 16]);
    let dst = readback(&mut device, 16);
    let small = readback(&mut device, 8);

    assert!(device.copy_buffer(src, small).unwrap_err().is_invalid_argument());
    assert!(device.copy_buffer(dst, src).unwrap_err().is_invalid_argument());
    assert_eq!(device.copy_buffer_region(src, Range::new(4, 0), dst, 0).unwrap(), Status::NoOp);
    assert!(device.copy_buffer_region(src, Range::new(8, 16), dst, 0).unwrap_err().is_invalid_argument());
    assert!(device.copy_buffer_region(src, Range::new(0, 8), small, 4).unwrap_err().is_invalid_argument());
    assert_eq!(device.copy_buffer_region(src, Range::starting_at(8), small, 0).unwrap(), Status::Success);
    assert_eq!(device.command_list_state(), CommandListState::Recording);

    for buffer in [src, dst, small] {
        device.destroy_buffer(buffer).unwrap();
    }
}

#[async_test]
async fn region_copy_within_one_buffer_is_rejected() {
    let mut device = device("self copy").await;
    let src = upload(&mut device, 16, &[7; 8]);
    let gpu = device
        .create_buffer(&BufferDesc::new("gpu", BufferFlags::COPY_SRC | BufferFlags::COPY_DST, 16))
        .unwrap();
    let dst = readback(&mut device, 16);

    device.copy_buffer(src, gpu).unwrap();
    let within = device.copy_buffer_region(gpu, Range::new(0, 8), gpu, 8);
    assert!(within.unwrap_err().is_invalid_argument());
    device.copy_buffer(gpu, dst).unwrap();
    assert_eq!(read_all(&mut device, dst), [[7u8; 8], [0u8; 8]].concat());
    assert_eq!(device.native().stats().validation_errors, 0);

    for buffer in [src, gpu, dst] {
        device.destroy_buffer(buffer).unwrap();
    }
}

#[async_test]
async fn clear_typed_buffer_to_uint() {
    let mut device = device("typed clear").await;
    let flags = BufferFlags::GPU_READ_WRITE | BufferFlags::TYPED | BufferFlags::COPY_SRC;
    let typed = device
        .create_buffer(&BufferDesc::new("typed", flags, 32).with_format(Format::R16G16B16A16Sint))
        .unwrap();
    let dst = readback(&mut device, 32);

    let values = [0, 666, 0xFF, 0x7FFF];
    assert_eq!(device.clear_buffer_to_uint_values(typed, values, Range::FULL).unwrap(), Status::Success);
    device.copy_buffer(typed, dst).unwrap();

    let bytes = read_all(&mut device, dst);
    let components: Vec<i16> = bytes.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();
    assert_eq!(components, [0, 666, 255, 32767].repeat(4));

    let negative = device.clear_buffer_to_uint_values(typed, [0, 0x8000, 0, 0], Range::FULL);
    assert!(negative.unwrap_err().is_invalid_argument());
    assert_eq!(device.clear_buffer_to_uint_values(typed, values, Range::new(2, 0)).unwrap(), Status::NoOp);
    assert!(device.clear_buffer_to_uint_values(typed, values, Range::new(3, 2)).unwrap_err().is_invalid_argument());

    let stats = device.native().stats();
    assert_eq!(stats.clears, 1);
    assert_eq!(stats.transition_barriers, 1);
    assert_eq!(stats.validation_errors, 0);

    device.destroy_buffer(typed).unwrap();
    device.destroy_buffer(dst).unwrap();
}

#[async_test]
async fn clear_byte_address_and_float_buffers() {
    let mut device = device("clears").await;
    let raw_flags = BufferFlags::GPU_READ_WRITE | BufferFlags::BYTE_ADDRESS | BufferFlags::COPY_SRC;
    let raw = device.create_buffer(&BufferDesc::new("raw", raw_flags, 16)).unwrap();
    let typed_flags = BufferFlags::GPU_READ_WRITE | BufferFlags::TYPED | BufferFlags::COPY_SRC;
    let floats = device
        .create_buffer(&BufferDesc::new("floats", typed_flags, 16).with_format(Format::R32Float))
        .unwrap();
    let dst = readback(&mut device, 16);

    device.clear_buffer_to_uint_values(raw, [0xDEAD_BEEF, 0, 0, 0], Range::FULL).unwrap();
    device.clear_buffer_to_uint_values(raw, [7, 0, 0, 0], Range::new(1, 2)).unwrap();
    device.copy_buffer(raw, dst).unwrap();
    let words: Vec<u32> = read_all(&mut device, dst)
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(words, [0xDEAD_BEEF, 7, 7, 0xDEAD_BEEF]);
    //the second clear of the same buffer in one list is serialized
    assert_eq!(device.native().stats().read_write_barriers, 1);

    assert!(device.clear_buffer_to_float_values(raw, [1.0; 4], Range::FULL).unwrap_err().is_invalid_argument());
    device.clear_buffer_to_float_values(floats, [1.5, 0.0, 0.0, 0.0], Range::FULL).unwrap();
    device.copy_buffer(floats, dst).unwrap();
    let values: Vec<f32> = read_all(&mut device, dst)
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(values, [1.5; 4]);

    let not_clearable = readback(&mut device, 16);
    let refused = device.clear_buffer_to_uint_values(not_clearable, [0; 4], Range::FULL);
    assert!(refused.unwrap_err().is_invalid_argument());
    assert_eq!(device.native().stats().validation_errors, 0);

    for buffer in [raw, floats, dst, not_clearable] {
        device.destroy_buffer(buffer).unwrap();
    }
}

#[async_test]
async fn mapping_reads_and_writes_persistent_memory() {
    let mut device = device("mapping").await;
    let src = upload(&mut device, 16, &[]);
    let dst = readback(&mut device, 16);

    let mut mapping = device
        .map_buffer(src, Range::new(4, 8), MapType::Write, CommandFlags::empty())
        .unwrap()
        .mapped()
        .expect("idle buffer maps immediately");
    assert_eq!(mapping.len(), 8);
    mapping.as_mut_slice().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
    assert!(device.copy_buffer(src, dst).unwrap_err().is_invalid_argument());
    device.unmap_buffer(mapping).unwrap();

    device.copy_buffer(src, dst).unwrap();
    let read = device.map_buffer(dst, Range::FULL, MapType::Read, CommandFlags::empty()).unwrap();
    let mapping = read.mapped().expect("mapping after the copy finished");
    assert_eq!(mapping.as_slice(), &[0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0]);
    device.unmap_buffer(mapping).unwrap();

    assert!(device.map_buffer(src, Range::FULL, MapType::Read, CommandFlags::empty()).unwrap_err().is_invalid_argument());
    assert!(device.map_buffer(src, Range::new(16, 4), MapType::Write, CommandFlags::empty()).unwrap_err().is_invalid_argument());
    let gpu = device.create_buffer(&BufferDesc::new("gpu", BufferFlags::COPY_DST, 16)).unwrap();
    assert!(device.map_buffer(gpu, Range::FULL, MapType::Write, CommandFlags::empty()).unwrap_err().is_invalid_argument());

    for buffer in [src, dst, gpu] {
        device.destroy_buffer(buffer).unwrap();
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Particle {
    position: [f32; 2],
    mass: f32,
    id: u32,
}

unsafe impl explicit_compute::bindings::CRepr for Particle {}

#[async_test]
async fn typed_helpers() {
    let mut device = device("typed helpers").await;
    let src = upload(&mut device, 64, &[]);
    let dst = readback(&mut device, 64);

    let particles = [
        Particle { position: [1.0, 2.0], mass: 3.0, id: 4 },
        Particle { position: [5.0, 6.0], mass: 7.0, id: 8 },
    ];
    device.write_slice_to_buffer(&particles, src, 0, CommandFlags::empty()).unwrap();
    device.write_value_to_buffer(&0.25f32, src, 32, CommandFlags::empty()).unwrap();
    device.write_value_to_buffer(&half::f16::from_f32(2.0), src, 36, CommandFlags::empty()).unwrap_err();
    device.copy_buffer(src, dst).unwrap();

    let mut read_back = [Particle::default(); 2];
    assert_eq!(device.read_buffer_to_slice(dst, 0, &mut read_back, CommandFlags::empty()).unwrap(), Status::Success);
    assert_eq!(read_back, particles);
    let (status, value) = device.read_buffer_to_value::<f32>(dst, 32, CommandFlags::empty()).unwrap();
    assert_eq!(status, Status::Success);
    assert_eq!(value, 0.25);
    let (_, id) = device.read_buffer_to_value::<u32>(dst, 28, CommandFlags::empty()).unwrap();
    assert_eq!(id, 8);

    device.destroy_buffer(src).unwrap();
    device.destroy_buffer(dst).unwrap();
}

#[async_test]
async fn buffers_from_files() {
    let mut device = device("files").await;
    let dir = std::env::temp_dir();
    let path = dir.join(format!("explicit_compute_transfers_{}.bin", std::process::id()));
    std::fs::write(&path, [1u8, 2, 3, 4, 5, 6, 7, 8]).unwrap();

    let desc = BufferDesc::new("from file", BufferFlags::CPU_SEQUENTIAL_WRITE | BufferFlags::COPY_SRC, 16);
    let loaded = device
        .create_buffer_from_file(&desc, &path, async_file::Priority::unit_test())
        .await
        .unwrap();
    let dst = readback(&mut device, 16);
    device.copy_buffer(loaded, dst).unwrap();
    assert_eq!(read_all(&mut device, dst), [1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0, 0, 0, 0, 0]);

    let tiny = BufferDesc::new("tiny", BufferFlags::CPU_SEQUENTIAL_WRITE | BufferFlags::COPY_SRC, 4);
    let oversized = device.create_buffer_from_file(&tiny, &path, async_file::Priority::unit_test()).await;
    assert!(matches!(oversized, Err(Error::OutOfBounds)));
    let missing = device
        .create_buffer_from_file(&desc, &dir.join("explicit_compute_missing_file.bin"), async_file::Priority::unit_test())
        .await;
    assert!(matches!(missing, Err(Error::File(_))));
    std::fs::remove_file(&path).unwrap();

    device.destroy_buffer(loaded).unwrap();
    device.destroy_buffer(dst).unwrap();
}
