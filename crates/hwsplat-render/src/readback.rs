//! Blocking GPU to host buffer reads

use bytemuck::Pod;

use crate::error::RenderResult;

/// Map a MAP_READ buffer and wait for the callback
pub(crate) fn map_blocking(device: &wgpu::Device, slice: wgpu::BufferSlice<'_>) -> RenderResult<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        // receiver only goes away on an earlier error
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()??;
    Ok(())
}

/// Copy the first `count` elements of `source` back to the host
///
/// Submits its own command buffer, so everything queued before it is
/// finished when it returns.
pub fn read_buffer<T: Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    count: usize,
) -> RenderResult<Vec<T>> {
    read_buffer_range(device, queue, source, 0, count)
}

/// Copy elements `first..first + count` of `source` back to the host
///
/// `T` must be a multiple of four bytes wide.
pub fn read_buffer_range<T: Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    first: usize,
    count: usize,
) -> RenderResult<Vec<T>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let offset = (first * std::mem::size_of::<T>()) as u64;
    let bytes = (count * std::mem::size_of::<T>()) as u64;
    let size = bytes.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_buffer_to_buffer(source, offset, &staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    map_blocking(device, slice)?;

    let data = slice.get_mapped_range();
    let values = bytemuck::cast_slice::<u8, T>(&data[..bytes as usize]).to_vec();
    drop(data);
    staging.unmap();

    Ok(values)
}

/// Read a single counter
pub fn read_u32(device: &wgpu::Device, queue: &wgpu::Queue, source: &wgpu::Buffer) -> RenderResult<u32> {
    Ok(read_buffer::<u32>(device, queue, source, 1)?[0])
}
