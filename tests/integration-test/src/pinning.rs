#![cfg(test)]

use crate::{context, storage_buffer};
use gpu_epoch::access::BufferAccess;
use gpu_epoch::address_pool::AddressPool;
use gpu_epoch::backing::handle::Handle;
use gpu_epoch::command::CommandBuffer;
use gpu_epoch::config::ContextConfig;
use gpu_epoch::context::GraphicsContext;
use gpu_epoch::epoch::QueueType;
use gpu_epoch::platform::headless::Headless;
use gpu_epoch::resource::{Buffer, TrackedSlot};

#[test]
fn test_pinned_resource_outlives_frames() -> anyhow::Result<()> {
	let platform = Headless::new_manual();
	let mut ctx = context(platform.clone(), ContextConfig::default())?;
	let buffer = ctx.create_buffer(&storage_buffer("particles"))?;

	let mut cmd = CommandBuffer::new(&ctx, QueueType::ComputeOnly)?;
	cmd.begin(&ctx)?;
	assert_eq!(cmd.buffer_barriers(&ctx, &[(buffer, BufferAccess::ShaderReadWrite)])?, 1);
	cmd.dispatch(&ctx, [64, 1, 1])?;
	cmd.end(&ctx)?;
	let epoch = cmd.submit(&ctx)?;
	assert_eq!(ctx.get(buffer).resource().pins().busy_lock(), 1);

	assert!(!ctx.destroy(buffer));
	for _ in 0..10 {
		let stats = ctx.next_frame()?;
		assert_eq!(stats.disposed, 0);
		assert_eq!(stats.released, 0);
		assert!(ctx.is_alive(buffer));
		assert!(ctx.is_busy(buffer));
	}
	assert!(!cmd.is_retired(&ctx)?);

	platform.complete(QueueType::ComputeOnly, epoch);
	assert!(cmd.is_retired(&ctx)?);
	assert_eq!(ctx.get(buffer).resource().pins().busy_lock(), 0);

	let stats = ctx.next_frame()?;
	assert_eq!(stats.disposed, 1);
	assert_eq!(stats.released, 0);
	assert!(!ctx.is_alive(buffer));
	assert_eq!(ctx.next_frame()?.released, 1);
	assert_eq!(platform.stats().buffers_destroyed, 1);
	cmd.destroy(&ctx)?;
	Ok(())
}

fn submit_using(ctx: &GraphicsContext, buffer: Handle<Buffer>) -> anyhow::Result<(CommandBuffer, u64)> {
	let mut cmd = CommandBuffer::new(ctx, QueueType::Graphics)?;
	cmd.begin(ctx)?;
	cmd.use_buffer(ctx, buffer)?;
	cmd.end(ctx)?;
	let epoch = cmd.submit(ctx)?;
	Ok((cmd, epoch))
}

#[test]
fn test_destroy_with_two_busy_pins() -> anyhow::Result<()> {
	let platform = Headless::new_manual();
	let mut ctx = context(platform.clone(), ContextConfig::default())?;
	let buffer = ctx.create_buffer(&storage_buffer("shared"))?;

	let (mut first, first_epoch) = submit_using(&ctx, buffer)?;
	let (mut second, second_epoch) = submit_using(&ctx, buffer)?;
	assert_eq!(ctx.get(buffer).resource().pins().busy_lock(), 2);

	assert!(!ctx.destroy(buffer));
	platform.complete(QueueType::Graphics, first_epoch);
	assert!(first.is_retired(&ctx)?);
	assert!(!second.is_retired(&ctx)?);
	assert_eq!(ctx.get(buffer).resource().pins().busy_lock(), 1);
	assert!(!ctx.destroy(buffer));

	platform.complete(QueueType::Graphics, second_epoch);
	assert!(second.is_retired(&ctx)?);
	assert!(ctx.destroy(buffer));
	assert!(!ctx.is_alive(buffer));

	// nothing is left for the soft destroy requests to retire
	assert_eq!(ctx.next_frame()?.disposed, 0);
	assert_eq!(ctx.next_frame()?.released, 1);
	first.destroy(&ctx)?;
	second.destroy(&ctx)?;
	Ok(())
}

#[test]
fn test_reservation_promoted_on_begin() -> anyhow::Result<()> {
	let mut ctx = context(Headless::new(), ContextConfig::default())?;
	let buffer = ctx.create_buffer(&storage_buffer("reserved"))?;
	let mut cmd = CommandBuffer::new(&ctx, QueueType::TransferOnly)?;
	cmd.reserve(&ctx, buffer)?;
	let pins = ctx.get(buffer).resource().pins();
	assert_eq!((pins.ready_lock(), pins.busy_lock()), (1, 0));

	cmd.begin(&ctx)?;
	let pins = ctx.get(buffer).resource().pins();
	assert_eq!((pins.ready_lock(), pins.busy_lock()), (0, 1));
	assert!(!ctx.destroy(buffer));

	cmd.end(&ctx)?;
	cmd.submit(&ctx)?;
	assert!(cmd.is_retired(&ctx)?);
	assert_eq!(ctx.next_frame()?.disposed, 1);
	cmd.destroy(&ctx)?;
	Ok(())
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "reserved by a command buffer")]
fn test_destroy_reserved_panics() {
	let mut ctx = context(Headless::new(), ContextConfig::default()).unwrap();
	let buffer = ctx.create_buffer(&storage_buffer("reserved")).unwrap();
	let mut cmd = CommandBuffer::new(&ctx, QueueType::Graphics).unwrap();
	cmd.reserve(&ctx, buffer).unwrap();
	ctx.destroy(buffer);
}

/// Address pool barriers recorded outside of the frame queue pin every buffer they transition.
#[test]
fn test_address_pool_barriers_pin_owners() -> anyhow::Result<()> {
	let platform = Headless::new_manual();
	let mut ctx = context(platform.clone(), ContextConfig::default())?;
	let mut pool = AddressPool::new(&ctx);
	let buffers = (0..3)
		.map(|i| ctx.create_buffer(&storage_buffer(&format!("mesh {i}"))))
		.collect::<Result<Vec<_>, _>>()?;
	for &buffer in &buffers {
		pool.allocate(&ctx, buffer);
	}
	// the same buffer twice is transitioned once
	pool.allocate(&ctx, buffers[0]);

	let mut cmd = CommandBuffer::new(&ctx, QueueType::Graphics)?;
	cmd.begin(&ctx)?;
	assert_eq!(pool.add_buffer_barriers(&ctx, &mut cmd, BufferAccess::ShaderRead)?, 3);
	assert_eq!(pool.add_buffer_barriers(&ctx, &mut cmd, BufferAccess::ShaderRead)?, 0);
	cmd.end(&ctx)?;
	let epoch = cmd.submit(&ctx)?;
	assert_eq!(cmd.pinned(), 3);
	assert!(buffers.iter().all(|&b| cmd.is_pinned(b)));
	assert!(buffers.iter().all(|&b| ctx.get(b).access().load() == BufferAccess::ShaderRead));

	assert!(!ctx.destroy(buffers[1]));
	platform.complete(QueueType::Graphics, epoch);
	assert!(cmd.is_retired(&ctx)?);
	assert_eq!(cmd.pinned(), 0);
	assert_eq!(ctx.next_frame()?.disposed, 1);
	cmd.destroy(&ctx)?;
	pool.destroy(&mut ctx);
	Ok(())
}
