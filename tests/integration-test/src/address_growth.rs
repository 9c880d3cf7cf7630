#![cfg(test)]

use crate::{context, storage_buffer};
use gpu_epoch::address_pool::AddressPool;
use gpu_epoch::backing::handle::Handle;
use gpu_epoch::config::ContextConfig;
use gpu_epoch::platform::headless::Headless;

#[test]
fn test_growth_recreates_every_frame_buffer() -> anyhow::Result<()> {
	let platform = Headless::new();
	let mut ctx = context(platform.clone(), ContextConfig::default())?;
	let mut pool = AddressPool::new(&ctx);
	let buffers = (0..17)
		.map(|i| ctx.create_buffer(&storage_buffer(&format!("buffer {i}"))))
		.collect::<Result<Vec<_>, _>>()?;

	for &buffer in &buffers[..16] {
		pool.allocate(&ctx, buffer);
	}
	for _ in 0..ctx.frame_lag() {
		let in_flight = pool.in_flight_index();
		let flush = pool.flush(&mut ctx, in_flight)?;
		assert!(flush.uploaded && flush.new_address_buffer);
		ctx.next_frame()?;
		pool.next_frame();
	}
	let outgrown = [pool.address_buffer(0), pool.address_buffer(1)];
	assert_eq!(pool.capacity(), 16);

	assert_eq!(pool.allocate(&ctx, buffers[16]), 16);
	assert_eq!(pool.capacity(), 32);
	let expected = buffers.iter().map(|&b| ctx.get(b).device_address()).collect::<Vec<_>>();
	for i in 0..ctx.frame_lag() {
		let in_flight = pool.in_flight_index();
		assert_eq!(in_flight, i);
		let flush = pool.flush(&mut ctx, in_flight)?;
		assert!(flush.uploaded && flush.new_address_buffer);

		let slot = ctx.get(pool.address_buffer(in_flight));
		assert_eq!(slot.size(), 32 * 8);
		let mapped = slot.buffer.mapped_u64();
		assert_eq!(&mapped[..17], &expected[..]);
		assert!(mapped[17..].iter().all(|&a| a == 0));
		ctx.next_frame()?;
		pool.next_frame();
	}
	assert!(outgrown.iter().all(|&b| !ctx.is_alive(b)));

	// nothing ever submitted with the outgrown buffers, they are released after the frame lag
	ctx.next_frame()?;
	ctx.next_frame()?;
	assert_eq!(platform.stats().buffers_destroyed, 2);
	// a flushed table is not uploaded again
	let uploads = platform.stats().uploads;
	let in_flight = pool.in_flight_index();
	assert!(!pool.flush(&mut ctx, in_flight)?.uploaded);
	assert_eq!(platform.stats().uploads, uploads);
	pool.destroy(&mut ctx);
	Ok(())
}

#[test]
fn test_freed_indices_reused_lifo() -> anyhow::Result<()> {
	let mut ctx = context(Headless::new(), ContextConfig::default())?;
	let mut pool = AddressPool::new(&ctx);
	let buffers = (0..4)
		.map(|i| ctx.create_buffer(&storage_buffer(&format!("buffer {i}"))))
		.collect::<Result<Vec<_>, _>>()?;
	let indices = buffers.iter().map(|&b| pool.allocate(&ctx, b)).collect::<Vec<_>>();
	assert_eq!(indices, [0, 1, 2, 3]);
	pool.flush(&mut ctx, 0)?;

	// freeing the sentinel changes nothing
	pool.free(AddressPool::INVALID_INDEX);
	assert_eq!(pool.len(), 4);
	assert!(pool.is_flushed(0));

	pool.free(1);
	pool.free(2);
	assert_eq!(pool.len(), 2);
	assert_eq!(pool.address(1), 0);
	assert!(!pool.is_flushed(0));

	assert_eq!(pool.allocate(&ctx, buffers[3]), 2);
	assert_eq!(pool.allocate(&ctx, Handle::NULL), 1);
	assert_eq!(pool.address(1), 0);
	assert_eq!(pool.allocate(&ctx, buffers[0]), 4);
	assert_eq!(pool.len(), 5);

	pool.flush(&mut ctx, 0)?;
	let mapped = ctx.get(pool.address_buffer(0)).buffer.mapped_u64();
	assert_eq!(&mapped[..5], &[0, 1, 2, 3, 4].map(|i| pool.address(i)));
	pool.destroy(&mut ctx);
	Ok(())
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "double free")]
fn test_double_free_panics() {
	let ctx = context(Headless::new(), ContextConfig::default()).unwrap();
	let mut pool = AddressPool::new(&ctx);
	for _ in 0..6 {
		pool.allocate(&ctx, Handle::NULL);
	}
	pool.free(5);
	pool.free(5);
}
