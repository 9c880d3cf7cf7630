#![cfg(test)]

use crate::{context, storage_buffer};
use gpu_epoch::access::BufferAccess;
use gpu_epoch::address_pool::AddressPool;
use gpu_epoch::command::CommandBuffer;
use gpu_epoch::config::ContextConfig;
use gpu_epoch::epoch::QueueType;
use gpu_epoch::platform::headless::{Headless, HeadlessCommand};
use std::time::Duration;

fn no_waiting() -> ContextConfig {
	ContextConfig {
		emergency_timeout: Duration::ZERO,
		..ContextConfig::default()
	}
}

/// The GPU trails one frame behind. A buffer destroyed right after its last frame submission is released once the
/// frame lag elapsed and that submission completed, the address pool only uploads when its table changed.
#[test]
fn test_frame_loop_releases_after_frame_lag() -> anyhow::Result<()> {
	let platform = Headless::new_manual();
	let mut ctx = context(platform.clone(), no_waiting())?;
	assert_eq!(ctx.frame_lag(), 2);
	let mut address_pool = AddressPool::new(&ctx);
	let vertices = ctx.create_buffer(&storage_buffer("vertices"))?;
	let index = address_pool.allocate(&ctx, vertices);
	let mut cmds = [
		CommandBuffer::new(&ctx, QueueType::Frame)?,
		CommandBuffer::new(&ctx, QueueType::Frame)?,
	];

	let mut uploads = Vec::new();
	let mut barriers = Vec::new();
	let mut released = Vec::new();
	for frame in 0..8u64 {
		assert!(ctx.begin_frame()?);
		let cmd = &mut cmds[frame as usize % 2];
		assert!(cmd.wait(&ctx, Duration::ZERO)?);

		let in_flight = address_pool.in_flight_index();
		uploads.push(address_pool.flush(&mut ctx, in_flight)?.uploaded);

		cmd.begin(&ctx)?;
		if ctx.is_alive(vertices) {
			cmd.use_buffer(&ctx, vertices)?;
		}
		barriers.push(address_pool.add_buffer_barriers(&ctx, cmd, BufferAccess::ShaderRead)?);
		cmd.end(&ctx)?;
		// the frame lag protects everything used on the frame queue
		assert_eq!(cmd.pinned(), 0);
		let epoch = ctx.submit_frame(cmd)?;
		assert_eq!(epoch, frame + 1);
		platform.complete(QueueType::Frame, epoch - 1);

		if frame == 2 {
			address_pool.free(index);
			assert!(ctx.destroy(vertices));
			assert!(!ctx.is_alive(vertices));
		}
		let stats = ctx.next_frame()?;
		address_pool.next_frame();
		log::info!("{:?}", stats);
		released.push(stats.released);
	}

	assert_eq!(uploads, [true, true, false, true, true, false, false, false]);
	assert_eq!(barriers, [1, 0, 0, 0, 0, 0, 0, 0]);
	// still within the frame lag at frame 4, released when frame 6 begins
	assert_eq!(released, [0, 0, 0, 0, 0, 1, 0, 0]);
	assert_eq!(platform.stats().buffers_destroyed, 1);
	assert!(matches!(
		&platform.submissions()[0].commands[..],
		[HeadlessCommand::Barriers(b)] if b.len() == 1
	));

	platform.complete_all();
	address_pool.destroy(&mut ctx);
	for cmd in cmds {
		cmd.destroy(&ctx)?;
	}
	drop(ctx);
	let stats = platform.stats();
	assert_eq!(stats.buffers_created, 3);
	assert_eq!(stats.buffers_destroyed, 3);
	Ok(())
}

/// A GPU that stops completing work lets the CPU run ahead by exactly the frame lag, further frames are skipped
/// until it catches up.
#[test]
fn test_stalled_gpu_skips_frames() -> anyhow::Result<()> {
	let platform = Headless::new_manual();
	let mut ctx = context(platform.clone(), no_waiting())?;

	let mut skipped = 0;
	let mut in_flight = Vec::new();
	for _ in 0..6 {
		if ctx.begin_frame()? {
			let mut cmd = CommandBuffer::new(&ctx, QueueType::Frame)?;
			cmd.begin(&ctx)?;
			cmd.end(&ctx)?;
			ctx.submit_frame(&mut cmd)?;
			in_flight.push(cmd);
		} else {
			skipped += 1;
		}
		ctx.next_frame()?;
	}
	assert_eq!(in_flight.len(), 2);
	assert_eq!(skipped, 4);
	assert_eq!(ctx.epochs().busy_time(QueueType::Frame), 2);

	platform.complete_all();
	assert!(ctx.begin_frame()?);
	for mut cmd in in_flight {
		assert!(cmd.is_retired(&ctx)?);
		cmd.destroy(&ctx)?;
	}
	Ok(())
}
