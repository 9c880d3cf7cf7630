#![cfg(test)]

use crate::{context, storage_buffer};
use gpu_epoch::command::{CommandBuffer, CommandError, ParallelRecorder, SecondaryRecording};
use gpu_epoch::config::ContextConfig;
use gpu_epoch::epoch::QueueType;
use gpu_epoch::platform::headless::{Headless, HeadlessCommand};
use gpu_epoch::platform::SubpassContents;
use gpu_epoch::resource::TrackedSlot;
use std::time::Duration;

type Task = Box<dyn FnOnce(&mut SecondaryRecording<'_>) -> Result<(), CommandError> + Send>;

fn workers(count: usize) -> ContextConfig {
	ContextConfig {
		worker_count: count,
		..ContextConfig::default()
	}
}

fn pushed_constants(commands: &[HeadlessCommand]) -> Vec<u32> {
	commands
		.iter()
		.filter_map(|c| match c {
			HeadlessCommand::PushConstants(bytes) => Some(bytemuck::pod_read_unaligned::<u32>(bytes)),
			_ => None,
		})
		.collect()
}

/// Over several frames the recorder reuses its secondary command buffers, and every frame executes them in worker
/// order even though the last tasks finish first.
#[test]
fn test_parallel_frames_in_worker_order() -> anyhow::Result<()> {
	let platform = Headless::new();
	let mut ctx = context(platform.clone(), workers(3))?;
	let framebuffer = ctx.create_framebuffer("framebuffer", ())?;
	let pipeline = ctx.create_pipeline("pipeline", ())?;
	let recorder = ParallelRecorder::new(&ctx, QueueType::Graphics)?;
	let mut cmd = CommandBuffer::new(&ctx, QueueType::Graphics)?;

	for frame in 0..3u32 {
		cmd.begin(&ctx)?;
		{
			let mut pass = cmd.begin_render_pass(&ctx, framebuffer, SubpassContents::SecondaryCommandBuffers)?;
			let tasks = (0..6u32).map(|i| -> Task {
				let value = frame * 10 + i;
				Box::new(move |rec: &mut SecondaryRecording<'_>| {
					std::thread::sleep(Duration::from_millis(u64::from(6 - i) * 2));
					rec.bind_pipeline(pipeline)?;
					rec.push_constants(pipeline, &value)?;
					rec.draw(0..3, 0..1)
				})
			});
			assert_eq!(pass.record_parallel(&recorder, tasks)?, 3);
			pass.end();
		}
		cmd.end(&ctx)?;
		cmd.submit(&ctx)?;
		assert!(!recorder.is_idle());
		assert!(cmd.is_retired(&ctx)?);
		assert!(recorder.is_idle());
		ctx.next_frame()?;
	}

	let submissions = platform.submissions();
	assert_eq!(submissions.len(), 3);
	for (frame, submission) in submissions.iter().enumerate() {
		let HeadlessCommand::Execute(secondaries) = &submission.commands[1] else {
			panic!("expected secondaries to be executed after beginning the render pass");
		};
		let base = frame as u32 * 10;
		let order = secondaries.iter().map(|s| pushed_constants(s)).collect::<Vec<_>>();
		assert_eq!(
			order,
			vec![vec![base, base + 3], vec![base + 1, base + 4], vec![base + 2, base + 5]]
		);
		assert_eq!(submission.commands.last(), Some(&HeadlessCommand::EndRenderPass));
	}

	cmd.destroy(&ctx)?;
	recorder.destroy(&ctx);
	Ok(())
}

/// A buffer used by every worker is pinned once by the primary, and can only be destroyed after it retired.
#[test]
fn test_worker_pins_merge_into_primary() -> anyhow::Result<()> {
	let platform = Headless::new_manual();
	let mut ctx = context(platform.clone(), workers(4))?;
	let framebuffer = ctx.create_framebuffer("framebuffer", ())?;
	let instances = ctx.create_buffer(&storage_buffer("instances"))?;
	let recorder = ParallelRecorder::new(&ctx, QueueType::Graphics)?;

	let mut cmd = CommandBuffer::new(&ctx, QueueType::Graphics)?;
	cmd.begin(&ctx)?;
	{
		let mut pass = cmd.begin_render_pass(&ctx, framebuffer, SubpassContents::SecondaryCommandBuffers)?;
		let tasks = (0..8).map(|_| -> Task {
			Box::new(move |rec: &mut SecondaryRecording<'_>| {
				rec.use_resource(instances)?;
				Ok(())
			})
		});
		assert_eq!(pass.record_parallel(&recorder, tasks)?, 4);
	}
	cmd.end(&ctx)?;
	assert_eq!(cmd.pinned(), 2);
	assert!(cmd.is_pinned(instances));
	assert_eq!(ctx.get(instances).resource().pins().busy_lock(), 1);
	let epoch = cmd.submit(&ctx)?;

	assert!(!ctx.destroy(instances));
	assert_eq!(ctx.next_frame()?.disposed, 0);
	assert!(ctx.is_alive(instances));

	platform.complete(QueueType::Graphics, epoch);
	assert!(cmd.is_retired(&ctx)?);
	assert_eq!(ctx.next_frame()?.disposed, 1);
	assert!(!ctx.is_alive(instances));

	cmd.destroy(&ctx)?;
	recorder.destroy(&ctx);
	Ok(())
}
