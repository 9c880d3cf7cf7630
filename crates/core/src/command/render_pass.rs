use crate::backing::handle::Handle;
use crate::command::{CommandBuffer, CommandError, Encoder, ParallelRecorder, SecondaryRecording};
use crate::context::GraphicsContext;
use crate::platform::{GraphicsPlatform, SubpassContents};
use crate::resource::{DescriptorSet, FramebufferSlot, Pipeline};
use std::ops::Range;

/// A render pass being recorded into a [`CommandBuffer`], ended when dropped.
///
/// Borrows the command buffer mutably, so subpass transitions and the end of the render pass can only be recorded
/// once every parallel recording into the current subpass has finished.
pub struct RenderPassRecording<'a, P: GraphicsPlatform> {
	ctx: &'a GraphicsContext<P>,
	cmd: &'a mut CommandBuffer<P>,
	framebuffer: &'a FramebufferSlot<P>,
	subpass: u32,
	contents: SubpassContents,
	ended: bool,
}

impl<'a, P: GraphicsPlatform> RenderPassRecording<'a, P> {
	pub(crate) fn new(
		ctx: &'a GraphicsContext<P>,
		cmd: &'a mut CommandBuffer<P>,
		framebuffer: &'a FramebufferSlot<P>,
		contents: SubpassContents,
	) -> Self {
		Self {
			ctx,
			cmd,
			framebuffer,
			subpass: 0,
			contents,
			ended: false,
		}
	}

	#[inline]
	pub fn subpass(&self) -> u32 {
		self.subpass
	}

	#[inline]
	pub fn contents(&self) -> SubpassContents {
		self.contents
	}

	fn inline_encoder(&mut self) -> Result<Encoder<'_, 'a, P>, CommandError<P>> {
		if self.contents != SubpassContents::Inline {
			return Err(CommandError::WrongSubpassContents(self.contents));
		}
		self.cmd.encoder(self.ctx)
	}

	pub fn bind_pipeline(&mut self, pipeline: Handle<Pipeline>) -> Result<(), CommandError<P>> {
		self.inline_encoder()?.bind_pipeline(pipeline)
	}

	pub fn bind_descriptor_set(
		&mut self,
		pipeline: Handle<Pipeline>,
		descriptor_set: Handle<DescriptorSet>,
	) -> Result<(), CommandError<P>> {
		self.inline_encoder()?.bind_descriptor_set(pipeline, descriptor_set)
	}

	pub fn push_constants<T: bytemuck::Pod>(
		&mut self,
		pipeline: Handle<Pipeline>,
		constants: &T,
	) -> Result<(), CommandError<P>> {
		self.inline_encoder()?.push_constants(pipeline, constants)
	}

	pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) -> Result<(), CommandError<P>> {
		self.inline_encoder()?.draw(vertices, instances)
	}

	/// Records `tasks` into secondary command buffers on the workers of `recorder` and executes them in this
	/// subpass. Tasks are distributed round-robin over the workers, every worker records its tasks in order into a
	/// single secondary command buffer, and the secondaries are executed in worker order. Blocks until all workers
	/// finished. Returns the amount of executed secondary command buffers.
	pub fn record_parallel<F>(
		&mut self,
		recorder: &ParallelRecorder<P>,
		tasks: impl IntoIterator<Item = F>,
	) -> Result<usize, CommandError<P>>
	where
		F: FnOnce(&mut SecondaryRecording<'_, P>) -> Result<(), CommandError<P>> + Send,
	{
		if self.contents != SubpassContents::SecondaryCommandBuffers {
			return Err(CommandError::WrongSubpassContents(self.contents));
		}
		let secondaries = recorder.record(self.ctx, &self.framebuffer.framebuffer, self.subpass, tasks)?;
		let count = secondaries.len();
		self.cmd.execute_secondaries(self.ctx, secondaries);
		Ok(count)
	}

	pub fn next_subpass(&mut self, contents: SubpassContents) {
		unsafe { self.ctx.platform().cmd_next_subpass(self.cmd.command_buffer_mut(), contents) };
		self.subpass += 1;
		self.contents = contents;
	}

	pub fn end(mut self) {
		self.end_render_pass();
	}

	fn end_render_pass(&mut self) {
		if !self.ended {
			self.ended = true;
			unsafe { self.ctx.platform().cmd_end_render_pass(self.cmd.command_buffer_mut()) };
		}
	}
}

impl<P: GraphicsPlatform> Drop for RenderPassRecording<'_, P> {
	fn drop(&mut self) {
		self.end_render_pass();
	}
}
