//! Parallel recording of secondary command buffers on a fixed pool of worker threads.
//!
//! Every worker owns a command pool, as command pools may only be used by one thread at a time. Secondary command
//! buffers are owned by the primary [`CommandBuffer`] executing them and return to their worker's free list once
//! the primary retired.
//!
//! [`CommandBuffer`]: crate::command::CommandBuffer

use crate::access::AccessError;
use crate::backing::handle::Handle;
use crate::command::{CommandError, Encoder, ResourceTracker};
use crate::context::GraphicsContext;
use crate::epoch::QueueType;
use crate::platform::{CommandBufferLevel, GraphicsPlatform};
use crate::resource::{DescriptorSet, Pipeline, ResourceKind};
use parking_lot::Mutex;
use std::fmt::{Debug, Formatter};
use std::ops::Range;
use std::sync::Arc;

struct WorkerCommandPool<P: GraphicsPlatform> {
	pool: P::CommandPool,
	free: Vec<P::CommandBuffer>,
}

type Worker<P> = Arc<Mutex<WorkerCommandPool<P>>>;

pub struct ParallelRecorder<P: GraphicsPlatform> {
	queue: QueueType,
	thread_pool: rayon::ThreadPool,
	workers: Vec<Worker<P>>,
}

impl<P: GraphicsPlatform> ParallelRecorder<P> {
	/// Spawns [`ContextConfig::workers`] threads recording for `queue`.
	///
	/// [`ContextConfig::workers`]: crate::config::ContextConfig::workers
	pub fn new(ctx: &GraphicsContext<P>, queue: QueueType) -> Result<Self, CommandError<P>> {
		let worker_count = ctx.config().workers();
		let thread_pool = rayon::ThreadPoolBuilder::new()
			.num_threads(worker_count)
			.thread_name(|i| format!("secondary-recorder-{i}"))
			.build()?;

		let platform = ctx.platform();
		let mut workers = Vec::with_capacity(worker_count);
		for _ in 0..worker_count {
			match unsafe { platform.create_command_pool(queue) } {
				Ok(pool) => workers.push(Arc::new(Mutex::new(WorkerCommandPool {
					pool,
					free: Vec::new(),
				}))),
				Err(e) => {
					Self::destroy_workers(platform, workers);
					return Err(CommandError::Platform(e));
				}
			}
		}
		log::debug!("spawned {} secondary recording workers for {:?}", worker_count, queue);
		Ok(Self {
			queue,
			thread_pool,
			workers,
		})
	}

	#[inline]
	pub fn queue(&self) -> QueueType {
		self.queue
	}

	#[inline]
	pub fn worker_count(&self) -> usize {
		self.workers.len()
	}

	/// True if no secondary command buffer of this recorder is owned by a primary command buffer.
	pub fn is_idle(&self) -> bool {
		self.workers.iter().all(|w| Arc::strong_count(w) == 1)
	}

	pub(crate) fn record<F>(
		&self,
		ctx: &GraphicsContext<P>,
		framebuffer: &P::Framebuffer,
		subpass: u32,
		tasks: impl IntoIterator<Item = F>,
	) -> Result<Vec<(SecondaryCommandBuffer<P>, ResourceTracker)>, CommandError<P>>
	where
		F: FnOnce(&mut SecondaryRecording<'_, P>) -> Result<(), CommandError<P>> + Send,
	{
		profiling::function_scope!();
		let worker_count = self.workers.len();
		let mut buckets = (0..worker_count).map(|_| Vec::new()).collect::<Vec<Vec<F>>>();
		for (i, task) in tasks.into_iter().enumerate() {
			buckets[i % worker_count].push(task);
		}

		let mut results = (0..worker_count).map(|_| None).collect::<Vec<_>>();
		let queue = self.queue;
		self.thread_pool.scope(|scope| {
			let jobs = self.workers.iter().zip(buckets).zip(results.iter_mut()).enumerate();
			for (index, ((worker, tasks), result)) in jobs {
				if tasks.is_empty() {
					continue;
				}
				scope.spawn(move |_| {
					*result = Some(record_worker(ctx, worker, queue, index, framebuffer, subpass, tasks));
				});
			}
		});
		results.into_iter().flatten().collect()
	}

	/// Destroys the command pools of all workers. Workers whose secondary command buffers are still owned by a
	/// primary command buffer are leaked, retire all primaries first.
	pub fn destroy(self, ctx: &GraphicsContext<P>) {
		Self::destroy_workers(ctx.platform(), self.workers);
	}

	fn destroy_workers(platform: &P, workers: Vec<Worker<P>>) {
		for (index, worker) in workers.into_iter().enumerate() {
			match Arc::try_unwrap(worker) {
				Ok(worker) => unsafe { platform.destroy_command_pool(worker.into_inner().pool) },
				Err(_) => log::error!(
					"secondary recording worker {} still has command buffers in use, leaking its command pool",
					index
				),
			}
		}
	}
}

impl<P: GraphicsPlatform> Debug for ParallelRecorder<P> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ParallelRecorder")
			.field("queue", &self.queue)
			.field("workers", &self.workers.len())
			.finish()
	}
}

fn record_worker<P, F>(
	ctx: &GraphicsContext<P>,
	worker: &Worker<P>,
	queue: QueueType,
	index: usize,
	framebuffer: &P::Framebuffer,
	subpass: u32,
	tasks: Vec<F>,
) -> Result<(SecondaryCommandBuffer<P>, ResourceTracker), CommandError<P>>
where
	P: GraphicsPlatform,
	F: FnOnce(&mut SecondaryRecording<'_, P>) -> Result<(), CommandError<P>>,
{
	profiling::scope!("record_worker");
	let platform = ctx.platform();
	let mut secondary = SecondaryCommandBuffer::acquire(platform, worker)?;
	unsafe { platform.begin_secondary_command_buffer(secondary.cmd_mut(), framebuffer, subpass) }
		.map_err(CommandError::Platform)?;
	let mut recording = SecondaryRecording {
		ctx,
		cmd: secondary.cmd_mut(),
		tracker: ResourceTracker::new(queue),
		worker: index,
	};
	for task in tasks {
		task(&mut recording)?;
	}
	let tracker = recording.tracker;
	unsafe { platform.end_command_buffer(secondary.cmd_mut()) }.map_err(CommandError::Platform)?;
	Ok((secondary, tracker))
}

/// A secondary command buffer, returned to the free list of its worker when dropped.
pub struct SecondaryCommandBuffer<P: GraphicsPlatform> {
	cmd: Option<P::CommandBuffer>,
	home: Worker<P>,
}

impl<P: GraphicsPlatform> SecondaryCommandBuffer<P> {
	fn acquire(platform: &P, home: &Worker<P>) -> Result<Self, CommandError<P>> {
		let cmd = {
			let mut worker = home.lock();
			match worker.free.pop() {
				Some(mut cmd) => match unsafe { platform.reset_command_buffer(&mut cmd) } {
					Ok(()) => cmd,
					Err(e) => {
						worker.free.push(cmd);
						return Err(CommandError::Platform(e));
					}
				},
				None => unsafe { platform.allocate_command_buffer(&mut worker.pool, CommandBufferLevel::Secondary) }
					.map_err(CommandError::Platform)?,
			}
		};
		Ok(Self {
			cmd: Some(cmd),
			home: home.clone(),
		})
	}

	pub fn cmd(&self) -> &P::CommandBuffer {
		match &self.cmd {
			Some(cmd) => cmd,
			None => unreachable!("only taken when dropped"),
		}
	}

	fn cmd_mut(&mut self) -> &mut P::CommandBuffer {
		match &mut self.cmd {
			Some(cmd) => cmd,
			None => unreachable!("only taken when dropped"),
		}
	}
}

impl<P: GraphicsPlatform> Drop for SecondaryCommandBuffer<P> {
	fn drop(&mut self) {
		if let Some(cmd) = self.cmd.take() {
			self.home.lock().free.push(cmd);
		}
	}
}

/// Recording of one worker into its secondary command buffer.
pub struct SecondaryRecording<'a, P: GraphicsPlatform> {
	ctx: &'a GraphicsContext<P>,
	cmd: &'a mut P::CommandBuffer,
	tracker: ResourceTracker,
	worker: usize,
}

impl<'a, P: GraphicsPlatform> SecondaryRecording<'a, P> {
	#[inline]
	pub fn ctx(&self) -> &'a GraphicsContext<P> {
		self.ctx
	}

	/// Index of the worker recording, which is also the position its commands are executed at.
	#[inline]
	pub fn worker(&self) -> usize {
		self.worker
	}

	pub fn encoder(&mut self) -> Encoder<'_, 'a, P> {
		Encoder {
			ctx: self.ctx,
			cmd: &mut *self.cmd,
			tracker: &mut self.tracker,
		}
	}

	pub fn use_resource<K: ResourceKind>(&mut self, handle: Handle<K>) -> Result<&'a K::Slot<P>, AccessError> {
		self.tracker.use_resource(self.ctx, handle)
	}

	pub fn bind_pipeline(&mut self, pipeline: Handle<Pipeline>) -> Result<(), CommandError<P>> {
		self.encoder().bind_pipeline(pipeline)
	}

	pub fn bind_descriptor_set(
		&mut self,
		pipeline: Handle<Pipeline>,
		descriptor_set: Handle<DescriptorSet>,
	) -> Result<(), CommandError<P>> {
		self.encoder().bind_descriptor_set(pipeline, descriptor_set)
	}

	pub fn push_constants<T: bytemuck::Pod>(
		&mut self,
		pipeline: Handle<Pipeline>,
		constants: &T,
	) -> Result<(), CommandError<P>> {
		self.encoder().push_constants(pipeline, constants)
	}

	pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) -> Result<(), CommandError<P>> {
		self.encoder().draw(vertices, instances)
	}
}
