//! Background execution glue: runtime resolution, blocking spawn, cancellation.

use std::any::Any;
use std::sync::OnceLock;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("xeno-lens-global")
			.build()
			.expect("failed to build xeno-lens global tokio runtime")
	});
	runtime.handle().clone()
}

/// Runs `f` on the blocking pool of the current (or global) runtime.
pub(crate) fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!("lens.worker.spawn_blocking");
	runtime_handle().spawn_blocking(f)
}

/// Cooperative cancellation handle for one computation generation.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
	token: CancellationToken,
}

impl CancelFlag {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}

	pub fn cancel(&self) {
		self.token.cancel();
	}
}

/// Extracts the message of a panic payload, if it carries one.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		(*msg).to_string()
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.clone()
	} else {
		"non-string panic payload".to_string()
	}
}
