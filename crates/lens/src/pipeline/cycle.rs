//! Background half of a computation cycle.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use xeno_primitives::{DocumentId, DocumentSnapshot};

use crate::entry::RawResult;
use crate::error::ProviderError;
use crate::id::ProviderId;
use crate::provider::{ComputeContext, SharedProvider, UiData};
use crate::throttle::ProviderThrottle;
use crate::worker::{CancelFlag, panic_message};

/// A provider that passed foreground filtering, with its precompute payload.
pub struct PreparedProvider {
	pub provider: SharedProvider,
	pub ui: UiData,
}

/// Everything a blocking worker needs to run one generation.
pub struct CycleRequest {
	pub doc_id: DocumentId,
	/// Pipeline instance that started the generation.
	pub epoch: u64,
	pub generation: u64,
	pub snapshot: DocumentSnapshot,
	/// In resolved priority order.
	pub providers: Vec<PreparedProvider>,
	pub throttle: Arc<ProviderThrottle>,
	pub cancel: CancelFlag,
}

#[derive(Debug, Default)]
pub struct CycleOutput {
	/// Providers that executed successfully, with their results.
	pub computed: Vec<(ProviderId, Vec<RawResult>)>,
	/// Providers skipped by the throttle or their own `should_recompute`.
	pub skipped: Vec<ProviderId>,
	/// Providers that returned an error or panicked.
	pub failed: Vec<ProviderId>,
	pub cancelled: bool,
}

/// Completion message sent back to the foreground.
#[derive(Debug)]
pub struct CycleDone {
	pub doc_id: DocumentId,
	pub epoch: u64,
	pub generation: u64,
	pub snapshot_version: u64,
	pub output: CycleOutput,
}

/// Runs the providers of one generation in order, checking cancellation between them.
pub fn run_cycle(request: CycleRequest) -> CycleDone {
	let CycleRequest {
		doc_id,
		epoch,
		generation,
		snapshot,
		providers,
		throttle,
		cancel,
	} = request;
	let started = Instant::now();
	let mut output = CycleOutput::default();

	for PreparedProvider { provider, ui } in providers {
		if cancel.is_cancelled() {
			output.cancelled = true;
			break;
		}

		let descriptor = provider.descriptor();
		let id = descriptor.id.clone();
		if !throttle.should_consider(&descriptor.group_id) {
			tracing::debug!(doc = doc_id.0, generation, provider = %id, "lens.cycle.throttled");
			output.skipped.push(id);
			continue;
		}
		let cx = ComputeContext {
			snapshot: &snapshot,
			cancel: &cancel,
		};
		let mut compute_started = None;
		let step = catch_unwind(AssertUnwindSafe(|| {
			if !provider.should_recompute(&snapshot, &ui) {
				return Ok(None);
			}
			compute_started = Some(Instant::now());
			provider.compute(&cx, &ui).map(Some)
		}))
		.unwrap_or_else(|payload| Err(ProviderError::Panicked(panic_message(payload.as_ref()))));
		let elapsed = compute_started.map(|t0| t0.elapsed());

		match step {
			Ok(None) => output.skipped.push(id),
			Ok(Some(results)) => {
				if let Some(elapsed) = elapsed {
					throttle.report(&descriptor.group_id, elapsed);
				}
				output.computed.push((id, results));
			}
			Err(ProviderError::Cancelled) => {
				output.cancelled = true;
				break;
			}
			Err(error) => {
				if let Some(elapsed) = elapsed {
					throttle.report(&descriptor.group_id, elapsed);
				}
				tracing::warn!(doc = doc_id.0, generation, provider = %id, %error, "lens.provider.failed");
				output.failed.push(id);
			}
		}
	}

	if cancel.is_cancelled() {
		output.cancelled = true;
	}

	tracing::debug!(
		doc = doc_id.0,
		generation,
		computed = output.computed.len(),
		skipped = output.skipped.len(),
		failed = output.failed.len(),
		cancelled = output.cancelled,
		elapsed_ms = started.elapsed().as_millis() as u64,
		"lens.cycle.finished"
	);

	CycleDone {
		doc_id,
		epoch,
		generation,
		snapshot_version: snapshot.version(),
		output,
	}
}
