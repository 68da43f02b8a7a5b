#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use xeno_lens::testing::{RecordingView, StaticProvider};
use xeno_lens::{DocumentSource, LensHost, LensSettings, ProviderDescriptor, SharedProvider, TickStats};
use xeno_primitives::{Document, DocumentId};

pub const DOC: DocumentId = DocumentId(1);
pub const TEXT: &str = "fn main() {}\n\nfn helper() {}\n\nstruct Point;\n";

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn docs() -> HashMap<DocumentId, Document> {
	HashMap::from([(DOC, Document::new(DOC, TEXT))])
}

pub fn host(settings: LensSettings) -> (LensHost, RecordingView) {
	let view = RecordingView::new();
	let host = LensHost::new(settings, Box::new(view.clone())).unwrap();
	(host, view)
}

pub fn provider(descriptor: ProviderDescriptor, lenses: &[(std::ops::Range<usize>, &str)]) -> Arc<StaticProvider> {
	let provider = StaticProvider::new(descriptor);
	provider.set_lenses(lenses);
	Arc::new(provider)
}

pub fn shared(provider: &Arc<StaticProvider>) -> SharedProvider {
	Arc::clone(provider) as SharedProvider
}

/// Ticks past every debounce deadline and waits for background work until nothing is left.
pub async fn settle(host: &mut LensHost, docs: &impl DocumentSource) -> TickStats {
	let mut total = TickStats::default();
	for _ in 0..64 {
		let stats = host.tick(Instant::now() + Duration::from_secs(60), docs);
		total.started += stats.started;
		total.published += stats.published;
		total.no_ops += stats.no_ops;
		total.discarded += stats.discarded;
		total.resubmitted += stats.resubmitted;

		if host.has_inflight() {
			host.completed().await;
			continue;
		}
		if host.next_deadline().is_none() {
			break;
		}
	}
	total
}
