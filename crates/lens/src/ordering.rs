//! Deterministic provider ordering under relative-order constraints.
//!
//! Constraints become edges `x -> y` meaning "`y` is ordered after `x`". Two
//! sentinel nodes anchor the traversal: `First` points at every provider
//! declaring [`OrderingConstraint::First`], `Last` at every provider declaring
//! [`OrderingConstraint::Last`], and `First -> Last` always exists.
//!
//! The order is the reversed depth-first postorder, visiting `Last` first,
//! then every provider in registration order, then `First`. For acyclic
//! constraint sets this is a topological order. Cycles do not fail: the
//! visited guard breaks them and the result follows first-visitation order.
//!
//! Ids referenced by `Before`/`After` without a registered descriptor are
//! plain graph nodes. The traversal walks through them, so they still relay
//! transitive constraints, but they are never emitted.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::descriptor::{OrderingConstraint, ProviderDescriptor};
use crate::id::ProviderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Node<'a> {
	First,
	Last,
	Provider(&'a str),
}

/// Adjacency lists keyed by node; neighbour order is insertion order.
#[derive(Default)]
struct OrderingGraph<'a> {
	after: FxHashMap<Node<'a>, Vec<Node<'a>>>,
}

impl<'a> OrderingGraph<'a> {
	fn edge(&mut self, from: Node<'a>, to: Node<'a>) {
		self.after.entry(from).or_default().push(to);
	}

	fn successors(&self, node: Node<'a>) -> &[Node<'a>] {
		self.after.get(&node).map_or(&[], Vec::as_slice)
	}

	/// Iterative postorder walk from `root`, calling `finish` once per newly
	/// visited node after all of its successors.
	fn visit(&self, root: Node<'a>, visited: &mut FxHashSet<Node<'a>>, mut finish: impl FnMut(Node<'a>)) {
		if !visited.insert(root) {
			return;
		}

		let mut stack = vec![(root, 0usize)];
		loop {
			let Some(top) = stack.last_mut() else {
				break;
			};
			let node = top.0;
			let next = self.successors(node).get(top.1).copied();
			top.1 += 1;

			match next {
				Some(child) => {
					if visited.insert(child) {
						stack.push((child, 0));
					}
				}
				None => {
					stack.pop();
					finish(node);
				}
			}
		}
	}
}

/// Resolves a total order over `descriptors`.
///
/// Every registered id appears exactly once; the output depends only on the
/// descriptors and their order, never on hashing.
pub fn resolve(descriptors: &[ProviderDescriptor]) -> Vec<ProviderId> {
	let mut graph = OrderingGraph::default();
	graph.edge(Node::First, Node::Last);

	for descriptor in descriptors {
		let this = Node::Provider(descriptor.id.as_str());
		for constraint in &descriptor.relative_orderings {
			match constraint {
				OrderingConstraint::Before(other) => graph.edge(this, Node::Provider(other.as_str())),
				OrderingConstraint::After(other) => graph.edge(Node::Provider(other.as_str()), this),
				OrderingConstraint::First => graph.edge(Node::First, this),
				OrderingConstraint::Last => graph.edge(Node::Last, this),
			}
		}
	}

	let registered: FxHashMap<&str, &ProviderId> = descriptors.iter().map(|d| (d.id.as_str(), &d.id)).collect();
	let mut visited = FxHashSet::default();
	let mut order: Vec<ProviderId> = Vec::with_capacity(registered.len());
	let mut finish = |node: Node<'_>| {
		if let Node::Provider(id) = node
			&& let Some(id) = registered.get(id)
		{
			order.push((*id).clone());
		}
	};

	graph.visit(Node::Last, &mut visited, &mut finish);
	for descriptor in descriptors {
		graph.visit(Node::Provider(descriptor.id.as_str()), &mut visited, &mut finish);
	}
	graph.visit(Node::First, &mut visited, &mut finish);

	order.reverse();
	tracing::trace!(providers = order.len(), "lens.ordering.resolved");
	order
}
