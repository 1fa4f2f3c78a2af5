// ---------------------------------------------------------------------------
// Consistency checker for FileTree
// ---------------------------------------------------------------------------
//
// Read-only walk from the root that confirms every structural invariant and
// that the tree's maintained counters match what is reachable.
// ---------------------------------------------------------------------------

use std::cmp::Ordering;

use thiserror::Error;
use tracing::warn;

use crate::node::{Node, NodeKind};
use crate::tree::{FileTree, Metrics};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Violation {
	#[error("uninitialized tree has a root")]
	UninitializedWithRoot,
	#[error("uninitialized tree reports {0} nodes")]
	UninitializedWithNodes(usize),
	#[error("root {path} has depth {depth}, expected 1")]
	RootDepth { path: String, depth: usize },
	#[error("{child} is not exactly one level below {parent}")]
	NotAChildPath { parent: String, child: String },
	#[error("{child} is stored with the {stored} children of {parent}")]
	WrongCollection {
		parent: String,
		child: String,
		stored: &'static str,
	},
	#[error("{parent} lists {later} after {earlier}")]
	Unsorted {
		parent: String,
		earlier: String,
		later: String,
	},
	#[error("{parent} has more than one child at {path}")]
	DuplicateChild { parent: String, path: String },
	#[error("{parent} declares {declared} {kind} children but {retrievable} are retrievable")]
	ChildCount {
		parent: String,
		kind: &'static str,
		declared: usize,
		retrievable: usize,
	},
	#[error("{counter} counter is {recorded} but {reachable} are reachable")]
	Counter {
		counter: &'static str,
		recorded: usize,
		reachable: usize,
	},
}

/// What a walk found beneath the root.
#[derive(Debug, Default)]
struct Tally {
	dirs: usize,
	files: usize,
	bytes: usize,
}

pub fn check(tree: &FileTree) -> Result<(), Violation> {
	check_parts(tree.is_initialized(), tree.root(), &tree.metrics())
}

/// Log the first violation found, if any.
pub fn is_valid(tree: &FileTree) -> bool {
	match check(tree) {
		Ok(()) => true,
		Err(violation) => {
			warn!(%violation, "file tree failed consistency check");
			false
		}
	}
}

/// Check a tree given as its raw parts.
pub fn check_parts(
	initialized: bool,
	root: Option<&Node>,
	counts: &Metrics,
) -> Result<(), Violation> {
	if !initialized {
		if root.is_some() {
			return Err(Violation::UninitializedWithRoot);
		}
		if counts.node_count != 0 {
			return Err(Violation::UninitializedWithNodes(counts.node_count));
		}
		return Ok(());
	}

	let mut tally = Tally::default();
	if let Some(root) = root {
		let depth = root.path().depth();
		if depth != 1 {
			return Err(Violation::RootDepth {
				path: root.path().to_string(),
				depth,
			});
		}
		walk(root, &mut tally)?;
	}

	compare_counter("node", counts.node_count, tally.dirs + tally.files)?;
	compare_counter("directory", counts.directory_count, tally.dirs)?;
	compare_counter("file", counts.file_count, tally.files)?;
	compare_counter("byte", counts.total_size, tally.bytes)
}

fn compare_counter(counter: &'static str, recorded: usize, reachable: usize) -> Result<(), Violation> {
	if recorded != reachable {
		return Err(Violation::Counter {
			counter,
			recorded,
			reachable,
		});
	}
	Ok(())
}

fn walk(node: &Node, tally: &mut Tally) -> Result<(), Violation> {
	if let Some(len) = node.file_len() {
		tally.files += 1;
		tally.bytes += len;
		return Ok(());
	}
	tally.dirs += 1;

	let files = node.children(NodeKind::File).unwrap_or_default();
	let dirs = node.children(NodeKind::Directory).unwrap_or_default();
	check_declared(node, NodeKind::File, node.num_file_children(), files.len())?;
	check_declared(node, NodeKind::Directory, node.num_dir_children(), dirs.len())?;

	check_collection(node, files, NodeKind::File)?;
	check_collection(node, dirs, NodeKind::Directory)?;

	for file in files {
		if dirs
			.binary_search_by(|d| d.path().cmp(file.path()))
			.is_ok()
		{
			return Err(Violation::DuplicateChild {
				parent: node.path().to_string(),
				path: file.path().to_string(),
			});
		}
	}

	for child in files.iter().chain(dirs) {
		walk(child, tally)?;
	}
	Ok(())
}

/// Declared counts must agree with what the positional accessors return.
fn check_declared(
	node: &Node,
	kind: NodeKind,
	declared: usize,
	stored: usize,
) -> Result<(), Violation> {
	let retrievable = (0..declared)
		.take_while(|&i| match kind {
			NodeKind::File => node.get_file_child(i).is_ok(),
			NodeKind::Directory => node.get_dir_child(i).is_ok(),
		})
		.count();
	if retrievable != declared || declared != stored {
		return Err(Violation::ChildCount {
			parent: node.path().to_string(),
			kind: kind.as_str(),
			declared,
			retrievable: retrievable.min(stored),
		});
	}
	Ok(())
}

fn check_collection(parent: &Node, children: &[Node], kind: NodeKind) -> Result<(), Violation> {
	let parent_path = parent.path();
	let parent_depth = parent_path.depth();

	for child in children {
		let path = child.path();
		if path.depth() != parent_depth + 1 || path.shared_prefix_depth(parent_path) != parent_depth {
			return Err(Violation::NotAChildPath {
				parent: parent_path.to_string(),
				child: path.to_string(),
			});
		}
		if child.kind() != kind {
			return Err(Violation::WrongCollection {
				parent: parent_path.to_string(),
				child: path.to_string(),
				stored: kind.as_str(),
			});
		}
	}

	for pair in children.windows(2) {
		match pair[0].compare(&pair[1]) {
			Ordering::Less => {}
			Ordering::Equal => {
				return Err(Violation::DuplicateChild {
					parent: parent_path.to_string(),
					path: pair[1].path().to_string(),
				});
			}
			Ordering::Greater => {
				return Err(Violation::Unsorted {
					parent: parent_path.to_string(),
					earlier: pair[0].path().to_string(),
					later: pair[1].path().to_string(),
				});
			}
		}
	}
	Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
