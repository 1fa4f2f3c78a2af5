// ---------------------------------------------------------------------------
// FileTree: path-addressed hierarchy of directories and files
// ---------------------------------------------------------------------------
//
// A tree is rooted at a single depth-1 directory. Directories may be inner
// nodes or leaves; files are always leaves. All operations other than
// `init` require the tree to be initialized.
// ---------------------------------------------------------------------------

use tracing::{debug, info, trace, warn};

use crate::checker::{self, Violation};
use crate::config::FtLimits;
use crate::error::FtError;
use crate::node::{copy_bytes, ChildSlot, Node, NodeKind, Seed};
use crate::path::FtPath;

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStat {
	pub kind: NodeKind,
	/// Content length; only reported for files.
	pub size: Option<usize>,
}

impl NodeStat {
	pub fn is_file(&self) -> bool {
		self.kind == NodeKind::File
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
	pub node_count: usize,
	pub file_count: usize,
	pub directory_count: usize,
	pub total_size: usize,
}

/// Child slots leading from the root to the deepest node a traversal
/// reached. Empty means the root itself.
#[derive(Debug, Clone, Default)]
struct Trail {
	steps: Vec<ChildSlot>,
}

// ---------------------------------------------------------------------------
// FileTree
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct FileTree {
	initialized: bool,
	root: Option<Node>,
	file_count: usize,
	dir_count: usize,
	node_count: usize,
	total_size: usize,
	limits: FtLimits,
}

impl FileTree {
	// -- Lifecycle --------------------------------------------------------

	/// An uninitialized tree with default limits.
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_limits(limits: FtLimits) -> Self {
		Self {
			limits,
			..Self::default()
		}
	}

	pub fn init(&mut self) -> Result<(), FtError> {
		if self.initialized {
			return Err(FtError::Initialization(
				"File tree is already initialized".to_string(),
			));
		}
		self.initialized = true;
		self.root = None;
		self.reset_counters();
		info!("file tree initialized");
		Ok(())
	}

	/// Initialize with new limits. Fails like [`FileTree::init`] when the
	/// tree is already initialized, leaving the limits untouched.
	pub fn init_with(&mut self, limits: FtLimits) -> Result<(), FtError> {
		if self.initialized {
			return Err(FtError::Initialization(
				"File tree is already initialized".to_string(),
			));
		}
		self.limits = limits;
		self.init()
	}

	pub fn destroy(&mut self) -> Result<(), FtError> {
		self.ensure_initialized()?;
		if let Some(root) = self.root.take() {
			let freed = root.free();
			debug!(
				dirs = freed.dirs,
				files = freed.files,
				"released file tree"
			);
		}
		self.reset_counters();
		self.initialized = false;
		info!("file tree destroyed");
		Ok(())
	}

	fn reset_counters(&mut self) {
		self.file_count = 0;
		self.dir_count = 0;
		self.node_count = 0;
		self.total_size = 0;
	}

	fn ensure_initialized(&self) -> Result<(), FtError> {
		if !self.initialized {
			return Err(FtError::Initialization(
				"File tree is not initialized".to_string(),
			));
		}
		Ok(())
	}

	// -- Traversal (private) ----------------------------------------------

	/// Walk from the root towards `path` as far as the tree allows.
	///
	/// Returns `None` when the tree has no root. Descent stops at the first
	/// missing level, or right after stepping onto a file.
	fn traverse_path(&self, path: &FtPath) -> Result<Option<Trail>, FtError> {
		let root = match &self.root {
			Some(r) => r,
			None => return Ok(None),
		};

		let top = path.prefix(1)?;
		if root.path() != &top {
			return Err(FtError::ConflictingPath(format!(
				"{} is not under the root {}",
				path,
				root.path()
			)));
		}

		let mut trail = Trail::default();
		let mut current = root;
		for level in 2..=path.depth() {
			let prefix = path.prefix(level)?;
			let slot = match current.has_child(&prefix) {
				Some(s) => s,
				None => break,
			};
			current = current.child(slot)?;
			trail.steps.push(slot);
			trace!(path = %current.path(), "traversed");
			if slot.kind == NodeKind::File {
				break;
			}
		}

		Ok(Some(trail))
	}

	fn node_at(&self, steps: &[ChildSlot]) -> Result<&Node, FtError> {
		let mut current = self
			.root
			.as_ref()
			.ok_or_else(|| FtError::NoSuchPath("File tree is empty".to_string()))?;
		for slot in steps {
			current = current.child(*slot)?;
		}
		Ok(current)
	}

	fn node_at_mut(&mut self, steps: &[ChildSlot]) -> Result<&mut Node, FtError> {
		let mut current = self
			.root
			.as_mut()
			.ok_or_else(|| FtError::NoSuchPath("File tree is empty".to_string()))?;
		for slot in steps {
			current = current.child_mut(*slot)?;
		}
		Ok(current)
	}

	/// Trail to the node at exactly `path`, optionally of a given kind.
	fn locate(&self, path: &FtPath, expected: Option<NodeKind>) -> Result<Trail, FtError> {
		let trail = self
			.traverse_path(path)?
			.ok_or_else(|| FtError::NoSuchPath(path.to_string()))?;
		let node = self.node_at(&trail.steps)?;
		if node.path() != path {
			return Err(FtError::NoSuchPath(path.to_string()));
		}
		match (expected, node.kind()) {
			(Some(NodeKind::Directory), NodeKind::File) => {
				Err(FtError::NotADirectory(path.to_string()))
			}
			(Some(NodeKind::File), NodeKind::Directory) => Err(FtError::NotAFile(path.to_string())),
			_ => Ok(trail),
		}
	}

	fn find_node(&self, raw: &str, expected: NodeKind) -> Result<&Node, FtError> {
		self.ensure_initialized()?;
		let path = FtPath::parse(raw)?;
		let trail = self.locate(&path, Some(expected))?;
		self.node_at(&trail.steps)
	}

	// -- Insertion --------------------------------------------------------

	pub fn insert_directory(&mut self, path: &str) -> Result<(), FtError> {
		self.insert(path, Seed::Directory)
	}

	/// Insert a file holding a copy of `contents`, creating any missing
	/// ancestor directories.
	pub fn insert_file(&mut self, path: &str, contents: &[u8]) -> Result<(), FtError> {
		self.insert(path, Seed::File(contents))
	}

	fn insert(&mut self, raw: &str, seed: Seed<'_>) -> Result<(), FtError> {
		self.ensure_initialized()?;
		let path = FtPath::parse(raw)?;
		self.limits.check_path(&path)?;

		if matches!(seed, Seed::File(_)) && self.root.is_none() {
			return Err(FtError::ConflictingPath(format!(
				"A file cannot be the root: {}",
				path
			)));
		}

		let trail = self.traverse_path(&path)?;
		let ancestor = match &trail {
			Some(t) => Some(self.node_at(&t.steps)?),
			None => None,
		};
		if let Some(anc) = ancestor {
			if anc.path() == &path {
				return Err(FtError::AlreadyInTree(path.to_string()));
			}
			if anc.is_file() {
				return Err(FtError::NotADirectory(format!(
					"{} is a file and cannot contain {}",
					anc.path(),
					path
				)));
			}
		}

		if let Seed::File(bytes) = seed {
			self.limits.check_bytes(self.total_size, bytes.len())?;
		}

		let first = ancestor.map_or(1, |a| a.path().depth() + 1);
		let levels = path.depth() - first + 1;
		let staged = self.stage(ancestor, &path, first, seed)?;

		match trail {
			None => self.root = Some(staged),
			Some(t) => {
				let anc = self.node_at_mut(&t.steps)?;
				if let Err(err) = anc.attach(staged) {
					warn!(path = %path, levels, error = %err, "insert rolled back");
					return Err(err);
				}
			}
		}

		self.node_count += levels;
		match seed {
			Seed::Directory => self.dir_count += levels,
			Seed::File(bytes) => {
				self.file_count += 1;
				self.dir_count += levels - 1;
				self.total_size += bytes.len();
			}
		}

		debug!(path = %path, levels, kind = seed.kind().as_str(), "inserted");
		self.debug_verify("insert");
		Ok(())
	}

	/// Build every missing level from `first` down to `path` as a detached
	/// chain. Nothing is linked into the tree here; on failure the partial
	/// chain is freed before the error is returned.
	fn stage(
		&self,
		ancestor: Option<&Node>,
		path: &FtPath,
		first: usize,
		seed: Seed<'_>,
	) -> Result<Node, FtError> {
		let target = path.depth();
		let first_seed = if first == target { seed } else { Seed::Directory };

		self.limits.check_node_budget(self.node_count)?;
		let mut top = Node::create(ancestor, path.prefix(first)?, first_seed)?;
		let mut created = 1;

		if let Err(err) = grow_chain(
			&mut top,
			path,
			seed,
			&self.limits,
			self.node_count,
			&mut created,
		) {
			let freed = top.free();
			warn!(
				path = %path,
				created,
				freed = freed.total(),
				error = %err,
				"insert rolled back"
			);
			return Err(err);
		}

		Ok(top)
	}

	// -- Queries ----------------------------------------------------------

	pub fn contains_directory(&self, path: &str) -> bool {
		self.find_node(path, NodeKind::Directory).is_ok()
	}

	pub fn contains_file(&self, path: &str) -> bool {
		self.find_node(path, NodeKind::File).is_ok()
	}

	pub fn stat(&self, raw: &str) -> Result<NodeStat, FtError> {
		self.ensure_initialized()?;
		let path = FtPath::parse(raw)?;
		let trail = self.locate(&path, None)?;
		let node = self.node_at(&trail.steps)?;
		Ok(NodeStat {
			kind: node.kind(),
			size: node.file_len(),
		})
	}

	/// Contents of the file at `path`. `None` when there is no such file;
	/// an empty file yields `Some(&[])`.
	pub fn get_file_contents(&self, path: &str) -> Option<&[u8]> {
		self.find_node(path, NodeKind::File).ok()?.contents()
	}

	// -- Removal ----------------------------------------------------------

	pub fn remove_directory(&mut self, path: &str) -> Result<(), FtError> {
		self.remove(path, NodeKind::Directory)
	}

	pub fn remove_file(&mut self, path: &str) -> Result<(), FtError> {
		self.remove(path, NodeKind::File)
	}

	fn remove(&mut self, raw: &str, kind: NodeKind) -> Result<(), FtError> {
		self.ensure_initialized()?;
		let path = FtPath::parse(raw)?;
		let trail = self.locate(&path, Some(kind))?;

		let freed = match trail.steps.split_last() {
			None => {
				let root = self
					.root
					.take()
					.ok_or_else(|| FtError::NoSuchPath(path.to_string()))?;
				root.free()
			}
			Some((last, parents)) => self.node_at_mut(parents)?.release_child(*last)?,
		};

		self.node_count -= freed.total();
		self.dir_count -= freed.dirs;
		self.file_count -= freed.files;
		self.total_size -= freed.bytes;
		if self.node_count == 0 {
			self.root = None;
		}

		debug!(
			path = %path,
			dirs = freed.dirs,
			files = freed.files,
			"removed"
		);
		self.debug_verify("remove");
		Ok(())
	}

	// -- Contents ---------------------------------------------------------

	/// Replace the contents of the file at `path` with a copy of
	/// `new_contents`, returning the previous contents. `None` when there is
	/// no such file or the new contents cannot be stored.
	pub fn replace_file_contents(&mut self, path: &str, new_contents: &[u8]) -> Option<Vec<u8>> {
		match self.swap_contents(path, new_contents) {
			Ok(old) => Some(old),
			Err(err) => {
				debug!(path, error = %err, "contents not replaced");
				None
			}
		}
	}

	fn swap_contents(&mut self, raw: &str, new_contents: &[u8]) -> Result<Vec<u8>, FtError> {
		self.ensure_initialized()?;
		let path = FtPath::parse(raw)?;
		let trail = self.locate(&path, Some(NodeKind::File))?;
		let old_len = self.node_at(&trail.steps)?.file_len().unwrap_or(0);
		self.limits
			.check_bytes(self.total_size - old_len, new_contents.len())?;

		let buf = copy_bytes(new_contents)?;
		let old = self.node_at_mut(&trail.steps)?.replace_contents(buf)?;
		self.total_size = self.total_size - old.len() + new_contents.len();

		debug!(path = %path, old = old.len(), new = new_contents.len(), "replaced contents");
		self.debug_verify("replace");
		Ok(old)
	}

	// -- Rendering --------------------------------------------------------

	/// One line per node in pre-order, files before subdirectories at each
	/// level. `None` when the tree is not initialized.
	pub fn listing(&self) -> Option<String> {
		if !self.initialized {
			return None;
		}
		let mut out = String::new();
		if let Some(root) = &self.root {
			write_subtree(root, &mut out);
		}
		Some(out)
	}

	// -- Introspection ----------------------------------------------------

	pub fn is_initialized(&self) -> bool {
		self.initialized
	}

	pub fn root(&self) -> Option<&Node> {
		self.root.as_ref()
	}

	pub fn limits(&self) -> &FtLimits {
		&self.limits
	}

	pub fn metrics(&self) -> Metrics {
		Metrics {
			node_count: self.node_count,
			file_count: self.file_count,
			directory_count: self.dir_count,
			total_size: self.total_size,
		}
	}

	pub fn check(&self) -> Result<(), Violation> {
		checker::check(self)
	}

	fn debug_verify(&self, operation: &str) {
		if cfg!(debug_assertions) {
			if let Err(violation) = checker::check(self) {
				warn!(operation, %violation, "file tree invariant violated");
				debug_assert!(false, "{operation} broke a file tree invariant: {violation}");
			}
		}
	}
}

/// Create the levels below `top` down to `path`, one at a time.
fn grow_chain(
	top: &mut Node,
	path: &FtPath,
	seed: Seed<'_>,
	limits: &FtLimits,
	live: usize,
	created: &mut usize,
) -> Result<(), FtError> {
	let target = path.depth();
	let mut cursor = top;
	for level in cursor.path().depth() + 1..=target {
		limits.check_node_budget(live + *created)?;
		let level_seed = if level == target { seed } else { Seed::Directory };
		cursor = cursor.create_child(path.prefix(level)?, level_seed)?;
		*created += 1;
		trace!(path = %cursor.path(), "created level");
	}
	Ok(())
}

fn write_subtree(node: &Node, out: &mut String) {
	out.push_str(node.path().as_str());
	out.push('\n');
	for file in node.children(NodeKind::File).unwrap_or_default() {
		out.push_str(file.path().as_str());
		out.push('\n');
	}
	for dir in node.children(NodeKind::Directory).unwrap_or_default() {
		write_subtree(dir, out);
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
