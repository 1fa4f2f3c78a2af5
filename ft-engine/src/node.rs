// ---------------------------------------------------------------------------
// File tree nodes
// ---------------------------------------------------------------------------
//
// A directory owns two child collections, one per kind, each kept sorted by
// path string. A file owns its byte contents. Parents are not referenced
// from children: every lookup and detach goes top-down from the owner.
// ---------------------------------------------------------------------------

use std::cmp::Ordering;
use std::fmt;
use std::mem;

use crate::error::FtError;
use crate::path::FtPath;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
	Directory,
	File,
}

impl NodeKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Directory => "directory",
			Self::File => "file",
		}
	}
}

/// What to build at a new node.
#[derive(Debug, Clone, Copy)]
pub enum Seed<'a> {
	Directory,
	File(&'a [u8]),
}

impl Seed<'_> {
	pub fn kind(&self) -> NodeKind {
		match self {
			Self::Directory => NodeKind::Directory,
			Self::File(_) => NodeKind::File,
		}
	}
}

/// Location of a child inside its parent's collection for `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSlot {
	pub kind: NodeKind,
	pub index: usize,
}

/// Tally of nodes released by a free operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Freed {
	pub dirs: usize,
	pub files: usize,
	pub bytes: usize,
}

impl Freed {
	pub fn total(&self) -> usize {
		self.dirs + self.files
	}
}

impl std::ops::AddAssign for Freed {
	fn add_assign(&mut self, rhs: Self) {
		self.dirs += rhs.dirs;
		self.files += rhs.files;
		self.bytes += rhs.bytes;
	}
}

#[derive(Debug)]
enum Body {
	Directory { dirs: Vec<Node>, files: Vec<Node> },
	File { contents: Vec<u8> },
}

#[derive(Debug)]
pub struct Node {
	path: FtPath,
	body: Body,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

impl Node {
	// -- Construction -----------------------------------------------------

	/// Build a node for `path` without linking it anywhere.
	///
	/// With a parent, `path` must sit exactly one level below the parent's
	/// path and must not already be one of its children. Without a parent,
	/// `path` must have depth 1.
	pub fn create(parent: Option<&Node>, path: FtPath, seed: Seed<'_>) -> Result<Node, FtError> {
		match parent {
			Some(parent) => parent.check_child_path(&path)?,
			None => {
				if path.depth() != 1 {
					return Err(FtError::NoSuchPath(format!(
						"A parentless node must have depth 1: {}",
						path
					)));
				}
			}
		}

		let body = match seed {
			Seed::Directory => Body::Directory {
				dirs: Vec::new(),
				files: Vec::new(),
			},
			Seed::File(bytes) => Body::File {
				contents: copy_bytes(bytes)?,
			},
		};

		Ok(Node { path, body })
	}

	/// Create a child of `self` at `path` and link it in sorted position.
	pub fn create_child(&mut self, path: FtPath, seed: Seed<'_>) -> Result<&mut Node, FtError> {
		let child = Node::create(Some(&*self), path, seed)?;
		self.attach(child)
	}

	/// Link an already built node as a child of `self`.
	pub fn attach(&mut self, child: Node) -> Result<&mut Node, FtError> {
		self.check_child_path(&child.path)?;
		let collection = self.collection_mut(child.kind())?;
		let index = match collection.binary_search_by(|c| c.path.compare_str(child.path.as_str())) {
			Ok(_) => {
				return Err(FtError::AlreadyInTree(child.path.to_string()));
			}
			Err(i) => i,
		};
		collection.try_reserve(1)?;
		collection.insert(index, child);
		Ok(&mut collection[index])
	}

	fn check_child_path(&self, path: &FtPath) -> Result<(), FtError> {
		if self.is_file() {
			return Err(FtError::NotADirectory(format!(
				"A file cannot have children: {}",
				self.path
			)));
		}
		let parent_depth = self.path.depth();
		if path.shared_prefix_depth(&self.path) < parent_depth {
			return Err(FtError::ConflictingPath(format!(
				"{} is not an ancestor of {}",
				self.path, path
			)));
		}
		if path.depth() != parent_depth + 1 {
			return Err(FtError::NoSuchPath(format!(
				"{} is not the direct parent of {}",
				self.path, path
			)));
		}
		if self.has_child(path).is_some() {
			return Err(FtError::AlreadyInTree(path.to_string()));
		}
		Ok(())
	}

	// -- Accessors --------------------------------------------------------

	pub fn path(&self) -> &FtPath {
		&self.path
	}

	pub fn kind(&self) -> NodeKind {
		match self.body {
			Body::Directory { .. } => NodeKind::Directory,
			Body::File { .. } => NodeKind::File,
		}
	}

	pub fn is_file(&self) -> bool {
		self.kind() == NodeKind::File
	}

	/// File contents; `None` for directories.
	pub fn contents(&self) -> Option<&[u8]> {
		match &self.body {
			Body::File { contents } => Some(contents.as_slice()),
			Body::Directory { .. } => None,
		}
	}

	/// File length in bytes; `None` for directories.
	pub fn file_len(&self) -> Option<usize> {
		self.contents().map(<[u8]>::len)
	}

	pub fn num_file_children(&self) -> usize {
		self.collection(NodeKind::File).map_or(0, <[Node]>::len)
	}

	pub fn num_dir_children(&self) -> usize {
		self.collection(NodeKind::Directory).map_or(0, <[Node]>::len)
	}

	/// Child collection for `kind`, sorted by path. `None` for files.
	pub fn children(&self, kind: NodeKind) -> Option<&[Node]> {
		self.collection(kind)
	}

	// -- Child lookup -----------------------------------------------------

	/// Binary-search both collections for a child at `path`, directories
	/// first. Files never have children.
	pub fn has_child(&self, path: &FtPath) -> Option<ChildSlot> {
		[NodeKind::Directory, NodeKind::File]
			.into_iter()
			.find_map(|kind| {
				let collection = self.collection(kind)?;
				collection
					.binary_search_by(|c| c.path.compare_str(path.as_str()))
					.ok()
					.map(|index| ChildSlot { kind, index })
			})
	}

	pub fn get_file_child(&self, index: usize) -> Result<&Node, FtError> {
		self.child(ChildSlot {
			kind: NodeKind::File,
			index,
		})
	}

	pub fn get_dir_child(&self, index: usize) -> Result<&Node, FtError> {
		self.child(ChildSlot {
			kind: NodeKind::Directory,
			index,
		})
	}

	pub fn child(&self, slot: ChildSlot) -> Result<&Node, FtError> {
		self.collection(slot.kind)
			.and_then(|c| c.get(slot.index))
			.ok_or_else(|| self.missing_child(slot))
	}

	pub fn child_mut(&mut self, slot: ChildSlot) -> Result<&mut Node, FtError> {
		if !self.holds(slot) {
			return Err(self.missing_child(slot));
		}
		let collection = self.collection_mut(slot.kind)?;
		Ok(&mut collection[slot.index])
	}

	fn holds(&self, slot: ChildSlot) -> bool {
		self.collection(slot.kind)
			.is_some_and(|c| slot.index < c.len())
	}

	fn missing_child(&self, slot: ChildSlot) -> FtError {
		FtError::NoSuchPath(format!(
			"{} has no {} child at index {}",
			self.path,
			slot.kind.as_str(),
			slot.index
		))
	}

	fn collection(&self, kind: NodeKind) -> Option<&[Node]> {
		match (&self.body, kind) {
			(Body::Directory { dirs, .. }, NodeKind::Directory) => Some(dirs.as_slice()),
			(Body::Directory { files, .. }, NodeKind::File) => Some(files.as_slice()),
			(Body::File { .. }, _) => None,
		}
	}

	fn collection_mut(&mut self, kind: NodeKind) -> Result<&mut Vec<Node>, FtError> {
		match (&mut self.body, kind) {
			(Body::Directory { dirs, .. }, NodeKind::Directory) => Ok(dirs),
			(Body::Directory { files, .. }, NodeKind::File) => Ok(files),
			(Body::File { .. }, _) => Err(FtError::NotADirectory(self.path.to_string())),
		}
	}

	// -- Removal ----------------------------------------------------------

	/// Unlink the child at `slot` and hand it back to the caller.
	pub fn detach(&mut self, slot: ChildSlot) -> Result<Node, FtError> {
		if !self.holds(slot) {
			return Err(self.missing_child(slot));
		}
		let collection = self.collection_mut(slot.kind)?;
		Ok(collection.remove(slot.index))
	}

	/// Unlink the child at `slot` and free its whole subtree.
	pub fn release_child(&mut self, slot: ChildSlot) -> Result<Freed, FtError> {
		Ok(self.detach(slot)?.free())
	}

	/// Free this node and everything beneath it.
	pub fn free(self) -> Freed {
		match self.kind() {
			NodeKind::Directory => self.free_directory(),
			NodeKind::File => {
				let bytes = self.file_len().unwrap_or(0);
				Freed {
					dirs: 0,
					files: self.free_file(),
					bytes,
				}
			}
		}
	}

	/// Post-order release: file children, then directory children, then
	/// the node itself.
	pub fn free_directory(self) -> Freed {
		let mut freed = Freed::default();
		match self.body {
			Body::Directory { dirs, files } => {
				for file in files {
					freed.bytes += file.file_len().unwrap_or(0);
					freed.files += file.free_file();
				}
				for dir in dirs {
					freed += dir.free_directory();
				}
				freed.dirs += 1;
			}
			Body::File { contents } => {
				freed.bytes += contents.len();
				freed.files += 1;
			}
		}
		freed
	}

	/// Release a file node. Returns the number of files freed.
	pub fn free_file(self) -> usize {
		debug_assert!(self.is_file(), "free_file on directory {}", self.path);
		1
	}

	// -- Contents ---------------------------------------------------------

	/// Swap in new contents and return the previous buffer.
	pub fn replace_contents(&mut self, new_contents: Vec<u8>) -> Result<Vec<u8>, FtError> {
		match &mut self.body {
			Body::File { contents } => Ok(mem::replace(contents, new_contents)),
			Body::Directory { .. } => Err(FtError::NotAFile(self.path.to_string())),
		}
	}

	pub fn compare(&self, other: &Node) -> Ordering {
		self.path.cmp(&other.path)
	}

	/// Canonical path string of this node.
	pub fn to_string_repr(&self) -> String {
		self.path.to_string()
	}
}

impl fmt::Display for Node {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.path, f)
	}
}

/// Copy caller bytes into an owned buffer, reporting allocation failure.
pub(crate) fn copy_bytes(bytes: &[u8]) -> Result<Vec<u8>, FtError> {
	let mut buf = Vec::new();
	buf.try_reserve_exact(bytes.len())?;
	buf.extend_from_slice(bytes);
	Ok(buf)
}

// Hand-built nodes for exercising the checker against broken trees.
#[cfg(test)]
impl Node {
	pub(crate) fn raw_directory(path: &str, dirs: Vec<Node>, files: Vec<Node>) -> Node {
		Node {
			path: FtPath::parse(path).unwrap(),
			body: Body::Directory { dirs, files },
		}
	}

	pub(crate) fn raw_file(path: &str, contents: &[u8]) -> Node {
		Node {
			path: FtPath::parse(path).unwrap(),
			body: Body::File {
				contents: contents.to_vec(),
			},
		}
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn p(raw: &str) -> FtPath {
		FtPath::parse(raw).unwrap()
	}

	fn root() -> Node {
		Node::create(None, p("a"), Seed::Directory).unwrap()
	}

	// -- create --

	#[test]
	fn create_root_requires_depth_one() {
		let err = Node::create(None, p("a/b"), Seed::Directory).unwrap_err();
		assert!(matches!(err, FtError::NoSuchPath(_)));
		assert_eq!(root().path().as_str(), "a");
	}

	#[test]
	fn create_rejects_non_ancestor_parent() {
		let parent = root();
		let err = Node::create(Some(&parent), p("b/c"), Seed::Directory).unwrap_err();
		assert!(matches!(err, FtError::ConflictingPath(_)));
	}

	#[test]
	fn create_rejects_skipped_level() {
		let parent = root();
		let err = Node::create(Some(&parent), p("a/b/c"), Seed::Directory).unwrap_err();
		assert!(matches!(err, FtError::NoSuchPath(_)));
	}

	#[test]
	fn create_rejects_existing_child_of_either_kind() {
		let mut parent = root();
		parent.create_child(p("a/x"), Seed::File(b"1")).unwrap();
		let err = Node::create(Some(&parent), p("a/x"), Seed::Directory).unwrap_err();
		assert!(matches!(err, FtError::AlreadyInTree(_)));
	}

	#[test]
	fn create_under_file_fails() {
		let mut parent = root();
		parent.create_child(p("a/f"), Seed::File(b"")).unwrap();
		let file = parent.get_file_child(0).unwrap();
		let err = Node::create(Some(file), p("a/f/g"), Seed::Directory).unwrap_err();
		assert!(matches!(err, FtError::NotADirectory(_)));
	}

	#[test]
	fn file_contents_are_copied() {
		let mut source = b"hello".to_vec();
		let node = Node::create(None, p("f"), Seed::File(&source)).unwrap();
		source[0] = b'j';
		assert_eq!(node.contents(), Some(&b"hello"[..]));
		assert_eq!(node.file_len(), Some(5));
	}

	// -- ordering --

	#[test]
	fn children_stay_sorted_per_kind() {
		let mut parent = root();
		for name in ["m", "c", "x", "a"] {
			parent
				.create_child(p(&format!("a/{name}")), Seed::Directory)
				.unwrap();
		}
		for name in ["z", "b"] {
			parent
				.create_child(p(&format!("a/{name}.txt")), Seed::File(b""))
				.unwrap();
		}
		let dirs: Vec<&str> = parent
			.children(NodeKind::Directory)
			.unwrap()
			.iter()
			.map(|n| n.path().as_str())
			.collect();
		assert_eq!(dirs, vec!["a/a", "a/c", "a/m", "a/x"]);
		assert_eq!(parent.num_file_children(), 2);
		assert_eq!(parent.get_file_child(0).unwrap().path().as_str(), "a/b.txt");
	}

	// -- has_child / accessors --

	#[test]
	fn has_child_reports_kind_and_index() {
		let mut parent = root();
		parent.create_child(p("a/d1"), Seed::Directory).unwrap();
		parent.create_child(p("a/d2"), Seed::Directory).unwrap();
		parent.create_child(p("a/f"), Seed::File(b"x")).unwrap();

		assert_eq!(
			parent.has_child(&p("a/d2")),
			Some(ChildSlot {
				kind: NodeKind::Directory,
				index: 1
			})
		);
		assert_eq!(
			parent.has_child(&p("a/f")),
			Some(ChildSlot {
				kind: NodeKind::File,
				index: 0
			})
		);
		assert_eq!(parent.has_child(&p("a/nope")), None);
	}

	#[test]
	fn positional_accessors_fail_out_of_bounds() {
		let parent = root();
		assert!(matches!(parent.get_dir_child(0), Err(FtError::NoSuchPath(_))));
		assert!(matches!(parent.get_file_child(3), Err(FtError::NoSuchPath(_))));
	}

	// -- free --

	#[test]
	fn free_directory_counts_subtree() {
		let mut top = root();
		let b = top.create_child(p("a/b"), Seed::Directory).unwrap();
		b.create_child(p("a/b/f1"), Seed::File(b"abc")).unwrap();
		b.create_child(p("a/b/f2"), Seed::File(b"de")).unwrap();
		top.create_child(p("a/c"), Seed::Directory).unwrap();

		let freed = top.free_directory();
		assert_eq!(
			freed,
			Freed {
				dirs: 3,
				files: 2,
				bytes: 5
			}
		);
		assert_eq!(freed.total(), 5);
	}

	#[test]
	fn release_child_detaches_from_parent() {
		let mut top = root();
		top.create_child(p("a/f"), Seed::File(b"zz")).unwrap();
		top.create_child(p("a/d"), Seed::Directory).unwrap();

		let slot = top.has_child(&p("a/f")).unwrap();
		let freed = top.release_child(slot).unwrap();
		assert_eq!(freed.files, 1);
		assert_eq!(freed.bytes, 2);
		assert_eq!(top.num_file_children(), 0);
		assert_eq!(top.num_dir_children(), 1);
	}

	// -- contents --

	#[test]
	fn replace_contents_returns_previous() {
		let mut node = Node::create(None, p("f"), Seed::File(b"old")).unwrap();
		let old = node.replace_contents(b"newer".to_vec()).unwrap();
		assert_eq!(old, b"old");
		assert_eq!(node.contents(), Some(&b"newer"[..]));
	}

	#[test]
	fn replace_contents_on_directory_fails() {
		let mut node = root();
		let err = node.replace_contents(Vec::new()).unwrap_err();
		assert!(matches!(err, FtError::NotAFile(_)));
	}

	#[test]
	fn display_is_canonical_path() {
		let mut top = root();
		let child = top.create_child(p("a/b"), Seed::Directory).unwrap();
		assert_eq!(child.to_string_repr(), "a/b");
		assert_eq!(format!("{}", top), "a");
		assert_eq!(top.compare(&root()), Ordering::Equal);
	}
}
