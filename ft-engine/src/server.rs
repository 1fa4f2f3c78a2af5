// ---------------------------------------------------------------------------
// FtServer: JSON-RPC dispatcher
// ---------------------------------------------------------------------------
//
// Routes incoming JSON-RPC 2.0 requests (NDJSON, one per line) to FileTree
// operations: a `serve()` loop, a `dispatch()` match, and free-standing
// handler functions for each method.
// ---------------------------------------------------------------------------

use std::io::{self, BufRead};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;

use crate::checker;
use crate::config::FtLimits;
use crate::error::FtError;
use crate::protocol::*;
use crate::transport::NdjsonTransport;
use crate::tree::FileTree;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// JSON-RPC server owning a single [`FileTree`].
pub struct FtServer {
	transport: NdjsonTransport,
	tree: FileTree,
	/// Limits applied on `ft/init` before any per-request overrides.
	limits: FtLimits,
}

impl FtServer {
	pub fn new(transport: NdjsonTransport, limits: FtLimits) -> Self {
		Self {
			transport,
			tree: FileTree::with_limits(limits.clone()),
			limits,
		}
	}

	pub fn tree(&self) -> &FileTree {
		&self.tree
	}

	/// Main loop: read JSON-RPC messages from stdin until EOF.
	pub fn run(&mut self) -> Result<(), FtError> {
		let stdin = io::stdin();
		self.serve(stdin.lock())
	}

	pub fn serve<R: BufRead>(&mut self, reader: R) -> Result<(), FtError> {
		for line_result in reader.lines() {
			let line = line_result?;
			let trimmed = line.trim();
			if trimmed.is_empty() {
				continue;
			}

			match serde_json::from_str::<JsonRpcRequest>(trimmed) {
				Ok(req) => self.dispatch(req),
				Err(e) => {
					tracing::warn!("Parse error: {}", e);
					self.transport.write_error(
						0,
						INTERNAL_ERROR,
						"Parse error: invalid JSON",
						None,
					);
				}
			}
		}

		Ok(())
	}

	// ── Dispatch ──────────────────────────────────────────────────────────

	fn dispatch(&mut self, req: JsonRpcRequest) {
		let id = req.id;
		tracing::debug!(id, method = %req.method, "request");

		let tree = &mut self.tree;
		let result = match req.method.as_str() {
			// -- Lifecycle -----------------------------------------------
			"ft/init" => handle_init(tree, &self.limits, req.params),
			"ft/destroy" => tree.destroy().map(|()| json!({})),

			// -- Insertion -----------------------------------------------
			"ft/insertDir" => handle_insert_dir(tree, req.params),
			"ft/insertFile" => handle_insert_file(tree, req.params),

			// -- Queries -------------------------------------------------
			"ft/containsDir" => handle_contains_dir(tree, req.params),
			"ft/containsFile" => handle_contains_file(tree, req.params),
			"ft/stat" => handle_stat(tree, req.params),
			"ft/toString" => Ok(json!({ "listing": tree.listing() })),

			// -- Removal -------------------------------------------------
			"ft/rmDir" => handle_rm_dir(tree, req.params),
			"ft/rmFile" => handle_rm_file(tree, req.params),

			// -- Contents ------------------------------------------------
			"ft/getFileContents" => handle_get_contents(tree, req.params),
			"ft/replaceFileContents" => handle_replace_contents(tree, req.params),

			// -- Diagnostics ---------------------------------------------
			"ft/check" => Ok(handle_check(tree)),
			"ft/metrics" => Ok(handle_metrics(tree)),

			_ => {
				self.transport.write_error(
					id,
					METHOD_NOT_FOUND,
					format!("Unknown method: {}", req.method),
					None,
				);
				return;
			}
		};

		match result {
			Ok(value) => self.transport.write_response(id, value),
			Err(e @ FtError::InvalidParams(_)) => self.transport.write_error(
				id,
				INVALID_PARAMS,
				e.to_string(),
				Some(e.to_json_rpc_error()),
			),
			Err(e) => {
				tracing::debug!(id, error = %e, "request failed");
				self.transport.write_error(
					id,
					FT_ERROR,
					e.to_string(),
					Some(e.to_json_rpc_error()),
				)
			}
		}
	}
}

// ---------------------------------------------------------------------------
// Params and content encoding
// ---------------------------------------------------------------------------

fn parse_params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T, FtError> {
	serde_json::from_value(params).map_err(|e| FtError::InvalidParams(e.to_string()))
}

fn wants_binary(content_type: Option<&str>) -> Result<bool, FtError> {
	match content_type {
		None | Some("text") => Ok(false),
		Some("binary") => Ok(true),
		Some(other) => Err(FtError::InvalidParams(format!(
			"Unknown contentType: {}",
			other
		))),
	}
}

fn decode_content(content: String, binary: bool) -> Result<Vec<u8>, FtError> {
	if !binary {
		return Ok(content.into_bytes());
	}
	BASE64
		.decode(content.as_bytes())
		.map_err(|e| FtError::InvalidParams(format!("Invalid base64 content: {}", e)))
}

/// Text when asked for text and the bytes are UTF-8; base64 otherwise.
fn encode_content(bytes: &[u8], binary: bool) -> serde_json::Value {
	let size = bytes.len();
	if !binary {
		if let Ok(text) = std::str::from_utf8(bytes) {
			return json!({ "contentType": "text", "text": text, "size": size });
		}
	}
	json!({ "contentType": "binary", "base64": BASE64.encode(bytes), "size": size })
}

/// Apply per-session overrides. The configured limits are a ceiling: an
/// override can tighten a limit but never raise it.
fn merge_limits(base: &FtLimits, overrides: Option<LimitsParams>) -> FtLimits {
	let Some(o) = overrides else {
		return base.clone();
	};
	let tighten = |requested: Option<usize>, ceiling: usize| requested.map_or(ceiling, |v| v.min(ceiling));
	FtLimits {
		max_node_count: tighten(o.max_node_count, base.max_node_count),
		max_file_size: tighten(o.max_file_size, base.max_file_size),
		max_total_size: tighten(o.max_total_size, base.max_total_size),
		max_path_depth: tighten(o.max_path_depth, base.max_path_depth),
		max_name_length: tighten(o.max_name_length, base.max_name_length),
	}
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn handle_init(
	tree: &mut FileTree,
	base: &FtLimits,
	params: serde_json::Value,
) -> Result<serde_json::Value, FtError> {
	let p: InitParams = if params.is_null() {
		InitParams::default()
	} else {
		parse_params(params)?
	};
	tree.init_with(merge_limits(base, p.limits))?;
	Ok(json!({}))
}

fn handle_insert_dir(tree: &mut FileTree, params: serde_json::Value) -> Result<serde_json::Value, FtError> {
	let p: PathParams = parse_params(params)?;
	tree.insert_directory(&p.path)?;
	Ok(json!({}))
}

fn handle_insert_file(tree: &mut FileTree, params: serde_json::Value) -> Result<serde_json::Value, FtError> {
	let p: ContentParams = parse_params(params)?;
	let binary = wants_binary(p.content_type.as_deref())?;
	let bytes = decode_content(p.content, binary)?;
	tree.insert_file(&p.path, &bytes)?;
	Ok(json!({}))
}

fn handle_contains_dir(tree: &FileTree, params: serde_json::Value) -> Result<serde_json::Value, FtError> {
	let p: PathParams = parse_params(params)?;
	Ok(json!({ "contains": tree.contains_directory(&p.path) }))
}

fn handle_contains_file(tree: &FileTree, params: serde_json::Value) -> Result<serde_json::Value, FtError> {
	let p: PathParams = parse_params(params)?;
	Ok(json!({ "contains": tree.contains_file(&p.path) }))
}

fn handle_stat(tree: &FileTree, params: serde_json::Value) -> Result<serde_json::Value, FtError> {
	let p: PathParams = parse_params(params)?;
	let stat = tree.stat(&p.path)?;
	let mut result = json!({ "type": stat.kind.as_str() });
	if let Some(size) = stat.size {
		result["size"] = json!(size);
	}
	Ok(result)
}

fn handle_rm_dir(tree: &mut FileTree, params: serde_json::Value) -> Result<serde_json::Value, FtError> {
	let p: PathParams = parse_params(params)?;
	tree.remove_directory(&p.path)?;
	Ok(json!({}))
}

fn handle_rm_file(tree: &mut FileTree, params: serde_json::Value) -> Result<serde_json::Value, FtError> {
	let p: PathParams = parse_params(params)?;
	tree.remove_file(&p.path)?;
	Ok(json!({}))
}

fn handle_get_contents(tree: &FileTree, params: serde_json::Value) -> Result<serde_json::Value, FtError> {
	let p: ReadParams = parse_params(params)?;
	let binary = wants_binary(p.content_type.as_deref())?;
	let contents = tree
		.get_file_contents(&p.path)
		.map(|bytes| encode_content(bytes, binary));
	Ok(json!({ "contents": contents }))
}

fn handle_replace_contents(
	tree: &mut FileTree,
	params: serde_json::Value,
) -> Result<serde_json::Value, FtError> {
	let p: ContentParams = parse_params(params)?;
	let binary = wants_binary(p.content_type.as_deref())?;
	let bytes = decode_content(p.content, binary)?;
	let previous = tree
		.replace_file_contents(&p.path, &bytes)
		.map(|old| encode_content(&old, binary));
	Ok(json!({ "previous": previous }))
}

fn handle_check(tree: &FileTree) -> serde_json::Value {
	match checker::check(tree) {
		Ok(()) => json!({ "valid": true }),
		Err(violation) => json!({ "valid": false, "violation": violation.to_string() }),
	}
}

fn handle_metrics(tree: &FileTree) -> serde_json::Value {
	let m = tree.metrics();
	json!({
		"initialized": tree.is_initialized(),
		"nodeCount": m.node_count,
		"fileCount": m.file_count,
		"directoryCount": m.directory_count,
		"totalSize": m.total_size,
	})
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use std::io::{Cursor, Write};
	use std::sync::{Arc, Mutex};

	use super::*;

	#[derive(Clone, Default)]
	struct SharedBuf(Arc<Mutex<Vec<u8>>>);

	impl Write for SharedBuf {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			self.0.lock().unwrap().write(buf)
		}

		fn flush(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	/// Feed `requests` through a fresh server and collect one response per line.
	fn exchange(requests: &[serde_json::Value]) -> Vec<serde_json::Value> {
		exchange_raw(
			&requests
				.iter()
				.map(|r| r.to_string())
				.collect::<Vec<_>>()
				.join("\n"),
		)
	}

	fn exchange_raw(input: &str) -> Vec<serde_json::Value> {
		let buf = SharedBuf::default();
		let mut server = FtServer::new(NdjsonTransport::with_writer(buf.clone()), FtLimits::default());
		server.serve(Cursor::new(input.to_string())).unwrap();

		let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
		out.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
	}

	fn req(id: u64, method: &str, params: serde_json::Value) -> serde_json::Value {
		json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
	}

	#[test]
	fn insert_and_list() {
		let responses = exchange(&[
			req(1, "ft/init", json!({})),
			req(2, "ft/insertDir", json!({ "path": "a/b" })),
			req(3, "ft/insertFile", json!({ "path": "a/f", "content": "hi" })),
			req(4, "ft/toString", json!(null)),
		]);
		assert_eq!(responses.len(), 4);
		assert_eq!(responses[1]["result"], json!({}));
		assert_eq!(responses[3]["id"], 4);
		assert_eq!(responses[3]["result"]["listing"], "a\na/f\na/b\n");
	}

	#[test]
	fn tree_errors_carry_ft_code() {
		let responses = exchange(&[
			req(1, "ft/insertDir", json!({ "path": "a" })),
			req(2, "ft/init", json!(null)),
			req(3, "ft/init", json!(null)),
			req(4, "ft/insertDir", json!({ "path": "a/" })),
		]);
		assert_eq!(responses[0]["error"]["code"], FT_ERROR);
		assert_eq!(responses[0]["error"]["data"]["ftCode"], "FT_INITIALIZATION_ERROR");
		assert!(responses[1].get("error").is_none());
		assert_eq!(responses[2]["error"]["data"]["ftCode"], "FT_INITIALIZATION_ERROR");
		assert_eq!(responses[3]["error"]["data"]["ftCode"], "FT_BAD_PATH");
	}

	#[test]
	fn unknown_method_and_bad_params() {
		let responses = exchange(&[
			req(1, "ft/init", json!({})),
			req(2, "ft/explode", json!({})),
			req(3, "ft/insertDir", json!({ "dir": "a" })),
			req(4, "ft/insertFile", json!({ "path": "a/f", "content": "x", "contentType": "xml" })),
		]);
		assert_eq!(responses[1]["error"]["code"], METHOD_NOT_FOUND);
		assert_eq!(responses[2]["error"]["code"], INVALID_PARAMS);
		assert_eq!(responses[3]["error"]["code"], INVALID_PARAMS);
	}

	#[test]
	fn unparseable_line_answers_with_id_zero() {
		let responses = exchange_raw("this is not json\n\n{\"id\":7,\"method\":\"ft/metrics\"}\n");
		assert_eq!(responses.len(), 2);
		assert_eq!(responses[0]["id"], 0);
		assert_eq!(responses[0]["error"]["code"], INTERNAL_ERROR);
		assert_eq!(responses[1]["result"]["initialized"], false);
	}

	#[test]
	fn binary_contents_round_trip() {
		let raw = [0u8, 159, 146, 150, 255];
		let encoded = BASE64.encode(raw);
		let responses = exchange(&[
			req(1, "ft/init", json!({})),
			req(2, "ft/insertDir", json!({ "path": "a" })),
			req(3, "ft/insertFile", json!({ "path": "a/bin", "content": &encoded, "contentType": "binary" })),
			req(4, "ft/getFileContents", json!({ "path": "a/bin" })),
			req(5, "ft/stat", json!({ "path": "a/bin" })),
			req(6, "ft/replaceFileContents", json!({ "path": "a/bin", "content": "text now" })),
			req(7, "ft/getFileContents", json!({ "path": "a/bin" })),
		]);

		let contents = &responses[3]["result"]["contents"];
		assert_eq!(contents["contentType"], "binary");
		assert_eq!(contents["base64"], encoded);
		assert_eq!(contents["size"], 5);

		assert_eq!(responses[4]["result"], json!({ "type": "file", "size": 5 }));
		assert_eq!(responses[5]["result"]["previous"]["base64"], encoded);
		assert_eq!(responses[6]["result"]["contents"]["text"], "text now");
	}

	#[test]
	fn missing_contents_are_null() {
		let responses = exchange(&[
			req(1, "ft/init", json!({})),
			req(2, "ft/insertDir", json!({ "path": "a" })),
			req(3, "ft/getFileContents", json!({ "path": "a" })),
			req(4, "ft/replaceFileContents", json!({ "path": "a/nope", "content": "x" })),
			req(5, "ft/stat", json!({ "path": "a" })),
		]);
		assert_eq!(responses[2]["result"]["contents"], serde_json::Value::Null);
		assert_eq!(responses[3]["result"]["previous"], serde_json::Value::Null);
		assert_eq!(responses[4]["result"], json!({ "type": "directory" }));
	}

	#[test]
	fn init_limits_override_defaults() {
		let responses = exchange(&[
			req(1, "ft/init", json!({ "limits": { "maxNodeCount": 2 } })),
			req(2, "ft/insertDir", json!({ "path": "a/b" })),
			req(3, "ft/insertDir", json!({ "path": "a/c" })),
			req(4, "ft/metrics", json!(null)),
			req(5, "ft/check", json!(null)),
		]);
		assert!(responses[1].get("error").is_none());
		assert_eq!(responses[2]["error"]["data"]["ftCode"], "FT_MEMORY_ERROR");
		assert_eq!(responses[3]["result"]["nodeCount"], 2);
		assert_eq!(responses[4]["result"], json!({ "valid": true }));
	}

	#[test]
	fn init_overrides_cannot_raise_configured_limits() {
		let base = FtLimits {
			max_path_depth: 3,
			..FtLimits::default()
		};
		let mut server = FtServer::new(NdjsonTransport::with_writer(SharedBuf::default()), base);
		let input = req(1, "ft/init", json!({ "limits": { "maxPathDepth": 100000, "maxNodeCount": 5 } }));
		server.serve(Cursor::new(input.to_string())).unwrap();

		let limits = server.tree().limits();
		assert_eq!(limits.max_path_depth, 3);
		assert_eq!(limits.max_node_count, 5);
		assert!(server.tree().is_initialized());
	}

	#[test]
	fn contains_and_remove() {
		let responses = exchange(&[
			req(1, "ft/init", json!({})),
			req(2, "ft/insertFile", json!({ "path": "a/b/f", "content": "" })),
			req(3, "ft/insertDir", json!({ "path": "a" })),
			req(4, "ft/insertFile", json!({ "path": "a/b/f", "content": "" })),
			req(5, "ft/containsFile", json!({ "path": "a/b/f" })),
			req(6, "ft/rmDir", json!({ "path": "a/b" })),
			req(7, "ft/containsFile", json!({ "path": "a/b/f" })),
			req(8, "ft/rmFile", json!({ "path": "a/b/f" })),
			req(9, "ft/destroy", json!(null)),
			req(10, "ft/toString", json!(null)),
		]);
		assert_eq!(responses[1]["error"]["data"]["ftCode"], "FT_CONFLICTING_PATH");
		assert_eq!(responses[4]["result"]["contains"], true);
		assert!(responses[5].get("error").is_none());
		assert_eq!(responses[6]["result"]["contains"], false);
		assert_eq!(responses[7]["error"]["data"]["ftCode"], "FT_NO_SUCH_PATH");
		assert_eq!(responses[9]["result"]["listing"], serde_json::Value::Null);
	}
}
