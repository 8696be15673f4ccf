//! Call-Tree Builder (spec §4.C): upstream/downstream call relations
//! derived from textual scanning of function bodies, to a configured depth.
//!
//! Adapted from the teacher's `task::tree::TaskTree` parent/child graph
//! shape — here the graph is over functions rather than tasks, and edges
//! come from name scanning rather than explicit task specs.

use crate::model::function::Function;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CallTreeNode {
    pub function_id: String,
    pub children: Vec<CallTreeNode>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FunctionCallInfo {
    pub upstream: Vec<CallTreeNode>,
    pub downstream: Vec<CallTreeNode>,
    pub state_variables: Vec<String>,
}

/// Recorded when a short call-site name matched more than one qualified
/// function (spec §4.C, §7: "not an error; recorded in metadata").
#[derive(Debug, Clone)]
pub struct AmbiguityRecord {
    pub caller_id: String,
    pub called_name: String,
    pub candidates: Vec<String>,
    pub chosen: String,
}

pub struct CallTreeBuilder {
    depth: u32,
    name_regex: Regex,
}

impl CallTreeBuilder {
    pub fn new(depth: u32) -> Self {
        Self {
            depth,
            // identifier(  — a plausible call site; deliberately loose since
            // the parser already validated syntax upstream.
            name_regex: Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap(),
        }
    }

    /// Build the downstream edge map: `function_id -> callee function ids`,
    /// resolving each textual call site to the qualified function id it
    /// most plausibly refers to (spec §4.C tie-break rule).
    pub fn build_edges(&self, functions: &[Function]) -> (HashMap<String, Vec<String>>, Vec<AmbiguityRecord>) {
        let by_short_name: HashMap<&str, Vec<&Function>> = {
            let mut map: HashMap<&str, Vec<&Function>> = HashMap::new();
            for f in functions {
                map.entry(f.name.as_str()).or_default().push(f);
            }
            map
        };

        let mut edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut ambiguities = Vec::new();

        for caller in functions {
            let mut callees = Vec::new();
            let mut seen = HashSet::new();
            for capture in self.name_regex.captures_iter(&caller.content) {
                let name = &capture[1];
                if name == caller.name {
                    continue;
                }
                let Some(candidates) = by_short_name.get(name) else { continue };
                let chosen = Self::resolve_tie_break(caller, candidates);
                if let Some(chosen_fn) = chosen {
                    if candidates.len() > 1 {
                        ambiguities.push(AmbiguityRecord {
                            caller_id: caller.id.clone(),
                            called_name: name.to_string(),
                            candidates: candidates.iter().map(|c| c.id.clone()).collect(),
                            chosen: chosen_fn.id.clone(),
                        });
                    }
                    if seen.insert(chosen_fn.id.clone()) {
                        callees.push(chosen_fn.id.clone());
                    }
                }
            }
            if !callees.is_empty() {
                edges.insert(caller.id.clone(), callees);
            }
        }

        (edges, ambiguities)
    }

    /// Tie-break order: same-contract, then same-file, then alphabetic by
    /// full id (spec §4.C).
    fn resolve_tie_break<'a>(caller: &Function, candidates: &[&'a Function]) -> Option<&'a Function> {
        if candidates.is_empty() {
            return None;
        }
        if let Some(same_contract) = candidates
            .iter()
            .filter(|c| !caller.contract_name.is_empty() && c.contract_name == caller.contract_name)
            .min_by(|a, b| a.id.cmp(&b.id))
        {
            return Some(same_contract);
        }
        if let Some(same_file) = candidates
            .iter()
            .filter(|c| c.relative_file_path == caller.relative_file_path)
            .min_by(|a, b| a.id.cmp(&b.id))
        {
            return Some(same_file);
        }
        candidates.iter().min_by(|a, b| a.id.cmp(&b.id)).copied()
    }

    /// Compute the full upstream/downstream map for every function, up to
    /// `self.depth` (spec §4.C default 3).
    pub fn build(&self, functions: &[Function]) -> (HashMap<String, FunctionCallInfo>, Vec<AmbiguityRecord>) {
        let (downstream_edges, ambiguities) = self.build_edges(functions);
        let mut upstream_edges: HashMap<String, Vec<String>> = HashMap::new();
        for (caller, callees) in &downstream_edges {
            for callee in callees {
                upstream_edges.entry(callee.clone()).or_default().push(caller.clone());
            }
        }

        let mut result = HashMap::new();
        for function in functions {
            let downstream = self.expand(&function.id, &downstream_edges, self.depth);
            let upstream = self.expand(&function.id, &upstream_edges, self.depth);
            let state_variables = extract_state_variable_refs(&function.content, &function.contract_code);
            result.insert(
                function.id.clone(),
                FunctionCallInfo { upstream, downstream, state_variables },
            );
        }

        debug!(functions = functions.len(), ambiguities = ambiguities.len(), "call tree built");
        (result, ambiguities)
    }

    fn expand(&self, root: &str, edges: &HashMap<String, Vec<String>>, depth: u32) -> Vec<CallTreeNode> {
        if depth == 0 {
            return Vec::new();
        }
        let Some(children) = edges.get(root) else { return Vec::new() };
        children
            .iter()
            .map(|child_id| CallTreeNode {
                function_id: child_id.clone(),
                children: self.expand(child_id, edges, depth - 1),
            })
            .collect()
    }
}

/// Very loose heuristic: any identifier in the contract body that also
/// appears bare (not followed by `(`) in the function content is treated as
/// a referenced state variable, for the call-tree context digest.
fn extract_state_variable_refs(function_body: &str, contract_code: &str) -> Vec<String> {
    let declared = Regex::new(r"(?m)^\s*(?:uint256|uint|int|bool|address|mapping\([^)]*\)|string|bytes32)\s+(?:public\s+|private\s+|internal\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*[;=]")
        .unwrap();
    declared
        .captures_iter(contract_code)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| function_body.contains(name.as_str()))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect()
}
