//! Prefix tree over a thread's path ids
//!
//! Path ids are strings of branch outcomes (`-1` root followed by `0`/`1`
//! bits). The explorer asks for completions of a flipped prefix; completions
//! are ranked by breadth-first discovery, so shorter paths come first.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct Node {
    ch: char,
    /// Insertion order is kept; it decides ties between equally long paths
    children: Vec<usize>,
    terminal: bool,
}

/// Path store of one thread
#[derive(Debug, Clone)]
pub struct PathTrie {
    nodes: Vec<Node>,
    paths: usize,
}

impl Default for PathTrie {
    fn default() -> Self {
        Self::new()
    }
}

const ROOT: usize = 0;

impl PathTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                ch: '\0',
                children: Vec::new(),
                terminal: false,
            }],
            paths: 0,
        }
    }

    /// Number of distinct paths stored
    pub fn len(&self) -> usize {
        self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths == 0
    }

    fn child(&self, node: usize, ch: char) -> Option<usize> {
        self.nodes[node]
            .children
            .iter()
            .copied()
            .find(|&child| self.nodes[child].ch == ch)
    }

    /// Node reached by following `path` exactly
    fn walk(&self, path: &str) -> Option<usize> {
        path.chars()
            .try_fold(ROOT, |node, ch| self.child(node, ch))
    }

    pub fn insert(&mut self, path: &str) {
        let mut node = ROOT;
        for ch in path.chars() {
            node = match self.child(node, ch) {
                Some(child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node {
                        ch,
                        children: Vec::new(),
                        terminal: false,
                    });
                    self.nodes[node].children.push(child);
                    child
                }
            };
        }
        if !self.nodes[node].terminal {
            self.nodes[node].terminal = true;
            self.paths += 1;
        }
    }

    /// `path` was inserted
    pub fn contains_path(&self, path: &str) -> bool {
        self.walk(path).is_some_and(|node| self.nodes[node].terminal)
    }

    /// Some inserted path starts with `prefix`
    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.walk(prefix).is_some()
    }

    /// The `n`-th completion (0-based) of `prefix` in breadth-first order
    ///
    /// The prefix is followed as far as it matches. When fewer than `n + 1`
    /// completions exist, the last node of the breadth-first walk decides the
    /// result, so the answer is still deterministic.
    pub fn path_by_prefix(&self, prefix: &str, n: usize) -> String {
        let mut start = ROOT;
        let mut matched = String::new();
        for ch in prefix.chars() {
            match self.child(start, ch) {
                Some(child) => {
                    matched.push(ch);
                    start = child;
                }
                None => break,
            }
        }

        let mut parent = vec![None; self.nodes.len()];
        let mut queue = VecDeque::from([start]);
        let mut current = start;
        let mut seen = 0;
        while let Some(node) = queue.pop_front() {
            current = node;
            if self.nodes[node].terminal {
                if seen == n {
                    break;
                }
                seen += 1;
            }
            for &child in &self.nodes[node].children {
                parent[child] = Some(node);
                queue.push_back(child);
            }
        }

        let mut tail = Vec::new();
        while current != start {
            tail.push(self.nodes[current].ch);
            match parent[current] {
                Some(up) => current = up,
                None => break,
            }
        }
        matched.extend(tail.into_iter().rev());
        matched
    }
}
