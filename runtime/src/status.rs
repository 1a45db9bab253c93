//! Activation graph: lifecycle flags and cascading propagation.
//!
//! Every deformer owns one node in a flat arena, addressed by
//! [`StatusHandle`]; parent/child relationships are handle lists, never
//! object references, so linked components form no pointer cycles.
//! Propagation is an explicit breadth-first walk that visits each node at
//! most once per update and never re-notifies its notifier, so a state
//! flip costs exactly one visit per link per direction.

use std::collections::{HashSet, VecDeque};

/// Index of a node in the activation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusHandle(u32);

/// Coarse lifecycle state derived from the node flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Active,
    Inactive,
    Error,
    Disposed,
}

/// One activation transition produced by an update walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub handle: StatusHandle,
    pub active: bool,
}

#[derive(Debug)]
struct Node {
    init_start: bool,
    init: bool,
    init_error: bool,
    enabled: bool,
    user_enabled: bool,
    runtime_error: bool,
    disposed: bool,
    active: bool,
    parents: Vec<StatusHandle>,
    children: Vec<StatusHandle>,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            init_start: false,
            init: false,
            init_error: false,
            enabled: false,
            user_enabled: true,
            runtime_error: false,
            disposed: false,
            active: false,
            parents: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// Arena of lifecycle nodes with linked activation.
#[derive(Debug, Default)]
pub struct ActivationGraph {
    nodes: Vec<Node>,
}

impl ActivationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self) -> StatusHandle {
        self.nodes.push(Node::default());
        StatusHandle((self.nodes.len() - 1) as u32)
    }

    /// Link `child` under `parent`. A child with at least one active
    /// parent (or none at all) may itself be active.
    pub fn link(&mut self, parent: StatusHandle, child: StatusHandle) {
        let p = &mut self.nodes[parent.0 as usize];
        if !p.children.contains(&child) {
            p.children.push(child);
        }
        let c = &mut self.nodes[child.0 as usize];
        if !c.parents.contains(&parent) {
            c.parents.push(parent);
        }
    }

    pub fn unlink(&mut self, parent: StatusHandle, child: StatusHandle) {
        self.nodes[parent.0 as usize].children.retain(|&h| h != child);
        self.nodes[child.0 as usize].parents.retain(|&h| h != parent);
    }

    // ---- flag setters -----------------------------------------------------

    pub fn mark_init_start(&mut self, h: StatusHandle) {
        self.nodes[h.0 as usize].init_start = true;
    }

    pub fn mark_init_complete(&mut self, h: StatusHandle) {
        self.nodes[h.0 as usize].init = true;
    }

    pub fn mark_init_error(&mut self, h: StatusHandle) {
        self.nodes[h.0 as usize].init = true;
        self.nodes[h.0 as usize].init_error = true;
    }

    pub fn mark_disposed(&mut self, h: StatusHandle) {
        self.nodes[h.0 as usize].disposed = true;
        self.nodes[h.0 as usize].active = false;
    }

    /// Returns true when the flag changed.
    pub fn set_enabled(&mut self, h: StatusHandle, enabled: bool) -> bool {
        let node = &mut self.nodes[h.0 as usize];
        let changed = node.enabled != enabled;
        node.enabled = enabled;
        changed
    }

    /// User-level switch, independent of the host's enable state.
    pub fn set_user_enabled(&mut self, h: StatusHandle, enabled: bool) -> bool {
        let node = &mut self.nodes[h.0 as usize];
        let changed = node.user_enabled != enabled;
        node.user_enabled = enabled;
        changed
    }

    pub fn set_runtime_error(&mut self, h: StatusHandle, error: bool) -> bool {
        let node = &mut self.nodes[h.0 as usize];
        let changed = node.runtime_error != error;
        node.runtime_error = error;
        changed
    }

    // ---- queries ----------------------------------------------------------

    pub fn is_init_started(&self, h: StatusHandle) -> bool {
        self.nodes[h.0 as usize].init_start
    }

    pub fn is_init_complete(&self, h: StatusHandle) -> bool {
        self.nodes[h.0 as usize].init
    }

    pub fn is_init_success(&self, h: StatusHandle) -> bool {
        let n = &self.nodes[h.0 as usize];
        n.init && !n.init_error
    }

    pub fn is_init_error(&self, h: StatusHandle) -> bool {
        let n = &self.nodes[h.0 as usize];
        n.init && n.init_error
    }

    pub fn is_disposed(&self, h: StatusHandle) -> bool {
        self.nodes[h.0 as usize].disposed
    }

    pub fn is_active(&self, h: StatusHandle) -> bool {
        let n = &self.nodes[h.0 as usize];
        n.active && !n.disposed
    }

    pub fn state(&self, h: StatusHandle) -> LifecycleState {
        let n = &self.nodes[h.0 as usize];
        if n.disposed {
            LifecycleState::Disposed
        } else if n.init && n.init_error {
            LifecycleState::Error
        } else if !n.init_start {
            LifecycleState::Uninitialized
        } else if !n.init {
            LifecycleState::Initializing
        } else if n.active {
            LifecycleState::Active
        } else {
            LifecycleState::Inactive
        }
    }

    // ---- propagation ------------------------------------------------------

    fn compute_active(&self, h: StatusHandle) -> bool {
        let n = &self.nodes[h.0 as usize];
        if n.disposed {
            return false;
        }
        let own = n.init && !n.init_error && n.enabled && n.user_enabled && !n.runtime_error;
        own && self.any_parent_active(h)
    }

    fn any_parent_active(&self, h: StatusHandle) -> bool {
        let parents = &self.nodes[h.0 as usize].parents;
        if parents.is_empty() {
            return true;
        }
        parents.iter().any(|&p| self.is_active(p))
    }

    /// Recompute the activation of `h` and cascade over its links.
    ///
    /// Children notify parents and parents notify children; each side
    /// skips re-notifying its notifier and no node is visited twice, so
    /// there is no propagation storm. Returns every node whose activation
    /// flipped, in visit order, for the caller to apply side effects.
    pub fn update(&mut self, h: StatusHandle) -> Vec<Transition> {
        let mut transitions = Vec::new();
        let mut visited: HashSet<StatusHandle> = HashSet::new();
        let mut queue: VecDeque<(StatusHandle, Option<StatusHandle>)> = VecDeque::new();
        queue.push_back((h, None));

        while let Some((current, notifier)) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let active = self.compute_active(current);
            let node = &mut self.nodes[current.0 as usize];
            if node.active == active {
                continue;
            }
            node.active = active;
            transitions.push(Transition {
                handle: current,
                active,
            });

            let node = &self.nodes[current.0 as usize];
            for &next in node.children.iter().chain(node.parents.iter()) {
                if Some(next) != notifier {
                    queue.push_back((next, Some(current)));
                }
            }
        }
        transitions
    }
}
