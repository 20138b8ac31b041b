//! A directed graph of applications.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chronicle_application::NotificationLog;

use crate::error::SystemError;
use crate::roles::{Following, Leading, Promptable};

/// A node in the processing graph.
///
/// Plain leaders sit at the head of pipes; processors can appear anywhere,
/// since they both follow and lead.
#[derive(Clone)]
pub enum SystemNode {
    Leader(Arc<dyn Leading>),
    Processor(Arc<dyn Following>),
}

impl SystemNode {
    pub fn name(&self) -> &str {
        match self {
            SystemNode::Leader(node) => node.name(),
            SystemNode::Processor(node) => node.name(),
        }
    }

    pub fn log(&self) -> Arc<dyn NotificationLog> {
        match self {
            SystemNode::Leader(node) => node.log(),
            SystemNode::Processor(node) => node.log(),
        }
    }

    pub fn lead(&self, follower: Arc<dyn Promptable>) {
        match self {
            SystemNode::Leader(node) => node.lead(follower),
            SystemNode::Processor(node) => node.lead(follower),
        }
    }

    pub fn as_processor(&self) -> Option<&Arc<dyn Following>> {
        match self {
            SystemNode::Leader(_) => None,
            SystemNode::Processor(node) => Some(node),
        }
    }
}

impl core::fmt::Debug for SystemNode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let role = match self {
            SystemNode::Leader(_) => "leader",
            SystemNode::Processor(_) => "processor",
        };
        f.debug_struct("SystemNode")
            .field("name", &self.name())
            .field("role", &role)
            .finish()
    }
}

/// A DAG of applications derived from pipes.
///
/// Each adjacent pair `(A, B)` in a pipe declares "B follows A". Duplicate
/// edges collapse.
#[derive(Debug)]
pub struct System {
    nodes: BTreeMap<String, SystemNode>,
    edges: Vec<(String, String)>,
}

impl System {
    pub fn builder() -> SystemBuilder {
        SystemBuilder {
            nodes: BTreeMap::new(),
            pipes: Vec::new(),
        }
    }

    pub fn node(&self, name: &str) -> Option<&SystemNode> {
        self.nodes.get(name)
    }

    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    /// Nodes with outgoing edges.
    pub fn leaders(&self) -> BTreeSet<&str> {
        self.edges.iter().map(|(from, _)| from.as_str()).collect()
    }

    /// Leaders that do not also follow.
    pub fn leaders_only(&self) -> BTreeSet<&str> {
        let followers = self.followers();
        self.leaders()
            .into_iter()
            .filter(|name| !followers.contains(name))
            .collect()
    }

    /// Nodes with incoming edges.
    pub fn followers(&self) -> BTreeSet<&str> {
        self.edges.iter().map(|(_, to)| to.as_str()).collect()
    }

    /// Nodes that both lead and follow.
    pub fn processors(&self) -> BTreeSet<&str> {
        let followers = self.followers();
        self.leaders()
            .into_iter()
            .filter(|name| followers.contains(name))
            .collect()
    }

    /// The downstream followers of a leader.
    pub fn leads(&self, leader_name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(from, _)| from == leader_name)
            .map(|(_, to)| to.as_str())
            .collect()
    }
}

/// Builds a [`System`] from registered nodes and pipes.
pub struct SystemBuilder {
    nodes: BTreeMap<String, SystemNode>,
    pipes: Vec<Vec<String>>,
}

impl SystemBuilder {
    /// Register a plain leader.
    pub fn leader(mut self, name: impl Into<String>, node: Arc<dyn Leading>) -> Self {
        self.nodes.insert(name.into(), SystemNode::Leader(node));
        self
    }

    /// Register a processor (leads and follows).
    pub fn processor(mut self, name: impl Into<String>, node: Arc<dyn Following>) -> Self {
        self.nodes.insert(name.into(), SystemNode::Processor(node));
        self
    }

    /// Declare a pipe: each adjacent pair becomes a follows-edge.
    pub fn pipe<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipes.push(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<System, SystemError> {
        let mut edges: Vec<(String, String)> = Vec::new();
        let mut seen: BTreeSet<(String, String)> = BTreeSet::new();

        for pipe in &self.pipes {
            for name in pipe {
                if !self.nodes.contains_key(name) {
                    return Err(SystemError::UnknownNode(name.clone()));
                }
            }
            for pair in pipe.windows(2) {
                let edge = (pair[0].clone(), pair[1].clone());
                if seen.insert(edge.clone()) {
                    edges.push(edge);
                }
            }
        }

        // Every edge target must be able to follow.
        for (_, follower) in &edges {
            let node = &self.nodes[follower];
            if node.as_processor().is_none() {
                return Err(SystemError::NotAFollower(follower.clone()));
            }
        }

        Ok(System {
            nodes: self.nodes,
            edges,
        })
    }
}
