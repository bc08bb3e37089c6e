//! Dependency-ordered deletion planner
//!
//! Expands resources into [`Target`]s, wires the edges the provider enforces
//! at delete time, and layers the graph into stages. A target lands in the
//! earliest stage all of its prerequisites allow; within a stage targets
//! keep discovery order.
//!
//! Edges (prerequisite first):
//!
//! | Before                          | After                                  |
//! |---------------------------------|----------------------------------------|
//! | ECS service                     | its cluster                            |
//! | VPC child (IGW, subnet, RT, SG) | the VPC                                |
//! | instance profile                | its role                               |
//! | instances running in a VPC      | that VPC's subnets and security groups |
//! | NAT gateway in a VPC            | that VPC's subnets and internet gateway|
//! | NAT gateway                     | its Elastic IPs (associated EIPs with no known gateway wait for every NAT) |

use crate::resource::{Resource, Target};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, info};

pub type NodeId = usize;

#[derive(Debug, Error)]
pub enum PlanError {
    /// Edges form a cycle; nothing may be deleted
    #[error("dependency cycle among: {}", .members.join(", "))]
    Cycle { members: Vec<String> },
}

/// One deletion target in the plan
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub target: Target,
    /// Index of the resource this target came from
    pub resource: usize,
    /// Nodes that must be deleted before this one
    pub depends_on: Vec<NodeId>,
}

/// Stages of node ids; stages run strictly in sequence.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub nodes: Vec<PlanNode>,
    pub stages: Vec<Vec<NodeId>>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &PlanNode {
        &self.nodes[id]
    }

    /// Stage index holding `target`
    pub fn stage_of(&self, target: &Target) -> Option<usize> {
        let id = self.nodes.iter().position(|n| &n.target == target)?;
        self.stages.iter().position(|stage| stage.contains(&id))
    }

    /// Targets of one stage in execution order
    pub fn stage_targets(&self, stage: usize) -> Vec<&Target> {
        self.stages
            .get(stage)
            .map(|ids| ids.iter().map(|&id| &self.nodes[id].target).collect())
            .unwrap_or_default()
    }
}

/// Per-VPC node ids other resources attach edges to
#[derive(Default)]
struct VpcNodes {
    internet_gateway: Option<NodeId>,
    subnets: Vec<NodeId>,
    security_groups: Vec<NodeId>,
}

struct Builder {
    nodes: Vec<PlanNode>,
    index: HashMap<Target, NodeId>,
}

impl Builder {
    /// Add a target, returning the existing node if it was already planned
    fn add(&mut self, target: Target, resource: usize) -> NodeId {
        if let Some(&id) = self.index.get(&target) {
            debug!(resource = %target, "Target already planned");
            return id;
        }
        let id = self.nodes.len();
        self.index.insert(target.clone(), id);
        self.nodes.push(PlanNode {
            target,
            resource,
            depends_on: Vec::new(),
        });
        id
    }

    /// `before` must be deleted before `after`
    fn edge(&mut self, before: NodeId, after: NodeId) {
        if before != after {
            self.nodes[after].depends_on.push(before);
        }
    }
}

/// Build the staged deletion plan for `resources`, taken in discovery order.
pub fn plan(resources: &[Resource]) -> Result<Plan, PlanError> {
    let mut builder = Builder {
        nodes: Vec::new(),
        index: HashMap::new(),
    };
    // (resource index, root node)
    let mut roots: Vec<(usize, NodeId)> = Vec::with_capacity(resources.len());
    let mut vpcs: HashMap<&str, VpcNodes> = HashMap::new();

    for (idx, resource) in resources.iter().enumerate() {
        let ids: Vec<NodeId> = resource
            .targets()
            .into_iter()
            .map(|t| builder.add(t, idx))
            .collect();
        let Some((&root, children)) = ids.split_last() else {
            continue;
        };
        for &child in children {
            builder.edge(child, root);
        }
        roots.push((idx, root));

        if let Resource::Vpc(vpc) = resource {
            let mut nodes = VpcNodes::default();
            for &id in children {
                match &builder.nodes[id].target {
                    Target::InternetGateway { .. } => nodes.internet_gateway = Some(id),
                    Target::Subnet(_) => nodes.subnets.push(id),
                    Target::SecurityGroup(_) => nodes.security_groups.push(id),
                    _ => {}
                }
            }
            vpcs.insert(vpc.id.as_str(), nodes);
        }
    }

    let mut nat_nodes = Vec::new();
    let mut nat_by_allocation: HashMap<&str, NodeId> = HashMap::new();
    for &(idx, root) in &roots {
        match &resources[idx] {
            Resource::Instances(group) => {
                for vpc_id in &group.vpc_ids {
                    if let Some(vpc) = vpcs.get(vpc_id.as_str()) {
                        for &id in vpc.subnets.iter().chain(&vpc.security_groups) {
                            builder.edge(root, id);
                        }
                    }
                }
            }
            Resource::NatGateway(nat) => {
                nat_nodes.push(root);
                for allocation in &nat.allocation_ids {
                    nat_by_allocation.insert(allocation.as_str(), root);
                }
                if let Some(vpc) = nat.vpc_id.as_deref().and_then(|id| vpcs.get(id)) {
                    for &id in vpc.subnets.iter().chain(&vpc.internet_gateway) {
                        builder.edge(root, id);
                    }
                }
            }
            _ => {}
        }
    }

    for &(idx, root) in &roots {
        let Resource::ElasticIp(eip) = &resources[idx] else {
            continue;
        };
        match nat_by_allocation.get(eip.allocation_id.as_str()) {
            Some(&nat) => builder.edge(nat, root),
            None if eip.association_id.is_some() => {
                for &nat in &nat_nodes {
                    builder.edge(nat, root);
                }
            }
            None => {}
        }
    }

    let mut nodes = builder.nodes;
    for node in &mut nodes {
        let unique: BTreeSet<NodeId> = node.depends_on.drain(..).collect();
        node.depends_on = unique.into_iter().collect();
    }

    let deps: Vec<Vec<NodeId>> = nodes.iter().map(|n| n.depends_on.clone()).collect();
    let stages = build_stages(&deps).map_err(|cycle| PlanError::Cycle {
        members: cycle.iter().map(|&id| nodes[id].target.to_string()).collect(),
    })?;

    info!(
        targets = nodes.len(),
        stages = stages.len(),
        "Deletion plan built"
    );
    Ok(Plan { nodes, stages })
}

/// Layer nodes so each sits one stage after its latest prerequisite.
///
/// `deps[n]` lists the prerequisites of node `n`. Returns the unplaceable
/// nodes when the graph has a cycle.
pub(crate) fn build_stages(deps: &[Vec<NodeId>]) -> Result<Vec<Vec<NodeId>>, Vec<NodeId>> {
    let mut remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<NodeId>> = vec![Vec::new(); deps.len()];
    for (node, prereqs) in deps.iter().enumerate() {
        for &p in prereqs {
            dependents[p].push(node);
        }
    }

    let mut stages = Vec::new();
    let mut ready: Vec<NodeId> = (0..deps.len()).filter(|&n| remaining[n] == 0).collect();
    let mut placed = 0;

    while !ready.is_empty() {
        ready.sort_unstable();
        let mut next = Vec::new();
        for &node in &ready {
            for &dependent in &dependents[node] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }
        placed += ready.len();
        stages.push(std::mem::replace(&mut ready, next));
    }

    if placed < deps.len() {
        return Err((0..deps.len()).filter(|&n| remaining[n] > 0).collect());
    }
    Ok(stages)
}
