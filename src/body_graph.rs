//! Ragdoll topology registry.
//!
//! [`BodyGraph::build`] walks the joint graph breadth-first from the root and
//! records every reachable rigid body plus the joints between them. Each
//! directly-jointed pair is marked for collision exclusion so adjacent limbs
//! never fight their own joint. Pairs that are not directly jointed are left
//! alone.

use std::collections::VecDeque;

use bevy::prelude::*;

/// One joint of the physics scene, as reported by the backend.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointLink {
    /// Entity holding the joint component.
    pub joint: Entity,
    /// First body of the joint.
    pub parent: Entity,
    /// Second body of the joint.
    pub child: Entity,
}

impl JointLink {
    /// Describe a joint.
    pub fn new(joint: Entity, parent: Entity, child: Entity) -> Self {
        Self {
            joint,
            parent,
            child,
        }
    }

    /// The pair in canonical order.
    pub fn pair(&self) -> (Entity, Entity) {
        ordered_pair(self.parent, self.child)
    }

    /// The body across the joint from `body`, if `body` is an endpoint.
    pub fn other(&self, body: Entity) -> Option<Entity> {
        if body == self.parent {
            Some(self.child)
        } else if body == self.child {
            Some(self.parent)
        } else {
            None
        }
    }
}

fn ordered_pair(a: Entity, b: Entity) -> (Entity, Entity) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Registry of every body of one ragdoll, rooted at the character root.
///
/// Inserted on the root by the topology system. Read-only afterwards; remove
/// it to request a rebuild.
#[derive(Component, Reflect, Debug, Clone, PartialEq)]
#[reflect(Component)]
pub struct BodyGraph {
    root: Entity,
    bodies: Vec<Entity>,
    links: Vec<JointLink>,
    excluded_pairs: Vec<(Entity, Entity)>,
    sensors: Vec<Entity>,
}

impl BodyGraph {
    /// Registry holding only the root.
    pub fn single(root: Entity) -> Self {
        Self {
            root,
            bodies: vec![root],
            links: Vec::new(),
            excluded_pairs: Vec::new(),
            sensors: Vec::new(),
        }
    }

    /// Traverse `links` from `root`.
    ///
    /// Bodies are ordered by discovery: root first, then by joint distance.
    /// Self-links are skipped, as are links that never touch the component
    /// reachable from the root. Deterministic for a given link order, so
    /// rebuilding yields the same registry and exclusion set.
    pub fn build(root: Entity, links: &[JointLink]) -> Self {
        let mut graph = Self::single(root);
        let mut queue = VecDeque::from([root]);

        while let Some(body) = queue.pop_front() {
            for link in links {
                if link.parent == link.child {
                    continue;
                }
                let Some(other) = link.other(body) else {
                    continue;
                };
                if !graph.links.contains(link) {
                    graph.links.push(*link);
                    let pair = link.pair();
                    if !graph.excluded_pairs.contains(&pair) {
                        graph.excluded_pairs.push(pair);
                    }
                }
                if !graph.bodies.contains(&other) {
                    graph.bodies.push(other);
                    queue.push_back(other);
                }
            }
        }

        graph
    }

    /// Record the ground sensors whose body belongs to this ragdoll.
    ///
    /// `sensors` pairs each sensor entity with the body it reports for.
    pub fn with_sensors(mut self, sensors: impl IntoIterator<Item = (Entity, Entity)>) -> Self {
        self.sensors = sensors
            .into_iter()
            .filter(|(_, body)| self.bodies.contains(body))
            .map(|(sensor, _)| sensor)
            .collect();
        self
    }

    /// The root body.
    pub fn root(&self) -> Entity {
        self.root
    }

    /// Every registered body, root first.
    pub fn bodies(&self) -> &[Entity] {
        &self.bodies
    }

    /// Number of registered bodies. Never zero.
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Always false: the root is always registered.
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Whether `body` belongs to this ragdoll.
    pub fn contains(&self, body: Entity) -> bool {
        self.bodies.contains(&body)
    }

    /// Joints inside the ragdoll.
    pub fn links(&self) -> &[JointLink] {
        &self.links
    }

    /// Directly-jointed pairs with collision disabled.
    pub fn excluded_pairs(&self) -> &[(Entity, Entity)] {
        &self.excluded_pairs
    }

    /// Whether collision between `a` and `b` was disabled by this graph.
    pub fn is_collision_excluded(&self, a: Entity, b: Entity) -> bool {
        self.excluded_pairs.contains(&ordered_pair(a, b))
    }

    /// Ground sensor entities of this ragdoll.
    pub fn sensors(&self) -> &[Entity] {
        &self.sensors
    }
}

/// Back-reference from a registered body to its ragdoll root.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq, Eq)]
#[reflect(Component)]
pub struct RagdollPart {
    /// Root body of the owning ragdoll.
    pub root: Entity,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(index: u32) -> Entity {
        Entity::from_raw(index)
    }

    #[test]
    fn isolated_root_registers_one_body() {
        let graph = BodyGraph::build(e(1), &[]);
        assert_eq!(graph.bodies(), &[e(1)]);
        assert!(graph.excluded_pairs().is_empty());
        assert!(!graph.is_empty());
    }

    #[test]
    fn two_segment_rig_excludes_its_pair() {
        let links = [JointLink::new(e(2), e(1), e(2))];
        let graph = BodyGraph::build(e(1), &links);

        assert_eq!(graph.len(), 2);
        assert!(graph.is_collision_excluded(e(1), e(2)));
        assert!(graph.is_collision_excluded(e(2), e(1)));
    }

    #[test]
    fn unrelated_bodies_are_untouched() {
        let links = [
            JointLink::new(e(2), e(1), e(2)),
            // Another character's joint.
            JointLink::new(e(11), e(10), e(11)),
        ];
        let graph = BodyGraph::build(e(1), &links);

        assert_eq!(graph.len(), 2);
        assert!(!graph.contains(e(10)));
        assert!(!graph.is_collision_excluded(e(1), e(10)));
        assert!(!graph.is_collision_excluded(e(10), e(11)));
        assert_eq!(graph.links().len(), 1);
    }

    #[test]
    fn only_direct_pairs_are_excluded() {
        // pelvis(1) - thigh(2) - shin(3)
        let links = [
            JointLink::new(e(2), e(1), e(2)),
            JointLink::new(e(3), e(2), e(3)),
        ];
        let graph = BodyGraph::build(e(1), &links);

        assert!(graph.is_collision_excluded(e(1), e(2)));
        assert!(graph.is_collision_excluded(e(2), e(3)));
        assert!(!graph.is_collision_excluded(e(1), e(3)));
    }

    #[test]
    fn order_is_breadth_first() {
        // Links listed leaf-first to show order comes from traversal.
        let links = [
            JointLink::new(e(4), e(3), e(4)),
            JointLink::new(e(3), e(1), e(3)),
            JointLink::new(e(2), e(1), e(2)),
        ];
        let graph = BodyGraph::build(e(1), &links);
        assert_eq!(graph.bodies(), &[e(1), e(3), e(2), e(4)]);
    }

    #[test]
    fn rebuilding_is_idempotent() {
        let links = [
            JointLink::new(e(2), e(1), e(2)),
            JointLink::new(e(3), e(1), e(3)),
        ];
        let first = BodyGraph::build(e(1), &links);
        let second = BodyGraph::build(e(1), &links);
        assert_eq!(first, second);
    }

    #[test]
    fn cycles_and_self_links_terminate() {
        let links = [
            JointLink::new(e(2), e(1), e(2)),
            JointLink::new(e(3), e(2), e(3)),
            JointLink::new(e(9), e(3), e(1)),
            JointLink::new(e(5), e(5), e(5)),
        ];
        let graph = BodyGraph::build(e(1), &links);
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.excluded_pairs().len(), 3);
    }

    #[test]
    fn sensors_are_filtered_by_membership() {
        let links = [JointLink::new(e(2), e(1), e(2))];
        let graph = BodyGraph::build(e(1), &links)
            .with_sensors([(e(20), e(2)), (e(21), e(50))]);
        assert_eq!(graph.sensors(), &[e(20)]);
    }
}
