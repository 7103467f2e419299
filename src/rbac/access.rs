//! Pure node-tree resolution used by access checks. No SQL here.

use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Parent links for every node: (node id, parent id)
pub type NodeLinks = [(Uuid, Option<Uuid>)];

fn children_index(links: &NodeLinks) -> HashMap<Uuid, Vec<Uuid>> {
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (id, parent) in links {
        if let Some(p) = parent {
            children.entry(*p).or_default().push(*id);
        }
    }
    children
}

/// Granted nodes plus all of their descendants. Grants naming unknown nodes are ignored.
pub fn resolve_accessible(links: &NodeLinks, grants: &HashSet<Uuid>) -> HashSet<Uuid> {
    let known: HashSet<Uuid> = links.iter().map(|(id, _)| *id).collect();
    let children = children_index(links);

    let mut accessible = HashSet::new();
    let mut queue: VecDeque<Uuid> = grants.iter().filter(|g| known.contains(g)).copied().collect();

    while let Some(id) = queue.pop_front() {
        if !accessible.insert(id) {
            continue;
        }
        if let Some(kids) = children.get(&id) {
            queue.extend(kids.iter().copied());
        }
    }

    accessible
}

/// Walk up from `node` (inclusive) to the root
pub fn ancestors(links: &NodeLinks, node: Uuid) -> Vec<Uuid> {
    let parents: HashMap<Uuid, Option<Uuid>> = links.iter().copied().collect();
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(node);

    while let Some(id) = current {
        if !seen.insert(id) {
            break; // corrupt tree; stop rather than loop
        }
        chain.push(id);
        current = parents.get(&id).copied().flatten();
    }

    chain
}

/// Would re-parenting `node` under `new_parent` make the node its own ancestor?
pub fn would_create_cycle(links: &NodeLinks, node: Uuid, new_parent: Uuid) -> bool {
    ancestors(links, new_parent).contains(&node)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tree {
        org: Uuid,
        north: Uuid,
        south: Uuid,
        school_a: Uuid,
        school_b: Uuid,
        school_c: Uuid,
        links: Vec<(Uuid, Option<Uuid>)>,
    }

    fn tree() -> Tree {
        let (org, north, south) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (school_a, school_b, school_c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let links = vec![
            (org, None),
            (north, Some(org)),
            (south, Some(org)),
            (school_a, Some(north)),
            (school_b, Some(north)),
            (school_c, Some(south)),
        ];
        Tree { org, north, south, school_a, school_b, school_c, links }
    }

    #[test]
    fn region_grant_covers_its_schools_only() {
        let t = tree();
        let got = resolve_accessible(&t.links, &HashSet::from([t.north]));
        assert_eq!(got, HashSet::from([t.north, t.school_a, t.school_b]));
        assert!(!got.contains(&t.school_c));
        assert!(!got.contains(&t.org));
    }

    #[test]
    fn root_grant_covers_everything() {
        let t = tree();
        let got = resolve_accessible(&t.links, &HashSet::from([t.org]));
        assert_eq!(got.len(), t.links.len());
    }

    #[test]
    fn overlapping_and_unknown_grants() {
        let t = tree();
        let stray = Uuid::new_v4();
        let got = resolve_accessible(&t.links, &HashSet::from([t.school_c, t.south, stray]));
        assert_eq!(got, HashSet::from([t.south, t.school_c]));
    }

    #[test]
    fn ancestors_walk_to_root() {
        let t = tree();
        assert_eq!(ancestors(&t.links, t.school_a), vec![t.school_a, t.north, t.org]);
    }

    #[test]
    fn detects_cycles_on_reparent() {
        let t = tree();
        assert!(would_create_cycle(&t.links, t.north, t.school_a));
        assert!(would_create_cycle(&t.links, t.north, t.north));
        assert!(!would_create_cycle(&t.links, t.school_a, t.south));
    }
}
