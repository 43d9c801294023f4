//! Two total orders over a container set: by creation time, and by
//! declared dependency links (topological).

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;

use crate::container::Container;

#[derive(Debug, Error)]
pub enum SorterError {
    #[error("circular dependency detected among containers: {0:?}")]
    CircularDependency(Vec<String>),
}

/// Ascending by creation timestamp, stable.
pub fn by_creation(containers: &mut [Container]) {
    containers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Kahn-style topological sort over `dependency -> dependent` edges read
/// from each container's declared `depends_on` list. A container with no
/// unresolved dependency is emitted before anything depending on it.
/// Dangling links (naming a container outside `containers`) are ignored.
/// Ties within the same rank are broken by creation time, then by name.
pub fn by_deps(containers: Vec<Container>) -> Result<Vec<Container>, SorterError> {
    let by_name: HashMap<&str, usize> = containers
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();

    // indegree[i] = number of unresolved dependencies of containers[i]
    let mut indegree = vec![0usize; containers.len()];
    // dependents[i] = indices of containers that declare i as a dependency
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); containers.len()];

    for (i, c) in containers.iter().enumerate() {
        for dep_name in &c.policy.depends_on {
            if let Some(&dep_idx) = by_name.get(dep_name.as_str()) {
                indegree[i] += 1;
                dependents[dep_idx].push(i);
            }
            // dangling link: warning-worthy, not an error; silently skipped here
        }
    }

    let mut ready: VecDeque<usize> = VecDeque::new();
    let mut in_ready: HashSet<usize> = HashSet::new();
    for i in 0..containers.len() {
        if indegree[i] == 0 {
            ready.push_back(i);
            in_ready.insert(i);
        }
    }

    let mut order = Vec::with_capacity(containers.len());
    let mut emitted = vec![false; containers.len()];

    while !ready.is_empty() {
        // pick the lowest-ranked ready node by (creation time, id)
        let pick = ready
            .iter()
            .copied()
            .min_by(|&a, &b| {
                containers[a]
                    .created_at
                    .cmp(&containers[b].created_at)
                    .then_with(|| containers[a].id.cmp(&containers[b].id))
            })
            .expect("ready is non-empty");

        ready.retain(|&i| i != pick);
        in_ready.remove(&pick);
        emitted[pick] = true;
        order.push(pick);

        for &dep in &dependents[pick] {
            indegree[dep] -= 1;
            if indegree[dep] == 0 && !in_ready.contains(&dep) {
                ready.push_back(dep);
                in_ready.insert(dep);
            }
        }
    }

    if order.len() != containers.len() {
        let offenders = (0..containers.len())
            .filter(|&i| !emitted[i])
            .map(|i| containers[i].name.clone())
            .collect();
        return Err(SorterError::CircularDependency(offenders));
    }

    let mut containers: Vec<Option<Container>> = containers.into_iter().map(Some).collect();
    Ok(order.into_iter().map(|i| containers[i].take().unwrap()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerPolicy;
    use bollard::container::Config as BollardConfig;
    use chrono::{TimeZone, Utc};

    fn container(name: &str, created_secs: i64, depends_on: &[&str]) -> Container {
        Container {
            id: name.to_string(),
            name: name.to_string(),
            image_id: "img".to_string(),
            image_name: "repo:tag".to_string(),
            created_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
            running: true,
            restarting: false,
            labels: Default::default(),
            policy: ContainerPolicy {
                depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
                ..ContainerPolicy::default()
            },
            create_config: BollardConfig::default(),
            host_config: None,
            stale: false,
            linked_to_restarting: false,
        }
    }

    #[test]
    fn by_creation_is_stable_ascending() {
        let mut containers = vec![container("b", 20, &[]), container("a", 10, &[])];
        by_creation(&mut containers);
        assert_eq!(containers[0].name, "a");
        assert_eq!(containers[1].name, "b");
    }

    #[test]
    fn by_deps_orders_dependencies_first() {
        // A depends on B, B depends on C -> forward order C, B, A
        let containers = vec![
            container("a", 1, &["b"]),
            container("b", 2, &["c"]),
            container("c", 3, &[]),
        ];
        let sorted = by_deps(containers).unwrap();
        let names: Vec<_> = sorted.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn by_deps_detects_cycles() {
        let containers = vec![container("a", 1, &["b"]), container("b", 2, &["a"])];
        let err = by_deps(containers).unwrap_err();
        match err {
            SorterError::CircularDependency(mut names) => {
                names.sort();
                assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
            }
        }
    }

    #[test]
    fn by_deps_ignores_dangling_links() {
        let containers = vec![container("a", 1, &["nonexistent"])];
        let sorted = by_deps(containers).unwrap();
        assert_eq!(sorted.len(), 1);
    }

    #[test]
    fn by_deps_breaks_ties_by_creation_then_name() {
        let containers = vec![container("z", 1, &[]), container("a", 1, &[])];
        let sorted = by_deps(containers).unwrap();
        let names: Vec<_> = sorted.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "z"]);
    }
}
