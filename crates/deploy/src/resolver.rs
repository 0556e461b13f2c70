//! Dependency ordering for deployment units.
//!
//! Units are sorted topologically over the graph induced by their constructor
//! references. Among units whose relative order is unconstrained the input
//! order is preserved, so the same set always resolves to the same sequence.

use std::collections::{BTreeSet, HashMap};

use crate::{DeployError, DeploymentUnit};

/// Order `units` so that every referenced unit precedes the units referencing it.
///
/// Pure function of its input: no I/O and no network calls.
pub fn resolve(units: &[DeploymentUnit]) -> Result<Vec<&DeploymentUnit>, DeployError> {
    crate::unit::ensure_unique(units)?;

    let index: HashMap<&str, usize> = units
        .iter()
        .enumerate()
        .map(|(i, unit)| (unit.name.as_str(), i))
        .collect();

    // deps[i] holds the distinct indices unit i depends on.
    let mut deps: Vec<BTreeSet<usize>> = Vec::with_capacity(units.len());
    for unit in units {
        let mut unit_deps = BTreeSet::new();
        for reference in unit.references() {
            let Some(&dep) = index.get(reference) else {
                return Err(DeployError::UnknownReference {
                    unit: unit.name.clone(),
                    reference: reference.to_string(),
                });
            };
            unit_deps.insert(dep);
        }
        deps.push(unit_deps);
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
    for (i, unit_deps) in deps.iter().enumerate() {
        for &dep in unit_deps {
            dependents[dep].push(i);
        }
    }

    let mut pending: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<usize> = (0..units.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(units.len());

    // Always take the lowest input index that is ready.
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < units.len() {
        let members = find_cycle(&deps, &pending)
            .into_iter()
            .map(|i| units[i].name.clone())
            .collect();
        return Err(DeployError::CyclicDependency { members });
    }

    Ok(order.into_iter().map(|i| &units[i]).collect())
}

/// Extract one cycle among the units left unsorted.
///
/// Every leftover unit has at least one leftover dependency, so following
/// those edges from any leftover unit must eventually revisit a node.
fn find_cycle(deps: &[BTreeSet<usize>], pending: &[usize]) -> Vec<usize> {
    let leftover = |i: usize| pending[i] > 0;

    let Some(start) = (0..deps.len()).find(|&i| leftover(i)) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut position = HashMap::from([(start, 0)]);
    let mut current = start;

    loop {
        let Some(&next) = deps[current].iter().find(|&&dep| leftover(dep)) else {
            return path;
        };
        if let Some(&at) = position.get(&next) {
            let mut cycle = path.split_off(at);
            // Report members in input order.
            cycle.sort_unstable();
            return cycle;
        }
        position.insert(next, path.len());
        path.push(next);
        current = next;
    }
}
