//! Exclusion resolution over the product graph.
//!
//! A value is excluded when another selected value of the same product
//! forbids it, when a value selected on a parent product forbids it, or when
//! picking it would rebuild a combination whose variant was archived.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::domain::ids::{TemplateId, ValueId};
use crate::domain::product::ProductNode;

/// Values of `node` that cannot be picked alongside its current combination
/// and the combination of its parents.
pub fn excluded_values(node: &ProductNode, parent_combination: &[ValueId]) -> BTreeSet<ValueId> {
    let combination = node.combination();
    let mut excluded = BTreeSet::new();

    for value_id in &combination {
        if let Some(targets) = node.exclusions.get(value_id) {
            excluded.extend(targets.iter().copied());
        }
    }

    for value_id in parent_combination {
        if let Some(targets) = node.parent_exclusions.get(value_id) {
            excluded.extend(targets.iter().copied());
        }
    }

    let selected = combination.iter().copied().collect::<BTreeSet<_>>();
    for archived in &node.archived_combinations {
        let common = archived.iter().filter(|value_id| selected.contains(value_id)).count();
        if common == combination.len() {
            excluded.extend(archived.iter().copied().filter(|value_id| selected.contains(value_id)));
        } else if common + 1 == combination.len() {
            if let Some(missing) = archived.iter().find(|value_id| !selected.contains(value_id)) {
                excluded.insert(*missing);
            }
        }
    }

    excluded
}

/// Clears and recomputes the `excluded` flag of every value of `node`.
pub fn apply_exclusions(node: &mut ProductNode, parent_combination: &[ValueId]) -> usize {
    let excluded = excluded_values(node, parent_combination);
    let mut marked = 0;
    for line in &mut node.attribute_lines {
        line.clear_exclusions();
        for value in &mut line.values {
            if excluded.contains(&value.id) {
                value.excluded = true;
                marked += 1;
            }
        }
    }
    marked
}

/// Union of the combinations of every known parent of `node`.
pub fn parent_combination(
    nodes: &BTreeMap<TemplateId, ProductNode>,
    node: &ProductNode,
) -> Vec<ValueId> {
    node.parent_template_ids
        .iter()
        .filter_map(|parent_id| nodes.get(parent_id))
        .flat_map(ProductNode::combination)
        .collect()
}

/// Template ids of the nodes that list `template_id` as a parent.
pub fn child_ids(nodes: &BTreeMap<TemplateId, ProductNode>, template_id: TemplateId) -> Vec<TemplateId> {
    nodes
        .values()
        .filter(|node| node.parent_template_ids.contains(&template_id))
        .map(|node| node.template_id)
        .collect()
}

/// Resolves `start` and then every descendant, each node at most once.
///
/// Returns the template ids in the order they were resolved.
pub fn resolve_from(
    nodes: &mut BTreeMap<TemplateId, ProductNode>,
    start: TemplateId,
) -> Vec<TemplateId> {
    let mut visited = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);
    let mut resolved = Vec::new();

    while let Some(template_id) = queue.pop_front() {
        let Some(node) = nodes.get(&template_id) else {
            continue;
        };
        let parents = parent_combination(nodes, node);
        if let Some(node) = nodes.get_mut(&template_id) {
            apply_exclusions(node, &parents);
        }
        resolved.push(template_id);

        for child_id in child_ids(nodes, template_id) {
            if visited.insert(child_id) {
                queue.push_back(child_id);
            }
        }
    }

    resolved
}
