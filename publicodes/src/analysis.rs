//! Dependency analysis between rules
//!
//! This module keeps the two reference maps built during disambiguation and
//! answers the questions asked of them:
//! - which rules a rule references (`references_in`)
//! - which rules reference a rule (`rules_that_use`), transitively when a
//!   change has to be propagated
//! - which rules form reference cycles, for diagnostics

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Rule-to-rule reference graph
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    references_in: BTreeMap<String, BTreeSet<String>>,
    rules_that_use: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the references of `rule`, replacing the previously recorded ones
    pub fn set_references(&mut self, rule: &str, references: BTreeSet<String>) {
        if let Some(previous) = self.references_in.remove(rule) {
            for target in previous {
                if let Some(users) = self.rules_that_use.get_mut(&target) {
                    users.remove(rule);
                    if users.is_empty() {
                        self.rules_that_use.remove(&target);
                    }
                }
            }
        }
        for target in &references {
            self.rules_that_use
                .entry(target.clone())
                .or_default()
                .insert(rule.to_string());
        }
        self.references_in.insert(rule.to_string(), references);
    }

    /// Rules directly referenced by `rule`
    pub fn references_in(&self, rule: &str) -> impl Iterator<Item = &str> {
        self.references_in
            .get(rule)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Rules directly referencing `rule`
    pub fn rules_that_use(&self, rule: &str) -> impl Iterator<Item = &str> {
        self.rules_that_use
            .get(rule)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Every rule reaching one of `names` through references, `names` included
    ///
    /// # Examples
    /// ```text
    /// Given:
    ///   net = brut * 77%
    ///   salaire affiché = net
    ///
    /// transitive_users(["brut"]) = {brut, net, salaire affiché}
    /// ```
    pub fn transitive_users<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
        let mut reached: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = names.into_iter().map(str::to_string).collect();
        while let Some(name) = queue.pop_front() {
            if !reached.insert(name.clone()) {
                continue;
            }
            for user in self.rules_that_use(&name) {
                if !reached.contains(user) {
                    queue.push_back(user.to_string());
                }
            }
        }
        reached
    }

    /// Strongly connected components, computed with an iterative Tarjan pass
    fn strongly_connected_components(&self) -> Vec<Vec<usize>> {
        let nodes = self.nodes();
        let adjacency = self.adjacency(&nodes);
        let count = nodes.len();

        let mut next_index = 0;
        let mut index: Vec<Option<usize>> = vec![None; count];
        let mut lowlink = vec![0; count];
        let mut on_stack = vec![false; count];
        let mut stack: Vec<usize> = Vec::new();
        let mut components = Vec::new();

        for root in 0..count {
            if index[root].is_some() {
                continue;
            }
            index[root] = Some(next_index);
            lowlink[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;
            let mut calls: Vec<(usize, usize)> = vec![(root, 0)];

            while let Some(&(node, edge)) = calls.last() {
                if edge < adjacency[node].len() {
                    if let Some(frame) = calls.last_mut() {
                        frame.1 += 1;
                    }
                    let target = adjacency[node][edge];
                    match index[target] {
                        None => {
                            index[target] = Some(next_index);
                            lowlink[target] = next_index;
                            next_index += 1;
                            stack.push(target);
                            on_stack[target] = true;
                            calls.push((target, 0));
                        }
                        Some(target_index) if on_stack[target] => {
                            lowlink[node] = lowlink[node].min(target_index);
                        }
                        Some(_) => {}
                    }
                    continue;
                }

                calls.pop();
                if let Some(&(caller, _)) = calls.last() {
                    lowlink[caller] = lowlink[caller].min(lowlink[node]);
                }
                if index[node] == Some(lowlink[node]) {
                    let mut component = Vec::new();
                    while let Some(member) = stack.pop() {
                        on_stack[member] = false;
                        component.push(member);
                        if member == node {
                            break;
                        }
                    }
                    components.push(component);
                }
            }
        }
        components
    }

    fn nodes(&self) -> Vec<&str> {
        let mut nodes: BTreeSet<&str> = self.references_in.keys().map(String::as_str).collect();
        nodes.extend(self.rules_that_use.keys().map(String::as_str));
        nodes.into_iter().collect()
    }

    fn adjacency(&self, nodes: &[&str]) -> Vec<Vec<usize>> {
        let position: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(index, name)| (*name, index))
            .collect();
        nodes
            .iter()
            .map(|name| {
                self.references_in(name)
                    .filter_map(|target| position.get(target).copied())
                    .collect()
            })
            .collect()
    }

    /// The shortest cycle of every cyclic component, closed on its first rule
    ///
    /// # Examples
    /// ```text
    /// Given:
    ///   a = b + 1
    ///   b = c
    ///   c = a
    ///
    /// Returns: [["a", "b", "c", "a"]]
    /// ```
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let nodes = self.nodes();
        let adjacency = self.adjacency(&nodes);
        let mut cycles: Vec<Vec<String>> = self
            .strongly_connected_components()
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|node| adjacency[*node].contains(node))
            })
            .filter_map(|component| shortest_cycle(&component, &adjacency))
            .map(|cycle| cycle.into_iter().map(|node| nodes[node].to_string()).collect())
            .collect();
        cycles.sort();
        cycles
    }
}

/// Shortest cycle inside one component, found by a BFS from each member
fn shortest_cycle(component: &[usize], adjacency: &[Vec<usize>]) -> Option<Vec<usize>> {
    let members: BTreeSet<usize> = component.iter().copied().collect();
    let mut best: Option<Vec<usize>> = None;

    for &start in &members {
        let mut previous: HashMap<usize, usize> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut closing = None;
        'search: while let Some(node) = queue.pop_front() {
            for &target in &adjacency[node] {
                if !members.contains(&target) {
                    continue;
                }
                if target == start {
                    closing = Some(node);
                    break 'search;
                }
                if target != start && !previous.contains_key(&target) {
                    previous.insert(target, node);
                    queue.push_back(target);
                }
            }
        }
        let Some(last) = closing else { continue };

        let mut path = vec![last];
        let mut current = last;
        while current != start {
            match previous.get(&current) {
                Some(&node) => {
                    path.push(node);
                    current = node;
                }
                None => break,
            }
        }
        path.reverse();
        path.push(start);
        if best.as_ref().map_or(true, |best| path.len() < best.len()) {
            best = Some(path);
        }
    }
    best
}
