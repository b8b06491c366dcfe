use std::collections::HashMap;

use async_graphql_parser::{
    types::{Field, FragmentDefinition, Selection, SelectionSet},
    Positioned,
};
use async_graphql_value::Name;
use serde::Deserialize;

use crate::response::ServerError;

/// Limits enforced on an operation before any resolution begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OperationLimits {
    /// Deepest allowed nesting of selection sets, counting fields in
    /// fragments at the depth of their spread.
    pub depth: Option<u16>,
}

impl Default for OperationLimits {
    fn default() -> Self {
        Self { depth: Some(5) }
    }
}

/// Walks the operation's selection tree and rejects it when a limit is
/// exceeded. Runs before the resolver environment is even built, so a
/// rejected document triggers zero storage calls.
pub(crate) fn check_operation_limits(
    selection_set: &Positioned<SelectionSet>,
    fragments: &HashMap<Name, Positioned<FragmentDefinition>>,
    limits: OperationLimits,
) -> Result<(), ServerError> {
    Visitor {
        fragments,
        fragment_stack: Vec::new(),
        current_depth: 0,
        max_depth: limits.depth.map(usize::from).unwrap_or(usize::MAX),
    }
    .visit_selection_set(selection_set)
}

struct Visitor<'doc> {
    fragments: &'doc HashMap<Name, Positioned<FragmentDefinition>>,
    fragment_stack: Vec<&'doc str>,
    current_depth: usize,
    max_depth: usize,
}

impl<'doc> Visitor<'doc> {
    fn visit_selection_set(&mut self, selection_set: &'doc Positioned<SelectionSet>) -> Result<(), ServerError> {
        for item in &selection_set.node.items {
            match &item.node {
                Selection::Field(field) => self.visit_field(field)?,
                Selection::FragmentSpread(spread) => {
                    let name = spread.node.fragment_name.node.as_str();
                    if self.fragment_stack.contains(&name) {
                        return Err(ServerError::new(
                            format!("Fragment cycle detected: {}", self.fragment_stack.join(", ")),
                            Some(spread.pos),
                        ));
                    }
                    let Some(fragment) = self.fragments.get(name) else {
                        return Err(ServerError::new(
                            format!("Unknown fragment named '{name}'"),
                            Some(spread.pos),
                        ));
                    };
                    self.fragment_stack.push(name);
                    self.visit_selection_set(&fragment.node.selection_set)?;
                    self.fragment_stack.pop();
                }
                Selection::InlineFragment(inline) => {
                    self.visit_selection_set(&inline.node.selection_set)?;
                }
            }
        }
        Ok(())
    }

    fn visit_field(&mut self, field: &'doc Positioned<Field>) -> Result<(), ServerError> {
        self.current_depth += 1;
        if self.current_depth > self.max_depth {
            return Err(ServerError::new("Query is nested too deep.", Some(field.pos)));
        }
        self.visit_selection_set(&field.node.selection_set)?;
        self.current_depth -= 1;
        Ok(())
    }
}
