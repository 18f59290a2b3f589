//! Scope-aware renaming of local variables.
//!
//! Every name bound by a local declaration, local function, parameter or
//! loop variable is replaced, at its bindings and at every reference that
//! resolves to one of them, by a confusable alias such as `lIjJi1lIiJ1jlIJ`.
//! Free names are left alone so globals keep working.

use super::{ObfuscationPass, PassContext};
use crate::ast::*;
use crate::error::Result;
use crate::scope::{walk_block, ScopeTracker, ScopeVisitor};
use indexmap::IndexMap;
use tracing::debug;

/// Implicit in methods and meaningful to callers using `:` syntax.
const RESERVED: &str = "self";

pub struct VariableRenamingPass;

impl VariableRenamingPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VariableRenamingPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ObfuscationPass for VariableRenamingPass {
    fn name(&self) -> &'static str {
        "rename-variables"
    }

    fn description(&self) -> &'static str {
        "Renaming variables"
    }

    fn run(&mut self, mut block: Block, ctx: &mut PassContext) -> Result<Block> {
        let mut renamer = Renamer {
            ctx,
            table: RenameTable::new(),
        };
        walk_block(&mut renamer, &mut ScopeTracker::new(), &mut block);
        debug!(names = renamer.table.len(), "variables renamed");
        Ok(block)
    }
}

/// Original name to alias. One alias per distinct name; since aliases never
/// clash with program names, this keeps every binding distinct.
pub type RenameTable = IndexMap<String, String>;

struct Renamer<'c> {
    ctx: &'c mut PassContext,
    table: RenameTable,
}

impl Renamer<'_> {
    fn alias(&mut self, name: &str) -> String {
        if let Some(alias) = self.table.get(name) {
            return alias.clone();
        }
        let alias = self.ctx.names.fresh_confusable(&mut self.ctx.rng);
        self.table.insert(name.to_string(), alias.clone());
        alias
    }
}

impl ScopeVisitor for Renamer<'_> {
    fn visit_reference(&mut self, expr: &mut Expression, bound: bool) {
        if !bound {
            return;
        }
        if let Expression::Identifier(name) = expr {
            if name.as_str() != RESERVED {
                *name = self.alias(name);
            }
        }
    }

    fn visit_binding(&mut self, name: &mut String) {
        if name.as_str() != RESERVED {
            *name = self.alias(name);
        }
    }

    fn visit_function_statement(&mut self, stmt: &mut Statement, root_bound: bool) {
        if !root_bound {
            return;
        }
        if let Statement::Function { name, .. } = stmt {
            if name.root() != RESERVED {
                let alias = self.alias(name.root());
                name.path[0] = alias;
            }
        }
    }
}
