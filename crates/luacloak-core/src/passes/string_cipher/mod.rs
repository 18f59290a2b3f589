//! String encryption.
//!
//! Dot accesses `a.b` first become `a["b"]` so field names are covered too.
//! Each selected literal is then XOR-enciphered with its own key, written in
//! a random alphabet, and replaced by a call to one decoder function that
//! is declared at the top of the program.

pub mod codec;

use super::{reparse, ObfuscationPass, PassContext};
use crate::ast::*;
use crate::error::Result;
use crate::tree::{self, Node, NodeMut, NodeRef};
use codec::{decode_literal, CipherPayload};
use tracing::debug;

const STAGE: &str = "string encryption";

/// Body of the run-time decoder. Arithmetic only, so it runs on Lua 5.1 as
/// well as on 5.3+.
const DECODER: &str = r#"function(b, c)
    local d = b:sub(1, 5)
    local e, f = b:find(d, 6, true)
    local g = b:sub(6, e - 1)
    local h = b:sub(f + 1)
    local i = {}
    for j = 1, #g do
        i[g:sub(j, j)] = j - 1
    end
    local k = { 0 }
    for j = 1, #h do
        local l = i[h:sub(j, j)]
        for m = #k, 1, -1 do
            local n = k[m] * #g + l
            k[m] = n % 256
            l = math.floor(n / 256)
        end
        while l > 0 do
            table.insert(k, 1, l % 256)
            l = math.floor(l / 256)
        end
    end
    local o = {}
    local p = #c
    for j = 2, #k do
        local q, r = k[j], c:byte((j - 2) % p + 1)
        local s, t = 0, 1
        for _ = 1, 8 do
            if q % 2 ~= r % 2 then
                s = s + t
            end
            q = math.floor(q / 2)
            r = math.floor(r / 2)
            t = t * 2
        end
        o[#o + 1] = string.char(s)
    end
    return table.concat(o)
end"#;

pub struct StringCipherPass {
    percentage: u8,
}

impl StringCipherPass {
    pub fn new(percentage: u8) -> Self {
        Self { percentage }
    }
}

impl Default for StringCipherPass {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ObfuscationPass for StringCipherPass {
    fn name(&self) -> &'static str {
        "encrypt-strings"
    }

    fn description(&self) -> &'static str {
        "Encrypting strings"
    }

    fn run(&mut self, mut block: Block, ctx: &mut PassContext) -> Result<Block> {
        stringify_members(&mut block);

        let literals = tree::find(&block, usize::MAX, |node, _| {
            matches!(node, NodeRef::Expression(Expression::String(_)))
        });
        let total = literals.len();
        let selected = ctx.sample(literals, self.percentage);
        let decoder = ctx.fresh_name();
        let mut enciphered = 0usize;

        // literals are leaves, so no path is affected by another replacement
        for path in &selected {
            let Some(NodeRef::Expression(Expression::String(literal))) = tree::get(&block, path)
            else {
                continue;
            };
            let plain = decode_literal(&literal.raw)?;
            let payload = CipherPayload::encode(&plain, &mut ctx.rng);
            let call = Expression::call(
                Expression::identifier(decoder.as_str()),
                vec![
                    Expression::string(payload.payload()),
                    Expression::string(&payload.key),
                ],
            );
            if tree::replace(&mut block, path, Node::Expression(call)) {
                enciphered += 1;
            }
        }
        debug!(literals = total, enciphered, "strings encrypted");

        if enciphered == 0 {
            return Ok(block);
        }
        let mut program = reparse(STAGE, format!("local {} = {}", decoder, DECODER))?;
        program.append(&mut block);
        Ok(program)
    }
}

/// Rewrite every `a.b` as `a["b"]` and every `{ b = v }` as
/// `{ ["b"] = v }`, innermost first.
fn stringify_members(block: &mut Block) {
    let mut paths = tree::find(block, usize::MAX, |node, _| {
        matches!(
            node,
            NodeRef::Expression(Expression::Member { .. })
                | NodeRef::TableField(TableField::Named { .. })
        )
    });
    tree::sort_deepest_first(&mut paths);
    for path in &paths {
        match tree::get_mut(block, path) {
            Some(NodeMut::Expression(expr)) => {
                if let Expression::Member { base, name } = expr {
                    let base = std::mem::replace(base, Box::new(Expression::Nil));
                    let key = Box::new(Expression::string(name.as_bytes()));
                    *expr = Expression::Index { base, key };
                }
            }
            Some(NodeMut::TableField(field)) => {
                if let TableField::Named { name, value } = field {
                    let key = Expression::string(name.as_bytes());
                    let value = std::mem::replace(value, Expression::Nil);
                    *field = TableField::Keyed { key, value };
                }
            }
            _ => {}
        }
    }
}
