//! Administrative-normal-form lowering.
//!
//! Every compound expression is broken into single-operation assignments to
//! `local` temporaries, evaluated in the original order. The lowered
//! program is produced as text and parsed back.
//!
//! A call or `...` in a position that expands to all of its values (the
//! last initializer, return value, argument, positional table field or
//! iterator) is kept inline, since a temporary would keep only the first
//! value. Statements that needed temporaries are wrapped in `do ... end` so
//! the temporaries go out of scope right away.
//!
//! Lua allows 200 locals per function, so a temporary is reused once its
//! value has been read, and large table constructors collect their fields
//! in a buffer table. A name operand is copied before a later call could
//! reassign it wherever Lua itself reads the name first.

use super::{reparse, ObfuscationPass, PassContext};
use crate::ast::*;
use crate::codegen::emit_expression;
use crate::config::OutputFormat;
use crate::error::Result;
use crate::scope::ScopeTracker;
use crate::tree::{children, NodeRef};
use indexmap::IndexMap;
use tracing::debug;

const STAGE: &str = "expression lowering";

/// What a call is made on: a plain value, or a receiver and method name for
/// `receiver:method(...)` calls that must pass the receiver implicitly.
#[derive(Debug, Clone, PartialEq)]
enum Callee {
    Value(String),
    Method { receiver: String, method: String },
}

impl Callee {
    fn render(&self, args: &[String]) -> String {
        match self {
            Callee::Value(function) => format!("{}({})", function, args.join(", ")),
            Callee::Method { receiver, method } => {
                format!("{}:{}({})", receiver, method, args.join(", "))
            }
        }
    }
}

pub struct ExpressionLoweringPass;

impl ExpressionLoweringPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExpressionLoweringPass {
    fn default() -> Self {
        Self::new()
    }
}

impl ObfuscationPass for ExpressionLoweringPass {
    fn name(&self) -> &'static str {
        "lower-expressions"
    }

    fn description(&self) -> &'static str {
        "Decomposing expressions"
    }

    fn run(&mut self, block: Block, ctx: &mut PassContext) -> Result<Block> {
        let mut lowerer = Lowerer::new(ctx);
        lowerer.lower_block(&block, false);
        debug!(temporaries = lowerer.temporaries, "expressions lowered");
        reparse(STAGE, lowerer.out)
    }
}

/// Constructors with more computed fields than this park the values in a
/// buffer table instead of holding one temporary per field.
const MAX_INLINE_FIELDS: usize = 16;

struct Lowerer<'c> {
    ctx: &'c mut PassContext,
    out: String,
    temporaries: usize,
    /// Locals of the function being lowered. Any other name is read through
    /// an upvalue or the environment.
    locals: ScopeTracker,
    /// Consumed temporaries, grouped by the block that declared them.
    free: Vec<Vec<String>>,
    /// Temporaries holding a value, in allocation order, with the index of
    /// the block that declared them.
    held: IndexMap<String, usize>,
}

impl Lowerer<'_> {
    fn new(ctx: &mut PassContext) -> Lowerer<'_> {
        Lowerer {
            ctx,
            out: String::new(),
            temporaries: 0,
            locals: ScopeTracker::new(),
            free: vec![Vec::new()],
            held: IndexMap::new(),
        }
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Run `f` with a fresh output buffer; returns what it wrote and its
    /// result.
    fn capture<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> (String, T) {
        let saved = std::mem::take(&mut self.out);
        let value = f(self);
        let captured = std::mem::replace(&mut self.out, saved);
        (captured, value)
    }

    /// Like `capture`, for a prelude that `scoped` puts in a block of its own.
    fn capture_scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> (String, T) {
        self.open_block();
        let captured = self.capture(f);
        self.close_block();
        captured
    }

    /// Emit `prelude` followed by `text`, scoped in a `do` block if there
    /// is a prelude.
    fn scoped(&mut self, prelude: String, text: &str) {
        if prelude.is_empty() {
            self.line(text);
        } else {
            self.line("do");
            self.out.push_str(&prelude);
            self.line(text);
            self.line("end");
        }
    }

    // ----- temporaries -----

    fn open_block(&mut self) {
        self.free.push(Vec::new());
    }

    /// Temporaries declared in the closing block go out of scope with it.
    fn close_block(&mut self) {
        self.free.pop();
        let depth = self.free.len();
        self.held.retain(|_, block| *block < depth);
    }

    /// Store `value` in a temporary and return its name. A consumed
    /// temporary still in scope is reused before a new local is declared,
    /// so the number of live locals follows the nesting of the expression
    /// rather than its size.
    fn temporary(&mut self, value: &str) -> String {
        let reused = self
            .free
            .iter_mut()
            .enumerate()
            .rev()
            .find_map(|(block, names)| names.pop().map(|name| (block, name)));
        let (block, name) = match reused {
            Some((block, name)) => {
                self.line(&format!("{} = {}", name, value));
                (block, name)
            }
            None => {
                let name = self.ctx.fresh_name();
                self.temporaries += 1;
                self.line(&format!("local {} = {}", name, value));
                (self.free.len() - 1, name)
            }
        };
        self.held.insert(name.clone(), block);
        name
    }

    /// A temporary for `value`, or `value` itself when it already is one.
    fn owned(&mut self, value: String) -> String {
        if self.held.contains_key(&value) {
            value
        } else {
            self.temporary(&value)
        }
    }

    /// Mark the temporaries among `atoms` as consumed. Call right before
    /// writing the text that reads them.
    fn release(&mut self, atoms: &[&str]) {
        for atom in atoms {
            if let Some(block) = self.held.shift_remove(*atom) {
                if let Some(names) = self.free.get_mut(block) {
                    names.push((*atom).to_string());
                }
            }
        }
    }

    /// Release everything taken after the first `mark` held temporaries.
    fn release_from(&mut self, mark: usize) {
        while self.held.len() > mark {
            if let Some((name, block)) = self.held.pop() {
                if let Some(names) = self.free.get_mut(block) {
                    names.push(name);
                }
            }
        }
    }

    /// Copy a name operand into a temporary when a call evaluated after it
    /// could reassign the name. Lua reads such an operand first, unless it
    /// is a local of the running function used directly by an arithmetic,
    /// bitwise or comparison operator (`read_late`).
    fn pin(
        &mut self,
        atom: String,
        expr: &Expression,
        call_follows: bool,
        read_late: bool,
    ) -> String {
        let Expression::Identifier(name) = unparenthesized(expr) else {
            return atom;
        };
        if !call_follows || (read_late && self.locals.is_bound(name)) {
            return atom;
        }
        self.temporary(&atom)
    }

    // ----- statements -----

    /// `trailing` is set when more code follows the block in the same scope,
    /// in which case a final `return`/`break` needs a block of its own.
    fn lower_block(&mut self, block: &[Statement], trailing: bool) {
        for (i, stmt) in block.iter().enumerate() {
            let mark = self.held.len();
            self.lower_statement(stmt, trailing || i + 1 < block.len());
            self.release_from(mark);
        }
    }

    /// A nested block with its own scope.
    fn lower_body(&mut self, block: &[Statement]) {
        self.open_block();
        self.locals.push();
        self.lower_block(block, false);
        self.locals.pop();
        self.close_block();
    }

    fn lower_statement(&mut self, stmt: &Statement, trailing: bool) {
        match stmt {
            Statement::Assignment { targets, values } => {
                let (prelude, text) = self.capture_scoped(|l| {
                    let call_follows = values.iter().any(contains_call);
                    let targets: Vec<String> = targets
                        .iter()
                        .map(|t| l.lower_target(t, call_follows))
                        .collect();
                    let values = l.lower_list(values);
                    format!("{} = {}", targets.join(", "), values.join(", "))
                });
                self.scoped(prelude, &text);
            }
            Statement::Local { names, values } => self.lower_local(names, values),
            Statement::LocalFunction { name, function } => {
                self.locals.declare(name.as_str());
                self.write_function(&format!("local function {}", name), function, false);
            }
            Statement::Function { name, function } => {
                let mut header = format!("function {}", name.path.join("."));
                if let Some(method) = &name.method {
                    header.push(':');
                    header.push_str(method);
                }
                self.write_function(&header, function, name.method.is_some());
            }
            Statement::Call { call } => {
                let (prelude, text) = self.capture_scoped(|l| l.lower_call(call));
                self.scoped(prelude, &text);
            }
            Statement::Do { body } => {
                self.line("do");
                self.lower_body(body);
                self.line("end");
            }
            Statement::While { condition, body } => self.lower_while(condition, body),
            Statement::Repeat { body, condition } => {
                self.line("repeat");
                self.open_block();
                self.locals.push();
                self.lower_block(body, true);
                let (prelude, condition) = self.capture(|l| l.lower_value(condition));
                self.out.push_str(&prelude);
                self.line(&format!("until {}", condition));
                self.locals.pop();
                self.close_block();
            }
            Statement::If { clauses, else_body } => self.lower_if(clauses, else_body.as_deref()),
            Statement::NumericFor {
                variable,
                start,
                end,
                step,
                body,
            } => {
                self.open_block();
                let (prelude, header) = self.capture(|l| {
                    let bounds: Vec<&Expression> =
                        [Some(start), Some(end), step.as_ref()].into_iter().flatten().collect();
                    let follows = calls_after(&bounds);
                    let mut values = Vec::with_capacity(bounds.len());
                    for (bound, call_follows) in bounds.into_iter().zip(follows) {
                        let value = l.lower_value(bound);
                        values.push(l.pin(value, bound, call_follows, false));
                    }
                    format!("for {} = {} do", variable, values.join(", "))
                });
                self.write_loop(prelude, &header, std::slice::from_ref(variable), body);
                self.close_block();
            }
            Statement::GenericFor {
                variables,
                iterators,
                body,
            } => {
                self.open_block();
                let (prelude, header) = self.capture(|l| {
                    let iterators = l.lower_list(iterators);
                    format!("for {} in {} do", variables.join(", "), iterators.join(", "))
                });
                self.write_loop(prelude, &header, variables, body);
                self.close_block();
            }
            Statement::Return { values } => {
                let (prelude, values) = self.capture_scoped(|l| l.lower_list(values));
                let text = if values.is_empty() {
                    "return".to_string()
                } else {
                    format!("return {}", values.join(", "))
                };
                if prelude.is_empty() && trailing {
                    self.line(&format!("do {} end", text));
                } else {
                    self.scoped(prelude, &text);
                }
            }
            Statement::Break => self.line(if trailing { "do break end" } else { "break" }),
        }
    }

    fn lower_local(&mut self, names: &[String], values: &[Expression]) {
        let declared = names.join(", ");
        if values.is_empty() {
            self.line(&format!("local {}", declared));
        } else if values.iter().any(|value| mentions_any(value, names)) {
            // `local x = x + 1` reads the outer `x`; declaring first would
            // shadow it, so the temporaries stay in the enclosing scope.
            let (prelude, values_text) = self.capture(|l| l.lower_list(values).join(", "));
            self.out.push_str(&prelude);
            self.line(&format!("local {} = {}", declared, values_text));
        } else {
            let (prelude, values_text) =
                self.capture_scoped(|l| l.lower_list(values).join(", "));
            if prelude.is_empty() {
                self.line(&format!("local {} = {}", declared, values_text));
            } else {
                self.line(&format!("local {}", declared));
                self.scoped(prelude, &format!("{} = {}", declared, values_text));
            }
        }
        for name in names {
            self.locals.declare(name.as_str());
        }
    }

    fn lower_while(&mut self, condition: &Expression, body: &[Statement]) {
        self.open_block();
        let (prelude, value) = self.capture(|l| l.lower_value(condition));
        if prelude.is_empty() {
            self.close_block();
            self.line(&format!("while {} do", value));
            self.lower_body(body);
            self.line("end");
            return;
        }

        // The condition is evaluated once before the loop and again after
        // each pass through the body, which gets its own scope so its locals
        // cannot shadow names the condition reads.
        self.line("do");
        self.out.push_str(&prelude);
        let control = self.owned(value);
        self.line(&format!("while {} do", control));
        self.open_block();
        self.line("do");
        self.lower_body(body);
        self.line("end");
        let (prelude, value) = self.capture(|l| l.lower_value(condition));
        self.out.push_str(&prelude);
        self.release(&[value.as_str()]);
        self.line(&format!("{} = {}", control, value));
        self.close_block();
        self.line("end");
        self.line("end");
        self.close_block();
    }

    /// `elseif` arms become nested `if`s so each condition's temporaries
    /// are only computed when that condition is reached.
    fn lower_if(&mut self, clauses: &[IfClause], else_body: Option<&[Statement]>) {
        let Some((first, rest)) = clauses.split_first() else {
            if let Some(else_body) = else_body {
                self.line("do");
                self.lower_body(else_body);
                self.line("end");
            }
            return;
        };
        self.open_block();
        let (prelude, condition) = self.capture(|l| l.lower_value(&first.condition));
        let scoped = !prelude.is_empty();
        if scoped {
            self.line("do");
            self.out.push_str(&prelude);
        }
        self.release(&[condition.as_str()]);
        self.line(&format!("if {} then", condition));
        self.lower_body(&first.body);
        if !rest.is_empty() {
            self.line("else");
            self.lower_if(rest, else_body);
        } else if let Some(else_body) = else_body {
            self.line("else");
            self.lower_body(else_body);
        }
        self.line("end");
        if scoped {
            self.line("end");
        }
        self.close_block();
    }

    /// Loop variables are visible in the body only.
    fn write_loop(
        &mut self,
        prelude: String,
        header: &str,
        variables: &[String],
        body: &[Statement],
    ) {
        let scoped = !prelude.is_empty();
        if scoped {
            self.line("do");
            self.out.push_str(&prelude);
        }
        self.line(header);
        self.locals.push();
        for variable in variables {
            self.locals.declare(variable.as_str());
        }
        self.lower_body(body);
        self.locals.pop();
        self.line("end");
        if scoped {
            self.line("end");
        }
    }

    /// Function bodies get temporaries of their own: an outer temporary
    /// would be a shared upvalue.
    fn write_function(&mut self, header: &str, function: &FunctionBody, method: bool) {
        let locals = std::mem::take(&mut self.locals);
        let free = std::mem::replace(&mut self.free, vec![Vec::new()]);
        let held = std::mem::take(&mut self.held);

        self.line(&format!("{}({})", header, parameter_list(function)));
        if method {
            self.locals.declare("self");
        }
        for param in &function.params {
            self.locals.declare(param.as_str());
        }
        self.lower_block(&function.body, false);
        self.line("end");

        self.locals = locals;
        self.free = free;
        self.held = held;
    }

    // ----- expressions -----

    /// Lower a list where the last element may expand to several values.
    fn lower_list(&mut self, expressions: &[Expression]) -> Vec<String> {
        let all: Vec<&Expression> = expressions.iter().collect();
        let follows = calls_after(&all);
        let count = expressions.len();
        let mut values = Vec::with_capacity(count);
        for (i, (expr, call_follows)) in expressions.iter().zip(follows).enumerate() {
            if i + 1 == count {
                values.push(self.lower_multi(expr));
            } else {
                let value = self.lower_value(expr);
                values.push(self.pin(value, expr, call_follows, false));
            }
        }
        values
    }

    /// Text for an expression in a multi-value position.
    fn lower_multi(&mut self, expr: &Expression) -> String {
        match expr {
            Expression::Call { .. } | Expression::MethodCall { .. } => self.lower_call(expr),
            Expression::Vararg => "...".to_string(),
            _ => self.lower_value(expr),
        }
    }

    /// An atom holding exactly one value: a literal, a name or a temporary.
    fn lower_value(&mut self, expr: &Expression) -> String {
        match expr {
            Expression::Nil
            | Expression::True
            | Expression::False
            | Expression::Vararg
            | Expression::Number(_)
            | Expression::String(_)
            | Expression::Identifier(_) => emit_expression(expr, OutputFormat::Minified),
            Expression::Function(function) => {
                let name = self.temporary("nil");
                self.write_function(&format!("{} = function", name), function, false);
                name
            }
            Expression::Table(fields) => self.lower_table(fields),
            Expression::Binary { op, left, right } => {
                let left_value = self.lower_value(left);
                let left_value = self.pin(
                    left_value,
                    left,
                    contains_call(right),
                    *op != BinaryOp::Concatenate,
                );
                let right_value = self.lower_value(right);
                self.release(&[left_value.as_str(), right_value.as_str()]);
                self.temporary(&format!("{} {} {}", left_value, op.as_str(), right_value))
            }
            Expression::Logical { op, left, right } => {
                let left_value = self.lower_value(left);
                let result = self.owned(left_value);
                let guard = match op {
                    LogicalOp::And => format!("if {} then", result),
                    LogicalOp::Or => format!("if not {} then", result),
                };
                self.line(&guard);
                self.open_block();
                let right_value = self.lower_value(right);
                self.release(&[right_value.as_str()]);
                self.line(&format!("{} = {}", result, right_value));
                self.close_block();
                self.line("end");
                result
            }
            Expression::Unary { op, operand } => {
                let operand = self.lower_value(operand);
                self.release(&[operand.as_str()]);
                self.temporary(&format!("{}{}", op.as_str(), operand))
            }
            Expression::Member { base, name } => {
                let base = self.lower_base(base);
                let key = self.temporary(&StringLiteral::quoted(name.as_bytes()).raw);
                self.release(&[base.as_str(), key.as_str()]);
                self.temporary(&index_text(&base, &key))
            }
            Expression::Index { base, key } => {
                let base_value = self.lower_base(base);
                let base_value = self.pin(base_value, base, contains_call(key), true);
                let key_value = self.lower_value(key);
                self.release(&[base_value.as_str(), key_value.as_str()]);
                self.temporary(&index_text(&base_value, &key_value))
            }
            Expression::Call { .. } | Expression::MethodCall { .. } => {
                let call = self.lower_call(expr);
                self.temporary(&call)
            }
            Expression::Paren(inner) => {
                let value = self.lower_value(inner);
                // `(...)` keeps only the first value
                if matches!(inner.as_ref(), Expression::Vararg) {
                    self.temporary(&value)
                } else {
                    value
                }
            }
        }
    }

    /// Like `lower_value`, but the result can be indexed or called.
    fn lower_base(&mut self, expr: &Expression) -> String {
        let value = self.lower_value(expr);
        if is_name(&value) {
            value
        } else {
            self.release(&[value.as_str()]);
            self.temporary(&value)
        }
    }

    fn lower_callee<'e>(&mut self, call: &'e Expression) -> (Callee, &'e [Expression]) {
        match call {
            Expression::MethodCall {
                receiver,
                method,
                args,
            } => {
                let value = self.lower_base(receiver);
                let value = self.pin(value, receiver, args.iter().any(contains_call), false);
                let callee = Callee::Method {
                    receiver: value,
                    method: method.clone(),
                };
                (callee, args.as_slice())
            }
            Expression::Call { callee, args } => {
                let value = self.lower_base(callee);
                let value = self.pin(value, callee, args.iter().any(contains_call), false);
                (Callee::Value(value), args.as_slice())
            }
            other => (Callee::Value(self.lower_base(other)), &[]),
        }
    }

    /// The text of a call whose callee and arguments are atoms. The atoms
    /// are released, so the text has to be written before another
    /// temporary is taken.
    fn lower_call(&mut self, call: &Expression) -> String {
        let (callee, args) = self.lower_callee(call);
        let args = self.lower_list(args);
        match &callee {
            Callee::Value(function) => self.release(&[function.as_str()]),
            Callee::Method { receiver, .. } => self.release(&[receiver.as_str()]),
        }
        let atoms: Vec<&str> = args.iter().map(String::as_str).collect();
        self.release(&atoms);
        callee.render(&args)
    }

    /// `call_follows` tells whether the assigned values call anything; Lua
    /// evaluates a target's base and key before them.
    fn lower_target(&mut self, target: &Expression, call_follows: bool) -> String {
        match target {
            Expression::Member { base, name } => {
                let base_value = self.lower_base(base);
                let base_value = self.pin(base_value, base, call_follows, true);
                let key = self.temporary(&StringLiteral::quoted(name.as_bytes()).raw);
                index_text(&base_value, &key)
            }
            Expression::Index { base, key } => {
                let base_value = self.lower_base(base);
                let base_value =
                    self.pin(base_value, base, call_follows || contains_call(key), true);
                let key_value = self.lower_value(key);
                let key_value = self.pin(key_value, key, call_follows, true);
                index_text(&base_value, &key_value)
            }
            other => emit_expression(other, OutputFormat::Minified),
        }
    }

    fn lower_table(&mut self, fields: &[TableField]) -> String {
        let computed = fields
            .iter()
            .filter(|field| !field_expressions(field).into_iter().all(is_literal))
            .count();
        let buffer = (computed > MAX_INLINE_FIELDS).then(|| self.temporary("{}"));
        let fields = self.lower_table_fields(fields, buffer.as_deref());

        let mut atoms: Vec<&str> = fields
            .iter()
            .flat_map(|(_, atoms)| atoms.iter().map(String::as_str))
            .collect();
        atoms.extend(buffer.as_deref());
        self.release(&atoms);

        let text: Vec<&str> = fields.iter().map(|(text, _)| text.as_str()).collect();
        if text.is_empty() {
            self.temporary("{}")
        } else {
            self.temporary(&format!("{{ {} }}", text.join(", ")))
        }
    }

    /// Field texts, each with the atoms it reads. With a `buffer`, every
    /// computed value is stored in it as soon as it is known, so a large
    /// constructor holds one temporary rather than one per field.
    fn lower_table_fields(
        &mut self,
        fields: &[TableField],
        buffer: Option<&str>,
    ) -> Vec<(String, Vec<String>)> {
        let expressions: Vec<Vec<&Expression>> = fields.iter().map(field_expressions).collect();
        let mut follows = vec![false; fields.len()];
        for i in (0..fields.len().saturating_sub(1)).rev() {
            follows[i] = follows[i + 1] || expressions[i + 1].iter().any(|e| contains_call(e));
        }

        let count = fields.len();
        let mut slots = 0usize;
        let mut out = Vec::with_capacity(count);
        for (i, (field, call_follows)) in fields.iter().zip(follows).enumerate() {
            let mut park = |l: &mut Self, expr: &Expression, call_follows: bool| {
                let atom = l.lower_value(expr);
                let Some(buffer) = buffer else {
                    return l.pin(atom, expr, call_follows, false);
                };
                if is_literal(expr) {
                    return atom;
                }
                slots += 1;
                l.release(&[atom.as_str()]);
                l.line(&format!("{}[{}] = {}", buffer, slots, atom));
                format!("{}[{}]", buffer, slots)
            };
            let (text, atoms) = match field {
                // evaluated by the constructor itself, after every other field
                TableField::Positional(value) if i + 1 == count => {
                    (self.lower_multi(value), Vec::new())
                }
                TableField::Positional(value) => {
                    let value = park(self, value, call_follows);
                    (value.clone(), vec![value])
                }
                TableField::Named { name, value } => {
                    let value = park(self, value, call_follows);
                    (format!("{} = {}", name, value), vec![value])
                }
                TableField::Keyed { key, value } => {
                    // a local key is read when the field is stored, after its value
                    let (key, value) = if is_local_name(&self.locals, key) {
                        let value = park(self, value, call_follows);
                        (park(self, key, call_follows), value)
                    } else {
                        let key = park(self, key, call_follows || contains_call(value));
                        (key, park(self, value, call_follows))
                    };
                    (format!("{} = {}", bracketed(&key), value), vec![key, value])
                }
            };
            out.push((text, atoms));
        }
        out
    }
}

fn parameter_list(function: &FunctionBody) -> String {
    let mut params = function.params.clone();
    if function.is_vararg {
        params.push("...".to_string());
    }
    params.join(", ")
}

fn is_name(text: &str) -> bool {
    let mut bytes = text.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && !crate::names::is_keyword(text)
}

fn bracketed(key: &str) -> String {
    if key.starts_with('[') {
        format!("[ {} ]", key)
    } else {
        format!("[{}]", key)
    }
}

fn index_text(base: &str, key: &str) -> String {
    format!("{}{}", base, bracketed(key))
}

/// Whether `expr` refers to any of `names`, nested functions included.
fn mentions_any(expr: &Expression, names: &[String]) -> bool {
    fn visit(node: NodeRef<'_>, names: &[String]) -> bool {
        if let NodeRef::Expression(Expression::Identifier(name)) = node {
            if names.contains(name) {
                return true;
            }
        }
        children(node).into_iter().any(|(_, child)| visit(child, names))
    }
    visit(NodeRef::Expression(expr), names)
}

/// The expression under any parentheses.
fn unparenthesized(mut expr: &Expression) -> &Expression {
    while let Expression::Paren(inner) = expr {
        expr = inner.as_ref();
    }
    expr
}

fn is_literal(expr: &Expression) -> bool {
    matches!(
        unparenthesized(expr),
        Expression::Nil
            | Expression::True
            | Expression::False
            | Expression::Number(_)
            | Expression::String(_)
    )
}

fn is_local_name(locals: &ScopeTracker, expr: &Expression) -> bool {
    matches!(unparenthesized(expr), Expression::Identifier(name) if locals.is_bound(name))
}

fn field_expressions(field: &TableField) -> Vec<&Expression> {
    match field {
        TableField::Positional(value) | TableField::Named { value, .. } => vec![value],
        TableField::Keyed { key, value } => vec![key, value],
    }
}

/// Whether evaluating `expr` may call a function. Bodies of function
/// expressions do not run when the expression is evaluated.
fn contains_call(expr: &Expression) -> bool {
    fn visit(node: NodeRef<'_>) -> bool {
        match node {
            NodeRef::Expression(Expression::Call { .. } | Expression::MethodCall { .. }) => true,
            NodeRef::Expression(Expression::Function(_)) => false,
            _ => children(node).into_iter().any(|(_, child)| visit(child)),
        }
    }
    visit(NodeRef::Expression(expr))
}

/// For each element, whether a later element may call a function.
fn calls_after(expressions: &[&Expression]) -> Vec<bool> {
    let mut follows = vec![false; expressions.len()];
    for i in (0..expressions.len().saturating_sub(1)).rev() {
        follows[i] = follows[i + 1] || contains_call(expressions[i + 1]);
    }
    follows
}
