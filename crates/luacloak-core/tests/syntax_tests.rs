//! Parser, emitter and scope classification through the public API.

use indoc::indoc;
use luacloak_core::scope::{walk_block, ScopeTracker, ScopeVisitor};
use luacloak_core::{
    emit_block, parse, Expression, Obfuscator, ObfuscatorConfig, OutputFormat, Statement,
};

const CORPUS: &[&str] = &[
    indoc! {r#"
        local a, b = 1, 2.5e3
        local s = "a\tb" .. 'c' .. [==[
        long ]] string]==]
        local t = { 1, two = 2, [3] = "three", [ [[k]] ] = 4; f = function(...) return ... end }
        print(#t, -a, not b, - -a, 2 ^ -3, ~a, a // 2, a & 1 | 2 ~ 3, a << 1 >> 2)
    "#},
    indoc! {r#"
        local obj = {}
        function obj.util.make(x, ...)
            return x
        end
        function obj:method(y)
            return self, y
        end
        obj:method "str"
        obj.call { 1, 2 }
        local v = (obj.util.make(1))
        ;(print)(v)
    "#},
    indoc! {r#"
        for i = 10, 1, -1 do
            if i == 5 then
                break
            elseif i > 8 then
                goto_label = i
            else
                local _ = i
            end
        end
        for k, v in pairs({}) do
        end
        while false do
        end
        repeat
            local done = true
        until done
        do
            return
        end
    "#},
    indoc! {r#"
        local function outer()
            local function inner(n)
                return n > 0 and inner(n - 1) or 0
            end
            return inner
        end
        return outer()(3), a.b.c[d]["e"]:f(g), (("x")):rep(2)
    "#},
];

#[test]
fn test_round_trip_corpus() {
    for source in CORPUS {
        let tree = parse(source).unwrap();
        for format in [OutputFormat::Readable, OutputFormat::Minified] {
            let text = emit_block(&tree, format);
            let reparsed = parse(&text).unwrap_or_else(|e| panic!("{e}\n{text}"));
            assert_eq!(reparsed, tree, "round trip changed the tree:\n{}", text);
        }
    }
}

#[test]
fn test_obfuscated_output_round_trips() {
    for (i, source) in CORPUS.iter().enumerate() {
        let obfuscated = Obfuscator::new(ObfuscatorConfig::default().with_seed(i as u64))
            .obfuscate(source)
            .unwrap();
        let tree = parse(&obfuscated).unwrap();
        let text = emit_block(&tree, OutputFormat::Readable);
        assert_eq!(parse(&text).unwrap(), tree);
    }
}

#[test]
fn test_readable_layout() {
    let tree = parse("local function f(x) if x then return 1 end end").unwrap();
    insta::assert_snapshot!(emit_block(&tree, OutputFormat::Readable), @r"
    local function f(x)
        if x then
            return 1
        end
    end
    ");
}

#[test]
fn test_parse_error_position() {
    let err = parse("local x = 1\nlocal = 2").unwrap_err();
    assert_eq!(err.line, 2);
}

/// Records every identifier with its classification.
#[derive(Default)]
struct Classifier {
    references: Vec<(String, bool)>,
    bindings: Vec<String>,
}

impl ScopeVisitor for Classifier {
    fn visit_reference(&mut self, expr: &mut Expression, bound: bool) {
        if let Expression::Identifier(name) = expr {
            self.references.push((name.clone(), bound));
        }
    }

    fn visit_binding(&mut self, name: &mut String) {
        self.bindings.push(name.clone());
    }
}

fn classify(source: &str) -> Classifier {
    let mut block = parse(source).unwrap();
    let mut classifier = Classifier::default();
    walk_block(&mut classifier, &mut ScopeTracker::new(), &mut block);
    classifier
}

fn bound(classifier: &Classifier, name: &str) -> Vec<bool> {
    classifier
        .references
        .iter()
        .filter(|(n, _)| n == name)
        .map(|(_, b)| *b)
        .collect()
}

#[test]
fn test_scope_classification() {
    let classifier = classify(indoc! {r#"
        local x = x
        print(x)
        local function rec() return rec end
        local f = function(p, ...) return p, q end
        for i = 1, 2 do local j = i end
        repeat local r = 1 until r
        return i, j, r
    "#});

    // the initializer sees the global, later uses see the local
    assert_eq!(bound(&classifier, "x"), vec![false, true]);
    assert_eq!(bound(&classifier, "print"), vec![false]);
    assert_eq!(bound(&classifier, "rec"), vec![true]);
    assert_eq!(bound(&classifier, "p"), vec![true]);
    assert_eq!(bound(&classifier, "q"), vec![false]);
    // loop variables end with the loop; the repeat condition sees the body
    assert_eq!(bound(&classifier, "i"), vec![true, false]);
    assert_eq!(bound(&classifier, "j"), vec![false]);
    assert_eq!(bound(&classifier, "r"), vec![true, false]);
    assert_eq!(
        classifier.bindings,
        vec!["x", "rec", "p", "f", "i", "j", "r"]
    );
}

#[test]
fn test_parameter_bound_global_free() {
    let classifier = classify("function f(p) local q = p + g end");
    assert_eq!(
        classifier.references,
        vec![("p".to_string(), true), ("g".to_string(), false)]
    );
    assert_eq!(classifier.bindings, vec!["p", "q"]);
}

#[test]
fn test_tracker_shadowing() {
    let mut scope = ScopeTracker::new();
    assert!(!scope.is_bound("a"));
    scope.push();
    scope.declare("a");
    scope.push();
    scope.declare("a");
    scope.pop();
    assert!(scope.is_bound("a"));
    scope.pop();
    assert!(!scope.is_bound("a"));
    assert_eq!(scope.depth(), 1);
}

#[test]
fn test_function_statements_are_statements() {
    let tree = parse("function a.b:c() end").unwrap();
    assert!(matches!(tree[0], Statement::Function { .. }));
}
