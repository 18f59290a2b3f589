//! Behavioural equivalence: every program in the corpus must print and
//! return exactly the same things before and after obfuscation, for each
//! pass on its own and for the full pipeline in both output formats.

use indoc::indoc;
use luacloak_core::{Obfuscator, ObfuscatorConfig, OutputFormat, PassConfig};
use luacloak_test_helpers::{assert_equivalent, LuaExecutor};

const RECURSION: &str = indoc! {r#"
    local function fib(n)
        if n < 2 then
            return n
        end
        return fib(n - 1) + fib(n - 2)
    end
    local parts = {}
    for i = 1, 10 do
        parts[#parts + 1] = tostring(fib(i))
    end
    print(table.concat(parts, ","))
    return fib(15), #parts
"#};

const OBJECTS: &str = indoc! {r#"
    local Counter = {}
    Counter.__index = Counter
    function Counter.new(start)
        return setmetatable({ value = start or 0 }, Counter)
    end
    function Counter:add(amount)
        self.value = self.value + amount
        return self
    end
    local function make_adder(step)
        return function(x)
            return x + step
        end
    end
    local c = Counter.new(5):add(3):add(2)
    local add2 = make_adder(2)
    print(c.value, add2(40), ("ab"):rep(3))
    return c.value
"#};

const LOOPS: &str = indoc! {r#"
    local total, i = 0, 0
    while true do
        i = i + 1
        if i % 2 == 0 then
            total = total + i
        elseif i % 3 == 0 then
            total = total - 1
        else
            total = total + 0
        end
        if i >= 20 then
            break
        end
    end
    local n = 0
    repeat
        local doubled = n * 2
        n = n + 1
    until doubled >= 10
    local found
    for _, v in ipairs({ 4, 8, 15, 16, 23, 42 }) do
        if v > 15 then
            found = v
            break
        end
    end
    for k = 10, 1, -3 do
        total = total + k
    end
    print(total, n, found)
    return total, n, found
"#};

const VALUES: &str = indoc! {r##"
    counter = 0
    local function bump()
        counter = counter + 1
        return counter
    end
    local function pack(...)
        return select("#", ...), ...
    end
    local function pair()
        return 1, 2
    end
    local a, b = pair()
    local t = { pair() }
    local u = { pair(), 10 }
    local n, x, y = pack(pair())
    local flag = false and bump() or bump()
    local other = nil or (true and bump())
    print(a, b, #t, #u, n, x, y, flag, other, counter)
    return string.format("%d-%s", counter, tostring(flag ~= nil))
"##};

const STRINGS_AND_BITS: &str = indoc! {r#"
    local s = "tab\tquote\"back\\slash\n" .. 'single' .. [[long
    bracket]] .. "\65\066\x43\u{48}" .. "é"
    local empty = ""
    local bits = (0xF0 | 0x0F) ~ 0x3C & 0xFF
    local shifted = 1 << 10 >> 2
    local idiv = 17 // 5
    local fl = 7 / 2
    print(#s, s:upper(), bits, shifted, idiv, fl, #empty)
    return s, -17 % 5, 2 ^ 10, true, not false
"#};

const TREE_WALK: &str = indoc! {r#"
    local log = {}
    local function record(fmt, ...)
        log[#log + 1] = string.format(fmt, ...)
    end
    local function walk(node, depth)
        if not node then
            return 0
        end
        record("%s@%d", node.name, depth)
        local sum = node.value
        for _, child in ipairs(node.children or {}) do
            sum = sum + walk(child, depth + 1)
        end
        return sum
    end
    local tree = {
        name = "root",
        value = 1,
        children = {
            { name = "a", value = 2 },
            { name = "b", value = 3, children = { { name = "c", value = 4 } } },
        },
    }
    local total = walk(tree, 0)
    print(table.concat(log, " "))
    return total, #log
"#};

const CLOSURES: &str = indoc! {r#"
    local makers = {}
    for i = 1, 3 do
        local captured = i * 10
        makers[i] = function()
            captured = captured + 1
            return captured
        end
    end
    local results = {}
    for i = 1, 3 do
        results[#results + 1] = makers[i]()
        results[#results + 1] = makers[i]()
    end
    local x = 1
    do
        local x = x + 1
        results[#results + 1] = x
    end
    results[#results + 1] = x
    print(table.concat(results, " "))
    return #results
"#};

const CORPUS: [(&str, &str); 7] = [
    ("recursion", RECURSION),
    ("objects", OBJECTS),
    ("loops", LOOPS),
    ("values", VALUES),
    ("strings_and_bits", STRINGS_AND_BITS),
    ("tree_walk", TREE_WALK),
    ("closures", CLOSURES),
];

fn single_pass(name: &str, seed: u64) -> ObfuscatorConfig {
    let mut passes = PassConfig::none();
    passes.set(name, true).unwrap();
    ObfuscatorConfig {
        number_percentage: 100,
        bool_percentage: 100,
        string_percentage: 100,
        ..ObfuscatorConfig::default()
    }
    .with_passes(passes)
    .with_seed(seed)
}

#[test]
fn test_each_pass_alone_keeps_behaviour() {
    for name in PassConfig::NAMES {
        for (program, source) in CORPUS {
            for seed in [1, 2] {
                eprintln!("{name} on {program} (seed {seed})");
                assert_equivalent(source, single_pass(name, seed));
            }
        }
    }
}

#[test]
fn test_full_pipeline_minified() {
    for (program, source) in CORPUS {
        for seed in [3, 4, 5] {
            eprintln!("all passes on {program} (seed {seed})");
            assert_equivalent(source, ObfuscatorConfig::default().with_seed(seed));
        }
    }
}

#[test]
fn test_full_pipeline_readable() {
    for (program, source) in CORPUS {
        eprintln!("all passes, readable, on {program}");
        let config = ObfuscatorConfig::default()
            .with_seed(6)
            .with_output_format(OutputFormat::Readable);
        assert_equivalent(source, config);
    }
}

#[test]
fn test_full_pipeline_with_debug_library() {
    // with `debug` present the anti-tamper hook actually runs
    let config = ObfuscatorConfig::default().with_seed(8);
    for (program, source) in CORPUS {
        let obfuscated = Obfuscator::new(config.clone()).obfuscate(source).unwrap();
        let expected = LuaExecutor::new().unwrap().run(source).unwrap();
        let actual = LuaExecutor::with_debug_library().run(&obfuscated);
        assert_eq!(Ok(expected), actual, "{program}:\n{obfuscated}");
    }
}

#[test]
fn test_output_is_single_line_when_minified() {
    for (program, source) in CORPUS {
        let obfuscated = Obfuscator::new(ObfuscatorConfig::default().with_seed(9))
            .obfuscate(source)
            .unwrap();
        assert!(!obfuscated.contains('\n'), "{program}:\n{obfuscated}");
    }
}

#[test]
fn test_obfuscation_hides_names_and_strings() {
    let obfuscated = Obfuscator::new(ObfuscatorConfig::default().with_seed(10))
        .obfuscate(TREE_WALK)
        .unwrap();
    for hidden in ["walk", "record", "children", "root", "string.format", "ipairs"] {
        assert!(!obfuscated.contains(hidden), "{hidden} leaked:\n{obfuscated}");
    }
}

#[test]
fn test_runtime_errors_are_preserved() {
    let source = "local t = nil\nreturn t.field";
    let obfuscated = Obfuscator::new(ObfuscatorConfig::default().with_seed(11))
        .obfuscate(source)
        .unwrap();
    assert!(LuaExecutor::new().unwrap().run(source).is_err());
    assert!(LuaExecutor::new().unwrap().run(&obfuscated).is_err());
}
