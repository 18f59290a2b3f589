//! Obfuscation helpers for tests
//!
//! Thin wrappers over [`Obfuscator`] with fixed seeds, plus a check that an
//! obfuscated program behaves exactly like its original.

use crate::lua_executor::{LuaExecutor, Outcome};
use luacloak_core::{Obfuscator, ObfuscatorConfig};

/// Obfuscate with an explicit configuration.
///
/// # Returns
/// The obfuscated Lua code or an error message
pub fn obfuscate_with(source: &str, config: ObfuscatorConfig) -> Result<String, String> {
    Obfuscator::new(config)
        .obfuscate(source)
        .map_err(|e| format!("Obfuscation failed: {e}"))
}

/// Obfuscate with every pass enabled and a fixed seed.
pub fn obfuscate_seeded(source: &str, seed: u64) -> Result<String, String> {
    obfuscate_with(source, ObfuscatorConfig::default().with_seed(seed))
}

/// Run `source` and its obfuscation under `config`, panicking with both
/// texts when their outcomes differ. Returns the shared outcome.
pub fn assert_equivalent(source: &str, config: ObfuscatorConfig) -> Outcome {
    let obfuscated = match obfuscate_with(source, config) {
        Ok(text) => text,
        Err(e) => panic!("{e}\nsource:\n{source}"),
    };
    let expected = run_fresh(source);
    let actual = run_fresh(&obfuscated);
    assert_eq!(
        expected, actual,
        "obfuscated program behaves differently\nsource:\n{source}\nobfuscated:\n{obfuscated}"
    );
    match expected {
        Ok(outcome) => outcome,
        Err(e) => panic!("source program failed: {e}"),
    }
}

fn run_fresh(code: &str) -> Result<Outcome, String> {
    LuaExecutor::new()?.run(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use luacloak_core::{OutputFormat, PassConfig};

    #[test]
    fn test_obfuscate_seeded_is_reproducible() {
        let source = "local greeting = 'hi' print(greeting) return #greeting";
        assert_eq!(
            obfuscate_seeded(source, 7).unwrap(),
            obfuscate_seeded(source, 7).unwrap()
        );
    }

    #[test]
    fn test_obfuscate_with_reports_parse_errors() {
        let err = obfuscate_with("local = ", ObfuscatorConfig::default()).unwrap_err();
        assert!(err.starts_with("Obfuscation failed"), "{}", err);
    }

    #[test]
    fn test_assert_equivalent_returns_outcome() {
        let config = ObfuscatorConfig::default()
            .with_passes(PassConfig::none())
            .with_output_format(OutputFormat::Readable);
        let outcome = assert_equivalent("print('x') return 1 + 1", config);
        assert_eq!(outcome.printed, vec!["x"]);
        assert_eq!(outcome.returned, vec!["2"]);
    }
}
