//! The obfuscation driver: parses a program, runs the enabled passes in
//! their fixed order and emits the result.

use crate::ast::Block;
use crate::codegen::emit_block;
use crate::config::ObfuscatorConfig;
use crate::error::Result;
use crate::names::NameGenerator;
use crate::parser::parse;
use crate::passes::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

pub struct Obfuscator {
    config: ObfuscatorConfig,
}

impl Obfuscator {
    pub fn new(config: ObfuscatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ObfuscatorConfig {
        &self.config
    }

    /// Obfuscate Lua source text.
    pub fn obfuscate(&self, source: &str) -> Result<String> {
        let block = parse(source)?;
        let block = self.obfuscate_block(block)?;
        Ok(emit_block(&block, self.config.output_format))
    }

    /// Run the enabled passes over an already parsed program.
    pub fn obfuscate_block(&self, block: Block) -> Result<Block> {
        self.config.validate()?;
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut ctx = PassContext::new(rng, NameGenerator::avoiding_names_in(&block));

        let mut block = block;
        for mut pass in self.passes() {
            info!("{}", pass.description());
            block = pass.run(block, &mut ctx)?;
            debug!(pass = pass.name(), statements = block.len(), "pass finished");
        }
        Ok(block)
    }

    /// Enabled passes, in the order they must run.
    pub fn passes(&self) -> Vec<Box<dyn ObfuscationPass>> {
        let enabled = &self.config.passes;
        let mut passes: Vec<Box<dyn ObfuscationPass>> = Vec::new();
        if enabled.anti_tamper {
            passes.push(Box::new(AntiTamperPass::new(self.config.output_format)));
        }
        if enabled.hide_globals {
            passes.push(Box::new(GlobalIndirectionPass::new()));
        }
        if enabled.encrypt_strings {
            passes.push(Box::new(StringCipherPass::new(self.config.string_percentage)));
        }
        if enabled.lower_expressions {
            passes.push(Box::new(ExpressionLoweringPass::new()));
        }
        if enabled.control_flow {
            passes.push(Box::new(ControlFlowFlatteningPass::new()));
        }
        if enabled.mangle_numbers {
            passes.push(Box::new(NumberManglingPass::new(self.config.number_percentage)));
        }
        if enabled.mangle_bools {
            passes.push(Box::new(BoolManglingPass::new(self.config.bool_percentage)));
        }
        if enabled.rename_variables {
            passes.push(Box::new(VariableRenamingPass::new()));
        }
        passes
    }
}

impl Default for Obfuscator {
    fn default() -> Self {
        Self::new(ObfuscatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputFormat, PassConfig};
    use crate::error::ObfuscateError;

    #[test]
    fn test_pass_order_matches_config_names() {
        let names: Vec<_> = Obfuscator::default()
            .passes()
            .iter()
            .map(|pass| pass.name())
            .collect();
        assert_eq!(names, PassConfig::NAMES.to_vec());
    }

    #[test]
    fn test_disabled_passes_are_skipped() {
        let mut passes = PassConfig::none();
        passes.set("control-flow", true).unwrap();
        let obfuscator = Obfuscator::new(ObfuscatorConfig::default().with_passes(passes));
        let names: Vec<_> = obfuscator.passes().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["control-flow"]);
    }

    #[test]
    fn test_seed_makes_output_reproducible() {
        let config = ObfuscatorConfig::default().with_seed(1234);
        let source = "local function f(a) return a * 2, 'x' end return f(21)";
        let first = Obfuscator::new(config.clone()).obfuscate(source).unwrap();
        let second = Obfuscator::new(config).obfuscate(source).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_passes_is_a_reformat() {
        let config = ObfuscatorConfig::default()
            .with_passes(PassConfig::none())
            .with_output_format(OutputFormat::Readable);
        let output = Obfuscator::new(config).obfuscate("local   x=1\nreturn x").unwrap();
        assert_eq!(output, "local x = 1\nreturn x\n");
    }

    #[test]
    fn test_parse_errors_are_reported() {
        let err = Obfuscator::default().obfuscate("local = 1").unwrap_err();
        assert!(matches!(err, ObfuscateError::Parse(_)));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_running() {
        let config = ObfuscatorConfig {
            number_percentage: 101,
            ..ObfuscatorConfig::default()
        };
        let err = Obfuscator::new(config).obfuscate("return 1").unwrap_err();
        assert!(matches!(err, ObfuscateError::Config(_)));
    }
}
