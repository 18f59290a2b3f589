//! Obfuscation passes. Each pass consumes a block and returns a rewritten,
//! behaviourally equivalent block.

pub mod anti_tamper;
pub mod bool_mangling;
pub mod control_flow_flattening;
pub mod expression_lowering;
pub mod global_indirection;
pub mod number_mangling;
pub mod string_cipher;
pub mod variable_renaming;

pub use anti_tamper::AntiTamperPass;
pub use bool_mangling::BoolManglingPass;
pub use control_flow_flattening::ControlFlowFlatteningPass;
pub use expression_lowering::ExpressionLoweringPass;
pub use global_indirection::GlobalIndirectionPass;
pub use number_mangling::NumberManglingPass;
pub use string_cipher::StringCipherPass;
pub use variable_renaming::VariableRenamingPass;

use crate::ast::Block;
use crate::error::{ObfuscateError, Result};
use crate::names::NameGenerator;
use crate::parser::parse;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// State shared by all passes of one pipeline run.
pub struct PassContext {
    pub rng: StdRng,
    pub names: NameGenerator,
}

impl PassContext {
    pub fn new(rng: StdRng, names: NameGenerator) -> Self {
        Self { rng, names }
    }

    /// A fresh identifier, distinct from every program name.
    pub fn fresh_name(&mut self) -> String {
        self.names.fresh(&mut self.rng)
    }

    /// A random `percentage`% of `items` (rounded up), in random order.
    pub fn sample<T>(&mut self, mut items: Vec<T>, percentage: u8) -> Vec<T> {
        let wanted = (items.len() * usize::from(percentage.min(100))).div_ceil(100);
        items.shuffle(&mut self.rng);
        items.truncate(wanted);
        items
    }
}

pub trait ObfuscationPass {
    /// Configuration name of the pass, e.g. `control-flow`.
    fn name(&self) -> &'static str;

    /// Progress message logged when the pass starts.
    fn description(&self) -> &'static str;

    fn run(&mut self, block: Block, ctx: &mut PassContext) -> Result<Block>;
}

/// Parse text generated by a pass. A failure is a defect in that pass.
pub(crate) fn reparse(stage: &'static str, text: String) -> Result<Block> {
    match parse(&text) {
        Ok(block) => Ok(block),
        Err(source) => Err(ObfuscateError::Reparse {
            stage,
            text,
            source,
        }),
    }
}
