//! Integrity check prepended to the program.
//!
//! The check installs a line hook and expects every line event to report
//! the same line, which only holds when the whole program sits on a single
//! line. It also checks that a few core functions are still C functions.
//! On failure the program spins forever instead of running.

use super::{reparse, ObfuscationPass, PassContext};
use crate::ast::*;
use crate::config::OutputFormat;
use crate::error::Result;
use tracing::warn;

const STAGE: &str = "anti-tamper";

const CHECK: &str = r#"
local intact = true
local sethook = debug and debug.sethook or function() end
local first_line = nil
local ticks = 0
local function tick()
    ticks = ticks + 1
end
sethook(function(_, line)
    if not line then
        return
    end
    tick()
    if first_line then
        if first_line ~= line then
            sethook(error, "l", 5)
        end
    else
        first_line = line
    end
end, "l", 5)
tick()
tick()
sethook()
if ticks < 2 then
    intact = false
end
if debug and debug.getinfo and debug.getupvalue then
    local natives = { pcall, string.char, debug.getinfo, string.dump }
    for i = 1, #natives do
        local native = natives[i]
        if debug.getinfo(native).what ~= "C" then
            intact = false
        end
        if debug.getupvalue(native, 1) then
            intact = false
        end
        if pcall(string.dump, native) then
            intact = false
        end
    end
end
if not intact then
    while true do
    end
end
"#;

pub struct AntiTamperPass {
    output_format: OutputFormat,
}

impl AntiTamperPass {
    pub fn new(output_format: OutputFormat) -> Self {
        Self { output_format }
    }
}

impl ObfuscationPass for AntiTamperPass {
    fn name(&self) -> &'static str {
        "anti-tamper"
    }

    fn description(&self) -> &'static str {
        "Adding anti-tamper check"
    }

    fn run(&mut self, block: Block, _ctx: &mut PassContext) -> Result<Block> {
        if self.output_format == OutputFormat::Readable {
            warn!("anti-tamper needs minified output, skipping it");
            return Ok(block);
        }
        let mut body = reparse(STAGE, CHECK.to_string())?;
        body.extend(block);
        Ok(vec![Statement::Do { body }])
    }
}
