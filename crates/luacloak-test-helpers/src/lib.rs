//! Test helpers shared by the luacloak crates.
//!
//! [`LuaExecutor`] runs Lua 5.4 code through mlua and captures what it
//! printed and returned; the [`obfuscate`] module wraps the pipeline with
//! fixed seeds so behavioural tests are reproducible.

pub mod lua_executor;
pub mod obfuscate;

pub use lua_executor::{LuaExecutor, LuaValueExt, Outcome};
pub use obfuscate::{assert_equivalent, obfuscate_seeded, obfuscate_with};
