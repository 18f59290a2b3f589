//! Lua code execution helpers for testing obfuscated code
//!
//! This module runs Lua source through an embedded Lua 5.4 interpreter and
//! captures what the program printed and returned, so an original program
//! and its obfuscated form can be compared value for value.
//!
//! Note: The Lua version is determined at compile-time by mlua features
//! (Lua 5.4, vendored, via the workspace mlua dependency).

use mlua::{FromLua, Lua, LuaOptions, MultiValue, StdLib, Table, Value};

/// Global table the replacement `print` appends to.
const CAPTURE_TABLE: &str = "__luacloak_printed";

const CAPTURE_PRINT: &str = r##"
__luacloak_printed = {}
print = function(...)
    local parts = {}
    for i = 1, select("#", ...) do
        parts[i] = tostring((select(i, ...)))
    end
    __luacloak_printed[#__luacloak_printed + 1] = table.concat(parts, "\t")
end
"##;

/// What a program printed and returned, rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome {
    /// One entry per `print` call, arguments joined by tabs.
    pub printed: Vec<String>,
    /// Returned values, rendered by [`render`].
    pub returned: Vec<String>,
}

/// Executor for running Lua code in tests
pub struct LuaExecutor {
    lua: Lua,
}

impl LuaExecutor {
    /// Creates a new Lua executor with the safe standard libraries
    ///
    /// # Errors
    ///
    /// Returns an error if Lua initialization fails
    pub fn new() -> Result<Self, String> {
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())
            .map_err(|e| format!("Failed to create Lua instance: {e}"))?;

        Ok(Self { lua })
    }

    /// Creates an executor that also loads the `debug` library.
    ///
    /// The anti-tamper check only does real work when `debug.sethook` is
    /// available.
    pub fn with_debug_library() -> Self {
        // SAFETY: the debug library is only used by trusted test programs.
        let lua = unsafe { Lua::unsafe_new_with(StdLib::ALL_SAFE | StdLib::DEBUG, LuaOptions::default()) };
        Self { lua }
    }

    /// Executes Lua code without returning a value
    ///
    /// # Errors
    ///
    /// Returns an error if the code fails to execute
    pub fn execute(&self, code: &str) -> Result<(), String> {
        self.lua
            .load(code)
            .exec()
            .map_err(|e| format!("Lua execution failed: {e}"))
    }

    /// Executes Lua code and retrieves a global variable
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails or the variable cannot be converted
    ///
    /// # Example
    ///
    /// ```ignore
    /// let executor = LuaExecutor::new()?;
    /// let result: i64 = executor.execute_and_get("x = 42", "x")?;
    /// assert_eq!(result, 42);
    /// ```
    pub fn execute_and_get<T: FromLua>(&self, code: &str, var_name: &str) -> Result<T, String> {
        self.execute(code)?;

        self.lua
            .globals()
            .get(var_name)
            .map_err(|e| format!("Failed to get variable '{var_name}': {e}"))
    }

    /// Executes Lua code and returns its (first) result
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails or the result cannot be converted
    pub fn execute_with_result<T: FromLua>(&self, code: &str) -> Result<T, String> {
        self.lua
            .load(code)
            .eval()
            .map_err(|e| format!("Lua execution failed: {e}"))
    }

    /// Checks if the code executes successfully (ignores result)
    pub fn execute_ok(&self, code: &str) -> bool {
        self.execute(code).is_ok()
    }

    /// Runs a whole program, capturing its `print` output and return values.
    ///
    /// `print` is replaced for the duration of the run; each call records
    /// one line.
    ///
    /// # Errors
    ///
    /// Returns an error if the program raises one
    pub fn run(&self, code: &str) -> Result<Outcome, String> {
        self.execute(CAPTURE_PRINT)?;
        let values: MultiValue = self
            .lua
            .load(code)
            .eval()
            .map_err(|e| format!("Lua execution failed: {e}"))?;

        let printed: Table = self
            .lua
            .globals()
            .get(CAPTURE_TABLE)
            .map_err(|e| format!("print capture missing: {e}"))?;
        let printed = printed
            .sequence_values::<String>()
            .collect::<mlua::Result<Vec<_>>>()
            .map_err(|e| format!("print capture unreadable: {e}"))?;

        Ok(Outcome {
            printed,
            returned: values.iter().map(render).collect(),
        })
    }

    /// Gets access to the underlying mlua::Lua instance for advanced usage
    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}

/// Text form of a value that is stable across runs.
///
/// Reference types render as their type name, since their addresses differ
/// between interpreters.
pub fn render(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => format!("{n:?}"),
        Value::String(s) => format!("{:?}", s.to_string_lossy()),
        other => other.type_name().to_string(),
    }
}

/// Extension trait for convenient value extraction from mlua::Value
pub trait LuaValueExt {
    fn as_i64(&self) -> Option<i64>;

    fn as_f64(&self) -> Option<f64>;

    fn as_string(&self) -> Option<String>;

    fn as_bool(&self) -> Option<bool>;
}

impl LuaValueExt for Value {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    fn as_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.to_string_lossy()),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}
