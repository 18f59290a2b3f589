use crate::error::ObfuscateError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Indented, one statement per line.
    Readable,
    /// Everything on a single line.
    #[default]
    Minified,
}

/// Which passes run. Every pass is on unless switched off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PassConfig {
    pub anti_tamper: bool,
    pub hide_globals: bool,
    pub encrypt_strings: bool,
    pub lower_expressions: bool,
    pub control_flow: bool,
    pub mangle_numbers: bool,
    pub mangle_bools: bool,
    pub rename_variables: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            anti_tamper: true,
            hide_globals: true,
            encrypt_strings: true,
            lower_expressions: true,
            control_flow: true,
            mangle_numbers: true,
            mangle_bools: true,
            rename_variables: true,
        }
    }
}

impl PassConfig {
    /// Names accepted by [`PassConfig::set`], in pipeline order.
    pub const NAMES: [&'static str; 8] = [
        "anti-tamper",
        "hide-globals",
        "encrypt-strings",
        "lower-expressions",
        "control-flow",
        "mangle-numbers",
        "mangle-bools",
        "rename-variables",
    ];

    /// All passes off.
    pub fn none() -> Self {
        Self {
            anti_tamper: false,
            hide_globals: false,
            encrypt_strings: false,
            lower_expressions: false,
            control_flow: false,
            mangle_numbers: false,
            mangle_bools: false,
            rename_variables: false,
        }
    }

    /// Switch a pass on or off by its configuration name.
    pub fn set(&mut self, name: &str, enabled: bool) -> Result<(), ObfuscateError> {
        let flag = match name {
            "anti-tamper" => &mut self.anti_tamper,
            "hide-globals" => &mut self.hide_globals,
            "encrypt-strings" => &mut self.encrypt_strings,
            "lower-expressions" => &mut self.lower_expressions,
            "control-flow" => &mut self.control_flow,
            "mangle-numbers" => &mut self.mangle_numbers,
            "mangle-bools" => &mut self.mangle_bools,
            "rename-variables" => &mut self.rename_variables,
            other => {
                return Err(ObfuscateError::Config(format!(
                    "unknown pass '{}' (expected one of: {})",
                    other,
                    Self::NAMES.join(", ")
                )))
            }
        };
        *flag = enabled;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ObfuscatorConfig {
    pub output_format: OutputFormat,
    /// Fixed RNG seed; `None` draws one from the OS.
    pub seed: Option<u64>,
    pub passes: PassConfig,
    /// Share of integer literals rewritten, 0 to 100.
    pub number_percentage: u8,
    /// Share of boolean literals rewritten, 0 to 100.
    pub bool_percentage: u8,
    /// Share of string literals enciphered, 0 to 100.
    pub string_percentage: u8,
}

impl Default for ObfuscatorConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Minified,
            seed: None,
            passes: PassConfig::default(),
            number_percentage: 75,
            bool_percentage: 80,
            string_percentage: 100,
        }
    }
}

impl ObfuscatorConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ObfuscateError> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| ObfuscateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ObfuscateError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ObfuscateError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), ObfuscateError> {
        let percentages = [
            ("number-percentage", self.number_percentage),
            ("bool-percentage", self.bool_percentage),
            ("string-percentage", self.string_percentage),
        ];
        for (name, value) in percentages {
            if value > 100 {
                return Err(ObfuscateError::Config(format!(
                    "{} must be between 0 and 100, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_passes(mut self, passes: PassConfig) -> Self {
        self.passes = passes;
        self
    }
}
