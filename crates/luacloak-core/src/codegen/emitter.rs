use crate::config::OutputFormat;

/// Emitter handles all code generation output operations.
/// In minified mode line breaks collapse into single spaces, inserted lazily
/// so the output never ends in a separator.
pub struct Emitter {
    pub output: String,
    indent_level: usize,
    indent_str: &'static str,
    output_format: OutputFormat,
    pending_separator: bool,
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            indent_level: 0,
            indent_str: "    ",
            output_format: OutputFormat::Readable,
            pending_separator: false,
        }
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self.indent_str = match format {
            OutputFormat::Minified => "",
            OutputFormat::Readable => "    ",
        };
        self
    }

    pub fn write(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        if self.pending_separator {
            self.output.push(' ');
            self.pending_separator = false;
        }
        self.output.push_str(s);
    }

    pub fn writeln(&mut self, s: &str) {
        self.write(s);
        match self.output_format {
            OutputFormat::Minified => self.pending_separator = !self.output.is_empty(),
            OutputFormat::Readable => self.output.push('\n'),
        }
    }

    pub fn indent(&mut self) {
        if !self.is_minified() {
            self.indent_level += 1;
        }
    }

    pub fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    pub fn write_indent(&mut self) {
        if self.is_minified() {
            return;
        }
        for _ in 0..self.indent_level {
            self.output.push_str(self.indent_str);
        }
    }

    /// Current length of the output, for later [`Emitter::insert_at`].
    pub fn position(&self) -> usize {
        self.output.len()
    }

    /// The byte written at `position`, if any.
    pub fn byte_at(&self, position: usize) -> Option<u8> {
        self.output.as_bytes().get(position).copied()
    }

    pub fn insert_at(&mut self, position: usize, s: &str) {
        self.output.insert_str(position, s);
    }

    pub fn is_minified(&self) -> bool {
        matches!(self.output_format, OutputFormat::Minified)
    }

    pub fn take_output(&mut self) -> String {
        self.pending_separator = false;
        std::mem::take(&mut self.output)
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}
