//! Code generation options.

/// Options for the assembler and code generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodegenOptions {
    /// Embed each function's name in its `ENTER` instruction.
    pub include_function_names: bool,
}

impl CodegenOptions {
    pub fn with_function_names(mut self, include: bool) -> Self {
        self.include_function_names = include;
        self
    }
}
