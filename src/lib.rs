//! Toolchain for compiled game scripts.
//!
//! This crate ties the workspace together:
//!
//! - [`core`]: identity hashes, script values, diagnostics and errors
//! - [`registry`]: the type registry
//! - [`compiler`]: checker, code generator, assembler and disassembler
//! - [`container`]: container codec and key store
//!
//! [`compile`] runs the whole pipeline from a parsed script to container
//! bytes, and [`inspect`] turns container bytes back into a text listing.
//!
//! ```
//! use sctools::compiler::ast::{FunctionDecl, Item, Script};
//! use sctools::container::{Magic, Target};
//! use sctools::{CompileOptions, compile, inspect};
//! use sctools::compiler::NativeDb;
//!
//! let script = Script {
//!     items: vec![Item::Function(FunctionDecl {
//!         name: "main".into(),
//!         params: vec![],
//!         return_type: None,
//!         body: vec![],
//!         span: Default::default(),
//!     })],
//! };
//!
//! let options = CompileOptions::new(Magic::Gta4Plain);
//! let compiled = compile(&script, &options, None).unwrap();
//! let image = compiled.image.unwrap();
//!
//! let listing = inspect(&image.bytes, Target::Gta4, None, "demo", &NativeDb::new()).unwrap();
//! assert!(listing.contains("main:"));
//! ```

pub use sctools_compiler as compiler;
pub use sctools_container as container;
pub use sctools_core as core;
pub use sctools_registry as registry;

pub use sctools_core::{Diagnostic, Diagnostics, Result, ScToolsError, Severity};

use sctools_compiler::{
    CodegenOptions, FunctionDefinition, Listing, NativeDb, ScriptParts, StaticField, ast,
};
use sctools_container::{AesKey, Container, Magic, Target};
use tracing::debug;

/// Options for [`compile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub magic: Magic,
    pub codegen: CodegenOptions,
    pub globals_signature: u32,
}

impl CompileOptions {
    pub fn new(magic: Magic) -> Self {
        Self {
            magic,
            codegen: CodegenOptions::default(),
            globals_signature: 0,
        }
    }

    pub fn with_function_names(mut self, include: bool) -> Self {
        self.codegen = self.codegen.with_function_names(include);
        self
    }
}

/// Result of [`compile`].
#[derive(Debug, Clone)]
pub struct Compiled {
    pub diagnostics: Diagnostics,
    /// `None` when the checker reported errors.
    pub image: Option<CompiledImage>,
}

#[derive(Debug, Clone)]
pub struct CompiledImage {
    pub container: Container,
    pub bytes: Vec<u8>,
    /// Function names and entry IPs, in emission order.
    pub functions: Vec<(String, usize)>,
}

/// Check, generate, assemble and encode `script`.
///
/// Checker errors are returned as diagnostics with no image. Failures after
/// checking abort with an error.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn compile(
    script: &ast::Script,
    options: &CompileOptions,
    key: Option<&AesKey>,
) -> Result<Compiled> {
    let checked = sctools_compiler::check(script);
    if !checked.is_success() {
        debug!(
            errors = checked.diagnostics.error_count(),
            "not generating code for a script with errors"
        );
        return Ok(Compiled {
            diagnostics: checked.diagnostics,
            image: None,
        });
    }

    let generated = sctools_compiler::generate(&checked.program)?;
    let (container, functions) = build_container(
        generated.functions,
        &generated.statics,
        &generated.globals,
        options,
    )?;
    let bytes = sctools_container::encode(&container, key)?;

    Ok(Compiled {
        diagnostics: checked.diagnostics,
        image: Some(CompiledImage {
            container,
            bytes,
            functions,
        }),
    })
}

/// Assemble functions, statics and globals into a container.
///
/// Also returns the function entry points.
pub fn build_container(
    functions: Vec<FunctionDefinition>,
    statics: &[StaticField],
    globals: &[StaticField],
    options: &CompileOptions,
) -> Result<(Container, Vec<(String, usize)>)> {
    let assembled =
        sctools_compiler::assemble_with_globals(functions, statics, globals, options.codegen)?;

    let mut container = Container::new(options.magic);
    container.code = assembled.code;
    container.statics = assembled.statics;
    container.globals = assembled.globals;
    container.args_count = assembled.args_count;
    container.globals_signature = options.globals_signature;
    Ok((container, assembled.functions))
}

/// Render a container as a text listing.
pub fn listing(container: &Container, name: &str, natives: &NativeDb) -> Result<String> {
    let parts = ScriptParts {
        name,
        code: &container.code,
        statics: &container.statics,
        globals: &container.globals,
        args_count: container.args_count,
        globals_signature: container.globals_signature,
    };
    Ok(Listing::new(parts, natives)?.to_string())
}

/// Decode container bytes and render them as a text listing.
pub fn inspect(
    bytes: &[u8],
    target: Target,
    key: Option<&AesKey>,
    name: &str,
    natives: &NativeDb,
) -> Result<String> {
    let container = sctools_container::decode(bytes, target, key)?;
    listing(&container, name, natives)
}
