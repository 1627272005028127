//! Corgi CLI library
//!
//! This module contains the core CLI logic of the corgi template compiler:
//! compile a main file or every library below a directory and write the
//! resulting manifests.

pub mod error_adapter;

mod args;
mod config;

pub use args::Args;

use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use log::{info, warn};

use corgi::{
    Compiler, CorgiError, Diagnostic, config::CompilerConfig, library_dirs, manifest::Manifest,
};

use error_adapter::{DiagnosticAdapter, Reportable, render};

/// Run the corgi CLI application
///
/// A file input is compiled as a main file; an input of the form `dir/...`
/// compiles every library directory below `dir`. The manifests are written
/// as TOML to the output file, or to stdout without one.
///
/// # Arguments
///
/// * `args` - Command-line arguments
///
/// # Errors
///
/// Returns `CorgiError` for:
/// - File I/O errors
/// - Configuration loading errors
/// - Parse, link, analysis and validation errors
/// - Inputs that do not exist
pub fn run(args: &Args) -> Result<(), CorgiError> {
    info!(
        input_path = args.input,
        output_path:? = args.output;
        "Processing input"
    );

    let config = config::load_config(args.config.as_ref())?;

    let manifests = match args.library_root() {
        Some(dir) => compile_libraries(config, args, Path::new(dir))?,
        None => vec![compile_file(config, args)?],
    };

    let mut output = String::new();
    for (i, manifest) in manifests.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        output.push_str(&manifest.to_toml()?);
    }

    match &args.output {
        Some(path) => {
            fs::write(path, output)?;
            info!(output_file = path; "Manifest written");
        }
        None => io::stdout().lock().write_all(output.as_bytes())?,
    }

    Ok(())
}

fn compile_file(config: CompilerConfig, args: &Args) -> Result<Manifest, CorgiError> {
    let path = Path::new(&args.input);
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let config = config::with_roots(config, &args.roots, dir)?;

    let compilation = Compiler::new(config).compile(path)?;
    report_warnings(compilation.warnings());
    Ok(compilation.manifest(args.package.clone()))
}

fn compile_libraries(
    config: CompilerConfig,
    args: &Args,
    root: &Path,
) -> Result<Vec<Manifest>, CorgiError> {
    let config = config::with_roots(config, &args.roots, root)?;
    let compiler = Compiler::new(config);

    let dirs = library_dirs(root)?;
    if dirs.is_empty() {
        return Err(CorgiError::NotFound(root.display().to_string()));
    }
    info!(root = root.display().to_string(), libraries = dirs.len(); "Compiling libraries");

    let mut manifests = Vec::with_capacity(dirs.len());
    for dir in &dirs {
        let compilation = compiler.compile_library(dir)?;
        report_warnings(compilation.warnings());
        let manifest = compilation.manifest();
        manifests.push(match &args.package {
            Some(package) => manifest.with_package(package.as_str()),
            None => manifest,
        });
    }
    Ok(manifests)
}

fn report_warnings(warnings: &[Diagnostic]) {
    for warning in warnings {
        let reportable = Reportable::Diagnostic(DiagnosticAdapter::new(warning));
        warn!("{}", render(&reportable));
    }
}
