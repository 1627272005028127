//! Command-line argument definitions for the corgi CLI.
//!
//! This module defines the [`Args`] structure parsed from the command line
//! using [`clap`]. Arguments select what to compile, where the manifest goes,
//! the configuration file and logging verbosity.

use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for the corgi template compiler
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the main file, or `dir/...` to compile every library below `dir`
    #[arg(help = "Path to the input file, or dir/... for libraries")]
    pub input: String,

    /// Path to the output manifest; stdout if omitted
    #[arg(short, long)]
    pub output: Option<String>,

    /// Package the generated code is placed in
    #[arg(short, long)]
    pub package: Option<String>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Root directory to resolve paths against; may be repeated
    #[arg(long = "root")]
    pub roots: Vec<PathBuf>,
}

impl Args {
    /// The directory to scan when the input is `dir/...`.
    pub fn library_root(&self) -> Option<&str> {
        if self.input == "..." {
            return Some(".");
        }
        self.input
            .strip_suffix("/...")
            .map(|dir| if dir.is_empty() { "/" } else { dir })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(input: &str) -> Args {
        Args::parse_from(["corgi", input])
    }

    #[test]
    fn test_defaults() {
        let args = args("index.corgi");
        assert_eq!(args.input, "index.corgi");
        assert_eq!(args.log_level, "info");
        assert!(args.output.is_none());
        assert!(args.roots.is_empty());
    }

    #[test]
    fn test_repeated_roots() {
        let args = Args::parse_from([
            "corgi",
            "index.corgi",
            "--root",
            "templates",
            "--root",
            "vendor",
            "-p",
            "views",
        ]);
        assert_eq!(
            args.roots,
            vec![PathBuf::from("templates"), PathBuf::from("vendor")]
        );
        assert_eq!(args.package.as_deref(), Some("views"));
    }

    #[test]
    fn test_library_root() {
        assert_eq!(args("./...").library_root(), Some("."));
        assert_eq!(args("...").library_root(), Some("."));
        assert_eq!(args("templates/ui/...").library_root(), Some("templates/ui"));
        assert_eq!(args("index.corgi").library_root(), None);
    }
}
