use std::{
    fs,
    path::{Path, PathBuf},
};

use tempfile::tempdir;

use corgi::manifest::Manifest;
use corgi_cli::{Args, run};

/// Demos are at workspace root, relative to workspace not the crate
fn demos_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("demos")
}

/// Collects all .corgi files from a directory
fn collect_corgi_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = if let Ok(entries) = fs::read_dir(dir) {
        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("corgi")
            })
            .collect()
    } else {
        Vec::new()
    };

    // Sort for consistent test output
    files.sort();
    files
}

fn args(input: String, output: &Path, roots: Vec<PathBuf>) -> Args {
    Args {
        input,
        output: Some(output.to_string_lossy().to_string()),
        package: Some("views".to_string()),
        config: None,
        log_level: "off".to_string(),
        roots,
    }
}

#[test]
fn e2e_smoke_test_valid_pages() {
    let temp_dir = tempdir().expect("Failed to create temp directory");

    let site = demos_path().join("site");
    let pages = collect_corgi_files(&site.join("pages"));

    assert!(!pages.is_empty(), "No pages found in demos/site/pages/");

    let mut failed_pages = Vec::new();

    for page in &pages {
        let output_path = temp_dir
            .path()
            .join(format!("{}.toml", page.file_stem().unwrap().to_string_lossy()));

        let args = args(
            page.to_string_lossy().to_string(),
            &output_path,
            vec![site.clone()],
        );

        match run(&args) {
            Ok(()) => {
                let manifest = Manifest::from_toml(&fs::read_to_string(&output_path).unwrap())
                    .expect("Failed to read manifest");
                assert_eq!(manifest.package.as_deref(), Some("views"));
                assert!(manifest.func.is_some(), "{}", page.display());
            }
            Err(e) => failed_pages.push((page.clone(), e)),
        }
    }

    if !failed_pages.is_empty() {
        eprintln!("\nValid pages that failed:");
        for (path, err) in &failed_pages {
            eprintln!("  - {}: {}", path.display(), err);
        }
        panic!("{} valid page(s) failed unexpectedly", failed_pages.len());
    }

    println!("✅ All {} valid pages passed", pages.len());
}

#[test]
fn e2e_smoke_test_libraries() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let output_path = temp_dir.path().join("libraries.toml");

    let site = demos_path().join("site");
    let args = args(
        format!("{}/...", site.display()),
        &output_path,
        Vec::new(),
    );

    run(&args).expect("Failed to compile libraries");

    let manifest = Manifest::from_toml(&fs::read_to_string(&output_path).unwrap())
        .expect("Failed to read manifest");
    assert_eq!(manifest.path, "ui");
    assert!(manifest.mixin("Card").unwrap().info.has_and_placeholders);
    assert!(manifest.mixin("Badge").is_some());
}

#[test]
fn e2e_smoke_test_error_examples() {
    let temp_dir = tempdir().expect("Failed to create temp directory");

    let error_examples = collect_corgi_files(&demos_path().join("errors"));

    assert!(
        !error_examples.is_empty(),
        "No error examples found in demos/errors/"
    );

    let mut unexpectedly_succeeded = Vec::new();

    for example_path in &error_examples {
        let output_path = temp_dir.path().join(format!(
            "error_{}.toml",
            example_path.file_stem().unwrap().to_string_lossy()
        ));

        let args = args(
            example_path.to_string_lossy().to_string(),
            &output_path,
            Vec::new(),
        );

        if run(&args).is_ok() {
            unexpectedly_succeeded.push(example_path.clone());
        }
    }

    if !unexpectedly_succeeded.is_empty() {
        eprintln!("\nError examples that unexpectedly succeeded:");
        for path in &unexpectedly_succeeded {
            eprintln!("  - {}", path.display());
        }
        panic!(
            "{} error example(s) succeeded unexpectedly",
            unexpectedly_succeeded.len()
        );
    }

    println!(
        "✅ All {} error examples failed as expected",
        error_examples.len()
    );
}

#[test]
fn e2e_missing_input() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let output_path = temp_dir.path().join("out.toml");

    let args = args(
        temp_dir.path().join("nope.corgi").to_string_lossy().to_string(),
        &output_path,
        Vec::new(),
    );

    assert!(run(&args).is_err());
    assert!(!output_path.exists());
}
