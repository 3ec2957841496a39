//! End-to-end tests running the pyhex binary against scratch projects

use anyhow::{ensure, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run pyhex in `dir`, isolated from any user template directory
fn pyhex(dir: &Path, args: &[&str]) -> Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_pyhex"))
        .args(args)
        .current_dir(dir)
        .env("RUST_LOG", "warn")
        .env("HOME", dir)
        .env_remove("PYHEX_TEMPLATE_DIR")
        .output()
        .context("failed to run the pyhex binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// A scratch directory holding an initialized project with the example domain
fn example_project() -> Result<(TempDir, PathBuf)> {
    let tmp = tempfile::tempdir()?;
    let output = pyhex(tmp.path(), &["init", "shop", "--example", "--skip-install"])?;
    ensure!(output.status.success(), "init failed: {}", stderr(&output));
    let root = tmp.path().join("shop");
    Ok((tmp, root))
}

#[test]
fn test_init_creates_a_generated_project() -> Result<()> {
    let (_tmp, root) = example_project()?;

    for file in [
        "pyproject.toml",
        "pyhex.yaml",
        "app/main.py",
        "app/core/database.py",
        "app/routers.py",
        "tests/conftest.py",
        "app/domain/product/domain.yaml",
        "app/domain/product/entities.py",
        "app/domain/product/interface.py",
    ] {
        assert!(root.join(file).is_file(), "{file} missing");
    }

    let output = pyhex(&root, &["generate", "--no-validate"])?;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(
        stdout(&output).contains("0 written, 8 unchanged, 0 skipped, 0 kept"),
        "{}",
        stdout(&output)
    );
    Ok(())
}

#[test]
fn test_regeneration_keeps_hand_written_code() -> Result<()> {
    let (_tmp, root) = example_project()?;
    let domain = root.join("app/domain/product");

    let entities_path = domain.join("entities.py");
    let entities = fs::read_to_string(&entities_path)?;
    let edited = entities.replacen(
        "    # @pyhex:begin Product.body\n",
        "    # @pyhex:begin Product.body\n    def label(self) -> str:\n        return self.sku\n",
        1,
    );
    assert_ne!(edited, entities);
    fs::write(&entities_path, &edited)?;

    let config_path = domain.join("domain.yaml");
    let config = fs::read_to_string(&config_path)?;
    let attributes = "      - { name: attributes, type: json, required: false }\n";
    assert!(config.contains(attributes));
    fs::write(
        &config_path,
        config.replace(
            attributes,
            &format!("{attributes}      - {{ name: weight, type: float, required: false }}\n"),
        ),
    )?;

    let output = pyhex(&root, &["generate", "product", "--dry-run", "--no-validate"])?;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("written app/domain/product/entities.py"));
    assert!(stdout(&output).contains("Dry run"));
    assert_eq!(fs::read_to_string(&entities_path)?, edited);

    let output = pyhex(&root, &["generate", "product", "--no-validate"])?;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("preserved: Product.body"));
    let regenerated = fs::read_to_string(&entities_path)?;
    assert!(regenerated.contains("weight"));
    assert!(regenerated.contains("        return self.sku\n"));
    Ok(())
}

#[test]
fn test_only_limits_layers() -> Result<()> {
    let (_tmp, root) = example_project()?;
    fs::remove_file(root.join("app/domain/product/repository.py"))?;
    fs::remove_file(root.join("app/domain/product/usecase.py"))?;

    let output = pyhex(&root, &["generate", "--only", "repository", "--no-validate"])?;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(root.join("app/domain/product/repository.py").is_file());
    assert!(!root.join("app/domain/product/usecase.py").exists());
    Ok(())
}

#[test]
fn test_unknown_domain_fails_with_hint() -> Result<()> {
    let (_tmp, root) = example_project()?;
    let output = pyhex(&root, &["generate", "prodct", "--no-validate"])?;
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("unknown domain `prodct`"), "{err}");
    assert!(err.contains("hint: did you mean `product`?"), "{err}");
    Ok(())
}

#[test]
fn test_invalid_configuration_is_reported() -> Result<()> {
    let (_tmp, root) = example_project()?;
    let dir = root.join("app/domain/order");
    fs::create_dir_all(&dir)?;
    fs::copy(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/order/domain.yaml"),
        dir.join("domain.yaml"),
    )?;

    let output = pyhex(&root, &["generate", "order", "--no-validate"])?;
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("domain.entities.Order.mixins"), "{err}");
    assert!(err.contains("Timestamped"), "{err}");
    assert!(!dir.join("entities.py").exists());
    Ok(())
}

#[test]
fn test_generate_outside_a_project() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let output = pyhex(tmp.path(), &["generate"])?;
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no pyhex.yaml found"));
    Ok(())
}

#[test]
fn test_init_refuses_non_empty_directory() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    fs::create_dir(tmp.path().join("shop"))?;
    fs::write(tmp.path().join("shop/notes.txt"), "keep me")?;

    let output = pyhex(tmp.path(), &["init", "shop", "--skip-install"])?;
    assert!(!output.status.success());
    assert!(stderr(&output).contains("directory is not empty"));

    let output = pyhex(tmp.path(), &["init", "shop", "--skip-install", "--yes"])?;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(tmp.path().join("shop/pyproject.toml").is_file());
    assert_eq!(fs::read_to_string(tmp.path().join("shop/notes.txt"))?, "keep me");
    Ok(())
}

#[test]
fn test_docs() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let output = pyhex(tmp.path(), &["docs"])?;
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("# pyhex configuration guide"));

    let (_tmp, root) = example_project()?;
    let output = pyhex(&root, &["docs"])?;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(root.join("docs/index.md").is_file());
    assert!(root.join("docs/product.md").is_file());

    let output = pyhex(&root, &["docs", "--domain", "product"])?;
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).starts_with("# Product"));
    Ok(())
}

#[test]
fn test_generate_json_report() -> Result<()> {
    let (_tmp, root) = example_project()?;
    let output = pyhex(&root, &["generate", "--no-validate", "--json"])?;
    assert!(output.status.success(), "{}", stderr(&output));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let files = report["files"].as_array().context("files array")?;
    assert_eq!(files.len(), 8);
    assert!(files.iter().all(|f| f["action"] == "unchanged"));
    assert_eq!(report["output_issues"].as_array().map(Vec::len), Some(0));
    Ok(())
}
