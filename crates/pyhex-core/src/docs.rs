//! Markdown documentation of domains.

// Internal imports (std, crate)
use std::path::{Path, PathBuf};

use crate::builders::DomainContext;
use crate::error::Result;
use crate::generate::{DomainSummary, Generator};
use crate::schema::MergedConfig;
use crate::templates::{TemplateManager, USAGE_GUIDE};

// External imports (alphabetized)
use serde_json::{json, Value as JsonValue};
use tokio::fs;

const DOMAIN_TEMPLATE: &str = "docs/domain.md.tera";
const INDEX_TEMPLATE: &str = "docs/index.md.tera";

/// The configuration guide
pub fn usage_guide() -> &'static str {
    USAGE_GUIDE
}

/// Markdown page of one domain: entities, endpoints, rules and repository
pub fn render_domain_docs(
    templates: &TemplateManager,
    config: &MergedConfig,
    package: &str,
) -> Result<String> {
    let context = DomainContext::build(templates.template_kind(), config, package)?;
    templates.render(DOMAIN_TEMPLATE, &context)
}

fn array_len(context: &JsonValue, pointer: &str) -> usize {
    context
        .pointer(pointer)
        .and_then(JsonValue::as_array)
        .map_or(0, Vec::len)
}

async fn domain_page(generator: &Generator, domain: &DomainSummary) -> Result<(String, JsonValue)> {
    let config = generator.check_domain(&domain.dir).await?;
    let templates = generator.templates();
    let page = render_domain_docs(templates, &config, &domain.package)?;
    let context = DomainContext::build(templates.template_kind(), &config, &domain.package)?;
    let entry = json!({
        "pascal": context["domain"]["pascal"],
        "description": context["domain"]["description"],
        "file": format!("{}.md", domain.snake),
        "entities": array_len(&context, "/entities"),
        "endpoints": array_len(&context, "/interface/endpoints"),
    });
    Ok((page, entry))
}

/// Markdown page of the domain named `name`
pub async fn domain_docs(generator: &Generator, name: &str) -> Result<String> {
    let domains = generator.domains().await?;
    let domain = domains
        .iter()
        .find(|d| d.name == name || d.snake == name)
        .ok_or_else(|| {
            let mut message = format!("unknown domain `{name}`");
            if let Some(hint) =
                crate::utils::did_you_mean(name, domains.iter().map(|d| d.snake.as_str()))
            {
                message.push_str(&format!("; {hint}"));
            }
            crate::Error::generation(message)
        })?;
    Ok(domain_page(generator, domain).await?.0)
}

/// Write `<domain>.md` for every domain and an `index.md` into `out_dir`
pub async fn write_project_docs(generator: &Generator, out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir).await?;
    let mut written = Vec::new();
    let mut entries = Vec::new();

    for domain in generator.domains().await? {
        let (page, entry) = domain_page(generator, &domain).await?;
        let path = out_dir.join(format!("{}.md", domain.snake));
        fs::write(&path, page).await?;
        log::debug!("Wrote {}", path.display());
        written.push(path);
        entries.push(entry);
    }

    let index = generator.templates().render(
        INDEX_TEMPLATE,
        &json!({
            "project_name": generator.config().project_name,
            "pyhex_version": env!("CARGO_PKG_VERSION"),
            "domains": entries,
        }),
    )?;
    let path = out_dir.join("index.md");
    fs::write(&path, index).await?;
    written.push(path);

    log::info!("Wrote {} documentation file(s) to {}", written.len(), out_dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::templates::{TemplateKind, EXAMPLE_DOMAIN};
    use tempfile::tempdir;

    async fn generator(root: &Path) -> (tempfile::TempDir, Generator) {
        let empty = tempdir().unwrap();
        let templates =
            TemplateManager::new(TemplateKind::FastapiSqlmodel, Some(empty.path().to_path_buf()))
                .await
                .unwrap();
        (empty, Generator::new(root, Config::new("shop"), templates))
    }

    #[test]
    fn test_usage_guide() {
        let guide = usage_guide();
        assert!(guide.starts_with("# pyhex configuration guide"));
        assert!(guide.contains("_replace"));
        assert!(guide.contains("@pyhex:begin"));
    }

    #[tokio::test]
    async fn test_write_project_docs() {
        let root = tempdir().unwrap();
        let dir = root.path().join("app/domain/product");
        fs::create_dir_all(&dir).await.unwrap();
        for (file, content) in EXAMPLE_DOMAIN {
            fs::write(dir.join(file), content).await.unwrap();
        }
        let (_empty, generator) = generator(root.path()).await;

        let out = root.path().join("docs");
        let written = write_project_docs(&generator, &out).await.unwrap();
        assert_eq!(written, vec![out.join("product.md"), out.join("index.md")]);

        let page = fs::read_to_string(out.join("product.md")).await.unwrap();
        assert!(page.starts_with("# Product\n"));
        assert!(page.contains("### Category"));
        assert!(page.contains("| `sku` |"));
        assert!(page.contains("## Endpoints"));

        let index = fs::read_to_string(out.join("index.md")).await.unwrap();
        assert!(index.starts_with("# shop\n"));
        assert!(index.contains("| [Product](product.md) | Product catalog with categories | 2 |"));

        assert_eq!(domain_docs(&generator, "product").await.unwrap(), page);
        let err = domain_docs(&generator, "prodct").await.unwrap_err();
        assert!(err.to_string().contains("did you mean `product`?"));
    }
}
