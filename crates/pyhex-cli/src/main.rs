//! pyhex CLI entrypoint
//! Parses command-line arguments and dispatches to the core library.

mod watch;

// Internal imports (std, crate)
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

// External imports (alphabetized)
use anyhow::Context;
use clap::Parser;
use pyhex_core::{
    config::Config, docs, init::InitOptions, FileAction, GenerateOptions, GenerationReport,
    Generator, Layer, ProjectInitializer, TemplateKind, TemplateManager,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pyhex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Create a new FastAPI + SQLModel project
    Init {
        /// Project name
        name: String,
        /// Directory to create the project in (default: ./<name>)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Python version for pyproject.toml
        #[arg(long, default_value = "3.11")]
        python_version: String,
        /// Add and generate the example `product` domain
        #[arg(long)]
        example: bool,
        /// Do not run `uv sync`
        #[arg(long)]
        skip_install: bool,
        /// Initialize a directory that is not empty
        #[arg(long)]
        force: bool,
        /// Answer yes to every prompt
        #[arg(short, long)]
        yes: bool,
        /// Custom template directory
        #[arg(long)]
        template_dir: Option<PathBuf>,
    },
    /// Generate domain modules from their YAML configuration
    Generate {
        /// Domains to generate (default: all)
        domains: Vec<String>,
        /// Project directory (default: the nearest directory with a pyhex.yaml)
        #[arg(long)]
        project: Option<PathBuf>,
        /// Only render the files of these layers
        #[arg(long, value_enum, value_delimiter = ',')]
        only: Vec<Layer>,
        /// Overwrite files that were not generated by pyhex
        #[arg(long)]
        force: bool,
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
        /// Skip the syntax and import check of generated files
        #[arg(long)]
        no_validate: bool,
        /// Custom template directory
        #[arg(long)]
        template_dir: Option<PathBuf>,
        /// Regenerate whenever a YAML or template file changes
        #[arg(long)]
        watch: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write Markdown documentation of the domains, or print the configuration guide
    Docs {
        /// Project directory (default: the nearest directory with a pyhex.yaml)
        #[arg(long)]
        project: Option<PathBuf>,
        /// Document a single domain
        #[arg(long)]
        domain: Option<String>,
        /// Output directory (default: <project>/docs; stdout for --domain)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,pyhex={level},pyhex_core={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli.command).await {
        eprintln!("error: {err:#}");
        if let Some(hint) = err
            .downcast_ref::<pyhex_core::Error>()
            .and_then(pyhex_core::Error::suggestion)
        {
            eprintln!("  hint: {hint}");
        }
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init {
            name,
            path,
            python_version,
            example,
            skip_install,
            force,
            yes,
            template_dir,
        } => {
            let root = path.unwrap_or_else(|| PathBuf::from(&name));
            let force = force || confirm_non_empty(&root, yes)?;
            let templates = TemplateManager::new(TemplateKind::FastapiSqlmodel, template_dir)
                .await
                .context("Failed to initialize template manager")?;
            let options = InitOptions {
                python_version,
                example,
                install: !skip_install,
                force,
            };
            let report = ProjectInitializer::new(&name, &root, templates, options)
                .run()
                .await
                .with_context(|| format!("Failed to initialize project in {}", root.display()))?;

            println!("Created project `{name}` in {}", report.root.display());
            for file in &report.files {
                println!("  {}", relative(file, &report.root).display());
            }
            print_report(&report.generation, &report.root);
            println!();
            println!("Next steps:");
            println!("  cd {}", root.display());
            if !report.installed {
                println!("  uv sync");
            }
            if !example {
                println!("  mkdir -p app/domain/<name> && $EDITOR app/domain/<name>/domain.yaml");
            }
            println!("  pyhex generate");
            println!("  uv run uvicorn app.main:app --reload");
            Ok(())
        }
        Commands::Generate {
            domains,
            project,
            only,
            force,
            dry_run,
            no_validate,
            template_dir,
            watch,
            json,
        } => {
            let (root, config) = find_project(project.as_deref()).await?;
            let options = GenerateOptions {
                force,
                dry_run,
                only,
                validate_output: config.validate_output && !no_validate,
                python: config.python.clone(),
                run_hooks: true,
            };

            if watch {
                return watch::watch(root, config, template_dir, domains, options).await;
            }

            let report =
                generate_once(&root, &config, template_dir, &domains, &options, json).await?;
            if !report.output_issues.is_empty() {
                anyhow::bail!(
                    "generated code has {} issue(s)",
                    report.output_issues.len()
                );
            }
            Ok(())
        }
        Commands::Docs {
            project,
            domain,
            output,
        } => {
            let found = match &project {
                Some(dir) => Some(find_project(Some(dir.as_path())).await?),
                None => Config::discover(".").await?,
            };
            let Some((root, config)) = found else {
                print!("{}", docs::usage_guide());
                return Ok(());
            };
            let generator = Generator::from_config(&root, config, None)
                .await
                .context("Failed to initialize template manager")?;

            if let Some(domain) = domain {
                let page = docs::domain_docs(&generator, &domain).await?;
                match output {
                    Some(dir) => {
                        tokio::fs::create_dir_all(&dir).await?;
                        let path = dir.join(format!("{domain}.md"));
                        tokio::fs::write(&path, page)
                            .await
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        println!("Wrote {}", path.display());
                    }
                    None => print!("{page}"),
                }
                return Ok(());
            }

            let out_dir = output.unwrap_or_else(|| root.join("docs"));
            for path in docs::write_project_docs(&generator, &out_dir).await? {
                println!("Wrote {}", path.display());
            }
            Ok(())
        }
    }
}

/// Ask before initializing a non-empty directory; `Ok(true)` means go ahead
fn confirm_non_empty(root: &Path, yes: bool) -> anyhow::Result<bool> {
    let non_empty = std::fs::read_dir(root)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);
    if !non_empty {
        return Ok(false);
    }
    if yes {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Ok(false);
    }
    let answer = dialoguer::Confirm::new()
        .with_prompt(format!(
            "{} is not empty. Initialize a project there anyway?",
            root.display()
        ))
        .default(false)
        .interact()
        .context("Failed to read confirmation")?;
    if !answer {
        anyhow::bail!("aborted");
    }
    Ok(true)
}

/// Project root and configuration from `--project` or the working directory
async fn find_project(project: Option<&Path>) -> anyhow::Result<(PathBuf, Config)> {
    let start = project.unwrap_or(Path::new("."));
    Config::discover(start)
        .await
        .with_context(|| format!("Failed to read the project configuration from {}", start.display()))?
        .with_context(|| {
            format!(
                "no pyhex.yaml found in {} or its parents; run `pyhex init` first",
                start.display()
            )
        })
}

pub(crate) async fn generate_once(
    root: &Path,
    config: &Config,
    template_dir: Option<PathBuf>,
    domains: &[String],
    options: &GenerateOptions,
    json: bool,
) -> anyhow::Result<GenerationReport> {
    let generator = Generator::from_config(root, config.clone(), template_dir)
        .await
        .context("Failed to initialize template manager")?;
    let report = generator.generate(domains, options).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report);
    }
    print_report(&report, root);
    if options.dry_run {
        println!("Dry run: nothing was written");
    }
    Ok(report)
}

fn print_report(report: &GenerationReport, root: &Path) {
    for file in &report.files {
        if file.action == FileAction::Unchanged && file.orphaned.is_empty() {
            continue;
        }
        println!("{:>9} {}", file.action, relative(&file.path, root).display());
        if !file.preserved.is_empty() {
            println!("          preserved: {}", file.preserved.join(", "));
        }
        if !file.orphaned.is_empty() {
            println!("          orphaned: {}", file.orphaned.join(", "));
        }
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    for issue in &report.output_issues {
        println!("  {}: {issue}", issue.kind.label());
    }
    println!("{}", report.summary());
}

fn relative<'a>(path: &'a Path, root: &Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}
