//! Checks of the generated Python code.
//!
//! Syntax is checked with the interpreter's own parser (`ast.parse`) when a
//! Python interpreter is available, and with a structural scan (brackets,
//! string literals, block indentation) otherwise. Imports of project
//! modules are resolved against the files on disk.

// Internal imports (std, crate)
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

// External imports (alphabetized)
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::process::Command;

/// Upper bound for one interpreter run
pub const SYNTAX_TIMEOUT: Duration = Duration::from_secs(30);

const AST_CHECK: &str = r#"
import ast, sys
path = sys.argv[1]
try:
    ast.parse(open(path, encoding="utf-8").read(), path)
except SyntaxError as e:
    print(f"{e.lineno or 0}:{e.msg}")
    sys.exit(1)
"#;

static FROM_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*from\s+(\.*)([A-Za-z_][\w.]*)?\s+import\b").unwrap());
static PLAIN_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*import\s+([A-Za-z_][\w.]*)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputIssueKind {
    Syntax,
    Import,
}

impl OutputIssueKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax error",
            Self::Import => "unresolved import",
        }
    }
}

/// A problem found in a generated file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputIssue {
    pub path: PathBuf,
    pub line: Option<usize>,
    pub kind: OutputIssueKind,
    pub message: String,
}

impl fmt::Display for OutputIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl OutputIssue {
    fn syntax(path: &Path, line: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            line,
            kind: OutputIssueKind::Syntax,
            message: message.into(),
        }
    }
}

/// Check the syntax of `file` with `python`, falling back to
/// [`structural_check`] when the interpreter cannot be run
pub async fn check_syntax(file: &Path, python: &str) -> Result<Option<OutputIssue>> {
    let run = Command::new(python)
        .arg("-c")
        .arg(AST_CHECK)
        .arg(file)
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(SYNTAX_TIMEOUT, run).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("`{python}` not found, using the structural syntax check");
            return structural_file_check(file).await;
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            log::warn!(
                "`{python}` did not finish within {}s, using the structural syntax check",
                SYNTAX_TIMEOUT.as_secs()
            );
            return structural_file_check(file).await;
        }
    };

    if output.status.success() {
        return Ok(None);
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let issue = match stdout.trim().split_once(':') {
        Some((line, message)) if line.parse::<usize>().is_ok() => OutputIssue::syntax(
            file,
            line.parse::<usize>().ok().filter(|l| *l > 0),
            message.trim(),
        ),
        _ => OutputIssue::syntax(
            file,
            None,
            format!(
                "`{python}` failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ),
    };
    Ok(Some(issue))
}

async fn structural_file_check(file: &Path) -> Result<Option<OutputIssue>> {
    let source = tokio::fs::read_to_string(file).await?;
    Ok(structural_check(&source).map(|(line, message)| OutputIssue::syntax(file, Some(line), message)))
}

/// Interpreter-free syntax scan: balanced brackets, terminated string
/// literals, consistent indentation and an indented block after every
/// line ending with `:`.
///
/// Returns the 1-based line and a message for the first problem found.
pub fn structural_check(source: &str) -> Option<(usize, String)> {
    let chars: Vec<char> = source.chars().collect();
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut line = 1;
    let mut i = 0;
    let mut at_line_start = true;
    let mut continued = false;
    let mut indent = 0;
    let mut last_significant: Option<char> = None;
    // Line and indentation of the last statement ending with `:`
    let mut expect_block: Option<(usize, usize)> = None;

    while i < chars.len() {
        if at_line_start {
            at_line_start = false;
            let start = i;
            while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
                i += 1;
            }
            let prefix = &chars[start..i];
            let blank = i >= chars.len() || matches!(chars[i], '\n' | '\r' | '#');
            if !blank && brackets.is_empty() && !continued {
                if prefix.contains(&' ') && prefix.contains(&'\t') {
                    return Some((line, "inconsistent use of tabs and spaces in indentation".into()));
                }
                indent = prefix.len();
                if let Some((block_line, block_indent)) = expect_block.take() {
                    if indent <= block_indent {
                        return Some((
                            line,
                            format!("expected an indented block after line {block_line}"),
                        ));
                    }
                }
            }
            continued = false;
            continue;
        }

        let c = chars[i];
        match c {
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '"' | '\'' => {
                let start_line = line;
                let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                if triple {
                    i += 3;
                    loop {
                        match chars.get(i) {
                            None => {
                                return Some((start_line, "unterminated triple-quoted string".into()))
                            }
                            Some('\\') => {
                                if chars.get(i + 1) == Some(&'\n') {
                                    line += 1;
                                }
                                i += 2;
                            }
                            Some('\n') => {
                                line += 1;
                                i += 1;
                            }
                            Some(q)
                                if *q == c
                                    && chars.get(i + 1) == Some(&c)
                                    && chars.get(i + 2) == Some(&c) =>
                            {
                                i += 3;
                                break;
                            }
                            Some(_) => i += 1,
                        }
                    }
                } else {
                    i += 1;
                    loop {
                        match chars.get(i) {
                            None | Some('\n') => {
                                return Some((start_line, "unterminated string literal".into()))
                            }
                            Some('\\') => {
                                if chars.get(i + 1) == Some(&'\n') {
                                    line += 1;
                                }
                                i += 2;
                            }
                            Some(q) if *q == c => {
                                i += 1;
                                break;
                            }
                            Some(_) => i += 1,
                        }
                    }
                }
                last_significant = Some(c);
                continue;
            }
            '(' | '[' | '{' => brackets.push((c, line)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match brackets.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, open_line)) => {
                        return Some((
                            line,
                            format!("closing `{c}` does not match `{open}` on line {open_line}"),
                        ))
                    }
                    None => return Some((line, format!("unmatched `{c}`"))),
                }
            }
            '\\' if chars.get(i + 1) == Some(&'\n') => {
                continued = true;
                at_line_start = true;
                line += 1;
                i += 2;
                continue;
            }
            '\n' => {
                if brackets.is_empty() {
                    if last_significant == Some(':') {
                        expect_block = Some((line, indent));
                    }
                    last_significant = None;
                }
                line += 1;
                at_line_start = true;
                i += 1;
                continue;
            }
            _ => {}
        }
        if !c.is_whitespace() {
            last_significant = Some(c);
        }
        i += 1;
    }

    if let Some((open, open_line)) = brackets.last() {
        return Some((*open_line, format!("`{open}` is never closed")));
    }
    if last_significant == Some(':') {
        return Some((line, format!("expected an indented block after line {line}")));
    }
    if let Some((block_line, _)) = expect_block {
        return Some((block_line, format!("expected an indented block after line {block_line}")));
    }
    None
}

/// Module file of a dotted module path below `base`, if it exists
fn resolve_module(base: &Path, module: &str) -> bool {
    let relative: PathBuf = module.split('.').collect();
    base.join(&relative).with_extension("py").is_file()
        || base.join(&relative).join("__init__.py").is_file()
}

/// Check that every import of a project module resolves to a file.
///
/// Absolute imports are checked only when their top-level package is a
/// directory of `project_root`; everything else is a third-party import.
/// Relative imports are resolved from the directory of `file`.
pub async fn check_imports(file: &Path, project_root: &Path) -> Result<Vec<OutputIssue>> {
    let source = tokio::fs::read_to_string(file).await?;
    let file_dir = file.parent().unwrap_or(Path::new("."));
    let mut issues = Vec::new();

    for (index, text) in source.lines().enumerate() {
        let (dots, module) = if let Some(caps) = FROM_IMPORT.captures(text) {
            (
                caps.get(1).map_or(0, |m| m.as_str().len()),
                caps.get(2).map(|m| m.as_str().to_string()),
            )
        } else if let Some(caps) = PLAIN_IMPORT.captures(text) {
            (0, Some(caps[1].to_string()))
        } else {
            continue;
        };

        let resolved = if dots > 0 {
            let mut base = file_dir.to_path_buf();
            for _ in 1..dots {
                base = base.parent().map(Path::to_path_buf).unwrap_or(base);
            }
            match &module {
                Some(module) => resolve_module(&base, module),
                None => base.join("__init__.py").is_file() || base.is_dir(),
            }
        } else {
            let Some(module) = &module else { continue };
            let top = module.split('.').next().unwrap_or(module);
            if !project_root.join(top).is_dir() {
                continue;
            }
            resolve_module(project_root, module)
        };

        if !resolved {
            let shown = format!("{}{}", ".".repeat(dots), module.as_deref().unwrap_or(""));
            issues.push(OutputIssue {
                path: file.to_path_buf(),
                line: Some(index + 1),
                kind: OutputIssueKind::Import,
                message: format!("cannot resolve import of `{shown}`"),
            });
        }
    }
    Ok(issues)
}

/// Check syntax and imports of every Python file in `files`
pub async fn validate_output(
    files: &[PathBuf],
    project_root: &Path,
    python: &str,
) -> Result<Vec<OutputIssue>> {
    let mut issues = Vec::new();
    for file in files
        .iter()
        .filter(|f| f.extension().and_then(|e| e.to_str()) == Some("py"))
    {
        log::debug!("Validating {}", file.display());
        if let Some(issue) = check_syntax(file, python).await? {
            issues.push(issue);
            continue;
        }
        issues.extend(check_imports(file, project_root).await?);
    }
    for issue in &issues {
        log::warn!("{issue}");
    }
    Ok(issues)
}
