//! `@pyhex` preservation markers.
//!
//! Generated files contain named regions delimited by
//! `# @pyhex:begin <name>` and `# @pyhex:end <name>` comments. On
//! regeneration the body of every region is carried over from the file on
//! disk into the freshly rendered text, so hand-written code placed inside a
//! region survives. Regions that no longer exist in the rendered text are
//! appended, commented out, at the end of the file.

// Internal imports (std, crate)
use crate::error::{Error, Result};

/// First line of every generated file starts with this
pub const GENERATED_HEADER: &str = "# Generated by pyhex";
/// A file carrying this marker near the top is never overwritten
pub const KEEP_MARKER: &str = "# @pyhex:keep";
/// Name prefix of regions kept after they disappeared from the templates
pub const ORPHANED_PREFIX: &str = "orphaned.";

const BEGIN_MARKER: &str = "# @pyhex:begin";
const END_MARKER: &str = "# @pyhex:end";
/// Lines searched for the header and the keep marker
const HEADER_LINES: usize = 5;

/// One marker-delimited region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    /// Text between the markers, line endings included
    pub body: String,
    /// 1-based line of the begin marker
    pub line: usize,
}

impl Region {
    fn has_code(&self) -> bool {
        !self.body.trim().is_empty()
    }
}

/// Regions of a file, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Regions {
    regions: Vec<Region>,
}

impl Regions {
    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Result of [`splice`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spliced {
    pub content: String,
    /// Regions whose non-empty body was carried over
    pub preserved: Vec<String>,
    /// Regions newly moved to the orphaned block
    pub orphaned: Vec<String>,
}

enum Marker<'a> {
    Begin(&'a str),
    End(&'a str),
}

fn parse_marker(line: &str) -> Option<Marker<'_>> {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix(BEGIN_MARKER) {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return Some(Marker::Begin(rest.trim()));
        }
    }
    if let Some(rest) = trimmed.strip_prefix(END_MARKER) {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return Some(Marker::End(rest.trim()));
        }
    }
    None
}

/// Extract every region of `text`.
///
/// Fails on nested, unclosed, mismatched, unnamed or duplicate regions; the
/// message names the offending line.
pub fn extract_regions(text: &str) -> Result<Regions> {
    let mut regions: Vec<Region> = Vec::new();
    let mut open: Option<(String, usize, String)> = None;

    for (index, line) in text.split_inclusive('\n').enumerate() {
        let number = index + 1;
        match (parse_marker(line), open.as_mut()) {
            (Some(Marker::Begin("")), _) => {
                return Err(Error::preserve(format!(
                    "line {number}: `@pyhex:begin` needs a region name"
                )));
            }
            (Some(Marker::Begin(name)), Some((outer, outer_line, _))) => {
                return Err(Error::preserve(format!(
                    "line {number}: region `{name}` starts inside region `{outer}` (line {outer_line}); regions cannot be nested"
                )));
            }
            (Some(Marker::Begin(name)), None) => {
                if let Some(previous) = regions.iter().find(|r| r.name == name) {
                    return Err(Error::preserve(format!(
                        "line {number}: duplicate region `{name}` (first defined on line {})",
                        previous.line
                    )));
                }
                open = Some((name.to_string(), number, String::new()));
            }
            (Some(Marker::End(name)), None) => {
                return Err(Error::preserve(format!(
                    "line {number}: `@pyhex:end {name}` has no matching begin marker"
                )));
            }
            (Some(Marker::End(name)), Some((outer, outer_line, _))) => {
                if !name.is_empty() && name != outer {
                    return Err(Error::preserve(format!(
                        "line {number}: `@pyhex:end {name}` closes region `{outer}` opened on line {outer_line}"
                    )));
                }
                if let Some((name, line, body)) = open.take() {
                    regions.push(Region { name, body, line });
                }
            }
            (None, Some((_, _, body))) => body.push_str(line),
            (None, None) => {}
        }
    }

    if let Some((name, line, _)) = open {
        return Err(Error::preserve(format!(
            "region `{name}` opened on line {line} is never closed"
        )));
    }
    Ok(Regions { regions })
}

fn header_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().take(HEADER_LINES).map(str::trim)
}

/// Whether `text` was produced by pyhex
pub fn is_generated(text: &str) -> bool {
    header_lines(text).any(|line| line.starts_with(GENERATED_HEADER))
}

/// Whether `text` opts out of regeneration
pub fn is_kept(text: &str) -> bool {
    header_lines(text).any(|line| line == KEEP_MARKER)
}

/// Carry the region bodies of `existing` into `rendered`.
///
/// Both texts are checked for well-formed markers first. Regions of
/// `existing` missing from `rendered` are appended in an orphaned block,
/// commented out; regions that were already orphaned stay as they are.
pub fn splice(rendered: &str, existing: &str) -> Result<Spliced> {
    extract_regions(rendered)
        .map_err(|e| Error::preserve(format!("rendered output: {}", strip_prefix(&e))))?;
    let old = extract_regions(existing)?;

    let mut content = String::with_capacity(rendered.len() + existing.len() / 4);
    let mut preserved = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    let mut skipping = false;

    for line in rendered.split_inclusive('\n') {
        match parse_marker(line) {
            Some(Marker::Begin(name)) => {
                content.push_str(line);
                if let Some(region) = old.get(name) {
                    content.push_str(&region.body);
                    if region.has_code() {
                        preserved.push(region.name.clone());
                    }
                    skipping = true;
                }
                seen.push(name);
            }
            Some(Marker::End(_)) => {
                skipping = false;
                content.push_str(line);
            }
            None if skipping => {}
            None => content.push_str(line),
        }
    }

    let mut orphaned = Vec::new();
    let leftovers: Vec<&Region> = old
        .iter()
        .filter(|r| !seen.contains(&r.name.as_str()) && r.has_code())
        .collect();
    if !leftovers.is_empty() {
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        // Names already present in the output, so a new orphan never collides
        let mut taken: Vec<String> = seen.iter().map(|name| name.to_string()).collect();
        taken.extend(
            leftovers
                .iter()
                .filter(|r| r.name.starts_with(ORPHANED_PREFIX))
                .map(|r| r.name.clone()),
        );
        for region in leftovers {
            let (name, body) = match region.name.strip_prefix(ORPHANED_PREFIX) {
                Some(_) => (region.name.clone(), region.body.clone()),
                None => {
                    orphaned.push(region.name.clone());
                    let name = free_orphan_name(&region.name, &taken);
                    taken.push(name.clone());
                    (name, comment_out(&region.body))
                }
            };
            content.push('\n');
            content.push_str(&format!("{BEGIN_MARKER} {name}\n"));
            content.push_str(&body);
            if !body.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(&format!("{END_MARKER} {name}\n"));
        }
    }

    Ok(Spliced {
        content,
        preserved,
        orphaned,
    })
}

/// `orphaned.<name>`, or `orphaned.<name>.<n>` when that is in use
fn free_orphan_name(name: &str, taken: &[String]) -> String {
    let base = format!("{ORPHANED_PREFIX}{name}");
    if !taken.contains(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}.{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(base)
}

fn comment_out(body: &str) -> String {
    body.split_inclusive('\n')
        .map(|line| {
            let (text, newline) = match line.strip_suffix('\n') {
                Some(text) => (text, "\n"),
                None => (line, ""),
            };
            if text.trim().is_empty() {
                format!("#{newline}")
            } else {
                format!("# {text}{newline}")
            }
        })
        .collect()
}

fn strip_prefix(error: &Error) -> String {
    match error {
        Error::Preserve(message) => message.clone(),
        other => other.to_string(),
    }
}
