//! Reader and writer for the Homebrew formula DSL subset keg understands.

use lazy_static::lazy_static;
use regex::Regex;

use super::{Formula, FormulaTest};
use crate::installer::InstallStrategy;
use crate::{KegError, Result};

lazy_static! {
    static ref CLASS_LINE: Regex =
        Regex::new(r"^\s*class\s+([A-Z][A-Za-z0-9_]*)\s*<\s*Formula\b").unwrap();
    static ref STRING_FIELD: Regex =
        Regex::new(r#"^\s*(desc|homepage|url|version|sha256|license)\s+"((?:[^"\\]|\\.)*)"\s*$"#).unwrap();
    static ref DEPENDS_ON: Regex =
        Regex::new(r#"^\s*depends_on\s+"([^"]+)"\s*(=>\s*:(\w+))?\s*$"#).unwrap();
    static ref ASSERT_MATCH: Regex = Regex::new(
        r#"assert_match\s+"((?:[^"\\]|\\.)*)"\s*,\s*shell_output\(\s*"((?:[^"\\]|\\.)*)"\s*(?:,\s*(-?\d+))?\s*\)"#
    )
    .unwrap();
    static ref BLOCK_START: Regex = Regex::new(r"^(\s*)(def\s+install|test\s+do)\s*$").unwrap();
    static ref CLASS_NAME: Regex = Regex::new(r"^[A-Z][A-Za-z0-9_]*$").unwrap();
}

/// `PolarCli` -> `polar-cli`
fn class_to_name(class: &str) -> String {
    let mut name = String::with_capacity(class.len() + 4);
    for (i, c) in class.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                name.push('-');
            }
            name.push(c.to_ascii_lowercase());
        } else if c == '_' {
            name.push('-');
        } else {
            name.push(c);
        }
    }
    name
}

/// `polar-cli` -> `PolarCli`
fn name_to_class(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
}

/// Collect the lines of a block opened at `start` up to its `end` at the same indentation
fn block_body<'a>(lines: &[&'a str], start: usize, indent: &str) -> Result<(Vec<&'a str>, usize)> {
    let closing = format!("{}end", indent);
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        if line.trim_end() == closing {
            let end = start + 1 + offset;
            return Ok((lines[start + 1..end].to_vec(), end));
        }
    }
    Err(KegError::invalid_formula(format!(
        "unterminated block starting at line {}",
        start + 1
    )))
}

/// Strip the common leading indentation (spaces and tabs) and surrounding blank lines
fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let body: Vec<&str> = lines
        .iter()
        .map(|l| if l.trim().is_empty() { "" } else { &l[indent..] })
        .collect();

    body.join("\n").trim_matches('\n').to_string()
}

pub(super) fn parse(content: &str) -> Result<Formula> {
    let lines: Vec<&str> = content.lines().collect();

    let mut class_name = None;
    let mut desc = None;
    let mut homepage = None;
    let mut url = None;
    let mut version = None;
    let mut sha256 = None;
    let mut license = None;
    let mut runtime_deps = Vec::new();
    let mut install = None;
    let mut test = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if let Some(caps) = CLASS_LINE.captures(line) {
            class_name = Some(caps[1].to_string());
        } else if let Some(caps) = STRING_FIELD.captures(line) {
            let value = Some(unescape(&caps[2]));
            match &caps[1] {
                "desc" => desc = value,
                "homepage" => homepage = value,
                "url" => url = value,
                "version" => version = value,
                "sha256" => sha256 = value,
                "license" => license = value,
                _ => {}
            }
        } else if let Some(caps) = DEPENDS_ON.captures(line) {
            match caps.get(3).map(|m| m.as_str()) {
                Some("build") | Some("test") => {
                    log::debug!("Ignoring {} dependency {}", &caps[3], &caps[1]);
                }
                _ => runtime_deps.push(caps[1].to_string()),
            }
        } else if let Some(caps) = BLOCK_START.captures(line) {
            let indent = caps[1].to_string();
            let is_install = caps[2].starts_with("def");
            let (body, end) = block_body(&lines, i, &indent)?;

            if is_install {
                install = Some(dedent(&body));
            } else {
                let text = body.join("\n");
                let caps = ASSERT_MATCH.captures(&text).ok_or_else(|| {
                    KegError::invalid_formula(
                        "test block must contain assert_match \"...\", shell_output(\"...\")",
                    )
                })?;
                let status = match caps.get(3) {
                    Some(m) => m.as_str().parse().map_err(|_| {
                        KegError::invalid_formula(format!("invalid exit status '{}'", m.as_str()))
                    })?,
                    None => 0,
                };
                test = Some(FormulaTest {
                    command: unescape(&caps[2]),
                    expected: unescape(&caps[1]),
                    status,
                });
            }
            i = end;
        }

        i += 1;
    }

    if runtime_deps.len() > 1 {
        return Err(KegError::invalid_formula(format!(
            "only one runtime dependency is supported, found {}",
            runtime_deps.join(", ")
        )));
    }

    let missing = |field: &str| KegError::invalid_formula(format!("missing {}", field));

    Ok(Formula {
        name: class_to_name(&class_name.ok_or_else(|| missing("`class ... < Formula`"))?),
        desc,
        homepage,
        url: url.ok_or_else(|| missing("url"))?,
        version,
        sha256: sha256.ok_or_else(|| missing("sha256"))?,
        license,
        runtime_dependency: runtime_deps.pop(),
        install: install.ok_or_else(|| missing("install block"))?,
        test: test.ok_or_else(|| missing("test block"))?,
    })
}

pub(super) fn render(formula: &Formula) -> Result<String> {
    let class = name_to_class(&formula.name);
    if !CLASS_NAME.is_match(&class) || class_to_name(&class) != formula.name {
        return Err(KegError::invalid_formula(format!(
            "name '{}' cannot be expressed as a formula class",
            formula.name
        )));
    }

    let mut out = format!("class {} < Formula\n", class);
    if InstallStrategy::parse(&formula.install) == InstallStrategy::Virtualenv {
        out.push_str("  include Language::Python::Virtualenv\n\n");
    }

    let fields = [
        ("desc", formula.desc.as_deref()),
        ("homepage", formula.homepage.as_deref()),
        ("url", Some(formula.url.as_str())),
        ("version", formula.version.as_deref()),
        ("sha256", Some(formula.sha256.as_str())),
        ("license", formula.license.as_deref()),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            out.push_str(&format!("  {} \"{}\"\n", key, escape(value)));
        }
    }

    if let Some(dep) = &formula.runtime_dependency {
        out.push_str(&format!("\n  depends_on \"{}\"\n", escape(dep)));
    }

    out.push_str("\n  def install\n");
    for line in formula.install.lines() {
        if line.trim().is_empty() {
            out.push('\n');
        } else {
            out.push_str(&format!("    {}\n", line));
        }
    }
    out.push_str("  end\n\n");

    let status = if formula.test.status == 0 {
        String::new()
    } else {
        format!(", {}", formula.test.status)
    };
    out.push_str("  test do\n");
    out.push_str(&format!(
        "    assert_match \"{}\", shell_output(\"{}\"{})\n",
        escape(&formula.test.expected),
        escape(&formula.test.command),
        status
    ));
    out.push_str("  end\nend\n");

    Ok(out)
}
