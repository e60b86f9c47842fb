//! Reading and writing formula declarations.

use std::path::Path;

use super::{ruby, Formula};
use crate::{KegError, Result};

/// On-disk declaration formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaFormat {
    Ruby,
    Toml,
    Json,
}

impl FormulaFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "rb" => Some(FormulaFormat::Ruby),
            "toml" => Some(FormulaFormat::Toml),
            "json" => Some(FormulaFormat::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FormulaFormat::Ruby => "rb",
            FormulaFormat::Toml => "toml",
            FormulaFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for FormulaFormat {
    type Err = KegError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "rb" | "ruby" => Ok(FormulaFormat::Ruby),
            "toml" => Ok(FormulaFormat::Toml),
            "json" => Ok(FormulaFormat::Json),
            other => Err(KegError::invalid_formula(format!("unknown formula format '{}'", other))),
        }
    }
}

pub struct FormulaLoader;

impl FormulaLoader {
    /// Read, parse and validate a formula file, picking the format from its extension
    pub fn load(path: &Path) -> Result<Formula> {
        let format = FormulaFormat::from_path(path).ok_or_else(|| {
            KegError::invalid_formula(format!(
                "{}: expected a .rb, .toml or .json formula",
                path.display()
            ))
        })?;

        log::debug!("Reading formula {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            KegError::invalid_formula(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::parse(&content, format)
            .map_err(|e| match e {
                KegError::InvalidFormula { message } => {
                    KegError::invalid_formula(format!("{}: {}", path.display(), message))
                }
                other => other,
            })
    }

    /// Parse and validate formula text
    pub fn parse(content: &str, format: FormulaFormat) -> Result<Formula> {
        let formula = match format {
            FormulaFormat::Ruby => ruby::parse(content)?,
            FormulaFormat::Toml => toml::from_str(content)
                .map_err(|e| KegError::invalid_formula(format!("invalid TOML: {}", e)))?,
            FormulaFormat::Json => serde_json::from_str(content)
                .map_err(|e| KegError::invalid_formula(format!("invalid JSON: {}", e)))?,
        };

        formula.validate()?;
        Ok(formula)
    }

    /// Render a formula in the requested format
    pub fn render(formula: &Formula, format: FormulaFormat) -> Result<String> {
        match format {
            FormulaFormat::Ruby => ruby::render(formula),
            FormulaFormat::Toml => toml::to_string_pretty(formula)
                .map_err(|e| KegError::invalid_formula(format!("cannot render TOML: {}", e))),
            FormulaFormat::Json => serde_json::to_string_pretty(formula)
                .map(|json| json + "\n")
                .map_err(|e| KegError::invalid_formula(format!("cannot render JSON: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::tests::polar_cli;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_path() {
        assert_eq!(FormulaFormat::from_path(Path::new("polar-cli.rb")), Some(FormulaFormat::Ruby));
        assert_eq!(FormulaFormat::from_path(Path::new("a/b.TOML")), Some(FormulaFormat::Toml));
        assert_eq!(FormulaFormat::from_path(Path::new("x.json")), Some(FormulaFormat::Json));
        assert_eq!(FormulaFormat::from_path(Path::new("x.yaml")), None);
    }

    #[test]
    fn test_parse_toml() {
        let content = r##"
name = "demo"
url = "https://example.com/demo-1.2.tar.gz"
sha256 = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
runtime_dependency = "sh"
install = "cp bin/demo $PREFIX/bin/"

[test]
command = "#{bin}/demo --help"
expected = "demo"
"##;
        let formula = FormulaLoader::parse(content, FormulaFormat::Toml).unwrap();
        assert_eq!(formula.name, "demo");
        assert_eq!(formula.version().unwrap(), "1.2");
        assert_eq!(formula.runtime_dependency.as_deref(), Some("sh"));
        assert_eq!(formula.test.status, 0);
        assert_eq!(formula.desc, None);
    }

    #[test]
    fn test_parse_toml_missing_field() {
        let err = FormulaLoader::parse("name = \"demo\"", FormulaFormat::Toml).unwrap_err();
        assert!(matches!(err, KegError::InvalidFormula { .. }));
    }

    #[test]
    fn test_every_format_round_trips() {
        let formula = polar_cli();
        for format in [FormulaFormat::Ruby, FormulaFormat::Toml, FormulaFormat::Json] {
            let rendered = FormulaLoader::render(&formula, format).unwrap();
            let parsed = FormulaLoader::parse(&rendered, format).unwrap();
            assert_eq!(parsed, formula, "round trip through {:?}", format);
        }
    }

    #[test]
    fn test_load_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.toml");
        std::fs::write(&path, "name = ").unwrap();

        let err = FormulaLoader::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let err = FormulaLoader::load(Path::new("formula.yaml")).unwrap_err();
        assert!(matches!(err, KegError::InvalidFormula { .. }));
    }
}
