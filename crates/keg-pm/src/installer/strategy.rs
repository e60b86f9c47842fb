use std::fmt;

/// How the unpacked source is turned into an installed package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStrategy {
    /// Create a virtualenv in `libexec` and pip-install the source into it
    Virtualenv,
    /// Run a shell script in the source directory
    Shell(String),
}

impl InstallStrategy {
    /// Interpret a formula's `install` field
    pub fn parse(install: &str) -> Self {
        match install.trim() {
            "virtualenv_install_with_resources" | "virtualenv" => InstallStrategy::Virtualenv,
            script => InstallStrategy::Shell(script.to_string()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InstallStrategy::Virtualenv => "virtualenv",
            InstallStrategy::Shell(_) => "shell",
        }
    }

    /// Runtime used when the formula declares none
    pub fn default_runtime(&self) -> Option<&'static str> {
        match self {
            InstallStrategy::Virtualenv => Some("python3"),
            InstallStrategy::Shell(_) => None,
        }
    }
}

impl fmt::Display for InstallStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
