//! Compiled contract artifacts and verification source bundles.
//!
//! Artifacts are read from a Hardhat project:
//!
//! ```text
//! <contracts_dir>/
//!   ├── artifacts/contracts/<Name>.sol/<Name>.json   (abi + bytecode)
//!   ├── contracts/<Name>.sol                         (primary source)
//!   └── node_modules/@scope/pkg/...                  (library imports)
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use alloy::json_abi::JsonAbi;
use alloy::primitives::Bytes;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use utoken::contracts::COMMON_METHODS;
use utoken::{ContractKind, Error, Result};

use crate::config::{CompilerSettings, Environment};

/// Init code that deploys an empty contract. Development mode only.
const PLACEHOLDER_INIT_CODE: [u8; 5] = [0x60, 0x00, 0x60, 0x00, 0xf3];

/// Matches `import "x";`, `import {A} from "x";` and `import * as A from "x";`.
static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:[^;]*?\s+from\s+)?["']([^"']+)["']\s*;"#)
        .expect("import pattern is a valid regex")
});

/// ABI and creation bytecode of one contract kind.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    /// Which contract this is.
    pub kind: ContractKind,
    /// Parsed ABI.
    pub abi: JsonAbi,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
    /// Whether this is development placeholder bytecode.
    pub placeholder: bool,
}

/// Primary source plus every resolvable import, keyed by source unit path.
#[derive(Debug, Clone, Default)]
pub struct SourceBundle {
    /// Source unit name (as imported) to file contents.
    pub sources: BTreeMap<String, String>,
    /// Imports that could not be found on disk.
    pub missing: Vec<String>,
}

impl SourceBundle {
    /// Standard-JSON compiler input for explorer verification.
    #[must_use]
    pub fn standard_json(&self, compiler: &CompilerSettings) -> serde_json::Value {
        let sources: serde_json::Map<String, serde_json::Value> = self
            .sources
            .iter()
            .map(|(path, content)| (path.clone(), json!({ "content": content })))
            .collect();
        json!({
            "language": "Solidity",
            "sources": sources,
            "settings": {
                "optimizer": {
                    "enabled": compiler.optimizer_runs > 0,
                    "runs": compiler.optimizer_runs,
                },
                "evmVersion": compiler.evm_version,
                "outputSelection": {
                    "*": { "*": ["abi", "evm.bytecode", "evm.deployedBytecode", "metadata"] }
                },
            },
        })
    }
}

/// Source of deployable artifacts and verification sources.
pub trait ArtifactSource: Send + Sync + fmt::Debug {
    /// Load the deployable artifact for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the artifact is missing or broken.
    fn artifact(&self, kind: ContractKind) -> Result<ContractArtifact>;

    /// Collect the verification sources for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the primary source is missing.
    fn sources(&self, kind: ContractKind) -> Result<SourceBundle>;
}

/// Hardhat artifact file layout (only the fields used here).
#[derive(Deserialize)]
struct HardhatArtifact {
    abi: JsonAbi,
    bytecode: String,
}

/// Filesystem [`ArtifactSource`] over a Hardhat project.
#[derive(Debug, Clone)]
pub struct ArtifactLoader {
    root: PathBuf,
    environment: Environment,
}

impl ArtifactLoader {
    /// Loader over the Hardhat project at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, environment: Environment) -> Self {
        Self {
            root: root.into(),
            environment,
        }
    }

    fn artifact_path(&self, kind: ContractKind) -> PathBuf {
        let name = kind.contract_name();
        self.root
            .join("artifacts/contracts")
            .join(format!("{name}.sol"))
            .join(format!("{name}.json"))
    }

    fn read_artifact(&self, kind: ContractKind) -> Result<ContractArtifact> {
        let path = self.artifact_path(kind);
        let text = std::fs::read_to_string(&path).map_err(|e| {
            Error::config(format!("reading artifact {}: {e}", path.display()))
        })?;
        let raw: HardhatArtifact = serde_json::from_str(&text)
            .map_err(|e| Error::config(format!("parsing artifact {}: {e}", path.display())))?;

        let bytecode: Bytes = raw
            .bytecode
            .parse()
            .map_err(|e| Error::config(format!("bytecode in {} is not hex: {e}", path.display())))?;
        if bytecode.is_empty() {
            return Err(Error::config(format!(
                "artifact {} has empty bytecode (abstract contract or interface?)",
                path.display()
            )));
        }

        let required = COMMON_METHODS.iter().copied().chain([kind.link_method()]);
        let missing: Vec<&str> = required.filter(|m| raw.abi.function(m).is_none()).collect();
        if !missing.is_empty() {
            return Err(Error::config(format!(
                "artifact {} lacks required methods: {}",
                path.display(),
                missing.join(", ")
            )));
        }

        Ok(ContractArtifact {
            kind,
            abi: raw.abi,
            bytecode,
            placeholder: false,
        })
    }

    /// Resolve an import relative to the importing unit or `node_modules`.
    fn resolve_import(importer: &str, import: &str) -> String {
        if import.starts_with("./") || import.starts_with("../") {
            let base = Path::new(importer).parent().unwrap_or_else(|| Path::new(""));
            normalize(&base.join(import))
        } else {
            import.to_owned()
        }
    }

    fn read_unit(&self, unit: &str) -> Option<String> {
        [self.root.join(unit), self.root.join("node_modules").join(unit)]
            .iter()
            .find_map(|p| std::fs::read_to_string(p).ok())
    }
}

/// Collapse `.` and `..` components into a forward-slash unit name.
fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component.as_os_str().to_str() {
            Some(".") | None => {}
            Some("..") => {
                parts.pop();
            }
            Some(part) => parts.push(part.to_owned()),
        }
    }
    parts.join("/")
}

impl ArtifactSource for ArtifactLoader {
    fn artifact(&self, kind: ContractKind) -> Result<ContractArtifact> {
        match self.read_artifact(kind) {
            Ok(artifact) => Ok(artifact),
            Err(e) if self.environment == Environment::Development => {
                tracing::warn!(
                    contract = kind.contract_name(),
                    error = %e,
                    "artifact unavailable, using placeholder bytecode (development only)"
                );
                Ok(ContractArtifact {
                    kind,
                    abi: JsonAbi::default(),
                    bytecode: Bytes::from_static(&PLACEHOLDER_INIT_CODE),
                    placeholder: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Breadth-first walk of the import graph. Missing imports are logged
    /// and skipped; the explorer decides whether the bundle is sufficient.
    fn sources(&self, kind: ContractKind) -> Result<SourceBundle> {
        let primary = format!("contracts/{}.sol", kind.contract_name());
        let content = self.read_unit(&primary).ok_or_else(|| {
            Error::config(format!(
                "primary source {} not found under {}",
                primary,
                self.root.display()
            ))
        })?;

        let mut bundle = SourceBundle::default();
        let mut queue = VecDeque::from([(primary, content)]);
        while let Some((unit, content)) = queue.pop_front() {
            for cap in IMPORT_RE.captures_iter(&content) {
                let Some(import) = cap.get(1) else { continue };
                let resolved = Self::resolve_import(&unit, import.as_str());
                if bundle.sources.contains_key(&resolved)
                    || bundle.missing.contains(&resolved)
                    || queue.iter().any(|(u, _)| *u == resolved)
                    || resolved == unit
                {
                    continue;
                }
                match self.read_unit(&resolved) {
                    Some(text) => queue.push_back((resolved, text)),
                    None => {
                        tracing::warn!(importer = %unit, import = %resolved, "import not found, skipping");
                        bundle.missing.push(resolved);
                    }
                }
            }
            bundle.sources.insert(unit, content);
        }
        Ok(bundle)
    }
}
