//! Deployment units: one contract to deploy, its constructor inputs and
//! whether it takes part in explorer verification.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue},
    primitives::Bytes,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// Where a constructor argument takes its value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    /// The address produced by another unit of the same deployment set.
    Reference { depends_on: String },
    /// A literal value, coerced to the argument's ABI type at encoding time.
    Literal { value: String },
}

/// A single constructor argument.
///
/// Exactly one of `value` and `depends_on` must be given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawArgSpec")]
pub struct ArgSpec {
    /// Solidity ABI type, e.g. `address` or `bytes32`.
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(flatten)]
    pub value: ArgValue,
}

/// Argument as written in a units file.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawArgSpec {
    #[serde(rename = "type")]
    ty: String,
    value: Option<String>,
    depends_on: Option<String>,
}

impl TryFrom<RawArgSpec> for ArgSpec {
    type Error = String;

    fn try_from(raw: RawArgSpec) -> Result<Self, Self::Error> {
        let value = match (raw.value, raw.depends_on) {
            (Some(value), None) => ArgValue::Literal { value },
            (None, Some(depends_on)) => ArgValue::Reference { depends_on },
            (Some(_), Some(_)) => {
                return Err(format!(
                    "`{}` argument sets both `value` and `depends_on`",
                    raw.ty
                ));
            }
            (None, None) => {
                return Err(format!(
                    "`{}` argument needs either `value` or `depends_on`",
                    raw.ty
                ));
            }
        };

        Ok(Self { ty: raw.ty, value })
    }
}

impl ArgSpec {
    pub fn literal(ty: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            value: ArgValue::Literal {
                value: value.into(),
            },
        }
    }

    pub fn address_of(unit: impl Into<String>) -> Self {
        Self {
            ty: "address".to_string(),
            value: ArgValue::Reference {
                depends_on: unit.into(),
            },
        }
    }

    /// The referenced unit name, if this argument is a reference.
    pub fn depends_on(&self) -> Option<&str> {
        match &self.value {
            ArgValue::Reference { depends_on } => Some(depends_on),
            ArgValue::Literal { .. } => None,
        }
    }
}

/// One contract deployment job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentUnit {
    /// Logical name, stable across networks.
    pub name: String,
    /// Path to a Hardhat-style artifact holding the creation bytecode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    /// Source reference handed to the explorer (`path/File.sol:Contract`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default = "default_verify")]
    pub verify: bool,
    #[serde(default, rename = "args")]
    pub constructor_args: Vec<ArgSpec>,
    /// Creation bytecode, loaded from `artifact`.
    #[serde(skip)]
    pub bytecode: Bytes,
}

fn default_verify() -> bool {
    true
}

impl DeploymentUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact: None,
            source: None,
            verify: true,
            constructor_args: Vec::new(),
            bytecode: Bytes::new(),
        }
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.constructor_args.push(arg);
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn bytecode(mut self, bytecode: impl Into<Bytes>) -> Self {
        self.bytecode = bytecode.into();
        self
    }

    /// Names of the units this unit's constructor references, in argument order.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.constructor_args.iter().filter_map(ArgSpec::depends_on)
    }

    /// The explorer source reference, falling back to the unit name.
    pub fn source_ref(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }

    /// ABI-encode already resolved constructor arguments.
    pub fn encode_args(&self, resolved: &[String]) -> Result<Bytes, DeployError> {
        let values = self
            .constructor_args
            .iter()
            .zip(resolved)
            .enumerate()
            .map(|(index, (spec, value))| {
                DynSolType::parse(&spec.ty)
                    .and_then(|ty| ty.coerce_str(value))
                    .map_err(|e| DeployError::ArgumentEncoding {
                        unit: self.name.clone(),
                        index,
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if values.is_empty() {
            return Ok(Bytes::new());
        }

        Ok(DynSolValue::Tuple(values).abi_encode_params().into())
    }

    /// Creation bytecode followed by the encoded constructor arguments.
    pub fn creation_payload(&self, encoded_args: &Bytes) -> Bytes {
        let mut data = Vec::with_capacity(self.bytecode.len() + encoded_args.len());
        data.extend_from_slice(&self.bytecode);
        data.extend_from_slice(encoded_args);
        data.into()
    }
}

/// Compiled contract artifact as emitted by Hardhat.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractArtifact {
    contract_name: String,
    #[serde(default)]
    source_name: Option<String>,
    bytecode: Bytes,
}

/// On-disk layout of a units file.
#[derive(Debug, Deserialize)]
struct UnitsFile {
    #[serde(rename = "unit", alias = "units")]
    units: Vec<DeploymentUnit>,
}

/// Load a set of deployment units from a TOML (or `.json`) file.
///
/// Artifact paths are resolved relative to the file's directory and their
/// bytecode is loaded eagerly.
pub fn load_units(path: &Path) -> anyhow::Result<Vec<DeploymentUnit>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read units file {}", path.display()))?;

    let file: UnitsFile = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content).context("Failed to parse units file as JSON")?
    } else {
        toml::from_str(&content).context("Failed to parse units file as TOML")?
    };

    let base = path.parent().unwrap_or(Path::new("."));
    let mut units = file.units;

    for unit in &mut units {
        let Some(artifact) = unit.artifact.as_mut() else {
            continue;
        };
        if artifact.is_relative() {
            *artifact = base.join(&*artifact);
        }

        let content = std::fs::read_to_string(&*artifact)
            .with_context(|| format!("Failed to read artifact {}", artifact.display()))?;
        let parsed: ContractArtifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", artifact.display()))?;

        if unit.source.is_none() {
            unit.source = Some(match parsed.source_name {
                Some(source_name) => format!("{}:{}", source_name, parsed.contract_name),
                None => parsed.contract_name,
            });
        }
        unit.bytecode = parsed.bytecode;
    }

    tracing::debug!(path = %path.display(), units = units.len(), "Loaded deployment units");

    Ok(units)
}

/// Reject sets that declare the same unit name twice.
pub fn ensure_unique(units: &[DeploymentUnit]) -> Result<(), DeployError> {
    let mut seen = HashSet::new();
    for unit in units {
        if !seen.insert(unit.name.as_str()) {
            return Err(DeployError::DuplicateUnit(unit.name.clone()));
        }
    }
    Ok(())
}
