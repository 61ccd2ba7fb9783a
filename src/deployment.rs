use chrono::Utc;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use ethers::types::Address;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
    str::FromStr,
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Main,
    Test,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Main => "main",
            DeploymentEnv::Test => "test",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Main => "Base mainnet",
            DeploymentEnv::Test => "Base Sepolia",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

/// One known deployment of the chain program. The contract is deployed and
/// operated externally; these records only tell the client where to point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub recorded_at: String,
    pub contract_address: String,
    pub network_url: String,
    pub chain_id: u64,
    #[serde(default)]
    pub entropy_provider: Option<String>,
}

impl DeploymentRecord {
    pub fn address(&self) -> Result<Address> {
        Address::from_str(self.contract_address.trim_start_matches("base:")).map_err(
            |err| {
                eyre!(
                    "Deployment record contains an invalid contract address {:?}: {err}",
                    self.contract_address
                )
            },
        )
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(env)?;
        Ok(Self { path })
    }

    pub fn load(&self) -> Result<Vec<DeploymentRecord>> {
        read_records(&self.path)
    }

    /// The most recently recorded deployment, if any.
    pub fn latest(&self) -> Result<Option<DeploymentRecord>> {
        Ok(self.load()?.into_iter().last())
    }

    pub fn append(&self, record: DeploymentRecord) -> Result<()> {
        let mut records = self.load()?;
        records.push(record);
        write_records(&self.path, &records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn record_deployment(
    env: DeploymentEnv,
    contract_address: &Address,
    network_url: impl AsRef<str>,
    chain_id: u64,
) -> Result<()> {
    let store = DeploymentStore::new(env)?;
    let record = DeploymentRecord {
        recorded_at: Utc::now().to_rfc3339(),
        contract_address: format!("{contract_address:#x}"),
        network_url: network_url.as_ref().to_string(),
        chain_id,
        entropy_provider: None,
    };
    store.append(record)
}

/// Create the `.deployments/<env>/` tree if it is missing.
pub fn ensure_structure() -> Result<()> {
    for env in [DeploymentEnv::Main, DeploymentEnv::Test, DeploymentEnv::Local] {
        ensure_store(env)?;
    }
    Ok(())
}

fn ensure_store(env: DeploymentEnv) -> Result<PathBuf> {
    let dir = PathBuf::from(DEPLOYMENTS_ROOT).join(env.dir_name());
    fs::create_dir_all(&dir)
        .wrap_err_with(|| format!("Failed to create deployment dir {}", dir.display()))?;
    let path = dir.join(DEPLOYMENTS_FILE);
    if !path.exists() {
        write_records(&path, &[])?;
    }
    Ok(path)
}

fn read_records(path: &Path) -> Result<Vec<DeploymentRecord>> {
    let raw = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read deployment records {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw)
        .wrap_err_with(|| format!("Invalid deployment records in {}", path.display()))
}

fn write_records(path: &Path, records: &[DeploymentRecord]) -> Result<()> {
    let raw = serde_json::to_string_pretty(records)
        .wrap_err("Failed to serialize deployment records")?;
    fs::write(path, raw)
        .wrap_err_with(|| format!("Failed to write deployment records {}", path.display()))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn deployment_record__parses_contract_address() {
        // given
        let record = DeploymentRecord {
            recorded_at: "2026-01-01T00:00:00Z".to_string(),
            contract_address: "0x00000000000000000000000000000000000000aa".to_string(),
            network_url: "http://localhost:8545".to_string(),
            chain_id: 31337,
            entropy_provider: None,
        };

        // then
        assert_eq!(record.address().unwrap(), Address::from_low_u64_be(0xaa));
    }

    #[test]
    fn deployment_record__rejects_garbage_address() {
        let record = DeploymentRecord {
            recorded_at: "2026-01-01T00:00:00Z".to_string(),
            contract_address: "not-an-address".to_string(),
            network_url: "http://localhost:8545".to_string(),
            chain_id: 31337,
            entropy_provider: None,
        };
        assert!(record.address().is_err());
    }
}
