//! File-backed credential store

use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use link_shared::link::UNKNOWN_DEVICE_ID;
use rcgen::{CertificateParams, DnType, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore};
use serde_json::Value;
use tracing::{debug, info};

use super::CredentialProvider;

pub const CA_CERTIFICATE_FILE: &str = "ca.crt";
pub const DEVICE_CERTIFICATE_FILE: &str = "device.crt";
pub const PRIVATE_KEY_FILE: &str = "private_key.pem";
pub const CONNECTION_CONFIG_FILE: &str = "connection_config.json";

/// Credentials kept in one directory that the desktop writes signed certificates into
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    directory: PathBuf,
    /// Common name placed in generated signing requests
    common_name: String,
}

impl FileCredentialStore {
    /// Open (and create if needed) a credential directory
    pub fn new(directory: impl Into<PathBuf>, common_name: impl Into<String>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create {}", directory.display()))?;
        Ok(Self {
            directory,
            common_name: common_name.into(),
        })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.directory.join(file)
    }

    fn read_pem_blocks(&self, file: &str) -> Result<Vec<pem::Pem>> {
        let path = self.path(file);
        let data = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let blocks = pem::parse_many(data).with_context(|| format!("Invalid PEM in {}", path.display()))?;
        if blocks.is_empty() {
            return Err(anyhow!("No PEM blocks in {}", path.display()));
        }
        Ok(blocks)
    }

    fn load_certificates(&self, file: &str) -> Result<Vec<CertificateDer<'static>>> {
        Ok(self
            .read_pem_blocks(file)?
            .into_iter()
            .filter(|block| block.tag() == "CERTIFICATE")
            .map(|block| CertificateDer::from(block.into_contents()))
            .collect())
    }

    fn load_private_key(&self) -> Result<PrivateKeyDer<'static>> {
        let block = self
            .read_pem_blocks(PRIVATE_KEY_FILE)?
            .into_iter()
            .find(|block| block.tag() == "PRIVATE KEY")
            .ok_or_else(|| anyhow!("No PKCS#8 private key in {}", PRIVATE_KEY_FILE))?;
        Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            block.into_contents(),
        )))
    }

    fn read_connection_config(&self) -> Option<Value> {
        let data = fs::read(self.path(CONNECTION_CONFIG_FILE)).ok()?;
        serde_json::from_slice(&data).ok()
    }
}

fn exists(directory: &Path, file: &str) -> bool {
    directory.join(file).is_file()
}

impl CredentialProvider for FileCredentialStore {
    fn device_id(&self) -> String {
        self.read_connection_config()
            .and_then(|config| config.get("deviceId")?.as_str().map(str::to_owned))
            .unwrap_or_else(|| UNKNOWN_DEVICE_ID.to_owned())
    }

    fn has_required_files(&self) -> bool {
        [CA_CERTIFICATE_FILE, DEVICE_CERTIFICATE_FILE, PRIVATE_KEY_FILE]
            .iter()
            .all(|file| exists(&self.directory, file))
    }

    fn create_certificate_signing_request(&self) -> Result<String> {
        let key_pair = KeyPair::generate().context("Key generation failed")?;
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, self.common_name.as_str());
        let csr = params
            .serialize_request(&key_pair)
            .context("Failed to build signing request")?;

        let key_path = self.path(PRIVATE_KEY_FILE);
        fs::write(&key_path, key_pair.serialize_pem())
            .with_context(|| format!("Failed to write {}", key_path.display()))?;
        debug!("Generated new private key at {}", key_path.display());

        csr.pem().context("Failed to encode signing request")
    }

    fn certificate_directory_path(&self) -> String {
        let mut path = self.directory.display().to_string();
        if !path.ends_with(MAIN_SEPARATOR) {
            path.push(MAIN_SEPARATOR);
        }
        path
    }

    fn tls_context(&self) -> Result<Arc<ClientConfig>> {
        let mut roots = RootCertStore::empty();
        for certificate in self.load_certificates(CA_CERTIFICATE_FILE)? {
            roots.add(certificate).context("Invalid CA certificate")?;
        }

        let chain = self.load_certificates(DEVICE_CERTIFICATE_FILE)?;
        if chain.is_empty() {
            return Err(anyhow!("No certificate in {}", DEVICE_CERTIFICATE_FILE));
        }

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(chain, self.load_private_key()?)
            .context("Device certificate rejected")?;
        Ok(Arc::new(config))
    }

    fn store_connection_config(&self, config: &Value) -> Result<()> {
        let path = self.path(CONNECTION_CONFIG_FILE);
        fs::write(&path, serde_json::to_vec_pretty(config)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Stored connection config at {}", path.display());
        Ok(())
    }
}
