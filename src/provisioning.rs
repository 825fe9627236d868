use std::fs;
use std::io;

use log::warn;

use crate::error::ProvisioningError;

/// Undoes network provisioning so the device comes back up unconfigured.
pub trait Provisioning {
    fn factory_reset(&mut self) -> Result<(), ProvisioningError>;
}

/// Forgets the stored Wi-Fi credentials by deleting their file.
pub struct CredentialsFile {
    path: String,
}

impl CredentialsFile {
    pub fn new(path: &str) -> Self {
        CredentialsFile {
            path: path.to_string(),
        }
    }
}

impl Provisioning for CredentialsFile {
    fn factory_reset(&mut self) -> Result<(), ProvisioningError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                warn!("removed network credentials at {}", self.path);
                Ok(())
            }
            // already unprovisioned
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ProvisioningError::RemoveCredentials {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
