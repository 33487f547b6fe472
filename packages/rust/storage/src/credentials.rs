//! Secret-file credential store.

use std::path::PathBuf;

use medcontact_shared::{Credential, MedContactError, Result};
use tracing::info;

/// Read every credential from `files`, one secret per non-blank line.
///
/// A missing, unreadable or empty file is an error: a run never starts with
/// fewer keys than configured.
pub fn load_credentials(files: &[PathBuf]) -> Result<Vec<Credential>> {
    if files.is_empty() {
        return Err(MedContactError::credential("no credential files given"));
    }

    let mut credentials = Vec::new();
    for path in files {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MedContactError::credential(format!("cannot read {}: {e}", path.display()))
        })?;

        let before = credentials.len();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            credentials.push(Credential::new(credentials.len(), line));
        }

        if credentials.len() == before {
            return Err(MedContactError::credential(format!(
                "{} contains no key",
                path.display()
            )));
        }
    }

    info!(
        files = files.len(),
        keys = credentials.len(),
        "loaded credentials"
    );
    Ok(credentials)
}
