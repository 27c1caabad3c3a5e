//! Login credentials for the remote host.

use std::fmt;
use std::path::PathBuf;

/// The secret used to authenticate the login user.
///
/// Exactly one kind of credential is configured per gateway.  The `Debug`
/// implementation never prints secret material, so a `Credential` can be
/// included in log lines and error messages safely.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Password authentication.
    Password(String),
    /// Public-key authentication with a private key read from disk.
    IdentityFile {
        /// Path of the private key file.
        path: PathBuf,
        /// Passphrase protecting the key, if any.
        passphrase: Option<String>,
    },
}

impl Credential {
    /// Short name of the authentication method, for log lines.
    pub fn method(&self) -> &'static str {
        match self {
            Credential::Password(_) => "password",
            Credential::IdentityFile { .. } => "publickey",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
            Credential::IdentityFile { path, passphrase } => f
                .debug_struct("IdentityFile")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let cred = Credential::Password("hunter2".to_string());
        let printed = format!("{cred:?}");
        assert!(!printed.contains("hunter2"), "password leaked: {printed}");
    }

    #[test]
    fn test_debug_redacts_passphrase_but_shows_path() {
        let cred = Credential::IdentityFile {
            path: PathBuf::from("/home/me/.ssh/id_ed25519"),
            passphrase: Some("open sesame".to_string()),
        };
        let printed = format!("{cred:?}");
        assert!(printed.contains("id_ed25519"));
        assert!(!printed.contains("open sesame"));
    }

    #[test]
    fn test_method_names() {
        assert_eq!(Credential::Password(String::new()).method(), "password");
        let key = Credential::IdentityFile {
            path: PathBuf::new(),
            passphrase: None,
        };
        assert_eq!(key.method(), "publickey");
    }
}
