//! Host-identity verification policy.
//!
//! When the gateway dials the remote host, the host presents a public key.
//! The policy decides whether that key is trusted.  There is no implicit
//! default: a deployment either lists the fingerprints it trusts or opts into
//! [`HostKeyPolicy::InsecureAcceptAny`] by name.

/// How the remote host's public key is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Trust only keys whose SHA-256 fingerprint is in the list.
    ///
    /// Fingerprints are compared in their base64 form; an `SHA256:` prefix and
    /// trailing `=` padding are ignored on both sides.
    Fingerprints(Vec<String>),

    /// Trust any key.  Vulnerable to man-in-the-middle attacks; only for
    /// throwaway or fully trusted networks.
    InsecureAcceptAny,
}

impl HostKeyPolicy {
    /// Returns `true` if a host key with this SHA-256 fingerprint is trusted.
    ///
    /// # Example
    ///
    /// ```rust
    /// use webssh_core::HostKeyPolicy;
    ///
    /// let policy = HostKeyPolicy::Fingerprints(vec!["SHA256:abc".into()]);
    /// assert!(policy.accepts("abc"));
    /// assert!(!policy.accepts("xyz"));
    /// ```
    pub fn accepts(&self, fingerprint: &str) -> bool {
        match self {
            HostKeyPolicy::InsecureAcceptAny => true,
            HostKeyPolicy::Fingerprints(trusted) => {
                let presented = normalize(fingerprint);
                trusted.iter().any(|t| normalize(t) == presented)
            }
        }
    }

    /// Returns `true` for the accept-anything policy.
    pub fn is_insecure(&self) -> bool {
        matches!(self, HostKeyPolicy::InsecureAcceptAny)
    }
}

fn normalize(fingerprint: &str) -> &str {
    let trimmed = fingerprint.trim();
    let without_prefix = trimmed.strip_prefix("SHA256:").unwrap_or(trimmed);
    without_prefix.trim_end_matches('=')
}
