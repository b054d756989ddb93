//! Credentials for remote registries.
//!
//! A [Credential] is handed to the adapter framework by whatever persists
//! registry descriptors. It is only ever read: the secret half is kept in a
//! [Secret], which redacts itself from debug output, cannot be serialized,
//! and is zeroed when dropped.

use std::{borrow::Cow, fmt, ops::Deref};

use http::{header::InvalidHeaderValue, HeaderValue};
use serde::Deserialize;
use thiserror::Error;
use zeroize::Zeroize;

/// A secret value, such as a password or an access token.
///
/// Use [Secret::revealed] to get the underlying value.
#[derive(Clone, Deserialize)]
#[serde(from = "String")]
pub struct Secret(Cow<'static, str>);

impl Drop for Secret {
    fn drop(&mut self) {
        if let Cow::Owned(ref mut s) = self.0 {
            s.zeroize()
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl Secret {
    /// Expose the underlying value.
    pub fn revealed(&self) -> &str {
        self.0.deref()
    }

    /// True when the secret is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a sensitive header value of the form `<scheme> <secret>`.
    pub fn header(&self, scheme: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut header = HeaderValue::try_from(format!("{scheme} {}", self.revealed()))?;
        header.set_sensitive(true);
        Ok(header)
    }

    /// Build a sensitive `Bearer` header value.
    pub fn bearer(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        self.header("Bearer")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.revealed() == other.revealed()
    }
}

impl Eq for Secret {}

impl From<Cow<'static, str>> for Secret {
    fn from(inner: Cow<'static, str>) -> Self {
        Secret(inner)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Secret(value.into())
    }
}

impl From<&'static str> for Secret {
    fn from(value: &'static str) -> Self {
        Secret(value.into())
    }
}

/// The authentication scheme a credential is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// Username and password.
    #[default]
    Basic,

    /// A bearer token, carried in `access_secret`.
    #[serde(rename = "oauth")]
    OAuth,

    /// A shared secret understood by the remote registry.
    Secret,
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialType::Basic => f.write_str("basic"),
            CredentialType::OAuth => f.write_str("oauth"),
            CredentialType::Secret => f.write_str("secret"),
        }
    }
}

/// A credential which does not have the shape its consumer expects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// The credential type is not accepted here.
    #[error("credential type {0} is not supported")]
    UnsupportedType(CredentialType),

    /// A basic credential without a username.
    #[error("access key is required for {0} credentials")]
    MissingAccessKey(CredentialType),

    /// No secret at all.
    #[error("access secret is required for {0} credentials")]
    MissingAccessSecret(CredentialType),
}

/// A credential for a remote registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    /// The scheme this credential is for.
    #[serde(rename = "type", default)]
    pub kind: CredentialType,

    /// The access key, usually a username.
    #[serde(default)]
    pub access_key: String,

    /// The access secret, a password or token.
    pub access_secret: Secret,
}

impl Credential {
    /// A basic (username / password) credential.
    pub fn basic<K, S>(access_key: K, access_secret: S) -> Self
    where
        K: Into<String>,
        S: Into<Secret>,
    {
        Self {
            kind: CredentialType::Basic,
            access_key: access_key.into(),
            access_secret: access_secret.into(),
        }
    }

    /// A credential of an arbitrary type.
    pub fn new<K, S>(kind: CredentialType, access_key: K, access_secret: S) -> Self
    where
        K: Into<String>,
        S: Into<Secret>,
    {
        Self {
            kind,
            access_key: access_key.into(),
            access_secret: access_secret.into(),
        }
    }

    /// True when both the key and the secret are empty.
    ///
    /// Stored descriptors use this shape for registries accessed anonymously.
    pub fn is_anonymous(&self) -> bool {
        self.access_key.is_empty() && self.access_secret.is_empty()
    }

    /// Check that this credential is one of the accepted types and carries
    /// the fields that type needs.
    pub fn check(&self, accepted: &[CredentialType]) -> Result<(), CredentialError> {
        if !accepted.contains(&self.kind) {
            return Err(CredentialError::UnsupportedType(self.kind));
        }

        if self.kind == CredentialType::Basic && self.access_key.is_empty() {
            return Err(CredentialError::MissingAccessKey(self.kind));
        }

        if self.access_secret.is_empty() {
            return Err(CredentialError::MissingAccessSecret(self.kind));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn secret_hidden_debug() {
        let apikey = Secret::from("secret garden");

        assert!(!format!("{apikey:?}").contains("secret garden"));
        assert_eq!(&format!("{apikey:?}"), "Secret(****)");
        assert_eq!(apikey.revealed(), "secret garden");
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::basic("admin", "Harbor12345");
        let repr = format!("{credential:?}");
        assert!(repr.contains("admin"));
        assert!(!repr.contains("Harbor12345"));
    }

    #[test]
    fn deserialize_descriptor_shape() {
        let credential: Credential = serde_json::from_str(
            r#"{"type": "oauth", "access_key": "", "access_secret": "token"}"#,
        )
        .unwrap();
        assert_eq!(credential.kind, CredentialType::OAuth);
        assert_eq!(credential.access_secret.revealed(), "token");

        let credential: Credential =
            serde_json::from_str(r#"{"access_key": "u", "access_secret": "p"}"#).unwrap();
        assert_eq!(credential.kind, CredentialType::Basic);
    }

    #[test]
    fn empty_credential_is_anonymous() {
        assert!(Credential::basic("", "").is_anonymous());
        assert!(Credential::new(CredentialType::Secret, "", "").is_anonymous());
        assert!(!Credential::basic("user", "").is_anonymous());
        assert!(!Credential::new(CredentialType::OAuth, "", "token").is_anonymous());
    }

    #[test]
    fn check_shape() {
        let basic = [CredentialType::Basic];
        assert!(Credential::basic("user", "pass").check(&basic).is_ok());
        assert_eq!(
            Credential::basic("", "pass").check(&basic),
            Err(CredentialError::MissingAccessKey(CredentialType::Basic))
        );
        assert_eq!(
            Credential::basic("user", "").check(&basic),
            Err(CredentialError::MissingAccessSecret(CredentialType::Basic))
        );
        assert_eq!(
            Credential::new(CredentialType::Secret, "", "s").check(&basic),
            Err(CredentialError::UnsupportedType(CredentialType::Secret))
        );
        assert!(Credential::new(CredentialType::OAuth, "", "token")
            .check(&[CredentialType::Basic, CredentialType::OAuth])
            .is_ok());
    }
}
