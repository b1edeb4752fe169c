//! Client startup parameters

use super::constants::{params, PROTOCOL_VERSION};
use super::encode::encode_startup;
use crate::{Error, Result};
use bytes::BytesMut;

/// Parameters a client sent to open a session.
///
/// Immutable once built. Parameter order is preserved so the relayed startup
/// message matches what the client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupParameters {
    version: i32,
    params: Vec<(String, String)>,
}

impl StartupParameters {
    /// Create a builder
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlproxy_backend::StartupParameters;
    ///
    /// let params = StartupParameters::builder()
    ///     .user("root")
    ///     .database("defaultdb")
    ///     .param("application_name", "psql")
    ///     .build()?;
    /// assert_eq!(params.user(), "root");
    /// # Ok::<(), sqlproxy_backend::Error>(())
    /// ```
    pub fn builder() -> StartupParametersBuilder {
        StartupParametersBuilder::default()
    }

    /// Build from already-decoded parts, validating them
    pub(crate) fn from_parts(version: i32, params: Vec<(String, String)>) -> Result<Self> {
        let parsed = Self { version, params };
        parsed.validate()?;
        Ok(parsed)
    }

    /// Protocol version requested by the client
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Role name
    pub fn user(&self) -> &str {
        // validate() guarantees presence
        self.get(params::USER).unwrap_or_default()
    }

    /// Target database, if the client named one
    pub fn database(&self) -> Option<&str> {
        self.get(params::DATABASE)
    }

    /// Look up a parameter by name
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate parameters in wire order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether there are no parameters (never true for a validated value)
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Encode as a startup message
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        encode_startup(&mut buf, self.version, self.iter());
        buf
    }

    /// Size of the encoded startup message in bytes
    pub fn encoded_len(&self) -> usize {
        // length + version + pairs + terminator
        8 + self
            .params
            .iter()
            .map(|(k, v)| k.len() + v.len() + 2)
            .sum::<usize>()
            + 1
    }

    fn validate(&self) -> Result<()> {
        if self.version >> 16 != PROTOCOL_VERSION >> 16 {
            return Err(Error::Protocol(format!(
                "unsupported protocol version {}.{}",
                self.version >> 16,
                self.version & 0xFFFF
            )));
        }

        for (key, value) in &self.params {
            if key.is_empty() {
                return Err(Error::Config("startup parameter name is empty".into()));
            }
            if key.contains('\0') || value.contains('\0') {
                return Err(Error::Config(format!(
                    "startup parameter '{}' contains a NUL byte",
                    key.escape_default()
                )));
            }
        }

        match self.get(params::USER) {
            Some(user) if !user.is_empty() => Ok(()),
            _ => Err(Error::Config("startup parameters require a user".into())),
        }
    }
}

/// Builder for [`StartupParameters`]
#[derive(Debug, Clone)]
pub struct StartupParametersBuilder {
    version: i32,
    params: Vec<(String, String)>,
}

impl Default for StartupParametersBuilder {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            params: Vec::new(),
        }
    }
}

impl StartupParametersBuilder {
    /// Set the role name (required)
    pub fn user(self, user: impl Into<String>) -> Self {
        self.param(params::USER, user)
    }

    /// Set the target database
    pub fn database(self, database: impl Into<String>) -> Self {
        self.param(params::DATABASE, database)
    }

    /// Set the protocol version (default: 3.0)
    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Add a parameter; setting an existing name replaces its value in place
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    /// Build the parameters
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no user is set or a name or value contains a
    /// NUL byte, and `Error::Protocol` for a non-3.x protocol version.
    pub fn build(self) -> Result<StartupParameters> {
        StartupParameters::from_parts(self.version, self.params)
    }
}
