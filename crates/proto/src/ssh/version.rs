//! SSH protocol version exchange (RFC 4253 Section 4.2).
//!
//! Every SSH connection opens with both peers sending an identification
//! line:
//!
//! ```text
//! SSH-protoversion-softwareversion SP comments CR LF
//! ```
//!
//! The piper sends its own line on both of its connections: as a server
//! toward the downstream client, and as a client toward the upstream
//! backend. Both lines also feed into the exchange-hash computation, so
//! they are kept verbatim after the exchange.
//!
//! # Example
//!
//! ```rust
//! use strait_proto::ssh::version::Version;
//!
//! let version = Version::new("strait_0.1.0", None);
//! assert_eq!(version.to_string(), "SSH-2.0-strait_0.1.0");
//!
//! let parsed = Version::parse("SSH-2.0-OpenSSH_9.6\r\n").unwrap();
//! assert_eq!(parsed.software(), "OpenSSH_9.6");
//! ```

use strait_platform::{StraitError, StraitResult};

/// Maximum length of an SSH version line (RFC 4253 Section 4.2).
pub const MAX_VERSION_LENGTH: usize = 255;

/// SSH protocol identification string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Protocol version (e.g. "2.0")
    proto_version: String,
    /// Software version (e.g. "strait_0.1.0")
    software_version: String,
    /// Optional comments
    comments: Option<String>,
}

impl Version {
    /// Creates a new version string with protocol version "2.0".
    pub fn new(software: &str, comments: Option<&str>) -> Self {
        Self {
            proto_version: "2.0".to_string(),
            software_version: software.to_string(),
            comments: comments.map(String::from),
        }
    }

    /// Returns the default strait version string.
    ///
    /// # Example
    ///
    /// ```rust
    /// use strait_proto::ssh::version::Version;
    ///
    /// let version = Version::default_strait();
    /// assert!(version.to_string().starts_with("SSH-2.0-strait_"));
    /// ```
    pub fn default_strait() -> Self {
        Self::new(&format!("strait_{}", env!("CARGO_PKG_VERSION")), None)
    }

    /// Parses an SSH version line (with or without trailing CR LF).
    ///
    /// # Errors
    ///
    /// Returns [`StraitError::Protocol`] if the line is longer than 255
    /// bytes, contains a null byte, does not start with `SSH-`, or carries
    /// a protocol version other than "2.0"/"1.99".
    pub fn parse(line: &str) -> StraitResult<Self> {
        let line = line.trim_end_matches("\r\n").trim_end_matches('\n');

        if line.len() > MAX_VERSION_LENGTH {
            return Err(StraitError::Protocol(format!(
                "Version string too long: {} bytes (max {})",
                line.len(),
                MAX_VERSION_LENGTH
            )));
        }

        if line.contains('\0') {
            return Err(StraitError::Protocol(
                "Version string contains null byte".to_string(),
            ));
        }

        if !line.starts_with("SSH-") {
            return Err(StraitError::Protocol(format!(
                "Invalid version string: must start with 'SSH-', got '{}'",
                line
            )));
        }

        // SSH-protoversion-softwareversion[ comments]
        let parts: Vec<&str> = line.splitn(3, '-').collect();
        if parts.len() < 3 {
            return Err(StraitError::Protocol(format!(
                "Invalid version string format: '{}'",
                line
            )));
        }

        let proto_version = parts[1];
        let rest = parts[2];

        if proto_version != "2.0" && proto_version != "1.99" {
            return Err(StraitError::Protocol(format!(
                "Unsupported protocol version: '{}' (expected '2.0' or '1.99')",
                proto_version
            )));
        }

        let (software_version, comments) = if let Some(space_pos) = rest.find(' ') {
            let software = rest[..space_pos].to_string();
            let comments = rest[space_pos + 1..].trim().to_string();
            (software, Some(comments))
        } else {
            (rest.to_string(), None)
        };

        Ok(Self {
            proto_version: proto_version.to_string(),
            software_version,
            comments,
        })
    }

    /// Returns the protocol version (e.g. "2.0").
    pub fn proto_version(&self) -> &str {
        &self.proto_version
    }

    /// Returns the software version (e.g. "strait_0.1.0").
    pub fn software(&self) -> &str {
        &self.software_version
    }

    /// Returns the comments, if any.
    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    /// Converts to wire format (with CR LF).
    pub fn to_wire_format(&self) -> Vec<u8> {
        format!("{}\r\n", self).into_bytes()
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SSH-{}-{}", self.proto_version, self.software_version)?;
        if let Some(comments) = &self.comments {
            write!(f, " {}", comments)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_new() {
        let version = Version::new("strait_0.1.0", None);
        assert_eq!(version.proto_version(), "2.0");
        assert_eq!(version.software(), "strait_0.1.0");
        assert_eq!(version.comments(), None);
    }

    #[test]
    fn test_version_display() {
        let version = Version::new("strait_0.1.0", Some("piper"));
        assert_eq!(version.to_string(), "SSH-2.0-strait_0.1.0 piper");
    }

    #[test]
    fn test_version_parse() {
        let version = Version::parse("SSH-2.0-OpenSSH_9.6").unwrap();
        assert_eq!(version.proto_version(), "2.0");
        assert_eq!(version.software(), "OpenSSH_9.6");
        assert_eq!(version.comments(), None);
    }

    #[test]
    fn test_version_parse_with_comments() {
        let version = Version::parse("SSH-2.0-OpenSSH_9.6 Ubuntu-3ubuntu13").unwrap();
        assert_eq!(version.software(), "OpenSSH_9.6");
        assert_eq!(version.comments(), Some("Ubuntu-3ubuntu13"));
    }

    #[test]
    fn test_version_parse_with_crlf() {
        let version = Version::parse("SSH-2.0-OpenSSH_9.6\r\n").unwrap();
        assert_eq!(version.software(), "OpenSSH_9.6");
    }

    #[test]
    fn test_version_parse_invalid_prefix() {
        let result = Version::parse("INVALID-2.0-Test");
        assert!(matches!(result, Err(StraitError::Protocol(_))));
    }

    #[test]
    fn test_version_parse_unsupported_protocol() {
        let result = Version::parse("SSH-1.0-OldClient");
        match result {
            Err(StraitError::Protocol(msg)) => {
                assert!(msg.contains("Unsupported protocol version"));
            }
            _ => panic!("Expected Protocol error"),
        }
    }

    #[test]
    fn test_version_parse_too_long() {
        let long_string = format!("SSH-2.0-{}", "A".repeat(300));
        assert!(Version::parse(&long_string).is_err());
    }

    #[test]
    fn test_version_parse_null_byte() {
        assert!(Version::parse("SSH-2.0-Test\0Bad").is_err());
    }

    #[test]
    fn test_version_wire_format() {
        let version = Version::new("strait_0.1.0", None);
        assert_eq!(version.to_wire_format(), b"SSH-2.0-strait_0.1.0\r\n");
    }

    #[test]
    fn test_version_round_trip() {
        let original = Version::new("strait_0.1.0", Some("test"));
        let parsed = Version::parse(&original.to_string()).unwrap();
        assert_eq!(parsed.software(), original.software());
        assert_eq!(parsed.comments(), original.comments());
    }
}
