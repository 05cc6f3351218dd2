use crate::error::Error;
use events::Identity;
use serde::Deserialize;
use utoipa::IntoParams;

/// Query parameters accepted by the stream connect endpoint.
#[derive(Debug, Deserialize, IntoParams)]
pub(crate) struct ConnectParams {
    /// Opaque identity token the connection is registered under.
    pub(crate) identity: Option<String>,
}

impl ConnectParams {
    /// The validated identity token. Missing and all-whitespace tokens are
    /// rejected here, before any registration happens.
    pub(crate) fn identity(self) -> Result<Identity, Error> {
        match self.identity {
            Some(identity) if !identity.trim().is_empty() => Ok(identity),
            _ => Err(Error::missing_identity()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_identity_accepts_a_plain_token() {
        let params = ConnectParams {
            identity: Some("user-a".to_string()),
        };
        assert_eq!(params.identity().unwrap(), "user-a");
    }

    #[test]
    fn test_identity_rejects_missing_and_blank_tokens() {
        let missing = ConnectParams { identity: None };
        assert_eq!(
            missing.identity().unwrap_err().kind(),
            ErrorKind::MissingIdentity
        );

        let blank = ConnectParams {
            identity: Some("   ".to_string()),
        };
        assert_eq!(
            blank.identity().unwrap_err().kind(),
            ErrorKind::MissingIdentity
        );
    }
}
