use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Open access: every request acts as the anonymous account.
///
/// Only selected with `method = "none"`; credentials sent anyway are
/// ignored, so callers cannot reach another account's ledger through it.
#[derive(Debug, Default)]
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, _request: &AuthRequest) -> Result<Identity, AuthError> {
        Ok(Identity::anonymous())
    }

    fn method_name(&self) -> &'static str {
        "none"
    }

    fn requires_credentials(&self) -> bool {
        false
    }
}
