//! The three key groups, evaluated against a clock.
//!
//! Selection is never cached: every accessor asks the clock for `now`, so a
//! scheduled rotation takes effect at its `use_from` without a restart.

use crate::custodian::KeyCustodian;
use crate::errors::PassportError;
use crate::keys::schedule::{active_key_at, visible_keys_at, KeySchedule, Scheduled};
use crate::keys::{KeyGroup, KeyHandle, KeyUse};
use crate::observability::metrics;
use common::clock::Clock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Issuer metadata for operators: which custodian key backs each `kid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuerConfig {
    pub issuer: String,
    /// Visible `jwt` keys.
    pub signing_keys: BTreeMap<String, String>,
    /// The active `jwks` key, when one is active.
    pub decryption_keys: BTreeMap<String, String>,
}

/// Handles for the `jwt`, `jose` and `jwks` groups.
pub struct KeyGroupStore {
    signing: Vec<KeyHandle>,
    encryption: Vec<KeyHandle>,
    publication: Vec<KeyHandle>,
    clock: Arc<dyn Clock>,
}

impl KeyGroupStore {
    /// Wraps already-loaded handles. Each group must be ordered by
    /// ascending `use_from`.
    pub fn new(
        signing: Vec<KeyHandle>,
        encryption: Vec<KeyHandle>,
        publication: Vec<KeyHandle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            signing,
            encryption,
            publication,
            clock,
        }
    }

    /// Validates `schedule`, derives expiry, and fetches every public key
    /// from the custodian once.
    ///
    /// Keys that can never serve their group are rejected here rather than
    /// at first use.
    #[instrument(skip_all)]
    pub async fn load(
        schedule: KeySchedule,
        custodian: Arc<dyn KeyCustodian>,
        clock: Arc<dyn Clock>,
        custodian_timeout: Duration,
    ) -> Result<Self, PassportError> {
        schedule.validate()?;
        let schedule = schedule.with_expiration_policy();

        let mut groups: Vec<Vec<KeyHandle>> = Vec::with_capacity(KeyGroup::ALL.len());
        for group in KeyGroup::ALL {
            let mut handles = Vec::with_capacity(schedule.group(group).len());
            for entry in schedule.group(group) {
                let handle =
                    KeyHandle::load(group, entry.clone(), custodian.clone(), custodian_timeout)
                        .await?;
                check_usable(&handle)?;

                tracing::info!(
                    target: "passport.keys",
                    %group,
                    kid = %handle.kid(),
                    key_spec = %handle.key_spec(),
                    use_from = %handle.entry().use_from,
                    expires_at = %handle.entry().expires_at,
                    "Loaded key"
                );
                handles.push(handle);
            }
            groups.push(handles);
        }

        let mut groups = groups.into_iter();
        let (Some(signing), Some(encryption), Some(publication)) =
            (groups.next(), groups.next(), groups.next())
        else {
            return Err(PassportError::Internal(
                "key groups incomplete after load".to_string(),
            ));
        };

        Ok(Self::new(signing, encryption, publication, clock))
    }

    fn handles(&self, group: KeyGroup) -> &[KeyHandle] {
        match group {
            KeyGroup::Jwt => &self.signing,
            KeyGroup::Jose => &self.encryption,
            KeyGroup::Jwks => &self.publication,
        }
    }

    /// Active key of `group` at the clock's current instant.
    pub fn active_key(&self, group: KeyGroup) -> Result<&KeyHandle, PassportError> {
        active_key_at(self.handles(group), self.clock.now())
            .ok_or(PassportError::NoActiveKey { group })
    }

    /// Keys of `group` whose expiry is still ahead, in schedule order.
    pub fn visible_keys(&self, group: KeyGroup) -> Vec<&KeyHandle> {
        let visible = visible_keys_at(self.handles(group), self.clock.now());
        metrics::set_visible_keys(group, visible.len());
        visible
    }

    pub fn active_signer(&self) -> Result<&KeyHandle, PassportError> {
        self.active_key(KeyGroup::Jwt)
    }

    pub fn active_encryption_key(&self) -> Result<&KeyHandle, PassportError> {
        self.active_key(KeyGroup::Jose)
    }

    pub fn active_publication_key(&self) -> Result<&KeyHandle, PassportError> {
        self.active_key(KeyGroup::Jwks)
    }

    pub fn visible_signing_keys(&self) -> Vec<&KeyHandle> {
        self.visible_keys(KeyGroup::Jwt)
    }

    pub fn visible_encryption_keys(&self) -> Vec<&KeyHandle> {
        self.visible_keys(KeyGroup::Jose)
    }

    /// Entries of the published key set: the active encryption key, then
    /// every visible signing key.
    pub fn current_jwks_entries(&self) -> Vec<(&KeyHandle, KeyUse)> {
        let mut entries = Vec::new();

        match self.active_encryption_key() {
            Ok(handle) => entries.push((handle, KeyUse::Encryption)),
            Err(_) => {
                tracing::warn!(
                    target: "passport.keys",
                    group = %KeyGroup::Jose,
                    "No active encryption key; key set published without one"
                );
            }
        }

        entries.extend(
            self.visible_signing_keys()
                .into_iter()
                .map(|handle| (handle, KeyUse::Signature)),
        );
        entries
    }

    /// PEM of the active publication key.
    pub fn publication_public_key_pem(&self) -> Result<String, PassportError> {
        Ok(self.active_publication_key()?.public_key_pem())
    }

    /// Maps each visible signing `kid` and the active publication `kid` to
    /// its custodian key identifier.
    ///
    /// A missing publication key leaves `decryption_keys` empty.
    pub fn issuer_config(&self, issuer: &str) -> IssuerConfig {
        let signing_keys = self
            .visible_signing_keys()
            .into_iter()
            .map(|handle| (handle.kid().to_string(), handle.custodian_key_id().to_string()))
            .collect();

        let decryption_keys = self
            .active_publication_key()
            .into_iter()
            .map(|handle| (handle.kid().to_string(), handle.custodian_key_id().to_string()))
            .collect();

        IssuerConfig {
            issuer: issuer.to_string(),
            signing_keys,
            decryption_keys,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

fn check_usable(handle: &KeyHandle) -> Result<(), PassportError> {
    match handle.group() {
        KeyGroup::Jwt | KeyGroup::Jwks => handle.signing_method().map(|_| ()),
        KeyGroup::Jose => {
            let spec = handle.key_spec();
            if spec.is_rsa() || spec.is_ec() {
                Ok(())
            } else {
                Err(PassportError::Configuration(format!(
                    "jose key {} has spec {spec}; expected RSA or EC",
                    handle.kid()
                )))
            }
        }
    }
}
