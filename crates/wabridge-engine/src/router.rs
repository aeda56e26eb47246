// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maps external account selectors to accounts.

use std::sync::Arc;

use wabridge_core::{AccountIdentity, BridgeError, SelectorMatch, SessionId};

use crate::account::Account;

/// Resolves a selector against a list of identities.
///
/// With exactly one account the selector is ignored. Otherwise exact
/// matches (session id, paired number, label) win over fuzzy label
/// substrings; several candidates in the winning tier, or a missing
/// selector, are reported as [`BridgeError::AmbiguousAccount`].
pub fn resolve_index(
    identities: &[AccountIdentity],
    selector: Option<&str>,
) -> Result<usize, BridgeError> {
    match identities.len() {
        0 => {
            return Err(BridgeError::AccountNotFound {
                selector: selector.unwrap_or_default().to_string(),
            });
        }
        1 => return Ok(0),
        _ => {}
    }

    let Some(selector) = selector.map(str::trim).filter(|s| !s.is_empty()) else {
        return Err(BridgeError::AmbiguousAccount {
            count: identities.len(),
        });
    };

    for tier in [SelectorMatch::Exact, SelectorMatch::Fuzzy] {
        let hits: Vec<usize> = identities
            .iter()
            .enumerate()
            .filter(|(_, identity)| identity.matches(selector) == tier)
            .map(|(index, _)| index)
            .collect();
        match hits.as_slice() {
            [] => continue,
            [index] => return Ok(*index),
            many => {
                return Err(BridgeError::AmbiguousAccount { count: many.len() });
            }
        }
    }

    Err(BridgeError::AccountNotFound {
        selector: selector.to_string(),
    })
}

/// All configured accounts, in configuration order.
#[derive(Debug, Clone)]
pub struct AccountRouter {
    accounts: Vec<Arc<Account>>,
}

impl AccountRouter {
    pub fn new(accounts: Vec<Arc<Account>>) -> Self {
        Self { accounts }
    }

    pub fn resolve(&self, selector: Option<&str>) -> Result<&Arc<Account>, BridgeError> {
        let identities: Vec<_> = self.accounts.iter().map(|a| a.identity()).collect();
        let index = resolve_index(&identities, selector)?;
        Ok(&self.accounts[index])
    }

    /// Session id a webhook sink selector refers to. `None` selects all.
    pub fn resolve_session(&self, selector: Option<&str>) -> Result<Option<SessionId>, BridgeError> {
        match selector.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(selector) => {
                let identities: Vec<_> = self.accounts.iter().map(|a| a.identity()).collect();
                // Even a lone account must actually match a sink selector.
                if identities.len() == 1 && identities[0].matches(selector) == SelectorMatch::None {
                    return Err(BridgeError::AccountNotFound {
                        selector: selector.to_string(),
                    });
                }
                let index = resolve_index(&identities, Some(selector))?;
                Ok(Some(self.accounts[index].id().clone()))
            }
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<&Arc<Account>> {
        self.accounts.iter().find(|a| a.id() == id)
    }

    pub fn all(&self) -> &[Arc<Account>] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
