//! Profile-driven wallet currency resolution
//!
//! Bonus credits and implicit-currency wallet calls resolve the currency
//! from the participant's profile country. Unknown participants fall back
//! to the deployment default so a wallet credit never fails on a missing
//! profile.

use binary_engine::NetworkStore;
use std::sync::Arc;
use uuid::Uuid;
use wallet_core::{Currency, CurrencyResolver};

/// Resolves wallet currencies from participant profile countries
pub struct ProfileCurrencyResolver {
    network: Arc<dyn NetworkStore>,
    default_currency: Currency,
}

impl ProfileCurrencyResolver {
    /// Create a resolver over the network store
    pub fn new(network: Arc<dyn NetworkStore>, default_currency: Currency) -> Self {
        Self {
            network,
            default_currency,
        }
    }
}

impl CurrencyResolver for ProfileCurrencyResolver {
    fn currency_for(&self, participant_id: Uuid) -> wallet_core::Result<Currency> {
        let participant = self
            .network
            .participant(participant_id)
            .map_err(|e| wallet_core::Error::Storage(e.to_string()))?;

        Ok(match participant {
            Some(p) => Currency::for_country(&p.country),
            None => self.default_currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binary_engine::{MemoryNetworkStore, Participant};

    #[test]
    fn test_resolves_from_profile_country() {
        let store = Arc::new(MemoryNetworkStore::new());
        let p = Participant::new(Uuid::new_v4(), None, "BR");
        store.put_participant(&p).unwrap();

        let resolver = ProfileCurrencyResolver::new(store, Currency::USD);
        assert_eq!(resolver.currency_for(p.participant_id).unwrap(), Currency::BRL);
    }

    #[test]
    fn test_unknown_participant_uses_default() {
        let store = Arc::new(MemoryNetworkStore::new());
        let resolver = ProfileCurrencyResolver::new(store, Currency::EUR);
        assert_eq!(resolver.currency_for(Uuid::new_v4()).unwrap(), Currency::EUR);
    }
}
