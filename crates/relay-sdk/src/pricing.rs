//! Pricing Service (C4): maps `(event kind, encoded size)` to a minimum
//! acceptable amount, with owner and SPSP bypasses.

use std::collections::HashMap;

use nostr_sdk::{Event, PublicKey};

use crate::error::{Error, Result};
use crate::spsp::{SPSP_REQUEST_KIND, SPSP_RESPONSE_KIND};

/// Configuration, mirroring the BLS's own config surface.
#[derive(Debug, Clone, Default)]
pub struct PricingConfig {
    pub base_price_per_byte: u128,
    pub kind_overrides: HashMap<u16, u128>,
    pub spsp_min_price: Option<u128>,
    pub owner_pubkey: Option<String>,
}

/// Pure-ish pricing function: one `price` call per `/handle-packet` request.
/// Holds its config immutably after construction — `ownerPubkey` is
/// validated once here rather than on every call.
#[derive(Debug, Clone)]
pub struct PricingService {
    config: PricingConfig,
    owner_pubkey: Option<PublicKey>,
}

/// Discriminated bypass outcome, so call sites never have to re-derive
/// *why* an event was priced the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceBasis {
    Base,
    KindOverride,
    OwnerBypass,
    SpspBypass,
}

#[derive(Debug, Clone, Copy)]
pub struct Price {
    pub required: u128,
    pub basis: PriceBasis,
}

impl PricingService {
    pub fn new(config: PricingConfig) -> Result<Self> {
        let owner_pubkey = match &config.owner_pubkey {
            Some(hex) => Some(
                PublicKey::from_hex(hex)
                    .map_err(|e| Error::Config(format!("invalid ownerPubkey: {e}")))?,
            ),
            None => None,
        };
        Ok(Self {
            config,
            owner_pubkey,
        })
    }

    /// Price `event` whose TOON-encoded size is `encoded_size` bytes.
    pub fn price(&self, event: &Event, encoded_size: usize) -> Price {
        if let Some(owner) = &self.owner_pubkey
            && &event.pubkey == owner
        {
            return Price {
                required: 0,
                basis: PriceBasis::OwnerBypass,
            };
        }

        let kind = event.kind.as_u16();
        if let Some(min_price) = self.config.spsp_min_price
            && (kind == SPSP_REQUEST_KIND || kind == SPSP_RESPONSE_KIND)
        {
            return Price {
                required: min_price,
                basis: PriceBasis::SpspBypass,
            };
        }

        if let Some(per_byte) = self.config.kind_overrides.get(&kind) {
            return Price {
                required: per_byte * encoded_size as u128,
                basis: PriceBasis::KindOverride,
            };
        }

        Price {
            required: self.config.base_price_per_byte * encoded_size as u128,
            basis: PriceBasis::Base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::{EventBuilder, Keys, Kind};

    fn event(keys: &Keys) -> Event {
        EventBuilder::new(Kind::TextNote, "x".repeat(32))
            .sign_with_keys(keys)
            .unwrap()
    }

    #[test]
    fn base_price_is_linear_in_size() {
        let svc = PricingService::new(PricingConfig {
            base_price_per_byte: 10,
            ..Default::default()
        })
        .unwrap();
        let keys = Keys::generate();
        let e = event(&keys);
        let price = svc.price(&e, 384);
        assert_eq!(price.required, 3840);
        assert_eq!(price.basis, PriceBasis::Base);
    }

    #[test]
    fn kind_override_replaces_base_price() {
        let mut overrides = HashMap::new();
        overrides.insert(1u16, 0u128);
        let svc = PricingService::new(PricingConfig {
            base_price_per_byte: 10,
            kind_overrides: overrides,
            ..Default::default()
        })
        .unwrap();
        let keys = Keys::generate();
        let e = event(&keys);
        assert_eq!(svc.price(&e, 384).required, 0);
    }

    #[test]
    fn owner_bypass_prices_at_zero_regardless_of_size() {
        let keys = Keys::generate();
        let svc = PricingService::new(PricingConfig {
            base_price_per_byte: 10,
            owner_pubkey: Some(keys.public_key().to_hex()),
            ..Default::default()
        })
        .unwrap();
        let e = event(&keys);
        let price = svc.price(&e, 10_000);
        assert_eq!(price.required, 0);
        assert_eq!(price.basis, PriceBasis::OwnerBypass);
    }

    #[test]
    fn non_owner_is_not_bypassed() {
        let owner_keys = Keys::generate();
        let other_keys = Keys::generate();
        let svc = PricingService::new(PricingConfig {
            base_price_per_byte: 10,
            owner_pubkey: Some(owner_keys.public_key().to_hex()),
            ..Default::default()
        })
        .unwrap();
        let e = event(&other_keys);
        assert_eq!(svc.price(&e, 100).basis, PriceBasis::Base);
    }

    #[test]
    fn invalid_owner_pubkey_is_config_error() {
        let err = PricingService::new(PricingConfig {
            owner_pubkey: Some("not-hex".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn spsp_kind_uses_flat_minimum_not_size() {
        let svc = PricingService::new(PricingConfig {
            base_price_per_byte: 1000,
            spsp_min_price: Some(5),
            ..Default::default()
        })
        .unwrap();
        let keys = Keys::generate();
        let spsp_event = EventBuilder::new(Kind::Custom(SPSP_REQUEST_KIND), "ciphertext")
            .sign_with_keys(&keys)
            .unwrap();
        let price = svc.price(&spsp_event, 10_000);
        assert_eq!(price.required, 5);
        assert_eq!(price.basis, PriceBasis::SpspBypass);
    }
}
