//! Cache key policies.
//!
//! Every logical resource served through the cache has exactly one key
//! and one TTL. The mapping is static: adding a resource means adding a
//! variant to [`Resource`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const ONE_MINUTE: u64 = 60;
const ONE_HOUR: u64 = 60 * ONE_MINUTE;
const ONE_DAY: u64 = 24 * ONE_HOUR;
const ONE_WEEK: u64 = 7 * ONE_DAY;
const ONE_MONTH: u64 = 30 * ONE_DAY;

/// Key string and TTL for one logical resource.
///
/// Inmutable una vez creada. El TTL siempre es mayor que cero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKeySpec {
    name: String,
    ttl_seconds: u64,
}

impl CacheKeySpec {
    /// Creates a new key spec.
    ///
    /// # Panics
    ///
    /// Panics if `ttl_seconds` is zero. Key policies are static, so a zero
    /// TTL is a programming error rather than a runtime condition.
    pub fn new(name: impl Into<String>, ttl_seconds: u64) -> Self {
        let name = name.into();
        assert!(ttl_seconds > 0, "cache key '{name}' must have a positive TTL");
        Self { name, ttl_seconds }
    }

    /// Returns the cache key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the TTL in seconds.
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Returns the TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl fmt::Display for CacheKeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}s)", self.name, self.ttl_seconds)
    }
}

/// A logical resource served through the cache.
///
/// Static resources have a fixed key. Parameterised resources embed their
/// argument in the key, e.g. `txCount:{address}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    About,
    Nodes,
    Providers,
    ProvidersWithStakeInformation,
    Identities,
    Keybases,
    IdentityProfilesKeybases,
    AllEsdtTokens,
    CurrentPrice,
    Economics,
    ActiveShards,
    NumShards,
    GenesisTimestamp,
    Top25Accounts,
    HeartbeatStatus,
    ValidatorStatistics,
    TokenAssets,
    AccountAssets,
    MexSettings,
    /// Confirmed keybase identity.
    KeybaseConfirmation(String),
    /// Transaction count of an address.
    TxCount(String),
    IdentityProfile(String),
    /// BLS key owner for a given epoch.
    OwnerByEpochAndBls { epoch: u64, bls: String },
    EsdtProperties(String),
    NftMetadata(String),
    NftMedia(String),
    /// Marker held while a media fetch is in flight.
    PendingMediaGet(String),
}

/// Static resources, in the order they are matched when parsing.
const STATIC_RESOURCES: &[(&str, Resource)] = &[
    ("about", Resource::About),
    ("nodes", Resource::Nodes),
    ("providers", Resource::Providers),
    (
        "providersWithStakeInformation",
        Resource::ProvidersWithStakeInformation,
    ),
    ("identities", Resource::Identities),
    ("keybases", Resource::Keybases),
    ("identityProfilesKeybases", Resource::IdentityProfilesKeybases),
    ("allEsdtTokens", Resource::AllEsdtTokens),
    ("currentPrice", Resource::CurrentPrice),
    ("economics", Resource::Economics),
    ("shards", Resource::ActiveShards),
    ("numShards", Resource::NumShards),
    ("genesisTimestamp", Resource::GenesisTimestamp),
    ("accounts:0:25", Resource::Top25Accounts),
    ("heartbeatstatus", Resource::HeartbeatStatus),
    ("validatorstatistics", Resource::ValidatorStatistics),
    ("tokenAssets", Resource::TokenAssets),
    ("accountLabels", Resource::AccountAssets),
    ("mex:settings", Resource::MexSettings),
];

impl Resource {
    /// Returns the key and TTL of this resource.
    pub fn spec(&self) -> CacheKeySpec {
        CacheKeySpec::new(self.key(), self.ttl_seconds())
    }

    /// Returns the cache key of this resource.
    pub fn key(&self) -> String {
        match self {
            Resource::KeybaseConfirmation(id) => format!("keybase:{id}"),
            Resource::TxCount(address) => format!("txCount:{address}"),
            Resource::IdentityProfile(id) => format!("identityProfile:{id}"),
            Resource::OwnerByEpochAndBls { epoch, bls } => format!("owner:{epoch}:{bls}"),
            Resource::EsdtProperties(identifier) => format!("esdt:{identifier}"),
            Resource::NftMetadata(identifier) => format!("nftMetadata:{identifier}"),
            Resource::NftMedia(identifier) => format!("nftMedia:{identifier}"),
            Resource::PendingMediaGet(id) => format!("pendingMediaGet:{id}"),
            fixed => STATIC_RESOURCES
                .iter()
                .find(|(_, resource)| resource == fixed)
                .map(|(name, _)| (*name).to_string())
                .unwrap_or_else(|| unreachable!("static resource {fixed:?} has no key")),
        }
    }

    fn ttl_seconds(&self) -> u64 {
        match self {
            Resource::About | Resource::Economics => 10 * ONE_MINUTE,
            Resource::Nodes
            | Resource::Providers
            | Resource::ProvidersWithStakeInformation
            | Resource::Keybases
            | Resource::IdentityProfilesKeybases
            | Resource::AllEsdtTokens
            | Resource::CurrentPrice
            | Resource::MexSettings => ONE_HOUR,
            Resource::Identities => 15 * ONE_MINUTE,
            Resource::ActiveShards => ONE_MINUTE,
            Resource::NumShards | Resource::GenesisTimestamp => ONE_WEEK,
            Resource::Top25Accounts
            | Resource::HeartbeatStatus
            | Resource::ValidatorStatistics => 2 * ONE_MINUTE,
            Resource::TokenAssets | Resource::AccountAssets => ONE_DAY,
            Resource::KeybaseConfirmation(_) | Resource::IdentityProfile(_) => 6 * ONE_MONTH,
            Resource::TxCount(_) => 30,
            Resource::OwnerByEpochAndBls { .. } | Resource::EsdtProperties(_) => ONE_DAY,
            Resource::NftMetadata(_) | Resource::NftMedia(_) => 10 * ONE_MINUTE,
            Resource::PendingMediaGet(_) => 6,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Resource {
    type Err = CoreError;

    /// Parses a cache key back into its resource.
    ///
    /// Static names match exactly; parameterised keys match by prefix.
    fn from_str(key: &str) -> Result<Self, Self::Err> {
        if let Some((_, resource)) = STATIC_RESOURCES.iter().find(|(name, _)| *name == key) {
            return Ok(resource.clone());
        }

        let (prefix, arg) = key
            .split_once(':')
            .filter(|(_, arg)| !arg.is_empty())
            .ok_or_else(|| CoreError::unknown_resource(key))?;

        let resource = match prefix {
            "keybase" => Resource::KeybaseConfirmation(arg.to_string()),
            "txCount" => Resource::TxCount(arg.to_string()),
            "identityProfile" => Resource::IdentityProfile(arg.to_string()),
            "esdt" => Resource::EsdtProperties(arg.to_string()),
            "nftMetadata" => Resource::NftMetadata(arg.to_string()),
            "nftMedia" => Resource::NftMedia(arg.to_string()),
            "pendingMediaGet" => Resource::PendingMediaGet(arg.to_string()),
            "owner" => {
                let (epoch, bls) = arg
                    .split_once(':')
                    .filter(|(_, bls)| !bls.is_empty())
                    .ok_or_else(|| CoreError::unknown_resource(key))?;
                let epoch = epoch
                    .parse()
                    .map_err(|_| CoreError::unknown_resource(key))?;
                Resource::OwnerByEpochAndBls {
                    epoch,
                    bls: bls.to_string(),
                }
            },
            _ => return Err(CoreError::unknown_resource(key)),
        };

        Ok(resource)
    }
}

/// Static lookup from resource names to key policies.
///
/// Stateless; every method is an associated function.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyPolicyRegistry;

impl KeyPolicyRegistry {
    /// Resolves a resource name to its key spec.
    ///
    /// # Panics
    ///
    /// Panics if the name is not a known resource. Callers must only ask
    /// for resources they know about; use [`KeyPolicyRegistry::lookup`] for
    /// keys that arrive from outside the process.
    pub fn resolve(name: &str) -> CacheKeySpec {
        match Self::lookup(name) {
            Some(spec) => spec,
            None => panic!("unknown cache resource '{name}'"),
        }
    }

    /// Resolves a resource name, returning `None` if it is unknown.
    pub fn lookup(name: &str) -> Option<CacheKeySpec> {
        name.parse::<Resource>().ok().map(|resource| resource.spec())
    }
}
