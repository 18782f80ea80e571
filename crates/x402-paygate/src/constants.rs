use alloy::primitives::{address, Address};

/// Header carrying the caller's session token.
pub const SESSION_HEADER: &str = "X-402-Session";

/// Payment router contract on Avalanche C-Chain.
pub const DEFAULT_CONTRACT: Address = address!("Da90Fac43937AD84dC9483ff118C8c2CEc5f1F56");

/// Token address meaning "pay in the chain's native asset".
pub const NATIVE_TOKEN: Address = Address::ZERO;

/// Avalanche C-Chain mainnet.
pub const AVALANCHE_CHAIN_ID: u64 = 43114;

/// Avalanche Fuji testnet.
pub const FUJI_CHAIN_ID: u64 = 43113;

/// Chain used when a gate registration omits one.
pub const DEFAULT_CHAIN_ID: u64 = AVALANCHE_CHAIN_ID;

/// Session tokens are 32 random bytes.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Upper bound for a gate's platform fee snapshot (100%).
pub const MAX_FEE_BPS: u32 = 10_000;

/// Longest validity window a gate may grant (ten years).
pub const MAX_VALID_FOR_SEC: u64 = 10 * 365 * 24 * 60 * 60;

/// Display name for a chain id, as shown in payment instructions.
pub fn network_name(chain_id: u64) -> String {
    match chain_id {
        AVALANCHE_CHAIN_ID => "Avalanche C-Chain".to_string(),
        FUJI_CHAIN_ID => "Avalanche Fuji Testnet".to_string(),
        other => format!("eip155:{other}"),
    }
}
