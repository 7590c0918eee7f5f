use ethers::types::Address;

pub const CHAIN_ID_BASE: u64 = 8453;
pub const CHAIN_ID_BASE_SEPOLIA: u64 = 84532;

const USDC_ADDRESS_BASE: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
const USDC_ADDRESS_BASE_SEPOLIA: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";
const GAME_CONTRACT_ADDRESS_BASE: &str = "0x9A7d54C1D3f5E2B8a641cC0b3eD94A872F10bE4C";
const GAME_CONTRACT_ADDRESS_BASE_SEPOLIA: &str = "0x4Fb2E1A97cD30C5588dd6E8B0Ff19A3C2e64D7a1";

/// Contract addresses for one supported chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChainAddresses {
    pub game_contract: Address,
    pub usdc_token: Address,
}

/// Maps a chain id to its compiled-in addresses. Unknown chain ids fall back
/// to the Base Sepolia deployment.
pub fn resolve(chain_id: u64) -> ChainAddresses {
    match chain_id {
        CHAIN_ID_BASE => ChainAddresses {
            game_contract: addr(GAME_CONTRACT_ADDRESS_BASE),
            usdc_token: addr(USDC_ADDRESS_BASE),
        },
        _ => ChainAddresses {
            game_contract: addr(GAME_CONTRACT_ADDRESS_BASE_SEPOLIA),
            usdc_token: addr(USDC_ADDRESS_BASE_SEPOLIA),
        },
    }
}

fn addr(raw: &str) -> Address {
    raw.parse().expect("compiled-in address is valid hex")
}
